use std::num::ParseIntError;

use thiserror::Error;

/// Failure to turn wire text into a typed value.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid integer {text:?}: {source}")]
    Int {
        text: String,
        #[source]
        source: ParseIntError,
    },

    #[error("invalid timestamp {text:?}: {source}")]
    Time {
        text: String,
        #[source]
        source: time::error::Parse,
    },

    #[error("invalid value {text:?}: {reason}")]
    Invalid { text: String, reason: String },
}

impl ParseError {
    /// Build a free-form parse error for custom codecs.
    pub fn invalid(text: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            text: text.into(),
            reason: reason.into(),
        }
    }
}

/// Failure to turn a typed value into wire text.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct RenderError(pub String);

/// Errors raised by the low-level marshal/unmarshal operations of an [`crate::Entry`].
#[derive(Debug, Error)]
pub enum EntryError {
    #[error("cannot assign value of entry '{entry}' ({expected}) to {actual}")]
    TypeMismatch {
        entry: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("could not parse value for entry '{entry}': {source}")]
    Parse {
        entry: String,
        #[source]
        source: ParseError,
    },

    #[error("could not render value for entry '{entry}': {reason}")]
    Render { entry: String, reason: String },
}

/// Configuration mistakes. Surfaced at configuration time, never during a request.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("entry '{0}' has no parse function")]
    MissingParse(String),

    #[error("invalid field prefix {prefix:?}: {reason}")]
    InvalidPrefix { prefix: String, reason: String },

    #[error("invalid time format {format:?}: {reason}")]
    InvalidTimeFormat { format: String, reason: String },
}

/// Why a request context is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContextError {
    /// The context (or one of its parents) was cancelled explicitly.
    #[error("context canceled")]
    Canceled,

    /// The context deadline passed.
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

impl ContextError {
    #[inline]
    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(self, Self::DeadlineExceeded)
    }
}
