use netctx_core::ContextError;
use thiserror::Error;

/// Outcome of an outgoing call made under a request context.
///
/// Cancellation and deadline expiry are kept apart from transport failures so callers
/// can tell "took too long" from "broke".
#[derive(Debug, Error)]
pub enum CallError<E> {
    #[error("context canceled")]
    Canceled,

    #[error("context deadline exceeded")]
    DeadlineExceeded,

    #[error("transport error: {0}")]
    Transport(#[source] E),
}

impl<E> CallError<E> {
    /// The context failure behind this error, if it is one.
    pub fn context(&self) -> Option<ContextError> {
        match self {
            Self::Canceled => Some(ContextError::Canceled),
            Self::DeadlineExceeded => Some(ContextError::DeadlineExceeded),
            Self::Transport(_) => None,
        }
    }

    #[inline]
    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(self, Self::DeadlineExceeded)
    }
}

impl<E> From<ContextError> for CallError<E> {
    fn from(err: ContextError) -> Self {
        match err {
            ContextError::Canceled => Self::Canceled,
            ContextError::DeadlineExceeded => Self::DeadlineExceeded,
        }
    }
}

/// Errors surfaced by the server-side adapters.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("no request context in request extensions")]
    MissingContext,

    #[error(transparent)]
    Context(#[from] ContextError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn context_errors_map_to_distinct_variants() {
        let e: CallError<io::Error> = ContextError::DeadlineExceeded.into();
        assert!(e.is_deadline_exceeded());
        assert_eq!(e.context(), Some(ContextError::DeadlineExceeded));

        let e: CallError<io::Error> = ContextError::Canceled.into();
        assert!(matches!(e, CallError::Canceled));

        let e = CallError::Transport(io::Error::other("reset"));
        assert_eq!(e.context(), None);
        assert_eq!(e.to_string(), "transport error: reset");
    }
}
