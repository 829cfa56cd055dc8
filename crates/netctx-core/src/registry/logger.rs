use std::{fmt, sync::Arc};

type Sink = Arc<dyn Fn(fmt::Arguments<'_>) + Send + Sync>;

/// Sink for non-fatal harvest failures (a field that was present but could not be parsed).
#[derive(Clone, Default)]
pub enum Logger {
    /// Forward to `tracing` at `WARN` under the `netctx` target.
    #[default]
    Tracing,
    /// Hand the formatted message to a user function.
    Custom(Sink),
    /// Drop everything.
    Off,
}

impl Logger {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(fmt::Arguments<'_>) + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(f))
    }

    pub fn log(&self, args: fmt::Arguments<'_>) {
        match self {
            Self::Tracing => tracing::warn!(target: "netctx", "{}", args),
            Self::Custom(sink) => sink(args),
            Self::Off => {}
        }
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tracing => f.write_str("Logger::Tracing"),
            Self::Custom(_) => f.write_str("Logger::Custom(..)"),
            Self::Off => f.write_str("Logger::Off"),
        }
    }
}
