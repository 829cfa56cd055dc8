//! Tracing subscriber set-up shared by the netctx services.
mod config;
pub use config::{ENV_FORMAT, ENV_LEVEL, LoggerConfig};

mod error;
pub use error::LoggerError;

mod format;
pub use format::LoggerFormat;

mod init;

mod level;
pub use level::LoggerLevel;

mod timer;
pub use timer::UtcRfc3339;

/// Install the global tracing subscriber described by `cfg`.
///
/// Call once, early in `main`. A second call fails with [`LoggerError::AlreadyInitialized`].
///
/// ```no_run
/// use netctx_observe::{LoggerConfig, init_logger};
///
/// init_logger(&LoggerConfig::default()).expect("logger");
/// tracing::info!("ready");
/// ```
pub fn init_logger(cfg: &LoggerConfig) -> Result<(), LoggerError> {
    match cfg.format {
        LoggerFormat::Text => init::text(cfg),
        LoggerFormat::Json => init::json(cfg),
        LoggerFormat::Journald => init::journald(cfg),
    }
}
