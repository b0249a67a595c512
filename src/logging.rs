//! Console logging for binaries and benchmarks built on this crate.
//!
//! The library itself only emits records through the `log` facade; nothing
//! is printed unless a logger is installed, e.g. with [`init_logging`].
use log::LevelFilter;
use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
use log4rs::Handle;
use thiserror::Error;

const PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S)} {h({l:<5})} {t} - {m}{n}";

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid logging configuration: {0}")]
    Config(String),
    #[error(transparent)]
    SetLogger(#[from] log::SetLoggerError),
}

/// Builds a stderr console configuration at `level`.
///
/// # Errors
pub fn console_config(level: LevelFilter) -> Result<Config, LoggingError> {
    let stderr = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new(PATTERN)))
        .build();
    Config::builder()
        .appender(Appender::builder().build("stderr", Box::new(stderr)))
        .build(Root::builder().appender("stderr").build(level))
        .map_err(|e| LoggingError::Config(e.to_string()))
}

/// Installs the console logger as the global logger.
///
/// The returned handle can swap in a new configuration later, e.g. to raise
/// the level while debugging a single attack.
///
/// # Errors
/// `SetLogger` if a global logger is already installed
pub fn init_logging(level: LevelFilter) -> Result<Handle, LoggingError> {
    let config = console_config(level)?;
    Ok(log4rs::init_config(config)?)
}
