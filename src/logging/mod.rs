//! Abstractions for managing logging.

#[derive(Debug)]
pub enum Error {
    Level(String),
    Cfg(log4rs::config::runtime::ConfigErrors),
    Set(log::SetLoggerError),
}
impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Level(_) => None,
            Error::Cfg(err) => Some(err),
            Error::Set(err) => Some(err),
        }
    }
}
impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Level(level) => write!(f, "unknown log level '{level}'"),
            Error::Cfg(_) | Error::Set(_) => write!(f, "logger initialization failed"),
        }
    }
}
impl From<log4rs::config::runtime::ConfigErrors> for Error {
    fn from(value: log4rs::config::runtime::ConfigErrors) -> Self {
        Self::Cfg(value)
    }
}
impl From<log::SetLoggerError> for Error {
    fn from(value: log::SetLoggerError) -> Self {
        Self::Set(value)
    }
}

/// Parse a level name such as `info` or `TRACE`.
pub fn parse_level(level: &str) -> Result<log::LevelFilter, Error> {
    return level
        .trim()
        .parse::<log::LevelFilter>()
        .map_err(|_| Error::Level(level.to_string()));
}

/// Logs go to standard error so they do not mix with console output.
fn make_logger_config(
    level: log::LevelFilter,
) -> Result<log4rs::Config, log4rs::config::runtime::ConfigErrors> {
    let stderr: log4rs::append::console::ConsoleAppender =
        log4rs::append::console::ConsoleAppender::builder()
            .target(log4rs::append::console::Target::Stderr)
            .encoder(Box::new(log4rs::encode::pattern::PatternEncoder::new(
                "[{d(%Y-%m-%dT%H:%M:%S%.3f)}] {h([{l}])} [{T}] - {m}{n}",
            )))
            .build();

    let logger_config: log4rs::Config = log4rs::Config::builder()
        .appender(log4rs::config::Appender::builder().build("stderr", Box::new(stderr)))
        .build(
            log4rs::config::Root::builder()
                .appender("stderr")
                .build(level),
        )?;

    return Ok(logger_config);
}

/// Initialize a global logging utility.
pub fn init_logger(level: log::LevelFilter) -> Result<log4rs::Handle, Error> {
    let config: log4rs::Config = make_logger_config(level)?;
    let handle: log4rs::Handle = log4rs::init_config(config)?;
    return Ok(handle);
}
