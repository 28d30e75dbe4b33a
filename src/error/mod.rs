//! Main error module.

/// Everything a lifecycle operation can fail with.
#[derive(Debug)]
pub enum Error {
    /// Version label not in the catalog.
    UnknownVersion(String),
    InvalidRecord(String),
    Download(crate::http::HttpError),
    /// Filesystem failure while preparing the server directory or writing
    /// one of the server's config files.
    ConfigWrite {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
    ProcessControl(crate::proc::ProcessError),
    Persistence(crate::store::StoreError),
    /// Contains the selector that matched nothing.
    NotFound(String),
    /// Contains the selector that matched more than one record.
    Ambiguous(String),
    /// Another lifecycle operation on the same record is in flight.
    Busy(String),
    Cancelled,
    QueueFull,
    Shutdown,
}

impl Error {
    /// Short human readable name of the failure category, fit for a
    /// notification title.
    pub fn category(&self) -> &'static str {
        return match self {
            Error::UnknownVersion(_) => "Invalid Version",
            Error::InvalidRecord(_) => "Invalid Server",
            Error::Download(_) => "Download Error",
            Error::ConfigWrite { .. } => "Config Write Error",
            Error::ProcessControl(_) => "Process Control Error",
            Error::Persistence(_) => "Persistence Error",
            Error::NotFound(_) => "Server Not Found",
            Error::Ambiguous(_) => "Ambiguous Server Name",
            Error::Busy(_) => "Server Busy",
            Error::Cancelled => "Cancelled",
            Error::QueueFull => "Too Many Requests",
            Error::Shutdown => "Shutting Down",
        };
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Download(err) => Some(err),
            Error::ConfigWrite { source, .. } => Some(source),
            Error::ProcessControl(err) => Some(err),
            Error::Persistence(err) => Some(err),
            Error::UnknownVersion(_)
            | Error::InvalidRecord(_)
            | Error::NotFound(_)
            | Error::Ambiguous(_)
            | Error::Busy(_)
            | Error::Cancelled
            | Error::QueueFull
            | Error::Shutdown => None,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::UnknownVersion(label) => write!(f, "version '{label}' is not available"),
            Error::InvalidRecord(reason) => write!(f, "invalid server: {reason}"),
            Error::Download(_) => write!(f, "failed to download PaperMC server"),
            Error::ConfigWrite { path, .. } => {
                write!(f, "cannot write {}", path.to_string_lossy())
            }
            Error::ProcessControl(_) => write!(f, "cannot control server process"),
            Error::Persistence(_) => write!(f, "cannot persist server list"),
            Error::NotFound(selector) => write!(f, "no server matches '{selector}'"),
            Error::Ambiguous(selector) => write!(
                f,
                "more than one server is named '{selector}' -- Use '#<id>' instead"
            ),
            Error::Busy(name) => write!(f, "another operation on {name} is in progress"),
            Error::Cancelled => write!(f, "operation cancelled"),
            Error::QueueFull => write!(f, "too many pending requests, try again later"),
            Error::Shutdown => write!(f, "shutting down, no new operations are accepted"),
        }
    }
}

impl From<crate::http::HttpError> for Error {
    fn from(err: crate::http::HttpError) -> Self {
        return match err {
            crate::http::HttpError::Cancelled => Self::Cancelled,
            err => Self::Download(err),
        };
    }
}
impl From<crate::proc::ProcessError> for Error {
    fn from(err: crate::proc::ProcessError) -> Self {
        return match err {
            crate::proc::ProcessError::Cancelled => Self::Cancelled,
            err => Self::ProcessControl(err),
        };
    }
}
impl From<crate::store::StoreError> for Error {
    fn from(err: crate::store::StoreError) -> Self {
        return Self::Persistence(err);
    }
}
