use std::io;

use http::status::StatusCode;
use notify::{Error as NotifyError, ErrorKind as NotifyErrorKind};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LivedirError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("File System error: {0}")]
    Io(String),
    #[error("Item Not Found: {0}")]
    NotFound(String),
    #[error("You do not have permission to access this resource")]
    PermissionDenied,
    #[error("No available port found in range {start}..=65535")]
    PortExhausted { start: u16 },
    #[error("HTTP server error: {0}")]
    Server(String),
    #[error("File watch error: {0}")]
    Watch(String),
}

impl LivedirError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            LivedirError::Config(_) => StatusCode::BAD_REQUEST,
            LivedirError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            LivedirError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            LivedirError::NotFound(_) => StatusCode::NOT_FOUND,
            LivedirError::PermissionDenied => StatusCode::FORBIDDEN,
            LivedirError::PortExhausted { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            LivedirError::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
            LivedirError::Watch(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<io::Error> for LivedirError {
    fn from(x: io::Error) -> Self {
        match x.kind() {
            io::ErrorKind::NotFound => LivedirError::NotFound(format!("{x}")),
            io::ErrorKind::PermissionDenied => LivedirError::PermissionDenied,
            _ => LivedirError::Io(format!("IOError: {}: {x}", x.kind())),
        }
    }
}

impl From<toml::de::Error> for LivedirError {
    fn from(src: toml::de::Error) -> LivedirError {
        LivedirError::Config(format!("Toml deserialization error: {src}"))
    }
}

impl From<walkdir::Error> for LivedirError {
    fn from(src: walkdir::Error) -> LivedirError {
        let path = src.path().map(|p| p.display().to_string());
        match src.into_io_error() {
            Some(io_error) => match io_error.kind() {
                io::ErrorKind::NotFound => {
                    LivedirError::NotFound(format!("walk: {io_error}, path: {path:?}"))
                }
                io::ErrorKind::PermissionDenied => LivedirError::PermissionDenied,
                _ => LivedirError::Io(format!("walk: {io_error}, path: {path:?}")),
            },
            None => LivedirError::Io(format!("walk: filesystem loop at {path:?}")),
        }
    }
}

impl From<NotifyError> for LivedirError {
    fn from(notify_error: NotifyError) -> Self {
        match notify_error.kind {
            NotifyErrorKind::Generic(msg) => LivedirError::Watch(format!(
                "notify: {}, paths: {:?}",
                msg, notify_error.paths
            )),
            NotifyErrorKind::Io(io_error) => LivedirError::Watch(format!(
                "notify: io error {}, paths: {:?}",
                io_error.kind(),
                notify_error.paths
            )),
            NotifyErrorKind::PathNotFound => LivedirError::NotFound(format!(
                "notify: path(s) not found: {:?}",
                notify_error.paths
            )),
            NotifyErrorKind::WatchNotFound => LivedirError::NotFound(format!(
                "notify: watch not found, paths: {:?}",
                notify_error.paths
            )),
            NotifyErrorKind::InvalidConfig(_) => {
                LivedirError::Watch("notify invalid config".to_string())
            }
            NotifyErrorKind::MaxFilesWatch => {
                LivedirError::Watch("notify max file watch limit reached".to_string())
            }
        }
    }
}
