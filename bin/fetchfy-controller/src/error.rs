use fetchfy_api::SelectorError;
use fetchfy_listener::ListenerError;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Retry interval for server and configuration errors
pub const ERROR_RETRY: Duration = Duration::from_secs(30);

/// Retry interval after failing to persist Gateway status
pub const STATUS_RETRY: Duration = Duration::from_secs(60);

#[derive(Error, Debug)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Listener error: {0}")]
    Listener(#[from] ListenerError),

    #[error("Invalid service selector: {0}")]
    Selector(#[from] SelectorError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Failed to update Gateway status: {0}")]
    StatusUpdate(String),
}

impl Error {
    /// How long the controller waits before retrying after this error
    pub fn requeue_after(&self) -> Duration {
        match self {
            Error::StatusUpdate(_) => STATUS_RETRY,
            _ => ERROR_RETRY,
        }
    }

    /// Label used for the error counter
    pub fn metric_label(&self) -> &'static str {
        match self {
            Error::Kube(_) => "kube",
            Error::Listener(_) => "listener",
            Error::Selector(_) | Error::Configuration(_) => "configuration",
            Error::StatusUpdate(_) => "status_update",
        }
    }
}
