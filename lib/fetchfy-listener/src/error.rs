use std::net::SocketAddr;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ListenerError>;

#[derive(Error, Debug)]
pub enum ListenerError {
    #[error("Listener for gateway {0} already started")]
    AlreadyStarted(String),

    #[error("Listener for gateway {0} is not configured")]
    NotConfigured(String),

    #[error("TLS termination is not supported (secret {0})")]
    TlsUnsupported(String),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Listener task failed during shutdown: {0}")]
    Shutdown(String),
}
