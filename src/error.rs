use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The server broke the upload contract: unexpected status code, a
    /// missing or malformed header, or a diverged upload offset.
    #[error("protocol error{}: {message}", .status.as_ref().map(|s| format!(" (status {s})")).unwrap_or_default())]
    Protocol {
        message: String,
        status: Option<u16>,
    },

    #[error("file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("store error: {0}")]
    Store(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Contract violation without an associated HTTP status.
    pub fn protocol(message: impl Into<String>) -> Self {
        Error::Protocol {
            message: message.into(),
            status: None,
        }
    }

    /// Contract violation carrying the offending HTTP status.
    pub fn protocol_status(message: impl Into<String>, status: u16) -> Self {
        Error::Protocol {
            message: message.into(),
            status: Some(status),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
