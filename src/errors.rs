use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("SPAWN_FAILED: {0}")]
    Spawn(String),
    #[error("CHANNEL_CLOSED: {0}")]
    ChannelClosed(String),
    #[error("NOT_FOUND: {0}")]
    NotFound(String),
    #[error("CONFIG_INVALID: {0}")]
    Config(String),
    #[error("IO_FAILURE: {0}")]
    Io(String),
    #[error("INTERNAL: {0}")]
    Internal(String),
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        Self::Config(value.to_string())
    }
}

impl From<which::Error> for AppError {
    fn from(value: which::Error) -> Self {
        Self::NotFound(value.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
