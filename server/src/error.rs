use shared::PlayerId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required field '{field}'")]
    MissingField { field: String },
    #[error("'{field}' must be greater than zero (got {value})")]
    InvalidLimit { field: String, value: usize },
    #[error("'{field}' must be a non-zero duration")]
    InvalidDuration { field: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("unknown player {0}")]
    UnknownPlayer(PlayerId),
    #[error("position must be two finite numbers")]
    InvalidPosition,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Invalid or missing player_id")]
    InvalidSession,
}

/// Failure to hand a message to a session's outbound queue.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("outbound queue full")]
    QueueFull,
    #[error("session closed")]
    Closed,
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}
