use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Transport error: {0}")]
    TransportError(String),
    #[error("Protocol error: {0}")]
    ProtocolError(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },
    #[error("Authentication error: {0}")]
    AuthError(String),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Invalid currency {0}")]
    InvalidCurrency(String),
    #[error("Payment link {0} not found")]
    LinkNotFound(String),
    #[error("No pending payment on link {0}")]
    PaymentNotFound(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Event stream closed")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, BridgeError>;
