use thiserror::Error;

/// Failures while delivering an invalidation hint
#[derive(Debug, Error, Clone)]
pub enum ObserverError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Timeout error: {0}")]
    TimeoutError(String),

    #[error("Delivery error: {0}")]
    DeliveryError(String),

    #[error("Rejected by receiver with status {status}")]
    Rejected { status: u16 },
}

impl From<reqwest::Error> for ObserverError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            ObserverError::TimeoutError(error.to_string())
        } else {
            ObserverError::DeliveryError(error.to_string())
        }
    }
}
