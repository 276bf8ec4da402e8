// src/error.rs
use crate::types::AlertId;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AlertError {
    #[error("invalid alert spec: {0}")]
    InvalidSpec(String),

    #[error("alert {0} not found")]
    NotFound(AlertId),

    #[error("alert {0} already fired and cannot be re-armed")]
    AlreadyTriggered(AlertId),
}

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("HTTP error: {0}")]
    Http(reqwest::Error),

    #[error("channel rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("delivery timed out")]
    Timeout,

    #[error("channel not configured: {0}")]
    Unconfigured(String),
}

impl From<reqwest::Error> for DeliveryError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            DeliveryError::Timeout
        } else {
            DeliveryError::Http(e)
        }
    }
}

impl DeliveryError {
    /// Client errors other than rate limiting will not succeed on retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            DeliveryError::Http(e) => !e.is_builder(),
            DeliveryError::Rejected { status, .. } => *status == 429 || *status >= 500,
            DeliveryError::Timeout => true,
            DeliveryError::Unconfigured(_) => false,
        }
    }
}
