//! HTTP backend error types

use thiserror::Error;
use vmflow_cloud::CloudError;

/// Failure to obtain any HTTP response at all
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("HTTP client error: {0}")]
    Client(String),
}

impl BackendError {
    /// Timeouts and connection failures may clear up on retry
    pub fn is_transient(&self) -> bool {
        matches!(self, BackendError::Timeout(_) | BackendError::Connect(_))
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        let (timeout, connect) = (err.is_timeout(), err.is_connect());
        let message = err.without_url().to_string();
        if timeout {
            BackendError::Timeout(message)
        } else if connect {
            BackendError::Connect(message)
        } else {
            BackendError::Client(message)
        }
    }
}

impl From<BackendError> for CloudError {
    fn from(err: BackendError) -> Self {
        CloudError::TransientTransport {
            status: None,
            attempts: 1,
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
