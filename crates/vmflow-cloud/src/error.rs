//! Provisioning error taxonomy

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Errors raised while planning, executing or inspecting cloud resources.
///
/// None of the variants ever carries a client secret or a bearer token.
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Authentication failed: {reason}")]
    AuthFailure { reason: String },

    #[error("Request rejected ({status}): {message}")]
    RequestRejected {
        status: u16,
        code: Option<String>,
        message: String,
        /// Remote error body, verbatim
        body: serde_json::Value,
    },

    #[error("Transient transport error after {attempts} attempt(s): {message}")]
    TransientTransport {
        status: Option<u16>,
        attempts: u32,
        message: String,
    },

    #[error("Operation {operation} did not reach a terminal state within {}s", waited.as_secs())]
    PollTimeout { operation: String, waited: Duration },

    #[error("{operation} is disabled. Set AZ_RUN_DEPLOY=true to allow resource-creating or destructive operations.")]
    GuardrailDenied { operation: String },

    #[error("Invalid deployment request: {0}")]
    Planning(String),

    #[error("Invalid response from control plane: {0}")]
    InvalidResponse(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CloudError>;

/// Serializable classification of a [`CloudError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    AuthFailure,
    RequestRejected,
    TransientTransportError,
    PollTimeout,
    GuardrailDenied,
    PlanningError,
    OperationFailed,
    OperationCanceled,
    InvalidResponse,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::AuthFailure => "auth_failure",
            ErrorKind::RequestRejected => "request_rejected",
            ErrorKind::TransientTransportError => "transient_transport_error",
            ErrorKind::PollTimeout => "poll_timeout",
            ErrorKind::GuardrailDenied => "guardrail_denied",
            ErrorKind::PlanningError => "planning_error",
            ErrorKind::OperationFailed => "operation_failed",
            ErrorKind::OperationCanceled => "operation_canceled",
            ErrorKind::InvalidResponse => "invalid_response",
        };
        f.write_str(s)
    }
}

/// Structured diagnostic attached to failed steps and tool results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Remote diagnostic body when the control plane supplied one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote: Option<serde_json::Value>,
}

impl StepError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            code: None,
            remote: None,
        }
    }

    pub fn with_remote(mut self, remote: serde_json::Value) -> Self {
        if !remote.is_null() {
            self.remote = Some(remote);
        }
        self
    }
}

impl CloudError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CloudError::AuthFailure { .. } => ErrorKind::AuthFailure,
            CloudError::RequestRejected { .. } => ErrorKind::RequestRejected,
            CloudError::TransientTransport { .. } => ErrorKind::TransientTransportError,
            CloudError::PollTimeout { .. } => ErrorKind::PollTimeout,
            CloudError::GuardrailDenied { .. } => ErrorKind::GuardrailDenied,
            CloudError::Planning(_) => ErrorKind::PlanningError,
            CloudError::InvalidResponse(_) | CloudError::Json(_) => ErrorKind::InvalidResponse,
        }
    }

    /// Whether the error may clear up on its own and is worth retrying
    pub fn is_transient(&self) -> bool {
        matches!(self, CloudError::TransientTransport { .. })
    }

    /// Conflict responses (409) are the only rejections a forced retry can resolve
    pub fn is_conflict(&self) -> bool {
        matches!(self, CloudError::RequestRejected { status: 409, .. })
    }

    pub fn diagnostic(&self) -> StepError {
        let mut diag = StepError::new(self.kind(), self.to_string());
        match self {
            CloudError::RequestRejected {
                status, code, body, ..
            } => {
                diag.status = Some(*status);
                diag.code = code.clone();
                diag = diag.with_remote(body.clone());
            }
            CloudError::TransientTransport { status, .. } => {
                diag.status = *status;
            }
            _ => {}
        }
        diag
    }
}
