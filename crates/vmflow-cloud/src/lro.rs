//! Long-running operation model
//!
//! A mutating request the control plane accepts asynchronously yields an
//! [`OperationHandle`]. A poller drives the handle through
//! [`OperationState`] until it settles into a [`TerminalState`]; the settled
//! [`Completion`] is stored on the handle so awaiting it again costs nothing.

use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// Observed state of a remote operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationState {
    Pending,
    Succeeded,
    Failed,
    Canceled,
    /// The local wait gave up; the remote operation may still finish
    TimedOut,
}

impl OperationState {
    /// Parse a remote status string, case-insensitively.
    ///
    /// Anything that is not a known terminal value (`InProgress`, `Creating`,
    /// `Updating`, `Deleting`, ...) counts as pending.
    pub fn parse(status: &str) -> Self {
        match status.trim().to_ascii_lowercase().as_str() {
            "succeeded" => OperationState::Succeeded,
            "failed" => OperationState::Failed,
            "canceled" | "cancelled" => OperationState::Canceled,
            _ => OperationState::Pending,
        }
    }

    /// Read the state from an operation or resource body
    ///
    /// Looks at `status`, then `properties.provisioningState`, then
    /// `properties.status`.
    pub fn from_body(body: &Value) -> Option<Self> {
        status_field(body).map(Self::parse)
    }

    pub fn terminal(&self) -> Option<TerminalState> {
        match self {
            OperationState::Succeeded => Some(TerminalState::Succeeded),
            OperationState::Failed => Some(TerminalState::Failed),
            OperationState::Canceled => Some(TerminalState::Canceled),
            OperationState::Pending | OperationState::TimedOut => None,
        }
    }
}

fn status_field(body: &Value) -> Option<&str> {
    body.get("status")
        .and_then(Value::as_str)
        .or_else(|| body.pointer("/properties/provisioningState").and_then(Value::as_str))
        .or_else(|| body.pointer("/properties/status").and_then(Value::as_str))
}

/// Whether a `provisioningState` means the resource is settled
pub fn is_settled_provisioning_state(state: &str) -> bool {
    OperationState::parse(state) != OperationState::Pending
}

/// Final state of a remote operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalState {
    Succeeded,
    Failed,
    Canceled,
}

impl std::fmt::Display for TerminalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TerminalState::Succeeded => write!(f, "Succeeded"),
            TerminalState::Failed => write!(f, "Failed"),
            TerminalState::Canceled => write!(f, "Canceled"),
        }
    }
}

/// How to interpret responses from the handle's poll URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HandleKind {
    /// `Azure-AsyncOperation` status monitor; the body carries `status`
    AsyncOperation,
    /// `Location` monitor; 202 while running, 200/201/204 when done
    Location,
    /// The resource itself; its `provisioningState` is the status
    Resource,
}

/// Settled outcome of an operation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Completion {
    pub state: TerminalState,
    /// Last body returned by the poll URL
    pub body: Value,
}

impl Completion {
    pub fn is_success(&self) -> bool {
        self.state == TerminalState::Succeeded
    }

    /// Remote error detail of a failed or canceled operation
    pub fn error(&self) -> Option<&Value> {
        self.body
            .get("error")
            .or_else(|| self.body.pointer("/properties/error"))
            .filter(|v| !v.is_null())
    }

    /// Human-readable failure message
    pub fn message(&self) -> String {
        self.error()
            .and_then(|e| e.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("operation finished as {}", self.state))
    }
}

/// Reference to an in-flight remote operation
#[derive(Debug, Clone)]
pub struct OperationHandle {
    pub poll_url: String,
    pub kind: HandleKind,
    /// A 404 from the poll URL means the operation succeeded (deletes)
    pub expect_gone: bool,
    /// Server-suggested delay before the first poll
    pub retry_after: Option<Duration>,
    settled: Arc<OnceLock<Completion>>,
}

impl OperationHandle {
    pub fn new(poll_url: impl Into<String>, kind: HandleKind) -> Self {
        Self {
            poll_url: poll_url.into(),
            kind,
            expect_gone: false,
            retry_after: None,
            settled: Arc::new(OnceLock::new()),
        }
    }

    pub fn expecting_gone(mut self) -> Self {
        self.expect_gone = true;
        self
    }

    pub fn with_retry_after(mut self, retry_after: Option<Duration>) -> Self {
        self.retry_after = retry_after;
        self
    }

    /// Completion recorded by an earlier wait
    pub fn settled(&self) -> Option<&Completion> {
        self.settled.get()
    }

    /// Record the terminal completion; the first one recorded wins
    pub fn settle(&self, completion: Completion) -> Completion {
        self.settled.get_or_init(|| completion).clone()
    }
}
