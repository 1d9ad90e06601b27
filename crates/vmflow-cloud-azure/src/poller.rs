//! Long-running operation poller

use crate::client::{ArmClient, ArmResponse};
use crate::error::Result;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use vmflow_cloud::{
    CloudError, Completion, HandleKind, OperationHandle, OperationState, PollConfig, TerminalState,
};

enum Observation {
    Pending(Option<Duration>),
    Done(Completion),
}

pub struct LroPoller {
    client: Arc<ArmClient>,
}

impl LroPoller {
    pub fn new(client: Arc<ArmClient>) -> Self {
        Self { client }
    }

    /// Poll `handle` until it settles or `config.timeout` elapses.
    ///
    /// Remote `Failed` and `Canceled` outcomes are returned as completions;
    /// only the local deadline produces [`CloudError::PollTimeout`]. Dropping
    /// the future stops the local wait, not the remote operation.
    pub async fn wait(&self, handle: &OperationHandle, config: &PollConfig) -> Result<Completion> {
        if let Some(completion) = handle.settled() {
            return Ok(completion.clone());
        }

        let started = Instant::now();
        let deadline = started + config.timeout;
        let mut delay = handle.retry_after.unwrap_or_else(|| config.delay_for_poll(0));
        let mut polls: u32 = 0;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            tokio::time::sleep(delay.min(remaining)).await;

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(timeout(handle, started));
            }

            polls += 1;
            let observation = match tokio::time::timeout(remaining, self.poll_once(handle)).await {
                Ok(observation) => observation?,
                Err(_) => return Err(timeout(handle, started)),
            };

            match observation {
                Observation::Done(completion) => {
                    tracing::debug!(
                        "Operation {} finished as {} after {} poll(s)",
                        handle.poll_url,
                        completion.state,
                        polls
                    );
                    return Ok(handle.settle(completion));
                }
                Observation::Pending(retry_after) => {
                    delay = retry_after.unwrap_or_else(|| config.delay_for_poll(polls));
                    tracing::debug!(
                        "Operation {} still running, next poll in {:?}",
                        handle.poll_url,
                        delay
                    );
                }
            }
        }
    }

    async fn poll_once(&self, handle: &OperationHandle) -> Result<Observation> {
        let response = self.client.probe(&handle.poll_url).await?;

        if response.status == 404 {
            if handle.expect_gone {
                return Ok(done(TerminalState::Succeeded, response.body));
            }
            return Err(CloudError::RequestRejected {
                status: 404,
                code: response
                    .body
                    .pointer("/error/code")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                message: format!("operation monitor {} no longer exists", handle.poll_url),
                body: response.body,
            });
        }

        let state = OperationState::from_body(&response.body);
        Ok(match handle.kind {
            HandleKind::AsyncOperation => observe(state, response),
            HandleKind::Location if response.status == 202 => {
                Observation::Pending(response.retry_after)
            }
            HandleKind::Location => match state.and_then(|s| s.terminal()) {
                Some(terminal) => done(terminal, response.body),
                None => done(TerminalState::Succeeded, response.body),
            },
            HandleKind::Resource if handle.expect_gone => match state.and_then(|s| s.terminal()) {
                Some(TerminalState::Succeeded) | None => Observation::Pending(response.retry_after),
                Some(terminal) => done(terminal, response.body),
            },
            HandleKind::Resource => match state {
                None => done(TerminalState::Succeeded, response.body),
                Some(_) => observe(state, response),
            },
        })
    }
}

fn observe(state: Option<OperationState>, response: ArmResponse) -> Observation {
    match state.and_then(|s| s.terminal()) {
        Some(terminal) => done(terminal, response.body),
        None => Observation::Pending(response.retry_after),
    }
}

fn done(state: TerminalState, body: Value) -> Observation {
    Observation::Done(Completion { state, body })
}

fn timeout(handle: &OperationHandle, started: Instant) -> CloudError {
    tracing::warn!("Gave up waiting for operation {}", handle.poll_url);
    CloudError::PollTimeout {
        operation: handle.poll_url.clone(),
        waited: started.elapsed(),
    }
}
