//! Execution results

use crate::error::StepError;
use crate::plan::ProvisioningPlan;
use crate::request::ResourceKind;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Instant;

/// Outcome of one step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// The remote operation completed
    Succeeded,
    /// An existing resource was validated and reused
    Existing,
    Failed,
    Canceled,
    TimedOut,
    /// Skipped because an earlier step failed
    NotAttempted,
}

impl StepStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, StepStatus::Succeeded | StepStatus::Existing)
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StepStatus::Succeeded => "succeeded",
            StepStatus::Existing => "existing",
            StepStatus::Failed => "failed",
            StepStatus::Canceled => "canceled",
            StepStatus::TimedOut => "timed out",
            StepStatus::NotAttempted => "not attempted",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepResult {
    pub step: usize,
    pub kind: ResourceKind,
    pub name: String,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<StepError>,
}

/// What an executed plan did to the remote side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanOperation {
    Provision,
    Template,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Succeeded,
    /// Some resources were created before a later step failed
    PartiallyCompleted,
    Failed,
}

impl std::fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlanStatus::Succeeded => write!(f, "succeeded"),
            PlanStatus::PartiallyCompleted => write!(f, "partially completed"),
            PlanStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Frozen outcome of executing a plan
#[derive(Debug, Clone, Serialize)]
pub struct PlanResult {
    target: String,
    operation: PlanOperation,
    status: PlanStatus,
    steps: Vec<StepResult>,
    started_at: DateTime<Utc>,
    duration_ms: u64,
}

impl PlanResult {
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn operation(&self) -> PlanOperation {
        self.operation
    }

    pub fn status(&self) -> PlanStatus {
        self.status
    }

    pub fn steps(&self) -> &[StepResult] {
        &self.steps
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    pub fn is_success(&self) -> bool {
        self.status == PlanStatus::Succeeded
    }

    /// First failed step, if any
    pub fn failure(&self) -> Option<&StepResult> {
        self.steps
            .iter()
            .find(|s| !s.status.is_ok() && s.status != StepStatus::NotAttempted)
    }

    /// Ids of resources this run created, in creation order.
    ///
    /// Nothing is rolled back automatically; callers clean up from this list.
    pub fn created_resources(&self) -> Vec<&str> {
        if self.operation == PlanOperation::Delete {
            return Vec::new();
        }
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Succeeded)
            .filter_map(|s| s.resource_id.as_deref())
            .collect()
    }

    /// Id of the resource the plan targets (the last step) once it succeeded
    pub fn primary_resource_id(&self) -> Option<&str> {
        self.steps
            .last()
            .filter(|s| s.status.is_ok())
            .and_then(|s| s.resource_id.as_deref())
    }
}

struct PendingStep {
    kind: ResourceKind,
    name: String,
}

/// Append-only builder for a [`PlanResult`]; consumed by [`PlanRecorder::finish`]
pub struct PlanRecorder {
    target: String,
    operation: PlanOperation,
    pending: Vec<PendingStep>,
    steps: Vec<StepResult>,
    started_at: DateTime<Utc>,
    clock: Instant,
}

impl PlanRecorder {
    pub fn for_plan(plan: &ProvisioningPlan) -> Self {
        let pending = plan
            .steps()
            .iter()
            .map(|s| PendingStep {
                kind: s.kind,
                name: s.name.clone(),
            })
            .collect();
        Self::with_steps(&plan.target, PlanOperation::Provision, pending)
    }

    /// Recorder for a single-step operation
    pub fn single(
        operation: PlanOperation,
        kind: ResourceKind,
        name: impl Into<String>,
    ) -> Self {
        let name = name.into();
        let pending = vec![PendingStep {
            kind,
            name: name.clone(),
        }];
        Self::with_steps(&name, operation, pending)
    }

    fn with_steps(target: &str, operation: PlanOperation, pending: Vec<PendingStep>) -> Self {
        Self {
            target: target.to_string(),
            operation,
            pending,
            steps: Vec::new(),
            started_at: Utc::now(),
            clock: Instant::now(),
        }
    }

    /// Index of the next step to record
    pub fn next_step(&self) -> usize {
        self.steps.len()
    }

    /// Record the outcome of the next step
    pub fn record(
        &mut self,
        status: StepStatus,
        resource_id: Option<String>,
        error: Option<StepError>,
    ) {
        let step = self.steps.len();
        let Some(pending) = self.pending.get(step) else {
            tracing::warn!("Ignoring result for unknown step {} of {}", step, self.target);
            return;
        };
        tracing::info!("Step {} {} {}: {}", step, pending.kind, pending.name, status);
        self.steps.push(StepResult {
            step,
            kind: pending.kind,
            name: pending.name.clone(),
            status,
            resource_id,
            error,
        });
    }

    pub fn succeeded(&mut self, resource_id: impl Into<String>) {
        self.record(StepStatus::Succeeded, Some(resource_id.into()), None);
    }

    pub fn existing(&mut self, resource_id: impl Into<String>) {
        self.record(StepStatus::Existing, Some(resource_id.into()), None);
    }

    pub fn failed(&mut self, status: StepStatus, resource_id: Option<String>, error: StepError) {
        self.record(status, resource_id, Some(error));
    }

    /// Mark unrecorded steps as not attempted and freeze the result
    pub fn finish(mut self) -> PlanResult {
        while self.steps.len() < self.pending.len() {
            let step = self.steps.len();
            let pending = &self.pending[step];
            self.steps.push(StepResult {
                step,
                kind: pending.kind,
                name: pending.name.clone(),
                status: StepStatus::NotAttempted,
                resource_id: None,
                error: None,
            });
        }

        let all_ok = self.steps.iter().all(|s| s.status.is_ok());
        let any_created = self.steps.iter().any(|s| s.status == StepStatus::Succeeded);
        let status = if all_ok {
            PlanStatus::Succeeded
        } else if any_created && self.operation != PlanOperation::Delete {
            PlanStatus::PartiallyCompleted
        } else {
            PlanStatus::Failed
        };

        PlanResult {
            target: self.target,
            operation: self.operation,
            status,
            steps: self.steps,
            started_at: self.started_at,
            duration_ms: self.clock.elapsed().as_millis() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::planner;
    use crate::request::DeploymentRequest;

    fn three_step_plan() -> ProvisioningPlan {
        let request =
            DeploymentRequest::new("vm01", "rg", "eastasia", "azureuser", Some("P@ssw0rd!23".into()));
        planner::plan(&request).unwrap()
    }

    #[test]
    fn test_all_succeeded() {
        let mut recorder = PlanRecorder::for_plan(&three_step_plan());
        recorder.succeeded("/vnet/default");
        recorder.succeeded("/nic");
        recorder.succeeded("/vm");
        let result = recorder.finish();

        assert_eq!(result.status(), PlanStatus::Succeeded);
        assert_eq!(result.created_resources(), vec!["/vnet/default", "/nic", "/vm"]);
        assert_eq!(result.primary_resource_id(), Some("/vm"));
        assert!(result.failure().is_none());
    }

    #[test]
    fn test_failure_marks_rest_not_attempted() {
        let mut recorder = PlanRecorder::for_plan(&three_step_plan());
        recorder.succeeded("/vnet/default");
        recorder.failed(
            StepStatus::Failed,
            None,
            StepError::new(ErrorKind::RequestRejected, "bad nic"),
        );
        let result = recorder.finish();

        assert_eq!(result.status(), PlanStatus::PartiallyCompleted);
        let statuses: Vec<StepStatus> = result.steps().iter().map(|s| s.status).collect();
        assert_eq!(
            statuses,
            vec![StepStatus::Succeeded, StepStatus::Failed, StepStatus::NotAttempted]
        );
        assert_eq!(result.failure().map(|s| s.step), Some(1));
        assert_eq!(result.created_resources(), vec!["/vnet/default"]);
        assert_eq!(result.primary_resource_id(), None);
    }

    #[test]
    fn test_first_step_failure_is_failed() {
        let mut recorder = PlanRecorder::for_plan(&three_step_plan());
        recorder.failed(
            StepStatus::TimedOut,
            None,
            StepError::new(ErrorKind::PollTimeout, "slow"),
        );
        assert_eq!(recorder.finish().status(), PlanStatus::Failed);
    }

    #[test]
    fn test_delete_creates_nothing() {
        let mut recorder =
            PlanRecorder::single(PlanOperation::Delete, ResourceKind::VirtualMachine, "vm01");
        recorder.succeeded("/subscriptions/s/resourceGroups/rg/providers/Microsoft.Compute/virtualMachines/vm01");
        let result = recorder.finish();

        assert!(result.is_success());
        assert!(result.created_resources().is_empty());
        assert_eq!(result.target(), "vm01");
    }

    #[test]
    fn test_serialized_shape() {
        let mut recorder =
            PlanRecorder::single(PlanOperation::Delete, ResourceKind::VirtualMachine, "vm01");
        recorder.succeeded("/vm");
        let json = serde_json::to_value(recorder.finish()).unwrap();

        assert_eq!(json["status"], "succeeded");
        assert_eq!(json["steps"][0]["status"], "succeeded");
        assert_eq!(json["steps"][0]["kind"], "virtual_machine");
        assert!(json["steps"][0].get("error").is_none());
    }
}
