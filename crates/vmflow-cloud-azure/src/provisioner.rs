//! Provisioning orchestrator
//!
//! Executes a [`ProvisioningPlan`] strictly in order against Azure Resource
//! Manager. Each step either validates an existing resource or creates one
//! and waits for its long-running operation. The first failure stops the run;
//! later steps are reported as not attempted and nothing is rolled back.

use crate::client::{ArmClient, Outcome};
use crate::error::Result;
use crate::http::Method;
use crate::payload::{self, DEPLOYMENT_API_VERSION};
use crate::poller::LroPoller;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use vmflow_cloud::{
    CloudError, Completion, DeploymentRequest, ErrorKind, Guardrail, HandleKind, PlanOperation,
    PlanRecorder, PlanResult, PollConfig, ProvisioningPlan, ResourceKind, ResourceReference,
    ResourceSpec, Step, StepAction, StepError, StepStatus, TerminalState,
};

/// Template deployment mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeploymentMode {
    #[default]
    Incremental,
    Complete,
}

impl DeploymentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentMode::Incremental => "Incremental",
            DeploymentMode::Complete => "Complete",
        }
    }
}

/// Why a step stopped the run
struct StepFailure {
    status: StepStatus,
    resource_id: Option<String>,
    error: StepError,
}

impl StepFailure {
    fn from_error(err: CloudError, resource_id: Option<String>) -> Self {
        let status = match err {
            CloudError::PollTimeout { .. } => StepStatus::TimedOut,
            _ => StepStatus::Failed,
        };
        Self {
            status,
            resource_id,
            error: err.diagnostic(),
        }
    }

    fn from_completion(completion: &Completion, resource_id: String) -> Self {
        let (status, kind) = match completion.state {
            TerminalState::Canceled => (StepStatus::Canceled, ErrorKind::OperationCanceled),
            _ => (StepStatus::Failed, ErrorKind::OperationFailed),
        };
        let mut error = StepError::new(kind, completion.message());
        if let Some(detail) = completion.error() {
            error.code = detail.get("code").and_then(Value::as_str).map(str::to_string);
            error = error.with_remote(detail.clone());
        }
        Self {
            status,
            resource_id: Some(resource_id),
            error,
        }
    }
}

pub struct Provisioner {
    client: Arc<ArmClient>,
    poller: LroPoller,
    guardrail: Guardrail,
    poll: PollConfig,
}

impl Provisioner {
    pub fn new(client: Arc<ArmClient>, guardrail: Guardrail) -> Self {
        Self {
            poller: LroPoller::new(client.clone()),
            client,
            guardrail,
            poll: PollConfig::default(),
        }
    }

    pub fn with_poll_config(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    pub fn guardrail(&self) -> Guardrail {
        self.guardrail
    }

    /// Plan and execute a deployment request
    pub async fn provision(&self, request: &DeploymentRequest) -> Result<PlanResult> {
        let plan = vmflow_cloud::plan(request)?;
        self.execute(&plan).await
    }

    /// Execute `plan` step by step.
    ///
    /// Returns `Err` only when the guardrail refuses the plan; remote
    /// failures are reported inside the [`PlanResult`].
    pub async fn execute(&self, plan: &ProvisioningPlan) -> Result<PlanResult> {
        self.guardrail.check_plan(plan)?;
        tracing::info!(
            "Executing plan for {} in {} ({})",
            plan.target,
            plan.resource_group,
            plan.summary()
        );

        let mut recorder = PlanRecorder::for_plan(plan);
        let mut outputs: Vec<String> = Vec::with_capacity(plan.len());

        for step in plan.steps() {
            match self.run_step(plan, step, &outputs).await {
                Ok(resource_id) => {
                    if step.is_create() {
                        recorder.succeeded(resource_id.clone());
                    } else {
                        recorder.existing(resource_id.clone());
                    }
                    outputs.push(resource_id);
                }
                Err(failure) => {
                    tracing::warn!(
                        "Step {} ({}) failed: {}",
                        step.index,
                        step.description(),
                        failure.error.message
                    );
                    recorder.failed(failure.status, failure.resource_id, failure.error);
                    break;
                }
            }
        }

        let result = recorder.finish();
        tracing::info!("Plan for {} {}", plan.target, result.status());
        Ok(result)
    }

    async fn run_step(
        &self,
        plan: &ProvisioningPlan,
        step: &Step,
        outputs: &[String],
    ) -> std::result::Result<String, StepFailure> {
        match &step.action {
            StepAction::UseExisting(reference) => self
                .validate_existing(reference)
                .await
                .map_err(|e| StepFailure::from_error(e, Some(reference.to_string()))),
            StepAction::Create(spec) => self.create(plan, step, spec, outputs).await,
        }
    }

    async fn validate_existing(&self, reference: &ResourceReference) -> Result<String> {
        let version = payload::api_version_for(reference)?;
        tracing::debug!("Validating existing resource {}", reference);
        self.client
            .get(&payload::resource_path(reference.as_str(), version))
            .await?;
        Ok(reference.to_string())
    }

    async fn create(
        &self,
        plan: &ProvisioningPlan,
        step: &Step,
        spec: &ResourceSpec,
        outputs: &[String],
    ) -> std::result::Result<String, StepFailure> {
        let id = payload::resource_id(
            self.client.subscription_id(),
            &plan.resource_group,
            step.kind,
            &step.name,
        );
        let (_, version) = payload::provider_type(step.kind);
        let fail = |e: CloudError| StepFailure::from_error(e, Some(id.clone()));

        let body = payload::build_body(&step.name, spec, outputs).map_err(fail)?;
        tracing::info!("Creating {} {}", step.kind, step.name);
        let outcome = self
            .client
            .request(Method::Put, &payload::resource_path(&id, version), Some(body))
            .await
            .map_err(fail)?;
        self.settle(outcome).await.map_err(|failure| match failure {
            Settled::Error(e) => fail(e),
            Settled::Remote(completion) => StepFailure::from_completion(&completion, id.clone()),
        })?;

        // the NIC attaches to the subnet, not the virtual network
        Ok(match spec {
            ResourceSpec::VirtualNetwork(vnet) => format!("{}/subnets/{}", id, vnet.subnet_name),
            _ => id,
        })
    }

    /// Wait for an outcome to finish; `Err` carries what went wrong
    async fn settle(&self, outcome: Outcome) -> std::result::Result<(), Settled> {
        let completion = match outcome {
            Outcome::Completed(response) => Completion {
                state: provisioning_state(&response.body),
                body: response.body,
            },
            Outcome::Accepted(_, handle) => self
                .poller
                .wait(&handle, &self.poll)
                .await
                .map_err(Settled::Error)?,
        };
        if completion.is_success() {
            Ok(())
        } else {
            Err(Settled::Remote(completion))
        }
    }

    /// Whether a conflicting delete of `reference` can be forced
    pub fn supports_forced_delete(reference: &ResourceReference) -> bool {
        payload::kind_of(reference) == Some(ResourceKind::VirtualMachine)
    }

    /// Delete a resource and wait until it is gone.
    ///
    /// A 409 conflict on a virtual machine is retried once with
    /// `forceDeletion=true` when `force` is set. Other kinds ignore `force`.
    pub async fn delete_resource(
        &self,
        reference: &ResourceReference,
        force: bool,
    ) -> Result<PlanResult> {
        let kind = payload::kind_of(reference).ok_or_else(|| {
            CloudError::Planning(format!(
                "deleting {} resources is not supported",
                reference.resource_type()
            ))
        })?;
        self.guardrail.check(&format!("Deleting {}", reference))?;
        if force && kind != ResourceKind::VirtualMachine {
            tracing::warn!("forceDeletion is not supported for {}, deleting without it", kind);
        }

        let mut recorder = PlanRecorder::single(PlanOperation::Delete, kind, reference.name());
        let attempt = match self.delete_once(reference, false).await {
            Err(Settled::Error(err))
                if err.is_conflict() && force && kind == ResourceKind::VirtualMachine =>
            {
                tracing::warn!("Delete of {} conflicted, retrying with forceDeletion", reference);
                self.delete_once(reference, true).await
            }
            other => other,
        };

        match attempt {
            Ok(()) => recorder.succeeded(reference.to_string()),
            Err(Settled::Error(err)) => {
                let failure = StepFailure::from_error(err, Some(reference.to_string()));
                recorder.failed(failure.status, failure.resource_id, failure.error);
            }
            Err(Settled::Remote(completion)) => {
                let failure = StepFailure::from_completion(&completion, reference.to_string());
                recorder.failed(failure.status, failure.resource_id, failure.error);
            }
        }
        Ok(recorder.finish())
    }

    async fn delete_once(
        &self,
        reference: &ResourceReference,
        force: bool,
    ) -> std::result::Result<(), Settled> {
        let version = payload::api_version_for(reference).map_err(Settled::Error)?;
        let mut path = payload::resource_path(reference.as_str(), version);
        if force {
            path.push_str("&forceDeletion=true");
        }
        tracing::info!("Deleting {}", reference);

        match self.client.request(Method::Delete, &path, None).await {
            Ok(Outcome::Accepted(response, handle)) => {
                let handle = if handle.kind == HandleKind::Resource {
                    handle.expecting_gone()
                } else {
                    handle
                };
                self.settle(Outcome::Accepted(response, handle)).await
            }
            Ok(outcome @ Outcome::Completed(_)) => self.settle(outcome).await,
            Err(CloudError::RequestRejected { status: 404, .. }) => {
                tracing::info!("{} is already absent", reference);
                Ok(())
            }
            Err(err) => Err(Settled::Error(err)),
        }
    }

    /// Delete a virtual machine by name
    pub async fn delete_vm(
        &self,
        resource_group: &str,
        vm_name: &str,
        force: bool,
    ) -> Result<PlanResult> {
        let id = payload::resource_id(
            self.client.subscription_id(),
            resource_group,
            ResourceKind::VirtualMachine,
            vm_name,
        );
        self.delete_resource(&ResourceReference::parse(id)?, force)
            .await
    }

    /// Deploy an ARM template into `resource_group` and wait for it
    pub async fn deploy_template(
        &self,
        resource_group: &str,
        name: &str,
        template: &Value,
        parameters: &Value,
        mode: DeploymentMode,
    ) -> Result<PlanResult> {
        if !template.is_object() {
            return Err(CloudError::Planning(
                "template must be a JSON object".to_string(),
            ));
        }
        if !(parameters.is_object() || parameters.is_null()) {
            return Err(CloudError::Planning(
                "parameters must be a JSON object".to_string(),
            ));
        }
        self.guardrail.check(&format!("Deploying template {}", name))?;

        let id = self.deployment_id(resource_group, name)?;
        let mut recorder =
            PlanRecorder::single(PlanOperation::Template, ResourceKind::Deployment, name);
        let body = payload::deployment_body(template, parameters, mode.as_str());
        tracing::info!("Deploying template {} into {} ({})", name, resource_group, mode.as_str());

        let settled = match self
            .client
            .request(
                Method::Put,
                &payload::resource_path(id.as_str(), DEPLOYMENT_API_VERSION),
                Some(body),
            )
            .await
        {
            Ok(outcome) => self.settle(outcome).await,
            Err(err) => Err(Settled::Error(err)),
        };
        self.record(&mut recorder, settled, id.to_string());
        Ok(recorder.finish())
    }

    /// Delete a deployment record; the resources it deployed are kept
    pub async fn delete_deployment(&self, resource_group: &str, name: &str) -> Result<PlanResult> {
        let id = self.deployment_id(resource_group, name)?;
        self.guardrail.check(&format!("Deleting deployment {}", name))?;

        let mut recorder =
            PlanRecorder::single(PlanOperation::Delete, ResourceKind::Deployment, name);
        let settled = self.delete_once(&id, false).await;
        self.record(&mut recorder, settled, id.to_string());
        Ok(recorder.finish())
    }

    fn deployment_id(&self, resource_group: &str, name: &str) -> Result<ResourceReference> {
        if name.trim().is_empty() || resource_group.trim().is_empty() {
            return Err(CloudError::Planning(
                "resource group and deployment name are required".to_string(),
            ));
        }
        ResourceReference::parse(payload::resource_id(
            self.client.subscription_id(),
            resource_group,
            ResourceKind::Deployment,
            name,
        ))
    }

    fn record(
        &self,
        recorder: &mut PlanRecorder,
        settled: std::result::Result<(), Settled>,
        id: String,
    ) {
        let failure = match settled {
            Ok(()) => {
                recorder.succeeded(id);
                return;
            }
            Err(Settled::Error(err)) => StepFailure::from_error(err, Some(id)),
            Err(Settled::Remote(completion)) => StepFailure::from_completion(&completion, id),
        };
        recorder.failed(failure.status, failure.resource_id, failure.error);
    }
}

enum Settled {
    /// Local or transport error
    Error(CloudError),
    /// The remote operation ended as failed or canceled
    Remote(Completion),
}

/// Terminal state of a synchronously completed response
fn provisioning_state(body: &Value) -> TerminalState {
    vmflow_cloud::OperationState::from_body(body)
        .and_then(|s| s.terminal())
        .unwrap_or(TerminalState::Succeeded)
}
