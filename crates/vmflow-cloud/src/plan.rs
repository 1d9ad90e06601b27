//! Provisioning plan types

use crate::error::{CloudError, Result};
use crate::request::{DiskSpec, ImageReference, OsCredentials, ResourceKind, ResourceReference};
use serde::{Deserialize, Serialize};

/// Index of an earlier step whose output a later step consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepRef(pub usize);

/// Desired specification of a resource to create, one record per kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceSpec {
    PublicIp(PublicIpSpec),
    VirtualNetwork(VirtualNetworkSpec),
    NetworkInterface(NetworkInterfaceSpec),
    VirtualMachine(VirtualMachineSpec),
}

impl ResourceSpec {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceSpec::PublicIp(_) => ResourceKind::PublicIp,
            ResourceSpec::VirtualNetwork(_) => ResourceKind::VirtualNetwork,
            ResourceSpec::NetworkInterface(_) => ResourceKind::NetworkInterface,
            ResourceSpec::VirtualMachine(_) => ResourceKind::VirtualMachine,
        }
    }

    /// Steps this specification reads outputs from
    pub fn dependencies(&self) -> Vec<StepRef> {
        match self {
            ResourceSpec::PublicIp(_) | ResourceSpec::VirtualNetwork(_) => Vec::new(),
            ResourceSpec::NetworkInterface(nic) => {
                let mut deps = vec![nic.subnet];
                deps.extend(nic.public_ip);
                deps
            }
            ResourceSpec::VirtualMachine(vm) => vec![vm.nic],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicIpSpec {
    pub location: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualNetworkSpec {
    pub location: String,
    pub address_space: String,
    pub subnet_name: String,
    pub subnet_prefix: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkInterfaceSpec {
    pub location: String,
    /// Step yielding the subnet id
    pub subnet: StepRef,
    /// Step yielding the public IP id
    pub public_ip: Option<StepRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualMachineSpec {
    pub location: String,
    pub size: String,
    pub image: ImageReference,
    pub os_disk: DiskSpec,
    pub os_disk_name: String,
    pub admin: OsCredentials,
    /// Step yielding the NIC id
    pub nic: StepRef,
}

/// What executing a step does
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepAction {
    /// Create or update the resource
    Create(ResourceSpec),
    /// Reuse an existing resource; only validated at execution time
    UseExisting(ResourceReference),
}

/// A single planned resource operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub index: usize,
    pub kind: ResourceKind,
    /// Resource name (the reference's last segment for existing resources)
    pub name: String,
    pub action: StepAction,
    pub depends_on: Vec<StepRef>,
}

impl Step {
    pub fn is_create(&self) -> bool {
        matches!(self.action, StepAction::Create(_))
    }

    pub fn description(&self) -> String {
        match &self.action {
            StepAction::Create(_) => format!("create {} {}", self.kind, self.name),
            StepAction::UseExisting(reference) => {
                format!("use existing {} {}", self.kind, reference)
            }
        }
    }
}

/// Ordered, read-only sequence of dependent steps for one deployment request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProvisioningPlan {
    /// Name of the VM the plan deploys
    pub target: String,
    pub resource_group: String,
    steps: Vec<Step>,
}

impl ProvisioningPlan {
    /// Build a plan, rejecting steps that consume outputs of themselves or later steps
    pub fn new(
        target: impl Into<String>,
        resource_group: impl Into<String>,
        steps: Vec<Step>,
    ) -> Result<Self> {
        for (position, step) in steps.iter().enumerate() {
            if step.index != position {
                return Err(CloudError::Planning(format!(
                    "step {} is stored at position {}",
                    step.index, position
                )));
            }
            if let Some(bad) = step.depends_on.iter().find(|d| d.0 >= position) {
                return Err(CloudError::Planning(format!(
                    "step {} ({}) depends on step {} which does not precede it",
                    position, step.kind, bad.0
                )));
            }
        }
        Ok(Self {
            target: target.into(),
            resource_group: resource_group.into(),
            steps,
        })
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Whether any step creates or updates a remote resource
    pub fn creates_resources(&self) -> bool {
        self.steps.iter().any(Step::is_create)
    }

    pub fn kinds(&self) -> Vec<ResourceKind> {
        self.steps.iter().map(|s| s.kind).collect()
    }

    pub fn summary(&self) -> PlanSummary {
        let create = self.steps.iter().filter(|s| s.is_create()).count();
        PlanSummary {
            create,
            existing: self.steps.len() - create,
        }
    }
}

/// Summary of planned steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlanSummary {
    pub create: usize,
    pub existing: usize,
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} to create, {} existing", self.create, self.existing)
    }
}

/// Opt-in gate for resource-creating and destructive operations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Guardrail {
    enabled: bool,
}

impl Guardrail {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn enabled() -> Self {
        Self::new(true)
    }

    pub fn disabled() -> Self {
        Self::new(false)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Refuse `operation` unless mutations are enabled
    pub fn check(&self, operation: &str) -> Result<()> {
        if self.enabled {
            Ok(())
        } else {
            tracing::warn!("Refusing {} while mutations are disabled", operation);
            Err(CloudError::GuardrailDenied {
                operation: operation.to_string(),
            })
        }
    }

    /// Refuse a plan that would create anything unless mutations are enabled
    pub fn check_plan(&self, plan: &ProvisioningPlan) -> Result<()> {
        if plan.creates_resources() {
            self.check(&format!("Deploying {}", plan.target))
        } else {
            Ok(())
        }
    }
}
