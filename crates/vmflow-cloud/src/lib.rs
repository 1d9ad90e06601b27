//! vmflow cloud model
//!
//! Provider-neutral half of vmflow: the deployment request, the resource
//! graph planner, plan and result types, the long-running operation model
//! and the retry/poll policies. Nothing here performs I/O; the Azure
//! Resource Manager adapter lives in `vmflow-cloud-azure`.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │            vmflow CLI / MCP server           │
//! └──────────────────────┬───────────────────────┘
//!                        │ DeploymentRequest
//! ┌──────────────────────▼───────────────────────┐
//! │                 vmflow-cloud                 │
//! │   planner ──> ProvisioningPlan               │
//! │   PlanResult <── PlanRecorder                │
//! │   OperationHandle / RetryConfig / ListQuery  │
//! └──────────────────────┬───────────────────────┘
//!                        │
//! ┌──────────────────────▼───────────────────────┐
//! │              vmflow-cloud-azure              │
//! │  credential · client · poller · provisioner  │
//! └──────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod lro;
pub mod plan;
pub mod planner;
pub mod query;
pub mod request;
pub mod result;
pub mod retry;

// Re-exports
pub use error::{CloudError, ErrorKind, Result, StepError};
pub use lro::{Completion, HandleKind, OperationHandle, OperationState, TerminalState};
pub use plan::{
    Guardrail, NetworkInterfaceSpec, PlanSummary, ProvisioningPlan, PublicIpSpec, ResourceSpec,
    Step, StepAction, StepRef, VirtualMachineSpec, VirtualNetworkSpec,
};
pub use planner::plan;
pub use query::{ListQuery, Listable, Listing};
pub use request::{
    DeploymentRequest, DiskSpec, ImageReference, NetworkSpec, OsCredentials, PublicIpChoice,
    ResourceKind, ResourceReference,
};
pub use result::{PlanOperation, PlanRecorder, PlanResult, PlanStatus, StepResult, StepStatus};
pub use retry::{PollConfig, RetryConfig};
