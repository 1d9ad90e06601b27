//! Azure Resource Manager adapter for vmflow
//!
//! Turns the provider-neutral plans of `vmflow-cloud` into REST calls
//! against Azure Resource Manager.
//!
//! # Components
//!
//! - [`CredentialManager`]: client-credentials token exchange with a shared,
//!   single-flight cache
//! - [`ArmClient`]: authenticated transport with retries, response
//!   classification and pagination
//! - [`LroPoller`]: waits for long-running operations under a deadline
//! - [`Provisioner`]: executes plans, deletes resources, deploys templates
//! - [`Discovery`]: read-only catalog and VM inspection
//!
//! # Example
//!
//! ```ignore
//! use vmflow_cloud::{DeploymentRequest, Guardrail};
//! use vmflow_cloud_azure::{AzureConfig, AzureSession, ClientCredentials};
//!
//! let config = AzureConfig::new(credentials, "0000-subscription")
//!     .with_guardrail(Guardrail::enabled());
//! let azure = AzureSession::connect(config)?;
//!
//! let request = DeploymentRequest::new("vm01", "rg-demo", "eastasia", "azureuser", Some(password));
//! let result = azure.provisioner.provision(&request).await?;
//! println!("{}", result.status());
//! ```

pub mod client;
pub mod credential;
pub mod discovery;
pub mod error;
pub mod http;
pub mod payload;
pub mod poller;
pub mod provisioner;
pub mod session;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use client::{ArmClient, ArmResponse, Outcome, Page};
pub use credential::{AccessToken, ClientCredentials, CredentialManager};
pub use discovery::{
    CatalogEntry, CatalogLevel, Discovery, DiskType, Location, VmPage, VmSize, VmStatus,
    VmSummary,
};
pub use error::BackendError;
pub use http::{HttpBackend, HttpRequest, HttpResponse, Method, ReqwestBackend};
pub use poller::LroPoller;
pub use provisioner::{DeploymentMode, Provisioner};
pub use session::{AzureConfig, AzureSession};
