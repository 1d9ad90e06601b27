//! Wiring of credentials, transport, orchestrator and discovery

use crate::client::{ArmClient, DEFAULT_MANAGEMENT_ENDPOINT};
use crate::credential::{ClientCredentials, CredentialManager, DEFAULT_LOGIN_ENDPOINT};
use crate::discovery::Discovery;
use crate::http::{HttpBackend, ReqwestBackend};
use crate::provisioner::Provisioner;
use std::sync::Arc;
use vmflow_cloud::{CloudError, Guardrail, PollConfig, Result, RetryConfig};

/// Connection settings for one subscription
#[derive(Debug, Clone)]
pub struct AzureConfig {
    pub credentials: ClientCredentials,
    pub subscription_id: String,
    pub management_endpoint: String,
    pub login_endpoint: String,
    pub guardrail: Guardrail,
    pub retry: RetryConfig,
    pub poll: PollConfig,
}

impl AzureConfig {
    pub fn new(credentials: ClientCredentials, subscription_id: impl Into<String>) -> Self {
        Self {
            credentials,
            subscription_id: subscription_id.into(),
            management_endpoint: DEFAULT_MANAGEMENT_ENDPOINT.to_string(),
            login_endpoint: DEFAULT_LOGIN_ENDPOINT.to_string(),
            guardrail: Guardrail::disabled(),
            retry: RetryConfig::default(),
            poll: PollConfig::default(),
        }
    }

    pub fn with_guardrail(mut self, guardrail: Guardrail) -> Self {
        self.guardrail = guardrail;
        self
    }

    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }
}

/// Shared handles to every Azure component
#[derive(Clone)]
pub struct AzureSession {
    pub client: Arc<ArmClient>,
    pub provisioner: Arc<Provisioner>,
    pub discovery: Arc<Discovery>,
}

impl AzureSession {
    /// Session over the real network
    pub fn connect(config: AzureConfig) -> Result<Self> {
        let backend = ReqwestBackend::new().map_err(|e| CloudError::TransientTransport {
            status: None,
            attempts: 0,
            message: e.to_string(),
        })?;
        Ok(Self::with_backend(Arc::new(backend), config))
    }

    /// Session over any HTTP backend
    pub fn with_backend(backend: Arc<dyn HttpBackend>, config: AzureConfig) -> Self {
        let credentials = Arc::new(
            CredentialManager::new(
                backend.clone(),
                config.credentials,
                &config.management_endpoint,
            )
            .with_login_endpoint(config.login_endpoint)
            .with_retry(config.retry.clone()),
        );
        let client = Arc::new(
            ArmClient::new(backend, credentials, config.subscription_id)
                .with_endpoint(config.management_endpoint)
                .with_retry(config.retry),
        );
        let provisioner = Provisioner::new(client.clone(), config.guardrail)
            .with_poll_config(config.poll);

        Self {
            discovery: Arc::new(Discovery::new(client.clone())),
            provisioner: Arc::new(provisioner),
            client,
        }
    }
}
