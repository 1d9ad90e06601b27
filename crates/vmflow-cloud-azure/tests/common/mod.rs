#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;
use vmflow_cloud::{Guardrail, PollConfig, RetryConfig};
use vmflow_cloud_azure::testing::ScriptedBackend;
use vmflow_cloud_azure::{AzureConfig, AzureSession, ClientCredentials};

pub const SUB: &str = "00000000-0000-0000-0000-000000000001";
pub const RG: &str = "rg-demo";

pub fn rg_id(provider: &str, name: &str) -> String {
    format!("/subscriptions/{}/resourceGroups/{}/providers/{}/{}", SUB, RG, provider, name)
}

pub fn config(guardrail: Guardrail) -> AzureConfig {
    let mut config = AzureConfig::new(
        ClientCredentials {
            tenant_id: "tenant-1".into(),
            client_id: "client-1".into(),
            client_secret: "client-secret-value".into(),
        },
        SUB,
    )
    .with_guardrail(guardrail)
    .with_poll(PollConfig {
        timeout: Duration::from_secs(120),
        interval: Duration::from_secs(1),
        max_interval: Duration::from_secs(10),
        multiplier: 2.0,
    });
    config.retry = RetryConfig {
        jitter: false,
        ..RetryConfig::default()
    };
    config
}

/// Session over a scripted backend that already answers token requests
pub fn session(guardrail: Guardrail) -> (Arc<ScriptedBackend>, AzureSession) {
    let backend = Arc::new(ScriptedBackend::new());
    backend.with_token("test-token", 3600);
    let session = AzureSession::with_backend(backend.clone(), config(guardrail));
    (backend, session)
}
