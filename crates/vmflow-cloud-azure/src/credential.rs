//! Service principal token acquisition
//!
//! The [`CredentialManager`] exchanges client credentials for a bearer token
//! and caches it until shortly before expiry. Readers share the cached token
//! through an `RwLock`; a refresh gate makes sure only one exchange is in
//! flight while other callers wait for its result.

use crate::error::{BackendError, Result};
use crate::http::{HttpBackend, HttpRequest, HttpResponse, Method};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use vmflow_cloud::{CloudError, RetryConfig};

pub const DEFAULT_LOGIN_ENDPOINT: &str = "https://login.microsoftonline.com";
pub const DEFAULT_SAFETY_MARGIN: Duration = Duration::from_secs(300);

/// Service principal credentials
#[derive(Clone)]
pub struct ClientCredentials {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Bearer token with its expiry
#[derive(Clone)]
pub struct AccessToken {
    value: String,
    expires_at: Instant,
}

impl AccessToken {
    pub fn new(value: impl Into<String>, expires_at: Instant) -> Self {
        Self {
            value: value.into(),
            expires_at,
        }
    }

    pub fn secret(&self) -> &str {
        &self.value
    }

    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    /// Still usable at `now` with `margin` to spare
    pub fn is_fresh(&self, now: Instant, margin: Duration) -> bool {
        now + margin < self.expires_at
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: ExpiresIn,
}

// the v2 endpoint sends a number; some proxies send a string
#[derive(Deserialize)]
#[serde(untagged)]
enum ExpiresIn {
    Number(u64),
    Text(String),
}

impl ExpiresIn {
    fn seconds(&self) -> Option<u64> {
        match self {
            ExpiresIn::Number(n) => Some(*n),
            ExpiresIn::Text(s) => s.trim().parse().ok(),
        }
    }
}

pub struct CredentialManager {
    backend: Arc<dyn HttpBackend>,
    credentials: ClientCredentials,
    login_endpoint: String,
    scope: String,
    safety_margin: Duration,
    retry: RetryConfig,
    cache: RwLock<Option<AccessToken>>,
    refresh_gate: Mutex<()>,
}

impl CredentialManager {
    /// `management_endpoint` is the resource the token is scoped to
    pub fn new(
        backend: Arc<dyn HttpBackend>,
        credentials: ClientCredentials,
        management_endpoint: &str,
    ) -> Self {
        Self {
            backend,
            credentials,
            login_endpoint: DEFAULT_LOGIN_ENDPOINT.to_string(),
            scope: format!("{}/.default", management_endpoint.trim_end_matches('/')),
            safety_margin: DEFAULT_SAFETY_MARGIN,
            retry: RetryConfig::default(),
            cache: RwLock::new(None),
            refresh_gate: Mutex::new(()),
        }
    }

    pub fn with_login_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.login_endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_safety_margin(mut self, margin: Duration) -> Self {
        self.safety_margin = margin;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// A token valid for at least the safety margin
    pub async fn get_token(&self) -> Result<AccessToken> {
        if let Some(token) = self.cached().await {
            return Ok(token);
        }

        let _gate = self.refresh_gate.lock().await;
        // another caller may have refreshed while we waited on the gate
        if let Some(token) = self.cached().await {
            return Ok(token);
        }

        let token = self.exchange().await?;
        *self.cache.write().await = Some(token.clone());
        Ok(token)
    }

    /// Forget the cached token; the next call exchanges again
    pub async fn invalidate(&self) {
        tracing::debug!("Dropping cached access token");
        *self.cache.write().await = None;
    }

    /// Forget `rejected` if it is still the cached token.
    ///
    /// A token refreshed by another caller after `rejected` was issued is kept.
    pub async fn invalidate_rejected(&self, rejected: &AccessToken) {
        let mut cache = self.cache.write().await;
        if cache.as_ref().is_some_and(|t| t.value == rejected.value) {
            tracing::debug!("Dropping rejected access token");
            *cache = None;
        }
    }

    async fn cached(&self) -> Option<AccessToken> {
        let now = Instant::now();
        self.cache
            .read()
            .await
            .as_ref()
            .filter(|t| t.is_fresh(now, self.safety_margin))
            .cloned()
    }

    fn token_url(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.login_endpoint, self.credentials.tenant_id
        )
    }

    async fn exchange(&self) -> Result<AccessToken> {
        let url = self.token_url();
        let mut attempt = 0;
        loop {
            attempt += 1;
            tracing::debug!(
                "Requesting access token for client {} (attempt {})",
                self.credentials.client_id,
                attempt
            );
            let request = HttpRequest::new(Method::Post, &url).form(vec![
                ("grant_type".to_string(), "client_credentials".to_string()),
                ("client_id".to_string(), self.credentials.client_id.clone()),
                (
                    "client_secret".to_string(),
                    self.credentials.client_secret.clone(),
                ),
                ("scope".to_string(), self.scope.clone()),
            ]);

            let (reason, retry_after) = match self.backend.send(request).await {
                Ok(response) if response.is_success() => return self.parse_token(&response),
                Ok(response) if is_retryable_status(response.status) => (
                    format!("token endpoint returned {}", response.status),
                    response.retry_after(),
                ),
                Ok(response) => return Err(rejected_exchange(&response)),
                Err(err) if err.is_transient() => (err.to_string(), None),
                Err(err) => return Err(unreachable_endpoint(&err)),
            };

            if attempt >= self.retry.max_attempts {
                return Err(CloudError::AuthFailure {
                    reason: format!("{} after {} attempt(s)", reason, attempt),
                });
            }
            let delay = self.retry.next_delay(attempt - 1, retry_after);
            tracing::warn!("Token request failed ({}), retrying in {:?}", reason, delay);
            tokio::time::sleep(delay).await;
        }
    }

    fn parse_token(&self, response: &HttpResponse) -> Result<AccessToken> {
        let parsed: TokenResponse = serde_json::from_str(&response.body).map_err(|_| {
            CloudError::AuthFailure {
                reason: "token endpoint returned an unreadable response".to_string(),
            }
        })?;
        let lifetime = parsed
            .expires_in
            .seconds()
            .map(Duration::from_secs)
            .ok_or_else(|| CloudError::AuthFailure {
                reason: "token response has no usable expires_in".to_string(),
            })?;
        tracing::info!("Obtained access token valid for {}s", lifetime.as_secs());
        Ok(AccessToken::new(parsed.access_token, Instant::now() + lifetime))
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 429) || status >= 500
}

fn rejected_exchange(response: &HttpResponse) -> CloudError {
    let body = response.json();
    let code = body.get("error").and_then(|v| v.as_str()).unwrap_or("unknown_error");
    // AADSTS descriptions identify the failure without echoing the secret
    let description = body
        .get("error_description")
        .and_then(|v| v.as_str())
        .and_then(|d| d.lines().next())
        .unwrap_or("no description");
    CloudError::AuthFailure {
        reason: format!("{} ({}): {}", code, response.status, description),
    }
}

fn unreachable_endpoint(err: &BackendError) -> CloudError {
    CloudError::AuthFailure {
        reason: format!("token endpoint unreachable: {}", err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedBackend;
    use serde_json::json;

    fn credentials() -> ClientCredentials {
        ClientCredentials {
            tenant_id: "tenant-1".into(),
            client_id: "client-1".into(),
            client_secret: "very-secret-value".into(),
        }
    }

    fn manager(backend: Arc<ScriptedBackend>) -> CredentialManager {
        CredentialManager::new(backend, credentials(), "https://management.azure.com/")
            .with_retry(RetryConfig {
                jitter: false,
                ..RetryConfig::default()
            })
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_exchange() {
        let backend = Arc::new(ScriptedBackend::new().with_latency(Duration::from_millis(200)));
        backend.with_token("tok-1", 3600);
        let manager = manager(backend.clone());

        let (a, b) = tokio::join!(manager.get_token(), manager.get_token());

        assert_eq!(a.unwrap().secret(), "tok-1");
        assert_eq!(b.unwrap().secret(), "tok-1");
        assert_eq!(backend.call_count(), 1);

        let call = &backend.calls()[0];
        assert_eq!(call.url, "https://login.microsoftonline.com/tenant-1/oauth2/v2.0/token");
        let form = call.form.clone().unwrap();
        assert!(form.contains(&("grant_type".into(), "client_credentials".into())));
        assert!(form.contains(&("scope".into(), "https://management.azure.com/.default".into())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refreshes_once_inside_safety_margin() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.with_token("tok-1", 3600).with_token("tok-2", 3600);
        let manager = manager(backend.clone());

        assert_eq!(manager.get_token().await.unwrap().secret(), "tok-1");
        tokio::time::advance(Duration::from_secs(3000)).await;
        assert_eq!(manager.get_token().await.unwrap().secret(), "tok-1");

        // 3400s elapsed: inside the 5 minute margin
        tokio::time::advance(Duration::from_secs(400)).await;
        let (a, b) = tokio::join!(manager.get_token(), manager.get_token());
        assert_eq!(a.unwrap().secret(), "tok-2");
        assert_eq!(b.unwrap().secret(), "tok-2");
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_forces_exchange() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.with_token("tok-1", 3600).with_token("tok-2", 3600);
        let manager = manager(backend.clone());

        manager.get_token().await.unwrap();
        manager.invalidate().await;
        assert_eq!(manager.get_token().await.unwrap().secret(), "tok-2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_rejection_keeps_refreshed_token() {
        let backend = Arc::new(ScriptedBackend::new());
        backend
            .with_token("tok-1", 3600)
            .with_token("tok-2", 3600)
            .with_token("tok-3", 3600);
        let manager = manager(backend.clone());

        let first = manager.get_token().await.unwrap();
        manager.invalidate_rejected(&first).await;
        let second = manager.get_token().await.unwrap();
        assert_eq!(second.secret(), "tok-2");

        // a late 401 for tok-1 must not discard tok-2
        manager.invalidate_rejected(&first).await;
        assert_eq!(manager.get_token().await.unwrap().secret(), "tok-2");
        assert_eq!(backend.call_count(), 2);

        manager.invalidate_rejected(&second).await;
        assert_eq!(manager.get_token().await.unwrap().secret(), "tok-3");
        assert_eq!(backend.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_secret_is_auth_failure_without_secret() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.on_json(
            Method::Post,
            "/oauth2/v2.0/token",
            401,
            json!({
                "error": "invalid_client",
                "error_description": "AADSTS7000215: Invalid client secret provided.\r\nTrace ID: abc"
            }),
        );
        let manager = manager(backend.clone());

        let err = manager.get_token().await.unwrap_err();
        assert!(matches!(err, CloudError::AuthFailure { .. }));
        let message = err.to_string();
        assert!(message.contains("invalid_client"));
        assert!(message.contains("AADSTS7000215"));
        assert!(!message.contains("very-secret-value"));
        assert!(!message.contains("Trace ID"));
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_endpoint_retries_then_fails() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.on_error(
            Method::Post,
            "/oauth2/v2.0/token",
            BackendError::Connect("connection refused".into()),
        );
        let manager = manager(backend.clone());

        let err = manager.get_token().await.unwrap_err();
        assert!(matches!(err, CloudError::AuthFailure { .. }));
        assert_eq!(backend.call_count(), RetryConfig::default().max_attempts as usize);
    }

    #[test]
    fn test_debug_output_is_redacted() {
        let token = AccessToken::new("eyJ-token-value", Instant::now());
        assert!(!format!("{:?}", token).contains("eyJ-token-value"));
        assert!(!format!("{:?}", credentials()).contains("very-secret-value"));
    }
}
