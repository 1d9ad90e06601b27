//! Azure Resource Manager transport client
//!
//! Attaches the bearer token, retries transient failures and classifies every
//! response as completed, accepted (with an [`OperationHandle`] to poll) or
//! rejected.

use crate::credential::CredentialManager;
use crate::error::Result;
use crate::http::{HttpBackend, HttpRequest, HttpResponse, Method};
use futures_util::stream::{self, Stream, TryStreamExt};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use vmflow_cloud::lro::is_settled_provisioning_state;
use vmflow_cloud::{CloudError, HandleKind, OperationHandle, RetryConfig};

pub const DEFAULT_MANAGEMENT_ENDPOINT: &str = "https://management.azure.com";
pub const DEFAULT_MAX_PAGES: usize = 100;

/// Successful (or tolerated) response
#[derive(Debug, Clone)]
pub struct ArmResponse {
    pub status: u16,
    pub url: String,
    pub body: Value,
    pub retry_after: Option<Duration>,
    /// `Azure-AsyncOperation` header
    pub async_operation: Option<String>,
    /// `Location` header
    pub location: Option<String>,
}

/// Classified result of a request
#[derive(Debug, Clone)]
pub enum Outcome {
    Completed(ArmResponse),
    /// Accepted for asynchronous processing
    Accepted(ArmResponse, OperationHandle),
}

impl Outcome {
    pub fn response(&self) -> &ArmResponse {
        match self {
            Outcome::Completed(response) | Outcome::Accepted(response, _) => response,
        }
    }
}

/// One page of a collection
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub items: Vec<Value>,
    pub next_link: Option<String>,
}

pub struct ArmClient {
    backend: Arc<dyn HttpBackend>,
    credentials: Arc<CredentialManager>,
    endpoint: String,
    subscription_id: String,
    retry: RetryConfig,
    max_pages: usize,
}

struct Failure {
    status: Option<u16>,
    message: String,
    retry_after: Option<Duration>,
}

impl ArmClient {
    pub fn new(
        backend: Arc<dyn HttpBackend>,
        credentials: Arc<CredentialManager>,
        subscription_id: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            credentials,
            endpoint: DEFAULT_MANAGEMENT_ENDPOINT.to_string(),
            subscription_id: subscription_id.into(),
            retry: RetryConfig::default(),
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    /// Absolute URL for a path; absolute URLs (next links, poll URLs) pass through
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("https://") || path.starts_with("http://") {
            path.to_string()
        } else {
            format!("{}{}", self.endpoint, path)
        }
    }

    /// `/subscriptions/{id}` followed by `suffix`
    pub fn subscription_path(&self, suffix: &str) -> String {
        format!("/subscriptions/{}{}", self.subscription_id, suffix)
    }

    /// Send a request and classify the response
    pub async fn request(&self, method: Method, path: &str, body: Option<Value>) -> Result<Outcome> {
        let response = self.send(method, path, body, false).await?;
        Ok(classify(method, response))
    }

    /// GET a single resource body
    pub async fn get(&self, path: &str) -> Result<Value> {
        Ok(self.send(Method::Get, path, None, false).await?.body)
    }

    /// GET that returns a 404 as a response instead of an error
    pub async fn probe(&self, url: &str) -> Result<ArmResponse> {
        self.send(Method::Get, url, None, true).await
    }

    /// Fetch one page of a collection
    pub async fn list_page(&self, path: &str) -> Result<Page> {
        let body = self.get(path).await?;
        let next_link = ["nextLink", "odata.nextLink", "@odata.nextLink"]
            .iter()
            .find_map(|key| body.get(*key).and_then(Value::as_str))
            .filter(|link| !link.is_empty())
            .map(str::to_string);
        let items = match body {
            Value::Array(items) => items,
            Value::Object(mut map) => match map.remove("value") {
                Some(Value::Array(items)) => items,
                _ => Vec::new(),
            },
            _ => {
                return Err(CloudError::InvalidResponse(format!(
                    "expected a collection from {}",
                    path
                )));
            }
        };
        Ok(Page { items, next_link })
    }

    /// Lazily stream every item of a collection, following next links.
    ///
    /// Each call starts again from the first page. The stream ends on a
    /// repeated link or after the page limit.
    pub fn list_all(&self, path: impl Into<String>) -> impl Stream<Item = Result<Value>> + '_ {
        let cursor = PageCursor {
            next: Some(path.into()),
            seen: HashSet::new(),
            pages: 0,
        };
        stream::try_unfold(cursor, move |cursor| self.next_page(cursor))
            .map_ok(|items| stream::iter(items.into_iter().map(Ok::<Value, CloudError>)))
            .try_flatten()
    }

    async fn next_page(&self, mut cursor: PageCursor) -> Result<Option<(Vec<Value>, PageCursor)>> {
        let Some(link) = cursor.next.take() else {
            return Ok(None);
        };
        if cursor.pages >= self.max_pages {
            tracing::warn!("Stopping pagination after {} pages", cursor.pages);
            return Ok(None);
        }
        if !cursor.seen.insert(link.clone()) {
            tracing::warn!("Stopping pagination on repeated next link");
            return Ok(None);
        }
        cursor.pages += 1;
        let page = self.list_page(&link).await?;
        cursor.next = page.next_link;
        Ok(Some((page.items, cursor)))
    }

    /// Collect every item of a collection
    pub async fn collect_all(&self, path: impl Into<String>) -> Result<Vec<Value>> {
        self.list_all(path).try_collect().await
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        allow_not_found: bool,
    ) -> Result<ArmResponse> {
        let url = self.url(path);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let token = self.credentials.get_token().await?;
            let request = HttpRequest::new(method, &url)
                .bearer(token.secret())
                .json(body.clone());
            tracing::debug!("{} {}", method, url);

            let failure = match self.backend.send(request).await {
                Ok(response)
                    if response.is_success() || (allow_not_found && response.status == 404) =>
                {
                    return Ok(ArmResponse {
                        status: response.status,
                        retry_after: response.retry_after(),
                        async_operation: response.header("azure-asyncoperation").map(str::to_string),
                        location: response.header("location").map(str::to_string),
                        body: response.json(),
                        url,
                    });
                }
                Ok(response) if matches!(response.status, 408 | 429) || response.status >= 500 => {
                    Failure {
                        status: Some(response.status),
                        message: error_message(&response),
                        retry_after: response.retry_after(),
                    }
                }
                Ok(response) => {
                    if response.status == 401 {
                        self.credentials.invalidate_rejected(&token).await;
                    }
                    return Err(rejection(&response));
                }
                Err(err) if err.is_transient() => Failure {
                    status: None,
                    message: err.to_string(),
                    retry_after: None,
                },
                Err(err) => {
                    return Err(CloudError::TransientTransport {
                        status: None,
                        attempts: attempt,
                        message: err.to_string(),
                    });
                }
            };

            // a mutating request is only safe to repeat when it was refused before processing
            let retryable = !method.is_mutating() || failure.status == Some(429);
            if !retryable || attempt >= self.retry.max_attempts {
                return Err(CloudError::TransientTransport {
                    status: failure.status,
                    attempts: attempt,
                    message: failure.message,
                });
            }

            let delay = self.retry.next_delay(attempt - 1, failure.retry_after);
            tracing::warn!(
                "{} {} failed ({}), retrying in {:?} (attempt {}/{})",
                method,
                url,
                failure.message,
                delay,
                attempt,
                self.retry.max_attempts
            );
            tokio::time::sleep(delay).await;
        }
    }
}

struct PageCursor {
    next: Option<String>,
    seen: HashSet<String>,
    pages: usize,
}

fn classify(method: Method, response: ArmResponse) -> Outcome {
    if !method.is_mutating() {
        return Outcome::Completed(response);
    }

    let provisioning = response
        .body
        .pointer("/properties/provisioningState")
        .and_then(Value::as_str);
    let in_progress = match provisioning {
        Some(state) => response.status == 202 || !is_settled_provisioning_state(state),
        None => response.status == 202 || response.async_operation.is_some(),
    };
    if !in_progress {
        return Outcome::Completed(response);
    }

    let handle = if let Some(url) = &response.async_operation {
        OperationHandle::new(url, HandleKind::AsyncOperation)
    } else if let Some(url) = &response.location {
        OperationHandle::new(url, HandleKind::Location)
    } else {
        OperationHandle::new(&response.url, HandleKind::Resource)
    }
    .with_retry_after(response.retry_after);
    tracing::debug!("{} accepted, polling {:?} {}", response.url, handle.kind, handle.poll_url);
    Outcome::Accepted(response, handle)
}

fn error_message(response: &HttpResponse) -> String {
    let body = response.json();
    body.pointer("/error/message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP {}", response.status))
}

fn rejection(response: &HttpResponse) -> CloudError {
    let body = response.json();
    CloudError::RequestRejected {
        status: response.status,
        code: body
            .pointer("/error/code")
            .and_then(Value::as_str)
            .map(str::to_string),
        message: error_message(response),
        body,
    }
}
