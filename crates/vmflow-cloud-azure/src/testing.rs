//! Scripted HTTP backend for tests
//!
//! Routes match on method plus a URL substring, first match wins. Each route
//! replays its responses in order and keeps repeating the last one.
//! Unmatched requests get a 404 so a missing route shows up as a rejection.

use crate::error::BackendError;
use crate::http::{HttpBackend, HttpRequest, HttpResponse, Method, RequestBody};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

type Reply = std::result::Result<HttpResponse, BackendError>;

struct Route {
    method: Method,
    pattern: String,
    replies: VecDeque<Reply>,
}

/// Request observed by a [`ScriptedBackend`]
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: Method,
    pub url: String,
    pub bearer: Option<String>,
    pub body: Option<Value>,
    pub form: Option<Vec<(String, String)>>,
}

#[derive(Default)]
pub struct ScriptedBackend {
    routes: Mutex<Vec<Route>>,
    calls: Mutex<Vec<RecordedCall>>,
    latency: Option<Duration>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every reply, letting concurrent callers overlap
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn on(&self, method: Method, pattern: &str, response: HttpResponse) -> &Self {
        self.push(method, pattern, Ok(response))
    }

    pub fn on_json(&self, method: Method, pattern: &str, status: u16, body: Value) -> &Self {
        self.on(method, pattern, HttpResponse::new(status, body.to_string()))
    }

    pub fn on_error(&self, method: Method, pattern: &str, error: BackendError) -> &Self {
        self.push(method, pattern, Err(error))
    }

    /// Answer token requests with a token valid for `expires_in` seconds
    pub fn with_token(&self, value: &str, expires_in: u64) -> &Self {
        self.on_json(
            Method::Post,
            "/oauth2/v2.0/token",
            200,
            serde_json::json!({
                "token_type": "Bearer",
                "expires_in": expires_in,
                "access_token": value,
            }),
        )
    }

    fn push(&self, method: Method, pattern: &str, reply: Reply) -> &Self {
        let mut routes = self.routes.lock().unwrap_or_else(|e| e.into_inner());
        match routes
            .iter_mut()
            .find(|r| r.method == method && r.pattern == pattern)
        {
            Some(route) => route.replies.push_back(reply),
            None => routes.push(Route {
                method,
                pattern: pattern.to_string(),
                replies: VecDeque::from([reply]),
            }),
        }
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Calls whose method matches and whose URL contains `pattern`
    pub fn calls_to(&self, method: Method, pattern: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.method == method && c.url.contains(pattern))
            .collect()
    }

    /// Calls other than token requests
    pub fn resource_calls(&self) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| !c.url.contains("/oauth2/"))
            .collect()
    }

    fn reply(&self, method: Method, url: &str) -> Reply {
        let mut routes = self.routes.lock().unwrap_or_else(|e| e.into_inner());
        let route = routes
            .iter_mut()
            .find(|r| r.method == method && url.contains(&r.pattern));
        match route {
            Some(route) if route.replies.len() > 1 => route
                .replies
                .pop_front()
                .unwrap_or_else(|| Ok(HttpResponse::new(500, "empty script"))),
            Some(route) => route
                .replies
                .front()
                .cloned()
                .unwrap_or_else(|| Ok(HttpResponse::new(500, "empty script"))),
            None => Ok(HttpResponse::new(
                404,
                serde_json::json!({
                    "error": {"code": "ResourceNotFound", "message": format!("no scripted route for {} {}", method, url)}
                })
                .to_string(),
            )),
        }
    }
}

#[async_trait]
impl HttpBackend for ScriptedBackend {
    async fn send(&self, request: HttpRequest) -> std::result::Result<HttpResponse, BackendError> {
        let (body, form) = match &request.body {
            RequestBody::Empty => (None, None),
            RequestBody::Json(value) => (Some(value.clone()), None),
            RequestBody::Form(fields) => (None, Some(fields.clone())),
        };
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(RecordedCall {
                method: request.method,
                url: request.url.clone(),
                bearer: request.bearer.clone(),
                body,
                form,
            });

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.reply(request.method, &request.url)
    }
}
