// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The GitHub port: every raw GitHub API access the orchestrator makes is
//! centralized behind this trait, never invoked elsewhere in the core.

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PortError {
    #[error("github port not configured: {0}")]
    NotConfigured(String),
    #[error("rate limited, reset at epoch ms {reset_at_ms}")]
    RateLimited { reset_at_ms: u64 },
    #[error("not found")]
    NotFound,
    #[error("request failed with status {status}: {body}")]
    RequestFailed { status: u16, body: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Patch,
    Put,
    Delete,
}

#[derive(Debug, Clone)]
pub struct Request<'a> {
    pub method: Method,
    pub path: &'a str,
    pub body: Option<serde_json::Value>,
    pub allow_not_found: bool,
}

impl<'a> Request<'a> {
    pub fn get(path: &'a str) -> Self {
        Self { method: Method::Get, path, body: None, allow_not_found: false }
    }

    pub fn post(path: &'a str, body: serde_json::Value) -> Self {
        Self { method: Method::Post, path, body: Some(body), allow_not_found: false }
    }

    pub fn allowing_not_found(mut self) -> Self {
        self.allow_not_found = true;
        self
    }
}

/// Rate-limit state surfaced on every response, per the `X-RateLimit-*`
/// headers; `None` when the upstream response carried none.
#[derive(Debug, Clone, Copy, Default)]
pub struct RateLimit {
    pub remaining: Option<u32>,
    pub reset_at_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub data: Option<serde_json::Value>,
    pub headers: HashMap<String, String>,
    pub rate_limit: RateLimit,
    /// `rel="next"` target parsed out of the `Link` header (RFC 5988), if present.
    pub next_page: Option<String>,
}

impl Response {
    pub fn not_found() -> Self {
        Self { status: 404, data: None, headers: HashMap::new(), rate_limit: RateLimit::default(), next_page: None }
    }
}

/// Port for all raw GitHub REST calls. All pagination/rate-limit handling
/// lives on the implementation; callers see one `request` per logical page.
#[async_trait]
pub trait GitHubPort: Send + Sync + 'static {
    async fn request(&self, req: Request<'_>) -> Result<Response, PortError>;
}

/// Documented extension point for a production HTTP implementation. Left
/// unimplemented: wiring a concrete GitHub HTTP client is outside this
/// exercise's scope.
pub mod http {
    use super::{GitHubPort, PortError, Request, Response};
    use async_trait::async_trait;

    #[derive(Debug, Default)]
    pub struct HttpGitHubPort {
        _private: (),
    }

    impl HttpGitHubPort {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl GitHubPort for HttpGitHubPort {
        async fn request(&self, _req: Request<'_>) -> Result<Response, PortError> {
            Err(PortError::NotConfigured("http github port".into()))
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    use super::{GitHubPort, Method, PortError, Request, Response};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::Arc;

    #[derive(Debug, Clone)]
    pub struct RecordedRequest {
        pub method: Method,
        pub path: String,
        pub body: Option<serde_json::Value>,
    }

    /// Drains a FIFO queue of scripted [`Response`]s (or [`PortError`]s),
    /// recording every request made against it.
    #[derive(Clone, Default)]
    pub struct FakeGitHubPort {
        responses: Arc<Mutex<VecDeque<Result<Response, PortError>>>>,
        requests: Arc<Mutex<Vec<RecordedRequest>>>,
    }

    impl FakeGitHubPort {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push_response(&self, response: Response) {
            self.responses.lock().push_back(Ok(response));
        }

        pub fn push_error(&self, error: PortError) {
            self.responses.lock().push_back(Err(error));
        }

        pub fn requests(&self) -> Vec<RecordedRequest> {
            self.requests.lock().clone()
        }
    }

    #[async_trait]
    impl GitHubPort for FakeGitHubPort {
        async fn request(&self, req: Request<'_>) -> Result<Response, PortError> {
            self.requests.lock().push(RecordedRequest {
                method: req.method,
                path: req.path.to_string(),
                body: req.body.clone(),
            });

            match self.responses.lock().pop_front() {
                Some(result) => result,
                None if req.allow_not_found => Ok(Response::not_found()),
                None => Err(PortError::NotConfigured("fake github port: no scripted response left".into())),
            }
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeGitHubPort;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_port_records_requests_and_drains_responses() {
        let port = FakeGitHubPort::new();
        port.push_response(Response {
            status: 200,
            data: Some(serde_json::json!({"number": 1})),
            headers: HashMap::new(),
            rate_limit: RateLimit { remaining: Some(10), reset_at_ms: Some(1_000) },
            next_page: None,
        });

        let resp = port.request(Request::get("/repos/acme/demo/issues/1")).await.unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(port.requests().len(), 1);
        assert_eq!(port.requests()[0].path, "/repos/acme/demo/issues/1");
    }

    #[tokio::test]
    async fn allow_not_found_falls_back_when_queue_empty() {
        let port = FakeGitHubPort::new();
        let resp = port.request(Request::get("/repos/acme/demo/issues/2").allowing_not_found()).await.unwrap();
        assert_eq!(resp.status, 404);
    }

    #[tokio::test]
    async fn http_port_is_not_configured() {
        let port = http::HttpGitHubPort::new();
        let err = port.request(Request::get("/x")).await.unwrap_err();
        assert!(matches!(err, PortError::NotConfigured(_)));
    }
}
