//! In-memory `HttpClient` for tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, Request, Response};
use std::sync::Arc;

use super::HttpClient;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeenRequest {
    pub method: Method,
    pub url: String,
    pub content_type: Option<String>,
    pub body: Option<String>,
}

/// Answers every request with a fixed status and body and records what it
/// was sent.
#[derive(Clone)]
pub struct StubClient {
    status: u16,
    body: &'static str,
    seen: Arc<Mutex<Vec<SeenRequest>>>,
}

impl StubClient {
    pub fn new(status: u16, body: &'static str) -> Self {
        Self {
            status,
            body,
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn seen(&self) -> Vec<SeenRequest> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl HttpClient for StubClient {
    async fn execute(&self, req: Request) -> reqwest::Result<Response> {
        self.seen.lock().push(SeenRequest {
            method: req.method().clone(),
            url: req.url().to_string(),
            content_type: req
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            body: req
                .body()
                .and_then(|b| b.as_bytes())
                .map(|b| String::from_utf8_lossy(b).into_owned()),
        });

        let response = http::Response::builder()
            .status(self.status)
            .body(self.body)
            .unwrap();
        Ok(Response::from(response))
    }
}
