use async_trait::async_trait;
use reqwest::{Request, Response};

/// Minimal HTTP transport, so event sources and webhook sinks can be tested
/// without a network.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;
}
