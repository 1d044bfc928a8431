mod basic;
mod client;
#[cfg(test)]
pub(crate) mod stub;

pub use basic::BasicClient;
pub use client::HttpClient;

use anyhow::{Result, bail};
use reqwest::header::{CONTENT_TYPE, HeaderValue};

/// GETs `url` and returns the body, failing on a non-success status.
pub async fn fetch_bytes<C: HttpClient + ?Sized>(client: &C, url: &str) -> Result<Vec<u8>> {
    let req = reqwest::Request::new(reqwest::Method::GET, url.parse()?);

    let resp = client.execute(req).await?;
    let status = resp.status();
    if !status.is_success() {
        bail!("GET {url} returned status {status}");
    }
    Ok(resp.bytes().await?.to_vec())
}

/// POSTs an already-encoded JSON document to `url`.
pub async fn post_json<C: HttpClient + ?Sized>(client: &C, url: &str, body: String) -> Result<()> {
    let mut req = reqwest::Request::new(reqwest::Method::POST, url.parse()?);
    req.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    *req.body_mut() = Some(body.into());

    let resp = client.execute(req).await?;
    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        bail!("POST {url} returned status {status}: {text}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::stub::StubClient;
    use super::*;
    use reqwest::Method;

    #[tokio::test]
    async fn test_fetch_bytes_returns_body() {
        let client = StubClient::new(200, "line one\nline two\n");
        let bytes = fetch_bytes(&client, "http://events.test/log.jsonl")
            .await
            .unwrap();

        assert_eq!(bytes, b"line one\nline two\n");
        let seen = client.seen();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].method, Method::GET);
        assert_eq!(seen[0].url, "http://events.test/log.jsonl");
    }

    #[tokio::test]
    async fn test_fetch_bytes_fails_on_error_status() {
        let client = StubClient::new(404, "not found");
        let err = fetch_bytes(&client, "http://events.test/missing")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("404"), "{err}");
    }

    #[tokio::test]
    async fn test_post_json_sends_body_and_content_type() {
        let client = StubClient::new(204, "");
        post_json(&client, "http://hooks.test/rides", r#"{"type":"METRICS"}"#.to_string())
            .await
            .unwrap();

        let seen = client.seen();
        assert_eq!(seen[0].method, Method::POST);
        assert_eq!(seen[0].content_type.as_deref(), Some("application/json"));
        assert_eq!(seen[0].body.as_deref(), Some(r#"{"type":"METRICS"}"#));
    }

    #[tokio::test]
    async fn test_post_json_error_includes_response_text() {
        let client = StubClient::new(503, "upstream down");
        let err = post_json(&client, "http://hooks.test/rides", "{}".to_string())
            .await
            .unwrap_err()
            .to_string();
        assert!(err.contains("503"), "{err}");
        assert!(err.contains("upstream down"), "{err}");
    }

    #[tokio::test]
    async fn test_invalid_url_is_rejected_before_sending() {
        let client = StubClient::new(200, "");
        assert!(fetch_bytes(&client, "not a url").await.is_err());
        assert!(client.seen().is_empty());
    }
}
