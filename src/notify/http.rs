use anyhow::Result;
use async_trait::async_trait;

use super::{Notification, NotificationSink};
use crate::fetch::{HttpClient, post_json};

/// POSTs every notification to a webhook URL.
pub struct HttpSink<C> {
    client: C,
    url: String,
}

impl<C: HttpClient> HttpSink<C> {
    pub fn new(client: C, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl<C: HttpClient> NotificationSink for HttpSink<C> {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn send(&self, _notification: &Notification, payload: &str) -> Result<()> {
        post_json(&self.client, &self.url, payload.to_string()).await
    }
}
