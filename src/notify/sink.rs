use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, mpsc};
use tracing::debug;

use super::Notification;

/// Destination for encoded notifications.
///
/// `payload` is the JSON encoding of `notification`; sinks that ship bytes
/// use it directly, in-process sinks use the typed value.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(&self, notification: &Notification, payload: &str) -> Result<()>;
}

/// Appends one JSON document per line to a file or stdout.
pub struct JsonLinesSink {
    writer: Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
}

impl JsonLinesSink {
    /// Opens `path` for appending, creating it if needed.
    pub async fn append(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file_exists = path.exists();
        debug!(path = %path.display(), file_exists, "Opening notification log");

        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(path)
            .await
            .with_context(|| format!("opening {}", path.display()))?;
        Ok(Self::from_writer(file))
    }

    pub fn stdout() -> Self {
        Self::from_writer(tokio::io::stdout())
    }

    pub fn from_writer(writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        Self {
            writer: Mutex::new(Box::new(writer)),
        }
    }
}

#[async_trait]
impl NotificationSink for JsonLinesSink {
    fn name(&self) -> &'static str {
        "json-lines"
    }

    async fn send(&self, _notification: &Notification, payload: &str) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(payload.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        Ok(())
    }
}

/// Forwards notifications to an in-process consumer such as the dashboard
/// projection.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<Notification>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl NotificationSink for ChannelSink {
    fn name(&self) -> &'static str {
        "channel"
    }

    async fn send(&self, notification: &Notification, _payload: &str) -> Result<()> {
        self.tx
            .send(notification.clone())
            .map_err(|_| anyhow::anyhow!("receiver closed"))
    }
}
