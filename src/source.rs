//! Newline-delimited JSON event logs.
//!
//! A log is read from a local path or an HTTP(S) URL; gzip input (by `.gz`
//! suffix or magic bytes) is decompressed. Each line's zero-based index is
//! its log offset, blank lines included, so offsets stay stable across
//! re-reads of the same log.

use anyhow::Context;
use flate2::read::GzDecoder;
use std::io::Read;
use tracing::debug;

use crate::codec::decode_event;
use crate::error::{PipelineError, Result};
use crate::event::SequencedEvent;
use crate::fetch::{BasicClient, fetch_bytes};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventSource {
    File(String),
    Url(String),
}

impl EventSource {
    pub fn parse(location: &str) -> Self {
        if location.starts_with("http://") || location.starts_with("https://") {
            EventSource::Url(location.to_string())
        } else {
            EventSource::File(location.to_string())
        }
    }

    pub fn location(&self) -> &str {
        match self {
            EventSource::File(path) => path,
            EventSource::Url(url) => url,
        }
    }

    /// Loads the raw log, decompressing gzip input.
    #[tracing::instrument(skip(self), fields(source = %self.location()))]
    pub async fn read(&self) -> Result<Vec<u8>> {
        self.read_inner().await.map_err(|source| PipelineError::Source {
            location: self.location().to_string(),
            source,
        })
    }

    async fn read_inner(&self) -> anyhow::Result<Vec<u8>> {
        let bytes = match self {
            EventSource::File(path) => tokio::fs::read(path)
                .await
                .with_context(|| format!("reading {path}"))?,
            EventSource::Url(url) => {
                let client = BasicClient::new()?;
                fetch_bytes(&client, url).await?
            }
        };
        debug!(bytes = bytes.len(), "Event log loaded");

        if self.location().ends_with(".gz") || bytes.starts_with(&GZIP_MAGIC) {
            let mut decoded = Vec::new();
            GzDecoder::new(bytes.as_slice())
                .read_to_end(&mut decoded)
                .context("decompressing gzip event log")?;
            debug!(bytes = decoded.len(), "Event log decompressed");
            return Ok(decoded);
        }
        Ok(bytes)
    }
}

/// Splits a log into decoded events, one result per non-blank line.
pub fn decode_log(bytes: &[u8]) -> impl Iterator<Item = Result<SequencedEvent>> + '_ {
    bytes
        .split(|b| *b == b'\n')
        .enumerate()
        .filter_map(|(index, line)| {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if line.iter().all(u8::is_ascii_whitespace) {
                return None;
            }
            Some(decode_event(index as u64, line))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;
    use tempfile::TempDir;

    const LOG: &str = concat!(
        r#"{"eventType":"RIDE_STARTED","rideId":"r1","city":"Mumbai"}"#,
        "\n\n",
        "not json\r\n",
        r#"{"eventType":"RIDE_COMPLETED","rideId":"r1","city":"Mumbai","durationMinutes":30}"#,
        "\n",
    );

    #[test]
    fn test_parse_location() {
        assert_eq!(
            EventSource::parse("https://example.com/log.jsonl"),
            EventSource::Url("https://example.com/log.jsonl".to_string())
        );
        assert_eq!(
            EventSource::parse("data/log.jsonl"),
            EventSource::File("data/log.jsonl".to_string())
        );
    }

    #[test]
    fn test_decode_log_keeps_line_offsets() {
        let results: Vec<_> = decode_log(LOG.as_bytes()).collect();
        assert_eq!(results.len(), 3);

        assert_eq!(results[0].as_ref().unwrap().offset, 0);
        assert!(matches!(
            results[1],
            Err(PipelineError::MalformedMessage { offset: 2, .. })
        ));
        let completed = results[2].as_ref().unwrap();
        assert_eq!(completed.offset, 3);
        assert_eq!(completed.event.duration_minutes, Some(30));
    }

    #[tokio::test]
    async fn test_read_plain_and_gzip_files() {
        let dir = TempDir::new().unwrap();

        let plain = dir.path().join("events.jsonl");
        std::fs::write(&plain, LOG).unwrap();

        let gz = dir.path().join("events.jsonl.gz");
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(LOG.as_bytes()).unwrap();
        std::fs::write(&gz, encoder.finish().unwrap()).unwrap();

        for path in [plain, gz] {
            let source = EventSource::parse(path.to_str().unwrap());
            let bytes = source.read().await.unwrap();
            assert_eq!(bytes, LOG.as_bytes());
        }
    }

    #[tokio::test]
    async fn test_missing_file_is_source_error() {
        let source = EventSource::parse("/definitely/not/here.jsonl");
        assert!(matches!(
            source.read().await,
            Err(PipelineError::Source { .. })
        ));
    }
}
