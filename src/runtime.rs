//! Partitioned processing runtime.
//!
//! Events are routed by a stable hash of their city to one of N worker tasks,
//! so each city is folded in log order by a single worker while different
//! cities proceed concurrently. Workers run the engine and emit its updates
//! straight to the emitter.

use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, warn};

use crate::checkpoint::{Checkpoint, CheckpointFile};
use crate::config::RuntimeConfig;
use crate::engine::Engine;
use crate::error::{PipelineError, Result};
use crate::event::SequencedEvent;
use crate::notify::ChangeNotificationEmitter;

/// Worker index for `city`, taken from the leading bytes of its SHA-256
/// digest so the mapping is stable across processes and platforms.
pub fn partition_for(city: &str, partitions: usize) -> usize {
    let digest = Sha256::digest(city.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(prefix) % partitions.max(1) as u64) as usize
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub dispatched: u64,
    pub malformed: u64,
    pub processed: u64,
    pub already_applied: u64,
}

pub struct Runtime {
    engine: Arc<Engine>,
    emitter: Arc<ChangeNotificationEmitter>,
    config: RuntimeConfig,
}

impl Runtime {
    pub fn new(
        engine: Arc<Engine>,
        emitter: Arc<ChangeNotificationEmitter>,
        config: RuntimeConfig,
    ) -> Self {
        Self {
            engine,
            emitter,
            config,
        }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Loads the configured checkpoint into the engine, if one exists.
    pub fn recover(&self) -> Result<Option<Checkpoint>> {
        let Some(path) = &self.config.checkpoint_path else {
            return Ok(None);
        };
        let Some(checkpoint) = CheckpointFile::new(path).load()? else {
            info!(path = %path.display(), "No checkpoint found, starting from empty state");
            return Ok(None);
        };

        self.engine.restore(checkpoint.cities.clone());
        Ok(Some(checkpoint))
    }

    /// Spawns the workers and returns the handle that feeds them.
    pub fn start(&self) -> Dispatcher {
        let partitions = self.config.partitions.max(1);
        let mut senders = Vec::with_capacity(partitions);
        let mut workers = Vec::with_capacity(partitions);

        for id in 0..partitions {
            let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));
            let span = tracing::info_span!("partition", id);
            workers.push(tokio::spawn(
                run_worker(id, rx, self.engine.clone(), self.emitter.clone()).instrument(span),
            ));
            senders.push(tx);
        }

        info!(partitions, "Runtime started");

        Dispatcher {
            senders,
            workers,
            engine: self.engine.clone(),
            checkpoint: self.config.checkpoint_path.as_ref().map(CheckpointFile::new),
            checkpoint_every: self.config.checkpoint_every,
            summary: RunSummary::default(),
            last_offset: None,
        }
    }
}

async fn run_worker(
    id: usize,
    mut rx: mpsc::Receiver<SequencedEvent>,
    engine: Arc<Engine>,
    emitter: Arc<ChangeNotificationEmitter>,
) -> u64 {
    let mut handled = 0u64;
    while let Some(event) = rx.recv().await {
        let updates = engine.process(&event);
        emitter.emit_all(updates).await;
        handled += 1;
    }
    debug!(worker = id, handled, "Worker drained");
    handled
}

pub struct Dispatcher {
    senders: Vec<mpsc::Sender<SequencedEvent>>,
    workers: Vec<JoinHandle<u64>>,
    engine: Arc<Engine>,
    checkpoint: Option<CheckpointFile>,
    checkpoint_every: u64,
    summary: RunSummary,
    last_offset: Option<u64>,
}

impl Dispatcher {
    /// Routes one event to its city's worker, waiting if that worker's
    /// inbox is full.
    pub async fn dispatch(&mut self, event: SequencedEvent) -> anyhow::Result<()> {
        let partition = partition_for(event.city(), self.senders.len());
        let offset = event.offset;

        self.senders[partition]
            .send(event)
            .await
            .map_err(|_| anyhow::anyhow!("partition {partition} worker stopped"))?;

        self.summary.dispatched += 1;
        self.last_offset = Some(self.last_offset.map_or(offset, |last| last.max(offset)));

        if self.checkpoint_every > 0 && self.summary.dispatched % self.checkpoint_every == 0 {
            if let Err(e) = self.write_checkpoint().await {
                warn!(error = %e, "Periodic checkpoint failed");
            }
        }
        Ok(())
    }

    /// Dispatches a decoded event, or logs and drops a malformed one.
    pub async fn dispatch_decoded(&mut self, decoded: Result<SequencedEvent>) -> anyhow::Result<()> {
        match decoded {
            Ok(event) => self.dispatch(event).await,
            Err(PipelineError::MalformedMessage { offset, reason }) => {
                self.summary.malformed += 1;
                warn!(offset, %reason, "Dropping malformed event");
                Ok(())
            }
            Err(other) => Err(other.into()),
        }
    }

    /// Snapshots the engine and writes it on the blocking pool.
    pub async fn write_checkpoint(&self) -> Result<()> {
        let Some(file) = self.checkpoint.clone() else {
            return Ok(());
        };
        let checkpoint = Checkpoint::new(self.last_offset, self.engine.snapshot());
        let path = file.path().display().to_string();

        tokio::task::spawn_blocking(move || file.save(&checkpoint))
            .await
            .map_err(|e| PipelineError::Checkpoint {
                path,
                source: e.into(),
            })?
    }

    /// Closes the worker inboxes, waits for them to drain and writes a final
    /// checkpoint.
    pub async fn shutdown(mut self) -> anyhow::Result<RunSummary> {
        self.senders.clear();

        for worker in self.workers.drain(..) {
            if let Err(e) = worker.await {
                warn!(error = %e, "Worker task failed");
            }
        }

        self.write_checkpoint().await?;

        let stats = self.engine.stats();
        self.summary.processed = stats.processed;
        self.summary.already_applied = stats.already_applied;

        info!(
            dispatched = self.summary.dispatched,
            malformed = self.summary.malformed,
            processed = self.summary.processed,
            already_applied = self.summary.already_applied,
            "Runtime stopped"
        );
        Ok(self.summary)
    }
}
