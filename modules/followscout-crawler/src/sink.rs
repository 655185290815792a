//! Result sinks: where matched profiles end up.
//!
//! The forwarder batches matches from the dispatch loop and hands each batch
//! to a [`SinkFanout`], which delivers it to every registered sink. Delivery
//! is best-effort: sink errors are logged and the batch is not retried.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use followscout_common::Profile;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::stats::CrawlStats;

pub const MATCHES_FILE: &str = "matches.jsonl";

/// Pluggable output for matched profiles.
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &str;

    async fn store(&self, batch: &[Profile]) -> anyhow::Result<()>;
}

/// Delivers each batch to every registered sink.
#[derive(Default, Clone)]
pub struct SinkFanout {
    sinks: Vec<Arc<dyn ResultSink>>,
}

impl SinkFanout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, sink: Arc<dyn ResultSink>) {
        info!(sink = sink.name(), "Result sink registered");
        self.sinks.push(sink);
    }

    pub fn with(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.register(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub async fn store(&self, batch: &[Profile]) {
        for sink in &self.sinks {
            if let Err(e) = sink.store(batch).await {
                warn!(sink = sink.name(), batch_size = batch.len(), error = %e, "Result sink failed");
            }
        }
    }
}

/// Appends each matched profile as one JSON line.
pub struct JsonlSink {
    path: PathBuf,
    file: Mutex<Option<tokio::fs::File>>,
}

impl JsonlSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: Mutex::new(None),
        }
    }

    /// `matches.jsonl` inside the storage directory.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(MATCHES_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ResultSink for JsonlSink {
    fn name(&self) -> &str {
        "jsonl"
    }

    async fn store(&self, batch: &[Profile]) -> anyhow::Result<()> {
        let mut buf = Vec::new();
        for profile in batch {
            serde_json::to_writer(&mut buf, profile)?;
            buf.push(b'\n');
        }

        let mut guard = self.file.lock().await;
        if guard.is_none() {
            let file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .await
                .with_context(|| format!("opening {}", self.path.display()))?;
            *guard = Some(file);
        }
        if let Some(file) = guard.as_mut() {
            file.write_all(&buf)
                .await
                .with_context(|| format!("appending to {}", self.path.display()))?;
            file.flush().await?;
        }
        Ok(())
    }
}

/// Logs every stored profile.
pub struct LogSink;

#[async_trait]
impl ResultSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn store(&self, batch: &[Profile]) -> anyhow::Result<()> {
        for profile in batch {
            info!(
                profile_id = %profile.id,
                screen_name = %profile.screen_name,
                followers = profile.followers_count,
                "Stored match {}",
                profile.url()
            );
        }
        Ok(())
    }
}

/// Batch matched profiles and deliver them through `sinks`.
///
/// A batch goes out when it reaches `batch_size` or when no match has
/// arrived for `linger`. After cancellation the forwarder stops lingering and
/// keeps receiving until the dispatch loop drops its sender, then delivers
/// whatever is left.
pub async fn forward_matches(
    sinks: SinkFanout,
    mut matches: mpsc::Receiver<Profile>,
    batch_size: usize,
    linger: Duration,
    stats: Arc<CrawlStats>,
    cancel: CancellationToken,
) {
    let batch_size = batch_size.max(1);
    let mut batch: Vec<Profile> = Vec::with_capacity(batch_size);
    let mut draining = false;

    loop {
        let next = if draining {
            matches.recv().await
        } else if batch.is_empty() {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    draining = true;
                    continue;
                }
                next = matches.recv() => next,
            }
        } else {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    draining = true;
                    continue;
                }
                received = tokio::time::timeout(linger, matches.recv()) => match received {
                    Ok(next) => next,
                    Err(_) => {
                        deliver(&sinks, &mut batch, &stats).await;
                        continue;
                    }
                },
            }
        };

        match next {
            Some(profile) => {
                batch.push(profile);
                if batch.len() >= batch_size {
                    deliver(&sinks, &mut batch, &stats).await;
                }
            }
            None => break,
        }
    }

    if !batch.is_empty() {
        deliver(&sinks, &mut batch, &stats).await;
    }
    info!("Result forwarder stopped");
}

async fn deliver(sinks: &SinkFanout, batch: &mut Vec<Profile>, stats: &CrawlStats) {
    let out = std::mem::take(batch);
    debug!(batch_size = out.len(), sinks = sinks.len(), "Delivering matches");
    sinks.store(&out).await;
    stats.batches_stored.incr();
}
