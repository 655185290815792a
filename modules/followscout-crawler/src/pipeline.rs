//! Pipeline orchestrator.
//!
//! Wires the workers together:
//!
//! ```text
//! frontier --ids--> resolver --profiles--> dispatch --matches--> forwarder --> sinks
//!     ^                                       |
//!     +-------- investigation queue <---------+
//! ```
//!
//! plus a timer that snapshots the cache. Every worker shares one
//! [`CancellationToken`]; `close()` fires it, joins the workers and writes a
//! final snapshot.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use followscout_common::{AccountRef, ConfigError, FileConfig};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::cache::{CacheSizes, CrawlCache};
use crate::criteria::CriteriaEngine;
use crate::dispatch::Dispatcher;
use crate::frontier::{directions, FrontierController, FrontierState};
use crate::queue::{InvestigationQueue, PushOutcome};
use crate::resolver::BatchResolver;
use crate::retry::RetryPolicy;
use crate::sink::{forward_matches, SinkFanout};
use crate::stats::{CrawlStats, StatsSnapshot};
use crate::traits::GraphSource;

pub const CONFIG_SNAPSHOT_FILE: &str = "config.json";

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("pipeline already started")]
    AlreadyStarted,

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to create storage directory {path}: {source}")]
    StorageDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Collaborators injected at construction.
pub struct PipelineDeps {
    pub source: Arc<dyn GraphSource>,
    pub cache: Arc<CrawlCache>,
    pub engine: CriteriaEngine,
    pub sinks: SinkFanout,
}

pub struct Pipeline {
    config: FileConfig,
    deps: Option<PipelineDeps>,
    cache: Arc<CrawlCache>,
    queue: Arc<InvestigationQueue>,
    stats: Arc<CrawlStats>,
    cancel: CancellationToken,
    state_tx: Option<watch::Sender<FrontierState>>,
    state_rx: watch::Receiver<FrontierState>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl Pipeline {
    pub fn new(config: FileConfig, deps: PipelineDeps) -> Self {
        let (state_tx, state_rx) = watch::channel(FrontierState::Idle);
        Self {
            cache: deps.cache.clone(),
            queue: Arc::new(InvestigationQueue::new(config.crawl.investigating_capacity)),
            stats: Arc::new(CrawlStats::new()),
            cancel: CancellationToken::new(),
            state_tx: Some(state_tx),
            state_rx,
            tasks: Vec::new(),
            deps: Some(deps),
            config,
        }
    }

    pub fn storage_dir(&self) -> &Path {
        &self.config.storage_dir
    }

    pub fn stats(&self) -> Arc<CrawlStats> {
        self.stats.clone()
    }

    pub fn cache(&self) -> Arc<CrawlCache> {
        self.cache.clone()
    }

    /// Watch the frontier controller's lifecycle state.
    pub fn frontier_state(&self) -> watch::Receiver<FrontierState> {
        self.state_rx.clone()
    }

    /// Restore persisted state and spawn every worker.
    pub fn start(&mut self) -> Result<(), PipelineError> {
        self.config.validate()?;
        let (Some(deps), Some(state_tx)) = (self.deps.take(), self.state_tx.take()) else {
            return Err(PipelineError::AlreadyStarted);
        };
        let crawl = &self.config.crawl;
        let dir = self.config.storage_dir.clone();

        std::fs::create_dir_all(&dir).map_err(|source| PipelineError::StorageDir {
            path: dir.clone(),
            source,
        })?;
        write_config_snapshot(&self.config, &dir);

        let sizes = self.cache.load(&dir);
        self.resume_frontier(sizes);

        let directions = directions(self.config.following, self.config.followers);
        if directions.is_empty() {
            warn!("Both following and followers are disabled, nothing will be expanded");
        }
        let retry = RetryPolicy::from(crawl);

        let (candidate_tx, candidate_rx) = mpsc::channel(crawl.candidate_buffer);
        let (profile_tx, profile_rx) = mpsc::channel(crawl.resolve_batch_size);
        let (match_tx, match_rx) = mpsc::channel(crawl.result_batch_size);

        let frontier = FrontierController::new(
            deps.source.clone(),
            self.cache.clone(),
            self.queue.clone(),
            self.stats.clone(),
            retry,
            AccountRef::ScreenName(self.config.seed.trim().to_string()),
            directions,
            state_tx,
        );
        let resolver = BatchResolver::new(
            deps.source,
            self.cache.clone(),
            self.stats.clone(),
            retry,
            crawl.resolve_batch_size,
            crawl.batch_linger(),
        );
        let dispatcher = Dispatcher::new(
            deps.engine,
            self.cache.clone(),
            self.queue.clone(),
            self.stats.clone(),
            self.config.recursion,
        );

        let cancel = &self.cancel;
        self.tasks = vec![
            (
                "frontier",
                tokio::spawn(frontier.run(candidate_tx, cancel.clone())),
            ),
            (
                "resolver",
                tokio::spawn(resolver.run(candidate_rx, profile_tx, cancel.clone())),
            ),
            (
                "dispatch",
                tokio::spawn(dispatcher.run(profile_rx, match_tx, cancel.clone())),
            ),
            (
                "forwarder",
                tokio::spawn(forward_matches(
                    deps.sinks,
                    match_rx,
                    crawl.result_batch_size,
                    crawl.batch_linger(),
                    self.stats.clone(),
                    cancel.clone(),
                )),
            ),
            (
                "snapshot",
                tokio::spawn(snapshot_loop(
                    self.cache.clone(),
                    dir.clone(),
                    crawl.snapshot_interval(),
                    self.stats.clone(),
                    cancel.clone(),
                )),
            ),
        ];

        info!(
            seed = %self.config.seed,
            recursion = ?self.config.recursion,
            storage_dir = %dir.display(),
            "Crawl pipeline started"
        );
        Ok(())
    }

    /// Re-queue the persisted frontier from a previous run.
    fn resume_frontier(&self, sizes: CacheSizes) {
        if sizes.investigating == 0 {
            return;
        }
        let mut requeued = 0;
        let mut dropped = 0;
        for id in self.cache.investigating_ids() {
            match self.queue.try_push(id) {
                PushOutcome::Queued => {
                    self.stats.resumed.incr();
                    requeued += 1;
                }
                PushOutcome::Dropped => {
                    self.cache.remove_investigating(id);
                    dropped += 1;
                }
            }
        }
        info!(requeued, dropped, "Resumed investigation frontier");
    }

    /// Cancel every worker, wait for them, and write a final snapshot.
    pub async fn close(mut self) -> StatsSnapshot {
        self.cancel.cancel();

        for (name, handle) in self.tasks.drain(..) {
            if let Err(e) = handle.await {
                error!(task = name, error = %e, "Pipeline task failed");
            }
        }

        if self.deps.is_none() {
            snapshot_now(self.cache.clone(), self.config.storage_dir.clone()).await;
        }

        let stats = self.stats.snapshot();
        info!("Crawl pipeline closed. {stats}");
        stats
    }
}

fn write_config_snapshot(config: &FileConfig, dir: &Path) {
    let path = dir.join(CONFIG_SNAPSHOT_FILE);
    let result = serde_json::to_vec_pretty(config)
        .map_err(std::io::Error::from)
        .and_then(|bytes| std::fs::write(&path, bytes));
    if let Err(e) = result {
        warn!(path = %path.display(), error = %e, "Failed to write config snapshot");
    }
}

async fn snapshot_loop(
    cache: Arc<CrawlCache>,
    dir: PathBuf,
    interval: Duration,
    stats: Arc<CrawlStats>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                snapshot_now(cache.clone(), dir.clone()).await;
                let sizes = cache.sizes();
                info!(
                    seen = sizes.seen,
                    investigating = sizes.investigating,
                    matched = sizes.matched,
                    "Snapshot tick. {stats}"
                );
            }
        }
    }
}

/// Snapshot on the blocking pool. Failures are already logged by the cache
/// and self-heal on the next tick.
async fn snapshot_now(cache: Arc<CrawlCache>, dir: PathBuf) {
    let result = tokio::task::spawn_blocking(move || cache.snapshot(&dir)).await;
    if let Err(e) = result {
        error!(error = %e, "Snapshot task failed");
    }
}
