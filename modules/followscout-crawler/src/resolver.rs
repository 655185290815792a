//! Batch profile resolver.
//!
//! Drains candidate IDs from the frontier, drops the ones already in Seen,
//! and resolves the rest in bulk lookups of up to `batch_size` IDs. A partial
//! batch is flushed once the input has been quiet for `linger`, or when the
//! input closes.

use std::sync::Arc;
use std::time::Duration;

use followscout_common::{Profile, ProfileId};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cache::CrawlCache;
use crate::retry::{with_retry, CallError, RetryPolicy};
use crate::stats::CrawlStats;
use crate::traits::GraphSource;

pub struct BatchResolver {
    source: Arc<dyn GraphSource>,
    cache: Arc<CrawlCache>,
    stats: Arc<CrawlStats>,
    retry: RetryPolicy,
    batch_size: usize,
    linger: Duration,
}

impl BatchResolver {
    pub fn new(
        source: Arc<dyn GraphSource>,
        cache: Arc<CrawlCache>,
        stats: Arc<CrawlStats>,
        retry: RetryPolicy,
        batch_size: usize,
        linger: Duration,
    ) -> Self {
        Self {
            source,
            cache,
            stats,
            retry,
            batch_size: batch_size.max(1),
            linger,
        }
    }

    /// Run until the candidate channel closes, the profile receiver goes
    /// away, or `cancel` fires.
    pub async fn run(
        self,
        mut candidates: mpsc::Receiver<ProfileId>,
        profiles: mpsc::Sender<Profile>,
        cancel: CancellationToken,
    ) {
        let mut batch: Vec<ProfileId> = Vec::with_capacity(self.batch_size);

        loop {
            let next = if batch.is_empty() {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    id = candidates.recv() => id,
                }
            } else {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    received = tokio::time::timeout(self.linger, candidates.recv()) => match received {
                        Ok(id) => id,
                        Err(_) => {
                            debug!(pending = batch.len(), "Input quiet, flushing partial batch");
                            if !self.flush(&mut batch, &profiles, &cancel).await {
                                break;
                            }
                            continue;
                        }
                    },
                }
            };

            let Some(id) = next else {
                if !batch.is_empty() {
                    self.flush(&mut batch, &profiles, &cancel).await;
                }
                break;
            };

            self.stats.candidates.incr();
            if self.cache.mark_seen_if_new(id) {
                self.stats.skipped_seen.incr();
                continue;
            }

            batch.push(id);
            if batch.len() >= self.batch_size && !self.flush(&mut batch, &profiles, &cancel).await {
                break;
            }
        }

        info!("Resolver stopped");
    }

    /// Resolve and forward the pending batch. Returns false once the
    /// pipeline is shutting down.
    async fn flush(
        &self,
        batch: &mut Vec<ProfileId>,
        profiles: &mpsc::Sender<Profile>,
        cancel: &CancellationToken,
    ) -> bool {
        let ids = std::mem::take(batch);
        let source = &self.source;
        let ids_ref = ids.as_slice();

        let resolved = match with_retry(&self.retry, cancel, "lookup_profiles", || {
            source.lookup_profiles(ids_ref)
        })
        .await
        {
            Ok(resolved) => resolved,
            Err(CallError::Cancelled) => return false,
            Err(e) => {
                self.stats.lookup_failures.incr();
                error!(batch_size = ids.len(), error = %e, "Profile lookup failed, dropping batch");
                return true;
            }
        };

        if resolved.len() < ids.len() {
            warn!(
                requested = ids.len(),
                resolved = resolved.len(),
                "Some profiles could not be resolved"
            );
        }
        debug!(requested = ids.len(), resolved = resolved.len(), "Batch resolved");
        self.stats.resolved.add(resolved.len() as u64);

        for profile in resolved {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return false,
                sent = profiles.send(profile) => {
                    if sent.is_err() {
                        return false;
                    }
                }
            }
        }
        true
    }
}
