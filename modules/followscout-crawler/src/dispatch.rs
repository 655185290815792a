//! Criteria evaluation and dispatch.
//!
//! Every resolved profile is classified once. Matches are recorded in the
//! cache and forwarded to the result sinks; profiles selected by the
//! recursion policy are queued for neighbor expansion.

use std::sync::Arc;

use followscout_common::{Profile, ProfileId, RecursionPolicy};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::CrawlCache;
use crate::criteria::CriteriaEngine;
use crate::queue::{InvestigationQueue, PushOutcome};
use crate::stats::CrawlStats;

pub struct Dispatcher {
    engine: CriteriaEngine,
    cache: Arc<CrawlCache>,
    queue: Arc<InvestigationQueue>,
    stats: Arc<CrawlStats>,
    recursion: RecursionPolicy,
}

impl Dispatcher {
    pub fn new(
        engine: CriteriaEngine,
        cache: Arc<CrawlCache>,
        queue: Arc<InvestigationQueue>,
        stats: Arc<CrawlStats>,
        recursion: RecursionPolicy,
    ) -> Self {
        Self {
            engine,
            cache,
            queue,
            stats,
            recursion,
        }
    }

    /// Classify profiles until the resolver closes its channel. After
    /// cancellation the profiles already resolved are still classified and
    /// delivered, so nothing marked Seen is lost on a graceful close.
    pub async fn run(
        self,
        mut profiles: mpsc::Receiver<Profile>,
        matches: mpsc::Sender<Profile>,
        cancel: CancellationToken,
    ) {
        let mut draining = false;
        loop {
            let next = if draining {
                profiles.recv().await
            } else {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        debug!("Dispatcher draining resolved profiles");
                        draining = true;
                        continue;
                    }
                    next = profiles.recv() => next,
                }
            };

            let Some(profile) = next else { break };
            if !self.dispatch(profile, &matches).await {
                break;
            }
        }

        info!("Dispatcher stopped");
    }

    /// Returns false once the match receiver is gone.
    async fn dispatch(&self, profile: Profile, matches: &mpsc::Sender<Profile>) -> bool {
        let id = profile.id;
        let evaluation = self.engine.evaluate(&profile);
        debug!(
            profile_id = %id,
            screen_name = %profile.screen_name,
            matched = evaluation.matched,
            passed = ?evaluation.passed,
            failed = ?evaluation.failed,
            "Profile evaluated"
        );

        if evaluation.matched {
            let url = profile.url();
            // Matched is only recorded once the forwarder owns the profile.
            if matches.send(profile).await.is_err() {
                warn!(profile_id = %id, "Result forwarder gone, match not recorded");
                return false;
            }
            self.cache.add_matched(id);
            self.stats.matched.incr();
            info!(profile_id = %id, "[MATCH] {url}");
        }

        if self.recursion.should_expand(evaluation.matched) {
            enqueue_for_expansion(&self.cache, &self.queue, &self.stats, id);
        }
        true
    }
}

/// Mark `id` as investigating and offer it to the queue. A dropped push is
/// rolled back so the persisted frontier only lists queued nodes.
pub(crate) fn enqueue_for_expansion(
    cache: &CrawlCache,
    queue: &InvestigationQueue,
    stats: &CrawlStats,
    id: ProfileId,
) -> PushOutcome {
    cache.add_investigating(id);
    let outcome = queue.try_push(id);
    match outcome {
        PushOutcome::Queued => stats.expansions_queued.incr(),
        PushOutcome::Dropped => {
            cache.remove_investigating(id);
            stats.expansions_dropped.incr();
            debug!(profile_id = %id, "Investigation queue full, expansion dropped");
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::profile;
    use followscout_common::CriteriaConfig;

    struct Harness {
        cache: Arc<CrawlCache>,
        queue: Arc<InvestigationQueue>,
        stats: Arc<CrawlStats>,
    }

    async fn dispatch(
        criteria: CriteriaConfig,
        recursion: RecursionPolicy,
        capacity: usize,
        input: Vec<Profile>,
    ) -> (Harness, Vec<Profile>) {
        let harness = Harness {
            cache: Arc::new(CrawlCache::new()),
            queue: Arc::new(InvestigationQueue::new(capacity)),
            stats: Arc::new(CrawlStats::new()),
        };
        let dispatcher = Dispatcher::new(
            CriteriaEngine::new(&criteria).unwrap(),
            harness.cache.clone(),
            harness.queue.clone(),
            harness.stats.clone(),
            recursion,
        );

        let (profile_tx, profile_rx) = mpsc::channel(16);
        let (match_tx, mut match_rx) = mpsc::channel(16);
        let task = tokio::spawn(dispatcher.run(profile_rx, match_tx, CancellationToken::new()));
        for p in input {
            profile_tx.send(p).await.unwrap();
        }
        drop(profile_tx);
        task.await.unwrap();

        let mut matched = Vec::new();
        while let Some(p) = match_rx.recv().await {
            matched.push(p);
        }
        (harness, matched)
    }

    fn verified_only() -> CriteriaConfig {
        CriteriaConfig {
            verified: true,
            ..Default::default()
        }
    }

    fn verified(id: i64) -> Profile {
        Profile {
            verified: true,
            ..profile(id)
        }
    }

    #[tokio::test]
    async fn matches_are_recorded_and_forwarded() {
        let (h, matched) = dispatch(
            verified_only(),
            RecursionPolicy::Disabled,
            10,
            vec![profile(1), verified(2), profile(3)],
        )
        .await;

        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].id, ProfileId(2));
        assert!(h.cache.is_matched(ProfileId(2)));
        assert!(!h.cache.is_matched(ProfileId(1)));
        assert!(h.queue.is_empty());
        assert_eq!(h.stats.matched.get(), 1);
    }

    #[tokio::test]
    async fn matched_only_expands_matches() {
        let (h, _) = dispatch(
            verified_only(),
            RecursionPolicy::MatchedOnly,
            10,
            vec![profile(1), verified(2)],
        )
        .await;

        assert_eq!(h.queue.try_pop(), Some(ProfileId(2)));
        assert!(h.queue.is_empty());
        assert_eq!(h.cache.investigating_ids(), vec![ProfileId(2)]);
    }

    #[tokio::test]
    async fn recursion_all_expands_everything() {
        let (h, _) = dispatch(
            verified_only(),
            RecursionPolicy::All,
            10,
            vec![profile(1), verified(2), profile(3)],
        )
        .await;

        assert_eq!(h.queue.len(), 3);
        assert_eq!(h.stats.expansions_queued.get(), 3);
    }

    #[tokio::test]
    async fn cancel_still_delivers_resolved_profiles() {
        let cache = Arc::new(CrawlCache::new());
        let dispatcher = Dispatcher::new(
            CriteriaEngine::new(&verified_only()).unwrap(),
            cache.clone(),
            Arc::new(InvestigationQueue::new(10)),
            Arc::new(CrawlStats::new()),
            RecursionPolicy::Disabled,
        );

        let (profile_tx, profile_rx) = mpsc::channel(8);
        // a full match channel keeps the dispatcher blocked on delivery
        let (match_tx, mut match_rx) = mpsc::channel(1);
        match_tx.send(verified(99)).await.unwrap();

        let cancel = CancellationToken::new();
        let task = tokio::spawn(dispatcher.run(profile_rx, match_tx, cancel.clone()));
        profile_tx.send(verified(2)).await.unwrap();
        profile_tx.send(verified(3)).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        cancel.cancel();
        drop(profile_tx);

        let mut delivered = Vec::new();
        while let Some(p) = match_rx.recv().await {
            delivered.push(p.id);
        }
        task.await.unwrap();

        assert_eq!(delivered, vec![ProfileId(99), ProfileId(2), ProfileId(3)]);
        assert!(cache.is_matched(ProfileId(2)));
        assert!(cache.is_matched(ProfileId(3)));
    }

    #[tokio::test]
    async fn match_is_not_recorded_when_forwarder_is_gone() {
        let cache = Arc::new(CrawlCache::new());
        let dispatcher = Dispatcher::new(
            CriteriaEngine::new(&verified_only()).unwrap(),
            cache.clone(),
            Arc::new(InvestigationQueue::new(10)),
            Arc::new(CrawlStats::new()),
            RecursionPolicy::Disabled,
        );

        let (profile_tx, profile_rx) = mpsc::channel(8);
        let (match_tx, match_rx) = mpsc::channel(1);
        drop(match_rx);
        profile_tx.send(verified(5)).await.unwrap();
        drop(profile_tx);

        dispatcher.run(profile_rx, match_tx, CancellationToken::new()).await;

        assert!(!cache.is_matched(ProfileId(5)));
    }

    #[tokio::test]
    async fn full_queue_drops_and_rolls_back_investigating() {
        let (h, _) = dispatch(
            CriteriaConfig::default(),
            RecursionPolicy::All,
            1,
            vec![profile(1), profile(2)],
        )
        .await;

        assert_eq!(h.queue.len(), 1);
        assert_eq!(h.cache.investigating_ids(), vec![ProfileId(1)]);
        assert!(h.cache.is_seen(ProfileId(2)));
        assert_eq!(h.stats.expansions_dropped.get(), 1);
    }
}
