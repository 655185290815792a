//! Frontier controller: seeds the crawl from the configured account, then
//! expands queued profiles one at a time.
//!
//! Each node's pages are fetched sequentially along the cursor chain and the
//! neighbor IDs are streamed to the resolver. A node leaves Investigating once
//! its pages are done or it has been abandoned. On cancellation the node in
//! flight stays in Investigating so a resumed run picks it up again.

use std::sync::Arc;

use followscout_common::{AccountRef, ProfileId};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::CrawlCache;
use crate::queue::InvestigationQueue;
use crate::retry::{with_retry, CallError, RetryPolicy};
use crate::stats::CrawlStats;
use crate::traits::{Direction, GraphSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrontierState {
    Idle,
    Seeding,
    Expanding,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeOutcome {
    Completed { discovered: usize },
    Abandoned,
    Cancelled,
}

pub struct FrontierController {
    source: Arc<dyn GraphSource>,
    cache: Arc<CrawlCache>,
    queue: Arc<InvestigationQueue>,
    stats: Arc<CrawlStats>,
    retry: RetryPolicy,
    seed: AccountRef,
    directions: Vec<Direction>,
    state: watch::Sender<FrontierState>,
}

impl FrontierController {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: Arc<dyn GraphSource>,
        cache: Arc<CrawlCache>,
        queue: Arc<InvestigationQueue>,
        stats: Arc<CrawlStats>,
        retry: RetryPolicy,
        seed: AccountRef,
        directions: Vec<Direction>,
        state: watch::Sender<FrontierState>,
    ) -> Self {
        Self {
            source,
            cache,
            queue,
            stats,
            retry,
            seed,
            directions,
            state,
        }
    }

    pub async fn run(self, candidates: mpsc::Sender<ProfileId>, cancel: CancellationToken) {
        self.state.send_replace(FrontierState::Seeding);
        info!(seed = %self.seed, "Seeding frontier");

        let seed = self.seed.clone();
        match self.expand_node(&seed, &candidates, &cancel).await {
            NodeOutcome::Completed { discovered } => {
                self.stats.nodes_expanded.incr();
                info!(seed = %seed, discovered, "Seed expanded");
            }
            NodeOutcome::Abandoned => self.stats.nodes_abandoned.incr(),
            NodeOutcome::Cancelled => {
                self.close();
                return;
            }
        }

        self.state.send_replace(FrontierState::Expanding);
        while let Some(id) = self.queue.pop(&cancel).await {
            let account = AccountRef::Id(id);
            match self.expand_node(&account, &candidates, &cancel).await {
                NodeOutcome::Completed { discovered } => {
                    self.cache.remove_investigating(id);
                    self.stats.nodes_expanded.incr();
                    debug!(profile_id = %id, discovered, "Node expanded");
                }
                NodeOutcome::Abandoned => {
                    self.cache.remove_investigating(id);
                    self.stats.nodes_abandoned.incr();
                }
                NodeOutcome::Cancelled => break,
            }
        }

        self.close();
    }

    fn close(&self) {
        self.state.send_replace(FrontierState::Closed);
        info!("Frontier closed");
    }

    async fn expand_node(
        &self,
        account: &AccountRef,
        candidates: &mpsc::Sender<ProfileId>,
        cancel: &CancellationToken,
    ) -> NodeOutcome {
        let mut discovered = 0;
        for &direction in &self.directions {
            match self.walk_pages(account, direction, candidates, cancel).await {
                Ok(n) => discovered += n,
                Err(CallError::Cancelled) => return NodeOutcome::Cancelled,
                Err(e) => {
                    warn!(
                        account = %account,
                        direction = direction.as_str(),
                        error = %e,
                        "Abandoning node expansion"
                    );
                    return NodeOutcome::Abandoned;
                }
            }
        }
        NodeOutcome::Completed { discovered }
    }

    /// Follow one direction's cursor chain to the end, forwarding every
    /// neighbor ID. Returns the number of IDs forwarded.
    async fn walk_pages(
        &self,
        account: &AccountRef,
        direction: Direction,
        candidates: &mpsc::Sender<ProfileId>,
        cancel: &CancellationToken,
    ) -> Result<usize, CallError> {
        let source = &self.source;
        let mut cursor: Option<String> = None;
        let mut forwarded = 0;

        loop {
            let cursor_ref = cursor.as_deref();
            let page = with_retry(&self.retry, cancel, direction.as_str(), || {
                source.fetch_page(direction, account, cursor_ref)
            })
            .await?;

            for profile in &page.profiles {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(CallError::Cancelled),
                    sent = candidates.send(profile.id) => {
                        if sent.is_err() {
                            return Err(CallError::Cancelled);
                        }
                    }
                }
                forwarded += 1;
            }

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => return Ok(forwarded),
            }
        }
    }
}

pub(crate) fn directions(following: bool, followers: bool) -> Vec<Direction> {
    let mut directions = Vec::with_capacity(2);
    if following {
        directions.push(Direction::Following);
    }
    if followers {
        directions.push(Direction::Followers);
    }
    directions
}
