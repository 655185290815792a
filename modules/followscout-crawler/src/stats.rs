use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic event counter shared across workers.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn incr(&self) {
        self.add(1);
    }

    pub fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Running totals for one crawl process.
#[derive(Debug, Default)]
pub struct CrawlStats {
    /// Candidate IDs received by the resolver.
    pub candidates: Counter,
    /// Candidates skipped because they were already in Seen.
    pub skipped_seen: Counter,
    pub resolved: Counter,
    /// Lookup batches dropped after a permanent or exhausted failure.
    pub lookup_failures: Counter,
    pub matched: Counter,
    pub expansions_queued: Counter,
    /// Persisted frontier entries re-queued at start.
    pub resumed: Counter,
    /// Expansions dropped because the investigation queue was full.
    pub expansions_dropped: Counter,
    pub nodes_expanded: Counter,
    pub nodes_abandoned: Counter,
    pub batches_stored: Counter,
}

impl CrawlStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            candidates: self.candidates.get(),
            skipped_seen: self.skipped_seen.get(),
            resolved: self.resolved.get(),
            lookup_failures: self.lookup_failures.get(),
            matched: self.matched.get(),
            expansions_queued: self.expansions_queued.get(),
            resumed: self.resumed.get(),
            expansions_dropped: self.expansions_dropped.get(),
            nodes_expanded: self.nodes_expanded.get(),
            nodes_abandoned: self.nodes_abandoned.get(),
            batches_stored: self.batches_stored.get(),
        }
    }
}

impl fmt::Display for CrawlStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.snapshot().fmt(f)
    }
}

/// Point-in-time copy of [`CrawlStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub candidates: u64,
    pub skipped_seen: u64,
    pub resolved: u64,
    pub lookup_failures: u64,
    pub matched: u64,
    pub expansions_queued: u64,
    pub resumed: u64,
    pub expansions_dropped: u64,
    pub nodes_expanded: u64,
    pub nodes_abandoned: u64,
    pub batches_stored: u64,
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "candidates={} skipped_seen={} resolved={} lookup_failures={} matched={} \
             expansions(queued={} resumed={} dropped={}) nodes(expanded={} abandoned={}) batches_stored={}",
            self.candidates,
            self.skipped_seen,
            self.resolved,
            self.lookup_failures,
            self.matched,
            self.expansions_queued,
            self.resumed,
            self.expansions_dropped,
            self.nodes_expanded,
            self.nodes_abandoned,
            self.batches_stored,
        )
    }
}
