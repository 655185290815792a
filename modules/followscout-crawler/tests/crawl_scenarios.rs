//! End-to-end crawl scenarios against the in-memory graph source.

use std::sync::Arc;
use std::time::Duration;

use followscout_common::{
    AccountRef, CriteriaConfig, FileConfig, Profile, ProfileId, RecursionPolicy, SourceError,
};
use followscout_crawler::cache::SEEN_FILE;
use followscout_crawler::resolver::BatchResolver;
use followscout_crawler::testing::{profile, MockGraphSource, RecordingSink};
use followscout_crawler::{
    CrawlCache, CrawlStats, CriteriaEngine, FrontierState, Pipeline, PipelineDeps, RetryPolicy,
    SinkFanout,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn alice() -> AccountRef {
    AccountRef::ScreenName("alice".into())
}

fn verified(id: i64) -> Profile {
    Profile {
        verified: true,
        ..profile(id)
    }
}

fn base_config(dir: &std::path::Path) -> FileConfig {
    let mut config = FileConfig::for_seed("alice");
    config.storage_dir = dir.to_path_buf();
    config.crawl.batch_linger_ms = 20;
    config.crawl.retry_backoff_secs = 0;
    config
}

fn pipeline(
    config: FileConfig,
    criteria: CriteriaConfig,
    source: Arc<MockGraphSource>,
    sink: Arc<RecordingSink>,
) -> Pipeline {
    Pipeline::new(
        config,
        PipelineDeps {
            source,
            cache: Arc::new(CrawlCache::new()),
            engine: CriteriaEngine::new(&criteria).unwrap(),
            sinks: SinkFanout::new().with(sink),
        },
    )
}

/// Wait until `n` profiles have been stored, however they were batched.
async fn wait_for_matches(sink: &RecordingSink, n: usize) -> bool {
    let poll = async {
        while sink.batches().concat().len() < n {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(5), poll).await.is_ok()
}

#[tokio::test]
async fn verified_following_of_seed_is_stored_once_without_expansion() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(MockGraphSource::new().on_following(
        alice(),
        vec![vec![profile(1), verified(2), profile(3)]],
    ));
    let sink = Arc::new(RecordingSink::new());

    let mut config = base_config(dir.path());
    config.following = true;
    config.followers = false;
    config.recursion = RecursionPolicy::Disabled;
    let criteria = CriteriaConfig {
        verified: true,
        ..Default::default()
    };

    let mut pipeline = pipeline(config, criteria, source.clone(), sink.clone());
    let state = pipeline.frontier_state();
    pipeline.start().unwrap();

    assert!(sink.wait_for_batches(1, Duration::from_secs(5)).await);
    // give any stray expansion a chance to show up
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(*state.borrow(), FrontierState::Expanding);
    let stats = pipeline.close().await;

    assert_eq!(sink.batches(), vec![vec![verified(2)]]);
    assert_eq!(stats.matched, 1);
    assert_eq!(stats.expansions_queued, 0);
    assert_eq!(stats.nodes_expanded, 1);
    // only the seed's following list was ever requested
    let calls = source.page_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].account, alice());
    assert_eq!(*state.borrow(), FrontierState::Closed);
}

#[tokio::test]
async fn matched_only_recursion_expands_matches() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(
        MockGraphSource::new()
            .on_following(alice(), vec![vec![profile(1), verified(2)]])
            .on_following(AccountRef::Id(ProfileId(2)), vec![vec![verified(3)]])
            .on_following(AccountRef::Id(ProfileId(1)), vec![vec![verified(4)]]),
    );
    let sink = Arc::new(RecordingSink::new());

    let mut config = base_config(dir.path());
    config.followers = false;
    config.recursion = RecursionPolicy::MatchedOnly;
    let criteria = CriteriaConfig {
        verified: true,
        ..Default::default()
    };

    let mut pipeline = pipeline(config, criteria, source.clone(), sink.clone());
    pipeline.start().unwrap();
    assert!(wait_for_matches(&sink, 2).await);
    tokio::time::sleep(Duration::from_millis(200)).await;
    let stats = pipeline.close().await;

    let stored: Vec<ProfileId> = sink.batches().concat().iter().map(|p| p.id).collect();
    assert!(stored.contains(&ProfileId(2)));
    assert!(stored.contains(&ProfileId(3)));
    // profile 1 never matched, so its neighbors were never fetched
    assert!(!stored.contains(&ProfileId(4)));
    assert!(source
        .page_calls()
        .iter()
        .all(|c| c.account != AccountRef::Id(ProfileId(1))));
    assert_eq!(stats.nodes_expanded, 3);
}

#[tokio::test]
async fn cross_links_are_resolved_once() {
    let dir = tempfile::tempdir().unwrap();
    // 1 and 2 follow each other and both follow alice's followings back
    let source = Arc::new(
        MockGraphSource::new()
            .on_following(alice(), vec![vec![profile(1), profile(2)]])
            .on_following(AccountRef::Id(ProfileId(1)), vec![vec![profile(2), profile(3)]])
            .on_following(AccountRef::Id(ProfileId(2)), vec![vec![profile(1), profile(3)]]),
    );
    let sink = Arc::new(RecordingSink::new());

    let mut config = base_config(dir.path());
    config.followers = false;
    config.recursion = RecursionPolicy::All;

    let mut pipeline = pipeline(config, CriteriaConfig::default(), source.clone(), sink.clone());
    pipeline.start().unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    let stats = pipeline.close().await;

    let mut looked_up: Vec<ProfileId> = source.lookup_calls().concat();
    looked_up.sort();
    assert_eq!(looked_up, vec![ProfileId(1), ProfileId(2), ProfileId(3)]);
    assert_eq!(stats.resolved, 3);
    // 2 via node 1; 1 and 3 via node 2
    assert_eq!(stats.skipped_seen, 3);
}

#[tokio::test]
async fn resume_skips_ids_seen_in_previous_run() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(SEEN_FILE), r#"{"10": true, "20": true}"#).unwrap();

    let cache = Arc::new(CrawlCache::new());
    cache.load(dir.path());

    let source = Arc::new(
        MockGraphSource::new().with_profiles([profile(10), profile(20), profile(30)]),
    );
    let stats = Arc::new(CrawlStats::new());
    let resolver = BatchResolver::new(
        source.clone(),
        cache,
        stats.clone(),
        RetryPolicy::default(),
        100,
        Duration::from_millis(20),
    );

    let (id_tx, id_rx) = mpsc::channel(8);
    let (profile_tx, mut profile_rx) = mpsc::channel(8);
    let task = tokio::spawn(resolver.run(id_rx, profile_tx, CancellationToken::new()));
    for id in [10, 20, 30] {
        id_tx.send(ProfileId(id)).await.unwrap();
    }
    drop(id_tx);
    task.await.unwrap();

    assert_eq!(source.lookup_calls(), vec![vec![ProfileId(30)]]);
    assert_eq!(stats.skipped_seen.get(), 2);
    assert_eq!(profile_rx.recv().await.map(|p| p.id), Some(ProfileId(30)));
}

#[tokio::test]
async fn transient_page_failures_are_retried() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(
        MockGraphSource::new()
            .on_following(alice(), vec![vec![profile(1)]])
            .fail_next_pages([
                SourceError::Transient("502 bad gateway".into()),
                SourceError::Transient("502 bad gateway".into()),
            ]),
    );
    let sink = Arc::new(RecordingSink::new());

    let mut config = base_config(dir.path());
    config.followers = false;
    config.recursion = RecursionPolicy::Disabled;

    let mut pipeline = pipeline(config, CriteriaConfig::default(), source.clone(), sink.clone());
    pipeline.start().unwrap();
    assert!(sink.wait_for_batches(1, Duration::from_secs(5)).await);
    let stats = pipeline.close().await;

    assert_eq!(source.page_calls().len(), 3);
    assert_eq!(stats.nodes_abandoned, 0);
    assert_eq!(sink.batches()[0][0].id, ProfileId(1));
}

#[tokio::test]
async fn close_interrupts_rate_limit_wait() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(MockGraphSource::new().fail_next_pages([SourceError::RateLimited {
        reset_at: chrono::Utc::now() + chrono::Duration::hours(1),
    }]));
    let sink = Arc::new(RecordingSink::new());

    let mut config = base_config(dir.path());
    config.followers = false;

    let mut pipeline = pipeline(config, CriteriaConfig::default(), source.clone(), sink.clone());
    let state = pipeline.frontier_state();
    pipeline.start().unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(*state.borrow(), FrontierState::Seeding);

    let closed = tokio::time::timeout(Duration::from_secs(2), pipeline.close()).await;
    assert!(closed.is_ok());
    assert_eq!(*state.borrow(), FrontierState::Closed);
    assert_eq!(source.page_calls().len(), 1);
}
