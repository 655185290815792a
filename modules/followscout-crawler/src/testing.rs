// Test doubles for the crawl pipeline.
//
// - MockGraphSource (GraphSource): in-memory profiles and paged neighbor
//   lists, scripted failures, call recording
// - RecordingSink (ResultSink): keeps every delivered batch
// - FailingSink (ResultSink): always errors
//
// Plus `profile()` for building fixtures.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use followscout_common::{AccountRef, Profile, ProfileId, SourceError};
use tokio::sync::Notify;

use crate::sink::ResultSink;
use crate::traits::{Direction, GraphSource, NeighborPage};

/// Unverified, unprotected profile `user<id>` with middling counts.
pub fn profile(id: i64) -> Profile {
    Profile {
        id: ProfileId(id),
        screen_name: format!("user{id}"),
        display_name: format!("User {id}"),
        bio: String::new(),
        location: String::new(),
        followers_count: 500,
        following_count: 300,
        likes_count: 1_000,
        statuses_count: 2_000,
        listed_count: 5,
        joined_at: Utc
            .with_ymd_and_hms(2015, 6, 1, 0, 0, 0)
            .single()
            .unwrap_or_default(),
        verified: false,
        protected: false,
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// MockGraphSource
// ---------------------------------------------------------------------------

/// One recorded neighbor-page request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCall {
    pub direction: Direction,
    pub account: AccountRef,
    pub cursor: Option<String>,
}

/// HashMap-backed graph. Unknown IDs are omitted from lookups and unknown
/// accounts have no neighbors.
/// Builder pattern: `.with_profiles()`, `.on_following()`, `.on_followers()`,
/// `.fail_lookups()`, `.fail_next_pages()`, `.fail_pages_for()`.
#[derive(Default)]
pub struct MockGraphSource {
    profiles: HashMap<ProfileId, Profile>,
    following: HashMap<AccountRef, Vec<Vec<Profile>>>,
    followers: HashMap<AccountRef, Vec<Vec<Profile>>>,
    broken_accounts: HashMap<AccountRef, SourceError>,
    lookup_failures: Mutex<VecDeque<SourceError>>,
    page_failures: Mutex<VecDeque<SourceError>>,
    lookup_calls: Mutex<Vec<Vec<ProfileId>>>,
    page_calls: Mutex<Vec<PageCall>>,
}

impl MockGraphSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profiles(mut self, profiles: impl IntoIterator<Item = Profile>) -> Self {
        for p in profiles {
            self.profiles.insert(p.id, p);
        }
        self
    }

    /// Pages of accounts that `account` follows. The profiles also become
    /// resolvable through lookup.
    pub fn on_following(mut self, account: AccountRef, pages: Vec<Vec<Profile>>) -> Self {
        self = self.with_profiles(pages.iter().flatten().cloned());
        self.following.insert(account, pages);
        self
    }

    pub fn on_followers(mut self, account: AccountRef, pages: Vec<Vec<Profile>>) -> Self {
        self = self.with_profiles(pages.iter().flatten().cloned());
        self.followers.insert(account, pages);
        self
    }

    /// The next lookups fail with these errors, in order.
    pub fn fail_lookups(self, errors: impl IntoIterator<Item = SourceError>) -> Self {
        lock(&self.lookup_failures).extend(errors);
        self
    }

    /// The next page requests, for any account, fail with these errors.
    pub fn fail_next_pages(self, errors: impl IntoIterator<Item = SourceError>) -> Self {
        lock(&self.page_failures).extend(errors);
        self
    }

    /// Every page request for `account` fails with `error`.
    pub fn fail_pages_for(mut self, account: AccountRef, error: SourceError) -> Self {
        self.broken_accounts.insert(account, error);
        self
    }

    pub fn lookup_calls(&self) -> Vec<Vec<ProfileId>> {
        lock(&self.lookup_calls).clone()
    }

    pub fn page_calls(&self) -> Vec<PageCall> {
        lock(&self.page_calls).clone()
    }

    fn page(
        &self,
        direction: Direction,
        account: &AccountRef,
        cursor: Option<&str>,
    ) -> Result<NeighborPage, SourceError> {
        lock(&self.page_calls).push(PageCall {
            direction,
            account: account.clone(),
            cursor: cursor.map(str::to_string),
        });

        if let Some(err) = lock(&self.page_failures).pop_front() {
            return Err(err);
        }
        if let Some(err) = self.broken_accounts.get(account) {
            return Err(err.clone());
        }

        let pages = match direction {
            Direction::Following => self.following.get(account),
            Direction::Followers => self.followers.get(account),
        };
        let Some(pages) = pages else {
            return Ok(NeighborPage::default());
        };

        let index: usize = cursor.and_then(|c| c.parse().ok()).unwrap_or(0);
        let profiles = pages.get(index).cloned().unwrap_or_default();
        let next_cursor = (index + 1 < pages.len()).then(|| (index + 1).to_string());
        Ok(NeighborPage {
            profiles,
            next_cursor,
        })
    }
}

#[async_trait]
impl GraphSource for MockGraphSource {
    async fn lookup_profiles(&self, ids: &[ProfileId]) -> Result<Vec<Profile>, SourceError> {
        lock(&self.lookup_calls).push(ids.to_vec());
        if let Some(err) = lock(&self.lookup_failures).pop_front() {
            return Err(err);
        }
        Ok(ids
            .iter()
            .filter_map(|id| self.profiles.get(id).cloned())
            .collect())
    }

    async fn fetch_following_page(
        &self,
        account: &AccountRef,
        cursor: Option<&str>,
    ) -> Result<NeighborPage, SourceError> {
        self.page(Direction::Following, account, cursor)
    }

    async fn fetch_followers_page(
        &self,
        account: &AccountRef,
        cursor: Option<&str>,
    ) -> Result<NeighborPage, SourceError> {
        self.page(Direction::Followers, account, cursor)
    }
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// Records every delivered batch.
#[derive(Default)]
pub struct RecordingSink {
    batches: Mutex<Vec<Vec<Profile>>>,
    stored: Notify,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batches(&self) -> Vec<Vec<Profile>> {
        lock(&self.batches).clone()
    }

    /// Wait until at least `n` batches have been stored. Returns false on timeout.
    pub async fn wait_for_batches(&self, n: usize, timeout: Duration) -> bool {
        let wait = async {
            loop {
                let notified = self.stored.notified();
                if lock(&self.batches).len() >= n {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }
}

#[async_trait]
impl ResultSink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    async fn store(&self, batch: &[Profile]) -> anyhow::Result<()> {
        lock(&self.batches).push(batch.to_vec());
        self.stored.notify_waiters();
        Ok(())
    }
}

/// Fails every delivery.
pub struct FailingSink;

#[async_trait]
impl ResultSink for FailingSink {
    fn name(&self) -> &str {
        "failing"
    }

    async fn store(&self, _batch: &[Profile]) -> anyhow::Result<()> {
        anyhow::bail!("FailingSink: store rejected")
    }
}
