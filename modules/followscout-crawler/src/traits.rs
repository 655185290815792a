// Trait abstractions for the crawl pipeline's external collaborators.
//
// GraphSource wraps the platform API: bulk profile lookup plus the two
// cursor-paginated neighbor listings. ResultSink lives in `sink.rs`.
//
// The pipeline only ever sees these traits, so tests run against
// MockGraphSource with no network.

use async_trait::async_trait;
use followscout_common::{AccountRef, Profile, ProfileId, SourceError};
use twitter_client::{AccountKey, TwitterClient, TwitterError, User, MAX_LOOKUP_IDS};

/// One page of an account's neighbors.
#[derive(Debug, Clone, Default)]
pub struct NeighborPage {
    pub profiles: Vec<Profile>,
    /// `None` once the last page has been returned.
    pub next_cursor: Option<String>,
}

/// Which edge of the follow graph to walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Following,
    Followers,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Following => "following",
            Direction::Followers => "followers",
        }
    }
}

// ---------------------------------------------------------------------------
// GraphSource
// ---------------------------------------------------------------------------

#[async_trait]
pub trait GraphSource: Send + Sync {
    /// Resolve full profiles for a batch of IDs. Unknown IDs are omitted.
    async fn lookup_profiles(&self, ids: &[ProfileId]) -> Result<Vec<Profile>, SourceError>;

    /// One page of accounts that `account` follows. `cursor = None` is the first page.
    async fn fetch_following_page(
        &self,
        account: &AccountRef,
        cursor: Option<&str>,
    ) -> Result<NeighborPage, SourceError>;

    /// One page of accounts following `account`.
    async fn fetch_followers_page(
        &self,
        account: &AccountRef,
        cursor: Option<&str>,
    ) -> Result<NeighborPage, SourceError>;

    async fn fetch_page(
        &self,
        direction: Direction,
        account: &AccountRef,
        cursor: Option<&str>,
    ) -> Result<NeighborPage, SourceError> {
        match direction {
            Direction::Following => self.fetch_following_page(account, cursor).await,
            Direction::Followers => self.fetch_followers_page(account, cursor).await,
        }
    }
}

#[async_trait]
impl GraphSource for TwitterClient {
    async fn lookup_profiles(&self, ids: &[ProfileId]) -> Result<Vec<Profile>, SourceError> {
        let raw: Vec<i64> = ids.iter().map(|id| id.get()).collect();
        let mut profiles = Vec::with_capacity(raw.len());
        for chunk in raw.chunks(MAX_LOOKUP_IDS) {
            let users = self.lookup_users(chunk).await.map_err(classify)?;
            profiles.extend(users.into_iter().map(profile_from_user));
        }
        Ok(profiles)
    }

    async fn fetch_following_page(
        &self,
        account: &AccountRef,
        cursor: Option<&str>,
    ) -> Result<NeighborPage, SourceError> {
        let page = self
            .following_page(account_key(account), cursor)
            .await
            .map_err(classify)?;
        Ok(NeighborPage {
            profiles: page.users.into_iter().map(profile_from_user).collect(),
            next_cursor: page.next_cursor,
        })
    }

    async fn fetch_followers_page(
        &self,
        account: &AccountRef,
        cursor: Option<&str>,
    ) -> Result<NeighborPage, SourceError> {
        let page = self
            .followers_page(account_key(account), cursor)
            .await
            .map_err(classify)?;
        Ok(NeighborPage {
            profiles: page.users.into_iter().map(profile_from_user).collect(),
            next_cursor: page.next_cursor,
        })
    }
}

fn account_key(account: &AccountRef) -> AccountKey<'_> {
    match account {
        AccountRef::Id(id) => AccountKey::UserId(id.get()),
        AccountRef::ScreenName(name) => AccountKey::ScreenName(name),
    }
}

/// Map client errors onto the retry taxonomy. Server errors and network
/// failures are transient; other HTTP errors and bad payloads are not.
fn classify(err: TwitterError) -> SourceError {
    match err {
        TwitterError::RateLimited { reset_at } => SourceError::RateLimited { reset_at },
        TwitterError::Network(message) => SourceError::Transient(message),
        TwitterError::Api { status, message } if status >= 500 => {
            SourceError::Transient(format!("status {status}: {message}"))
        }
        TwitterError::Api { status, message } => SourceError::Permanent { status, message },
        TwitterError::Parse(message) => SourceError::Permanent { status: 0, message },
    }
}

pub(crate) fn profile_from_user(user: User) -> Profile {
    let joined_at = user.joined_at();
    Profile {
        id: ProfileId(user.id),
        screen_name: user.screen_name,
        display_name: user.name,
        bio: user.description.unwrap_or_default(),
        location: user.location.unwrap_or_default(),
        followers_count: user.followers_count,
        following_count: user.friends_count,
        likes_count: user.favourites_count,
        statuses_count: user.statuses_count,
        listed_count: user.listed_count,
        joined_at,
        verified: user.verified,
        protected: user.protected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn server_errors_are_transient() {
        let err = classify(TwitterError::Api {
            status: 503,
            message: "over capacity".into(),
        });
        assert!(matches!(err, SourceError::Transient(_)));
    }

    #[test]
    fn client_errors_are_permanent() {
        let err = classify(TwitterError::Api {
            status: 401,
            message: "not authorized".into(),
        });
        assert!(matches!(err, SourceError::Permanent { status: 401, .. }));
    }

    #[test]
    fn rate_limit_keeps_reset_time() {
        let reset_at = Utc::now();
        let err = classify(TwitterError::RateLimited { reset_at });
        assert!(matches!(err, SourceError::RateLimited { reset_at: r } if r == reset_at));
    }

    #[test]
    fn user_fields_map_onto_profile() {
        let user: User = serde_json::from_str(
            r#"{"id": 42, "screen_name": "ferris", "name": "Ferris",
                "description": null, "friends_count": 7, "favourites_count": 3,
                "created_at": "Tue Feb 20 14:35:54 +0000 2007", "protected": true}"#,
        )
        .unwrap();
        let profile = profile_from_user(user);
        assert_eq!(profile.id, ProfileId(42));
        assert_eq!(profile.display_name, "Ferris");
        assert_eq!(profile.bio, "");
        assert_eq!(profile.following_count, 7);
        assert_eq!(profile.likes_count, 3);
        assert!(profile.protected);
        assert_eq!(profile.url(), "https://twitter.com/ferris");
    }
}
