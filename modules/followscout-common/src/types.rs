use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Platform account identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileId(pub i64);

impl ProfileId {
    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for ProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ProfileId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(ProfileId)
    }
}

impl From<i64> for ProfileId {
    fn from(id: i64) -> Self {
        ProfileId(id)
    }
}

/// How a neighbor-page request addresses an account. The seed is usually a
/// screen name; nodes discovered during the crawl are addressed by ID.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AccountRef {
    Id(ProfileId),
    ScreenName(String),
}

impl fmt::Display for AccountRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountRef::Id(id) => write!(f, "#{id}"),
            AccountRef::ScreenName(name) => write!(f, "@{name}"),
        }
    }
}

impl From<ProfileId> for AccountRef {
    fn from(id: ProfileId) -> Self {
        AccountRef::Id(id)
    }
}

/// Immutable snapshot of one account's public attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: ProfileId,
    pub screen_name: String,
    pub display_name: String,
    pub bio: String,
    pub location: String,
    pub followers_count: i64,
    pub following_count: i64,
    pub likes_count: i64,
    pub statuses_count: i64,
    pub listed_count: i64,
    pub joined_at: DateTime<Utc>,
    pub verified: bool,
    pub protected: bool,
}

impl Profile {
    /// Public profile URL.
    pub fn url(&self) -> String {
        format!("https://twitter.com/{}", self.screen_name)
    }
}
