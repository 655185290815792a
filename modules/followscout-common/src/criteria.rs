//! Criteria configuration as read from the config file.
//!
//! These are plain values; the crawler compiles them into predicate objects
//! once at startup. Keyword lists are matched case-insensitively and a
//! leading `-` marks an exclusion keyword.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CriteriaError;

/// Prefix marking an exclusion keyword.
pub const EXCLUDE_PREFIX: char = '-';

/// Exclusive `(from, to)` bounds on a counter. Zero means unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CountRange {
    pub from: i64,
    pub to: i64,
}

impl CountRange {
    pub fn new(from: i64, to: i64) -> Self {
        Self { from, to }
    }

    pub fn is_active(&self) -> bool {
        self.from > 0 || self.to > 0
    }

    fn validate(&self, field: &'static str) -> Result<(), CriteriaError> {
        if self.from < 0 || self.to < 0 {
            return Err(CriteriaError::NegativeBound { field });
        }
        if self.from > 0 && self.to > 0 && self.from >= self.to {
            return Err(CriteriaError::InvalidRange {
                field,
                from: self.from,
                to: self.to,
            });
        }
        Ok(())
    }
}

/// Exclusive bounds on a timestamp. Written as RFC 3339 strings in TOML,
/// e.g. `joined = { from = "2015-01-01T00:00:00Z" }`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DateRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn is_active(&self) -> bool {
        self.from.is_some() || self.to.is_some()
    }

    fn validate(&self, field: &'static str) -> Result<(), CriteriaError> {
        if let (Some(from), Some(to)) = (self.from, self.to) {
            if from >= to {
                return Err(CriteriaError::InvalidDateRange { field, from, to });
            }
        }
        Ok(())
    }
}

/// The configured predicate a profile must satisfy to be matched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CriteriaConfig {
    pub handle: Vec<String>,
    pub name: Vec<String>,
    pub bio: Vec<String>,
    pub location: Vec<String>,
    pub followers: CountRange,
    pub following: CountRange,
    pub likes: CountRange,
    pub tweets: CountRange,
    pub lists: CountRange,
    pub joined: DateRange,
    pub verified: bool,
}

impl CriteriaConfig {
    /// Reject configurations that can never match or are malformed.
    pub fn validate(&self) -> Result<(), CriteriaError> {
        for (field, keywords) in [
            ("handle", &self.handle),
            ("name", &self.name),
            ("bio", &self.bio),
            ("location", &self.location),
        ] {
            if keywords.iter().any(|k| {
                let k = k.trim();
                k.len() == 1 && k.starts_with(EXCLUDE_PREFIX)
            }) {
                return Err(CriteriaError::EmptyKeyword { field });
            }
        }

        self.followers.validate("followers")?;
        self.following.validate("following")?;
        self.likes.validate("likes")?;
        self.tweets.validate("tweets")?;
        self.lists.validate("lists")?;
        self.joined.validate("joined")?;
        Ok(())
    }
}
