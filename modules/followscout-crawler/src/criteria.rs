//! Criteria engine: compiles the configured criteria into a list of named
//! predicate objects and evaluates profiles against all of them.
//!
//! Keyword fields are scanned in configured order. An exclusion keyword
//! (`-word`) that matches fails the field immediately, even after an earlier
//! positive hit; otherwise any positive hit passes the field. Keyword lists
//! with fewer than two entries are compiled out. Numeric and date ranges use
//! exclusive bounds. Protected accounts never match.

use chrono::{DateTime, Utc};
use followscout_common::criteria::EXCLUDE_PREFIX;
use followscout_common::{CountRange, CriteriaConfig, CriteriaError, DateRange, Profile};
use tracing::{info, warn};

/// A single named predicate over a profile.
pub trait Filter: Send + Sync {
    fn name(&self) -> &'static str;
    fn matches(&self, profile: &Profile) -> bool;
}

/// Result of evaluating one profile, with the per-filter breakdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub matched: bool,
    pub passed: Vec<&'static str>,
    pub failed: Vec<&'static str>,
}

// ---------------------------------------------------------------------------
// Keyword filters
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextField {
    Handle,
    Name,
    Bio,
    Location,
}

impl TextField {
    fn filter_name(self) -> &'static str {
        match self {
            TextField::Handle => "HANDLE",
            TextField::Name => "NAME",
            TextField::Bio => "BIO",
            TextField::Location => "LOCATION",
        }
    }

    fn value(self, profile: &Profile) -> &str {
        match self {
            TextField::Handle => &profile.screen_name,
            TextField::Name => &profile.display_name,
            TextField::Bio => &profile.bio,
            TextField::Location => &profile.location,
        }
    }
}

#[derive(Debug, Clone)]
struct Keyword {
    needle: String,
    exclude: bool,
}

#[derive(Debug, Clone)]
pub struct KeywordFilter {
    field: TextField,
    keywords: Vec<Keyword>,
}

impl KeywordFilter {
    pub fn new(field: TextField, keywords: &[String]) -> Self {
        let keywords = keywords
            .iter()
            .map(|raw| raw.trim())
            .map(|raw| match raw.strip_prefix(EXCLUDE_PREFIX) {
                Some(rest) => Keyword {
                    needle: rest.to_lowercase(),
                    exclude: true,
                },
                None => Keyword {
                    needle: raw.to_lowercase(),
                    exclude: false,
                },
            })
            .collect();
        Self { field, keywords }
    }
}

impl Filter for KeywordFilter {
    fn name(&self) -> &'static str {
        self.field.filter_name()
    }

    fn matches(&self, profile: &Profile) -> bool {
        let haystack = self.field.value(profile).to_lowercase();
        let mut hit = false;
        for keyword in &self.keywords {
            if !haystack.contains(&keyword.needle) {
                continue;
            }
            if keyword.exclude {
                return false;
            }
            hit = true;
        }
        hit
    }
}

// ---------------------------------------------------------------------------
// Range filters
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountField {
    Followers,
    Following,
    Likes,
    Tweets,
    Lists,
}

impl CountField {
    fn filter_name(self) -> &'static str {
        match self {
            CountField::Followers => "FOLLOWERS",
            CountField::Following => "FOLLOWING",
            CountField::Likes => "LIKES",
            CountField::Tweets => "TWEETS",
            CountField::Lists => "LISTS",
        }
    }

    fn value(self, profile: &Profile) -> i64 {
        match self {
            CountField::Followers => profile.followers_count,
            CountField::Following => profile.following_count,
            CountField::Likes => profile.likes_count,
            CountField::Tweets => profile.statuses_count,
            CountField::Lists => profile.listed_count,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CountFilter {
    field: CountField,
    range: CountRange,
}

impl CountFilter {
    pub fn new(field: CountField, range: CountRange) -> Self {
        Self { field, range }
    }
}

impl Filter for CountFilter {
    fn name(&self) -> &'static str {
        self.field.filter_name()
    }

    fn matches(&self, profile: &Profile) -> bool {
        let count = self.field.value(profile);
        if self.range.from > 0 && count <= self.range.from {
            return false;
        }
        if self.range.to > 0 && count >= self.range.to {
            return false;
        }
        true
    }
}

#[derive(Debug, Clone)]
pub struct JoinedFilter {
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
}

impl JoinedFilter {
    pub fn new(range: DateRange) -> Self {
        Self {
            from: range.from,
            to: range.to,
        }
    }
}

impl Filter for JoinedFilter {
    fn name(&self) -> &'static str {
        "JOINED"
    }

    fn matches(&self, profile: &Profile) -> bool {
        if self.from.is_some_and(|from| profile.joined_at <= from) {
            return false;
        }
        if self.to.is_some_and(|to| profile.joined_at >= to) {
            return false;
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Flag filters
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct VerifiedFilter;

impl Filter for VerifiedFilter {
    fn name(&self) -> &'static str {
        "VERIFIED"
    }

    fn matches(&self, profile: &Profile) -> bool {
        profile.verified
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ProtectedFilter;

impl Filter for ProtectedFilter {
    fn name(&self) -> &'static str {
        "PROTECTED"
    }

    fn matches(&self, profile: &Profile) -> bool {
        !profile.protected
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Compiled criteria. Built once at startup; evaluation is pure.
pub struct CriteriaEngine {
    filters: Vec<Box<dyn Filter>>,
}

impl CriteriaEngine {
    /// Validate the configuration and compile the active filters.
    pub fn new(config: &CriteriaConfig) -> Result<Self, CriteriaError> {
        config.validate()?;

        let mut filters: Vec<Box<dyn Filter>> = Vec::new();

        for (field, keywords) in [
            (TextField::Handle, &config.handle),
            (TextField::Name, &config.name),
            (TextField::Bio, &config.bio),
            (TextField::Location, &config.location),
        ] {
            match keywords.len() {
                0 => {}
                1 => warn!(
                    filter = field.filter_name(),
                    "Single keyword lists are ignored; add a second keyword to enable this filter"
                ),
                _ => filters.push(Box::new(KeywordFilter::new(field, keywords))),
            }
        }

        for (field, range) in [
            (CountField::Followers, config.followers),
            (CountField::Following, config.following),
            (CountField::Likes, config.likes),
            (CountField::Tweets, config.tweets),
            (CountField::Lists, config.lists),
        ] {
            if range.is_active() {
                filters.push(Box::new(CountFilter::new(field, range)));
            }
        }

        if config.joined.is_active() {
            filters.push(Box::new(JoinedFilter::new(config.joined)));
        }
        if config.verified {
            filters.push(Box::new(VerifiedFilter));
        }
        filters.push(Box::new(ProtectedFilter));

        let engine = Self { filters };
        info!(filters = ?engine.filter_names(), "Criteria compiled");
        Ok(engine)
    }

    /// Names of the active filters, in evaluation order.
    pub fn filter_names(&self) -> Vec<&'static str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    /// Evaluate every active filter and report which passed.
    pub fn evaluate(&self, profile: &Profile) -> Evaluation {
        let mut passed = Vec::new();
        let mut failed = Vec::new();
        for filter in &self.filters {
            if filter.matches(profile) {
                passed.push(filter.name());
            } else {
                failed.push(filter.name());
            }
        }
        Evaluation {
            matched: failed.is_empty(),
            passed,
            failed,
        }
    }

    pub fn matches(&self, profile: &Profile) -> bool {
        self.filters.iter().all(|f| f.matches(profile))
    }
}
