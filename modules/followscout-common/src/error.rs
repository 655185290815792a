//! Typed errors shared across the crawler crates.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors reported by the external graph source, classified for the retry policy.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// The platform refused the call until `reset_at`.
    #[error("rate limited until {reset_at}")]
    RateLimited { reset_at: DateTime<Utc> },

    /// Network hiccup or server-side failure; worth retrying.
    #[error("transient error: {0}")]
    Transient(String),

    /// The request can never succeed (not found, forbidden, malformed).
    #[error("permanent error (status {status}): {message}")]
    Permanent { status: u16, message: String },
}

/// Persistence errors from the dedup/state cache. Never fatal to the crawl.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt cache snapshot {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Invalid criteria configuration. Fatal at startup.
#[derive(Debug, Error, PartialEq)]
pub enum CriteriaError {
    #[error("{field}: range from ({from}) must be below to ({to})")]
    InvalidRange {
        field: &'static str,
        from: i64,
        to: i64,
    },

    #[error("{field}: range from ({from}) must be before to ({to})")]
    InvalidDateRange {
        field: &'static str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },

    #[error("{field}: negative keyword has nothing after '-'")]
    EmptyKeyword { field: &'static str },

    #[error("{field}: count bounds must not be negative")]
    NegativeBound { field: &'static str },
}

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("{0} environment variable is required")]
    MissingEnv(&'static str),

    #[error("invalid criteria: {0}")]
    Criteria(#[from] CriteriaError),

    #[error("seed account must not be empty")]
    EmptySeed,

    #[error("{0} must be greater than zero")]
    ZeroSetting(&'static str),
}
