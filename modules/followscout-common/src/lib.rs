pub mod config;
pub mod criteria;
pub mod error;
pub mod types;

pub use config::{load_config, CrawlSettings, FileConfig, RecursionPolicy, Secrets};
pub use criteria::{CountRange, CriteriaConfig, DateRange};
pub use error::{CacheError, ConfigError, CriteriaError, SourceError};
pub use types::{AccountRef, Profile, ProfileId};
