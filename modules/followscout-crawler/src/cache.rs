//! Dedup & state cache: the Seen, Investigating and Matched sets, guarded by
//! one lock and snapshotted to disk as JSON objects (`{"<id>": true}`).
//!
//! Snapshots are eventually consistent with memory. Load and snapshot
//! failures are logged and reported, never fatal: a bad file means that set
//! starts empty.

use std::collections::{BTreeMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use followscout_common::{CacheError, ProfileId};
use tracing::{debug, info, warn};

pub const SEEN_FILE: &str = "seen.json";
pub const INVESTIGATING_FILE: &str = "investigating.json";
pub const MATCHED_FILE: &str = "matched.json";

#[derive(Debug, Default, Clone)]
struct CacheSets {
    seen: HashSet<ProfileId>,
    investigating: HashSet<ProfileId>,
    matched: HashSet<ProfileId>,
}

/// Cardinalities of the three sets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheSizes {
    pub seen: usize,
    pub investigating: usize,
    pub matched: usize,
}

#[derive(Debug, Default)]
pub struct CrawlCache {
    sets: Mutex<CacheSets>,
}

impl CrawlCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn sets(&self) -> MutexGuard<'_, CacheSets> {
        // Every critical section leaves the sets consistent, so a poisoned
        // lock still guards valid data.
        self.sets.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns true if `id` was already seen. Otherwise records it as seen,
    /// clears any pending investigation for it, and returns false.
    pub fn mark_seen_if_new(&self, id: ProfileId) -> bool {
        let mut sets = self.sets();
        if !sets.seen.insert(id) {
            return true;
        }
        sets.investigating.remove(&id);
        false
    }

    pub fn is_seen(&self, id: ProfileId) -> bool {
        self.sets().seen.contains(&id)
    }

    pub fn add_investigating(&self, id: ProfileId) {
        let mut sets = self.sets();
        sets.seen.insert(id);
        sets.investigating.insert(id);
    }

    pub fn remove_investigating(&self, id: ProfileId) {
        self.sets().investigating.remove(&id);
    }

    pub fn add_matched(&self, id: ProfileId) {
        let mut sets = self.sets();
        sets.seen.insert(id);
        sets.matched.insert(id);
    }

    pub fn is_matched(&self, id: ProfileId) -> bool {
        self.sets().matched.contains(&id)
    }

    /// Profiles queued for expansion but not yet started, in ID order.
    pub fn investigating_ids(&self) -> Vec<ProfileId> {
        let mut ids: Vec<ProfileId> = self.sets().investigating.iter().copied().collect();
        ids.sort();
        ids
    }

    pub fn sizes(&self) -> CacheSizes {
        let sets = self.sets();
        CacheSizes {
            seen: sets.seen.len(),
            investigating: sets.investigating.len(),
            matched: sets.matched.len(),
        }
    }

    /// Load the three snapshots from `dir`, replacing in-memory state.
    /// Missing or corrupt files leave that set empty.
    pub fn load(&self, dir: &Path) -> CacheSizes {
        let mut loaded = CacheSets {
            seen: load_set(&dir.join(SEEN_FILE)),
            investigating: load_set(&dir.join(INVESTIGATING_FILE)),
            matched: load_set(&dir.join(MATCHED_FILE)),
        };

        // Investigating and Matched are subsets of Seen.
        let CacheSets {
            seen,
            investigating,
            matched,
        } = &mut loaded;
        seen.extend(investigating.iter().copied());
        seen.extend(matched.iter().copied());

        *self.sets() = loaded;
        let sizes = self.sizes();
        info!(
            seen = sizes.seen,
            investigating = sizes.investigating,
            matched = sizes.matched,
            dir = %dir.display(),
            "Cache loaded"
        );
        sizes
    }

    /// Write all three sets to `dir`, each file replaced wholesale.
    /// Every file is attempted; the first error is returned.
    pub fn snapshot(&self, dir: &Path) -> Result<(), CacheError> {
        let copy = self.sets().clone();

        let mut first_err = None;
        for (file, set) in [
            (SEEN_FILE, &copy.seen),
            (INVESTIGATING_FILE, &copy.investigating),
            (MATCHED_FILE, &copy.matched),
        ] {
            let path = dir.join(file);
            if let Err(e) = write_set(&path, set) {
                warn!(error = %e, "Cache snapshot failed");
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => {
                debug!(
                    seen = copy.seen.len(),
                    investigating = copy.investigating.len(),
                    matched = copy.matched.len(),
                    "Cache snapshot written"
                );
                Ok(())
            }
        }
    }
}

fn load_set(path: &Path) -> HashSet<ProfileId> {
    match read_set(path) {
        Ok(set) => set,
        Err(CacheError::Io { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %path.display(), "No cache snapshot, starting cold");
            HashSet::new()
        }
        Err(e) => {
            warn!(error = %e, "Ignoring unreadable cache snapshot, starting cold");
            HashSet::new()
        }
    }
}

fn read_set(path: &Path) -> Result<HashSet<ProfileId>, CacheError> {
    let content = std::fs::read_to_string(path).map_err(|source| CacheError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let raw: BTreeMap<String, bool> =
        serde_json::from_str(&content).map_err(|source| CacheError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    let mut set = HashSet::with_capacity(raw.len());
    for (key, present) in raw {
        if !present {
            continue;
        }
        match key.parse::<ProfileId>() {
            Ok(id) => {
                set.insert(id);
            }
            Err(_) => warn!(path = %path.display(), key, "Skipping non-numeric cache key"),
        }
    }
    Ok(set)
}

fn write_set(path: &Path, set: &HashSet<ProfileId>) -> Result<(), CacheError> {
    let io_err = |source| CacheError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut ids: Vec<ProfileId> = set.iter().copied().collect();
    ids.sort();
    let doc: BTreeMap<String, bool> = ids.into_iter().map(|id| (id.to_string(), true)).collect();
    let json = serde_json::to_vec_pretty(&doc).map_err(|source| CacheError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    // Write beside the target and rename so a crash never leaves a torn file.
    let dir = path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
    let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(io_err)?;
    tmp.write_all(&json).map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: i64) -> ProfileId {
        ProfileId(n)
    }

    #[test]
    fn mark_seen_if_new_reports_first_sighting_once() {
        let cache = CrawlCache::new();
        assert!(!cache.mark_seen_if_new(id(7)));
        assert!(cache.mark_seen_if_new(id(7)));
        assert!(cache.mark_seen_if_new(id(7)));
        assert!(cache.is_seen(id(7)));
    }

    #[test]
    fn mark_seen_if_new_clears_investigating() {
        let cache = CrawlCache::new();
        // A resumed investigation entry that has not been resolved this run.
        cache.sets().investigating.insert(id(3));
        assert!(!cache.mark_seen_if_new(id(3)));
        assert!(cache.investigating_ids().is_empty());
    }

    #[test]
    fn subsets_stay_within_seen() {
        let cache = CrawlCache::new();
        cache.add_investigating(id(1));
        cache.add_matched(id(2));
        assert!(cache.is_seen(id(1)));
        assert!(cache.is_seen(id(2)));
        cache.remove_investigating(id(1));
        assert_eq!(
            cache.sizes(),
            CacheSizes {
                seen: 2,
                investigating: 0,
                matched: 1
            }
        );
    }

    #[test]
    fn snapshot_then_load_restores_sets() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CrawlCache::new();
        cache.mark_seen_if_new(id(10));
        cache.mark_seen_if_new(id(20));
        cache.add_investigating(id(20));
        cache.add_matched(id(10));
        cache.snapshot(dir.path()).unwrap();

        let restored = CrawlCache::new();
        let sizes = restored.load(dir.path());
        assert_eq!(
            sizes,
            CacheSizes {
                seen: 2,
                investigating: 1,
                matched: 1
            }
        );
        assert!(restored.is_matched(id(10)));
        assert_eq!(restored.investigating_ids(), vec![id(20)]);
    }

    #[test]
    fn snapshot_format_is_string_keyed_object() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CrawlCache::new();
        cache.mark_seen_if_new(id(42));
        cache.snapshot(dir.path()).unwrap();

        let raw = std::fs::read_to_string(dir.path().join(SEEN_FILE)).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed, serde_json::json!({ "42": true }));
    }

    #[test]
    fn missing_files_start_cold() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CrawlCache::new();
        assert_eq!(cache.load(dir.path()), CacheSizes::default());
    }

    #[test]
    fn corrupt_file_only_empties_that_set() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(SEEN_FILE), r#"{"1": true, "2": true}"#).unwrap();
        std::fs::write(dir.path().join(MATCHED_FILE), "{not json").unwrap();

        let cache = CrawlCache::new();
        let sizes = cache.load(dir.path());
        assert_eq!(sizes.seen, 2);
        assert_eq!(sizes.matched, 0);
    }

    #[test]
    fn load_folds_subsets_into_seen() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(INVESTIGATING_FILE), r#"{"5": true}"#).unwrap();
        std::fs::write(dir.path().join(MATCHED_FILE), r#"{"6": true, "bogus": true}"#).unwrap();

        let cache = CrawlCache::new();
        cache.load(dir.path());
        assert!(cache.mark_seen_if_new(id(6)));
        assert_eq!(cache.sizes().seen, 2);
        assert_eq!(cache.sizes().matched, 1);
    }

    #[test]
    fn snapshot_into_missing_dir_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CrawlCache::new();
        let err = cache.snapshot(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, CacheError::Io { .. }));
    }
}
