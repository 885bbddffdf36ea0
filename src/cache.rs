//! The persisted cache contract that makes `now()` O(1) between syncs (spec §4.5).

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::offset::TimeSample;

/// The JSON-serializable form of a [`TimeSample`], using the stable field names
/// required for interop with previously persisted data (spec §6). Unknown fields are
/// ignored on read; missing fields default to `0`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheRecord {
    #[serde(default, rename = "time_offset")]
    pub time_offset: i64,
    #[serde(default, rename = "timestamp")]
    pub timestamp: i64,
    #[serde(default, rename = "response_timestamp")]
    pub response_timestamp: i64,
}

impl From<&TimeSample> for CacheRecord {
    fn from(sample: &TimeSample) -> Self {
        Self {
            time_offset: sample.offset_ms,
            timestamp: sample.corrected_ms_at_response,
            response_timestamp: sample.response_ticks,
        }
    }
}

impl From<CacheRecord> for TimeSample {
    fn from(record: CacheRecord) -> Self {
        Self {
            offset_ms: record.time_offset,
            corrected_ms_at_response: record.timestamp,
            response_ticks: record.response_timestamp,
            raw: None,
        }
    }
}

/// Abstract persistence backend for the cached sample. Implementations must provide
/// atomic replace-or-read semantics: a reader must never observe a torn record.
pub trait CacheStore: Send + Sync {
    fn load(&self) -> Option<CacheRecord>;
    fn save(&self, record: CacheRecord);
    fn clear(&self);
}

/// The default `CacheStore`: a single record guarded by a mutex, living only for the
/// lifetime of the process.
#[derive(Default)]
pub struct InMemoryCacheStore {
    record: Mutex<Option<CacheRecord>>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStore for InMemoryCacheStore {
    fn load(&self) -> Option<CacheRecord> {
        *self.record.lock().expect("cache mutex poisoned")
    }

    fn save(&self, record: CacheRecord) {
        *self.record.lock().expect("cache mutex poisoned") = Some(record);
    }

    fn clear(&self) {
        *self.record.lock().expect("cache mutex poisoned") = None;
    }
}

/// A `CacheStore` that persists the record as JSON to a file, surviving process
/// restarts (though not reboots of the tick source's reference point, which is the
/// scenario [`CacheRepository::has_valid_cache`] guards against). Malformed JSON or a
/// missing file is treated as an empty cache, not an error.
pub struct JsonFileCacheStore {
    path: PathBuf,
    // Serializes writes so two syncs racing on the same file can't interleave.
    write_lock: Mutex<()>,
}

impl JsonFileCacheStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn read_from_disk(path: &Path) -> Option<CacheRecord> {
        let contents = std::fs::read_to_string(path).ok()?;
        match serde_json::from_str(&contents) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(error = %e, path = %path.display(), "ignoring malformed cache file");
                None
            }
        }
    }
}

impl CacheStore for JsonFileCacheStore {
    fn load(&self) -> Option<CacheRecord> {
        Self::read_from_disk(&self.path)
    }

    fn save(&self, record: CacheRecord) {
        let _guard = self.write_lock.lock().expect("cache mutex poisoned");
        let json = match serde_json::to_string(&record) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "failed to serialize cache record");
                return;
            }
        };
        if let Some(parent) = self.path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Err(e) = std::fs::write(&self.path, json) {
            warn!(error = %e, path = %self.path.display(), "failed to persist cache file");
        }
    }

    fn clear(&self) {
        let _guard = self.write_lock.lock().expect("cache mutex poisoned");
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Wraps an injected [`CacheStore`] and decides validity relative to the current tick
/// reading, extrapolating a corrected "now" from the stored sample without any network
/// round-trip.
pub struct CacheRepository {
    store: Arc<dyn CacheStore>,
}

impl CacheRepository {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// Stores `sample` unconditionally, overwriting prior content.
    pub fn set(&self, sample: &TimeSample) {
        self.store.save(CacheRecord::from(sample));
    }

    /// `true` if a stored sample exists and its `response_ticks` does not exceed
    /// `current_ticks`. A `response_ticks` *greater* than `current_ticks` means the
    /// tick counter was reset (e.g. a reboot) since the sample was written; in that
    /// case the stale record is cleared and `false` is returned.
    pub fn has_valid_cache(&self, current_ticks: i64) -> bool {
        match self.store.load() {
            None => false,
            Some(record) if record.response_timestamp > current_ticks => {
                self.store.clear();
                false
            }
            Some(_) => true,
        }
    }

    /// Extrapolates the stored sample forward to `current_ticks`. Callers must have
    /// already confirmed [`Self::has_valid_cache`].
    pub fn now(&self, current_ticks: i64) -> Option<i64> {
        self.extrapolated_sample(current_ticks)
            .map(|sample| sample.corrected_ms_at_response)
    }

    /// Like [`Self::now`], but returns the full sample (offset included) rather than
    /// just the extrapolated millisecond value. Used by callers that report the sample
    /// to a [`crate::listener::Listener`], which needs the real stored offset.
    pub fn extrapolated_sample(&self, current_ticks: i64) -> Option<TimeSample> {
        let record = self.store.load()?;
        if record.response_timestamp > current_ticks {
            return None;
        }
        Some(TimeSample {
            offset_ms: record.time_offset,
            corrected_ms_at_response: record.timestamp + (current_ticks - record.response_timestamp),
            response_ticks: current_ticks,
            raw: None,
        })
    }

    pub fn clear(&self) {
        self.store.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(offset_ms: i64, corrected_ms_at_response: i64, response_ticks: i64) -> TimeSample {
        TimeSample {
            offset_ms,
            corrected_ms_at_response,
            response_ticks,
            raw: None,
        }
    }

    #[test]
    fn empty_store_is_invalid() {
        let repo = CacheRepository::new(Arc::new(InMemoryCacheStore::new()));
        assert!(!repo.has_valid_cache(1_000));
    }

    #[test]
    fn monotone_extrapolation_matches_tick_delta() {
        let repo = CacheRepository::new(Arc::new(InMemoryCacheStore::new()));
        repo.set(&sample(500, 1_000_500, 100));
        assert!(repo.has_valid_cache(150));
        let now1 = repo.now(150).unwrap();
        let now2 = repo.now(200).unwrap();
        assert_eq!(now2 - now1, 50);
        assert_eq!(now1, 1_000_550);
    }

    #[test]
    fn extrapolated_sample_preserves_the_stored_offset() {
        let repo = CacheRepository::new(Arc::new(InMemoryCacheStore::new()));
        repo.set(&sample(500, 1_000_500, 100));
        let extrapolated = repo.extrapolated_sample(150).unwrap();
        assert_eq!(extrapolated.offset_ms, 500);
        assert_eq!(extrapolated.corrected_ms_at_response, 1_000_550);
        assert_eq!(extrapolated.response_ticks, 150);
    }

    #[test]
    fn cache_self_heals_after_reboot() {
        let store = Arc::new(InMemoryCacheStore::new());
        let repo = CacheRepository::new(store.clone());
        repo.set(&sample(0, 0, 10_000));
        assert!(!repo.has_valid_cache(5));
        assert!(store.load().is_none(), "stale record must be cleared");
    }

    #[test]
    fn json_field_names_match_interop_contract() {
        let record = CacheRecord {
            time_offset: 45,
            timestamp: 1_000_065,
            response_timestamp: 100,
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"time_offset\":45"));
        assert!(json.contains("\"timestamp\":1000065"));
        assert!(json.contains("\"response_timestamp\":100"));
    }

    #[test]
    fn unknown_json_fields_are_ignored_and_missing_fields_default() {
        let parsed: CacheRecord =
            serde_json::from_str(r#"{"time_offset": 7, "unexpected": "ignored"}"#).unwrap();
        assert_eq!(
            parsed,
            CacheRecord {
                time_offset: 7,
                timestamp: 0,
                response_timestamp: 0,
            }
        );
    }

    #[test]
    fn malformed_json_yields_empty_cache_not_a_panic() {
        let dir = std::env::temp_dir().join(format!("driftless-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("cache.json");
        std::fs::write(&path, "not json").unwrap();
        let store = JsonFileCacheStore::new(path.clone());
        assert!(store.load().is_none());
        std::fs::remove_dir_all(&dir).ok();
    }
}
