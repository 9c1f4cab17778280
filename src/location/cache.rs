//! Memoized city → location lookups and their persisted snapshot.
//!
//! The snapshot is shared by every run that uses the same cache bucket and key.
//! Nothing serializes those runs, so two of them saving concurrently can drop
//! each other's new entries. [`CacheSavePolicy::Merge`] narrows that window by
//! re-reading the snapshot right before writing, but the read and the write are
//! still not atomic.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Serialize;

use crate::config::CacheSavePolicy;
use crate::error::{PipelineError, Result};
use crate::location::geocoder::Geocoder;
use crate::models::Location;
use crate::storage::ObjectStore;

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub lookup_failures: u64,
}

/// City name → location, keyed by exact, case-sensitive city name.
#[derive(Debug, Default)]
pub struct LocationCache {
    entries: HashMap<String, Location>,
    stats: CacheStats,
}

impl LocationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: HashMap<String, Location>) -> Self {
        Self {
            entries,
            stats: CacheStats::default(),
        }
    }

    pub fn get(&self, city: &str) -> Option<&Location> {
        self.entries.get(city)
    }

    pub fn insert(&mut self, city: impl Into<String>, location: Location) {
        self.entries.insert(city.into(), location);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn entries(&self) -> &HashMap<String, Location> {
        &self.entries
    }

    /// Returns the cached location for `city`, asking `geocoder` on a miss.
    ///
    /// Lookup failures are logged and resolve to "N/A"/"N/A". Whatever comes back
    /// is cached, so a city is looked up at most once per run.
    pub async fn resolve(&mut self, city: &str, geocoder: &dyn Geocoder) -> Location {
        if let Some(location) = self.entries.get(city) {
            self.stats.hits += 1;
            return location.clone();
        }

        self.stats.misses += 1;
        let location = match geocoder.lookup(city).await {
            Ok(found) => Location::from_parts(found.region, found.country),
            Err(failure) => {
                self.stats.lookup_failures += 1;
                log_warn!("Geocoding lookup for '{}' failed: {}", city, failure);
                Location::unresolved()
            }
        };

        self.entries.insert(city.to_string(), location.clone());
        location
    }

    fn merge_missing(&mut self, other: HashMap<String, Location>) -> usize {
        let mut added = 0;
        for (city, location) in other {
            if !self.entries.contains_key(&city) {
                self.entries.insert(city, location);
                added += 1;
            }
        }
        added
    }
}

fn encode(entries: &HashMap<String, Location>) -> Result<Vec<u8>> {
    let ordered: BTreeMap<&String, &Location> = entries.iter().collect();
    serde_json::to_vec_pretty(&ordered)
        .map_err(|err| PipelineError::CacheSnapshot(format!("failed to serialize cache: {err}")))
}

fn decode(bytes: &[u8]) -> Result<HashMap<String, Location>> {
    serde_json::from_slice(bytes)
        .map_err(|err| PipelineError::CacheSnapshot(format!("failed to deserialize cache: {err}")))
}

/// Load/save access to the persisted cache snapshot.
pub struct CacheStore {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    key: String,
    policy: CacheSavePolicy,
}

impl CacheStore {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        bucket: impl Into<String>,
        key: impl Into<String>,
        policy: CacheSavePolicy,
    ) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            key: key.into(),
            policy,
        }
    }

    fn read_snapshot(&self) -> Result<Option<HashMap<String, Location>>> {
        if !self.store.exists(&self.bucket, &self.key)? {
            return Ok(None);
        }
        let bytes = self.store.get(&self.bucket, &self.key)?;
        decode(&bytes).map(Some)
    }

    /// Loads the snapshot, or an empty cache if none has been saved yet.
    pub fn load(&self) -> Result<LocationCache> {
        match self.read_snapshot()? {
            Some(entries) => {
                log_info!(
                    "Loaded {} cached locations from {}/{}",
                    entries.len(),
                    self.bucket,
                    self.key
                );
                Ok(LocationCache::from_entries(entries))
            }
            None => {
                log_info!("No cache snapshot at {}/{}; starting empty", self.bucket, self.key);
                Ok(LocationCache::new())
            }
        }
    }

    /// Writes the cache back according to the configured save policy.
    pub fn save(&self, cache: &mut LocationCache) -> Result<()> {
        if self.policy == CacheSavePolicy::Merge {
            if let Some(current) = self.read_snapshot()? {
                let added = cache.merge_missing(current);
                if added > 0 {
                    log_info!("Merged {} locations saved by other runs", added);
                }
            }
        }

        let bytes = encode(cache.entries())?;
        self.store.put(&self.bucket, &self.key, &bytes)?;
        log_info!(
            "Saved {} cached locations to {}/{}",
            cache.len(),
            self.bucket,
            self.key
        );
        Ok(())
    }
}
