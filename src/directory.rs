//! The polling-location directory: canonical location metadata, loaded
//! once and shared read-only by every aggregation pass.
//!
//! The load is the one hard failure of the pipeline: every enrichment and
//! the section metrics depend on it, so a directory that cannot be fetched
//! makes the engine unusable. Lookups, on the other hand, never fail; a
//! missing key resolves to the "not informed" sentinel.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use election_analytics::{LocationKey, PollingLocation};

use crate::loader::{read_csv_rows, SourceFetcher};
use crate::registry::LOCATION_SOURCE_FILE;
use crate::{EngineResult, LocationSourceSnafu};

/// Version tag of the cached directory. Bumped whenever the canonical
/// location source changes; a cache written under any other tag is
/// invalidated wholesale.
pub const LOCATION_CACHE_VERSION: &str = "2022-3";

// Positional schema of the location source.
const COL_MUNICIPALITY: usize = 0;
const COL_ZONE: usize = 1;
const COL_SECTION: usize = 2;
const COL_LOCATION_CODE: usize = 3;
const COL_NAME: usize = 4;
const COL_ADDRESS: usize = 5;
const COL_NEIGHBORHOOD: usize = 6;

/// The loaded directory: locations plus a key index and the lookup
/// sentinel. Immutable once built.
pub struct LocationIndex {
    locations: Vec<PollingLocation>,
    by_key: HashMap<LocationKey, usize>,
    sentinel: PollingLocation,
}

impl LocationIndex {
    /// Builds the index; the first location seen for a key wins.
    pub fn from_locations(locations: Vec<PollingLocation>) -> LocationIndex {
        let mut deduped: Vec<PollingLocation> = Vec::with_capacity(locations.len());
        let mut by_key: HashMap<LocationKey, usize> = HashMap::new();
        for location in locations {
            let key = location.key();
            if by_key.contains_key(&key) {
                continue;
            }
            by_key.insert(key, deduped.len());
            deduped.push(location);
        }
        LocationIndex {
            locations: deduped,
            by_key,
            sentinel: PollingLocation::not_informed(),
        }
    }

    /// Best-effort lookup: the sentinel is returned when the key is absent.
    pub fn lookup(&self, key: &LocationKey) -> &PollingLocation {
        match self.by_key.get(key) {
            Some(&index) => &self.locations[index],
            None => &self.sentinel,
        }
    }

    pub fn locations(&self) -> &[PollingLocation] {
        &self.locations
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }
}

#[derive(Serialize, Deserialize)]
struct CachePayload {
    version: String,
    locations: Vec<PollingLocation>,
}

/// Load-once directory with an explicit invalidation key.
///
/// Three layers, consulted in order: the in-session memory slot, an
/// optional on-disk JSON cache (valid only under the current version tag),
/// and finally the canonical source via the fetcher.
pub struct LocationDirectory {
    version: String,
    cache_dir: Option<PathBuf>,
    cached: Mutex<Option<Arc<LocationIndex>>>,
}

impl LocationDirectory {
    pub fn new(cache_dir: Option<PathBuf>) -> LocationDirectory {
        LocationDirectory::with_version(LOCATION_CACHE_VERSION, cache_dir)
    }

    pub fn with_version(version: &str, cache_dir: Option<PathBuf>) -> LocationDirectory {
        LocationDirectory {
            version: version.to_string(),
            cache_dir,
            cached: Mutex::new(None),
        }
    }

    /// Idempotent load. Fetch or parse failures surface as a hard error;
    /// the engine is unusable until a load succeeds.
    pub fn load(&self, fetcher: &dyn SourceFetcher) -> EngineResult<Arc<LocationIndex>> {
        let mut slot = self.cached.lock().unwrap();
        if let Some(index) = slot.as_ref() {
            debug!("location directory already loaded ({} entries)", index.len());
            return Ok(index.clone());
        }

        if let Some(locations) = self.read_disk_cache() {
            info!(
                "location directory restored from cache ({} entries, tag {})",
                locations.len(),
                self.version
            );
            let index = Arc::new(LocationIndex::from_locations(locations));
            *slot = Some(index.clone());
            return Ok(index);
        }

        let bytes = fetcher
            .fetch(LOCATION_SOURCE_FILE)
            .context(LocationSourceSnafu {
                path: LOCATION_SOURCE_FILE,
            })?;
        let rows = read_csv_rows(&bytes, LOCATION_SOURCE_FILE).context(LocationSourceSnafu {
            path: LOCATION_SOURCE_FILE,
        })?;
        let locations: Vec<PollingLocation> = rows
            .iter()
            .skip(1)
            .map(|row| decode_location(row))
            .collect();
        info!("location directory loaded: {} rows", locations.len());

        self.write_disk_cache(&locations);
        let index = Arc::new(LocationIndex::from_locations(locations));
        *slot = Some(index.clone());
        Ok(index)
    }

    fn cache_file(&self) -> Option<PathBuf> {
        self.cache_dir
            .as_ref()
            .map(|dir| dir.join("polling_locations_cache.json"))
    }

    fn read_disk_cache(&self) -> Option<Vec<PollingLocation>> {
        let path = self.cache_file()?;
        let contents = fs::read_to_string(&path).ok()?;
        match serde_json::from_str::<CachePayload>(&contents) {
            Ok(payload) if payload.version == self.version => Some(payload.locations),
            Ok(payload) => {
                info!(
                    "location cache tag {} does not match {}, discarding",
                    payload.version, self.version
                );
                None
            }
            Err(e) => {
                warn!("unreadable location cache {}: {}", path.display(), e);
                None
            }
        }
    }

    // Cache writes are best-effort; a failed write only costs a refetch.
    fn write_disk_cache(&self, locations: &[PollingLocation]) {
        let path = match self.cache_file() {
            Some(p) => p,
            None => return,
        };
        let payload = CachePayload {
            version: self.version.clone(),
            locations: locations.to_vec(),
        };
        let result = serde_json::to_string(&payload)
            .map_err(|e| e.to_string())
            .and_then(|json| fs::write(&path, json).map_err(|e| e.to_string()));
        if let Err(e) = result {
            warn!("could not write location cache {}: {}", path.display(), e);
        }
    }
}

fn decode_location(cells: &[String]) -> PollingLocation {
    let cell = |index: usize| -> String {
        cells
            .get(index)
            .map(|s: &String| s.trim().to_string())
            .unwrap_or_default()
    };
    PollingLocation {
        municipality: cell(COL_MUNICIPALITY),
        zone: cell(COL_ZONE),
        section: cell(COL_SECTION),
        location_code: cell(COL_LOCATION_CODE),
        name: cell(COL_NAME),
        address: cell(COL_ADDRESS),
        neighborhood: cell(COL_NEIGHBORHOOD),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::MemoryFetcher;
    use election_analytics::NOT_INFORMED;
    use std::sync::atomic::{AtomicU32, Ordering};

    const LOCATIONS_CSV: &str = "municipality,zone,section,location,name,address,neighborhood\n\
        RIVERTON,7,101,1015,CENTRAL SCHOOL,MAIN ST 1,CENTER\n\
        RIVERTON,7,101,1015,DUPLICATE ROW,ELSEWHERE 9,NORTH\n\
        LAKEWOOD,9,55,2001,LAKE GYM,SHORE AVE 3,MARINA\n";

    fn fetcher() -> MemoryFetcher {
        let mut f = MemoryFetcher::new();
        f.insert(LOCATION_SOURCE_FILE, LOCATIONS_CSV);
        f
    }

    fn key(municipality: &str, zone: &str, section: &str, code: &str) -> LocationKey {
        LocationKey {
            municipality: municipality.to_string(),
            zone: zone.to_string(),
            section: section.to_string(),
            location_code: code.to_string(),
        }
    }

    #[test]
    fn loads_and_indexes_locations() {
        let directory = LocationDirectory::new(None);
        let index = directory.load(&fetcher()).unwrap();
        assert_eq!(index.len(), 2);
        let location = index.lookup(&key("RIVERTON", "7", "101", "1015"));
        // First record wins over the duplicate row.
        assert_eq!(location.name, "CENTRAL SCHOOL");
        assert_eq!(location.neighborhood, "CENTER");
    }

    #[test]
    fn missing_keys_resolve_to_the_sentinel() {
        let directory = LocationDirectory::new(None);
        let index = directory.load(&fetcher()).unwrap();
        let location = index.lookup(&key("NOWHERE", "1", "1", "1"));
        assert_eq!(location.name, NOT_INFORMED);
        assert_eq!(location.address, NOT_INFORMED);
    }

    #[test]
    fn fetch_failure_is_a_hard_error() {
        let directory = LocationDirectory::new(None);
        let empty = MemoryFetcher::new();
        assert!(directory.load(&empty).is_err());
    }

    #[test]
    fn second_load_reuses_the_session_cache() {
        struct CountingFetcher(AtomicU32);
        impl SourceFetcher for CountingFetcher {
            fn fetch(&self, _file_name: &str) -> EngineResult<Vec<u8>> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(LOCATIONS_CSV.as_bytes().to_vec())
            }
        }
        let counting = CountingFetcher(AtomicU32::new(0));
        let directory = LocationDirectory::new(None);
        directory.load(&counting).unwrap();
        directory.load(&counting).unwrap();
        assert_eq!(counting.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn disk_cache_roundtrips_and_respects_the_version_tag() {
        let dir = tempfile::tempdir().unwrap();
        let cache_dir = Some(dir.path().to_path_buf());

        let directory = LocationDirectory::with_version("tag-1", cache_dir.clone());
        directory.load(&fetcher()).unwrap();

        // Same tag, empty fetcher: served from disk.
        let warm = LocationDirectory::with_version("tag-1", cache_dir.clone());
        let index = warm.load(&MemoryFetcher::new()).unwrap();
        assert_eq!(index.len(), 2);

        // Bumped tag: the stale cache is ignored and the fetch fails hard.
        let bumped = LocationDirectory::with_version("tag-2", cache_dir);
        assert!(bumped.load(&MemoryFetcher::new()).is_err());
    }
}
