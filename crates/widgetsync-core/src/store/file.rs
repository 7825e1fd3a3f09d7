use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Duration;
use parking_lot::Mutex;
use tracing::debug;

use super::{
    decode_component, encode_component, CacheEntry, Clock, KeyValueStore, StoreError, SystemClock,
};

/// Jar file name inside the store directory
const JAR_FILE: &str = "jar.json";

type Jar = BTreeMap<String, CacheEntry>;

/// Store persisted as a single JSON jar on disk.
///
/// The jar is re-read on every access so separate processes pointed at the
/// same directory see each other's writes. Writes go through a temp file and
/// a rename; two processes writing at once still lose one of the updates,
/// which is the same hazard every other backend has.
pub struct FileStore {
    jar_path: PathBuf,
    clock: Arc<dyn Clock>,
    // Serializes read-modify-write within this process only
    guard: Mutex<()>,
}

impl FileStore {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::with_clock(dir, Arc::new(SystemClock))
    }

    pub fn with_clock(dir: impl AsRef<Path>, clock: Arc<dyn Clock>) -> Result<Self, StoreError> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(|source| StoreError::Io {
            path: dir.display().to_string(),
            source,
        })?;

        Ok(Self {
            jar_path: dir.join(JAR_FILE),
            clock,
            guard: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.jar_path
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.jar_path.display().to_string(),
            source,
        }
    }

    fn load(&self) -> Result<Jar, StoreError> {
        if !self.jar_path.exists() {
            return Ok(Jar::new());
        }

        let contents = std::fs::read_to_string(&self.jar_path).map_err(|e| self.io_error(e))?;
        if contents.trim().is_empty() {
            return Ok(Jar::new());
        }

        serde_json::from_str(&contents).map_err(|source| StoreError::Corrupt {
            path: self.jar_path.display().to_string(),
            source,
        })
    }

    fn save(&self, jar: &Jar) -> Result<(), StoreError> {
        let contents = serde_json::to_string_pretty(jar).map_err(|source| StoreError::Corrupt {
            path: self.jar_path.display().to_string(),
            source,
        })?;

        let tmp = self.jar_path.with_extension("json.tmp");
        std::fs::write(&tmp, contents).map_err(|e| self.io_error(e))?;
        std::fs::rename(&tmp, &self.jar_path).map_err(|e| self.io_error(e))?;
        Ok(())
    }

    fn update(&self, apply: impl FnOnce(&mut Jar)) -> Result<(), StoreError> {
        let _guard = self.guard.lock();
        let mut jar = self.load()?;

        let now = self.clock.now();
        let before = jar.len();
        jar.retain(|_, entry| !entry.is_expired(now));
        if jar.len() != before {
            debug!(pruned = before - jar.len(), "Pruned expired store entries");
        }

        apply(&mut jar);
        self.save(&jar)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let _guard = self.guard.lock();
        let jar = self.load()?;
        let now = self.clock.now();

        Ok(jar
            .get(&encode_component(key))
            .filter(|entry| !entry.is_expired(now))
            .and_then(|entry| decode_component(&entry.value)))
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let encoded = encode_component(key);
        if ttl <= Duration::zero() {
            return self.update(|jar| {
                jar.remove(&encoded);
            });
        }

        let entry = CacheEntry::new(encode_component(value), self.clock.now(), ttl);
        self.update(|jar| {
            jar.insert(encoded, entry);
        })
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let encoded = encode_component(key);
        self.update(|jar| {
            jar.remove(&encoded);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ManualClock;

    #[test]
    fn test_values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::default());

        let store = FileStore::with_clock(dir.path(), clock.clone()).unwrap();
        store.set("account data", r#"{"a":1}"#, Duration::minutes(10)).unwrap();
        drop(store);

        let reopened = FileStore::with_clock(dir.path(), clock).unwrap();
        assert_eq!(
            reopened.get("account data").unwrap().as_deref(),
            Some(r#"{"a":1}"#)
        );
    }

    #[test]
    fn test_two_handles_share_state() {
        let dir = tempfile::tempdir().unwrap();
        let first = FileStore::new(dir.path()).unwrap();
        let second = FileStore::new(dir.path()).unwrap();

        first.set("lock", "1", Duration::minutes(3)).unwrap();
        assert!(second.contains("lock").unwrap());

        second.delete("lock").unwrap();
        assert!(!first.contains("lock").unwrap());
    }

    #[test]
    fn test_expired_entries_hidden_and_pruned() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::default());
        let store = FileStore::with_clock(dir.path(), clock.clone()).unwrap();

        store.set("short", "1", Duration::seconds(30)).unwrap();
        store.set("long", "1", Duration::minutes(30)).unwrap();
        clock.advance(Duration::minutes(1));
        assert_eq!(store.get("short").unwrap(), None);

        // Next write prunes the expired entry from disk
        store.set("other", "1", Duration::minutes(1)).unwrap();
        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(!raw.contains("short"));
        assert!(raw.contains("long"));
    }

    #[test]
    fn test_keys_are_encoded_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        store.set("a=b; c", "x y", Duration::minutes(1)).unwrap();

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("a%3Db%3B%20c"));
        assert!(raw.contains("x%20y"));
        assert_eq!(store.get("a=b; c").unwrap().as_deref(), Some("x y"));
    }

    #[test]
    fn test_corrupt_jar_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(JAR_FILE), "not json").unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        assert!(matches!(store.get("k"), Err(StoreError::Corrupt { .. })));
    }
}
