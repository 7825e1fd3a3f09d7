use std::collections::HashMap;
use std::sync::Arc;

use chrono::Duration;
use parking_lot::Mutex;

use super::{
    decode_component, encode_component, CacheEntry, Clock, KeyValueStore, StoreError, SystemClock,
};

/// In-process store. Instances that share one `MemoryStore` (through an
/// `Arc`) coordinate exactly like instances sharing a browser cookie jar.
pub struct MemoryStore {
    entries: Mutex<HashMap<String, CacheEntry>>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Number of live (unexpired) entries.
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.entries
            .lock()
            .values()
            .filter(|e| !e.is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = self.clock.now();
        let encoded = encode_component(key);
        let mut entries = self.entries.lock();

        match entries.get(&encoded) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(&encoded);
                Ok(None)
            }
            Some(entry) => Ok(decode_component(&entry.value)),
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let now = self.clock.now();
        let encoded = encode_component(key);
        let mut entries = self.entries.lock();
        entries.retain(|_, entry| !entry.is_expired(now));

        if ttl <= Duration::zero() {
            entries.remove(&encoded);
            return Ok(());
        }

        entries.insert(encoded, CacheEntry::new(encode_component(value), now, ttl));
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.lock().remove(&encode_component(key));
        Ok(())
    }
}
