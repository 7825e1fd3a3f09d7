//! TTL-expiring key/value storage shared by every widget instance.
//!
//! This is the only coordination medium between instances. There is no
//! compare-and-swap: a reader may observe a key as absent and write it while
//! another instance does the same. Everything built on top treats markers as
//! advisory.
//!
//! Keys and values are percent-encoded before they reach the backing storage
//! (the same character set `encodeURIComponent` leaves alone), so neither can
//! collide with the separators of cookie-style persistence.

pub mod file;
pub mod memory;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use file::FileStore;
pub use memory::MemoryStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store I/O failed for {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("store file {path} is corrupt: {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A stored value and the instant it stops being visible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    /// TTLs beyond [`MAX_TTL_DAYS`] are clamped.
    pub fn new(value: String, now: DateTime<Utc>, ttl: Duration) -> Self {
        let ttl = ttl.min(Duration::days(MAX_TTL_DAYS));
        Self {
            value,
            expires_at: now
                .checked_add_signed(ttl)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Longest lifetime an entry can have.
pub const MAX_TTL_DAYS: i64 = 36_500;

/// TTL from a minute count that may come straight off the wire, clamped to
/// [`MAX_TTL_DAYS`] either way so it cannot overflow.
pub fn ttl_minutes(minutes: i64) -> Duration {
    let cap = MAX_TTL_DAYS * 24 * 60;
    Duration::minutes(minutes.clamp(-cap, cap))
}

pub fn ttl_seconds(seconds: i64) -> Duration {
    let cap = MAX_TTL_DAYS * 24 * 60 * 60;
    Duration::seconds(seconds.clamp(-cap, cap))
}

/// Persistent, TTL-expiring string store.
///
/// A non-positive `ttl` on `set` removes the key, matching `max-age`
/// semantics of the cookie jar this abstracts.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    fn delete(&self, key: &str) -> Result<(), StoreError>;

    fn contains(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.get(key)?.is_some())
    }
}

// ============================================================================
// Clock
// ============================================================================

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

// ============================================================================
// Key naming
// ============================================================================

/// Default prefix for every persisted key.
pub const DEFAULT_KEY_PREFIX: &str = "WIDGETSYNC";

/// Names of the persisted keys.
///
/// Account-wide state (snapshot, its refresh lock, the notification
/// window marker and lock, per-notification seen markers) is shared by all
/// widgets; the activation notice marker is per widget.
#[derive(Debug, Clone)]
pub struct StoreKeys {
    prefix: String,
}

impl StoreKeys {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn account_data(&self) -> String {
        format!("{}_ACCOUNT_DATA", self.prefix)
    }

    pub fn account_data_lock(&self) -> String {
        format!("{}_PROCESSING", self.account_data())
    }

    pub fn notifications(&self) -> String {
        format!("{}_NOTIFICATIONS", self.prefix)
    }

    pub fn notifications_lock(&self) -> String {
        format!("{}_LOADING", self.notifications())
    }

    pub fn notification_seen(&self, id: &str) -> String {
        format!("{}_notification_{}", self.prefix.to_lowercase(), id)
    }

    pub fn status_notice_seen(&self, widget_id: &str) -> String {
        format!("{}_WIDGET_STATUS_NOTIFICATION_{}", self.prefix, widget_id)
    }
}

impl Default for StoreKeys {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_PREFIX)
    }
}

// ============================================================================
// Encoding
// ============================================================================

/// Characters `encodeURIComponent` leaves alone that `urlencoding` escapes.
const COMPONENT_SAFE_EXTRAS: [(&str, &str); 5] =
    [("%21", "!"), ("%2A", "*"), ("%27", "'"), ("%28", "("), ("%29", ")")];

/// Percent-encode every byte outside the `encodeURIComponent` safe set.
pub fn encode_component(input: &str) -> String {
    COMPONENT_SAFE_EXTRAS
        .iter()
        .fold(urlencoding::encode(input).into_owned(), |out, (escaped, raw)| {
            out.replace(escaped, raw)
        })
}

/// Reverse of [`encode_component`]. Returns `None` when the escapes do not
/// decode to UTF-8; malformed escapes are kept literally.
pub fn decode_component(input: &str) -> Option<String> {
    urlencoding::decode(input).ok().map(|decoded| decoded.into_owned())
}
