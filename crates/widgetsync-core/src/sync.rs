//! Conditional account-data sync shared between widget instances.
//!
//! Each instance fingerprints the host's account state on boot. When the
//! fingerprint matches the one stored by the last successful sync, the
//! cached snapshot's window is simply extended. Otherwise the instance sets
//! a short-lived processing marker and posts the state to the backend.
//! Other instances that see the marker skip their own sync.
//!
//! The marker is never cleared after a successful sync; it lapses on its
//! own TTL. Until then every other instance defers, even though fresh data
//! is already stored.

use std::sync::Arc;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::api::{AccountInfoPayload, BackendApi, RequestIdentity};
use crate::context::{Host, HostSnapshot, WidgetContext};
use crate::error::{CoreError, Result};
use crate::fingerprint;
use crate::store::{ttl_minutes, KeyValueStore, StoreKeys};

/// What one `ensure_fresh` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Another instance holds the processing marker; nothing was done.
    Deferred,
    /// Fingerprint unchanged; the cached snapshot's window was extended.
    Unchanged,
    /// The account state was posted and a new snapshot stored.
    Synced,
}

/// Result of the last successful sync, as stored in the key/value store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub fingerprint: String,
    #[serde(rename = "cacheMinutes")]
    pub cache_minutes: i64,
}

pub struct AccountSyncCoordinator {
    store: Arc<dyn KeyValueStore>,
    api: BackendApi,
    host: Arc<dyn Host>,
    keys: StoreKeys,
    lock_ttl: Duration,
}

impl AccountSyncCoordinator {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        api: BackendApi,
        host: Arc<dyn Host>,
        keys: StoreKeys,
        lock_ttl: Duration,
    ) -> Self {
        Self {
            store,
            api,
            host,
            keys,
            lock_ttl,
        }
    }

    /// Bring the backend's copy of the account state up to date, unless
    /// the fingerprint shows nothing changed or another instance is already
    /// on it. Network errors are returned as-is; the processing marker is
    /// left to expire.
    pub async fn ensure_fresh(&self, widget: &WidgetContext) -> Result<SyncOutcome> {
        let cached = self.cached_snapshot()?;

        if self.store.contains(&self.keys.account_data_lock())? {
            debug!(widget = %widget.widget_id, "Account sync already in progress elsewhere");
            return Ok(SyncOutcome::Deferred);
        }

        let snapshot = self.host.snapshot();
        let current = Self::fingerprint(&snapshot)?;

        if let Some(cached) = cached.filter(|c| !c.fingerprint.is_empty()) {
            if cached.fingerprint == current {
                debug!(
                    fingerprint = %current,
                    cache_minutes = cached.cache_minutes,
                    "Account unchanged, extending cached snapshot"
                );
                self.store_snapshot(&cached)?;
                return Ok(SyncOutcome::Unchanged);
            }
        }

        self.store
            .set(&self.keys.account_data_lock(), "1", self.lock_ttl)?;
        self.push(widget, &snapshot, &current).await?;
        Ok(SyncOutcome::Synced)
    }

    /// Post the current account state without checking the fingerprint or
    /// the processing marker.
    pub async fn sync_now(&self, widget: &WidgetContext) -> Result<AccountSnapshot> {
        let snapshot = self.host.snapshot();
        let current = Self::fingerprint(&snapshot)?;
        self.push(widget, &snapshot, &current).await
    }

    /// Snapshot stored by the last successful sync, if still within its window.
    pub fn cached_snapshot(&self) -> Result<Option<AccountSnapshot>> {
        let Some(raw) = self.store.get(&self.keys.account_data())? else {
            return Ok(None);
        };

        match serde_json::from_str(&raw) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(e) => {
                warn!(error = %e, "Ignoring malformed cached account snapshot");
                Ok(None)
            }
        }
    }

    fn fingerprint(snapshot: &HostSnapshot) -> Result<String> {
        fingerprint::compute(&snapshot.fingerprint_input()).map_err(CoreError::Fingerprint)
    }

    async fn push(
        &self,
        widget: &WidgetContext,
        snapshot: &HostSnapshot,
        fingerprint: &str,
    ) -> Result<AccountSnapshot> {
        let identity = RequestIdentity::new(widget, snapshot);
        let payload = AccountInfoPayload::new(snapshot, fingerprint);

        let response = self.api.sync_account_info(&identity, &payload).await?;
        let stored = AccountSnapshot {
            fingerprint: response.fingerprint,
            cache_minutes: response.cache_minutes,
        };
        self.store_snapshot(&stored)?;

        info!(
            widget = %widget.widget_id,
            users = payload.users_count,
            cache_minutes = stored.cache_minutes,
            "Account data synced"
        );
        Ok(stored)
    }

    fn store_snapshot(&self, snapshot: &AccountSnapshot) -> Result<()> {
        let value = serde_json::to_string(snapshot).map_err(CoreError::Fingerprint)?;
        self.store.set(
            &self.keys.account_data(),
            &value,
            ttl_minutes(snapshot.cache_minutes),
        )?;
        Ok(())
    }
}
