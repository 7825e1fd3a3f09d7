//! widgetsync core - client-side state synchronization and notification
//! delivery for embedded widget instances.
//!
//! Many instances of a widget may run at the same time inside one host
//! session. They share nothing but a TTL-expiring key/value store, and use it
//! to:
//!
//! - skip account-data syncs when the account fingerprint has not changed
//! - hand one instance the job of refreshing while the others back off
//! - show each pending notification at most once per caching window
//!
//! The entry point for hosts is [`WidgetCore`]; the individual components
//! ([`AccountSyncCoordinator`], [`NotificationDelivery`], [`FeatureGate`],
//! [`SettingsResolver`]) can also be driven directly.

pub mod api;
pub mod config;
pub mod context;
pub mod error;
pub mod feature_gate;
pub mod fingerprint;
pub mod notifications;
pub mod settings;
pub mod store;
pub mod sync;
pub mod widget;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{ApiError, ApiRequest, BackendApi, HttpTransport, Method, RequestIdentity, Transport};
pub use config::CoreConfig;
pub use context::{
    Account, CachedSettings, CurrentUser, Host, HostSnapshot, Manager, Notice, WidgetContext,
};
pub use error::CoreError;
pub use feature_gate::{FeatureGate, FeatureStatus};
pub use notifications::{DeliveryReport, NotificationDelivery};
pub use settings::{SettingsRequest, SettingsResolver};
pub use store::{
    Clock, FileStore, KeyValueStore, ManualClock, MemoryStore, StoreError, StoreKeys, SystemClock,
};
pub use sync::{AccountSnapshot, AccountSyncCoordinator, SyncOutcome};
pub use widget::{InitOptions, InitOutcome, SaveData, WidgetCore};
