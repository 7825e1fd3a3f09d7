//! Host-facing lifecycle of one widget instance.
//!
//! `WidgetCore` owns the components for a single instance and runs them in
//! a fixed order: account sync, notifications, activation gate, settings.
//! Instance-scoped state (the cached description HTML) lives and dies with
//! the `WidgetCore`.

use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use crate::api::{BackendApi, RequestIdentity, SaveFields, SavePayload, Transport};
use crate::config::CoreConfig;
use crate::context::{Host, WidgetContext};
use crate::error::Result;
use crate::feature_gate::FeatureGate;
use crate::notifications::NotificationDelivery;
use crate::settings::{SettingsRequest, SettingsResolver};
use crate::store::KeyValueStore;
use crate::sync::AccountSyncCoordinator;

/// Shown when a save fails and the backend gave no message
pub const GENERIC_SAVE_ERROR: &str = "Unexpected error";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InitOptions {
    /// Fetch settings from the backend when the host cache has none
    pub load_settings: bool,
    /// Use the host-cached settings when present
    pub use_cache_settings: bool,
    /// The widget is paid; initialization stops when it is inactive
    pub chargeable: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InitOutcome {
    pub tariff: Option<Value>,
    pub settings: Option<Value>,
}

/// User-entered fields submitted from the settings form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SaveData {
    pub phone: Option<String>,
    pub cached_settings: Option<Value>,
}

pub struct WidgetCore {
    sync: AccountSyncCoordinator,
    notifications: NotificationDelivery,
    gate: FeatureGate,
    settings: SettingsResolver,
    api: BackendApi,
    host: Arc<dyn Host>,
}

impl WidgetCore {
    pub fn new(
        config: &CoreConfig,
        store: Arc<dyn KeyValueStore>,
        transport: Arc<dyn Transport>,
        host: Arc<dyn Host>,
    ) -> Self {
        let api = BackendApi::new(transport);
        let keys = config.store_keys();

        Self {
            sync: AccountSyncCoordinator::new(
                store.clone(),
                api.clone(),
                host.clone(),
                keys.clone(),
                config.lock_ttl(),
            ),
            notifications: NotificationDelivery::new(
                store.clone(),
                api.clone(),
                host.clone(),
                keys.clone(),
                config.lock_ttl(),
            ),
            gate: FeatureGate::new(store, api.clone(), host.clone(), keys),
            settings: SettingsResolver::new(api.clone(), host.clone()),
            api,
            host,
        }
    }

    pub fn sync(&self) -> &AccountSyncCoordinator {
        &self.sync
    }

    pub fn notifications(&self) -> &NotificationDelivery {
        &self.notifications
    }

    pub fn gate(&self) -> &FeatureGate {
        &self.gate
    }

    pub fn settings(&self) -> &SettingsResolver {
        &self.settings
    }

    /// Boot the instance. Sync and notification failures are logged and do
    /// not stop initialization; an inactive chargeable widget does.
    pub async fn on_init(&self, widget: &WidgetContext, options: InitOptions) -> Result<InitOutcome> {
        match self.sync.ensure_fresh(widget).await {
            Ok(outcome) => info!(widget = %widget.widget_id, ?outcome, "Account sync checked"),
            Err(e) => warn!(widget = %widget.widget_id, error = %e, "Account sync failed"),
        }

        if let Err(e) = self.notifications.deliver_pending(widget).await {
            warn!(widget = %widget.widget_id, error = %e, "Notification delivery failed");
        }

        let mut outcome = InitOutcome::default();

        if options.chargeable {
            let status = self.gate.ensure_active(widget, true).await?;
            outcome.tariff = status.tariff;
        }

        let request = SettingsRequest {
            load_remote: options.load_settings,
            use_host_cache: options.use_cache_settings,
        };
        if request.any() {
            outcome.settings = self.settings.resolve(widget, request).await?;
        }

        Ok(outcome)
    }

    /// Submit the settings form. Failures are shown to the user and
    /// reported as `false`; nothing is returned as an error.
    pub async fn on_save(
        &self,
        widget: &WidgetContext,
        data: SaveData,
        need_save_settings: bool,
    ) -> bool {
        let snapshot = self.host.snapshot();
        let identity = RequestIdentity::new(widget, &snapshot);
        let payload = SavePayload {
            user_name: snapshot.user.name.clone(),
            user_email: snapshot.user.login.clone(),
            user_phone: snapshot.user.personal_mobile.clone(),
            fields: SaveFields {
                phone: data.phone,
                cached_settings: if need_save_settings {
                    data.cached_settings
                } else {
                    None
                },
            },
        };

        if let Err(e) = self.api.save(&identity, &payload, need_save_settings).await {
            warn!(widget = %widget.widget_id, error = %e, "Save failed");
            let message = e
                .backend_message()
                .unwrap_or(GENERIC_SAVE_ERROR)
                .to_string();
            self.host.show_error(&message);
            return false;
        }

        if let Err(e) = self.sync.sync_now(widget).await {
            warn!(widget = %widget.widget_id, error = %e, "Account sync after save failed");
        }
        true
    }

    /// Description HTML for the settings page.
    pub async fn on_settings(&self, widget: &WidgetContext) -> Result<String> {
        self.gate.description_html(widget).await
    }

    /// JWT for iframe applications hosted by the widget.
    pub async fn jwt(&self, widget: &WidgetContext) -> Result<Value> {
        let snapshot = self.host.snapshot();
        let identity = RequestIdentity::new(widget, &snapshot);
        self.api.fetch_jwt(&identity).await
    }
}
