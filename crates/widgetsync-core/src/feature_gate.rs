//! Activation/tariff status of a widget.
//!
//! Used on two paths: initialization, which must stop when a mandatory
//! widget is inactive, and the settings page, which renders the
//! description HTML. The description is kept for the lifetime of the
//! `FeatureGate` (one widget instance), so the settings page fetches it at
//! most once unless initialization already did.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info};

use crate::api::{BackendApi, RequestIdentity, StatusNotice};
use crate::context::{Host, HostSnapshot, Notice, WidgetContext};
use crate::error::{CoreError, Result};
use crate::store::{ttl_minutes, KeyValueStore, StoreKeys};

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureStatus {
    /// False when the backend holds no record for the widget
    pub installed: bool,
    pub is_active: bool,
    pub tariff: Option<Value>,
    pub status_locale_data: Value,
    pub description_html: String,
    pub notification: Option<StatusNotice>,
}

impl FeatureStatus {
    /// Status reported for a widget the backend has never seen:
    /// inactive, no tariff.
    pub fn not_installed() -> Self {
        Self {
            installed: false,
            is_active: false,
            tariff: None,
            status_locale_data: Value::Object(Default::default()),
            description_html: String::new(),
            notification: None,
        }
    }
}

pub struct FeatureGate {
    store: Arc<dyn KeyValueStore>,
    api: BackendApi,
    host: Arc<dyn Host>,
    keys: StoreKeys,
    description_html: Mutex<Option<String>>,
}

impl FeatureGate {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        api: BackendApi,
        host: Arc<dyn Host>,
        keys: StoreKeys,
    ) -> Self {
        Self {
            store,
            api,
            host,
            keys,
            description_html: Mutex::new(None),
        }
    }

    /// Fetch the current status. The description HTML is requested only
    /// while the host shows the settings page.
    pub async fn get_status(&self, widget: &WidgetContext) -> Result<FeatureStatus> {
        let snapshot = self.host.snapshot();
        let with_description = snapshot.is_settings_page();
        self.fetch(widget, &snapshot, with_description).await
    }

    /// Like [`get_status`](Self::get_status), but a mandatory widget that is
    /// inactive (or not installed) fails with [`CoreError::Inactive`].
    pub async fn ensure_active(
        &self,
        widget: &WidgetContext,
        mandatory: bool,
    ) -> Result<FeatureStatus> {
        let status = self.get_status(widget).await?;
        if mandatory && !status.is_active {
            return Err(CoreError::Inactive {
                widget_id: widget.widget_id.clone(),
            });
        }
        Ok(status)
    }

    /// Description HTML for the settings page, fetched on first use.
    pub async fn description_html(&self, widget: &WidgetContext) -> Result<String> {
        let cached = self.description_html.lock().clone();
        if let Some(html) = cached.filter(|h| !h.is_empty()) {
            debug!(widget = %widget.widget_id, "Using cached description HTML");
            return Ok(html);
        }

        let snapshot = self.host.snapshot();
        let status = self.fetch(widget, &snapshot, true).await?;
        Ok(status.description_html)
    }

    async fn fetch(
        &self,
        widget: &WidgetContext,
        snapshot: &HostSnapshot,
        with_description: bool,
    ) -> Result<FeatureStatus> {
        let identity = RequestIdentity::new(widget, snapshot);
        let Some(status) = self
            .api
            .fetch_activation_status(&identity, with_description)
            .await?
        else {
            debug!(widget = %widget.widget_id, "No installation data");
            return Ok(FeatureStatus::not_installed());
        };

        let description_html = status.description_html.unwrap_or_default();
        *self.description_html.lock() = Some(description_html.clone());

        if let Some(ref notice) = status.notification {
            self.show_status_notice(widget, notice)?;
        }

        Ok(FeatureStatus {
            installed: true,
            is_active: status.is_active,
            tariff: status.tariff,
            status_locale_data: status
                .status_locale_data
                .unwrap_or_else(|| Value::Object(Default::default())),
            description_html,
            notification: status.notification,
        })
    }

    /// Show the status notice once per its caching window for this widget.
    fn show_status_notice(&self, widget: &WidgetContext, notice: &StatusNotice) -> Result<()> {
        let Some(text) = notice.text.as_deref().filter(|t| !t.is_empty()) else {
            return Ok(());
        };

        let key = self.keys.status_notice_seen(&widget.widget_id);
        if self.store.contains(&key)? {
            return Ok(());
        }

        info!(widget = %widget.widget_id, header = %notice.header, "Showing activation notice");
        self.host.show_notification(&Notice {
            header: notice.header.clone(),
            text: text.to_string(),
            link: notice.link.clone(),
        });
        self.store
            .set(&key, "1", ttl_minutes(notice.caching_minutes))?;
        Ok(())
    }
}
