//! Widget settings: host cache first, backend second.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::api::{BackendApi, RequestIdentity};
use crate::context::{CachedSettings, Host, WidgetContext};
use crate::error::Result;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettingsRequest {
    pub load_remote: bool,
    pub use_host_cache: bool,
}

impl SettingsRequest {
    pub fn any(&self) -> bool {
        self.load_remote || self.use_host_cache
    }
}

pub struct SettingsResolver {
    api: BackendApi,
    host: Arc<dyn Host>,
}

/// Objects, arrays and strings count when non-empty; null, booleans and
/// numbers never do.
fn has_content(value: &Value) -> bool {
    match value {
        Value::Object(map) => !map.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::String(s) => !s.is_empty(),
        Value::Null | Value::Bool(_) | Value::Number(_) => false,
    }
}

impl SettingsResolver {
    pub fn new(api: BackendApi, host: Arc<dyn Host>) -> Self {
        Self { api, host }
    }

    /// Host-cached settings when allowed and usable, else remote settings
    /// when allowed, else `None`.
    pub async fn resolve(
        &self,
        widget: &WidgetContext,
        request: SettingsRequest,
    ) -> Result<Option<Value>> {
        if !request.any() {
            return Ok(None);
        }

        if request.use_host_cache {
            if let Some(settings) = Self::host_cached(widget) {
                debug!(widget = %widget.widget_id, "Using host-cached settings");
                return Ok(Some(settings));
            }
        }

        if request.load_remote {
            let snapshot = self.host.snapshot();
            let identity = RequestIdentity::new(widget, &snapshot);
            let settings = self.api.fetch_settings(&identity).await?;
            debug!(widget = %widget.widget_id, "Loaded remote settings");
            return Ok(Some(settings).filter(|s| !s.is_null()));
        }

        Ok(None)
    }

    /// Usable host-cached settings. Malformed JSON is logged and ignored.
    fn host_cached(widget: &WidgetContext) -> Option<Value> {
        let value = match widget.cached_settings.as_ref()? {
            CachedSettings::Parsed(value) => value.clone(),
            CachedSettings::Encoded(raw) if raw.trim().is_empty() => return None,
            CachedSettings::Encoded(raw) => match serde_json::from_str(raw) {
                Ok(value) => value,
                Err(e) => {
                    warn!(widget = %widget.widget_id, error = %e, "Ignoring malformed cached settings");
                    return None;
                }
            },
        };

        Some(value).filter(has_content)
    }
}
