//! Typed access to the backend routes the core consumes.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{ApiRequest, Method, RequestIdentity, Transport};
use crate::context::{string_or_number, HostSnapshot, UserAvatar};
use crate::error::{CoreError, Result};

// ============================================================================
// Routes
// ============================================================================

pub const ROUTE_ACCOUNT_INFO: &str = "account/info";
pub const ROUTE_ACCOUNT_NOTIFICATIONS: &str = "account/notifications";
pub const ROUTE_STATUS: &str = "status/current";
pub const ROUTE_SETTINGS: &str = "settings";
pub const ROUTE_ON_SAVE: &str = "onsave";
pub const ROUTE_JWT: &str = "jwt";

/// Minutes a notification stays "seen" when the backend does not say
pub const DEFAULT_NOTIFICATION_CACHING_MINUTES: i64 = 3;

/// Pause between consecutive notifications when the backend does not say
pub const DEFAULT_SHOW_NEXT_WAIT_SECS: f64 = 3.0;

fn default_caching_minutes() -> i64 {
    DEFAULT_NOTIFICATION_CACHING_MINUTES
}

fn default_show_next_wait() -> f64 {
    DEFAULT_SHOW_NEXT_WAIT_SECS
}

fn is_null_ref(value: &&Value) -> bool {
    value.is_null()
}

// ============================================================================
// Payloads and responses
// ============================================================================

/// Body of the account-info sync: the whole account state except the
/// per-user records and custom-field schemas (`users`, `cf`,
/// `predefined_cf`), plus roster counts derived at send time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountInfoPayload<'a> {
    pub id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subdomain: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_level_domain: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<&'a str>,
    #[serde(rename = "tariffName", skip_serializing_if = "Option::is_none")]
    pub tariff_name: Option<&'a str>,
    #[serde(skip_serializing_if = "is_null_ref")]
    pub paid_from: &'a Value,
    #[serde(skip_serializing_if = "is_null_ref")]
    pub paid_till: &'a Value,
    #[serde(rename = "_users_count")]
    pub users_count: usize,
    #[serde(rename = "_users_avatars")]
    pub users_avatars: Vec<UserAvatar>,
    #[serde(rename = "_hash")]
    pub fingerprint: &'a str,
    #[serde(flatten)]
    pub extra: &'a BTreeMap<String, Value>,
}

impl<'a> AccountInfoPayload<'a> {
    pub fn new(snapshot: &'a HostSnapshot, fingerprint: &'a str) -> Self {
        let account = &snapshot.account;
        Self {
            id: account.id,
            name: account.name.as_deref(),
            subdomain: account.subdomain.as_deref(),
            top_level_domain: account.top_level_domain.as_deref(),
            currency: account.currency.as_deref(),
            timezone: account.timezone.as_deref(),
            language: account.language.as_deref(),
            country: account.country.as_deref(),
            tariff_name: account.tariff_name.as_deref(),
            paid_from: &account.paid_from,
            paid_till: &account.paid_till,
            users_count: snapshot.active_users_count(),
            users_avatars: snapshot.active_user_avatars(),
            fingerprint,
            extra: &account.extra,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AccountInfoResponse {
    #[serde(rename = "_hash", alias = "fingerprint")]
    pub fingerprint: String,
    #[serde(rename = "cacheMinutes")]
    pub cache_minutes: i64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NotificationRecord {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub header: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(rename = "cachingMin", alias = "cachingMinutes", default = "default_caching_minutes")]
    pub caching_minutes: i64,
    #[serde(rename = "onlyForAdmin", alias = "adminOnly", default)]
    pub admin_only: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NotificationBatch {
    #[serde(default)]
    pub notifications: Option<Vec<NotificationRecord>>,
    #[serde(rename = "cacheMinutes", default)]
    pub cache_minutes: i64,
    #[serde(
        rename = "showNextWaitingSeconds",
        alias = "showNextWatingSeconds",
        default = "default_show_next_wait"
    )]
    pub show_next_waiting_seconds: f64,
}

/// Notice attached to an activation status (e.g. "your trial ends soon").
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StatusNotice {
    #[serde(default)]
    pub header: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(rename = "cachingMin", alias = "cachingMinutes", default = "default_caching_minutes")]
    pub caching_minutes: i64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ActivationStatus {
    #[serde(rename = "isActive", default)]
    pub is_active: bool,
    #[serde(default)]
    pub notification: Option<StatusNotice>,
    #[serde(default)]
    pub tariff: Option<Value>,
    #[serde(rename = "statusLocaleData", default)]
    pub status_locale_data: Option<Value>,
    #[serde(rename = "descriptionHtml", default)]
    pub description_html: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaveFields {
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached_settings: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SavePayload {
    #[serde(rename = "userName")]
    pub user_name: Option<String>,
    #[serde(rename = "userEmail")]
    pub user_email: Option<String>,
    #[serde(rename = "userPhone")]
    pub user_phone: Option<String>,
    pub fields: SaveFields,
}

// ============================================================================
// Client
// ============================================================================

#[derive(Clone)]
pub struct BackendApi {
    transport: Arc<dyn Transport>,
}

impl BackendApi {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    async fn send(
        &self,
        identity: &RequestIdentity,
        route: String,
        method: Method,
        body: Option<Value>,
    ) -> Result<Value> {
        debug!(%method, route = %route, widget = %identity.widget_id, "Backend request");
        let request = ApiRequest {
            route,
            method,
            body,
            identity: identity.clone(),
        };
        Ok(self.transport.send(request).await?)
    }

    fn decode<T: DeserializeOwned>(route: &str, value: Value) -> Result<T> {
        serde_json::from_value(value).map_err(|source| CoreError::InvalidPayload {
            route: route.to_string(),
            source,
        })
    }

    fn encode<T: Serialize>(route: &str, body: &T) -> Result<Value> {
        serde_json::to_value(body).map_err(|source| CoreError::InvalidPayload {
            route: route.to_string(),
            source,
        })
    }

    /// POST the account state; returns the backend's fingerprint and cache window.
    pub async fn sync_account_info(
        &self,
        identity: &RequestIdentity,
        payload: &AccountInfoPayload<'_>,
    ) -> Result<AccountInfoResponse> {
        let body = Self::encode(ROUTE_ACCOUNT_INFO, payload)?;
        let value = self
            .send(identity, ROUTE_ACCOUNT_INFO.to_string(), Method::Post, Some(body))
            .await?;
        Self::decode(ROUTE_ACCOUNT_INFO, value)
    }

    pub async fn fetch_notifications(&self, identity: &RequestIdentity) -> Result<NotificationBatch> {
        let value = self
            .send(identity, ROUTE_ACCOUNT_NOTIFICATIONS.to_string(), Method::Get, None)
            .await?;
        Self::decode(ROUTE_ACCOUNT_NOTIFICATIONS, value)
    }

    /// Activation status of the identity's widget. `None` when the backend
    /// holds no record (the widget was never installed).
    pub async fn fetch_activation_status(
        &self,
        identity: &RequestIdentity,
        with_description: bool,
    ) -> Result<Option<ActivationStatus>> {
        let mut route = format!("{}/{}", ROUTE_STATUS, identity.widget_id);
        if with_description {
            route.push_str("?with-description-html=1");
        }

        let value = self.send(identity, route.clone(), Method::Get, None).await?;
        if value.is_null() {
            return Ok(None);
        }
        Self::decode(&route, value).map(Some)
    }

    pub async fn fetch_settings(&self, identity: &RequestIdentity) -> Result<Value> {
        self.send(identity, ROUTE_SETTINGS.to_string(), Method::Get, None)
            .await
    }

    pub async fn save(
        &self,
        identity: &RequestIdentity,
        payload: &SavePayload,
        save_settings: bool,
    ) -> Result<Value> {
        let route = if save_settings {
            format!("{}?save-settings=1", ROUTE_ON_SAVE)
        } else {
            ROUTE_ON_SAVE.to_string()
        };
        let body = Self::encode(&route, payload)?;
        self.send(identity, route, Method::Post, Some(body)).await
    }

    /// JWT for iframe applications embedded by the widget
    pub async fn fetch_jwt(&self, identity: &RequestIdentity) -> Result<Value> {
        let route = format!("{}/{}", ROUTE_JWT, identity.widget_id);
        self.send(identity, route, Method::Get, None).await
    }
}
