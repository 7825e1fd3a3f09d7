//! Host-supplied context: account state, roster, current user and widget.
//!
//! The host owns all of this; the core only reads it. Field names follow
//! the host's JSON so a snapshot can be deserialized straight from it.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Entity name the host reports while the widget settings page is open
pub const SETTINGS_PAGE_ENTITY: &str = "widgetsSettings";

/// Accept ids sent either as JSON strings or numbers.
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {}",
            other
        ))),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subdomain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_level_domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(rename = "tariffName", default, skip_serializing_if = "Option::is_none")]
    pub tariff_name: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub paid_from: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub paid_till: Value,

    // Bulky state the backend never receives but the fingerprint covers
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub users: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub cf: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub predefined_cf: Value,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manager {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login: Option<String>,
    #[serde(default)]
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    /// "Y" for administrators
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_admin: Option<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Manager {
    pub fn is_admin(&self) -> bool {
        self.is_admin.as_deref() == Some("Y")
    }

    pub fn has_avatar(&self) -> bool {
        self.avatar.as_deref().is_some_and(|a| !a.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CurrentUser {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub login: Option<String>,
    #[serde(default)]
    pub personal_mobile: Option<String>,
}

/// Synchronous view of the host state at one moment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostSnapshot {
    pub account: Account,
    #[serde(default)]
    pub groups: Value,
    #[serde(default)]
    pub managers: BTreeMap<String, Manager>,
    pub user: CurrentUser,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub current_entity: Option<String>,
}

/// The part of the snapshot whose changes require a full account sync.
#[derive(Debug, Serialize)]
pub struct FingerprintInput<'a> {
    pub account: &'a Account,
    pub groups: &'a Value,
    pub managers: &'a BTreeMap<String, Manager>,
}

/// Avatar entry transmitted with the account sync
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserAvatar {
    pub avatar: String,
    pub id: i64,
}

impl HostSnapshot {
    pub fn fingerprint_input(&self) -> FingerprintInput<'_> {
        FingerprintInput {
            account: &self.account,
            groups: &self.groups,
            managers: &self.managers,
        }
    }

    /// True when the roster marks the current user as an administrator.
    /// A user missing from the roster is not an administrator.
    pub fn current_user_is_admin(&self) -> bool {
        self.managers
            .get(&self.user.id)
            .is_some_and(Manager::is_admin)
    }

    pub fn is_settings_page(&self) -> bool {
        self.current_entity.as_deref() == Some(SETTINGS_PAGE_ENTITY)
    }

    pub fn active_users_count(&self) -> usize {
        self.managers.values().filter(|m| m.active).count()
    }

    /// Active users with a non-empty avatar. Ids that are not numeric are
    /// dropped.
    pub fn active_user_avatars(&self) -> Vec<UserAvatar> {
        self.managers
            .values()
            .filter(|m| m.active && m.has_avatar())
            .filter_map(|m| {
                Some(UserAvatar {
                    avatar: m.avatar.clone()?,
                    id: m.id.parse().ok()?,
                })
            })
            .collect()
    }
}

/// Settings the host cached for the widget, either still encoded or
/// already parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CachedSettings {
    Encoded(String),
    Parsed(Value),
}

/// Identity and host-side state of the widget an instance runs for.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WidgetContext {
    pub widget_id: String,
    /// Installed and switched on by the account
    #[serde(default)]
    pub installed: bool,
    #[serde(default)]
    pub cached_settings: Option<CachedSettings>,
}

impl WidgetContext {
    pub fn new(widget_id: impl Into<String>) -> Self {
        Self {
            widget_id: widget_id.into(),
            installed: true,
            cached_settings: None,
        }
    }
}

/// A message for the host's notification feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub header: String,
    pub text: String,
    #[serde(default)]
    pub link: Option<String>,
}

/// Everything the core needs from the host application.
pub trait Host: Send + Sync {
    /// Current account, roster and user state.
    fn snapshot(&self) -> HostSnapshot;

    /// Push a message into the host's error-notification feed.
    fn show_notification(&self, notice: &Notice);

    /// Show a blocking error dialog.
    fn show_error(&self, message: &str);
}
