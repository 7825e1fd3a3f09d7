//! Request channel to the widget backend.
//!
//! The core talks to the backend only through the [`Transport`] trait, an
//! opaque "send this route" function. [`HttpTransport`] is the reqwest
//! implementation; hosts embedding the core elsewhere supply their own.
//! [`BackendApi`] gives each consumed route a typed method.

pub mod backend;
pub mod error;
pub mod transport;

use async_trait::async_trait;
use serde_json::Value;

use crate::context::{HostSnapshot, WidgetContext};

pub use backend::{
    AccountInfoPayload, AccountInfoResponse, ActivationStatus, BackendApi, NotificationBatch,
    NotificationRecord, SaveFields, SavePayload, StatusNotice,
};
pub use error::ApiError;
pub use transport::HttpTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
        }
    }
}

/// Values for the identifying headers attached to every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestIdentity {
    pub widget_id: String,
    pub account_id: String,
    pub user_id: String,
    pub language: String,
    pub top_level_domain: String,
    /// False until the account has installed the widget. Such requests go
    /// out unauthenticated with an installation header instead.
    pub installed: bool,
}

impl RequestIdentity {
    pub fn new(widget: &WidgetContext, snapshot: &HostSnapshot) -> Self {
        Self {
            widget_id: widget.widget_id.clone(),
            account_id: snapshot.account.id.to_string(),
            user_id: snapshot.user.id.clone(),
            language: snapshot.language.clone(),
            top_level_domain: snapshot.account.top_level_domain.clone().unwrap_or_default(),
            installed: widget.installed,
        }
    }

    /// `X-Widget-Installation` value for widgets not yet installed.
    pub fn installation_marker(&self) -> Option<String> {
        if self.installed {
            None
        } else {
            Some(format!("{}_{}", self.account_id, self.widget_id))
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    /// Path relative to the backend base URL, query string included
    pub route: String,
    pub method: Method,
    pub body: Option<Value>,
    pub identity: RequestIdentity,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one request and return the decoded JSON body. An empty body
    /// comes back as `Value::Null`.
    async fn send(&self, request: ApiRequest) -> Result<Value, ApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_installation_marker_only_when_not_installed() {
        let mut identity = RequestIdentity {
            widget_id: "w1".into(),
            account_id: "1001".into(),
            user_id: "5".into(),
            language: "ru".into(),
            top_level_domain: "ru".into(),
            installed: true,
        };
        assert_eq!(identity.installation_marker(), None);

        identity.installed = false;
        assert_eq!(identity.installation_marker().as_deref(), Some("1001_w1"));
    }
}
