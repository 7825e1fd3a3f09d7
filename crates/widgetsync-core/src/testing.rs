//! Test doubles shared by the module tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::api::{ApiError, ApiRequest, Transport};
use crate::context::{Host, HostSnapshot, Notice, WidgetContext};
use crate::store::{ManualClock, MemoryStore};

pub const WIDGET_ID: &str = "w-42";

enum Reply {
    Json(Value),
    Status { status: u16, body: String },
}

/// Transport answering from a per-route script and recording every request.
#[derive(Default)]
pub struct ScriptedTransport {
    replies: Mutex<HashMap<String, Reply>>,
    calls: Mutex<Vec<ApiRequest>>,
}

impl ScriptedTransport {
    pub fn respond(&self, route: &str, value: Value) {
        self.replies.lock().insert(route.to_string(), Reply::Json(value));
    }

    pub fn fail(&self, route: &str, status: u16, body: &str) {
        self.replies.lock().insert(
            route.to_string(),
            Reply::Status {
                status,
                body: body.to_string(),
            },
        );
    }

    pub fn calls(&self) -> Vec<ApiRequest> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn routes(&self) -> Vec<String> {
        self.calls.lock().iter().map(|c| c.route.clone()).collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: ApiRequest) -> Result<Value, ApiError> {
        self.calls.lock().push(request.clone());
        match self.replies.lock().get(&request.route) {
            Some(Reply::Json(value)) => Ok(value.clone()),
            Some(Reply::Status { status, body }) => Err(ApiError::from_status_code(*status, body)),
            None => Err(ApiError::Transport(format!("no scripted reply for {}", request.route))),
        }
    }
}

/// Host returning a fixed snapshot and recording what it was asked to show.
pub struct RecordingHost {
    snapshot: Mutex<HostSnapshot>,
    notices: Mutex<Vec<(Notice, tokio::time::Instant)>>,
    errors: Mutex<Vec<String>>,
}

impl RecordingHost {
    pub fn new(snapshot: HostSnapshot) -> Self {
        Self {
            snapshot: Mutex::new(snapshot),
            notices: Mutex::new(Vec::new()),
            errors: Mutex::new(Vec::new()),
        }
    }

    pub fn update(&self, apply: impl FnOnce(&mut HostSnapshot)) {
        apply(&mut *self.snapshot.lock());
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn notice_times(&self) -> Vec<tokio::time::Instant> {
        self.notices.lock().iter().map(|(_, t)| *t).collect()
    }

    pub fn notice_headers(&self) -> Vec<String> {
        self.notices.lock().iter().map(|(n, _)| n.header.clone()).collect()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().clone()
    }
}

impl Host for RecordingHost {
    fn snapshot(&self) -> HostSnapshot {
        self.snapshot.lock().clone()
    }

    fn show_notification(&self, notice: &Notice) {
        self.notices
            .lock()
            .push((notice.clone(), tokio::time::Instant::now()));
    }

    fn show_error(&self, message: &str) {
        self.errors.lock().push(message.to_string());
    }
}

/// Account with two managers: "5" (admin) and "6" (regular user).
pub fn sample_snapshot(current_user: &str) -> HostSnapshot {
    serde_json::from_value(json!({
        "account": {
            "id": 1001,
            "name": "Acme",
            "subdomain": "acme",
            "top_level_domain": "ru",
            "users": {"5": {"id": 5}, "6": {"id": 6}},
            "cf": [{"id": 1}]
        },
        "groups": {"group_0": "Sales"},
        "managers": {
            "5": {"id": "5", "title": "Ann", "active": true, "avatar": "/a/5.png", "is_admin": "Y"},
            "6": {"id": "6", "title": "Bob", "active": true, "is_admin": "N"}
        },
        "user": {"id": current_user, "name": "Ann", "login": "ann@acme.test", "personal_mobile": "+7900"},
        "language": "ru"
    }))
    .expect("sample snapshot is valid")
}

/// Shared store/clock/transport/host wiring for one simulated session.
pub struct TestEnv {
    pub clock: Arc<ManualClock>,
    pub store: Arc<MemoryStore>,
    pub transport: Arc<ScriptedTransport>,
    pub host: Arc<RecordingHost>,
}

impl TestEnv {
    pub fn new(current_user: &str) -> Self {
        let clock = Arc::new(ManualClock::default());
        Self {
            store: Arc::new(MemoryStore::with_clock(clock.clone())),
            clock,
            transport: Arc::new(ScriptedTransport::default()),
            host: Arc::new(RecordingHost::new(sample_snapshot(current_user))),
        }
    }

    pub fn admin() -> Self {
        Self::new("5")
    }

    pub fn regular_user() -> Self {
        Self::new("6")
    }

    pub fn widget(&self) -> WidgetContext {
        WidgetContext::new(WIDGET_ID)
    }
}
