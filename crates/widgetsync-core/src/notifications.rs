//! Pending-notification delivery.
//!
//! One instance per caching window fetches the account's notification
//! batch; the others see the window marker (or the in-flight marker) and
//! skip. Items are shown one at a time in listed order with a cooldown
//! between them, and each id gets a seen marker so it is not repeated
//! within its own window, by this instance or any other.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use tracing::{debug, info};

use crate::api::{BackendApi, NotificationRecord, RequestIdentity};
use crate::context::{Host, Notice, WidgetContext};
use crate::error::Result;
use crate::store::{ttl_minutes, KeyValueStore, StoreKeys};

/// What one `deliver_pending` call did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// False when the window marker or in-flight marker short-circuited
    pub fetched: bool,
    pub shown: Vec<String>,
    pub skipped_seen: Vec<String>,
    pub skipped_admin_only: Vec<String>,
}

pub struct NotificationDelivery {
    store: Arc<dyn KeyValueStore>,
    api: BackendApi,
    host: Arc<dyn Host>,
    keys: StoreKeys,
    lock_ttl: Duration,
}

impl NotificationDelivery {
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

    pub async fn deliver_pending(&self, widget: &WidgetContext) -> Result<DeliveryReport> {
        let window_key = self.keys.notifications();
        let lock_key = self.keys.notifications_lock();

        if self.store.contains(&window_key)? || self.store.contains(&lock_key)? {
            debug!(widget = %widget.widget_id, "Notifications already fetched for this window");
            return Ok(DeliveryReport::default());
        }

        self.store.set(&lock_key, "1", self.lock_ttl)?;

        let snapshot = self.host.snapshot();
        let identity = RequestIdentity::new(widget, &snapshot);
        let batch = self.api.fetch_notifications(&identity).await?;

        self.store
            .set(&window_key, "1", ttl_minutes(batch.cache_minutes))?;

        let is_admin = snapshot.current_user_is_admin();
        let cooldown =
            StdDuration::try_from_secs_f64(batch.show_next_waiting_seconds).unwrap_or_default();
        let notifications = batch.notifications.unwrap_or_default();

        let mut report = DeliveryReport {
            fetched: true,
            ..Default::default()
        };

        let last = notifications.len().saturating_sub(1);
        for (index, notification) in notifications.iter().enumerate() {
            let seen_key = self.keys.notification_seen(&notification.id);

            if self.store.contains(&seen_key)? {
                report.skipped_seen.push(notification.id.clone());
                continue;
            }
            if notification.admin_only && !is_admin {
                report.skipped_admin_only.push(notification.id.clone());
                continue;
            }

            self.show(notification);
            self.store.set(
                &seen_key,
                "1",
                ttl_minutes(notification.caching_minutes),
            )?;
            report.shown.push(notification.id.clone());

            if index < last {
                tokio::time::sleep(cooldown).await;
            }
        }

        debug!(
            shown = report.shown.len(),
            seen = report.skipped_seen.len(),
            admin_only = report.skipped_admin_only.len(),
            "Notification batch processed"
        );
        Ok(report)
    }

    fn show(&self, notification: &NotificationRecord) {
        info!(id = %notification.id, header = %notification.header, "Showing notification");
        self.host.show_notification(&Notice {
            header: notification.header.clone(),
            text: notification.text.clone(),
            link: notification.link.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::backend::ROUTE_ACCOUNT_NOTIFICATIONS;
    use crate::testing::TestEnv;
    use serde_json::{json, Value};

    fn delivery(env: &TestEnv) -> NotificationDelivery {
        NotificationDelivery::new(
            env.store.clone(),
            BackendApi::new(env.transport.clone()),
            env.host.clone(),
            StoreKeys::default(),
            Duration::minutes(3),
        )
    }

    fn batch(notifications: Value) -> Value {
        json!({
            "notifications": notifications,
            "cacheMinutes": 30,
            "showNextWaitingSeconds": 3
        })
    }

    fn two_items() -> Value {
        json!([
            {"id": 1, "header": "one", "text": "for everyone", "onlyForAdmin": false},
            {"id": 2, "header": "two", "text": "for admins", "onlyForAdmin": true}
        ])
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_admin_sees_only_public_items() {
        let env = TestEnv::regular_user();
        env.transport.respond(ROUTE_ACCOUNT_NOTIFICATIONS, batch(two_items()));

        let report = delivery(&env).deliver_pending(&env.widget()).await.unwrap();

        assert_eq!(env.host.notice_headers(), vec!["one"]);
        assert_eq!(report.shown, vec!["1"]);
        assert_eq!(report.skipped_admin_only, vec!["2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_admin_sees_all_in_order_with_cooldown() {
        let env = TestEnv::admin();
        env.transport.respond(ROUTE_ACCOUNT_NOTIFICATIONS, batch(two_items()));

        delivery(&env).deliver_pending(&env.widget()).await.unwrap();

        assert_eq!(env.host.notice_headers(), vec!["one", "two"]);
        let times = env.host.notice_times();
        assert!(times[1] - times[0] >= StdDuration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_seen_marker_suppresses_repeat() {
        let env = TestEnv::admin();
        env.store
            .set(&StoreKeys::default().notification_seen("1"), "1", Duration::minutes(5))
            .unwrap();
        env.transport.respond(ROUTE_ACCOUNT_NOTIFICATIONS, batch(two_items()));

        let report = delivery(&env).deliver_pending(&env.widget()).await.unwrap();

        assert_eq!(env.host.notice_headers(), vec!["two"]);
        assert_eq!(report.skipped_seen, vec!["1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_call_in_window_does_nothing() {
        let env = TestEnv::admin();
        env.transport.respond(ROUTE_ACCOUNT_NOTIFICATIONS, batch(two_items()));
        let delivery = delivery(&env);

        let first = delivery.deliver_pending(&env.widget()).await.unwrap();
        assert!(first.fetched);
        assert!(env.store.contains(&StoreKeys::default().notifications()).unwrap());

        env.clock.advance(Duration::seconds(30));
        let second = delivery.deliver_pending(&env.widget()).await.unwrap();

        assert_eq!(second, DeliveryReport::default());
        assert_eq!(env.transport.call_count(), 1);
        assert_eq!(env.host.notices().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_after_window_expires_seen_items_still_suppressed() {
        let env = TestEnv::admin();
        env.transport.respond(
            ROUTE_ACCOUNT_NOTIFICATIONS,
            json!({
                "notifications": [
                    {"id": 1, "header": "short", "cachingMin": 1},
                    {"id": 2, "header": "long", "cachingMin": 120}
                ],
                "cacheMinutes": 10
            }),
        );
        let delivery = delivery(&env);
        delivery.deliver_pending(&env.widget()).await.unwrap();

        env.clock.advance(Duration::minutes(11));
        let report = delivery.deliver_pending(&env.widget()).await.unwrap();

        assert!(report.fetched);
        assert_eq!(report.shown, vec!["1"]);
        assert_eq!(report.skipped_seen, vec!["2"]);
        assert_eq!(env.host.notice_headers(), vec!["short", "long", "short"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lock_present_skips_fetch() {
        let env = TestEnv::admin();
        env.store
            .set(&StoreKeys::default().notifications_lock(), "1", Duration::minutes(3))
            .unwrap();

        let report = delivery(&env).deliver_pending(&env.widget()).await.unwrap();
        assert!(!report.fetched);
        assert_eq!(env.transport.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_failure_leaves_lock_to_expire() {
        let env = TestEnv::admin();
        env.transport.fail(ROUTE_ACCOUNT_NOTIFICATIONS, 503, "");
        let delivery = delivery(&env);

        assert!(delivery.deliver_pending(&env.widget()).await.is_err());
        assert!(!env.store.contains(&StoreKeys::default().notifications()).unwrap());

        assert!(!delivery.deliver_pending(&env.widget()).await.unwrap().fetched);
        env.clock.advance(Duration::minutes(3));
        assert!(delivery.deliver_pending(&env.widget()).await.is_err());
        assert_eq!(env.transport.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_batch_still_marks_window() {
        let env = TestEnv::admin();
        env.transport.respond(
            ROUTE_ACCOUNT_NOTIFICATIONS,
            json!({"notifications": null, "cacheMinutes": 5}),
        );

        let report = delivery(&env).deliver_pending(&env.widget()).await.unwrap();
        assert!(report.fetched);
        assert!(report.shown.is_empty());
        assert!(env.store.contains(&StoreKeys::default().notifications()).unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_yields_to_other_tasks() {
        let env = TestEnv::admin();
        env.transport.respond(ROUTE_ACCOUNT_NOTIFICATIONS, batch(two_items()));
        let delivery = delivery(&env);

        let ticker = async {
            let mut ticks = 0;
            for _ in 0..5 {
                tokio::time::sleep(StdDuration::from_millis(100)).await;
                ticks += 1;
            }
            ticks
        };
        let widget = env.widget();
        let (report, ticks) = tokio::join!(delivery.deliver_pending(&widget), ticker);

        assert_eq!(report.unwrap().shown.len(), 2);
        assert_eq!(ticks, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_caching_windows_are_clamped() {
        let env = TestEnv::admin();
        env.transport.respond(
            ROUTE_ACCOUNT_NOTIFICATIONS,
            json!({
                "notifications": [{"id": 9, "header": "long", "cachingMin": i64::MAX}],
                "cacheMinutes": 1_000_000_000_000i64
            }),
        );

        let report = delivery(&env).deliver_pending(&env.widget()).await.unwrap();
        assert_eq!(report.shown, vec!["9"]);

        env.clock.advance(Duration::days(365));
        let keys = StoreKeys::default();
        assert!(env.store.contains(&keys.notifications()).unwrap());
        assert!(env.store.contains(&keys.notification_seen("9")).unwrap());
    }
}
