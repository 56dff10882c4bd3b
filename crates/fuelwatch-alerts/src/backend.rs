//! Backend abstraction for the alert components.
//!
//! This module provides:
//! - [`AlertBackend`] - The REST operations the components depend on
//! - [`MockBackend`] - Scriptable in-memory backend for tests and demos
//!
//! The production implementation is [`crate::client::StationClient`].

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use fuelwatch_core::{Alert, AlertLevel, AlertStatistics, Notification, SucursalId, UserId};

use crate::api_types::{ActivityEntry, LinkReport, VerificationReport};
use crate::error::{AlertsError, Result};

/// REST operations consumed by the alert components.
#[async_trait]
pub trait AlertBackend: Send + Sync {
    /// Unread notification count for a user.
    async fn unread_count(&self, user_id: &UserId) -> Result<u64>;

    /// Pending alerts for a user.
    async fn pending_alerts(&self, user_id: &UserId) -> Result<Vec<Alert>>;

    /// Mark a single notification as read.
    async fn mark_notification_read(&self, notification_id: i64) -> Result<()>;

    /// Mark every notification of a user as read.
    async fn mark_all_notifications_read(&self, user_id: &UserId) -> Result<()>;

    /// Ask the backend to re-evaluate tank stocks now.
    async fn verify_stocks(&self, user_id: &UserId) -> Result<VerificationReport>;

    /// Alerts filtered by level and, optionally, branch.
    async fn alerts_by_level(
        &self,
        level: AlertLevel,
        sucursal_id: Option<&SucursalId>,
    ) -> Result<Vec<Alert>>;

    /// Notification feed of a user.
    async fn notification_feed(&self, user_id: &UserId) -> Result<Vec<Notification>>;

    /// Link notifications created without an owner to their users.
    async fn link_existing_notifications(&self) -> Result<LinkReport>;

    /// Aggregate alert counters.
    async fn alert_statistics(&self, sucursal_id: Option<&SucursalId>) -> Result<AlertStatistics>;

    /// Mark an alert as resolved.
    async fn resolve_alert(&self, alert_id: i64) -> Result<()>;

    /// Delete an alert.
    async fn delete_alert(&self, alert_id: i64) -> Result<()>;

    /// Append an entry to the activity log.
    async fn record_activity(&self, entry: &ActivityEntry) -> Result<()>;
}

/// A call observed by [`MockBackend`].
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    UnreadCount(UserId),
    PendingAlerts(UserId),
    MarkRead(i64),
    MarkAllRead(UserId),
    VerifyStocks(UserId),
    AlertsByLevel(AlertLevel, Option<SucursalId>),
    NotificationFeed(UserId),
    LinkExisting,
    Statistics(Option<SucursalId>),
    ResolveAlert(i64),
    DeleteAlert(i64),
    RecordActivity(ActivityEntry),
}

/// One scripted response, optionally delayed.
struct Scripted<T> {
    delay: Duration,
    result: Result<T>,
}

type Queue<T> = VecDeque<Scripted<T>>;

#[derive(Default)]
struct MockState {
    counts: Queue<u64>,
    pending: Queue<Vec<Alert>>,
    acks: Queue<()>,
    verifications: Queue<VerificationReport>,
    by_level: Queue<Vec<Alert>>,
    feeds: Queue<Vec<Notification>>,
    links: Queue<LinkReport>,
    statistics: Queue<AlertStatistics>,
    activity_posts: Queue<()>,
    calls: Vec<MockCall>,
}

/// Scriptable in-memory backend.
///
/// Each operation pops the next scripted response from its queue; an empty
/// queue answers with an empty success (`0`, `[]`, `()`, default report).
/// Acknowledgement-style operations (mark read, mark all read, resolve,
/// delete) share one queue. Activity posts have their own.
#[derive(Clone, Default)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

macro_rules! script_methods {
    ($($(#[$meta:meta])* $name:ident, $delayed:ident, $field:ident: $ty:ty;)*) => {
        $(
            $(#[$meta])*
            pub fn $name(&self, result: Result<$ty>) -> &Self {
                self.$delayed(Duration::ZERO, result)
            }

            /// Same as the undelayed variant, answering after `delay`.
            pub fn $delayed(&self, delay: Duration, result: Result<$ty>) -> &Self {
                self.lock().$field.push_back(Scripted { delay, result });
                self
            }
        )*
    };
}

impl MockBackend {
    /// Create a mock with empty queues.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        // A panic in another test thread must not cascade here.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    script_methods! {
        /// Script the next unread-count response.
        respond_count, respond_count_after, counts: u64;
        /// Script the next pending-alerts response.
        respond_pending, respond_pending_after, pending: Vec<Alert>;
        /// Script the next acknowledgement (mark read, mark all, resolve, delete).
        respond_ack, respond_ack_after, acks: ();
        /// Script the next manual verification response.
        respond_verification, respond_verification_after, verifications: VerificationReport;
        /// Script the next filtered-alerts response.
        respond_alerts_by_level, respond_alerts_by_level_after, by_level: Vec<Alert>;
        /// Script the next notification feed response.
        respond_feed, respond_feed_after, feeds: Vec<Notification>;
        /// Script the next link-existing response.
        respond_link, respond_link_after, links: LinkReport;
        /// Script the next statistics response.
        respond_statistics, respond_statistics_after, statistics: AlertStatistics;
        /// Script the next activity log post.
        respond_activity, respond_activity_after, activity_posts: ();
    }

    /// Every call received so far, in order.
    pub fn calls(&self) -> Vec<MockCall> {
        self.lock().calls.clone()
    }

    /// Number of calls matching a predicate.
    pub fn count_calls(&self, predicate: impl Fn(&MockCall) -> bool) -> usize {
        self.lock().calls.iter().filter(|c| predicate(c)).count()
    }

    /// Activity entries posted so far.
    pub fn activity(&self) -> Vec<ActivityEntry> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                MockCall::RecordActivity(entry) => Some(entry.clone()),
                _ => None,
            })
            .collect()
    }

    async fn answer<T: Default>(
        &self,
        call: MockCall,
        pick: impl FnOnce(&mut MockState) -> Option<Scripted<T>>,
    ) -> Result<T> {
        let scripted = {
            let mut state = self.lock();
            state.calls.push(call);
            pick(&mut state)
        };

        match scripted {
            Some(Scripted { delay, result }) => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                result
            }
            None => Ok(T::default()),
        }
    }
}

#[async_trait]
impl AlertBackend for MockBackend {
    async fn unread_count(&self, user_id: &UserId) -> Result<u64> {
        self.answer(MockCall::UnreadCount(user_id.clone()), |s| s.counts.pop_front())
            .await
    }

    async fn pending_alerts(&self, user_id: &UserId) -> Result<Vec<Alert>> {
        self.answer(MockCall::PendingAlerts(user_id.clone()), |s| {
            s.pending.pop_front()
        })
        .await
    }

    async fn mark_notification_read(&self, notification_id: i64) -> Result<()> {
        self.answer(MockCall::MarkRead(notification_id), |s| s.acks.pop_front())
            .await
    }

    async fn mark_all_notifications_read(&self, user_id: &UserId) -> Result<()> {
        self.answer(MockCall::MarkAllRead(user_id.clone()), |s| s.acks.pop_front())
            .await
    }

    async fn verify_stocks(&self, user_id: &UserId) -> Result<VerificationReport> {
        self.answer(MockCall::VerifyStocks(user_id.clone()), |s| {
            s.verifications.pop_front()
        })
        .await
    }

    async fn alerts_by_level(
        &self,
        level: AlertLevel,
        sucursal_id: Option<&SucursalId>,
    ) -> Result<Vec<Alert>> {
        self.answer(
            MockCall::AlertsByLevel(level, sucursal_id.cloned()),
            |s| s.by_level.pop_front(),
        )
        .await
    }

    async fn notification_feed(&self, user_id: &UserId) -> Result<Vec<Notification>> {
        self.answer(MockCall::NotificationFeed(user_id.clone()), |s| {
            s.feeds.pop_front()
        })
        .await
    }

    async fn link_existing_notifications(&self) -> Result<LinkReport> {
        self.answer(MockCall::LinkExisting, |s| s.links.pop_front())
            .await
    }

    async fn alert_statistics(&self, sucursal_id: Option<&SucursalId>) -> Result<AlertStatistics> {
        self.answer(MockCall::Statistics(sucursal_id.cloned()), |s| {
            s.statistics.pop_front()
        })
        .await
    }

    async fn resolve_alert(&self, alert_id: i64) -> Result<()> {
        self.answer(MockCall::ResolveAlert(alert_id), |s| s.acks.pop_front())
            .await
    }

    async fn delete_alert(&self, alert_id: i64) -> Result<()> {
        self.answer(MockCall::DeleteAlert(alert_id), |s| s.acks.pop_front())
            .await
    }

    async fn record_activity(&self, entry: &ActivityEntry) -> Result<()> {
        self.answer(MockCall::RecordActivity(entry.clone()), |s| s.activity_posts.pop_front())
            .await
    }
}

/// Convenience constructor for a connection failure in scripted responses.
pub fn connection_refused() -> AlertsError {
    AlertsError::ConnectionFailed("connection refused".to_string())
}
