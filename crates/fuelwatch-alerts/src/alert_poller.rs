//! Unread-count and pending-alert polling.
//!
//! [`AlertPoller`] keeps a badge counter and the pending-alert list roughly
//! in sync with the backend. Background reads fail safe: any failure resets
//! the value to `0` / `[]` instead of keeping a stale one, and nothing is
//! propagated. Manual stock verification is the one operation whose failure
//! reaches the caller.

use std::sync::Arc;
use std::time::Duration;

use fuelwatch_core::{Alert, Session, UserId, log_alert_event};
use futures_util::future::join;
use tokio::sync::watch;
use tracing::{debug, error, warn};

use crate::activity_log::ActivityLog;
use crate::api_types::{ActivityEntry, VerificationReport};
use crate::backend::AlertBackend;
use crate::error::Result;
use crate::lifecycle::{Lifecycle, Mounted, Ticket};
use crate::scheduler::spawn_repeating;

/// Default count polling interval (60 seconds).
pub const DEFAULT_COUNT_INTERVAL: Duration = Duration::from_secs(60);

/// Published poller state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlertPollerState {
    /// Unread notification count as last reported by the backend
    pub unread_count: u64,
    /// Pending alerts, replaced wholesale on each load
    pub pending: Vec<Alert>,
}

struct Inner {
    backend: Arc<dyn AlertBackend>,
    session: Session,
    interval: Duration,
    activity: ActivityLog,
    lifecycle: Lifecycle,
    state: watch::Sender<AlertPollerState>,
}

/// Polls the unread count and pending alerts of the session user.
#[derive(Clone)]
pub struct AlertPoller {
    inner: Arc<Inner>,
}

impl AlertPoller {
    /// Create a poller with the default interval.
    pub fn new(backend: Arc<dyn AlertBackend>, session: Session, activity: ActivityLog) -> Self {
        Self::with_interval(backend, session, activity, DEFAULT_COUNT_INTERVAL)
    }

    /// Create a poller with a custom count interval.
    pub fn with_interval(
        backend: Arc<dyn AlertBackend>,
        session: Session,
        activity: ActivityLog,
        interval: Duration,
    ) -> Self {
        let (state, _) = watch::channel(AlertPollerState::default());
        Self {
            inner: Arc::new(Inner {
                backend,
                session,
                interval,
                activity,
                lifecycle: Lifecycle::new(),
                state,
            }),
        }
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> AlertPollerState {
        self.inner.state.borrow().clone()
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> watch::Receiver<AlertPollerState> {
        self.inner.state.subscribe()
    }

    pub fn unread_count(&self) -> u64 {
        self.inner.state.borrow().unread_count
    }

    pub fn pending(&self) -> Vec<Alert> {
        self.inner.state.borrow().pending.clone()
    }

    pub fn interval(&self) -> Duration {
        self.inner.interval
    }

    /// Fetch the unread count. Failures reset the counter to 0.
    pub async fn load_count(&self, user_id: &UserId) {
        self.load_count_with(user_id, self.inner.lifecycle.ticket()).await;
    }

    async fn load_count_with(&self, user_id: &UserId, ticket: Ticket) {
        let count = match self.inner.backend.unread_count(user_id).await {
            Ok(count) => {
                log_alert_event!("count_loaded", user_id = %user_id, count);
                count
            }
            Err(e) => {
                warn!(
                    user_id = %user_id,
                    error = %e,
                    "failed to load unread count, resetting to 0"
                );
                0
            }
        };

        if !ticket.apply(&self.inner.state, |s| s.unread_count = count) {
            debug!(user_id = %user_id, "discarding stale unread count");
        }
    }

    /// Fetch the pending alerts. Failures and non-array payloads yield `[]`.
    pub async fn load_pending(&self, user_id: &UserId) {
        self.load_pending_with(user_id, self.inner.lifecycle.ticket()).await;
    }

    async fn load_pending_with(&self, user_id: &UserId, ticket: Ticket) {
        let pending = match self.inner.backend.pending_alerts(user_id).await {
            Ok(alerts) => {
                log_alert_event!("pending_loaded", user_id = %user_id, pending = alerts.len());
                alerts
            }
            Err(e) => {
                warn!(
                    user_id = %user_id,
                    error = %e,
                    "failed to load pending alerts, clearing list"
                );
                Vec::new()
            }
        };

        if !ticket.apply(&self.inner.state, |s| s.pending = pending) {
            debug!(user_id = %user_id, "discarding stale pending alerts");
        }
    }

    /// Mark a notification read on the backend, then drop it locally.
    ///
    /// The counter is decremented by one (never below zero) without
    /// re-fetching. Returns whether the backend accepted the request.
    pub async fn mark_read(&self, notification_id: i64) -> bool {
        let ticket = self.inner.lifecycle.ticket();

        if let Err(e) = self
            .inner
            .backend
            .mark_notification_read(notification_id)
            .await
        {
            warn!(notification_id, error = %e, "failed to mark notification read");
            return false;
        }

        ticket.apply(&self.inner.state, |s| {
            s.pending.retain(|a| a.id != notification_id);
            s.unread_count = s.unread_count.saturating_sub(1);
        });
        log_alert_event!("marked_read", notification_id);
        true
    }

    /// Trigger a server-side stock re-evaluation, then refresh the count.
    ///
    /// Unlike the background reads, failures are returned to the caller.
    pub async fn verify_stocks_manually(&self, user_id: &UserId) -> Result<VerificationReport> {
        let report = self
            .inner
            .backend
            .verify_stocks(user_id)
            .await
            .inspect_err(|e| {
                error!(user_id = %user_id, error = %e, "manual stock verification failed");
            })?;

        log_alert_event!(
            "stocks_verified",
            user_id = %user_id,
            tanques_criticos = report.tanques_criticos
        );

        self.load_count(user_id).await;

        self.inner.activity.record(
            ActivityEntry::new(
                "verificar_stock",
                format!(
                    "Manual stock verification: {} critical tanks",
                    report.tanques_criticos
                ),
            )
            .for_user(user_id),
        );

        Ok(report)
    }

    /// Bumps the epoch under the state lock.
    fn unmount_hook(&self) -> impl FnOnce() + Send + 'static {
        let inner = Arc::clone(&self.inner);
        move || inner.lifecycle.invalidate_within(&inner.state)
    }

    /// Start polling for the session user.
    ///
    /// Loads count and pending alerts immediately, then the count every
    /// interval. Without a session user nothing is started.
    pub fn mount(&self) -> Mounted {
        let Some(user_id) = self.inner.session.user_id.clone() else {
            warn!("alert poller not started: no user in session");
            return Mounted::idle("alert_poller", self.unmount_hook());
        };

        let ticket = self.inner.lifecycle.ticket();

        let initial = {
            let poller = self.clone();
            let user_id = user_id.clone();
            let ticket = ticket.clone();
            tokio::spawn(async move {
                join(
                    poller.load_count_with(&user_id, ticket.clone()),
                    poller.load_pending_with(&user_id, ticket),
                )
                .await;
            })
        };

        let poller = self.clone();
        let repeating = spawn_repeating("alert_poller", self.inner.interval, ticket, move |ticket| {
            let poller = poller.clone();
            let user_id = user_id.clone();
            async move { poller.load_count_with(&user_id, ticket).await }
        });

        Mounted::new("alert_poller", self.unmount_hook(), vec![initial, repeating])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MockBackend, MockCall, connection_refused};
    use crate::error::AlertsError;
    use fuelwatch_core::AlertLevel;

    fn user() -> UserId {
        UserId::parse("u1").unwrap()
    }

    fn alert(id: i64) -> Alert {
        Alert {
            id,
            nivel: AlertLevel::Bajo,
            tanque_nombre: format!("Tanque {id}"),
            stock_actual: 1500.0,
            capacidad_max: 10000.0,
            porcentaje_stock: Some(15.0),
            sucursal_nombre: Some("Centro".into()),
            fecha: None,
        }
    }

    fn poller(mock: &MockBackend) -> AlertPoller {
        AlertPoller::new(
            Arc::new(mock.clone()),
            Session::for_user(user()),
            ActivityLog::new(Arc::new(mock.clone())),
        )
    }

    #[tokio::test]
    async fn test_count_then_network_error_resets_to_zero() {
        let mock = MockBackend::new();
        mock.respond_count(Ok(5)).respond_count(Err(connection_refused()));
        let poller = poller(&mock);

        poller.load_count(&user()).await;
        assert_eq!(poller.unread_count(), 5);

        poller.load_count(&user()).await;
        assert_eq!(poller.unread_count(), 0);
    }

    #[tokio::test]
    async fn test_non_2xx_count_resets_to_zero() {
        let mock = MockBackend::new();
        mock.respond_count(Ok(7))
            .respond_count(Err(AlertsError::status(500, "db down")));
        let poller = poller(&mock);

        poller.load_count(&user()).await;
        poller.load_count(&user()).await;
        assert_eq!(poller.unread_count(), 0);
    }

    #[tokio::test]
    async fn test_pending_failure_clears_list() {
        let mock = MockBackend::new();
        mock.respond_pending(Ok(vec![alert(1), alert(2)]))
            .respond_pending(Err(AlertsError::malformed("pending_alerts", "not an array")));
        let poller = poller(&mock);

        poller.load_pending(&user()).await;
        assert_eq!(poller.pending().len(), 2);

        poller.load_pending(&user()).await;
        assert!(poller.pending().is_empty());
    }

    #[tokio::test]
    async fn test_mark_read_floors_at_zero() {
        let mock = MockBackend::new();
        mock.respond_count(Ok(1)).respond_pending(Ok(vec![alert(3)]));
        let poller = poller(&mock);
        poller.load_count(&user()).await;
        poller.load_pending(&user()).await;

        assert!(poller.mark_read(3).await);
        assert_eq!(poller.unread_count(), 0);
        assert!(poller.pending().is_empty());

        assert!(poller.mark_read(3).await);
        assert_eq!(poller.unread_count(), 0);
    }

    #[tokio::test]
    async fn test_mark_read_failure_leaves_state() {
        let mock = MockBackend::new();
        mock.respond_count(Ok(2))
            .respond_ack(Err(AlertsError::status(404, "")));
        let poller = poller(&mock);
        poller.load_count(&user()).await;

        assert!(!poller.mark_read(9).await);
        assert_eq!(poller.unread_count(), 2);
    }

    #[tokio::test]
    async fn test_verify_refreshes_count_and_logs_activity() {
        let mock = MockBackend::new();
        mock.respond_verification(Ok(VerificationReport {
            tanques_criticos: 2,
            ..Default::default()
        }))
        .respond_count(Ok(4));
        let poller = poller(&mock);

        let report = poller.verify_stocks_manually(&user()).await.unwrap();
        assert_eq!(report.tanques_criticos, 2);
        assert_eq!(poller.unread_count(), 4);

        poller.inner.activity.flush().await;
        assert_eq!(mock.activity()[0].accion, "verificar_stock");
    }

    #[tokio::test]
    async fn test_verify_failure_propagates_without_refresh() {
        let mock = MockBackend::new();
        mock.respond_verification(Err(AlertsError::Timeout(15)));
        let poller = poller(&mock);

        let err = poller.verify_stocks_manually(&user()).await.unwrap_err();
        assert!(err.is_network_error());
        assert_eq!(mock.count_calls(|c| matches!(c, MockCall::UnreadCount(_))), 0);
        assert!(mock.activity().is_empty());
    }

    #[tokio::test]
    async fn test_mount_without_user_is_idle() {
        let mock = MockBackend::new();
        let poller = AlertPoller::new(
            Arc::new(mock.clone()),
            Session::default(),
            ActivityLog::disabled(),
        );

        let mounted = poller.mount();
        assert!(!mounted.is_polling());
        tokio::task::yield_now().await;
        assert!(mock.calls().is_empty());
    }
}
