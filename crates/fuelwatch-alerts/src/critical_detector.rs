//! Edge-triggered detection of new critical alerts.
//!
//! Each poll fetches critical alerts, keeps only those that are both
//! `CRÍTICO` and below [`CRITICAL_STOCK_THRESHOLD`] percent, and compares the
//! size of that set with the previous one. Growth raises `has_new_alerts`
//! (plus a desktop notification); shrinking or equal sizes leave the flag
//! alone until [`CriticalAlertDetector::dismiss`] clears it.
//!
//! Growth is measured by count, not identity: one alert resolving while
//! another appears between two polls does not raise the flag.
//!
//! [`CRITICAL_STOCK_THRESHOLD`]: fuelwatch_core::CRITICAL_STOCK_THRESHOLD

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use fuelwatch_core::{Alert, AlertLevel, Session, SucursalId, UserId, log_alert_event};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::backend::AlertBackend;
use crate::desktop_notify::{DesktopNotifier, critical_alert_message};
use crate::lifecycle::{Lifecycle, Mounted, Ticket};
use crate::scheduler::spawn_repeating;

/// Default critical scan interval (120 seconds).
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(120);

/// Published detector state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CriticalAlertState {
    /// Critical-low alerts seen on the last poll
    pub critical: Vec<Alert>,
    /// Set when the critical set grew; cleared only by `dismiss`
    pub has_new_alerts: bool,
    /// When the last poll result was applied
    pub last_polled: Option<DateTime<Utc>>,
}

struct Inner {
    backend: Arc<dyn AlertBackend>,
    session: Session,
    interval: Duration,
    notifier: Arc<dyn DesktopNotifier>,
    lifecycle: Lifecycle,
    state: watch::Sender<CriticalAlertState>,
}

/// Watches the critical-alert subset for growth.
#[derive(Clone)]
pub struct CriticalAlertDetector {
    inner: Arc<Inner>,
}

impl CriticalAlertDetector {
    /// Create a detector with the default interval.
    pub fn new(
        backend: Arc<dyn AlertBackend>,
        session: Session,
        notifier: Arc<dyn DesktopNotifier>,
    ) -> Self {
        Self::with_interval(backend, session, notifier, DEFAULT_SCAN_INTERVAL)
    }

    /// Create a detector with a custom scan interval.
    pub fn with_interval(
        backend: Arc<dyn AlertBackend>,
        session: Session,
        notifier: Arc<dyn DesktopNotifier>,
        interval: Duration,
    ) -> Self {
        let (state, _) = watch::channel(CriticalAlertState::default());
        Self {
            inner: Arc::new(Inner {
                backend,
                session,
                interval,
                notifier,
                lifecycle: Lifecycle::new(),
                state,
            }),
        }
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> CriticalAlertState {
        self.inner.state.borrow().clone()
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> watch::Receiver<CriticalAlertState> {
        self.inner.state.subscribe()
    }

    pub fn has_new_alerts(&self) -> bool {
        self.inner.state.borrow().has_new_alerts
    }

    pub fn critical(&self) -> Vec<Alert> {
        self.inner.state.borrow().critical.clone()
    }

    pub fn interval(&self) -> Duration {
        self.inner.interval
    }

    /// Poll critical alerts, optionally for one branch.
    pub async fn poll(&self, user_id: &UserId, sucursal_id: Option<&SucursalId>) {
        self.poll_with(user_id, sucursal_id, self.inner.lifecycle.ticket()).await;
    }

    async fn poll_with(&self, user_id: &UserId, sucursal_id: Option<&SucursalId>, ticket: Ticket) {
        let fetched = self
            .inner
            .backend
            .alerts_by_level(AlertLevel::Critico, sucursal_id)
            .await;

        let critical: Vec<Alert> = match fetched {
            // The server filter is re-checked here in case it was ignored.
            Ok(alerts) => alerts.into_iter().filter(Alert::is_critical_low).collect(),
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "critical alert scan failed, clearing set");
                Vec::new()
            }
        };

        let mut grew = None;
        let applied = ticket.apply(&self.inner.state, |s| {
            let previous = s.critical.len();
            if critical.len() > previous {
                s.has_new_alerts = true;
                grew = Some((previous, critical.clone()));
            }
            s.critical = critical;
            s.last_polled = Some(Utc::now());
        });

        if !applied {
            debug!(user_id = %user_id, "discarding stale critical scan");
            return;
        }

        if let Some((previous, alerts)) = grew {
            log_alert_event!(
                "new_critical_alerts",
                user_id = %user_id,
                previous,
                current = alerts.len()
            );
            let (title, body) = critical_alert_message(&alerts);
            self.inner.notifier.notify(&title, &body);
        }
    }

    /// Clear the "new alerts" flag. The critical set is kept.
    pub fn dismiss(&self) {
        self.inner.state.send_if_modified(|s| {
            let was_set = s.has_new_alerts;
            s.has_new_alerts = false;
            was_set
        });
    }

    /// Bumps the epoch under the state lock.
    fn unmount_hook(&self) -> impl FnOnce() + Send + 'static {
        let inner = Arc::clone(&self.inner);
        move || inner.lifecycle.invalidate_within(&inner.state)
    }

    /// Start scanning for the session user and branch.
    ///
    /// Polls immediately, then every interval. Without a session user
    /// nothing is started.
    pub fn mount(&self) -> Mounted {
        let Some(user_id) = self.inner.session.user_id.clone() else {
            warn!("critical alert detector not started: no user in session");
            return Mounted::idle("critical_detector", self.unmount_hook());
        };
        let sucursal_id = self.inner.session.sucursal_id.clone();
        let ticket = self.inner.lifecycle.ticket();

        let initial = {
            let detector = self.clone();
            let (user_id, sucursal_id) = (user_id.clone(), sucursal_id.clone());
            let ticket = ticket.clone();
            tokio::spawn(async move {
                detector
                    .poll_with(&user_id, sucursal_id.as_ref(), ticket)
                    .await
            })
        };

        let detector = self.clone();
        let repeating = spawn_repeating(
            "critical_detector",
            self.inner.interval,
            ticket,
            move |ticket| {
                let detector = detector.clone();
                let (user_id, sucursal_id) = (user_id.clone(), sucursal_id.clone());
                async move {
                    detector
                        .poll_with(&user_id, sucursal_id.as_ref(), ticket)
                        .await
                }
            },
        );

        Mounted::new("critical_detector", self.unmount_hook(), vec![initial, repeating])
    }
}
