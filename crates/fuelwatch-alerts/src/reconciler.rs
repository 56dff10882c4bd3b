//! Notification feed with local read/unread tracking.
//!
//! The feed is replaced wholesale on every load. Local mutations after a
//! successful mark-read are applied optimistically without re-fetching, and
//! keep `unread_count` equal to the number of unseen entries in the feed.

use std::sync::Arc;
use std::time::Duration;

use fuelwatch_core::{Notification, Session, UserId, log_notification_event};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::activity_log::ActivityLog;
use crate::api_types::ActivityEntry;
use crate::backend::AlertBackend;
use crate::error::{AlertsError, Result};
use crate::lifecycle::{Lifecycle, Mounted, Ticket};
use crate::scheduler::spawn_repeating;

/// Default notification feed interval (10 seconds).
pub const DEFAULT_FEED_INTERVAL: Duration = Duration::from_secs(10);

/// Published feed state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotificationFeedState {
    pub notifications: Vec<Notification>,
    /// Entries in `notifications` with `visto == false`
    pub unread_count: u64,
    /// User-facing message from the last failed operation
    pub last_error: Option<String>,
}

impl NotificationFeedState {
    fn replace_feed(&mut self, notifications: Vec<Notification>) {
        self.unread_count = unread_in(&notifications);
        self.notifications = notifications;
        self.last_error = None;
    }
}

fn unread_in(notifications: &[Notification]) -> u64 {
    notifications.iter().filter(|n| !n.visto).count() as u64
}

struct Inner {
    backend: Arc<dyn AlertBackend>,
    session: Session,
    interval: Duration,
    activity: ActivityLog,
    lifecycle: Lifecycle,
    state: watch::Sender<NotificationFeedState>,
}

/// Keeps the notification feed of the session user in sync.
#[derive(Clone)]
pub struct NotificationReconciler {
    inner: Arc<Inner>,
}

impl NotificationReconciler {
    pub fn new(backend: Arc<dyn AlertBackend>, session: Session, activity: ActivityLog) -> Self {
        Self::with_interval(backend, session, activity, DEFAULT_FEED_INTERVAL)
    }

    pub fn with_interval(
        backend: Arc<dyn AlertBackend>,
        session: Session,
        activity: ActivityLog,
        interval: Duration,
    ) -> Self {
        let (state, _) = watch::channel(NotificationFeedState::default());
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

    pub fn state(&self) -> NotificationFeedState {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<NotificationFeedState> {
        self.inner.state.subscribe()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.inner.state.borrow().notifications.clone()
    }

    pub fn unread_count(&self) -> u64 {
        self.inner.state.borrow().unread_count
    }

    pub fn last_error(&self) -> Option<String> {
        self.inner.state.borrow().last_error.clone()
    }

    pub fn interval(&self) -> Duration {
        self.inner.interval
    }

    /// Fetch the feed of `user_id`.
    ///
    /// A payload that is not a list yields an empty feed. Transport and
    /// status failures keep the current feed, store a user-facing message in
    /// `last_error` and are returned.
    pub async fn load(&self, user_id: &UserId) -> Result<()> {
        self.load_with(user_id, self.inner.lifecycle.ticket()).await
    }

    async fn load_with(&self, user_id: &UserId, ticket: Ticket) -> Result<()> {
        match self.inner.backend.notification_feed(user_id).await {
            Ok(feed) => {
                log_notification_event!(
                    "feed_loaded",
                    user_id = %user_id,
                    total = feed.len(),
                    unread = unread_in(&feed)
                );
                if !ticket.apply(&self.inner.state, |s| s.replace_feed(feed)) {
                    debug!(user_id = %user_id, "discarding stale notification feed");
                }
                Ok(())
            }
            Err(e) if e.is_malformed() => {
                warn!(
                    user_id = %user_id,
                    error = %e,
                    "malformed notification feed, using empty feed"
                );
                ticket.apply(&self.inner.state, |s| s.replace_feed(Vec::new()));
                Ok(())
            }
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "failed to load notification feed");
                self.record_error(&ticket, &e);
                Err(e)
            }
        }
    }

    fn record_error(&self, ticket: &Ticket, error: &AlertsError) {
        let message = error.friendly_message();
        ticket.apply(&self.inner.state, |s| s.last_error = Some(message));
    }

    /// Load the session user's feed because the notification panel opened.
    pub async fn open_panel(&self) -> Result<()> {
        let user_id = self.inner.session.require_user()?;
        log_notification_event!("panel_opened", user_id = %user_id);
        self.load(user_id).await
    }

    /// Link notifications without an owner, then reload the feed.
    ///
    /// Returns the server's message.
    pub async fn reconcile_existing(&self) -> Result<String> {
        let ticket = self.inner.lifecycle.ticket();
        let user_id = match self.inner.session.require_user() {
            Ok(user_id) => user_id,
            Err(e) => {
                let e = AlertsError::from(e);
                self.record_error(&ticket, &e);
                return Err(e);
            }
        };

        let report = match self.inner.backend.link_existing_notifications().await {
            Ok(report) => report,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "failed to link existing notifications");
                self.record_error(&ticket, &e);
                return Err(e);
            }
        };
        log_notification_event!(
            "linked_existing",
            user_id = %user_id,
            server_message = %report.message
        );

        self.inner.activity.record(
            ActivityEntry::new("vincular_notificaciones", report.message.clone()).for_user(user_id),
        );

        self.load_with(user_id, ticket).await?;
        Ok(report.message)
    }

    /// Mark one notification read and drop it from the feed.
    ///
    /// The counter only moves when the removed entry was unread. An id that
    /// is not in the feed leaves local state alone.
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
            let Some(pos) = s.notifications.iter().position(|n| n.id == notification_id) else {
                return;
            };
            let removed = s.notifications.remove(pos);
            if !removed.visto {
                s.unread_count = s.unread_count.saturating_sub(1);
            }
        });
        log_notification_event!("marked_read", notification_id);
        true
    }

    /// Mark every notification of `user_id` read and clear the feed.
    pub async fn mark_all_read(&self, user_id: &UserId) -> bool {
        let ticket = self.inner.lifecycle.ticket();

        if let Err(e) = self.inner.backend.mark_all_notifications_read(user_id).await {
            warn!(user_id = %user_id, error = %e, "failed to mark all notifications read");
            return false;
        }

        ticket.apply(&self.inner.state, |s| {
            s.notifications.clear();
            s.unread_count = 0;
        });
        log_notification_event!("marked_all_read", user_id = %user_id);
        true
    }

    /// Bumps the epoch under the state lock.
    fn unmount_hook(&self) -> impl FnOnce() + Send + 'static {
        let inner = Arc::clone(&self.inner);
        move || inner.lifecycle.invalidate_within(&inner.state)
    }

    /// Start polling the session user's feed.
    ///
    /// Loads immediately, then every interval. Background failures are
    /// logged and kept in `last_error`.
    pub fn mount(&self) -> Mounted {
        let Some(user_id) = self.inner.session.user_id.clone() else {
            warn!("notification reconciler not started: no user in session");
            return Mounted::idle("reconciler", self.unmount_hook());
        };
        let ticket = self.inner.lifecycle.ticket();

        let initial = {
            let reconciler = self.clone();
            let (user_id, ticket) = (user_id.clone(), ticket.clone());
            tokio::spawn(async move {
                let _ = reconciler.load_with(&user_id, ticket).await;
            })
        };

        let reconciler = self.clone();
        let repeating = spawn_repeating("reconciler", self.inner.interval, ticket, move |ticket| {
            let reconciler = reconciler.clone();
            let user_id = user_id.clone();
            async move {
                let _ = reconciler.load_with(&user_id, ticket).await;
            }
        });

        Mounted::new("reconciler", self.unmount_hook(), vec![initial, repeating])
    }
}
