//! Fire-and-forget activity log (bitácora) posts.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::task::JoinHandle;
use tracing::debug;

use crate::api_types::ActivityEntry;
use crate::backend::AlertBackend;

/// Posts [`ActivityEntry`] records without waiting for the outcome.
///
/// Clones share the set of posts still in flight, so [`ActivityLog::flush`]
/// on any clone waits for entries recorded through the others.
#[derive(Clone)]
pub struct ActivityLog {
    backend: Option<Arc<dyn AlertBackend>>,
    pending: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl ActivityLog {
    /// Log through `backend`.
    pub fn new(backend: Arc<dyn AlertBackend>) -> Self {
        Self {
            backend: Some(backend),
            pending: Arc::default(),
        }
    }

    /// An activity log that drops every entry.
    pub fn disabled() -> Self {
        Self {
            backend: None,
            pending: Arc::default(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    fn pending(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Spawn the post and return immediately. Returns whether a post was
    /// started.
    pub fn record(&self, entry: ActivityEntry) -> bool {
        let Some(backend) = self.backend.as_ref().map(Arc::clone) else {
            return false;
        };
        let handle = tokio::spawn(async move {
            if let Err(e) = backend.record_activity(&entry).await {
                debug!(accion = %entry.accion, error = %e, "activity log post failed");
            }
        });

        let mut pending = self.pending();
        pending.retain(|h| !h.is_finished());
        pending.push(handle);
        true
    }

    /// Number of posts not yet finished.
    pub fn in_flight(&self) -> usize {
        self.pending().iter().filter(|h| !h.is_finished()).count()
    }

    /// Wait for every post recorded so far.
    ///
    /// Short-lived commands call this before the runtime shuts down, which
    /// would otherwise cancel the spawned posts.
    pub async fn flush(&self) {
        let handles = std::mem::take(&mut *self.pending());
        if handles.is_empty() {
            return;
        }
        debug!(count = handles.len(), "flushing activity log");
        for handle in handles {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MockBackend, MockCall};
    use std::time::Duration;

    #[tokio::test]
    async fn test_record_posts_entry() {
        let mock = MockBackend::new();
        let log = ActivityLog::new(Arc::new(mock.clone()));

        assert!(log.record(ActivityEntry::new("verificar_stock", "manual")));
        log.flush().await;

        assert_eq!(mock.activity().len(), 1);
        assert!(matches!(mock.calls()[0], MockCall::RecordActivity(_)));
    }

    #[tokio::test]
    async fn test_disabled_log_spawns_nothing() {
        let log = ActivityLog::disabled();
        assert!(!log.is_enabled());
        assert!(!log.record(ActivityEntry::new("x", "y")));
        assert_eq!(log.in_flight(), 0);
        log.flush().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_waits_for_slow_posts_from_clones() {
        let mock = MockBackend::new();
        mock.respond_activity_after(Duration::from_secs(3), Ok(()));
        let log = ActivityLog::new(Arc::new(mock.clone()));
        let component_copy = log.clone();

        component_copy.record(ActivityEntry::new("vincular_notificaciones", "3 linked"));
        tokio::task::yield_now().await;
        assert_eq!(log.in_flight(), 1);

        log.flush().await;
        assert_eq!(log.in_flight(), 0);
        assert_eq!(mock.activity().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_post_does_not_fail_flush() {
        let mock = MockBackend::new();
        mock.respond_activity(Err(crate::backend::connection_refused()));
        let log = ActivityLog::new(Arc::new(mock.clone()));

        log.record(ActivityEntry::new("resolver_alerta", "Alert 3 resolved"));
        log.flush().await;
        assert_eq!(log.in_flight(), 0);
    }
}
