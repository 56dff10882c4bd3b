//! Mount/unmount bookkeeping for the polling components.
//!
//! Each component owns a [`Lifecycle`]: an epoch counter bumped on unmount.
//! Work captures a [`Ticket`] before it suspends on I/O and applies its
//! result only through [`Ticket::apply`], which refuses once the epoch has
//! moved on. A response that resolves after unmount is therefore dropped.
//!
//! Both the check in `apply` and the bump in
//! [`Lifecycle::invalidate_within`] run under the state channel's write
//! lock, so an update is either fully applied before the unmount returns or
//! not applied at all.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

/// Epoch counter shared by a component and its tasks.
#[derive(Debug, Clone, Default)]
pub struct Lifecycle {
    epoch: Arc<AtomicU64>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture the current epoch.
    pub fn ticket(&self) -> Ticket {
        Ticket {
            epoch: Arc::clone(&self.epoch),
            issued: self.epoch.load(Ordering::SeqCst),
        }
    }

    /// Invalidate every outstanding ticket.
    pub fn invalidate(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }

    /// Invalidate while holding the write lock of `state`.
    ///
    /// Waits for any [`Ticket::apply`] in progress on the same channel to
    /// finish. Receivers are not notified.
    pub fn invalidate_within<T>(&self, state: &watch::Sender<T>) {
        state.send_if_modified(|_| {
            self.invalidate();
            false
        });
    }

    /// Current epoch value.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }
}

/// Permission to apply a result, valid until the owning lifecycle moves on.
#[derive(Debug, Clone)]
pub struct Ticket {
    epoch: Arc<AtomicU64>,
    issued: u64,
}

impl Ticket {
    /// Whether the lifecycle is still in the epoch this ticket was issued in.
    pub fn is_current(&self) -> bool {
        self.epoch.load(Ordering::SeqCst) == self.issued
    }

    /// Apply `update` to the published state if the ticket is still current.
    ///
    /// The check runs under the channel's write lock. Paired with
    /// [`Lifecycle::invalidate_within`] on the same channel, an update either
    /// lands before the unmount returns or not at all. Returns whether it
    /// landed.
    pub fn apply<T>(&self, state: &watch::Sender<T>, update: impl FnOnce(&mut T)) -> bool {
        state.send_if_modified(|value| {
            if !self.is_current() {
                return false;
            }
            update(value);
            true
        })
    }
}

type Invalidate = Box<dyn FnOnce() + Send>;

/// Handle to a mounted component. Dropping it unmounts.
///
/// Unmounting invalidates the lifecycle and aborts the repeating tasks, so
/// requests still in flight cannot change state afterwards.
#[must_use = "dropping the guard unmounts the component immediately"]
pub struct Mounted {
    name: &'static str,
    invalidate: Option<Invalidate>,
    tasks: Vec<JoinHandle<()>>,
}

impl Mounted {
    /// Guard whose drop runs `invalidate`, then aborts `tasks`.
    pub(crate) fn new(
        name: &'static str,
        invalidate: impl FnOnce() + Send + 'static,
        tasks: Vec<JoinHandle<()>>,
    ) -> Self {
        Self {
            name,
            invalidate: Some(Box::new(invalidate)),
            tasks,
        }
    }

    /// A guard with no running tasks (mount was refused).
    pub(crate) fn idle(name: &'static str, invalidate: impl FnOnce() + Send + 'static) -> Self {
        Self::new(name, invalidate, Vec::new())
    }

    /// Whether any polling task is still running.
    pub fn is_polling(&self) -> bool {
        self.tasks.iter().any(|t| !t.is_finished())
    }

    /// Explicitly unmount.
    pub fn unmount(self) {
        drop(self);
    }
}

impl Drop for Mounted {
    fn drop(&mut self) {
        if let Some(invalidate) = self.invalidate.take() {
            invalidate();
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }
        debug!(component = self.name, "unmounted");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticket_invalidated_by_epoch_bump() {
        let lifecycle = Lifecycle::new();
        let ticket = lifecycle.ticket();
        assert!(ticket.is_current());

        lifecycle.invalidate();
        assert!(!ticket.is_current());
        assert!(lifecycle.ticket().is_current());
        assert_eq!(lifecycle.epoch(), 1);
    }

    #[test]
    fn test_apply_respects_ticket() {
        let lifecycle = Lifecycle::new();
        let (tx, rx) = watch::channel(0u32);

        let ticket = lifecycle.ticket();
        assert!(ticket.apply(&tx, |v| *v = 1));
        assert_eq!(*rx.borrow(), 1);

        lifecycle.invalidate();
        assert!(!ticket.apply(&tx, |v| *v = 2));
        assert_eq!(*rx.borrow(), 1);
    }

    #[tokio::test]
    async fn test_dropping_mounted_aborts_tasks_and_invalidates() {
        let lifecycle = Lifecycle::new();
        let ticket = lifecycle.ticket();
        let task = tokio::spawn(std::future::pending::<()>());

        let invalidated = lifecycle.clone();
        let mounted = Mounted::new("test", move || invalidated.invalidate(), vec![task]);
        assert!(mounted.is_polling());
        mounted.unmount();

        assert!(!ticket.is_current());
    }

    #[test]
    fn test_idle_guard_is_not_polling() {
        let lifecycle = Lifecycle::new();
        let invalidated = lifecycle.clone();
        let mounted = Mounted::idle("test", move || invalidated.invalidate());
        assert!(!mounted.is_polling());
        drop(mounted);
        assert_eq!(lifecycle.epoch(), 1);
    }

    #[test]
    fn test_invalidate_within_does_not_notify() {
        let lifecycle = Lifecycle::new();
        let (tx, mut rx) = watch::channel(0u32);
        rx.mark_unchanged();

        lifecycle.invalidate_within(&tx);
        assert_eq!(lifecycle.epoch(), 1);
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_invalidate_within_waits_for_state_lock() {
        let lifecycle = Lifecycle::new();
        let (tx, _rx) = watch::channel(0u32);
        let tx = Arc::new(tx);

        // A held borrow stands in for an apply that passed its ticket check.
        let held = tx.borrow();
        let unmount = {
            let (lifecycle, tx) = (lifecycle.clone(), Arc::clone(&tx));
            std::thread::spawn(move || lifecycle.invalidate_within(&tx))
        };

        std::thread::sleep(std::time::Duration::from_millis(50));
        assert_eq!(lifecycle.epoch(), 0, "bump must wait for the lock");

        drop(held);
        unmount.join().unwrap();
        assert_eq!(lifecycle.epoch(), 1);
    }

    #[test]
    fn test_apply_after_invalidate_within_is_refused() {
        let lifecycle = Lifecycle::new();
        let (tx, rx) = watch::channel(0u32);
        let ticket = lifecycle.ticket();

        lifecycle.invalidate_within(&tx);
        assert!(!ticket.apply(&tx, |v| *v = 5));
        assert_eq!(*rx.borrow(), 0);
    }
}
