//! Repeating background polls.
//!
//! [`spawn_repeating`] runs a poll every `period` until the returned handle
//! is aborted. Each tick is spawned as its own task and never awaited by the
//! loop, so a slow request does not delay the next tick and overlapping
//! requests may resolve in any order. Every tick receives the [`Ticket`] of
//! the mount that started the loop; once that mount ends, pending ticks can
//! no longer apply results and the loop exits.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::lifecycle::Ticket;

/// Spawn a repeating poll. The first tick fires one `period` after the call.
pub fn spawn_repeating<F, Fut>(
    name: &'static str,
    period: Duration,
    ticket: Ticket,
    tick: F,
) -> JoinHandle<()>
where
    F: Fn(Ticket) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    info!(component = name, interval_secs = period.as_secs(), "starting poller");

    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            if !ticket.is_current() {
                debug!(component = name, "mount ended, stopping poller");
                break;
            }
            debug!(component = name, "poll tick");
            tokio::spawn(tick(ticket.clone()));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::Lifecycle;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_ticks_every_period_after_first_delay() {
        let lifecycle = Lifecycle::new();
        let ticks = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&ticks);

        let handle = spawn_repeating("test", Duration::from_secs(60), lifecycle.ticket(), move |_| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);

        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_ticks_overlap() {
        let lifecycle = Lifecycle::new();
        let running = Arc::new(AtomicU32::new(0));
        let peak = Arc::new(AtomicU32::new(0));
        let (r, p) = (Arc::clone(&running), Arc::clone(&peak));

        let handle = spawn_repeating("slow", Duration::from_secs(10), lifecycle.ticket(), move |_| {
            let (running, peak) = (Arc::clone(&r), Arc::clone(&p));
            async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(25)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_secs(41)).await;
        assert!(peak.load(Ordering::SeqCst) >= 2);
        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_stops_when_lifecycle_invalidated() {
        let lifecycle = Lifecycle::new();
        let ticks = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&ticks);

        let handle = spawn_repeating("stops", Duration::from_secs(5), lifecycle.ticket(), move |_| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        lifecycle.invalidate();
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);
        assert!(handle.is_finished());
    }
}
