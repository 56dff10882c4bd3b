//! # fuelwatch-alerts
//!
//! Keeps a fuel-station dashboard's alert and notification state in sync
//! with the station backend.
//!
//! This crate provides:
//! - [`AlertPoller`] - Unread count and pending alerts (60 s)
//! - [`CriticalAlertDetector`] - Edge-triggered critical stock alerts (120 s)
//! - [`NotificationReconciler`] - Notification feed with read tracking (10 s)
//! - [`StationClient`] - REST implementation of [`AlertBackend`]
//! - [`MockBackend`] - Scriptable backend for tests
//! - [`ActivityLog`] - Fire-and-forget activity log posts
//!
//! ## Lifecycle
//!
//! Each component starts polling with `mount()`, which returns a
//! [`Mounted`] guard. Dropping the guard stops the repeating task and
//! discards every response still in flight.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use fuelwatch_alerts::{ActivityLog, AlertBackend, AlertPoller, StationClient};
//! use fuelwatch_core::{Session, UserId};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client: Arc<dyn AlertBackend> = Arc::new(StationClient::new(
//!         "http://localhost:3000/api",
//!         std::time::Duration::from_secs(15),
//!     )?);
//!     let session = Session::for_user(UserId::parse("42")?);
//!
//!     let poller = AlertPoller::new(Arc::clone(&client), session, ActivityLog::new(client));
//!     let _mounted = poller.mount();
//!
//!     let mut updates = poller.subscribe();
//!     updates.changed().await?;
//!     println!("{} unread", updates.borrow().unread_count);
//!     Ok(())
//! }
//! ```

pub mod activity_log;
pub mod alert_poller;
pub mod api_types;
pub mod backend;
pub mod client;
pub mod critical_detector;
pub mod desktop_notify;
pub mod error;
pub mod lifecycle;
pub mod reconciler;
pub mod scheduler;

// Re-export main types
pub use activity_log::ActivityLog;
pub use alert_poller::{AlertPoller, AlertPollerState};
pub use api_types::{ActivityEntry, LinkReport, VerificationReport};
pub use backend::{AlertBackend, MockBackend, MockCall};
pub use client::StationClient;
pub use critical_detector::{CriticalAlertDetector, CriticalAlertState};
pub use desktop_notify::{DesktopNotifier, NoopNotifier, NotifySend, RecordingNotifier};
pub use error::{AlertsError, Result};
pub use lifecycle::{Lifecycle, Mounted, Ticket};
pub use reconciler::{NotificationFeedState, NotificationReconciler};
