//! Native desktop notifications for new critical alerts.
//!
//! Best-effort only: a missing `notify-send`, no graphical session, or a
//! failed spawn is logged at debug level and otherwise ignored.

use std::process::{ExitStatus, Stdio};
use std::sync::Mutex;

use fuelwatch_core::Alert;
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::debug;

/// Something that can show a desktop notification.
pub trait DesktopNotifier: Send + Sync {
    fn notify(&self, title: &str, body: &str);
}

/// Sends notifications through `notify-send` (libnotify).
#[derive(Debug, Clone, Default)]
pub struct NotifySend;

impl NotifySend {
    fn has_display() -> bool {
        ["DISPLAY", "WAYLAND_DISPLAY"]
            .iter()
            .any(|var| std::env::var_os(var).is_some_and(|v| !v.is_empty()))
    }
}

impl DesktopNotifier for NotifySend {
    fn notify(&self, title: &str, body: &str) {
        if !Self::has_display() {
            debug!("no graphical session, skipping desktop notification");
            return;
        }

        if tokio::runtime::Handle::try_current().is_err() {
            debug!("no async runtime, skipping desktop notification");
            return;
        }

        let mut command = Command::new("notify-send");
        command.args(["--urgency", "critical", "--app-name", "fuelwatch", title, body]);
        if let Err(e) = spawn_reaped(&mut command) {
            debug!(error = %e, "desktop notification unavailable");
        }
    }
}

/// Spawn `command` and wait for it on a background task, so the child is
/// reaped once it exits. Must be called from within a tokio runtime.
fn spawn_reaped(command: &mut Command) -> std::io::Result<JoinHandle<Option<ExitStatus>>> {
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;

    Ok(tokio::spawn(async move {
        match child.wait().await {
            Ok(status) => {
                if !status.success() {
                    debug!(%status, "notifier exited with failure");
                }
                Some(status)
            }
            Err(e) => {
                debug!(error = %e, "failed to wait for notifier");
                None
            }
        }
    }))
}

/// Discards notifications.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl DesktopNotifier for NoopNotifier {
    fn notify(&self, _title: &str, _body: &str) {}
}

/// Keeps every notification in memory; used by tests.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifications shown so far as `(title, body)`.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }
}

impl DesktopNotifier for RecordingNotifier {
    fn notify(&self, title: &str, body: &str) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((title.to_string(), body.to_string()));
        }
    }
}

/// Title and body announcing a set of critical alerts.
pub fn critical_alert_message(alerts: &[Alert]) -> (String, String) {
    let title = format!(
        "Fuelwatch: {} critical stock alert{}",
        alerts.len(),
        if alerts.len() == 1 { "" } else { "s" }
    );

    let mut lines: Vec<String> = alerts
        .iter()
        .take(3)
        .map(|a| match &a.sucursal_nombre {
            Some(branch) => format!("{} ({}) at {}", a.tanque_nombre, branch, a.stock_label()),
            None => format!("{} at {}", a.tanque_nombre, a.stock_label()),
        })
        .collect();
    if alerts.len() > 3 {
        lines.push(format!("and {} more", alerts.len() - 3));
    }

    (title, lines.join("\n"))
}
