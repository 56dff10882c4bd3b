//! Fuelwatch - stock alert and notification client for fuel-station dashboards
//!
//! ## Usage
//!
//! ```bash
//! # Poll alerts and notifications until Ctrl-C
//! fuelwatch watch
//!
//! # Run a manual stock verification
//! fuelwatch verify
//!
//! # With verbose logging and a custom config file
//! fuelwatch -v --config ./fuelwatch.yaml notifications
//!
//! # Show version
//! fuelwatch --version
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, anyhow, bail};
use clap::{Parser, Subcommand};
use fuelwatch_alerts::{
    ActivityEntry, ActivityLog, AlertBackend, AlertPoller, AlertsError, CriticalAlertDetector,
    DesktopNotifier, NoopNotifier, NotificationReconciler, NotifySend, StationClient,
};
use fuelwatch_config::FuelwatchConfig;
use fuelwatch_core::{FuelwatchError, LogGuard, Session, SucursalId, init_logging};
use tracing::{error, info};

/// Fuelwatch stock alert client
///
/// Keeps unread counts, critical stock alerts and the notification feed of a
/// station user in sync with the backend.
#[derive(Parser, Debug)]
#[command(name = "fuelwatch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging (increases log level)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Directory for log files (defaults to ~/.fuelwatch/logs/)
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Configuration file (defaults to ~/.fuelwatch/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Mount every poller and print state changes until Ctrl-C
    Watch,
    /// Ask the backend to re-evaluate tank stocks now
    Verify,
    /// List the notification feed
    Notifications,
    /// Mark one notification as read
    MarkRead { id: i64 },
    /// Mark every notification as read
    MarkAllRead,
    /// Link notifications without an owner to their users
    Link,
    /// Show alert statistics
    Stats {
        /// Restrict to one branch (defaults to the session branch)
        #[arg(long)]
        sucursal: Option<SucursalId>,

        /// Print raw JSON
        #[arg(long)]
        json: bool,
    },
    /// Mark an alert as resolved
    Resolve { id: i64 },
    /// Delete an alert
    Delete { id: i64 },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let _guard = match setup_logging(&cli) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            return ExitCode::from(1);
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to start async runtime: {}", e);
            return ExitCode::from(1);
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("fuelwatch error: {:#}", e);
            eprintln!("Error: {:#}", e);
            if let Some(hint) = guidance(&e) {
                eprintln!("Hint: {hint}");
            }
            ExitCode::from(1)
        }
    }
}

/// Guidance from the first error in the chain that has any.
fn guidance(e: &anyhow::Error) -> Option<&'static str> {
    e.chain().find_map(|cause| {
        if let Some(err) = cause.downcast_ref::<FuelwatchError>() {
            err.guidance()
        } else {
            cause.downcast_ref::<AlertsError>()?.guidance()
        }
    })
}

/// Set up logging based on CLI arguments.
fn setup_logging(cli: &Cli) -> fuelwatch_core::Result<LogGuard> {
    let debug = cli.verbose > 0;
    init_logging(cli.log_dir.clone(), debug)
}

/// Everything a command needs, built from the configuration.
struct App {
    config: FuelwatchConfig,
    session: Session,
    backend: Arc<dyn AlertBackend>,
    activity: ActivityLog,
}

impl App {
    fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let config = FuelwatchConfig::load(path)?;
        let session = config.session()?;
        let backend: Arc<dyn AlertBackend> = Arc::new(StationClient::from_config(&config)?);
        let activity = if config.activity_log {
            ActivityLog::new(Arc::clone(&backend))
        } else {
            ActivityLog::disabled()
        };

        info!(base_url = %config.base_url(), "configuration loaded");
        Ok(Self {
            config,
            session,
            backend,
            activity,
        })
    }

    fn notifier(&self) -> Arc<dyn DesktopNotifier> {
        if self.config.desktop_notifications {
            Arc::new(NotifySend)
        } else {
            Arc::new(NoopNotifier)
        }
    }

    fn poller(&self) -> AlertPoller {
        AlertPoller::with_interval(
            Arc::clone(&self.backend),
            self.session.clone(),
            self.activity.clone(),
            self.config.polling.alert_count_interval(),
        )
    }

    fn detector(&self) -> CriticalAlertDetector {
        CriticalAlertDetector::with_interval(
            Arc::clone(&self.backend),
            self.session.clone(),
            self.notifier(),
            self.config.polling.critical_scan_interval(),
        )
    }

    fn reconciler(&self) -> NotificationReconciler {
        NotificationReconciler::with_interval(
            Arc::clone(&self.backend),
            self.session.clone(),
            self.activity.clone(),
            self.config.polling.notification_feed_interval(),
        )
    }

    /// Post an activity entry for the session user.
    fn record(&self, entry: ActivityEntry) {
        let entry = match &self.session.user_id {
            Some(user_id) => entry.for_user(user_id),
            None => entry,
        };
        self.activity.record(entry);
    }
}

/// Keep core errors intact so their guidance survives; show everything
/// else as its user-facing message.
fn friendly(e: AlertsError) -> anyhow::Error {
    match e {
        AlertsError::Core(err) => err.into(),
        other => anyhow!(other.friendly_message()),
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let ctx = App::load(cli.config.as_deref()).context("failed to load configuration")?;

    let result = dispatch(&ctx, cli.command).await;
    // The runtime cancels spawned tasks on shutdown.
    ctx.activity.flush().await;
    result
}

async fn dispatch(ctx: &App, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Watch => watch(ctx).await,
        Command::Verify => {
            let user_id = ctx.session.require_user()?;
            let poller = ctx.poller();
            let report = poller
                .verify_stocks_manually(user_id)
                .await
                .map_err(friendly)?;
            println!("Critical tanks: {}", report.tanques_criticos);
            println!("Unread notifications: {}", poller.unread_count());
            Ok(())
        }
        Command::Notifications => {
            let reconciler = ctx.reconciler();
            reconciler.open_panel().await.map_err(friendly)?;
            let state = reconciler.state();
            if state.notifications.is_empty() {
                println!("No notifications.");
            }
            for n in &state.notifications {
                let when = n
                    .fecha_notificacion
                    .map(|d| {
                        d.with_timezone(&chrono::Local)
                            .format("%Y-%m-%d %H:%M")
                            .to_string()
                    })
                    .unwrap_or_else(|| "-".to_string());
                let marker = if n.visto { ' ' } else { '*' };
                println!("{marker} [{:>5}] {when}  {}: {}", n.id, n.titulo, n.descripcion);
            }
            println!("{} unread", state.unread_count);
            Ok(())
        }
        Command::MarkRead { id } => {
            if !ctx.reconciler().mark_read(id).await {
                bail!("could not mark notification {id} as read");
            }
            println!("Notification {id} marked as read.");
            Ok(())
        }
        Command::MarkAllRead => {
            let user_id = ctx.session.require_user()?;
            if !ctx.reconciler().mark_all_read(user_id).await {
                bail!("could not mark notifications as read");
            }
            println!("All notifications marked as read.");
            Ok(())
        }
        Command::Link => {
            let message = ctx
                .reconciler()
                .reconcile_existing()
                .await
                .map_err(friendly)?;
            println!("{message}");
            Ok(())
        }
        Command::Stats { sucursal, json } => {
            let sucursal = sucursal.or_else(|| ctx.session.sucursal_id.clone());
            let stats = ctx
                .backend
                .alert_statistics(sucursal.as_ref())
                .await
                .map_err(friendly)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("Total:    {}", stats.total);
                println!("Critical: {}", stats.criticas);
                println!("Low:      {}", stats.bajas);
                println!("Today:    {}", stats.hoy);
                println!("Week:     {}", stats.semana);
                println!("Average:  {:.1}%", stats.promedio_porcentaje);
            }
            Ok(())
        }
        Command::Resolve { id } => {
            ctx.backend.resolve_alert(id).await.map_err(friendly)?;
            ctx.record(ActivityEntry::new("resolver_alerta", format!("Alert {id} resolved")));
            println!("Alert {id} resolved.");
            Ok(())
        }
        Command::Delete { id } => {
            ctx.backend.delete_alert(id).await.map_err(friendly)?;
            ctx.record(ActivityEntry::new("eliminar_alerta", format!("Alert {id} deleted")));
            println!("Alert {id} deleted.");
            Ok(())
        }
    }
}

/// Mount all three components and report their state until Ctrl-C.
async fn watch(ctx: &App) -> anyhow::Result<()> {
    let user_id = ctx.session.require_user()?.clone();
    info!(user_id = %user_id, "starting watch");

    let poller = ctx.poller();
    let detector = ctx.detector();
    let reconciler = ctx.reconciler();

    let mut poller_rx = poller.subscribe();
    let mut detector_rx = detector.subscribe();
    let mut feed_rx = reconciler.subscribe();

    let _mounted = [poller.mount(), detector.mount(), reconciler.mount()];

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, unmounting");
                break;
            }
            Ok(()) = poller_rx.changed() => {
                let state = poller_rx.borrow_and_update().clone();
                println!("alerts: {} unread, {} pending", state.unread_count, state.pending.len());
            }
            Ok(()) = detector_rx.changed() => {
                let state = detector_rx.borrow_and_update().clone();
                if state.has_new_alerts {
                    println!("CRITICAL: {} tanks below threshold", state.critical.len());
                    for alert in &state.critical {
                        println!("  {} at {}", alert.tanque_nombre, alert.stock_label());
                    }
                    detector.dismiss();
                }
            }
            Ok(()) = feed_rx.changed() => {
                let state = feed_rx.borrow_and_update().clone();
                match &state.last_error {
                    Some(message) => println!("notifications: {message}"),
                    None => println!(
                        "notifications: {} total, {} unread",
                        state.notifications.len(),
                        state.unread_count
                    ),
                }
            }
        }
    }

    Ok(())
}
