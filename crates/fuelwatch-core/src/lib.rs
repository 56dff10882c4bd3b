//! # fuelwatch-core
//!
//! Core types, errors, and utilities for the Fuelwatch alert client.
//!
//! This crate provides:
//! - [`FuelwatchError`] - Error types shared by every Fuelwatch crate
//! - [`logging`] - Tracing setup and log directory helpers
//! - [`types`] - Alerts, notifications, statistics and session identifiers
//!
//! ## Example
//!
//! ```no_run
//! use fuelwatch_core::{logging, Session, UserId};
//!
//! fn main() -> fuelwatch_core::Result<()> {
//!     let _guard = logging::init_logging(None, false)?;
//!
//!     let session = Session::for_user(UserId::parse("42")?);
//!     tracing::info!(user_id = %session.require_user()?, "session ready");
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;
pub mod types;

pub use error::{FuelwatchError, Result};
pub use logging::{LogGuard, init_logging};
pub use types::{
    Alert, AlertLevel, AlertStatistics, CRITICAL_STOCK_THRESHOLD, Notification, Session,
    SucursalId, UserId,
};
