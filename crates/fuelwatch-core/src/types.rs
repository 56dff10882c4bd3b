//! Domain types shared across Fuelwatch crates.
//!
//! Field names follow the backend's JSON (Spanish) so payloads deserialize
//! without per-field renames.

use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{FuelwatchError, Result};

/// Stock percentage below which a critical alert counts as "critical-low".
pub const CRITICAL_STOCK_THRESHOLD: f64 = 10.0;

macro_rules! identifier {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Parse an identifier, rejecting empty values and path separators.
            pub fn parse(value: impl AsRef<str>) -> Result<Self> {
                let value = value.as_ref().trim();
                if value.is_empty() || value.contains('/') {
                    return Err(FuelwatchError::invalid_identifier($kind, value));
                }
                Ok(Self(value.to_string()))
            }

            /// Borrow the raw identifier.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = FuelwatchError;

            fn from_str(s: &str) -> Result<Self> {
                Self::parse(s)
            }
        }
    };
}

identifier!(
    /// Identifier of the logged-in dashboard user.
    UserId,
    "user"
);

identifier!(
    /// Identifier of a branch (sucursal).
    SucursalId,
    "branch"
);

/// Explicit session context handed to each component at construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub user_id: Option<UserId>,
    pub sucursal_id: Option<SucursalId>,
}

impl Session {
    /// Session for a known user, without branch scoping.
    pub fn for_user(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            sucursal_id: None,
        }
    }

    /// Scope the session to a branch.
    pub fn with_sucursal(mut self, sucursal_id: SucursalId) -> Self {
        self.sucursal_id = Some(sucursal_id);
        self
    }

    /// The session user, or [`FuelwatchError::MissingUser`].
    pub fn require_user(&self) -> Result<&UserId> {
        self.user_id.as_ref().ok_or(FuelwatchError::MissingUser)
    }
}

/// Alert severity tier as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertLevel {
    #[serde(rename = "CRÍTICO", alias = "CRITICO")]
    Critico,
    #[serde(rename = "BAJO")]
    Bajo,
    #[serde(rename = "NORMAL")]
    Normal,
    /// Any level string this client does not know about
    #[serde(other)]
    Other,
}

impl AlertLevel {
    /// Wire value used in query strings.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critico => "CRÍTICO",
            Self::Bajo => "BAJO",
            Self::Normal => "NORMAL",
            Self::Other => "OTRO",
        }
    }
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tank-stock alert computed by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: i64,
    pub nivel: AlertLevel,
    #[serde(default)]
    pub tanque_nombre: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub stock_actual: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub capacidad_max: f64,
    /// `None` when the backend sent no usable percentage
    #[serde(default, deserialize_with = "lenient_opt_f64")]
    pub porcentaje_stock: Option<f64>,
    #[serde(default)]
    pub sucursal_nombre: Option<String>,
    #[serde(default, deserialize_with = "lenient_datetime")]
    pub fecha: Option<DateTime<Utc>>,
}

impl Alert {
    /// Critical level and a known stock strictly below
    /// [`CRITICAL_STOCK_THRESHOLD`]. An unknown percentage never qualifies.
    pub fn is_critical_low(&self) -> bool {
        self.nivel == AlertLevel::Critico
            && self
                .porcentaje_stock
                .is_some_and(|pct| pct < CRITICAL_STOCK_THRESHOLD)
    }

    /// Stock percentage for display, e.g. `4.5%` or `?%`.
    pub fn stock_label(&self) -> String {
        match self.porcentaje_stock {
            Some(pct) => format!("{pct:.1}%"),
            None => "?%".to_string(),
        }
    }
}

/// Aggregate alert counters, recomputed server-side on every fetch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertStatistics {
    #[serde(default, deserialize_with = "lenient_u64")]
    pub total: u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub criticas: u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub bajas: u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub hoy: u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub semana: u64,
    #[serde(default, alias = "promedio", deserialize_with = "lenient_f64")]
    pub promedio_porcentaje: f64,
}

/// A user-facing notification with read state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    #[serde(default)]
    pub titulo: String,
    #[serde(default)]
    pub descripcion: String,
    #[serde(default)]
    pub tanque_nombre: Option<String>,
    #[serde(default, deserialize_with = "lenient_datetime")]
    pub fecha_notificacion: Option<DateTime<Utc>>,
    #[serde(default)]
    pub visto: bool,
}

/// Accepts a JSON number, a numeric string, or null (as 0.0).
fn lenient_f64<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
        Null,
    }

    match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Number(n)) => Ok(n),
        Some(Raw::Text(s)) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| serde::de::Error::custom(format!("not a number: {s:?}"))),
        Some(Raw::Null) | None => Ok(0.0),
    }
}

/// Like [`lenient_f64`], but keeps "missing" apart from zero: null, absent,
/// unparseable or non-finite values become `None`.
fn lenient_opt_f64<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    let value = match raw {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(value.filter(|v| v.is_finite()))
}

/// Accepts a non-negative integer or a numeric string (SQL counts often
/// arrive as strings).
pub fn lenient_u64<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s
            .trim()
            .parse::<u64>()
            .map_err(|_| serde::de::Error::custom(format!("not a count: {s:?}"))),
    }
}

/// Accepts RFC 3339 or naive `YYYY-MM-DD[T ]HH:MM:SS[.f]` (read as UTC).
/// Anything else becomes `None`.
fn lenient_datetime<'de, D>(deserializer: D) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw.as_ref().and_then(|v| v.as_str()).and_then(parse_timestamp))
}

/// Parse a backend timestamp string.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}
