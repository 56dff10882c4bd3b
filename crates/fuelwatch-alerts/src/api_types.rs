//! Request and response payloads for the station backend.
//!
//! Domain records ([`Alert`], [`Notification`], ...) live in
//! `fuelwatch-core`; this module only holds the envelopes around them.

use chrono::{DateTime, Utc};
use fuelwatch_core::types::lenient_u64;
use fuelwatch_core::{Alert, UserId};
use serde::{Deserialize, Serialize};

/// `GET /notificaciones/usuario/{id}/count`
#[derive(Debug, Clone, Deserialize)]
pub struct CountResponse {
    #[serde(deserialize_with = "lenient_u64")]
    pub count: u64,
}

/// `GET /alertas/usuario/{id}/pendientes`
///
/// Kept as raw JSON so a non-array field can be told apart from a broken
/// record.
#[derive(Debug, Clone, Deserialize)]
pub struct PendingAlertsEnvelope {
    #[serde(default)]
    pub alertas_pendientes: serde_json::Value,
}

impl PendingAlertsEnvelope {
    /// The pending alerts, if the field is an array of valid alerts.
    pub fn into_alerts(self) -> Result<Vec<Alert>, String> {
        if !self.alertas_pendientes.is_array() {
            return Err(format!(
                "alertas_pendientes is not an array: {}",
                json_kind(&self.alertas_pendientes)
            ));
        }
        serde_json::from_value(self.alertas_pendientes).map_err(|e| e.to_string())
    }
}

/// `POST /alertas/verificar-manual` request body.
#[derive(Debug, Clone, Serialize)]
pub struct VerifyStocksRequest<'a> {
    #[serde(rename = "usuarioId")]
    pub usuario_id: &'a UserId,
}

/// `POST /alertas/verificar-manual` response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    #[serde(default, deserialize_with = "lenient_u64")]
    pub tanques_criticos: u64,

    /// Any other fields the backend reports
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// `POST /notificaciones/vincular-existentes` response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkReport {
    #[serde(default)]
    pub message: String,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Activity-log (bitácora) entry posted after user-initiated actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub usuario_id: Option<UserId>,
    pub accion: String,
    pub modulo: String,
    pub descripcion: String,
    pub fecha: DateTime<Utc>,
}

impl ActivityEntry {
    /// Module name recorded for every entry from this client.
    pub const MODULE: &'static str = "alertas";

    /// Create a new entry for an action.
    pub fn new(accion: impl Into<String>, descripcion: impl Into<String>) -> Self {
        Self {
            usuario_id: None,
            accion: accion.into(),
            modulo: Self::MODULE.to_string(),
            descripcion: descripcion.into(),
            fecha: Utc::now(),
        }
    }

    /// Attribute the entry to a user.
    pub fn for_user(mut self, user_id: &UserId) -> Self {
        self.usuario_id = Some(user_id.clone());
        self
    }

    /// Override the module.
    pub fn with_module(mut self, modulo: impl Into<String>) -> Self {
        self.modulo = modulo.into();
        self
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
