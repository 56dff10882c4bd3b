//! HTTP implementation of [`AlertBackend`] for the station REST API.
//!
//! ## Example
//!
//! ```no_run
//! use fuelwatch_alerts::{AlertBackend, StationClient};
//! use fuelwatch_config::FuelwatchConfig;
//! use fuelwatch_core::UserId;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = FuelwatchConfig::load(None)?;
//! let client = StationClient::from_config(&config)?;
//!
//! let count = client.unread_count(&UserId::parse("42")?).await?;
//! println!("{count} unread notifications");
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use fuelwatch_config::FuelwatchConfig;
use fuelwatch_core::{Alert, AlertLevel, AlertStatistics, Notification, SucursalId, UserId};
use reqwest::{Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use tokio::time::Duration;
use tracing::debug;

use crate::api_types::{
    ActivityEntry, CountResponse, LinkReport, PendingAlertsEnvelope, VerificationReport,
    VerifyStocksRequest,
};
use crate::backend::AlertBackend;
use crate::error::{AlertsError, Result};

/// REST client for the station backend.
#[derive(Clone)]
pub struct StationClient {
    client: reqwest::Client,
    base_url: String,
    base: Url,
    bearer_token: Option<String>,
    timeout_secs: u64,
}

impl StationClient {
    /// Create a client for `base_url` with a per-request timeout.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let base = Url::parse(&base_url)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| AlertsError::Config(format!("Invalid API base URL: {base_url}")))?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AlertsError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            base,
            bearer_token: None,
            timeout_secs: timeout.as_secs(),
        })
    }

    /// Create a client from the loaded configuration.
    pub fn from_config(config: &FuelwatchConfig) -> Result<Self> {
        let client = Self::new(config.base_url(), config.api.timeout())?;
        Ok(match config.api.bearer_token() {
            Some(token) => client.with_bearer_token(token),
            None => client,
        })
    }

    /// Attach a bearer token to every request.
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Base URL without trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// URL for `segments` under the base path. Each segment is
    /// percent-encoded, so an identifier can never add path, query or
    /// fragment components.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        let builder = self
            .client
            .request(method, self.endpoint(segments))
            .header("accept", "application/json");
        match &self.bearer_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Send a request and reject transport failures and non-2xx statuses.
    async fn send(&self, builder: RequestBuilder, endpoint: &str) -> Result<Response> {
        debug!(endpoint, "sending request to {}", self.base_url);

        let response = builder
            .send()
            .await
            .map_err(|e| AlertsError::from_reqwest(e, self.timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!(endpoint, status = status.as_u16(), "request rejected");
            return Err(AlertsError::from_http_status(status.as_u16(), &body));
        }

        Ok(response)
    }

    /// Send and decode a JSON body; shape mismatches become `MalformedPayload`.
    async fn send_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        endpoint: &str,
    ) -> Result<T> {
        let response = self.send(builder, endpoint).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| AlertsError::from_reqwest(e, self.timeout_secs))?;

        serde_json::from_slice(&bytes).map_err(|e| AlertsError::malformed(endpoint, e.to_string()))
    }

    /// Decode a JSON array, rejecting any other top-level shape.
    async fn send_json_array<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        endpoint: &str,
    ) -> Result<Vec<T>> {
        let value: serde_json::Value = self.send_json(builder, endpoint).await?;
        if !value.is_array() {
            return Err(AlertsError::malformed(endpoint, "expected a JSON array"));
        }
        serde_json::from_value(value).map_err(|e| AlertsError::malformed(endpoint, e.to_string()))
    }
}

#[async_trait]
impl AlertBackend for StationClient {
    async fn unread_count(&self, user_id: &UserId) -> Result<u64> {
        let path = ["notificaciones", "usuario", user_id.as_str(), "count"];
        let response: CountResponse = self
            .send_json(self.request(Method::GET, &path), "unread_count")
            .await?;
        Ok(response.count)
    }

    async fn pending_alerts(&self, user_id: &UserId) -> Result<Vec<Alert>> {
        let path = ["alertas", "usuario", user_id.as_str(), "pendientes"];
        let envelope: PendingAlertsEnvelope = self
            .send_json(self.request(Method::GET, &path), "pending_alerts")
            .await?;
        envelope
            .into_alerts()
            .map_err(|message| AlertsError::malformed("pending_alerts", message))
    }

    async fn mark_notification_read(&self, notification_id: i64) -> Result<()> {
        let id = notification_id.to_string();
        let path = ["notificaciones", "marcar-leida", id.as_str()];
        self.send(self.request(Method::PUT, &path), "mark_notification_read")
            .await?;
        Ok(())
    }

    async fn mark_all_notifications_read(&self, user_id: &UserId) -> Result<()> {
        let path = ["notificaciones", "usuario", user_id.as_str(), "marcar-todas-leidas"];
        self.send(self.request(Method::PUT, &path), "mark_all_notifications_read")
            .await?;
        Ok(())
    }

    async fn verify_stocks(&self, user_id: &UserId) -> Result<VerificationReport> {
        let builder = self
            .request(Method::POST, &["alertas", "verificar-manual"])
            .json(&VerifyStocksRequest {
                usuario_id: user_id,
            });
        self.send_json(builder, "verify_stocks").await
    }

    async fn alerts_by_level(
        &self,
        level: AlertLevel,
        sucursal_id: Option<&SucursalId>,
    ) -> Result<Vec<Alert>> {
        let mut builder = self
            .request(Method::GET, &["alertas"])
            .query(&[("nivel", level.as_str())]);
        if let Some(sucursal) = sucursal_id {
            builder = builder.query(&[("sucursal_id", sucursal.as_str())]);
        }
        self.send_json_array(builder, "alerts_by_level").await
    }

    async fn notification_feed(&self, user_id: &UserId) -> Result<Vec<Notification>> {
        let path = ["notificaciones", "simple", user_id.as_str()];
        self.send_json_array(self.request(Method::GET, &path), "notification_feed")
            .await
    }

    async fn link_existing_notifications(&self) -> Result<LinkReport> {
        self.send_json(
            self.request(Method::POST, &["notificaciones", "vincular-existentes"]),
            "link_existing_notifications",
        )
        .await
    }

    async fn alert_statistics(&self, sucursal_id: Option<&SucursalId>) -> Result<AlertStatistics> {
        let mut builder = self.request(Method::GET, &["alertas", "estadisticas"]);
        if let Some(sucursal) = sucursal_id {
            builder = builder.query(&[("sucursal_id", sucursal.as_str())]);
        }
        self.send_json(builder, "alert_statistics").await
    }

    async fn resolve_alert(&self, alert_id: i64) -> Result<()> {
        let id = alert_id.to_string();
        let path = ["alertas", id.as_str(), "resolver"];
        self.send(self.request(Method::PUT, &path), "resolve_alert")
            .await?;
        Ok(())
    }

    async fn delete_alert(&self, alert_id: i64) -> Result<()> {
        let id = alert_id.to_string();
        let path = ["alertas", id.as_str()];
        self.send(self.request(Method::DELETE, &path), "delete_alert")
            .await?;
        Ok(())
    }

    async fn record_activity(&self, entry: &ActivityEntry) -> Result<()> {
        self.send(
            self.request(Method::POST, &["bitacora"]).json(entry),
            "record_activity",
        )
        .await?;
        Ok(())
    }
}
