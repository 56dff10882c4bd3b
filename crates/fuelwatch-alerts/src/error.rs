//! Error types for the alert client.

use fuelwatch_core::FuelwatchError;
use thiserror::Error;

/// Alert client errors.
///
/// The three failure classes the components care about are transport
/// failures (`Http`, `Timeout`, `ConnectionFailed`), non-2xx responses
/// (`Status`) and payloads of the wrong shape (`MalformedPayload`).
#[derive(Debug, Error)]
pub enum AlertsError {
    /// Request timed out
    #[error("Request timed out after {0}s")]
    Timeout(u64),

    /// Could not reach the backend
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Backend answered with a non-2xx status
    #[error("Backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Backend answered 2xx but the body had the wrong shape
    #[error("Malformed payload from {endpoint}: {message}")]
    MalformedPayload { endpoint: String, message: String },

    /// Client configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Other HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Core error
    #[error(transparent)]
    Core(#[from] FuelwatchError),
}

impl AlertsError {
    /// Create a status error.
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self::Status {
            status,
            body: body.into(),
        }
    }

    /// Create a malformed-payload error.
    pub fn malformed(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedPayload {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Classify a reqwest error, separating timeouts and connect failures.
    pub fn from_reqwest(err: reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            Self::Timeout(timeout_secs)
        } else if err.is_connect() {
            Self::ConnectionFailed(err.to_string())
        } else if err.is_decode() {
            Self::malformed(
                err.url().map(|u| u.path().to_string()).unwrap_or_default(),
                err.to_string(),
            )
        } else {
            Self::Http(err)
        }
    }

    /// Classify an HTTP status code and response body.
    pub fn from_http_status(status: u16, body: &str) -> Self {
        let body = body.trim();
        let body = if body.len() > 200 {
            let cut = (0..=200).rev().find(|i| body.is_char_boundary(*i)).unwrap_or(0);
            format!("{}…", &body[..cut])
        } else {
            body.to_string()
        };
        Self::status(status, body)
    }

    /// Transport-level failure (no usable response).
    pub fn is_network_error(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::ConnectionFailed(_) | Self::Http(_)
        )
    }

    /// Response arrived but was not usable.
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::MalformedPayload { .. })
    }

    /// 5xx from the backend.
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::Status { status, .. } if *status >= 500)
    }

    /// Next step for the user, when one is known.
    pub fn guidance(&self) -> Option<&'static str> {
        match self {
            Self::Core(err) => err.guidance(),
            Self::Config(_) => Some("Check api.base_url in the configuration or FUELWATCH_API_URL"),
            Self::Status { status: 401 | 403, .. } => {
                Some("Point api.bearer_token_env at a variable holding a valid token")
            }
            Self::Timeout(_) => Some("Raise api.timeout_secs if the backend is slow"),
            _ => None,
        }
    }

    /// Message suitable for showing to the dashboard user.
    pub fn friendly_message(&self) -> String {
        match self {
            Self::Timeout(secs) => {
                format!("The server did not answer within {secs}s. Check your connection.")
            }
            Self::ConnectionFailed(_) | Self::Http(_) => {
                "Could not reach the server. Check your network.".to_string()
            }
            Self::Status { status: 401 | 403, .. } => {
                "Your session is not authorized for this action.".to_string()
            }
            Self::Status { status: 404, .. } => "The requested resource was not found.".to_string(),
            Self::Status { status, .. } if *status >= 500 => {
                format!("The server failed to process the request ({status}). Try again later.")
            }
            Self::Status { status, .. } => format!("The request was rejected ({status})."),
            Self::MalformedPayload { .. } => "The server sent an unexpected response.".to_string(),
            Self::Config(msg) => format!("Configuration error: {msg}"),
            Self::Core(err) => err.to_string(),
        }
    }
}

/// Result type for alert client operations.
pub type Result<T> = std::result::Result<T, AlertsError>;
