//! Configuration for the Fuelwatch client.
//!
//! Configuration lives in `~/.fuelwatch/config.yaml`. Every field has a
//! default, so an empty (or absent) file is a valid configuration. A few
//! environment variables override the file:
//!
//! | Variable | Field |
//! |---|---|
//! | `FUELWATCH_API_URL` | `api.base_url` |
//! | `FUELWATCH_USER_ID` | `session.user_id` |
//! | `FUELWATCH_SUCURSAL_ID` | `session.sucursal_id` |
//!
//! ## Example
//!
//! ```no_run
//! use fuelwatch_config::FuelwatchConfig;
//!
//! fn main() -> fuelwatch_core::Result<()> {
//!     let config = FuelwatchConfig::load(None)?;
//!     let session = config.session()?;
//!     println!("polling {} as {:?}", config.api.base_url, session.user_id);
//!     Ok(())
//! }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use fuelwatch_core::{FuelwatchError, Result, Session, SucursalId, UserId};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const ENV_API_URL: &str = "FUELWATCH_API_URL";
pub const ENV_USER_ID: &str = "FUELWATCH_USER_ID";
pub const ENV_SUCURSAL_ID: &str = "FUELWATCH_SUCURSAL_ID";

/// Default config file path: `~/.fuelwatch/config.yaml`
pub fn default_config_path() -> Result<PathBuf> {
    Ok(fuelwatch_core::logging::fuelwatch_home()?.join("config.yaml"))
}

/// Top-level Fuelwatch configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuelwatchConfig {
    /// Backend connection settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Polling cadences for the three background components
    #[serde(default)]
    pub polling: PollingConfig,

    /// Who is using the dashboard
    #[serde(default)]
    pub session: SessionConfig,

    /// Raise a desktop notification when new critical alerts appear
    #[serde(default = "default_true")]
    pub desktop_notifications: bool,

    /// Post activity-log entries after manual verification and linking
    #[serde(default = "default_true")]
    pub activity_log: bool,
}

impl Default for FuelwatchConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            polling: PollingConfig::default(),
            session: SessionConfig::default(),
            desktop_notifications: true,
            activity_log: true,
        }
    }
}

/// Backend connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    /// REST base URL, without trailing slash
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Name of an environment variable holding a bearer token
    #[serde(default)]
    pub bearer_token_env: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            bearer_token_env: None,
        }
    }
}

impl ApiConfig {
    /// Request timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Resolve the bearer token from the configured environment variable.
    ///
    /// Unset or empty variables yield `None`.
    pub fn bearer_token(&self) -> Option<String> {
        let var = self.bearer_token_env.as_deref()?;
        std::env::var(var).ok().filter(|t| !t.trim().is_empty())
    }
}

/// Polling cadences, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_alert_count_secs")]
    pub alert_count_secs: u64,

    #[serde(default = "default_critical_scan_secs")]
    pub critical_scan_secs: u64,

    #[serde(default = "default_notification_feed_secs")]
    pub notification_feed_secs: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            alert_count_secs: default_alert_count_secs(),
            critical_scan_secs: default_critical_scan_secs(),
            notification_feed_secs: default_notification_feed_secs(),
        }
    }
}

impl PollingConfig {
    pub fn alert_count_interval(&self) -> Duration {
        Duration::from_secs(self.alert_count_secs)
    }

    pub fn critical_scan_interval(&self) -> Duration {
        Duration::from_secs(self.critical_scan_secs)
    }

    pub fn notification_feed_interval(&self) -> Duration {
        Duration::from_secs(self.notification_feed_secs)
    }
}

/// Session identifiers as written in the file; validated by
/// [`FuelwatchConfig::session`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub user_id: Option<String>,

    #[serde(default)]
    pub sucursal_id: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_base_url() -> String {
    "http://localhost:3000/api".to_string()
}

fn default_timeout_secs() -> u64 {
    15
}

fn default_alert_count_secs() -> u64 {
    60
}

fn default_critical_scan_secs() -> u64 {
    120
}

fn default_notification_feed_secs() -> u64 {
    10
}

impl FuelwatchConfig {
    /// Load configuration, apply environment overrides and validate.
    ///
    /// With `path == None` the default path is used and a missing file yields
    /// defaults. An explicit path that does not exist is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from(path)?,
            None => {
                let path = default_config_path()?;
                if path.exists() {
                    Self::load_from(&path)?
                } else {
                    debug!(path = %path.display(), "no config file, using defaults");
                    Self::default()
                }
            }
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a specific file, without overrides or validation.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                FuelwatchError::config_not_found_with_source(path, e)
            } else {
                FuelwatchError::io("reading config", path, e)
            }
        })?;

        Self::parse(&content).map_err(|message| FuelwatchError::ConfigInvalid {
            path: path.to_path_buf(),
            message,
        })
    }

    /// Parse configuration from a YAML string. An empty document is the default.
    pub fn parse(content: &str) -> std::result::Result<Self, String> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_yaml::from_str::<FuelwatchConfig>(content).map_err(|e| match e.location() {
            Some(loc) => format!("{} (line {}, column {})", e, loc.line(), loc.column()),
            None => e.to_string(),
        })
    }

    /// Apply `FUELWATCH_*` environment overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Some(url) = env_value(ENV_API_URL) {
            debug!(base_url = %url, "api.base_url overridden from environment");
            self.api.base_url = url;
        }
        if let Some(user) = env_value(ENV_USER_ID) {
            self.session.user_id = Some(user);
        }
        if let Some(branch) = env_value(ENV_SUCURSAL_ID) {
            self.session.sucursal_id = Some(branch);
        }
    }

    /// Validate field values.
    pub fn validate(&self) -> Result<()> {
        let url = self.api.base_url.trim();
        let host = url
            .strip_prefix("https://")
            .or_else(|| url.strip_prefix("http://"))
            .ok_or_else(|| {
                FuelwatchError::config_validation(format!(
                    "api.base_url must start with http:// or https://, got {:?}",
                    self.api.base_url
                ))
            })?;
        if host.is_empty() || host.starts_with('/') {
            return Err(FuelwatchError::config_validation(
                "api.base_url has no host",
            ));
        }

        if self.api.timeout_secs == 0 {
            return Err(FuelwatchError::config_validation(
                "api.timeout_secs must be greater than 0",
            ));
        }

        for (field, value) in [
            ("polling.alert_count_secs", self.polling.alert_count_secs),
            ("polling.critical_scan_secs", self.polling.critical_scan_secs),
            ("polling.notification_feed_secs", self.polling.notification_feed_secs),
        ] {
            if value == 0 {
                return Err(FuelwatchError::config_validation(format!(
                    "{field} must be greater than 0"
                )));
            }
        }

        self.session()?;
        Ok(())
    }

    /// Build the explicit [`Session`] from the configured identifiers.
    pub fn session(&self) -> Result<Session> {
        let user_id = self
            .session
            .user_id
            .as_deref()
            .map(UserId::parse)
            .transpose()?;
        let sucursal_id = self
            .session
            .sucursal_id
            .as_deref()
            .map(SucursalId::parse)
            .transpose()?;

        Ok(Session {
            user_id,
            sucursal_id,
        })
    }

    /// Base URL without trailing slashes.
    pub fn base_url(&self) -> &str {
        self.api.base_url.trim().trim_end_matches('/')
    }

    /// Set a custom base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api.base_url = url.into();
        self
    }

    /// Set the session user.
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.session.user_id = Some(user_id.into());
        self
    }

    /// Disable desktop notifications.
    pub fn without_desktop_notifications(mut self) -> Self {
        self.desktop_notifications = false;
        self
    }

    /// Disable activity-log posts.
    pub fn without_activity_log(mut self) -> Self {
        self.activity_log = false;
        self
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = FuelwatchConfig::default();
        assert_eq!(config.polling.alert_count_secs, 60);
        assert_eq!(config.polling.critical_scan_secs, 120);
        assert_eq!(config.polling.notification_feed_secs, 10);
        assert!(config.desktop_notifications);
        assert!(config.activity_log);
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_partial_yaml() {
        let yaml = "api:
  base_url: https://estacion.example.com/api/
polling:
  notification_feed_secs: 5
";
        let config = FuelwatchConfig::parse(yaml).unwrap();
        assert_eq!(config.base_url(), "https://estacion.example.com/api");
        assert_eq!(config.polling.notification_feed_secs, 5);
        assert_eq!(config.polling.alert_count_secs, 60);
        assert_eq!(config.api.timeout_secs, 15);
    }

    #[test]
    fn test_parse_empty_is_default() {
        assert_eq!(FuelwatchConfig::parse("  \n").unwrap(), FuelwatchConfig::default());
    }

    #[test]
    fn test_parse_error_reports_location() {
        let err = FuelwatchConfig::parse("polling:\n  alert_count_secs: [1,\n").unwrap_err();
        assert!(err.contains("line"));
    }

    #[test]
    fn test_validate_rejects_bad_url() {
        let config = FuelwatchConfig::default().with_base_url("ftp://nope");
        assert!(config.validate().unwrap_err().is_config_error());

        let config = FuelwatchConfig::default().with_base_url("http://");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut config = FuelwatchConfig::default();
        config.polling.critical_scan_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("critical_scan_secs"));
    }

    #[test]
    fn test_session_conversion() {
        let config = FuelwatchConfig::default().with_user("u1");
        let session = config.session().unwrap();
        assert_eq!(session.user_id.unwrap().as_str(), "u1");
        assert!(session.sucursal_id.is_none());

        let config = FuelwatchConfig::default().with_user("  ");
        assert!(config.session().is_err());
    }

    #[test]
    fn test_builders() {
        let config = FuelwatchConfig::default()
            .without_desktop_notifications()
            .without_activity_log();
        assert!(!config.desktop_notifications);
        assert!(!config.activity_log);
    }
}
