use std::time::Duration;

use fwtrack_core::error::CoreError;

use crate::registry::RegistryConfig;

/// Largest retention period `chrono::Duration` can represent, in days.
const MAX_RETENTION_DAYS: i64 = i64::MAX / 1000 / 86_400;

/// Tracker configuration loaded from environment variables.
///
/// All fields have defaults suitable for a local backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerConfig {
    /// Backend origin (default: `http://localhost:5000`).
    pub backend_url: String,
    /// User whose tracked jobs are listed (default: `admin`).
    pub user_id: String,
    /// Seconds between polls after a successful poll (default: `10`).
    pub poll_interval_secs: u64,
    /// Seconds between polls after a failed poll (default: `30`).
    pub poll_backoff_secs: u64,
    /// Age in days after which inactive jobs are hidden (default: `7`).
    pub retention_days: i64,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:5000".into(),
            user_id: "admin".into(),
            poll_interval_secs: 10,
            poll_backoff_secs: 30,
            retention_days: 7,
            request_timeout_secs: 30,
        }
    }
}

impl TrackerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                        | Default                 |
    /// |--------------------------------|-------------------------|
    /// | `FWTRACK_BACKEND_URL`          | `http://localhost:5000` |
    /// | `FWTRACK_USER_ID`              | `admin`                 |
    /// | `FWTRACK_POLL_INTERVAL_SECS`   | `10`                    |
    /// | `FWTRACK_POLL_BACKOFF_SECS`    | `30`                    |
    /// | `FWTRACK_RETENTION_DAYS`       | `7`                     |
    /// | `FWTRACK_REQUEST_TIMEOUT_SECS` | `30`                    |
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let backend_url = lookup("FWTRACK_BACKEND_URL")
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.backend_url);

        let user_id = lookup("FWTRACK_USER_ID")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.user_id);

        let poll_interval_secs = parse_var(
            &lookup,
            "FWTRACK_POLL_INTERVAL_SECS",
            defaults.poll_interval_secs,
        )?;
        let poll_backoff_secs =
            parse_var(&lookup, "FWTRACK_POLL_BACKOFF_SECS", defaults.poll_backoff_secs)?;
        let retention_days =
            parse_var(&lookup, "FWTRACK_RETENTION_DAYS", defaults.retention_days)?;
        let request_timeout_secs = parse_var(
            &lookup,
            "FWTRACK_REQUEST_TIMEOUT_SECS",
            defaults.request_timeout_secs,
        )?;

        if retention_days < 0 || chrono::Duration::try_days(retention_days).is_none() {
            return Err(CoreError::Validation(format!(
                "FWTRACK_RETENTION_DAYS must be between 0 and {}, got {retention_days}",
                MAX_RETENTION_DAYS
            )));
        }
        if poll_interval_secs == 0 {
            return Err(CoreError::Validation(
                "FWTRACK_POLL_INTERVAL_SECS must be at least 1".into(),
            ));
        }
        if poll_backoff_secs == 0 {
            return Err(CoreError::Validation(
                "FWTRACK_POLL_BACKOFF_SECS must be at least 1".into(),
            ));
        }

        Ok(Self {
            backend_url,
            user_id,
            poll_interval_secs,
            poll_backoff_secs,
            retention_days,
            request_timeout_secs,
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Registry settings derived from this configuration.
    pub fn registry(&self) -> RegistryConfig {
        RegistryConfig {
            user_id: self.user_id.clone(),
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            poll_backoff: Duration::from_secs(self.poll_backoff_secs),
            retention: chrono::Duration::try_days(self.retention_days)
                .unwrap_or(chrono::Duration::MAX),
        }
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T, CoreError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| CoreError::Validation(format!("{key} must be a valid integer, got '{raw}'"))),
    }
}
