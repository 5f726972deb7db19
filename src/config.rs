//! Session core configuration.
//!
//! Collects the tunable knobs for the API client, the expiry monitor, and
//! the token lifetime in one place. Defaults match the FinSol backend's
//! behavior; embedding applications normally only override `base_url`.

use std::time::Duration;

use tracing::warn;

/// Default base URL for the FinSol API.
const DEFAULT_API_BASE_URL: &str = "https://api.finsol.ht/api";

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Access token lifetime in minutes.
/// The server does not report an expiry, so the client pins each token to
/// a fixed window from the moment it was issued or refreshed.
const TOKEN_LIFETIME_MINUTES: i64 = 15;

/// Remaining validity that triggers the renewal warning, in seconds.
const WARNING_THRESHOLD_SECS: i64 = 120;

/// How often the expiry monitor re-checks the session, in seconds.
const POLL_INTERVAL_SECS: u64 = 30;

/// How long an unanswered renewal warning stands before forced logout,
/// in seconds. Anchored at the moment the warning was raised.
const LOGOUT_DEADLINE_SECS: u64 = 120;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Base URL of the FinSol REST API, without a trailing slash.
    pub base_url: String,
    /// Timeout applied to every outbound HTTP request.
    pub request_timeout: Duration,
    /// Client-side lifetime of an access token.
    pub token_lifetime: chrono::Duration,
    /// Remaining validity below which the renewal warning is raised.
    pub warning_threshold: chrono::Duration,
    /// Cadence of the expiry monitor's checks.
    pub poll_interval: Duration,
    /// Grace period between the warning and forced logout.
    pub logout_deadline: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            token_lifetime: chrono::Duration::minutes(TOKEN_LIFETIME_MINUTES),
            warning_threshold: chrono::Duration::seconds(WARNING_THRESHOLD_SECS),
            poll_interval: Duration::from_secs(POLL_INTERVAL_SECS),
            logout_deadline: Duration::from_secs(LOGOUT_DEADLINE_SECS),
        }
    }
}

impl SessionConfig {
    /// Create a config for a specific API base URL with default timings.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Clamp out-of-range values so the config is safe to use.
    ///
    /// Rules:
    /// - `poll_interval` must be non-zero (a zero interval would spin).
    /// - `warning_threshold` capped to `token_lifetime` (a warning can
    ///   never be due before the token was even issued).
    pub fn validated(mut self) -> Self {
        if self.poll_interval.is_zero() {
            warn!("poll_interval is zero - using default");
            self.poll_interval = Duration::from_secs(POLL_INTERVAL_SECS);
        }
        if self.warning_threshold > self.token_lifetime {
            warn!(
                threshold_secs = self.warning_threshold.num_seconds(),
                lifetime_secs = self.token_lifetime.num_seconds(),
                "warning_threshold exceeds token_lifetime - clamping"
            );
            self.warning_threshold = self.token_lifetime;
        }
        self
    }
}
