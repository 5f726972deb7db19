//! Session and authentication state data model.
//!
//! `Session` carries the bearer credentials and the client-side expiry
//! estimate; `AuthState` wraps it with everything the presentation layer
//! observes. Both are plain data - all mutation goes through the store.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::models::UserProfile;

/// Bearer credentials and correlation metadata for one authenticated
/// session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub session_id: Option<String>,
    pub device_id: Option<String>,
    /// Absolute time the access token becomes invalid. Computed
    /// client-side at issuance; the server does not report an expiry.
    pub expires_at: Option<DateTime<Utc>>,
    /// Last time the session was touched (login, refresh).
    pub last_activity: Option<DateTime<Utc>>,
}

impl Session {
    /// Time left until the access token lapses, negative once past.
    /// `None` when no expiry is known.
    pub fn time_remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.expires_at.map(|expires_at| expires_at - now)
    }

    /// True once a known expiry has passed. A session without a known
    /// expiry is not reported as expired - it simply cannot be tracked.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(expires_at) if expires_at <= now)
    }

    /// True while the token is still valid but lapses within `window`.
    pub fn expires_within(&self, now: DateTime<Utc>, window: Duration) -> bool {
        match self.time_remaining(now) {
            Some(remaining) => remaining > Duration::zero() && remaining <= window,
            None => false,
        }
    }
}

/// Full authentication state as observed by the presentation layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthState {
    pub user: Option<UserProfile>,
    pub session: Session,
    pub loading: bool,
    pub error: Option<String>,
    /// Raised by the expiry monitor when the renewal warning is due;
    /// cleared by a successful refresh or any de-authentication.
    pub token_expiring_soon: bool,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl AuthState {
    /// Derived: authenticated iff an access token is present.
    pub fn is_authenticated(&self) -> bool {
        self.session.access_token.is_some()
    }
}
