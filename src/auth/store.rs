//! Single source of truth for session and authentication state.
//!
//! Every transition replaces the affected state wholesale under one lock,
//! so readers never observe a half-applied update and an authenticated
//! state always carries an access token. The store is a constructed
//! instance, not a global - tests and multi-account shells can run
//! several side by side.
//!
//! A logout (voluntary or forced) bumps an internal epoch; a refresh
//! outcome that was initiated under an older epoch is discarded, which
//! keeps a late-arriving refresh response from resurrecting a session
//! that ended while the call was in flight.

use std::sync::{Arc, RwLock};

use chrono::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::auth::session::{AuthState, Session};
use crate::auth::storage::{PersistedSession, SessionStorage};
use crate::clock::Clock;
use crate::config::SessionConfig;
use crate::models::{AuthPayload, RefreshPayload};

struct Inner {
    state: AuthState,
    epoch: u64,
}

pub struct SessionStore {
    inner: RwLock<Inner>,
    clock: Arc<dyn Clock>,
    storage: Arc<dyn SessionStorage>,
    token_lifetime: Duration,
    auth_tx: watch::Sender<bool>,
}

impl SessionStore {
    pub fn new(
        config: &SessionConfig,
        clock: Arc<dyn Clock>,
        storage: Arc<dyn SessionStorage>,
    ) -> Self {
        let (auth_tx, _) = watch::channel(false);
        Self {
            inner: RwLock::new(Inner {
                state: AuthState::default(),
                epoch: 0,
            }),
            clock,
            storage,
            token_lifetime: config.token_lifetime,
            auth_tx,
        }
    }

    // ===== Reads =====

    /// Clone of the full current state.
    pub fn snapshot(&self) -> AuthState {
        self.inner.read().unwrap().state.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.read().unwrap().state.is_authenticated()
    }

    pub fn access_token(&self) -> Option<String> {
        self.inner.read().unwrap().state.session.access_token.clone()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.inner.read().unwrap().state.session.refresh_token.clone()
    }

    pub fn token_expiring_soon(&self) -> bool {
        self.inner.read().unwrap().state.token_expiring_soon
    }

    /// Time left until the access token lapses, per the store's clock.
    pub fn time_remaining(&self) -> Option<Duration> {
        let now = self.clock.now();
        self.inner.read().unwrap().state.session.time_remaining(now)
    }

    /// Identity of the current session era. Bumped by login, hydration
    /// and logout; used to fence stale refresh outcomes.
    pub fn epoch(&self) -> u64 {
        self.inner.read().unwrap().epoch
    }

    /// Subscribe to the authenticated flag. The expiry monitor uses this
    /// to stop promptly when the session ends through any path.
    pub fn watch_authenticated(&self) -> watch::Receiver<bool> {
        self.auth_tx.subscribe()
    }

    // ===== Transitions =====

    /// Install a fresh session after login or registration.
    pub fn apply_login(&self, payload: AuthPayload) {
        let now = self.clock.now();
        {
            let mut inner = self.inner.write().unwrap();
            inner.epoch += 1;
            inner.state = AuthState {
                user: Some(payload.user.clone()),
                session: Session {
                    access_token: Some(payload.tokens.access_token),
                    refresh_token: Some(payload.tokens.refresh_token),
                    session_id: payload.session.session_id,
                    device_id: payload.session.device_id,
                    expires_at: Some(now + self.token_lifetime),
                    last_activity: Some(now),
                },
                loading: false,
                error: None,
                token_expiring_soon: false,
                last_login_at: Some(now),
            };
            self.persist(&inner.state);
        }
        self.auth_tx.send_replace(true);
        info!(user_id = %payload.user.id, "session established");
    }

    /// Install a session restored from durable storage. The hydration
    /// path has already checked that the stored expiry is still ahead.
    pub fn apply_hydrated(&self, persisted: PersistedSession) {
        {
            let mut inner = self.inner.write().unwrap();
            inner.epoch += 1;
            inner.state = AuthState {
                user: Some(persisted.user),
                session: Session {
                    access_token: Some(persisted.access_token),
                    refresh_token: Some(persisted.refresh_token),
                    session_id: persisted.session_id,
                    device_id: persisted.device_id,
                    expires_at: Some(persisted.expires_at),
                    last_activity: persisted.last_activity,
                },
                loading: false,
                error: None,
                token_expiring_soon: false,
                last_login_at: None,
            };
        }
        self.auth_tx.send_replace(true);
        info!("session restored from storage");
    }

    /// Apply a refresh outcome initiated under `initiated_epoch`.
    ///
    /// Returns false - leaving the state untouched - when the session
    /// ended or was replaced while the refresh call was in flight.
    pub fn apply_refresh(&self, initiated_epoch: u64, payload: RefreshPayload) -> bool {
        let now = self.clock.now();
        let mut inner = self.inner.write().unwrap();

        if inner.epoch != initiated_epoch || !inner.state.is_authenticated() {
            debug!(
                initiated_epoch,
                current_epoch = inner.epoch,
                "discarding refresh outcome for a superseded session"
            );
            return false;
        }

        let session = &mut inner.state.session;
        session.access_token = Some(payload.tokens.access_token);
        if let Some(rotated) = payload.tokens.refresh_token {
            session.refresh_token = Some(rotated);
        }
        if let Some(meta) = payload.session {
            if meta.session_id.is_some() {
                session.session_id = meta.session_id;
            }
            if meta.device_id.is_some() {
                session.device_id = meta.device_id;
            }
        }
        session.expires_at = Some(now + self.token_lifetime);
        session.last_activity = Some(now);

        inner.state.token_expiring_soon = false;
        inner.state.error = None;
        self.persist(&inner.state);

        debug!("session refreshed");
        true
    }

    /// Clear the session and purge durable storage. Forced and voluntary
    /// logout both land here, so their final state is identical.
    pub fn apply_logout(&self) {
        {
            let mut inner = self.inner.write().unwrap();
            inner.epoch += 1;
            inner.state = AuthState::default();
            if let Err(err) = self.storage.clear() {
                warn!(error = %err, "failed to purge persisted session");
            }
        }
        self.auth_tx.send_replace(false);
        info!("session cleared");
    }

    /// Raise or clear the renewal warning flag. The flag can only be
    /// raised while authenticated.
    pub fn mark_expiring_soon(&self, expiring: bool) {
        let mut inner = self.inner.write().unwrap();
        if expiring && !inner.state.is_authenticated() {
            return;
        }
        inner.state.token_expiring_soon = expiring;
    }

    pub fn set_error(&self, error: Option<String>) {
        self.inner.write().unwrap().state.error = error;
    }

    pub fn set_loading(&self, loading: bool) {
        self.inner.write().unwrap().state.loading = loading;
    }

    /// Write the current session through to durable storage. Persistence
    /// is best-effort: an unwritable disk must not fail a login.
    fn persist(&self, state: &AuthState) {
        let (Some(access_token), Some(refresh_token), Some(user), Some(expires_at)) = (
            state.session.access_token.clone(),
            state.session.refresh_token.clone(),
            state.user.clone(),
            state.session.expires_at,
        ) else {
            debug!("session not fully populated, skipping persistence");
            return;
        };

        let persisted = PersistedSession {
            access_token,
            refresh_token,
            user,
            expires_at,
            last_activity: state.session.last_activity,
            session_id: state.session.session_id.clone(),
            device_id: state.session.device_id.clone(),
        };

        if let Err(err) = self.storage.save(&persisted) {
            warn!(error = %err, "failed to persist session");
        }
    }
}
