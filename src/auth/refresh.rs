//! Single-flight coordination for token refresh.
//!
//! When the access token lapses, every in-flight API call sees a 401 at
//! roughly the same moment. The coordinator collapses that burst into one
//! outbound refresh call: the first caller starts the refresh, later
//! callers join a waiter list, and the settled outcome is broadcast to
//! all of them. A terminal refresh failure forces a local logout.
//!
//! The Idle -> Refreshing transition is checked and taken under one lock
//! with no await in between, so a second refresh can never start before
//! the first settles.

use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::api::AuthApi;
use crate::auth::error::AuthError;
use crate::auth::store::SessionStore;

/// Broadcast result of a settled refresh attempt.
#[derive(Debug, Clone)]
enum RefreshOutcome {
    /// New access token, already applied to the store.
    Renewed { access_token: String },
    /// Terminal failure; any forced logout has already run.
    Failed { reason: String },
}

enum State {
    Idle,
    Refreshing {
        waiters: Vec<oneshot::Sender<RefreshOutcome>>,
    },
}

pub struct RefreshCoordinator {
    state: Arc<Mutex<State>>,
    store: Arc<SessionStore>,
    api: Arc<dyn AuthApi>,
}

impl RefreshCoordinator {
    pub fn new(store: Arc<SessionStore>, api: Arc<dyn AuthApi>) -> Arc<Self> {
        Arc::new(Self {
            state: Arc::new(Mutex::new(State::Idle)),
            store,
            api,
        })
    }

    /// Obtain a fresh access token, joining any refresh already in
    /// flight. Resolves for every caller once the single outbound call
    /// settles.
    pub async fn request_token(&self) -> Result<String, AuthError> {
        let (tx, rx) = oneshot::channel();

        let leads = {
            let mut state = self.state.lock().unwrap();
            match &mut *state {
                State::Refreshing { waiters } => {
                    waiters.push(tx);
                    debug!(waiters = waiters.len(), "joining in-flight refresh");
                    false
                }
                State::Idle => {
                    *state = State::Refreshing { waiters: vec![tx] };
                    true
                }
            }
        };

        if leads {
            // The drive runs detached so a caller that drops its future
            // cannot strand the other waiters.
            tokio::spawn(drive(
                Arc::clone(&self.state),
                Arc::clone(&self.store),
                Arc::clone(&self.api),
            ));
        }

        match rx.await {
            Ok(RefreshOutcome::Renewed { access_token }) => Ok(access_token),
            Ok(RefreshOutcome::Failed { reason }) => Err(AuthError::RefreshFailed(reason)),
            Err(_) => Err(AuthError::RefreshFailed("refresh was interrupted".to_string())),
        }
    }
}

/// Issue the refresh call and settle every waiter with its outcome.
async fn drive(state: Arc<Mutex<State>>, store: Arc<SessionStore>, api: Arc<dyn AuthApi>) {
    let initiated_epoch = store.epoch();

    let outcome = match store.refresh_token() {
        None => {
            warn!("refresh requested with no refresh token available, forcing logout");
            store.apply_logout();
            RefreshOutcome::Failed {
                reason: "no refresh token available".to_string(),
            }
        }
        Some(refresh_token) => match api.refresh(&refresh_token).await {
            Ok(payload) => {
                let access_token = payload.tokens.access_token.clone();
                if store.apply_refresh(initiated_epoch, payload) {
                    RefreshOutcome::Renewed { access_token }
                } else {
                    // The session ended or was replaced while the call was
                    // in flight; the newer state stays untouched.
                    RefreshOutcome::Failed {
                        reason: "session ended during refresh".to_string(),
                    }
                }
            }
            Err(err) => {
                warn!(error = %err, "token refresh failed, forcing logout");
                store.apply_logout();
                RefreshOutcome::Failed {
                    reason: err.to_string(),
                }
            }
        },
    };

    let waiters = {
        let mut state = state.lock().unwrap();
        match std::mem::replace(&mut *state, State::Idle) {
            State::Refreshing { waiters } => waiters,
            State::Idle => Vec::new(),
        }
    };

    debug!(waiters = waiters.len(), "refresh settled, notifying waiters");
    for waiter in waiters {
        // A waiter that gave up is fine to skip.
        let _ = waiter.send(outcome.clone());
    }
}
