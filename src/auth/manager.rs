//! Top-level session lifecycle facade.
//!
//! `SessionManager` wires the store, the token gateway, the refresh
//! coordinator and the expiry monitor together and exposes the operations
//! an application shell drives: login, register, hydrate on startup,
//! logout, and the account endpoints that ride the authenticated gateway.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use reqwest::Client;
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::api::{ApiError, ApiRequest, AuthApi, AuthClient, TokenGateway};
use crate::auth::error::AuthError;
use crate::auth::monitor::{ExpiryMonitor, SessionRenewal};
use crate::auth::refresh::RefreshCoordinator;
use crate::auth::storage::{DiskStorage, SessionStorage};
use crate::auth::store::SessionStore;
use crate::clock::{Clock, SystemClock};
use crate::config::SessionConfig;
use crate::models::{NewUser, UserProfile, VerifyPayload};

pub struct SessionManager {
    config: SessionConfig,
    store: Arc<SessionStore>,
    storage: Arc<dyn SessionStorage>,
    clock: Arc<dyn Clock>,
    api: Arc<dyn AuthApi>,
    gateway: TokenGateway,
    refresher: Arc<RefreshCoordinator>,
    monitor: Mutex<Option<(SessionRenewal, JoinHandle<()>)>>,
}

impl SessionManager {
    /// Build a manager with the default stack: system clock and encrypted
    /// on-disk session storage keyed through the OS keychain.
    pub fn new(config: SessionConfig) -> Result<Self> {
        let storage = Arc::new(DiskStorage::open_default()?);
        Self::with_parts(config, storage, Arc::new(SystemClock))
    }

    /// Build a manager over explicit storage and clock implementations.
    pub fn with_parts(
        config: SessionConfig,
        storage: Arc<dyn SessionStorage>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let config = config.validated();
        let client = Client::builder().timeout(config.request_timeout).build()?;
        let store = Arc::new(SessionStore::new(&config, clock.clone(), storage.clone()));
        let api: Arc<dyn AuthApi> =
            Arc::new(AuthClient::from_parts(client.clone(), &config.base_url));
        let refresher = RefreshCoordinator::new(store.clone(), api.clone());
        let gateway = TokenGateway::new(client, &config.base_url, store.clone(), refresher.clone());

        Ok(Self {
            config,
            store,
            storage,
            clock,
            api,
            gateway,
            refresher,
            monitor: Mutex::new(None),
        })
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// The authenticated gateway, for feature modules (accounts,
    /// transactions, sols) to issue their own calls through.
    pub fn gateway(&self) -> &TokenGateway {
        &self.gateway
    }

    /// Handle for the renewal dialog; `None` before the first login.
    pub fn renewal(&self) -> Option<SessionRenewal> {
        self.monitor
            .lock()
            .unwrap()
            .as_ref()
            .map(|(handle, _)| handle.clone())
    }

    // ===== Lifecycle =====

    /// Authenticate with an identifier (email or phone) and password.
    pub async fn login(
        &self,
        identifier: &str,
        password: &str,
        remember_me: bool,
    ) -> Result<UserProfile, AuthError> {
        self.store.set_loading(true);
        let result = self.api.login(identifier, password, remember_me).await;
        self.store.set_loading(false);

        match result {
            Ok(payload) => {
                let user = payload.user.clone();
                self.store.apply_login(payload);
                self.start_monitor();
                Ok(user)
            }
            Err(err) => Err(self.credential_error(err)),
        }
    }

    /// Create an account; a successful registration signs the user in.
    pub async fn register(&self, new_user: &NewUser) -> Result<UserProfile, AuthError> {
        self.store.set_loading(true);
        let result = self.api.register(new_user).await;
        self.store.set_loading(false);

        match result {
            Ok(payload) => {
                let user = payload.user.clone();
                self.store.apply_login(payload);
                self.start_monitor();
                Ok(user)
            }
            Err(err) => Err(self.credential_error(err)),
        }
    }

    /// Restore a persisted session at startup.
    ///
    /// A stored session whose expiry is missing from the file format or
    /// already behind us is discarded and purged, leaving the app signed
    /// out. Returns whether a session was restored. Must be called from
    /// within the async runtime (it starts the expiry monitor).
    pub fn hydrate(&self) -> Result<bool> {
        let Some(persisted) = self.storage.load()? else {
            return Ok(false);
        };

        if persisted.expires_at <= self.clock.now() {
            debug!("stored session has expired, discarding");
            self.storage.clear()?;
            return Ok(false);
        }

        self.store.apply_hydrated(persisted);
        self.start_monitor();
        Ok(true)
    }

    /// End the current session. The server call is best-effort: local
    /// state is cleared even when it fails.
    pub async fn logout(&self) {
        self.end_session(false).await;
    }

    /// End every session of the account, server-wide.
    pub async fn logout_all(&self) {
        self.end_session(true).await;
    }

    async fn end_session(&self, all_devices: bool) {
        if let Some(token) = self.store.access_token() {
            let result = if all_devices {
                self.api.logout_all(&token).await
            } else {
                self.api.logout(&token).await
            };
            if let Err(err) = result {
                warn!(error = %err, "server-side logout failed, clearing local session anyway");
            }
        }
        self.store.apply_logout();
        self.stop_monitor();
    }

    // ===== Account endpoints over the gateway =====

    /// Ask the server whether it still honors the current token. Advisory:
    /// the client-side expiry estimate drives the renewal flow either way.
    pub async fn verify_token(&self) -> Result<VerifyPayload, ApiError> {
        self.gateway.get("/auth/verify-token").await
    }

    /// Re-fetch the authenticated user.
    pub async fn me(&self) -> Result<UserProfile, ApiError> {
        self.gateway.get("/auth/me").await
    }

    pub async fn profile(&self) -> Result<UserProfile, ApiError> {
        self.gateway.get("/users/profile").await
    }

    pub async fn update_profile(&self, changes: serde_json::Value) -> Result<UserProfile, ApiError> {
        self.gateway.put("/users/profile", changes).await
    }

    pub async fn change_password(
        &self,
        current_password: &str,
        new_password: &str,
        confirm_password: &str,
    ) -> Result<(), ApiError> {
        let request = ApiRequest::post(
            "/auth/change-password",
            json!({
                "currentPassword": current_password,
                "newPassword": new_password,
                "confirmPassword": confirm_password,
            }),
        );
        self.gateway.send(&request).await?;
        Ok(())
    }

    pub async fn forgot_password(&self, email: &str) -> Result<(), ApiError> {
        let request = ApiRequest::post("/auth/forgot-password", json!({ "email": email }));
        self.gateway.send(&request).await?;
        Ok(())
    }

    pub async fn reset_password(
        &self,
        reset_token: &str,
        new_password: &str,
        confirm_password: &str,
    ) -> Result<(), ApiError> {
        let request = ApiRequest::post(
            "/auth/reset-password",
            json!({
                "resetToken": reset_token,
                "newPassword": new_password,
                "confirmPassword": confirm_password,
            }),
        );
        self.gateway.send(&request).await?;
        Ok(())
    }

    // ===== Monitor lifecycle =====

    fn start_monitor(&self) {
        let mut guard = self.monitor.lock().unwrap();
        if let Some((_, task)) = guard.take() {
            task.abort();
        }
        *guard = Some(ExpiryMonitor::spawn(
            self.store.clone(),
            self.refresher.clone(),
            &self.config,
        ));
    }

    fn stop_monitor(&self) {
        if let Some((_, task)) = self.monitor.lock().unwrap().take() {
            task.abort();
        }
    }

    fn credential_error(&self, err: ApiError) -> AuthError {
        let auth_err = match err {
            ApiError::Unauthorized => {
                AuthError::Credentials("invalid identifier or password".to_string())
            }
            ApiError::BadRequest(message) => AuthError::Credentials(message),
            other => AuthError::Api(other),
        };
        self.store.set_error(Some(auth_err.to_string()));
        auth_err
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.stop_monitor();
    }
}
