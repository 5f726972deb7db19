//! Authenticated request gateway.
//!
//! Decorates every outbound API call with the current bearer token and
//! recovers transparently from exactly one failure class: a 401 from an
//! expired or invalidated access token. The failing call asks the refresh
//! coordinator for a fresh token and is reissued once; anything else -
//! network failures included - passes through untouched.

use std::sync::Arc;

use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::auth::refresh::RefreshCoordinator;
use crate::auth::store::SessionStore;

use super::client::REFRESH_PATH;
use super::{decode_envelope, ApiError};

/// A rebuildable description of one API call.
///
/// The gateway may issue a call twice (once before and once after a token
/// refresh), so requests are kept as data and a fresh `reqwest::Request`
/// is built per attempt.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    body: Option<Value>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::POST,
            path: path.into(),
            body: Some(body),
        }
    }

    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::PUT,
            path: path.into(),
            body: Some(body),
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            method: Method::DELETE,
            path: path.into(),
            body: None,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

pub struct TokenGateway {
    client: Client,
    base_url: String,
    store: Arc<SessionStore>,
    refresher: Arc<RefreshCoordinator>,
}

impl TokenGateway {
    pub fn new(
        client: Client,
        base_url: &str,
        store: Arc<SessionStore>,
        refresher: Arc<RefreshCoordinator>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            store,
            refresher,
        }
    }

    /// Issue a request, recovering once from a rejected access token.
    pub async fn send(&self, request: &ApiRequest) -> Result<reqwest::Response, ApiError> {
        let mut retried = false;

        loop {
            let response = self.issue(request).await?;
            let status = response.status();

            if status != StatusCode::UNAUTHORIZED {
                return Self::check(response).await;
            }

            // A rejected call to the refresh endpoint itself is terminal:
            // there is no fresher credential to retry with.
            if request.path == REFRESH_PATH {
                return Err(ApiError::Unauthorized);
            }

            if retried {
                return Err(ApiError::Unauthorized);
            }
            retried = true;

            debug!(path = %request.path, "access token rejected, requesting refresh");
            if let Err(err) = self.refresher.request_token().await {
                // The session is already torn down; the caller gets the
                // auth failure that started this, not the refresh error.
                warn!(path = %request.path, error = %err, "refresh failed, propagating auth failure");
                return Err(ApiError::Unauthorized);
            }
            // Loop around and reissue; the new token is read from the
            // store when the retry is built.
        }
    }

    /// Issue a typed request and decode the response envelope.
    pub async fn execute<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T, ApiError> {
        let response = self.send(request).await?;
        let body = response.text().await?;
        decode_envelope(&body)
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.execute(&ApiRequest::get(path)).await
    }

    pub async fn post<T: DeserializeOwned>(&self, path: &str, body: Value) -> Result<T, ApiError> {
        self.execute(&ApiRequest::post(path, body)).await
    }

    pub async fn put<T: DeserializeOwned>(&self, path: &str, body: Value) -> Result<T, ApiError> {
        self.execute(&ApiRequest::put(path, body)).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.execute(&ApiRequest::delete(path)).await
    }

    /// Build and send one attempt. The bearer token is read from the
    /// store here, at send time, never cached across attempts.
    async fn issue(&self, request: &ApiRequest) -> Result<reqwest::Response, ApiError> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = self.client.request(request.method.clone(), url);

        if let Some(token) = self.store.access_token() {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        Ok(builder.send().await?)
    }

    /// Map a non-401 response to the shared error taxonomy.
    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }
}
