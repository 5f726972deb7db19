//! HTTP consumer of the FinSol Auth Service.
//!
//! The Auth Service issues and revokes session credentials; this client
//! speaks its REST contract and validates every payload at the boundary.
//! It deliberately carries no session state - the store owns that.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, warn};

use crate::config::SessionConfig;
use crate::models::{AuthPayload, NewUser, RefreshPayload};

use super::{decode_envelope, ApiError};

/// Path of the token refresh endpoint. A 401 from this endpoint is
/// terminal for the session and must never re-enter the refresh path.
pub(crate) const REFRESH_PATH: &str = "/auth/refresh";

/// The Auth Service contract consumed by the session core.
///
/// Kept as a trait so the refresh coordinator and the session manager can
/// be driven against a scripted implementation in tests.
#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn login(
        &self,
        identifier: &str,
        password: &str,
        remember_me: bool,
    ) -> Result<AuthPayload, ApiError>;

    async fn register(&self, new_user: &NewUser) -> Result<AuthPayload, ApiError>;

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshPayload, ApiError>;

    /// Revoke the current session server-side. Callers treat this as
    /// best-effort: local cleanup proceeds even when it fails.
    async fn logout(&self, access_token: &str) -> Result<(), ApiError>;

    /// Revoke every session of the account server-side.
    async fn logout_all(&self, access_token: &str) -> Result<(), ApiError>;
}

/// HTTP client for the Auth Service.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct AuthClient {
    client: Client,
    base_url: String,
}

impl AuthClient {
    pub fn new(config: &SessionConfig) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self::from_parts(client, &config.base_url))
    }

    /// Build from an existing connection pool (shared with the gateway).
    pub fn from_parts(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Check if a response is successful, mapping the status and body to
    /// an error otherwise.
    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn parse<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let body = response.text().await?;
        decode_envelope(&body)
    }
}

#[async_trait]
impl AuthApi for AuthClient {
    async fn login(
        &self,
        identifier: &str,
        password: &str,
        remember_me: bool,
    ) -> Result<AuthPayload, ApiError> {
        debug!(identifier, "sending login request");

        let response = self
            .client
            .post(self.url("/auth/login"))
            .json(&json!({
                "identifier": identifier,
                "password": password,
                "rememberMe": remember_me,
            }))
            .send()
            .await?;

        let response = Self::check(response).await?;
        Self::parse(response).await
    }

    async fn register(&self, new_user: &NewUser) -> Result<AuthPayload, ApiError> {
        debug!(email = %new_user.email, "sending registration request");

        let response = self
            .client
            .post(self.url("/auth/register"))
            .json(new_user)
            .send()
            .await?;

        let response = Self::check(response).await?;
        Self::parse(response).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshPayload, ApiError> {
        debug!("sending token refresh request");

        let response = self
            .client
            .post(self.url(REFRESH_PATH))
            .json(&json!({ "refreshToken": refresh_token }))
            .send()
            .await?;

        let response = Self::check(response).await?;
        Self::parse(response).await
    }

    async fn logout(&self, access_token: &str) -> Result<(), ApiError> {
        let response = self
            .client
            .post(self.url("/auth/logout"))
            .bearer_auth(access_token)
            .send()
            .await?;

        if let Err(err) = Self::check(response).await {
            warn!(error = %err, "server-side logout failed");
            return Err(err);
        }
        Ok(())
    }

    async fn logout_all(&self, access_token: &str) -> Result<(), ApiError> {
        let response = self
            .client
            .post(self.url("/auth/logout-all"))
            .bearer_auth(access_token)
            .send()
            .await?;

        if let Err(err) = Self::check(response).await {
            warn!(error = %err, "server-side logout-all failed");
            return Err(err);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn login_body() -> serde_json::Value {
        json!({
            "success": true,
            "data": {
                "user": {"id": "u-1", "email": "marie@example.ht"},
                "tokens": {"accessToken": "at-1", "refreshToken": "rt-1"},
                "session": {"sessionId": "s-1", "deviceId": "d-1"}
            }
        })
    }

    #[tokio::test]
    async fn test_login_parses_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .and(body_partial_json(json!({"identifier": "marie@example.ht"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(login_body()))
            .mount(&server)
            .await;

        let client = AuthClient::new(&SessionConfig::with_base_url(server.uri())).unwrap();
        let payload = client
            .login("marie@example.ht", "s3cret", false)
            .await
            .expect("login should succeed");

        assert_eq!(payload.tokens.access_token, "at-1");
        assert_eq!(payload.session.device_id.as_deref(), Some("d-1"));
    }

    #[tokio::test]
    async fn test_login_maps_credential_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(json!({"success": false, "message": "Identifiants invalides"})),
            )
            .mount(&server)
            .await;

        let client = AuthClient::new(&SessionConfig::with_base_url(server.uri())).unwrap();
        let result = client.login("marie@example.ht", "wrong", false).await;

        match result {
            Err(ApiError::BadRequest(message)) => assert_eq!(message, "Identifiants invalides"),
            other => panic!("expected BadRequest, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_refresh_rejects_malformed_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {}})))
            .mount(&server)
            .await;

        let client = AuthClient::new(&SessionConfig::with_base_url(server.uri())).unwrap();
        let result = client.refresh("rt-1").await;

        assert!(matches!(result, Err(ApiError::InvalidResponse(_))));
    }
}
