//! Wire schemas for the Auth Service endpoints.

use serde::{Deserialize, Serialize};

use crate::models::UserProfile;

/// Access/refresh token pair issued by login and registration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Tokens returned by the refresh endpoint. The refresh token is only
/// present when the server rotates it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotatedTokens {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Server-assigned correlation identifiers for one session.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMeta {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub device_id: Option<String>,
}

/// Payload of a successful login or registration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AuthPayload {
    pub user: UserProfile,
    pub tokens: TokenPair,
    #[serde(default)]
    pub session: SessionMeta,
}

/// Payload of a successful token refresh.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RefreshPayload {
    pub tokens: RotatedTokens,
    #[serde(default)]
    pub session: Option<SessionMeta>,
}

/// Advisory server-side token status. The client's own expiry tracking
/// remains authoritative for the renewal flow.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPayload {
    pub valid: bool,
    #[serde(default)]
    pub token_expiring_soon: bool,
}

/// Registration request body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub email: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}
