//! REST API layer for the FinSol backend.
//!
//! This module provides:
//! - `AuthClient`: consumer of the external Auth Service endpoints
//!   (login, register, refresh, logout)
//! - `TokenGateway`: decorates authenticated calls with the bearer token
//!   and recovers transparently from a rejected token
//!
//! The backend wraps every response in a `{ "data": ... }` envelope and
//! signals auth failures with a 401 status.

pub mod client;
pub mod error;
pub mod gateway;

pub use client::{AuthApi, AuthClient};
pub use error::ApiError;
pub use gateway::{ApiRequest, TokenGateway};

use serde::de::DeserializeOwned;

/// Response envelope used by every FinSol endpoint.
#[derive(Debug, serde::Deserialize)]
struct Envelope<T> {
    data: T,
}

/// Decode a response body through the envelope, rejecting anything that
/// does not match the expected schema.
pub(crate) fn decode_envelope<T: DeserializeOwned>(body: &str) -> Result<T, ApiError> {
    serde_json::from_str::<Envelope<T>>(body)
        .map(|envelope| envelope.data)
        .map_err(|err| ApiError::InvalidResponse(format!("malformed response payload: {}", err)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::VerifyPayload;

    #[test]
    fn test_decode_envelope_unwraps_data() {
        let body = r#"{"success": true, "data": {"valid": true, "tokenExpiringSoon": false}}"#;

        let payload: VerifyPayload = decode_envelope(body).expect("envelope should decode");

        assert!(payload.valid);
        assert!(!payload.token_expiring_soon);
    }

    #[test]
    fn test_decode_envelope_rejects_missing_data() {
        let body = r#"{"success": true}"#;

        let result: Result<VerifyPayload, ApiError> = decode_envelope(body);

        assert!(matches!(result, Err(ApiError::InvalidResponse(_))));
    }
}
