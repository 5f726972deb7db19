use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("unauthorized - access token rejected")]
    Unauthorized,

    #[error("request rejected: {0}")]
    BadRequest(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("rate limited - please wait before retrying")]
    RateLimited,

    #[error("server error: {0}")]
    ServerError(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            format!(
                "{}... (truncated, {} total bytes)",
                &body[..MAX_ERROR_BODY_LENGTH],
                body.len()
            )
        }
    }

    /// Pull the backend's `message` field out of an error body, falling
    /// back to the (truncated) raw body.
    fn server_message(body: &str) -> String {
        #[derive(serde::Deserialize)]
        struct ErrorBody {
            message: String,
        }

        match serde_json::from_str::<ErrorBody>(body) {
            Ok(parsed) => parsed.message,
            Err(_) => Self::truncate_body(body),
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        match status.as_u16() {
            400 | 422 => ApiError::BadRequest(Self::server_message(body)),
            401 => ApiError::Unauthorized,
            403 => ApiError::AccessDenied(Self::truncate_body(body)),
            404 => ApiError::NotFound(Self::truncate_body(body)),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(Self::truncate_body(body)),
            _ => ApiError::InvalidResponse(format!("status {}: {}", status, Self::truncate_body(body))),
        }
    }

    /// True when the response status signals a rejected access token.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, ApiError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_from_status_maps_auth_failure() {
        let err = ApiError::from_status(StatusCode::UNAUTHORIZED, "");
        assert!(err.is_auth_failure());

        let err = ApiError::from_status(StatusCode::INTERNAL_SERVER_ERROR, "boom");
        assert!(!err.is_auth_failure());
    }

    #[test]
    fn test_from_status_extracts_server_message() {
        let body = r#"{"success": false, "message": "Mot de passe invalide"}"#;

        match ApiError::from_status(StatusCode::BAD_REQUEST, body) {
            ApiError::BadRequest(message) => assert_eq!(message, "Mot de passe invalide"),
            other => panic!("expected BadRequest, got {:?}", other),
        }
    }

    #[test]
    fn test_truncates_oversized_bodies() {
        let body = "x".repeat(2_000);

        match ApiError::from_status(StatusCode::INTERNAL_SERVER_ERROR, &body) {
            ApiError::ServerError(message) => {
                assert!(message.len() < body.len());
                assert!(message.contains("truncated"));
            }
            other => panic!("expected ServerError, got {:?}", other),
        }
    }
}
