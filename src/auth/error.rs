use thiserror::Error;

use crate::api::ApiError;

/// Session-level failures surfaced to the embedding application.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Login or registration rejected by the server. Leaves any existing
    /// session untouched.
    #[error("invalid credentials: {0}")]
    Credentials(String),

    /// The session could not be renewed. Always accompanied by a forced
    /// local logout; never retried automatically.
    #[error("session refresh failed: {0}")]
    RefreshFailed(String),

    /// An operation that needs a live session was called without one.
    #[error("not authenticated")]
    NotAuthenticated,

    #[error(transparent)]
    Api(#[from] ApiError),
}
