//! Domain and wire types for the FinSol Auth Service.
//!
//! Response payloads are parsed into explicit schemas at the API boundary;
//! anything that does not match is rejected there instead of leaking
//! half-populated values into session state.

pub mod auth;
pub mod user;

pub use auth::{AuthPayload, NewUser, RefreshPayload, RotatedTokens, SessionMeta, TokenPair, VerifyPayload};
pub use user::UserProfile;
