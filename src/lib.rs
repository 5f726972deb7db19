//! Session lifecycle and token-refresh core for the FinSol dashboard
//! client.
//!
//! FinSol's shells render balances, transactions and sol (group savings)
//! views over a REST backend; this crate owns the part with real moving
//! parts: tracking how long the current session stays valid, warning the
//! user before expiry, collapsing concurrent token refreshes into a
//! single network call, and forcing a clean logout when renewal fails.
//!
//! The usual wiring is one [`SessionManager`] per process:
//!
//! ```no_run
//! use finsol_session::{SessionConfig, SessionManager};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let manager = SessionManager::new(SessionConfig::default())?;
//!
//! // Resume a persisted session, or sign in.
//! if !manager.hydrate()? {
//!     manager.login("marie@example.ht", "s3cret", true).await?;
//! }
//!
//! // Feature modules issue calls through the gateway; a lapsed token is
//! // refreshed once, transparently, behind a single refresh call.
//! let renewal = manager.renewal().expect("signed in");
//! if renewal.token_expiring_soon() {
//!     renewal.renew_session().await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod clock;
pub mod config;
pub mod models;

pub use api::{ApiError, ApiRequest, AuthApi, AuthClient, TokenGateway};
pub use auth::{
    AuthError, AuthState, DiskStorage, ExpiryMonitor, MemoryStorage, PersistedSession,
    RefreshCoordinator, Session, SessionManager, SessionRenewal, SessionStorage, SessionStore,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SessionConfig;
pub use models::{AuthPayload, NewUser, RefreshPayload, UserProfile, VerifyPayload};
