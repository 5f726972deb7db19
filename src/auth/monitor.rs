//! Proactive session-expiry monitoring.
//!
//! A background task polls the session store, raises the renewal warning
//! two minutes before the access token lapses, and forces a logout when
//! the warning goes unanswered. Expiry is detected here from the client's
//! own clock, independent of any API call happening to fail first.
//!
//! One task per session: it stops as soon as the session ends through any
//! path, and a new login spawns a fresh one. The poll interval and the
//! forced-logout deadline live inside the task, so teardown can never
//! leak a timer that fires against a stale session.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior, Sleep};
use tracing::{debug, info, warn};

use crate::auth::error::AuthError;
use crate::auth::refresh::RefreshCoordinator;
use crate::auth::store::SessionStore;
use crate::config::SessionConfig;

/// Capacity of the command channel; renew and cancel arrive one at a time.
const COMMAND_BUFFER: usize = 4;

enum Command {
    Renew {
        reply: oneshot::Sender<Result<(), AuthError>>,
    },
    Cancel,
}

/// Interface the monitor exposes to the presentation layer: the warning
/// flag and countdown for the renewal dialog, plus its two actions.
#[derive(Clone)]
pub struct SessionRenewal {
    store: Arc<SessionStore>,
    commands: mpsc::Sender<Command>,
}

impl SessionRenewal {
    pub fn token_expiring_soon(&self) -> bool {
        self.store.token_expiring_soon()
    }

    /// Time until the access token lapses; zero when no expiry is known.
    pub fn time_remaining(&self) -> Duration {
        self.store.time_remaining().unwrap_or_else(Duration::zero)
    }

    /// Keep the session alive: cancels the forced-logout deadline and
    /// refreshes the token. A failed renewal ends the session.
    pub async fn renew_session(&self) -> Result<(), AuthError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Renew { reply: tx })
            .await
            .map_err(|_| AuthError::NotAuthenticated)?;
        rx.await.map_err(|_| AuthError::NotAuthenticated)?
    }

    /// Decline renewal: the session is logged out immediately.
    pub fn cancel_renewal(&self) {
        let _ = self.commands.try_send(Command::Cancel);
    }
}

pub struct ExpiryMonitor;

impl ExpiryMonitor {
    /// Spawn the monitor task for the current session.
    ///
    /// Returns the UI-facing handle plus the task handle, which the owner
    /// aborts when a newer login replaces this session's monitor.
    pub fn spawn(
        store: Arc<SessionStore>,
        refresher: Arc<RefreshCoordinator>,
        config: &SessionConfig,
    ) -> (SessionRenewal, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let handle = SessionRenewal {
            store: store.clone(),
            commands: tx,
        };
        let timings = Timings {
            poll_interval: config.poll_interval,
            warning_threshold: config.warning_threshold,
            logout_deadline: config.logout_deadline,
        };
        let task = tokio::spawn(run(store, refresher, timings, rx));
        (handle, task)
    }
}

struct Timings {
    poll_interval: StdDuration,
    warning_threshold: Duration,
    logout_deadline: StdDuration,
}

async fn run(
    store: Arc<SessionStore>,
    refresher: Arc<RefreshCoordinator>,
    timings: Timings,
    mut commands: mpsc::Receiver<Command>,
) {
    let mut auth_rx = store.watch_authenticated();
    if !*auth_rx.borrow_and_update() {
        debug!("monitor spawned without an authenticated session");
        return;
    }

    let mut poll = time::interval(timings.poll_interval);
    // A renewal round-trip can straddle several ticks; don't replay them.
    poll.set_missed_tick_behavior(MissedTickBehavior::Skip);

    // Armed when the warning is raised, cleared by renewal. At most one
    // deadline exists at a time, and it dies with the task.
    let mut deadline: Option<Pin<Box<Sleep>>> = None;
    let mut warning = false;

    info!("expiry monitor started");

    loop {
        tokio::select! {
            _ = poll.tick() => {
                if !store.is_authenticated() {
                    break;
                }
                let Some(remaining) = store.time_remaining() else {
                    continue;
                };
                if remaining <= Duration::zero() {
                    info!("session already expired, logging out");
                    store.apply_logout();
                    break;
                }
                if !warning && remaining <= timings.warning_threshold {
                    warning = true;
                    info!(
                        seconds_remaining = remaining.num_seconds(),
                        "session expiring soon, opening renewal window"
                    );
                    store.mark_expiring_soon(true);
                    // Anchored here, at the moment the warning was raised;
                    // renewal attempts do not move it.
                    deadline = Some(Box::pin(time::sleep(timings.logout_deadline)));
                }
            }

            _ = async { deadline.as_mut().expect("guarded by is_some").await }, if deadline.is_some() => {
                info!("renewal window elapsed without an answer, forcing logout");
                store.apply_logout();
                break;
            }

            command = commands.recv() => match command {
                Some(Command::Renew { reply }) => {
                    deadline = None;
                    let result = refresher.request_token().await.map(|_| ());
                    match &result {
                        Ok(()) => {
                            warning = false;
                            debug!("session renewed, back to tracking");
                        }
                        Err(err) => warn!(error = %err, "session renewal failed"),
                    }
                    let renewed = result.is_ok();
                    let _ = reply.send(result);
                    if !renewed {
                        // The failed refresh already forced the logout.
                        break;
                    }
                }
                Some(Command::Cancel) => {
                    info!("renewal declined, logging out");
                    store.apply_logout();
                    break;
                }
                // Every handle is gone: the surrounding UI was torn down.
                None => break,
            },

            changed = auth_rx.changed() => {
                if changed.is_err() || !*auth_rx.borrow_and_update() {
                    break;
                }
            }
        }
    }

    debug!("expiry monitor stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::Utc;

    use crate::api::{ApiError, AuthApi};
    use crate::auth::storage::MemoryStorage;
    use crate::clock::{Clock, ManualClock};
    use crate::models::{
        AuthPayload, NewUser, RefreshPayload, RotatedTokens, SessionMeta, TokenPair, UserProfile,
    };

    struct ScriptedAuthApi {
        refresh_calls: AtomicUsize,
        fail: bool,
    }

    impl ScriptedAuthApi {
        fn new(fail: bool) -> Self {
            Self {
                refresh_calls: AtomicUsize::new(0),
                fail,
            }
        }
    }

    #[async_trait]
    impl AuthApi for ScriptedAuthApi {
        async fn login(
            &self,
            _identifier: &str,
            _password: &str,
            _remember_me: bool,
        ) -> Result<AuthPayload, ApiError> {
            unreachable!("login is not exercised by these tests")
        }

        async fn register(&self, _new_user: &NewUser) -> Result<AuthPayload, ApiError> {
            unreachable!("register is not exercised by these tests")
        }

        async fn refresh(&self, _refresh_token: &str) -> Result<RefreshPayload, ApiError> {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(ApiError::Unauthorized)
            } else {
                Ok(RefreshPayload {
                    tokens: RotatedTokens {
                        access_token: "at-new".to_string(),
                        refresh_token: None,
                    },
                    session: None,
                })
            }
        }

        async fn logout(&self, _access_token: &str) -> Result<(), ApiError> {
            Ok(())
        }

        async fn logout_all(&self, _access_token: &str) -> Result<(), ApiError> {
            Ok(())
        }
    }

    struct Harness {
        store: Arc<SessionStore>,
        clock: ManualClock,
        renewal: SessionRenewal,
        task: JoinHandle<()>,
    }

    /// Login at t=0 and spawn the monitor with default timings: 15 min
    /// token lifetime, 2 min warning threshold, 30 s polls, 2 min
    /// forced-logout deadline.
    async fn start(fail_refresh: bool) -> Harness {
        let config = SessionConfig::default();
        let clock = ManualClock::new(Utc::now());
        let store = Arc::new(SessionStore::new(
            &config,
            Arc::new(clock.clone()),
            Arc::new(MemoryStorage::default()),
        ));
        store.apply_login(AuthPayload {
            user: UserProfile {
                id: "u-1".to_string(),
                email: None,
                phone: None,
                first_name: None,
                last_name: None,
                region: None,
                default_currency: None,
            },
            tokens: TokenPair {
                access_token: "at-old".to_string(),
                refresh_token: "rt-1".to_string(),
            },
            session: SessionMeta::default(),
        });

        let api = Arc::new(ScriptedAuthApi::new(fail_refresh));
        let refresher = RefreshCoordinator::new(store.clone(), api);
        let (renewal, task) = ExpiryMonitor::spawn(store.clone(), refresher, &config);

        // Let the monitor process its immediate first tick.
        settle().await;

        Harness {
            store,
            clock,
            renewal,
            task,
        }
    }

    /// Advance the session clock and the timer clock together, stepping
    /// at the poll cadence so ticks observe a consistent wall-clock.
    async fn advance_both(clock: &ManualClock, mut secs: u64) {
        while secs > 0 {
            let step = secs.min(30);
            clock.advance(Duration::seconds(step as i64));
            time::advance(StdDuration::from_secs(step)).await;
            secs -= step;
        }
    }

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_warning_raised_two_minutes_before_expiry() {
        let h = start(false).await;
        assert!(!h.renewal.token_expiring_soon());

        // 12.5 minutes in: 2.5 minutes remaining, still tracking.
        advance_both(&h.clock, 750).await;
        assert!(!h.renewal.token_expiring_soon());

        // 13 minutes in: exactly the 2-minute threshold.
        advance_both(&h.clock, 30).await;
        assert!(h.renewal.token_expiring_soon());
        assert_eq!(h.renewal.time_remaining(), Duration::seconds(120));
        assert!(h.store.is_authenticated());
    }

    #[tokio::test(start_paused = true)]
    async fn test_renew_returns_to_tracking_with_new_expiry() {
        let h = start(false).await;
        let login_time = h.clock.now();

        advance_both(&h.clock, 780).await;
        assert!(h.renewal.token_expiring_soon());

        // The user answers the dialog 20 seconds later.
        advance_both(&h.clock, 20).await;
        h.renewal.renew_session().await.expect("renewal should succeed");

        assert!(!h.renewal.token_expiring_soon());
        assert_eq!(h.store.access_token().as_deref(), Some("at-new"));
        assert_eq!(
            h.store.snapshot().session.expires_at,
            Some(login_time + Duration::seconds(800) + Duration::minutes(15))
        );

        // The monitor keeps tracking against the new expiry.
        advance_both(&h.clock, 60).await;
        assert!(h.store.is_authenticated());
        assert!(!h.task.is_finished());
        assert!(!h.renewal.token_expiring_soon());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_warning_forces_logout_at_deadline() {
        let h = start(false).await;

        advance_both(&h.clock, 780).await;
        assert!(h.renewal.token_expiring_soon());

        // Repeated ticks inside the warning window must not restart the
        // deadline: one second short of it the session is still alive...
        advance_both(&h.clock, 119).await;
        assert!(h.store.is_authenticated());

        // ...and at exactly warning + 2 minutes it is gone.
        advance_both(&h.clock, 1).await;
        settle().await;
        assert!(!h.store.is_authenticated());
        assert!(!h.store.token_expiring_soon());

        // Monitoring stops for good.
        h.task.await.expect("monitor task should finish cleanly");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_logs_out_immediately() {
        let h = start(false).await;
        advance_both(&h.clock, 780).await;
        assert!(h.renewal.token_expiring_soon());

        h.renewal.cancel_renewal();
        settle().await;

        assert!(!h.store.is_authenticated());
        h.task.await.expect("monitor task should finish cleanly");
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_renewal_ends_the_session() {
        let h = start(true).await;
        advance_both(&h.clock, 780).await;

        let result = h.renewal.renew_session().await;

        assert!(matches!(result, Err(AuthError::RefreshFailed(_))));
        assert!(!h.store.is_authenticated());
        h.task.await.expect("monitor task should finish cleanly");

        // The handle now reports a dead session.
        assert!(matches!(
            h.renewal.renew_session().await,
            Err(AuthError::NotAuthenticated)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_session_is_logged_out_on_next_tick() {
        let h = start(false).await;

        // Sleep past the whole lifetime without ever renewing.
        advance_both(&h.clock, 930).await;
        settle().await;

        assert!(!h.store.is_authenticated());
        h.task.await.expect("monitor task should finish cleanly");
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_stops_when_logout_happens_elsewhere() {
        let h = start(false).await;

        // E.g. a terminal refresh failure in the gateway path.
        h.store.apply_logout();
        settle().await;

        assert!(h.task.is_finished());
    }
}
