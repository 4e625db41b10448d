//! Session lifecycle orchestration.
//!
//! The controller is the sole writer of session state: it stores
//! credentials handed over by an auth strategy, refreshes the profile
//! through the gateway, gates step navigation through the progress
//! resolver, and runs the expiry monitor. The UI shell observes snapshots
//! and events; it never mutates state directly.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use secrecy::ExposeSecret;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::auth::AuthStrategy;
use crate::config::SessionConfig;
use crate::error::{AuthError, Error, ValidationError};
use crate::gateway::{ApiGateway, redact_sensitive_detail};
use crate::onboarding::{self, OnboardingStep, Profile};
use crate::token::TokenStore;

/// Authentication phase of the session.
///
/// `Authenticating` covers the window between storing a credential and the
/// first successful profile load; a failed load only falls back to
/// `Unauthenticated` on an auth-class error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Unauthenticated,
    Authenticating,
    Authenticated,
}

impl SessionPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::Authenticating => "authenticating",
            Self::Authenticated => "authenticated",
        }
    }
}

/// Out-of-band notifications for UI consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Remaining validity first dropped under the warning threshold.
    /// Emitted at most once per credential.
    ExpiringSoon { remaining_secs: u64 },
    /// The credential reached its expiry instant; the session was torn down.
    Expired,
    /// The session was torn down by an explicit or implicit logout.
    LoggedOut,
}

/// Read-only view of the session for the UI shell.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub current_step: OnboardingStep,
    pub error: Option<String>,
    pub loading: bool,
    pub token_remaining_minutes: u64,
}

struct SessionState {
    phase: SessionPhase,
    profile: Option<Profile>,
    current_step: OnboardingStep,
    error: Option<String>,
    loading: bool,
}

impl SessionState {
    fn logged_out() -> Self {
        Self {
            phase: SessionPhase::Unauthenticated,
            profile: None,
            current_step: OnboardingStep::Auth,
            error: None,
            loading: false,
        }
    }
}

pub struct SessionController {
    tokens: Arc<TokenStore>,
    gateway: Arc<ApiGateway>,
    config: SessionConfig,
    state: RwLock<SessionState>,
    events: broadcast::Sender<SessionEvent>,
    /// Serializes profile refreshes; a second caller no-ops while one is
    /// in flight.
    refresh_guard: tokio::sync::Mutex<()>,
    /// Bumped whenever the credential changes, so a response that raced a
    /// logout or re-login is discarded instead of reviving cleared state.
    generation: AtomicU64,
    /// Whether the expiring-soon warning fired for the current credential.
    expiry_warned: AtomicBool,
    monitor: Mutex<Option<JoinHandle<()>>>,
}

impl SessionController {
    pub fn new(tokens: Arc<TokenStore>, gateway: Arc<ApiGateway>, config: SessionConfig) -> Arc<Self> {
        let (events, _) = broadcast::channel(16);
        Arc::new(Self {
            tokens,
            gateway,
            config,
            state: RwLock::new(SessionState::logged_out()),
            events,
            refresh_guard: tokio::sync::Mutex::new(()),
            generation: AtomicU64::new(0),
            expiry_warned: AtomicBool::new(false),
            monitor: Mutex::new(None),
        })
    }

    /// Seed session state from the token store, synchronously, so the UI
    /// never flashes a logged-out view for a user with a persisted
    /// credential. Schedules a background profile refresh only when no
    /// cached profile exists; a cached profile is trusted until a refresh
    /// is explicitly requested.
    pub fn initialize(self: &Arc<Self>) {
        if self.tokens.credential().is_none() {
            *self.state.write().expect("session state poisoned") = SessionState::logged_out();
            return;
        }

        let cached = self.tokens.cached_profile();
        {
            let mut state = self.state.write().expect("session state poisoned");
            state.current_step = onboarding::determine_current_step(cached.as_ref());
            state.phase = if cached.is_some() {
                SessionPhase::Authenticated
            } else {
                SessionPhase::Authenticating
            };
            state.profile = cached.clone();
            state.error = None;
        }

        if cached.is_none() {
            let controller = Arc::clone(self);
            tokio::spawn(async move {
                if let Err(e) = controller.refresh_profile().await {
                    tracing::warn!("Background profile refresh after hydration failed: {e}");
                }
            });
        }
    }

    /// Run an authentication strategy and adopt the credential it produces.
    pub async fn login(&self, strategy: &dyn AuthStrategy) -> Result<(), Error> {
        tracing::info!(strategy = strategy.name(), "Starting wallet authentication");
        let handoff = strategy.authenticate(&self.gateway).await?;
        self.set_credential(handoff.bearer.expose_secret(), handoff.profile.clone())?;
        if handoff.profile.is_none() {
            self.refresh_profile().await?;
        }
        Ok(())
    }

    /// Adopt a credential. A supplied profile is authoritative for the
    /// current step until the next refresh.
    pub fn set_credential(&self, bearer: &str, profile: Option<Profile>) -> Result<(), Error> {
        let bearer = bearer.trim();
        if bearer.is_empty() {
            return Err(ValidationError::InvalidInput {
                field: "bearer".to_string(),
                message: "credential must be non-empty; use logout() to clear".to_string(),
            }
            .into());
        }

        self.tokens.set_credential(Some(bearer), profile.clone())?;
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.expiry_warned.store(false, Ordering::SeqCst);

        let mut state = self.state.write().expect("session state poisoned");
        state.current_step = onboarding::determine_current_step(profile.as_ref());
        state.phase = if profile.is_some() {
            SessionPhase::Authenticated
        } else {
            SessionPhase::Authenticating
        };
        state.profile = profile;
        state.error = None;
        Ok(())
    }

    /// Fetch the latest profile and recompute the current step.
    ///
    /// Expired sessions log out without touching the network. Auth-class
    /// gateway failures tear the session down; anything else sets the
    /// error flag and leaves the previous state for a manual retry.
    pub async fn refresh_profile(&self) -> Result<(), Error> {
        if self.tokens.is_expired() {
            self.logout();
            return Ok(());
        }

        let Ok(_guard) = self.refresh_guard.try_lock() else {
            tracing::debug!("Profile refresh already in flight, coalescing");
            return Ok(());
        };

        self.state.write().expect("session state poisoned").loading = true;
        let generation = self.generation.load(Ordering::SeqCst);
        let result = self.gateway.fetch_profile().await;

        if self.generation.load(Ordering::SeqCst) != generation {
            // The credential this request was issued under is gone; a late
            // response must not revive a cleared session.
            self.state.write().expect("session state poisoned").loading = false;
            return Ok(());
        }

        match result {
            Ok(profile) => self.apply_refreshed_profile(generation, profile),
            Err(e) if e.is_auth_failure() => {
                tracing::info!("Profile refresh rejected by backend, logging out: {e}");
                self.logout();
                Err(AuthError::SessionRejected {
                    reason: redact_sensitive_detail(&e.to_string()),
                }
                .into())
            }
            Err(e) => {
                let mut state = self.state.write().expect("session state poisoned");
                state.loading = false;
                state.error = Some(redact_sensitive_detail(&e.to_string()));
                Err(e.into())
            }
        }
    }

    fn apply_refreshed_profile(&self, generation: u64, profile: Profile) -> Result<(), Error> {
        if self.generation.load(Ordering::SeqCst) != generation {
            self.state.write().expect("session state poisoned").loading = false;
            return Ok(());
        }

        // Re-persist the unchanged credential together with the refreshed
        // profile so the three durable keys stay consistent.
        self.tokens.update_profile(&profile)?;

        let mut state = self.state.write().expect("session state poisoned");
        state.loading = false;
        state.current_step = onboarding::determine_current_step(Some(&profile));
        state.phase = SessionPhase::Authenticated;
        state.profile = Some(profile);
        state.error = None;
        Ok(())
    }

    /// Tear the session down: clear the store, reset to the auth step.
    pub fn logout(&self) {
        if let Err(e) = self.tokens.set_credential(None, None) {
            tracing::warn!("Failed to clear persisted credential on logout: {e}");
        }
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.expiry_warned.store(false, Ordering::SeqCst);
        *self.state.write().expect("session state poisoned") = SessionState::logged_out();
        let _ = self.events.send(SessionEvent::LoggedOut);
    }

    /// Request a step change. Without a profile the only destination is
    /// `auth`; otherwise the progress resolver decides reachability, and a
    /// rejected navigation leaves the current step untouched.
    pub fn navigate_to(&self, target: OnboardingStep) -> Result<(), ValidationError> {
        let mut state = self.state.write().expect("session state poisoned");

        let Some(profile) = state.profile.clone() else {
            state.current_step = OnboardingStep::Auth;
            return Ok(());
        };

        if onboarding::can_navigate_to(Some(&profile), target) {
            state.current_step = target;
            Ok(())
        } else {
            Err(ValidationError::StepNotReachable {
                requested: target.as_str().to_string(),
                current: state.current_step.as_str().to_string(),
            })
        }
    }

    /// Derived, never stored: a non-expired credential and a loaded profile.
    pub fn is_authenticated(&self) -> bool {
        !self.tokens.is_expired()
            && self
                .state
                .read()
                .expect("session state poisoned")
                .profile
                .is_some()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.read().expect("session state poisoned");
        SessionSnapshot {
            phase: state.phase,
            current_step: state.current_step,
            error: state.error.clone(),
            loading: state.loading,
            token_remaining_minutes: self.tokens.remaining_validity_secs() / 60,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Start the recurring expiry check. Idempotent; the task holds only a
    /// weak reference so dropping the controller also ends it.
    pub fn start_expiry_monitor(self: &Arc<Self>) {
        let mut slot = self.monitor.lock().expect("monitor slot poisoned");
        if slot.is_some() {
            return;
        }

        let weak = Arc::downgrade(self);
        let interval = self.config.monitor_interval;
        *slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(controller) = weak.upgrade() else {
                    break;
                };
                controller.monitor_tick();
            }
        }));
    }

    /// Cancel the expiry monitor. Must run on teardown so a stale task
    /// never acts on a torn-down session.
    pub fn stop_expiry_monitor(&self) {
        if let Some(handle) = self.monitor.lock().expect("monitor slot poisoned").take() {
            handle.abort();
        }
    }

    fn monitor_tick(&self) {
        let phase = self.state.read().expect("session state poisoned").phase;
        if phase == SessionPhase::Unauthenticated {
            return;
        }

        let remaining = self.tokens.remaining_validity_secs();
        if remaining == 0 {
            tracing::info!("Session credential expired");
            self.logout();
            let _ = self.events.send(SessionEvent::Expired);
            return;
        }

        let threshold = self.config.expiry_warning_threshold.as_secs();
        if remaining <= threshold && !self.expiry_warned.swap(true, Ordering::SeqCst) {
            let _ = self.events.send(SessionEvent::ExpiringSoon {
                remaining_secs: remaining,
            });
        }
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        if let Some(handle) = self
            .monitor
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
        {
            handle.abort();
        }
    }
}
