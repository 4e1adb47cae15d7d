//! Out-of-band signer authorization handshake.
//!
//! `start()` asks the identity service for a signed key request, exposes its
//! approval URI (deep link / QR payload) and polls in one background task
//! until the user approves, denies, the request expires, or polling gives up.
//! State, request, credential and last error share one mutex so readers
//! always observe a consistent snapshot.

mod poller;

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::HandshakeConfig;
use crate::error::HandshakeError;
use crate::metrics::{Metrics, METRICS};
use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationState {
    Idle,
    Requesting,
    AwaitingApproval,
    Approved,
    Denied,
    Expired,
    Failed,
}

impl AuthorizationState {
    /// A background task is working on this attempt.
    pub fn is_in_flight(self) -> bool {
        matches!(self, Self::Requesting | Self::AwaitingApproval)
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Approved | Self::Denied | Self::Expired | Self::Failed
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Requesting => "requesting",
            Self::AwaitingApproval => "awaiting_approval",
            Self::Approved => "approved",
            Self::Denied => "denied",
            Self::Expired => "expired",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for AuthorizationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pending approval issued by the identity service. Never mutated; a retry
/// gets a new one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    pub token: String,
    pub approval_uri: String,
    /// Unix seconds.
    pub created_at: u64,
    /// Unix seconds.
    pub expires_at: u64,
}

impl AuthorizationRequest {
    /// How long the service will honour this request.
    pub fn lifetime(&self) -> Duration {
        Duration::from_secs(self.expires_at.saturating_sub(self.created_at))
    }
}

/// Outcome of one status poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus<C> {
    Pending,
    Approved(C),
    Denied,
}

/// The remote identity service (e.g. Warpcast signed key requests).
pub trait IdentityService: Send + Sync + 'static {
    /// Issued on approval; handed to the caller exactly once.
    type Credential: Send + 'static;

    fn create_authorization_request(
        &self,
    ) -> impl Future<Output = Result<AuthorizationRequest, Error>> + Send;

    fn poll_authorization_status(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<PollStatus<Self::Credential>, Error>> + Send;
}

impl<T: IdentityService> IdentityService for Arc<T> {
    type Credential = T::Credential;

    fn create_authorization_request(
        &self,
    ) -> impl Future<Output = Result<AuthorizationRequest, Error>> + Send {
        (**self).create_authorization_request()
    }

    fn poll_authorization_status(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<PollStatus<Self::Credential>, Error>> + Send {
        (**self).poll_authorization_status(token)
    }
}

struct Slot<C> {
    state: AuthorizationState,
    /// Bumped by every `start()`; pollers from older attempts stop writing.
    attempt: u64,
    request: Option<AuthorizationRequest>,
    credential: Option<C>,
    error: Option<HandshakeError>,
    cancel: Option<CancellationToken>,
}

pub(crate) struct Shared<S: IdentityService> {
    pub(crate) service: S,
    pub(crate) config: HandshakeConfig,
    slot: Mutex<Slot<S::Credential>>,
    state_tx: watch::Sender<AuthorizationState>,
}

/// Handle to the process-wide handshake. Cheap to clone; all clones share
/// one state machine. The poller stops once every handle is dropped.
pub struct Handshake<S: IdentityService> {
    shared: Arc<Shared<S>>,
}

impl<S: IdentityService> Clone for Handshake<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S: IdentityService> Handshake<S> {
    pub fn new(service: S, config: HandshakeConfig) -> Self {
        let (state_tx, _) = watch::channel(AuthorizationState::Idle);
        Self {
            shared: Arc::new(Shared {
                service,
                config,
                slot: Mutex::new(Slot {
                    state: AuthorizationState::Idle,
                    attempt: 0,
                    request: None,
                    credential: None,
                    error: None,
                    cancel: None,
                }),
                state_tx,
            }),
        }
    }

    /// Begin a new attempt and spawn its poller. A no-op returning the
    /// current state while an attempt is already in flight.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) -> AuthorizationState {
        let (attempt, cancel) = {
            let mut slot = self.shared.lock();
            if slot.state.is_in_flight() {
                return slot.state;
            }
            slot.attempt += 1;
            slot.request = None;
            slot.credential = None;
            slot.error = None;
            let cancel = CancellationToken::new();
            slot.cancel = Some(cancel.clone());
            self.shared.transition(&mut *slot, AuthorizationState::Requesting);
            (slot.attempt, cancel)
        };

        Metrics::incr(&METRICS.handshake_attempts);
        info!(attempt, "Signer authorization started");
        tokio::spawn(poller::run(Arc::downgrade(&self.shared), attempt, cancel));
        AuthorizationState::Requesting
    }

    /// Abandon the in-flight attempt and return to `Idle`. Terminal states
    /// are left untouched.
    pub fn cancel(&self) -> AuthorizationState {
        let mut slot = self.shared.lock();
        if !slot.state.is_in_flight() {
            return slot.state;
        }
        if let Some(cancel) = slot.cancel.take() {
            cancel.cancel();
        }
        slot.request = None;
        self.shared.transition(&mut *slot, AuthorizationState::Idle);
        Metrics::incr(&METRICS.handshake_cancelled);
        info!(attempt = slot.attempt, "Signer authorization cancelled");
        AuthorizationState::Idle
    }

    pub fn current_state(&self) -> AuthorizationState {
        self.shared.lock().state
    }

    /// Deep link for the user; only available while awaiting approval.
    pub fn approval_uri(&self) -> Option<String> {
        self.shared
            .lock()
            .request
            .as_ref()
            .map(|r| r.approval_uri.clone())
    }

    pub fn pending_request(&self) -> Option<AuthorizationRequest> {
        self.shared.lock().request.clone()
    }

    /// Move the issued credential out. Returns `Some` at most once per
    /// approved attempt.
    pub fn take_credential(&self) -> Option<S::Credential> {
        self.shared.lock().credential.take()
    }

    /// Why the last attempt ended badly, if it did.
    pub fn last_error(&self) -> Option<HandshakeError> {
        self.shared.lock().error.clone()
    }

    /// Watch every state transition.
    pub fn subscribe(&self) -> watch::Receiver<AuthorizationState> {
        self.shared.state_tx.subscribe()
    }

    /// Wait until no attempt is in flight and return the resulting state.
    pub async fn settled(&self) -> AuthorizationState {
        let mut rx = self.subscribe();
        let result = rx.wait_for(|state| !state.is_in_flight()).await.map(|s| *s);
        // The sender lives in `shared`, which `self` keeps alive.
        result.unwrap_or_else(|_| self.current_state())
    }
}

impl<S: IdentityService> Shared<S> {
    fn lock(&self) -> MutexGuard<'_, Slot<S::Credential>> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn transition(&self, slot: &mut Slot<S::Credential>, to: AuthorizationState) {
        slot.state = to;
        self.state_tx.send_replace(to);
    }

    /// Run `f` only if `attempt` is still the live, in-flight attempt.
    fn with_live_slot<F>(&self, attempt: u64, f: F) -> bool
    where
        F: FnOnce(&Self, &mut Slot<S::Credential>),
    {
        let mut slot = self.lock();
        if slot.attempt != attempt || !slot.state.is_in_flight() {
            return false;
        }
        f(self, &mut *slot);
        true
    }

    pub(crate) fn await_approval(&self, attempt: u64, request: AuthorizationRequest) -> bool {
        self.with_live_slot(attempt, |shared, slot| {
            info!(
                attempt,
                expires_at = request.expires_at,
                "Awaiting signer approval"
            );
            slot.request = Some(request);
            shared.transition(slot, AuthorizationState::AwaitingApproval);
        })
    }

    pub(crate) fn approve(&self, attempt: u64, credential: S::Credential) -> bool {
        self.with_live_slot(attempt, |shared, slot| {
            slot.request = None;
            slot.cancel = None;
            slot.credential = Some(credential);
            shared.transition(slot, AuthorizationState::Approved);
            Metrics::incr(&METRICS.handshake_approved);
            info!(attempt, "Signer approved");
        })
    }

    /// Terminal failure: Denied, Expired or Failed.
    pub(crate) fn fail(&self, attempt: u64, error: HandshakeError) -> bool {
        let to = match error {
            HandshakeError::Denied => AuthorizationState::Denied,
            HandshakeError::Expired => AuthorizationState::Expired,
            HandshakeError::CreateFailed(_) | HandshakeError::NetworkExhausted { .. } => {
                AuthorizationState::Failed
            }
        };
        self.with_live_slot(attempt, |shared, slot| {
            let counter = match to {
                AuthorizationState::Denied => &METRICS.handshake_denied,
                AuthorizationState::Expired => &METRICS.handshake_expired,
                _ => &METRICS.handshake_failed,
            };
            Metrics::incr(counter);
            info!(attempt, state = %to, error = %error, "Signer authorization ended");
            slot.request = None;
            slot.cancel = None;
            slot.error = Some(error);
            shared.transition(slot, to);
        })
    }
}

// --- Test helpers (shared across sub-module tests) ---
