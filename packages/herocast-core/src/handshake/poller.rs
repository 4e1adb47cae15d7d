//! Background task driving one handshake attempt: create, then poll until a
//! terminal outcome, the service-issued deadline, or cancellation.

use std::sync::Weak;

use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{IdentityService, PollStatus, Shared};
use crate::config::HandshakeConfig;
use crate::error::HandshakeError;
use crate::metrics::{Metrics, METRICS};
use crate::Error;

pub(super) async fn run<S: IdentityService>(
    shared: Weak<Shared<S>>,
    attempt: u64,
    cancel: CancellationToken,
) {
    let Some(config) = shared.upgrade().map(|s| s.config.clone()) else {
        return;
    };
    let Some((token, deadline)) = request_approval(&shared, attempt, &cancel, &config).await else {
        return;
    };
    poll_until_settled(&shared, attempt, &cancel, &config, &token, deadline).await;
}

/// Create the authorization request. Returns its token and the local
/// deadline derived from the service-issued lifetime.
async fn request_approval<S: IdentityService>(
    shared: &Weak<Shared<S>>,
    attempt: u64,
    cancel: &CancellationToken,
    config: &HandshakeConfig,
) -> Option<(String, Instant)> {
    let s = shared.upgrade()?;
    let limit = config.request_timeout();

    let created = tokio::select! {
        res = timeout(limit, s.service.create_authorization_request()) => {
            res.unwrap_or_else(|_| {
                Err(Error::Transport(format!("create request timed out after {limit:?}")))
            })
        }
        _ = cancel.cancelled() => {
            debug!(attempt, "Cancelled before the request was created");
            return None;
        }
    };

    let request = match created {
        Ok(request) if request.expires_at > request.created_at => request,
        Ok(request) => {
            s.fail(
                attempt,
                HandshakeError::CreateFailed(format!(
                    "request {} issued already expired",
                    request.token
                )),
            );
            return None;
        }
        Err(e) => {
            warn!(attempt, error = %e, "Authorization request failed");
            s.fail(attempt, HandshakeError::CreateFailed(e.to_string()));
            return None;
        }
    };

    let Some(deadline) = Instant::now().checked_add(request.lifetime()) else {
        s.fail(
            attempt,
            HandshakeError::CreateFailed(format!(
                "request {} expires too far in the future ({})",
                request.token, request.expires_at
            )),
        );
        return None;
    };
    let token = request.token.clone();
    if !s.await_approval(attempt, request) {
        return None;
    }
    Some((token, deadline))
}

async fn poll_until_settled<S: IdentityService>(
    shared: &Weak<Shared<S>>,
    attempt: u64,
    cancel: &CancellationToken,
    config: &HandshakeConfig,
    token: &str,
    deadline: Instant,
) {
    let limit = config.request_timeout();
    let mut failures: u32 = 0;

    loop {
        let wake = (Instant::now() + config.poll_interval()).min(deadline);
        tokio::select! {
            _ = tokio::time::sleep_until(wake) => {}
            _ = cancel.cancelled() => {
                debug!(attempt, "Poller cancelled");
                return;
            }
        }

        let Some(s) = shared.upgrade() else {
            debug!(attempt, "Handshake dropped, poller exiting");
            return;
        };

        if Instant::now() >= deadline {
            s.fail(attempt, HandshakeError::Expired);
            return;
        }

        Metrics::incr(&METRICS.polls_total);
        let polled = timeout(limit, s.service.poll_authorization_status(token))
            .await
            .unwrap_or_else(|_| Err(Error::Transport(format!("poll timed out after {limit:?}"))));

        // An in-flight poll may finish after cancel(); its outcome is dropped.
        if cancel.is_cancelled() {
            return;
        }
        // A reply that lands at or past the deadline does not count.
        if Instant::now() >= deadline {
            s.fail(attempt, HandshakeError::Expired);
            return;
        }

        match polled {
            Ok(PollStatus::Pending) => failures = 0,
            Ok(PollStatus::Approved(credential)) => {
                s.approve(attempt, credential);
                return;
            }
            Ok(PollStatus::Denied) => {
                s.fail(attempt, HandshakeError::Denied);
                return;
            }
            Err(e) => {
                Metrics::incr(&METRICS.poll_errors);
                failures += 1;
                if failures > config.max_poll_failures {
                    s.fail(attempt, HandshakeError::NetworkExhausted { failures });
                    return;
                }
                warn!(attempt, failures, error = %e, "Authorization poll failed, retrying next tick");
            }
        }
    }
}
