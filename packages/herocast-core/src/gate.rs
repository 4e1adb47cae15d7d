//! Submit path: encode the draft, check the signer, hand off the post.

use std::future::Future;

use serde::Serialize;
use tracing::{info, warn};

use crate::encoder::{ComposedMessage, MentionEncoder};
use crate::error::SubmitError;
use crate::handshake::{AuthorizationState, Handshake, IdentityService};
use crate::metrics::{Metrics, METRICS};
use crate::resolver::HandleDirectory;
use crate::Error;

/// Account the post is published as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountContext {
    pub fid: u64,
    pub username: Option<String>,
}

/// Publishes a composed post on behalf of an account.
pub trait PostSubmitter: Send + Sync {
    type Receipt: Send;

    fn submit_post(
        &self,
        account: &AccountContext,
        message: &ComposedMessage,
    ) -> impl Future<Output = Result<Self::Receipt, Error>> + Send;
}

/// Read-only view of the handshake used to allow or block submission.
pub struct SessionGate<S: IdentityService> {
    handshake: Handshake<S>,
}

impl<S: IdentityService> SessionGate<S> {
    pub fn new(handshake: Handshake<S>) -> Self {
        Self { handshake }
    }

    pub fn handshake(&self) -> &Handshake<S> {
        &self.handshake
    }

    pub fn current_state(&self) -> AuthorizationState {
        self.handshake.current_state()
    }

    pub fn can_submit(&self) -> bool {
        self.current_state() == AuthorizationState::Approved
    }

    /// Encode `draft`, then submit it if the signer is approved.
    ///
    /// The signer state is read after encoding, so a handshake that settles
    /// while handles are resolving is honored.
    pub async fn submit<D, P>(
        &self,
        account: &AccountContext,
        draft: &str,
        encoder: &MentionEncoder<D>,
        submitter: &P,
    ) -> Result<P::Receipt, SubmitError>
    where
        D: HandleDirectory,
        P: PostSubmitter,
    {
        let message = match encoder.encode_message(draft).await {
            Ok(message) => message,
            Err(e) => {
                Metrics::incr(&METRICS.posts_rejected);
                return Err(e.into());
            }
        };

        let state = self.current_state();
        if state != AuthorizationState::Approved {
            Metrics::incr(&METRICS.posts_rejected);
            warn!(fid = account.fid, state = %state, "Submit blocked, signer not approved");
            return Err(SubmitError::NotAuthorized(state));
        }

        match submitter.submit_post(account, &message).await {
            Ok(receipt) => {
                Metrics::incr(&METRICS.posts_submitted);
                info!(
                    fid = account.fid,
                    mentions = message.mentions.len(),
                    warnings = message.warnings.len(),
                    "Post submitted"
                );
                Ok(receipt)
            }
            Err(e) => {
                Metrics::incr(&METRICS.posts_rejected);
                warn!(fid = account.fid, error = %e, "Post submission failed");
                Err(SubmitError::Submission(e))
            }
        }
    }
}
