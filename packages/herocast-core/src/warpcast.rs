//! Warpcast signed key request flow.
//!
//! A fresh ed25519 key is generated per attempt, the app account signs the
//! request (`KeyRequestSigner`), and the user approves the key in Warpcast
//! through the returned deep link. Requires the `http` feature for the client;
//! the payload types and parsers are always available.

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::handshake::AuthorizationRequest;
use crate::Error;

/// Used when the service omits `deeplinkUrl`.
pub const DEEPLINK_BASE: &str = "https://client.warpcast.com/deeplinks/signed-key-request";

/// Produces the app account's signature over a signed key request
/// (EIP-712 `SignedKeyRequest { requestFid, key, deadline }`).
pub trait KeyRequestSigner: Send + Sync + 'static {
    /// FID of the app requesting the signer.
    fn request_fid(&self) -> u64;

    /// `0x`-hex signature for `key` valid until `deadline` (unix seconds).
    fn sign_key_request(
        &self,
        key: &str,
        deadline: u64,
    ) -> impl Future<Output = Result<String, Error>> + Send;
}

/// Body of `POST /signed-key-requests`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedKeyRequestBody {
    pub key: String,
    pub request_fid: u64,
    pub signature: String,
    pub deadline: u64,
}

/// Remote request state, reduced to what the handshake acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteState {
    Pending,
    Approved { user_fid: u64 },
    Denied,
}

#[derive(Deserialize)]
struct Envelope {
    result: EnvelopeResult,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnvelopeResult {
    signed_key_request: SignedKeyRequestDto,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignedKeyRequestDto {
    token: String,
    #[serde(default)]
    deeplink_url: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    user_fid: Option<u64>,
}

fn parse_envelope(body: &[u8]) -> Result<SignedKeyRequestDto, Error> {
    serde_json::from_slice::<Envelope>(body)
        .map(|e| e.result.signed_key_request)
        .map_err(|e| Error::InvalidResponse(format!("signed key request: {e}")))
}

pub fn fallback_deeplink(token: &str) -> String {
    format!("{DEEPLINK_BASE}?token={token}")
}

/// Parse the create reply into a request valid from `created_at` until
/// `deadline`.
pub fn parse_created(
    body: &[u8],
    created_at: u64,
    deadline: u64,
) -> Result<AuthorizationRequest, Error> {
    let dto = parse_envelope(body)?;
    if dto.token.is_empty() {
        return Err(Error::InvalidResponse("signed key request without token".into()));
    }
    let approval_uri = dto
        .deeplink_url
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| fallback_deeplink(&dto.token));
    Ok(AuthorizationRequest {
        token: dto.token,
        approval_uri,
        created_at,
        expires_at: deadline,
    })
}

/// Map a poll reply onto the states the handshake distinguishes.
pub fn parse_status(body: &[u8]) -> Result<RemoteState, Error> {
    let dto = parse_envelope(body)?;
    match dto.state.as_deref() {
        Some("pending") => Ok(RemoteState::Pending),
        Some("approved" | "completed") => match dto.user_fid {
            Some(user_fid) => Ok(RemoteState::Approved { user_fid }),
            None => Err(Error::InvalidResponse(format!(
                "request {} approved without userFid",
                dto.token
            ))),
        },
        Some("denied" | "rejected" | "revoked") => Ok(RemoteState::Denied),
        Some(other) => Err(Error::InvalidResponse(format!(
            "unknown signed key request state {other:?}"
        ))),
        None => Err(Error::InvalidResponse("signed key request without state".into())),
    }
}

#[cfg(feature = "http")]
mod inner {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    use ed25519_dalek::SigningKey;
    use tracing::{debug, info};

    use super::{parse_created, parse_status, KeyRequestSigner, RemoteState, SignedKeyRequestBody};
    use crate::config::Config;
    use crate::handshake::{AuthorizationRequest, IdentityService, PollStatus};
    use crate::signer::{generate_signing_key, public_key_hex, SignerCredential};
    use crate::Error;

    const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Warpcast API client acting as the handshake's identity service.
    pub struct WarpcastClient<K> {
        http: reqwest::Client,
        api_url: String,
        signer: K,
        ttl_secs: u64,
        /// Keys awaiting approval, by request token.
        pending: Mutex<HashMap<String, SigningKey>>,
    }

    impl<K: KeyRequestSigner> WarpcastClient<K> {
        pub fn new(config: &Config, signer: K) -> Result<Self, Error> {
            let http = reqwest::Client::builder()
                .timeout(config.handshake.request_timeout())
                .connect_timeout(CONNECT_TIMEOUT)
                .build()
                .map_err(|e| Error::Config(format!("HTTP client build failed: {e}")))?;

            Ok(Self {
                http,
                api_url: config.warpcast_api_url.trim_end_matches('/').to_string(),
                signer,
                ttl_secs: config.handshake.key_request_ttl_secs,
                pending: Mutex::new(HashMap::new()),
            })
        }

        fn pending(&self) -> std::sync::MutexGuard<'_, HashMap<String, SigningKey>> {
            self.pending.lock().unwrap_or_else(|e| e.into_inner())
        }

        async fn read(response: reqwest::Response) -> Result<Vec<u8>, Error> {
            let status = response.status();
            let body = response
                .bytes()
                .await
                .map_err(|e| Error::Transport(format!("read body: {e}")))?;
            if !status.is_success() {
                return Err(Error::Status {
                    code: status.as_u16(),
                    body: String::from_utf8_lossy(&body).into_owned(),
                });
            }
            Ok(body.to_vec())
        }
    }

    impl<K: KeyRequestSigner> IdentityService for WarpcastClient<K> {
        type Credential = SignerCredential;

        async fn create_authorization_request(&self) -> Result<AuthorizationRequest, Error> {
            let key = generate_signing_key();
            let public_key = public_key_hex(&key.verifying_key());
            let created_at = now_secs();
            let deadline = created_at + self.ttl_secs;

            let signature = self.signer.sign_key_request(&public_key, deadline).await?;
            let body = SignedKeyRequestBody {
                key: public_key.clone(),
                request_fid: self.signer.request_fid(),
                signature,
                deadline,
            };

            let response = self
                .http
                .post(format!("{}/signed-key-requests", self.api_url))
                .json(&body)
                .send()
                .await
                .map_err(|e| Error::Transport(format!("create signed key request: {e}")))?;
            let bytes = Self::read(response).await?;
            let request = parse_created(&bytes, created_at, deadline)?;

            info!(key = %public_key, deadline, "Signed key request created");
            // One attempt at a time; keys from abandoned attempts are dropped.
            let mut pending = self.pending();
            pending.clear();
            pending.insert(request.token.clone(), key);
            drop(pending);
            Ok(request)
        }

        async fn poll_authorization_status(
            &self,
            token: &str,
        ) -> Result<PollStatus<SignerCredential>, Error> {
            let response = self
                .http
                .get(format!("{}/signed-key-request", self.api_url))
                .query(&[("token", token)])
                .send()
                .await
                .map_err(|e| Error::Transport(format!("poll signed key request: {e}")))?;
            let bytes = Self::read(response).await?;

            match parse_status(&bytes)? {
                RemoteState::Pending => {
                    debug!("Signed key request still pending");
                    Ok(PollStatus::Pending)
                }
                RemoteState::Approved { user_fid } => {
                    let key = self.pending().remove(token).ok_or_else(|| {
                        Error::InvalidResponse("approved request has no local key".into())
                    })?;
                    Ok(PollStatus::Approved(SignerCredential::new(user_fid, key)))
                }
                RemoteState::Denied => {
                    self.pending().remove(token);
                    Ok(PollStatus::Denied)
                }
            }
        }
    }

    fn now_secs() -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }
}

#[cfg(feature = "http")]
pub use inner::*;
