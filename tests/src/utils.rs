//! Scripted collaborators shared by the integration tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use ed25519_dalek::SigningKey;
use herocast_core::config::HandshakeConfig;
use herocast_core::warpcast::{parse_created, parse_status, RemoteState};
use herocast_core::{
    AccountContext, AuthorizationRequest, ComposedMessage, Error, HandleDirectory,
    IdentityService, PollStatus, PostSubmitter, SignerCredential,
};

pub const CREATED_AT: u64 = 1_700_000_000;

pub fn fast_handshake_config() -> HandshakeConfig {
    HandshakeConfig {
        poll_interval_ms: 2_000,
        max_poll_failures: 3,
        request_timeout_ms: 10_000,
        key_request_ttl_secs: 60,
    }
}

/// Identity service that replays canned Warpcast JSON through the real
/// payload parsers. Each poll pops the next body; an empty queue answers
/// `pending`.
pub struct CannedWarpcast {
    pub ttl_secs: u64,
    pub creates: AtomicUsize,
    pub polls: AtomicUsize,
    pub replies: Mutex<VecDeque<Result<String, Error>>>,
    keys: Mutex<HashMap<String, SigningKey>>,
}

impl CannedWarpcast {
    pub fn new(replies: Vec<Result<String, Error>>) -> Self {
        Self {
            ttl_secs: 60,
            creates: AtomicUsize::new(0),
            polls: AtomicUsize::new(0),
            replies: Mutex::new(replies.into()),
            keys: Mutex::new(HashMap::new()),
        }
    }

    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }
}

pub fn status_body(state: &str, user_fid: Option<u64>) -> String {
    let fid = user_fid.map(|f| format!(r#","userFid":{f}"#)).unwrap_or_default();
    format!(r#"{{"result":{{"signedKeyRequest":{{"token":"t","state":"{state}"{fid}}}}}}}"#)
}

impl IdentityService for CannedWarpcast {
    type Credential = SignerCredential;

    async fn create_authorization_request(&self) -> Result<AuthorizationRequest, Error> {
        let n = self.creates.fetch_add(1, Ordering::SeqCst) + 1;
        let token = format!("0xtoken{n}");
        let body = format!(r#"{{"result":{{"signedKeyRequest":{{"token":"{token}"}}}}}}"#);
        let request = parse_created(body.as_bytes(), CREATED_AT, CREATED_AT + self.ttl_secs)?;
        self.keys
            .lock()
            .unwrap()
            .insert(token, SigningKey::from_bytes(&[n as u8; 32]));
        Ok(request)
    }

    async fn poll_authorization_status(
        &self,
        token: &str,
    ) -> Result<PollStatus<SignerCredential>, Error> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(status_body("pending", None)))?;
        match parse_status(reply.as_bytes())? {
            RemoteState::Pending => Ok(PollStatus::Pending),
            RemoteState::Denied => Ok(PollStatus::Denied),
            RemoteState::Approved { user_fid } => {
                let key = self
                    .keys
                    .lock()
                    .unwrap()
                    .remove(token)
                    .ok_or_else(|| Error::InvalidResponse("unknown token".into()))?;
                Ok(PollStatus::Approved(SignerCredential::new(user_fid, key)))
            }
        }
    }
}

/// Directory backed by a fixed table. Counts calls.
pub struct MapDirectory {
    table: HashMap<String, u64>,
    pub calls: AtomicUsize,
    pub fail_with: Mutex<Option<Error>>,
}

impl MapDirectory {
    pub fn new(entries: &[(&str, u64)]) -> Self {
        Self {
            table: entries.iter().map(|(h, id)| (h.to_string(), *id)).collect(),
            calls: AtomicUsize::new(0),
            fail_with: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl HandleDirectory for MapDirectory {
    async fn resolve_handles(
        &self,
        handles: &[String],
    ) -> Result<HashMap<String, Option<u64>>, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = self.fail_with.lock().unwrap().clone() {
            return Err(e);
        }
        Ok(handles
            .iter()
            .map(|h| (h.clone(), self.table.get(h).copied()))
            .collect())
    }
}

/// Submitter that records what it was handed and returns the cast body JSON.
#[derive(Default)]
pub struct RecordingSubmitter {
    pub posts: Mutex<Vec<(AccountContext, ComposedMessage)>>,
}

impl PostSubmitter for RecordingSubmitter {
    type Receipt = serde_json::Value;

    async fn submit_post(
        &self,
        account: &AccountContext,
        message: &ComposedMessage,
    ) -> Result<serde_json::Value, Error> {
        self.posts
            .lock()
            .unwrap()
            .push((account.clone(), message.clone()));
        serde_json::to_value(message.to_cast_body())
            .map_err(|e| Error::InvalidResponse(e.to_string()))
    }
}

pub fn account() -> AccountContext {
    AccountContext {
        fid: 9152,
        username: Some("herocast".into()),
    }
}
