//! Error types for the client core.

use std::fmt;

use herocast_text::EncodingError;

use crate::handshake::AuthorizationState;

/// Collaborator, configuration, and storage errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Configuration error.
    Config(String),
    /// Connection failure or timeout talking to a remote service.
    Transport(String),
    /// Remote service answered with a non-success status.
    Status { code: u16, body: String },
    /// Remote payload did not match the expected shape.
    InvalidResponse(String),
    /// Signer store read/write failure.
    Store(String),
}

impl Error {
    /// Whether a retry may succeed (timeouts, throttling, 5xx).
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Transport(_) => true,
            Error::Status { code, .. } => matches!(code, 408 | 429 | 500..=599),
            Error::Config(_) | Error::InvalidResponse(_) | Error::Store(_) => false,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(msg) => write!(f, "config error: {msg}"),
            Error::Transport(msg) => write!(f, "transport error: {msg}"),
            Error::Status { code, body } => write!(f, "http {code}: {body}"),
            Error::InvalidResponse(msg) => write!(f, "invalid response: {msg}"),
            Error::Store(msg) => write!(f, "signer store error: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

/// Terminal failure of a handshake attempt, readable after the transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    CreateFailed(String),
    Expired,
    Denied,
    NetworkExhausted { failures: u32 },
}

impl fmt::Display for HandshakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateFailed(msg) => write!(f, "authorization request failed: {msg}"),
            Self::Expired => write!(f, "authorization request expired"),
            Self::Denied => write!(f, "authorization denied"),
            Self::NetworkExhausted { failures } => {
                write!(f, "gave up after {failures} consecutive poll failures")
            }
        }
    }
}

impl std::error::Error for HandshakeError {}

/// Handle lookup failed for the whole batch after the retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionUnavailable {
    pub attempts: u32,
    pub reason: String,
}

impl fmt::Display for ResolutionUnavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "handle resolution unavailable after {} attempt(s): {}",
            self.attempts, self.reason
        )
    }
}

impl std::error::Error for ResolutionUnavailable {}

/// Why a draft was not handed to the submission collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    Encoding(EncodingError),
    NotAuthorized(AuthorizationState),
    Submission(Error),
}

impl fmt::Display for SubmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Encoding(e) => write!(f, "cannot encode draft: {e}"),
            Self::NotAuthorized(state) => write!(f, "signer not approved (state: {state})"),
            Self::Submission(e) => write!(f, "submission failed: {e}"),
        }
    }
}

impl std::error::Error for SubmitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Encoding(e) => Some(e),
            Self::Submission(e) => Some(e),
            Self::NotAuthorized(_) => None,
        }
    }
}

impl From<EncodingError> for SubmitError {
    fn from(e: EncodingError) -> Self {
        Self::Encoding(e)
    }
}
