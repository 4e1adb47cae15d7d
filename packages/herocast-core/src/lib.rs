//! # Herocast Core
//!
//! Client core for posting to Farcaster from Herocast: the out-of-band signer
//! handshake and the mention encoder that turns a draft into a cast payload.
//!
//! ## Submission path
//! 1. `MentionEncoder::encode_message` extracts `@handle`s, resolves them in
//!    one directory batch and rewrites the text with byte-exact positions.
//! 2. `SessionGate` checks that the signer handshake is `Approved`.
//! 3. The composed message goes to the host's `PostSubmitter`.
//!
//! ## Features
//! - `http`: Warpcast (`WarpcastClient`) and Neynar (`NeynarDirectory`)
//!   adapters over `reqwest`.

pub mod config;
pub mod encoder;
mod error;
pub mod gate;
pub mod handshake;
pub mod metrics;
pub mod neynar;
pub mod resolver;
pub mod signer;
pub mod signer_store;
pub mod warpcast;

pub use config::Config;
pub use encoder::{CastBody, ComposedMessage, MentionEncoder, MentionWarning, ResolvedMention};
pub use error::{Error, HandshakeError, ResolutionUnavailable, SubmitError};
pub use gate::{AccountContext, PostSubmitter, SessionGate};
pub use handshake::{
    AuthorizationRequest, AuthorizationState, Handshake, IdentityService, PollStatus,
};
pub use resolver::{HandleDirectory, HandleResolver, Resolutions};
pub use signer::SignerCredential;
pub use signer_store::SignerStore;

pub use herocast_text::{ByteOffset, CharOffset, EncodingError, MentionSpan};
