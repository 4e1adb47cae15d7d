//! Client core configuration.
//!
//! Loaded from an optional `herocast.{toml,json,yaml}` file, then overridden by
//! `HEROCAST_*` environment variables (`__` separates nested tables, e.g.
//! `HEROCAST_HANDSHAKE__POLL_INTERVAL_MS=1000`).

use std::time::Duration;

use config::builder::DefaultState;
use config::ConfigBuilder;
use serde::Deserialize;

use crate::Error;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "defaults::warpcast_api_url")]
    pub warpcast_api_url: String,

    #[serde(default = "defaults::neynar_api_url")]
    pub neynar_api_url: String,

    #[serde(default)]
    pub neynar_api_key: String,

    /// FID of the app account that sponsors signer requests.
    #[serde(default)]
    pub app_fid: u64,

    #[serde(default = "defaults::signer_store_path")]
    pub signer_store_path: String,

    /// Base64 AES-256 key. Unset keeps the store in plaintext (dev only).
    #[serde(default)]
    pub signer_store_key: Option<String>,

    #[serde(default = "defaults::max_mentions")]
    pub max_mentions: usize,

    #[serde(default)]
    pub handshake: HandshakeConfig,

    #[serde(default)]
    pub resolver: ResolverConfig,
}

/// Poll cadence and limits for the signer handshake.
#[derive(Debug, Clone, Deserialize)]
pub struct HandshakeConfig {
    #[serde(default = "defaults::poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Consecutive poll failures tolerated before giving up.
    #[serde(default = "defaults::max_poll_failures")]
    pub max_poll_failures: u32,

    /// Upper bound on any single create/poll call.
    #[serde(default = "defaults::request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Validity of a new signed key request (its deadline).
    #[serde(default = "defaults::key_request_ttl_secs")]
    pub key_request_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResolverConfig {
    #[serde(default = "defaults::resolver_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "defaults::retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Config {
    /// Load from `herocast.*` (optional) and `HEROCAST_*` env vars.
    pub fn load() -> Result<Self, Error> {
        Self::from_builder(
            config::Config::builder()
                .add_source(config::File::with_name("herocast").required(false))
                .add_source(environment()),
        )
    }

    pub(crate) fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, Error> {
        let config: Self = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), Error> {
        if self.handshake.poll_interval_ms == 0 {
            return Err(Error::Config("handshake.poll_interval_ms must be > 0".into()));
        }
        if self.max_mentions == 0 {
            return Err(Error::Config("max_mentions must be > 0".into()));
        }
        Ok(())
    }
}

/// `HEROCAST_` prefix, `__` between nested keys.
fn environment() -> config::Environment {
    config::Environment::with_prefix("HEROCAST")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            warpcast_api_url: defaults::warpcast_api_url(),
            neynar_api_url: defaults::neynar_api_url(),
            neynar_api_key: String::new(),
            app_fid: 0,
            signer_store_path: defaults::signer_store_path(),
            signer_store_key: None,
            max_mentions: defaults::max_mentions(),
            handshake: HandshakeConfig::default(),
            resolver: ResolverConfig::default(),
        }
    }
}

impl HandshakeConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: defaults::poll_interval_ms(),
            max_poll_failures: defaults::max_poll_failures(),
            request_timeout_ms: defaults::request_timeout_ms(),
            key_request_ttl_secs: defaults::key_request_ttl_secs(),
        }
    }
}

impl ResolverConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            timeout_ms: defaults::resolver_timeout_ms(),
            retry_backoff_ms: defaults::retry_backoff_ms(),
        }
    }
}

mod defaults {
    pub fn warpcast_api_url() -> String {
        "https://api.warpcast.com/v2".into()
    }

    pub fn neynar_api_url() -> String {
        "https://api.neynar.com/v2/farcaster".into()
    }

    pub fn signer_store_path() -> String {
        "./signers/herocast.json".into()
    }

    /// Farcaster protocol limit per cast.
    pub fn max_mentions() -> usize {
        5
    }

    pub fn poll_interval_ms() -> u64 {
        2_000
    }

    pub fn max_poll_failures() -> u32 {
        3
    }

    pub fn request_timeout_ms() -> u64 {
        10_000
    }

    /// Signed key request deadline: one day.
    pub fn key_request_ttl_secs() -> u64 {
        86_400
    }

    pub fn resolver_timeout_ms() -> u64 {
        5_000
    }

    pub fn retry_backoff_ms() -> u64 {
        250
    }
}
