//! Neynar user directory: handle → FID lookups for mentions.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::Error;

/// Lookups in flight at once for one batch. Neynar has no bulk
/// by-username endpoint, so a batch fans out into one request per handle.
pub const MAX_CONCURRENT_LOOKUPS: usize = 4;

#[derive(Deserialize)]
struct UserEnvelope {
    #[serde(default)]
    user: Option<UserDto>,
}

#[derive(Deserialize)]
struct UserDto {
    #[serde(default)]
    fid: Option<u64>,
}

/// FID from a `user/by_username` reply. A reply without a user or fid is an
/// unknown handle, not an error.
pub fn parse_user(body: &[u8]) -> Result<Option<u64>, Error> {
    let envelope: UserEnvelope = serde_json::from_slice(body)
        .map_err(|e| Error::InvalidResponse(format!("neynar user: {e}")))?;
    Ok(envelope.user.and_then(|u| u.fid).filter(|fid| *fid != 0))
}

/// Run `lookup` for every handle with at most `limit` calls in flight.
/// The first failed lookup fails the batch.
#[cfg_attr(not(feature = "http"), allow(dead_code))]
pub(crate) async fn lookup_bounded<F, Fut>(
    handles: &[String],
    limit: usize,
    lookup: F,
) -> Result<HashMap<String, Option<u64>>, Error>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<Option<u64>, Error>> + Send + 'static,
{
    let permits = Arc::new(Semaphore::new(limit.max(1)));
    let mut lookups = JoinSet::new();
    for handle in handles {
        let permits = Arc::clone(&permits);
        let pending = lookup(handle.clone());
        let handle = handle.clone();
        lookups.spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|e| Error::Transport(format!("lookup limiter closed: {e}")))?;
            let fid = pending.await?;
            Ok::<_, Error>((handle, fid))
        });
    }

    let mut resolved = HashMap::with_capacity(handles.len());
    while let Some(result) = lookups.join_next().await {
        let (handle, fid) =
            result.map_err(|e| Error::Transport(format!("lookup task failed: {e}")))??;
        resolved.insert(handle, fid);
    }
    Ok(resolved)
}

#[cfg(feature = "http")]
mod inner {
    use std::collections::HashMap;
    use std::time::Duration;

    use tracing::debug;

    use super::{lookup_bounded, parse_user, MAX_CONCURRENT_LOOKUPS};
    use crate::config::Config;
    use crate::resolver::HandleDirectory;
    use crate::Error;

    const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Resolves a batch by looking handles up concurrently, at most
    /// [`MAX_CONCURRENT_LOOKUPS`] at a time.
    #[derive(Clone)]
    pub struct NeynarDirectory {
        http: reqwest::Client,
        api_url: String,
        api_key: String,
    }

    impl NeynarDirectory {
        pub fn new(config: &Config) -> Result<Self, Error> {
            if config.neynar_api_key.is_empty() {
                return Err(Error::Config("neynar_api_key is not set".into()));
            }
            let http = reqwest::Client::builder()
                .timeout(config.resolver.timeout())
                .connect_timeout(CONNECT_TIMEOUT)
                .build()
                .map_err(|e| Error::Config(format!("HTTP client build failed: {e}")))?;

            Ok(Self {
                http,
                api_url: config.neynar_api_url.trim_end_matches('/').to_string(),
                api_key: config.neynar_api_key.clone(),
            })
        }

        async fn lookup(&self, handle: &str) -> Result<Option<u64>, Error> {
            let response = self
                .http
                .get(format!("{}/user/by_username", self.api_url))
                .query(&[("username", handle)])
                .header("accept", "application/json")
                .header("api_key", &self.api_key)
                .send()
                .await
                .map_err(|e| Error::Transport(format!("neynar lookup {handle}: {e}")))?;

            let status = response.status();
            if status == reqwest::StatusCode::NOT_FOUND {
                return Ok(None);
            }
            let body = response
                .bytes()
                .await
                .map_err(|e| Error::Transport(format!("neynar lookup {handle}: {e}")))?;
            if !status.is_success() {
                return Err(Error::Status {
                    code: status.as_u16(),
                    body: String::from_utf8_lossy(&body).into_owned(),
                });
            }
            parse_user(&body)
        }
    }

    impl HandleDirectory for NeynarDirectory {
        async fn resolve_handles(
            &self,
            handles: &[String],
        ) -> Result<HashMap<String, Option<u64>>, Error> {
            let resolved = lookup_bounded(handles, MAX_CONCURRENT_LOOKUPS, |handle| {
                let directory = self.clone();
                async move { directory.lookup(&handle).await }
            })
            .await?;
            debug!(count = resolved.len(), "Neynar batch resolved");
            Ok(resolved)
        }
    }
}

#[cfg(feature = "http")]
pub use inner::*;
