//! Batched handle → FID resolution.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use herocast_text::normalize_handle;
use tracing::{debug, warn};

use crate::config::ResolverConfig;
use crate::error::ResolutionUnavailable;
use crate::metrics::{Metrics, METRICS};
use crate::Error;

/// Remote user directory. One call resolves a whole batch; a handle with no
/// account maps to `None` (or is simply absent from the reply).
pub trait HandleDirectory: Send + Sync {
    fn resolve_handles(
        &self,
        handles: &[String],
    ) -> impl Future<Output = Result<HashMap<String, Option<u64>>, Error>> + Send;
}

impl<T: HandleDirectory> HandleDirectory for Arc<T> {
    fn resolve_handles(
        &self,
        handles: &[String],
    ) -> impl Future<Output = Result<HashMap<String, Option<u64>>, Error>> + Send {
        (**self).resolve_handles(handles)
    }
}

/// Lookup result keyed case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolutions {
    by_handle: HashMap<String, Option<u64>>,
}

impl Resolutions {
    pub fn identifier(&self, handle: &str) -> Option<u64> {
        self.by_handle
            .get(&normalize_handle(handle))
            .copied()
            .flatten()
    }

    pub fn len(&self) -> usize {
        self.by_handle.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_handle.is_empty()
    }

    pub fn unresolved(&self) -> impl Iterator<Item = &str> {
        self.by_handle
            .iter()
            .filter(|(_, id)| id.is_none())
            .map(|(h, _)| h.as_str())
    }
}

pub struct HandleResolver<D> {
    directory: D,
    config: ResolverConfig,
}

impl<D: HandleDirectory> HandleResolver<D> {
    pub fn new(directory: D, config: ResolverConfig) -> Self {
        Self { directory, config }
    }

    pub fn directory(&self) -> &D {
        &self.directory
    }

    /// Resolve every distinct handle with a single directory call, retried
    /// once on a transient failure.
    pub async fn resolve<'a, I>(&self, handles: I) -> Result<Resolutions, ResolutionUnavailable>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut seen = HashSet::new();
        let batch: Vec<String> = handles
            .into_iter()
            .map(normalize_handle)
            .filter(|h| seen.insert(h.clone()))
            .collect();

        if batch.is_empty() {
            return Ok(Resolutions::default());
        }

        Metrics::incr(&METRICS.resolver_batches);
        let mut attempts = 0;
        let reply = loop {
            attempts += 1;
            match self.lookup(&batch).await {
                Ok(reply) => break reply,
                Err(e) if e.is_transient() && attempts == 1 => {
                    Metrics::incr(&METRICS.resolver_retries);
                    warn!(handles = batch.len(), error = %e, "Handle lookup failed, retrying once");
                    tokio::time::sleep(self.config.retry_backoff()).await;
                }
                Err(e) => {
                    Metrics::incr(&METRICS.resolver_unavailable);
                    warn!(handles = batch.len(), attempts, error = %e, "Handle lookup unavailable");
                    return Err(ResolutionUnavailable {
                        attempts,
                        reason: e.to_string(),
                    });
                }
            }
        };

        let normalized: HashMap<String, Option<u64>> = reply
            .into_iter()
            .map(|(handle, id)| (normalize_handle(&handle), id))
            .collect();
        let by_handle = batch
            .into_iter()
            .map(|h| {
                let id = normalized.get(&h).copied().flatten();
                (h, id)
            })
            .collect();

        let resolutions = Resolutions { by_handle };
        debug!(
            total = resolutions.len(),
            unresolved = resolutions.unresolved().count(),
            "Handles resolved"
        );
        Ok(resolutions)
    }

    async fn lookup(&self, batch: &[String]) -> Result<HashMap<String, Option<u64>>, Error> {
        let limit = self.config.timeout();
        tokio::time::timeout(limit, self.directory.resolve_handles(batch))
            .await
            .unwrap_or_else(|_| {
                Err(Error::Transport(format!(
                    "handle lookup timed out after {limit:?}"
                )))
            })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Directory backed by a fixed table, optionally failing the first calls.
    pub(crate) struct TableDirectory {
        pub(crate) table: HashMap<String, u64>,
        pub(crate) failures: Mutex<VecDeque<Error>>,
        pub(crate) calls: Mutex<Vec<Vec<String>>>,
        pub(crate) delay: Duration,
    }

    impl TableDirectory {
        pub(crate) fn new(entries: &[(&str, u64)]) -> Self {
            Self {
                table: entries.iter().map(|(h, id)| (h.to_string(), *id)).collect(),
                failures: Mutex::new(VecDeque::new()),
                calls: Mutex::new(Vec::new()),
                delay: Duration::ZERO,
            }
        }

        pub(crate) fn failing(mut self, errors: Vec<Error>) -> Self {
            self.failures = Mutex::new(errors.into());
            self
        }

        pub(crate) fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl HandleDirectory for TableDirectory {
        async fn resolve_handles(
            &self,
            handles: &[String],
        ) -> Result<HashMap<String, Option<u64>>, Error> {
            self.calls.lock().unwrap().push(handles.to_vec());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if let Some(e) = self.failures.lock().unwrap().pop_front() {
                return Err(e);
            }
            Ok(handles
                .iter()
                .map(|h| (h.to_uppercase(), self.table.get(h).copied()))
                .collect())
        }
    }

    pub(crate) fn fast_config() -> ResolverConfig {
        ResolverConfig {
            timeout_ms: 1_000,
            retry_backoff_ms: 10,
        }
    }

    fn server_error() -> Error {
        Error::Status {
            code: 502,
            body: "bad gateway".into(),
        }
    }

    #[tokio::test]
    async fn test_dedupes_case_insensitively_in_one_call() {
        let resolver = HandleResolver::new(
            TableDirectory::new(&[("alice", 123)]),
            fast_config(),
        );
        let res = resolver
            .resolve(["Alice", "bob_2", "ALICE", "alice"])
            .await
            .unwrap();

        assert_eq!(resolver.directory().calls(), vec![vec!["alice".to_string(), "bob_2".to_string()]]);
        assert_eq!(res.len(), 2);
        assert_eq!(res.identifier("aLiCe"), Some(123));
        assert_eq!(res.identifier("bob_2"), None);
        assert_eq!(res.unresolved().collect::<Vec<_>>(), ["bob_2"]);
    }

    #[tokio::test]
    async fn test_empty_input_makes_no_call() {
        let resolver = HandleResolver::new(TableDirectory::new(&[]), fast_config());
        let res = resolver.resolve(std::iter::empty()).await.unwrap();
        assert!(res.is_empty());
        assert!(resolver.directory().calls().is_empty());
    }

    #[tokio::test]
    async fn test_retries_once_on_transient_failure() {
        let directory = TableDirectory::new(&[("alice", 1)]).failing(vec![server_error()]);
        let resolver = HandleResolver::new(directory, fast_config());

        let res = resolver.resolve(["alice"]).await.unwrap();
        assert_eq!(res.identifier("alice"), Some(1));
        assert_eq!(resolver.directory().calls().len(), 2);
    }

    #[tokio::test]
    async fn test_second_transient_failure_is_unavailable() {
        let directory = TableDirectory::new(&[("alice", 1)])
            .failing(vec![server_error(), Error::Transport("reset".into())]);
        let resolver = HandleResolver::new(directory, fast_config());

        let err = resolver.resolve(["alice"]).await.unwrap_err();
        assert_eq!(err.attempts, 2);
        assert_eq!(resolver.directory().calls().len(), 2);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let directory = TableDirectory::new(&[]).failing(vec![Error::Status {
            code: 401,
            body: "bad api key".into(),
        }]);
        let resolver = HandleResolver::new(directory, fast_config());

        let err = resolver.resolve(["alice"]).await.unwrap_err();
        assert_eq!(err.attempts, 1);
        assert!(err.reason.contains("401"));
        assert_eq!(resolver.directory().calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_transient() {
        let mut directory = TableDirectory::new(&[("alice", 1)]);
        directory.delay = Duration::from_secs(30);
        let resolver = HandleResolver::new(directory, fast_config());

        let err = resolver.resolve(["alice"]).await.unwrap_err();
        assert_eq!(err.attempts, 2);
        assert!(err.reason.contains("timed out"));
    }

    #[tokio::test]
    async fn test_missing_reply_entry_is_unresolved() {
        struct Sparse;
        impl HandleDirectory for Sparse {
            async fn resolve_handles(
                &self,
                _handles: &[String],
            ) -> Result<HashMap<String, Option<u64>>, Error> {
                Ok(HashMap::from([("Carol".to_string(), Some(3))]))
            }
        }
        let resolver = HandleResolver::new(Sparse, fast_config());
        let res = resolver.resolve(["carol", "dave"]).await.unwrap();
        assert_eq!(res.identifier("carol"), Some(3));
        assert_eq!(res.identifier("dave"), None);
        assert_eq!(res.len(), 2);
    }
}
