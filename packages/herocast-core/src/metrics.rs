//! Process-wide counters (lock-free atomics), rendered in Prometheus text format.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};

pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    // --- Handshake ---
    pub handshake_attempts: AtomicU64,
    pub handshake_approved: AtomicU64,
    pub handshake_denied: AtomicU64,
    pub handshake_expired: AtomicU64,
    pub handshake_failed: AtomicU64,
    pub handshake_cancelled: AtomicU64,
    pub polls_total: AtomicU64,
    pub poll_errors: AtomicU64,

    // --- Resolver ---
    pub resolver_batches: AtomicU64,
    pub resolver_retries: AtomicU64,
    pub resolver_unavailable: AtomicU64,

    // --- Compose / submit ---
    pub mentions_encoded: AtomicU64,
    pub mentions_unresolved: AtomicU64,
    pub posts_submitted: AtomicU64,
    pub posts_rejected: AtomicU64,
}

impl Metrics {
    const fn new() -> Self {
        Self {
            handshake_attempts: AtomicU64::new(0),
            handshake_approved: AtomicU64::new(0),
            handshake_denied: AtomicU64::new(0),
            handshake_expired: AtomicU64::new(0),
            handshake_failed: AtomicU64::new(0),
            handshake_cancelled: AtomicU64::new(0),
            polls_total: AtomicU64::new(0),
            poll_errors: AtomicU64::new(0),
            resolver_batches: AtomicU64::new(0),
            resolver_retries: AtomicU64::new(0),
            resolver_unavailable: AtomicU64::new(0),
            mentions_encoded: AtomicU64::new(0),
            mentions_unresolved: AtomicU64::new(0),
            posts_submitted: AtomicU64::new(0),
            posts_rejected: AtomicU64::new(0),
        }
    }

    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }

    /// Render all counters plus the current signer state as a gauge.
    pub fn render(&self, signer_approved: bool) -> String {
        let counters: [(&str, &str, &AtomicU64); 15] = [
            ("herocast_handshake_attempts_total", "Handshake attempts started", &self.handshake_attempts),
            ("herocast_handshake_approved_total", "Handshakes approved", &self.handshake_approved),
            ("herocast_handshake_denied_total", "Handshakes denied", &self.handshake_denied),
            ("herocast_handshake_expired_total", "Handshakes expired", &self.handshake_expired),
            ("herocast_handshake_failed_total", "Handshakes failed", &self.handshake_failed),
            ("herocast_handshake_cancelled_total", "Handshakes cancelled", &self.handshake_cancelled),
            ("herocast_polls_total", "Authorization status polls", &self.polls_total),
            ("herocast_poll_errors_total", "Failed authorization status polls", &self.poll_errors),
            ("herocast_resolver_batches_total", "Handle lookup batches", &self.resolver_batches),
            ("herocast_resolver_retries_total", "Handle lookup retries", &self.resolver_retries),
            ("herocast_resolver_unavailable_total", "Handle lookups given up", &self.resolver_unavailable),
            ("herocast_mentions_encoded_total", "Mentions encoded", &self.mentions_encoded),
            ("herocast_mentions_unresolved_total", "Mentions left as plain text", &self.mentions_unresolved),
            ("herocast_posts_submitted_total", "Posts handed to the submitter", &self.posts_submitted),
            ("herocast_posts_rejected_total", "Posts blocked or failed", &self.posts_rejected),
        ];

        let mut out = String::with_capacity(2048);
        for (name, help, counter) in counters {
            let _ = writeln!(out, "# HELP {name} {help}");
            let _ = writeln!(out, "# TYPE {name} counter");
            let _ = writeln!(out, "{name} {}", counter.load(Ordering::Relaxed));
        }
        let _ = writeln!(out, "# HELP herocast_signer_approved Signer approved for submit");
        let _ = writeln!(out, "# TYPE herocast_signer_approved gauge");
        let _ = writeln!(out, "herocast_signer_approved {}", u8::from(signer_approved));
        out
    }
}
