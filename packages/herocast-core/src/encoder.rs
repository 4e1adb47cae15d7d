//! Draft text → cast payload.
//!
//! Resolved mentions are cut out of the text and carried out of band as
//! `(fid, byte position)` pairs, the way the hub stores them. Anything that
//! did not resolve stays in the text as typed.

use std::collections::HashSet;
use std::fmt;

use herocast_text::{
    extract_mentions, normalize_handle, ByteOffset, EncodingError, MentionSpan, TextScanner,
};
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::Config;
use crate::metrics::{Metrics, METRICS};
use crate::resolver::{HandleDirectory, HandleResolver, Resolutions};

/// A mention that made it into the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedMention {
    /// Where the mention sat in the draft.
    pub span: MentionSpan,
    pub identifier: u64,
    /// Where the mention sits in the rewritten text.
    pub position: ByteOffset,
}

/// Non-fatal problems found while encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MentionWarning {
    /// No account with this handle.
    Unresolved { handle: String },
    /// Directory unreachable; every mention was left as text.
    ResolutionUnavailable { reason: String },
    /// Resolved, but the cast already carries the maximum number of mentions.
    LimitExceeded { handle: String },
}

impl fmt::Display for MentionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unresolved { handle } => write!(f, "@{handle} is not a known account"),
            Self::ResolutionUnavailable { reason } => {
                write!(f, "mentions left as text: {reason}")
            }
            Self::LimitExceeded { handle } => write!(f, "@{handle} exceeds the mention limit"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComposedMessage {
    pub text: String,
    /// Ascending by `span.start`.
    pub mentions: Vec<ResolvedMention>,
    pub warnings: Vec<MentionWarning>,
}

/// Wire body in the shape the cast APIs accept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CastBody {
    pub text: String,
    pub mentions: Vec<u64>,
    pub mentions_positions: Vec<u64>,
}

impl ComposedMessage {
    pub fn to_cast_body(&self) -> CastBody {
        CastBody {
            text: self.text.clone(),
            mentions: self.mentions.iter().map(|m| m.identifier).collect(),
            mentions_positions: self
                .mentions
                .iter()
                .map(|m| m.position.get() as u64)
                .collect(),
        }
    }
}

pub struct MentionEncoder<D> {
    resolver: HandleResolver<D>,
    max_mentions: usize,
}

impl<D: HandleDirectory> MentionEncoder<D> {
    pub fn new(directory: D, config: &Config) -> Self {
        Self {
            resolver: HandleResolver::new(directory, config.resolver.clone()),
            max_mentions: config.max_mentions,
        }
    }

    pub fn resolver(&self) -> &HandleResolver<D> {
        &self.resolver
    }

    pub fn max_mentions(&self) -> usize {
        self.max_mentions
    }

    /// Encode a draft held as raw bytes. Fails if they are not UTF-8.
    pub async fn encode_utf8(&self, bytes: &[u8]) -> Result<ComposedMessage, EncodingError> {
        let scanner = TextScanner::from_utf8(bytes)?;
        self.encode_message(scanner.text()).await
    }

    pub async fn encode_message(&self, text: &str) -> Result<ComposedMessage, EncodingError> {
        let spans: Vec<MentionSpan> = extract_mentions(text).collect();
        if spans.is_empty() {
            return Ok(ComposedMessage {
                text: text.to_owned(),
                mentions: Vec::new(),
                warnings: Vec::new(),
            });
        }

        let mut warnings = Vec::new();
        let resolutions = match self
            .resolver
            .resolve(spans.iter().map(|s| s.handle.as_str()))
            .await
        {
            Ok(resolutions) => resolutions,
            Err(e) => {
                warn!(mentions = spans.len(), error = %e, "Encoding without mentions");
                warnings.push(MentionWarning::ResolutionUnavailable {
                    reason: e.to_string(),
                });
                Resolutions::default()
            }
        };
        let degraded = !warnings.is_empty();

        let scanner = TextScanner::new(text);
        let mut out = String::with_capacity(text.len());
        let mut mentions = Vec::new();
        let mut used = HashSet::new();
        let mut reported = HashSet::new();
        let mut cursor = ByteOffset::new(0);

        for span in spans {
            out.push_str(scanner.slice(cursor..span.start)?);
            cursor = span.end;
            let key = normalize_handle(&span.handle);

            let Some(identifier) = resolutions.identifier(&key) else {
                if !degraded && reported.insert(key.clone()) {
                    warnings.push(MentionWarning::Unresolved { handle: key });
                }
                out.push_str(scanner.slice(span.start..span.end)?);
                continue;
            };

            if used.contains(&key) {
                // Only the first occurrence is carried out of band.
                out.push_str(scanner.slice(span.start..span.end)?);
                continue;
            }
            if used.len() >= self.max_mentions {
                if reported.insert(key.clone()) {
                    warnings.push(MentionWarning::LimitExceeded { handle: key });
                }
                out.push_str(scanner.slice(span.start..span.end)?);
                continue;
            }

            used.insert(key);
            mentions.push(ResolvedMention {
                span,
                identifier,
                position: ByteOffset::new(out.len()),
            });
        }
        out.push_str(scanner.slice(cursor..ByteOffset::new(scanner.byte_len()))?);

        let unresolved = warnings
            .iter()
            .filter(|w| matches!(w, MentionWarning::Unresolved { .. }))
            .count();
        Metrics::add(&METRICS.mentions_encoded, mentions.len());
        Metrics::add(&METRICS.mentions_unresolved, unresolved);
        debug!(
            mentions = mentions.len(),
            warnings = warnings.len(),
            bytes = out.len(),
            "Draft encoded"
        );

        Ok(ComposedMessage {
            text: out,
            mentions,
            warnings,
        })
    }
}
