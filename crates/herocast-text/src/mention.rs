//! `@handle` extraction.
//!
//! A mention starts at `@` when it opens the text or follows a character that
//! cannot be part of a word, then runs over `[A-Za-z0-9_.-]`. Scanning is
//! left-to-right and never backtracks, so spans cannot overlap.

use serde::Serialize;

use crate::{ByteOffset, CharOffset, TextScanner};

/// Longest handle the hub accepts (ENS names; fnames are shorter).
pub const MAX_HANDLE_LEN: usize = 20;

/// Byte span of one `@handle` in the source text. `start` points at the `@`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MentionSpan {
    pub start: ByteOffset,
    pub end: ByteOffset,
    /// Handle without the leading `@`, as typed.
    pub handle: String,
}

impl MentionSpan {
    pub fn byte_len(&self) -> usize {
        self.end.get() - self.start.get()
    }
}

/// Case-insensitive key for a handle.
pub fn normalize_handle(handle: &str) -> String {
    handle.to_ascii_lowercase()
}

/// Lazily scan `text` for mentions. Each call starts a fresh scan.
pub fn extract_mentions(text: &str) -> Mentions<'_> {
    Mentions {
        scanner: TextScanner::new(text),
        cursor: 0,
    }
}

/// Iterator over the mentions of one text, in document order.
#[derive(Debug, Clone)]
pub struct Mentions<'a> {
    scanner: TextScanner<'a>,
    cursor: usize,
}

fn is_handle_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')
}

fn can_precede_mention(c: char) -> bool {
    !(c.is_alphanumeric() || c == '_')
}

impl Mentions<'_> {
    fn char_at(&self, index: usize) -> Option<char> {
        self.scanner.char_at(CharOffset::new(index))
    }
}

impl Iterator for Mentions<'_> {
    type Item = MentionSpan;

    fn next(&mut self) -> Option<MentionSpan> {
        let len = self.scanner.char_len();
        while self.cursor < len {
            let at = self.cursor;
            self.cursor += 1;

            if self.char_at(at) != Some('@') {
                continue;
            }
            if at > 0 && !self.char_at(at - 1).is_some_and(can_precede_mention) {
                continue;
            }

            let body_start = at + 1;
            let mut end = body_start;
            while end < len
                && end - body_start < MAX_HANDLE_LEN
                && self.char_at(end).is_some_and(is_handle_char)
            {
                end += 1;
            }
            // Sentence punctuation after a handle is not part of it.
            while end > body_start && matches!(self.char_at(end - 1), Some('.' | '-')) {
                end -= 1;
            }
            if end == body_start {
                continue;
            }
            self.cursor = end;

            let bytes = self
                .scanner
                .byte_range(CharOffset::new(at)..CharOffset::new(end))
                .ok()?;
            let handle_bytes = ByteOffset::new(bytes.start.get() + 1)..bytes.end;
            let handle = self.scanner.slice(handle_bytes).ok()?.to_owned();
            return Some(MentionSpan {
                start: bytes.start,
                end: bytes.end,
                handle,
            });
        }
        None
    }
}
