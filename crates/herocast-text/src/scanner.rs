//! Character ↔ byte offset conversion over a UTF-8 buffer.

use std::ops::Range;

use crate::{ByteOffset, CharOffset, EncodingError};

/// Offset index over one immutable text.
///
/// Building is O(n); char→byte lookups are O(1) and byte→char lookups are
/// O(log n). Every codepoint counts as one character regardless of its width,
/// so a 4-byte emoji advances the byte index by four and the char index by one.
#[derive(Debug, Clone)]
pub struct TextScanner<'a> {
    text: &'a str,
    /// `starts[i]` is the byte index of char `i`; the last entry is `text.len()`.
    starts: Vec<usize>,
}

impl<'a> TextScanner<'a> {
    pub fn new(text: &'a str) -> Self {
        let mut starts: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
        starts.push(text.len());
        Self { text, starts }
    }

    /// Validate raw bytes before scanning them.
    pub fn from_utf8(bytes: &'a [u8]) -> Result<Self, EncodingError> {
        let text = std::str::from_utf8(bytes)?;
        Ok(Self::new(text))
    }

    pub fn text(&self) -> &'a str {
        self.text
    }

    pub fn char_len(&self) -> usize {
        self.starts.len() - 1
    }

    pub fn byte_len(&self) -> usize {
        self.text.len()
    }

    pub fn char_at(&self, at: CharOffset) -> Option<char> {
        let start = *self.starts.get(at.get())?;
        self.text.get(start..)?.chars().next()
    }

    pub fn byte_offset(&self, at: CharOffset) -> Result<ByteOffset, EncodingError> {
        self.starts
            .get(at.get())
            .map(|&b| ByteOffset::new(b))
            .ok_or(EncodingError::OutOfRange {
                offset: at.get(),
                len: self.char_len(),
            })
    }

    pub fn char_offset(&self, at: ByteOffset) -> Result<CharOffset, EncodingError> {
        if at.get() > self.byte_len() {
            return Err(EncodingError::OutOfRange {
                offset: at.get(),
                len: self.byte_len(),
            });
        }
        self.starts
            .binary_search(&at.get())
            .map(CharOffset::new)
            .map_err(|_| EncodingError::NotCharBoundary { offset: at.get() })
    }

    pub fn byte_range(&self, range: Range<CharOffset>) -> Result<Range<ByteOffset>, EncodingError> {
        if range.start > range.end {
            return Err(EncodingError::InvertedRange {
                start: range.start.get(),
                end: range.end.get(),
            });
        }
        Ok(self.byte_offset(range.start)?..self.byte_offset(range.end)?)
    }

    pub fn char_range(&self, range: Range<ByteOffset>) -> Result<Range<CharOffset>, EncodingError> {
        if range.start > range.end {
            return Err(EncodingError::InvertedRange {
                start: range.start.get(),
                end: range.end.get(),
            });
        }
        Ok(self.char_offset(range.start)?..self.char_offset(range.end)?)
    }

    /// Text addressed by a byte range.
    pub fn slice(&self, range: Range<ByteOffset>) -> Result<&'a str, EncodingError> {
        // Validates boundaries and ordering.
        self.char_range(range.clone())?;
        self.text
            .get(range.start.get()..range.end.get())
            .ok_or(EncodingError::NotCharBoundary {
                offset: range.start.get(),
            })
    }
}
