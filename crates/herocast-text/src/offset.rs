//! Unit-tagged text offsets.
//!
//! Farcaster counts mention positions in UTF-8 bytes while editors count
//! characters. Keeping the two as distinct types means a character index can
//! never be used where a byte index is expected without going through
//! [`TextScanner`](crate::TextScanner).

use serde::Serialize;

/// Index of a Unicode scalar value within a text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct CharOffset(usize);

/// Index of a UTF-8 byte within a text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ByteOffset(usize);

impl CharOffset {
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    pub const fn get(self) -> usize {
        self.0
    }
}

impl ByteOffset {
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    pub const fn get(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for CharOffset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "char {}", self.0)
    }
}

impl std::fmt::Display for ByteOffset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "byte {}", self.0)
    }
}
