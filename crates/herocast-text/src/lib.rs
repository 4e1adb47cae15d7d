//! Pure text utilities for composing Farcaster casts.
//! No async and no I/O, so the client core and tests can both use it.

mod error;
mod mention;
mod offset;
mod scanner;

pub use error::EncodingError;
pub use mention::{MAX_HANDLE_LEN, MentionSpan, Mentions, extract_mentions, normalize_handle};
pub use offset::{ByteOffset, CharOffset};
pub use scanner::TextScanner;
