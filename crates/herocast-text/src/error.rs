/// Malformed text or an offset that does not address it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodingError {
    InvalidUtf8 { valid_up_to: usize },
    OutOfRange { offset: usize, len: usize },
    NotCharBoundary { offset: usize },
    InvertedRange { start: usize, end: usize },
}

impl std::fmt::Display for EncodingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidUtf8 { valid_up_to } => {
                write!(f, "invalid utf-8 after byte {valid_up_to}")
            }
            Self::OutOfRange { offset, len } => {
                write!(f, "offset {offset} out of range (len {len})")
            }
            Self::NotCharBoundary { offset } => {
                write!(f, "byte offset {offset} is inside a multi-byte sequence")
            }
            Self::InvertedRange { start, end } => write!(f, "range start {start} > end {end}"),
        }
    }
}

impl std::error::Error for EncodingError {}

impl From<std::str::Utf8Error> for EncodingError {
    fn from(e: std::str::Utf8Error) -> Self {
        Self::InvalidUtf8 {
            valid_up_to: e.valid_up_to(),
        }
    }
}
