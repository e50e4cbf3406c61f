/// Errors decoding a packet envelope from one of the wire layouts.
///
/// An envelope error is fatal to that one packet, never to the stream.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum FormatError {
    #[error("envelope too short: got {actual} bytes, need at least {minimum}")]
    TooShort { actual: usize, minimum: usize },

    #[error("buffer length {length} overruns the {remaining} remaining bytes")]
    BufferOverrun { length: i64, remaining: usize },

    #[error("unsupported packet format version {0}")]
    UnsupportedVersion(i32),
}

/// Errors decoding a single data record against a schema.
///
/// A parse error is fatal to that one record only; callers are expected to
/// skip the record and keep reading.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum ParseError {
    #[error("expected {expected} fields but found {actual}")]
    FieldCount { expected: usize, actual: usize },

    #[error("record does not match the schema record pattern")]
    PatternMismatch,

    #[error("record too short for fixed-width layout: needed {needed} more bytes at offset {offset}")]
    ShortRead { offset: usize, needed: usize },

    #[error("invalid schema pattern: {0}")]
    BadPattern(#[from] regex::Error),
}

#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

pub type Result<T> = std::result::Result<T, Error>;
