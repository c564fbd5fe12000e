//! Error types for entropy coding.

use thiserror::Error;

/// Error variants for bit stream and codec operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The bit stream ran out of bits before a symbol was fully decoded.
    #[error("end of stream")]
    EndOfStream,

    /// The decoded bits describe something structurally impossible.
    #[error("invalid stream: {0}")]
    InvalidStream(String),

    /// A coder or stream was configured with an unusable parameter.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The bit stream has been closed.
    #[error("stream closed")]
    StreamClosed,

    /// An I/O error occurred in the source or sink behind a bit stream.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized Result type for entropy coding operations.
pub type Result<T> = std::result::Result<T, Error>;
