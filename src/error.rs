//! Error types for chunked body decoding.

/// Errors produced while parsing chunked transfer-encoding framing.
///
/// Everything except [`ChunkError::NeedMoreData`] is fatal to the connection:
/// a chunked stream that failed to parse cannot be resynchronized safely.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChunkError {
    /// Fewer bytes are buffered than the current parse step needs.
    ///
    /// Not a protocol error. Refill the buffer and call again; no state has
    /// been consumed.
    #[error("need more data")]
    NeedMoreData,

    /// Attempted to skip past the end of the buffered data.
    #[error("skip out of range: requested {requested} bytes, {buffered} buffered")]
    OutOfRange { requested: usize, buffered: usize },

    /// The chunk-size line is not `1*HEXDIG *SP CRLF`.
    #[error("malformed chunk size line: {0}")]
    MalformedChunkSize(&'static str),

    /// The declared chunk size exceeds the configured maximum.
    #[error("chunk size exceeds maximum of {max} bytes")]
    ChunkSizeTooLarge { max: usize },

    /// A mandatory CRLF (after chunk data, or ending the trailers) is missing.
    #[error("malformed CRLF terminator")]
    MalformedTerminator,

    /// The trailer section is not valid header syntax.
    #[error("malformed trailer: {0}")]
    MalformedTrailer(&'static str),
}

impl ChunkError {
    /// Returns `true` when the connection must be closed.
    #[inline]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ChunkError::NeedMoreData)
    }
}

/// Errors surfaced by [`ChunkedBody`](crate::body::ChunkedBody).
#[derive(Debug, thiserror::Error)]
pub enum BodyError {
    /// The chunked framing is invalid; close the connection.
    #[error(transparent)]
    Chunk(#[from] ChunkError),

    /// The transport failed while refilling the read buffer.
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed the connection before the last chunk.
    #[error("connection closed before the chunked body was complete")]
    UnexpectedEof,
}

/// In-flight work did not finish within the graceful shutdown window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{remaining} in-flight bodies still running after the drain timeout")]
pub struct DrainTimeout {
    pub remaining: usize,
}
