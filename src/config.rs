//! Limits applied while decoding a chunked body.

/// Default cap on a single chunk (16 MiB).
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 16 * 1024 * 1024;
/// Default cap on a chunk-size line, hex digits and padding included.
pub const DEFAULT_MAX_SIZE_LINE_LEN: usize = 1024;
/// Default cap on the number of trailer fields.
pub const DEFAULT_MAX_TRAILERS: usize = 32;
/// Default cap on the trailer section in bytes.
pub const DEFAULT_MAX_TRAILER_SIZE: usize = 8 * 1024;
/// Default refill granularity of a [`ReadBuffer`](crate::buffer::ReadBuffer).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 8 * 1024;

/// Decoder limits.
///
/// Every bound exists to cap what a peer can make the server buffer or
/// accumulate before the framing is validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoderConfig {
    /// Largest chunk size accepted on a size line.
    pub max_chunk_size: usize,
    /// Longest size line accepted, including the CRLF.
    pub max_size_line_len: usize,
    /// Most trailer fields accepted after the last chunk.
    pub max_trailers: usize,
    /// Largest trailer section accepted, including the final CRLF.
    pub max_trailer_size: usize,
    /// Spare capacity reserved before each socket read.
    pub read_buffer_size: usize,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            max_size_line_len: DEFAULT_MAX_SIZE_LINE_LEN,
            max_trailers: DEFAULT_MAX_TRAILERS,
            max_trailer_size: DEFAULT_MAX_TRAILER_SIZE,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

impl DecoderConfig {
    /// Configuration with every limit lifted.
    ///
    /// Chunk sizes are still bounded by `usize`.
    pub fn unlimited() -> Self {
        Self {
            max_chunk_size: usize::MAX,
            max_size_line_len: usize::MAX,
            max_trailers: usize::MAX,
            max_trailer_size: usize::MAX,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }

    pub fn with_max_chunk_size(mut self, max: usize) -> Self {
        self.max_chunk_size = max;
        self
    }

    pub fn with_max_size_line_len(mut self, max: usize) -> Self {
        self.max_size_line_len = max;
        self
    }

    pub fn with_max_trailers(mut self, max: usize) -> Self {
        self.max_trailers = max;
        self
    }

    pub fn with_max_trailer_size(mut self, max: usize) -> Self {
        self.max_trailer_size = max;
        self
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.max(1);
        self
    }
}
