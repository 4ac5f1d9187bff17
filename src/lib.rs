//! Zero-copy, resumable decoding of HTTP/1.1 chunked transfer-encoding.
//!
//! The decoder parses framing straight out of the connection read buffer and
//! hands payload back as slices borrowed from it. It never blocks: when the
//! buffered bytes run out it reports [`ChunkError::NeedMoreData`] and can be
//! called again after a refill, resuming exactly where it stopped.
//!
//! ```
//! use chunked_wire::{ChunkedDecoder, Decoded, SliceReader};
//!
//! let mut reader = SliceReader::new(b"5\r\nhello\r\n0\r\n\r\n");
//! let mut decoder = ChunkedDecoder::new();
//!
//! assert_eq!(decoder.decode(&mut reader), Ok(Decoded::Data(&b"hello"[..])));
//! assert_eq!(decoder.decode(&mut reader), Ok(Decoded::Done));
//! ```
//!
//! [`ChunkedBody`] drives the same decoder over a `tokio` transport.

use bytes::Bytes;

pub mod body;
pub mod buffer;
pub mod chunk;
pub mod config;
pub mod decoder;
pub mod encode;
pub mod error;
pub mod lifecycle;
pub mod util;

pub use body::ChunkedBody;
pub use buffer::{ReadBuffer, SliceReader, ZeroCopyReader};
pub use chunk::{parse_chunk_size, skip_crlf};
pub use config::DecoderConfig;
pub use decoder::{ChunkedDecoder, Decoded, State};
pub use encode::{Chunk, LastChunk, encode_chunk, encode_last_chunk};
pub use error::{BodyError, ChunkError, DrainTimeout};
pub use lifecycle::{InFlight, Shutdown, ShutdownCause, ShutdownToken, Tracker};
pub use util::{chunked_body_len, is_chunked};

/// Types with a fixed HTTP/1.1 wire representation.
pub trait Wire {
    fn to_bytes(&self) -> Bytes;
}
