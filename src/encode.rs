//! Chunked transfer-encoding serialization.

use bytes::{BufMut, Bytes, BytesMut};
use http::HeaderMap;

use crate::Wire;

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

/// Appends `n` as lowercase hex without leading zeros.
#[inline]
fn put_hex(dst: &mut BytesMut, mut n: usize) {
    let mut tmp = [0u8; 2 * std::mem::size_of::<usize>()];
    let mut i = tmp.len();
    loop {
        i -= 1;
        tmp[i] = HEX_DIGITS[n & 0xf];
        n >>= 4;
        if n == 0 {
            break;
        }
    }
    dst.put_slice(&tmp[i..]);
}

/// Appends one data chunk: `size CRLF data CRLF`.
///
/// Empty input writes nothing, since a zero-size chunk would end the body.
pub fn encode_chunk(dst: &mut BytesMut, data: &[u8]) {
    if data.is_empty() {
        return;
    }
    dst.reserve(data.len() + 2 * std::mem::size_of::<usize>() + 4);
    put_hex(dst, data.len());
    dst.put_slice(b"\r\n");
    dst.put_slice(data);
    dst.put_slice(b"\r\n");
}

/// Appends the last chunk, the trailer fields and the final CRLF.
pub fn encode_last_chunk(dst: &mut BytesMut, trailers: &HeaderMap) {
    dst.put_slice(b"0\r\n");
    for (name, value) in trailers {
        dst.put_slice(name.as_str().as_bytes());
        dst.put_slice(b": ");
        dst.put_slice(value.as_bytes());
        dst.put_slice(b"\r\n");
    }
    dst.put_slice(b"\r\n");
}

/// A single data chunk.
#[derive(Debug, Clone, Copy)]
pub struct Chunk<'a>(pub &'a [u8]);

impl Wire for Chunk<'_> {
    fn to_bytes(&self) -> Bytes {
        let mut dst = BytesMut::new();
        encode_chunk(&mut dst, self.0);
        dst.freeze()
    }
}

/// The terminating zero-size chunk with optional trailers.
#[derive(Debug, Clone, Copy)]
pub struct LastChunk<'a>(pub &'a HeaderMap);

impl Wire for LastChunk<'_> {
    fn to_bytes(&self) -> Bytes {
        let mut dst = BytesMut::new();
        encode_last_chunk(&mut dst, self.0);
        dst.freeze()
    }
}
