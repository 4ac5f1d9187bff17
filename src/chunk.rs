//! Chunk-size line and CRLF terminator parsing.
//!
//! Both parsers validate against bytes that are already buffered and only
//! advance the reader once the whole construct checked out. On any error,
//! [`ChunkError::NeedMoreData`] included, the cursor is left where it was, so
//! the offending bytes stay readable and a retry starts from the same place.

use tracing::trace;

use crate::buffer::ZeroCopyReader;
use crate::config::DecoderConfig;
use crate::error::ChunkError;

#[inline(always)]
fn hex_value(b: u8) -> Option<usize> {
    match b {
        b'0'..=b'9' => Some((b - b'0') as usize),
        b'a'..=b'f' => Some((b - b'a' + 10) as usize),
        b'A'..=b'F' => Some((b - b'A' + 10) as usize),
        _ => None,
    }
}

/// Parses a chunk-size line, `1*HEXDIG *SP CRLF`, and consumes it.
///
/// Chunk extensions (`;name=value`) are rejected. A value above
/// `config.max_chunk_size` fails with [`ChunkError::ChunkSizeTooLarge`] as
/// soon as the offending digit is seen.
pub fn parse_chunk_size<R>(r: &mut R, config: &DecoderConfig) -> Result<usize, ChunkError>
where
    R: ZeroCopyReader + ?Sized,
{
    let max = config.max_chunk_size;
    let avail = r.peek(r.buffered())?;
    let line_limit_reached = avail.len() >= config.max_size_line_len;
    let window = &avail[..avail.len().min(config.max_size_line_len)];

    let incomplete = || {
        if line_limit_reached {
            ChunkError::MalformedChunkSize("chunk size line too long")
        } else {
            ChunkError::NeedMoreData
        }
    };

    let mut value: usize = 0;
    let mut i = 0;
    while let Some(digit) = window.get(i).copied().and_then(hex_value) {
        value = value
            .checked_mul(16)
            .and_then(|v| v.checked_add(digit))
            .filter(|v| *v <= max)
            .ok_or(ChunkError::ChunkSizeTooLarge { max })?;
        i += 1;
    }

    if i == window.len() {
        return Err(incomplete());
    }
    if i == 0 {
        return Err(ChunkError::MalformedChunkSize("missing hex digits"));
    }

    while window.get(i) == Some(&b' ') {
        i += 1;
    }

    match window.get(i) {
        None => return Err(incomplete()),
        Some(b'\r') => {}
        Some(b';') => {
            return Err(ChunkError::MalformedChunkSize(
                "chunk extensions are not supported",
            ));
        }
        Some(_) => {
            return Err(ChunkError::MalformedChunkSize(
                "unexpected byte after chunk size",
            ));
        }
    }

    match window.get(i + 1) {
        None => return Err(incomplete()),
        Some(b'\n') => {}
        Some(_) => return Err(ChunkError::MalformedChunkSize("expected CRLF")),
    }

    r.skip(i + 2)?;
    trace!(size = value, line_len = i + 2, "parsed chunk size");
    Ok(value)
}

/// Consumes a mandatory `CRLF`.
pub fn skip_crlf<R>(r: &mut R) -> Result<(), ChunkError>
where
    R: ZeroCopyReader + ?Sized,
{
    match r.peek(r.buffered().min(2))? {
        [b'\r', b'\n'] => {}
        [] | [b'\r'] => return Err(ChunkError::NeedMoreData),
        _ => return Err(ChunkError::MalformedTerminator),
    }
    r.skip(2)
}
