//! Zero-copy cursors over connection read buffers.
//!
//! The chunked decoder never owns payload bytes. It reads through a
//! [`ZeroCopyReader`], which hands out views borrowed from the underlying
//! region. A view lives until the next mutating call on the reader, so the
//! borrow checker rules out reading bytes a refill may already have recycled.

use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::config::DEFAULT_READ_BUFFER_SIZE;
use crate::error::ChunkError;

/// Cursor over buffered, not yet consumed bytes.
///
/// Implementations never fill themselves: running out of bytes is reported as
/// [`ChunkError::NeedMoreData`] and the caller decides when to refill.
pub trait ZeroCopyReader {
    /// Number of unread bytes currently buffered.
    fn buffered(&self) -> usize;

    /// Returns the next `n` unread bytes without advancing.
    fn peek(&self, n: usize) -> Result<&[u8], ChunkError>;

    /// Advances past `n` bytes.
    fn skip(&mut self, n: usize) -> Result<(), ChunkError>;

    /// Returns the next `n` bytes and advances past them.
    fn next(&mut self, n: usize) -> Result<&[u8], ChunkError>;

    /// Returns the next byte and advances past it.
    fn read_byte(&mut self) -> Result<u8, ChunkError> {
        let byte = self.peek(1)?[0];
        self.skip(1)?;
        Ok(byte)
    }
}

#[inline]
fn out_of_range(requested: usize, buffered: usize) -> ChunkError {
    ChunkError::OutOfRange {
        requested,
        buffered,
    }
}

/// Reader over a borrowed slice that is already fully in memory.
#[derive(Debug, Clone)]
pub struct SliceReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> SliceReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes consumed so far.
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// The unread tail of the slice.
    #[inline]
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }
}

impl ZeroCopyReader for SliceReader<'_> {
    #[inline]
    fn buffered(&self) -> usize {
        self.data.len() - self.pos
    }

    #[inline]
    fn peek(&self, n: usize) -> Result<&[u8], ChunkError> {
        if n > self.buffered() {
            return Err(ChunkError::NeedMoreData);
        }
        Ok(&self.data[self.pos..self.pos + n])
    }

    #[inline]
    fn skip(&mut self, n: usize) -> Result<(), ChunkError> {
        if n > self.buffered() {
            return Err(out_of_range(n, self.buffered()));
        }
        self.pos += n;
        Ok(())
    }

    #[inline]
    fn next(&mut self, n: usize) -> Result<&[u8], ChunkError> {
        if n > self.buffered() {
            return Err(ChunkError::NeedMoreData);
        }
        let start = self.pos;
        self.pos += n;
        Ok(&self.data[start..self.pos])
    }
}

/// Connection-owned read buffer.
///
/// Bytes before the cursor are consumed; the next [`fill_from`] discards them
/// and may reuse their storage.
///
/// [`fill_from`]: ReadBuffer::fill_from
#[derive(Debug)]
pub struct ReadBuffer {
    data: BytesMut,
    pos: usize,
    read_size: usize,
}

impl Default for ReadBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_READ_BUFFER_SIZE)
    }
}

impl ReadBuffer {
    /// Creates an empty buffer that reserves `read_size` bytes before each
    /// socket read.
    pub fn new(read_size: usize) -> Self {
        let read_size = read_size.max(1);
        Self {
            data: BytesMut::with_capacity(read_size),
            pos: 0,
            read_size,
        }
    }

    /// Wraps bytes already read from the connection, e.g. the part of the
    /// body that arrived together with the request head.
    pub fn from_bytes(data: BytesMut, read_size: usize) -> Self {
        Self {
            data,
            pos: 0,
            read_size: read_size.max(1),
        }
    }

    /// Appends bytes after the unread tail.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Drops consumed bytes from the front of the region. O(1).
    pub fn compact(&mut self) {
        if self.pos > 0 {
            self.data.advance(self.pos);
            self.pos = 0;
        }
    }

    /// Performs one read from `io` into spare capacity.
    ///
    /// Returns the number of bytes read; `0` means the peer closed the stream.
    pub async fn fill_from<R>(&mut self, io: &mut R) -> std::io::Result<usize>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        self.compact();
        self.data.reserve(self.read_size);
        io.read_buf(&mut self.data).await
    }

    /// Detaches the next `n` bytes as an owned [`Bytes`] sharing the same
    /// allocation.
    pub fn split(&mut self, n: usize) -> Result<Bytes, ChunkError> {
        if n > self.buffered() {
            return Err(ChunkError::NeedMoreData);
        }
        self.compact();
        Ok(self.data.split_to(n).freeze())
    }

    /// Unread bytes, consuming the buffer.
    pub fn into_unread(mut self) -> BytesMut {
        self.compact();
        self.data
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffered() == 0
    }
}

impl ZeroCopyReader for ReadBuffer {
    #[inline]
    fn buffered(&self) -> usize {
        self.data.len() - self.pos
    }

    #[inline]
    fn peek(&self, n: usize) -> Result<&[u8], ChunkError> {
        if n > self.buffered() {
            return Err(ChunkError::NeedMoreData);
        }
        Ok(&self.data[self.pos..self.pos + n])
    }

    #[inline]
    fn skip(&mut self, n: usize) -> Result<(), ChunkError> {
        if n > self.buffered() {
            return Err(out_of_range(n, self.buffered()));
        }
        self.pos += n;
        Ok(())
    }

    #[inline]
    fn next(&mut self, n: usize) -> Result<&[u8], ChunkError> {
        if n > self.buffered() {
            return Err(ChunkError::NeedMoreData);
        }
        let start = self.pos;
        self.pos += n;
        Ok(&self.data[start..self.pos])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_reader_peek_does_not_advance() {
        let mut r = SliceReader::new(b"abc");
        assert_eq!(r.peek(2).unwrap(), b"ab");
        assert_eq!(r.peek(2).unwrap(), b"ab");
        assert_eq!(r.read_byte().unwrap(), b'a');
        assert_eq!(r.peek(2).unwrap(), b"bc");
        assert_eq!(r.position(), 1);
    }

    #[test]
    fn slice_reader_underrun() {
        let mut r = SliceReader::new(b"ab");
        assert_eq!(r.peek(3), Err(ChunkError::NeedMoreData));
        assert_eq!(
            r.skip(3),
            Err(ChunkError::OutOfRange {
                requested: 3,
                buffered: 2
            })
        );
        r.skip(2).unwrap();
        assert_eq!(r.read_byte(), Err(ChunkError::NeedMoreData));
        assert_eq!(r.peek(0).unwrap(), b"");
    }

    #[test]
    fn read_buffer_next_and_split() {
        let mut buf = ReadBuffer::new(16);
        buf.extend(b"hello world");
        assert_eq!(buf.next(6).unwrap(), b"hello ");
        let owned = buf.split(5).unwrap();
        assert_eq!(&owned[..], b"world");
        assert!(buf.is_empty());
        assert_eq!(buf.split(1), Err(ChunkError::NeedMoreData));
    }

    #[test]
    fn read_buffer_compact_keeps_unread() {
        let mut buf = ReadBuffer::new(4);
        buf.extend(b"0123456789");
        buf.skip(4).unwrap();
        buf.compact();
        assert_eq!(buf.peek(6).unwrap(), b"456789");
        buf.extend(b"ab");
        assert_eq!(&buf.into_unread()[..], b"456789ab");
    }

    #[tokio::test]
    async fn read_buffer_fills_from_stream() {
        let (mut client, mut server) = tokio::io::duplex(64);
        tokio::io::AsyncWriteExt::write_all(&mut client, b"abc")
            .await
            .unwrap();
        drop(client);

        let mut buf = ReadBuffer::new(8);
        let n = buf.fill_from(&mut server).await.unwrap();
        assert_eq!(n, 3);
        assert_eq!(buf.peek(3).unwrap(), b"abc");
        buf.skip(3).unwrap();
        assert_eq!(buf.fill_from(&mut server).await.unwrap(), 0);
    }
}
