//! Async chunked body reader.
//!
//! [`ChunkedBody`] owns the transport, the connection read buffer and a
//! [`ChunkedDecoder`]. It hides the refill-and-retry cycle: the decoder's
//! `NeedMoreData` turns into a socket read, so callers only ever see payload,
//! completion, or a fatal error.

use bytes::Bytes;
use futures::Stream;
use http::HeaderMap;
use http_body_util::StreamBody;
use hyper::body::Frame;
use tokio::io::AsyncRead;
use tracing::debug;

use crate::buffer::{ReadBuffer, ZeroCopyReader};
use crate::config::DecoderConfig;
use crate::decoder::ChunkedDecoder;
use crate::error::{BodyError, ChunkError};

/// Pull-based reader of a chunked message body.
///
/// Every method is cancel safe: dropping a pending call loses no decoded
/// bytes, and the body can be abandoned in any state with
/// [`into_parts`](Self::into_parts).
#[derive(Debug)]
pub struct ChunkedBody<R> {
    io: R,
    buf: ReadBuffer,
    decoder: ChunkedDecoder,
}

impl<R> ChunkedBody<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(io: R) -> Self {
        Self::with_config(io, DecoderConfig::default())
    }

    pub fn with_config(io: R, config: DecoderConfig) -> Self {
        let buf = ReadBuffer::new(config.read_buffer_size);
        Self::with_buffer(io, buf, config)
    }

    /// Starts from a buffer that may already hold the beginning of the body,
    /// as read together with the request head.
    pub fn with_buffer(io: R, buf: ReadBuffer, config: DecoderConfig) -> Self {
        Self {
            io,
            buf,
            decoder: ChunkedDecoder::with_config(config),
        }
    }

    pub fn decoder(&self) -> &ChunkedDecoder {
        &self.decoder
    }

    /// Trailer fields, available once the body is complete.
    pub fn trailers(&self) -> &HeaderMap {
        self.decoder.trailers()
    }

    #[inline]
    pub fn is_done(&self) -> bool {
        self.decoder.is_done()
    }

    /// Drives the decoder, reading from the transport until payload is ready.
    async fn ready(&mut self) -> Result<Option<usize>, BodyError> {
        loop {
            match self.decoder.poll_data(&mut self.buf) {
                Ok(ready) => return Ok(ready),
                Err(ChunkError::NeedMoreData) => {
                    let n = self.buf.fill_from(&mut self.io).await?;
                    if n == 0 {
                        debug!(
                            decoded = self.decoder.decoded_len(),
                            "peer closed mid chunked body"
                        );
                        return Err(BodyError::UnexpectedEof);
                    }
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Returns the next payload segment borrowed from the read buffer, or
    /// `None` once the body is complete.
    pub async fn next_chunk(&mut self) -> Result<Option<&[u8]>, BodyError> {
        let Some(n) = self.ready().await? else {
            return Ok(None);
        };
        let data = self.buf.next(n)?;
        self.decoder.consumed(n);
        Ok(Some(data))
    }

    /// Like [`next_chunk`](Self::next_chunk), but detaches the segment from
    /// the buffer as an owned [`Bytes`] without copying.
    pub async fn next_bytes(&mut self) -> Result<Option<Bytes>, BodyError> {
        let Some(n) = self.ready().await? else {
            return Ok(None);
        };
        let data = self.buf.split(n)?;
        self.decoder.consumed(n);
        Ok(Some(data))
    }

    /// Appends the remaining payload to `out`. Returns the number of bytes
    /// appended.
    pub async fn read_to_end(&mut self, out: &mut Vec<u8>) -> Result<usize, BodyError> {
        let start = out.len();
        while let Some(data) = self.next_chunk().await? {
            out.extend_from_slice(data);
        }
        Ok(out.len() - start)
    }

    /// Abandons decoding and hands back the transport and the read buffer.
    ///
    /// After a completed body the buffer holds whatever the peer pipelined
    /// behind it.
    pub fn into_parts(self) -> (R, ReadBuffer) {
        (self.io, self.buf)
    }

    /// Payload as a stream of owned segments.
    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes, BodyError>> {
        futures::stream::try_unfold(self, |mut body| async move {
            Ok::<_, BodyError>(body.next_bytes().await?.map(|data| (data, body)))
        })
    }

    /// Payload as an [`http_body::Body`], ending with a trailers frame when
    /// the peer sent trailers.
    ///
    /// [`http_body::Body`]: hyper::body::Body
    pub fn into_body(self) -> StreamBody<impl Stream<Item = Result<Frame<Bytes>, BodyError>>> {
        let frames = futures::stream::try_unfold(Some(self), |body| async move {
            let Some(mut body) = body else {
                return Ok::<_, BodyError>(None);
            };
            match body.next_bytes().await? {
                Some(data) => Ok(Some((Frame::data(data), Some(body)))),
                None => {
                    let trailers = body.decoder.take_trailers();
                    if trailers.is_empty() {
                        Ok(None)
                    } else {
                        Ok(Some((Frame::trailers(trailers), None)))
                    }
                }
            }
        });
        StreamBody::new(frames)
    }
}
