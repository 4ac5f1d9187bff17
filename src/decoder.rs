//! Resumable chunked body state machine.
//!
//! [`ChunkedDecoder::decode`] is pull based: each call advances through as
//! many states as the buffered bytes allow and stops at the first payload
//! segment, at the end of the body, or when it runs out of bytes. Running out
//! is reported as [`ChunkError::NeedMoreData`] with the state untouched, so
//! the same call can be repeated once the buffer has been refilled.

use http::{HeaderMap, HeaderName, HeaderValue};
use httparse::Status;
use tracing::{debug, trace, warn};

use crate::buffer::ZeroCopyReader;
use crate::chunk::{parse_chunk_size, skip_crlf};
use crate::config::DecoderConfig;
use crate::error::ChunkError;

/// Decoder position within a chunked body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum State {
    /// Expecting a chunk-size line.
    ReadingSize,
    /// Inside chunk data with `remaining` bytes left.
    ReadingData { remaining: usize },
    /// Expecting the CRLF that closes chunk data.
    ReadingDataTerminator,
    /// After the last chunk, expecting trailer fields or the final CRLF.
    ReadingTrailer,
    /// The body has been fully decoded.
    Done,
    /// The framing was invalid. The connection must be closed.
    Failed(ChunkError),
}

impl State {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, State::Done | State::Failed(_))
    }
}

/// Result of a successful [`ChunkedDecoder::decode`] call.
#[derive(Debug, PartialEq, Eq)]
pub enum Decoded<'a> {
    /// Payload bytes borrowed from the reader.
    Data(&'a [u8]),
    /// The last chunk and trailers have been consumed.
    Done,
}

/// Chunked transfer-encoding decoder for a single message body.
#[derive(Debug)]
pub struct ChunkedDecoder {
    state: State,
    config: DecoderConfig,
    trailers: HeaderMap,
    decoded: u64,
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        Self::with_config(DecoderConfig::default())
    }

    pub fn with_config(config: DecoderConfig) -> Self {
        Self {
            state: State::ReadingSize,
            config,
            trailers: HeaderMap::new(),
            decoded: 0,
        }
    }

    #[inline]
    pub fn state(&self) -> &State {
        &self.state
    }

    #[inline]
    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    #[inline]
    pub fn is_done(&self) -> bool {
        self.state == State::Done
    }

    #[inline]
    pub fn is_failed(&self) -> bool {
        matches!(self.state, State::Failed(_))
    }

    /// Payload bytes handed out so far.
    #[inline]
    pub fn decoded_len(&self) -> u64 {
        self.decoded
    }

    /// Trailer fields, populated once the decoder is [`State::Done`].
    pub fn trailers(&self) -> &HeaderMap {
        &self.trailers
    }

    pub fn take_trailers(&mut self) -> HeaderMap {
        std::mem::take(&mut self.trailers)
    }

    /// Prepares the decoder for the next body on the same connection.
    pub fn reset(&mut self) {
        self.state = State::ReadingSize;
        self.trailers.clear();
        self.decoded = 0;
    }

    /// Returns the next payload segment, or [`Decoded::Done`].
    ///
    /// A segment holds at most what is buffered of the current chunk; large
    /// chunks are handed out across several calls. After a fatal error every
    /// further call returns that same error.
    pub fn decode<'b, R>(&mut self, r: &'b mut R) -> Result<Decoded<'b>, ChunkError>
    where
        R: ZeroCopyReader + ?Sized,
    {
        match self.poll_data(r)? {
            Some(n) => {
                let data = r.next(n)?;
                self.consumed(n);
                Ok(Decoded::Data(data))
            }
            None => Ok(Decoded::Done),
        }
    }

    /// Runs the framing states until payload is available at the cursor.
    ///
    /// Returns the number of payload bytes ready to be taken, which the
    /// caller must consume from the reader and then report through
    /// [`consumed`](Self::consumed). `None` means the body is complete.
    pub(crate) fn poll_data<R>(&mut self, r: &mut R) -> Result<Option<usize>, ChunkError>
    where
        R: ZeroCopyReader + ?Sized,
    {
        loop {
            match self.state {
                State::ReadingSize => match parse_chunk_size(r, &self.config) {
                    Ok(0) => self.transition(State::ReadingTrailer),
                    Ok(size) => self.transition(State::ReadingData { remaining: size }),
                    Err(err) => return Err(self.fail(err)),
                },
                State::ReadingData { remaining } => {
                    let n = remaining.min(r.buffered());
                    if n == 0 {
                        return Err(ChunkError::NeedMoreData);
                    }
                    return Ok(Some(n));
                }
                State::ReadingDataTerminator => match skip_crlf(r) {
                    Ok(()) => self.transition(State::ReadingSize),
                    Err(err) => return Err(self.fail(err)),
                },
                State::ReadingTrailer => match self.read_trailers(r) {
                    Ok(()) => {
                        debug!(
                            decoded = self.decoded,
                            trailers = self.trailers.len(),
                            "chunked body complete"
                        );
                        self.transition(State::Done);
                    }
                    Err(err) => return Err(self.fail(err)),
                },
                State::Done => return Ok(None),
                State::Failed(ref err) => return Err(err.clone()),
            }
        }
    }

    /// Records that `n` payload bytes announced by [`poll_data`] were taken.
    ///
    /// [`poll_data`]: Self::poll_data
    pub(crate) fn consumed(&mut self, n: usize) {
        if let State::ReadingData { remaining } = self.state {
            debug_assert!(n <= remaining);
            let left = remaining.saturating_sub(n);
            self.decoded += n as u64;
            if left == 0 {
                self.transition(State::ReadingDataTerminator);
            } else {
                self.state = State::ReadingData { remaining: left };
            }
        }
    }

    #[inline]
    fn transition(&mut self, next: State) {
        trace!(from = ?self.state, to = ?next, "chunked decoder transition");
        self.state = next;
    }

    fn fail(&mut self, err: ChunkError) -> ChunkError {
        if err.is_fatal() {
            warn!(state = ?self.state, error = %err, "chunked body rejected");
            self.state = State::Failed(err.clone());
        }
        err
    }

    fn read_trailers<R>(&mut self, r: &mut R) -> Result<(), ChunkError>
    where
        R: ZeroCopyReader + ?Sized,
    {
        let avail = r.peek(r.buffered())?;
        match avail.first() {
            None => return Err(ChunkError::NeedMoreData),
            Some(b'\r') => return skip_crlf(r),
            Some(_) => {}
        }

        let max_trailers = self.config.max_trailers;
        let limit_reached = avail.len() >= self.config.max_trailer_size;
        let window = &avail[..avail.len().min(self.config.max_trailer_size)];
        let incomplete = || {
            if limit_reached {
                ChunkError::MalformedTrailer("trailer section too large")
            } else {
                ChunkError::NeedMoreData
            }
        };

        // Every field ends with a line feed, so the buffered line count bounds
        // the number of header slots worth allocating.
        let lines = window.iter().filter(|&&b| b == b'\n').count();
        if lines == 0 {
            return Err(incomplete());
        }
        let slots = lines.min(max_trailers);

        let (len, trailers) = {
            let mut fields = vec![httparse::EMPTY_HEADER; slots];
            match httparse::parse_headers(window, &mut fields) {
                Ok(Status::Complete((len, fields))) => {
                    let mut map = HeaderMap::with_capacity(fields.len());
                    for field in fields {
                        let name = HeaderName::from_bytes(field.name.as_bytes())
                            .map_err(|_| ChunkError::MalformedTrailer("invalid field name"))?;
                        let value = HeaderValue::from_bytes(field.value)
                            .map_err(|_| ChunkError::MalformedTrailer("invalid field value"))?;
                        map.append(name, value);
                    }
                    (len, map)
                }
                Ok(Status::Partial) => return Err(incomplete()),
                Err(httparse::Error::TooManyHeaders) if slots == max_trailers => {
                    return Err(ChunkError::MalformedTrailer("too many trailer fields"));
                }
                Err(httparse::Error::TooManyHeaders) => return Err(incomplete()),
                Err(_) => return Err(ChunkError::MalformedTrailer("invalid field syntax")),
            }
        };

        let bare_lf = window[..len]
            .iter()
            .enumerate()
            .any(|(i, &b)| b == b'\n' && (i == 0 || window[i - 1] != b'\r'));
        if bare_lf {
            return Err(ChunkError::MalformedTrailer("bare LF line ending"));
        }

        r.skip(len)?;
        self.trailers = trailers;
        Ok(())
    }
}
