use crate::buffer::SliceReader;
use crate::config::DecoderConfig;
use crate::decoder::{ChunkedDecoder, Decoded};
use crate::error::ChunkError;

/// Returns `true` when `chunked` is the final coding of a Transfer-Encoding
/// field value. Case-insensitive, optional whitespace ignored.
#[inline(always)]
pub fn is_chunked(value: &[u8]) -> bool {
    let last = value.rsplit(|&b| b == b',').next().unwrap_or(value);
    last.trim_ascii().eq_ignore_ascii_case(b"chunked")
}

/// Returns the length of the complete chunked body at the start of `buf`,
/// last chunk and trailers included, or `None` if `buf` ends before it does.
pub fn chunked_body_len(buf: &[u8], config: &DecoderConfig) -> Result<Option<usize>, ChunkError> {
    let mut r = SliceReader::new(buf);
    let mut decoder = ChunkedDecoder::with_config(config.clone());
    loop {
        match decoder.decode(&mut r) {
            Ok(Decoded::Data(_)) => {}
            Ok(Decoded::Done) => return Ok(Some(r.position())),
            Err(ChunkError::NeedMoreData) => return Ok(None),
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_chunked() {
        assert!(is_chunked(b"chunked"));
        assert!(is_chunked(b" Chunked \t"));
        assert!(is_chunked(b"gzip, chunked"));
        assert!(is_chunked(b"gzip,CHUNKED"));
        assert!(!is_chunked(b"chunked, gzip"));
        assert!(!is_chunked(b"chunk"));
        assert!(!is_chunked(b""));
        assert!(!is_chunked(b"xchunked"));
    }

    #[test]
    fn measures_complete_body() {
        let config = DecoderConfig::default();
        let body = b"5\r\nhello\r\n0\r\n\r\n";
        assert_eq!(chunked_body_len(body, &config), Ok(Some(body.len())));

        let mut pipelined = body.to_vec();
        pipelined.extend_from_slice(b"GET / HTTP/1.1\r\n");
        assert_eq!(chunked_body_len(&pipelined, &config), Ok(Some(body.len())));

        let with_trailers = b"1\r\na\r\n0\r\nX: y\r\n\r\n";
        assert_eq!(
            chunked_body_len(with_trailers, &config),
            Ok(Some(with_trailers.len()))
        );
    }

    #[test]
    fn incomplete_or_invalid_body() {
        let config = DecoderConfig::default();
        assert_eq!(chunked_body_len(b"5\r\nhel", &config), Ok(None));
        assert_eq!(chunked_body_len(b"0\r\n", &config), Ok(None));
        assert!(chunked_body_len(b"g\r\n", &config).is_err());
    }
}
