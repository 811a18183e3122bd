use bytes::{Buf, Bytes, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("frame exceeds {max} bytes")]
    Oversized { max: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// One logical telemetry message with transport headers stripped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryFrame {
    pub body: Bytes,
    /// Arrived as an HTTP request and expects an HTTP response
    pub http: bool,
    /// Set when the header block could not be read; the body is not trustworthy
    pub header_error: Option<String>,
}

/// Reply written back to the tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameAck {
    HttpOk,
}

/// Splits a tracker byte stream into telemetry frames.
///
/// Two framings share the stream: HTTP requests (header block, then a body
/// sized by `Content-Length`) and bare newline-delimited JSON records.
/// A bad header block still yields a frame so the stream stays in sync.
#[derive(Debug, Clone)]
pub struct TelemetryFrameCodec {
    max_frame_bytes: usize,
}

impl TelemetryFrameCodec {
    pub fn new(max_frame_bytes: usize) -> Self {
        Self { max_frame_bytes }
    }

    fn oversized(&self) -> FrameError {
        FrameError::Oversized {
            max: self.max_frame_bytes,
        }
    }

    /// Length of the record starting at `from`, up to and including its newline
    fn line_len(
        &self,
        src: &BytesMut,
        from: usize,
        eof: bool,
    ) -> Result<Option<usize>, FrameError> {
        let rest = &src[from..];
        let len = match find(rest, b"\n") {
            Some(newline) => newline + 1,
            None if eof => rest.len(),
            None => {
                if src.len() > self.max_frame_bytes {
                    return Err(self.oversized());
                }
                return Ok(None);
            }
        };
        if from + len > self.max_frame_bytes {
            return Err(self.oversized());
        }
        Ok(Some(len))
    }

    fn decode_line(
        &self,
        src: &mut BytesMut,
        eof: bool,
    ) -> Result<Option<TelemetryFrame>, FrameError> {
        let Some(len) = self.line_len(src, 0, eof)? else {
            return Ok(None);
        };
        Ok(Some(TelemetryFrame {
            body: trim_ascii(src.split_to(len).freeze()),
            http: false,
            header_error: None,
        }))
    }

    fn decode_http(
        &self,
        src: &mut BytesMut,
        eof: bool,
    ) -> Result<Option<TelemetryFrame>, FrameError> {
        let Some(header_end) = find(src, HEADER_TERMINATOR) else {
            if src.len() > self.max_frame_bytes {
                return Err(self.oversized());
            }
            if eof {
                src.clear();
                return Ok(Some(TelemetryFrame {
                    body: Bytes::new(),
                    http: true,
                    header_error: Some("truncated header block".to_string()),
                }));
            }
            return Ok(None);
        };
        let body_start = header_end + HEADER_TERMINATOR.len();

        let (content_length, header_error) = match parse_headers(&src[..header_end]) {
            Ok(length) => (length, None),
            Err(reason) => (None, Some(reason)),
        };

        let body_len = match content_length {
            Some(length) => {
                let total = body_start + length;
                if total > self.max_frame_bytes {
                    return Err(self.oversized());
                }
                if src.len() < total {
                    if !eof {
                        src.reserve(total - src.len());
                        return Ok(None);
                    }
                    src.len() - body_start
                } else {
                    length
                }
            }
            // no usable length: the body runs to the next newline
            None => match self.line_len(src, body_start, eof)? {
                Some(len) => len,
                None => return Ok(None),
            },
        };

        let mut frame = src.split_to(body_start + body_len);
        frame.advance(body_start);
        Ok(Some(TelemetryFrame {
            body: trim_ascii(frame.freeze()),
            http: true,
            header_error,
        }))
    }

    fn decode_frame(
        &self,
        src: &mut BytesMut,
        eof: bool,
    ) -> Result<Option<TelemetryFrame>, FrameError> {
        let leading = src
            .iter()
            .take_while(|b| b.is_ascii_whitespace())
            .count();
        src.advance(leading);
        if src.is_empty() {
            return Ok(None);
        }

        if starts_like_http(src) {
            self.decode_http(src, eof)
        } else {
            self.decode_line(src, eof)
        }
    }
}

impl Decoder for TelemetryFrameCodec {
    type Item = TelemetryFrame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.decode_frame(src, false)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.decode_frame(src, true)
    }
}

impl Encoder<FrameAck> for TelemetryFrameCodec {
    type Error = FrameError;

    fn encode(&mut self, item: FrameAck, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            FrameAck::HttpOk => {
                dst.extend_from_slice(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n");
            }
        }
        Ok(())
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn trim_ascii(bytes: Bytes) -> Bytes {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    bytes.slice(start..end)
}

/// An uppercase method token followed by a space, e.g. `POST /`
fn starts_like_http(src: &[u8]) -> bool {
    let method_len = src.iter().take_while(|b| b.is_ascii_uppercase()).count();
    method_len > 0 && src.get(method_len) == Some(&b' ')
}

/// `Content-Length` of a header block, if present
fn parse_headers(block: &[u8]) -> Result<Option<usize>, String> {
    let headers = std::str::from_utf8(block).map_err(|_| "headers are not UTF-8".to_string())?;
    for line in headers.split("\r\n").skip(1) {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        if name.trim().eq_ignore_ascii_case("content-length") {
            return value
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| format!("invalid Content-Length: {}", value.trim()));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> TelemetryFrameCodec {
        TelemetryFrameCodec::new(1024)
    }

    #[test]
    fn test_json_lines() {
        let mut buf = BytesMut::from(&b"{\"a\":1}\r\n{\"b\":2}\n{\"c\""[..]);
        let mut codec = codec();

        let first = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(first.body, Bytes::from_static(b"{\"a\":1}"));
        assert!(!first.http);
        let second = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(second.body, Bytes::from_static(b"{\"b\":2}"));
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b":3}\n");
        let third = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(third.body, Bytes::from_static(b"{\"c\":3}"));
    }

    #[test]
    fn test_http_with_content_length_waits_for_body() {
        let body = b"{\"device_id\":\"imei-001\"}";
        let request = format!(
            "POST /track HTTP/1.1\r\nHost: gw\r\ncontent-length: {}\r\n\r\n",
            body.len()
        );
        let mut buf = BytesMut::from(request.as_bytes());
        let mut codec = codec();

        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(&body[..5]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(&body[5..]);

        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert!(frame.http);
        assert_eq!(frame.body, Bytes::from_static(body));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_back_to_back_http_requests() {
        let one = "POST / HTTP/1.1\r\nContent-Length: 7\r\n\r\n{\"a\":1}";
        let two = "POST / HTTP/1.1\r\nContent-Length: 7\r\n\r\n{\"b\":2}";
        let mut buf = BytesMut::from(format!("{}{}", one, two).as_bytes());
        let mut codec = codec();

        assert_eq!(
            codec.decode(&mut buf).unwrap().unwrap().body,
            Bytes::from_static(b"{\"a\":1}")
        );
        assert_eq!(
            codec.decode(&mut buf).unwrap().unwrap().body,
            Bytes::from_static(b"{\"b\":2}")
        );
    }

    #[test]
    fn test_http_without_length_waits_for_newline() {
        let mut buf = BytesMut::from(&b"POST / HTTP/1.1\r\nHost: gw\r\n\r\n{\"a\":"[..]);
        let mut codec = codec();
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"1}\n");
        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert!(frame.http);
        assert!(frame.header_error.is_none());
        assert_eq!(frame.body, Bytes::from_static(b"{\"a\":1}"));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_http_without_length_takes_rest_at_eof() {
        let mut buf = BytesMut::from(&b"POST / HTTP/1.1\r\nHost: gw\r\n\r\n{\"a\":1}"[..]);
        let mut codec = codec();
        assert!(codec.decode(&mut buf).unwrap().is_none());
        let frame = codec.decode_eof(&mut buf).unwrap().unwrap();
        assert!(frame.http);
        assert_eq!(frame.body, Bytes::from_static(b"{\"a\":1}"));
    }

    #[test]
    fn test_oversized_line_is_rejected() {
        let mut buf = BytesMut::from(vec![b'x'; 2048].as_slice());
        assert!(matches!(
            codec().decode(&mut buf),
            Err(FrameError::Oversized { max: 1024 })
        ));
    }

    #[test]
    fn test_oversized_content_length_is_rejected() {
        let mut buf = BytesMut::from(&b"POST / HTTP/1.1\r\nContent-Length: 999999\r\n\r\n"[..]);
        assert!(matches!(
            codec().decode(&mut buf),
            Err(FrameError::Oversized { .. })
        ));
    }

    #[test]
    fn test_bad_content_length_yields_flagged_frame_and_resyncs() {
        let mut buf = BytesMut::from(
            &b"POST / HTTP/1.1\r\nContent-Length: ten\r\n\r\n{}\n{\"a\":1}\n"[..],
        );
        let mut codec = codec();

        let bad = codec.decode(&mut buf).unwrap().unwrap();
        assert!(bad.http);
        assert_eq!(bad.header_error.as_deref(), Some("invalid Content-Length: ten"));
        assert_eq!(bad.body, Bytes::from_static(b"{}"));

        let next = codec.decode(&mut buf).unwrap().unwrap();
        assert!(!next.http);
        assert!(next.header_error.is_none());
        assert_eq!(next.body, Bytes::from_static(b"{\"a\":1}"));
    }

    #[test]
    fn test_non_utf8_headers_yield_flagged_frame() {
        let mut buf = BytesMut::from(&b"POST / HTTP/1.1\r\nX-Id: \xff\xfe\r\n\r\n{}\n"[..]);
        let frame = codec().decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame.header_error.as_deref(), Some("headers are not UTF-8"));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_eof_flushes_unterminated_record() {
        let mut buf = BytesMut::from(&b"{\"a\":1}"[..]);
        let mut codec = codec();
        assert!(codec.decode(&mut buf).unwrap().is_none());
        let frame = codec.decode_eof(&mut buf).unwrap().unwrap();
        assert_eq!(frame.body, Bytes::from_static(b"{\"a\":1}"));
        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_http_ack_encoding() {
        let mut dst = BytesMut::new();
        codec().encode(FrameAck::HttpOk, &mut dst).unwrap();
        assert_eq!(&dst[..], b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n");
    }
}
