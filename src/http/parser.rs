//! Incremental HTTP/1.1 message parsing
//!
//! [`MessageParser`] consumes plaintext in whatever chunks the transport
//! delivers and raises structured events on a [`ParseSink`]: message begin,
//! headers complete, body chunk, message complete. Body bytes are handed to
//! the sink per arriving segment, never buffered into one contiguous
//! callback, and the parser resets itself after each complete message so a
//! keep-alive connection can carry many messages through one instance.

use super::{Error, Headers, Method, Result, Status, Version, MAX_WIRE_LEN};
use bytes::BytesMut;

/// Which message direction the parser expects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Parse requests (server side)
    Request,
    /// Parse responses (client side)
    Response,
}

/// Parsed start line of a message
#[derive(Debug, Clone)]
pub enum MessageHead {
    Request {
        method: Method,
        path: String,
        version: Version,
    },
    Response {
        version: Version,
        status: Status,
        reason: String,
    },
}

/// Receiver for parse events
///
/// All methods default to no-ops so a sink only implements what it needs.
pub trait ParseSink {
    fn on_message_begin(&mut self) {}
    fn on_headers_complete(&mut self, _head: &MessageHead, _headers: &Headers) {}
    fn on_body_chunk(&mut self, _chunk: &[u8]) {}
    fn on_message_complete(&mut self) {}
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum State {
    StartLine,
    Headers,
    Body { remaining: usize },
}

/// Parse an HTTP request line
///
/// Format: `METHOD PATH VERSION`, e.g. `GET /hello HTTP/1.1`
pub fn parse_request_line(line: &str) -> Result<MessageHead> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() != 3 {
        return Err(Error::Parse(format!(
            "invalid request line: expected 3 parts, got {}",
            parts.len()
        )));
    }
    Ok(MessageHead::Request {
        method: Method::from_str(parts[0])?,
        path: parts[1].to_string(),
        version: Version::from_str(parts[2])?,
    })
}

/// Parse an HTTP response status line
///
/// Format: `VERSION STATUS REASON`, e.g. `HTTP/1.1 200 OK`
pub fn parse_status_line(line: &str) -> Result<MessageHead> {
    let parts: Vec<&str> = line.splitn(3, ' ').collect();
    if parts.len() < 2 {
        return Err(Error::Parse(format!("invalid status line: {}", line)));
    }
    let version = Version::from_str(parts[0])?;
    let code = parts[1]
        .parse::<u16>()
        .map_err(|_| Error::Parse(format!("invalid status code: {}", parts[1])))?;
    let status = Status::new(code)?;
    let reason = if parts.len() == 3 {
        parts[2].to_string()
    } else {
        status.reason_phrase().to_string()
    };
    Ok(MessageHead::Response {
        version,
        status,
        reason,
    })
}

/// Incremental HTTP message parser
pub struct MessageParser {
    direction: Direction,
    state: State,
    buffer: BytesMut,
    head: Option<MessageHead>,
    headers: Headers,
}

impl MessageParser {
    /// Create a parser for the given message direction
    pub fn new(direction: Direction) -> Self {
        MessageParser {
            direction,
            state: State::StartLine,
            buffer: BytesMut::new(),
            head: None,
            headers: Headers::new(),
        }
    }

    /// Feed a chunk of plaintext to the parser
    ///
    /// Raises sink events for everything that became parseable; returns an
    /// error on malformed input, after which the parser must be discarded.
    pub fn feed(&mut self, data: &[u8], sink: &mut dyn ParseSink) -> Result<()> {
        self.buffer.extend_from_slice(data);

        loop {
            match self.state {
                State::StartLine => {
                    let line = match self.take_line()? {
                        Some(line) => line,
                        None => return Ok(()),
                    };
                    // Tolerate stray CRLFs between messages.
                    if line.is_empty() {
                        continue;
                    }
                    sink.on_message_begin();
                    let head = match self.direction {
                        Direction::Request => parse_request_line(&line)?,
                        Direction::Response => parse_status_line(&line)?,
                    };
                    self.head = Some(head);
                    self.state = State::Headers;
                }
                State::Headers => {
                    let line = match self.take_line()? {
                        Some(line) => line,
                        None => return Ok(()),
                    };
                    if !line.is_empty() {
                        let (name, value) = Headers::parse_header_line(&line)?;
                        self.headers.insert(name, value);
                        continue;
                    }
                    // Empty line terminates the header block.
                    let remaining = self.content_length()?;
                    if let Some(head) = self.head.as_ref() {
                        sink.on_headers_complete(head, &self.headers);
                    }
                    if remaining == 0 {
                        sink.on_message_complete();
                        self.reset();
                    } else {
                        self.state = State::Body { remaining };
                    }
                }
                State::Body { remaining } => {
                    if self.buffer.is_empty() {
                        return Ok(());
                    }
                    let take = remaining.min(self.buffer.len());
                    let chunk = self.buffer.split_to(take);
                    sink.on_body_chunk(&chunk);
                    if remaining == take {
                        sink.on_message_complete();
                        self.reset();
                    } else {
                        self.state = State::Body {
                            remaining: remaining - take,
                        };
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Take one CRLF-terminated line off the buffer
    fn take_line(&mut self) -> Result<Option<String>> {
        match self.buffer.windows(2).position(|w| w == b"\r\n") {
            Some(pos) => {
                let line = String::from_utf8_lossy(&self.buffer[..pos]).to_string();
                let _ = self.buffer.split_to(pos + 2);
                Ok(Some(line))
            }
            None if self.buffer.len() > MAX_WIRE_LEN => Err(Error::Parse(
                "start line or header line exceeds the wire buffer".to_string(),
            )),
            None => Ok(None),
        }
    }

    fn content_length(&self) -> Result<usize> {
        match self.headers.get("Content-Length") {
            Some(v) => v
                .trim()
                .parse::<usize>()
                .map_err(|_| Error::Parse(format!("invalid Content-Length: {}", v))),
            None => Ok(0),
        }
    }

    fn reset(&mut self) {
        self.state = State::StartLine;
        self.head = None;
        self.headers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{build_request, build_response};

    /// Sink that records everything it sees
    #[derive(Default)]
    struct Recorder {
        begun: usize,
        heads: Vec<MessageHead>,
        content_lengths: Vec<Option<String>>,
        body: Vec<u8>,
        chunks: usize,
        complete: usize,
    }

    impl ParseSink for Recorder {
        fn on_message_begin(&mut self) {
            self.begun += 1;
        }
        fn on_headers_complete(&mut self, head: &MessageHead, headers: &Headers) {
            self.heads.push(head.clone());
            self.content_lengths
                .push(headers.get("Content-Length").map(str::to_string));
        }
        fn on_body_chunk(&mut self, chunk: &[u8]) {
            self.body.extend_from_slice(chunk);
            self.chunks += 1;
        }
        fn on_message_complete(&mut self) {
            self.complete += 1;
        }
    }

    #[test]
    fn test_request_build_parse_round_trip() {
        let wire = build_request(Method::Post, "/submit", b"payload bytes").unwrap();
        let mut parser = MessageParser::new(Direction::Request);
        let mut rec = Recorder::default();

        parser.feed(&wire, &mut rec).unwrap();

        assert_eq!(rec.begun, 1);
        assert_eq!(rec.complete, 1);
        assert_eq!(rec.body, b"payload bytes");
        match &rec.heads[0] {
            MessageHead::Request {
                method,
                path,
                version,
            } => {
                assert_eq!(*method, Method::Post);
                assert_eq!(path, "/submit");
                assert_eq!(*version, Version::Http11);
            }
            other => panic!("expected request head, got {:?}", other),
        }
        assert_eq!(rec.content_lengths[0].as_deref(), Some("13"));
    }

    #[test]
    fn test_response_build_parse_round_trip() {
        let wire = build_response(Status::NOT_FOUND, "Not Found", b"missing").unwrap();
        let mut parser = MessageParser::new(Direction::Response);
        let mut rec = Recorder::default();

        parser.feed(&wire, &mut rec).unwrap();

        assert_eq!(rec.complete, 1);
        assert_eq!(rec.body, b"missing");
        match &rec.heads[0] {
            MessageHead::Response {
                status, reason, ..
            } => {
                assert_eq!(status.code(), 404);
                assert_eq!(reason, "Not Found");
            }
            other => panic!("expected response head, got {:?}", other),
        }
    }

    #[test]
    fn test_chunking_invariance() {
        let wire = build_request(Method::Put, "/data", b"0123456789abcdef").unwrap();

        // Deliver the same wire bytes in every chunk size from 1 to len.
        for size in 1..=wire.len() {
            let mut parser = MessageParser::new(Direction::Request);
            let mut rec = Recorder::default();
            for chunk in wire.chunks(size) {
                parser.feed(chunk, &mut rec).unwrap();
            }
            assert_eq!(rec.complete, 1, "chunk size {}", size);
            assert_eq!(rec.body, b"0123456789abcdef", "chunk size {}", size);
        }
    }

    #[test]
    fn test_body_split_yields_multiple_chunks() {
        let head = b"GET / HTTP/1.1\r\nContent-Length: 10\r\n\r\n";
        let mut parser = MessageParser::new(Direction::Request);
        let mut rec = Recorder::default();

        parser.feed(head, &mut rec).unwrap();
        parser.feed(b"01234", &mut rec).unwrap();
        parser.feed(b"56789", &mut rec).unwrap();

        assert_eq!(rec.chunks, 2);
        assert_eq!(rec.body, b"0123456789");
        assert_eq!(rec.complete, 1);
    }

    #[test]
    fn test_two_messages_back_to_back() {
        let mut wire = build_response(Status::OK, "OK", b"first").unwrap();
        wire.extend_from_slice(&build_response(Status::OK, "OK", b"second").unwrap());

        let mut parser = MessageParser::new(Direction::Response);
        let mut rec = Recorder::default();
        parser.feed(&wire, &mut rec).unwrap();

        assert_eq!(rec.begun, 2);
        assert_eq!(rec.complete, 2);
        assert_eq!(rec.body, b"firstsecond");
    }

    #[test]
    fn test_message_without_body() {
        let mut parser = MessageParser::new(Direction::Request);
        let mut rec = Recorder::default();
        parser
            .feed(b"DELETE /x HTTP/1.1\r\nHost: localhost\r\n\r\n", &mut rec)
            .unwrap();
        assert_eq!(rec.complete, 1);
        assert_eq!(rec.chunks, 0);
        assert!(rec.body.is_empty());
    }

    #[test]
    fn test_malformed_start_line() {
        let mut parser = MessageParser::new(Direction::Request);
        let mut rec = Recorder::default();
        let err = parser.feed(b"NOT-A-REQUEST\r\n", &mut rec).unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn test_invalid_content_length() {
        let mut parser = MessageParser::new(Direction::Request);
        let mut rec = Recorder::default();
        let err = parser
            .feed(b"GET / HTTP/1.1\r\nContent-Length: nope\r\n\r\n", &mut rec)
            .unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn test_unterminated_line_overflow() {
        let mut parser = MessageParser::new(Direction::Request);
        let mut rec = Recorder::default();
        let garbage = vec![b'a'; MAX_WIRE_LEN + 1];
        let err = parser.feed(&garbage, &mut rec).unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn test_parse_status_line_without_reason() {
        match parse_status_line("HTTP/1.0 404").unwrap() {
            MessageHead::Response {
                version,
                status,
                reason,
            } => {
                assert_eq!(version, Version::Http10);
                assert_eq!(status.code(), 404);
                assert_eq!(reason, "Not Found");
            }
            other => panic!("unexpected head: {:?}", other),
        }
    }
}
