//! Event socket framing
//!
//! Every message on the socket is a block of `Name: value` header lines
//! terminated by an empty line. When a `Content-Length` header is present,
//! exactly that many body bytes follow the blank line.
//!
//! # Format
//! ```text
//! Content-Type: api/response
//! Content-Length: 41
//!
//! +OK 1234abcd-12ab-34cd-56ef-1234567890ab
//! ```

use crate::error::ParseError;
use crate::event::Event;
use crate::headers::Headers;

/// Largest body accepted from the switch
pub const MAX_BODY_LEN: usize = 8 * 1024 * 1024;

/// Header naming the frame class
pub const CONTENT_TYPE: &str = "Content-Type";
/// Header giving the body length in bytes
pub const CONTENT_LENGTH: &str = "Content-Length";
/// Header carrying the result of a non-api command
pub const REPLY_TEXT: &str = "Reply-Text";

/// Frame classes distinguished by `Content-Type`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentType {
    /// Server asks the client to authenticate
    AuthRequest,
    /// Result of a plain command (`auth`, `event`, ...)
    CommandReply,
    /// Result of an `api` command, carried in the body
    ApiResponse,
    /// Event encoded as JSON
    EventJson,
    /// Event encoded as percent-encoded header lines
    EventPlain,
    /// Server is closing the connection
    DisconnectNotice,
    /// Anything else
    Other(String),
}

impl ContentType {
    /// Parse a `Content-Type` header value
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "auth/request" => Self::AuthRequest,
            "command/reply" => Self::CommandReply,
            "api/response" => Self::ApiResponse,
            "text/event-json" => Self::EventJson,
            "text/event-plain" => Self::EventPlain,
            "text/disconnect-notice" => Self::DisconnectNotice,
            other => Self::Other(other.to_string()),
        }
    }

    /// Header value for this content type
    pub fn as_str(&self) -> &str {
        match self {
            Self::AuthRequest => "auth/request",
            Self::CommandReply => "command/reply",
            Self::ApiResponse => "api/response",
            Self::EventJson => "text/event-json",
            Self::EventPlain => "text/event-plain",
            Self::DisconnectNotice => "text/disconnect-notice",
            Self::Other(s) => s,
        }
    }
}

/// One raw frame: headers plus optional body
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    /// Frame headers
    pub headers: Headers,
    /// Body text, if `Content-Length` was present
    pub body: Option<String>,
}

impl Frame {
    /// Build a frame of the given type with an optional body
    ///
    /// `Content-Length` is filled in from the body.
    pub fn new(content_type: ContentType, body: Option<String>) -> Self {
        let mut headers = Headers::new();
        headers.insert(CONTENT_TYPE, content_type.as_str());
        if let Some(body) = &body {
            headers.insert(CONTENT_LENGTH, body.len().to_string());
        }
        Self { headers, body }
    }

    /// Build a `command/reply` frame with the given reply text
    pub fn command_reply(reply_text: impl Into<String>) -> Self {
        let mut frame = Self::new(ContentType::CommandReply, None);
        frame.headers.insert(REPLY_TEXT, reply_text);
        frame
    }

    /// The frame's content type, if the header is present
    pub fn content_type(&self) -> Option<ContentType> {
        self.headers.get(CONTENT_TYPE).map(ContentType::parse)
    }

    /// Encode to wire bytes
    pub fn encode(&self) -> Vec<u8> {
        let mut out = String::new();
        for (name, value) in self.headers.iter() {
            out.push_str(name);
            out.push_str(": ");
            out.push_str(value);
            out.push('\n');
        }
        out.push('\n');
        if let Some(body) = &self.body {
            out.push_str(body);
        }
        out.into_bytes()
    }
}

/// Classified frame, as consumed by a client connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Server wants `auth <password>`
    AuthRequest,
    /// Reply to a plain command (the `Reply-Text` header)
    CommandReply(String),
    /// Reply to an `api` command (the body)
    ApiResponse(String),
    /// Asynchronous event
    Event(Event),
    /// Server is closing the connection
    Disconnect,
    /// Frame of a type we do not handle
    Unknown(Frame),
}

impl Message {
    /// Classify a frame by its content type, decoding event bodies
    pub fn from_frame(frame: Frame) -> Result<Self, ParseError> {
        let Some(content_type) = frame.content_type() else {
            return Ok(Self::Unknown(frame));
        };

        match content_type {
            ContentType::AuthRequest => Ok(Self::AuthRequest),
            ContentType::CommandReply => Ok(Self::CommandReply(
                frame.headers.get(REPLY_TEXT).unwrap_or_default().to_string(),
            )),
            ContentType::ApiResponse => Ok(Self::ApiResponse(frame.body.unwrap_or_default())),
            ContentType::EventJson => {
                Event::from_json(frame.body.as_deref().unwrap_or_default()).map(Self::Event)
            }
            ContentType::EventPlain => {
                Event::from_plain(frame.body.as_deref().unwrap_or_default()).map(Self::Event)
            }
            ContentType::DisconnectNotice => Ok(Self::Disconnect),
            ContentType::Other(kind) => {
                tracing::debug!("Unhandled frame content type: {}", kind);
                Ok(Self::Unknown(frame))
            }
        }
    }
}

/// Encode a command line for the wire (`<text>\n\n`)
pub fn encode_command(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len() + 2);
    out.extend_from_slice(text.as_bytes());
    out.extend_from_slice(b"\n\n");
    out
}

/// Streaming frame codec
///
/// Bytes are pushed as they arrive from the socket; complete frames are
/// pulled out with [`FrameCodec::next_frame`]. Partial frames stay buffered.
#[derive(Debug, Default)]
pub struct FrameCodec {
    buffer: Vec<u8>,
    /// Body bytes of an oversized frame still to be thrown away
    discard: usize,
    /// Set once frame boundaries can no longer be found
    failed: Option<ParseError>,
}

impl FrameCodec {
    /// Create a new codec
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(4096),
            ..Default::default()
        }
    }

    /// Push raw bytes into the codec buffer
    pub fn push_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Number of buffered bytes not yet consumed
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Try to extract the next command sent by a client (server side)
    ///
    /// Commands are a single line followed by a blank line. Returns the line
    /// without its terminator.
    pub fn next_command_line(&mut self) -> Option<String> {
        let end = self.buffer.windows(2).position(|w| w == b"\n\n")?;
        let raw: Vec<u8> = self.buffer.drain(..end + 2).take(end).collect();
        let line = String::from_utf8_lossy(&raw);
        Some(line.trim().to_string())
    }

    /// Try to extract the next complete frame
    ///
    /// Returns `None` when more data is needed.
    ///
    /// A frame whose body is larger than [`MAX_BODY_LEN`] is reported once and
    /// its body is skipped as it arrives. A header block that cannot be parsed
    /// leaves the next frame boundary unknown, so the codec stops there and
    /// keeps returning that error.
    pub fn next_frame(&mut self) -> Option<Result<Frame, ParseError>> {
        if let Some(e) = &self.failed {
            return Some(Err(e.clone()));
        }

        if self.discard > 0 {
            let n = self.discard.min(self.buffer.len());
            self.buffer.drain(..n);
            self.discard -= n;
            if self.discard > 0 {
                return None;
            }
        }

        // Blank lines between frames carry no information
        let leading = self
            .buffer
            .iter()
            .take_while(|&&b| b == b'\n' || b == b'\r')
            .count();
        if leading > 0 {
            self.buffer.drain(..leading);
        }

        let header_end = self.buffer.windows(2).position(|w| w == b"\n\n")?;
        let body_start = header_end + 2;

        let headers = match parse_headers(&self.buffer[..header_end]) {
            Ok(headers) => headers,
            Err(e) => return Some(Err(self.fail(e))),
        };

        let body_len = match headers.get(CONTENT_LENGTH) {
            None => None,
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(len) if len > MAX_BODY_LEN => {
                    let available = len.min(self.buffer.len() - body_start);
                    self.buffer.drain(..body_start + available);
                    self.discard = len - available;
                    return Some(Err(ParseError::FrameTooLarge {
                        size: len,
                        max: MAX_BODY_LEN,
                    }));
                }
                Ok(len) => Some(len),
                Err(_) => {
                    let e = ParseError::InvalidContentLength(raw.to_string());
                    return Some(Err(self.fail(e)));
                }
            },
        };

        let Some(len) = body_len else {
            self.buffer.drain(..body_start);
            return Some(Ok(Frame {
                headers,
                body: None,
            }));
        };

        if self.buffer.len() < body_start + len {
            return None;
        }

        let raw: Vec<u8> = self.buffer.drain(..body_start + len).skip(body_start).collect();
        let body = match String::from_utf8(raw) {
            Ok(body) => body,
            Err(_) => return Some(Err(ParseError::InvalidUtf8)),
        };

        Some(Ok(Frame {
            headers,
            body: Some(body),
        }))
    }

    fn fail(&mut self, e: ParseError) -> ParseError {
        self.buffer.clear();
        self.failed = Some(e.clone());
        e
    }
}

fn parse_headers(block: &[u8]) -> Result<Headers, ParseError> {
    let text = std::str::from_utf8(block).map_err(|_| ParseError::InvalidUtf8)?;
    let mut headers = Headers::new();
    for line in text.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| ParseError::MalformedHeader(line.to_string()))?;
        headers.insert(name.trim(), value.trim());
    }
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_auth_request() {
        let mut codec = FrameCodec::new();
        codec.push_bytes(b"Content-Type: auth/request\n\n");

        let frame = codec.next_frame().unwrap().unwrap();
        assert_eq!(frame.content_type(), Some(ContentType::AuthRequest));
        assert_eq!(frame.body, None);
        assert_eq!(codec.buffered(), 0);
    }

    #[test]
    fn test_parse_api_response_with_body() {
        let body = "+OK 1234abcd-12ab-34cd-56ef-1234567890ab\n";
        let wire = format!(
            "Content-Type: api/response\nContent-Length: {}\n\n{}",
            body.len(),
            body
        );
        let mut codec = FrameCodec::new();
        codec.push_bytes(wire.as_bytes());

        let frame = codec.next_frame().unwrap().unwrap();
        assert_eq!(frame.body.as_deref(), Some(body));
        assert_eq!(
            Message::from_frame(frame).unwrap(),
            Message::ApiResponse(body.to_string())
        );
    }

    #[test]
    fn test_streaming_parse_waits_for_body() {
        let mut codec = FrameCodec::new();
        codec.push_bytes(b"Content-Type: api/response\nContent-Len");
        assert!(codec.next_frame().is_none());

        codec.push_bytes(b"gth: 3\n\n+O");
        assert!(codec.next_frame().is_none());

        codec.push_bytes(b"K");
        let frame = codec.next_frame().unwrap().unwrap();
        assert_eq!(frame.body.as_deref(), Some("+OK"));
    }

    #[test]
    fn test_back_to_back_frames() {
        let mut codec = FrameCodec::new();
        codec.push_bytes(
            b"Content-Type: command/reply\nReply-Text: +OK accepted\n\nContent-Type: text/disconnect-notice\nContent-Length: 3\n\nbye",
        );

        let first = Message::from_frame(codec.next_frame().unwrap().unwrap()).unwrap();
        assert_eq!(first, Message::CommandReply("+OK accepted".to_string()));

        let second = Message::from_frame(codec.next_frame().unwrap().unwrap()).unwrap();
        assert_eq!(second, Message::Disconnect);

        assert!(codec.next_frame().is_none());
    }

    #[test]
    fn test_json_event_frame() {
        let body = r#"{"Event-Name":"PLAYBACK_START","Unique-ID":"abc"}"#;
        let frame = Frame::new(ContentType::EventJson, Some(body.to_string()));

        let mut codec = FrameCodec::new();
        codec.push_bytes(&frame.encode());

        let message = Message::from_frame(codec.next_frame().unwrap().unwrap()).unwrap();
        let Message::Event(event) = message else {
            panic!("Expected event message");
        };
        assert_eq!(event.name(), Some("PLAYBACK_START"));
        assert_eq!(event.call_id(), Some("abc"));
    }

    #[test]
    fn test_malformed_header_stops_the_codec() {
        let mut codec = FrameCodec::new();
        codec.push_bytes(b"garbage without colon\n\nContent-Type: auth/request\n\n");

        let err = ParseError::MalformedHeader("garbage without colon".to_string());
        assert_eq!(codec.next_frame(), Some(Err(err.clone())));
        assert_eq!(codec.next_frame(), Some(Err(err)));
        assert_eq!(codec.buffered(), 0);
    }

    #[test]
    fn test_bad_content_length_does_not_leak_body() {
        let mut codec = FrameCodec::new();
        codec.push_bytes(b"Content-Type: api/response\nContent-Length: ten\n\nhello\n\n");
        codec.push_bytes(b"Content-Type: api/response\nContent-Length: 3\n\n+OK");

        let err = ParseError::InvalidContentLength("ten".to_string());
        assert_eq!(codec.next_frame(), Some(Err(err.clone())));

        // The body's length is unknown, so nothing after it can be trusted
        codec.push_bytes(b"Content-Type: auth/request\n\n");
        assert_eq!(codec.next_frame(), Some(Err(err)));
    }

    #[test]
    fn test_oversized_body_is_skipped() {
        let size = MAX_BODY_LEN + 10;
        let mut codec = FrameCodec::new();
        let header = format!("Content-Type: api/response\nContent-Length: {}\n\n", size);
        codec.push_bytes(header.as_bytes());
        codec.push_bytes(&[b'x'; 4]);

        assert_eq!(
            codec.next_frame(),
            Some(Err(ParseError::FrameTooLarge {
                size,
                max: MAX_BODY_LEN
            }))
        );
        assert_eq!(codec.buffered(), 0);

        // The rest of the body arrives split, followed by a real frame
        codec.push_bytes(&vec![b'x'; size - 8]);
        assert!(codec.next_frame().is_none());
        codec.push_bytes(b"xxxxContent-Type: command/reply\nReply-Text: +OK\n\n");

        let frame = codec.next_frame().unwrap().unwrap();
        assert_eq!(
            Message::from_frame(frame).unwrap(),
            Message::CommandReply("+OK".to_string())
        );
        assert!(codec.next_frame().is_none());
    }

    #[test]
    fn test_unknown_content_type() {
        let frame = Frame::new(ContentType::parse("log/data"), Some("x".to_string()));
        assert!(matches!(Message::from_frame(frame), Ok(Message::Unknown(_))));
    }

    #[test]
    fn test_encode_command() {
        assert_eq!(encode_command("event json ALL"), b"event json ALL\n\n");
    }

    #[test]
    fn test_next_command_line() {
        let mut codec = FrameCodec::new();
        codec.push_bytes(b"auth ClueCon\n\napi originate sofia/external/sip:1000@10.0.0.1 &pa");

        assert_eq!(codec.next_command_line().as_deref(), Some("auth ClueCon"));
        assert_eq!(codec.next_command_line(), None);

        codec.push_bytes(b"rk\n\n");
        assert_eq!(
            codec.next_command_line().as_deref(),
            Some("api originate sofia/external/sip:1000@10.0.0.1 &park")
        );
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        fn wire() -> Vec<u8> {
            let mut out = Vec::new();
            out.extend(Frame::new(ContentType::AuthRequest, None).encode());
            out.extend(Frame::command_reply("+OK accepted").encode());
            out.extend(
                Frame::new(
                    ContentType::EventJson,
                    Some(r#"{"Event-Name":"CHANNEL_ANSWER","Unique-ID":"abc"}"#.to_string()),
                )
                .encode(),
            );
            out.extend(Frame::new(ContentType::ApiResponse, Some("+OK\n\n".to_string())).encode());
            out
        }

        fn decode_in_chunks(data: &[u8], chunk: usize) -> Vec<Frame> {
            let mut codec = FrameCodec::new();
            let mut frames = Vec::new();
            for piece in data.chunks(chunk) {
                codec.push_bytes(piece);
                while let Some(frame) = codec.next_frame() {
                    frames.push(frame.unwrap());
                }
            }
            frames
        }

        proptest! {
            #[test]
            fn chunking_does_not_change_frames(chunk in 1usize..64) {
                let data = wire();
                let whole = decode_in_chunks(&data, data.len());
                let pieces = decode_in_chunks(&data, chunk);

                prop_assert_eq!(whole.len(), 4);
                prop_assert_eq!(pieces, whole);
            }
        }
    }
}
