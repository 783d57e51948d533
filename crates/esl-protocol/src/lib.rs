//! Event Socket Protocol Library
//!
//! This crate provides parsing and encoding for the text protocol spoken on a
//! telephony switch's event socket (FreeSWITCH `mod_event_socket` style):
//!
//! - **Framing**: header blocks terminated by a blank line, with an optional
//!   `Content-Length` body
//! - **Events**: flat name/value records delivered as JSON or plain text
//! - **Replies**: `+OK`/`-ERR` validation and call identifier extraction
//! - **Commands**: the handful of control commands a call load test needs
//!
//! # Example
//!
//! ```rust
//! use esl_protocol::{FrameCodec, Message, parse_originate_reply};
//!
//! let mut codec = FrameCodec::new();
//! codec.push_bytes(b"Content-Type: api/response\nContent-Length: 40\n\n");
//! codec.push_bytes(b"+OK 1234abcd-12ab-34cd-56ef-1234567890ab");
//!
//! let frame = codec.next_frame().unwrap().unwrap();
//! if let Message::ApiResponse(body) = Message::from_frame(frame).unwrap() {
//!     assert_eq!(
//!         parse_originate_reply(&body).unwrap(),
//!         "1234abcd-12ab-34cd-56ef-1234567890ab"
//!     );
//! }
//! ```

pub mod command;
pub mod error;
pub mod event;
pub mod frame;
pub mod headers;
pub mod reply;

pub use command::{Command, EventFormat};
pub use error::{ParseError, ProtocolError};
pub use event::{Event, ANSWER_STATE, CHANNEL_STATE, EVENT_NAME, UNIQUE_ID};
pub use frame::{encode_command, ContentType, Frame, FrameCodec, Message};
pub use headers::Headers;
pub use reply::{expect_ok, find_call_id, is_ok, parse_originate_reply, OK_PREFIX};
