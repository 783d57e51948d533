//! Error types for event socket parsing and reply validation

use thiserror::Error;

/// Errors that can occur while parsing protocol data
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Header line without a `:` separator
    #[error("malformed header line: {0}")]
    MalformedHeader(String),

    /// `Content-Length` header that is not a number
    #[error("invalid content length: {0}")]
    InvalidContentLength(String),

    /// Frame body is not valid UTF-8
    #[error("frame body is not valid UTF-8")]
    InvalidUtf8,

    /// Event body could not be decoded as JSON
    #[error("invalid event JSON: {0}")]
    InvalidJson(String),

    /// Event JSON was valid but not an object
    #[error("event JSON is not an object")]
    NotAnObject,

    /// Command line not understood
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// Frame exceeds the maximum accepted size
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },
}

/// Higher-level protocol errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Reply did not start with `+OK`
    #[error("body of api response did not start with +OK: {0:?}")]
    NotOk(String),

    /// Reply was `+OK` but carried no call identifier
    #[error("no call identifier in reply: {0:?}")]
    MissingCallId(String),
}
