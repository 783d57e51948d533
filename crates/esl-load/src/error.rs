//! Error types for the load engine

use esl_protocol::ParseError;
use thiserror::Error;

use crate::call::CallId;

/// Failures of the switch connection
#[derive(Debug, Error)]
pub enum TransportError {
    /// Socket I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The switch sent something we could not parse
    #[error("protocol error: {0}")]
    Parse(#[from] ParseError),

    /// The switch refused our password
    #[error("authentication rejected: {0}")]
    AuthRejected(String),

    /// Something other than the expected handshake frame arrived
    #[error("unexpected frame during handshake: {0}")]
    Handshake(String),

    /// The connection is gone
    #[error("connection closed by switch")]
    Closed,
}

/// Errors that abort a load test run
#[derive(Debug, Error)]
pub enum LoadError {
    /// Transport failure (connect, read, or command round-trip)
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A command reply did not start with `+OK`
    #[error("command `{command}` rejected: {reply}")]
    CommandRejected {
        /// The command line that was sent
        command: String,
        /// The reply text
        reply: String,
    },

    /// An originate reply was `+OK` but carried no call identifier
    #[error("originate reply carried no call identifier: {0}")]
    MissingCallId(String),

    /// The switch handed out an identifier that was already used this run
    #[error("call identifier reused: {0}")]
    DuplicateCall(CallId),

    /// The event producer stopped without reporting an error
    #[error("event stream closed")]
    EventStreamClosed,

    /// Configuration failed validation
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
