//! Transport capabilities consumed by the load engine
//!
//! The engine needs exactly two things from a switch connection: a way to
//! send a command and wait for its reply, and a way to pull the next event.
//! They are separate traits so the event side can move into its own producer
//! task while the dispatch loop keeps the command side.

use async_trait::async_trait;
use esl_protocol::{expect_ok, Command, Event};

use crate::error::{LoadError, TransportError};

/// Request/reply half of a switch connection
#[async_trait]
pub trait CommandSender: Send {
    /// Send a command and wait for its reply text
    ///
    /// For `api` commands the reply is the response body; for other commands
    /// it is the `Reply-Text` header.
    async fn send_command(&mut self, command: &Command) -> Result<String, TransportError>;
}

/// Event half of a switch connection
#[async_trait]
pub trait EventSource: Send {
    /// Wait for the next event
    async fn next_event(&mut self) -> Result<Event, TransportError>;
}

/// Send a command and require a `+OK` reply
pub async fn send_checked<C>(commander: &mut C, command: &Command) -> Result<String, LoadError>
where
    C: CommandSender + ?Sized,
{
    let reply = commander.send_command(command).await?;
    match expect_ok(&reply) {
        Ok(_) => Ok(reply),
        Err(_) => Err(LoadError::CommandRejected {
            command: command.to_string(),
            reply: reply.trim_end().to_string(),
        }),
    }
}

