//! Commands sent to the switch
//!
//! The switch's control language is line based. `api` commands run
//! synchronously and answer with an `api/response` body; the others answer
//! with a `command/reply` header.
//!
//! # Commands
//! - `auth <password>` - authenticate the socket
//! - `event json ALL` - subscribe to every event class
//! - `api originate sofia/external/sip:<destination> &park` - dial and park
//! - `api uuid_broadcast <uuid> <file> aleg` - play audio on a leg
//! - `api sched_hangup +<secs> <uuid>` - hang up after a delay

use std::fmt;

use crate::error::ParseError;

/// SIP profile and scheme used when dialing out
pub const ORIGINATE_PREFIX: &str = "sofia/external/sip:";

/// Event encoding requested when subscribing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventFormat {
    /// `text/event-json`
    #[default]
    Json,
    /// `text/event-plain`
    Plain,
}

impl EventFormat {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Plain => "plain",
        }
    }
}

/// A command understood by the switch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Authenticate: `auth ClueCon`
    Auth { password: String },
    /// Subscribe to all events: `event json ALL`
    Subscribe { format: EventFormat },
    /// Dial out and park the new channel
    Originate { destination: String },
    /// Play an audio file on a channel's originated leg
    Broadcast {
        call_id: String,
        audio_file: String,
    },
    /// Hang a channel up after `delay_secs`
    ScheduleHangup { call_id: String, delay_secs: u32 },
}

impl Command {
    /// Whether this is an `api` command (answered in a body, not a header)
    pub fn is_api(&self) -> bool {
        matches!(
            self,
            Self::Originate { .. } | Self::Broadcast { .. } | Self::ScheduleHangup { .. }
        )
    }

    /// Encode to the command line sent on the socket
    pub fn encode(&self) -> String {
        match self {
            Self::Auth { password } => format!("auth {}", password),
            Self::Subscribe { format } => format!("event {} ALL", format.as_str()),
            Self::Originate { destination } => {
                format!("api originate {}{} &park", ORIGINATE_PREFIX, destination)
            }
            Self::Broadcast {
                call_id,
                audio_file,
            } => format!("api uuid_broadcast {} {} aleg", call_id, audio_file),
            Self::ScheduleHangup {
                call_id,
                delay_secs,
            } => format!("api sched_hangup +{} {}", delay_secs, call_id),
        }
    }

    /// Parse a command line (the inverse of [`Command::encode`])
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let unknown = || ParseError::UnknownCommand(line.to_string());
        let words: Vec<&str> = line.split_whitespace().collect();

        match words.as_slice() {
            ["auth", password] => Ok(Self::Auth {
                password: password.to_string(),
            }),
            ["event", format, "ALL"] => {
                let format = match *format {
                    "json" => EventFormat::Json,
                    "plain" => EventFormat::Plain,
                    _ => return Err(unknown()),
                };
                Ok(Self::Subscribe { format })
            }
            ["api", "originate", target, "&park"] => {
                let destination = target.strip_prefix(ORIGINATE_PREFIX).ok_or_else(unknown)?;
                Ok(Self::Originate {
                    destination: destination.to_string(),
                })
            }
            ["api", "uuid_broadcast", call_id, audio_file, "aleg"] => Ok(Self::Broadcast {
                call_id: call_id.to_string(),
                audio_file: audio_file.to_string(),
            }),
            ["api", "sched_hangup", delay, call_id] => {
                let delay_secs = delay
                    .strip_prefix('+')
                    .and_then(|d| d.parse().ok())
                    .ok_or_else(unknown)?;
                Ok(Self::ScheduleHangup {
                    call_id: call_id.to_string(),
                    delay_secs,
                })
            }
            _ => Err(unknown()),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Keep the password out of logs
            Self::Auth { .. } => f.write_str("auth ********"),
            other => f.write_str(&other.encode()),
        }
    }
}
