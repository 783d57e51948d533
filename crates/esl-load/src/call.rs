//! Per-call state machine
//!
//! Each outbound call walks `New → Playing → WaitingHangup → Done`, one event
//! at a time. Transitions are driven by a single field per state:
//!
//! | State         | Field            | Value            | Action               |
//! |---------------|------------------|------------------|----------------------|
//! | New           | `Answer-State`   | `answered`       | broadcast audio      |
//! | Playing       | `Event-Name`     | `PLAYBACK_STOP`  | schedule hangup      |
//! | WaitingHangup | `Channel-State`  | `CS_DESTROY`     | none (terminal)      |
//!
//! Every other event is logged and ignored. A rejected command reply is
//! returned as an error; there is no retry.

use std::borrow::Borrow;
use std::fmt;

use esl_protocol::{
    parse_originate_reply, Command, Event, ProtocolError, ANSWER_STATE, CHANNEL_STATE,
};
use tracing::{debug, info};

use crate::error::LoadError;
use crate::transport::{send_checked, CommandSender};

/// Switch-assigned channel UUID identifying a call
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallId(String);

impl CallId {
    /// Wrap an identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the raw identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for CallId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Lifecycle state of a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CallState {
    /// Originated, waiting for the far end to answer
    New,
    /// Answered, audio prompt playing
    Playing,
    /// Playback finished, hangup scheduled
    WaitingHangup,
    /// Channel destroyed
    Done,
}

impl CallState {
    /// Human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Self::New => "New",
            Self::Playing => "Playing",
            Self::WaitingHangup => "WaitingHangup",
            Self::Done => "Done",
        }
    }

    /// Whether this is the terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What every call does once answered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallPlan {
    /// Dial string after `sofia/external/sip:`
    pub destination: String,
    /// Audio file broadcast on the A-leg
    pub audio_file: String,
    /// Delay passed to `sched_hangup`
    pub hangup_delay_secs: u32,
}

/// A state change produced by [`Call::handle_event`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// State before the event
    pub from: CallState,
    /// State after the event
    pub to: CallState,
}

/// One in-progress outbound call
#[derive(Debug, Clone)]
pub struct Call {
    id: CallId,
    state: CallState,
}

impl Call {
    /// Create a call in the `New` state
    pub fn new(id: CallId) -> Self {
        Self {
            id,
            state: CallState::New,
        }
    }

    /// Originate a parked outbound call and wrap its identifier
    ///
    /// Fails with [`LoadError::CommandRejected`] if the reply is not `+OK`,
    /// and with [`LoadError::MissingCallId`] if it carries no UUID.
    pub async fn originate<C>(commander: &mut C, plan: &CallPlan) -> Result<Self, LoadError>
    where
        C: CommandSender + ?Sized,
    {
        info!("New call");

        let command = Command::Originate {
            destination: plan.destination.clone(),
        };
        let reply = commander.send_command(&command).await?;

        let id = parse_originate_reply(&reply).map_err(|e| match e {
            ProtocolError::MissingCallId(reply) => LoadError::MissingCallId(reply),
            _ => LoadError::CommandRejected {
                command: command.to_string(),
                reply: reply.trim_end().to_string(),
            },
        })?;

        info!("Call created, uuid: {}", id);
        Ok(Self::new(CallId::new(id)))
    }

    /// Call identifier
    pub fn id(&self) -> &CallId {
        &self.id
    }

    /// Current state
    pub fn state(&self) -> CallState {
        self.state
    }

    /// Whether the call has reached `Done`
    pub fn is_done(&self) -> bool {
        self.state.is_terminal()
    }

    /// Feed one event to the state machine
    ///
    /// Returns the transition taken, or `None` if the event was ignored.
    pub async fn handle_event<C>(
        &mut self,
        event: &Event,
        commander: &mut C,
        plan: &CallPlan,
    ) -> Result<Option<Transition>, LoadError>
    where
        C: CommandSender + ?Sized,
    {
        let from = self.state;

        match self.state {
            CallState::New => self.on_new(event, commander, plan).await?,
            CallState::Playing => self.on_playing(event, commander, plan).await?,
            CallState::WaitingHangup => self.on_waiting_hangup(event),
            CallState::Done => {
                debug!(
                    "Ignoring event for call uuid: {} since it is hung up/destroyed",
                    self.id
                );
            }
        }

        if self.state == from {
            return Ok(None);
        }

        info!("Call {}: {} -> {}", self.id, from, self.state);
        Ok(Some(Transition {
            from,
            to: self.state,
        }))
    }

    async fn on_new<C>(
        &mut self,
        event: &Event,
        commander: &mut C,
        plan: &CallPlan,
    ) -> Result<(), LoadError>
    where
        C: CommandSender + ?Sized,
    {
        match event.get(ANSWER_STATE) {
            Some("ringing") => info!("Call {}: ringing...", self.id),
            Some("answered") => {
                info!("Call {}: answered!", self.id);
                self.play_audio(commander, plan).await?;
            }
            other => debug!(
                "Call {}: Answer-State is {:?}, waiting for answered",
                self.id, other
            ),
        }
        Ok(())
    }

    async fn on_playing<C>(
        &mut self,
        event: &Event,
        commander: &mut C,
        plan: &CallPlan,
    ) -> Result<(), LoadError>
    where
        C: CommandSender + ?Sized,
    {
        match event.name() {
            Some("PLAYBACK_START") => info!("Call {}: PLAYBACK_START", self.id),
            Some("PLAYBACK_STOP") => {
                info!("Call {}: PLAYBACK_STOP", self.id);
                self.schedule_hangup(commander, plan).await?;
            }
            other => debug!(
                "Call {}: event {:?}, waiting for PLAYBACK_STOP",
                self.id, other
            ),
        }
        Ok(())
    }

    fn on_waiting_hangup(&mut self, event: &Event) {
        match event.get(CHANNEL_STATE) {
            Some("CS_DESTROY") => {
                info!("Call {}: CS_DESTROY", self.id);
                self.state = CallState::Done;
            }
            other => debug!(
                "Call {}: Channel-State is {:?}, waiting for CS_DESTROY",
                self.id, other
            ),
        }
    }

    async fn play_audio<C>(&mut self, commander: &mut C, plan: &CallPlan) -> Result<(), LoadError>
    where
        C: CommandSender + ?Sized,
    {
        let command = Command::Broadcast {
            call_id: self.id.as_str().to_string(),
            audio_file: plan.audio_file.clone(),
        };
        let reply = send_checked(commander, &command).await?;
        debug!("Call {}: broadcast reply {:?}", self.id, reply.trim_end());

        self.state = CallState::Playing;
        Ok(())
    }

    async fn schedule_hangup<C>(
        &mut self,
        commander: &mut C,
        plan: &CallPlan,
    ) -> Result<(), LoadError>
    where
        C: CommandSender + ?Sized,
    {
        let command = Command::ScheduleHangup {
            call_id: self.id.as_str().to_string(),
            delay_secs: plan.hangup_delay_secs,
        };
        send_checked(commander, &command).await?;

        self.state = CallState::WaitingHangup;
        info!("Call {}: scheduled hangup", self.id);
        Ok(())
    }
}
