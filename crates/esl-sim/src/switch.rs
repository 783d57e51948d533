//! Virtual switch for testing
//!
//! This module provides a simulated telephony switch that answers the
//! commands a load test sends and queues the channel events a real switch
//! would emit in response. It holds no I/O; the switch task in
//! [`crate::switch_task`] serves it over a byte stream.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use esl_protocol::{Command, Event, EventFormat, ANSWER_STATE, CHANNEL_STATE, EVENT_NAME, UNIQUE_ID};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Reply to commands naming a channel the switch does not know
pub const NO_SUCH_CHANNEL: &str = "-ERR No such channel!\n";

/// Behavior knobs for a [`VirtualSwitch`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualSwitchConfig {
    /// Password accepted by `auth`
    pub password: String,
    /// Answer originated calls (otherwise they ring forever)
    pub answer_calls: bool,
    /// Refuse every originate with `-ERR`
    pub reject_originate: bool,
    /// Period of background `HEARTBEAT` events, if any
    pub heartbeat_interval: Option<Duration>,
}

impl Default for VirtualSwitchConfig {
    fn default() -> Self {
        Self {
            password: "ClueCon".to_string(),
            answer_calls: true,
            reject_originate: false,
            heartbeat_interval: None,
        }
    }
}

/// Lifecycle of a simulated channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelPhase {
    /// Dialed, not answered
    Ringing,
    /// Answered and parked
    Answered,
    /// `sched_hangup` accepted, waiting for the delay
    HangupScheduled,
}

/// A hangup waiting for its delay to pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledHangup {
    /// Channel to hang up
    pub call_id: String,
    /// Delay requested by `sched_hangup`
    pub delay: Duration,
}

/// Simulated switch
///
/// Commands go in through [`VirtualSwitch::execute`]; the events they cause
/// come out of [`VirtualSwitch::take_event`] in emission order. Events are
/// only queued once a client has subscribed.
pub struct VirtualSwitch {
    /// Identifier for logging
    id: String,
    config: VirtualSwitchConfig,
    subscription: Option<EventFormat>,
    channels: HashMap<String, ChannelPhase>,
    pending_events: VecDeque<Event>,
    scheduled: Vec<ScheduledHangup>,
    event_sequence: u64,
    originated: u64,
    /// Command lines received (for test verification)
    received_commands: Vec<String>,
}

impl VirtualSwitch {
    /// Create a switch with default behavior
    pub fn new(id: impl Into<String>) -> Self {
        Self::with_config(id, VirtualSwitchConfig::default())
    }

    /// Create a switch with the given behavior
    pub fn with_config(id: impl Into<String>, config: VirtualSwitchConfig) -> Self {
        Self {
            id: id.into(),
            config,
            subscription: None,
            channels: HashMap::new(),
            pending_events: VecDeque::new(),
            scheduled: Vec::new(),
            event_sequence: 0,
            originated: 0,
            received_commands: Vec::new(),
        }
    }

    /// Identifier used in log lines
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Behavior this switch was built with
    pub fn config(&self) -> &VirtualSwitchConfig {
        &self.config
    }

    /// Event encoding the client subscribed with, if it has
    pub fn subscription(&self) -> Option<EventFormat> {
        self.subscription
    }

    /// Check an `auth` password
    pub fn authenticate(&self, password: &str) -> bool {
        password == self.config.password
    }

    /// Number of live channels
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Phase of a live channel
    pub fn channel(&self, call_id: &str) -> Option<ChannelPhase> {
        self.channels.get(call_id).copied()
    }

    /// Number of calls originated so far
    pub fn originated(&self) -> u64 {
        self.originated
    }

    /// Command lines received so far
    pub fn received_commands(&self) -> &[String] {
        &self.received_commands
    }

    /// Pop the next queued event
    pub fn take_event(&mut self) -> Option<Event> {
        self.pending_events.pop_front()
    }

    /// Number of queued events
    pub fn pending_events(&self) -> usize {
        self.pending_events.len()
    }

    /// Drain hangups accepted since the last call
    pub fn take_scheduled(&mut self) -> Vec<ScheduledHangup> {
        std::mem::take(&mut self.scheduled)
    }

    /// Execute a command and return the reply text
    ///
    /// `auth` is answered here too, but connection-level handling of a
    /// failed login belongs to the caller.
    pub fn execute(&mut self, command: &Command) -> String {
        self.received_commands.push(command.encode());

        match command {
            Command::Auth { password } => {
                if self.authenticate(password) {
                    "+OK accepted".to_string()
                } else {
                    "-ERR invalid".to_string()
                }
            }
            Command::Subscribe { format } => {
                self.subscription = Some(*format);
                let kind = match format {
                    EventFormat::Json => "json",
                    EventFormat::Plain => "plain",
                };
                format!("+OK event listener enabled {}", kind)
            }
            Command::Originate { destination } => self.originate(destination),
            Command::Broadcast {
                call_id,
                audio_file,
            } => self.broadcast(call_id, audio_file),
            Command::ScheduleHangup {
                call_id,
                delay_secs,
            } => self.schedule_hangup(call_id, *delay_secs),
        }
    }

    /// Hang a channel up now, queueing its teardown events
    ///
    /// Returns false if the channel is unknown.
    pub fn hang_up(&mut self, call_id: &str) -> bool {
        if self.channels.remove(call_id).is_none() {
            return false;
        }

        info!("Virtual switch {}: channel {} destroyed", self.id, call_id);
        self.queue_channel_event(call_id, "CHANNEL_HANGUP", |e| {
            e.with_field(ANSWER_STATE, "hangup")
                .with_field(CHANNEL_STATE, "CS_HANGUP")
                .with_field("Hangup-Cause", "NORMAL_CLEARING")
        });
        self.queue_channel_event(call_id, "CHANNEL_DESTROY", |e| {
            e.with_field(ANSWER_STATE, "hangup")
                .with_field(CHANNEL_STATE, "CS_DESTROY")
        });
        true
    }

    /// Queue a background event that belongs to no channel
    pub fn heartbeat(&mut self) {
        let event = Event::new()
            .with_field(EVENT_NAME, "HEARTBEAT")
            .with_field("Session-Count", self.channels.len().to_string());
        self.queue_event(event);
    }

    fn originate(&mut self, destination: &str) -> String {
        if self.config.reject_originate {
            warn!("Virtual switch {}: rejecting originate to {}", self.id, destination);
            return "-ERR DESTINATION_OUT_OF_ORDER\n".to_string();
        }

        let call_id = Uuid::new_v4().to_string();
        self.originated += 1;
        info!(
            "Virtual switch {}: originate to {} -> {}",
            self.id, destination, call_id
        );

        self.channels.insert(call_id.clone(), ChannelPhase::Ringing);
        self.queue_channel_event(&call_id, "CHANNEL_PROGRESS", |e| {
            e.with_field(ANSWER_STATE, "ringing")
                .with_field(CHANNEL_STATE, "CS_CONSUME_MEDIA")
        });

        if self.config.answer_calls {
            self.channels.insert(call_id.clone(), ChannelPhase::Answered);
            self.queue_channel_event(&call_id, "CHANNEL_ANSWER", |e| {
                e.with_field(ANSWER_STATE, "answered")
                    .with_field(CHANNEL_STATE, "CS_EXECUTE")
            });
        }

        format!("+OK {}\n", call_id)
    }

    fn broadcast(&mut self, call_id: &str, audio_file: &str) -> String {
        if !self.channels.contains_key(call_id) {
            debug!("Virtual switch {}: broadcast to unknown {}", self.id, call_id);
            return NO_SUCH_CHANNEL.to_string();
        }

        for name in ["PLAYBACK_START", "PLAYBACK_STOP"] {
            self.queue_channel_event(call_id, name, |e| {
                e.with_field(ANSWER_STATE, "answered")
                    .with_field(CHANNEL_STATE, "CS_EXECUTE")
                    .with_field("Playback-File-Path", audio_file)
            });
        }

        "+OK Message queued\n".to_string()
    }

    fn schedule_hangup(&mut self, call_id: &str, delay_secs: u32) -> String {
        let Some(phase) = self.channels.get_mut(call_id) else {
            debug!("Virtual switch {}: sched_hangup for unknown {}", self.id, call_id);
            return NO_SUCH_CHANNEL.to_string();
        };

        *phase = ChannelPhase::HangupScheduled;
        self.scheduled.push(ScheduledHangup {
            call_id: call_id.to_string(),
            delay: Duration::from_secs(u64::from(delay_secs)),
        });

        "+OK Scheduled\n".to_string()
    }

    fn queue_channel_event(
        &mut self,
        call_id: &str,
        name: &str,
        fill: impl FnOnce(Event) -> Event,
    ) {
        let event = Event::new()
            .with_field(EVENT_NAME, name)
            .with_field(UNIQUE_ID, call_id);
        self.queue_event(fill(event));
    }

    fn queue_event(&mut self, event: Event) {
        if self.subscription.is_none() {
            return;
        }
        self.event_sequence += 1;
        let event = event.with_field("Event-Sequence", self.event_sequence.to_string());
        self.pending_events.push_back(event);
    }
}
