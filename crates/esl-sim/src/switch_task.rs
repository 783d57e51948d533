//! Virtual switch actor task
//!
//! This module provides an async task that owns a [`VirtualSwitch`] and
//! serves the event socket protocol over any byte stream. The task uses a
//! select! loop to:
//! - Read command lines from the client and write their replies
//! - Fire scheduled hangups once their delay has passed
//! - Emit background heartbeats when configured
//! - Handle shutdown requests from a channel
//!
//! Events caused by a command are written after that command's reply.

use std::io;
use std::time::Duration;

use esl_protocol::{Command, ContentType, Event, EventFormat, Frame, FrameCodec};
use tokio::io::{duplex, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::switch::VirtualSwitch;

/// Commands that can be sent to a virtual switch task
#[derive(Debug, Clone)]
pub enum VirtualSwitchCommand {
    /// Queue a heartbeat event now
    Heartbeat,
    /// Send a disconnect notice and stop
    Shutdown,
}

/// Heartbeat period used when the timer is disabled; never fires
const IDLE_PERIOD: Duration = Duration::from_secs(3600);

/// Run the virtual switch task until the client disconnects
///
/// The task greets the client with `auth/request`, and only accepts `auth`
/// until the password matches. A wrong password is answered with `-ERR`
/// followed by a disconnect notice.
pub async fn run_virtual_switch_task<S>(
    mut stream: S,
    mut switch: VirtualSwitch,
    mut cmd_rx: mpsc::Receiver<VirtualSwitchCommand>,
) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut codec = FrameCodec::new();
    let mut buf = [0u8; 4096];
    let mut authenticated = false;
    let mut hangups: Vec<(Instant, String)> = Vec::new();
    let mut commands_open = true;

    let heartbeat_period = switch
        .config()
        .heartbeat_interval
        .filter(|period| !period.is_zero());
    let mut heartbeat = interval(heartbeat_period.unwrap_or(IDLE_PERIOD));
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick of an interval is immediate
    heartbeat.reset();

    info!("Starting virtual switch task for {}", switch.id());

    write_frame(&mut stream, &Frame::new(ContentType::AuthRequest, None)).await?;

    loop {
        let next_hangup = hangups.iter().map(|(at, _)| *at).min();

        tokio::select! {
            result = stream.read(&mut buf) => {
                let n = match result {
                    Ok(0) => {
                        debug!("Virtual switch {} client closed the stream", switch.id());
                        break;
                    }
                    Ok(n) => n,
                    Err(e) => {
                        warn!("Virtual switch {} stream error: {}", switch.id(), e);
                        return Err(e);
                    }
                };
                codec.push_bytes(&buf[..n]);

                while let Some(line) = codec.next_command_line() {
                    if line.is_empty() {
                        continue;
                    }

                    if !authenticated {
                        if authenticate(&mut stream, &mut switch, &line).await? {
                            authenticated = true;
                            continue;
                        }
                        info!("Virtual switch {} rejected login", switch.id());
                        return Ok(());
                    }

                    handle_line(&mut stream, &mut switch, &line).await?;

                    let now = Instant::now();
                    for hangup in switch.take_scheduled() {
                        hangups.push((now + hangup.delay, hangup.call_id));
                    }
                    flush_events(&mut stream, &mut switch).await?;
                }
            }

            _ = sleep_until(next_hangup.unwrap_or_else(Instant::now)), if next_hangup.is_some() => {
                let now = Instant::now();
                let (due, waiting): (Vec<_>, Vec<_>) =
                    hangups.drain(..).partition(|(at, _)| *at <= now);
                hangups = waiting;

                for (_, call_id) in due {
                    switch.hang_up(&call_id);
                }
                flush_events(&mut stream, &mut switch).await?;
            }

            _ = heartbeat.tick(), if heartbeat_period.is_some() => {
                switch.heartbeat();
                flush_events(&mut stream, &mut switch).await?;
            }

            cmd = cmd_rx.recv(), if commands_open => {
                match cmd {
                    Some(VirtualSwitchCommand::Heartbeat) => {
                        switch.heartbeat();
                        flush_events(&mut stream, &mut switch).await?;
                    }
                    Some(VirtualSwitchCommand::Shutdown) => {
                        info!("Shutdown requested for virtual switch {}", switch.id());
                        write_frame(&mut stream, &disconnect_notice()).await?;
                        break;
                    }
                    None => {
                        debug!("Command channel closed for virtual switch {}", switch.id());
                        commands_open = false;
                    }
                }
            }
        }
    }

    info!(
        "Virtual switch task ended for {} ({} calls originated)",
        switch.id(),
        switch.originated()
    );
    Ok(())
}

/// Handle to a switch task spawned by [`spawn_virtual_switch`]
pub struct VirtualSwitchHandle {
    /// Control channel into the task
    pub cmd_tx: mpsc::Sender<VirtualSwitchCommand>,
    /// The running task
    pub task: JoinHandle<io::Result<()>>,
}

/// Spawn a virtual switch on an in-memory stream
///
/// Returns the client end of the stream, ready to be handed to an event
/// socket client.
pub fn spawn_virtual_switch(switch: VirtualSwitch) -> (DuplexStream, VirtualSwitchHandle) {
    let (client, server) = duplex(64 * 1024);
    let (cmd_tx, cmd_rx) = mpsc::channel(8);
    let task = tokio::spawn(run_virtual_switch_task(server, switch, cmd_rx));
    (client, VirtualSwitchHandle { cmd_tx, task })
}

/// Handle a line before login; returns true once the client is in
async fn authenticate<S>(stream: &mut S, switch: &mut VirtualSwitch, line: &str) -> io::Result<bool>
where
    S: AsyncWrite + Unpin,
{
    let reply = match Command::parse(line) {
        Ok(command @ Command::Auth { .. }) => switch.execute(&command),
        _ => "-ERR command not found".to_string(),
    };

    let accepted = reply.starts_with("+OK");
    write_frame(stream, &Frame::command_reply(reply)).await?;
    if !accepted {
        write_frame(stream, &disconnect_notice()).await?;
    }
    Ok(accepted)
}

async fn handle_line<S>(stream: &mut S, switch: &mut VirtualSwitch, line: &str) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    let frame = match Command::parse(line) {
        Ok(command) if command.is_api() => {
            let reply = switch.execute(&command);
            Frame::new(ContentType::ApiResponse, Some(reply))
        }
        Ok(command) => Frame::command_reply(switch.execute(&command)),
        Err(_) if line.starts_with("api ") => {
            debug!("Virtual switch {} unknown api command: {}", switch.id(), line);
            Frame::new(
                ContentType::ApiResponse,
                Some("-ERR Command not found!\n".to_string()),
            )
        }
        Err(_) => Frame::command_reply("-ERR command not found"),
    };

    write_frame(stream, &frame).await
}

async fn flush_events<S>(stream: &mut S, switch: &mut VirtualSwitch) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    let format = switch.subscription().unwrap_or_default();
    while let Some(event) = switch.take_event() {
        write_frame(stream, &event_frame(&event, format)).await?;
    }
    Ok(())
}

fn event_frame(event: &Event, format: EventFormat) -> Frame {
    match format {
        EventFormat::Json => Frame::new(ContentType::EventJson, Some(event.to_json())),
        EventFormat::Plain => Frame::new(ContentType::EventPlain, Some(event.to_plain())),
    }
}

fn disconnect_notice() -> Frame {
    Frame::new(
        ContentType::DisconnectNotice,
        Some("Disconnected, goodbye.\n".to_string()),
    )
}

async fn write_frame<S>(stream: &mut S, frame: &Frame) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(&frame.encode()).await?;
    stream.flush().await
}
