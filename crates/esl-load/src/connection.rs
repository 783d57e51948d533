//! Event socket client connection
//!
//! One socket carries both command replies and asynchronous events. After the
//! auth handshake, a connection task owns the socket: it writes commands sent
//! by the [`EslCommander`], completes their replies in FIFO order, and hands
//! events to the [`EslEventStream`].
//!
//! Events go through an unbounded hand-off so that a slow event consumer can
//! never hold up a command reply; backpressure is applied further down, by
//! the event pump's bounded queue.
//!
//! Generic over the I/O type so tests can use `tokio::io::duplex()` in place
//! of a TCP stream.

use std::collections::VecDeque;

use async_trait::async_trait;
use esl_protocol::{
    encode_command, is_ok, Command, Event, EventFormat, FrameCodec, Message,
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::error::TransportError;
use crate::transport::{CommandSender, EventSource};

const READ_BUF_LEN: usize = 8192;
const REQUEST_QUEUE_LEN: usize = 16;

/// A command waiting to be written, with the slot for its reply
#[derive(Debug)]
struct CommandRequest {
    line: String,
    reply_tx: oneshot::Sender<Result<String, TransportError>>,
}

/// An authenticated event socket connection
#[derive(Debug)]
pub struct EslConnection {
    commander: EslCommander,
    events: EslEventStream,
}

impl EslConnection {
    /// Connect over TCP and authenticate
    pub async fn connect(address: &str, password: &str) -> Result<Self, TransportError> {
        info!("Connecting to switch at {}", address);
        let stream = TcpStream::connect(address).await?;
        stream.set_nodelay(true)?;
        Self::from_stream(stream, password).await
    }

    /// Authenticate over an existing stream and start the connection task
    pub async fn from_stream<T>(mut io: T, password: &str) -> Result<Self, TransportError>
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let mut codec = FrameCodec::new();
        let mut buf = vec![0u8; READ_BUF_LEN];

        match read_message(&mut io, &mut codec, &mut buf).await? {
            Message::AuthRequest => {}
            other => return Err(TransportError::Handshake(format!("{:?}", other))),
        }

        let auth = Command::Auth {
            password: password.to_string(),
        };
        io.write_all(&encode_command(&auth.encode())).await?;
        io.flush().await?;

        match read_message(&mut io, &mut codec, &mut buf).await? {
            Message::CommandReply(text) if is_ok(&text) => {
                info!("Authenticated with switch: {}", text);
            }
            Message::CommandReply(text) => return Err(TransportError::AuthRejected(text)),
            other => return Err(TransportError::Handshake(format!("{:?}", other))),
        }

        let (request_tx, request_rx) = mpsc::channel(REQUEST_QUEUE_LEN);
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        tokio::spawn(run_connection_task(io, codec, request_rx, event_tx));

        Ok(Self {
            commander: EslCommander { request_tx },
            events: EslEventStream { event_rx },
        })
    }

    /// Subscribe to every event class
    pub async fn subscribe(&mut self, format: EventFormat) -> Result<String, TransportError> {
        let reply = self
            .commander
            .send_command(&Command::Subscribe { format })
            .await?;
        if !is_ok(&reply) {
            return Err(TransportError::Handshake(format!(
                "event subscription refused: {}",
                reply
            )));
        }
        info!("Subscribed to events: {}", reply);
        Ok(reply)
    }

    /// Split into the command half and the event half
    pub fn split(self) -> (EslCommander, EslEventStream) {
        (self.commander, self.events)
    }
}

/// Command half of a connection
#[derive(Debug, Clone)]
pub struct EslCommander {
    request_tx: mpsc::Sender<CommandRequest>,
}

#[async_trait]
impl CommandSender for EslCommander {
    async fn send_command(&mut self, command: &Command) -> Result<String, TransportError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        debug!("Sending command: {}", command);

        self.request_tx
            .send(CommandRequest {
                line: command.encode(),
                reply_tx,
            })
            .await
            .map_err(|_| TransportError::Closed)?;

        reply_rx.await.map_err(|_| TransportError::Closed)?
    }
}

/// Event half of a connection
#[derive(Debug)]
pub struct EslEventStream {
    event_rx: mpsc::UnboundedReceiver<Result<Event, TransportError>>,
}

#[async_trait]
impl EventSource for EslEventStream {
    async fn next_event(&mut self) -> Result<Event, TransportError> {
        match self.event_rx.recv().await {
            Some(item) => item,
            None => Err(TransportError::Closed),
        }
    }
}

/// Read until one complete message is available
async fn read_message<T>(
    io: &mut T,
    codec: &mut FrameCodec,
    buf: &mut [u8],
) -> Result<Message, TransportError>
where
    T: AsyncRead + Unpin,
{
    loop {
        if let Some(frame) = codec.next_frame() {
            return Ok(Message::from_frame(frame?)?);
        }
        let n = io.read(buf).await?;
        if n == 0 {
            return Err(TransportError::Closed);
        }
        codec.push_bytes(&buf[..n]);
    }
}

/// Own the socket: write commands, route replies and events
async fn run_connection_task<T>(
    io: T,
    mut codec: FrameCodec,
    mut request_rx: mpsc::Receiver<CommandRequest>,
    event_tx: mpsc::UnboundedSender<Result<Event, TransportError>>,
) where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    let (mut reader, mut writer) = tokio::io::split(io);
    let mut pending: VecDeque<oneshot::Sender<Result<String, TransportError>>> = VecDeque::new();
    let mut buf = vec![0u8; READ_BUF_LEN];
    let mut accepting_requests = true;

    debug!("Connection task started");

    // Frames that arrived together with the handshake reply
    let mut closing = route_frames(&mut codec, &mut pending, &event_tx);

    let failure = loop {
        if let Some(failure) = closing.take() {
            break failure;
        }

        tokio::select! {
            request = request_rx.recv(), if accepting_requests => {
                let Some(request) = request else {
                    debug!("Command sender dropped");
                    accepting_requests = false;
                    continue;
                };
                pending.push_back(request.reply_tx);
                let wire = encode_command(&request.line);
                let write = async {
                    writer.write_all(&wire).await?;
                    writer.flush().await
                };
                if let Err(e) = write.await {
                    warn!("Failed to write command: {}", e);
                    break TransportError::Io(e);
                }
            }

            result = reader.read(&mut buf) => {
                match result {
                    Ok(0) => {
                        info!("Switch closed the connection");
                        break TransportError::Closed;
                    }
                    Ok(n) => {
                        codec.push_bytes(&buf[..n]);
                        closing = route_frames(&mut codec, &mut pending, &event_tx);
                    }
                    Err(e) => {
                        warn!("Socket read failed: {}", e);
                        break TransportError::Io(e);
                    }
                }
            }
        }

        if !accepting_requests && event_tx.is_closed() {
            debug!("Both connection halves dropped");
            return;
        }
    };

    for reply_tx in pending.drain(..) {
        let _ = reply_tx.send(Err(TransportError::Closed));
    }
    let _ = event_tx.send(Err(failure));
    debug!("Connection task ended");
}

/// Dispatch every complete frame in the codec
///
/// Returns the error that should close the connection, if any. A frame that
/// cannot be parsed is fatal: it may have been the reply a command is
/// waiting on, and skipping it would pair every later reply with the wrong
/// command.
fn route_frames(
    codec: &mut FrameCodec,
    pending: &mut VecDeque<oneshot::Sender<Result<String, TransportError>>>,
    event_tx: &mpsc::UnboundedSender<Result<Event, TransportError>>,
) -> Option<TransportError> {
    while let Some(frame) = codec.next_frame() {
        let message = match frame.map_err(TransportError::from).and_then(|f| {
            Message::from_frame(f).map_err(TransportError::from)
        }) {
            Ok(message) => message,
            Err(e) => {
                warn!("Unparseable frame from switch: {}", e);
                return Some(e);
            }
        };

        match message {
            Message::CommandReply(text) | Message::ApiResponse(text) => {
                match pending.pop_front() {
                    Some(reply_tx) => {
                        let _ = reply_tx.send(Ok(text));
                    }
                    None => warn!("Reply with no pending command: {:?}", text),
                }
            }
            Message::Event(event) => {
                let _ = event_tx.send(Ok(event));
            }
            Message::Disconnect => {
                info!("Switch sent disconnect notice");
                return Some(TransportError::Closed);
            }
            Message::AuthRequest => warn!("Unexpected auth request after handshake"),
            Message::Unknown(frame) => debug!("Ignoring frame: {:?}", frame.content_type()),
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use esl_protocol::{ContentType, Frame, ParseError, UNIQUE_ID};
    use tokio::io::{duplex, DuplexStream};
    use tokio::time::timeout;

    use super::*;
    use crate::config::LoadConfig;
    use crate::dispatch::run_load_test;
    use crate::error::LoadError;
    use crate::pump::spawn_event_pump;

    const MALFORMED_REPLY: &[u8] = b"Content-Type: api/response\nContent-Length: 5\n\n-ERR\xff";

    /// Log in, wait for the first command, then answer it with a bad body
    async fn answer_with_malformed_reply(mut server: DuplexStream) -> DuplexStream {
        let mut codec = FrameCodec::new();
        handshake(&mut server, &mut codec).await;
        let _ = read_line(&mut server, &mut codec).await;
        server.write_all(MALFORMED_REPLY).await.unwrap();
        server
    }

    async fn write_frame(stream: &mut DuplexStream, frame: Frame) {
        stream.write_all(&frame.encode()).await.unwrap();
    }

    async fn read_line(stream: &mut DuplexStream, codec: &mut FrameCodec) -> String {
        let mut buf = [0u8; 1024];
        loop {
            if let Some(line) = codec.next_command_line() {
                return line;
            }
            let n = stream.read(&mut buf).await.unwrap();
            assert!(n > 0, "client closed");
            codec.push_bytes(&buf[..n]);
        }
    }

    async fn handshake(server: &mut DuplexStream, codec: &mut FrameCodec) {
        write_frame(server, Frame::new(ContentType::AuthRequest, None)).await;
        let _auth = read_line(server, codec).await;
        write_frame(server, Frame::command_reply("+OK accepted")).await;
    }

    #[tokio::test]
    async fn test_auth_rejected() {
        let (client, mut server) = duplex(4096);
        let server_task = tokio::spawn(async move {
            let mut codec = FrameCodec::new();
            write_frame(&mut server, Frame::new(ContentType::AuthRequest, None)).await;
            let _ = read_line(&mut server, &mut codec).await;
            write_frame(&mut server, Frame::command_reply("-ERR invalid")).await;
            server
        });

        let err = EslConnection::from_stream(client, "wrong").await.unwrap_err();
        assert!(matches!(err, TransportError::AuthRejected(text) if text == "-ERR invalid"));
        let _ = server_task.await;
    }

    #[tokio::test]
    async fn test_replies_routed_in_order_and_events_delivered() {
        let (client, mut server) = duplex(4096);
        let server_task = tokio::spawn(async move {
            let mut codec = FrameCodec::new();
            handshake(&mut server, &mut codec).await;

            let first = read_line(&mut server, &mut codec).await;
            assert!(first.starts_with("api originate"));

            // An event sneaks in before the reply
            let event = Event::new()
                .with_field(UNIQUE_ID, "abc")
                .with_field("Event-Name", "HEARTBEAT");
            write_frame(
                &mut server,
                Frame::new(ContentType::EventJson, Some(event.to_json())),
            )
            .await;
            write_frame(
                &mut server,
                Frame::new(ContentType::ApiResponse, Some("+OK abc".to_string())),
            )
            .await;
            server
        });

        let conn = EslConnection::from_stream(client, "ClueCon").await.unwrap();
        let (mut commander, mut events) = conn.split();

        let reply = commander
            .send_command(&Command::Originate {
                destination: "1000@127.0.0.1".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(reply, "+OK abc");

        let event = events.next_event().await.unwrap();
        assert_eq!(event.call_id(), Some("abc"));

        let _server = server_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_eof_fails_pending_and_events() {
        let (client, mut server) = duplex(4096);
        let server_task = tokio::spawn(async move {
            let mut codec = FrameCodec::new();
            handshake(&mut server, &mut codec).await;
            let _ = read_line(&mut server, &mut codec).await;
            drop(server);
        });

        let conn = EslConnection::from_stream(client, "ClueCon").await.unwrap();
        let (mut commander, mut events) = conn.split();

        let result = commander
            .send_command(&Command::Subscribe {
                format: EventFormat::Json,
            })
            .await;
        assert!(matches!(result, Err(TransportError::Closed)));
        assert!(events.next_event().await.is_err());

        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_disconnect_notice_closes_event_stream() {
        let (client, mut server) = duplex(4096);
        let server_task = tokio::spawn(async move {
            let mut codec = FrameCodec::new();
            handshake(&mut server, &mut codec).await;
            write_frame(
                &mut server,
                Frame::new(
                    ContentType::DisconnectNotice,
                    Some("Disconnected, goodbye.\n".to_string()),
                ),
            )
            .await;
            server
        });

        let conn = EslConnection::from_stream(client, "ClueCon").await.unwrap();
        let (_commander, mut events) = conn.split();

        assert!(matches!(events.next_event().await, Err(TransportError::Closed)));
        let _ = server_task.await;
    }

    #[tokio::test]
    async fn test_malformed_reply_fails_pending_command() {
        let (client, server) = duplex(4096);
        let server_task = tokio::spawn(answer_with_malformed_reply(server));

        let conn = EslConnection::from_stream(client, "ClueCon").await.unwrap();
        let (mut commander, mut events) = conn.split();

        let originate = Command::Originate {
            destination: "1000@127.0.0.1".to_string(),
        };
        let result = timeout(Duration::from_secs(2), commander.send_command(&originate))
            .await
            .expect("command should complete");
        assert!(matches!(result, Err(TransportError::Closed)));

        assert!(matches!(
            events.next_event().await,
            Err(TransportError::Parse(ParseError::InvalidUtf8))
        ));

        // Later commands fail fast instead of taking the next reply
        let result = timeout(Duration::from_secs(2), commander.send_command(&originate))
            .await
            .expect("command should complete");
        assert!(matches!(result, Err(TransportError::Closed)));

        let _server = server_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_malformed_event_closes_connection() {
        let (client, mut server) = duplex(4096);
        let server_task = tokio::spawn(async move {
            let mut codec = FrameCodec::new();
            handshake(&mut server, &mut codec).await;
            server
                .write_all(b"Content-Type: text/event-json\nContent-Length: 7\n\n{broken")
                .await
                .unwrap();
            server
        });

        let conn = EslConnection::from_stream(client, "ClueCon").await.unwrap();
        let (_commander, mut events) = conn.split();

        assert!(matches!(
            events.next_event().await,
            Err(TransportError::Parse(ParseError::InvalidJson(_)))
        ));
        let _server = server_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_malformed_reply_aborts_load_test() {
        let (client, server) = duplex(4096);
        let server_task = tokio::spawn(answer_with_malformed_reply(server));

        let conn = EslConnection::from_stream(client, "ClueCon").await.unwrap();
        let (commander, events) = conn.split();

        let config = LoadConfig {
            total_calls: 3,
            destination: "1000@127.0.0.1".to_string(),
            ..Default::default()
        };
        let (queue, _pump) = spawn_event_pump(events, config.event_queue_capacity, false);
        let (progress_tx, _progress_rx) = tokio::sync::mpsc::unbounded_channel();

        let result = timeout(
            Duration::from_secs(2),
            run_load_test(commander, queue, &config, progress_tx),
        )
        .await
        .expect("load test should end");
        assert!(matches!(result, Err(LoadError::Transport(_))));

        let _server = server_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_handshake_requires_auth_request_first() {
        let (client, mut server) = duplex(4096);
        let server_task = tokio::spawn(async move {
            write_frame(&mut server, Frame::command_reply("+OK")).await;
            server
        });

        let err = EslConnection::from_stream(client, "ClueCon").await.unwrap_err();
        assert!(matches!(err, TransportError::Handshake(_)));
        let _ = server_task.await;
    }
}
