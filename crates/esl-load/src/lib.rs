//! Outbound Call Load Engine
//!
//! This crate drives a configurable number of parked outbound calls through a
//! telephony switch's event socket, one short audio prompt per call.
//!
//! # Architecture
//!
//! Two cooperating tasks share one authenticated connection:
//!
//! - **Event pump**: reads events off the socket and pushes them, in order,
//!   into a bounded queue ([`spawn_event_pump`])
//! - **Dispatch loop**: pulls events from the queue, routes each to its call's
//!   state machine, and creates new calls on a fixed ramp ([`run_load_test`])
//!
//! Each call walks `New → Playing → WaitingHangup → Done`. Finished calls are
//! swept after every event. The run ends when the configured number of calls
//! has been created and none are left alive.
//!
//! All activity is reported through a unified [`LoadEvent`] stream.
//!
//! # Example
//!
//! ```rust,no_run
//! use esl_load::{run_load_test, spawn_event_pump, EslConnection, LoadConfig};
//! use esl_protocol::EventFormat;
//! use tokio::sync::mpsc;
//!
//! # async fn example() -> Result<(), esl_load::LoadError> {
//! let config = LoadConfig::default();
//! let mut conn = EslConnection::connect(&config.address, &config.password).await?;
//! conn.subscribe(EventFormat::Json).await?;
//! let (commander, events) = conn.split();
//!
//! let (queue, _pump) = spawn_event_pump(events, config.event_queue_capacity, false);
//! let (progress_tx, _progress_rx) = mpsc::unbounded_channel();
//! let summary = run_load_test(commander, queue, &config, progress_tx).await?;
//! println!("{} calls completed", summary.calls_completed);
//! # Ok(())
//! # }
//! ```

pub mod call;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod pump;
pub mod ramp;
pub mod registry;
pub mod transport;

// Re-export call types
pub use call::{Call, CallId, CallPlan, CallState, Transition};

// Re-export connection types
pub use connection::{EslCommander, EslConnection, EslEventStream};
pub use transport::{send_checked, CommandSender, EventSource};

// Re-export engine types
pub use config::LoadConfig;
pub use dispatch::run_load_test;
pub use error::{LoadError, TransportError};
pub use events::{LoadEvent, LoadSummary};
pub use pump::{spawn_event_pump, EventItem};
pub use ramp::RampScheduler;
pub use registry::CallRegistry;
