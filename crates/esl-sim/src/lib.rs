//! Telephony Switch Simulation Library
//!
//! This crate provides a simulated event-socket switch for exercising the
//! load engine without a real telephony server. It includes:
//!
//! - **VirtualSwitch**: answers originate, broadcast and hangup commands and
//!   queues the channel events a real switch would emit
//! - **run_virtual_switch_task**: serves a `VirtualSwitch` over any byte
//!   stream, auth handshake included
//!
//! # Example
//!
//! ```rust
//! use esl_protocol::{find_call_id, Command, EventFormat};
//! use esl_sim::VirtualSwitch;
//!
//! let mut switch = VirtualSwitch::new("sim");
//! switch.execute(&Command::Subscribe { format: EventFormat::Json });
//!
//! let reply = switch.execute(&Command::Originate {
//!     destination: "1000@127.0.0.1".to_string(),
//! });
//! assert!(find_call_id(&reply).is_some());
//!
//! while let Some(event) = switch.take_event() {
//!     println!("{:?}", event.name());
//! }
//! ```

pub mod switch;
pub mod switch_task;

pub use switch::{
    ChannelPhase, ScheduledHangup, VirtualSwitch, VirtualSwitchConfig, NO_SUCH_CHANNEL,
};
pub use switch_task::{
    run_virtual_switch_task, spawn_virtual_switch, VirtualSwitchCommand, VirtualSwitchHandle,
};
