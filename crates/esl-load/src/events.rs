//! Progress events emitted by the dispatch loop
//!
//! Observers (the CLI progress reporter, tests) receive everything the loop
//! does through a single unbounded channel. Emitting never blocks or fails
//! the run; a dropped receiver is ignored.

use std::time::Duration;

use crate::call::{CallId, CallState};

/// Counters reported when a run completes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadSummary {
    /// Calls originated
    pub calls_created: u64,
    /// Calls that reached `Done` and were removed
    pub calls_completed: u64,
    /// Events received from the switch
    pub events_seen: u64,
    /// Events with no identifier or an unknown identifier
    pub events_dropped: u64,
    /// Wall-clock duration of the run
    pub elapsed: Duration,
}

/// Unified event enum for dispatch loop activity
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadEvent {
    /// A call was originated and registered
    CallCreated {
        /// Identifier of the new call
        call_id: CallId,
        /// Number of calls created so far, including this one
        created: u64,
    },

    /// A call moved to a new state
    CallStateChanged {
        /// Identifier of the call
        call_id: CallId,
        /// Previous state
        from: CallState,
        /// New state
        to: CallState,
    },

    /// A finished call was swept from the registry
    CallRemoved {
        /// Identifier of the removed call
        call_id: CallId,
    },

    /// The last call of the ramp was created
    RampComplete {
        /// Total calls created
        created: u64,
    },

    /// The run finished normally
    Finished(LoadSummary),
}

impl LoadEvent {
    /// Get the call identifier if this event concerns a single call
    pub fn call_id(&self) -> Option<&CallId> {
        match self {
            LoadEvent::CallCreated { call_id, .. }
            | LoadEvent::CallStateChanged { call_id, .. }
            | LoadEvent::CallRemoved { call_id } => Some(call_id),
            LoadEvent::RampComplete { .. } | LoadEvent::Finished(_) => None,
        }
    }
}
