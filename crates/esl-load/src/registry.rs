//! Live call registry
//!
//! Owned by the dispatch loop; nothing else reads or writes it, so there is no
//! locking. Calls that reach `Done` are removed by [`CallRegistry::sweep`],
//! which the loop runs after each event rather than mid-dispatch.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::call::{Call, CallId};
use crate::error::LoadError;

/// Map of live calls keyed by call identifier
#[derive(Debug, Default)]
pub struct CallRegistry {
    calls: HashMap<CallId, Call>,
    /// Identifiers of removed calls; never reused
    retired: HashSet<CallId>,
}

impl CallRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new call
    ///
    /// Fails if the identifier is live or was used earlier in the run.
    pub fn insert(&mut self, call: Call) -> Result<(), LoadError> {
        let id = call.id().clone();
        if self.calls.contains_key(&id) || self.retired.contains(&id) {
            return Err(LoadError::DuplicateCall(id));
        }
        self.calls.insert(id, call);
        Ok(())
    }

    /// Look up a live call for mutation
    pub fn get_mut(&mut self, id: &str) -> Option<&mut Call> {
        self.calls.get_mut(id)
    }

    /// Look up a live call
    pub fn get(&self, id: &str) -> Option<&Call> {
        self.calls.get(id)
    }

    /// Whether `id` belonged to a call that has already been removed
    pub fn is_retired(&self, id: &str) -> bool {
        self.retired.contains(id)
    }

    /// Remove every call in the terminal state, returning their identifiers
    pub fn sweep(&mut self) -> Vec<CallId> {
        let done: Vec<CallId> = self
            .calls
            .values()
            .filter(|call| call.is_done())
            .map(|call| call.id().clone())
            .collect();

        for id in &done {
            self.calls.remove(id);
            debug!("Removed finished call {}", id);
            self.retired.insert(id.clone());
        }

        done
    }

    /// Number of live calls
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    /// Whether there are no live calls
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}
