//! Dispatch loop
//!
//! The loop is the single owner of the call registry and of every call in
//! it. It waits on two sources at once:
//!
//! - the event queue filled by the pump: route each event to its call by
//!   `Unique-ID`, run the call's state machine, then sweep finished calls
//! - the ramp ticker: create at most one call per tick until the target is
//!   reached, and finish once the target is reached with no calls alive
//!
//! Commands are awaited inside the handling step, so a slow reply stalls the
//! loop until it arrives. Any transport failure or rejected reply ends the
//! run with an error.
//!
//! # Example
//!
//! ```rust,ignore
//! use esl_load::{run_load_test, spawn_event_pump, EslConnection, LoadConfig};
//! use esl_protocol::EventFormat;
//! use tokio::sync::mpsc;
//!
//! let config = LoadConfig::default();
//! let mut conn = EslConnection::connect(&config.address, &config.password).await?;
//! conn.subscribe(EventFormat::Json).await?;
//! let (commander, events) = conn.split();
//!
//! let (queue, _pump) = spawn_event_pump(events, config.event_queue_capacity, false);
//! let (progress_tx, _progress_rx) = mpsc::unbounded_channel();
//! let summary = run_load_test(commander, queue, &config, progress_tx).await?;
//! ```

use std::time::Instant;

use esl_protocol::Event;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::call::{Call, CallPlan};
use crate::config::LoadConfig;
use crate::error::LoadError;
use crate::events::{LoadEvent, LoadSummary};
use crate::pump::EventItem;
use crate::ramp::RampScheduler;
use crate::registry::CallRegistry;
use crate::transport::CommandSender;

/// Internal state for the dispatch loop
struct DispatchState<C> {
    commander: C,
    registry: CallRegistry,
    ramp: RampScheduler,
    plan: CallPlan,
    progress_tx: mpsc::UnboundedSender<LoadEvent>,
    calls_completed: u64,
    events_seen: u64,
    events_dropped: u64,
    started: Instant,
}

impl<C: CommandSender> DispatchState<C> {
    fn new(
        commander: C,
        config: &LoadConfig,
        progress_tx: mpsc::UnboundedSender<LoadEvent>,
    ) -> Self {
        Self {
            commander,
            registry: CallRegistry::new(),
            ramp: RampScheduler::new(config.total_calls, config.ramp_interval()),
            plan: config.call_plan(),
            progress_tx,
            calls_completed: 0,
            events_seen: 0,
            events_dropped: 0,
            started: Instant::now(),
        }
    }

    fn emit(&self, event: LoadEvent) {
        let _ = self.progress_tx.send(event);
    }

    fn summary(&self) -> LoadSummary {
        LoadSummary {
            calls_created: self.ramp.created(),
            calls_completed: self.calls_completed,
            events_seen: self.events_seen,
            events_dropped: self.events_dropped,
            elapsed: self.started.elapsed(),
        }
    }

    /// Route one event to its call, then sweep finished calls
    async fn dispatch_event(&mut self, event: Event) -> Result<(), LoadError> {
        self.events_seen += 1;

        let Some(call_id) = event.call_id() else {
            // Background/system events are not actionable here
            self.events_dropped += 1;
            return Ok(());
        };

        let changed = match self.registry.get_mut(call_id) {
            Some(call) => call
                .handle_event(&event, &mut self.commander, &self.plan)
                .await?
                .map(|transition| (call.id().clone(), transition)),
            None => {
                self.events_dropped += 1;
                if self.registry.is_retired(call_id) {
                    debug!("Dropping event for finished call {}", call_id);
                }
                None
            }
        };

        if let Some((call_id, transition)) = changed {
            self.emit(LoadEvent::CallStateChanged {
                call_id,
                from: transition.from,
                to: transition.to,
            });
        }

        self.sweep();
        Ok(())
    }

    fn sweep(&mut self) {
        for call_id in self.registry.sweep() {
            self.calls_completed += 1;
            info!(
                "Call {} finished ({} live, {}/{} created)",
                call_id,
                self.registry.len(),
                self.ramp.created(),
                self.ramp.total()
            );
            self.emit(LoadEvent::CallRemoved { call_id });
        }
    }

    /// Handle a ramp tick; returns true once the run is finished
    async fn on_tick(&mut self) -> Result<bool, LoadError> {
        if self.ramp.should_create() {
            let call = Call::originate(&mut self.commander, &self.plan).await?;
            let call_id = call.id().clone();
            self.registry.insert(call)?;
            self.ramp.record_created();

            self.emit(LoadEvent::CallCreated {
                call_id,
                created: self.ramp.created(),
            });

            if self.ramp.target_reached() {
                info!("Ramp complete: {} calls created", self.ramp.created());
                self.emit(LoadEvent::RampComplete {
                    created: self.ramp.created(),
                });
            }
        }

        Ok(self.ramp.is_finished(self.registry.len()))
    }
}

/// Run a load test to completion
///
/// `events` is the bounded queue filled by [`crate::spawn_event_pump`].
/// Progress is reported on `progress_tx`. Returns the run summary once every
/// call has been created and has finished; returns an error on the first
/// fatal failure.
pub async fn run_load_test<C>(
    commander: C,
    mut events: mpsc::Receiver<EventItem>,
    config: &LoadConfig,
    progress_tx: mpsc::UnboundedSender<LoadEvent>,
) -> Result<LoadSummary, LoadError>
where
    C: CommandSender,
{
    config.validate()?;

    let mut state = DispatchState::new(commander, config, progress_tx);
    let mut ticker = state.ramp.ticker();

    info!(
        "Starting load test: {} calls at {:.1} calls/s to {}",
        state.ramp.total(),
        state.ramp.calls_per_second(),
        state.plan.destination
    );

    loop {
        tokio::select! {
            item = events.recv() => {
                match item {
                    Some(Ok(event)) => state.dispatch_event(event).await?,
                    Some(Err(e)) => return Err(e.into()),
                    None => return Err(LoadError::EventStreamClosed),
                }
            }

            _ = ticker.tick() => {
                if state.on_tick().await? {
                    break;
                }
            }
        }
    }

    let summary = state.summary();
    info!(
        "All calls done! {} created, {} completed in {:.1?}",
        summary.calls_created, summary.calls_completed, summary.elapsed
    );
    state.emit(LoadEvent::Finished(summary.clone()));
    Ok(summary)
}
