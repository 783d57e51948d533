//! Callburst
//!
//! Generates outbound call load against a telephony switch's event socket:
//! calls are originated on a fixed ramp, each plays one audio prompt once
//! answered and is hung up shortly after playback ends.

mod settings;

use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use esl_load::{
    run_load_test, spawn_event_pump, EslConnection, LoadConfig, LoadEvent, LoadSummary,
};
use esl_protocol::EventFormat;
use esl_sim::{
    spawn_virtual_switch, VirtualSwitch, VirtualSwitchCommand, VirtualSwitchConfig,
    VirtualSwitchHandle,
};
use settings::Args;
use tokio::sync::mpsc;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SIM_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(20);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "callburst=info,esl_load=info,esl_protocol=info,esl_sim=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = args.load_config()?;

    info!(
        "Starting callburst: {} calls to {}",
        config.total_calls, config.destination
    );

    let (mut conn, simulator) = if args.simulate {
        let (conn, handle) = connect_simulated(&config).await?;
        (conn, Some(handle))
    } else {
        let conn = EslConnection::connect(&config.address, &config.password)
            .await
            .with_context(|| format!("failed to connect to {}", config.address))?;
        (conn, None)
    };

    conn.subscribe(EventFormat::Json)
        .await
        .context("failed to subscribe to events")?;
    let (commander, events) = conn.split();

    let (queue, pump) =
        spawn_event_pump(events, config.event_queue_capacity, config.log_all_events);
    let (progress_tx, progress_rx) = mpsc::unbounded_channel();
    let reporter = tokio::spawn(report_progress(progress_rx));

    let result = run_load_test(commander, queue, &config, progress_tx).await;

    pump.abort();
    let _ = reporter.await;
    if let Some(handle) = simulator {
        let _ = handle.cmd_tx.send(VirtualSwitchCommand::Shutdown).await;
    }

    let summary = result.context("load test failed")?;
    print_summary(&summary);
    Ok(())
}

/// Start the built-in switch and log in to it
async fn connect_simulated(
    config: &LoadConfig,
) -> anyhow::Result<(EslConnection, VirtualSwitchHandle)> {
    info!("Using simulated switch");

    let switch = VirtualSwitch::with_config(
        "simulated",
        VirtualSwitchConfig {
            password: config.password.clone(),
            heartbeat_interval: Some(SIM_HEARTBEAT_INTERVAL),
            ..Default::default()
        },
    );
    let (stream, handle) = spawn_virtual_switch(switch);

    let conn = EslConnection::from_stream(stream, &config.password)
        .await
        .context("failed to log in to simulated switch")?;
    Ok((conn, handle))
}

/// Log run progress until the dispatch loop drops its sender
async fn report_progress(mut progress_rx: mpsc::UnboundedReceiver<LoadEvent>) {
    let mut live: u64 = 0;

    while let Some(event) = progress_rx.recv().await {
        match event {
            LoadEvent::CallCreated { call_id, created } => {
                live += 1;
                debug!("Call #{} created: {} ({} live)", created, call_id, live);
            }
            LoadEvent::CallStateChanged { call_id, from, to } => {
                debug!("Call {} moved {} -> {}", call_id, from, to);
            }
            LoadEvent::CallRemoved { call_id } => {
                live = live.saturating_sub(1);
                debug!("Call {} removed ({} live)", call_id, live);
            }
            LoadEvent::RampComplete { created } => {
                info!("All {} calls created, waiting for {} to finish", created, live);
            }
            LoadEvent::Finished(_) => break,
        }
    }
}

fn print_summary(summary: &LoadSummary) {
    println!("All calls done!");
    println!("  calls created:   {}", summary.calls_created);
    println!("  calls completed: {}", summary.calls_completed);
    println!("  events seen:     {}", summary.events_seen);
    println!("  events dropped:  {}", summary.events_dropped);
    println!("  elapsed:         {:.1?}", summary.elapsed);
}
