//! Command-line settings
//!
//! Configuration is resolved once at startup: defaults, then an optional JSON
//! file, then any flags given on the command line.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use esl_load::LoadConfig;

#[derive(Parser, Debug, Default)]
#[command(
    author,
    version,
    about = "Outbound call load generator for event-socket switches",
    long_about = None
)]
pub struct Args {
    /// JSON configuration file; flags override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Event socket address (host:port)
    #[arg(short, long)]
    pub address: Option<String>,

    /// Event socket password
    #[arg(short, long)]
    pub password: Option<String>,

    /// Dial string appended to sofia/external/sip:
    #[arg(short, long)]
    pub destination: Option<String>,

    /// Audio file played on each answered call
    #[arg(long)]
    pub audio_file: Option<String>,

    /// Number of calls to create
    #[arg(short = 'n', long)]
    pub total_calls: Option<u64>,

    /// Milliseconds between call creations
    #[arg(long)]
    pub ramp_interval_ms: Option<u64>,

    /// Seconds between end of playback and hangup
    #[arg(long)]
    pub hangup_delay_secs: Option<u32>,

    /// Capacity of the event queue
    #[arg(long)]
    pub queue_capacity: Option<usize>,

    /// Log every event received from the switch
    #[arg(short, long)]
    pub log_all_events: bool,

    /// Run against a built-in simulated switch instead of connecting
    #[arg(long)]
    pub simulate: bool,
}

impl Args {
    /// Build the run configuration from the file (if any) and the flags
    pub fn load_config(&self) -> anyhow::Result<LoadConfig> {
        let mut config = match &self.config {
            Some(path) => read_config_file(path)?,
            None => LoadConfig::default(),
        };
        self.apply_overrides(&mut config);

        config.validate().context("invalid configuration")?;
        Ok(config)
    }

    fn apply_overrides(&self, config: &mut LoadConfig) {
        if let Some(address) = &self.address {
            config.address = address.clone();
        }
        if let Some(password) = &self.password {
            config.password = password.clone();
        }
        if let Some(destination) = &self.destination {
            config.destination = destination.clone();
        }
        if let Some(audio_file) = &self.audio_file {
            config.audio_file = audio_file.clone();
        }
        if let Some(total_calls) = self.total_calls {
            config.total_calls = total_calls;
        }
        if let Some(ramp_interval_ms) = self.ramp_interval_ms {
            config.ramp_interval_ms = ramp_interval_ms;
        }
        if let Some(hangup_delay_secs) = self.hangup_delay_secs {
            config.hangup_delay_secs = hangup_delay_secs;
        }
        if let Some(queue_capacity) = self.queue_capacity {
            config.event_queue_capacity = queue_capacity;
        }
        if self.log_all_events {
            config.log_all_events = true;
        }
    }
}

fn read_config_file(path: &Path) -> anyhow::Result<LoadConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("failed to parse config file {}", path.display()))
}
