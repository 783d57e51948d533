//! Load test configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::call::CallPlan;
use crate::error::LoadError;

/// Static configuration for one load test run
///
/// Every field has a default, so a partial JSON file is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    /// Event socket address (`host:port`)
    pub address: String,
    /// Event socket password
    pub password: String,
    /// Dial string appended to `sofia/external/sip:`
    pub destination: String,
    /// Audio file played once a call is answered
    pub audio_file: String,
    /// Number of calls to create
    pub total_calls: u64,
    /// Milliseconds between call creations
    pub ramp_interval_ms: u64,
    /// Seconds between playback end and hangup
    pub hangup_delay_secs: u32,
    /// Capacity of the queue between the event producer and the dispatch loop
    pub event_queue_capacity: usize,
    /// Log every event received from the switch
    pub log_all_events: bool,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            address: "localhost:8021".to_string(),
            password: "ClueCon".to_string(),
            destination: "18775437013@172.16.19.89:52173".to_string(),
            audio_file: "ivr-you_lose.wav".to_string(),
            total_calls: 10,
            ramp_interval_ms: 200,
            hangup_delay_secs: 1,
            event_queue_capacity: 32,
            log_all_events: false,
        }
    }
}

impl LoadConfig {
    /// Tick period of the ramp scheduler
    pub fn ramp_interval(&self) -> Duration {
        Duration::from_millis(self.ramp_interval_ms)
    }

    /// Per-call settings derived from this configuration
    pub fn call_plan(&self) -> CallPlan {
        CallPlan {
            destination: self.destination.clone(),
            audio_file: self.audio_file.clone(),
            hangup_delay_secs: self.hangup_delay_secs,
        }
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<(), LoadError> {
        let invalid =
            |msg: &str| -> Result<(), LoadError> { Err(LoadError::InvalidConfig(msg.to_string())) };

        if self.ramp_interval_ms == 0 {
            return invalid("ramp_interval_ms must be greater than zero");
        }
        if self.event_queue_capacity == 0 {
            return invalid("event_queue_capacity must be greater than zero");
        }
        if self.destination.trim().is_empty() {
            return invalid("destination must not be empty");
        }
        if self.audio_file.trim().is_empty() {
            return invalid("audio_file must not be empty");
        }
        if self.destination.contains(char::is_whitespace)
            || self.audio_file.contains(char::is_whitespace)
        {
            return invalid("destination and audio_file must not contain whitespace");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = LoadConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.ramp_interval(), Duration::from_millis(200));
        assert_eq!(config.event_queue_capacity, 32);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: LoadConfig =
            serde_json::from_str(r#"{"total_calls": 3, "audio_file": "beep.wav"}"#).unwrap();

        assert_eq!(config.total_calls, 3);
        assert_eq!(config.audio_file, "beep.wav");
        assert_eq!(config.password, "ClueCon");
        assert_eq!(config.ramp_interval_ms, 200);
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let config = LoadConfig {
            ramp_interval_ms: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(LoadError::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_rejects_zero_queue() {
        let config = LoadConfig {
            event_queue_capacity: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_whitespace_in_audio_file() {
        let config = LoadConfig {
            audio_file: "my prompt.wav".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_call_plan() {
        let plan = LoadConfig::default().call_plan();
        assert_eq!(plan.audio_file, "ivr-you_lose.wav");
        assert_eq!(plan.hangup_delay_secs, 1);
    }
}
