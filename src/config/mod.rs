//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if required vars are missing or a
//! numeric var does not parse. The sink token is wrapped in
//! secrecy::SecretString to keep it out of logs.

pub mod secrets;

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};
use secrets::SecretString;

#[derive(Debug)]
pub struct Config {
    pub node_id: String,
    pub recognition_url: String,
    pub telemetry_sink_url: String,
    pub telemetry_sink_token: Option<SecretString>,
    pub notify_webhook_url: Option<String>,
    pub suppression_window: Duration,
    pub alert_time_delay: Duration,
    pub remote_timeout: Duration,
    pub telemetry_timeout: Duration,
    pub max_in_flight: usize,
    pub welcome_pause: Duration,
    pub failed_event_capacity: usize,
    pub clip_dir: PathBuf,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    /// On the device, systemd EnvironmentFile provides the vars.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            node_id: required_var("NODE_ID")?,
            recognition_url: required_var("RECOGNITION_URL")?,
            telemetry_sink_url: required_var("TELEMETRY_SINK_URL")?,
            telemetry_sink_token: std::env::var("TELEMETRY_SINK_TOKEN")
                .ok()
                .map(SecretString::from),
            notify_webhook_url: std::env::var("NOTIFY_WEBHOOK_URL").ok(),
            suppression_window: secs_var("SUPPRESSION_WINDOW_SECS", 30.0)?,
            alert_time_delay: secs_var("ALERT_TIME_DELAY_SECS", 20.0)?,
            remote_timeout: secs_var("REMOTE_TIMEOUT_SECS", 10.0)?,
            telemetry_timeout: secs_var("TELEMETRY_TIMEOUT_SECS", 3.0)?,
            max_in_flight: parsed_var("MAX_IN_FLIGHT", 4)?,
            welcome_pause: Duration::from_millis(parsed_var("WELCOME_PAUSE_MS", 1000)?),
            failed_event_capacity: parsed_var("FAILED_EVENT_CAPACITY", 1000)?,
            clip_dir: std::env::var("CLIP_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("sounds")),
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// The parameters the pipeline core runs on.
    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            node_id: self.node_id.clone(),
            suppression_window: self.suppression_window,
            alert_time_delay: self.alert_time_delay,
            remote_timeout: self.remote_timeout,
            telemetry_timeout: self.telemetry_timeout,
            max_in_flight: self.max_in_flight.max(1),
            welcome_pause: self.welcome_pause,
            failed_event_capacity: self.failed_event_capacity.max(1),
        }
    }
}

/// Plain parameters for one pipeline instance.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub node_id: String,
    /// Minimum absence before an identity is reported again.
    pub suppression_window: Duration,
    /// Grace period between entry and the compliance recheck.
    pub alert_time_delay: Duration,
    /// Timeout on every recognition and profile call.
    pub remote_timeout: Duration,
    /// Timeout on each telemetry post.
    pub telemetry_timeout: Duration,
    /// Cap on concurrent entry recognition calls.
    pub max_in_flight: usize,
    /// Pause after each welcome acknowledgment.
    pub welcome_pause: Duration,
    /// Cap on the failed-event buffer.
    pub failed_event_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            node_id: "demo_entry".to_string(),
            suppression_window: Duration::from_secs(30),
            alert_time_delay: Duration::from_secs(20),
            remote_timeout: Duration::from_secs(10),
            telemetry_timeout: Duration::from_secs(3),
            max_in_flight: 4,
            welcome_pause: Duration::from_secs(1),
            failed_event_capacity: 1000,
        }
    }
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::Config(format!("required environment variable {name} is not set")))
}

fn parsed_var<T: FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("{name}={raw:?} is not valid: {e}"))),
        Err(_) => Ok(default),
    }
}

fn secs_var(name: &str, default: f64) -> Result<Duration> {
    let secs: f64 = parsed_var(name, default)?;
    Duration::try_from_secs_f64(secs)
        .map_err(|e| Error::Config(format!("{name}={secs} is not a valid duration: {e}")))
}
