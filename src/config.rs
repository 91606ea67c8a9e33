//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Every field has a default, so an empty file (or a missing section) yields
//! the stock session: one worker per role, queues of 5, a 100 s run.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::command::{Position, Thresholds};
use crate::error::{Result, SupervisorError};
use crate::telemetry::fuser::FusionBudget;
use crate::telemetry::recorder::RecorderSettings;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub connection: ConnectionConfig,
    pub session: SessionConfig,
    pub workers: WorkersConfig,
    pub heartbeat: HeartbeatConfig,
    pub telemetry: TelemetryConfig,
    pub command: CommandConfig,
    pub recorder: RecorderConfig,
    pub logging: LoggingConfig,
}

/// Vehicle link configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ConnectionConfig {
    #[serde(default = "default_peer_timeout_s")]
    pub peer_timeout_s: u64,

    #[serde(default = "default_require_peer")]
    pub require_peer: bool,
}

/// Supervised session configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    #[serde(default = "default_duration_s")]
    pub duration_s: u64,

    /// How often the supervisor collects worker outputs
    #[serde(default = "default_session_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_join_timeout_ms")]
    pub join_timeout_ms: u64,
}

/// Settings shared by every worker
#[derive(Debug, Deserialize, Clone)]
pub struct WorkersConfig {
    /// Receive timeout and pause poll step
    #[serde(default = "default_worker_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

/// Heartbeat configuration
#[derive(Debug, Deserialize, Clone)]
pub struct HeartbeatConfig {
    #[serde(default = "default_count")]
    pub sender_count: i64,

    #[serde(default = "default_count")]
    pub receiver_count: i64,

    #[serde(default = "default_queue_size")]
    pub queue_size: i64,

    #[serde(default = "default_heartbeat_period_ms")]
    pub period_ms: u64,

    #[serde(default = "default_disconnect_threshold")]
    pub disconnect_threshold: u32,
}

/// Telemetry fusion configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    #[serde(default = "default_count")]
    pub count: i64,

    #[serde(default = "default_queue_size")]
    pub queue_size: i64,

    #[serde(default = "default_cycle_budget_ms")]
    pub cycle_budget_ms: u64,

    #[serde(default = "default_message_timeout_ms")]
    pub message_timeout_ms: u64,
}

/// Control loop configuration
#[derive(Debug, Deserialize, Clone)]
pub struct CommandConfig {
    #[serde(default = "default_count")]
    pub count: i64,

    #[serde(default = "default_queue_size")]
    pub queue_size: i64,

    #[serde(default = "default_target")]
    pub target: Position,

    #[serde(default = "default_altitude_threshold_m")]
    pub altitude_threshold_m: f64,

    #[serde(default = "default_yaw_threshold_deg")]
    pub yaw_threshold_deg: f64,
}

/// Session recorder configuration
#[derive(Debug, Deserialize, Clone)]
pub struct RecorderConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_max_records_per_file")]
    pub max_records_per_file: usize,

    #[serde(default = "default_max_files_to_keep")]
    pub max_files_to_keep: usize,

    #[serde(default = "default_log_format")]
    pub format: String,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Also write logs to a daily file in this directory
    #[serde(default)]
    pub log_dir: Option<String>,
}

// Default value functions
fn default_peer_timeout_s() -> u64 { 30 }
fn default_require_peer() -> bool { true }

fn default_duration_s() -> u64 { 100 }
fn default_session_poll_interval_ms() -> u64 { 10 }
fn default_join_timeout_ms() -> u64 { 5000 }

fn default_worker_poll_interval_ms() -> u64 { 100 }

fn default_count() -> i64 { 1 }
fn default_queue_size() -> i64 { 5 }

fn default_heartbeat_period_ms() -> u64 { 1000 }
fn default_disconnect_threshold() -> u32 { 5 }

fn default_cycle_budget_ms() -> u64 { 1000 }
fn default_message_timeout_ms() -> u64 { 50 }

fn default_target() -> Position { Position::new(1.0, 1.0, 1.0) }
fn default_altitude_threshold_m() -> f64 { 0.5 }
fn default_yaw_threshold_deg() -> f64 { 5.0 }

fn default_log_dir() -> String { "./logs".to_string() }
fn default_max_records_per_file() -> usize { 10000 }
fn default_max_files_to_keep() -> usize { 10 }
fn default_log_format() -> String { "jsonl".to_string() }

fn default_log_level() -> String { "info".to_string() }

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            peer_timeout_s: default_peer_timeout_s(),
            require_peer: default_require_peer(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            duration_s: default_duration_s(),
            poll_interval_ms: default_session_poll_interval_ms(),
            join_timeout_ms: default_join_timeout_ms(),
        }
    }
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_worker_poll_interval_ms(),
        }
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            sender_count: default_count(),
            receiver_count: default_count(),
            queue_size: default_queue_size(),
            period_ms: default_heartbeat_period_ms(),
            disconnect_threshold: default_disconnect_threshold(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            count: default_count(),
            queue_size: default_queue_size(),
            cycle_budget_ms: default_cycle_budget_ms(),
            message_timeout_ms: default_message_timeout_ms(),
        }
    }
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            count: default_count(),
            queue_size: default_queue_size(),
            target: default_target(),
            altitude_threshold_m: default_altitude_threshold_m(),
            yaw_threshold_deg: default_yaw_threshold_deg(),
        }
    }
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            log_dir: default_log_dir(),
            max_records_per_file: default_max_records_per_file(),
            max_files_to_keep: default_max_files_to_keep(),
            format: default_log_format(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_dir: None,
        }
    }
}

impl ConnectionConfig {
    pub fn peer_timeout(&self) -> Duration {
        Duration::from_secs(self.peer_timeout_s)
    }
}

impl SessionConfig {
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_s)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }
}

impl WorkersConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl HeartbeatConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
}

impl TelemetryConfig {
    pub fn budget(&self) -> FusionBudget {
        FusionBudget {
            cycle: Duration::from_millis(self.cycle_budget_ms),
            message_timeout: Duration::from_millis(self.message_timeout_ms),
        }
    }
}

impl CommandConfig {
    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            altitude_m: self.altitude_threshold_m,
            yaw_deg: self.yaw_threshold_deg,
        }
    }
}

impl RecorderConfig {
    pub fn settings(&self) -> RecorderSettings {
        RecorderSettings {
            log_dir: PathBuf::from(&self.log_dir),
            max_records_per_file: self.max_records_per_file,
            max_files_to_keep: self.max_files_to_keep,
        }
    }
}

fn invalid(message: impl Into<String>) -> SupervisorError {
    SupervisorError::Config(message.into())
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use vehicle_supervisor::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// Counts must be positive; queue sizes may be any value (`<= 0` means
    /// unbounded).
    pub fn validate(&self) -> Result<()> {
        // Validate connection
        if self.connection.peer_timeout_s == 0 || self.connection.peer_timeout_s > 600 {
            return Err(invalid("peer_timeout_s must be between 1 and 600"));
        }

        // Validate session timing
        if self.session.duration_s == 0 {
            return Err(invalid("session duration_s must be greater than 0"));
        }

        if self.session.poll_interval_ms == 0 || self.session.poll_interval_ms > 1000 {
            return Err(invalid("session poll_interval_ms must be between 1 and 1000"));
        }

        if self.session.join_timeout_ms == 0 || self.session.join_timeout_ms > 60000 {
            return Err(invalid("join_timeout_ms must be between 1 and 60000"));
        }

        if self.workers.poll_interval_ms == 0 || self.workers.poll_interval_ms > 1000 {
            return Err(invalid("workers poll_interval_ms must be between 1 and 1000"));
        }

        // Validate worker counts
        for (name, count) in [
            ("heartbeat.sender_count", self.heartbeat.sender_count),
            ("heartbeat.receiver_count", self.heartbeat.receiver_count),
            ("telemetry.count", self.telemetry.count),
            ("command.count", self.command.count),
        ] {
            if count <= 0 {
                return Err(invalid(format!(
                    "{} must be greater than 0, got {}",
                    name, count
                )));
            }
        }

        // Validate heartbeat
        if self.heartbeat.period_ms == 0 || self.heartbeat.period_ms > 60000 {
            return Err(invalid("heartbeat period_ms must be between 1 and 60000"));
        }

        if self.heartbeat.disconnect_threshold == 0 {
            return Err(invalid("disconnect_threshold must be greater than 0"));
        }

        // Validate fusion budget
        if self.telemetry.cycle_budget_ms == 0 || self.telemetry.cycle_budget_ms > 60000 {
            return Err(invalid("cycle_budget_ms must be between 1 and 60000"));
        }

        if self.telemetry.message_timeout_ms == 0
            || self.telemetry.message_timeout_ms >= self.telemetry.cycle_budget_ms
        {
            return Err(invalid(
                "message_timeout_ms must be greater than 0 and less than cycle_budget_ms",
            ));
        }

        // Validate control loop
        let target = self.command.target;
        if ![target.x, target.y, target.z].iter().all(|v| v.is_finite()) {
            return Err(invalid("command target must be finite"));
        }

        if !(self.command.altitude_threshold_m.is_finite() && self.command.altitude_threshold_m > 0.0) {
            return Err(invalid("altitude_threshold_m must be greater than 0"));
        }

        if !(self.command.yaw_threshold_deg > 0.0 && self.command.yaw_threshold_deg < 180.0) {
            return Err(invalid("yaw_threshold_deg must be between 0 and 180"));
        }

        // Validate recorder
        if self.recorder.enabled && self.recorder.log_dir.is_empty() {
            return Err(invalid("recorder log_dir cannot be empty when recording is enabled"));
        }

        if self.recorder.max_records_per_file == 0 {
            return Err(invalid("max_records_per_file must be greater than 0"));
        }

        if self.recorder.max_files_to_keep == 0 {
            return Err(invalid("max_files_to_keep must be greater than 0"));
        }

        if self.recorder.format != "jsonl" {
            return Err(invalid("recorder format must be 'jsonl' (only supported format)"));
        }

        // Validate logging
        if !["trace", "debug", "info", "warn", "error"].contains(&self.logging.level.as_str()) {
            return Err(invalid(
                "logging level must be one of: trace, debug, info, warn, error",
            ));
        }

        Ok(())
    }
}
