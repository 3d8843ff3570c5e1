//! Configuration system for page-load analysis.
//!
//! This module provides YAML/JSON configuration file support for the
//! throttling profile, graph construction and metric parameters.
//!
//! # Configuration File Structure
//!
//! ```yaml
//! throttling:
//!   rtt_ms: 150
//!   throughput_kbps: 1474.56
//!   cpu_slowdown_multiplier: 4
//!   max_connections_per_origin: 6
//!
//! graph:
//!   min_task_duration_ms: 10
//!   merge_gap_ms: 1
//!
//! metrics:
//!   quiet_window_ms: 5000
//!   interactive:
//!     intercept: 1600
//!     optimistic: 0.6
//!     pessimistic: 0.45
//!
//! log_level: info
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::types::SimTime;

/// Errors that can occur during configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown file format: {0}")]
    UnknownFormat(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Simulated network and CPU throttling.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottlingSettings {
    /// Round-trip time applied to every request
    pub rtt_ms: SimTime,
    /// Download throughput, kilobits per second
    pub throughput_kbps: f64,
    /// CPU multiplier under the pessimistic policy
    pub cpu_slowdown_multiplier: f64,
    /// CPU multiplier under the optimistic policy
    pub optimistic_cpu_multiplier: f64,
    /// Extra factor applied to layout tasks
    pub layout_task_multiplier: f64,
    /// Connection slots per origin under the pessimistic policy
    pub max_connections_per_origin: usize,
    pub dns_round_trips: u32,
    pub tcp_round_trips: u32,
    pub tls_round_trips: u32,
}

impl Default for ThrottlingSettings {
    fn default() -> Self {
        Self {
            rtt_ms: 150.0,
            throughput_kbps: 1474.56,
            cpu_slowdown_multiplier: 4.0,
            optimistic_cpu_multiplier: 1.0,
            layout_task_multiplier: 0.5,
            max_connections_per_origin: 6,
            dns_round_trips: 2,
            tcp_round_trips: 1,
            tls_round_trips: 1,
        }
    }
}

impl ThrottlingSettings {
    /// Validates the throttling profile.
    pub fn validate(&self) -> ConfigResult<()> {
        if !(self.rtt_ms.is_finite() && self.rtt_ms > 0.0) {
            return Err(ConfigError::Validation(format!(
                "rtt_ms must be positive, got {}",
                self.rtt_ms
            )));
        }
        if !(self.throughput_kbps.is_finite() && self.throughput_kbps > 0.0) {
            return Err(ConfigError::Validation(format!(
                "throughput_kbps must be positive, got {}",
                self.throughput_kbps
            )));
        }
        if !(self.cpu_slowdown_multiplier >= 1.0) {
            return Err(ConfigError::Validation(format!(
                "cpu_slowdown_multiplier must be at least 1, got {}",
                self.cpu_slowdown_multiplier
            )));
        }
        if !(self.optimistic_cpu_multiplier > 0.0) {
            return Err(ConfigError::Validation(format!(
                "optimistic_cpu_multiplier must be positive, got {}",
                self.optimistic_cpu_multiplier
            )));
        }
        if self.optimistic_cpu_multiplier > self.cpu_slowdown_multiplier {
            return Err(ConfigError::Validation(format!(
                "optimistic_cpu_multiplier ({}) must not exceed cpu_slowdown_multiplier ({})",
                self.optimistic_cpu_multiplier, self.cpu_slowdown_multiplier
            )));
        }
        if !(self.layout_task_multiplier > 0.0) {
            return Err(ConfigError::Validation(format!(
                "layout_task_multiplier must be positive, got {}",
                self.layout_task_multiplier
            )));
        }
        if self.max_connections_per_origin == 0 {
            return Err(ConfigError::Validation(
                "max_connections_per_origin must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Dependency graph construction parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphOptions {
    /// Merged CPU spans shorter than this are dropped
    pub min_task_duration_ms: SimTime,
    /// Adjacent spans of the same kind closer than this are merged
    pub merge_gap_ms: SimTime,
    /// How long after a task started its script request may still finish
    pub script_eval_slack_ms: SimTime,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            min_task_duration_ms: 10.0,
            merge_gap_ms: 1.0,
            script_eval_slack_ms: 100.0,
        }
    }
}

impl GraphOptions {
    pub fn validate(&self) -> ConfigResult<()> {
        for (name, value) in [
            ("min_task_duration_ms", self.min_task_duration_ms),
            ("merge_gap_ms", self.merge_gap_ms),
            ("script_eval_slack_ms", self.script_eval_slack_ms),
        ] {
            if !(value >= 0.0) {
                return Err(ConfigError::Validation(format!(
                    "graph.{} must not be negative, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

/// Linear blend of the optimistic and pessimistic estimates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlendCoefficients {
    pub intercept: f64,
    pub optimistic: f64,
    pub pessimistic: f64,
}

impl BlendCoefficients {
    pub const fn new(intercept: f64, optimistic: f64, pessimistic: f64) -> Self {
        Self {
            intercept,
            optimistic,
            pessimistic,
        }
    }

    /// Blends two estimates.
    ///
    /// The intercept is scaled down for very fast optimistic estimates so
    /// that a near-instant page does not pick up the full constant.
    pub fn blend(&self, optimistic: SimTime, pessimistic: SimTime) -> SimTime {
        let intercept_multiplier = if self.intercept > 0.0 {
            (optimistic / 1000.0).min(1.0)
        } else {
            1.0
        };
        self.intercept * intercept_multiplier
            + self.optimistic * optimistic
            + self.pessimistic * pessimistic
    }
}

/// Metric extraction parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricSettings {
    pub first_meaningful_paint: BlendCoefficients,
    pub interactive: BlendCoefficients,
    pub first_cpu_idle: BlendCoefficients,
    pub estimated_input_latency: BlendCoefficients,
    /// Length of a quiet window
    pub quiet_window_ms: SimTime,
    /// Tasks at least this long count as long tasks
    pub long_task_threshold_ms: SimTime,
    /// Requests allowed in flight inside a quiet window
    pub max_in_flight_requests: usize,
}

impl Default for MetricSettings {
    fn default() -> Self {
        Self {
            first_meaningful_paint: BlendCoefficients::new(900.0, 0.45, 0.6),
            interactive: BlendCoefficients::new(1600.0, 0.6, 0.45),
            first_cpu_idle: BlendCoefficients::new(1600.0, 0.6, 0.45),
            estimated_input_latency: BlendCoefficients::new(0.0, 0.4, 0.4),
            quiet_window_ms: 5000.0,
            long_task_threshold_ms: 50.0,
            max_in_flight_requests: 2,
        }
    }
}

impl MetricSettings {
    pub fn validate(&self) -> ConfigResult<()> {
        if !(self.quiet_window_ms > 0.0) {
            return Err(ConfigError::Validation(format!(
                "metrics.quiet_window_ms must be positive, got {}",
                self.quiet_window_ms
            )));
        }
        if !(self.long_task_threshold_ms >= 0.0) {
            return Err(ConfigError::Validation(format!(
                "metrics.long_task_threshold_ms must not be negative, got {}",
                self.long_task_threshold_ms
            )));
        }
        let blends = [
            ("first_meaningful_paint", &self.first_meaningful_paint),
            ("interactive", &self.interactive),
            ("first_cpu_idle", &self.first_cpu_idle),
            ("estimated_input_latency", &self.estimated_input_latency),
        ];
        for (name, blend) in blends {
            if !(blend.intercept >= 0.0 && blend.optimistic >= 0.0 && blend.pessimistic >= 0.0) {
                return Err(ConfigError::Validation(format!(
                    "metrics.{} coefficients must not be negative",
                    name
                )));
            }
        }
        Ok(())
    }
}

/// Complete analysis configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default)]
    pub throttling: ThrottlingSettings,

    #[serde(default)]
    pub graph: GraphOptions,

    #[serde(default)]
    pub metrics: MetricSettings,

    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            throttling: ThrottlingSettings::default(),
            graph: GraphOptions::default(),
            metrics: MetricSettings::default(),
            log_level: default_log_level(),
        }
    }
}

impl AnalysisConfig {
    /// Creates the default configuration (simulated mobile 3G, 4x CPU).
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a YAML file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Loads configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> ConfigResult<Self> {
        let config: AnalysisConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Loads configuration from a JSON string.
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let config: AnalysisConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a file, auto-detecting format.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        match ext.to_lowercase().as_str() {
            "yaml" | "yml" => Self::from_yaml_file(path),
            "json" => Self::from_json_file(path),
            _ => Err(ConfigError::UnknownFormat(ext.to_string())),
        }
    }

    /// Validates the entire configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        self.throttling.validate()?;
        self.graph.validate()?;
        self.metrics.validate()?;
        Ok(())
    }

    /// Saves configuration to a YAML file.
    pub fn to_yaml_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Saves configuration to a JSON file.
    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Converts to YAML string.
    pub fn to_yaml(&self) -> ConfigResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Converts to JSON string.
    pub fn to_json(&self) -> ConfigResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Builder for creating AnalysisConfig programmatically.
#[derive(Default)]
pub struct AnalysisConfigBuilder {
    config: AnalysisConfig,
}

impl AnalysisConfigBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole throttling profile.
    pub fn throttling(mut self, throttling: ThrottlingSettings) -> Self {
        self.config.throttling = throttling;
        self
    }

    pub fn rtt_ms(mut self, rtt: SimTime) -> Self {
        self.config.throttling.rtt_ms = rtt;
        self
    }

    pub fn throughput_kbps(mut self, kbps: f64) -> Self {
        self.config.throttling.throughput_kbps = kbps;
        self
    }

    pub fn cpu_slowdown_multiplier(mut self, multiplier: f64) -> Self {
        self.config.throttling.cpu_slowdown_multiplier = multiplier;
        self
    }

    pub fn max_connections_per_origin(mut self, max: usize) -> Self {
        self.config.throttling.max_connections_per_origin = max;
        self
    }

    pub fn min_task_duration_ms(mut self, ms: SimTime) -> Self {
        self.config.graph.min_task_duration_ms = ms;
        self
    }

    pub fn quiet_window_ms(mut self, ms: SimTime) -> Self {
        self.config.metrics.quiet_window_ms = ms;
        self
    }

    pub fn interactive_coefficients(mut self, coefficients: BlendCoefficients) -> Self {
        self.config.metrics.interactive = coefficients;
        self
    }

    /// Sets the log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.log_level = level.into();
        self
    }

    /// Builds and validates the configuration.
    pub fn build(self) -> ConfigResult<AnalysisConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
