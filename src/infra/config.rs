//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use crate::domain::classifier::{DEFAULT_NEAR_THRESHOLD, DEFAULT_PAIR_TOLERANCE};
use crate::domain::Classifier;
use anyhow::{ensure, Context};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct SerialConfig {
    #[serde(default = "default_serial_device")]
    pub device: String,
    #[serde(default = "default_serial_baud")]
    pub baud: u32,
    /// Upper bound on a single blocking read, so the loop can see shutdown
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Wait between checks while the device is unavailable
    #[serde(default = "default_idle_interval_ms")]
    pub idle_interval_ms: u64,
}

fn default_serial_device() -> String {
    "/dev/ttyACM0".to_string()
}

fn default_serial_baud() -> u32 {
    9600
}

fn default_read_timeout_ms() -> u64 {
    1000
}

fn default_idle_interval_ms() -> u64 {
    1000
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            device: default_serial_device(),
            baud: default_serial_baud(),
            read_timeout_ms: default_read_timeout_ms(),
            idle_interval_ms: default_idle_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlotsConfig {
    #[serde(default = "default_slot_count")]
    pub count: usize,
    /// Readings at or below this distance count as "near"
    #[serde(default = "default_near_threshold")]
    pub near_threshold: u32,
    /// Max difference between two near readings for the slot to be occupied
    #[serde(default = "default_pair_tolerance")]
    pub pair_tolerance: u32,
}

fn default_slot_count() -> usize {
    3
}

fn default_near_threshold() -> u32 {
    DEFAULT_NEAR_THRESHOLD
}

fn default_pair_tolerance() -> u32 {
    DEFAULT_PAIR_TOLERANCE
}

impl Default for SlotsConfig {
    fn default() -> Self {
        Self {
            count: default_slot_count(),
            near_threshold: default_near_threshold(),
            pair_tolerance: default_pair_tolerance(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_http_port")]
    pub port: u16,
}

fn default_http_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    5000
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { bind_address: default_http_bind_address(), port: default_http_port() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Interval for logging the counter summary (0 to disable)
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
}

fn default_metrics_interval() -> u64 {
    60
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval() }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub slots: SlotsConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    serial_device: String,
    serial_baud: u32,
    read_timeout_ms: u64,
    idle_interval_ms: u64,
    slot_count: usize,
    near_threshold: u32,
    pair_tolerance: u32,
    http_bind_address: String,
    http_port: u16,
    metrics_interval_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default".to_string())
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: String) -> Self {
        Self {
            serial_device: toml_config.serial.device,
            serial_baud: toml_config.serial.baud,
            read_timeout_ms: toml_config.serial.read_timeout_ms,
            idle_interval_ms: toml_config.serial.idle_interval_ms,
            slot_count: toml_config.slots.count,
            near_threshold: toml_config.slots.near_threshold,
            pair_tolerance: toml_config.slots.pair_tolerance,
            http_bind_address: toml_config.http.bind_address,
            http_port: toml_config.http.port,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            config_file,
        }
    }

    /// Determine config file path from args or environment
    pub fn resolve_config_path(cli_path: Option<&str>) -> String {
        if let Some(path) = cli_path {
            return path.to_string();
        }

        // Check CONFIG_FILE environment variable
        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        // Default to dev.toml
        "config/dev.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        ensure!(
            toml_config.slots.count > 0,
            "Invalid config file {}: slots.count must be at least 1",
            path.display()
        );

        Ok(Self::from_toml(toml_config, path.display().to_string()))
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "config_load_failed_using_defaults");
                Self::default()
            }
        }
    }

    /// Build the slot classifier described by this config
    pub fn classifier(&self) -> Classifier {
        Classifier::new(self.slot_count, self.near_threshold, self.pair_tolerance)
    }

    // Getters for all config fields
    pub fn serial_device(&self) -> &str {
        &self.serial_device
    }

    pub fn serial_baud(&self) -> u32 {
        self.serial_baud
    }

    pub fn read_timeout_ms(&self) -> u64 {
        self.read_timeout_ms
    }

    pub fn idle_interval_ms(&self) -> u64 {
        self.idle_interval_ms
    }

    pub fn slot_count(&self) -> usize {
        self.slot_count
    }

    pub fn near_threshold(&self) -> u32 {
        self.near_threshold
    }

    pub fn pair_tolerance(&self) -> u32 {
        self.pair_tolerance
    }

    pub fn http_bind_address(&self) -> &str {
        &self.http_bind_address
    }

    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to point the reader at another device
    pub fn with_serial_device(mut self, device: &str) -> Self {
        self.serial_device = device.to_string();
        self
    }

    /// Builder method for tests to shorten reader timings
    pub fn with_timings(mut self, read_timeout_ms: u64, idle_interval_ms: u64) -> Self {
        self.read_timeout_ms = read_timeout_ms;
        self.idle_interval_ms = idle_interval_ms;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.serial_device(), "/dev/ttyACM0");
        assert_eq!(config.serial_baud(), 9600);
        assert_eq!(config.read_timeout_ms(), 1000);
        assert_eq!(config.slot_count(), 3);
        assert_eq!(config.near_threshold(), 4);
        assert_eq!(config.pair_tolerance(), 1);
        assert_eq!(config.http_port(), 5000);
        assert_eq!(config.config_file(), "default");
    }

    #[test]
    fn test_default_classifier() {
        let classifier = Config::default().classifier();
        assert_eq!(classifier, Classifier::with_defaults(3));
    }

    #[test]
    fn test_resolve_config_path_from_arg() {
        assert_eq!(Config::resolve_config_path(Some("config/bay.toml")), "config/bay.toml");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml_config: TomlConfig = toml::from_str(
            r#"
[serial]
device = "COM4"
"#,
        )
        .unwrap();
        let config = Config::from_toml(toml_config, "inline".to_string());
        assert_eq!(config.serial_device(), "COM4");
        assert_eq!(config.serial_baud(), 9600);
        assert_eq!(config.slot_count(), 3);
        assert_eq!(config.http_bind_address(), "0.0.0.0");
    }

    #[test]
    fn test_builders() {
        let config = Config::default().with_serial_device("/dev/null").with_timings(10, 20);
        assert_eq!(config.serial_device(), "/dev/null");
        assert_eq!(config.read_timeout_ms(), 10);
        assert_eq!(config.idle_interval_ms(), 20);
    }
}
