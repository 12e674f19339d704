//! Configuration module for the depot lifecycle system.
//!
//! This module provides structures and utilities for managing engine
//! configuration. It supports loading configuration from TOML files and
//! provides validation to ensure all required values are properly set.
//!
//! ## Modular Configuration Support
//!
//! Configurations can be split into multiple files for better organization:
//! - Use `include = ["file1.toml", "file2.toml"]` to include other config files
//! - Each top-level section must be unique across all files (no duplicates allowed)

mod loader;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Extract just the message without the huge input dump
		let message = err.message().to_string();
		ConfigError::Parse(message)
	}
}

/// Main configuration structure for the depot engine.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Configuration specific to this engine instance.
	pub depot: DepotConfig,
	/// Configuration for the storage backend.
	pub storage: StorageConfig,
	/// Configuration for the stale-order sweeper.
	#[serde(default)]
	pub sweeper: SweeperConfig,
	/// Configuration for the HTTP API server.
	pub api: Option<ApiConfig>,
	/// Operator directory used to resolve request principals to actors.
	#[serde(default)]
	pub operators: HashMap<String, OperatorConfig>,
}

/// Configuration specific to the engine instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DepotConfig {
	/// Unique identifier for this engine instance.
	pub id: String,
	/// Milliseconds a transition waits for an order's critical section
	/// before failing as busy.
	#[serde(default = "default_lock_wait_ms")]
	pub lock_wait_ms: u64,
}

/// Returns the default per-order lock wait in milliseconds.
fn default_lock_wait_ms() -> u64 {
	500
}

/// Configuration for the storage backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of storage implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Configuration for the stale-order sweeper.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SweeperConfig {
	/// Seconds between sweep cycles.
	#[serde(default = "default_sweep_interval_seconds")]
	pub interval_seconds: u64,
	/// Hours a pending order may stay unpaid before it is auto-canceled.
	#[serde(default = "default_stale_after_hours")]
	pub stale_after_hours: u64,
	/// Busy-retry attempts per order per sweep cycle.
	#[serde(default = "default_max_busy_retries")]
	pub max_busy_retries: u32,
}

impl Default for SweeperConfig {
	fn default() -> Self {
		Self {
			interval_seconds: default_sweep_interval_seconds(),
			stale_after_hours: default_stale_after_hours(),
			max_busy_retries: default_max_busy_retries(),
		}
	}
}

/// Returns the default sweep interval in seconds.
///
/// Five minutes keeps the sweep well under the 12 hour staleness
/// threshold without hammering storage.
fn default_sweep_interval_seconds() -> u64 {
	300
}

/// Returns the default staleness threshold in hours.
fn default_stale_after_hours() -> u64 {
	12
}

/// Returns the default number of busy retries per order per cycle.
fn default_max_busy_retries() -> u32 {
	3
}

/// Configuration for the HTTP API server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
	/// Whether the API server is enabled.
	#[serde(default)]
	pub enabled: bool,
	/// Host address to bind the server to.
	#[serde(default = "default_api_host")]
	pub host: String,
	/// Port to bind the server to.
	#[serde(default = "default_api_port")]
	pub port: u16,
}

/// Returns the default API host.
fn default_api_host() -> String {
	"127.0.0.1".to_string()
}

/// Returns the default API port.
fn default_api_port() -> u16 {
	3000
}

/// One entry in the operator directory.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OperatorConfig {
	/// Operator display name.
	pub name: String,
	/// Operator email.
	pub email: String,
	/// Operator role, e.g. "dispatcher".
	pub role: String,
}

/// Resolves environment variables in a string.
///
/// Replaces ${VAR_NAME} with the value of the environment variable VAR_NAME.
/// Supports default values with ${VAR_NAME:-default_value}.
///
/// Input strings are limited to 1MB to prevent ReDoS attacks.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024; // 1MB
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut result = input.to_string();
	let mut replacements = Vec::new();

	for cap in re.captures_iter(input) {
		let full_match = cap.get(0).unwrap();
		let var_name = cap.get(1).unwrap().as_str();
		let default_value = cap.get(2).map(|m| m.as_str());

		let value = match std::env::var(var_name) {
			Ok(v) => v,
			Err(_) => {
				if let Some(default) = default_value {
					default.to_string()
				} else {
					return Err(ConfigError::Validation(format!(
						"Environment variable '{}' not found",
						var_name
					)));
				}
			},
		};

		replacements.push((full_match.start(), full_match.end(), value));
	}

	// Apply replacements in reverse order to maintain positions
	for (start, end, value) in replacements.iter().rev() {
		result.replace_range(start..end, value);
	}

	Ok(result)
}

impl Config {
	/// Loads configuration from a file.
	///
	/// This method supports modular configuration through include directives:
	/// - `include = ["file1.toml", "file2.toml"]` - Include specific files
	///
	/// Each top-level section must be unique across all configuration files.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let path_buf = Path::new(path);
		let base_dir = path_buf.parent().unwrap_or_else(|| Path::new("."));

		let mut loader = loader::ConfigLoader::new(base_dir);
		let file_name = path_buf
			.file_name()
			.ok_or_else(|| ConfigError::Validation(format!("Invalid path: {}", path)))?;
		let config = loader.load_config(file_name).await?;
		config.validate()?;
		Ok(config)
	}

	/// Parses configuration from a TOML string, validating it.
	pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
		let resolved = resolve_env_vars(content)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}

	/// Validates the configuration to ensure all required fields are
	/// properly set.
	fn validate(&self) -> Result<(), ConfigError> {
		if self.depot.id.is_empty() {
			return Err(ConfigError::Validation("Depot ID cannot be empty".into()));
		}

		if self.storage.primary.is_empty() {
			return Err(ConfigError::Validation(
				"Storage primary implementation cannot be empty".into(),
			));
		}
		if self.storage.implementations.is_empty() {
			return Err(ConfigError::Validation(
				"At least one storage implementation must be configured".into(),
			));
		}
		if !self
			.storage
			.implementations
			.contains_key(&self.storage.primary)
		{
			return Err(ConfigError::Validation(format!(
				"Primary storage implementation '{}' is not configured",
				self.storage.primary
			)));
		}

		if self.sweeper.interval_seconds == 0 {
			return Err(ConfigError::Validation(
				"Sweeper interval must be at least 1 second".into(),
			));
		}
		if self.sweeper.stale_after_hours == 0 {
			return Err(ConfigError::Validation(
				"Stale-order threshold must be at least 1 hour".into(),
			));
		}

		for (principal, operator) in &self.operators {
			if operator.email.is_empty() {
				return Err(ConfigError::Validation(format!(
					"Operator '{}' must have an email",
					principal
				)));
			}
		}

		Ok(())
	}
}
