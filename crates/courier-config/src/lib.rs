//! Configuration module for the courier engine.
//!
//! Provides structures and utilities for managing engine configuration.
//! Configuration is loaded from TOML files and validated so that all
//! policy knobs (assignment timeout, redispatch behavior, storage backend)
//! are properly set before the engine starts.

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
		ConfigError::Parse(err.message().to_string())
	}
}

/// Main configuration structure for the courier engine.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Engine policy configuration.
	pub engine: EngineConfig,
	/// Configuration for the storage backend.
	pub storage: StorageConfig,
	/// Configuration for the notification feed.
	#[serde(default)]
	pub feed: FeedConfig,
	/// Agent directory seeded at startup.
	#[serde(default)]
	pub directory: DirectoryConfig,
}

/// Policy for what happens after a dispatch offer is rejected or expires.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RedispatchPolicy {
	/// Offer the order to the next eligible agent automatically.
	Auto,
	/// Revert the order to ready and wait for the dispatch desk.
	Manual,
}

/// Engine policy configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
	/// Identifier for this engine instance, used in logs.
	pub id: String,
	/// Seconds a dispatch offer may stay unanswered before it expires.
	#[serde(default = "default_assignment_timeout_seconds")]
	pub assignment_timeout_seconds: u64,
	/// What to do when an offer is rejected or expires.
	#[serde(default = "default_redispatch_policy")]
	pub redispatch_policy: RedispatchPolicy,
	/// Upper bound on automatic dispatch offers per order.
	#[serde(default = "default_max_dispatch_attempts")]
	pub max_dispatch_attempts: u32,
}

fn default_assignment_timeout_seconds() -> u64 {
	120
}

fn default_redispatch_policy() -> RedispatchPolicy {
	RedispatchPolicy::Manual
}

fn default_max_dispatch_attempts() -> u32 {
	3
}

/// Configuration for the storage backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Which backend implementation to use ("memory" or "file").
	pub backend: String,
	/// Backend-specific configuration as raw TOML values.
	#[serde(default)]
	pub config: HashMap<String, toml::Value>,
}

impl StorageConfig {
	/// Returns a string value from the backend-specific configuration.
	pub fn get_str(&self, key: &str) -> Option<&str> {
		self.config.get(key).and_then(|v| v.as_str())
	}
}

/// Configuration for the notification feed.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FeedConfig {
	/// Broadcast channel capacity; slow subscribers lag past this point.
	#[serde(default = "default_feed_buffer_size")]
	pub buffer_size: usize,
}

impl Default for FeedConfig {
	fn default() -> Self {
		Self {
			buffer_size: default_feed_buffer_size(),
		}
	}
}

fn default_feed_buffer_size() -> usize {
	1024
}

/// Configuration for the agent directory.
///
/// Single-node deployments list their fleet here and get an in-memory
/// directory; larger deployments replace it with one backed by the admin
/// database and leave this section empty.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DirectoryConfig {
	/// Agents seeded into the in-memory directory at startup.
	#[serde(default)]
	pub agents: Vec<AgentSeed>,
}

/// A delivery agent entry in the configuration file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AgentSeed {
	pub id: String,
	pub name: String,
	#[serde(default)]
	pub phone: String,
	/// One of "bicycle", "motorbike" or "car".
	#[serde(default = "default_vehicle")]
	pub vehicle: String,
	#[serde(default)]
	pub vehicle_no: Option<String>,
	#[serde(default = "default_agent_active")]
	pub active: bool,
}

fn default_vehicle() -> String {
	"motorbike".into()
}

fn default_agent_active() -> bool {
	true
}

/// Known storage backend names.
const STORAGE_BACKENDS: &[&str] = &["memory", "file"];

/// Known vehicle kind names for agent seeds.
const VEHICLE_KINDS: &[&str] = &["bicycle", "motorbike", "car"];

impl Config {
	/// Loads configuration from a TOML file.
	pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let content = std::fs::read_to_string(path)?;
		Self::from_toml_str(&content)
	}

	/// Parses configuration from a TOML string and validates it.
	pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
		let config: Config = toml::from_str(content)?;
		config.validate()?;
		Ok(config)
	}

	/// Validates the configuration values.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.engine.id.is_empty() {
			return Err(ConfigError::Validation("engine.id must not be empty".into()));
		}
		if self.engine.assignment_timeout_seconds == 0 {
			return Err(ConfigError::Validation(
				"engine.assignment_timeout_seconds must be greater than zero".into(),
			));
		}
		if self.engine.max_dispatch_attempts == 0 {
			return Err(ConfigError::Validation(
				"engine.max_dispatch_attempts must be greater than zero".into(),
			));
		}
		if !STORAGE_BACKENDS.contains(&self.storage.backend.as_str()) {
			return Err(ConfigError::Validation(format!(
				"unknown storage backend '{}' (expected one of: {})",
				self.storage.backend,
				STORAGE_BACKENDS.join(", ")
			)));
		}
		if self.feed.buffer_size == 0 {
			return Err(ConfigError::Validation(
				"feed.buffer_size must be greater than zero".into(),
			));
		}
		for agent in &self.directory.agents {
			if agent.id.is_empty() {
				return Err(ConfigError::Validation(
					"directory agents must have non-empty ids".into(),
				));
			}
			if !VEHICLE_KINDS.contains(&agent.vehicle.as_str()) {
				return Err(ConfigError::Validation(format!(
					"unknown vehicle kind '{}' for agent '{}' (expected one of: {})",
					agent.vehicle,
					agent.id,
					VEHICLE_KINDS.join(", ")
				)));
			}
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;

	const VALID: &str = r#"
[engine]
id = "courier-test"
assignment_timeout_seconds = 30
redispatch_policy = "auto"

[storage]
backend = "memory"
"#;

	#[test]
	fn parses_valid_config_with_defaults() {
		let config = Config::from_toml_str(VALID).unwrap();
		assert_eq!(config.engine.id, "courier-test");
		assert_eq!(config.engine.assignment_timeout_seconds, 30);
		assert_eq!(config.engine.redispatch_policy, RedispatchPolicy::Auto);
		assert_eq!(config.engine.max_dispatch_attempts, 3);
		assert_eq!(config.feed.buffer_size, 1024);
	}

	#[test]
	fn rejects_unknown_backend() {
		let raw = VALID.replace("memory", "postgres");
		let err = Config::from_toml_str(&raw).unwrap_err();
		assert!(matches!(err, ConfigError::Validation(_)));
	}

	#[test]
	fn rejects_zero_timeout() {
		let raw = VALID.replace("assignment_timeout_seconds = 30", "assignment_timeout_seconds = 0");
		let err = Config::from_toml_str(&raw).unwrap_err();
		assert!(matches!(err, ConfigError::Validation(_)));
	}

	#[test]
	fn loads_from_file() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		file.write_all(VALID.as_bytes()).unwrap();
		let config = Config::from_file(file.path()).unwrap();
		assert_eq!(config.storage.backend, "memory");
	}

	#[test]
	fn parses_agent_seeds_and_rejects_unknown_vehicles() {
		let raw = format!(
			"{}\n[[directory.agents]]\nid = \"a1\"\nname = \"Rafiq\"\nvehicle = \"bicycle\"\n",
			VALID
		);
		let config = Config::from_toml_str(&raw).unwrap();
		assert_eq!(config.directory.agents.len(), 1);
		assert_eq!(config.directory.agents[0].vehicle, "bicycle");
		assert!(config.directory.agents[0].active);

		let bad = raw.replace("bicycle", "rickshaw");
		assert!(matches!(
			Config::from_toml_str(&bad).unwrap_err(),
			ConfigError::Validation(_)
		));
	}

	#[test]
	fn file_backend_reads_storage_path() {
		let raw = r#"
[engine]
id = "courier-test"

[storage]
backend = "file"
[storage.config]
storage_path = "/tmp/courier"
"#;
		let config = Config::from_toml_str(raw).unwrap();
		assert_eq!(config.storage.get_str("storage_path"), Some("/tmp/courier"));
	}
}
