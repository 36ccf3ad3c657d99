//! Configuration for the sync engine
//!
//! A single `Config` struct covers connectivity probing, offline queue
//! retry behavior, sync pass timeouts and storage locations. Defaults come
//! from `Config::default()`; a config file (TOML or JSON5) overrides them.

use crate::strategies::ConflictResolutionStrategy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Unified configuration for the sync engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
	// ========================================================================
	// STORAGE
	// ========================================================================
	/// Directory holding the offline queue and sync log databases
	pub data_dir: PathBuf,

	// ========================================================================
	// CONNECTIVITY PROBING
	// ========================================================================
	/// Hosts probed to validate reachability (host:port)
	///
	/// Link-layer signals alone are untrusted; a probe against one of
	/// these must succeed before the monitor declares connectivity.
	pub probe_hosts: Vec<String>,

	/// Seconds between periodic re-probes while no link change occurs
	pub probe_interval_secs: u64,

	/// Per-probe timeout in seconds
	pub probe_timeout_secs: u64,

	/// Consecutive failed probes before a connected state degrades to
	/// unstable
	pub unstable_threshold: u32,

	// ========================================================================
	// SYNC PASSES
	// ========================================================================
	/// Timeout for each remote call during a sync pass, in seconds
	pub request_timeout_secs: u64,

	/// Default strategy applied when a caller resolves a conflict without
	/// naming one
	pub conflict_resolution: ConflictResolutionStrategy,

	// ========================================================================
	// OFFLINE QUEUE
	// ========================================================================
	/// Seconds between periodic queue drains while connected
	pub drain_interval_secs: u64,

	/// Maximum queue items replayed per drain invocation
	pub drain_batch_size: usize,

	/// Replay attempts before a queue item is abandoned
	pub max_retry_attempts: u32,

	/// Backoff schedule in seconds, indexed by retry count; the last
	/// entry repeats for retries past the end of the schedule
	pub retry_backoff_secs: Vec<u64>,

	// ========================================================================
	// LOGGING
	// ========================================================================
	/// Log level (trace, debug, info, warn, error)
	pub log_level: String,
}

impl Default for Config {
	fn default() -> Self {
		Config {
			// Storage
			data_dir: std::env::var("HOME")
				.ok()
				.map(|h| PathBuf::from(h).join(".recsync"))
				.unwrap_or_else(|| PathBuf::from(".recsync")),

			// Probing
			probe_hosts: vec![
				"dns.google:53".to_string(),
				"one.one.one.one:53".to_string(),
			],
			probe_interval_secs: 30,
			probe_timeout_secs: 5,
			unstable_threshold: 3,

			// Sync passes
			request_timeout_secs: 30,
			conflict_resolution: ConflictResolutionStrategy::KeepNewest,

			// Queue
			drain_interval_secs: 60,
			drain_batch_size: 50,
			max_retry_attempts: 5,
			retry_backoff_secs: vec![5, 15, 30, 60, 300],

			// Logging
			log_level: "info".to_string(),
		}
	}
}

impl Config {
	/// Load configuration from a TOML or JSON5 file, merged over defaults
	pub fn load(path: &Path) -> Result<Self, String> {
		let contents = std::fs::read_to_string(path)
			.map_err(|e| format!("Failed to read config {}: {}", path.display(), e))?;

		match path.extension().and_then(|e| e.to_str()) {
			Some("toml") => toml::from_str(&contents)
				.map_err(|e| format!("Invalid TOML config: {}", e)),
			Some("json5") | Some("json") => json5::from_str(&contents)
				.map_err(|e| format!("Invalid JSON5 config: {}", e)),
			other => Err(format!(
				"Unsupported config format: {:?} (expected .toml, .json or .json5)",
				other
			)),
		}
	}

	/// Backoff delay for a given retry count
	///
	/// Retries past the end of the schedule reuse the final entry.
	pub fn backoff_for(&self, retry_count: u32) -> Duration {
		let secs = self
			.retry_backoff_secs
			.get(retry_count as usize)
			.or_else(|| self.retry_backoff_secs.last())
			.copied()
			.unwrap_or(60);
		Duration::from_secs(secs)
	}

	/// Per-request timeout as a `Duration`
	pub fn request_timeout(&self) -> Duration {
		Duration::from_secs(self.request_timeout_secs)
	}

	/// Per-probe timeout as a `Duration`
	pub fn probe_timeout(&self) -> Duration {
		Duration::from_secs(self.probe_timeout_secs)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_config_default() {
		let config = Config::default();
		assert_eq!(config.request_timeout_secs, 30);
		assert_eq!(config.drain_interval_secs, 60);
		assert_eq!(config.drain_batch_size, 50);
		assert_eq!(config.max_retry_attempts, 5);
		assert_eq!(config.unstable_threshold, 3);
		assert_eq!(config.retry_backoff_secs, vec![5, 15, 30, 60, 300]);
	}

	#[test]
	fn test_backoff_schedule_mapping() {
		let config = Config::default();
		assert_eq!(config.backoff_for(0), Duration::from_secs(5));
		assert_eq!(config.backoff_for(1), Duration::from_secs(15));
		assert_eq!(config.backoff_for(4), Duration::from_secs(300));
		// Past the end of the schedule the final entry repeats
		assert_eq!(config.backoff_for(99), Duration::from_secs(300));
	}

	#[test]
	fn test_config_toml_roundtrip() {
		let config = Config::default();
		let text = toml::to_string(&config).unwrap();
		let parsed: Config = toml::from_str(&text).unwrap();
		assert_eq!(parsed.drain_batch_size, config.drain_batch_size);
		assert_eq!(parsed.probe_hosts, config.probe_hosts);
	}

	#[test]
	fn test_partial_config_uses_defaults() {
		let parsed: Config = toml::from_str("drainBatchSize = 10\n").unwrap();
		assert_eq!(parsed.drain_batch_size, 10);
		assert_eq!(parsed.max_retry_attempts, 5);
	}
}

// vim: ts=4
