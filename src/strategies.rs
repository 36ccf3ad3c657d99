//! Conflict resolution strategy enum
//!
//! Central location for the caller-chosen divergence resolution rule.
//! Includes a FromStr implementation for config parsing and a Display
//! implementation for logs and audit entries.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Caller-chosen rule for resolving a diverged record pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictResolutionStrategy {
	/// The local version wins unchanged
	ClientWins,

	/// The remote version wins unchanged
	ServerWins,

	/// Whichever version has the later `updated_at` wins; exact ties
	/// resolve in favor of the remote version (arbitrary but fixed)
	KeepNewest,

	/// Deterministic pick-a-side alias of `KeepNewest`. The upstream
	/// system advertised a field-level merge but never shipped one; until
	/// real merge semantics exist this behaves exactly like `KeepNewest`.
	Merge,
}

impl Default for ConflictResolutionStrategy {
	fn default() -> Self {
		ConflictResolutionStrategy::KeepNewest
	}
}

impl ConflictResolutionStrategy {
	/// Whether the strategy can run without user interaction
	///
	/// All current strategies are automatic; the method exists so callers
	/// routing between automatic and prompted resolution stay correct if
	/// an interactive variant is ever added.
	pub fn is_automatic(&self) -> bool {
		true
	}
}

impl FromStr for ConflictResolutionStrategy {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_lowercase().as_str() {
			"client-wins" | "client" | "local" => Ok(Self::ClientWins),
			"server-wins" | "server" | "remote" => Ok(Self::ServerWins),
			"keep-newest" | "newest" => Ok(Self::KeepNewest),
			"merge" => Ok(Self::Merge),
			_ => Err(format!(
				"Unknown conflict resolution strategy: {}. Valid options: client-wins, server-wins, keep-newest, merge",
				s
			)),
		}
	}
}

impl std::fmt::Display for ConflictResolutionStrategy {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::ClientWins => write!(f, "client-wins"),
			Self::ServerWins => write!(f, "server-wins"),
			Self::KeepNewest => write!(f, "keep-newest"),
			Self::Merge => write!(f, "merge"),
		}
	}
}


// vim: ts=4
