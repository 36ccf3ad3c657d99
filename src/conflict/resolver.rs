//! Conflict resolution logic

use super::ConflictPair;
use crate::strategies::ConflictResolutionStrategy;
use crate::types::{SyncStatus, SyncableRecord};

/// Resolves diverged record pairs using configured strategies
pub struct ConflictResolver {
	/// Strategy applied when the caller does not name one
	default_strategy: ConflictResolutionStrategy,
}

impl ConflictResolver {
	/// Create a new conflict resolver with a default strategy
	pub fn new(default_strategy: ConflictResolutionStrategy) -> Self {
		ConflictResolver { default_strategy }
	}

	/// Whether two records are diverged versions of the same logical record
	///
	/// True iff both share an id and their payloads differ. Symmetric:
	/// `detect_conflict(a, b) == detect_conflict(b, a)` for all inputs.
	pub fn detect_conflict(&self, a: &SyncableRecord, b: &SyncableRecord) -> bool {
		a.id == b.id && a.payload_digest() != b.payload_digest()
	}

	/// Resolve a diverged pair, returning the winning record
	///
	/// Never mutates its inputs; the result is a fresh record marked
	/// `Synced`. Idempotent: re-applying the same strategy to an
	/// already-resolved pair yields an identical result.
	pub fn resolve(
		&self,
		local: &SyncableRecord,
		remote: &SyncableRecord,
		strategy: Option<ConflictResolutionStrategy>,
	) -> SyncableRecord {
		let strategy = strategy.unwrap_or(self.default_strategy);

		let winner = match strategy {
			ConflictResolutionStrategy::ClientWins => local,

			ConflictResolutionStrategy::ServerWins => remote,

			// Ties resolve to remote (arbitrary but fixed)
			ConflictResolutionStrategy::KeepNewest | ConflictResolutionStrategy::Merge => {
				if local.updated_at > remote.updated_at {
					local
				} else {
					remote
				}
			}
		};

		winner.with_status(SyncStatus::Synced)
	}

	/// Resolve a `ConflictPair` with the default strategy
	pub fn resolve_pair(&self, pair: &ConflictPair) -> SyncableRecord {
		self.resolve(&pair.local, &pair.remote, None)
	}
}


// vim: ts=4
