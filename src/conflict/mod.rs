//! Conflict detection and resolution

use crate::types::SyncableRecord;

pub mod resolver;

pub use resolver::ConflictResolver;

/// A local and a remote version of the same logical record
///
/// Exists only transiently during resolution; never persisted. Both sides
/// share the same record id; two unrelated records must never share an id
/// (a caller invariant, not something the engine can detect).
#[derive(Debug, Clone)]
pub struct ConflictPair {
	/// The version held on this device
	pub local: SyncableRecord,

	/// The version held by the central store
	pub remote: SyncableRecord,
}

impl ConflictPair {
	/// Pair up a local and remote version of one record
	///
	/// Returns None when the two records do not share an id and therefore
	/// cannot be versions of the same logical record.
	pub fn new(local: SyncableRecord, remote: SyncableRecord) -> Option<ConflictPair> {
		if local.id != remote.id {
			return None;
		}
		Some(ConflictPair { local, remote })
	}

	/// Whether the two sides hold different payloads
	pub fn is_divergent(&self) -> bool {
		self.local.payload_digest() != self.remote.payload_digest()
	}

	/// The side with the later modification time; ties go to remote
	pub fn newest(&self) -> &SyncableRecord {
		if self.local.updated_at > self.remote.updated_at {
			&self.local
		} else {
			&self.remote
		}
	}
}


// vim: ts=4
