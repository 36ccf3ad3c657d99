//! Error types for sync operations

use crate::types::EntityType;
use std::error::Error;
use std::fmt;
use std::io;
use uuid::Uuid;

/// Main error type for sync operations
#[derive(Debug)]
pub enum SyncError {
	/// Record is malformed and was rejected before send
	Validation { message: String },

	/// Timeout or unreachable remote; transient, retryable
	Network { message: String },

	/// Timestamp divergence between local and remote versions of a
	/// record; never auto-resolved, the caller must resolve explicitly
	Conflict { record_id: Uuid },

	/// Remote 5xx; transient, retryable
	Server { status: u16, message: String },

	/// Remote 401/403; terminal for the attempt, never queued for retry
	Auth { status: u16 },

	/// Local storage failure; aborts the current pass without partial commit
	Storage { message: String },

	/// A sync pass for the same user and entity type is already running
	SyncInProgress { user_id: String, entity: EntityType },

	/// I/O error
	Io(io::Error),

	/// Generic error message
	Other { message: String },
}

impl SyncError {
	/// Whether retrying later can succeed (network or remote 5xx failures)
	pub fn is_transient(&self) -> bool {
		matches!(self, SyncError::Network { .. } | SyncError::Server { .. })
	}

	/// Whether this is a credential failure; retrying an invalid
	/// credential is pointless
	pub fn is_auth(&self) -> bool {
		matches!(self, SyncError::Auth { .. })
	}
}

impl fmt::Display for SyncError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SyncError::Validation { message } => {
				write!(f, "Validation failed: {}", message)
			}
			SyncError::Network { message } => {
				write!(f, "Network error: {}", message)
			}
			SyncError::Conflict { record_id } => {
				write!(f, "Record {} diverged from remote version", record_id)
			}
			SyncError::Server { status, message } => {
				write!(f, "Server error ({}): {}", status, message)
			}
			SyncError::Auth { status } => {
				write!(f, "Authentication rejected ({})", status)
			}
			SyncError::Storage { message } => {
				write!(f, "Local storage error: {}", message)
			}
			SyncError::SyncInProgress { user_id, entity } => {
				write!(f, "Sync already in progress for user {} entity {}", user_id, entity)
			}
			SyncError::Io(e) => write!(f, "I/O error: {}", e),
			SyncError::Other { message } => write!(f, "{}", message),
		}
	}
}

impl Error for SyncError {}

impl From<io::Error> for SyncError {
	fn from(e: io::Error) -> Self {
		SyncError::Io(e)
	}
}

impl From<String> for SyncError {
	fn from(e: String) -> Self {
		SyncError::Other { message: e }
	}
}

impl From<Box<dyn Error>> for SyncError {
	fn from(e: Box<dyn Error>) -> Self {
		SyncError::Other { message: e.to_string() }
	}
}

/// Map any storage backend failure into a `SyncError::Storage`
pub fn storage_error<E: fmt::Display>(e: E) -> SyncError {
	SyncError::Storage { message: e.to_string() }
}


// vim: ts=4
