//! # RecSync - Record Synchronization & Conflict-Resolution Engine
//!
//! RecSync reconciles engineering records (derived measurements and
//! parameter sets) produced on many devices with a central store, so that
//! every device eventually observes the same set of records per user. It
//! uploads local changes, downloads remote ones, detects divergence
//! between versions of the same logical record, resolves divergence with
//! an explicit caller-chosen strategy, and durably queues operations that
//! cannot complete while offline.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use recsync::config::Config;
//! use recsync::coordinator::SyncMode;
//! use recsync::service::SyncService;
//! use recsync::types::EntityType;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // client and store are supplied by the embedding application
//!     let service = SyncService::start(Config::default(), client, store)?;
//!     let result = service
//!         .coordinator()
//!         .sync_pending("user-1", "device-a", EntityType::CalculationRecord, 0,
//!             SyncMode::Foreground)
//!         .await?;
//!     println!("uploaded {} records", result.uploaded);
//!     Ok(())
//! }
//! ```
//!
//! Payloads are opaque blobs: the engine never deserializes or interprets
//! them, so callers own the record schema end to end.

pub mod client;
pub mod config;
pub mod conflict;
pub mod coordinator;
pub mod error;
pub mod logging;
pub mod monitor;
pub mod queue;
pub mod service;
pub mod strategies;
pub mod sync_log;
pub mod types;

// Re-export commonly used types
pub use client::{LocalStore, RemoteSyncClient};
pub use config::Config;
pub use conflict::{ConflictPair, ConflictResolver};
pub use coordinator::{BatchSyncResult, SyncCoordinator, SyncMode, SyncResult};
pub use error::SyncError;
pub use monitor::NetworkMonitor;
pub use queue::OfflineQueue;
pub use service::SyncService;
pub use strategies::ConflictResolutionStrategy;
pub use sync_log::{LogFilter, SyncLogger};
pub use types::{
	ConnStatus, EntityType, LinkType, NetworkState, OfflineQueueItem, SyncLogEntry, SyncStatus,
	SyncableRecord,
};

// vim: ts=4
