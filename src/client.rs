//! Remote service and local storage contracts consumed by the sync engine
//!
//! The engine depends only on these traits, never on a concrete transport
//! or storage backend. `RemoteSyncClient` mirrors the central service's
//! wire contract; `LocalStore` mirrors the device-local storage engine.
//! Both are supplied by the embedding application.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::SyncError;
use crate::strategies::ConflictResolutionStrategy;
use crate::types::{EntityType, LogStatus, SyncLogEntry, SyncType, SyncableRecord};

/// Result type for remote and local store operations
pub type ClientResult<T> = Result<T, SyncError>;

/// Run a remote call under a bounded timeout
///
/// Network calls are the only suspension points in the engine; every one
/// of them runs through here so an unreachable remote turns into a
/// transient `SyncError::Network` instead of a hung pass.
pub(crate) async fn with_timeout<T>(
	duration: std::time::Duration,
	fut: impl std::future::Future<Output = ClientResult<T>>,
) -> ClientResult<T> {
	match tokio::time::timeout(duration, fut).await {
		Ok(result) => result,
		Err(_) => Err(SyncError::Network {
			message: format!("request timed out after {}s", duration.as_secs()),
		}),
	}
}

// ============================================================================
// WIRE TYPES
// ============================================================================

/// Body of `POST /sync/{entityType}`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
	pub device_id: String,
	/// Watermark below which remote changes are assumed already known
	pub last_sync_time: u64,
	pub records: Vec<SyncableRecord>,
}

/// Per-pass statistics returned by the sync endpoints
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatistics {
	pub uploaded_count: usize,
	pub downloaded_count: usize,
	pub conflict_count: usize,
	pub failed_count: usize,
}

/// Response of `POST /sync/{entityType}`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
	pub success: bool,
	pub data: Vec<SyncableRecord>,
	pub statistics: SyncStatistics,
	pub server_timestamp: u64,
}

/// Response of `POST /sync/batch`: per-entity plus aggregate statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSyncResponse {
	pub success: bool,
	pub per_entity: HashMap<String, SyncStatistics>,
	pub aggregate: SyncStatistics,
	pub server_timestamp: u64,
}

/// Body of `POST /sync/resolve-conflicts`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveRequest {
	pub record_id: Uuid,
	pub record_type: EntityType,
	pub resolution: ConflictResolutionStrategy,
	/// Local version, sent when the resolution keeps client data
	pub client_data: Option<SyncableRecord>,
	pub device_id: String,
}

/// Response of `POST /sync/resolve-conflicts`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveResponse {
	pub success: bool,
	pub resolved_data: Option<SyncableRecord>,
	pub server_timestamp: u64,
}

/// Query string of `GET /sync/logs`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogQuery {
	pub device_id: Option<String>,
	pub start_time: Option<u64>,
	pub end_time: Option<u64>,
	pub sync_type: Option<SyncType>,
	pub status: Option<LogStatus>,
	pub page: usize,
	pub page_size: usize,
}

// ============================================================================
// REMOTE SERVICE CONTRACT
// ============================================================================

/// Wire contract to the central sync service
///
/// Implementations carry the bearer credential supplied by the embedding
/// application's auth collaborator and surface 401/403 as
/// `SyncError::Auth`, 5xx as `SyncError::Server` and transport failures as
/// `SyncError::Network`. Upserts key on the record's own id, so repeating
/// an operation after a successful-but-unacknowledged attempt is a no-op
/// rather than a duplicate.
#[async_trait]
pub trait RemoteSyncClient: Send + Sync {
	/// Fetch the remote counterpart of a record by id
	async fn get_record(
		&self,
		entity: EntityType,
		id: Uuid,
	) -> ClientResult<Option<SyncableRecord>>;

	/// Insert or overwrite a record, keyed by its id
	async fn upsert_record(&self, record: &SyncableRecord) -> ClientResult<()>;

	/// Delete a record by id; deleting an absent record is a no-op
	async fn delete_record(&self, entity: EntityType, id: Uuid) -> ClientResult<()>;

	/// Remote records of a user changed after the given watermark
	async fn query_updated_since(
		&self,
		entity: EntityType,
		user_id: &str,
		since: u64,
	) -> ClientResult<Vec<SyncableRecord>>;

	/// Push an explicit conflict resolution (`POST /sync/resolve-conflicts`)
	async fn resolve_conflict(&self, request: &ResolveRequest) -> ClientResult<ResolveResponse>;

	/// Query the central service's audit log (`GET /sync/logs`)
	async fn fetch_logs(&self, query: &LogQuery) -> ClientResult<Vec<SyncLogEntry>>;
}

// ============================================================================
// LOCAL STORAGE CONTRACT
// ============================================================================

/// Device-local storage engine consumed by the sync engine
///
/// Reads and writes are synchronous and fast; the engine never awaits on
/// local storage. `commit_pass` is the transactional seam: either the full
/// set of changes from one sync pass commits, or none of it does.
pub trait LocalStore: Send + Sync {
	/// Records awaiting upload for one entity type
	fn get_pending(&self, entity: EntityType) -> ClientResult<Vec<SyncableRecord>>;

	/// Insert a record
	fn save(&self, record: &SyncableRecord) -> ClientResult<()>;

	/// Overwrite an existing record
	fn update(&self, record: &SyncableRecord) -> ClientResult<()>;

	/// Remove a record by id
	fn delete(&self, id: Uuid) -> ClientResult<()>;

	/// Fetch a record by id
	fn get(&self, id: Uuid) -> ClientResult<Option<SyncableRecord>>;

	/// Local records changed after the given watermark
	fn query_updated_since(&self, entity: EntityType, since: u64)
		-> ClientResult<Vec<SyncableRecord>>;

	/// Atomically persist all record changes produced by one sync pass
	fn commit_pass(&self, records: &[SyncableRecord]) -> ClientResult<()>;
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_sync_request_wire_shape() {
		let request = SyncRequest {
			device_id: "device-a".to_string(),
			last_sync_time: 1_700_000,
			records: vec![],
		};
		let json = serde_json::to_string(&request).unwrap();
		assert!(json.contains("\"deviceId\""));
		assert!(json.contains("\"lastSyncTime\""));
	}

	#[test]
	fn test_statistics_default_is_zeroed() {
		let stats = SyncStatistics::default();
		assert_eq!(stats.uploaded_count, 0);
		assert_eq!(stats.conflict_count, 0);
	}

	#[test]
	fn test_sync_response_wire_shape() {
		let response = SyncResponse {
			success: true,
			data: vec![],
			statistics: SyncStatistics { uploaded_count: 2, ..SyncStatistics::default() },
			server_timestamp: 1_700_000,
		};
		let json = serde_json::to_string(&response).unwrap();
		assert!(json.contains("\"uploadedCount\":2"));
		assert!(json.contains("\"serverTimestamp\""));
	}

	#[test]
	fn test_batch_response_carries_per_entity_statistics() {
		let mut per_entity = HashMap::new();
		per_entity.insert(
			EntityType::CalculationRecord.to_string(),
			SyncStatistics { uploaded_count: 1, ..SyncStatistics::default() },
		);
		let response = BatchSyncResponse {
			success: true,
			per_entity,
			aggregate: SyncStatistics { uploaded_count: 1, ..SyncStatistics::default() },
			server_timestamp: 1_700_000,
		};
		let parsed: BatchSyncResponse =
			serde_json::from_str(&serde_json::to_string(&response).unwrap()).unwrap();
		assert_eq!(parsed.per_entity.len(), 1);
		assert_eq!(parsed.aggregate.uploaded_count, 1);
	}

	#[test]
	fn test_resolve_request_carries_strategy() {
		let request = ResolveRequest {
			record_id: Uuid::new_v4(),
			record_type: EntityType::CalculationRecord,
			resolution: ConflictResolutionStrategy::ClientWins,
			client_data: None,
			device_id: "device-a".to_string(),
		};
		let json = serde_json::to_string(&request).unwrap();
		assert!(json.contains("client-wins"));
	}
}

// vim: ts=4
