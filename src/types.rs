//! Core record, queue and network state types shared by all sync components

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Current time as milliseconds since the Unix epoch
pub fn now_millis() -> u64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|d| d.as_millis() as u64)
		.unwrap_or(0)
}

// ============================================================================
// RECORD MODEL
// ============================================================================

/// Record family a syncable record belongs to
///
/// Calculation records and parameter sets are structurally identical for
/// sync purposes; the entity type selects the remote endpoint and the
/// local storage partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntityType {
	/// A derived measurement produced on a device
	CalculationRecord,

	/// A named set of input parameters
	ParameterSet,
}

impl EntityType {
	/// All entity types, in the order batch sync processes them
	pub fn all() -> [EntityType; 2] {
		[EntityType::CalculationRecord, EntityType::ParameterSet]
	}
}

impl FromStr for EntityType {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_lowercase().as_str() {
			"calculation-record" | "calculation" => Ok(Self::CalculationRecord),
			"parameter-set" | "parameters" => Ok(Self::ParameterSet),
			_ => Err(format!(
				"Unknown entity type: {}. Valid options: calculation-record, parameter-set",
				s
			)),
		}
	}
}

impl fmt::Display for EntityType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::CalculationRecord => write!(f, "calculation-record"),
			Self::ParameterSet => write!(f, "parameter-set"),
		}
	}
}

/// Lifecycle tag on a syncable record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncStatus {
	/// Created or changed locally, not yet uploaded
	Pending,

	/// Part of an in-flight sync pass
	Syncing,

	/// Local and remote agree
	Synced,

	/// Last sync attempt failed
	Failed,

	/// Diverged from the remote version; needs explicit resolution
	Conflict,
}

impl Default for SyncStatus {
	fn default() -> Self {
		SyncStatus::Pending
	}
}

impl fmt::Display for SyncStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Pending => write!(f, "pending"),
			Self::Syncing => write!(f, "syncing"),
			Self::Synced => write!(f, "synced"),
			Self::Failed => write!(f, "failed"),
			Self::Conflict => write!(f, "conflict"),
		}
	}
}

/// One calculation record or parameter set as the sync engine sees it
///
/// The payload is an opaque serialized blob owned by the caller; the engine
/// never deserializes or interprets it. Identity is the caller-generated
/// `id` (assumed globally unique, e.g. UUIDv4). `updated_at` is
/// monotonically non-decreasing for writes originating from the same
/// device; the engine trusts but does not enforce this for foreign devices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncableRecord {
	/// Globally unique, caller-generated record identifier
	pub id: Uuid,

	/// Owning user
	pub owner_id: String,

	/// Device the record originated on (audit only, not conflict identity)
	pub device_id: String,

	/// Record family
	pub entity: EntityType,

	/// Opaque serialized payload; never interpreted by the engine
	pub payload: Vec<u8>,

	/// Creation time, epoch milliseconds
	pub created_at: u64,

	/// Last modification time, epoch milliseconds
	pub updated_at: u64,

	/// Sync lifecycle state
	#[serde(default)]
	pub status: SyncStatus,
}

impl SyncableRecord {
	/// Content digest of the payload, used for cheap divergence checks
	pub fn payload_digest(&self) -> blake3::Hash {
		blake3::hash(&self.payload)
	}

	/// Return a copy of this record with a different sync status
	pub fn with_status(&self, status: SyncStatus) -> SyncableRecord {
		SyncableRecord { status, ..self.clone() }
	}
}

// ============================================================================
// OFFLINE QUEUE MODEL
// ============================================================================

/// Kind of deferred operation held in the offline queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationType {
	Create,
	Update,
	Delete,
	Sync,
}

impl fmt::Display for OperationType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Create => write!(f, "create"),
			Self::Update => write!(f, "update"),
			Self::Delete => write!(f, "delete"),
			Self::Sync => write!(f, "sync"),
		}
	}
}

/// Durable record of one operation that could not complete
///
/// Created when an operation fails due to unreachability or a transient
/// remote error; mutated on each failed retry; removed on success or once
/// `retry_count` exceeds the configured maximum.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineQueueItem {
	/// Queue item identifier
	pub id: Uuid,

	/// Operation being deferred
	pub operation: OperationType,

	/// Record family of the affected record
	pub entity: EntityType,

	/// Identifier of the affected record
	pub record_id: Uuid,

	/// Snapshot of the record at enqueue time (json5-serialized)
	pub payload_snapshot: Vec<u8>,

	/// Enqueue time, epoch milliseconds
	pub created_at: u64,

	/// Number of failed replay attempts so far
	pub retry_count: u32,

	/// Time of the last failed replay, epoch milliseconds
	pub last_retry_at: Option<u64>,

	/// Message of the last replay failure
	pub last_error: Option<String>,
}

impl OfflineQueueItem {
	/// Build a queue item deferring the given operation on a record
	pub fn for_record(operation: OperationType, record: &SyncableRecord) -> Result<Self, String> {
		let snapshot = json5::to_string(record).map_err(|e| e.to_string())?.into_bytes();
		Ok(OfflineQueueItem {
			id: Uuid::new_v4(),
			operation,
			entity: record.entity,
			record_id: record.id,
			payload_snapshot: snapshot,
			created_at: now_millis(),
			retry_count: 0,
			last_retry_at: None,
			last_error: None,
		})
	}

	/// Deserialize the record snapshot taken at enqueue time
	pub fn record(&self) -> Result<SyncableRecord, String> {
		let text = std::str::from_utf8(&self.payload_snapshot).map_err(|e| e.to_string())?;
		json5::from_str(text).map_err(|e| e.to_string())
	}
}

// ============================================================================
// SYNC LOG MODEL
// ============================================================================

/// Direction of a logged sync pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncType {
	Upload,
	Download,
	Bidirectional,
}

impl fmt::Display for SyncType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Upload => write!(f, "upload"),
			Self::Download => write!(f, "download"),
			Self::Bidirectional => write!(f, "bidirectional"),
		}
	}
}

/// Outcome of a logged sync pass or queue replay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogStatus {
	Success,
	Failed,
}

/// One append-only audit entry; never mutated or deleted by the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncLogEntry {
	pub id: Uuid,
	pub user_id: String,
	pub device_id: String,
	pub sync_type: SyncType,
	pub record_count: usize,
	/// Epoch milliseconds
	pub timestamp: u64,
	pub status: LogStatus,
	pub error_message: Option<String>,
}

impl SyncLogEntry {
	/// Build a log entry stamped with the current time
	pub fn new(
		user_id: &str,
		device_id: &str,
		sync_type: SyncType,
		record_count: usize,
		status: LogStatus,
		error_message: Option<String>,
	) -> Self {
		SyncLogEntry {
			id: Uuid::new_v4(),
			user_id: user_id.to_string(),
			device_id: device_id.to_string(),
			sync_type,
			record_count,
			timestamp: now_millis(),
			status,
			error_message,
		}
	}
}

// ============================================================================
// NETWORK STATE
// ============================================================================

/// Connectivity status as validated by active reachability probes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnStatus {
	/// No validated connectivity
	Disconnected,

	/// Link is up, reachability probe in flight
	Connecting,

	/// Reachability confirmed
	Connected,

	/// Was connected, consecutive probes are failing
	Unstable,
}

impl Default for ConnStatus {
	fn default() -> Self {
		ConnStatus::Disconnected
	}
}

impl fmt::Display for ConnStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Disconnected => write!(f, "disconnected"),
			Self::Connecting => write!(f, "connecting"),
			Self::Connected => write!(f, "connected"),
			Self::Unstable => write!(f, "unstable"),
		}
	}
}

/// Link-layer transport type as reported by the platform
///
/// A non-`None` link is a hint only; connectivity is not trusted until an
/// active reachability probe succeeds (captive portals and VPNs produce
/// false positives at the link layer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LinkType {
	Wifi,
	Mobile,
	Ethernet,
	None,
	Other,
}

impl Default for LinkType {
	fn default() -> Self {
		LinkType::None
	}
}

/// Current network state; single writer (NetworkMonitor), many readers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NetworkState {
	pub status: ConnStatus,
	pub link: LinkType,
}

impl NetworkState {
	/// Whether network operations may be attempted right now
	pub fn is_connected(&self) -> bool {
		self.status == ConnStatus::Connected
	}
}


// vim: ts=4
