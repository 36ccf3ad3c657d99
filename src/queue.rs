//! Durable offline queue with at-least-once replay
//!
//! Operations that cannot complete immediately (no connectivity, transient
//! remote failure) are persisted to a redb database and replayed
//! oldest-first once connectivity returns. Replay is safe under
//! at-least-once delivery because the remote service upserts by record id.
//! Items past the retry cap are abandoned and logged, never silently
//! dropped and never retried again.

use redb::{ReadableDatabase, ReadableTable, TableDefinition};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;

use crate::client::{with_timeout, RemoteSyncClient};
use crate::config::Config;
use crate::error::{storage_error, SyncError};
use crate::logging::*;
use crate::sync_log::SyncLogger;
use crate::types::{
	now_millis, LogStatus, NetworkState, OfflineQueueItem, OperationType, SyncLogEntry, SyncType,
};

/// Table of queued operations
/// Key: zero-padded enqueue timestamp millis + item id (String)
/// Value: json5-serialized OfflineQueueItem (bytes)
const QUEUE_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("offline_queue");

/// Outcome counters for one drain invocation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainStats {
	/// Items replayed successfully and removed
	pub replayed: usize,

	/// Items removed without replay (retry cap reached, credential
	/// rejection, unreadable snapshot)
	pub abandoned: usize,

	/// Items whose replay failed transiently; left queued
	pub failed: usize,

	/// Items left untouched because their backoff window has not elapsed
	pub deferred: usize,
}

/// Durable store of deferred operations
///
/// The queue is the only writer of its own storage; other components defer
/// work exclusively through `enqueue`.
pub struct OfflineQueue {
	db: redb::Database,
	config: Arc<Config>,
	client: Arc<dyn RemoteSyncClient>,
	logger: Arc<SyncLogger>,
	network: watch::Receiver<NetworkState>,
}

impl OfflineQueue {
	/// Open or create the queue database
	pub fn open(
		db_path: &Path,
		config: Arc<Config>,
		client: Arc<dyn RemoteSyncClient>,
		logger: Arc<SyncLogger>,
		network: watch::Receiver<NetworkState>,
	) -> Result<Self, SyncError> {
		let db = redb::Database::create(db_path).map_err(storage_error)?;
		{
			let write_txn = db.begin_write().map_err(storage_error)?;
			let _ = write_txn.open_table(QUEUE_TABLE).map_err(storage_error)?;
			write_txn.commit().map_err(storage_error)?;
		}
		Ok(OfflineQueue { db, config, client, logger, network })
	}

	fn key_for(item: &OfflineQueueItem) -> String {
		format!("{:020}:{}", item.created_at, item.id)
	}

	/// Durably persist a deferred operation
	pub fn enqueue(&self, item: &OfflineQueueItem) -> Result<(), SyncError> {
		let key = Self::key_for(item);
		let bytes = json5::to_string(item).map_err(storage_error)?.into_bytes();

		let write_txn = self.db.begin_write().map_err(storage_error)?;
		{
			let mut table = write_txn.open_table(QUEUE_TABLE).map_err(storage_error)?;
			table.insert(key.as_str(), bytes.as_slice()).map_err(storage_error)?;
		}
		write_txn.commit().map_err(storage_error)?;

		debug!(
			item_id = %item.id,
			record_id = %item.record_id,
			operation = %item.operation,
			"queued offline operation"
		);
		Ok(())
	}

	/// Read all queued items oldest-first without removing them
	pub fn peek_all(&self) -> Result<Vec<OfflineQueueItem>, SyncError> {
		let read_txn = self.db.begin_read().map_err(storage_error)?;
		let table = read_txn.open_table(QUEUE_TABLE).map_err(storage_error)?;

		let mut items = Vec::new();
		for entry in table.iter().map_err(storage_error)? {
			let (_, value) = entry.map_err(storage_error)?;
			let bytes = value.value().to_vec();
			let item: OfflineQueueItem =
				json5::from_str(std::str::from_utf8(&bytes).map_err(storage_error)?)
					.map_err(storage_error)?;
			items.push(item);
		}
		Ok(items)
	}

	/// Number of queued items
	pub fn len(&self) -> Result<usize, SyncError> {
		Ok(self.peek_all()?.len())
	}

	/// Whether the queue holds no items
	pub fn is_empty(&self) -> Result<bool, SyncError> {
		Ok(self.len()? == 0)
	}

	fn remove(&self, item: &OfflineQueueItem) -> Result<(), SyncError> {
		let key = Self::key_for(item);
		let write_txn = self.db.begin_write().map_err(storage_error)?;
		{
			let mut table = write_txn.open_table(QUEUE_TABLE).map_err(storage_error)?;
			table.remove(key.as_str()).map_err(storage_error)?;
		}
		write_txn.commit().map_err(storage_error)?;
		Ok(())
	}

	fn update(&self, item: &OfflineQueueItem) -> Result<(), SyncError> {
		let key = Self::key_for(item);
		let bytes = json5::to_string(item).map_err(storage_error)?.into_bytes();
		let write_txn = self.db.begin_write().map_err(storage_error)?;
		{
			let mut table = write_txn.open_table(QUEUE_TABLE).map_err(storage_error)?;
			table.insert(key.as_str(), bytes.as_slice()).map_err(storage_error)?;
		}
		write_txn.commit().map_err(storage_error)?;
		Ok(())
	}

	/// Replay queued operations against the remote service, oldest-first
	///
	/// Processes at most `drain_batch_size` items per invocation so a long
	/// backlog never blocks the caller indefinitely. Makes zero remote
	/// calls unless the network state is connected.
	pub async fn drain(&self) -> Result<DrainStats, SyncError> {
		self.drain_limit(self.config.drain_batch_size).await
	}

	/// `drain` with an explicit per-invocation batch bound
	pub async fn drain_limit(&self, max_batch: usize) -> Result<DrainStats, SyncError> {
		let mut stats = DrainStats::default();

		if !self.network.borrow().is_connected() {
			debug!("skipping queue drain: not connected");
			return Ok(stats);
		}

		let batch: Vec<OfflineQueueItem> =
			self.peek_all()?.into_iter().take(max_batch).collect();
		if batch.is_empty() {
			return Ok(stats);
		}
		info!(items = batch.len(), "draining offline queue");

		let now = now_millis();
		for item in batch {
			// Connectivity can drop mid-drain; stop replaying immediately
			if !self.network.borrow().is_connected() {
				break;
			}

			if item.retry_count >= self.config.max_retry_attempts {
				self.abandon(&item, "retry limit reached")?;
				stats.abandoned += 1;
				continue;
			}

			if let Some(last) = item.last_retry_at {
				let backoff = self.config.backoff_for(item.retry_count).as_millis() as u64;
				if now < last.saturating_add(backoff) {
					stats.deferred += 1;
					continue;
				}
			}

			match self.replay(&item).await {
				Ok(()) => {
					self.remove(&item)?;
					self.log_outcome(&item, LogStatus::Success, None)?;
					stats.replayed += 1;
				}
				Err(e) if e.is_auth() => {
					// Retrying an invalid credential is pointless
					self.abandon(&item, &e.to_string())?;
					stats.abandoned += 1;
				}
				Err(e) => {
					warn!(
						item_id = %item.id,
						retry_count = item.retry_count + 1,
						error = %e,
						"queue replay failed"
					);
					let mut updated = item.clone();
					updated.retry_count += 1;
					updated.last_retry_at = Some(now_millis());
					updated.last_error = Some(e.to_string());
					self.update(&updated)?;
					stats.failed += 1;
				}
			}
		}

		Ok(stats)
	}

	/// Replay one deferred operation against the remote service
	async fn replay(&self, item: &OfflineQueueItem) -> Result<(), SyncError> {
		let timeout = self.config.request_timeout();
		match item.operation {
			OperationType::Delete => {
				with_timeout(timeout, self.client.delete_record(item.entity, item.record_id))
					.await
			}
			OperationType::Create | OperationType::Update | OperationType::Sync => {
				let record = item
					.record()
					.map_err(|e| SyncError::Validation { message: e })?;
				with_timeout(timeout, self.client.upsert_record(&record)).await
			}
		}
	}

	/// Remove an item terminally and surface the abandonment
	fn abandon(&self, item: &OfflineQueueItem, reason: &str) -> Result<(), SyncError> {
		warn!(
			item_id = %item.id,
			record_id = %item.record_id,
			retry_count = item.retry_count,
			reason,
			"abandoning queued operation"
		);
		self.remove(item)?;
		self.log_outcome(item, LogStatus::Failed, Some(reason.to_string()))
	}

	fn log_outcome(
		&self,
		item: &OfflineQueueItem,
		status: LogStatus,
		error_message: Option<String>,
	) -> Result<(), SyncError> {
		let (user_id, device_id) = match item.record() {
			Ok(record) => (record.owner_id, record.device_id),
			Err(_) => (String::new(), String::new()),
		};
		self.logger.append(&SyncLogEntry::new(
			&user_id,
			&device_id,
			SyncType::Upload,
			1,
			status,
			error_message,
		))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::client::{
		ClientResult, LogQuery, ResolveRequest, ResolveResponse,
	};
	use crate::sync_log::LogFilter;
	use crate::types::{ConnStatus, EntityType, LinkType, SyncStatus, SyncableRecord};
	use async_trait::async_trait;
	use std::sync::atomic::{AtomicUsize, Ordering};
	use std::sync::Mutex;
	use tempfile::TempDir;
	use uuid::Uuid;

	/// Scripted remote: counts calls, fails while `failing` is set
	struct ScriptedRemote {
		calls: AtomicUsize,
		failing: Mutex<Option<SyncError>>,
	}

	impl ScriptedRemote {
		fn new() -> Self {
			ScriptedRemote { calls: AtomicUsize::new(0), failing: Mutex::new(None) }
		}

		fn fail_with(&self, e: SyncError) {
			*self.failing.lock().unwrap() = Some(e);
		}

		fn succeed(&self) {
			*self.failing.lock().unwrap() = None;
		}

		fn call_count(&self) -> usize {
			self.calls.load(Ordering::SeqCst)
		}

		fn outcome(&self) -> ClientResult<()> {
			match &*self.failing.lock().unwrap() {
				Some(SyncError::Network { message }) => {
					Err(SyncError::Network { message: message.clone() })
				}
				Some(SyncError::Auth { status }) => Err(SyncError::Auth { status: *status }),
				Some(SyncError::Server { status, message }) => {
					Err(SyncError::Server { status: *status, message: message.clone() })
				}
				Some(e) => Err(SyncError::Other { message: e.to_string() }),
				None => Ok(()),
			}
		}
	}

	#[async_trait]
	impl RemoteSyncClient for ScriptedRemote {
		async fn get_record(
			&self,
			_entity: EntityType,
			_id: Uuid,
		) -> ClientResult<Option<SyncableRecord>> {
			self.calls.fetch_add(1, Ordering::SeqCst);
			self.outcome().map(|_| None)
		}

		async fn upsert_record(&self, _record: &SyncableRecord) -> ClientResult<()> {
			self.calls.fetch_add(1, Ordering::SeqCst);
			self.outcome()
		}

		async fn delete_record(&self, _entity: EntityType, _id: Uuid) -> ClientResult<()> {
			self.calls.fetch_add(1, Ordering::SeqCst);
			self.outcome()
		}

		async fn query_updated_since(
			&self,
			_entity: EntityType,
			_user_id: &str,
			_since: u64,
		) -> ClientResult<Vec<SyncableRecord>> {
			self.calls.fetch_add(1, Ordering::SeqCst);
			self.outcome().map(|_| Vec::new())
		}

		async fn resolve_conflict(
			&self,
			_request: &ResolveRequest,
		) -> ClientResult<ResolveResponse> {
			self.calls.fetch_add(1, Ordering::SeqCst);
			self.outcome().map(|_| ResolveResponse {
				success: true,
				resolved_data: None,
				server_timestamp: now_millis(),
			})
		}

		async fn fetch_logs(&self, _query: &LogQuery) -> ClientResult<Vec<SyncLogEntry>> {
			self.calls.fetch_add(1, Ordering::SeqCst);
			self.outcome().map(|_| Vec::new())
		}
	}

	struct Fixture {
		_tmp: TempDir,
		queue: OfflineQueue,
		remote: Arc<ScriptedRemote>,
		logger: Arc<SyncLogger>,
		network_tx: watch::Sender<NetworkState>,
	}

	fn fixture() -> Fixture {
		let tmp = TempDir::new().unwrap();
		let config = Arc::new(Config {
			data_dir: tmp.path().to_path_buf(),
			..Config::default()
		});
		let remote = Arc::new(ScriptedRemote::new());
		let logger = Arc::new(SyncLogger::open(&tmp.path().join("log.redb")).unwrap());
		let (network_tx, network_rx) = watch::channel(NetworkState {
			status: ConnStatus::Connected,
			link: LinkType::Wifi,
		});
		let queue = OfflineQueue::open(
			&tmp.path().join("queue.redb"),
			config,
			remote.clone(),
			logger.clone(),
			network_rx,
		)
		.unwrap();
		Fixture { _tmp: tmp, queue, remote, logger, network_tx }
	}

	fn record(payload: &[u8]) -> SyncableRecord {
		SyncableRecord {
			id: Uuid::new_v4(),
			owner_id: "user-1".to_string(),
			device_id: "device-a".to_string(),
			entity: EntityType::CalculationRecord,
			payload: payload.to_vec(),
			created_at: now_millis(),
			updated_at: now_millis(),
			status: SyncStatus::Pending,
		}
	}

	fn item(payload: &[u8]) -> OfflineQueueItem {
		OfflineQueueItem::for_record(OperationType::Update, &record(payload)).unwrap()
	}

	#[tokio::test]
	async fn test_enqueue_persists_oldest_first() {
		let fx = fixture();
		let mut first = item(b"one");
		first.created_at = 1_000;
		let mut second = item(b"two");
		second.created_at = 2_000;

		// Enqueue out of order; iteration must still be oldest-first
		fx.queue.enqueue(&second).unwrap();
		fx.queue.enqueue(&first).unwrap();

		let items = fx.queue.peek_all().unwrap();
		assert_eq!(items.len(), 2);
		assert_eq!(items[0].created_at, 1_000);
		assert_eq!(items[1].created_at, 2_000);
	}

	#[tokio::test]
	async fn test_drain_replays_and_removes_on_success() {
		let fx = fixture();
		for i in 0..5u8 {
			fx.queue.enqueue(&item(&[i])).unwrap();
		}

		let stats = fx.queue.drain().await.unwrap();
		assert_eq!(stats.replayed, 5);
		assert_eq!(stats.failed, 0);
		assert!(fx.queue.is_empty().unwrap());
		assert_eq!(fx.remote.call_count(), 5);

		// One success audit entry per replayed item
		let entries = fx.logger.query(&LogFilter::default(), 0, 50).unwrap();
		assert_eq!(entries.len(), 5);
		assert!(entries.iter().all(|e| e.status == LogStatus::Success));
	}

	#[tokio::test]
	async fn test_drain_makes_no_remote_calls_while_disconnected() {
		let fx = fixture();
		fx.queue.enqueue(&item(b"x")).unwrap();
		fx.network_tx
			.send(NetworkState { status: ConnStatus::Disconnected, link: LinkType::None })
			.unwrap();

		let stats = fx.queue.drain().await.unwrap();
		assert_eq!(stats, DrainStats::default());
		assert_eq!(fx.remote.call_count(), 0);
		assert_eq!(fx.queue.len().unwrap(), 1);
	}

	#[tokio::test]
	async fn test_drain_gates_on_unstable_and_connecting() {
		let fx = fixture();
		fx.queue.enqueue(&item(b"x")).unwrap();

		for status in [ConnStatus::Unstable, ConnStatus::Connecting].iter() {
			fx.network_tx
				.send(NetworkState { status: *status, link: LinkType::Wifi })
				.unwrap();
			fx.queue.drain().await.unwrap();
		}
		assert_eq!(fx.remote.call_count(), 0);
	}

	#[tokio::test]
	async fn test_failed_replay_requeues_with_incremented_retry() {
		let fx = fixture();
		fx.remote.fail_with(SyncError::Network { message: "unreachable".to_string() });
		fx.queue.enqueue(&item(b"x")).unwrap();

		let stats = fx.queue.drain().await.unwrap();
		assert_eq!(stats.failed, 1);

		let items = fx.queue.peek_all().unwrap();
		assert_eq!(items.len(), 1);
		assert_eq!(items[0].retry_count, 1);
		assert!(items[0].last_retry_at.is_some());
		assert!(items[0].last_error.as_ref().unwrap().contains("unreachable"));
	}

	#[tokio::test]
	async fn test_item_at_retry_cap_abandoned_without_remote_call() {
		let fx = fixture();
		let mut capped = item(b"x");
		capped.retry_count = 5; // == max_retry_attempts
		fx.queue.enqueue(&capped).unwrap();

		let stats = fx.queue.drain().await.unwrap();
		assert_eq!(stats.abandoned, 1);
		assert_eq!(fx.remote.call_count(), 0);
		assert!(fx.queue.is_empty().unwrap());

		let entries = fx.logger.query(&LogFilter::default(), 0, 10).unwrap();
		assert_eq!(entries.len(), 1);
		assert_eq!(entries[0].status, LogStatus::Failed);
	}

	#[tokio::test]
	async fn test_auth_failure_abandons_immediately() {
		let fx = fixture();
		fx.remote.fail_with(SyncError::Auth { status: 401 });
		fx.queue.enqueue(&item(b"x")).unwrap();

		let stats = fx.queue.drain().await.unwrap();
		assert_eq!(stats.abandoned, 1);
		assert_eq!(stats.failed, 0);
		assert!(fx.queue.is_empty().unwrap());
	}

	#[tokio::test]
	async fn test_backoff_defers_recently_failed_items() {
		let fx = fixture();
		let mut recent = item(b"x");
		recent.retry_count = 2;
		recent.last_retry_at = Some(now_millis());
		fx.queue.enqueue(&recent).unwrap();

		let stats = fx.queue.drain().await.unwrap();
		assert_eq!(stats.deferred, 1);
		assert_eq!(fx.remote.call_count(), 0);
		assert_eq!(fx.queue.len().unwrap(), 1);
	}

	#[tokio::test]
	async fn test_elapsed_backoff_allows_replay() {
		let fx = fixture();
		let mut stale = item(b"x");
		stale.retry_count = 1;
		// Failed long ago; the 15s backoff for retry_count 1 has elapsed
		stale.last_retry_at = Some(now_millis().saturating_sub(60_000));
		fx.queue.enqueue(&stale).unwrap();

		let stats = fx.queue.drain().await.unwrap();
		assert_eq!(stats.replayed, 1);
	}

	#[tokio::test]
	async fn test_drain_respects_batch_bound() {
		let fx = fixture();
		for i in 0..10u8 {
			let mut it = item(&[i]);
			it.created_at = 1_000 + i as u64;
			fx.queue.enqueue(&it).unwrap();
		}

		let stats = fx.queue.drain_limit(3).await.unwrap();
		assert_eq!(stats.replayed, 3);
		assert_eq!(fx.queue.len().unwrap(), 7);

		// Oldest items were processed first
		let remaining = fx.queue.peek_all().unwrap();
		assert_eq!(remaining[0].created_at, 1_003);
	}

	#[tokio::test]
	async fn test_delete_operation_replays_as_delete() {
		let fx = fixture();
		let rec = record(b"gone");
		let it = OfflineQueueItem::for_record(OperationType::Delete, &rec).unwrap();
		fx.queue.enqueue(&it).unwrap();

		let stats = fx.queue.drain().await.unwrap();
		assert_eq!(stats.replayed, 1);
		assert_eq!(fx.remote.call_count(), 1);
	}

	#[tokio::test]
	async fn test_replay_is_repeatable_after_transient_failure() {
		let fx = fixture();
		fx.remote.fail_with(SyncError::Server { status: 503, message: "busy".to_string() });
		let mut it = item(b"x");
		// Pretend the last failure was long ago so backoff has elapsed
		fx.queue.enqueue(&it).unwrap();

		fx.queue.drain().await.unwrap();
		it = fx.queue.peek_all().unwrap().remove(0);
		assert_eq!(it.retry_count, 1);

		// Remote recovers; force the backoff window shut
		fx.remote.succeed();
		let mut ready = it.clone();
		ready.last_retry_at = Some(now_millis().saturating_sub(600_000));
		fx.queue.update(&ready).unwrap();

		let stats = fx.queue.drain().await.unwrap();
		assert_eq!(stats.replayed, 1);
		assert!(fx.queue.is_empty().unwrap());
	}
}

// vim: ts=4
