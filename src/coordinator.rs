//! Sync pass orchestration
//!
//! Runs upload-then-download passes per entity type, detects divergence
//! against the remote store, aggregates statistics, and guarantees at most
//! one in-flight pass per (user, entity type). Conflicts are reported to
//! the caller and never silently resolved; explicit resolution goes
//! through `resolve_conflict`.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use uuid::Uuid;

use crate::client::{with_timeout, LocalStore, RemoteSyncClient, ResolveRequest};
use crate::config::Config;
use crate::conflict::ConflictResolver;
use crate::error::SyncError;
use crate::logging::*;
use crate::queue::OfflineQueue;
use crate::strategies::ConflictResolutionStrategy;
use crate::sync_log::SyncLogger;
use crate::types::{
	EntityType, LogStatus, OfflineQueueItem, OperationType, SyncLogEntry, SyncStatus, SyncType,
	SyncableRecord,
};

/// How failures of a pass interact with the offline queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
	/// User-triggered: fail fast, surface errors immediately, never queue
	Foreground,

	/// Scheduled: transiently-failed uploads are deferred to the offline
	/// queue for replay
	Background,
}

/// Statistics and downloads produced by one sync pass
#[derive(Debug, Clone, Default)]
pub struct SyncResult {
	pub uploaded: usize,
	pub downloaded: usize,
	pub conflicts: usize,
	pub failed: usize,
	pub duration_ms: u64,
	/// Remote records changed since the caller's watermark
	pub records: Vec<SyncableRecord>,
	/// True when no record in the pass failed
	pub success: bool,
}

/// Aggregated result of a batch pass across entity types
#[derive(Debug, Clone, Default)]
pub struct BatchSyncResult {
	pub per_entity: Vec<(EntityType, SyncResult)>,
	pub uploaded: usize,
	pub downloaded: usize,
	pub conflicts: usize,
	pub failed: usize,
	pub duration_ms: u64,
	/// True only if every entity type's pass succeeded
	pub success: bool,
}

/// Outcome of uploading one local record
enum UploadOutcome {
	/// Remote had no counterpart; inserted
	Inserted,

	/// Local was newer; remote overwritten
	Overwrote,

	/// Remote is newer and payloads diverge; neither side mutated
	Conflict,

	/// Versions already agree; nothing to do
	Unchanged,
}

type InFlightSet = Arc<Mutex<HashSet<(String, EntityType)>>>;

/// Releases the (user, entity) pass slot on drop, error paths included
struct PassGuard {
	in_flight: InFlightSet,
	key: (String, EntityType),
}

impl Drop for PassGuard {
	fn drop(&mut self) {
		if let Ok(mut set) = self.in_flight.lock() {
			set.remove(&self.key);
		}
	}
}

/// Orchestrates upload and download passes against the remote service
pub struct SyncCoordinator {
	config: Arc<Config>,
	client: Arc<dyn RemoteSyncClient>,
	store: Arc<dyn LocalStore>,
	queue: Arc<OfflineQueue>,
	logger: Arc<SyncLogger>,
	resolver: ConflictResolver,
	in_flight: InFlightSet,
}

impl SyncCoordinator {
	pub fn new(
		config: Arc<Config>,
		client: Arc<dyn RemoteSyncClient>,
		store: Arc<dyn LocalStore>,
		queue: Arc<OfflineQueue>,
		logger: Arc<SyncLogger>,
	) -> Self {
		let resolver = ConflictResolver::new(config.conflict_resolution);
		SyncCoordinator {
			config,
			client,
			store,
			queue,
			logger,
			resolver,
			in_flight: Arc::new(Mutex::new(HashSet::new())),
		}
	}

	/// Claim the pass slot for (user, entity), or report a running pass
	fn acquire_pass(&self, user_id: &str, entity: EntityType) -> Result<PassGuard, SyncError> {
		let key = (user_id.to_string(), entity);
		let mut set = self
			.in_flight
			.lock()
			.map_err(|_| SyncError::Other { message: "in-flight guard poisoned".to_string() })?;
		if !set.insert(key.clone()) {
			return Err(SyncError::SyncInProgress { user_id: key.0, entity });
		}
		Ok(PassGuard { in_flight: self.in_flight.clone(), key })
	}

	/// Upload local changes for one entity type, then download remote
	/// changes past the watermark
	///
	/// Per-record upload failures are counted and do not abort the pass;
	/// credential rejection and local storage failure abort it. The upload
	/// phase always completes before the download phase begins, and
	/// records uploaded by this pass are excluded from its own download,
	/// so a device never re-downloads its own writes as if foreign.
	pub async fn sync_entity(
		&self,
		user_id: &str,
		device_id: &str,
		entity: EntityType,
		local_changes: &[SyncableRecord],
		last_sync_timestamp: u64,
		mode: SyncMode,
	) -> Result<SyncResult, SyncError> {
		let started = Instant::now();
		let _guard = self.acquire_pass(user_id, entity)?;

		info!(
			user_id,
			device_id,
			entity = %entity,
			changes = local_changes.len(),
			"starting sync pass"
		);

		let mut result = SyncResult::default();
		let mut pass_records: Vec<SyncableRecord> = Vec::new();
		let mut own_ids: HashSet<Uuid> = HashSet::new();

		// Upload phase
		for local in local_changes {
			own_ids.insert(local.id);
			match self.upload_one(local).await {
				Ok(UploadOutcome::Inserted) | Ok(UploadOutcome::Overwrote) => {
					result.uploaded += 1;
					pass_records.push(local.with_status(SyncStatus::Synced));
				}
				Ok(UploadOutcome::Unchanged) => {
					pass_records.push(local.with_status(SyncStatus::Synced));
				}
				Ok(UploadOutcome::Conflict) => {
					result.conflicts += 1;
					pass_records.push(local.with_status(SyncStatus::Conflict));
					debug!(record_id = %local.id, "divergence flagged for explicit resolution");
				}
				Err(e) if e.is_auth() => {
					// A rejected credential fails every remaining record the
					// same way; surface it instead of grinding through
					self.log_pass(user_id, device_id, 0, LogStatus::Failed, Some(&e))?;
					return Err(e);
				}
				Err(e) => {
					result.failed += 1;
					pass_records.push(local.with_status(SyncStatus::Failed));
					warn!(record_id = %local.id, error = %e, "record upload failed");
					if mode == SyncMode::Background && e.is_transient() {
						let item =
							OfflineQueueItem::for_record(OperationType::Sync, local)
								.map_err(|m| SyncError::Validation { message: m })?;
						self.queue.enqueue(&item)?;
					}
				}
			}
		}

		// Download phase
		let downloaded = match with_timeout(
			self.config.request_timeout(),
			self.client.query_updated_since(entity, user_id, last_sync_timestamp),
		)
		.await
		{
			Ok(records) => records,
			Err(e) => {
				self.log_pass(user_id, device_id, result.uploaded, LogStatus::Failed, Some(&e))?;
				return Err(e);
			}
		};

		for remote in downloaded {
			// Skip records this pass just uploaded
			if own_ids.contains(&remote.id) {
				continue;
			}
			result.downloaded += 1;
			let remote = remote.with_status(SyncStatus::Synced);
			pass_records.push(remote.clone());
			result.records.push(remote);
		}

		// Pass bookkeeping commits atomically or not at all
		self.store.commit_pass(&pass_records)?;

		result.duration_ms = started.elapsed().as_millis() as u64;
		result.success = result.failed == 0;

		let record_count = result.uploaded + result.downloaded;
		let status = if result.success { LogStatus::Success } else { LogStatus::Failed };
		self.log_pass(user_id, device_id, record_count, status, None)?;

		info!(
			uploaded = result.uploaded,
			downloaded = result.downloaded,
			conflicts = result.conflicts,
			failed = result.failed,
			duration_ms = result.duration_ms,
			"sync pass finished"
		);
		Ok(result)
	}

	/// Run `sync_entity` once per entity type and aggregate statistics
	///
	/// A pass that aborts (credential, storage) is recorded as a failed
	/// entry for its entity type; remaining entity types still run.
	pub async fn sync_batch(
		&self,
		user_id: &str,
		device_id: &str,
		changes: &[(EntityType, Vec<SyncableRecord>)],
		last_sync_timestamp: u64,
		mode: SyncMode,
	) -> BatchSyncResult {
		let started = Instant::now();
		let mut batch = BatchSyncResult { success: true, ..BatchSyncResult::default() };

		for (entity, local_changes) in changes {
			let outcome = self
				.sync_entity(user_id, device_id, *entity, local_changes, last_sync_timestamp, mode)
				.await;
			match outcome {
				Ok(result) => {
					batch.uploaded += result.uploaded;
					batch.downloaded += result.downloaded;
					batch.conflicts += result.conflicts;
					batch.failed += result.failed;
					batch.success = batch.success && result.success;
					batch.per_entity.push((*entity, result));
				}
				Err(e) => {
					error!(entity = %entity, error = %e, "entity pass aborted");
					batch.success = false;
					batch.per_entity.push((*entity, SyncResult::default()));
				}
			}
		}

		batch.duration_ms = started.elapsed().as_millis() as u64;
		batch
	}

	/// Upload-and-download pass fed from the local store's pending records
	pub async fn sync_pending(
		&self,
		user_id: &str,
		device_id: &str,
		entity: EntityType,
		last_sync_timestamp: u64,
		mode: SyncMode,
	) -> Result<SyncResult, SyncError> {
		let pending = self.store.get_pending(entity)?;
		self.sync_entity(user_id, device_id, entity, &pending, last_sync_timestamp, mode).await
	}

	/// Explicitly resolve a diverged pair and propagate the winner
	///
	/// The engine never picks a winner on its own: this is the only path
	/// that turns a flagged conflict back into a synced record. The
	/// resolution is pushed to the remote service and the winning record
	/// is persisted locally.
	pub async fn resolve_conflict(
		&self,
		local: &SyncableRecord,
		remote: &SyncableRecord,
		strategy: Option<ConflictResolutionStrategy>,
		device_id: &str,
	) -> Result<SyncableRecord, SyncError> {
		if local.id != remote.id {
			return Err(SyncError::Validation {
				message: format!(
					"cannot resolve records with different ids: {} vs {}",
					local.id, remote.id
				),
			});
		}

		let strategy = strategy.unwrap_or(self.config.conflict_resolution);
		let resolved = self.resolver.resolve(local, remote, Some(strategy));

		let request = ResolveRequest {
			record_id: resolved.id,
			record_type: resolved.entity,
			resolution: strategy,
			client_data: if resolved.payload == local.payload {
				Some(resolved.clone())
			} else {
				None
			},
			device_id: device_id.to_string(),
		};
		let response =
			with_timeout(self.config.request_timeout(), self.client.resolve_conflict(&request))
				.await?;

		let resolved = response.resolved_data.unwrap_or(resolved);
		self.store.update(&resolved)?;

		info!(record_id = %resolved.id, strategy = %strategy, "conflict resolved");
		Ok(resolved)
	}

	/// Whether two records are diverged versions of one logical record
	pub fn detect_conflict(&self, a: &SyncableRecord, b: &SyncableRecord) -> bool {
		self.resolver.detect_conflict(a, b)
	}

	fn log_pass(
		&self,
		user_id: &str,
		device_id: &str,
		record_count: usize,
		status: LogStatus,
		error: Option<&SyncError>,
	) -> Result<(), SyncError> {
		self.logger.append(&SyncLogEntry::new(
			user_id,
			device_id,
			SyncType::Bidirectional,
			record_count,
			status,
			error.map(|e| e.to_string()),
		))
	}

	/// Compare one local record against its remote counterpart and push
	/// the local version when it wins
	async fn upload_one(&self, local: &SyncableRecord) -> Result<UploadOutcome, SyncError> {
		let timeout = self.config.request_timeout();
		let remote =
			with_timeout(timeout, self.client.get_record(local.entity, local.id)).await?;

		match remote {
			None => {
				with_timeout(timeout, self.client.upsert_record(local)).await?;
				Ok(UploadOutcome::Inserted)
			}
			Some(remote) => {
				if local.updated_at > remote.updated_at {
					with_timeout(timeout, self.client.upsert_record(local)).await?;
					Ok(UploadOutcome::Overwrote)
				} else if local.updated_at < remote.updated_at {
					// Remote is newer. Identical payloads mean the versions
					// already agree; only true divergence is a conflict.
					if self.resolver.detect_conflict(local, &remote) {
						Ok(UploadOutcome::Conflict)
					} else {
						Ok(UploadOutcome::Unchanged)
					}
				} else {
					Ok(UploadOutcome::Unchanged)
				}
			}
		}
	}
}

// vim: ts=4
