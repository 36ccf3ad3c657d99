//! Process-level wiring of the sync engine
//!
//! Constructs the monitor, queue, coordinator and logger once as explicit
//! owned objects (no global mutable state) and runs the background tasks
//! that keep them moving: the periodic connectivity re-probe, the periodic
//! queue drain, and an immediate drain on every transition into the
//! connected state. All tasks are abortable; abandoning a pass or drain
//! mid-flight is safe because every record write is atomic and idempotent
//! by id.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

use crate::client::{LocalStore, RemoteSyncClient};
use crate::config::Config;
use crate::coordinator::{SyncCoordinator, SyncMode};
use crate::error::{storage_error, SyncError};
use crate::logging::*;
use crate::monitor::{DnsProbe, NetworkMonitor, ReachabilityProbe};
use crate::queue::OfflineQueue;
use crate::sync_log::SyncLogger;
use crate::types::{now_millis, EntityType};

/// Owns the engine singletons and their background tasks
pub struct SyncService {
	monitor: Arc<NetworkMonitor>,
	queue: Arc<OfflineQueue>,
	coordinator: Arc<SyncCoordinator>,
	logger: Arc<SyncLogger>,
	tasks: Vec<JoinHandle<()>>,
}

impl SyncService {
	/// Construct all components and spawn the background tasks, probing
	/// reachability with the default DNS probe
	pub fn start(
		config: Config,
		client: Arc<dyn RemoteSyncClient>,
		store: Arc<dyn LocalStore>,
	) -> Result<Self, SyncError> {
		let probe = Arc::new(DnsProbe::new(config.probe_timeout()));
		Self::start_with_probe(config, client, store, probe)
	}

	/// `start` with a caller-supplied reachability probe
	pub fn start_with_probe(
		config: Config,
		client: Arc<dyn RemoteSyncClient>,
		store: Arc<dyn LocalStore>,
		probe: Arc<dyn ReachabilityProbe>,
	) -> Result<Self, SyncError> {
		let config = Arc::new(config);
		std::fs::create_dir_all(&config.data_dir).map_err(storage_error)?;

		let logger =
			Arc::new(SyncLogger::open(&config.data_dir.join("sync_log.redb"))?);
		let monitor = Arc::new(NetworkMonitor::new(config.clone(), probe));
		let queue = Arc::new(OfflineQueue::open(
			&config.data_dir.join("queue.redb"),
			config.clone(),
			client.clone(),
			logger.clone(),
			monitor.subscribe(),
		)?);
		let coordinator = Arc::new(SyncCoordinator::new(
			config.clone(),
			client,
			store,
			queue.clone(),
			logger.clone(),
		));

		let mut tasks = Vec::new();

		// Periodic connectivity re-probe
		tasks.push(tokio::spawn(monitor.clone().run()));

		// Periodic queue drain; the queue itself gates on connectivity
		{
			let queue = queue.clone();
			let interval_secs = config.drain_interval_secs;
			tasks.push(tokio::spawn(async move {
				let mut ticker =
					tokio::time::interval(std::time::Duration::from_secs(interval_secs));
				ticker.tick().await;
				loop {
					ticker.tick().await;
					if let Err(e) = queue.drain().await {
						warn!(error = %e, "periodic queue drain failed");
					}
				}
			}));
		}

		// Immediate drain on every transition into connected, so queued
		// work does not wait for the next periodic tick
		{
			let queue = queue.clone();
			let mut rx = monitor.subscribe();
			tasks.push(tokio::spawn(async move {
				let mut was_connected = rx.borrow().is_connected();
				while rx.changed().await.is_ok() {
					let connected = rx.borrow_and_update().is_connected();
					if connected && !was_connected {
						info!("connectivity restored, draining offline queue");
						if let Err(e) = queue.drain().await {
							warn!(error = %e, "drain on reconnect failed");
						}
					}
					was_connected = connected;
				}
			}));
		}

		Ok(SyncService { monitor, queue, coordinator, logger, tasks })
	}

	/// The connectivity monitor (feed link signals through this)
	pub fn monitor(&self) -> &Arc<NetworkMonitor> {
		&self.monitor
	}

	/// The offline queue
	pub fn queue(&self) -> &Arc<OfflineQueue> {
		&self.queue
	}

	/// The sync coordinator (foreground "sync now" goes through this)
	pub fn coordinator(&self) -> &Arc<SyncCoordinator> {
		&self.coordinator
	}

	/// The audit logger
	pub fn logger(&self) -> &Arc<SyncLogger> {
		&self.logger
	}

	/// Run a background sync pass for every entity type whenever
	/// connectivity returns
	///
	/// The watermark for each entity type advances to the pass start time
	/// after a successful pass, so reconnects only download what changed
	/// while the device was offline. Passes run in background mode:
	/// transient upload failures land in the offline queue.
	pub fn start_auto_sync(&mut self, user_id: &str, device_id: &str) {
		let coordinator = self.coordinator.clone();
		let mut rx = self.monitor.subscribe();
		let user_id = user_id.to_string();
		let device_id = device_id.to_string();
		let watermarks: Mutex<HashMap<EntityType, u64>> = Mutex::new(HashMap::new());

		self.tasks.push(tokio::spawn(async move {
			let mut was_connected = rx.borrow().is_connected();
			while rx.changed().await.is_ok() {
				let connected = rx.borrow_and_update().is_connected();
				if connected && !was_connected {
					for entity in EntityType::all().iter() {
						let since = watermarks
							.lock()
							.map(|w| w.get(entity).copied().unwrap_or(0))
							.unwrap_or(0);
						let pass_started = now_millis();
						match coordinator
							.sync_pending(&user_id, &device_id, *entity, since,
								SyncMode::Background)
							.await
						{
							Ok(result) if result.success => {
								if let Ok(mut w) = watermarks.lock() {
									w.insert(*entity, pass_started);
								}
							}
							Ok(_) => {}
							Err(e) => {
								warn!(entity = %entity, error = %e, "auto-sync pass failed");
							}
						}
					}
				}
				was_connected = connected;
			}
		}));
	}

	/// Stop all background tasks
	pub fn shutdown(&mut self) {
		for task in self.tasks.drain(..) {
			task.abort();
		}
	}
}

impl Drop for SyncService {
	fn drop(&mut self) {
		self.shutdown();
	}
}

// vim: ts=4
