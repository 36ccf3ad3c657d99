//! Append-only audit trail of sync attempts
//!
//! Backed by a redb database. Keys sort by timestamp so queries walk the
//! table in time order; entries are never updated or deleted by the
//! engine (retention is an external concern).

use redb::{ReadableDatabase, ReadableTable, TableDefinition};
use std::path::Path;

use crate::error::{storage_error, SyncError};
use crate::types::{LogStatus, SyncLogEntry, SyncType};

/// Table of audit entries
/// Key: zero-padded timestamp millis + entry id (String)
/// Value: json5-serialized SyncLogEntry (bytes)
const LOG_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("sync_log");

/// Optional filter applied to log queries
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
	pub device_id: Option<String>,
	/// Inclusive lower bound, epoch milliseconds
	pub start_time: Option<u64>,
	/// Inclusive upper bound, epoch milliseconds
	pub end_time: Option<u64>,
	pub sync_type: Option<SyncType>,
	pub status: Option<LogStatus>,
}

impl LogFilter {
	fn matches(&self, entry: &SyncLogEntry) -> bool {
		if let Some(device_id) = &self.device_id {
			if &entry.device_id != device_id {
				return false;
			}
		}
		if let Some(start) = self.start_time {
			if entry.timestamp < start {
				return false;
			}
		}
		if let Some(end) = self.end_time {
			if entry.timestamp > end {
				return false;
			}
		}
		if let Some(sync_type) = self.sync_type {
			if entry.sync_type != sync_type {
				return false;
			}
		}
		if let Some(status) = self.status {
			if entry.status != status {
				return false;
			}
		}
		true
	}
}

/// Write-only audit logger with paginated read access
pub struct SyncLogger {
	db: redb::Database,
}

impl SyncLogger {
	/// Open or create the audit log database
	pub fn open(db_path: &Path) -> Result<Self, SyncError> {
		let db = redb::Database::create(db_path).map_err(storage_error)?;
		{
			let write_txn = db.begin_write().map_err(storage_error)?;
			let _ = write_txn.open_table(LOG_TABLE).map_err(storage_error)?;
			write_txn.commit().map_err(storage_error)?;
		}
		Ok(SyncLogger { db })
	}

	/// Append one audit entry; entries are immutable once written
	pub fn append(&self, entry: &SyncLogEntry) -> Result<(), SyncError> {
		let key = format!("{:020}:{}", entry.timestamp, entry.id);
		let bytes = json5::to_string(entry).map_err(storage_error)?.into_bytes();

		let write_txn = self.db.begin_write().map_err(storage_error)?;
		{
			let mut table = write_txn.open_table(LOG_TABLE).map_err(storage_error)?;
			table.insert(key.as_str(), bytes.as_slice()).map_err(storage_error)?;
		}
		write_txn.commit().map_err(storage_error)?;

		Ok(())
	}

	/// Query entries matching the filter, ordered timestamp-descending
	///
	/// `page` is zero-based; `page_size` bounds the returned slice.
	pub fn query(
		&self,
		filter: &LogFilter,
		page: usize,
		page_size: usize,
	) -> Result<Vec<SyncLogEntry>, SyncError> {
		let read_txn = self.db.begin_read().map_err(storage_error)?;
		let table = read_txn.open_table(LOG_TABLE).map_err(storage_error)?;

		let mut matched = Vec::new();
		let skip = page * page_size;

		for item in table.iter().map_err(storage_error)?.rev() {
			let (_, value) = item.map_err(storage_error)?;
			let bytes = value.value().to_vec();
			let entry: SyncLogEntry =
				json5::from_str(std::str::from_utf8(&bytes).map_err(storage_error)?)
					.map_err(storage_error)?;

			if !filter.matches(&entry) {
				continue;
			}
			if matched.len() == skip + page_size {
				break;
			}
			matched.push(entry);
		}

		Ok(matched.into_iter().skip(skip).take(page_size).collect())
	}

	/// Total number of entries in the log (diagnostics)
	pub fn len(&self) -> Result<usize, SyncError> {
		let read_txn = self.db.begin_read().map_err(storage_error)?;
		let table = read_txn.open_table(LOG_TABLE).map_err(storage_error)?;
		let mut count = 0;
		for item in table.iter().map_err(storage_error)? {
			item.map_err(storage_error)?;
			count += 1;
		}
		Ok(count)
	}

	/// Whether the log holds no entries
	pub fn is_empty(&self) -> Result<bool, SyncError> {
		Ok(self.len()? == 0)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;
	use uuid::Uuid;

	fn entry(device: &str, timestamp: u64, status: LogStatus) -> SyncLogEntry {
		SyncLogEntry {
			id: Uuid::new_v4(),
			user_id: "user-1".to_string(),
			device_id: device.to_string(),
			sync_type: SyncType::Bidirectional,
			record_count: 3,
			timestamp,
			status,
			error_message: None,
		}
	}

	fn open_logger(tmp: &TempDir) -> SyncLogger {
		SyncLogger::open(&tmp.path().join("log.redb")).unwrap()
	}

	#[test]
	fn test_append_and_count() {
		let tmp = TempDir::new().unwrap();
		let logger = open_logger(&tmp);
		assert!(logger.is_empty().unwrap());

		logger.append(&entry("device-a", 1_000, LogStatus::Success)).unwrap();
		logger.append(&entry("device-a", 2_000, LogStatus::Failed)).unwrap();
		assert_eq!(logger.len().unwrap(), 2);
	}

	#[test]
	fn test_query_orders_descending() {
		let tmp = TempDir::new().unwrap();
		let logger = open_logger(&tmp);
		logger.append(&entry("device-a", 1_000, LogStatus::Success)).unwrap();
		logger.append(&entry("device-a", 3_000, LogStatus::Success)).unwrap();
		logger.append(&entry("device-a", 2_000, LogStatus::Success)).unwrap();

		let entries = logger.query(&LogFilter::default(), 0, 10).unwrap();
		let timestamps: Vec<u64> = entries.iter().map(|e| e.timestamp).collect();
		assert_eq!(timestamps, vec![3_000, 2_000, 1_000]);
	}

	#[test]
	fn test_query_filters() {
		let tmp = TempDir::new().unwrap();
		let logger = open_logger(&tmp);
		logger.append(&entry("device-a", 1_000, LogStatus::Success)).unwrap();
		logger.append(&entry("device-b", 2_000, LogStatus::Failed)).unwrap();
		logger.append(&entry("device-a", 3_000, LogStatus::Failed)).unwrap();

		let filter =
			LogFilter { device_id: Some("device-a".to_string()), ..LogFilter::default() };
		assert_eq!(logger.query(&filter, 0, 10).unwrap().len(), 2);

		let filter = LogFilter { status: Some(LogStatus::Failed), ..LogFilter::default() };
		assert_eq!(logger.query(&filter, 0, 10).unwrap().len(), 2);

		let filter = LogFilter {
			start_time: Some(1_500),
			end_time: Some(2_500),
			..LogFilter::default()
		};
		let entries = logger.query(&filter, 0, 10).unwrap();
		assert_eq!(entries.len(), 1);
		assert_eq!(entries[0].timestamp, 2_000);
	}

	#[test]
	fn test_query_pagination() {
		let tmp = TempDir::new().unwrap();
		let logger = open_logger(&tmp);
		for ts in 1..=5u64 {
			logger.append(&entry("device-a", ts * 1_000, LogStatus::Success)).unwrap();
		}

		let first = logger.query(&LogFilter::default(), 0, 2).unwrap();
		let second = logger.query(&LogFilter::default(), 1, 2).unwrap();
		let third = logger.query(&LogFilter::default(), 2, 2).unwrap();

		assert_eq!(first.iter().map(|e| e.timestamp).collect::<Vec<_>>(), vec![5_000, 4_000]);
		assert_eq!(second.iter().map(|e| e.timestamp).collect::<Vec<_>>(), vec![3_000, 2_000]);
		assert_eq!(third.iter().map(|e| e.timestamp).collect::<Vec<_>>(), vec![1_000]);
	}

	#[test]
	fn test_entries_survive_reopen() {
		let tmp = TempDir::new().unwrap();
		let db_path = tmp.path().join("log.redb");
		{
			let logger = SyncLogger::open(&db_path).unwrap();
			logger.append(&entry("device-a", 1_000, LogStatus::Success)).unwrap();
		}
		let logger = SyncLogger::open(&db_path).unwrap();
		assert_eq!(logger.len().unwrap(), 1);
	}
}

// vim: ts=4
