//! Persistent sync-state store.
//!
//! A single embedded `redb` database backs two tables: the per-path shadow
//! record (`sync_state`) and the append-only operation log
//! (`operation_log`). Both are bincode-serialized values keyed by path (and
//! by a monotonic id for the log), the same shape the teacher codebase's
//! metadata cache used `redb` for.

use crate::error::{StateError, SyncError};
use crate::types::{OperationLogEntry, SyncState, SyncStatus};
use redb::{Database, ReadableTable, TableDefinition};
use std::path::Path;
use std::time::SystemTime;

const SYNC_STATE_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("sync_state");
const OPERATION_LOG_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("operation_log");
const METADATA_TABLE: TableDefinition<&str, &str> = TableDefinition::new("metadata");

const SCHEMA_VERSION: &str = "1";

/// Aggregate counts by [`SyncStatus`], plus the on-disk size of the store.
#[derive(Debug, Clone, Default)]
pub struct StateStats {
	pub total: usize,
	pub synced: usize,
	pub conflicted: usize,
	pub errored: usize,
	pub on_disk_bytes: u64,
}

pub struct StateStore {
	db: Database,
	path: std::path::PathBuf,
}

impl StateStore {
	/// Open (creating if absent) the state store at `path`.
	pub fn open(path: impl AsRef<Path>) -> Result<Self, SyncError> {
		let db = Database::create(path.as_ref())
			.map_err(|e| StateError::LoadFailed { source: Box::new(e) })?;
		let store = StateStore { db, path: path.as_ref().to_path_buf() };
		store.initialize()?;
		Ok(store)
	}

	/// Idempotently create both tables and stamp the schema version.
	pub fn initialize(&self) -> Result<(), SyncError> {
		let write = self.db.begin_write().map_err(|e| StateError::LoadFailed { source: Box::new(e) })?;
		{
			write
				.open_table(SYNC_STATE_TABLE)
				.map_err(|e| StateError::LoadFailed { source: Box::new(e) })?;
			write
				.open_table(OPERATION_LOG_TABLE)
				.map_err(|e| StateError::LoadFailed { source: Box::new(e) })?;
			let mut metadata = write
				.open_table(METADATA_TABLE)
				.map_err(|e| StateError::LoadFailed { source: Box::new(e) })?;
			if metadata
				.get("schema_version")
				.map_err(|e| StateError::LoadFailed { source: Box::new(e) })?
				.is_none()
			{
				metadata
					.insert("schema_version", SCHEMA_VERSION)
					.map_err(|e| StateError::SaveFailed { source: Box::new(e) })?;
			}
		}
		write.commit().map_err(|e| StateError::SaveFailed { source: Box::new(e) })?;
		Ok(())
	}

	pub fn get(&self, path: &str) -> Result<Option<SyncState>, SyncError> {
		let read = self.db.begin_read().map_err(|e| StateError::LoadFailed { source: Box::new(e) })?;
		let table =
			read.open_table(SYNC_STATE_TABLE).map_err(|e| StateError::LoadFailed { source: Box::new(e) })?;
		match table.get(path).map_err(|e| StateError::LoadFailed { source: Box::new(e) })? {
			Some(bytes) => {
				let state: SyncState = bincode::deserialize(bytes.value())
					.map_err(|e| StateError::Corrupted { message: e.to_string() })?;
				Ok(Some(state))
			}
			None => Ok(None),
		}
	}

	pub fn get_all(&self) -> Result<Vec<SyncState>, SyncError> {
		let read = self.db.begin_read().map_err(|e| StateError::LoadFailed { source: Box::new(e) })?;
		let table =
			read.open_table(SYNC_STATE_TABLE).map_err(|e| StateError::LoadFailed { source: Box::new(e) })?;
		let mut out = Vec::new();
		for entry in table.iter().map_err(|e| StateError::LoadFailed { source: Box::new(e) })? {
			let (_, value) = entry.map_err(|e| StateError::LoadFailed { source: Box::new(e) })?;
			let state: SyncState = bincode::deserialize(value.value())
				.map_err(|e| StateError::Corrupted { message: e.to_string() })?;
			out.push(state);
		}
		Ok(out)
	}

	pub fn get_by_status(&self, status: SyncStatus) -> Result<Vec<SyncState>, SyncError> {
		Ok(self.get_all()?.into_iter().filter(|s| s.status == status).collect())
	}

	pub fn upsert(&self, state: &SyncState) -> Result<(), SyncError> {
		let bytes =
			bincode::serialize(state).map_err(|e| StateError::SaveFailed { source: Box::new(e) })?;
		let write = self.db.begin_write().map_err(|e| StateError::SaveFailed { source: Box::new(e) })?;
		{
			let mut table = write
				.open_table(SYNC_STATE_TABLE)
				.map_err(|e| StateError::SaveFailed { source: Box::new(e) })?;
			table
				.insert(state.path.as_str(), bytes.as_slice())
				.map_err(|e| StateError::SaveFailed { source: Box::new(e) })?;
		}
		write.commit().map_err(|e| StateError::SaveFailed { source: Box::new(e) })?;
		Ok(())
	}

	pub fn delete(&self, path: &str) -> Result<(), SyncError> {
		let write = self.db.begin_write().map_err(|e| StateError::SaveFailed { source: Box::new(e) })?;
		{
			let mut table = write
				.open_table(SYNC_STATE_TABLE)
				.map_err(|e| StateError::SaveFailed { source: Box::new(e) })?;
			table.remove(path).map_err(|e| StateError::SaveFailed { source: Box::new(e) })?;
		}
		write.commit().map_err(|e| StateError::SaveFailed { source: Box::new(e) })?;
		Ok(())
	}

	pub fn clear(&self) -> Result<(), SyncError> {
		let write = self.db.begin_write().map_err(|e| StateError::SaveFailed { source: Box::new(e) })?;
		{
			let mut state_table = write
				.open_table(SYNC_STATE_TABLE)
				.map_err(|e| StateError::SaveFailed { source: Box::new(e) })?;
			let keys: Vec<String> = state_table
				.iter()
				.map_err(|e| StateError::SaveFailed { source: Box::new(e) })?
				.filter_map(|item| item.ok().map(|(k, _)| k.value().to_string()))
				.collect();
			for key in &keys {
				state_table.remove(key.as_str()).map_err(|e| StateError::SaveFailed { source: Box::new(e) })?;
			}

			let mut log_table = write
				.open_table(OPERATION_LOG_TABLE)
				.map_err(|e| StateError::SaveFailed { source: Box::new(e) })?;
			let log_keys: Vec<u64> = log_table
				.iter()
				.map_err(|e| StateError::SaveFailed { source: Box::new(e) })?
				.filter_map(|item| item.ok().map(|(k, _)| k.value()))
				.collect();
			for key in log_keys {
				log_table.remove(key).map_err(|e| StateError::SaveFailed { source: Box::new(e) })?;
			}
		}
		write.commit().map_err(|e| StateError::SaveFailed { source: Box::new(e) })?;
		Ok(())
	}

	pub fn get_stats(&self) -> Result<StateStats, SyncError> {
		let all = self.get_all()?;
		let mut stats = StateStats { total: all.len(), ..Default::default() };
		for s in &all {
			match s.status {
				SyncStatus::Synced => stats.synced += 1,
				SyncStatus::Conflict => stats.conflicted += 1,
				SyncStatus::Error => stats.errored += 1,
				_ => {}
			}
		}
		stats.on_disk_bytes =
			std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0);
		Ok(stats)
	}

	/// Append one operation-log record. The log key is a monotonically
	/// increasing counter derived from the last key present in the table, so
	/// it keeps climbing even after `clear_operation_history` has removed
	/// older rows (the table's row count is no longer `max_id + 1` once rows
	/// are pruned); reads order by `completed_at`, not by this key.
	pub fn log_operation(&self, entry: &OperationLogEntry) -> Result<(), SyncError> {
		let bytes =
			bincode::serialize(entry).map_err(|e| StateError::SaveFailed { source: Box::new(e) })?;
		let write = self.db.begin_write().map_err(|e| StateError::SaveFailed { source: Box::new(e) })?;
		{
			let mut table = write
				.open_table(OPERATION_LOG_TABLE)
				.map_err(|e| StateError::SaveFailed { source: Box::new(e) })?;
			let next_id = match table.last().map_err(|e| StateError::SaveFailed { source: Box::new(e) })? {
				Some((key, _)) => key.value() + 1,
				None => 0,
			};
			table
				.insert(next_id, bytes.as_slice())
				.map_err(|e| StateError::SaveFailed { source: Box::new(e) })?;
		}
		write.commit().map_err(|e| StateError::SaveFailed { source: Box::new(e) })?;
		Ok(())
	}

	pub fn get_recent_operations(
		&self,
		limit: usize,
		since: Option<SystemTime>,
	) -> Result<Vec<OperationLogEntry>, SyncError> {
		let read = self.db.begin_read().map_err(|e| StateError::LoadFailed { source: Box::new(e) })?;
		let table = read
			.open_table(OPERATION_LOG_TABLE)
			.map_err(|e| StateError::LoadFailed { source: Box::new(e) })?;
		let mut entries = Vec::new();
		for item in table.iter().map_err(|e| StateError::LoadFailed { source: Box::new(e) })? {
			let (_, value) = item.map_err(|e| StateError::LoadFailed { source: Box::new(e) })?;
			let entry: OperationLogEntry = bincode::deserialize(value.value())
				.map_err(|e| StateError::Corrupted { message: e.to_string() })?;
			if since.map(|s| entry.completed_at >= s).unwrap_or(true) {
				entries.push(entry);
			}
		}
		entries.sort_by_key(|e| e.completed_at);
		entries.reverse();
		entries.truncate(limit);
		Ok(entries)
	}

	pub fn clear_operation_history(&self, before: SystemTime) -> Result<usize, SyncError> {
		let write = self.db.begin_write().map_err(|e| StateError::SaveFailed { source: Box::new(e) })?;
		let mut removed = 0usize;
		{
			let mut table = write
				.open_table(OPERATION_LOG_TABLE)
				.map_err(|e| StateError::SaveFailed { source: Box::new(e) })?;
			let keys_to_remove: Vec<u64> = table
				.iter()
				.map_err(|e| StateError::SaveFailed { source: Box::new(e) })?
				.filter_map(|item| {
					let (key, value) = item.ok()?;
					let entry: OperationLogEntry = bincode::deserialize(value.value()).ok()?;
					(entry.completed_at < before).then(|| key.value())
				})
				.collect();
			for key in keys_to_remove {
				table.remove(key).map_err(|e| StateError::SaveFailed { source: Box::new(e) })?;
				removed += 1;
			}
		}
		write.commit().map_err(|e| StateError::SaveFailed { source: Box::new(e) })?;
		Ok(removed)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::types::SyncItem;
	use std::time::Duration;
	use tempfile::TempDir;

	fn open_store() -> (TempDir, StateStore) {
		let dir = TempDir::new().unwrap();
		let store = StateStore::open(dir.path().join("state.redb")).unwrap();
		(dir, store)
	}

	#[test]
	fn upsert_and_get_roundtrip() {
		let (_dir, store) = open_store();
		let item = SyncItem::file("a.txt", 10, SystemTime::now());
		let state = SyncState::new_synced(&item, SystemTime::now());
		store.upsert(&state).unwrap();

		let fetched = store.get("a.txt").unwrap().unwrap();
		assert_eq!(fetched.path, "a.txt");
		assert_eq!(fetched.status, SyncStatus::Synced);
	}

	#[test]
	fn missing_path_returns_none() {
		let (_dir, store) = open_store();
		assert!(store.get("missing").unwrap().is_none());
	}

	#[test]
	fn delete_removes_record() {
		let (_dir, store) = open_store();
		let item = SyncItem::file("a.txt", 10, SystemTime::now());
		store.upsert(&SyncState::new_synced(&item, SystemTime::now())).unwrap();
		store.delete("a.txt").unwrap();
		assert!(store.get("a.txt").unwrap().is_none());
	}

	#[test]
	fn clear_empties_both_tables() {
		let (_dir, store) = open_store();
		let item = SyncItem::file("a.txt", 10, SystemTime::now());
		store.upsert(&SyncState::new_synced(&item, SystemTime::now())).unwrap();
		store
			.log_operation(&OperationLogEntry {
				path: "a.txt".into(),
				action_type: crate::types::ActionType::Upload,
				is_directory: false,
				size: 10,
				source: crate::types::Side::Local,
				started_at: SystemTime::now(),
				completed_at: SystemTime::now(),
				success: true,
				error_message: None,
				renamed_from: None,
				renamed_to: None,
			})
			.unwrap();
		store.clear().unwrap();
		assert!(store.get_all().unwrap().is_empty());
		assert!(store.get_recent_operations(10, None).unwrap().is_empty());
	}

	#[test]
	fn operation_log_is_append_only_and_orders_by_completed_at() {
		let (_dir, store) = open_store();
		let base = SystemTime::now();
		for i in 0..3u64 {
			store
				.log_operation(&OperationLogEntry {
					path: format!("f{i}.txt"),
					action_type: crate::types::ActionType::Upload,
					is_directory: false,
					size: i,
					source: crate::types::Side::Local,
					started_at: base,
					completed_at: base + Duration::from_secs(i),
					success: true,
					error_message: None,
					renamed_from: None,
					renamed_to: None,
				})
				.unwrap();
		}
		let recent = store.get_recent_operations(10, None).unwrap();
		assert_eq!(recent.len(), 3);
		assert_eq!(recent[0].path, "f2.txt");
	}

	#[test]
	fn clear_operation_history_deletes_only_older_rows() {
		let (_dir, store) = open_store();
		let base = SystemTime::now();
		for i in 0..3u64 {
			store
				.log_operation(&OperationLogEntry {
					path: format!("f{i}.txt"),
					action_type: crate::types::ActionType::Upload,
					is_directory: false,
					size: i,
					source: crate::types::Side::Local,
					started_at: base,
					completed_at: base + Duration::from_secs(i * 100),
					success: true,
					error_message: None,
					renamed_from: None,
					renamed_to: None,
				})
				.unwrap();
		}
		let removed = store.clear_operation_history(base + Duration::from_secs(150)).unwrap();
		assert_eq!(removed, 2);
		assert_eq!(store.get_recent_operations(10, None).unwrap().len(), 1);
	}

	#[test]
	fn log_id_keeps_climbing_after_history_is_pruned() {
		let (_dir, store) = open_store();
		let base = SystemTime::now();
		let entry = |path: &str, completed_at| OperationLogEntry {
			path: path.to_string(),
			action_type: crate::types::ActionType::Upload,
			is_directory: false,
			size: 1,
			source: crate::types::Side::Local,
			started_at: base,
			completed_at,
			success: true,
			error_message: None,
			renamed_from: None,
			renamed_to: None,
		};

		// Three entries get ids 0, 1, 2. Pruning removes only id 0, so the
		// table's row count (2) drops below the highest id issued so far
		// (2): deriving the next id from the row count would reuse id 2 and
		// silently clobber "survivor-2" instead of appending "new.txt".
		store.log_operation(&entry("pruned.txt", base)).unwrap();
		store.log_operation(&entry("survivor-1.txt", base + Duration::from_secs(100))).unwrap();
		store.log_operation(&entry("survivor-2.txt", base + Duration::from_secs(101))).unwrap();
		store.clear_operation_history(base + Duration::from_secs(50)).unwrap();
		store.log_operation(&entry("new.txt", base + Duration::from_secs(200))).unwrap();

		let mut paths: Vec<String> = store.get_recent_operations(10, None).unwrap().into_iter().map(|e| e.path).collect();
		paths.sort();
		assert_eq!(paths, vec!["new.txt".to_string(), "survivor-1.txt".to_string(), "survivor-2.txt".to_string()]);
	}
}

// vim: ts=4
