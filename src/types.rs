//! Core data types shared by the storage layer, the change detector, and the
//! sync engine.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, SystemTime};

/// A value attached to a [`SyncItem`]'s open metadata map.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
	Text(String),
	Number(i64),
	Bool(bool),
}

/// Uniform metadata record returned by every storage backend's listing and
/// lookup operations.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncItem {
	/// Normalized, backend-root-relative POSIX path.
	pub path: String,
	pub is_directory: bool,
	pub is_symlink: bool,
	/// Always 0 for directories.
	pub size: u64,
	pub last_modified: SystemTime,
	/// Content hash, when the backend can supply or compute one cheaply.
	pub hash: Option<String>,
	/// Opaque, path-scoped server version token (WebDAV ETag, S3 ETag, ...).
	pub etag: Option<String>,
	/// Octal ("755") or symbolic ("rwxr-xr-x") permission string.
	pub permissions: Option<String>,
	pub mime_type: Option<String>,
	pub metadata: HashMap<String, MetadataValue>,
}

impl SyncItem {
	pub fn file(path: impl Into<String>, size: u64, last_modified: SystemTime) -> Self {
		SyncItem {
			path: path.into(),
			is_directory: false,
			is_symlink: false,
			size,
			last_modified,
			hash: None,
			etag: None,
			permissions: None,
			mime_type: None,
			metadata: HashMap::new(),
		}
	}

	pub fn directory(path: impl Into<String>, last_modified: SystemTime) -> Self {
		SyncItem {
			path: path.into(),
			is_directory: true,
			is_symlink: false,
			size: 0,
			last_modified,
			hash: None,
			etag: None,
			permissions: None,
			mime_type: None,
			metadata: HashMap::new(),
		}
	}
}

/// The per-path status recorded in the shadow state store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncStatus {
	Synced,
	LocalNew,
	RemoteNew,
	LocalModified,
	RemoteModified,
	LocalDeleted,
	RemoteDeleted,
	Conflict,
	Error,
	Ignored,
}

/// One record per path: the shadow of the last successful sync, used to
/// turn two one-sided scans into a three-way merge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncState {
	pub path: String,
	pub is_directory: bool,
	pub local_hash: Option<String>,
	pub remote_hash: Option<String>,
	pub local_modified: Option<SystemTime>,
	pub remote_modified: Option<SystemTime>,
	pub local_size: Option<u64>,
	pub remote_size: Option<u64>,
	pub status: SyncStatus,
	pub last_sync_time: Option<SystemTime>,
	pub etag: Option<String>,
	pub error_message: Option<String>,
	pub sync_attempts: u32,
}

impl SyncState {
	pub fn new_synced(item: &SyncItem, now: SystemTime) -> Self {
		SyncState {
			path: item.path.clone(),
			is_directory: item.is_directory,
			local_hash: item.hash.clone(),
			remote_hash: item.hash.clone(),
			local_modified: Some(item.last_modified),
			remote_modified: Some(item.last_modified),
			local_size: Some(item.size),
			remote_size: Some(item.size),
			status: SyncStatus::Synced,
			last_sync_time: Some(now),
			etag: item.etag.clone(),
			error_message: None,
			sync_attempts: 0,
		}
	}
}

/// The kind of action a [`SyncPlanAction`] or [`OperationLogEntry`] performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionType {
	Upload,
	Download,
	DeleteLocal,
	DeleteRemote,
	Conflict,
	Move,
}

/// Which side an operation originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
	Local,
	Remote,
}

/// One entry of the change detector's output plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncPlanAction {
	pub action_type: ActionType,
	pub path: String,
	pub is_directory: bool,
	pub size: u64,
	pub last_modified: Option<SystemTime>,
	pub conflict_type: Option<ConflictType>,
	/// Lower runs first within a phase.
	pub priority: i64,
}

/// The ordered output of the change detector. The engine walks this in three
/// phases: creates/modifies ascending by path depth, deletes descending by
/// path depth, then conflicts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncPlan {
	pub actions: Vec<SyncPlanAction>,
}

impl SyncPlan {
	pub fn creates(&self) -> impl Iterator<Item = &SyncPlanAction> {
		self.actions
			.iter()
			.filter(|a| matches!(a.action_type, ActionType::Upload | ActionType::Download))
	}

	pub fn deletes(&self) -> impl Iterator<Item = &SyncPlanAction> {
		self.actions
			.iter()
			.filter(|a| matches!(a.action_type, ActionType::DeleteLocal | ActionType::DeleteRemote))
	}

	pub fn conflicts(&self) -> impl Iterator<Item = &SyncPlanAction> {
		self.actions.iter().filter(|a| matches!(a.action_type, ActionType::Conflict))
	}
}

/// Append-only record of one completed (or failed) action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationLogEntry {
	pub path: String,
	pub action_type: ActionType,
	pub is_directory: bool,
	pub size: u64,
	pub source: Side,
	pub started_at: SystemTime,
	pub completed_at: SystemTime,
	pub success: bool,
	pub error_message: Option<String>,
	pub renamed_from: Option<String>,
	pub renamed_to: Option<String>,
}

impl OperationLogEntry {
	pub fn duration(&self) -> Duration {
		self.completed_at.duration_since(self.started_at).unwrap_or_default()
	}
}

/// Classification of a conflict detected between the two sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictType {
	BothModified,
	DeletedLocallyModifiedRemotely,
	ModifiedLocallyDeletedRemotely,
	TypeConflict,
	BothCreated,
}

/// The caller's (or resolver's) verdict on a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictResolution {
	Ask,
	UseLocal,
	UseRemote,
	Skip,
	RenameLocal,
	RenameRemote,
}

/// The classifier's verdict for one conflicted path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictAnalysis {
	pub file_path: String,
	pub conflict_type: ConflictType,
	pub local: Option<SyncItem>,
	pub remote: Option<SyncItem>,
	pub size_difference: u64,
	pub time_difference_secs: i64,
	pub newer_version: Option<Side>,
	pub is_likely_binary: bool,
	pub is_likely_text_file: bool,
	pub recommended_resolution: ConflictResolution,
}

/// Server flavor detected by the WebDAV backend's capability probe.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerCapabilities {
	pub is_nextcloud: bool,
	pub is_ocis: bool,
	pub server_version: Option<String>,
	pub supports_chunking: bool,
	pub chunking_version: Option<u8>,
	pub supports_ocis_chunking: bool,
}

impl ServerCapabilities {
	pub fn is_generic_webdav(&self) -> bool {
		!self.is_nextcloud && !self.is_ocis
	}
}

/// Result of one full `synchronize()` call.
#[derive(Debug, Clone)]
pub struct SyncResult {
	pub files_synchronized: usize,
	pub bytes_uploaded: u64,
	pub bytes_downloaded: u64,
	pub conflicts_resolved: usize,
	pub errors: Vec<String>,
	pub duration: Duration,
}

impl Default for SyncResult {
	fn default() -> Self {
		SyncResult {
			files_synchronized: 0,
			bytes_uploaded: 0,
			bytes_downloaded: 0,
			conflicts_resolved: 0,
			errors: vec![],
			duration: Duration::ZERO,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn now() -> SystemTime {
		SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000)
	}

	#[test]
	fn sync_item_directory_has_zero_size() {
		let dir = SyncItem::directory("a/b", now());
		assert!(dir.is_directory);
		assert_eq!(dir.size, 0);
	}

	#[test]
	fn sync_state_from_item_is_synced() {
		let item = SyncItem::file("a.txt", 5, now());
		let state = SyncState::new_synced(&item, now());
		assert_eq!(state.status, SyncStatus::Synced);
		assert_eq!(state.local_size, Some(5));
		assert_eq!(state.local_hash, state.remote_hash);
	}

	#[test]
	fn plan_partitions_by_action_type() {
		let mut plan = SyncPlan::default();
		plan.actions.push(SyncPlanAction {
			action_type: ActionType::Upload,
			path: "a".into(),
			is_directory: false,
			size: 1,
			last_modified: None,
			conflict_type: None,
			priority: 0,
		});
		plan.actions.push(SyncPlanAction {
			action_type: ActionType::DeleteRemote,
			path: "b".into(),
			is_directory: false,
			size: 0,
			last_modified: None,
			conflict_type: None,
			priority: 0,
		});
		assert_eq!(plan.creates().count(), 1);
		assert_eq!(plan.deletes().count(), 1);
		assert_eq!(plan.conflicts().count(), 0);
	}

	#[test]
	fn server_capabilities_generic_when_unset() {
		let caps = ServerCapabilities::default();
		assert!(caps.is_generic_webdav());
	}

	#[test]
	fn operation_log_entry_duration() {
		let entry = OperationLogEntry {
			path: "a".into(),
			action_type: ActionType::Upload,
			is_directory: false,
			size: 10,
			source: Side::Local,
			started_at: now(),
			completed_at: now() + Duration::from_secs(2),
			success: true,
			error_message: None,
			renamed_from: None,
			renamed_to: None,
		};
		assert_eq!(entry.duration(), Duration::from_secs(2));
	}
}

// vim: ts=4
