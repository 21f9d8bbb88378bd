//! The storage abstraction every backend implements.
//!
//! Grounded on the generic async storage-backend trait shape (list/read/
//! write/delete/stat over a byte stream, driven through `spawn_blocking` for
//! backends whose underlying transport is synchronous) seen in the
//! retrieval pack's storage-backend reference module.

pub mod ftp;
pub mod local;
pub mod s3;
pub mod sftp;
pub mod webdav;

use crate::error::SyncError;
use crate::progress::ProgressHub;
use crate::types::SyncItem;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::time::SystemTime;
use tokio_util::sync::CancellationToken;

pub type ByteStream = BoxStream<'static, Result<bytes::Bytes, SyncError>>;

/// One remote-change notification as reported by a backend's incremental
/// change feed (currently only the Nextcloud/OCIS activity API).
#[derive(Debug, Clone)]
pub struct ChangeInfo {
	pub path: String,
	pub change_type: ChangeType,
	pub occurred_at: SystemTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
	Created,
	Changed,
	Deleted,
}

/// Total/used byte counts for a backend's storage quota.
#[derive(Debug, Clone, Copy)]
pub struct StorageInfo {
	/// -1 when the backend cannot report this.
	pub total_bytes: i64,
	pub used_bytes: i64,
}

/// Uniform capability every storage backend implements, over WebDAV, SFTP,
/// FTP/FTPS, S3-compatible object storage, and the local filesystem.
///
/// Every operation takes a [`CancellationToken`] and is expected to check it
/// at suspension points; backends push transfer progress through the shared
/// [`ProgressHub`] rather than returning a callback.
#[async_trait]
pub trait Storage: Send + Sync {
	/// Non-recursive listing of one directory. A missing directory yields
	/// an empty list, not an error.
	async fn list_items(&self, path: &str, cancel: &CancellationToken) -> Result<Vec<SyncItem>, SyncError>;

	async fn get_item(&self, path: &str, cancel: &CancellationToken) -> Result<Option<SyncItem>, SyncError>;

	async fn read_file(&self, path: &str, cancel: &CancellationToken) -> Result<ByteStream, SyncError>;

	async fn write_file(
		&self,
		path: &str,
		data: ByteStream,
		size_hint: Option<u64>,
		cancel: &CancellationToken,
	) -> Result<(), SyncError>;

	async fn create_directory(&self, path: &str, cancel: &CancellationToken) -> Result<(), SyncError>;

	/// Idempotent, recursive for directories. Succeeds when absent.
	async fn delete(&self, path: &str, cancel: &CancellationToken) -> Result<(), SyncError>;

	async fn move_item(&self, source: &str, target: &str, cancel: &CancellationToken) -> Result<(), SyncError>;

	async fn exists(&self, path: &str, cancel: &CancellationToken) -> Result<bool, SyncError> {
		Ok(self.get_item(path, cancel).await?.is_some())
	}

	async fn storage_info(&self, cancel: &CancellationToken) -> Result<StorageInfo, SyncError>;

	/// Content-based SHA-256 by default; a backend may return a
	/// server-reported hash as long as it is bit-identical to SHA-256 over
	/// the same bytes.
	async fn compute_hash(&self, path: &str, cancel: &CancellationToken) -> Result<String, SyncError>;

	async fn test_connection(&self, cancel: &CancellationToken) -> Result<bool, SyncError>;

	async fn set_last_modified(
		&self,
		_path: &str,
		_modified: SystemTime,
		_cancel: &CancellationToken,
	) -> Result<(), SyncError> {
		Ok(())
	}

	async fn set_permissions(
		&self,
		_path: &str,
		_permissions: &str,
		_cancel: &CancellationToken,
	) -> Result<(), SyncError> {
		Ok(())
	}

	/// Incremental remote-change discovery. Backends that don't support
	/// this (everything but Nextcloud/OCIS WebDAV) return an empty vec.
	async fn get_remote_changes(
		&self,
		_since: SystemTime,
		_cancel: &CancellationToken,
	) -> Result<Vec<ChangeInfo>, SyncError> {
		Ok(Vec::new())
	}

	fn progress_hub(&self) -> &ProgressHub;
}


// vim: ts=4
