//! Local filesystem backend: the "other side" when reconciling a directory
//! against itself is meaningless, but every remote-to-local sync needs one
//! local side, and the local-filesystem-as-remote case from the overview
//! (two directories on disk, no network backend at all) uses this directly
//! as both sides.
//!
//! Grounded on the local file read/write/permission-setting patterns in
//! `protocol/file_operations.rs` and `serve.rs` of the teacher.

use crate::error::SyncError;
use crate::path::PathCodec;
use crate::progress::{ProgressEvent, ProgressHub, TransferKind};
use crate::storage::{ByteStream, ChangeInfo, Storage, StorageInfo};
use crate::types::SyncItem;
use crate::util;
use async_trait::async_trait;
use futures::StreamExt;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

pub struct LocalStorage {
	codec: PathCodec,
	hub: ProgressHub,
}

impl LocalStorage {
	pub fn new(root: impl Into<PathBuf>) -> Self {
		LocalStorage { codec: PathCodec::new(root), hub: ProgressHub::new() }
	}

	pub fn with_hub(root: impl Into<PathBuf>, hub: ProgressHub) -> Self {
		LocalStorage { codec: PathCodec::new(root), hub }
	}

	async fn item_from_path(&self, relative: &str, absolute: &Path) -> Result<Option<SyncItem>, SyncError> {
		let meta = match fs::symlink_metadata(absolute).await {
			Ok(meta) => meta,
			Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
			Err(err) => return Err(err.into()),
		};
		let is_symlink = meta.file_type().is_symlink();
		let is_directory = meta.is_dir();
		let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
		let mut item = if is_directory {
			SyncItem::directory(relative.to_string(), modified)
		} else {
			SyncItem::file(relative.to_string(), meta.len(), modified)
		};
		item.is_symlink = is_symlink;
		item.permissions = Some(format!("{:o}", meta.permissions().mode() & 0o7777));
		Ok(Some(item))
	}
}

#[async_trait]
impl Storage for LocalStorage {
	async fn list_items(&self, path: &str, _cancel: &CancellationToken) -> Result<Vec<SyncItem>, SyncError> {
		let absolute = self.codec.resolve(path)?;
		let mut entries = match fs::read_dir(&absolute).await {
			Ok(entries) => entries,
			Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
			Err(err) => return Err(err.into()),
		};
		let mut items = Vec::new();
		while let Some(entry) = entries.next_entry().await? {
			let entry_path = entry.path();
			let Some(relative) = self.codec.relativize(&entry_path) else { continue };
			if let Some(item) = self.item_from_path(&relative, &entry_path).await? {
				items.push(item);
			}
		}
		Ok(items)
	}

	async fn get_item(&self, path: &str, _cancel: &CancellationToken) -> Result<Option<SyncItem>, SyncError> {
		let absolute = self.codec.resolve(path)?;
		self.item_from_path(path, &absolute).await
	}

	async fn read_file(&self, path: &str, _cancel: &CancellationToken) -> Result<ByteStream, SyncError> {
		let absolute = self.codec.resolve(path)?;
		let file = fs::File::open(&absolute).await?;
		let stream = tokio_util::io::ReaderStream::new(file).map(|chunk| chunk.map_err(SyncError::from));
		Ok(Box::pin(stream))
	}

	async fn write_file(
		&self,
		path: &str,
		mut data: ByteStream,
		size_hint: Option<u64>,
		cancel: &CancellationToken,
	) -> Result<(), SyncError> {
		let absolute = self.codec.resolve(path)?;
		if let Some(parent) = absolute.parent() {
			fs::create_dir_all(parent).await?;
		}
		let tmp_path = absolute.with_extension("syncore-tmp");
		let mut file = fs::File::create(&tmp_path).await?;
		let mut written: u64 = 0;
		let total = size_hint.unwrap_or(0);
		while let Some(chunk) = data.next().await {
			if cancel.is_cancelled() {
				let _ = fs::remove_file(&tmp_path).await;
				return Err(SyncError::Cancelled);
			}
			let chunk = chunk?;
			file.write_all(&chunk).await?;
			written += chunk.len() as u64;
			self.hub.publish_progress(ProgressEvent {
				path: path.to_string(),
				kind: TransferKind::Download,
				bytes_transferred: written,
				total_bytes: total,
			});
		}
		file.flush().await?;
		drop(file);
		fs::rename(&tmp_path, &absolute).await?;
		Ok(())
	}

	async fn create_directory(&self, path: &str, _cancel: &CancellationToken) -> Result<(), SyncError> {
		let absolute = self.codec.resolve(path)?;
		match fs::create_dir_all(&absolute).await {
			Ok(()) => Ok(()),
			Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
			Err(err) => Err(err.into()),
		}
	}

	async fn delete(&self, path: &str, _cancel: &CancellationToken) -> Result<(), SyncError> {
		let absolute = self.codec.resolve(path)?;
		let meta = match fs::symlink_metadata(&absolute).await {
			Ok(meta) => meta,
			Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
			Err(err) => return Err(err.into()),
		};
		if meta.is_dir() {
			fs::remove_dir_all(&absolute).await?;
		} else {
			fs::remove_file(&absolute).await?;
		}
		Ok(())
	}

	async fn move_item(&self, source: &str, target: &str, _cancel: &CancellationToken) -> Result<(), SyncError> {
		let source_abs = self.codec.resolve(source)?;
		let target_abs = self.codec.resolve(target)?;
		if let Some(parent) = target_abs.parent() {
			fs::create_dir_all(parent).await?;
		}
		fs::rename(&source_abs, &target_abs).await?;
		Ok(())
	}

	#[allow(unsafe_code)]
	async fn storage_info(&self, _cancel: &CancellationToken) -> Result<StorageInfo, SyncError> {
		// statvfs is the idiomatic way to get this on unix; libc gives us the
		// raw syscall without pulling in a whole disk-usage crate.
		let root = self.codec.root();
		let c_path = std::ffi::CString::new(root.to_string_lossy().as_bytes())
			.map_err(|err| SyncError::Other { message: err.to_string() })?;
		let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
		let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
		if rc != 0 {
			return Ok(StorageInfo { total_bytes: -1, used_bytes: -1 });
		}
		let block_size = stat.f_frsize as i64;
		let total = stat.f_blocks as i64 * block_size;
		let free = stat.f_bfree as i64 * block_size;
		Ok(StorageInfo { total_bytes: total, used_bytes: total - free })
	}

	async fn compute_hash(&self, path: &str, _cancel: &CancellationToken) -> Result<String, SyncError> {
		let absolute = self.codec.resolve(path)?;
		let bytes = fs::read(&absolute).await?;
		Ok(util::hash_to_base64(&util::hash_binary(&bytes)))
	}

	async fn test_connection(&self, _cancel: &CancellationToken) -> Result<bool, SyncError> {
		Ok(fs::metadata(self.codec.root()).await.is_ok())
	}

	async fn set_last_modified(
		&self,
		path: &str,
		modified: SystemTime,
		_cancel: &CancellationToken,
	) -> Result<(), SyncError> {
		let absolute = self.codec.resolve(path)?;
		let timestamp = filetime::FileTime::from_system_time(modified);
		filetime::set_file_mtime(&absolute, timestamp).map_err(SyncError::from)
	}

	async fn set_permissions(
		&self,
		path: &str,
		permissions: &str,
		_cancel: &CancellationToken,
	) -> Result<(), SyncError> {
		// `permissions` may have come from another backend's `SyncItem`, so
		// it can be octal ("755") or symbolic ("rwxr-xr-x", "drwxr-xr-x").
		let mode = util::parse_mode_string(permissions)
			.ok_or_else(|| SyncError::InvalidConfig { message: format!("invalid permission mode: {permissions}") })?;
		let absolute = self.codec.resolve(path)?;
		fs::set_permissions(&absolute, std::fs::Permissions::from_mode(mode)).await?;
		Ok(())
	}

	async fn get_remote_changes(
		&self,
		_since: SystemTime,
		_cancel: &CancellationToken,
	) -> Result<Vec<ChangeInfo>, SyncError> {
		Ok(Vec::new())
	}

	fn progress_hub(&self) -> &ProgressHub {
		&self.hub
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	fn storage() -> (TempDir, LocalStorage) {
		let dir = TempDir::new().unwrap();
		let storage = LocalStorage::new(dir.path());
		(dir, storage)
	}

	#[tokio::test]
	async fn write_then_read_round_trips() {
		let (_dir, storage) = storage();
		let cancel = CancellationToken::new();
		let data: ByteStream = Box::pin(futures::stream::once(async { Ok(bytes::Bytes::from_static(b"hello")) }));
		storage.write_file("a/b.txt", data, Some(5), &cancel).await.unwrap();
		let item = storage.get_item("a/b.txt", &cancel).await.unwrap().unwrap();
		assert_eq!(item.size, 5);
	}

	#[tokio::test]
	async fn list_items_on_missing_directory_is_empty() {
		let (_dir, storage) = storage();
		let cancel = CancellationToken::new();
		let items = storage.list_items("does/not/exist", &cancel).await.unwrap();
		assert!(items.is_empty());
	}

	#[tokio::test]
	async fn delete_is_idempotent() {
		let (_dir, storage) = storage();
		let cancel = CancellationToken::new();
		storage.delete("never-existed.txt", &cancel).await.unwrap();
	}

	#[tokio::test]
	async fn get_item_reports_directory_with_zero_size() {
		let (_dir, storage) = storage();
		let cancel = CancellationToken::new();
		storage.create_directory("sub", &cancel).await.unwrap();
		let item = storage.get_item("sub", &cancel).await.unwrap().unwrap();
		assert!(item.is_directory);
		assert_eq!(item.size, 0);
	}

	#[tokio::test]
	async fn move_item_relocates_file() {
		let (_dir, storage) = storage();
		let cancel = CancellationToken::new();
		let data: ByteStream = Box::pin(futures::stream::once(async { Ok(bytes::Bytes::from_static(b"x")) }));
		storage.write_file("src.txt", data, Some(1), &cancel).await.unwrap();
		storage.move_item("src.txt", "dst.txt", &cancel).await.unwrap();
		assert!(storage.get_item("src.txt", &cancel).await.unwrap().is_none());
		assert!(storage.get_item("dst.txt", &cancel).await.unwrap().is_some());
	}

	#[tokio::test]
	async fn set_permissions_accepts_octal_and_symbolic_forms() {
		let (_dir, storage) = storage();
		let cancel = CancellationToken::new();
		let data: ByteStream = Box::pin(futures::stream::once(async { Ok(bytes::Bytes::from_static(b"x")) }));
		storage.write_file("a.txt", data, Some(1), &cancel).await.unwrap();

		for mode_str in ["755", "rwxr-xr-x", "drwxr-xr-x"] {
			storage.set_permissions("a.txt", mode_str, &cancel).await.unwrap();
			let item = storage.get_item("a.txt", &cancel).await.unwrap().unwrap();
			assert_eq!(item.permissions.as_deref(), Some("755"));
		}
	}

	#[tokio::test]
	async fn set_permissions_rejects_unparseable_mode() {
		let (_dir, storage) = storage();
		let cancel = CancellationToken::new();
		let data: ByteStream = Box::pin(futures::stream::once(async { Ok(bytes::Bytes::from_static(b"x")) }));
		storage.write_file("a.txt", data, Some(1), &cancel).await.unwrap();
		assert!(storage.set_permissions("a.txt", "not-a-mode", &cancel).await.is_err());
	}
}

// vim: ts=4
