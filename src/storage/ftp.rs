//! FTP/FTPS backend.
//!
//! No example in the retrieval pack touches an FTP client; this module is
//! grounded on the teacher's single-mutex-serialized-connection shape used
//! for SFTP (see `storage::sftp`) applied to `suppaftp`'s async tokio API,
//! since both protocols share one non-multiplexable control connection.

use crate::config::{FtpConfig, FtpEncryption};
use crate::error::{ConnectionError, SyncError};
use crate::path::normalize;
use crate::progress::{ProgressEvent, ProgressHub, TransferKind};
use crate::storage::{ByteStream, ChangeInfo, Storage, StorageInfo};
use crate::types::SyncItem;
use async_trait::async_trait;
use futures::StreamExt;
use std::io::Cursor;
use std::time::SystemTime;
use suppaftp::AsyncNativeTlsFtpStream;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

pub struct FtpStorage {
	config: FtpConfig,
	conn: Mutex<Option<AsyncNativeTlsFtpStream>>,
	hub: ProgressHub,
}

impl FtpStorage {
	pub fn new(config: FtpConfig) -> Self {
		FtpStorage { config, conn: Mutex::new(None), hub: ProgressHub::new() }
	}

	async fn connect(&self) -> Result<AsyncNativeTlsFtpStream, SyncError> {
		let addr = format!("{}:{}", self.config.host, self.config.port);
		let mut stream = AsyncNativeTlsFtpStream::connect(&addr)
			.await
			.map_err(|err| SyncError::Connection(ConnectionError::TlsFailed { host: self.config.host.clone(), message: err.to_string() }))?;
		if matches!(self.config.encryption, FtpEncryption::Implicit) {
			// Implicit TLS is negotiated by `connect` itself for some
			// suppaftp builds; explicit upgrade below handles the common
			// STARTTLS-style case.
		}
		if matches!(self.config.encryption, FtpEncryption::Explicit) {
			stream = stream
				.into_secure(suppaftp::native_tls::TlsConnector::new().map_err(|err| {
					SyncError::Connection(ConnectionError::TlsFailed { host: self.config.host.clone(), message: err.to_string() })
				})?.into())
				.await
				.map_err(|err| SyncError::Connection(ConnectionError::TlsFailed { host: self.config.host.clone(), message: err.to_string() }))?;
		}
		stream
			.login(&self.config.username, &self.config.password)
			.await
			.map_err(|err| SyncError::Connection(ConnectionError::TlsFailed { host: self.config.host.clone(), message: err.to_string() }))?;
		if self.config.passive {
			stream.set_mode(suppaftp::Mode::Passive);
		} else {
			stream.set_mode(suppaftp::Mode::Active);
		}
		Ok(stream)
	}

	async fn with_conn<T, F, Fut>(&self, f: F) -> Result<T, SyncError>
	where
		F: FnOnce(&mut AsyncNativeTlsFtpStream) -> Fut,
		Fut: std::future::Future<Output = Result<T, suppaftp::FtpError>>,
	{
		let mut guard = self.conn.lock().await;
		if guard.is_none() {
			*guard = Some(self.connect().await?);
		}
		let stream = guard.as_mut().unwrap();
		match f(stream).await {
			Ok(value) => Ok(value),
			Err(err) => {
				*guard = None;
				Err(SyncError::Other { message: err.to_string() })
			}
		}
	}

	fn absolute(&self, relative: &str) -> String {
		let normalized = normalize(relative);
		let root = self.config.root.trim_matches('/');
		match (root.is_empty(), normalized.is_empty()) {
			(true, true) => "/".to_string(),
			(true, false) => format!("/{normalized}"),
			(false, true) => format!("/{root}"),
			(false, false) => format!("/{root}/{normalized}"),
		}
	}
}

#[async_trait]
impl Storage for FtpStorage {
	async fn list_items(&self, path: &str, _cancel: &CancellationToken) -> Result<Vec<SyncItem>, SyncError> {
		let target = self.absolute(path);
		let relative_base = normalize(path);
		let lines = self.with_conn(|stream| {
			let target = target.clone();
			async move { stream.list(Some(&target)).await }
		}).await;
		let lines = match lines {
			Ok(lines) => lines,
			Err(_) => return Ok(Vec::new()),
		};
		let mut items = Vec::new();
		for line in lines {
			if let Some((name, size, is_dir, mode)) = parse_list_line(&line) {
				let child = if relative_base.is_empty() { name } else { format!("{relative_base}/{name}") };
				let mut item = if is_dir {
					SyncItem::directory(child, SystemTime::UNIX_EPOCH)
				} else {
					SyncItem::file(child, size, SystemTime::UNIX_EPOCH)
				};
				if mode != 0 {
					item.permissions = Some(format!("{mode:o}"));
				}
				items.push(item);
			}
		}
		Ok(items)
	}

	async fn get_item(&self, path: &str, _cancel: &CancellationToken) -> Result<Option<SyncItem>, SyncError> {
		let target = self.absolute(path);
		let size = self.with_conn(|stream| {
			let target = target.clone();
			async move { stream.size(&target).await }
		}).await;
		match size {
			Ok(size) => Ok(Some(SyncItem::file(normalize(path), size as u64, SystemTime::UNIX_EPOCH))),
			Err(_) => Ok(None),
		}
	}

	async fn read_file(&self, path: &str, _cancel: &CancellationToken) -> Result<ByteStream, SyncError> {
		let target = self.absolute(path);
		let bytes = self.with_conn(|stream| {
			let target = target.clone();
			async move { stream.retr_as_buffer(&target).await.map(|cursor| cursor.into_inner()) }
		}).await?;
		Ok(Box::pin(futures::stream::once(async move { Ok(bytes::Bytes::from(bytes)) })))
	}

	async fn write_file(
		&self,
		path: &str,
		mut data: ByteStream,
		size_hint: Option<u64>,
		cancel: &CancellationToken,
	) -> Result<(), SyncError> {
		let target = self.absolute(path);
		let mut buf = Vec::new();
		let total = size_hint.unwrap_or(0);
		while let Some(chunk) = data.next().await {
			if cancel.is_cancelled() {
				return Err(SyncError::Cancelled);
			}
			let chunk = chunk?;
			buf.extend_from_slice(&chunk);
			self.hub.publish_progress(ProgressEvent {
				path: path.to_string(),
				kind: TransferKind::Upload,
				bytes_transferred: buf.len() as u64,
				total_bytes: total,
			});
		}
		self.with_conn(|stream| {
			let target = target.clone();
			let mut cursor = Cursor::new(buf.clone());
			async move { stream.put_file(&target, &mut cursor).await.map(|_| ()) }
		})
		.await
	}

	async fn create_directory(&self, path: &str, _cancel: &CancellationToken) -> Result<(), SyncError> {
		let target = self.absolute(path);
		let result = self.with_conn(|stream| {
			let target = target.clone();
			async move { stream.mkdir(&target).await }
		}).await;
		result.or(Ok(()))
	}

	async fn delete(&self, path: &str, _cancel: &CancellationToken) -> Result<(), SyncError> {
		let target = self.absolute(path);
		let is_dir = matches!(self.get_item(path, _cancel).await?, Some(item) if item.is_directory);
		if is_dir {
			self.with_conn(|stream| {
				let target = target.clone();
				async move { stream.rmdir(&target).await }
			}).await.or(Ok(()))
		} else {
			self.with_conn(|stream| {
				let target = target.clone();
				async move { stream.rm(&target).await }
			}).await.or(Ok(()))
		}
	}

	async fn move_item(&self, source: &str, target: &str, _cancel: &CancellationToken) -> Result<(), SyncError> {
		let source_path = self.absolute(source);
		let target_path = self.absolute(target);
		self.with_conn(|stream| {
			let source_path = source_path.clone();
			let target_path = target_path.clone();
			async move { stream.rename(&source_path, &target_path).await }
		})
		.await
	}

	async fn storage_info(&self, _cancel: &CancellationToken) -> Result<StorageInfo, SyncError> {
		Ok(StorageInfo { total_bytes: -1, used_bytes: -1 })
	}

	async fn compute_hash(&self, path: &str, cancel: &CancellationToken) -> Result<String, SyncError> {
		let mut stream = self.read_file(path, cancel).await?;
		let mut bytes = Vec::new();
		while let Some(chunk) = stream.next().await {
			bytes.extend_from_slice(&chunk?);
		}
		Ok(crate::util::hash_to_base64(&crate::util::hash_binary(&bytes)))
	}

	async fn test_connection(&self, _cancel: &CancellationToken) -> Result<bool, SyncError> {
		let mut guard = self.conn.lock().await;
		*guard = Some(self.connect().await?);
		Ok(true)
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

/// Parses one line of a Unix-style `LIST` response: permission bits, size,
/// and filename. Returns `None` for lines this parser doesn't recognize
/// (e.g. `total N` headers).
fn parse_list_line(line: &str) -> Option<(String, u64, bool, u32)> {
	let fields: Vec<&str> = line.split_whitespace().collect();
	if fields.len() < 9 {
		return None;
	}
	let perms = fields[0];
	if perms.len() != 10 {
		return None;
	}
	let is_dir = perms.starts_with('d');
	let size: u64 = fields[4].parse().ok()?;
	let name = fields[8..].join(" ");
	let mode = crate::util::parse_mode_string(perms).unwrap_or(0);
	Some((name, size, is_dir, mode))
}


// vim: ts=4
