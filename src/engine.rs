//! The sync engine: turns a [`crate::types::SyncPlan`] into executed
//! backend operations, phase by phase.

use crate::config::SyncOptions;
use crate::conflict::{self, ConflictResolver, DefaultConflictResolver};
use crate::detector::ChangeDetector;
use crate::error::SyncError;
use crate::progress::{ProgressHub, SyncEvent};
use crate::state::StateStore;
use crate::storage::{ByteStream, Storage};
use crate::throttle::Throttle;
use crate::types::{ActionType, ConflictResolution, OperationLogEntry, Side, SyncPlan, SyncPlanAction, SyncResult, SyncState};
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime};
use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Runs one full reconciliation between a local-side and a remote-side
/// [`Storage`] backend, persisting shadow state and an operation log through
/// a [`StateStore`].
pub struct SyncEngine {
	local: Box<dyn Storage>,
	remote: Box<dyn Storage>,
	store: StateStore,
	resolver: Box<dyn ConflictResolver>,
	cancel: CancellationToken,
	paused: AtomicBool,
	pause_notify: Notify,
	hub: ProgressHub,
}

impl SyncEngine {
	pub fn new(local: Box<dyn Storage>, remote: Box<dyn Storage>, store: StateStore) -> Self {
		SyncEngine {
			local,
			remote,
			store,
			resolver: Box::new(DefaultConflictResolver),
			cancel: CancellationToken::new(),
			paused: AtomicBool::new(false),
			pause_notify: Notify::new(),
			hub: ProgressHub::new(),
		}
	}

	pub fn with_resolver(mut self, resolver: Box<dyn ConflictResolver>) -> Self {
		self.resolver = resolver;
		self
	}

	pub fn progress_hub(&self) -> &ProgressHub {
		&self.hub
	}

	/// Detects changes without executing anything.
	pub async fn preview(&self, options: &SyncOptions) -> Result<SyncPlan, SyncError> {
		ChangeDetector::new()
			.build_plan_cancellable(self.local.as_ref(), self.remote.as_ref(), &self.store, options, &self.cancel)
			.await
	}

	/// Runs one full reconciliation.
	pub async fn synchronize(&self, options: SyncOptions) -> Result<SyncResult, SyncError> {
		let plan = self.preview(&options).await?;
		self.execute(plan, &options).await
	}

	/// Restricts detection and execution to the given paths (exact match or
	/// a path prefix under one of them).
	pub async fn synchronize_paths(&self, paths: &[String], options: SyncOptions) -> Result<SyncResult, SyncError> {
		let mut plan = self.preview(&options).await?;
		plan.actions.retain(|action| {
			paths.iter().any(|p| action.path == *p || action.path.starts_with(&format!("{p}/")))
		});
		self.execute(plan, &options).await
	}

	pub fn pause(&self) {
		self.paused.store(true, Ordering::SeqCst);
		self.hub.publish_event(SyncEvent::Paused);
	}

	pub fn resume(&self) {
		self.paused.store(false, Ordering::SeqCst);
		self.pause_notify.notify_waiters();
		self.hub.publish_event(SyncEvent::Resumed);
	}

	pub fn cancel(&self) {
		self.cancel.cancel();
		self.hub.publish_event(SyncEvent::Cancelled);
	}

	pub fn get_recent_operations(&self, limit: usize, since: Option<SystemTime>) -> Result<Vec<OperationLogEntry>, SyncError> {
		self.store.get_recent_operations(limit, since)
	}

	async fn wait_if_paused(&self) {
		while self.paused.load(Ordering::SeqCst) {
			self.pause_notify.notified().await;
		}
	}

	async fn execute(&self, plan: SyncPlan, options: &SyncOptions) -> Result<SyncResult, SyncError> {
		let started = Instant::now();
		self.hub.publish_event(SyncEvent::PlanReady { action_count: plan.actions.len() });
		let mut result = SyncResult::default();

		for action in &plan.actions {
			if self.cancel.is_cancelled() {
				result.errors.push("synchronize cancelled".to_string());
				break;
			}
			self.wait_if_paused().await;

			self.hub.publish_event(SyncEvent::ActionStarted { path: action.path.clone(), action_type: action.action_type });
			let started_at = SystemTime::now();
			let outcome = self.run_action(action, options).await;
			let success = outcome.is_ok();
			self.hub.publish_event(SyncEvent::ActionCompleted { path: action.path.clone(), action_type: action.action_type, success });

			match outcome {
				Ok((up, down, conflict_resolved)) => {
					result.files_synchronized += 1;
					result.bytes_uploaded += up;
					result.bytes_downloaded += down;
					if conflict_resolved {
						result.conflicts_resolved += 1;
					}
					let entry = OperationLogEntry {
						path: action.path.clone(),
						action_type: action.action_type,
						is_directory: action.is_directory,
						size: action.size,
						source: if matches!(action.action_type, ActionType::Upload | ActionType::DeleteLocal) { Side::Local } else { Side::Remote },
						started_at,
						completed_at: SystemTime::now(),
						success: true,
						error_message: None,
						renamed_from: None,
						renamed_to: None,
					};
					self.store.log_operation(&entry)?;
				}
				Err(err) => {
					result.errors.push(format!("{}: {}", action.path, err));
					let entry = OperationLogEntry {
						path: action.path.clone(),
						action_type: action.action_type,
						is_directory: action.is_directory,
						size: action.size,
						source: Side::Local,
						started_at,
						completed_at: SystemTime::now(),
						success: false,
						error_message: Some(err.to_string()),
						renamed_from: None,
						renamed_to: None,
					};
					self.store.log_operation(&entry)?;
				}
			}
		}

		result.duration = started.elapsed();
		self.hub.publish_event(SyncEvent::Finished);
		Ok(result)
	}

	/// Runs one plan action, returning `(bytes_uploaded, bytes_downloaded, was_conflict)`.
	async fn run_action(&self, action: &SyncPlanAction, options: &SyncOptions) -> Result<(u64, u64, bool), SyncError> {
		match action.action_type {
			ActionType::Upload => {
				let bytes = self.transfer(self.local.as_ref(), self.remote.as_ref(), &action.path, action.is_directory, options).await?;
				self.record_synced(&action.path, action.is_directory).await?;
				Ok((bytes, 0, false))
			}
			ActionType::Download => {
				let bytes = self.transfer(self.remote.as_ref(), self.local.as_ref(), &action.path, action.is_directory, options).await?;
				self.record_synced(&action.path, action.is_directory).await?;
				Ok((0, bytes, false))
			}
			ActionType::DeleteLocal => {
				self.local.delete(&action.path, &self.cancel).await?;
				self.store.delete(&action.path)?;
				Ok((0, 0, false))
			}
			ActionType::DeleteRemote => {
				self.remote.delete(&action.path, &self.cancel).await?;
				self.store.delete(&action.path)?;
				Ok((0, 0, false))
			}
			ActionType::Conflict => self.resolve_conflict(action, options).await,
			ActionType::Move => Err(SyncError::Other { message: "move actions are not planned by the detector".into() }),
		}
	}

	/// Copies one item (file content, or just a directory marker) from `src`
	/// to `dst`, honoring `preserve_timestamps`/`preserve_permissions` and
	/// the configured bandwidth limit. Returns bytes copied.
	async fn transfer(&self, src: &dyn Storage, dst: &dyn Storage, path: &str, is_directory: bool, options: &SyncOptions) -> Result<u64, SyncError> {
		if is_directory {
			dst.create_directory(path, &self.cancel).await?;
			return Ok(0);
		}
		let item = src.get_item(path, &self.cancel).await?.ok_or_else(|| SyncError::NotFound { path: path.to_string() })?;
		let stream = src.read_file(path, &self.cancel).await?;
		let stream = throttle_stream(stream, options.bandwidth_limit_bytes_per_second);
		dst.write_file(path, stream, Some(item.size), &self.cancel).await?;
		if options.preserve_timestamps {
			let _ = dst.set_last_modified(path, item.last_modified, &self.cancel).await;
		}
		if options.preserve_permissions {
			if let Some(permissions) = &item.permissions {
				let _ = dst.set_permissions(path, permissions, &self.cancel).await;
			}
		}
		Ok(item.size)
	}

	async fn record_synced(&self, path: &str, is_directory: bool) -> Result<(), SyncError> {
		let now = SystemTime::now();
		let local = self.local.get_item(path, &self.cancel).await?;
		let remote = self.remote.get_item(path, &self.cancel).await?;
		let local_hash = if is_directory { None } else { self.local.compute_hash(path, &self.cancel).await.ok() };
		let remote_hash = if is_directory { None } else { self.remote.compute_hash(path, &self.cancel).await.ok() };
		let state = SyncState {
			path: path.to_string(),
			is_directory,
			local_hash,
			remote_hash,
			local_modified: local.as_ref().map(|i| i.last_modified),
			remote_modified: remote.as_ref().map(|i| i.last_modified),
			local_size: local.as_ref().map(|i| i.size),
			remote_size: remote.as_ref().map(|i| i.size),
			status: crate::types::SyncStatus::Synced,
			last_sync_time: Some(now),
			etag: remote.and_then(|i| i.etag),
			error_message: None,
			sync_attempts: 0,
		};
		self.store.upsert(&state)
	}

	async fn resolve_conflict(&self, action: &SyncPlanAction, options: &SyncOptions) -> Result<(u64, u64, bool), SyncError> {
		let local = self.local.get_item(&action.path, &self.cancel).await?;
		let remote = self.remote.get_item(&action.path, &self.cancel).await?;
		let analysis = conflict::classify(&action.path, local, remote);
		let resolution = match options.conflict_resolution_override {
			Some(forced) => forced,
			None => self.resolver.resolve(&analysis).await,
		};

		match resolution {
			ConflictResolution::UseLocal => {
				let bytes = self.transfer(self.local.as_ref(), self.remote.as_ref(), &action.path, action.is_directory, options).await?;
				self.record_synced(&action.path, action.is_directory).await?;
				Ok((bytes, 0, true))
			}
			ConflictResolution::UseRemote => {
				let bytes = self.transfer(self.remote.as_ref(), self.local.as_ref(), &action.path, action.is_directory, options).await?;
				self.record_synced(&action.path, action.is_directory).await?;
				Ok((0, bytes, true))
			}
			ConflictResolution::Skip | ConflictResolution::Ask => Ok((0, 0, true)),
			ConflictResolution::RenameLocal => {
				let renamed = renamed_path(&action.path, "local");
				self.local.move_item(&action.path, &renamed, &self.cancel).await?;
				let up = self.transfer(self.local.as_ref(), self.remote.as_ref(), &renamed, action.is_directory, options).await.unwrap_or(0);
				let down = self.transfer(self.remote.as_ref(), self.local.as_ref(), &action.path, action.is_directory, options).await.unwrap_or(0);
				self.record_synced(&renamed, action.is_directory).await.ok();
				self.record_synced(&action.path, action.is_directory).await.ok();
				Ok((up, down, true))
			}
			ConflictResolution::RenameRemote => {
				let renamed = renamed_path(&action.path, "remote");
				self.remote.move_item(&action.path, &renamed, &self.cancel).await?;
				let down = self.transfer(self.remote.as_ref(), self.local.as_ref(), &renamed, action.is_directory, options).await.unwrap_or(0);
				let up = self.transfer(self.local.as_ref(), self.remote.as_ref(), &action.path, action.is_directory, options).await.unwrap_or(0);
				self.record_synced(&renamed, action.is_directory).await.ok();
				self.record_synced(&action.path, action.is_directory).await.ok();
				Ok((up, down, true))
			}
		}
	}
}

/// Appends `-conflict-{suffix}` before the last extension, e.g.
/// `doc.txt` -> `doc-conflict-local.txt`.
fn renamed_path(path: &str, suffix: &str) -> String {
	let (dir, name) = match path.rfind('/') {
		Some(idx) => (&path[..=idx], &path[idx + 1..]),
		None => ("", path),
	};
	match name.rfind('.') {
		Some(idx) if idx > 0 => format!("{dir}{}-conflict-{suffix}{}", &name[..idx], &name[idx..]),
		_ => format!("{dir}{name}-conflict-{suffix}"),
	}
}

/// Wraps a byte stream with a token-bucket delay before each chunk so that
/// `total_bytes_transferred / elapsed <= limit`, per the configured
/// `bandwidth_limit_bytes_per_second`.
fn throttle_stream(inner: ByteStream, limit: Option<u64>) -> ByteStream {
	let Some(limit) = limit else { return inner };
	let throttle = Arc::new(AsyncMutex::new(Throttle::new(limit)));
	let throttled = inner.then(move |chunk| {
		let throttle = throttle.clone();
		async move {
			if let Ok(bytes) = &chunk {
				throttle.lock().await.throttle(bytes.len() as u64).await;
			}
			chunk
		}
	});
	Box::pin(throttled)
}


// vim: ts=4
