//! Optional background poller for backends that support incremensal
//! remote-change discovery (currently Nextcloud/OCIS WebDAV via the OCS
//! activity feed; see [`crate::storage::Storage::get_remote_changes`]).
//!
//! This is a thin driver: it calls `get_remote_changes` on an interval and
//! hands whatever it finds to a caller-supplied callback, which is expected
//! to trigger a [`crate::engine::SyncEngine::synchronize`] (or a narrower
//! `synchronize_paths`) in response. The poller has no opinion on what to do
//! with a change; it only knows when to ask again.

use crate::error::SyncError;
use crate::storage::{ChangeInfo, Storage};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Polls one backend's `get_remote_changes` on a fixed interval.
pub struct RemoteChangePoller {
	interval: Duration,
}

impl RemoteChangePoller {
	pub fn new(interval: Duration) -> Self {
		RemoteChangePoller { interval }
	}

	/// Runs a single poll, returning whatever changes occurred after `since`.
	pub async fn poll_once(&self, remote: &dyn Storage, since: SystemTime, cancel: &CancellationToken) -> Result<Vec<ChangeInfo>, SyncError> {
		remote.get_remote_changes(since, cancel).await
	}

	/// Polls `remote` forever at this poller's interval, starting from
	/// `since`, invoking `on_changes` whenever changes are found. The
	/// watermark advances to the latest `occurred_at` seen each round so a
	/// slow or failed callback doesn't cause duplicate notifications.
	///
	/// Returns when `cancel` fires.
	pub async fn run<F, Fut>(&self, remote: Arc<dyn Storage>, mut since: SystemTime, cancel: CancellationToken, mut on_changes: F)
	where
		F: FnMut(Vec<ChangeInfo>) -> Fut,
		Fut: Future<Output = ()>,
	{
		loop {
			tokio::select! {
				_ = cancel.cancelled() => return,
				_ = tokio::time::sleep(self.interval) => {}
			}
			match self.poll_once(remote.as_ref(), since, &cancel).await {
				Ok(changes) if changes.is_empty() => debug!("remote change poll found nothing new"),
				Ok(changes) => {
					if let Some(latest) = changes.iter().map(|c| c.occurred_at).max() {
						since = latest;
					}
					on_changes(changes).await;
				}
				Err(err) => warn!(error = %err, "remote change poll failed, will retry next interval"),
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::storage::local::LocalStorage;
	use tempfile::TempDir;

	#[tokio::test]
	async fn poll_once_against_a_backend_with_no_change_feed_is_empty() {
		let dir = TempDir::new().unwrap();
		let storage = LocalStorage::new(dir.path().to_path_buf());
		let poller = RemoteChangePoller::new(Duration::from_secs(60));
		let changes = poller.poll_once(&storage, SystemTime::UNIX_EPOCH, &CancellationToken::new()).await.unwrap();
		assert!(changes.is_empty());
	}

	#[tokio::test]
	async fn run_stops_promptly_when_cancelled() {
		let dir = TempDir::new().unwrap();
		let storage: Arc<dyn Storage> = Arc::new(LocalStorage::new(dir.path().to_path_buf()));
		let poller = RemoteChangePoller::new(Duration::from_secs(3600));
		let cancel = CancellationToken::new();
		let cancel_clone = cancel.clone();
		let handle = tokio::spawn(async move {
			poller.run(storage, SystemTime::UNIX_EPOCH, cancel_clone, |_changes| async {}).await;
		});
		cancel.cancel();
		tokio::time::timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
	}
}

// vim: ts=4
