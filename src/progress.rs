//! Progress and lifecycle event fan-out.
//!
//! Per the engine's many-to-many event fan-out requirement, subscribers get
//! a `tokio::sync::broadcast` receiver rather than a trait-object callback
//! list that would need external locking.

use crate::types::ActionType;
use tokio::sync::broadcast;

/// Kind of transfer a [`ProgressEvent`] reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
	Upload,
	Download,
	Delete,
	Move,
}

/// One progress update, published by a storage backend while it works on a
/// single path.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
	pub path: String,
	pub kind: TransferKind,
	pub bytes_transferred: u64,
	pub total_bytes: u64,
}

impl ProgressEvent {
	pub fn percent(&self) -> f64 {
		if self.total_bytes == 0 {
			100.0
		} else {
			(self.bytes_transferred as f64 / self.total_bytes as f64) * 100.0
		}
	}
}

/// A lifecycle event published by the sync engine itself, as opposed to a
/// per-backend transfer progress update.
#[derive(Debug, Clone)]
pub enum SyncEvent {
	PlanStarted,
	PlanReady { action_count: usize },
	ActionStarted { path: String, action_type: ActionType },
	ActionCompleted { path: String, action_type: ActionType, success: bool },
	Paused,
	Resumed,
	Cancelled,
	Finished,
}

const CHANNEL_CAPACITY: usize = 1024;

/// Shared broadcast hub. Cloning is cheap (it clones the sender handle);
/// every clone publishes to the same set of subscribers.
#[derive(Clone)]
pub struct ProgressHub {
	progress_tx: broadcast::Sender<ProgressEvent>,
	events_tx: broadcast::Sender<SyncEvent>,
}

impl ProgressHub {
	pub fn new() -> Self {
		let (progress_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
		let (events_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
		ProgressHub { progress_tx, events_tx }
	}

	pub fn subscribe_progress(&self) -> broadcast::Receiver<ProgressEvent> {
		self.progress_tx.subscribe()
	}

	pub fn subscribe_events(&self) -> broadcast::Receiver<SyncEvent> {
		self.events_tx.subscribe()
	}

	/// Publish a progress event. No-op (returns `Ok`) when there are no
	/// subscribers, matching `broadcast::Sender::send`'s behavior.
	pub fn publish_progress(&self, event: ProgressEvent) {
		let _ = self.progress_tx.send(event);
	}

	pub fn publish_event(&self, event: SyncEvent) {
		let _ = self.events_tx.send(event);
	}
}

impl Default for ProgressHub {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn percent_of_zero_total_is_complete() {
		let event = ProgressEvent {
			path: "a".into(),
			kind: TransferKind::Upload,
			bytes_transferred: 0,
			total_bytes: 0,
		};
		assert_eq!(event.percent(), 100.0);
	}

	#[tokio::test]
	async fn subscribers_receive_published_events() {
		let hub = ProgressHub::new();
		let mut rx = hub.subscribe_progress();
		hub.publish_progress(ProgressEvent {
			path: "a.txt".into(),
			kind: TransferKind::Download,
			bytes_transferred: 50,
			total_bytes: 100,
		});
		let received = rx.recv().await.unwrap();
		assert_eq!(received.path, "a.txt");
		assert_eq!(received.percent(), 50.0);
	}

	#[tokio::test]
	async fn publish_without_subscribers_does_not_panic() {
		let hub = ProgressHub::new();
		hub.publish_event(SyncEvent::PlanStarted);
	}
}

// vim: ts=4
