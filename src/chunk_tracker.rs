//! Chunk/transfer tracking.
//!
//! Two related responsibilities live here:
//!
//! - Content-hash dedup bookkeeping: which chunk hashes are already known to
//!   be present locally or remotely, so a chunked upload (Nextcloud
//!   chunking-v2 assembly) can skip re-sending identical chunk content.
//! - Resumable-transfer offset tracking: the externally-replaceable offset
//!   oracle a TUS upload resumes from after a retriable PATCH failure.

use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::fmt;

/// Error type for chunk/transfer tracking operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkTrackerError {
	/// Chunk not found in tracker
	ChunkNotFound(String),
	/// Invalid operation for current state
	InvalidState(String),
	/// No resumable transfer registered for this path
	TransferNotFound(String),
}

impl fmt::Display for ChunkTrackerError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ChunkTrackerError::ChunkNotFound(hash) => write!(f, "chunk not found: {}", hash),
			ChunkTrackerError::InvalidState(msg) => write!(f, "invalid state: {}", msg),
			ChunkTrackerError::TransferNotFound(path) => {
				write!(f, "no resumable transfer registered for: {}", path)
			}
		}
	}
}

impl Error for ChunkTrackerError {}

/// Status of a chunk transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
	Pending,
	InProgress,
	Completed,
	Failed,
}

/// Where a chunk of known content is available.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ChunkLocation {
	Local,
	Remote,
}

/// Dedup and resumable-transfer bookkeeping, scoped to one sync run.
#[derive(Debug, Default)]
pub struct ChunkTracker {
	/// Maps content hash -> where it is known to already exist.
	known_chunks: BTreeMap<String, BTreeSet<ChunkLocation>>,
	/// Hashes that are referenced by the plan but not yet known anywhere.
	missing_chunks: BTreeSet<String>,
	/// Per-hash transfer status, keyed the same as `known_chunks`.
	pending_transfers: BTreeMap<String, TransferStatus>,
	/// Resumable large-file uploads, keyed by backend-relative path.
	resumable_transfers: BTreeMap<String, ResumableTransfer>,
}

/// Offset-oracle state for one in-flight resumable upload (TUS or
/// Nextcloud chunking-v2).
#[derive(Debug, Clone, Copy)]
pub struct ResumableTransfer {
	pub total_size: u64,
	pub offset: u64,
}

impl ChunkTracker {
	pub fn new() -> Self {
		Self::default()
	}

	/// Record that a chunk of the given hash is known to exist at `location`.
	pub fn add_known_chunk(&mut self, hash: impl Into<String>, location: ChunkLocation) {
		let hash = hash.into();
		self.known_chunks.entry(hash.clone()).or_default().insert(location);
		self.missing_chunks.remove(&hash);
	}

	/// Mark a hash as referenced by the plan but not yet located anywhere.
	pub fn mark_missing(&mut self, hash: impl Into<String>) {
		let hash = hash.into();
		if !self.known_chunks.contains_key(&hash) {
			self.missing_chunks.insert(hash);
		}
	}

	pub fn get_missing_chunks(&self) -> Vec<String> {
		self.missing_chunks.iter().cloned().collect()
	}

	pub fn is_chunk_available(&self, hash: &str) -> bool {
		self.known_chunks.contains_key(hash)
	}

	pub fn locations_of(&self, hash: &str) -> Vec<ChunkLocation> {
		self.known_chunks.get(hash).map(|s| s.iter().copied().collect()).unwrap_or_default()
	}

	pub fn start_transfer(&mut self, hash: String) -> Result<(), ChunkTrackerError> {
		if !self.is_chunk_available(&hash) {
			return Err(ChunkTrackerError::ChunkNotFound(hash));
		}
		self.pending_transfers.insert(hash, TransferStatus::InProgress);
		Ok(())
	}

	pub fn mark_transferred(&mut self, hash: &str) -> Result<(), ChunkTrackerError> {
		if !self.pending_transfers.contains_key(hash) {
			return Err(ChunkTrackerError::ChunkNotFound(hash.to_string()));
		}
		self.pending_transfers.insert(hash.to_string(), TransferStatus::Completed);
		Ok(())
	}

	pub fn get_transfer_status(&self, hash: &str) -> Option<TransferStatus> {
		self.pending_transfers.get(hash).copied()
	}

	pub fn dedup_stats(&self) -> DedupStats {
		let chunks_in_local =
			self.known_chunks.values().filter(|locs| locs.contains(&ChunkLocation::Local)).count();
		let chunks_in_remote =
			self.known_chunks.values().filter(|locs| locs.contains(&ChunkLocation::Remote)).count();
		let chunks_everywhere = self
			.known_chunks
			.values()
			.filter(|locs| locs.contains(&ChunkLocation::Local) && locs.contains(&ChunkLocation::Remote))
			.count();
		DedupStats {
			total_unique_chunks: self.known_chunks.len(),
			chunks_in_local,
			chunks_in_remote,
			chunks_everywhere,
		}
	}

	pub fn clear(&mut self) {
		self.known_chunks.clear();
		self.missing_chunks.clear();
		self.pending_transfers.clear();
		self.resumable_transfers.clear();
	}

	// -- resumable-transfer offset oracle ------------------------------------

	/// Register a new resumable upload starting at offset 0.
	pub fn register_transfer(&mut self, path: impl Into<String>, total_size: u64) {
		self.resumable_transfers.insert(path.into(), ResumableTransfer { total_size, offset: 0 });
	}

	/// Advance the stored offset for `path`, e.g. after a successful PATCH or
	/// after a HEAD probe reports the server's authoritative offset.
	pub fn advance_transfer(&mut self, path: &str, offset: u64) -> Result<(), ChunkTrackerError> {
		let transfer = self
			.resumable_transfers
			.get_mut(path)
			.ok_or_else(|| ChunkTrackerError::TransferNotFound(path.to_string()))?;
		if offset > transfer.total_size {
			return Err(ChunkTrackerError::InvalidState(format!(
				"offset {} exceeds total size {} for {}",
				offset, transfer.total_size, path
			)));
		}
		transfer.offset = offset;
		Ok(())
	}

	/// Current resume offset for `path`, or `None` if no transfer is
	/// registered (the caller should start from 0).
	pub fn transfer_offset(&self, path: &str) -> Option<u64> {
		self.resumable_transfers.get(path).map(|t| t.offset)
	}

	pub fn is_transfer_complete(&self, path: &str) -> bool {
		self.resumable_transfers.get(path).map(|t| t.offset >= t.total_size).unwrap_or(false)
	}

	pub fn complete_transfer(&mut self, path: &str) {
		self.resumable_transfers.remove(path);
	}
}

/// Deduplication statistics across the tracked chunk set.
#[derive(Debug, Clone)]
pub struct DedupStats {
	pub total_unique_chunks: usize,
	pub chunks_in_local: usize,
	pub chunks_in_remote: usize,
	pub chunks_everywhere: usize,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn missing_removed_when_located() {
		let mut tracker = ChunkTracker::new();
		tracker.mark_missing("hash1");
		assert!(tracker.get_missing_chunks().contains(&"hash1".to_string()));

		tracker.add_known_chunk("hash1", ChunkLocation::Local);
		assert!(!tracker.get_missing_chunks().contains(&"hash1".to_string()));
		assert!(tracker.is_chunk_available("hash1"));
	}

	#[test]
	fn transfer_lifecycle() {
		let mut tracker = ChunkTracker::new();
		tracker.add_known_chunk("hash1", ChunkLocation::Local);
		assert!(tracker.start_transfer("hash1".to_string()).is_ok());
		assert_eq!(tracker.get_transfer_status("hash1"), Some(TransferStatus::InProgress));
		assert!(tracker.mark_transferred("hash1").is_ok());
		assert_eq!(tracker.get_transfer_status("hash1"), Some(TransferStatus::Completed));
	}

	#[test]
	fn transfer_nonexistent_chunk_fails() {
		let mut tracker = ChunkTracker::new();
		assert!(tracker.start_transfer("nonexistent".to_string()).is_err());
	}

	#[test]
	fn dedup_stats_count_overlap() {
		let mut tracker = ChunkTracker::new();
		tracker.add_known_chunk("hash1", ChunkLocation::Local);
		tracker.add_known_chunk("hash1", ChunkLocation::Remote);
		tracker.add_known_chunk("hash2", ChunkLocation::Local);

		let stats = tracker.dedup_stats();
		assert_eq!(stats.total_unique_chunks, 2);
		assert_eq!(stats.chunks_in_local, 2);
		assert_eq!(stats.chunks_in_remote, 1);
		assert_eq!(stats.chunks_everywhere, 1);
	}

	#[test]
	fn resumable_transfer_resumes_from_advanced_offset() {
		let mut tracker = ChunkTracker::new();
		tracker.register_transfer("big.bin", 300);
		assert_eq!(tracker.transfer_offset("big.bin"), Some(0));

		tracker.advance_transfer("big.bin", 100).unwrap();
		assert_eq!(tracker.transfer_offset("big.bin"), Some(100));
		assert!(!tracker.is_transfer_complete("big.bin"));

		tracker.advance_transfer("big.bin", 300).unwrap();
		assert!(tracker.is_transfer_complete("big.bin"));

		tracker.complete_transfer("big.bin");
		assert_eq!(tracker.transfer_offset("big.bin"), None);
	}

	#[test]
	fn advance_transfer_rejects_offset_past_total() {
		let mut tracker = ChunkTracker::new();
		tracker.register_transfer("big.bin", 100);
		assert!(tracker.advance_transfer("big.bin", 200).is_err());
	}

	#[test]
	fn advance_unregistered_transfer_fails() {
		let mut tracker = ChunkTracker::new();
		assert!(tracker.advance_transfer("nope", 10).is_err());
	}
}

// vim: ts=4
