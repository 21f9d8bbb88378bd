//! TUS 1.0.0 resumable upload protocol, used against OCIS.
//!
//! The `ChunkTracker`'s offset-oracle methods (`register_transfer`/
//! `advance_transfer`/`transfer_offset`) track progress so a caller can
//! resume an interrupted sync without re-reading the whole file.

use crate::chunk_tracker::ChunkTracker;
use crate::error::{ChunkError, ConnectionError, SyncError};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Client;
use std::sync::Mutex;
use url::Url;

const TUS_VERSION: &str = "1.0.0";

pub async fn create_upload(
	client: &Client,
	target_url: &Url,
	filename: &str,
	total_size: u64,
) -> Result<Url, SyncError> {
	let metadata = format!("filename {}", STANDARD.encode(filename));
	let response = client
		.post(target_url.clone())
		.header("Tus-Resumable", TUS_VERSION)
		.header("Upload-Length", total_size.to_string())
		.header("Upload-Metadata", metadata)
		.body(Vec::new())
		.send()
		.await
		.map_err(|err| SyncError::Connection(ConnectionError::HttpFailed { url: target_url.to_string(), status: None, message: err.to_string() }))?;

	if !response.status().is_success() {
		return Err(SyncError::Chunk(ChunkError::OffsetUnavailable { upload_url: target_url.to_string() }));
	}
	let location = response
		.headers()
		.get("Location")
		.and_then(|value| value.to_str().ok())
		.ok_or_else(|| SyncError::Chunk(ChunkError::OffsetUnavailable { upload_url: target_url.to_string() }))?;
	target_url.join(location).map_err(|err| SyncError::Other { message: err.to_string() })
}

/// PATCHes one chunk, registering/advancing progress in `tracker` as it
/// goes so the caller can resume after a crash mid-transfer.
pub async fn upload_chunk(
	client: &Client,
	upload_url: &Url,
	path: &str,
	offset: u64,
	chunk: &[u8],
	tracker: &Mutex<ChunkTracker>,
) -> Result<u64, SyncError> {
	let response = client
		.patch(upload_url.clone())
		.header("Tus-Resumable", TUS_VERSION)
		.header("Upload-Offset", offset.to_string())
		.header("Content-Type", "application/offset+octet-stream")
		.body(chunk.to_vec())
		.send()
		.await
		.map_err(|err| SyncError::Connection(ConnectionError::HttpFailed { url: upload_url.to_string(), status: None, message: err.to_string() }))?;

	let new_offset = if response.status().is_success() {
		response
			.headers()
			.get("Upload-Offset")
			.and_then(|value| value.to_str().ok())
			.and_then(|value| value.parse::<u64>().ok())
			.unwrap_or(offset + chunk.len() as u64)
	} else {
		return Err(SyncError::Chunk(ChunkError::OffsetUnavailable { upload_url: upload_url.to_string() }));
	};

	lock(tracker).advance_transfer(path, new_offset).map_err(|err| SyncError::Chunk(ChunkError::TrackingFailed { message: err.to_string() }))?;
	Ok(new_offset)
}

/// HEAD the upload URL to recover the server's view of the offset after a
/// retriable PATCH failure.
pub async fn probe_offset(client: &Client, upload_url: &Url) -> Result<u64, SyncError> {
	let response = client
		.head(upload_url.clone())
		.header("Tus-Resumable", TUS_VERSION)
		.send()
		.await
		.map_err(|err| SyncError::Connection(ConnectionError::HttpFailed { url: upload_url.to_string(), status: None, message: err.to_string() }))?;
	response
		.headers()
		.get("Upload-Offset")
		.and_then(|value| value.to_str().ok())
		.and_then(|value| value.parse::<u64>().ok())
		.ok_or_else(|| SyncError::Chunk(ChunkError::OffsetUnavailable { upload_url: upload_url.to_string() }))
}

fn lock(tracker: &Mutex<ChunkTracker>) -> std::sync::MutexGuard<'_, ChunkTracker> {
	tracker.lock().unwrap_or_else(|poison| poison.into_inner())
}


// vim: ts=4
