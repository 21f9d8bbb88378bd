//! Nextcloud chunking-v2 large-file upload.
//!
//! Create `.file-chunking/{random-128-bit}`, PUT each chunk under a
//! zero-padded 6-digit name, then write a `.assembling` marker whose body
//! tells the server where to assemble the chunks. Best-effort cleanup on
//! any exit path.

use crate::error::{ConnectionError, SyncError};
use reqwest::Client;
use serde::Serialize;
use url::Url;
use uuid::Uuid;

#[derive(Serialize)]
struct AssemblyMarker<'a> {
	dest: &'a str,
	size: u64,
}

/// Returns the folder URL created for this upload; callers should clean it
/// up with [`abort`] if they do not reach [`assemble`].
pub async fn start(client: &Client, webdav_root: &Url) -> Result<Url, SyncError> {
	let folder_name = format!(".file-chunking/{}", Uuid::new_v4().simple());
	let folder_url = join(webdav_root, &folder_name);
	let response = client
		.request(reqwest::Method::from_bytes(b"MKCOL").unwrap(), folder_url.clone())
		.send()
		.await
		.map_err(|err| SyncError::Connection(ConnectionError::HttpFailed { url: folder_url.to_string(), status: None, message: err.to_string() }))?;
	if !response.status().is_success() && response.status().as_u16() != 405 {
		return Err(SyncError::Connection(ConnectionError::HttpFailed {
			url: folder_url.to_string(),
			status: Some(response.status().as_u16()),
			message: format!("MKCOL failed: {}", response.status()),
		}));
	}
	Ok(folder_url)
}

pub async fn put_chunk(client: &Client, folder_url: &Url, index: u32, bytes: Vec<u8>) -> Result<(), SyncError> {
	let chunk_url = join(folder_url, &format!("{index:06}"));
	let response = client
		.put(chunk_url.clone())
		.body(bytes)
		.send()
		.await
		.map_err(|err| SyncError::Connection(ConnectionError::HttpFailed { url: chunk_url.to_string(), status: None, message: err.to_string() }))?;
	if !response.status().is_success() {
		return Err(SyncError::Connection(ConnectionError::HttpFailed {
			url: chunk_url.to_string(),
			status: Some(response.status().as_u16()),
			message: format!("chunk PUT failed: {}", response.status()),
		}));
	}
	Ok(())
}

pub async fn assemble(client: &Client, folder_url: &Url, dest_absolute_path: &str, total_size: u64) -> Result<(), SyncError> {
	let marker_url = join(folder_url, ".assembling");
	let body = serde_json::to_vec(&AssemblyMarker { dest: dest_absolute_path, size: total_size })
		.map_err(|err| SyncError::Other { message: err.to_string() })?;
	let response = client
		.put(marker_url.clone())
		.body(body)
		.send()
		.await
		.map_err(|err| SyncError::Connection(ConnectionError::HttpFailed { url: marker_url.to_string(), status: None, message: err.to_string() }))?;
	let result = if response.status().is_success() {
		Ok(())
	} else {
		Err(SyncError::Connection(ConnectionError::HttpFailed {
			url: marker_url.to_string(),
			status: Some(response.status().as_u16()),
			message: format!("assembly marker PUT failed: {}", response.status()),
		}))
	};
	abort(client, folder_url).await;
	result
}

/// Best-effort chunk-folder cleanup; failures here are swallowed since the
/// assembly either already succeeded or the whole upload is being abandoned.
pub async fn abort(client: &Client, folder_url: &Url) {
	let _ = client.request(reqwest::Method::from_bytes(b"DELETE").unwrap(), folder_url.clone()).send().await;
}

fn join(base: &Url, segment: &str) -> Url {
	let mut url = base.clone();
	let path = url.path().trim_end_matches('/').to_string();
	url.set_path(&format!("{path}/{segment}"));
	url
}


// vim: ts=4
