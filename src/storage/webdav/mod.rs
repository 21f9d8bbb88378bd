//! WebDAV backend, covering generic WebDAV, Nextcloud (chunking v2), and
//! OCIS (TUS 1.0.0) in one implementation dispatched by detected server
//! capabilities.

mod capabilities;
mod chunking;
mod tus;

use crate::chunk_tracker::ChunkTracker;
use crate::config::{WebDavAuth, WebDavConfig};
use crate::error::{ConnectionError, SyncError};
use crate::path::normalize;
use crate::progress::{ProgressEvent, ProgressHub, TransferKind};
use crate::storage::{ByteStream, ChangeInfo, ChangeType, Storage, StorageInfo};
use crate::types::{ServerCapabilities, SyncItem};
use crate::util;
use async_trait::async_trait;
use futures::StreamExt;
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use std::sync::Mutex as StdMutex;
use std::time::{Duration, SystemTime};
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

const PROPFIND: &str = "PROPFIND";

pub struct WebDavStorage {
	client: Client,
	base_url: Url,
	root: String,
	chunk_size_bytes: u64,
	max_retries: u32,
	auth: Option<WebDavAuth>,
	capabilities: OnceCell<ServerCapabilities>,
	chunk_tracker: StdMutex<ChunkTracker>,
	hub: ProgressHub,
}

impl WebDavStorage {
	pub fn new(config: WebDavConfig) -> Result<Self, SyncError> {
		let base_url = Url::parse(&config.base_url)
			.map_err(|err| SyncError::InvalidConfig { message: format!("invalid webdav base_url: {err}") })?;
		// Credentials are attached per-request via `authorize` rather than
		// baked into the client, so a future OAuth2 refresh can swap tokens
		// without rebuilding the client.
		let client = Client::builder()
			.timeout(Duration::from_secs(config.request_timeout_secs))
			.build()
			.map_err(|err| SyncError::Other { message: err.to_string() })?;
		Ok(WebDavStorage {
			client,
			base_url,
			root: config.root,
			chunk_size_bytes: config.chunk_size_bytes,
			max_retries: config.max_retries,
			auth: config.auth,
			capabilities: OnceCell::new(),
			chunk_tracker: StdMutex::new(ChunkTracker::new()),
			hub: ProgressHub::new(),
		})
	}

	async fn capabilities(&self) -> &ServerCapabilities {
		self.capabilities.get_or_init(|| async { capabilities::detect(&self.client, &self.base_url).await }).await
	}

	fn url_for(&self, relative: &str) -> Url {
		let normalized = normalize(relative);
		let root = self.root.trim_matches('/');
		let joined = match (root.is_empty(), normalized.is_empty()) {
			(true, true) => String::new(),
			(true, false) => normalized,
			(false, true) => root.to_string(),
			(false, false) => format!("{root}/{normalized}"),
		};
		let mut url = self.base_url.clone();
		let base_path = url.path().trim_end_matches('/').to_string();
		url.set_path(&format!("{base_path}/{joined}"));
		url
	}

	fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
		match &self.auth {
			Some(WebDavAuth::Basic { username, password }) => builder.basic_auth(username, Some(password)),
			Some(WebDavAuth::Bearer { token }) => builder.bearer_auth(token),
			None => builder,
		}
	}

	/// Runs `op` with exponential backoff (`base * 2^attempt`) on retriable
	/// failures: network errors and HTTP >= 500 / 408.
	async fn with_retry<T, F, Fut>(&self, mut op: F) -> Result<T, SyncError>
	where
		F: FnMut() -> Fut,
		Fut: std::future::Future<Output = Result<T, SyncError>>,
	{
		let base = Duration::from_millis(250);
		let mut last_err = None;
		for attempt in 0..self.max_retries.max(1) {
			match op().await {
				Ok(value) => return Ok(value),
				Err(err) if is_retriable(&err) => {
					last_err = Some(err);
					tokio::time::sleep(base * 2u32.saturating_pow(attempt)).await;
				}
				Err(err) => return Err(err),
			}
		}
		Err(last_err.unwrap_or(SyncError::Other { message: "retry budget exhausted".into() }))
	}

	async fn mkcol(&self, url: &Url) -> Result<(), SyncError> {
		let response = self
			.authorize(self.client.request(Method::from_bytes(b"MKCOL").unwrap(), url.clone()))
			.send()
			.await
			.map_err(|err| SyncError::Connection(ConnectionError::HttpFailed { url: url.to_string(), status: None, message: err.to_string() }))?;
		match response.status() {
			StatusCode::CREATED => Ok(()),
			StatusCode::METHOD_NOT_ALLOWED | StatusCode::CONFLICT => Ok(()),
			status_code => Err(SyncError::Connection(ConnectionError::HttpFailed { url: url.to_string(), status: Some(status_code.as_u16()), message: format!("MKCOL failed: {status_code}") })),
		}
	}

	async fn ensure_parents(&self, path: &str) -> Result<(), SyncError> {
		let normalized = normalize(path);
		let mut accumulated = String::new();
		let segments: Vec<&str> = normalized.split('/').filter(|s| !s.is_empty()).collect();
		for segment in segments.iter().take(segments.len().saturating_sub(1)) {
			accumulated = if accumulated.is_empty() { segment.to_string() } else { format!("{accumulated}/{segment}") };
			let url = self.url_for(&accumulated);
			self.mkcol(&url).await?;
			tokio::time::sleep(Duration::from_millis(80)).await;
		}
		Ok(())
	}

	async fn put_small(&self, path: &str, bytes: Vec<u8>) -> Result<(), SyncError> {
		let url = self.url_for(path);
		let response = self
			.authorize(self.client.put(url.clone()))
			.body(bytes.clone())
			.send()
			.await
			.map_err(|err| SyncError::Connection(ConnectionError::HttpFailed { url: url.to_string(), status: None, message: err.to_string() }))?;
		if response.status() == StatusCode::CONFLICT {
			self.ensure_parents(path).await?;
			let retry = self
				.authorize(self.client.put(url.clone()))
				.body(bytes)
				.send()
				.await
				.map_err(|err| SyncError::Connection(ConnectionError::HttpFailed { url: url.to_string(), status: None, message: err.to_string() }))?;
			if !retry.status().is_success() {
				return Err(SyncError::Connection(ConnectionError::HttpFailed { url: url.to_string(), status: Some(retry.status().as_u16()), message: format!("PUT failed after recreate: {}", retry.status()) }));
			}
			return Ok(());
		}
		if !response.status().is_success() {
			return Err(SyncError::Connection(ConnectionError::HttpFailed { url: url.to_string(), status: Some(response.status().as_u16()), message: format!("PUT failed: {}", response.status()) }));
		}
		Ok(())
	}

	async fn put_large_nextcloud(&self, path: &str, bytes: Vec<u8>) -> Result<(), SyncError> {
		let folder = chunking::start(&self.client, &self.base_url).await?;
		let total = bytes.len() as u64;
		let result: Result<(), SyncError> = async {
			for (index, chunk) in bytes.chunks(self.chunk_size_bytes.max(1) as usize).enumerate() {
				chunking::put_chunk(&self.client, &folder, index as u32, chunk.to_vec()).await?;
				self.hub.publish_progress(ProgressEvent {
					path: path.to_string(),
					kind: TransferKind::Upload,
					bytes_transferred: ((index + 1) * self.chunk_size_bytes.max(1) as usize).min(total as usize) as u64,
					total_bytes: total,
				});
			}
			let dest = self.url_for(path);
			chunking::assemble(&self.client, &folder, dest.path(), total).await
		}
		.await;
		if result.is_err() {
			chunking::abort(&self.client, &folder).await;
		}
		result
	}

	async fn put_large_tus(&self, path: &str, bytes: Vec<u8>) -> Result<(), SyncError> {
		let target = self.url_for(path);
		let total = bytes.len() as u64;
		let filename = path.rsplit('/').next().unwrap_or(path);
		{
			let mut tracker = lock(&self.chunk_tracker);
			if tracker.transfer_offset(path).is_none() {
				tracker.register_transfer(path, total);
			}
		}
		let resume_from = lock(&self.chunk_tracker).transfer_offset(path).unwrap_or(0);
		let upload_url = tus::create_upload(&self.client, &target, filename, total).await?;
		let mut offset = resume_from;
		let chunk_size = self.chunk_size_bytes.max(1) as usize;
		while offset < total {
			let end = (offset as usize + chunk_size).min(bytes.len());
			let chunk = &bytes[offset as usize..end];
			let attempt = tus::upload_chunk(&self.client, &upload_url, path, offset, chunk, &self.chunk_tracker).await;
			offset = match attempt {
				Ok(new_offset) => new_offset,
				Err(err) if is_retriable(&err) => tus::probe_offset(&self.client, &upload_url).await.unwrap_or(offset),
				Err(err) => return Err(err),
			};
			self.hub.publish_progress(ProgressEvent {
				path: path.to_string(),
				kind: TransferKind::Upload,
				bytes_transferred: offset,
				total_bytes: total,
			});
		}
		lock(&self.chunk_tracker).complete_transfer(path);
		Ok(())
	}
}

fn lock(tracker: &StdMutex<ChunkTracker>) -> std::sync::MutexGuard<'_, ChunkTracker> {
	tracker.lock().unwrap_or_else(|poison| poison.into_inner())
}

/// A transport failure (no response at all) or a 5xx/408 response is worth
/// retrying. Any other HTTP status - in particular 4xx like 401/403/404 - is
/// the server telling us plainly that retrying won't help, so it surfaces
/// immediately instead of burning the retry budget.
fn is_retriable(err: &SyncError) -> bool {
	match err {
		SyncError::Connection(ConnectionError::HttpFailed { status: None, .. }) => true,
		SyncError::Connection(ConnectionError::HttpFailed { status: Some(status), .. }) => {
			*status >= 500 || *status == 408
		}
		SyncError::Connection(ConnectionError::Timeout) => true,
		SyncError::Connection(ConnectionError::Disconnected) => true,
		_ => false,
	}
}

#[derive(Debug, Deserialize)]
struct PropfindEntry {
	href: String,
	is_collection: bool,
	size: u64,
	last_modified: Option<String>,
	etag: Option<String>,
}

/// Minimal streaming parser for a WebDAV `multistatus` response: enough to
/// recover path, collection-ness, size, last-modified, and etag per
/// `<D:response>` without pulling in a full XML data-binding layer.
fn parse_multistatus(body: &str) -> Vec<PropfindEntry> {
	let mut reader = Reader::from_str(body);
	reader.config_mut().trim_text(true);
	let mut entries = Vec::new();
	let mut current_href = None;
	let mut current_is_collection = false;
	let mut current_size = 0u64;
	let mut current_modified = None;
	let mut current_etag = None;
	let mut in_tag: Option<String> = None;
	let mut buf = Vec::new();
	loop {
		match reader.read_event_into(&mut buf) {
			Ok(Event::Start(tag)) => {
				let name = local_name(&tag.name().as_ref());
				if name == "response" {
					current_href = None;
					current_is_collection = false;
					current_size = 0;
					current_modified = None;
					current_etag = None;
				} else if name == "collection" {
					current_is_collection = true;
				}
				in_tag = Some(name);
			}
			Ok(Event::Text(text)) => {
				if let Some(tag) = &in_tag {
					let value = text.unescape().unwrap_or_default().to_string();
					match tag.as_str() {
						"href" => current_href = Some(value),
						"getcontentlength" => current_size = value.parse().unwrap_or(0),
						"getlastmodified" => current_modified = Some(value),
						"getetag" => current_etag = Some(value.trim_matches('"').to_string()),
						_ => {}
					}
				}
			}
			Ok(Event::End(tag)) => {
				let name = local_name(&tag.name().as_ref());
				if name == "response" {
					if let Some(href) = current_href.take() {
						entries.push(PropfindEntry {
							href,
							is_collection: current_is_collection,
							size: current_size,
							last_modified: current_modified.take(),
							etag: current_etag.take(),
						});
					}
				}
				in_tag = None;
			}
			Ok(Event::Eof) => break,
			Err(err) => {
				warn!(error = %err, "malformed PROPFIND response, stopping parse early");
				break;
			}
			_ => {}
		}
		buf.clear();
	}
	entries
}

fn local_name(qualified: &&[u8]) -> String {
	let text = String::from_utf8_lossy(qualified);
	text.rsplit(':').next().unwrap_or(&text).to_ascii_lowercase()
}

fn parse_http_date(raw: &str) -> SystemTime {
	httpdate::parse_http_date(raw).unwrap_or(SystemTime::UNIX_EPOCH)
}

#[async_trait]
impl Storage for WebDavStorage {
	async fn list_items(&self, path: &str, _cancel: &CancellationToken) -> Result<Vec<SyncItem>, SyncError> {
		let url = self.url_for(path);
		let base_path_len = self.url_for("").path().len();
		let body = self
			.with_retry(|| async {
				let response = self
					.authorize(self.client.request(Method::from_bytes(PROPFIND.as_bytes()).unwrap(), url.clone()))
					.header("Depth", "1")
					.body(r#"<?xml version="1.0"?><D:propfind xmlns:D="DAV:"><D:allprop/></D:propfind>"#)
					.send()
					.await
					.map_err(|err| SyncError::Connection(ConnectionError::HttpFailed { url: url.to_string(), status: None, message: err.to_string() }))?;
				if response.status() == StatusCode::NOT_FOUND {
					return Ok(None);
				}
				if !response.status().is_success() && response.status().as_u16() != 207 {
					return Err(SyncError::Connection(ConnectionError::HttpFailed { url: url.to_string(), status: Some(response.status().as_u16()), message: format!("PROPFIND failed: {}", response.status()) }));
				}
				let text = response.text().await.map_err(|err| SyncError::Other { message: err.to_string() })?;
				Ok(Some(text))
			})
			.await?;
		let Some(body) = body else { return Ok(Vec::new()) };
		let entries = parse_multistatus(&body);
		let mut items = Vec::new();
		for entry in entries {
			let decoded = percent_decode(&entry.href);
			if decoded.trim_end_matches('/').len() <= base_path_len {
				continue; // the collection's own PROPFIND entry
			}
			let relative = decoded[base_path_len..].trim_matches('/').to_string();
			let modified = entry.last_modified.map(|raw| parse_http_date(&raw)).unwrap_or(SystemTime::UNIX_EPOCH);
			let mut item = if entry.is_collection {
				SyncItem::directory(relative, modified)
			} else {
				SyncItem::file(relative, entry.size, modified)
			};
			item.etag = entry.etag;
			items.push(item);
		}
		Ok(items)
	}

	async fn get_item(&self, path: &str, cancel: &CancellationToken) -> Result<Option<SyncItem>, SyncError> {
		let normalized = normalize(path);
		if normalized.is_empty() {
			return Ok(Some(SyncItem::directory(String::new(), SystemTime::now())));
		}
		let Some(parent_index) = normalized.rfind('/') else {
			let items = self.list_items("", cancel).await?;
			return Ok(items.into_iter().find(|item| item.path == normalized));
		};
		let parent = &normalized[..parent_index];
		let items = self.list_items(parent, cancel).await?;
		Ok(items.into_iter().find(|item| item.path == normalized))
	}

	async fn read_file(&self, path: &str, _cancel: &CancellationToken) -> Result<ByteStream, SyncError> {
		let url = self.url_for(path);
		let response = self
			.authorize(self.client.get(url.clone()))
			.send()
			.await
			.map_err(|err| SyncError::Connection(ConnectionError::HttpFailed { url: url.to_string(), status: None, message: err.to_string() }))?;
		if response.status() == StatusCode::NOT_FOUND {
			return Err(SyncError::NotFound { path: path.to_string() });
		}
		if !response.status().is_success() {
			return Err(SyncError::Connection(ConnectionError::HttpFailed { url: url.to_string(), status: Some(response.status().as_u16()), message: format!("GET failed: {}", response.status()) }));
		}
		let stream = response.bytes_stream().map(|chunk| chunk.map_err(|err| SyncError::Other { message: err.to_string() }));
		Ok(Box::pin(stream))
	}

	async fn write_file(
		&self,
		path: &str,
		mut data: ByteStream,
		size_hint: Option<u64>,
		cancel: &CancellationToken,
	) -> Result<(), SyncError> {
		let mut buf = Vec::new();
		while let Some(chunk) = data.next().await {
			if cancel.is_cancelled() {
				return Err(SyncError::Cancelled);
			}
			buf.extend_from_slice(&chunk?);
		}
		let total = size_hint.unwrap_or(buf.len() as u64);
		if total <= self.chunk_size_bytes {
			return self.put_small(path, buf).await;
		}
		let capabilities = self.capabilities().await;
		if capabilities.supports_ocis_chunking {
			match self.put_large_tus(path, buf.clone()).await {
				Ok(()) => Ok(()),
				Err(err) if !matches!(err, SyncError::Cancelled) => {
					warn!(error = %err, path, "TUS upload failed, falling back to plain PUT");
					self.put_small(path, buf).await
				}
				Err(err) => Err(err),
			}
		} else if capabilities.supports_chunking {
			self.put_large_nextcloud(path, buf).await
		} else {
			self.put_small(path, buf).await
		}
	}

	async fn create_directory(&self, path: &str, _cancel: &CancellationToken) -> Result<(), SyncError> {
		let normalized = normalize(path);
		if normalized.is_empty() {
			return Ok(());
		}
		let mut accumulated = String::new();
		for segment in normalized.split('/').filter(|s| !s.is_empty()) {
			accumulated = if accumulated.is_empty() { segment.to_string() } else { format!("{accumulated}/{segment}") };
			let url = self.url_for(&accumulated);
			self.mkcol(&url).await?;
			tokio::time::sleep(Duration::from_millis(80)).await;
		}
		Ok(())
	}

	async fn delete(&self, path: &str, _cancel: &CancellationToken) -> Result<(), SyncError> {
		let url = self.url_for(path);
		let response = self
			.authorize(self.client.request(Method::DELETE, url.clone()))
			.send()
			.await
			.map_err(|err| SyncError::Connection(ConnectionError::HttpFailed { url: url.to_string(), status: None, message: err.to_string() }))?;
		if response.status().is_success() || response.status() == StatusCode::NOT_FOUND {
			Ok(())
		} else {
			Err(SyncError::Connection(ConnectionError::HttpFailed { url: url.to_string(), status: Some(response.status().as_u16()), message: format!("DELETE failed: {}", response.status()) }))
		}
	}

	async fn move_item(&self, source: &str, target: &str, _cancel: &CancellationToken) -> Result<(), SyncError> {
		let source_url = self.url_for(source);
		let target_url = self.url_for(target);
		let response = self
			.authorize(self.client.request(Method::from_bytes(b"MOVE").unwrap(), source_url.clone()))
			.header("Destination", target_url.as_str())
			.header("Overwrite", "T")
			.send()
			.await
			.map_err(|err| SyncError::Connection(ConnectionError::HttpFailed { url: source_url.to_string(), status: None, message: err.to_string() }))?;
		if response.status().is_success() {
			Ok(())
		} else {
			Err(SyncError::Connection(ConnectionError::HttpFailed { url: source_url.to_string(), status: Some(response.status().as_u16()), message: format!("MOVE failed: {}", response.status()) }))
		}
	}

	async fn storage_info(&self, _cancel: &CancellationToken) -> Result<StorageInfo, SyncError> {
		Ok(StorageInfo { total_bytes: -1, used_bytes: -1 })
	}

	async fn compute_hash(&self, path: &str, cancel: &CancellationToken) -> Result<String, SyncError> {
		let capabilities = self.capabilities().await;
		if !capabilities.is_generic_webdav() {
			if let Some(hash) = self.propfind_checksum(path).await? {
				return Ok(hash);
			}
		}
		let mut stream = self.read_file(path, cancel).await?;
		let mut bytes = Vec::new();
		while let Some(chunk) = stream.next().await {
			bytes.extend_from_slice(&chunk?);
		}
		Ok(util::hash_to_base64(&util::hash_binary(&bytes)))
	}

	async fn test_connection(&self, _cancel: &CancellationToken) -> Result<bool, SyncError> {
		let url = self.url_for("");
		let response = self
			.authorize(self.client.request(Method::from_bytes(PROPFIND.as_bytes()).unwrap(), url))
			.header("Depth", "0")
			.body(r#"<?xml version="1.0"?><D:propfind xmlns:D="DAV:"><D:prop/></D:propfind>"#)
			.send()
			.await;
		Ok(response.map(|r| r.status().is_success() || r.status().as_u16() == 207).unwrap_or(false))
	}

	async fn get_remote_changes(&self, since: SystemTime, _cancel: &CancellationToken) -> Result<Vec<ChangeInfo>, SyncError> {
		let capabilities = self.capabilities().await;
		if capabilities.is_generic_webdav() {
			return Ok(Vec::new());
		}
		let server_base = capabilities::server_base(&self.base_url);
		let since_unix = since.duration_since(SystemTime::UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
		let mut url = server_base.clone();
		let path = url.path().trim_end_matches('/').to_string();
		url.set_path(&format!("{path}/ocs/v2.php/apps/activity/api/v2/activity/filter"));
		url.query_pairs_mut().append_pair("format", "json").append_pair("object_type", "files").append_pair("since", &since_unix.to_string());
		let response = self.authorize(self.client.get(url.clone())).header("OCS-APIRequest", "true").send().await;
		let Ok(response) = response else { return Ok(Vec::new()) };
		#[derive(Deserialize)]
		struct ActivityEnvelope {
			ocs: ActivityOcs,
		}
		#[derive(Deserialize)]
		struct ActivityOcs {
			data: Vec<ActivityEntry>,
		}
		#[derive(Deserialize)]
		struct ActivityEntry {
			#[serde(rename = "type")]
			kind: String,
			object_name: Option<String>,
			datetime: Option<String>,
		}
		let Ok(parsed) = response.json::<ActivityEnvelope>().await else { return Ok(Vec::new()) };
		let mut changes = Vec::new();
		for entry in parsed.ocs.data {
			let change_type = match entry.kind.as_str() {
				"file_created" | "file_restored" => ChangeType::Created,
				"file_changed" => ChangeType::Changed,
				"file_deleted" => ChangeType::Deleted,
				_ => continue,
			};
			let occurred_at = entry.datetime.as_deref().map(parse_http_date).unwrap_or(SystemTime::now());
			if occurred_at <= since {
				continue;
			}
			changes.push(ChangeInfo { path: entry.object_name.unwrap_or_default(), change_type, occurred_at });
		}
		Ok(changes)
	}

	fn progress_hub(&self) -> &ProgressHub {
		&self.hub
	}
}

impl WebDavStorage {
	async fn propfind_checksum(&self, path: &str) -> Result<Option<String>, SyncError> {
		let url = self.url_for(path);
		let body = r#"<?xml version="1.0"?><D:propfind xmlns:D="DAV:" xmlns:oc="http://owncloud.org/ns"><D:prop><oc:checksums/></D:prop></D:propfind>"#;
		let response = self
			.authorize(self.client.request(Method::from_bytes(PROPFIND.as_bytes()).unwrap(), url.clone()))
			.header("Depth", "0")
			.body(body)
			.send()
			.await
			.map_err(|err| SyncError::Connection(ConnectionError::HttpFailed { url: url.to_string(), status: None, message: err.to_string() }))?;
		if !response.status().is_success() && response.status().as_u16() != 207 {
			return Ok(None);
		}
		let text = response.text().await.unwrap_or_default();
		if let Some(idx) = text.find("checksum") {
			if let Some(raw) = text[idx..].split(['<', '>']).find(|s| s.contains(':') && !s.contains('/')) {
				if let Some(hex) = util::parse_checksum_property(raw.trim()) {
					debug!(path, "using server-reported checksum");
					return Ok(Some(hex.to_string()));
				}
			}
		}
		Ok(None)
	}
}

fn percent_decode(raw: &str) -> String {
	percent_encoding::percent_decode_str(raw).decode_utf8_lossy().to_string()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_simple_multistatus_response() {
		let body = r#"<?xml version="1.0"?>
<D:multistatus xmlns:D="DAV:">
  <D:response>
    <D:href>/remote.php/dav/files/alice/docs/</D:href>
    <D:propstat><D:prop><D:resourcetype><D:collection/></D:resourcetype></D:prop></D:propstat>
  </D:response>
  <D:response>
    <D:href>/remote.php/dav/files/alice/docs/a.txt</D:href>
    <D:propstat><D:prop>
      <D:getcontentlength>42</D:getcontentlength>
      <D:getlastmodified>Mon, 01 Jan 2024 00:00:00 GMT</D:getlastmodified>
      <D:getetag>"abc123"</D:getetag>
    </D:prop></D:propstat>
  </D:response>
</D:multistatus>"#;
		let entries = parse_multistatus(body);
		assert_eq!(entries.len(), 2);
		assert!(entries[0].is_collection);
		assert_eq!(entries[1].size, 42);
		assert_eq!(entries[1].etag.as_deref(), Some("abc123"));
	}

	#[test]
	fn url_for_joins_root_and_path() {
		let storage = WebDavStorage {
			client: Client::new(),
			base_url: Url::parse("https://cloud.example.com/remote.php/dav/files/alice/").unwrap(),
			root: "projects".into(),
			chunk_size_bytes: 10 * 1024 * 1024,
			max_retries: 3,
			capabilities: OnceCell::new(),
			chunk_tracker: StdMutex::new(ChunkTracker::new()),
			hub: ProgressHub::new(),
			auth: None,
		};
		let url = storage.url_for("docs/a.txt");
		assert!(url.as_str().ends_with("/projects/docs/a.txt"));
	}

	#[test]
	fn is_retriable_retries_transport_failures_and_server_errors_only() {
		let transport = SyncError::Connection(ConnectionError::HttpFailed { url: "x".into(), status: None, message: "connection reset".into() });
		let server_error = SyncError::Connection(ConnectionError::HttpFailed { url: "x".into(), status: Some(503), message: "".into() });
		let request_timeout = SyncError::Connection(ConnectionError::HttpFailed { url: "x".into(), status: Some(408), message: "".into() });
		let forbidden = SyncError::Connection(ConnectionError::HttpFailed { url: "x".into(), status: Some(403), message: "".into() });
		let not_found = SyncError::Connection(ConnectionError::HttpFailed { url: "x".into(), status: Some(404), message: "".into() });
		let bad_request = SyncError::Connection(ConnectionError::HttpFailed { url: "x".into(), status: Some(400), message: "".into() });

		assert!(is_retriable(&transport));
		assert!(is_retriable(&server_error));
		assert!(is_retriable(&request_timeout));
		assert!(!is_retriable(&forbidden));
		assert!(!is_retriable(&not_found));
		assert!(!is_retriable(&bad_request));
	}
}

// vim: ts=4
