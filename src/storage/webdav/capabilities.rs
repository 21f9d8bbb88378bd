//! One-shot, memoized server capability detection.

use crate::types::ServerCapabilities;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

/// Prefixes stripped from the base URL's path to find the server root that
/// hosts `status.php` and the OCS capabilities endpoint. Order matters: the
/// more specific forms must be tried before `/dav/` so it doesn't shadow them.
const DAV_PATH_PREFIXES: &[&str] = &["/remote.php/dav", "/remote.php/webdav", "/dav/"];

#[derive(Debug, Deserialize)]
struct StatusResponse {
	productname: Option<String>,
	version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CapabilitiesResponse {
	ocs: OcsEnvelope,
}

#[derive(Debug, Deserialize)]
struct OcsEnvelope {
	data: OcsData,
}

#[derive(Debug, Deserialize)]
struct OcsData {
	capabilities: OcsCapabilities,
}

#[derive(Debug, Deserialize)]
struct OcsCapabilities {
	files: Option<OcsFiles>,
}

#[derive(Debug, Deserialize)]
struct OcsFiles {
	#[serde(default)]
	bigfilechunking: bool,
}

pub fn server_base(base_url: &Url) -> Url {
	let path = base_url.path();
	let lower = path.to_ascii_lowercase();
	for prefix in DAV_PATH_PREFIXES {
		if let Some(idx) = lower.find(&prefix.to_ascii_lowercase()) {
			let mut stripped = base_url.clone();
			stripped.set_path(&path[..idx]);
			return stripped;
		}
	}
	base_url.clone()
}

/// Runs the status.php / OCS capabilities probe chain. Any network failure
/// is swallowed; the backend then behaves as generic WebDAV.
pub async fn detect(client: &Client, base_url: &Url) -> ServerCapabilities {
	let server_base = server_base(base_url);
	let mut capabilities = ServerCapabilities::default();

	let status_url = join(&server_base, "status.php");
	let status: Option<StatusResponse> = match client.get(status_url).send().await {
		Ok(response) => match response.json().await {
			Ok(body) => Some(body),
			Err(err) => {
				debug!(error = %err, "status.php did not return the expected JSON shape");
				None
			}
		},
		Err(err) => {
			debug!(error = %err, "status.php probe failed, assuming generic webdav");
			None
		}
	};

	let Some(status) = status else { return capabilities };
	let productname = status.productname.unwrap_or_default().to_ascii_lowercase();
	capabilities.server_version = status.version;
	if productname.contains("nextcloud") {
		capabilities.is_nextcloud = true;
	} else if productname.contains("ocis") || productname.contains("owncloud infinite scale") {
		capabilities.is_ocis = true;
	}

	if !capabilities.is_nextcloud && !capabilities.is_ocis {
		return capabilities;
	}

	if capabilities.is_ocis {
		capabilities.supports_ocis_chunking = true;
	}

	let capabilities_url = join(&server_base, "ocs/v1.php/cloud/capabilities");
	match client.get(capabilities_url).header("OCS-APIRequest", "true").send().await {
		Ok(response) => match response.json::<CapabilitiesResponse>().await {
			Ok(body) => {
				if let Some(files) = body.ocs.data.capabilities.files {
					if files.bigfilechunking {
						capabilities.supports_chunking = true;
						capabilities.chunking_version = Some(2);
					}
				}
			}
			Err(err) => warn!(error = %err, "capabilities response did not match expected shape"),
		},
		Err(err) => debug!(error = %err, "capabilities probe failed, keeping defaults"),
	}

	capabilities
}

fn join(base: &Url, segment: &str) -> Url {
	let mut url = base.clone();
	let path = url.path().trim_end_matches('/').to_string();
	url.set_path(&format!("{path}/{segment}"));
	url
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn strips_remote_php_dav() {
		let base = Url::parse("https://cloud.example.com/remote.php/dav/files/alice/").unwrap();
		assert_eq!(server_base(&base).as_str(), "https://cloud.example.com/");
	}

	#[test]
	fn strips_legacy_webdav_prefix() {
		let base = Url::parse("https://cloud.example.com/remote.php/webdav/").unwrap();
		assert_eq!(server_base(&base).as_str(), "https://cloud.example.com/");
	}

	#[test]
	fn dav_prefix_does_not_shadow_remote_php_dav() {
		let base = Url::parse("https://cloud.example.com/remote.php/dav/").unwrap();
		assert_eq!(server_base(&base).as_str(), "https://cloud.example.com/");
	}

	#[test]
	fn generic_server_keeps_base_url() {
		let base = Url::parse("https://dav.example.com/files/").unwrap();
		assert_eq!(server_base(&base).as_str(), "https://dav.example.com/files/");
	}
}

// vim: ts=4
