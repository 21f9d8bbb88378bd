//! Typed, in-process configuration.
//!
//! This module defines the structs callers construct and pass to storage
//! backends and the sync engine. Parsing these out of a config file (TOML,
//! JSON, ...) is the embedding application's job, not this crate's; these
//! types are validated eagerly at construction via [`Validator`].

#![allow(dead_code)]

use crate::validation::{ValidationError, Validator};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The closed set of knobs the sync engine accepts for one `synchronize()` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SyncOptions {
	/// Detect changes by content hash only, ignoring size/mtime.
	pub checksum_only: bool,
	/// Detect changes by size only.
	pub size_only: bool,
	pub preserve_timestamps: bool,
	pub preserve_permissions: bool,
	pub follow_symlinks: bool,
	/// Glob patterns excluded from both trees before detection.
	pub exclude_patterns: Vec<String>,
	pub timeout_seconds: u64,
	/// Re-upload/re-download even when the detector finds no change.
	pub update_existing: bool,
	/// Forces every conflict to this resolution, bypassing the resolver.
	pub conflict_resolution_override: Option<crate::types::ConflictResolution>,
	pub verbose: bool,
	/// `None` disables throttling.
	pub bandwidth_limit_bytes_per_second: Option<u64>,
}

impl Default for SyncOptions {
	fn default() -> Self {
		SyncOptions {
			checksum_only: false,
			size_only: false,
			preserve_timestamps: true,
			preserve_permissions: true,
			follow_symlinks: false,
			exclude_patterns: vec![],
			timeout_seconds: 30,
			update_existing: false,
			conflict_resolution_override: None,
			verbose: false,
			bandwidth_limit_bytes_per_second: None,
		}
	}
}

impl Validator for SyncOptions {
	fn validate(&self) -> Result<(), ValidationError> {
		if self.checksum_only && self.size_only {
			return Err(ValidationError::ConfigError(
				"checksum_only and size_only are mutually exclusive".to_string(),
			));
		}
		if self.timeout_seconds == 0 {
			return Err(ValidationError::ConfigError("timeout_seconds must be > 0".to_string()));
		}
		Ok(())
	}
}

/// Local-filesystem-as-remote configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct LocalConfig {
	pub root: PathBuf,
}

impl Default for LocalConfig {
	fn default() -> Self {
		LocalConfig { root: PathBuf::from(".") }
	}
}

impl Validator for LocalConfig {
	fn validate(&self) -> Result<(), ValidationError> {
		if self.root.as_os_str().is_empty() {
			return Err(ValidationError::ConfigError("root must not be empty".to_string()));
		}
		Ok(())
	}
}

/// SFTP authentication method.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SftpAuth {
	Password { password: String },
	KeyFile { private_key_path: PathBuf, passphrase: Option<String> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SftpConfig {
	pub host: String,
	pub port: u16,
	pub username: String,
	pub auth: Option<SftpAuth>,
	/// Empty, or not starting with `/`, selects relative-path mode.
	pub root: String,
	pub connection_timeout_secs: u64,
	pub retry_count: u32,
}

impl Default for SftpConfig {
	fn default() -> Self {
		SftpConfig {
			host: String::new(),
			port: 22,
			username: String::new(),
			auth: None,
			root: String::new(),
			connection_timeout_secs: 30,
			retry_count: 3,
		}
	}
}

impl Validator for SftpConfig {
	fn validate(&self) -> Result<(), ValidationError> {
		if self.host.is_empty() {
			return Err(ValidationError::ConfigError("host must not be empty".to_string()));
		}
		if self.username.is_empty() {
			return Err(ValidationError::ConfigError("username must not be empty".to_string()));
		}
		if self.auth.is_none() {
			return Err(ValidationError::ConfigError(
				"auth must be configured (password or key file)".to_string(),
			));
		}
		Ok(())
	}
}

/// FTP/FTPS transport-security mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum FtpEncryption {
	#[default]
	None,
	Explicit,
	Implicit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct FtpConfig {
	pub host: String,
	pub port: u16,
	pub username: String,
	pub password: String,
	pub encryption: FtpEncryption,
	pub root: String,
	pub passive: bool,
}

impl Default for FtpConfig {
	fn default() -> Self {
		FtpConfig {
			host: String::new(),
			port: 21,
			username: "anonymous".to_string(),
			password: String::new(),
			encryption: FtpEncryption::default(),
			root: String::new(),
			passive: true,
		}
	}
}

impl Validator for FtpConfig {
	fn validate(&self) -> Result<(), ValidationError> {
		if self.host.is_empty() {
			return Err(ValidationError::ConfigError("host must not be empty".to_string()));
		}
		if self.port == 0 {
			return Err(ValidationError::ConfigError("port must be nonzero".to_string()));
		}
		Ok(())
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct S3Config {
	/// Custom endpoint for S3-compatible stores; `None` uses AWS's default.
	pub endpoint: Option<String>,
	pub region: String,
	pub bucket: String,
	/// Key prefix acting as this backend's "root".
	pub prefix: String,
	pub access_key: String,
	pub secret_key: String,
	/// Path-style addressing (`endpoint/bucket/key`) vs virtual-hosted style.
	pub path_style: bool,
	pub chunk_size_bytes: u64,
	pub max_concurrent_transfers: usize,
}

impl Default for S3Config {
	fn default() -> Self {
		S3Config {
			endpoint: None,
			region: "us-east-1".to_string(),
			bucket: String::new(),
			prefix: String::new(),
			access_key: String::new(),
			secret_key: String::new(),
			path_style: false,
			chunk_size_bytes: 8 * 1024 * 1024,
			max_concurrent_transfers: 10,
		}
	}
}

impl Validator for S3Config {
	fn validate(&self) -> Result<(), ValidationError> {
		if self.bucket.is_empty() {
			return Err(ValidationError::ConfigError("bucket must not be empty".to_string()));
		}
		if self.max_concurrent_transfers == 0 {
			return Err(ValidationError::ConfigError(
				"max_concurrent_transfers must be > 0".to_string(),
			));
		}
		Ok(())
	}
}

/// Bearer-token auth for WebDAV; the OAuth2 refresh dance is handled by an
/// external [`crate::oauth::OAuth2Provider`], not by this struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WebDavAuth {
	Basic { username: String, password: String },
	Bearer { token: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct WebDavConfig {
	pub base_url: String,
	pub auth: Option<WebDavAuth>,
	pub root: String,
	pub chunk_size_bytes: u64,
	pub request_timeout_secs: u64,
	pub max_retries: u32,
	/// Enable the optional Nextcloud activity-feed change poller.
	pub poll_remote_changes: bool,
}

impl Default for WebDavConfig {
	fn default() -> Self {
		WebDavConfig {
			base_url: String::new(),
			auth: None,
			root: String::new(),
			chunk_size_bytes: 10 * 1024 * 1024,
			request_timeout_secs: 30,
			max_retries: 3,
			poll_remote_changes: false,
		}
	}
}

impl Validator for WebDavConfig {
	fn validate(&self) -> Result<(), ValidationError> {
		if self.base_url.is_empty() {
			return Err(ValidationError::ConfigError("base_url must not be empty".to_string()));
		}
		url::Url::parse(&self.base_url)
			.map_err(|e| ValidationError::ConfigError(format!("invalid base_url: {}", e)))?;
		if self.auth.is_none() {
			return Err(ValidationError::ConfigError("auth must be configured".to_string()));
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn sync_options_default_is_valid() {
		assert!(SyncOptions::default().validate().is_ok());
	}

	#[test]
	fn sync_options_rejects_conflicting_detection_modes() {
		let mut opts = SyncOptions::default();
		opts.checksum_only = true;
		opts.size_only = true;
		assert!(opts.validate().is_err());
	}

	#[test]
	fn sftp_config_requires_auth() {
		let mut cfg = SftpConfig { host: "example.com".to_string(), ..Default::default() };
		cfg.username = "alice".to_string();
		assert!(cfg.validate().is_err());
		cfg.auth = Some(SftpAuth::Password { password: "hunter2".to_string() });
		assert!(cfg.validate().is_ok());
	}

	#[test]
	fn webdav_config_rejects_malformed_url() {
		let cfg = WebDavConfig {
			base_url: "not a url".to_string(),
			auth: Some(WebDavAuth::Bearer { token: "t".to_string() }),
			..Default::default()
		};
		assert!(cfg.validate().is_err());
	}

	#[test]
	fn s3_config_requires_bucket() {
		assert!(S3Config::default().validate().is_err());
		let cfg = S3Config { bucket: "my-bucket".to_string(), ..Default::default() };
		assert!(cfg.validate().is_ok());
	}
}

// vim: ts=4
