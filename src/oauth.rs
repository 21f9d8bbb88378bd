//! The OAuth2 provider capability consumed by the WebDAV backend.
//!
//! The authorization-code-with-PKCE flow itself (browser redirect, local
//! callback listener) is the embedding application's concern; this crate
//! only consumes a bearer token and a refresh callback.

use async_trait::async_trait;
use std::time::{Duration, SystemTime};

/// Opaque provider-specific settings needed to request/refresh a token.
#[derive(Debug, Clone)]
pub struct OAuth2Config {
	pub client_id: String,
	pub token_endpoint: String,
	pub scope: Option<String>,
}

/// The outcome of an authenticate/refresh call.
#[derive(Debug, Clone)]
pub struct OAuth2Result {
	pub access_token: String,
	pub refresh_token: Option<String>,
	pub expires_at: SystemTime,
	pub is_valid: bool,
}

impl OAuth2Result {
	pub fn will_expire_within(&self, window: Duration) -> bool {
		match self.expires_at.duration_since(SystemTime::now()) {
			Ok(remaining) => remaining <= window,
			Err(_) => true, // already expired
		}
	}
}

/// Supplies and refreshes bearer tokens for the WebDAV backend.
#[async_trait]
pub trait OAuth2Provider: Send + Sync {
	async fn authenticate(&self, config: &OAuth2Config) -> Result<OAuth2Result, crate::error::SyncError>;

	async fn refresh_token(
		&self,
		config: &OAuth2Config,
		refresh_token: &str,
	) -> Result<OAuth2Result, crate::error::SyncError>;
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn expired_token_is_within_any_window() {
		let result = OAuth2Result {
			access_token: "t".into(),
			refresh_token: None,
			expires_at: SystemTime::UNIX_EPOCH,
			is_valid: true,
		};
		assert!(result.will_expire_within(Duration::from_secs(1)));
	}

	#[test]
	fn far_future_token_is_not_expiring_soon() {
		let result = OAuth2Result {
			access_token: "t".into(),
			refresh_token: None,
			expires_at: SystemTime::now() + Duration::from_secs(3600),
			is_valid: true,
		};
		assert!(!result.will_expire_within(Duration::from_secs(60)));
	}
}

// vim: ts=4
