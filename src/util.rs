//! Utility functions
//!
//! This module contains helper functions including safe wrappers around
//! system calls that require unsafe blocks, and the content-hash primitive
//! shared by every storage backend.
#![allow(dead_code)]

use base64::engine::Engine;
use sha2::{Digest, Sha256};

/// Get the effective user ID of the current process
///
/// Returns the effective UID on Unix systems, or a default value on other platforms.
/// This function wraps the unsafe libc call in a safe interface.
#[allow(unsafe_code)] // Safe wrapper around system call
pub fn get_effective_uid() -> u32 {
	#[cfg(unix)]
	{
		// SAFETY: geteuid() is always safe to call - it just returns a value
		// from the process credentials without any side effects.
		unsafe { libc::geteuid() }
	}

	#[cfg(not(unix))]
	{
		1000 // Default non-root UID on non-Unix platforms
	}
}

/// Get the effective group ID of the current process
///
/// Returns the effective GID on Unix systems, or a default value on other platforms.
/// This function wraps the unsafe libc call in a safe interface.
#[allow(unsafe_code)] // Safe wrapper around system call
pub fn get_effective_gid() -> u32 {
	#[cfg(unix)]
	{
		// SAFETY: getegid() is always safe to call - it just returns a value
		// from the process credentials without any side effects.
		unsafe { libc::getegid() }
	}

	#[cfg(not(unix))]
	{
		1000 // Default GID on non-Unix platforms
	}
}

/// Hash a buffer using SHA-256 and return base64-encoded result.
///
/// This is the content-hash contract every storage backend is held to:
/// two paths with identical content must return equal strings.
pub fn hash(buf: &[u8]) -> String {
	hash_to_base64(&hash_binary(buf))
}

/// Hash a buffer using SHA-256 and return the raw 32-byte digest.
pub fn hash_binary(buf: &[u8]) -> [u8; 32] {
	let mut hasher = Sha256::new();
	hasher.update(buf);
	hasher.finalize().into()
}

/// Convert a binary hash to a base64 string (for state-store / wire use).
pub fn hash_to_base64(hash: &[u8; 32]) -> String {
	base64::engine::general_purpose::STANDARD.encode(hash)
}

/// Convert a base64 string back to a binary hash.
pub fn base64_to_hash(b64: &str) -> Result<[u8; 32], Box<dyn std::error::Error>> {
	let bytes = base64::engine::general_purpose::STANDARD.decode(b64)?;
	if bytes.len() != 32 {
		return Err(format!("Hash must be 32 bytes, got {}", bytes.len()).into());
	}
	let mut hash = [0u8; 32];
	hash.copy_from_slice(&bytes);
	Ok(hash)
}

/// Decode a hex digest of the form "algo:hex" as reported by a WebDAV
/// `checksum` property, returning the hex part unchanged.
pub fn parse_checksum_property(raw: &str) -> Option<&str> {
	raw.split_once(':').map(|(_, hex)| hex)
}

/// Parses a Unix permission mode given as either octal (`"755"`, `"0755"`)
/// or symbolic (`"rwxr-xr-x"`, or `"drwxr-xr-x"` with a leading file-type
/// character, as `ls -l`/FTP `LIST` lines report it) text, returning the
/// mode's low 9 permission bits. Any other shape is rejected.
pub fn parse_mode_string(mode: &str) -> Option<u32> {
	let mode = mode.trim();
	if !mode.is_empty() && mode.bytes().all(|b| b.is_ascii_digit()) {
		return u32::from_str_radix(mode, 8).ok().map(|m| m & 0o777);
	}
	let bits = match mode.len() {
		9 => mode,
		10 => &mode[1..],
		_ => return None,
	};
	if !bits.chars().all(|ch| "-rwxstST".contains(ch)) {
		return None;
	}
	let mut parsed = 0u32;
	for (index, ch) in bits.chars().enumerate() {
		if ch != '-' {
			parsed |= 1 << (8 - index);
		}
	}
	Some(parsed)
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn test_hash_simple() {
		let src: [u8; 2] = [b'1', b'2'];
		let res = hash(&src);
		// SHA-256 base64 (standard, padded) is 44 characters
		assert_eq!(res.len(), 44);
		let res2 = hash(&src);
		assert_eq!(res, res2);
	}

	#[test]
	fn test_hash_empty() {
		let src: [u8; 0] = [];
		let res = hash(&src);
		assert_eq!(res.len(), 44);
		let res2 = hash(&src);
		assert_eq!(res, res2);
	}

	#[test]
	fn test_hash_known_vector() {
		// SHA-256("") = e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855
		let res = hash_binary(b"");
		assert_eq!(
			hex::encode(res),
			"e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b85"
		);
	}

	#[test]
	fn test_hash_consistency() {
		let src = b"test data";
		let res1 = hash(src);
		let res2 = hash(src);
		assert_eq!(res1, res2, "Hash should be deterministic");
	}

	#[test]
	fn test_hash_different_inputs() {
		let src1 = b"test1";
		let src2 = b"test2";
		let res1 = hash(src1);
		let res2 = hash(src2);
		assert_ne!(res1, res2, "Different inputs should produce different hashes");
	}

	#[test]
	fn test_base64_roundtrip() {
		let src = b"roundtrip me";
		let bin = hash_binary(src);
		let b64 = hash_to_base64(&bin);
		let decoded = base64_to_hash(&b64).unwrap();
		assert_eq!(bin, decoded);
	}

	#[test]
	fn test_parse_checksum_property() {
		assert_eq!(parse_checksum_property("SHA256:deadbeef"), Some("deadbeef"));
		assert_eq!(parse_checksum_property("noalgo"), None);
	}

	#[test]
	fn parse_mode_string_accepts_octal_symbolic_and_typed_symbolic() {
		assert_eq!(parse_mode_string("755"), Some(0o755));
		assert_eq!(parse_mode_string("0755"), Some(0o755));
		assert_eq!(parse_mode_string("rwxr-xr-x"), Some(0o755));
		assert_eq!(parse_mode_string("drwxr-xr-x"), Some(0o755));
	}

	#[test]
	fn parse_mode_string_rejects_garbage() {
		assert_eq!(parse_mode_string("not-a-mode"), None);
		assert_eq!(parse_mode_string(""), None);
	}
}
