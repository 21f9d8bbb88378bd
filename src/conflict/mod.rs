//! Conflict classification and resolution.
//!
//! Classification (this module's [`classify`]) turns a path where both
//! sides changed into a [`ConflictAnalysis`]; resolution (the
//! [`ConflictResolver`] capability in [`resolver`]) turns that analysis into
//! a caller-chosen [`ConflictResolution`].

pub mod resolver;

pub use resolver::{ConflictResolver, DefaultConflictResolver};

use crate::types::{ConflictAnalysis, ConflictResolution, ConflictType, Side, SyncItem};

const TEXT_EXTENSIONS: &[&str] = &[
	"txt", "md", "markdown", "json", "xml", "html", "htm", "css", "js", "ts", "jsx", "tsx", "rs",
	"py", "go", "java", "c", "h", "cpp", "hpp", "toml", "yaml", "yml", "csv", "log", "sh",
];

const BINARY_EXTENSIONS: &[&str] = &[
	"png", "jpg", "jpeg", "gif", "bmp", "webp", "ico", "pdf", "zip", "tar", "gz", "xz", "7z", "mp3",
	"mp4", "mov", "avi", "mkv", "exe", "dll", "so", "bin", "iso", "sqlite", "db",
];

fn extension_of(path: &str) -> Option<&str> {
	path.rsplit('.').next().filter(|ext| *ext != path)
}

/// Classify a conflicted path given both sides' current metadata.
///
/// `local`/`remote` are `None` exactly when that side has no entry (the
/// deleted-vs-modified conflict types).
pub fn classify(
	file_path: &str,
	local: Option<SyncItem>,
	remote: Option<SyncItem>,
) -> ConflictAnalysis {
	let conflict_type = match (&local, &remote) {
		(Some(l), Some(r)) if l.is_directory != r.is_directory => ConflictType::TypeConflict,
		(Some(_), None) => ConflictType::ModifiedLocallyDeletedRemotely,
		(None, Some(_)) => ConflictType::DeletedLocallyModifiedRemotely,
		(Some(l), Some(r)) if l.hash.is_some() && l.hash == r.hash => ConflictType::BothCreated,
		_ => ConflictType::BothModified,
	};

	let size_difference = match (&local, &remote) {
		(Some(l), Some(r)) => l.size.abs_diff(r.size),
		_ => 0,
	};

	let time_difference_secs = match (&local, &remote) {
		(Some(l), Some(r)) => {
			let diff = match l.last_modified.duration_since(r.last_modified) {
				Ok(d) => d.as_secs() as i64,
				Err(e) => -(e.duration().as_secs() as i64),
			};
			diff
		}
		_ => 0,
	};

	let newer_version = if time_difference_secs > 2 {
		Some(Side::Local)
	} else if time_difference_secs < -2 {
		Some(Side::Remote)
	} else {
		None
	};

	let extension = extension_of(file_path).map(|e| e.to_ascii_lowercase());
	let is_likely_text_file =
		extension.as_deref().map(|e| TEXT_EXTENSIONS.contains(&e)).unwrap_or(false);
	let is_likely_binary =
		extension.as_deref().map(|e| BINARY_EXTENSIONS.contains(&e)).unwrap_or(false);

	let recommended_resolution = match conflict_type {
		ConflictType::DeletedLocallyModifiedRemotely => ConflictResolution::UseRemote,
		ConflictType::ModifiedLocallyDeletedRemotely => ConflictResolution::UseLocal,
		_ => match newer_version {
			Some(Side::Local) => ConflictResolution::UseLocal,
			Some(Side::Remote) => ConflictResolution::UseRemote,
			None => ConflictResolution::Ask,
		},
	};

	ConflictAnalysis {
		file_path: file_path.to_string(),
		conflict_type,
		local,
		remote,
		size_difference,
		time_difference_secs,
		newer_version,
		is_likely_binary,
		is_likely_text_file,
		recommended_resolution,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::time::Duration;

	fn item(path: &str, size: u64, modified: SystemTime, hash: Option<&str>) -> SyncItem {
		let mut i = SyncItem::file(path, size, modified);
		i.hash = hash.map(|h| h.to_string());
		i
	}

	fn epoch(secs: u64) -> SystemTime {
		SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
	}

	#[test]
	fn both_modified_local_newer() {
		let local = item("doc.txt", 20, epoch(110), Some("H1"));
		let remote = item("doc.txt", 10, epoch(100), Some("H0"));
		let analysis = classify("doc.txt", Some(local), Some(remote));
		assert_eq!(analysis.conflict_type, ConflictType::BothModified);
		assert_eq!(analysis.newer_version, Some(Side::Local));
		assert_eq!(analysis.recommended_resolution, ConflictResolution::UseLocal);
		assert!(analysis.is_likely_text_file);
	}

	#[test]
	fn deleted_locally_modified_remotely_recommends_remote() {
		let remote = item("doc.txt", 10, epoch(100), Some("H1"));
		let analysis = classify("doc.txt", None, Some(remote));
		assert_eq!(analysis.conflict_type, ConflictType::DeletedLocallyModifiedRemotely);
		assert_eq!(analysis.recommended_resolution, ConflictResolution::UseRemote);
	}

	#[test]
	fn type_conflict_file_vs_directory() {
		let local = item("data", 10, epoch(100), Some("H"));
		let remote = SyncItem::directory("data", epoch(100));
		let analysis = classify("data", Some(local), Some(remote));
		assert_eq!(analysis.conflict_type, ConflictType::TypeConflict);
	}

	#[test]
	fn ambiguous_time_recommends_ask() {
		let local = item("doc.txt", 20, epoch(101), Some("H1"));
		let remote = item("doc.txt", 10, epoch(100), Some("H0"));
		let analysis = classify("doc.txt", Some(local), Some(remote));
		assert_eq!(analysis.newer_version, None);
		assert_eq!(analysis.recommended_resolution, ConflictResolution::Ask);
	}

	#[test]
	fn binary_extension_detected() {
		let local = item("photo.png", 20, epoch(110), Some("H1"));
		let remote = item("photo.png", 10, epoch(100), Some("H0"));
		let analysis = classify("photo.png", Some(local), Some(remote));
		assert!(analysis.is_likely_binary);
		assert!(!analysis.is_likely_text_file);
	}
}

// vim: ts=4
