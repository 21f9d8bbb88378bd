//! End-to-end scenarios against two local-filesystem `Storage` backends
//! standing in for "local" and "remote" — the simplest pair the engine
//! supports, and the one that needs no network fixture to drive.

use std::fs;
use std::time::Duration;

use syncore::config::SyncOptions;
use syncore::conflict::resolver::FixedConflictResolver;
use syncore::engine::SyncEngine;
use syncore::state::StateStore;
use syncore::storage::local::LocalStorage;
use syncore::types::ConflictResolution;
use tempfile::TempDir;

struct Harness {
	local_dir: TempDir,
	remote_dir: TempDir,
	state_dir: TempDir,
}

impl Harness {
	fn new() -> Self {
		Harness { local_dir: TempDir::new().unwrap(), remote_dir: TempDir::new().unwrap(), state_dir: TempDir::new().unwrap() }
	}

	fn engine(&self) -> SyncEngine {
		let local = Box::new(LocalStorage::new(self.local_dir.path().to_path_buf()));
		let remote = Box::new(LocalStorage::new(self.remote_dir.path().to_path_buf()));
		let store = StateStore::open(self.state_dir.path().join("state.redb")).unwrap();
		SyncEngine::new(local, remote, store)
	}

	fn local(&self, rel: &str) -> std::path::PathBuf {
		self.local_dir.path().join(rel)
	}

	fn remote(&self, rel: &str) -> std::path::PathBuf {
		self.remote_dir.path().join(rel)
	}
}

#[tokio::test]
async fn two_sided_create_propagates_new_files_in_both_directions() {
	let harness = Harness::new();
	fs::create_dir_all(harness.local("docs")).unwrap();
	fs::write(harness.local("docs/new-local.txt"), b"written on the local side").unwrap();
	fs::write(harness.remote("new-remote.txt"), b"written on the remote side").unwrap();

	let result = harness.engine().synchronize(SyncOptions::default()).await.unwrap();

	assert!(result.errors.is_empty(), "unexpected errors: {:?}", result.errors);
	assert!(harness.remote("docs/new-local.txt").exists());
	assert!(harness.local("new-remote.txt").exists());
	assert_eq!(fs::read(harness.remote("docs/new-local.txt")).unwrap(), b"written on the local side");
	assert_eq!(fs::read(harness.local("new-remote.txt")).unwrap(), b"written on the remote side");
}

#[tokio::test]
async fn pure_local_modification_overwrites_the_remote_copy() {
	let harness = Harness::new();
	fs::write(harness.local("shared.txt"), b"version one").unwrap();

	let engine = harness.engine();
	engine.synchronize(SyncOptions::default()).await.unwrap();
	assert_eq!(fs::read(harness.remote("shared.txt")).unwrap(), b"version one");

	// Only the local copy changes after the first sync; nothing touches the
	// remote copy or its shadow state, so the detector should see this as a
	// one-sided modification, not a conflict.
	tokio::time::sleep(Duration::from_millis(20)).await;
	fs::write(harness.local("shared.txt"), b"version two, edited locally").unwrap();

	let second = engine.synchronize(SyncOptions::default()).await.unwrap();
	assert!(second.errors.is_empty(), "unexpected errors: {:?}", second.errors);
	assert_eq!(second.conflicts_resolved, 0);
	assert_eq!(fs::read(harness.remote("shared.txt")).unwrap(), b"version two, edited locally");
}

#[tokio::test]
async fn both_sides_modified_conflict_resolves_to_the_newer_side() {
	let harness = Harness::new();
	fs::write(harness.local("doc.txt"), b"original").unwrap();

	let engine = harness.engine();
	engine.synchronize(SyncOptions::default()).await.unwrap();

	// Edit the remote copy first, then the local copy after a pause long
	// enough to clear the classifier's 2-second "ambiguous" window, so the
	// conflict has an unambiguous newer side.
	fs::write(harness.remote("doc.txt"), b"edited remotely").unwrap();
	tokio::time::sleep(Duration::from_secs(3)).await;
	fs::write(harness.local("doc.txt"), b"edited locally, and more recently").unwrap();

	let result = engine.synchronize(SyncOptions::default()).await.unwrap();
	assert!(result.errors.is_empty(), "unexpected errors: {:?}", result.errors);
	assert_eq!(result.conflicts_resolved, 1);
	assert_eq!(fs::read(harness.remote("doc.txt")).unwrap(), b"edited locally, and more recently");
	assert_eq!(fs::read(harness.local("doc.txt")).unwrap(), b"edited locally, and more recently");
}

#[tokio::test]
async fn conflict_override_forces_remote_to_win_regardless_of_recency() {
	let harness = Harness::new();
	fs::write(harness.local("doc.txt"), b"original").unwrap();

	let local = Box::new(LocalStorage::new(harness.local_dir.path().to_path_buf()));
	let remote = Box::new(LocalStorage::new(harness.remote_dir.path().to_path_buf()));
	let store = StateStore::open(harness.state_dir.path().join("state.redb")).unwrap();
	let engine = SyncEngine::new(local, remote, store).with_resolver(Box::new(FixedConflictResolver(ConflictResolution::UseRemote)));

	engine.synchronize(SyncOptions::default()).await.unwrap();

	fs::write(harness.local("doc.txt"), b"edited locally, much more recently").unwrap();
	fs::write(harness.remote("doc.txt"), b"edited remotely").unwrap();

	let mut options = SyncOptions::default();
	options.conflict_resolution_override = Some(ConflictResolution::UseRemote);
	let result = engine.synchronize(options).await.unwrap();

	assert_eq!(result.conflicts_resolved, 1);
	assert_eq!(fs::read(harness.local("doc.txt")).unwrap(), b"edited remotely");
}

#[tokio::test]
async fn deleting_a_directory_tree_locally_removes_it_from_the_remote_side_only_after_its_children() {
	let harness = Harness::new();
	fs::create_dir_all(harness.local("project/sub")).unwrap();
	fs::write(harness.local("project/top.txt"), b"top").unwrap();
	fs::write(harness.local("project/sub/nested.txt"), b"nested").unwrap();

	let engine = harness.engine();
	let first = engine.synchronize(SyncOptions::default()).await.unwrap();
	assert!(first.errors.is_empty());
	assert!(harness.remote("project/sub/nested.txt").exists());

	fs::remove_dir_all(harness.local("project")).unwrap();
	let second = engine.synchronize(SyncOptions::default()).await.unwrap();

	assert!(second.errors.is_empty(), "unexpected errors: {:?}", second.errors);
	assert!(!harness.remote("project").exists());
}

#[tokio::test]
async fn excluded_patterns_are_never_transferred() {
	let harness = Harness::new();
	fs::write(harness.local("keep.txt"), b"keep me").unwrap();
	fs::write(harness.local("ignore.tmp"), b"drop me").unwrap();

	let mut options = SyncOptions::default();
	options.exclude_patterns = vec!["*.tmp".to_string()];

	let result = harness.engine().synchronize(options).await.unwrap();
	assert!(result.errors.is_empty());
	assert!(harness.remote("keep.txt").exists());
	assert!(!harness.remote("ignore.tmp").exists());
}

#[tokio::test]
async fn preview_reports_planned_work_without_touching_either_side() {
	let harness = Harness::new();
	fs::write(harness.local("only-local.txt"), b"data").unwrap();

	let engine = harness.engine();
	let plan = engine.preview(&SyncOptions::default()).await.unwrap();

	assert_eq!(plan.actions.len(), 1);
	assert!(!harness.remote("only-local.txt").exists(), "preview must not execute the plan");

	let recent = engine.get_recent_operations(10, None).unwrap();
	assert!(recent.is_empty(), "preview must not write to the operation log");
}

#[tokio::test]
async fn cancelling_before_synchronize_stops_the_run_with_no_files_moved() {
	let harness = Harness::new();
	fs::write(harness.local("a.txt"), b"a").unwrap();
	fs::write(harness.local("b.txt"), b"b").unwrap();

	let engine = harness.engine();
	engine.cancel();
	let result = engine.synchronize(SyncOptions::default()).await.unwrap();

	assert_eq!(result.files_synchronized, 0);
	assert!(!result.errors.is_empty());
	assert!(!harness.remote("a.txt").exists());
}
