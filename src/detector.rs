//! Change detector: walks both trees plus the shadow state and produces an
//! ordered [`SyncPlan`].

use crate::config::SyncOptions;
use crate::error::SyncError;
use crate::exclusion::{ExcludeConfig, ExclusionEngine};
use crate::state::StateStore;
use crate::storage::Storage;
use crate::types::{ActionType, ConflictType, SyncItem, SyncPlan, SyncPlanAction, SyncState};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::SystemTime;
use tokio_util::sync::CancellationToken;

/// Stateless change detector: holds no data of its own, just the algorithm
/// in §4.2.
pub struct ChangeDetector;

impl ChangeDetector {
	pub fn new() -> Self {
		ChangeDetector
	}

	/// Walks `local` and `remote`, consults `store` for the shadow state, and
	/// returns the merged, phase-ordered plan.
	pub async fn build_plan(
		&self,
		local: &dyn Storage,
		remote: &dyn Storage,
		store: &StateStore,
		options: &SyncOptions,
	) -> Result<SyncPlan, SyncError> {
		let cancel = CancellationToken::new();
		self.build_plan_cancellable(local, remote, store, options, &cancel).await
	}

	pub async fn build_plan_cancellable(
		&self,
		local: &dyn Storage,
		remote: &dyn Storage,
		store: &StateStore,
		options: &SyncOptions,
		cancel: &CancellationToken,
	) -> Result<SyncPlan, SyncError> {
		let exclusion = ExclusionEngine::new(
			&ExcludeConfig { patterns: options.exclude_patterns.clone(), ..Default::default() },
			Path::new(""),
		)?;

		let mut local_items = BTreeMap::new();
		walk(local, "", options.follow_symlinks, &exclusion, cancel, &mut local_items).await?;
		let mut remote_items = BTreeMap::new();
		walk(remote, "", options.follow_symlinks, &exclusion, cancel, &mut remote_items).await?;

		let shadow: BTreeMap<String, SyncState> =
			store.get_all()?.into_iter().map(|s| (s.path.clone(), s)).collect();

		let mut union: Vec<String> = local_items
			.keys()
			.chain(remote_items.keys())
			.chain(shadow.keys())
			.cloned()
			.collect::<std::collections::BTreeSet<_>>()
			.into_iter()
			.collect();
		union.sort();

		let mut actions = Vec::new();
		for path in &union {
			let local_item = local_items.get(path);
			let remote_item = remote_items.get(path);
			let shadow_state = shadow.get(path);
			if let Some(action) = classify_one(path, local_item, remote_item, shadow_state, options) {
				actions.push(action);
			}
		}

		assign_priorities(&mut actions);
		actions.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.path.len().cmp(&b.path.len())).then_with(|| a.path.cmp(&b.path)));

		Ok(SyncPlan { actions })
	}
}

impl Default for ChangeDetector {
	fn default() -> Self {
		Self::new()
	}
}

fn walk<'a>(
	storage: &'a dyn Storage,
	path: &'a str,
	follow_symlinks: bool,
	exclusion: &'a ExclusionEngine,
	cancel: &'a CancellationToken,
	out: &'a mut BTreeMap<String, SyncItem>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), SyncError>> + Send + 'a>> {
	Box::pin(async move {
		if cancel.is_cancelled() {
			return Err(SyncError::Cancelled);
		}
		let children = storage.list_items(path, cancel).await?;
		for item in children {
			if item.is_symlink && !follow_symlinks {
				continue;
			}
			if exclusion.should_exclude(Path::new(&item.path), None) {
				continue;
			}
			let is_directory = item.is_directory;
			let child_path = item.path.clone();
			out.insert(item.path.clone(), item);
			if is_directory {
				walk(storage, &child_path, follow_symlinks, exclusion, cancel, out).await?;
			}
		}
		Ok(())
	})
}

/// True when `current` differs from the shadow's recollection of that side,
/// per the preference order in §4.2: checksum, then size, then size-or-mtime.
fn has_changed(current: &SyncItem, shadow_hash: &Option<String>, shadow_size: Option<u64>, shadow_modified: Option<SystemTime>, options: &SyncOptions) -> bool {
	if options.checksum_only {
		if let (Some(current_hash), Some(shadow_hash)) = (&current.hash, shadow_hash) {
			return current_hash != shadow_hash;
		}
	}
	if options.size_only {
		return Some(current.size) != shadow_size;
	}
	if Some(current.size) != shadow_size {
		return true;
	}
	match shadow_modified {
		Some(shadow_modified) => {
			let diff = match current.last_modified.duration_since(shadow_modified) {
				Ok(d) => d,
				Err(e) => e.duration(),
			};
			diff.as_secs_f64() > 2.0
		}
		None => false,
	}
}

fn classify_one(
	path: &str,
	local: Option<&SyncItem>,
	remote: Option<&SyncItem>,
	shadow: Option<&SyncState>,
	options: &SyncOptions,
) -> Option<SyncPlanAction> {
	let (action_type, conflict_type, is_directory, size, last_modified) = match (local, remote, shadow) {
		(Some(l), Some(r), _) if l.is_directory != r.is_directory => {
			(ActionType::Conflict, Some(ConflictType::TypeConflict), l.is_directory, l.size, Some(l.last_modified))
		}
		(Some(l), None, Some(_)) => {
			let changed = has_changed(l, &shadow.and_then(|s| s.local_hash.clone()), shadow.and_then(|s| s.local_size), shadow.and_then(|s| s.local_modified), options);
			if changed {
				(ActionType::Upload, None, l.is_directory, l.size, Some(l.last_modified))
			} else {
				(ActionType::DeleteLocal, None, l.is_directory, l.size, Some(l.last_modified))
			}
		}
		(None, Some(r), Some(_)) => {
			let changed = has_changed(r, &shadow.and_then(|s| s.remote_hash.clone()), shadow.and_then(|s| s.remote_size), shadow.and_then(|s| s.remote_modified), options);
			if changed {
				(ActionType::Download, None, r.is_directory, r.size, Some(r.last_modified))
			} else {
				(ActionType::DeleteRemote, None, r.is_directory, r.size, Some(r.last_modified))
			}
		}
		(Some(l), None, None) => (ActionType::Upload, None, l.is_directory, l.size, Some(l.last_modified)),
		(None, Some(r), None) => (ActionType::Download, None, r.is_directory, r.size, Some(r.last_modified)),
		(Some(l), Some(r), Some(_)) => {
			let local_changed = has_changed(l, &shadow.and_then(|s| s.local_hash.clone()), shadow.and_then(|s| s.local_size), shadow.and_then(|s| s.local_modified), options);
			let remote_changed = has_changed(r, &shadow.and_then(|s| s.remote_hash.clone()), shadow.and_then(|s| s.remote_size), shadow.and_then(|s| s.remote_modified), options);
			match (local_changed, remote_changed) {
				(true, true) => (ActionType::Conflict, Some(ConflictType::BothModified), l.is_directory, l.size, Some(l.last_modified)),
				(true, false) => (ActionType::Upload, None, l.is_directory, l.size, Some(l.last_modified)),
				(false, true) => (ActionType::Download, None, r.is_directory, r.size, Some(r.last_modified)),
				(false, false) => return None,
			}
		}
		(Some(l), Some(r), None) => {
			let contents_equal = l.hash.is_some() && l.hash == r.hash;
			if contents_equal {
				return None;
			}
			(ActionType::Conflict, Some(ConflictType::BothCreated), l.is_directory, l.size, Some(l.last_modified))
		}
		(None, None, Some(_)) => return None,
		(None, None, None) => return None,
	};

	Some(SyncPlanAction { action_type, path: path.to_string(), is_directory, size, last_modified, conflict_type, priority: 0 })
}

/// Assigns the phase/ordering priority described in §4.2: creates ascending
/// by depth, deletes descending by depth, conflicts last.
fn assign_priorities(actions: &mut [SyncPlanAction]) {
	for action in actions.iter_mut() {
		let depth = action.path.matches('/').count() as i64;
		action.priority = match action.action_type {
			ActionType::Upload | ActionType::Download => depth,
			ActionType::DeleteLocal | ActionType::DeleteRemote => 1_000_000 - depth,
			ActionType::Conflict => 2_000_000,
			ActionType::Move => depth,
		};
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::storage::local::LocalStorage;
	use crate::types::SyncStatus;
	use tempfile::TempDir;

	async fn new_local(dir: &TempDir) -> LocalStorage {
		LocalStorage::new(dir.path().to_path_buf())
	}

	#[tokio::test]
	async fn new_local_file_plans_upload() {
		let local_dir = TempDir::new().unwrap();
		let remote_dir = TempDir::new().unwrap();
		std::fs::write(local_dir.path().join("a.txt"), b"hello").unwrap();

		let local = new_local(&local_dir).await;
		let remote = new_local(&remote_dir).await;
		let state_dir = TempDir::new().unwrap();
		let store = StateStore::open(state_dir.path().join("state.redb")).unwrap();

		let plan = ChangeDetector::new().build_plan(&local, &remote, &store, &SyncOptions::default()).await.unwrap();
		assert_eq!(plan.actions.len(), 1);
		assert_eq!(plan.actions[0].action_type, ActionType::Upload);
		assert_eq!(plan.actions[0].path, "a.txt");
	}

	#[tokio::test]
	async fn synced_shadow_with_no_changes_plans_nothing() {
		let local_dir = TempDir::new().unwrap();
		let remote_dir = TempDir::new().unwrap();
		std::fs::write(local_dir.path().join("a.txt"), b"hello").unwrap();
		std::fs::write(remote_dir.path().join("a.txt"), b"hello").unwrap();

		let local = new_local(&local_dir).await;
		let remote = new_local(&remote_dir).await;
		let state_dir = TempDir::new().unwrap();
		let store = StateStore::open(state_dir.path().join("state.redb")).unwrap();

		let item = local.get_item("a.txt", &CancellationToken::new()).await.unwrap().unwrap();
		let mut state = SyncState::new_synced(&item, SystemTime::now());
		state.status = SyncStatus::Synced;
		store.upsert(&state).unwrap();

		let plan = ChangeDetector::new().build_plan(&local, &remote, &store, &SyncOptions::default()).await.unwrap();
		assert!(plan.actions.is_empty());
	}

	#[tokio::test]
	async fn deleted_locally_with_shadow_plans_delete_remote() {
		let local_dir = TempDir::new().unwrap();
		let remote_dir = TempDir::new().unwrap();
		std::fs::write(remote_dir.path().join("a.txt"), b"hello").unwrap();

		let local = new_local(&local_dir).await;
		let remote = new_local(&remote_dir).await;
		let state_dir = TempDir::new().unwrap();
		let store = StateStore::open(state_dir.path().join("state.redb")).unwrap();

		let item = remote.get_item("a.txt", &CancellationToken::new()).await.unwrap().unwrap();
		store.upsert(&SyncState::new_synced(&item, SystemTime::now())).unwrap();

		let plan = ChangeDetector::new().build_plan(&local, &remote, &store, &SyncOptions::default()).await.unwrap();
		assert_eq!(plan.actions.len(), 1);
		assert_eq!(plan.actions[0].action_type, ActionType::DeleteRemote);
	}

	#[tokio::test]
	async fn both_created_with_equal_contents_plans_nothing() {
		let local_dir = TempDir::new().unwrap();
		let remote_dir = TempDir::new().unwrap();
		std::fs::write(local_dir.path().join("a.txt"), b"hello").unwrap();
		std::fs::write(remote_dir.path().join("a.txt"), b"hello").unwrap();

		let local = new_local(&local_dir).await;
		let remote = new_local(&remote_dir).await;
		let cancel = CancellationToken::new();
		let mut local_item = local.get_item("a.txt", &cancel).await.unwrap().unwrap();
		let mut remote_item = remote.get_item("a.txt", &cancel).await.unwrap().unwrap();
		local_item.hash = Some("samehash".into());
		remote_item.hash = Some("samehash".into());

		assert!(classify_one("a.txt", Some(&local_item), Some(&remote_item), None, &SyncOptions::default()).is_none());
	}

	#[test]
	fn priorities_order_creates_before_deletes_before_conflicts() {
		let mut actions = vec![
			SyncPlanAction { action_type: ActionType::Conflict, path: "c".into(), is_directory: false, size: 0, last_modified: None, conflict_type: Some(ConflictType::BothModified), priority: 0 },
			SyncPlanAction { action_type: ActionType::DeleteLocal, path: "b".into(), is_directory: false, size: 0, last_modified: None, conflict_type: None, priority: 0 },
			SyncPlanAction { action_type: ActionType::Upload, path: "a".into(), is_directory: false, size: 0, last_modified: None, conflict_type: None, priority: 0 },
		];
		assign_priorities(&mut actions);
		actions.sort_by_key(|a| a.priority);
		assert_eq!(actions[0].action_type, ActionType::Upload);
		assert_eq!(actions[1].action_type, ActionType::DeleteLocal);
		assert_eq!(actions[2].action_type, ActionType::Conflict);
	}
}

// vim: ts=4
