//! # syncore - bidirectional file synchronization core
//!
//! `syncore` reconciles a local filesystem tree with a remote store reachable
//! over WebDAV (Nextcloud/OCIS), SFTP, FTP/FTPS, an S3-compatible object
//! store, or a second local filesystem. It is a library: callers supply
//! configuration, a conflict resolver, and (optionally) an OAuth2 token
//! provider, and drive the [`engine::SyncEngine`] through its public
//! operations.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use syncore::config::SyncOptions;
//! use syncore::engine::SyncEngine;
//! use syncore::storage::local::LocalStorage;
//! use syncore::state::StateStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let local = LocalStorage::new("./a");
//!     let remote = LocalStorage::new("./b");
//!     let state = StateStore::open("./sync-state.redb")?;
//!     let engine = SyncEngine::new(Box::new(local), Box::new(remote), state);
//!     let result = engine.synchronize(SyncOptions::default()).await?;
//!     println!("synced {} files", result.files_synchronized);
//!     Ok(())
//! }
//! ```

#![deny(unsafe_code)]
#![warn(dead_code)]

pub mod chunk_tracker;
pub mod conflict;
pub mod config;
pub mod detector;
pub mod engine;
pub mod error;
pub mod exclusion;
pub mod logging;
pub mod oauth;
pub mod path;
pub mod poller;
pub mod progress;
pub mod state;
pub mod storage;
pub mod throttle;
pub mod types;
pub mod util;
pub mod validation;

pub use chunk_tracker::{ChunkTracker, ChunkTrackerError, TransferStatus};
pub use conflict::ConflictResolver;
pub use detector::ChangeDetector;
pub use engine::SyncEngine;
pub use error::{ChunkError, ConnectionError, StateError, SyncError};
pub use exclusion::{ExclusionEngine, ExclusionError};
pub use path::PathCodec;
pub use progress::{ProgressEvent, ProgressHub};
pub use state::StateStore;
pub use storage::Storage;
pub use types::{
	ConflictAnalysis, ConflictResolution, ConflictType, ServerCapabilities, SyncItem, SyncPlan,
	SyncPlanAction, SyncResult, SyncState,
};

// vim: ts=4
