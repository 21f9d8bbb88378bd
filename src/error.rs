//! Error types for sync operations

use std::error::Error;
use std::fmt;
use std::io;

use crate::chunk_tracker::ChunkTrackerError;
use crate::exclusion::ExclusionError;
use crate::validation::ValidationError;

/// Helper function to reduce `Box::new()` boilerplate when wrapping errors
/// into `Box<dyn Error + Send + Sync>` for error variant fields.
#[inline]
pub fn boxed_error<E: Error + Send + Sync + 'static>(e: E) -> Box<dyn Error + Send + Sync> {
	Box::new(e)
}

/// Unified error type for sync operations.
///
/// Every storage backend and the engine itself map their failures into this
/// taxonomy at the boundary, so callers can match on error *kind* rather than
/// on a specific backend's exception type.
#[derive(Debug)]
pub enum SyncError {
	/// Failed to connect to a location
	ConnectionFailed { location: String, source: Box<dyn Error + Send + Sync> },

	/// Permission denied on a path
	PermissionDenied { path: String },

	/// Path does not exist
	NotFound { path: String },

	/// Path names a directory where a file was expected, or vice versa
	IsADirectory { path: String },

	/// Resolved path escaped the configured root
	PathEscape { path: String },

	/// Bearer token expired and refresh failed or was not configured
	AuthExpired { location: String },

	/// Sync state is corrupted
	StateCorrupted { message: String },

	/// Hash verification failed
	HashMismatch { expected: String, actual: String },

	/// I/O error
	Io(io::Error),

	/// Invalid configuration, raised at construction time
	InvalidConfig { message: String },

	/// Lock acquisition failed
	LockFailed { message: String },

	/// Operation cancelled via a cancellation token
	Cancelled,

	/// Connection error (nested)
	Connection(ConnectionError),

	/// Chunk/transfer tracking error (nested)
	Chunk(ChunkError),

	/// State-store error (nested)
	State(StateError),

	/// Conflict resolution error (nested)
	Conflict(ConflictError),

	/// Exclusion/filter error (nested)
	Exclusion(Box<dyn Error + Send + Sync>),

	/// Generic error message
	Other { message: String },
}

impl fmt::Display for SyncError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SyncError::ConnectionFailed { location, source } => {
				write!(f, "failed to connect to {}: {}", location, source)
			}
			SyncError::PermissionDenied { path } => write!(f, "permission denied: {}", path),
			SyncError::NotFound { path } => write!(f, "not found: {}", path),
			SyncError::IsADirectory { path } => write!(f, "is a directory: {}", path),
			SyncError::PathEscape { path } => {
				write!(f, "path escapes configured root: {}", path)
			}
			SyncError::AuthExpired { location } => {
				write!(f, "authentication expired for {}", location)
			}
			SyncError::StateCorrupted { message } => write!(f, "sync state corrupted: {}", message),
			SyncError::HashMismatch { expected, actual } => {
				write!(f, "hash mismatch: expected {}, got {}", expected, actual)
			}
			SyncError::Io(e) => write!(f, "I/O error: {}", e),
			SyncError::InvalidConfig { message } => write!(f, "invalid configuration: {}", message),
			SyncError::LockFailed { message } => write!(f, "lock acquisition failed: {}", message),
			SyncError::Cancelled => write!(f, "operation cancelled"),
			SyncError::Connection(e) => write!(f, "connection error: {}", e),
			SyncError::Chunk(e) => write!(f, "chunk error: {}", e),
			SyncError::State(e) => write!(f, "state error: {}", e),
			SyncError::Conflict(e) => write!(f, "conflict error: {}", e),
			SyncError::Exclusion(e) => write!(f, "exclusion error: {}", e),
			SyncError::Other { message } => write!(f, "{}", message),
		}
	}
}

impl Error for SyncError {}

impl From<io::Error> for SyncError {
	fn from(e: io::Error) -> Self {
		match e.kind() {
			io::ErrorKind::NotFound => SyncError::NotFound { path: e.to_string() },
			io::ErrorKind::PermissionDenied => SyncError::PermissionDenied { path: e.to_string() },
			_ => SyncError::Io(e),
		}
	}
}

impl From<Box<dyn Error>> for SyncError {
	fn from(e: Box<dyn Error>) -> Self {
		SyncError::Other { message: e.to_string() }
	}
}

impl From<Box<dyn Error + Send + Sync>> for SyncError {
	fn from(e: Box<dyn Error + Send + Sync>) -> Self {
		SyncError::Other { message: e.to_string() }
	}
}

impl From<String> for SyncError {
	fn from(e: String) -> Self {
		SyncError::Other { message: e }
	}
}

impl From<ConnectionError> for SyncError {
	fn from(e: ConnectionError) -> Self {
		SyncError::Connection(e)
	}
}

impl From<ChunkError> for SyncError {
	fn from(e: ChunkError) -> Self {
		SyncError::Chunk(e)
	}
}

impl From<StateError> for SyncError {
	fn from(e: StateError) -> Self {
		SyncError::State(e)
	}
}

impl From<ConflictError> for SyncError {
	fn from(e: ConflictError) -> Self {
		SyncError::Conflict(e)
	}
}

impl From<ExclusionError> for SyncError {
	fn from(e: ExclusionError) -> Self {
		SyncError::Exclusion(boxed_error(e))
	}
}

impl From<ValidationError> for SyncError {
	fn from(e: ValidationError) -> Self {
		SyncError::InvalidConfig { message: e.to_string() }
	}
}

impl From<ChunkTrackerError> for SyncError {
	fn from(e: ChunkTrackerError) -> Self {
		SyncError::Chunk(ChunkError::TrackingFailed { message: e.to_string() })
	}
}

/// Connection-specific errors raised by storage backends
#[derive(Debug)]
pub enum ConnectionError {
	/// SSH/SFTP session setup failed
	SshFailed { host: String, source: Box<dyn Error + Send + Sync> },

	/// TLS/FTPS handshake failed
	TlsFailed { host: String, message: String },

	/// HTTP transport error talking to a WebDAV or S3 endpoint.
	///
	/// `status` is `None` for transport-level failures (connect/send errors
	/// that never got a response) and `Some` for an HTTP response whose
	/// status line signalled failure.
	HttpFailed { url: String, status: Option<u16>, message: String },

	/// Connection disconnected unexpectedly mid-operation
	Disconnected,

	/// Operation timed out
	Timeout,
}

impl fmt::Display for ConnectionError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ConnectionError::SshFailed { host, source } => {
				write!(f, "failed to connect via SSH to {}: {}", host, source)
			}
			ConnectionError::TlsFailed { host, message } => {
				write!(f, "TLS handshake with {} failed: {}", host, message)
			}
			ConnectionError::HttpFailed { url, status, message } => match status {
				Some(status) => write!(f, "HTTP request to {} failed ({}): {}", url, status, message),
				None => write!(f, "HTTP request to {} failed: {}", url, message),
			},
			ConnectionError::Disconnected => write!(f, "connection disconnected unexpectedly"),
			ConnectionError::Timeout => write!(f, "connection timeout"),
		}
	}
}

impl Error for ConnectionError {}

/// Chunked/resumable transfer errors (Nextcloud chunking-v2, TUS, chunk tracker)
#[derive(Debug)]
pub enum ChunkError {
	/// Failed to read chunk data from the source stream
	ReadFailed { source: io::Error },

	/// Invalid chunk configuration
	InvalidConfig { message: String },

	/// Chunk hash verification failed
	HashFailed { message: String },

	/// Chunk size out of the backend's bounds
	SizeOutOfBounds { size: usize, max: usize },

	/// Server rejected or could not report a resumable-upload offset
	OffsetUnavailable { upload_url: String },

	/// Internal chunk-tracker bookkeeping failure
	TrackingFailed { message: String },
}

impl fmt::Display for ChunkError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ChunkError::ReadFailed { source } => write!(f, "failed to read chunk: {}", source),
			ChunkError::InvalidConfig { message } => {
				write!(f, "invalid chunk configuration: {}", message)
			}
			ChunkError::HashFailed { message } => {
				write!(f, "failed to verify chunk hash: {}", message)
			}
			ChunkError::SizeOutOfBounds { size, max } => {
				write!(f, "chunk size {} exceeds maximum allowed size {}", size, max)
			}
			ChunkError::OffsetUnavailable { upload_url } => {
				write!(f, "could not determine resume offset for {}", upload_url)
			}
			ChunkError::TrackingFailed { message } => write!(f, "chunk tracking failed: {}", message),
		}
	}
}

impl Error for ChunkError {}

impl From<io::Error> for ChunkError {
	fn from(e: io::Error) -> Self {
		ChunkError::ReadFailed { source: e }
	}
}

/// State-store errors
#[derive(Debug)]
pub enum StateError {
	/// Failed to open or read the state store
	LoadFailed { source: Box<dyn Error + Send + Sync> },

	/// Failed to write to the state store
	SaveFailed { source: Box<dyn Error + Send + Sync> },

	/// Lock acquisition failed
	LockFailed { message: String },

	/// State store schema or contents are corrupted
	Corrupted { message: String },

	/// Invalid directory for the state store file
	InvalidDirectory { path: String },
}

impl fmt::Display for StateError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			StateError::LoadFailed { source } => write!(f, "failed to load state: {}", source),
			StateError::SaveFailed { source } => write!(f, "failed to save state: {}", source),
			StateError::LockFailed { message } => write!(f, "lock failed: {}", message),
			StateError::Corrupted { message } => write!(f, "state corrupted: {}", message),
			StateError::InvalidDirectory { path } => write!(f, "invalid state directory: {}", path),
		}
	}
}

impl Error for StateError {}

/// Conflict resolution errors
#[derive(Debug)]
pub enum ConflictError {
	/// Resolver returned a choice that makes no sense for this conflict type
	InvalidChoice { message: String },

	/// User/caller cancelled the resolution
	Cancelled,

	/// Conflict resolution strategy failed
	StrategyFailed { message: String },

	/// Conflict is unresolvable automatically
	Unresolvable { message: String },
}

impl fmt::Display for ConflictError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ConflictError::InvalidChoice { message } => write!(f, "invalid resolution: {}", message),
			ConflictError::Cancelled => write!(f, "conflict resolution cancelled"),
			ConflictError::StrategyFailed { message } => {
				write!(f, "failed to resolve conflict: {}", message)
			}
			ConflictError::Unresolvable { message } => write!(f, "cannot resolve conflict: {}", message),
		}
	}
}

impl Error for ConflictError {}

/// Convenience conversion from `Box<dyn Error>` at call sites that can't
/// name a concrete source error type.
pub fn box_error_to_sync_error(e: Box<dyn Error>) -> SyncError {
	SyncError::Other { message: e.to_string() }
}

// vim: ts=4
