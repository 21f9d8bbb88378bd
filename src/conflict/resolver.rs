//! The `ConflictResolver` capability consumed by the sync engine.

use crate::types::{ConflictAnalysis, ConflictResolution};
use async_trait::async_trait;

/// Resolves a classified conflict into a caller's chosen action.
///
/// Implementations may prompt a human (returning after the user answers),
/// apply a fixed policy, or defer entirely to [`ConflictAnalysis::recommended_resolution`].
/// The engine treats `ConflictResolution::Ask` as "block until this call
/// returns" - it is this trait's job to do the blocking, not the engine's.
#[async_trait]
pub trait ConflictResolver: Send + Sync {
	async fn resolve(&self, analysis: &ConflictAnalysis) -> ConflictResolution;
}

/// A resolver that always takes the classifier's recommendation, never
/// asking. Useful for unattended syncs and as the engine's fallback when no
/// resolver is supplied.
pub struct DefaultConflictResolver;

#[async_trait]
impl ConflictResolver for DefaultConflictResolver {
	async fn resolve(&self, analysis: &ConflictAnalysis) -> ConflictResolution {
		analysis.recommended_resolution
	}
}

/// A resolver that always resolves to a fixed choice, ignoring the
/// classifier's recommendation. Useful for tests and for a
/// `--conflict-resolution` override at the CLI layer.
pub struct FixedConflictResolver(pub ConflictResolution);

#[async_trait]
impl ConflictResolver for FixedConflictResolver {
	async fn resolve(&self, _analysis: &ConflictAnalysis) -> ConflictResolution {
		self.0
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::conflict::classify;

	#[tokio::test]
	async fn default_resolver_follows_recommendation() {
		let analysis = classify("a.txt", None, Some(crate::types::SyncItem::file("a.txt", 1, std::time::SystemTime::now())));
		let resolver = DefaultConflictResolver;
		let resolution = resolver.resolve(&analysis).await;
		assert_eq!(resolution, analysis.recommended_resolution);
	}

	#[tokio::test]
	async fn fixed_resolver_ignores_recommendation() {
		let analysis = classify("a.txt", None, Some(crate::types::SyncItem::file("a.txt", 1, std::time::SystemTime::now())));
		let resolver = FixedConflictResolver(ConflictResolution::Skip);
		assert_eq!(resolver.resolve(&analysis).await, ConflictResolution::Skip);
	}
}

// vim: ts=4
