//! Token-bucket bandwidth throttling for transfer streams.

use std::time::{Duration, Instant};

/// Caps per-call sleeps so cancellation stays responsive even under a tight
/// bandwidth limit.
const MAX_DELAY: Duration = Duration::from_secs(5);

/// Tracks observed throughput for one transfer and computes how long to
/// sleep before the next read/write so that
/// `total_bytes_transferred / elapsed <= limit_bytes_per_second`.
pub struct Throttle {
	limit_bytes_per_second: u64,
	started_at: Instant,
	bytes_transferred: u64,
}

impl Throttle {
	pub fn new(limit_bytes_per_second: u64) -> Self {
		Throttle { limit_bytes_per_second, started_at: Instant::now(), bytes_transferred: 0 }
	}

	/// Record `bytes` just transferred and return how long to sleep before
	/// the next chunk, if any.
	pub fn record(&mut self, bytes: u64) -> Option<Duration> {
		if self.limit_bytes_per_second == 0 {
			return None;
		}
		self.bytes_transferred += bytes;
		let elapsed = self.started_at.elapsed();
		let expected_elapsed =
			Duration::from_secs_f64(self.bytes_transferred as f64 / self.limit_bytes_per_second as f64);
		if expected_elapsed > elapsed {
			let delay = expected_elapsed - elapsed;
			Some(delay.min(MAX_DELAY))
		} else {
			None
		}
	}

	/// Sleep for whatever `record` recommends, if anything. Split out from
	/// `record` so tests can assert on the computed delay without actually
	/// waiting.
	pub async fn throttle(&mut self, bytes: u64) {
		if let Some(delay) = self.record(bytes) {
			tokio::time::sleep(delay).await;
		}
	}
}


// vim: ts=4
