// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for refresh-token exchanges.
#[derive(Debug, Default)]
pub struct RefreshMetrics {
	attempts: AtomicU64,
	success: AtomicU64,
	failure: AtomicU64,
	revoked: AtomicU64,
}
impl RefreshMetrics {
	/// Refresh exchanges sent to a token endpoint.
	pub fn attempts(&self) -> u64 {
		self.attempts.load(Ordering::Relaxed)
	}

	/// Exchanges that produced a new access token.
	pub fn successes(&self) -> u64 {
		self.success.load(Ordering::Relaxed)
	}

	/// Exchanges that failed, including revocations.
	pub fn failures(&self) -> u64 {
		self.failure.load(Ordering::Relaxed)
	}

	/// Exchanges that found the refresh token revoked.
	pub fn revocations(&self) -> u64 {
		self.revoked.load(Ordering::Relaxed)
	}

	pub(crate) fn record_attempt(&self) {
		self.attempts.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_success(&self) {
		self.success.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_failure(&self) {
		self.failure.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_revoked(&self) {
		self.revoked.fetch_add(1, Ordering::Relaxed);
		self.record_failure();
	}
}
