//! Exponential retry backoff with optional jitter.

// crates.io
use rand::Rng;
// self
use crate::{_prelude::*, config::RetryConfig};

/// Delay schedule for retries: `base * 2^(retry - 1)`, capped at `max`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Backoff {
	base_ms: u64,
	max_ms: u64,
	jitter: bool,
}
impl Backoff {
	/// Builds the schedule from a retry policy.
	pub fn from_config(config: &RetryConfig) -> Self {
		Self { base_ms: config.base_delay_ms, max_ms: config.max_delay_ms, jitter: config.jitter }
	}

	/// Upper bound of the delay before retry number `retry` (1-based).
	pub fn ceiling(&self, retry: u32) -> Duration {
		let factor = 2_u64.saturating_pow(retry.saturating_sub(1));

		millis(self.base_ms.saturating_mul(factor).min(self.max_ms))
	}

	/// Delay before retry number `retry`; jittered into `[ceiling / 2, ceiling]` when enabled.
	pub fn delay(&self, retry: u32) -> Duration {
		let ceiling = self.ceiling(retry);

		if !self.jitter {
			return ceiling;
		}

		let ceiling_ms = u64::try_from(ceiling.whole_milliseconds()).unwrap_or(self.max_ms);

		millis(rand::rng().random_range(ceiling_ms / 2..=ceiling_ms))
	}

	/// Largest delay the schedule will ever produce.
	pub fn max_delay(&self) -> Duration {
		millis(self.max_ms)
	}
}

fn millis(value: u64) -> Duration {
	Duration::milliseconds(i64::try_from(value).unwrap_or(i64::MAX))
}
