//! Time source injected into the token manager, limiter, breaker, and retry loop.

// self
use crate::_prelude::*;

/// Boxed sleep future returned by [`Clock::sleep`].
pub type SleepFuture<'a> = Pin<Box<dyn Future<Output = ()> + 'a + Send>>;

/// Wall-clock abstraction so expiry, refill, and cooldown logic stays deterministic in tests.
pub trait Clock
where
	Self: 'static + Send + Sync + Debug,
{
	/// Returns the current UTC instant.
	fn now(&self) -> OffsetDateTime;

	/// Suspends the caller for `duration`.
	///
	/// Used for backoff delays and background rate-limit waits. Non-positive durations resolve
	/// immediately.
	fn sleep(&self, duration: Duration) -> SleepFuture<'_> {
		let std_duration = to_std(duration);

		Box::pin(tokio::time::sleep(std_duration))
	}
}

/// Production clock backed by [`OffsetDateTime::now_utc`] and `tokio::time`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;
impl Clock for SystemClock {
	fn now(&self) -> OffsetDateTime {
		OffsetDateTime::now_utc()
	}
}

/// Manually driven clock for tests.
///
/// [`Clock::sleep`] advances the clock by the requested duration and returns immediately, so
/// backoff and rate-limit waits cost no wall time.
#[derive(Clone, Debug)]
pub struct ManualClock(Arc<Mutex<OffsetDateTime>>);
impl ManualClock {
	/// Creates a clock frozen at `start`.
	pub fn new(start: OffsetDateTime) -> Self {
		Self(Arc::new(Mutex::new(start)))
	}

	/// Moves the clock forward by `delta`.
	pub fn advance(&self, delta: Duration) {
		let mut now = self.0.lock();

		*now += delta;
	}

	/// Jumps the clock to `instant`.
	pub fn set(&self, instant: OffsetDateTime) {
		*self.0.lock() = instant;
	}
}
impl Default for ManualClock {
	fn default() -> Self {
		Self::new(OffsetDateTime::now_utc())
	}
}
impl Clock for ManualClock {
	fn now(&self) -> OffsetDateTime {
		*self.0.lock()
	}

	fn sleep(&self, duration: Duration) -> SleepFuture<'_> {
		if duration.is_positive() {
			self.advance(duration);
		}

		Box::pin(async {})
	}
}

/// Converts a signed [`Duration`] to `std::time::Duration`, clamping negatives to zero.
pub(crate) fn to_std(duration: Duration) -> std::time::Duration {
	std::time::Duration::try_from(duration).unwrap_or_default()
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	#[tokio::test]
	async fn manual_clock_sleep_advances_time() {
		let clock = ManualClock::new(macros::datetime!(2025-03-01 12:00 UTC));

		clock.sleep(Duration::seconds(5)).await;
		clock.sleep(Duration::seconds(-3)).await;

		assert_eq!(clock.now(), macros::datetime!(2025-03-01 12:00:05 UTC));

		clock.set(macros::datetime!(2025-03-02 00:00 UTC));

		assert_eq!(clock.now(), macros::datetime!(2025-03-02 00:00 UTC));
	}

	#[test]
	fn negative_durations_clamp_to_zero() {
		assert_eq!(to_std(Duration::seconds(-1)), std::time::Duration::ZERO);
		assert_eq!(to_std(Duration::milliseconds(1_500)), std::time::Duration::from_millis(1_500));
	}
}
