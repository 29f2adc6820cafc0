// self
use crate::{_prelude::*, auth::Platform, request::OperationKind, resilience::CircuitState};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedCall<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedCall<F> = F;

/// Span wrapping one logical client call.
#[derive(Clone, Debug)]
pub struct CallSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl CallSpan {
	/// Creates a new span tagged with the platform and operation.
	pub fn new(platform: Platform, operation: OperationKind) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!(
				"adplatform_client.call",
				platform = platform.as_str(),
				operation = operation.as_str()
			);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (platform, operation);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedCall<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// Emits a `warn` event before the executor sleeps and retries.
pub fn trace_retry(attempt: u32, delay: Duration, cause: &dyn Display) {
	#[cfg(feature = "tracing")]
	{
		tracing::warn!(attempt, delay_ms = delay.whole_milliseconds() as i64, %cause, "retrying");
	}

	#[cfg(not(feature = "tracing"))]
	{
		let _ = (attempt, delay, cause);
	}
}

/// Emits a `warn` event when a background call waits for a rate-limit slot.
pub fn trace_rate_limit_wait(platform: Platform, wait: Duration) {
	#[cfg(feature = "tracing")]
	{
		tracing::warn!(
			platform = platform.as_str(),
			wait_ms = wait.whole_milliseconds() as i64,
			"waiting for rate-limit slot"
		);
	}

	#[cfg(not(feature = "tracing"))]
	{
		let _ = (platform, wait);
	}
}

/// Emits an `info` event for a breaker transition.
pub fn trace_breaker_transition(platform: Platform, from: CircuitState, to: CircuitState) {
	#[cfg(feature = "tracing")]
	{
		tracing::info!(
			platform = platform.as_str(),
			from = from.as_str(),
			to = to.as_str(),
			"circuit breaker transition"
		);
	}

	#[cfg(not(feature = "tracing"))]
	{
		let _ = (platform, from, to);
	}
}

/// Emits an `info` event after a token refresh resolves.
pub fn trace_refresh(platform: Platform, org: &str, succeeded: bool) {
	#[cfg(feature = "tracing")]
	{
		tracing::info!(platform = platform.as_str(), org, succeeded, "token refresh");
	}

	#[cfg(not(feature = "tracing"))]
	{
		let _ = (platform, org, succeeded);
	}
}

/// Emits a `warn` event when a credential write is dropped in favor of the caller's error.
pub fn trace_store_write_failure(platform: Platform, org: &str, error: &dyn Display) {
	#[cfg(feature = "tracing")]
	{
		tracing::warn!(platform = platform.as_str(), org, %error, "credential write failed");
	}

	#[cfg(not(feature = "tracing"))]
	{
		let _ = (platform, org, error);
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[tokio::test]
	async fn call_span_instruments_futures() {
		let span = CallSpan::new(Platform::Meta, OperationKind::ListAccounts);
		let value = span.instrument(async { 42 }).await;

		assert_eq!(value, 42);

		trace_retry(1, Duration::milliseconds(500), &"status 503");
		trace_breaker_transition(Platform::Meta, CircuitState::Closed, CircuitState::Open);
		trace_store_write_failure(Platform::GoogleAds, "org-1", &"vault unreachable");
	}
}
