// self
use crate::{
	auth::Platform,
	obs::{CallOutcome, RefreshOutcome},
	request::OperationKind,
	resilience::CircuitState,
};

/// Records the outcome of a logical call via the global metrics recorder (when enabled).
pub fn record_call_outcome(platform: Platform, operation: OperationKind, outcome: CallOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"adplatform_client_call_total",
			"platform" => platform.as_str(),
			"operation" => operation.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (platform, operation, outcome);
	}
}

/// Records a circuit breaker transition into `to`.
pub fn record_breaker_transition(platform: Platform, to: CircuitState) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"adplatform_client_breaker_transition_total",
			"platform" => platform.as_str(),
			"to" => to.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (platform, to);
	}
}

/// Records a token refresh outcome.
pub fn record_refresh_outcome(platform: Platform, outcome: RefreshOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"adplatform_client_refresh_total",
			"platform" => platform.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (platform, outcome);
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::error::ErrorKind;

	#[test]
	fn recorders_accept_every_label() {
		record_call_outcome(
			Platform::Meta,
			OperationKind::FetchInsights,
			CallOutcome::Failure(ErrorKind::CircuitOpen),
		);
		record_breaker_transition(Platform::GoogleAds, CircuitState::HalfOpen);
		record_refresh_outcome(Platform::Meta, RefreshOutcome::Revoked);
	}
}
