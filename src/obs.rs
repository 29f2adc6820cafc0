//! Optional observability helpers for client calls, breaker transitions, and token refreshes.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit a span named `adplatform_client.call` per logical call with the
//!   `platform` and `operation` fields, `warn` events for retries and failed credential writes,
//!   and `info` events for breaker transitions and token refreshes.
//! - Enable `metrics` to increment `adplatform_client_call_total`,
//!   `adplatform_client_breaker_transition_total`, and `adplatform_client_refresh_total`.
//!
//! Without the features every hook compiles to a no-op.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::{_prelude::*, error::ErrorKind};

/// Outcome label recorded once per logical call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallOutcome {
	/// The call returned a payload.
	Success,
	/// The call resolved to a classified error.
	Failure(ErrorKind),
}
impl CallOutcome {
	/// Derives the outcome from a call result.
	pub fn of<T>(result: &Result<T>) -> Self {
		match result {
			Ok(_) => CallOutcome::Success,
			Err(err) => CallOutcome::Failure(err.kind()),
		}
	}

	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			CallOutcome::Success => "success",
			CallOutcome::Failure(kind) => kind.as_str(),
		}
	}
}
impl Display for CallOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for token refreshes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RefreshOutcome {
	/// A refresh call is about to hit the token endpoint.
	Attempt,
	/// The refreshed credential was persisted.
	Success,
	/// The refresh failed.
	Failure,
	/// The platform revoked the refresh token; re-authorization is required.
	Revoked,
}
impl RefreshOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			RefreshOutcome::Attempt => "attempt",
			RefreshOutcome::Success => "success",
			RefreshOutcome::Failure => "failure",
			RefreshOutcome::Revoked => "revoked",
		}
	}
}
impl Display for RefreshOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
