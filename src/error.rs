//! Client-level error taxonomy shared across the executor, token manager, and builders.

// self
use crate::{
	_prelude::*,
	auth::{OrgId, Platform},
	request::OperationKind,
};

/// Client-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical client error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Credential storage failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// The organization's authorization is unusable.
	#[error(transparent)]
	Auth(#[from] AuthError),
	/// Malformed caller input or a platform rejection of the request itself.
	#[error(transparent)]
	Validation(#[from] ValidationError),
	/// Temporary platform or network failure.
	#[error(transparent)]
	Transient(#[from] TransientError),

	/// The request was throttled, locally or by the platform.
	#[error("{platform} rate limit reached for {operation}; retry after {retry_after}.")]
	RateLimited {
		/// Logical operation that was throttled.
		operation: OperationKind,
		/// Target platform.
		platform: Platform,
		/// Duration after which a retry is likely to succeed.
		retry_after: Duration,
	},
	/// The platform circuit is open; no network call was attempted.
	#[error("Circuit for {platform} is open; {operation} was not attempted.")]
	CircuitOpen {
		/// Logical operation that was rejected.
		operation: OperationKind,
		/// Target platform.
		platform: Platform,
		/// Time remaining until the breaker admits a probe.
		retry_in: Duration,
	},
	/// The caller cancelled the operation.
	#[error("Operation {operation} was cancelled.")]
	Cancelled {
		/// Logical operation that was cancelled.
		operation: OperationKind,
	},
	/// The caller-supplied operation deadline elapsed.
	#[error("Operation {operation} exceeded its deadline of {deadline}.")]
	DeadlineExceeded {
		/// Logical operation that timed out.
		operation: OperationKind,
		/// Deadline supplied by the caller.
		deadline: Duration,
	},
}
impl Error {
	/// Returns the coarse classification of the error.
	pub fn kind(&self) -> ErrorKind {
		match self {
			Error::Storage(_) => ErrorKind::Storage,
			Error::Config(_) => ErrorKind::Config,
			Error::Auth(_) => ErrorKind::Auth,
			Error::Validation(_) => ErrorKind::Validation,
			Error::Transient(_) => ErrorKind::TransientPlatform,
			Error::RateLimited { .. } => ErrorKind::RateLimited,
			Error::CircuitOpen { .. } => ErrorKind::CircuitOpen,
			Error::Cancelled { .. } => ErrorKind::Cancelled,
			Error::DeadlineExceeded { .. } => ErrorKind::DeadlineExceeded,
		}
	}

	/// Returns `true` when waiting and issuing the same call again may succeed.
	pub fn is_retryable(&self) -> bool {
		matches!(
			self.kind(),
			ErrorKind::RateLimited
				| ErrorKind::CircuitOpen
				| ErrorKind::TransientPlatform
				| ErrorKind::DeadlineExceeded
		)
	}

	/// Returns the retry hint carried by throttling and breaker errors.
	pub fn retry_after(&self) -> Option<Duration> {
		match self {
			Error::RateLimited { retry_after, .. } => Some(*retry_after),
			Error::CircuitOpen { retry_in, .. } => Some(*retry_in),
			Error::Transient(err) => err.retry_after(),
			_ => None,
		}
	}
}

/// Coarse error classification returned by [`Error::kind`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
	/// See [`Error::Storage`].
	Storage,
	/// See [`Error::Config`].
	Config,
	/// See [`Error::Auth`].
	Auth,
	/// See [`Error::Validation`].
	Validation,
	/// See [`Error::Transient`].
	TransientPlatform,
	/// See [`Error::RateLimited`].
	RateLimited,
	/// See [`Error::CircuitOpen`].
	CircuitOpen,
	/// See [`Error::Cancelled`].
	Cancelled,
	/// See [`Error::DeadlineExceeded`].
	DeadlineExceeded,
}
impl ErrorKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			ErrorKind::Storage => "storage",
			ErrorKind::Config => "config",
			ErrorKind::Auth => "auth",
			ErrorKind::Validation => "validation",
			ErrorKind::TransientPlatform => "transient",
			ErrorKind::RateLimited => "rate_limited",
			ErrorKind::CircuitOpen => "circuit_open",
			ErrorKind::Cancelled => "cancelled",
			ErrorKind::DeadlineExceeded => "deadline_exceeded",
		}
	}
}

/// Authorization failures; none of them are retried automatically.
#[derive(Debug, ThisError)]
pub enum AuthError {
	/// The refresh token was revoked or rejected; the organization must re-run OAuth.
	#[error("Organization {org} must re-authorize {platform}: {reason}.")]
	ReauthRequired {
		/// Organization owning the credential.
		org: OrgId,
		/// Platform that rejected the credential.
		platform: Platform,
		/// Platform- or client-supplied reason string.
		reason: String,
	},
	/// No credential is stored for the organization/platform pair.
	#[error("No {platform} credential is stored for organization {org}.")]
	MissingCredential {
		/// Organization that was looked up.
		org: OrgId,
		/// Platform that was looked up.
		platform: Platform,
	},
	/// The platform rejected the OAuth client itself.
	#[error("{platform} rejected client authentication: {reason}.")]
	InvalidClient {
		/// Platform that rejected the client.
		platform: Platform,
		/// Platform-supplied reason string.
		reason: String,
	},
	/// The platform kept rejecting the request after one forced refresh.
	#[error("{platform} rejected {operation} with status {status} after a token refresh.")]
	Rejected {
		/// Logical operation that was rejected.
		operation: OperationKind,
		/// Platform that rejected the request.
		platform: Platform,
		/// Final HTTP status (401 or 403).
		status: u16,
	},
	/// The authorization redirect returned an unexpected `state`.
	#[error("Authorization state mismatch.")]
	StateMismatch,
}
impl AuthError {
	/// Returns `true` when the organization has to go through the OAuth consent flow again.
	pub fn requires_reauthorization(&self) -> bool {
		matches!(self, AuthError::ReauthRequired { .. } | AuthError::MissingCredential { .. })
	}
}

/// Caller mistakes and platform rejections that must never be retried.
#[derive(Debug, ThisError)]
pub enum ValidationError {
	/// Identifier validation failed.
	#[error(transparent)]
	Identifier(#[from] crate::auth::IdentifierError),
	/// Scope validation failed.
	#[error(transparent)]
	Scope(#[from] crate::auth::ScopeValidationError),
	/// Input contains characters outside the query allow-list.
	#[error("Input `{input}` contains characters outside the allow-list.")]
	DisallowedCharacters {
		/// Offending input.
		input: String,
	},
	/// Resource is not in the query allow-list.
	#[error("Resource `{resource}` is not permitted.")]
	UnknownResource {
		/// Offending resource token.
		resource: String,
	},
	/// Field is not permitted for the selected resource.
	#[error("Field `{field}` is not permitted when selecting from `{resource}`.")]
	UnknownField {
		/// Offending field token.
		field: String,
		/// Resource the query selects from.
		resource: String,
	},
	/// A query must select at least one field.
	#[error("Query must select at least one field.")]
	EmptySelection,
	/// Operator and literal do not fit together.
	#[error("Operator {operator} cannot be used with {literal}.")]
	OperatorMismatch {
		/// Operator keyword.
		operator: &'static str,
		/// Literal description.
		literal: &'static str,
	},
	/// Account identifier is malformed for the platform.
	#[error("Account id `{input}` is not a valid {platform} account id.")]
	InvalidAccountId {
		/// Offending input.
		input: String,
		/// Platform the id was meant for.
		platform: Platform,
	},
	/// Date range ends before it starts.
	#[error("Date range ends ({end}) before it starts ({start}).")]
	InvalidDateRange {
		/// Range start.
		start: Date,
		/// Range end.
		end: Date,
	},
	/// Operation is not offered by the platform.
	#[error("{operation} is not supported on {platform}.")]
	Unsupported {
		/// Logical operation.
		operation: OperationKind,
		/// Target platform.
		platform: Platform,
	},
	/// The platform rejected the request as malformed (4xx other than 401/403/429).
	#[error("{platform} rejected {operation} with status {status}: {message}.")]
	Rejected {
		/// Logical operation.
		operation: OperationKind,
		/// Platform that rejected the request.
		platform: Platform,
		/// HTTP status code.
		status: u16,
		/// Preview of the platform's error message.
		message: String,
	},
}

/// Configuration and wiring failures raised by the client.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// Descriptor contains an invalid URL.
	#[error("Descriptor contains an invalid URL.")]
	InvalidDescriptor {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Descriptor validation failed.
	#[error(transparent)]
	Descriptor(#[from] crate::platform::DescriptorError),
	/// No [`PlatformApp`](crate::platform::PlatformApp) is registered for the platform.
	#[error("No application is registered for {platform}.")]
	UnregisteredPlatform {
		/// Platform that was requested.
		platform: Platform,
	},
	/// Credential builder validation failed.
	#[error("Unable to build credential.")]
	CredentialBuild(#[from] crate::auth::CredentialBuilderError),
	/// Token endpoint returned a non-positive or out-of-range `expires_in`.
	#[error("The expires_in value is out of the supported range.")]
	ExpiresInOutOfRange,
	/// Configuration document could not be parsed.
	#[error("Configuration could not be parsed.")]
	Parse {
		/// Path-aware parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// Configuration values are inconsistent.
	#[error("Invalid configuration: {message}.")]
	Invalid {
		/// Human-readable description of the violated constraint.
		message: String,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}

	pub(crate) fn invalid(message: impl Into<String>) -> Self {
		Self::Invalid { message: message.into() }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Temporary failure variants (safe to retry).
#[derive(Debug, ThisError)]
pub enum TransientError {
	/// Platform answered with a server error or throttling status.
	#[error("{platform} returned status {status} for {operation}: {message}.")]
	Platform {
		/// Logical operation.
		operation: OperationKind,
		/// Platform that failed.
		platform: Platform,
		/// HTTP status code.
		status: u16,
		/// Preview of the response body.
		message: String,
		/// Retry-After hint from the platform, if supplied.
		retry_after: Option<Duration>,
	},
	/// Network failure before a response arrived.
	#[error("Network error while calling {platform} for {operation}.")]
	Network {
		/// Logical operation.
		operation: OperationKind,
		/// Platform that was called.
		platform: Platform,
		/// Underlying transport failure.
		#[source]
		source: TransportError,
	},
	/// A single attempt exceeded its timeout.
	#[error("Attempt for {operation} on {platform} timed out after {after}.")]
	Timeout {
		/// Logical operation.
		operation: OperationKind,
		/// Platform that was called.
		platform: Platform,
		/// Per-attempt timeout that elapsed.
		after: Duration,
	},
	/// Token endpoint returned an unexpected but non-fatal response.
	#[error("Token endpoint returned an unexpected response: {message}.")]
	TokenEndpoint {
		/// Message summarizing the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// A response body could not be decoded.
	#[error("Response body could not be decoded.")]
	ResponseParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Retries were exhausted; `last` is the final underlying cause.
	#[error("{operation} on {platform} failed after {attempts} attempts.")]
	Exhausted {
		/// Logical operation.
		operation: OperationKind,
		/// Platform that kept failing.
		platform: Platform,
		/// Number of attempts made.
		attempts: u32,
		/// Last underlying cause.
		#[source]
		last: Box<TransientError>,
	},
}
impl TransientError {
	/// Retry hint carried by the failure, if any.
	pub fn retry_after(&self) -> Option<Duration> {
		match self {
			TransientError::Platform { retry_after, .. }
			| TransientError::TokenEndpoint { retry_after, .. } => *retry_after,
			TransientError::Exhausted { last, .. } => last.retry_after(),
			_ => None,
		}
	}

	/// HTTP status attached to the failure, if any.
	pub fn status(&self) -> Option<u16> {
		match self {
			TransientError::Platform { status, .. } => Some(*status),
			TransientError::TokenEndpoint { status, .. }
			| TransientError::ResponseParse { status, .. } => *status,
			TransientError::Exhausted { last, .. } => last.status(),
			_ => None,
		}
	}
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while sending the request.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying HTTP client gave up waiting.
	#[error("The HTTP client timed out.")]
	TimedOut,
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while sending the request.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		if e.is_timeout() { Self::TimedOut } else { Self::network(e) }
	}
}
