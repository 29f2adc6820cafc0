//! Platform strategy hooks that classify token-endpoint and API responses.
//!
//! Strategies keep platform knowledge (Meta's error codes, throttling headers) out of the
//! executor. Hooks receive crate-owned data (status codes, body bytes, header maps) so they stay
//! independent of any HTTP client.

// self
use crate::{_prelude::*, auth::Platform, http::HeaderMap, oauth::GrantType};

const META_THROTTLE_CODES: [i64; 4] = [4, 17, 32, 613];
const META_THROTTLE_RANGE: std::ops::RangeInclusive<i64> = 80_000..=80_014;
const META_INVALID_TOKEN: i64 = 190;
const META_INVALID_CLIENT: i64 = 101;
const META_USAGE_HEADER: &str = "x-business-use-case-usage";

/// Strategy hook that classifies platform responses.
pub trait PlatformStrategy
where
	Self: Send + Sync,
{
	/// Maps a failed token request into the client's token error categories.
	fn classify_token_error(&self, ctx: &TokenErrorContext) -> TokenErrorKind;

	/// Classifies an API response into the executor's response classes.
	///
	/// The default implementation looks at the status code only.
	fn classify_response(&self, status: u16, body: &[u8]) -> ResponseClass {
		let _ = body;

		classify_status(status)
	}

	/// Extracts a platform-specific retry hint beyond the standard `Retry-After` header.
	fn retry_hint(&self, headers: &HeaderMap, body: &[u8]) -> Option<Duration> {
		let _ = (headers, body);

		None
	}
}

/// Classification of an API response used by the executor's retry loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseClass {
	/// 2xx: the payload can be returned.
	Success,
	/// The access token was rejected (401/403 or a platform token error code).
	Unauthorized,
	/// The platform throttled the request.
	Throttled,
	/// 5xx or a platform-declared transient failure.
	ServerError,
	/// Any other 4xx; a caller mistake rather than a platform health signal.
	ClientError,
}

/// Canonical token error categories used by strategies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenErrorKind {
	/// Platform rejected the grant (bad code or revoked refresh token).
	InvalidGrant,
	/// Client authentication failed.
	InvalidClient,
	/// Requested scopes exceed what the grant covers.
	InsufficientScope,
	/// Failure is temporary.
	Transient,
}

/// Context passed to strategies when classifying token errors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenErrorContext {
	/// Platform the token endpoint belongs to.
	pub platform: Platform,
	/// Grant type associated with the failing request.
	pub grant_type: GrantType,
	/// HTTP status code returned by the platform, when available.
	pub http_status: Option<u16>,
	/// OAuth `error` field.
	pub oauth_error: Option<String>,
	/// OAuth `error_description` field.
	pub error_description: Option<String>,
	/// Preview of the response body for non-standard payloads.
	pub body_preview: Option<String>,
}
impl TokenErrorContext {
	const BODY_PREVIEW_LIMIT: usize = 512;

	/// Creates a new context for the provided platform and grant.
	pub fn new(platform: Platform, grant_type: GrantType) -> Self {
		Self {
			platform,
			grant_type,
			http_status: None,
			oauth_error: None,
			error_description: None,
			body_preview: None,
		}
	}

	/// Adds an HTTP status code.
	pub fn with_http_status(mut self, status: u16) -> Self {
		self.http_status = Some(status);

		self
	}

	/// Adds the OAuth error code string.
	pub fn with_oauth_error(mut self, error: impl Into<String>) -> Self {
		self.oauth_error = Some(error.into());

		self
	}

	/// Adds the OAuth `error_description` field.
	pub fn with_error_description(mut self, description: impl Into<String>) -> Self {
		self.error_description = Some(description.into());

		self
	}

	/// Adds a body preview, truncated to a bounded length.
	pub fn with_body_preview(mut self, body: impl Into<String>) -> Self {
		self.body_preview = Some(truncate_preview(body.into(), Self::BODY_PREVIEW_LIMIT));

		self
	}
}

/// Strategy applying RFC 6749 heuristics and plain status classification.
///
/// Token errors are classified from the structured OAuth fields first, then body text hints,
/// then the HTTP status. Used for Google Ads.
#[derive(Debug, Default)]
pub struct DefaultPlatformStrategy;
impl PlatformStrategy for DefaultPlatformStrategy {
	fn classify_token_error(&self, ctx: &TokenErrorContext) -> TokenErrorKind {
		classify_oauth_error(ctx.oauth_error.as_deref(), ctx.error_description.as_deref())
			.or_else(|| classify_body(ctx.body_preview.as_deref()))
			.unwrap_or_else(|| classify_token_status(ctx.http_status))
	}
}

/// Meta Graph API strategy.
///
/// Meta reports most failures as a JSON `error` object with a numeric `code`, frequently with a
/// 400 status. Throttling codes (4, 17, 32, 613, 80000-80014) are reclassified as
/// [`ResponseClass::Throttled`] and code 190 (invalid OAuth token) as
/// [`ResponseClass::Unauthorized`]. Errors flagged `is_transient` count as server errors.
#[derive(Debug, Default)]
pub struct MetaStrategy;
impl PlatformStrategy for MetaStrategy {
	fn classify_token_error(&self, ctx: &TokenErrorContext) -> TokenErrorKind {
		if let Some(code) = ctx.body_preview.as_deref().and_then(scan_meta_code) {
			match code {
				META_INVALID_TOKEN => return TokenErrorKind::InvalidGrant,
				META_INVALID_CLIENT => return TokenErrorKind::InvalidClient,
				code if is_meta_throttle(code) => return TokenErrorKind::Transient,
				_ => {},
			}
		}

		DefaultPlatformStrategy.classify_token_error(ctx)
	}

	fn classify_response(&self, status: u16, body: &[u8]) -> ResponseClass {
		if (200..300).contains(&status) {
			return ResponseClass::Success;
		}
		if let Some(error) = MetaErrorEnvelope::parse(body) {
			if error.code == META_INVALID_TOKEN {
				return ResponseClass::Unauthorized;
			}
			if is_meta_throttle(error.code) {
				return ResponseClass::Throttled;
			}
			if error.is_transient && status < 500 {
				return ResponseClass::ServerError;
			}
		}

		classify_status(status)
	}

	fn retry_hint(&self, headers: &HeaderMap, _body: &[u8]) -> Option<Duration> {
		let raw = headers.get(META_USAGE_HEADER)?.to_str().ok()?;
		let usage = serde_json::from_str::<HashMap<String, Vec<MetaUsage>>>(raw).ok()?;
		let minutes = usage
			.values()
			.flatten()
			.filter_map(|entry| entry.estimated_time_to_regain_access)
			.max()?;

		minutes.checked_mul(60).filter(|seconds| *seconds > 0).map(Duration::seconds)
	}
}

#[derive(Debug, Deserialize)]
struct MetaErrorEnvelope {
	error: MetaError,
}
impl MetaErrorEnvelope {
	fn parse(body: &[u8]) -> Option<MetaError> {
		serde_json::from_slice::<Self>(body).ok().map(|envelope| envelope.error)
	}
}

#[derive(Debug, Deserialize)]
struct MetaError {
	code: i64,
	#[serde(default)]
	is_transient: bool,
}

#[derive(Debug, Deserialize)]
struct MetaUsage {
	#[serde(default)]
	estimated_time_to_regain_access: Option<i64>,
}

fn is_meta_throttle(code: i64) -> bool {
	META_THROTTLE_CODES.contains(&code) || META_THROTTLE_RANGE.contains(&code)
}

// Tolerates truncated previews where the JSON no longer parses.
fn scan_meta_code(body: &str) -> Option<i64> {
	if let Some(error) = MetaErrorEnvelope::parse(body.as_bytes()) {
		return Some(error.code);
	}

	let start = body.find("\"code\":")? + "\"code\":".len();
	let digits: String = body[start..]
		.trim_start()
		.chars()
		.take_while(char::is_ascii_digit)
		.collect();

	digits.parse().ok()
}

fn classify_status(status: u16) -> ResponseClass {
	match status {
		200..=299 => ResponseClass::Success,
		401 | 403 => ResponseClass::Unauthorized,
		429 => ResponseClass::Throttled,
		500..=599 => ResponseClass::ServerError,
		_ => ResponseClass::ClientError,
	}
}

pub(crate) fn truncate_preview(body: String, limit: usize) -> String {
	if body.chars().count() <= limit {
		return body;
	}

	let mut buf: String = body.chars().take(limit).collect();

	buf.push('…');

	buf
}

fn classify_oauth_error(
	oauth_error: Option<&str>,
	error_description: Option<&str>,
) -> Option<TokenErrorKind> {
	oauth_error
		.and_then(match_exact_value)
		.or_else(|| error_description.and_then(match_exact_value))
		.or_else(|| classify_body(error_description))
}

fn match_exact_value(value: &str) -> Option<TokenErrorKind> {
	if value.eq_ignore_ascii_case("invalid_grant") || value.eq_ignore_ascii_case("access_denied") {
		Some(TokenErrorKind::InvalidGrant)
	} else if value.eq_ignore_ascii_case("invalid_client")
		|| value.eq_ignore_ascii_case("unauthorized_client")
	{
		Some(TokenErrorKind::InvalidClient)
	} else if value.eq_ignore_ascii_case("invalid_scope")
		|| value.eq_ignore_ascii_case("insufficient_scope")
	{
		Some(TokenErrorKind::InsufficientScope)
	} else if value.eq_ignore_ascii_case("temporarily_unavailable")
		|| value.eq_ignore_ascii_case("server_error")
	{
		Some(TokenErrorKind::Transient)
	} else {
		None
	}
}

fn classify_body(body: Option<&str>) -> Option<TokenErrorKind> {
	let lowered = body?.to_ascii_lowercase();

	match lowered.as_str() {
		text if text.contains("invalid_grant") => Some(TokenErrorKind::InvalidGrant),
		text if text.contains("invalid_client") => Some(TokenErrorKind::InvalidClient),
		text if text.contains("insufficient_scope") || text.contains("invalid_scope") =>
			Some(TokenErrorKind::InsufficientScope),
		text if text.contains("temporarily_unavailable") => Some(TokenErrorKind::Transient),
		_ => None,
	}
}

fn classify_token_status(status: Option<u16>) -> TokenErrorKind {
	match status {
		Some(400 | 404 | 410) => TokenErrorKind::InvalidGrant,
		Some(401) => TokenErrorKind::InvalidClient,
		Some(403) => TokenErrorKind::InsufficientScope,
		_ => TokenErrorKind::Transient,
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use oauth2::http::HeaderValue;
	// self
	use super::*;

	fn meta_body(code: i64, transient: bool) -> Vec<u8> {
		serde_json::json!({
			"error": {
				"message": "failure",
				"type": "OAuthException",
				"code": code,
				"is_transient": transient
			}
		})
		.to_string()
		.into_bytes()
	}

	#[test]
	fn default_strategy_classifies_by_status() {
		let strategy = DefaultPlatformStrategy;

		assert_eq!(strategy.classify_response(200, b"{}"), ResponseClass::Success);
		assert_eq!(strategy.classify_response(401, b""), ResponseClass::Unauthorized);
		assert_eq!(strategy.classify_response(403, b""), ResponseClass::Unauthorized);
		assert_eq!(strategy.classify_response(429, b""), ResponseClass::Throttled);
		assert_eq!(strategy.classify_response(503, b""), ResponseClass::ServerError);
		assert_eq!(strategy.classify_response(400, b""), ResponseClass::ClientError);
		assert_eq!(strategy.classify_response(404, b""), ResponseClass::ClientError);
	}

	#[test]
	fn meta_codes_override_status() {
		let strategy = MetaStrategy;

		for code in [4, 17, 32, 613, 80_000, 80_004, 80_014] {
			assert_eq!(
				strategy.classify_response(400, &meta_body(code, false)),
				ResponseClass::Throttled,
				"{code}"
			);
		}

		for (code, transient, class) in [
			(190, false, ResponseClass::Unauthorized),
			(2, true, ResponseClass::ServerError),
			(100, false, ResponseClass::ClientError),
			(80_015, false, ResponseClass::ClientError),
		] {
			let body = meta_body(code, transient);

			assert_eq!(strategy.classify_response(400, &body), class, "{code}");
		}
	}

	#[test]
	fn meta_usage_header_yields_retry_hint() {
		let mut headers = HeaderMap::new();

		headers.insert(
			META_USAGE_HEADER,
			HeaderValue::from_static(
				r#"{"123":[{"type":"ads_insights","call_count":100,"estimated_time_to_regain_access":3}]}"#,
			),
		);

		assert_eq!(MetaStrategy.retry_hint(&headers, b""), Some(Duration::minutes(3)));
		assert_eq!(MetaStrategy.retry_hint(&HeaderMap::new(), b""), None);
	}

	#[test]
	fn oversized_usage_hints_are_dropped() {
		let hint = |minutes: i64| {
			let mut headers = HeaderMap::new();
			let raw = format!(r#"{{"123":[{{"estimated_time_to_regain_access":{minutes}}}]}}"#);

			headers.insert(
				META_USAGE_HEADER,
				HeaderValue::from_str(&raw).expect("Usage header should be valid."),
			);

			MetaStrategy.retry_hint(&headers, b"")
		};

		assert_eq!(hint(i64::MAX), None);
		assert_eq!(hint(0), None);
		assert_eq!(hint(100_000_000_000), Some(Duration::seconds(6_000_000_000_000)));
	}

	#[test]
	fn token_errors_classify_oauth_fields_then_body() {
		let ctx = TokenErrorContext::new(Platform::GoogleAds, GrantType::RefreshToken)
			.with_http_status(400)
			.with_oauth_error("invalid_grant");

		assert_eq!(
			DefaultPlatformStrategy.classify_token_error(&ctx),
			TokenErrorKind::InvalidGrant
		);

		let ctx = TokenErrorContext::new(Platform::GoogleAds, GrantType::RefreshToken)
			.with_http_status(503);

		assert_eq!(DefaultPlatformStrategy.classify_token_error(&ctx), TokenErrorKind::Transient);

		let truncated = format!(
			"{{\"error\":{{\"message\":\"{}\",\"type\":\"OAuthException\",\"code\":190",
			"x".repeat(100)
		);
		let ctx = TokenErrorContext::new(Platform::Meta, GrantType::RefreshToken)
			.with_http_status(400)
			.with_body_preview(truncated);

		assert_eq!(MetaStrategy.classify_token_error(&ctx), TokenErrorKind::InvalidGrant);
	}
}
