//! Transport seam shared by platform API calls and OAuth token exchanges.
//!
//! Every outbound request, whether it targets a platform REST endpoint or a token endpoint, goes
//! through one [`Transport`]. Production code uses [`ReqwestTransport`]; tests swap in
//! [`ScriptedTransport`], which replays canned responses and counts calls per route so tests
//! can prove that no network call was attempted.
//!
//! Token exchanges reach the transport through an [`AsyncHttpClient`] adapter that records the
//! status and `Retry-After` hint of each response into a [`ResponseMetadataSlot`], so error
//! mapping can classify failures with consistent metadata.

pub mod scripted;

pub use oauth2::{HttpRequest, HttpResponse, http::HeaderMap};
pub use scripted::*;

// crates.io
use oauth2::{AsyncHttpClient, HttpClientError, http::header::RETRY_AFTER};
use time::format_description::well_known::Rfc2822;
// self
use crate::{_prelude::*, clock::Clock, error::TransportError};

/// Boxed future returned by [`Transport::send`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<HttpResponse, TransportError>> + 'a + Send>>;

/// HTTP transport used for every outbound call.
///
/// Implementations must not follow redirects for token endpoints and must surface every HTTP
/// status as `Ok(response)`; only failures that prevent a response from arriving (DNS, TLS,
/// connection resets, client-side timeouts) are reported as [`TransportError`]. Dropping the
/// returned future must abort the in-flight request.
pub trait Transport
where
	Self: 'static + Send + Sync,
{
	/// Sends the request and resolves to the full buffered response.
	fn send(&self, request: HttpRequest) -> TransportFuture<'_>;
}
impl<T> Transport for Arc<T>
where
	T: ?Sized + Transport,
{
	fn send(&self, request: HttpRequest) -> TransportFuture<'_> {
		(**self).send(request)
	}
}

/// Captures metadata from the most recent HTTP response for downstream error mapping.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadata {
	/// HTTP status code returned by the endpoint, if available.
	pub status: Option<u16>,
	/// Retry-After hint expressed as a relative duration.
	pub retry_after: Option<Duration>,
}
impl ResponseMetadata {
	/// Extracts the status and `Retry-After` hint from a response.
	pub fn from_response(response: &HttpResponse, now: OffsetDateTime) -> Self {
		Self {
			status: Some(response.status().as_u16()),
			retry_after: parse_retry_after(response.headers(), now),
		}
	}
}

/// Thread-safe slot for sharing [`ResponseMetadata`] between transport and error layers.
///
/// A fresh slot is created per token request and read immediately after `oauth2` resolves.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadataSlot(Arc<Mutex<Option<ResponseMetadata>>>);
impl ResponseMetadataSlot {
	/// Stores new metadata for the current request.
	pub fn store(&self, meta: ResponseMetadata) {
		*self.0.lock() = Some(meta);
	}

	/// Returns the captured metadata, if any, consuming it from the slot.
	pub fn take(&self) -> Option<ResponseMetadata> {
		self.0.lock().take()
	}
}

/// Production transport backed by [`ReqwestClient`].
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug)]
pub struct ReqwestTransport(ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Builds a transport with redirects disabled.
	pub fn new() -> Result<Self, crate::error::ConfigError> {
		let client = ReqwestClient::builder().redirect(reqwest::redirect::Policy::none()).build()?;

		Ok(Self(client))
	}

	/// Wraps an existing reqwest [`ReqwestClient`].
	///
	/// Configure the client to disable redirect following; token endpoints must answer directly.
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
#[cfg(feature = "reqwest")]
impl Transport for ReqwestTransport {
	fn send(&self, request: HttpRequest) -> TransportFuture<'_> {
		let client = self.0.clone();

		Box::pin(async move {
			let request = reqwest::Request::try_from(request)?;
			let response = client.execute(request).await?;
			let status = response.status();
			let headers = response.headers().to_owned();
			let mut converted = HttpResponse::new(response.bytes().await?.to_vec());

			*converted.status_mut() = status;
			*converted.headers_mut() = headers;

			Ok(converted)
		})
	}
}

/// [`AsyncHttpClient`] adapter that routes `oauth2` token requests through a [`Transport`].
pub(crate) struct OAuthHttpClient {
	transport: Arc<dyn Transport>,
	clock: Arc<dyn Clock>,
	slot: ResponseMetadataSlot,
}
impl OAuthHttpClient {
	pub(crate) fn new(
		transport: Arc<dyn Transport>,
		clock: Arc<dyn Clock>,
		slot: ResponseMetadataSlot,
	) -> Self {
		Self { transport, clock, slot }
	}
}
impl<'c> AsyncHttpClient<'c> for OAuthHttpClient {
	type Error = HttpClientError<TransportError>;
	type Future = Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send>>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		Box::pin(async move {
			self.slot.take();

			let response = self.transport.send(request).await.map_err(Box::new)?;

			self.slot.store(ResponseMetadata::from_response(&response, self.clock.now()));

			Ok(response)
		})
	}
}

/// Parses a `Retry-After` header given as delta-seconds or an RFC 2822 date.
///
/// Dates in the past and unparsable values yield `None`.
pub fn parse_retry_after(headers: &HeaderMap, now: OffsetDateTime) -> Option<Duration> {
	let value = headers.get(RETRY_AFTER)?;
	let raw = value.to_str().ok()?.trim();

	if let Ok(secs) = raw.parse::<u32>() {
		return Some(Duration::seconds(i64::from(secs)));
	}
	if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
		let delta = moment - now;

		if delta.is_positive() {
			return Some(delta);
		}
	}

	None
}

#[cfg(test)]
mod tests {
	// crates.io
	use oauth2::http::HeaderValue;
	use time::macros;
	// self
	use super::*;

	fn headers(value: &'static str) -> HeaderMap {
		let mut headers = HeaderMap::new();

		headers.insert(RETRY_AFTER, HeaderValue::from_static(value));

		headers
	}

	#[test]
	fn retry_after_accepts_seconds_and_dates() {
		let now = macros::datetime!(2025-01-01 00:00 UTC);

		assert_eq!(parse_retry_after(&headers("7"), now), Some(Duration::seconds(7)));
		assert_eq!(
			parse_retry_after(&headers("Wed, 01 Jan 2025 00:00:30 +0000"), now),
			Some(Duration::seconds(30))
		);
		assert_eq!(parse_retry_after(&headers("Tue, 31 Dec 2024 23:59:00 +0000"), now), None);
		assert_eq!(parse_retry_after(&headers("soon"), now), None);
		assert_eq!(parse_retry_after(&HeaderMap::new(), now), None);
	}

	#[tokio::test]
	async fn oauth_adapter_records_metadata() {
		let transport = Arc::new(ScriptedTransport::new());

		transport
			.route("/token", [Reply::json(503, serde_json::json!({})).header("retry-after", "4")]);

		let slot = ResponseMetadataSlot::default();
		let client = OAuthHttpClient::new(
			transport.clone(),
			Arc::new(crate::clock::SystemClock),
			slot.clone(),
		);
		let request = oauth2::http::Request::builder()
			.method("POST")
			.uri("https://auth.example.com/token")
			.body(Vec::new())
			.expect("Request fixture should build.");
		let response = client.call(request).await.expect("Scripted transport should answer.");
		let meta = slot.take().expect("Metadata should be recorded.");

		assert_eq!(response.status().as_u16(), 503);
		assert_eq!(meta.status, Some(503));
		assert_eq!(meta.retry_after, Some(Duration::seconds(4)));
		assert_eq!(transport.calls("/token"), 1);
	}
}
