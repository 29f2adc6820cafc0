//! Per-call pipeline: breaker, limiter, token, transport, classification, and retry.
//!
//! One call of [`AdPlatformClient::execute`] runs the loop below until it resolves:
//!
//! 1. Ask the connection's breaker for a permit; an open breaker fails fast with
//!    [`Error::CircuitOpen`] before any token lookup or bucket consumption.
//! 2. Take a token from the (organization, platform, category) bucket, failing fast or waiting
//!    depending on [`Urgency`].
//! 3. Obtain a valid access token and send the request under the per-attempt timeout.
//! 4. Classify the response through the platform strategy and report the outcome to the breaker.
//!
//! Transient failures are retried with capped exponential backoff when the envelope is
//! idempotent. A 401/403 forces one token refresh and one extra attempt that does not count
//! against the retry cap.

// self
use super::{AdPlatformClient, CallOptions, ClientInner, Urgency};
use crate::{
	_prelude::*,
	clock,
	error::{AuthError, TransientError, ValidationError},
	http::{self, HeaderMap, HttpResponse},
	mapping,
	obs::{self, CallOutcome, CallSpan},
	platform::{PlatformApp, ResponseClass, strategy},
	request::RequestEnvelope,
	resilience::Backoff,
	store::CredentialKey,
};

const MESSAGE_PREVIEW_LIMIT: usize = 512;

/// Successful (2xx) platform response.
#[derive(Clone, Debug)]
pub struct ApiResponse {
	/// HTTP status code.
	pub status: u16,
	/// Response headers.
	pub headers: HeaderMap,
	/// Raw response body.
	pub body: Vec<u8>,
	/// Attempts the executor needed, including any forced-refresh attempt.
	pub attempts: u32,
}
impl ApiResponse {
	/// Decodes the body as JSON.
	pub fn json<T>(&self) -> Result<T, TransientError>
	where
		T: DeserializeOwned,
	{
		mapping::decode_json(self.status, &self.body)
	}

	fn from_http(response: HttpResponse, attempts: u32) -> Self {
		let status = response.status().as_u16();
		let (parts, body) = response.into_parts();

		Self { status, headers: parts.headers, body, attempts }
	}
}

impl AdPlatformClient {
	/// Runs one envelope through the full resilience pipeline.
	///
	/// This is the raw executor behind every caller-facing operation; custom operations can
	/// build their own [`RequestEnvelope`] and call it directly.
	pub async fn execute(
		&self,
		envelope: RequestEnvelope,
		options: CallOptions,
	) -> Result<ApiResponse> {
		let platform = envelope.platform;
		let operation = envelope.operation;
		let span = CallSpan::new(platform, operation);
		let result = span.instrument(self.0.execute_bounded(envelope, &options)).await;

		obs::record_call_outcome(platform, operation, CallOutcome::of(&result));

		result
	}
}

impl ClientInner {
	async fn execute_bounded(
		&self,
		envelope: RequestEnvelope,
		options: &CallOptions,
	) -> Result<ApiResponse> {
		let operation = envelope.operation;
		let urgency = options.urgency;
		let bounded = async {
			match options.deadline {
				Some(deadline) =>
					tokio::time::timeout(clock::to_std(deadline), self.run(envelope, urgency))
						.await
						.unwrap_or_else(|_| Err(Error::DeadlineExceeded { operation, deadline })),
				None => self.run(envelope, urgency).await,
			}
		};

		// Dropping `bounded` drops the in-flight transport future and any breaker permit, so a
		// cancelled probe frees its slot without recording an outcome.
		match &options.cancellation {
			Some(token) => tokio::select! {
				biased;
				_ = token.cancelled() => Err(Error::Cancelled { operation }),
				result = bounded => result,
			},
			None => bounded.await,
		}
	}

	async fn run(&self, mut envelope: RequestEnvelope, urgency: Urgency) -> Result<ApiResponse> {
		let platform = envelope.platform;
		let operation = envelope.operation;
		let app = self.app(platform)?;
		let policy = &self.config.platform(platform).retry;
		let backoff = Backoff::from_config(policy);
		let attempt_timeout = policy.attempt_timeout();
		let breaker = self.breakers.get(&CredentialKey::new(&envelope.org, platform));
		let mut failures = 0_u32;
		let mut refreshed = false;

		loop {
			let permit = breaker.try_acquire().map_err(|rejection| Error::CircuitOpen {
				operation,
				platform,
				retry_in: rejection.retry_in,
			})?;

			if let Err(blocked) = self.limiter.acquire(&envelope.org, platform, envelope.category)
			{
				permit.release();

				match urgency {
					Urgency::Interactive =>
						return Err(Error::RateLimited {
							operation,
							platform,
							retry_after: blocked.retry_after,
						}),
					Urgency::Background => {
						obs::trace_rate_limit_wait(platform, blocked.retry_after);
						self.clock.sleep(blocked.retry_after).await;

						continue;
					},
				}
			}

			envelope.attempt += 1;

			let token = self.tokens.get_valid_token(&envelope.org, platform).await?;
			let request = envelope.to_http(&app.descriptor, &token)?;
			let sent =
				tokio::time::timeout(clock::to_std(attempt_timeout), self.transport.send(request))
					.await;
			let (failure, throttled) = match sent {
				Ok(Ok(response)) => {
					let status = response.status().as_u16();

					match app.strategy.classify_response(status, response.body()) {
						ResponseClass::Success => {
							permit.success();

							return Ok(ApiResponse::from_http(response, envelope.attempt));
						},
						ResponseClass::Unauthorized => {
							permit.release();

							if refreshed {
								let rejected = AuthError::Rejected { operation, platform, status };

								return Err(rejected.into());
							}

							refreshed = true;

							self.tokens
								.refresh_after_rejection(&envelope.org, platform, &token)
								.await?;

							continue;
						},
						ResponseClass::ClientError => {
							permit.release();

							return Err(ValidationError::Rejected {
								operation,
								platform,
								status,
								message: preview(response.body()),
							}
							.into());
						},
						ResponseClass::Throttled => {
							permit.soft_failure();

							let retry_after = self.retry_hint(app, &response);

							// Hints past the retry ceiling are reported to the caller but never
							// block the bucket.
							if let Some(until) = retry_after
								.filter(|hint| *hint <= backoff.max_delay())
								.and_then(|hint| self.clock.now().checked_add(hint))
							{
								self.limiter.throttle(
									&envelope.org,
									platform,
									envelope.category,
									until,
								);
							}

							let failure = TransientError::Platform {
								operation,
								platform,
								status,
								message: preview(response.body()),
								retry_after,
							};

							(failure, true)
						},
						ResponseClass::ServerError => {
							permit.failure();

							let failure = TransientError::Platform {
								operation,
								platform,
								status,
								message: preview(response.body()),
								retry_after: self.retry_hint(app, &response),
							};

							(failure, false)
						},
					}
				},
				Ok(Err(source)) => {
					permit.failure();

					(TransientError::Network { operation, platform, source }, false)
				},
				Err(_) => {
					permit.failure();

					(TransientError::Timeout { operation, platform, after: attempt_timeout }, false)
				},
			};

			if !envelope.idempotent {
				return Err(give_up(&envelope, failure, throttled, false, &backoff));
			}

			failures += 1;

			let hint = failure.retry_after();

			if failures >= policy.max_attempts
				|| hint.is_some_and(|hint| hint > backoff.max_delay())
			{
				return Err(give_up(&envelope, failure, throttled, true, &backoff));
			}

			let delay = backoff.delay(failures).max(hint.unwrap_or(Duration::ZERO));

			obs::trace_retry(envelope.attempt, delay, &failure);
			self.clock.sleep(delay).await;
		}
	}

	fn retry_hint(&self, app: &PlatformApp, response: &HttpResponse) -> Option<Duration> {
		http::parse_retry_after(response.headers(), self.clock.now())
			.or_else(|| app.strategy.retry_hint(response.headers(), response.body()))
	}
}

/// Turns the final transient failure into the error the caller sees.
///
/// Throttling surfaces as [`Error::RateLimited`] so callers get a single wait-and-retry kind;
/// everything else keeps the last cause, wrapped in [`TransientError::Exhausted`] once retries
/// were spent.
fn give_up(
	envelope: &RequestEnvelope,
	failure: TransientError,
	throttled: bool,
	retried: bool,
	backoff: &Backoff,
) -> Error {
	let operation = envelope.operation;
	let platform = envelope.platform;

	if throttled {
		let retry_after = failure.retry_after().unwrap_or_else(|| backoff.ceiling(1));

		return Error::RateLimited { operation, platform, retry_after };
	}
	if !retried {
		return failure.into();
	}

	TransientError::Exhausted {
		operation,
		platform,
		attempts: envelope.attempt,
		last: Box::new(failure),
	}
	.into()
}

fn preview(body: &[u8]) -> String {
	strategy::truncate_preview(String::from_utf8_lossy(body).into_owned(), MESSAGE_PREVIEW_LIMIT)
}
