//! Client configuration: per-platform rate limits, breaker thresholds, and retry policy.
//!
//! Every struct is `#[serde(default)]`, so a document only needs to name the values it
//! overrides:
//!
//! ```
//! let config = adplatform_client::config::ClientConfig::from_json_str(
//! 	r#"{ "meta": { "breaker": { "failure_threshold": 3 } } }"#,
//! )
//! .expect("Config should parse.");
//!
//! assert_eq!(config.meta.breaker.failure_threshold, 3);
//! assert_eq!(config.meta.retry.max_attempts, 3);
//! ```

// self
use crate::{_prelude::*, auth::Platform, error::ConfigError, request::EndpointCategory};

/// Top-level client configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
	/// Tokens expiring within this many seconds are refreshed before use.
	pub token_refresh_margin_secs: u64,
	/// Meta Marketing API settings.
	pub meta: PlatformConfig,
	/// Google Ads API settings.
	pub google_ads: PlatformConfig,
}
impl ClientConfig {
	/// Parses a JSON document, reporting the path of the first offending field.
	pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
		let de = &mut serde_json::Deserializer::from_str(raw);
		let config: Self =
			serde_path_to_error::deserialize(de).map_err(|source| ConfigError::Parse { source })?;

		config.validate()?;

		Ok(config)
	}

	/// Settings for `platform`.
	pub fn platform(&self, platform: Platform) -> &PlatformConfig {
		match platform {
			Platform::Meta => &self.meta,
			Platform::GoogleAds => &self.google_ads,
		}
	}

	/// Refresh margin as a [`Duration`].
	pub fn token_refresh_margin(&self) -> Duration {
		Duration::seconds(i64::try_from(self.token_refresh_margin_secs).unwrap_or(i64::MAX))
	}

	/// Rejects values that would disable or invert a safety mechanism.
	pub fn validate(&self) -> Result<(), ConfigError> {
		for platform in Platform::ALL {
			self.platform(platform)
				.validate()
				.map_err(|message| ConfigError::invalid(format!("{platform}: {message}")))?;
		}

		Ok(())
	}
}
impl Default for ClientConfig {
	fn default() -> Self {
		Self {
			token_refresh_margin_secs: 60,
			meta: PlatformConfig::default(),
			google_ads: PlatformConfig::default(),
		}
	}
}

/// Settings for one platform.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
	/// Token-bucket parameters per endpoint category.
	pub rate_limits: RateLimitConfig,
	/// Circuit breaker thresholds.
	pub breaker: BreakerConfig,
	/// Retry policy for transient failures.
	pub retry: RetryConfig,
}
impl PlatformConfig {
	fn validate(&self) -> Result<(), String> {
		for category in EndpointCategory::ALL {
			let bucket = self.rate_limits.bucket(category);

			if bucket.capacity == 0 {
				return Err(format!("{category} bucket capacity must be positive"));
			}
			if !(bucket.refill_per_second.is_finite() && bucket.refill_per_second > 0.) {
				return Err(format!("{category} bucket refill rate must be positive"));
			}
		}

		if self.breaker.failure_threshold == 0 {
			return Err("breaker failure_threshold must be positive".into());
		}
		if self.breaker.window_ms == 0 || self.breaker.cooldown_ms == 0 {
			return Err("breaker window and cooldown must be positive".into());
		}
		if self.breaker.max_cooldown_ms < self.breaker.cooldown_ms {
			return Err("breaker max_cooldown_ms must not be below cooldown_ms".into());
		}
		if self.retry.max_attempts == 0 {
			return Err("retry max_attempts must be positive".into());
		}
		if self.retry.max_delay_ms < self.retry.base_delay_ms {
			return Err("retry max_delay_ms must not be below base_delay_ms".into());
		}
		if self.retry.attempt_timeout_ms == 0 {
			return Err("retry attempt_timeout_ms must be positive".into());
		}

		Ok(())
	}
}

/// Token-bucket parameters for each endpoint category.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
	/// Account listing endpoints.
	pub accounts: BucketConfig,
	/// Read-only insight/report endpoints.
	pub insights: BucketConfig,
	/// Query-language search endpoints.
	pub query: BucketConfig,
	/// Export-heavy endpoints.
	pub export: BucketConfig,
}
impl RateLimitConfig {
	/// Bucket parameters for `category`.
	pub fn bucket(&self, category: EndpointCategory) -> BucketConfig {
		match category {
			EndpointCategory::Accounts => self.accounts,
			EndpointCategory::Insights => self.insights,
			EndpointCategory::Query => self.query,
			EndpointCategory::Export => self.export,
		}
	}
}
impl Default for RateLimitConfig {
	fn default() -> Self {
		Self {
			accounts: BucketConfig::new(10, 1.),
			insights: BucketConfig::new(20, 2.),
			query: BucketConfig::new(20, 2.),
			export: BucketConfig::new(5, 0.2),
		}
	}
}

/// Capacity and refill rate of one token bucket.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BucketConfig {
	/// Maximum number of tokens the bucket holds.
	pub capacity: u32,
	/// Tokens added per second.
	pub refill_per_second: f64,
}
impl BucketConfig {
	/// Creates bucket parameters.
	pub const fn new(capacity: u32, refill_per_second: f64) -> Self {
		Self { capacity, refill_per_second }
	}
}
impl Default for BucketConfig {
	fn default() -> Self {
		Self::new(10, 1.)
	}
}

/// Circuit breaker thresholds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
	/// The breaker opens once failures within one window exceed this count.
	pub failure_threshold: u32,
	/// Length of the fixed failure-counting window.
	pub window_ms: u64,
	/// Initial Open-state cooldown before a probe is admitted.
	pub cooldown_ms: u64,
	/// Cap for the doubling cooldown after failed probes.
	pub max_cooldown_ms: u64,
}
impl BreakerConfig {
	/// Failure-counting window.
	pub fn window(&self) -> Duration {
		millis(self.window_ms)
	}

	/// Initial cooldown.
	pub fn cooldown(&self) -> Duration {
		millis(self.cooldown_ms)
	}

	/// Cooldown cap.
	pub fn max_cooldown(&self) -> Duration {
		millis(self.max_cooldown_ms)
	}
}
impl Default for BreakerConfig {
	fn default() -> Self {
		Self {
			failure_threshold: 5,
			window_ms: 60_000,
			cooldown_ms: 30_000,
			max_cooldown_ms: 480_000,
		}
	}
}

/// Retry policy for transient failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
	/// Total attempts per call, including the first one.
	pub max_attempts: u32,
	/// Delay before the first retry; doubles on every further retry.
	pub base_delay_ms: u64,
	/// Cap for a single backoff delay.
	pub max_delay_ms: u64,
	/// Timeout applied to each attempt separately.
	pub attempt_timeout_ms: u64,
	/// Randomizes each delay between half and the full computed value.
	pub jitter: bool,
}
impl RetryConfig {
	/// Base backoff delay.
	pub fn base_delay(&self) -> Duration {
		millis(self.base_delay_ms)
	}

	/// Backoff cap.
	pub fn max_delay(&self) -> Duration {
		millis(self.max_delay_ms)
	}

	/// Per-attempt timeout.
	pub fn attempt_timeout(&self) -> Duration {
		millis(self.attempt_timeout_ms)
	}
}
impl Default for RetryConfig {
	fn default() -> Self {
		Self {
			max_attempts: 3,
			base_delay_ms: 500,
			max_delay_ms: 30_000,
			attempt_timeout_ms: 30_000,
			jitter: true,
		}
	}
}

fn millis(value: u64) -> Duration {
	Duration::milliseconds(i64::try_from(value).unwrap_or(i64::MAX))
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn defaults_are_valid() {
		let config = ClientConfig::default();

		config.validate().expect("Default configuration should validate.");

		assert_eq!(config.token_refresh_margin(), Duration::seconds(60));
		assert_eq!(config.google_ads.breaker.cooldown(), Duration::seconds(30));
		assert_eq!(config.meta.rate_limits.bucket(EndpointCategory::Export).capacity, 5);
	}

	#[test]
	fn parse_errors_report_the_field_path() {
		let raw = r#"{ "google_ads": { "retry": { "max_attempts": "x" } } }"#;
		let err = ClientConfig::from_json_str(raw)
			.expect_err("A string attempt count must be rejected.");
		let ConfigError::Parse { source } = err else {
			panic!("Expected a parse error, got {err:?}.");
		};

		assert_eq!(source.path().to_string(), "google_ads.retry.max_attempts");
	}

	#[test]
	fn validation_rejects_unsafe_values() {
		for raw in [
			r#"{ "meta": { "rate_limits": { "insights": { "capacity": 0, "refill_per_second": 1 } } } }"#,
			r#"{ "meta": { "rate_limits": { "query": { "capacity": 1, "refill_per_second": 0 } } } }"#,
			r#"{ "meta": { "breaker": { "failure_threshold": 0 } } }"#,
			r#"{ "google_ads": { "breaker": { "cooldown_ms": 10, "max_cooldown_ms": 5 } } }"#,
			r#"{ "google_ads": { "retry": { "max_attempts": 0 } } }"#,
			r#"{ "google_ads": { "retry": { "base_delay_ms": 10, "max_delay_ms": 1 } } }"#,
		] {
			assert!(
				matches!(ClientConfig::from_json_str(raw), Err(ConfigError::Invalid { .. })),
				"{raw}"
			);
		}
	}
}
