//! Token-bucket rate limiter keyed by (organization, platform, endpoint category).

// self
use crate::{
	_prelude::*,
	auth::{OrgId, Platform},
	clock::Clock,
	config::{BucketConfig, ClientConfig, RateLimitConfig},
	request::EndpointCategory,
};

/// Bucket identity; every distinct key owns an independent bucket.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BucketKey {
	/// Organization component.
	pub org: OrgId,
	/// Platform component.
	pub platform: Platform,
	/// Endpoint family component.
	pub category: EndpointCategory,
}
impl BucketKey {
	/// Builds a key.
	pub fn new(org: &OrgId, platform: Platform, category: EndpointCategory) -> Self {
		Self { org: org.clone(), platform, category }
	}
}
impl Display for BucketKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "{}/{}/{}", self.org, self.platform, self.category)
	}
}

/// Returned when a bucket has no token available.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ThisError)]
#[error("No rate-limit slot is available; retry after {retry_after}.")]
pub struct WouldBlock {
	/// Time after which a token is expected to be available.
	pub retry_after: Duration,
}

#[derive(Debug)]
struct Bucket {
	capacity: f64,
	refill_per_second: f64,
	tokens: f64,
	last_refill: OffsetDateTime,
	blocked_until: Option<OffsetDateTime>,
}
impl Bucket {
	fn new(config: BucketConfig, now: OffsetDateTime) -> Self {
		let capacity = f64::from(config.capacity);

		Self {
			capacity,
			refill_per_second: config.refill_per_second,
			tokens: capacity,
			last_refill: now,
			blocked_until: None,
		}
	}

	fn refill(&mut self, now: OffsetDateTime) {
		let elapsed = (now - self.last_refill).as_seconds_f64();

		if elapsed > 0. {
			self.tokens = (self.tokens + elapsed * self.refill_per_second).min(self.capacity);
			self.last_refill = now;
		}
	}

	fn take(&mut self, now: OffsetDateTime) -> Result<(), WouldBlock> {
		if let Some(until) = self.blocked_until {
			if until > now {
				return Err(WouldBlock { retry_after: until - now });
			}

			self.blocked_until = None;
		}

		self.refill(now);

		if self.tokens >= 1. {
			self.tokens -= 1.;

			return Ok(());
		}

		let wait = (1. - self.tokens) / self.refill_per_second;

		Err(WouldBlock { retry_after: Duration::saturating_seconds_f64(wait) })
	}
}

/// Rate limiter over lazily created, independently locked buckets.
#[derive(Debug)]
pub struct RateLimiter {
	configs: HashMap<Platform, RateLimitConfig>,
	clock: Arc<dyn Clock>,
	buckets: Mutex<HashMap<BucketKey, Arc<Mutex<Bucket>>>>,
}
impl RateLimiter {
	/// Creates a limiter using the per-platform bucket parameters from `config`.
	pub fn new(config: &ClientConfig, clock: Arc<dyn Clock>) -> Self {
		let configs = Platform::ALL
			.into_iter()
			.map(|platform| (platform, config.platform(platform).rate_limits.clone()));

		Self { configs: configs.collect(), clock, buckets: Default::default() }
	}

	/// Takes one token or reports how long to wait; never blocks.
	pub fn acquire(
		&self,
		org: &OrgId,
		platform: Platform,
		category: EndpointCategory,
	) -> Result<(), WouldBlock> {
		let bucket = self.bucket(&BucketKey::new(org, platform, category));

		bucket.lock().take(self.clock.now())
	}

	/// Blocks the bucket until `until`, typically from a platform `Retry-After` hint.
	pub fn throttle(
		&self,
		org: &OrgId,
		platform: Platform,
		category: EndpointCategory,
		until: OffsetDateTime,
	) {
		let bucket = self.bucket(&BucketKey::new(org, platform, category));
		let mut bucket = bucket.lock();

		if bucket.blocked_until.is_none_or(|current| current < until) {
			bucket.blocked_until = Some(until);
		}
	}

	fn bucket(&self, key: &BucketKey) -> Arc<Mutex<Bucket>> {
		let mut buckets = self.buckets.lock();

		buckets
			.entry(key.clone())
			.or_insert_with(|| {
				let config = self
					.configs
					.get(&key.platform)
					.map(|limits| limits.bucket(key.category))
					.unwrap_or_default();

				Arc::new(Mutex::new(Bucket::new(config, self.clock.now())))
			})
			.clone()
	}
}
