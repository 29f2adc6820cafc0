//! Caller-facing client: construction, call options, and the per-call pipeline.
//!
//! An [`AdPlatformClient`] is an explicit handle, built once at process start and cloned
//! freely. It owns the token manager, one circuit breaker per (organization, platform), and
//! one token bucket per (organization, platform, endpoint category); there is no global state.

mod executor;
mod operations;
mod pagination;

pub use executor::ApiResponse;
pub use pagination::{Page, PageCursor, PageStream};

// crates.io
use tokio_util::sync::CancellationToken;
// self
use crate::{
	_prelude::*,
	auth::{OrgId, Platform},
	clock::{Clock, SystemClock},
	config::ClientConfig,
	error::ConfigError,
	http::Transport,
	platform::PlatformApp,
	resilience::{BreakerRegistry, BreakerSnapshot, RateLimiter},
	store::{CredentialKey, CredentialStore},
	token::TokenManager,
};

/// How the executor reacts when the rate limiter has no slot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Urgency {
	/// Fail fast with [`Error::RateLimited`].
	#[default]
	Interactive,
	/// Wait out the limiter's `retry_after` and try again.
	Background,
}

/// Per-call policy.
#[derive(Clone, Debug, Default)]
pub struct CallOptions {
	/// Rate-limit behavior.
	pub urgency: Urgency,
	/// Ceiling for the whole logical operation, on top of per-attempt timeouts.
	pub deadline: Option<Duration>,
	/// Token that aborts the operation, including the in-flight HTTP call.
	pub cancellation: Option<CancellationToken>,
}
impl CallOptions {
	/// Interactive call: rate limits fail fast.
	pub fn interactive() -> Self {
		Self::default()
	}

	/// Background call: rate limits are waited out.
	pub fn background() -> Self {
		Self { urgency: Urgency::Background, ..Self::default() }
	}

	/// Sets the operation deadline.
	pub fn with_deadline(mut self, deadline: Duration) -> Self {
		self.deadline = Some(deadline);

		self
	}

	/// Attaches a cancellation token.
	pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
		self.cancellation = Some(token);

		self
	}
}

/// Resilient API client for the registered ad platforms.
#[derive(Clone, Debug)]
pub struct AdPlatformClient(Arc<ClientInner>);
impl AdPlatformClient {
	/// Starts building a client backed by `store`.
	pub fn builder(store: Arc<dyn CredentialStore>) -> ClientBuilder {
		ClientBuilder::new(store)
	}

	/// Token manager, for the connect and disconnect flows.
	pub fn tokens(&self) -> &TokenManager {
		&self.0.tokens
	}

	/// Read-only view of the breaker guarding one connection.
	///
	/// `None` until the connection makes its first call.
	pub fn breaker_snapshot(&self, org: &OrgId, platform: Platform) -> Option<BreakerSnapshot> {
		self.0.breakers.snapshot(&CredentialKey::new(org, platform))
	}

	/// Active configuration.
	pub fn config(&self) -> &ClientConfig {
		&self.0.config
	}
}

struct ClientInner {
	apps: Arc<HashMap<Platform, PlatformApp>>,
	config: ClientConfig,
	transport: Arc<dyn Transport>,
	clock: Arc<dyn Clock>,
	tokens: TokenManager,
	breakers: BreakerRegistry,
	limiter: RateLimiter,
}
impl ClientInner {
	fn app(&self, platform: Platform) -> Result<&PlatformApp, ConfigError> {
		self.apps.get(&platform).ok_or(ConfigError::UnregisteredPlatform { platform })
	}
}
impl Debug for ClientInner {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ClientInner")
			.field("apps", &self.apps)
			.field("config", &self.config)
			.field("clock", &self.clock)
			.field("tokens", &self.tokens)
			.field("breakers", &self.breakers)
			.field("limiter", &self.limiter)
			.finish_non_exhaustive()
	}
}

/// Builder for [`AdPlatformClient`].
pub struct ClientBuilder {
	store: Arc<dyn CredentialStore>,
	apps: HashMap<Platform, PlatformApp>,
	config: ClientConfig,
	transport: Option<Arc<dyn Transport>>,
	clock: Option<Arc<dyn Clock>>,
}
impl ClientBuilder {
	fn new(store: Arc<dyn CredentialStore>) -> Self {
		Self {
			store,
			apps: HashMap::new(),
			config: ClientConfig::default(),
			transport: None,
			clock: None,
		}
	}

	/// Registers the OAuth application for one platform, replacing any earlier registration.
	pub fn register(mut self, app: PlatformApp) -> Self {
		self.apps.insert(app.platform(), app);

		self
	}

	/// Replaces the default configuration.
	pub fn config(mut self, config: ClientConfig) -> Self {
		self.config = config;

		self
	}

	/// Uses `transport` for every outbound call.
	pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
		self.transport = Some(transport);

		self
	}

	/// Uses `clock` for expiry, refill, cooldown, and backoff.
	pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = Some(clock);

		self
	}

	/// Validates the configuration and assembles the client.
	pub fn build(self) -> Result<AdPlatformClient> {
		self.config.validate()?;

		if self.apps.is_empty() {
			return Err(
				ConfigError::invalid("at least one platform application must be registered").into()
			);
		}

		let transport = match self.transport {
			Some(transport) => transport,
			None => default_transport()?,
		};
		let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
		let apps = Arc::new(self.apps);
		let tokens = TokenManager::new(
			self.store,
			apps.clone(),
			transport.clone(),
			clock.clone(),
			self.config.token_refresh_margin(),
		);
		let breakers = BreakerRegistry::new(&self.config, clock.clone());
		let limiter = RateLimiter::new(&self.config, clock.clone());

		Ok(AdPlatformClient(Arc::new(ClientInner {
			apps,
			config: self.config,
			transport,
			clock,
			tokens,
			breakers,
			limiter,
		})))
	}
}
impl Debug for ClientBuilder {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ClientBuilder")
			.field("apps", &self.apps)
			.field("config", &self.config)
			.field("transport_set", &self.transport.is_some())
			.field("clock", &self.clock)
			.finish()
	}
}

#[cfg(feature = "reqwest")]
fn default_transport() -> Result<Arc<dyn Transport>, ConfigError> {
	Ok(Arc::new(crate::http::ReqwestTransport::new()?))
}

#[cfg(not(feature = "reqwest"))]
fn default_transport() -> Result<Arc<dyn Transport>, ConfigError> {
	Err(ConfigError::invalid("no transport was supplied and the `reqwest` feature is disabled"))
}
