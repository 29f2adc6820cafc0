//! Token lifecycle manager: cached credentials, single-flight refresh, and the connect flow.
//!
//! [`TokenManager::get_valid_token`] answers from the in-memory cache while the access token is
//! outside the refresh margin. Otherwise the caller takes the per-connection flight lock,
//! re-reads the cache (another caller may have refreshed meanwhile), and only then performs a
//! `grant_type=refresh_token` exchange. The refreshed credential replaces the cached one before
//! it is persisted through the [`CredentialStore`].
//!
//! A refresh answered with `invalid_grant` marks the credential revoked and persists that
//! state, so later calls fail with [`AuthError::ReauthRequired`] without touching the network.

mod metrics;
mod session;

pub use metrics::RefreshMetrics;
pub use session::{AuthorizationSession, PkceCodeChallengeMethod};

// self
use crate::{
	_prelude::*,
	auth::{Credential, OrgId, Platform, ScopeSet, TokenSecret},
	clock::Clock,
	error::{AuthError, ConfigError},
	http::Transport,
	oauth::TokenEndpoint,
	obs::{self, RefreshOutcome},
	platform::PlatformApp,
	store::{CredentialKey, CredentialStore},
};
use session::PendingAuthorization;

/// Obtains, caches, and refreshes OAuth credentials per (organization, platform).
pub struct TokenManager {
	store: Arc<dyn CredentialStore>,
	apps: Arc<HashMap<Platform, PlatformApp>>,
	transport: Arc<dyn Transport>,
	clock: Arc<dyn Clock>,
	margin: Duration,
	cache: RwLock<HashMap<CredentialKey, Credential>>,
	flights: Mutex<HashMap<CredentialKey, Arc<AsyncMutex<()>>>>,
	sessions: Mutex<HashMap<String, PendingAuthorization>>,
	metrics: RefreshMetrics,
}
impl TokenManager {
	pub(crate) fn new(
		store: Arc<dyn CredentialStore>,
		apps: Arc<HashMap<Platform, PlatformApp>>,
		transport: Arc<dyn Transport>,
		clock: Arc<dyn Clock>,
		margin: Duration,
	) -> Self {
		Self {
			store,
			apps,
			transport,
			clock,
			margin,
			cache: Default::default(),
			flights: Default::default(),
			sessions: Default::default(),
			metrics: Default::default(),
		}
	}

	/// Returns an access token that stays valid for at least the refresh margin.
	///
	/// Concurrent callers for the same expiring credential share one refresh exchange.
	pub async fn get_valid_token(&self, org: &OrgId, platform: Platform) -> Result<TokenSecret> {
		let key = CredentialKey::new(org, platform);

		if let Some(token) = self.usable_cached(&key)? {
			return Ok(token);
		}

		let flight = self.flight(&key);
		let _singleflight = flight.lock().await;
		let current = self.load(&key).await?;

		if !current.needs_refresh(self.clock.now(), self.margin) {
			return Ok(current.access_token);
		}

		Ok(self.refresh_locked(current).await?.access_token)
	}

	/// Forces one refresh after the platform rejected `rejected` with 401/403.
	///
	/// When another caller already replaced the rejected token, that newer token is returned
	/// without a second exchange.
	pub async fn refresh_after_rejection(
		&self,
		org: &OrgId,
		platform: Platform,
		rejected: &TokenSecret,
	) -> Result<TokenSecret> {
		let key = CredentialKey::new(org, platform);
		let flight = self.flight(&key);
		let _singleflight = flight.lock().await;
		let current = self.load(&key).await?;

		if current.access_token != *rejected
			&& !current.needs_refresh(self.clock.now(), self.margin)
		{
			return Ok(current.access_token);
		}

		Ok(self.refresh_locked(current).await?.access_token)
	}

	/// Starts connecting `org` to `platform` with an Authorization Code + PKCE flow.
	///
	/// `scope` defaults to the descriptor's default scopes.
	pub fn start_authorization(
		&self,
		org: OrgId,
		platform: Platform,
		redirect_uri: Url,
		scope: Option<ScopeSet>,
	) -> Result<AuthorizationSession> {
		let app = self.app(platform)?;
		let scope = scope.unwrap_or_else(|| app.descriptor.default_scopes.clone());
		let now = self.clock.now();
		let (session, pending) = session::build_session(app, org, scope, redirect_uri, now);
		let mut sessions = self.sessions.lock();

		sessions.retain(|_, pending| !pending.is_expired(now));
		sessions.insert(session.state.clone(), pending);

		Ok(session)
	}

	/// Completes the connect flow with the `state` and `code` from the redirect.
	///
	/// Unknown, reused, or expired `state` values fail with [`AuthError::StateMismatch`].
	pub async fn complete_authorization(&self, state: &str, code: &str) -> Result<Credential> {
		let now = self.clock.now();
		let pending = self
			.sessions
			.lock()
			.remove(state)
			.filter(|pending| !pending.is_expired(now))
			.ok_or(AuthError::StateMismatch)?;
		let app = self.app(pending.platform)?;
		let endpoint = TokenEndpoint::new(app, self.transport.clone(), self.clock.clone())?;
		let grant = endpoint
			.exchange_code(&pending.org, code, &pending.verifier, &pending.redirect_uri)
			.await?;
		let issued_at = self.clock.now();
		let mut builder = Credential::builder(pending.org.clone(), pending.platform)
			.access_token(grant.access_token.expose())
			.scope(grant.scope.unwrap_or(pending.scope))
			.issued_at(issued_at)
			.expires_in(grant.expires_in);

		if let Some(refresh) = &grant.refresh_token {
			builder = builder.refresh_token(refresh.expose());
		}

		let credential = builder.build().map_err(ConfigError::from)?;

		self.import_credential(credential.clone()).await?;
		obs::trace_refresh(pending.platform, &pending.org, true);

		Ok(credential)
	}

	/// Seeds or replaces a credential obtained elsewhere.
	pub async fn import_credential(&self, credential: Credential) -> Result<()> {
		let key = CredentialKey::of(&credential);

		self.cache.write().insert(key, credential.clone());
		self.store.put(credential).await?;

		Ok(())
	}

	/// Deletes the stored credential and forgets the cached copy.
	///
	/// Returns `true` when a credential existed.
	pub async fn disconnect(&self, org: &OrgId, platform: Platform) -> Result<bool> {
		let key = CredentialKey::new(org, platform);
		let cached = self.cache.write().remove(&key).is_some();
		let stored = self.store.delete(org, platform).await?;

		Ok(cached || stored)
	}

	/// Refresh counters.
	pub fn refresh_metrics(&self) -> &RefreshMetrics {
		&self.metrics
	}

	fn usable_cached(&self, key: &CredentialKey) -> Result<Option<TokenSecret>> {
		let cache = self.cache.read();
		let Some(credential) = cache.get(key) else {
			return Ok(None);
		};

		if credential.is_revoked() {
			return Err(revoked(credential).into());
		}
		if credential.needs_refresh(self.clock.now(), self.margin) {
			return Ok(None);
		}

		Ok(Some(credential.access_token.clone()))
	}

	async fn load(&self, key: &CredentialKey) -> Result<Credential> {
		let cached = self.cache.read().get(key).cloned();
		let credential = match cached {
			Some(credential) => credential,
			None => {
				let stored = self.store.get(&key.org, key.platform).await?.ok_or_else(|| {
					AuthError::MissingCredential { org: key.org.clone(), platform: key.platform }
				})?;

				self.cache.write().insert(key.clone(), stored.clone());

				stored
			},
		};

		if credential.is_revoked() {
			return Err(revoked(&credential).into());
		}

		Ok(credential)
	}

	async fn refresh_locked(&self, current: Credential) -> Result<Credential> {
		let platform = current.platform;
		let Some(refresh_token) = current.refresh_token.clone() else {
			return Err(AuthError::ReauthRequired {
				org: current.org.clone(),
				platform,
				reason: "the access token expired and no refresh token is stored".into(),
			}
			.into());
		};
		let app = self.app(platform)?;
		let endpoint = TokenEndpoint::new(app, self.transport.clone(), self.clock.clone())?;

		self.metrics.record_attempt();
		obs::record_refresh_outcome(platform, RefreshOutcome::Attempt);

		let refreshed = endpoint.refresh(&current.org, &refresh_token).await.and_then(|grant| {
			current.rotate(grant, self.clock.now()).map_err(|e| ConfigError::from(e).into())
		});

		match refreshed {
			Ok(updated) => {
				self.cache.write().insert(CredentialKey::of(&updated), updated.clone());
				self.metrics.record_success();
				obs::record_refresh_outcome(platform, RefreshOutcome::Success);
				obs::trace_refresh(platform, &current.org, true);
				self.store.put(updated.clone()).await?;

				Ok(updated)
			},
			Err(err) => {
				obs::trace_refresh(platform, &current.org, false);

				if matches!(&err, Error::Auth(AuthError::ReauthRequired { .. })) {
					let mut revoked = current;

					revoked.revoke(self.clock.now());
					self.cache.write().insert(CredentialKey::of(&revoked), revoked.clone());
					self.metrics.record_revoked();
					obs::record_refresh_outcome(platform, RefreshOutcome::Revoked);

					// The reauthorization error matters more than a failed revocation write.
					if let Err(e) = self.store.put(revoked.clone()).await {
						obs::trace_store_write_failure(platform, &revoked.org, &e);
					}
				} else {
					self.metrics.record_failure();
					obs::record_refresh_outcome(platform, RefreshOutcome::Failure);
				}

				Err(err)
			},
		}
	}

	fn flight(&self, key: &CredentialKey) -> Arc<AsyncMutex<()>> {
		let mut flights = self.flights.lock();

		flights.entry(key.clone()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
	}

	fn app(&self, platform: Platform) -> Result<&PlatformApp, ConfigError> {
		self.apps.get(&platform).ok_or(ConfigError::UnregisteredPlatform { platform })
	}
}
impl Debug for TokenManager {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenManager")
			.field("platforms", &self.apps.keys().collect::<Vec<_>>())
			.field("margin", &self.margin)
			.field("cached", &self.cache.read().len())
			.field("metrics", &self.metrics)
			.finish()
	}
}

fn revoked(credential: &Credential) -> AuthError {
	AuthError::ReauthRequired {
		org: credential.org.clone(),
		platform: credential.platform,
		reason: "the refresh token was revoked".into(),
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;
	use crate::{
		clock::ManualClock,
		http::{Reply, ScriptedTransport},
		platform::PlatformDescriptor,
		store::{MemoryStore, StoreError, StoreFuture},
	};

	struct Fixture {
		manager: Arc<TokenManager>,
		store: Arc<MemoryStore>,
		transport: Arc<ScriptedTransport>,
		clock: ManualClock,
	}

	fn fixture() -> Fixture {
		let descriptor = PlatformDescriptor::google_ads("v18", "dev-token")
			.expect("Google Ads descriptor should build.");
		let app = PlatformApp::new(descriptor, "client-id").with_client_secret("client-secret");
		let apps = Arc::new(HashMap::from([(Platform::GoogleAds, app)]));
		let store = Arc::new(MemoryStore::default());
		let transport = Arc::new(ScriptedTransport::new());
		let clock = ManualClock::new(macros::datetime!(2025-03-01 12:00 UTC));
		let manager = Arc::new(TokenManager::new(
			store.clone(),
			apps,
			transport.clone(),
			Arc::new(clock.clone()),
			Duration::seconds(60),
		));

		Fixture { manager, store, transport, clock }
	}

	fn org() -> OrgId {
		OrgId::new("org-1").expect("Org fixture should be valid.")
	}

	fn credential(clock: &ManualClock, expires_in: Duration) -> Credential {
		Credential::builder(org(), Platform::GoogleAds)
			.access_token("stale")
			.refresh_token("refresh-1")
			.issued_at(clock.now() - Duration::hours(1))
			.expires_at(clock.now() + expires_in)
			.build()
			.expect("Credential fixture should build.")
	}

	fn fresh_token_reply() -> Reply {
		Reply::json(
			200,
			serde_json::json!({
				"access_token": "fresh",
				"token_type": "Bearer",
				"expires_in": 3600
			}),
		)
	}

	#[tokio::test]
	async fn expired_credential_refreshes_once_and_persists() {
		let Fixture { manager, store, transport, clock } = fixture();

		manager
			.import_credential(credential(&clock, Duration::seconds(-1)))
			.await
			.expect("Import should succeed.");
		transport.route("/token", [fresh_token_reply()]);

		let token = manager
			.get_valid_token(&org(), Platform::GoogleAds)
			.await
			.expect("Refresh should succeed.");

		assert_eq!(token.expose(), "fresh");
		assert_eq!(transport.calls("/token"), 1);

		let stored =
			store.snapshot(&org(), Platform::GoogleAds).expect("Refreshed credential is stored.");

		assert_eq!(stored.access_token.expose(), "fresh");
		assert_eq!(
			stored.refresh_token.as_ref().map(TokenSecret::expose),
			Some("refresh-1"),
			"Omitted refresh tokens are carried over."
		);
		assert_eq!(stored.expires_at, clock.now() + Duration::hours(1));

		manager.get_valid_token(&org(), Platform::GoogleAds).await.expect("Cached token is valid.");

		assert_eq!(transport.calls("/token"), 1, "A valid cached token needs no exchange.");
		assert_eq!(manager.refresh_metrics().attempts(), 1);
	}

	#[tokio::test]
	async fn tokens_inside_the_margin_are_refreshed_early() {
		let Fixture { manager, transport, clock, .. } = fixture();

		manager
			.import_credential(credential(&clock, Duration::seconds(30)))
			.await
			.expect("Import should succeed.");
		transport.route("/token", [fresh_token_reply()]);

		let token = manager
			.get_valid_token(&org(), Platform::GoogleAds)
			.await
			.expect("Refresh should succeed.");

		assert_eq!(token.expose(), "fresh");
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn concurrent_callers_share_one_refresh() {
		let Fixture { manager, transport, clock, .. } = fixture();

		manager
			.import_credential(credential(&clock, Duration::seconds(-1)))
			.await
			.expect("Import should succeed.");
		transport.route(
			"/token",
			[fresh_token_reply().delayed(std::time::Duration::from_millis(50))],
		);

		let handles = (0..16)
			.map(|_| {
				let manager = manager.clone();

				tokio::spawn(
					async move { manager.get_valid_token(&org(), Platform::GoogleAds).await },
				)
			})
			.collect::<Vec<_>>();

		for handle in handles {
			let token =
				handle.await.expect("Task should not panic.").expect("Token should resolve.");

			assert_eq!(token.expose(), "fresh");
		}

		assert_eq!(transport.calls("/token"), 1);
	}

	#[tokio::test]
	async fn invalid_grant_revokes_and_stops_further_exchanges() {
		let Fixture { manager, store, transport, clock } = fixture();

		manager
			.import_credential(credential(&clock, Duration::seconds(-1)))
			.await
			.expect("Import should succeed.");
		transport.route(
			"/token",
			[Reply::json(400, serde_json::json!({ "error": "invalid_grant" }))],
		);

		for _ in 0..2 {
			let err = manager
				.get_valid_token(&org(), Platform::GoogleAds)
				.await
				.expect_err("Revoked credentials must fail.");

			assert!(matches!(err, Error::Auth(AuthError::ReauthRequired { .. })), "{err:?}");
		}

		assert_eq!(transport.calls("/token"), 1);
		assert!(
			store.snapshot(&org(), Platform::GoogleAds).is_some_and(|stored| stored.is_revoked())
		);
		assert_eq!(manager.refresh_metrics().revocations(), 1);
	}

	#[tokio::test]
	async fn failed_revocation_writes_still_require_reauthorization() {
		struct RevocationRejectingStore(MemoryStore);
		impl CredentialStore for RevocationRejectingStore {
			fn get<'a>(
				&'a self,
				org: &'a OrgId,
				platform: Platform,
			) -> StoreFuture<'a, Option<Credential>> {
				self.0.get(org, platform)
			}

			fn put(&self, credential: Credential) -> StoreFuture<'_, ()> {
				if credential.is_revoked() {
					return Box::pin(async {
						Err(StoreError::Backend { message: "vault unreachable".into() })
					});
				}

				self.0.put(credential)
			}

			fn delete<'a>(&'a self, org: &'a OrgId, platform: Platform) -> StoreFuture<'a, bool> {
				self.0.delete(org, platform)
			}
		}

		let Fixture { manager, transport, clock, .. } = fixture();
		let store = Arc::new(RevocationRejectingStore(MemoryStore::default()));
		let manager = TokenManager::new(
			store.clone(),
			manager.apps.clone(),
			transport.clone(),
			Arc::new(clock.clone()),
			Duration::seconds(60),
		);

		manager
			.import_credential(credential(&clock, Duration::seconds(-1)))
			.await
			.expect("Import should succeed.");
		transport.route(
			"/token",
			[Reply::json(400, serde_json::json!({ "error": "invalid_grant" }))],
		);

		let err = manager
			.get_valid_token(&org(), Platform::GoogleAds)
			.await
			.expect_err("Revoked credentials must fail.");

		assert!(matches!(err, Error::Auth(AuthError::ReauthRequired { .. })), "{err:?}");
		let stored = store.0.snapshot(&org(), Platform::GoogleAds);

		assert!(
			stored.is_some_and(|stored| !stored.is_revoked()),
			"The rejected write leaves the stored copy untouched."
		);

		manager
			.get_valid_token(&org(), Platform::GoogleAds)
			.await
			.expect_err("The cached revocation still short-circuits.");

		assert_eq!(transport.calls("/token"), 1);
		assert_eq!(manager.refresh_metrics().revocations(), 1);
	}

	#[tokio::test]
	async fn missing_credentials_require_authorization() {
		let Fixture { manager, transport, .. } = fixture();
		let err = manager
			.get_valid_token(&org(), Platform::GoogleAds)
			.await
			.expect_err("Unknown connections must fail.");

		assert!(matches!(err, Error::Auth(AuthError::MissingCredential { .. })), "{err:?}");
		assert_eq!(transport.total_calls(), 0);

		let err = manager
			.get_valid_token(&org(), Platform::Meta)
			.await
			.expect_err("Unregistered platforms must fail.");

		assert!(matches!(err, Error::Auth(_) | Error::Config(_)), "{err:?}");
	}

	#[tokio::test]
	async fn rejection_refresh_skips_when_already_replaced() {
		let Fixture { manager, transport, clock, .. } = fixture();

		manager
			.import_credential(credential(&clock, Duration::hours(1)))
			.await
			.expect("Import should succeed.");
		transport.route("/token", [fresh_token_reply()]);

		let rejected = TokenSecret::new("stale");
		let first = manager
			.refresh_after_rejection(&org(), Platform::GoogleAds, &rejected)
			.await
			.expect("Forced refresh should succeed.");
		let second = manager
			.refresh_after_rejection(&org(), Platform::GoogleAds, &rejected)
			.await
			.expect("Second caller reuses the replacement.");

		assert_eq!(first.expose(), "fresh");
		assert_eq!(second.expose(), "fresh");
		assert_eq!(transport.calls("/token"), 1);
	}

	#[tokio::test]
	async fn connect_flow_validates_state_and_stores_the_credential() {
		let Fixture { manager, store, transport, clock } = fixture();
		let redirect = Url::parse("https://app.example.com/callback").expect("URL should parse.");
		let session = manager
			.start_authorization(org(), Platform::GoogleAds, redirect, None)
			.expect("Session should start.");

		transport.route(
			"/token",
			[Reply::json(
				200,
				serde_json::json!({
					"access_token": "granted",
					"refresh_token": "refresh-granted",
					"token_type": "Bearer",
					"expires_in": 3600
				}),
			)],
		);

		let err = manager
			.complete_authorization("forged", "code")
			.await
			.expect_err("Unknown state must be rejected.");

		assert!(matches!(err, Error::Auth(AuthError::StateMismatch)));
		assert_eq!(transport.total_calls(), 0);

		let credential = manager
			.complete_authorization(&session.state, "code-123")
			.await
			.expect("Exchange should succeed.");

		assert_eq!(credential.access_token.expose(), "granted");
		assert_eq!(credential.expires_at, clock.now() + Duration::hours(1));
		assert!(store.snapshot(&org(), Platform::GoogleAds).is_some());

		let body = transport.requests()[0].body_text();

		assert!(body.contains("grant_type=authorization_code"));
		assert!(body.contains("code=code-123"));
		assert!(body.contains("code_verifier="));

		let replay = manager
			.complete_authorization(&session.state, "code-123")
			.await
			.expect_err("A state value is single-use.");

		assert!(matches!(replay, Error::Auth(AuthError::StateMismatch)));
	}

	#[tokio::test]
	async fn expired_sessions_are_rejected() {
		let Fixture { manager, clock, .. } = fixture();
		let redirect = Url::parse("https://app.example.com/callback").expect("URL should parse.");
		let session = manager
			.start_authorization(org(), Platform::GoogleAds, redirect, None)
			.expect("Session should start.");

		clock.advance(Duration::hours(1));

		let err = manager
			.complete_authorization(&session.state, "code")
			.await
			.expect_err("Expired sessions must be rejected.");

		assert!(matches!(err, Error::Auth(AuthError::StateMismatch)));
	}

	#[tokio::test]
	async fn disconnect_forgets_the_credential() {
		let Fixture { manager, store, clock, .. } = fixture();

		manager
			.import_credential(credential(&clock, Duration::hours(1)))
			.await
			.expect("Import should succeed.");

		assert!(manager.disconnect(&org(), Platform::GoogleAds).await.expect("Disconnect works."));
		assert!(store.snapshot(&org(), Platform::GoogleAds).is_none());
		assert!(!manager.disconnect(&org(), Platform::GoogleAds).await.expect("Disconnect works."));
	}
}
