// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{Rng, distr::Alphanumeric};
use sha2::{Digest, Sha256};
// self
use crate::{
	_prelude::*,
	auth::{OrgId, Platform, ScopeSet},
	platform::PlatformApp,
};

const STATE_LEN: usize = 32;
const PKCE_VERIFIER_LEN: usize = 64;

/// Pending authorizations older than this are treated as unknown.
pub(super) const SESSION_TTL: Duration = Duration::minutes(15);

/// Supported PKCE challenge methods surfaced via [`AuthorizationSession`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PkceCodeChallengeMethod {
	/// SHA-256 based PKCE (RFC 7636 S256).
	S256,
}
impl PkceCodeChallengeMethod {
	/// Returns the RFC 7636 identifier for the challenge method.
	pub fn as_str(self) -> &'static str {
		match self {
			PkceCodeChallengeMethod::S256 => "S256",
		}
	}
}

/// Connect-flow handshake returned by
/// [`TokenManager::start_authorization`](crate::token::TokenManager::start_authorization).
///
/// Send the user to [`authorize_url`](Self::authorize_url); the redirect handler passes the
/// returned `state` and `code` to
/// [`TokenManager::complete_authorization`](crate::token::TokenManager::complete_authorization).
#[derive(Clone, Debug)]
pub struct AuthorizationSession {
	/// Organization being connected.
	pub org: OrgId,
	/// Platform being connected.
	pub platform: Platform,
	/// Requested scopes.
	pub scope: ScopeSet,
	/// Opaque state value that must round-trip via the redirect handler.
	pub state: String,
	/// Redirect URI registered with the platform application.
	pub redirect_uri: Url,
	/// Authorize URL the end-user must visit.
	pub authorize_url: Url,
	code_challenge: String,
}
impl AuthorizationSession {
	/// PKCE code challenge derived from the secret verifier.
	pub fn code_challenge(&self) -> &str {
		&self.code_challenge
	}

	/// PKCE challenge method (always `S256`).
	pub fn code_challenge_method(&self) -> PkceCodeChallengeMethod {
		PkceCodeChallengeMethod::S256
	}
}

/// Server-side half of a session, keyed by `state` until the redirect arrives.
#[derive(Clone)]
pub(super) struct PendingAuthorization {
	pub(super) org: OrgId,
	pub(super) platform: Platform,
	pub(super) scope: ScopeSet,
	pub(super) redirect_uri: Url,
	pub(super) verifier: String,
	pub(super) created_at: OffsetDateTime,
}
impl PendingAuthorization {
	pub(super) fn is_expired(&self, now: OffsetDateTime) -> bool {
		now - self.created_at > SESSION_TTL
	}
}

pub(super) fn build_session(
	app: &PlatformApp,
	org: OrgId,
	scope: ScopeSet,
	redirect_uri: Url,
	now: OffsetDateTime,
) -> (AuthorizationSession, PendingAuthorization) {
	let state = random_string(STATE_LEN);
	let verifier = random_string(PKCE_VERIFIER_LEN);
	let code_challenge = compute_pkce_challenge(&verifier);
	let authorize_url = build_authorize_url(app, &redirect_uri, &scope, &state, &code_challenge);
	let pending = PendingAuthorization {
		org: org.clone(),
		platform: app.platform(),
		scope: scope.clone(),
		redirect_uri: redirect_uri.clone(),
		verifier,
		created_at: now,
	};
	let session = AuthorizationSession {
		org,
		platform: app.platform(),
		scope,
		state,
		redirect_uri,
		authorize_url,
		code_challenge,
	};

	(session, pending)
}

fn build_authorize_url(
	app: &PlatformApp,
	redirect_uri: &Url,
	scope: &ScopeSet,
	state: &str,
	code_challenge: &str,
) -> Url {
	let descriptor = &app.descriptor;
	let mut url = descriptor.endpoints.authorization.clone();
	let mut pairs = url.query_pairs_mut();

	pairs.append_pair("response_type", "code");
	pairs.append_pair("client_id", &app.client_id);
	pairs.append_pair("redirect_uri", redirect_uri.as_str());

	if let Some(scope_value) = scope.joined(descriptor.quirks.scope_delimiter) {
		pairs.append_pair("scope", &scope_value);
	}

	pairs.append_pair("state", state);
	pairs.append_pair("code_challenge", code_challenge);
	pairs.append_pair("code_challenge_method", PkceCodeChallengeMethod::S256.as_str());

	for (name, value) in &descriptor.quirks.authorize_params {
		pairs.append_pair(name, value);
	}

	drop(pairs);

	url
}

fn random_string(len: usize) -> String {
	rand::rng().sample_iter(Alphanumeric).take(len).map(char::from).collect()
}

fn compute_pkce_challenge(verifier: &str) -> String {
	let digest = Sha256::digest(verifier.as_bytes());

	URL_SAFE_NO_PAD.encode(digest)
}
