//! Token endpoint facade built on the `oauth2` crate.
//!
//! [`TokenEndpoint`] performs the two grants the client needs, `refresh_token` and
//! `authorization_code` (with a PKCE verifier), over the shared [`Transport`] and maps every
//! failure into the client taxonomy with the help of the platform's
//! [`PlatformStrategy`](crate::platform::PlatformStrategy).

pub use oauth2;

// std
use std::borrow::Cow;
// crates.io
use oauth2::{
	AuthType, AuthUrl, AuthorizationCode, ClientId, ClientSecret, EndpointNotSet, EndpointSet,
	HttpClientError, PkceCodeVerifier, RedirectUrl, RefreshToken, RequestTokenError,
	TokenResponse, TokenUrl,
	basic::{BasicClient, BasicErrorResponse, BasicRequestTokenError, BasicTokenResponse},
};
// self
use crate::{
	_prelude::*,
	auth::{OrgId, ScopeSet, TokenSecret},
	clock::Clock,
	error::{AuthError, ConfigError, TransientError, TransportError, ValidationError},
	http::{OAuthHttpClient, ResponseMetadata, ResponseMetadataSlot, Transport},
	platform::{ClientAuthMethod, PlatformApp, TokenErrorContext, TokenErrorKind},
	request::OperationKind,
};

type ConfiguredBasicClient =
	BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// OAuth 2.0 grant types used by the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
	/// Authorization Code grant with PKCE, used when connecting an organization.
	AuthorizationCode,
	/// Refresh Token grant, used to renew expiring access tokens.
	RefreshToken,
}
impl GrantType {
	/// Returns the RFC 6749 identifier for the grant type.
	pub fn as_str(self) -> &'static str {
		match self {
			GrantType::AuthorizationCode => "authorization_code",
			GrantType::RefreshToken => "refresh_token",
		}
	}

	fn operation(self) -> OperationKind {
		match self {
			GrantType::AuthorizationCode => OperationKind::ExchangeCode,
			GrantType::RefreshToken => OperationKind::RefreshToken,
		}
	}
}
impl Display for GrantType {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Tokens returned by a successful grant.
#[derive(Clone, Debug)]
pub struct TokenGrant {
	/// New access token.
	pub access_token: TokenSecret,
	/// Rotated refresh token, when the platform issued one.
	pub refresh_token: Option<TokenSecret>,
	/// Lifetime of the access token.
	pub expires_in: Duration,
	/// Scopes echoed by the platform, when present.
	pub scope: Option<ScopeSet>,
}

/// Token endpoint client for one registered platform application.
pub(crate) struct TokenEndpoint<'a> {
	app: &'a PlatformApp,
	transport: Arc<dyn Transport>,
	clock: Arc<dyn Clock>,
	oauth_client: ConfiguredBasicClient,
}
impl<'a> TokenEndpoint<'a> {
	pub(crate) fn new(
		app: &'a PlatformApp,
		transport: Arc<dyn Transport>,
		clock: Arc<dyn Clock>,
	) -> Result<Self> {
		let descriptor = &app.descriptor;
		let auth_url = AuthUrl::new(descriptor.endpoints.authorization.to_string())
			.map_err(|source| ConfigError::InvalidDescriptor { source })?;
		let token_url = TokenUrl::new(descriptor.endpoints.token.to_string())
			.map_err(|source| ConfigError::InvalidDescriptor { source })?;
		let mut oauth_client = BasicClient::new(ClientId::new(app.client_id.clone()))
			.set_auth_uri(auth_url)
			.set_token_uri(token_url);

		if let Some(secret) = &app.client_secret {
			oauth_client =
				oauth_client.set_client_secret(ClientSecret::new(secret.expose().to_owned()));
		}
		if matches!(descriptor.client_auth_method, ClientAuthMethod::ClientSecretPost) {
			oauth_client = oauth_client.set_auth_type(AuthType::RequestBody);
		}

		Ok(Self { app, transport, clock, oauth_client })
	}

	/// Performs a `grant_type=refresh_token` exchange.
	pub(crate) async fn refresh(
		&self,
		org: &OrgId,
		refresh_token: &TokenSecret,
	) -> Result<TokenGrant> {
		let meta = ResponseMetadataSlot::default();
		let http = self.http_client(meta.clone());
		let secret = RefreshToken::new(refresh_token.expose().to_owned());
		let response = self
			.oauth_client
			.exchange_refresh_token(&secret)
			.request_async(&http)
			.await
			.map_err(|err| {
				self.map_request_error(org, GrantType::RefreshToken, meta.take(), err)
			})?;

		self.map_token_response(response)
	}

	/// Performs a `grant_type=authorization_code` exchange with a PKCE verifier.
	pub(crate) async fn exchange_code(
		&self,
		org: &OrgId,
		code: &str,
		pkce_verifier: &str,
		redirect_uri: &Url,
	) -> Result<TokenGrant> {
		let meta = ResponseMetadataSlot::default();
		let http = self.http_client(meta.clone());
		let redirect_url = RedirectUrl::new(redirect_uri.to_string())
			.map_err(|source| ConfigError::InvalidDescriptor { source })?;
		let response = self
			.oauth_client
			.exchange_code(AuthorizationCode::new(code.to_owned()))
			.set_pkce_verifier(PkceCodeVerifier::new(pkce_verifier.to_owned()))
			.set_redirect_uri(Cow::Owned(redirect_url))
			.request_async(&http)
			.await
			.map_err(|err| {
				self.map_request_error(org, GrantType::AuthorizationCode, meta.take(), err)
			})?;

		self.map_token_response(response)
	}

	fn http_client(&self, slot: ResponseMetadataSlot) -> OAuthHttpClient {
		OAuthHttpClient::new(self.transport.clone(), self.clock.clone(), slot)
	}

	fn map_token_response(&self, response: BasicTokenResponse) -> Result<TokenGrant> {
		let quirks = &self.app.descriptor.quirks;
		let expires_in = match response.expires_in() {
			Some(lifetime) =>
				i64::try_from(lifetime.as_secs()).map_err(|_| ConfigError::ExpiresInOutOfRange)?,
			None => quirks.default_token_lifetime.whole_seconds(),
		};

		let expires_in = Duration::seconds(expires_in);

		if !expires_in.is_positive() || self.clock.now().checked_add(expires_in).is_none() {
			return Err(ConfigError::ExpiresInOutOfRange.into());
		}

		// The token response is split on spaces; Meta's comma-joined grants are re-split here.
		let delimiter = quirks.scope_delimiter.to_string();
		let scope = response
			.scopes()
			.map(|scopes| {
				let raw = scopes.iter().map(|scope| scope.as_str()).collect::<Vec<_>>();

				ScopeSet::parse_delimited(&raw.join(&delimiter), quirks.scope_delimiter)
			})
			.transpose()
			.map_err(ValidationError::from)?;

		Ok(TokenGrant {
			access_token: TokenSecret::new(response.access_token().secret().to_owned()),
			refresh_token: response
				.refresh_token()
				.map(|token| TokenSecret::new(token.secret().to_owned())),
			expires_in,
			scope,
		})
	}

	fn map_request_error(
		&self,
		org: &OrgId,
		grant: GrantType,
		meta: Option<ResponseMetadata>,
		err: BasicRequestTokenError<HttpClientError<TransportError>>,
	) -> Error {
		let meta = meta.unwrap_or_default();
		let platform = self.app.platform();

		match err {
			RequestTokenError::ServerResponse(response) =>
				self.map_server_response(org, grant, &response, &meta),
			RequestTokenError::Request(error) => match error {
				HttpClientError::Reqwest(inner) => TransientError::Network {
					operation: grant.operation(),
					platform,
					source: *inner,
				}
				.into(),
				HttpClientError::Http(inner) => ConfigError::from(inner).into(),
				HttpClientError::Io(inner) => TransientError::Network {
					operation: grant.operation(),
					platform,
					source: TransportError::Io(inner),
				}
				.into(),
				HttpClientError::Other(message) => TransientError::TokenEndpoint {
					message: format!("HTTP client error: {message}"),
					status: meta.status,
					retry_after: meta.retry_after,
				}
				.into(),
				_ => TransientError::TokenEndpoint {
					message: "HTTP client error".into(),
					status: meta.status,
					retry_after: meta.retry_after,
				}
				.into(),
			},
			RequestTokenError::Parse(source, body) => match meta.status {
				// Error statuses with non-standard bodies are classified from the body text.
				Some(status) if status >= 400 => {
					let ctx = TokenErrorContext::new(platform, grant)
						.with_http_status(status)
						.with_body_preview(String::from_utf8_lossy(&body));

					self.classify(org, &ctx, &meta, format!("status {status}"))
				},
				status => TransientError::ResponseParse { source, status }.into(),
			},
			RequestTokenError::Other(message) => TransientError::TokenEndpoint {
				message,
				status: meta.status,
				retry_after: meta.retry_after,
			}
			.into(),
		}
	}

	fn map_server_response(
		&self,
		org: &OrgId,
		grant: GrantType,
		response: &BasicErrorResponse,
		meta: &ResponseMetadata,
	) -> Error {
		let mut ctx = TokenErrorContext::new(self.app.platform(), grant)
			.with_oauth_error(response.error().as_ref());

		if let Some(description) = response.error_description() {
			ctx = ctx.with_error_description(description.as_str());
		}
		if let Some(status) = meta.status {
			ctx = ctx.with_http_status(status);
		}

		let message = match response.error_description() {
			Some(description) => format!("{}: {description}", response.error().as_ref()),
			None => response.error().as_ref().to_owned(),
		};

		self.classify(org, &ctx, meta, message)
	}

	fn classify(
		&self,
		org: &OrgId,
		ctx: &TokenErrorContext,
		meta: &ResponseMetadata,
		message: String,
	) -> Error {
		let platform = self.app.platform();

		match self.app.strategy.classify_token_error(ctx) {
			TokenErrorKind::InvalidGrant | TokenErrorKind::InsufficientScope =>
				AuthError::ReauthRequired { org: org.clone(), platform, reason: message }.into(),
			TokenErrorKind::InvalidClient =>
				AuthError::InvalidClient { platform, reason: message }.into(),
			TokenErrorKind::Transient => TransientError::TokenEndpoint {
				message,
				status: meta.status,
				retry_after: meta.retry_after,
			}
			.into(),
		}
	}
}
