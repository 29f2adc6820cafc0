//! Per-organization platform credential, its lifecycle helpers, and builder.

// self
use crate::{
	_prelude::*,
	auth::{AccountId, OrgId, Platform, ScopeSet, TokenSecret},
	oauth::TokenGrant,
};

/// Current lifecycle status for a credential.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CredentialStatus {
	/// Access token is valid and outside the refresh margin.
	Active,
	/// Access token is still valid but inside the refresh margin.
	ExpiringSoon,
	/// Access token reached its expiry instant.
	Expired,
	/// The refresh token was rejected; the organization must re-authorize.
	Revoked,
}

/// Errors produced by [`CredentialBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum CredentialBuilderError {
	/// Issued when no access token value was provided.
	#[error("Access token is required.")]
	MissingAccessToken,
	/// Issued when no expiry (absolute or relative) was configured.
	#[error("Expiry must be supplied via expires_at or expires_in.")]
	MissingExpiry,
	/// Issued when the expiry precedes the issued-at instant.
	#[error("Expiry must not precede the issued-at instant.")]
	ExpiryBeforeIssue,
	/// Issued when the relative expiry lands outside the representable date range.
	#[error("Expiry is out of the supported date range.")]
	ExpiryOutOfRange,
}

/// OAuth credential for one (organization, platform) connection.
///
/// The token manager owns the in-memory copy; the credential store owns the persisted one. A
/// credential whose `expires_at` is at or before the current instant is never used to sign a
/// request.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credential {
	/// Organization that owns the connection.
	pub org: OrgId,
	/// Platform the credential was issued by.
	pub platform: Platform,
	/// Ad account associated with the connection, if one was selected.
	pub account: Option<AccountId>,
	/// Access token secret.
	pub access_token: TokenSecret,
	/// Refresh token secret, if the platform issued one.
	pub refresh_token: Option<TokenSecret>,
	/// Scopes granted by the platform.
	pub scope: ScopeSet,
	/// Instant the access token was issued.
	pub issued_at: OffsetDateTime,
	/// Instant the access token expires.
	pub expires_at: OffsetDateTime,
	/// Instant the refresh token was found revoked, if ever.
	pub revoked_at: Option<OffsetDateTime>,
}
impl Credential {
	/// Returns a builder for the provided connection.
	pub fn builder(org: OrgId, platform: Platform) -> CredentialBuilder {
		CredentialBuilder::new(org, platform)
	}

	/// Computes the lifecycle status at `instant`, treating tokens that expire within `margin`
	/// as [`CredentialStatus::ExpiringSoon`].
	pub fn status_at(&self, instant: OffsetDateTime, margin: Duration) -> CredentialStatus {
		if self.revoked_at.is_some() {
			return CredentialStatus::Revoked;
		}
		if instant >= self.expires_at {
			return CredentialStatus::Expired;
		}
		if self.expires_at - instant <= margin {
			return CredentialStatus::ExpiringSoon;
		}

		CredentialStatus::Active
	}

	/// Returns `true` when the access token must be refreshed before use.
	pub fn needs_refresh(&self, instant: OffsetDateTime, margin: Duration) -> bool {
		matches!(
			self.status_at(instant, margin),
			CredentialStatus::ExpiringSoon | CredentialStatus::Expired
		)
	}

	/// Returns `true` if the credential has been revoked.
	pub fn is_revoked(&self) -> bool {
		self.revoked_at.is_some()
	}

	/// Marks the credential as revoked.
	pub fn revoke(&mut self, instant: OffsetDateTime) {
		self.revoked_at = Some(instant);
	}

	/// Produces the successor credential after a refresh.
	///
	/// The refresh token and scopes are carried over when the token endpoint omits them.
	pub fn rotate(
		&self,
		grant: TokenGrant,
		issued_at: OffsetDateTime,
	) -> Result<Credential, CredentialBuilderError> {
		let expires_at = issued_at
			.checked_add(grant.expires_in)
			.ok_or(CredentialBuilderError::ExpiryOutOfRange)?;

		Ok(Credential {
			org: self.org.clone(),
			platform: self.platform,
			account: self.account.clone(),
			access_token: grant.access_token,
			refresh_token: grant.refresh_token.or_else(|| self.refresh_token.clone()),
			scope: grant.scope.unwrap_or_else(|| self.scope.clone()),
			issued_at,
			expires_at,
			revoked_at: None,
		})
	}
}
impl Debug for Credential {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Credential")
			.field("org", &self.org)
			.field("platform", &self.platform)
			.field("account", &self.account)
			.field("access_token", &"<redacted>")
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("scope", &self.scope)
			.field("issued_at", &self.issued_at)
			.field("expires_at", &self.expires_at)
			.field("revoked_at", &self.revoked_at)
			.finish()
	}
}

/// Builder for [`Credential`].
#[derive(Clone, Debug)]
pub struct CredentialBuilder {
	org: OrgId,
	platform: Platform,
	account: Option<AccountId>,
	access_token: Option<TokenSecret>,
	refresh_token: Option<TokenSecret>,
	scope: ScopeSet,
	issued_at: Option<OffsetDateTime>,
	expires_at: Option<OffsetDateTime>,
	expires_in: Option<Duration>,
}
impl CredentialBuilder {
	fn new(org: OrgId, platform: Platform) -> Self {
		Self {
			org,
			platform,
			account: None,
			access_token: None,
			refresh_token: None,
			scope: ScopeSet::default(),
			issued_at: None,
			expires_at: None,
			expires_in: None,
		}
	}

	/// Associates an ad account with the credential.
	pub fn account(mut self, account: AccountId) -> Self {
		self.account = Some(account);

		self
	}

	/// Provides the access token value.
	pub fn access_token(mut self, token: impl Into<String>) -> Self {
		self.access_token = Some(TokenSecret::new(token));

		self
	}

	/// Provides the refresh token value.
	pub fn refresh_token(mut self, token: impl Into<String>) -> Self {
		self.refresh_token = Some(TokenSecret::new(token));

		self
	}

	/// Sets the granted scopes.
	pub fn scope(mut self, scope: ScopeSet) -> Self {
		self.scope = scope;

		self
	}

	/// Sets the issued-at instant.
	pub fn issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = Some(instant);

		self
	}

	/// Sets an absolute expiry instant.
	pub fn expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.expires_at = Some(instant);

		self
	}

	/// Sets a relative expiry duration from the issued instant.
	pub fn expires_in(mut self, duration: Duration) -> Self {
		self.expires_in = Some(duration);

		self
	}

	/// Consumes the builder and produces a [`Credential`].
	pub fn build(self) -> Result<Credential, CredentialBuilderError> {
		let access_token = self.access_token.ok_or(CredentialBuilderError::MissingAccessToken)?;
		let issued_at = self.issued_at.unwrap_or_else(OffsetDateTime::now_utc);
		let expires_at = match (self.expires_at, self.expires_in) {
			(Some(instant), _) => instant,
			(None, Some(delta)) =>
				issued_at.checked_add(delta).ok_or(CredentialBuilderError::ExpiryOutOfRange)?,
			(None, None) => return Err(CredentialBuilderError::MissingExpiry),
		};

		if expires_at < issued_at {
			return Err(CredentialBuilderError::ExpiryBeforeIssue);
		}

		Ok(Credential {
			org: self.org,
			platform: self.platform,
			account: self.account,
			access_token,
			refresh_token: self.refresh_token,
			scope: self.scope,
			issued_at,
			expires_at,
			revoked_at: None,
		})
	}
}
