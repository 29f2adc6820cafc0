//! Platform descriptors: endpoints, static API headers, and behavioral quirks.
//!
//! Stock descriptors for Meta and Google Ads are available through
//! [`PlatformDescriptor::meta`] and [`PlatformDescriptor::google_ads`]; anything else (staging
//! hosts, local mocks) goes through [`PlatformDescriptor::builder`].

/// Builder API for assembling platform descriptors.
pub mod builder;
/// Platform-specific quirk toggles.
pub mod quirks;

pub use builder::*;
pub use quirks::*;

// self
use crate::{
	_prelude::*,
	auth::{Platform, ScopeSet},
};

const META_SCOPES: [&str; 2] = ["ads_read", "business_management"];
const GOOGLE_ADS_SCOPE: &str = "https://www.googleapis.com/auth/adwords";

/// Client authentication modes for token endpoint calls.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
	#[default]
	/// HTTP Basic with `client_id`/`client_secret`.
	ClientSecretBasic,
	/// Form POST body parameters for `client_id`/`client_secret`.
	ClientSecretPost,
}

/// Endpoint set declared by a platform descriptor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformEndpoints {
	/// Authorization endpoint users are redirected to when connecting an organization.
	pub authorization: Url,
	/// Token endpoint used for code exchanges and refreshes.
	pub token: Url,
	/// Versioned API root that request paths are joined onto; always ends with `/`.
	pub api_base: Url,
}

/// Immutable platform descriptor consumed by the token manager and request builders.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformDescriptor {
	/// Platform the descriptor targets.
	pub platform: Platform,
	/// Endpoint definitions.
	pub endpoints: PlatformEndpoints,
	/// Client authentication mechanism for the token endpoint.
	pub client_auth_method: ClientAuthMethod,
	/// Static headers attached to every API request (e.g. the Google Ads `developer-token`).
	pub api_headers: BTreeMap<String, String>,
	/// Scopes requested when connecting an organization.
	pub default_scopes: ScopeSet,
	/// Platform-specific quirks.
	pub quirks: PlatformQuirks,
}
impl PlatformDescriptor {
	/// Creates a new builder for the provided platform.
	pub fn builder(platform: Platform) -> PlatformDescriptorBuilder {
		PlatformDescriptorBuilder::new(platform)
	}

	/// Stock descriptor for the Meta Marketing API at `version` (e.g. `v21.0`).
	pub fn meta(version: &str) -> Result<Self, DescriptorError> {
		validate_version(version)?;

		let scopes = ScopeSet::new(META_SCOPES).map_err(DescriptorError::from)?;
		let dialog = format!("https://www.facebook.com/{version}/dialog/oauth");
		let graph = format!("https://graph.facebook.com/{version}");

		Self::builder(Platform::Meta)
			.authorization_endpoint(parse(dialog)?)
			.token_endpoint(parse(format!("{graph}/oauth/access_token"))?)
			.api_base(parse(format!("{graph}/"))?)
			.client_auth_method(ClientAuthMethod::ClientSecretPost)
			.default_scopes(scopes)
			.quirks(PlatformQuirks::meta())
			.build()
	}

	/// Stock descriptor for the Google Ads API at `version` (e.g. `v18`).
	pub fn google_ads(version: &str, developer_token: &str) -> Result<Self, DescriptorError> {
		validate_version(version)?;

		let scopes = ScopeSet::new([GOOGLE_ADS_SCOPE]).map_err(DescriptorError::from)?;

		Self::builder(Platform::GoogleAds)
			.authorization_endpoint(parse("https://accounts.google.com/o/oauth2/v2/auth".into())?)
			.token_endpoint(parse("https://oauth2.googleapis.com/token".into())?)
			.api_base(parse(format!("https://googleads.googleapis.com/{version}/"))?)
			.client_auth_method(ClientAuthMethod::ClientSecretPost)
			.api_header("developer-token", developer_token)
			.default_scopes(scopes)
			.quirks(PlatformQuirks::google_ads())
			.build()
	}

	/// Resolves an API path (without leading slash) against the versioned base URL.
	///
	/// Paths such as `customers:listAccessibleCustomers` would parse as an absolute URL with a
	/// `customers` scheme, so the path is always joined as `./<path>`.
	pub fn api_url(&self, path: &str) -> Result<Url, url::ParseError> {
		self.endpoints.api_base.join(&format!("./{}", path.trim_start_matches('/')))
	}
}

fn parse(raw: String) -> Result<Url, DescriptorError> {
	Url::parse(&raw).map_err(|source| DescriptorError::InvalidUrl { url: raw, source })
}

fn validate_version(version: &str) -> Result<(), DescriptorError> {
	if version.is_empty() || !version.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'.') {
		return Err(DescriptorError::InvalidVersion { version: version.to_owned() });
	}

	Ok(())
}
