// std
use std::net::IpAddr;
// crates.io
use oauth2::http::{HeaderName, HeaderValue};
use url::Host;
// self
use crate::{
	_prelude::*,
	auth::{Platform, ScopeSet, ScopeValidationError},
	platform::{ClientAuthMethod, PlatformDescriptor, PlatformEndpoints, PlatformQuirks},
};

/// Errors raised while constructing or validating descriptors.
#[derive(Debug, PartialEq, Eq, ThisError)]
pub enum DescriptorError {
	/// Authorization endpoint is required to connect organizations.
	#[error("Missing authorization endpoint.")]
	MissingAuthorizationEndpoint,
	/// Token endpoint is mandatory.
	#[error("Missing token endpoint.")]
	MissingTokenEndpoint,
	/// API base URL is mandatory.
	#[error("Missing API base URL.")]
	MissingApiBase,
	/// Endpoints must use HTTPS unless they point at a loopback host.
	#[error("The {endpoint} endpoint must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Endpoint URL that failed validation.
		url: String,
	},
	/// A stock descriptor URL could not be parsed.
	#[error("Descriptor URL `{url}` is invalid.")]
	InvalidUrl {
		/// URL that failed to parse.
		url: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// API version strings may only contain ASCII letters, digits, and dots.
	#[error("API version `{version}` is invalid.")]
	InvalidVersion {
		/// Offending version string.
		version: String,
	},
	/// Static API header is not a valid HTTP header.
	#[error("API header `{name}` is invalid.")]
	InvalidHeader {
		/// Offending header name.
		name: String,
	},
	/// Reject scope delimiters that are control characters.
	#[error("Scope delimiter must be a printable character.")]
	InvalidScopeDelimiter {
		/// Invalid delimiter that was supplied.
		delimiter: char,
	},
	/// Default scopes failed validation.
	#[error(transparent)]
	Scope(#[from] ScopeValidationError),
}

/// Builder for [`PlatformDescriptor`] values.
#[derive(Debug)]
pub struct PlatformDescriptorBuilder {
	/// Platform the descriptor targets.
	pub platform: Platform,
	/// Authorization endpoint.
	pub authorization_endpoint: Option<Url>,
	/// Token endpoint used for exchanges and refreshes.
	pub token_endpoint: Option<Url>,
	/// Versioned API root.
	pub api_base: Option<Url>,
	/// Client authentication method for the token endpoint.
	pub client_auth_method: ClientAuthMethod,
	/// Static API headers.
	pub api_headers: BTreeMap<String, String>,
	/// Scopes requested when connecting an organization.
	pub default_scopes: ScopeSet,
	/// Platform-specific quirks.
	pub quirks: PlatformQuirks,
}
impl PlatformDescriptorBuilder {
	/// Creates a new builder for `platform`.
	pub fn new(platform: Platform) -> Self {
		Self {
			platform,
			authorization_endpoint: None,
			token_endpoint: None,
			api_base: None,
			client_auth_method: ClientAuthMethod::default(),
			api_headers: BTreeMap::new(),
			default_scopes: ScopeSet::default(),
			quirks: PlatformQuirks::default(),
		}
	}

	/// Sets the authorization endpoint.
	pub fn authorization_endpoint(mut self, url: Url) -> Self {
		self.authorization_endpoint = Some(url);

		self
	}

	/// Sets the token endpoint.
	pub fn token_endpoint(mut self, url: Url) -> Self {
		self.token_endpoint = Some(url);

		self
	}

	/// Sets the versioned API root; a trailing `/` is added when missing.
	pub fn api_base(mut self, mut url: Url) -> Self {
		if !url.path().ends_with('/') {
			let path = format!("{}/", url.path());

			url.set_path(&path);
		}

		self.api_base = Some(url);

		self
	}

	/// Overrides the client authentication method.
	pub fn client_auth_method(mut self, method: ClientAuthMethod) -> Self {
		self.client_auth_method = method;

		self
	}

	/// Adds a static header sent with every API request.
	pub fn api_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.api_headers.insert(name.into().to_ascii_lowercase(), value.into());

		self
	}

	/// Sets the scopes requested when connecting an organization.
	pub fn default_scopes(mut self, scopes: ScopeSet) -> Self {
		self.default_scopes = scopes;

		self
	}

	/// Overrides the platform quirks.
	pub fn quirks(mut self, quirks: PlatformQuirks) -> Self {
		self.quirks = quirks;

		self
	}

	/// Consumes the builder and validates the resulting descriptor.
	pub fn build(self) -> Result<PlatformDescriptor, DescriptorError> {
		let authorization =
			self.authorization_endpoint.ok_or(DescriptorError::MissingAuthorizationEndpoint)?;
		let token = self.token_endpoint.ok_or(DescriptorError::MissingTokenEndpoint)?;
		let api_base = self.api_base.ok_or(DescriptorError::MissingApiBase)?;
		let descriptor = PlatformDescriptor {
			platform: self.platform,
			endpoints: PlatformEndpoints { authorization, token, api_base },
			client_auth_method: self.client_auth_method,
			api_headers: self.api_headers,
			default_scopes: self.default_scopes,
			quirks: self.quirks,
		};

		descriptor.validate()?;

		Ok(descriptor)
	}
}

impl PlatformDescriptor {
	fn validate(&self) -> Result<(), DescriptorError> {
		validate_endpoint("authorization", &self.endpoints.authorization)?;
		validate_endpoint("token", &self.endpoints.token)?;
		validate_endpoint("api", &self.endpoints.api_base)?;

		for (name, value) in &self.api_headers {
			if HeaderName::try_from(name.as_str()).is_err()
				|| HeaderValue::try_from(value.as_str()).is_err()
			{
				return Err(DescriptorError::InvalidHeader { name: name.clone() });
			}
		}

		if self.quirks.scope_delimiter.is_control() {
			return Err(DescriptorError::InvalidScopeDelimiter {
				delimiter: self.quirks.scope_delimiter,
			});
		}

		Ok(())
	}
}

fn validate_endpoint(name: &'static str, url: &Url) -> Result<(), DescriptorError> {
	match url.scheme() {
		"https" => Ok(()),
		"http" if is_loopback(url) => Ok(()),
		_ => Err(DescriptorError::InsecureEndpoint { endpoint: name, url: url.to_string() }),
	}
}

fn is_loopback(url: &Url) -> bool {
	match url.host() {
		Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
		Some(Host::Ipv4(ip)) => IpAddr::V4(ip).is_loopback(),
		Some(Host::Ipv6(ip)) => IpAddr::V6(ip).is_loopback(),
		None => false,
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn url(raw: &str) -> Url {
		Url::parse(raw).expect("URL fixture should parse.")
	}

	fn builder(base: &str) -> PlatformDescriptorBuilder {
		PlatformDescriptor::builder(Platform::Meta)
			.authorization_endpoint(url("https://auth.example.com/authorize"))
			.token_endpoint(url("https://auth.example.com/token"))
			.api_base(url(base))
	}

	#[test]
	fn loopback_http_is_allowed_but_remote_http_is_not() {
		let local =
			builder("http://127.0.0.1:8080/v1").build().expect("Loopback HTTP should be accepted.");

		assert_eq!(local.endpoints.api_base.as_str(), "http://127.0.0.1:8080/v1/");
		assert!(builder("http://localhost/v1").build().is_ok());

		let err = builder("http://api.example.com/v1")
			.build()
			.expect_err("Remote plain HTTP must be rejected.");

		assert!(matches!(err, DescriptorError::InsecureEndpoint { endpoint: "api", .. }));
	}

	#[test]
	fn missing_endpoints_and_bad_headers_fail() {
		let err = PlatformDescriptor::builder(Platform::GoogleAds)
			.token_endpoint(url("https://auth.example.com/token"))
			.build()
			.expect_err("Missing authorization endpoint must be rejected.");

		assert_eq!(err, DescriptorError::MissingAuthorizationEndpoint);

		let err = builder("https://api.example.com/v1")
			.api_header("developer-token", "line\nbreak")
			.build()
			.expect_err("Header values with newlines must be rejected.");

		assert!(matches!(err, DescriptorError::InvalidHeader { .. }));
	}
}
