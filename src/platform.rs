//! Platform-facing descriptors (data), strategies (behavior), and registered applications.
//!
//! `descriptor` exposes validated metadata ([`PlatformDescriptor`]) covering HTTPS-only
//! endpoints, static API headers, and quirks (scope delimiter, authorize parameters, default
//! token lifetime). `strategy` defines [`PlatformStrategy`], an HTTP-client-agnostic hook used
//! by the token endpoint and the executor to classify platform responses.

pub mod descriptor;
pub mod strategy;

pub use descriptor::*;
pub use strategy::*;

pub use crate::auth::Platform;

// self
use crate::{_prelude::*, auth::TokenSecret};

/// OAuth application registered with one platform.
///
/// Bundles the descriptor with the client credentials and the strategy used to classify
/// responses, so the token manager and executor can look everything up by [`Platform`].
#[derive(Clone)]
pub struct PlatformApp {
	/// Platform descriptor that defines endpoints and quirks.
	pub descriptor: PlatformDescriptor,
	/// OAuth 2.0 client identifier used in every grant.
	pub client_id: String,
	/// Optional client secret for confidential authentication methods.
	pub client_secret: Option<TokenSecret>,
	/// Strategy responsible for platform-specific classification.
	pub strategy: Arc<dyn PlatformStrategy>,
}
impl PlatformApp {
	/// Creates an application with the platform's stock strategy.
	pub fn new(descriptor: PlatformDescriptor, client_id: impl Into<String>) -> Self {
		let strategy: Arc<dyn PlatformStrategy> = match descriptor.platform {
			Platform::Meta => Arc::new(MetaStrategy),
			Platform::GoogleAds => Arc::new(DefaultPlatformStrategy),
		};

		Self { descriptor, client_id: client_id.into(), client_secret: None, strategy }
	}

	/// Sets or replaces the client secret.
	pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
		self.client_secret = Some(TokenSecret::new(secret));

		self
	}

	/// Replaces the classification strategy.
	pub fn with_strategy(mut self, strategy: Arc<dyn PlatformStrategy>) -> Self {
		self.strategy = strategy;

		self
	}

	/// Platform the application is registered with.
	pub fn platform(&self) -> Platform {
		self.descriptor.platform
	}
}
impl Debug for PlatformApp {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("PlatformApp")
			.field("descriptor", &self.descriptor)
			.field("client_id", &self.client_id)
			.field("client_secret_set", &self.client_secret.is_some())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn debug_hides_client_secret() {
		let descriptor = PlatformDescriptor::meta("v21.0").expect("Meta descriptor should build.");
		let app = PlatformApp::new(descriptor, "app-id").with_client_secret("app-secret");
		let rendered = format!("{app:?}");

		assert!(rendered.contains("client_secret_set: true"));
		assert!(!rendered.contains("app-secret"));
		assert_eq!(app.platform(), Platform::Meta);
	}
}
