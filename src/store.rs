//! Credential store adapter contract and the built-in in-memory implementation.
//!
//! The client treats the store as a thin key-value facade over an external secret store:
//! credentials are read with [`CredentialStore::get`], persisted after every successful refresh
//! or authorization with [`CredentialStore::put`], and removed on disconnect with
//! [`CredentialStore::delete`]. Encryption at rest is the backend's concern.

pub mod memory;

pub use memory::MemoryStore;

// self
use crate::{
	_prelude::*,
	auth::{Credential, OrgId, Platform},
};

/// Boxed future returned by [`CredentialStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Key-value contract over the external secret store, keyed by (organization, platform).
pub trait CredentialStore
where
	Self: Send + Sync,
{
	/// Fetches the credential for the connection, if present.
	fn get<'a>(&'a self, org: &'a OrgId, platform: Platform)
	-> StoreFuture<'a, Option<Credential>>;

	/// Persists or replaces the credential under its own (organization, platform) key.
	fn put(&self, credential: Credential) -> StoreFuture<'_, ()>;

	/// Removes the credential; resolves to `true` when something was deleted.
	fn delete<'a>(&'a self, org: &'a OrgId, platform: Platform) -> StoreFuture<'a, bool>;
}

/// Error type produced by [`CredentialStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

/// Unique key identifying a stored credential.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CredentialKey {
	/// Organization component.
	pub org: OrgId,
	/// Platform component.
	pub platform: Platform,
}
impl CredentialKey {
	/// Builds a key for the provided connection.
	pub fn new(org: &OrgId, platform: Platform) -> Self {
		Self { org: org.clone(), platform }
	}

	/// Builds the key a credential is stored under.
	pub fn of(credential: &Credential) -> Self {
		Self::new(&credential.org, credential.platform)
	}
}
impl Display for CredentialKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "{}/{}", self.org, self.platform)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn store_error_converts_into_client_error_with_source() {
		let store_error = StoreError::Backend { message: "vault unreachable".into() };
		let error: Error = store_error.clone().into();

		assert!(matches!(error, Error::Storage(_)));
		assert!(error.to_string().contains("vault unreachable"));

		let source = StdError::source(&error)
			.expect("Client error should expose the original store error as its source.");

		assert_eq!(source.to_string(), store_error.to_string());
	}

	#[test]
	fn keys_render_org_and_platform() {
		let key = CredentialKey::new(
			&OrgId::new("org-7").expect("Org fixture should be valid."),
			Platform::GoogleAds,
		);

		assert_eq!(key.to_string(), "org-7/google_ads");
	}
}
