//! Thread-safe in-memory [`CredentialStore`] for local development and tests.

// self
use crate::{
	_prelude::*,
	auth::{Credential, OrgId, Platform},
	store::{CredentialKey, CredentialStore, StoreFuture},
};

type StoreMap = Arc<RwLock<HashMap<CredentialKey, Credential>>>;

/// Storage backend that keeps credentials in-process.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(StoreMap);
impl MemoryStore {
	/// Number of stored credentials.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns `true` when no credential is stored.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}

	/// Synchronous lookup for assertions in tests and demos.
	pub fn snapshot(&self, org: &OrgId, platform: Platform) -> Option<Credential> {
		self.0.read().get(&CredentialKey::new(org, platform)).cloned()
	}
}
impl CredentialStore for MemoryStore {
	fn get<'a>(
		&'a self,
		org: &'a OrgId,
		platform: Platform,
	) -> StoreFuture<'a, Option<Credential>> {
		let found = self.snapshot(org, platform);

		Box::pin(async move { Ok(found) })
	}

	fn put(&self, credential: Credential) -> StoreFuture<'_, ()> {
		let map = self.0.clone();

		Box::pin(async move {
			map.write().insert(CredentialKey::of(&credential), credential);

			Ok(())
		})
	}

	fn delete<'a>(&'a self, org: &'a OrgId, platform: Platform) -> StoreFuture<'a, bool> {
		let map = self.0.clone();
		let key = CredentialKey::new(org, platform);

		Box::pin(async move { Ok(map.write().remove(&key).is_some()) })
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[tokio::test]
	async fn put_get_delete_cycle() {
		let store = MemoryStore::default();
		let org = OrgId::new("org-1").expect("Org fixture should be valid.");
		let credential = Credential::builder(org.clone(), Platform::Meta)
			.access_token("access")
			.expires_in(Duration::hours(1))
			.build()
			.expect("Credential fixture should build.");

		store.put(credential).await.expect("Put should succeed.");

		assert_eq!(store.len(), 1);
		assert!(
			store.get(&org, Platform::GoogleAds).await.expect("Get should succeed.").is_none(),
			"Platforms must not share credentials."
		);

		let fetched = store
			.get(&org, Platform::Meta)
			.await
			.expect("Get should succeed.")
			.expect("Credential should be present.");

		assert_eq!(fetched.access_token.expose(), "access");
		assert!(store.delete(&org, Platform::Meta).await.expect("Delete should succeed."));
		assert!(!store.delete(&org, Platform::Meta).await.expect("Delete should succeed."));
		assert!(store.is_empty());
	}
}
