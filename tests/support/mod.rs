//! Fixtures shared by the integration tests: a scripted client on a manual clock.

#![allow(dead_code)]

// std
use std::sync::Arc;
// crates.io
use adplatform_client::{
	AdPlatformClient,
	auth::{AccountId, Credential, OrgId, Platform},
	clock::{Clock, ManualClock},
	config::ClientConfig,
	http::{Reply, ScriptedTransport},
	platform::{PlatformApp, PlatformDescriptor},
	request::{DateRange, InsightLevel, InsightsRequest},
	store::MemoryStore,
};
use time::{Duration, OffsetDateTime, macros};

pub const META_INSIGHTS: &str = "/insights";
pub const META_ACCOUNTS: &str = "/adaccounts";
pub const META_TOKEN: &str = "/oauth/access_token";
pub const GOOGLE_SEARCH: &str = "googleAds:search";
pub const GOOGLE_CUSTOMERS: &str = "listAccessibleCustomers";
pub const GOOGLE_TOKEN: &str = "oauth2.googleapis.com/token";

pub struct Harness {
	pub client: AdPlatformClient,
	pub transport: Arc<ScriptedTransport>,
	pub clock: ManualClock,
	pub store: Arc<MemoryStore>,
}
impl Harness {
	pub fn new(config: ClientConfig) -> Self {
		let meta = PlatformApp::new(
			PlatformDescriptor::meta("v21.0").expect("Meta descriptor should build."),
			"meta-client",
		)
		.with_client_secret("meta-secret");
		let google = PlatformApp::new(
			PlatformDescriptor::google_ads("v18", "dev-token")
				.expect("Google Ads descriptor should build."),
			"google-client",
		)
		.with_client_secret("google-secret");
		let store = Arc::new(MemoryStore::default());
		let transport = Arc::new(ScriptedTransport::new());
		let clock = ManualClock::new(start());
		let client = AdPlatformClient::builder(store.clone())
			.register(meta)
			.register(google)
			.config(config)
			.transport(transport.clone())
			.clock(Arc::new(clock.clone()))
			.build()
			.expect("Client should build.");

		Self { client, transport, clock, store }
	}

	/// Stores a credential for `org` whose access token expires `expires_in` from now.
	pub async fn seed(&self, org: &OrgId, platform: Platform, expires_in: Duration) {
		let now = self.clock.now();
		let credential = Credential::builder(org.clone(), platform)
			.access_token("token-1")
			.refresh_token("refresh-1")
			.issued_at(now - Duration::hours(1))
			.expires_at(now + expires_in)
			.build()
			.expect("Credential fixture should build.");

		self.client
			.tokens()
			.import_credential(credential)
			.await
			.expect("Credential import should succeed.");
	}

	/// Seeds a long-lived credential.
	pub async fn connect(&self, org: &OrgId, platform: Platform) {
		self.seed(org, platform, Duration::hours(1)).await;
	}
}

pub fn start() -> OffsetDateTime {
	macros::datetime!(2025-03-01 12:00 UTC)
}

/// Configuration without jitter so backoff delays are exact.
pub fn config() -> ClientConfig {
	let mut config = ClientConfig::default();

	config.meta.retry.jitter = false;
	config.google_ads.retry.jitter = false;

	config
}

pub fn org() -> OrgId {
	OrgId::new("org-1").expect("Org fixture should be valid.")
}

pub fn meta_account() -> AccountId {
	AccountId::for_platform(Platform::Meta, "act_123").expect("Meta account should be valid.")
}

pub fn google_account() -> AccountId {
	AccountId::for_platform(Platform::GoogleAds, "123-456-7890")
		.expect("Google Ads account should be valid.")
}

pub fn insights_request(account: AccountId) -> InsightsRequest {
	let range = DateRange::new(macros::date!(2025-02-01), macros::date!(2025-02-07))
		.expect("Date range should be valid.");

	InsightsRequest::new(account, InsightLevel::Campaign, range)
}

/// Meta insights page with one campaign row; `after` adds a continuation cursor.
pub fn meta_insights_page(campaign: &str, after: Option<&str>) -> Reply {
	let mut body = serde_json::json!({
		"data": [{
			"account_id": "123",
			"campaign_id": campaign,
			"campaign_name": format!("Campaign {campaign}"),
			"impressions": "1000",
			"clicks": "25",
			"spend": "12.50",
			"date_start": "2025-02-01",
			"date_stop": "2025-02-07"
		}]
	});

	if let Some(after) = after {
		body["paging"] = serde_json::json!({
			"cursors": { "before": "start", "after": after },
			"next": format!("https://graph.facebook.com/v21.0/act_123/insights?after={after}")
		});
	}

	Reply::json(200, body)
}

/// Google Ads search page with one campaign row.
pub fn google_search_page(campaign: u64, next: Option<&str>) -> Reply {
	let mut body = serde_json::json!({
		"results": [{
			"customer": { "id": "1234567890" },
			"campaign": { "id": campaign.to_string(), "name": format!("Campaign {campaign}") },
			"metrics": { "impressions": "500", "clicks": "10", "costMicros": "2500000" }
		}]
	});

	if let Some(next) = next {
		body["nextPageToken"] = serde_json::Value::String(next.to_owned());
	}

	Reply::json(200, body)
}

pub fn token_reply(access_token: &str) -> Reply {
	Reply::json(
		200,
		serde_json::json!({
			"access_token": access_token,
			"token_type": "Bearer",
			"expires_in": 3600
		}),
	)
}
