#![cfg(feature = "reqwest")]

// std
use std::sync::Arc;
// crates.io
use adplatform_client::{
	AdPlatformClient, CallOptions, Error,
	auth::{AccountId, Credential, OrgId, Platform, ScopeSet},
	error::ValidationError,
	http::ReqwestTransport,
	platform::{ClientAuthMethod, PlatformApp, PlatformDescriptor, PlatformQuirks},
	request::GaqlQuery,
	store::MemoryStore,
	url::Url,
};
use httpmock::prelude::*;
use time::{Duration, OffsetDateTime};

const SEARCH_PATH: &str = "/v18/customers/1234567890/googleAds:search";

fn descriptor(server: &MockServer) -> PlatformDescriptor {
	let endpoint = |path: &str| Url::parse(&server.url(path)).expect("Mock URL should parse.");

	PlatformDescriptor::builder(Platform::GoogleAds)
		.authorization_endpoint(endpoint("/authorize"))
		.token_endpoint(endpoint("/token"))
		.api_base(endpoint("/v18/"))
		.client_auth_method(ClientAuthMethod::ClientSecretPost)
		.api_header("developer-token", "dev-token")
		.default_scopes(
			ScopeSet::new(["https://www.googleapis.com/auth/adwords"])
				.expect("Scope fixture should be valid."),
		)
		.quirks(PlatformQuirks::google_ads())
		.build()
		.expect("Loopback descriptor should build.")
}

async fn client(server: &MockServer, expires_in: Duration) -> (AdPlatformClient, Arc<MemoryStore>) {
	let store = Arc::new(MemoryStore::default());
	let app = PlatformApp::new(descriptor(server), "google-client")
		.with_client_secret("google-secret");
	let client = AdPlatformClient::builder(store.clone())
		.register(app)
		.transport(Arc::new(ReqwestTransport::new().expect("Reqwest client should build.")))
		.build()
		.expect("Client should build.");
	let now = OffsetDateTime::now_utc();
	let credential = Credential::builder(org(), Platform::GoogleAds)
		.access_token("access-old")
		.refresh_token("refresh-old")
		.issued_at(now - Duration::hours(1))
		.expires_at(now + expires_in)
		.build()
		.expect("Credential fixture should build.");

	client.tokens().import_credential(credential).await.expect("Import should succeed.");

	(client, store)
}

fn org() -> OrgId {
	OrgId::new("org-reqwest").expect("Org fixture should be valid.")
}

fn account() -> AccountId {
	AccountId::for_platform(Platform::GoogleAds, "123-456-7890")
		.expect("Account fixture should be valid.")
}

fn query() -> GaqlQuery {
	GaqlQuery::builder("campaign")
		.select_all(["campaign.id", "metrics.clicks"])
		.build()
		.expect("Query should build.")
}

#[tokio::test]
async fn expired_credentials_refresh_before_the_search() {
	let server = MockServer::start_async().await;
	let (client, store) = client(&server, Duration::seconds(-5)).await;
	let token = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200)
				.header("content-type", "application/json")
				.body(
					"{\"access_token\":\"access-new\",\"token_type\":\"Bearer\",\"expires_in\":3600}",
				);
		})
		.await;
	let search = server
		.mock_async(|when, then| {
			when.method(POST)
				.path(SEARCH_PATH)
				.header("authorization", "Bearer access-new")
				.header("developer-token", "dev-token");
			then.status(200).header("content-type", "application/json").body(
				"{\"results\":[{\"campaign\":{\"id\":\"9\"},\"metrics\":{\"clicks\":\"4\"}}]}",
			);
		})
		.await;
	let rows = client
		.run_query(&org(), &account(), &query(), CallOptions::interactive())
		.await
		.expect("Search should succeed after the refresh.")
		.collect_items()
		.await
		.expect("Rows should load.");

	token.assert_calls_async(1).await;
	search.assert_calls_async(1).await;

	assert_eq!(rows.len(), 1);
	assert_eq!(rows[0]["campaign"]["id"], "9");

	let stored = store.snapshot(&org(), Platform::GoogleAds).expect("Credential should persist.");

	assert_eq!(stored.access_token.expose(), "access-new");
	assert_eq!(
		stored.refresh_token.as_ref().map(|secret| secret.expose()),
		Some("refresh-old"),
		"Google keeps the original refresh token."
	);
}

#[tokio::test]
async fn rejected_queries_surface_the_platform_message() {
	let server = MockServer::start_async().await;
	let (client, _) = client(&server, Duration::hours(1)).await;
	let search = server
		.mock_async(|when, then| {
			when.method(POST).path(SEARCH_PATH);
			then.status(400).header("content-type", "application/json").body(
				"{\"error\":{\"code\":400,\"message\":\"Unrecognized field\",\"status\":\"INVALID_ARGUMENT\"}}",
			);
		})
		.await;
	let err = client
		.run_query(&org(), &account(), &query(), CallOptions::interactive())
		.await
		.expect_err("A 400 is a validation failure.");

	search.assert_calls_async(1).await;

	match err {
		Error::Validation(ValidationError::Rejected { status, message, .. }) => {
			assert_eq!(status, 400);
			assert!(message.contains("Unrecognized field"), "{message}");
		},
		other => panic!("Unexpected error: {other:?}."),
	}
}
