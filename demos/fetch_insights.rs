//! Connects an organization to a mock Meta Graph API, then streams campaign insights through the
//! resilient client with the default reqwest transport.
//!
//! 1. Build a Meta descriptor that points at a local mock server.
//! 2. Start the Authorization Code + PKCE flow and complete it with a fake redirect code.
//! 3. Fetch one week of campaign insights as a page stream.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use futures::TryStreamExt;
use httpmock::prelude::*;
use time::macros;
use url::Url;
// self
use adplatform_client::{
	AdPlatformClient, CallOptions,
	auth::{AccountId, OrgId, Platform, ScopeSet},
	platform::{ClientAuthMethod, PlatformApp, PlatformDescriptor, PlatformQuirks},
	request::{DateRange, InsightLevel, InsightMetric, InsightsRequest},
	store::MemoryStore,
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let token_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/v21.0/oauth/access_token");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"demo-access\",\"token_type\":\"bearer\",\"expires_in\":5184000}",
			);
		})
		.await;
	let insights_mock = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/v21.0/act_123/insights")
				.header("authorization", "Bearer demo-access");
			then.status(200).header("content-type", "application/json").body(
				r#"{"data":[
					{"campaign_id":"1","campaign_name":"Spring","impressions":"1200","clicks":"40","spend":"18.20","date_start":"2025-02-01","date_stop":"2025-02-07"},
					{"campaign_id":"2","campaign_name":"Retargeting","impressions":"300","clicks":"9","spend":"4.75","date_start":"2025-02-01","date_stop":"2025-02-07"}
				]}"#,
			);
		})
		.await;
	let descriptor = PlatformDescriptor::builder(Platform::Meta)
		.authorization_endpoint(Url::parse(&server.url("/v21.0/dialog/oauth"))?)
		.token_endpoint(Url::parse(&server.url("/v21.0/oauth/access_token"))?)
		.api_base(Url::parse(&server.url("/v21.0/"))?)
		.client_auth_method(ClientAuthMethod::ClientSecretPost)
		.default_scopes(ScopeSet::new(["ads_read"])?)
		.quirks(PlatformQuirks::meta())
		.build()?;
	let client = AdPlatformClient::builder(Arc::new(MemoryStore::default()))
		.register(PlatformApp::new(descriptor, "demo-app").with_client_secret("demo-secret"))
		.build()?;
	let org = OrgId::new("org-acme")?;
	let session = client.tokens().start_authorization(
		org.clone(),
		Platform::Meta,
		Url::parse("https://app.example.com/oauth/callback")?,
		None,
	)?;

	println!("Send the user to: {}.", session.authorize_url);

	client.tokens().complete_authorization(&session.state, "code-from-redirect").await?;

	let request = InsightsRequest::new(
		AccountId::for_platform(Platform::Meta, "act_123")?,
		InsightLevel::Campaign,
		DateRange::new(macros::date!(2025-02-01), macros::date!(2025-02-07))?,
	)
	.metrics([InsightMetric::Impressions, InsightMetric::Clicks, InsightMetric::Spend]);
	let pages = client
		.fetch_insights(&org, Platform::Meta, request, CallOptions::background())
		.await?
		.into_stream()
		.try_collect::<Vec<_>>()
		.await?;

	for row in pages.iter().flat_map(|page| &page.items) {
		println!(
			"{} {}: {} impressions, {} clicks, spend {:.2}.",
			row.entity_id.as_deref().unwrap_or("?"),
			row.entity_name.as_deref().unwrap_or("unnamed"),
			row.impressions.unwrap_or_default(),
			row.clicks.unwrap_or_default(),
			row.spend.unwrap_or_default(),
		);
	}

	token_mock.assert_async().await;
	insights_mock.assert_async().await;

	Ok(())
}
