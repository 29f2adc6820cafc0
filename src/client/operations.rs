//! Caller-facing operations built on the executor and the pagination engine.

// self
use super::{AdPlatformClient, ApiResponse, CallOptions, PageStream, pagination::PageDecoder};
use crate::{
	_prelude::*,
	auth::{AccountId, OrgId, Platform},
	mapping::{self, AccountsPayload, AdAccount, InsightRow, InsightsPayload},
	request::{EndpointCategory, GaqlQuery, InsightsRequest, OperationKind, google, meta},
};

impl AdPlatformClient {
	/// Streams insight rows for one ad account and date range.
	///
	/// The first page is fetched before this returns, so validation, authorization, breaker, and
	/// rate-limit failures surface here rather than on the first pull.
	pub async fn fetch_insights(
		&self,
		org: &OrgId,
		platform: Platform,
		request: InsightsRequest,
		options: CallOptions,
	) -> Result<PageStream<InsightRow>> {
		let envelope = match platform {
			Platform::Meta => meta::insights_envelope(org, &request)?,
			Platform::GoogleAds => google::insights_envelope(org, &request)?,
		};
		let level = request.level;
		let decoder: PageDecoder<InsightRow> = Arc::new(move |response: &ApiResponse| {
			let payload = InsightsPayload::decode(platform, response.status, &response.body)?;

			Ok(payload.into_page(level))
		});

		PageStream::start(self.clone(), envelope, options, decoder).await
	}

	/// Streams the raw result rows of a GAQL search against one Google Ads customer.
	pub async fn run_query(
		&self,
		org: &OrgId,
		account: &AccountId,
		query: &GaqlQuery,
		options: CallOptions,
	) -> Result<PageStream<serde_json::Value>> {
		let envelope = google::search_envelope(
			org,
			account,
			query,
			OperationKind::RunQuery,
			EndpointCategory::Query,
		);
		let decoder: PageDecoder<serde_json::Value> = Arc::new(|response: &ApiResponse| {
			mapping::decode_search_rows(response.status, &response.body)
		});

		PageStream::start(self.clone(), envelope, options, decoder).await
	}

	/// Lists every ad account the organization's credential can reach, across all pages.
	pub async fn list_accounts(
		&self,
		org: &OrgId,
		platform: Platform,
		options: CallOptions,
	) -> Result<Vec<AdAccount>> {
		let envelope = match platform {
			Platform::Meta => meta::accounts_envelope(org),
			Platform::GoogleAds => google::accounts_envelope(org),
		};
		let decoder: PageDecoder<AdAccount> = Arc::new(move |response: &ApiResponse| {
			let payload = AccountsPayload::decode(platform, response.status, &response.body)?;

			Ok(payload.into_page())
		});

		PageStream::start(self.clone(), envelope, options, decoder).await?.collect_items().await
	}
}
