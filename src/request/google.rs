//! Google Ads API request builders.
//!
//! Insight requests are translated into GAQL through [`GaqlQuery::builder`], so they pass the
//! same allow-list as caller-written queries.

// crates.io
use oauth2::http::Method;
// self
use crate::{
	_prelude::*,
	auth::{AccountId, OrgId, Platform},
	error::ValidationError,
	request::{
		EndpointCategory, GaqlQuery, InsightLevel, InsightMetric, InsightsRequest, OperationKind,
		RequestEnvelope,
	},
};

/// Translates an insights request into GAQL.
pub fn insights_query(request: &InsightsRequest) -> Result<GaqlQuery, ValidationError> {
	let (resource, identity) = level_selection(request.level);
	let mut builder = GaqlQuery::builder(resource).select_all(identity.iter().copied());

	for metric in request.effective_metrics() {
		builder = builder.select(metric_field(metric)?);
	}

	if request.daily {
		builder = builder.select("segments.date");
	}

	builder.between("segments.date", request.date_range).build()
}

/// Builds the `POST customers/<id>/googleAds:search` envelope.
///
/// Search is read-only, so the envelope is marked idempotent despite the `POST`.
pub fn search_envelope(
	org: &OrgId,
	account: &AccountId,
	query: &GaqlQuery,
	operation: OperationKind,
	category: EndpointCategory,
) -> RequestEnvelope {
	RequestEnvelope::new(
		operation,
		org.clone(),
		Platform::GoogleAds,
		category,
		Method::POST,
		format!("customers/{}/googleAds:search", account.path_segment(Platform::GoogleAds)),
	)
	.account(account.clone())
	.json_body(serde_json::json!({ "query": query.as_str() }))
	.idempotent(true)
}

/// Builds the insights search envelope.
pub fn insights_envelope(
	org: &OrgId,
	request: &InsightsRequest,
) -> Result<RequestEnvelope, ValidationError> {
	let query = insights_query(request)?;

	Ok(search_envelope(
		org,
		&request.account,
		&query,
		OperationKind::FetchInsights,
		EndpointCategory::Insights,
	))
}

/// Builds the `GET customers:listAccessibleCustomers` envelope.
pub fn accounts_envelope(org: &OrgId) -> RequestEnvelope {
	RequestEnvelope::new(
		OperationKind::ListAccounts,
		org.clone(),
		Platform::GoogleAds,
		EndpointCategory::Accounts,
		Method::GET,
		"customers:listAccessibleCustomers",
	)
}

fn level_selection(level: InsightLevel) -> (&'static str, &'static [&'static str]) {
	match level {
		InsightLevel::Account => ("customer", &["customer.id", "customer.descriptive_name"]),
		InsightLevel::Campaign => ("campaign", &["customer.id", "campaign.id", "campaign.name"]),
		InsightLevel::AdSet => ("ad_group", &["customer.id", "ad_group.id", "ad_group.name"]),
		InsightLevel::Ad =>
			("ad_group_ad", &["customer.id", "ad_group_ad.ad.id", "ad_group_ad.ad.name"]),
	}
}

fn metric_field(metric: InsightMetric) -> Result<&'static str, ValidationError> {
	match metric {
		InsightMetric::Impressions => Ok("metrics.impressions"),
		InsightMetric::Clicks => Ok("metrics.clicks"),
		InsightMetric::Spend => Ok("metrics.cost_micros"),
		InsightMetric::Conversions => Ok("metrics.conversions"),
		InsightMetric::Reach => Err(ValidationError::UnknownField {
			field: metric.as_str().into(),
			resource: "metrics".into(),
		}),
	}
}
