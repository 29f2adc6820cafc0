//! Meta Graph API request builders.

// crates.io
use oauth2::http::Method;
// self
use crate::{
	_prelude::*,
	auth::{OrgId, Platform},
	error::ValidationError,
	request::{
		EndpointCategory, InsightLevel, InsightMetric, InsightsRequest, OperationKind,
		RequestEnvelope, gaql,
	},
};

const ACCOUNT_FIELDS: &str = "account_id,name,currency,timezone_name,account_status";

/// Builds the `GET act_<id>/insights` envelope.
pub fn insights_envelope(
	org: &OrgId,
	request: &InsightsRequest,
) -> Result<RequestEnvelope, ValidationError> {
	let mut fields = level_fields(request.level).to_vec();

	for metric in request.effective_metrics() {
		fields.push(metric_field(metric)?);
	}

	fields.extend(["date_start", "date_stop"]);

	let time_range = serde_json::json!({
		"since": gaql::render_date(request.date_range.start()),
		"until": gaql::render_date(request.date_range.end()),
	});
	let mut envelope = RequestEnvelope::new(
		OperationKind::FetchInsights,
		org.clone(),
		Platform::Meta,
		EndpointCategory::Insights,
		Method::GET,
		format!("{}/insights", request.account.path_segment(Platform::Meta)),
	)
	.account(request.account.clone())
	.query_param("level", level_name(request.level))
	.query_param("fields", fields.join(","))
	.query_param("time_range", time_range.to_string());

	if request.daily {
		envelope = envelope.query_param("time_increment", "1");
	}
	if let Some(limit) = request.page_size {
		envelope = envelope.query_param("limit", limit.to_string());
	}

	Ok(envelope)
}

/// Builds the `GET me/adaccounts` envelope.
pub fn accounts_envelope(org: &OrgId) -> RequestEnvelope {
	RequestEnvelope::new(
		OperationKind::ListAccounts,
		org.clone(),
		Platform::Meta,
		EndpointCategory::Accounts,
		Method::GET,
		"me/adaccounts",
	)
	.query_param("fields", ACCOUNT_FIELDS)
}

fn level_name(level: InsightLevel) -> &'static str {
	match level {
		InsightLevel::Account => "account",
		InsightLevel::Campaign => "campaign",
		InsightLevel::AdSet => "adset",
		InsightLevel::Ad => "ad",
	}
}

fn level_fields(level: InsightLevel) -> &'static [&'static str] {
	match level {
		InsightLevel::Account => &["account_id", "account_name"],
		InsightLevel::Campaign => &["account_id", "campaign_id", "campaign_name"],
		InsightLevel::AdSet => &["account_id", "adset_id", "adset_name"],
		InsightLevel::Ad => &["account_id", "ad_id", "ad_name"],
	}
}

fn metric_field(metric: InsightMetric) -> Result<&'static str, ValidationError> {
	match metric {
		InsightMetric::Impressions => Ok("impressions"),
		InsightMetric::Clicks => Ok("clicks"),
		InsightMetric::Spend => Ok("spend"),
		InsightMetric::Reach => Ok("reach"),
		InsightMetric::Conversions => Err(ValidationError::UnknownField {
			field: metric.as_str().into(),
			resource: "insights".into(),
		}),
	}
}
