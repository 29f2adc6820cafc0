//! Logical operations and the request envelopes the executor consumes.
//!
//! Builders in [`meta`], [`google`], and [`gaql`] translate caller intent into a validated
//! [`RequestEnvelope`]. They perform no I/O.

pub mod gaql;
pub mod google;
pub mod meta;

pub use gaql::*;

// crates.io
use oauth2::http::{
	HeaderName, HeaderValue, Method,
	header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
};
// self
use crate::{
	_prelude::*,
	auth::{AccountId, OrgId, Platform, TokenSecret},
	error::{ConfigError, ValidationError},
	http::HttpRequest,
	platform::PlatformDescriptor,
};

/// Logical operation names carried through errors, spans, and metrics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperationKind {
	/// Insight/report rows for a date range.
	FetchInsights,
	/// Free-form GAQL search.
	RunQuery,
	/// Ad accounts reachable by the credential.
	ListAccounts,
	/// `grant_type=refresh_token` exchange.
	RefreshToken,
	/// `grant_type=authorization_code` exchange.
	ExchangeCode,
	/// Caller-defined operation issued through the raw executor.
	Custom(&'static str),
}
impl OperationKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OperationKind::FetchInsights => "fetch_insights",
			OperationKind::RunQuery => "run_query",
			OperationKind::ListAccounts => "list_accounts",
			OperationKind::RefreshToken => "refresh_token",
			OperationKind::ExchangeCode => "exchange_code",
			OperationKind::Custom(name) => name,
		}
	}
}
impl Display for OperationKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Endpoint families with independent platform quotas; each selects its own token bucket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointCategory {
	/// Account listing.
	Accounts,
	/// Read-only insight queries.
	Insights,
	/// Query-language search.
	Query,
	/// Export-heavy endpoints.
	Export,
}
impl EndpointCategory {
	/// Every category.
	pub const ALL: [EndpointCategory; 4] = [
		EndpointCategory::Accounts,
		EndpointCategory::Insights,
		EndpointCategory::Query,
		EndpointCategory::Export,
	];

	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			EndpointCategory::Accounts => "accounts",
			EndpointCategory::Insights => "insights",
			EndpointCategory::Query => "query",
			EndpointCategory::Export => "export",
		}
	}
}
impl Display for EndpointCategory {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Fully formed, platform-specific request consumed by the executor.
///
/// `path` is relative to the descriptor's versioned API base. The envelope is never persisted;
/// the pagination engine keeps one as the template for follow-up pages.
#[derive(Clone, Debug, PartialEq)]
pub struct RequestEnvelope {
	/// Logical operation name.
	pub operation: OperationKind,
	/// Organization whose credential signs the request.
	pub org: OrgId,
	/// Target platform.
	pub platform: Platform,
	/// Target ad account, when the operation addresses one.
	pub account: Option<AccountId>,
	/// Token bucket the request draws from.
	pub category: EndpointCategory,
	/// HTTP method.
	pub method: Method,
	/// API path relative to the versioned base URL.
	pub path: String,
	/// Query-string parameters.
	pub query: Vec<(String, String)>,
	/// JSON body, if any.
	pub body: Option<serde_json::Value>,
	/// Whether repeating the request is safe.
	pub idempotent: bool,
	/// Attempts made so far; maintained by the executor.
	pub attempt: u32,
}
impl RequestEnvelope {
	/// Creates an envelope; `GET` requests start out idempotent.
	pub fn new(
		operation: OperationKind,
		org: OrgId,
		platform: Platform,
		category: EndpointCategory,
		method: Method,
		path: impl Into<String>,
	) -> Self {
		let idempotent = method == Method::GET;

		Self {
			operation,
			org,
			platform,
			account: None,
			category,
			method,
			path: path.into(),
			query: Vec::new(),
			body: None,
			idempotent,
			attempt: 0,
		}
	}

	/// Associates the target ad account.
	pub fn account(mut self, account: AccountId) -> Self {
		self.account = Some(account);

		self
	}

	/// Appends a query-string parameter.
	pub fn query_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.query.push((name.into(), value.into()));

		self
	}

	/// Replaces an existing query-string parameter or appends it.
	pub fn set_query_param(&mut self, name: &str, value: impl Into<String>) {
		let value = value.into();

		match self.query.iter_mut().find(|(key, _)| key == name) {
			Some((_, existing)) => *existing = value,
			None => self.query.push((name.to_owned(), value)),
		}
	}

	/// Sets the JSON body.
	pub fn json_body(mut self, body: serde_json::Value) -> Self {
		self.body = Some(body);

		self
	}

	/// Overrides the idempotency flag.
	pub fn idempotent(mut self, idempotent: bool) -> Self {
		self.idempotent = idempotent;

		self
	}

	/// Renders the HTTP request signed with `token`.
	pub(crate) fn to_http(
		&self,
		descriptor: &PlatformDescriptor,
		token: &TokenSecret,
	) -> Result<HttpRequest> {
		let mut url = descriptor
			.api_url(&self.path)
			.map_err(|source| ConfigError::InvalidDescriptor { source })?;

		if !self.query.is_empty() {
			url.query_pairs_mut().extend_pairs(self.query.iter());
		}

		let body = match &self.body {
			Some(body) =>
				serde_json::to_vec(body).map_err(|e| ConfigError::invalid(e.to_string()))?,
			None => Vec::new(),
		};
		let mut builder = oauth2::http::Request::builder()
			.method(self.method.clone())
			.uri(url.as_str())
			.header(ACCEPT, "application/json")
			.header(AUTHORIZATION, token.bearer());

		if self.body.is_some() {
			builder = builder.header(CONTENT_TYPE, "application/json");
		}

		for (name, value) in &descriptor.api_headers {
			let name = HeaderName::try_from(name.as_str())
				.map_err(|e| ConfigError::from(oauth2::http::Error::from(e)))?;
			let value = HeaderValue::try_from(value.as_str())
				.map_err(|e| ConfigError::from(oauth2::http::Error::from(e)))?;

			builder = builder.header(name, value);
		}

		Ok(builder.body(body).map_err(ConfigError::from)?)
	}
}

/// Inclusive calendar date range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawDateRange")]
pub struct DateRange {
	start: Date,
	end: Date,
}
impl DateRange {
	/// Creates a range, rejecting ranges that end before they start.
	pub fn new(start: Date, end: Date) -> Result<Self, ValidationError> {
		if end < start {
			return Err(ValidationError::InvalidDateRange { start, end });
		}

		Ok(Self { start, end })
	}

	/// First day of the range.
	pub fn start(&self) -> Date {
		self.start
	}

	/// Last day of the range.
	pub fn end(&self) -> Date {
		self.end
	}
}
impl TryFrom<RawDateRange> for DateRange {
	type Error = ValidationError;

	fn try_from(raw: RawDateRange) -> Result<Self, Self::Error> {
		Self::new(raw.start, raw.end)
	}
}

#[derive(Deserialize)]
struct RawDateRange {
	start: Date,
	end: Date,
}

/// Aggregation level of insight rows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightLevel {
	/// One row per account.
	Account,
	/// One row per campaign.
	#[default]
	Campaign,
	/// One row per ad set (Meta) or ad group (Google Ads).
	AdSet,
	/// One row per ad.
	Ad,
}

/// Platform-neutral insight metrics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightMetric {
	/// Impressions served.
	Impressions,
	/// Clicks.
	Clicks,
	/// Spend in account currency.
	Spend,
	/// Conversions (Google Ads only).
	Conversions,
	/// Unique reach (Meta only).
	Reach,
}
impl InsightMetric {
	/// Metrics requested when the caller names none.
	pub const DEFAULTS: [InsightMetric; 3] =
		[InsightMetric::Impressions, InsightMetric::Clicks, InsightMetric::Spend];

	/// Returns a stable label.
	pub const fn as_str(self) -> &'static str {
		match self {
			InsightMetric::Impressions => "impressions",
			InsightMetric::Clicks => "clicks",
			InsightMetric::Spend => "spend",
			InsightMetric::Conversions => "conversions",
			InsightMetric::Reach => "reach",
		}
	}
}

/// Parameters of a `fetch_insights` call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InsightsRequest {
	/// Account the insights are read from.
	pub account: AccountId,
	/// Row aggregation level.
	pub level: InsightLevel,
	/// Reporting window.
	pub date_range: DateRange,
	/// Metrics to return; empty means [`InsightMetric::DEFAULTS`].
	pub metrics: Vec<InsightMetric>,
	/// Split rows per day instead of aggregating the whole range.
	pub daily: bool,
	/// Rows per page where the platform lets the caller choose (Meta `limit`).
	pub page_size: Option<u32>,
}
impl InsightsRequest {
	/// Creates a request with default metrics.
	pub fn new(account: AccountId, level: InsightLevel, date_range: DateRange) -> Self {
		Self { account, level, date_range, metrics: Vec::new(), daily: false, page_size: None }
	}

	/// Selects the metrics to return.
	pub fn metrics(mut self, metrics: impl IntoIterator<Item = InsightMetric>) -> Self {
		self.metrics = metrics.into_iter().collect();

		self
	}

	/// Splits rows per day.
	pub fn daily(mut self) -> Self {
		self.daily = true;

		self
	}

	/// Sets the page size.
	pub fn page_size(mut self, size: u32) -> Self {
		self.page_size = Some(size);

		self
	}

	pub(crate) fn effective_metrics(&self) -> Vec<InsightMetric> {
		if self.metrics.is_empty() {
			InsightMetric::DEFAULTS.to_vec()
		} else {
			self.metrics.clone()
		}
	}
}
