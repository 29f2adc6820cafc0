//! Platform response payloads and their explicit mapping into platform-neutral rows.
//!
//! Each platform's response shape is a closed, platform-tagged variant decoded with
//! `serde_path_to_error`, so decode failures report the path of the offending field. One
//! mapping function per platform turns the variant into [`InsightRow`]s or [`AdAccount`]s.

// self
use crate::{
	_prelude::*,
	auth::{AccountId, Platform},
	error::TransientError,
	request::InsightLevel,
};

const MICROS_PER_UNIT: f64 = 1_000_000.;

/// One platform-neutral insight row.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InsightRow {
	/// Platform the row came from.
	pub platform: Option<Platform>,
	/// Ad account (Meta) or customer (Google Ads) id.
	pub account_id: Option<String>,
	/// Id of the campaign, ad set/ad group, or ad the row aggregates.
	pub entity_id: Option<String>,
	/// Display name of the aggregated entity.
	pub entity_name: Option<String>,
	/// First day covered by the row.
	pub date_start: Option<Date>,
	/// Last day covered by the row.
	pub date_stop: Option<Date>,
	/// Impressions served.
	pub impressions: Option<u64>,
	/// Clicks.
	pub clicks: Option<u64>,
	/// Spend in account currency units.
	pub spend: Option<f64>,
	/// Conversions (Google Ads).
	pub conversions: Option<f64>,
	/// Unique reach (Meta).
	pub reach: Option<u64>,
}

/// Ad account reachable by a credential.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdAccount {
	/// Platform hosting the account.
	pub platform: Platform,
	/// Normalized account id.
	pub id: AccountId,
	/// Display name, when the platform returns one.
	pub name: Option<String>,
	/// ISO 4217 currency code.
	pub currency: Option<String>,
	/// IANA time zone name.
	pub time_zone: Option<String>,
}

/// Decoded page: mapped items plus the continuation cursor, if any.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedPage<T> {
	/// Items on the page.
	pub items: Vec<T>,
	/// Cursor for the next page; `None` ends the sequence.
	pub cursor: Option<String>,
}

/// Insight responses, tagged by platform.
#[derive(Clone, Debug, PartialEq)]
pub enum InsightsPayload {
	/// Meta `act_<id>/insights` page.
	Meta(MetaPage<MetaInsight>),
	/// Google Ads `googleAds:search` page.
	GoogleAds(GoogleSearchPage<GoogleRow>),
}
impl InsightsPayload {
	/// Decodes a raw response body for `platform`.
	pub fn decode(platform: Platform, status: u16, body: &[u8]) -> Result<Self, TransientError> {
		Ok(match platform {
			Platform::Meta => InsightsPayload::Meta(decode_json(status, body)?),
			Platform::GoogleAds => InsightsPayload::GoogleAds(decode_json(status, body)?),
		})
	}

	/// Maps the payload into rows for `level`.
	pub fn into_page(self, level: InsightLevel) -> DecodedPage<InsightRow> {
		match self {
			InsightsPayload::Meta(page) => map_meta_insights(page, level),
			InsightsPayload::GoogleAds(page) => map_google_insights(page, level),
		}
	}
}

/// Account listing responses, tagged by platform.
#[derive(Clone, Debug, PartialEq)]
pub enum AccountsPayload {
	/// Meta `me/adaccounts` page.
	Meta(MetaPage<MetaAccount>),
	/// Google Ads `customers:listAccessibleCustomers` response.
	GoogleAds(GoogleAccessibleCustomers),
}
impl AccountsPayload {
	/// Decodes a raw response body for `platform`.
	pub fn decode(platform: Platform, status: u16, body: &[u8]) -> Result<Self, TransientError> {
		Ok(match platform {
			Platform::Meta => AccountsPayload::Meta(decode_json(status, body)?),
			Platform::GoogleAds => AccountsPayload::GoogleAds(decode_json(status, body)?),
		})
	}

	/// Maps the payload into accounts; entries with malformed ids are skipped.
	pub fn into_page(self) -> DecodedPage<AdAccount> {
		match self {
			AccountsPayload::Meta(page) => DecodedPage {
				cursor: page.cursor(),
				items: page
					.data
					.into_iter()
					.filter_map(|account| {
						let raw = account.account_id.or(account.id)?;
						let id = AccountId::for_platform(Platform::Meta, &raw).ok()?;

						Some(AdAccount {
							platform: Platform::Meta,
							id,
							name: account.name,
							currency: account.currency,
							time_zone: account.timezone_name,
						})
					})
					.collect(),
			},
			AccountsPayload::GoogleAds(customers) => DecodedPage {
				cursor: None,
				items: customers
					.resource_names
					.iter()
					.filter_map(|name| {
						let raw = name.strip_prefix("customers/")?;
						let id = AccountId::for_platform(Platform::GoogleAds, raw).ok()?;

						Some(AdAccount {
							platform: Platform::GoogleAds,
							id,
							name: None,
							currency: None,
							time_zone: None,
						})
					})
					.collect(),
			},
		}
	}
}

/// Decodes a Google Ads search page into raw result rows.
pub fn decode_search_rows(
	status: u16,
	body: &[u8],
) -> Result<DecodedPage<serde_json::Value>, TransientError> {
	let page: GoogleSearchPage<serde_json::Value> = decode_json(status, body)?;

	Ok(DecodedPage { cursor: page.cursor(), items: page.results })
}

/// Meta Graph list envelope.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct MetaPage<T> {
	/// Page items.
	#[serde(default = "Vec::new")]
	pub data: Vec<T>,
	/// Paging block; `next` is present only when more pages exist.
	#[serde(default)]
	pub paging: Option<MetaPaging>,
}
impl<T> MetaPage<T> {
	fn cursor(&self) -> Option<String> {
		let paging = self.paging.as_ref()?;

		paging.next.as_ref()?;

		paging.cursors.as_ref()?.after.clone().filter(|after| !after.is_empty())
	}
}

/// Meta paging block.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct MetaPaging {
	/// Cursor pair.
	#[serde(default)]
	pub cursors: Option<MetaCursors>,
	/// URL of the next page.
	#[serde(default)]
	pub next: Option<String>,
}

/// Meta cursor pair.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct MetaCursors {
	/// Cursor of the first item.
	#[serde(default)]
	pub before: Option<String>,
	/// Cursor of the last item.
	#[serde(default)]
	pub after: Option<String>,
}

/// Raw Meta insight row; numbers arrive as strings.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct MetaInsight {
	/// Account id.
	pub account_id: Option<String>,
	/// Account name.
	pub account_name: Option<String>,
	/// Campaign id.
	pub campaign_id: Option<String>,
	/// Campaign name.
	pub campaign_name: Option<String>,
	/// Ad set id.
	pub adset_id: Option<String>,
	/// Ad set name.
	pub adset_name: Option<String>,
	/// Ad id.
	pub ad_id: Option<String>,
	/// Ad name.
	pub ad_name: Option<String>,
	/// Impressions.
	pub impressions: Option<Numeric>,
	/// Clicks.
	pub clicks: Option<Numeric>,
	/// Spend in account currency.
	pub spend: Option<Numeric>,
	/// Reach.
	pub reach: Option<Numeric>,
	/// First day.
	pub date_start: Option<String>,
	/// Last day.
	pub date_stop: Option<String>,
}

/// Raw Meta ad account.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct MetaAccount {
	/// Graph node id (`act_<id>`).
	pub id: Option<String>,
	/// Bare account id.
	pub account_id: Option<String>,
	/// Account name.
	pub name: Option<String>,
	/// Currency code.
	pub currency: Option<String>,
	/// Time zone name.
	pub timezone_name: Option<String>,
}

/// Google Ads search page.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleSearchPage<T> {
	/// Result rows; omitted entirely when the query matched nothing.
	#[serde(default = "Vec::new")]
	pub results: Vec<T>,
	/// Token for the next page; absent or empty on the last page.
	#[serde(default)]
	pub next_page_token: Option<String>,
}
impl<T> GoogleSearchPage<T> {
	fn cursor(&self) -> Option<String> {
		self.next_page_token.clone().filter(|token| !token.is_empty())
	}
}

/// Raw Google Ads search row.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GoogleRow {
	/// `customer.*` fields.
	pub customer: Option<GoogleEntity>,
	/// `campaign.*` fields.
	pub campaign: Option<GoogleEntity>,
	/// `ad_group.*` fields.
	pub ad_group: Option<GoogleEntity>,
	/// `ad_group_ad.*` fields.
	pub ad_group_ad: Option<GoogleAdGroupAd>,
	/// `metrics.*` fields.
	pub metrics: Option<GoogleMetrics>,
	/// `segments.*` fields.
	pub segments: Option<GoogleSegments>,
}

/// Identity fields shared by Google Ads resources.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GoogleEntity {
	/// Resource id.
	pub id: Option<Numeric>,
	/// Resource name.
	pub name: Option<String>,
	/// Customer descriptive name.
	pub descriptive_name: Option<String>,
}

/// `ad_group_ad` wrapper.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct GoogleAdGroupAd {
	/// Nested ad.
	pub ad: Option<GoogleEntity>,
}

/// Google Ads metrics; int64 values arrive as strings.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GoogleMetrics {
	/// Impressions.
	pub impressions: Option<Numeric>,
	/// Clicks.
	pub clicks: Option<Numeric>,
	/// Cost in micros of the account currency.
	pub cost_micros: Option<Numeric>,
	/// Conversions.
	pub conversions: Option<Numeric>,
}

/// Google Ads segments.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct GoogleSegments {
	/// `YYYY-MM-DD`.
	pub date: Option<String>,
}

/// Google Ads `listAccessibleCustomers` response.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GoogleAccessibleCustomers {
	/// `customers/<id>` resource names.
	pub resource_names: Vec<String>,
}

/// Number encoded either as a JSON number or as a decimal string.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Numeric {
	/// JSON number.
	Number(serde_json::Number),
	/// Decimal string.
	Text(String),
}
impl Numeric {
	/// Integer value, if representable.
	pub fn as_u64(&self) -> Option<u64> {
		match self {
			Numeric::Number(number) => number.as_u64(),
			Numeric::Text(text) => text.trim().parse().ok(),
		}
	}

	/// Floating-point value, if representable.
	pub fn as_f64(&self) -> Option<f64> {
		match self {
			Numeric::Number(number) => number.as_f64(),
			Numeric::Text(text) => text.trim().parse().ok(),
		}
	}

	/// Textual form.
	pub fn to_text(&self) -> String {
		match self {
			Numeric::Number(number) => number.to_string(),
			Numeric::Text(text) => text.clone(),
		}
	}
}

pub(crate) fn decode_json<T>(status: u16, body: &[u8]) -> Result<T, TransientError>
where
	T: DeserializeOwned,
{
	let de = &mut serde_json::Deserializer::from_slice(body);

	serde_path_to_error::deserialize(de)
		.map_err(|source| TransientError::ResponseParse { source, status: Some(status) })
}

fn map_meta_insights(page: MetaPage<MetaInsight>, level: InsightLevel) -> DecodedPage<InsightRow> {
	let cursor = page.cursor();
	let items = page
		.data
		.into_iter()
		.map(|raw| {
			let (entity_id, entity_name) = match level {
				InsightLevel::Account => (raw.account_id.clone(), raw.account_name),
				InsightLevel::Campaign => (raw.campaign_id, raw.campaign_name),
				InsightLevel::AdSet => (raw.adset_id, raw.adset_name),
				InsightLevel::Ad => (raw.ad_id, raw.ad_name),
			};

			InsightRow {
				platform: Some(Platform::Meta),
				account_id: raw.account_id,
				entity_id,
				entity_name,
				date_start: raw.date_start.as_deref().and_then(parse_date),
				date_stop: raw.date_stop.as_deref().and_then(parse_date),
				impressions: raw.impressions.as_ref().and_then(Numeric::as_u64),
				clicks: raw.clicks.as_ref().and_then(Numeric::as_u64),
				spend: raw.spend.as_ref().and_then(Numeric::as_f64),
				conversions: None,
				reach: raw.reach.as_ref().and_then(Numeric::as_u64),
			}
		})
		.collect();

	DecodedPage { items, cursor }
}

fn map_google_insights(
	page: GoogleSearchPage<GoogleRow>,
	level: InsightLevel,
) -> DecodedPage<InsightRow> {
	let cursor = page.cursor();
	let items = page
		.results
		.into_iter()
		.map(|raw| {
			let customer = raw.customer.unwrap_or_default();
			let entity = match level {
				InsightLevel::Account => Some(customer.clone()),
				InsightLevel::Campaign => raw.campaign,
				InsightLevel::AdSet => raw.ad_group,
				InsightLevel::Ad => raw.ad_group_ad.and_then(|wrapper| wrapper.ad),
			}
			.unwrap_or_default();
			let metrics = raw.metrics.unwrap_or_default();
			let date =
				raw.segments.and_then(|segments| segments.date).as_deref().and_then(parse_date);

			InsightRow {
				platform: Some(Platform::GoogleAds),
				account_id: customer.id.as_ref().map(Numeric::to_text),
				entity_id: entity.id.as_ref().map(Numeric::to_text),
				entity_name: entity.name.or(entity.descriptive_name),
				date_start: date,
				date_stop: date,
				impressions: metrics.impressions.as_ref().and_then(Numeric::as_u64),
				clicks: metrics.clicks.as_ref().and_then(Numeric::as_u64),
				spend: metrics
					.cost_micros
					.as_ref()
					.and_then(Numeric::as_f64)
					.map(|micros| micros / MICROS_PER_UNIT),
				conversions: metrics.conversions.as_ref().and_then(Numeric::as_f64),
				reach: None,
			}
		})
		.collect();

	DecodedPage { items, cursor }
}

fn parse_date(raw: &str) -> Option<Date> {
	Date::parse(raw, time::macros::format_description!("[year]-[month]-[day]")).ok()
}
