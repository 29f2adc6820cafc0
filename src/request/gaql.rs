//! Allow-list GAQL builder.
//!
//! Every caller-supplied token is checked against fixed tables before it reaches the query
//! text: resources and fields must be allow-listed, enum literals must be upper-case
//! identifiers, and string literals are limited to a character set that cannot close the quote
//! they are wrapped in. Nothing is escaped; input that does not fit is rejected.

// std
use std::num::NonZeroU32;
// self
use crate::{_prelude::*, error::ValidationError, request::DateRange};

struct ResourceSchema {
	name: &'static str,
	fields: &'static [&'static str],
	attributed: &'static [&'static str],
}

const RESOURCES: &[ResourceSchema] = &[
	ResourceSchema {
		name: "customer",
		fields: &[
			"id",
			"resource_name",
			"descriptive_name",
			"currency_code",
			"time_zone",
			"manager",
			"status",
		],
		attributed: &[],
	},
	ResourceSchema {
		name: "customer_client",
		fields: &[
			"client_customer",
			"id",
			"descriptive_name",
			"currency_code",
			"time_zone",
			"level",
			"manager",
			"status",
		],
		attributed: &["customer"],
	},
	ResourceSchema {
		name: "campaign",
		fields: &[
			"id",
			"resource_name",
			"name",
			"status",
			"advertising_channel_type",
			"bidding_strategy_type",
			"campaign_budget",
			"start_date",
			"end_date",
		],
		attributed: &["customer", "campaign_budget"],
	},
	ResourceSchema {
		name: "campaign_budget",
		fields: &["id", "resource_name", "name", "amount_micros", "delivery_method", "status"],
		attributed: &["customer"],
	},
	ResourceSchema {
		name: "ad_group",
		fields: &["id", "resource_name", "name", "status", "type", "campaign", "cpc_bid_micros"],
		attributed: &["campaign", "customer"],
	},
	ResourceSchema {
		name: "ad_group_ad",
		fields: &[
			"resource_name",
			"status",
			"ad_group",
			"ad.id",
			"ad.name",
			"ad.type",
			"ad.final_urls",
		],
		attributed: &["ad_group", "campaign", "customer"],
	},
	ResourceSchema {
		name: "ad_group_criterion",
		fields: &[
			"resource_name",
			"criterion_id",
			"status",
			"type",
			"keyword.text",
			"keyword.match_type",
		],
		attributed: &["ad_group", "campaign", "customer"],
	},
	ResourceSchema {
		name: "keyword_view",
		fields: &["resource_name"],
		attributed: &["ad_group_criterion", "ad_group", "campaign", "customer"],
	},
];
const METRICS: &[&str] = &[
	"impressions",
	"clicks",
	"cost_micros",
	"conversions",
	"conversions_value",
	"all_conversions",
	"ctr",
	"average_cpc",
	"average_cpm",
	"interactions",
	"engagements",
	"video_views",
];
const SEGMENTS: &[&str] =
	&["date", "week", "month", "quarter", "year", "day_of_week", "device", "ad_network_type"];
const DATE_SEGMENTS: &[&str] =
	&["segments.date", "segments.week", "segments.month", "segments.quarter", "segments.year"];
const STRING_LITERAL_EXTRAS: &[char] = &[' ', '-', '_', '.', ',', ':', '/', '@', '&', '+', '%'];
const MAX_STRING_LITERAL_LEN: usize = 256;

/// Comparison operators accepted in `WHERE` clauses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operator {
	/// `=`
	Eq,
	/// `!=`
	NotEq,
	/// `>`
	Gt,
	/// `>=`
	Gte,
	/// `<`
	Lt,
	/// `<=`
	Lte,
	/// `IN (...)`
	In,
	/// `NOT IN (...)`
	NotIn,
	/// `LIKE`
	Like,
	/// `NOT LIKE`
	NotLike,
}
impl Operator {
	/// GAQL keyword or symbol.
	pub const fn as_str(self) -> &'static str {
		match self {
			Operator::Eq => "=",
			Operator::NotEq => "!=",
			Operator::Gt => ">",
			Operator::Gte => ">=",
			Operator::Lt => "<",
			Operator::Lte => "<=",
			Operator::In => "IN",
			Operator::NotIn => "NOT IN",
			Operator::Like => "LIKE",
			Operator::NotLike => "NOT LIKE",
		}
	}

	fn accepts(self, literal: &Literal) -> bool {
		match self {
			Operator::Eq | Operator::NotEq => !literal.is_list(),
			Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte => matches!(
				literal,
				Literal::Integer(_) | Literal::Decimal(_) | Literal::Date(_)
			),
			Operator::In | Operator::NotIn => literal.is_list(),
			Operator::Like | Operator::NotLike => matches!(literal, Literal::Text(_)),
		}
	}
}

/// Typed literal on the right-hand side of a condition.
#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
	/// 64-bit integer.
	Integer(i64),
	/// Finite decimal number.
	Decimal(f64),
	/// Enum token such as `ENABLED`.
	Enum(String),
	/// Calendar date rendered as `'YYYY-MM-DD'`.
	Date(Date),
	/// Quoted string restricted to a safe character set.
	Text(String),
	/// Enum tokens for `IN`/`NOT IN`.
	EnumList(Vec<String>),
	/// Integers for `IN`/`NOT IN`.
	IntegerList(Vec<i64>),
}
impl Literal {
	/// Convenience constructor for [`Literal::Enum`].
	pub fn enum_token(token: impl Into<String>) -> Self {
		Literal::Enum(token.into())
	}

	/// Convenience constructor for [`Literal::Text`].
	pub fn text(value: impl Into<String>) -> Self {
		Literal::Text(value.into())
	}

	fn is_list(&self) -> bool {
		matches!(self, Literal::EnumList(_) | Literal::IntegerList(_))
	}

	fn describe(&self) -> &'static str {
		match self {
			Literal::Integer(_) => "an integer",
			Literal::Decimal(_) => "a decimal",
			Literal::Enum(_) => "an enum token",
			Literal::Date(_) => "a date",
			Literal::Text(_) => "a string",
			Literal::EnumList(_) => "an enum list",
			Literal::IntegerList(_) => "an integer list",
		}
	}

	fn render(&self) -> Result<String, ValidationError> {
		Ok(match self {
			Literal::Integer(value) => value.to_string(),
			Literal::Decimal(value) => {
				if !value.is_finite() {
					return Err(ValidationError::DisallowedCharacters { input: value.to_string() });
				}

				value.to_string()
			},
			Literal::Enum(token) => validate_enum_token(token)?.to_owned(),
			Literal::Date(date) => format!("'{}'", render_date(*date)),
			Literal::Text(value) => format!("'{}'", validate_text(value)?),
			Literal::EnumList(tokens) => {
				if tokens.is_empty() {
					return Err(ValidationError::OperatorMismatch {
						operator: "IN",
						literal: "an empty list",
					});
				}

				let rendered = tokens
					.iter()
					.map(|token| validate_enum_token(token))
					.collect::<Result<Vec<_>, _>>()?;

				format!("({})", rendered.join(", "))
			},
			Literal::IntegerList(values) => {
				if values.is_empty() {
					return Err(ValidationError::OperatorMismatch {
						operator: "IN",
						literal: "an empty list",
					});
				}

				let rendered = values.iter().map(i64::to_string).collect::<Vec<_>>();

				format!("({})", rendered.join(", "))
			},
		})
	}
}

/// Predefined `DURING` date ranges.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DuringPreset {
	/// `TODAY`
	Today,
	/// `YESTERDAY`
	Yesterday,
	/// `LAST_7_DAYS`
	Last7Days,
	/// `LAST_14_DAYS`
	Last14Days,
	/// `LAST_30_DAYS`
	Last30Days,
	/// `THIS_MONTH`
	ThisMonth,
	/// `LAST_MONTH`
	LastMonth,
	/// `LAST_BUSINESS_WEEK`
	LastBusinessWeek,
}
impl DuringPreset {
	/// GAQL token.
	pub const fn as_str(self) -> &'static str {
		match self {
			DuringPreset::Today => "TODAY",
			DuringPreset::Yesterday => "YESTERDAY",
			DuringPreset::Last7Days => "LAST_7_DAYS",
			DuringPreset::Last14Days => "LAST_14_DAYS",
			DuringPreset::Last30Days => "LAST_30_DAYS",
			DuringPreset::ThisMonth => "THIS_MONTH",
			DuringPreset::LastMonth => "LAST_MONTH",
			DuringPreset::LastBusinessWeek => "LAST_BUSINESS_WEEK",
		}
	}
}

/// Sort direction for `ORDER BY`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SortOrder {
	/// `ASC`
	#[default]
	Ascending,
	/// `DESC`
	Descending,
}
impl SortOrder {
	const fn as_str(self) -> &'static str {
		match self {
			SortOrder::Ascending => "ASC",
			SortOrder::Descending => "DESC",
		}
	}
}

#[derive(Clone, Debug, PartialEq)]
enum Condition {
	Compare { field: String, operator: Operator, literal: Literal },
	During { field: String, preset: DuringPreset },
	Between { field: String, range: DateRange },
}

/// Validated GAQL query text.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct GaqlQuery {
	resource: &'static str,
	text: String,
}
impl GaqlQuery {
	/// Starts a query selecting from `resource`.
	pub fn builder(resource: impl Into<String>) -> GaqlQueryBuilder {
		GaqlQueryBuilder::new(resource)
	}

	/// Resource the query selects from.
	pub fn resource(&self) -> &'static str {
		self.resource
	}

	/// Query text.
	pub fn as_str(&self) -> &str {
		&self.text
	}
}
impl Display for GaqlQuery {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.text)
	}
}

/// Builder for [`GaqlQuery`]; all validation happens in [`GaqlQueryBuilder::build`].
#[derive(Clone, Debug, PartialEq)]
pub struct GaqlQueryBuilder {
	resource: String,
	fields: Vec<String>,
	conditions: Vec<Condition>,
	order_by: Vec<(String, SortOrder)>,
	limit: Option<NonZeroU32>,
}
impl GaqlQueryBuilder {
	fn new(resource: impl Into<String>) -> Self {
		Self {
			resource: resource.into(),
			fields: Vec::new(),
			conditions: Vec::new(),
			order_by: Vec::new(),
			limit: None,
		}
	}

	/// Adds a selected field.
	pub fn select(mut self, field: impl Into<String>) -> Self {
		self.fields.push(field.into());

		self
	}

	/// Adds several selected fields.
	pub fn select_all<I, S>(mut self, fields: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.fields.extend(fields.into_iter().map(Into::into));

		self
	}

	/// Adds a `field operator literal` condition.
	pub fn filter(
		mut self,
		field: impl Into<String>,
		operator: Operator,
		literal: Literal,
	) -> Self {
		self.conditions.push(Condition::Compare { field: field.into(), operator, literal });

		self
	}

	/// Adds a `field DURING preset` condition; `field` must be a date segment.
	pub fn during(mut self, field: impl Into<String>, preset: DuringPreset) -> Self {
		self.conditions.push(Condition::During { field: field.into(), preset });

		self
	}

	/// Adds a `field BETWEEN 'start' AND 'end'` condition; `field` must be a date segment.
	pub fn between(mut self, field: impl Into<String>, range: DateRange) -> Self {
		self.conditions.push(Condition::Between { field: field.into(), range });

		self
	}

	/// Adds an `ORDER BY` term.
	pub fn order_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
		self.order_by.push((field.into(), order));

		self
	}

	/// Sets `LIMIT`.
	pub fn limit(mut self, limit: NonZeroU32) -> Self {
		self.limit = Some(limit);

		self
	}

	/// Validates every token and renders the query.
	pub fn build(self) -> Result<GaqlQuery, ValidationError> {
		check_token(&self.resource)?;

		let schema = RESOURCES
			.iter()
			.find(|schema| schema.name == self.resource)
			.ok_or_else(|| ValidationError::UnknownResource { resource: self.resource.clone() })?;

		if self.fields.is_empty() {
			return Err(ValidationError::EmptySelection);
		}

		for field in &self.fields {
			validate_field(schema, field)?;
		}

		let mut text = format!("SELECT {} FROM {}", self.fields.join(", "), schema.name);
		let mut clauses = Vec::with_capacity(self.conditions.len());

		for condition in &self.conditions {
			clauses.push(render_condition(schema, condition)?);
		}

		if !clauses.is_empty() {
			text.push_str(" WHERE ");
			text.push_str(&clauses.join(" AND "));
		}
		if !self.order_by.is_empty() {
			let mut terms = Vec::with_capacity(self.order_by.len());

			for (field, order) in &self.order_by {
				validate_field(schema, field)?;
				terms.push(format!("{field} {}", order.as_str()));
			}

			text.push_str(" ORDER BY ");
			text.push_str(&terms.join(", "));
		}
		if let Some(limit) = self.limit {
			text.push_str(&format!(" LIMIT {limit}"));
		}

		Ok(GaqlQuery { resource: schema.name, text })
	}
}

fn render_condition(
	schema: &ResourceSchema,
	condition: &Condition,
) -> Result<String, ValidationError> {
	match condition {
		Condition::Compare { field, operator, literal } => {
			validate_field(schema, field)?;

			if !operator.accepts(literal) {
				return Err(ValidationError::OperatorMismatch {
					operator: operator.as_str(),
					literal: literal.describe(),
				});
			}

			Ok(format!("{field} {} {}", operator.as_str(), literal.render()?))
		},
		Condition::During { field, preset } => {
			validate_date_segment(schema, field, "DURING")?;

			Ok(format!("{field} DURING {}", preset.as_str()))
		},
		Condition::Between { field, range } => {
			validate_date_segment(schema, field, "BETWEEN")?;

			Ok(format!(
				"{field} BETWEEN '{}' AND '{}'",
				render_date(range.start()),
				render_date(range.end())
			))
		},
	}
}

fn validate_date_segment(
	schema: &ResourceSchema,
	field: &str,
	operator: &'static str,
) -> Result<(), ValidationError> {
	validate_field(schema, field)?;

	if !DATE_SEGMENTS.contains(&field) {
		return Err(ValidationError::OperatorMismatch { operator, literal: "a non-date field" });
	}

	Ok(())
}

fn validate_field(schema: &ResourceSchema, field: &str) -> Result<(), ValidationError> {
	check_token(field)?;

	let unknown = || ValidationError::UnknownField {
		field: field.to_owned(),
		resource: schema.name.to_owned(),
	};
	let (prefix, rest) = field.split_once('.').ok_or_else(unknown)?;
	let allowed = match prefix {
		"metrics" => METRICS.contains(&rest),
		"segments" => SEGMENTS.contains(&rest),
		_ if prefix == schema.name => schema.fields.contains(&rest),
		_ if schema.attributed.contains(&prefix) => RESOURCES
			.iter()
			.find(|attributed| attributed.name == prefix)
			.is_some_and(|attributed| attributed.fields.contains(&rest)),
		_ => false,
	};

	if allowed { Ok(()) } else { Err(unknown()) }
}

// Lexical gate applied before any table lookup: lowercase identifiers joined by dots.
fn check_token(token: &str) -> Result<(), ValidationError> {
	let lexically_valid = !token.is_empty()
		&& token.split('.').all(|segment| {
			segment.starts_with(|c: char| c.is_ascii_lowercase())
				&& segment
					.bytes()
					.all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
		});

	if lexically_valid {
		Ok(())
	} else {
		Err(ValidationError::DisallowedCharacters { input: token.to_owned() })
	}
}

fn validate_enum_token(token: &str) -> Result<&str, ValidationError> {
	let valid = token.starts_with(|c: char| c.is_ascii_uppercase())
		&& token.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'_');

	if valid {
		Ok(token)
	} else {
		Err(ValidationError::DisallowedCharacters { input: token.to_owned() })
	}
}

fn validate_text(value: &str) -> Result<&str, ValidationError> {
	let valid = value.chars().count() <= MAX_STRING_LITERAL_LEN
		&& value.chars().all(|c| c.is_alphanumeric() || STRING_LITERAL_EXTRAS.contains(&c));

	if valid {
		Ok(value)
	} else {
		Err(ValidationError::DisallowedCharacters { input: value.to_owned() })
	}
}

pub(crate) fn render_date(date: Date) -> String {
	format!("{:04}-{:02}-{:02}", date.year(), u8::from(date.month()), date.day())
}
