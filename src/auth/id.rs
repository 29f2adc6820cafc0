//! Strongly typed identifiers for organizations, ad accounts, and platforms.

// std
use std::{borrow::Borrow, ops::Deref};
// self
use crate::{_prelude::*, error::ValidationError};

macro_rules! def_id {
	($name:ident, $doc:literal, $kind:literal) => {
		#[doc = $doc]
		#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
		#[serde(try_from = "String", into = "String")]
		pub struct $name(String);
		impl $name {
			/// Creates a new identifier after validation.
			pub fn new(value: impl AsRef<str>) -> Result<Self, IdentifierError> {
				let view = value.as_ref();

				validate_view($kind, view)?;

				Ok(Self(view.to_owned()))
			}
		}
		impl Deref for $name {
			type Target = str;

			fn deref(&self) -> &Self::Target {
				&self.0
			}
		}
		impl AsRef<str> for $name {
			fn as_ref(&self) -> &str {
				&self.0
			}
		}
		impl From<$name> for String {
			fn from(value: $name) -> Self {
				value.0
			}
		}
		impl TryFrom<String> for $name {
			type Error = IdentifierError;

			fn try_from(value: String) -> Result<Self, Self::Error> {
				validate_view($kind, &value)?;

				Ok(Self(value))
			}
		}
		impl Borrow<str> for $name {
			fn borrow(&self) -> &str {
				&self.0
			}
		}
		impl Debug for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				write!(f, concat!($kind, "({})"), self.0)
			}
		}
		impl Display for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				f.write_str(&self.0)
			}
		}
		impl FromStr for $name {
			type Err = IdentifierError;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				Self::new(s)
			}
		}
	};
}

const IDENTIFIER_MAX_LEN: usize = 128;
const META_ACCOUNT_PREFIX: &str = "act_";

/// Error returned when identifier validation fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum IdentifierError {
	/// The identifier was empty.
	#[error("{kind} identifier cannot be empty.")]
	Empty {
		/// Kind of identifier (organization, account).
		kind: &'static str,
	},
	/// The identifier contains whitespace characters.
	#[error("{kind} identifier contains whitespace.")]
	ContainsWhitespace {
		/// Kind of identifier (organization, account).
		kind: &'static str,
	},
	/// The identifier exceeded the allowed character count.
	#[error("{kind} identifier exceeds {max} characters.")]
	TooLong {
		/// Kind of identifier (organization, account).
		kind: &'static str,
		/// Maximum permitted character count.
		max: usize,
	},
	/// The identifier does not name a known value.
	#[error("{kind} identifier `{value}` is not recognized.")]
	Unknown {
		/// Kind of identifier (platform).
		kind: &'static str,
		/// Unrecognized input.
		value: String,
	},
}

def_id! { OrgId, "Identifier of the organization that owns a platform connection.", "Org" }
def_id! {
	AccountId,
	"Platform-side ad account identifier, stored in its bare numeric form.",
	"Account"
}
impl AccountId {
	/// Normalizes a caller-supplied account id for `platform`.
	///
	/// Meta ids may carry the `act_` prefix and Google Ads customer ids may carry dashes
	/// (`123-456-7890`); both are stripped. What remains must be ASCII digits.
	pub fn for_platform(platform: Platform, raw: &str) -> Result<Self, ValidationError> {
		let trimmed = raw.trim();
		let bare = match platform {
			Platform::Meta =>
				trimmed.strip_prefix(META_ACCOUNT_PREFIX).unwrap_or(trimmed).to_owned(),
			Platform::GoogleAds => trimmed.replace('-', ""),
		};

		if bare.is_empty() || !bare.bytes().all(|b| b.is_ascii_digit()) {
			return Err(ValidationError::InvalidAccountId { input: raw.to_owned(), platform });
		}

		Ok(Self::new(bare)?)
	}

	/// Returns the id as the platform addresses it in URL paths (`act_<id>` for Meta).
	pub fn path_segment(&self, platform: Platform) -> String {
		match platform {
			Platform::Meta => format!("{META_ACCOUNT_PREFIX}{}", self.0),
			Platform::GoogleAds => self.0.clone(),
		}
	}
}

/// Advertising platforms reachable through the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
	/// Meta Marketing (Graph) API.
	Meta,
	/// Google Ads API.
	GoogleAds,
}
impl Platform {
	/// Every supported platform.
	pub const ALL: [Platform; 2] = [Platform::Meta, Platform::GoogleAds];

	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Platform::Meta => "meta",
			Platform::GoogleAds => "google_ads",
		}
	}
}
impl Display for Platform {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
impl FromStr for Platform {
	type Err = IdentifierError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"meta" => Ok(Platform::Meta),
			"google_ads" => Ok(Platform::GoogleAds),
			"" => Err(IdentifierError::Empty { kind: "Platform" }),
			_ => Err(IdentifierError::Unknown { kind: "Platform", value: s.to_owned() }),
		}
	}
}

fn validate_view(kind: &'static str, view: &str) -> Result<(), IdentifierError> {
	if view.is_empty() {
		return Err(IdentifierError::Empty { kind });
	}
	if view.chars().any(char::is_whitespace) {
		return Err(IdentifierError::ContainsWhitespace { kind });
	}
	if view.len() > IDENTIFIER_MAX_LEN {
		return Err(IdentifierError::TooLong { kind, max: IDENTIFIER_MAX_LEN });
	}

	Ok(())
}
