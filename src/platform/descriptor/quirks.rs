// self
use crate::_prelude::*;

/// Platform-specific quirks that influence token handling and authorization URLs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformQuirks {
	/// Character used to join scopes in authorize URLs and to split them in token responses.
	pub scope_delimiter: char,
	/// Extra query parameters appended to the authorize URL.
	pub authorize_params: Vec<(String, String)>,
	/// Token lifetime assumed when the token endpoint omits `expires_in`.
	pub default_token_lifetime: Duration,
}
impl PlatformQuirks {
	/// Meta joins scopes with commas and issues long-lived (60 day) user tokens.
	pub fn meta() -> Self {
		Self { scope_delimiter: ',', default_token_lifetime: Duration::days(60), ..Self::default() }
	}

	/// Google only issues refresh tokens for offline access with explicit consent.
	pub fn google_ads() -> Self {
		Self {
			authorize_params: vec![
				("access_type".into(), "offline".into()),
				("prompt".into(), "consent".into()),
			],
			..Self::default()
		}
	}
}
impl Default for PlatformQuirks {
	fn default() -> Self {
		Self {
			scope_delimiter: ' ',
			authorize_params: Vec::new(),
			default_token_lifetime: Duration::hours(1),
		}
	}
}
