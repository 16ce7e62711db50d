//! Immutable service credential returned by the client-credentials exchange.

// self
use crate::{
	_prelude::*,
	auth::{Audience, TokenSecret},
	error::RemoteExchangeError,
	http,
};

/// Bearer credential scoped to a single audience.
///
/// A new instance is produced by every [`issue`](crate::issuer::ServiceCredentialIssuer::issue)
/// call; the caller owns it outright.
#[derive(Clone, Debug)]
pub struct ServiceCredential {
	/// Audience the credential was requested for.
	pub audience: Audience,
	/// Bearer token; callers must avoid logging it.
	pub access_token: TokenSecret,
	/// Token type reported by the endpoint, usually `Bearer`.
	pub token_type: String,
	/// Instant the response was received.
	pub issued_at: OffsetDateTime,
	/// Instant the credential stops being valid.
	pub expires_at: OffsetDateTime,
	/// Instant the credential becomes valid, when the endpoint reports one.
	pub not_before: Option<OffsetDateTime>,
}
impl ServiceCredential {
	/// Parses a successful token endpoint body received at `issued_at`.
	pub(crate) fn from_token_response(
		audience: Audience,
		body: &[u8],
		issued_at: OffsetDateTime,
	) -> Result<Self> {
		let response: TokenEndpointResponse = http::parse_json(body).map_err(|source| {
			RemoteExchangeError::TokenResponseParse { audience: audience.to_string(), source }
		})?;
		let expires_at = response
			.expires_at(issued_at)
			.filter(|expires_at| *expires_at > issued_at)
			.ok_or_else(|| RemoteExchangeError::InvalidExpiry { audience: audience.to_string() })?;
		let not_before = response
			.not_before
			.as_ref()
			.and_then(EpochField::seconds)
			.and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok());

		Ok(Self {
			audience,
			access_token: TokenSecret::new(response.access_token),
			token_type: response.token_type,
			issued_at,
			expires_at,
			not_before,
		})
	}

	/// Returns `true` if the credential has expired at the provided instant.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		instant >= self.expires_at
	}

	/// Returns `true` if the credential is expired relative to the current clock.
	pub fn is_expired(&self) -> bool {
		self.is_expired_at(OffsetDateTime::now_utc())
	}

	/// Remaining lifetime at the provided instant, clamped at zero.
	pub fn remaining_at(&self, instant: OffsetDateTime) -> Duration {
		let remaining = self.expires_at - instant;

		if remaining.is_negative() { Duration::ZERO } else { remaining }
	}

	/// Value for an `Authorization` header, e.g. `Bearer eyJ0...`.
	pub fn authorization_header(&self) -> String {
		format!("{} {}", self.token_type, self.access_token.expose())
	}
}

#[derive(Debug, Deserialize)]
struct TokenEndpointResponse {
	#[serde(alias = "accessToken")]
	access_token: String,
	#[serde(alias = "tokenType", default = "default_token_type")]
	token_type: String,
	#[serde(alias = "expiresIn", default)]
	expires_in: Option<EpochField>,
	#[serde(alias = "expiresOn", default)]
	expires_on: Option<EpochField>,
	#[serde(alias = "notBefore", default)]
	not_before: Option<EpochField>,
}
impl TokenEndpointResponse {
	fn expires_at(&self, issued_at: OffsetDateTime) -> Option<OffsetDateTime> {
		if let Some(secs) = self.expires_on.as_ref().and_then(EpochField::seconds) {
			return OffsetDateTime::from_unix_timestamp(secs).ok();
		}

		let secs = self.expires_in.as_ref().and_then(EpochField::seconds)?;

		if secs <= 0 {
			return None;
		}

		issued_at.checked_add(Duration::seconds(secs))
	}
}

// The v1 endpoint reports numeric fields as JSON strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EpochField {
	Number(i64),
	Text(String),
}
impl EpochField {
	fn seconds(&self) -> Option<i64> {
		match self {
			Self::Number(value) => Some(*value),
			Self::Text(value) => value.trim().parse().ok(),
		}
	}
}

fn default_token_type() -> String {
	"Bearer".into()
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros::datetime;
	// self
	use super::*;
	use crate::auth::SERVICE_AUDIENCE;

	fn audience() -> Audience {
		Audience::new(SERVICE_AUDIENCE).expect("Service audience should be valid.")
	}

	#[test]
	fn parses_string_encoded_v1_response() {
		let issued_at = datetime!(2024-05-01 12:00 UTC);
		let body = br#"{
			"token_type": "Bearer",
			"expires_in": "3599",
			"ext_expires_in": "3599",
			"expires_on": "1714568399",
			"not_before": "1714564499",
			"resource": "https://onestore.microsoft.com",
			"access_token": "eyJ0eXAi.service"
		}"#;
		let credential = ServiceCredential::from_token_response(audience(), body, issued_at)
			.expect("v1 token response should parse.");

		assert_eq!(credential.access_token.expose(), "eyJ0eXAi.service");
		assert_eq!(credential.expires_at, datetime!(2024-05-01 12:59:59 UTC));
		assert_eq!(credential.not_before, Some(datetime!(2024-05-01 11:54:59 UTC)));
		assert_eq!(credential.authorization_header(), "Bearer eyJ0eXAi.service");
	}

	#[test]
	fn falls_back_to_relative_expiry() {
		let issued_at = datetime!(2024-05-01 12:00 UTC);
		let body = br#"{"accessToken":"camel","tokenType":"bearer","expiresIn":600}"#;
		let credential = ServiceCredential::from_token_response(audience(), body, issued_at)
			.expect("camelCase token response should parse.");

		assert_eq!(credential.token_type, "bearer");
		assert_eq!(credential.expires_at, issued_at + Duration::minutes(10));
		assert!(!credential.is_expired_at(issued_at + Duration::minutes(9)));
		assert!(credential.is_expired_at(issued_at + Duration::minutes(10)));
		assert_eq!(credential.remaining_at(issued_at + Duration::hours(1)), Duration::ZERO);
	}

	#[test]
	fn rejects_missing_or_non_positive_expiry() {
		let issued_at = datetime!(2024-05-01 12:00 UTC);

		for body in [
			&br#"{"access_token":"t"}"#[..],
			&br#"{"access_token":"t","expires_in":"0"}"#[..],
			&br#"{"access_token":"t","expires_in":"soon"}"#[..],
		] {
			let err = ServiceCredential::from_token_response(audience(), body, issued_at)
				.expect_err("Responses without a usable expiry must fail.");

			assert!(matches!(err, Error::Remote(RemoteExchangeError::InvalidExpiry { .. })));
		}
	}

	#[test]
	fn malformed_json_names_the_audience() {
		let err = ServiceCredential::from_token_response(
			audience(),
			b"<html>",
			OffsetDateTime::now_utc(),
		)
		.expect_err("Non-JSON bodies must fail.");

		match err {
			Error::Remote(RemoteExchangeError::TokenResponseParse { audience, .. }) =>
				assert_eq!(audience, SERVICE_AUDIENCE),
			other => panic!("Unexpected error variant: {other:?}."),
		}
	}
}
