//! Claims decoding for signed identity credentials.
//!
//! Only the payload segment is read. The signature is not verified here; whoever minted the
//! credential and whoever accepts it on refresh are responsible for that.

// crates.io
use base64::{
	Engine,
	engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD},
};
use time::{UtcOffset, format_description::well_known::Rfc3339};
// self
use crate::{
	_prelude::*,
	auth::{IdentityKind, TokenSecret},
	error::MalformedCredentialError,
	http,
};

/// Claims carried in the payload of a scoped identity credential.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdentityClaims {
	/// Audience the credential was issued for.
	pub audience: String,
	/// Expiry instant, normalized to UTC.
	pub expires_on: OffsetDateTime,
	/// Location to call for renewal.
	pub refresh_uri: Url,
}
impl IdentityClaims {
	/// Decodes the payload segment of a compact signed credential.
	pub fn decode(signed: &str) -> Result<Self, MalformedCredentialError> {
		let payload = payload_segment(signed)?;
		let bytes = URL_SAFE_NO_PAD
			.decode(payload)
			.or_else(|e| STANDARD_NO_PAD.decode(payload).map_err(|_| e))?;
		let raw: RawClaims = http::parse_json(&bytes).map_err(MalformedCredentialError::Claims)?;
		let expires_on = OffsetDateTime::parse(&raw.expires_on, &Rfc3339)
			.map_err(|source| MalformedCredentialError::InvalidExpiry {
				value: raw.expires_on.clone(),
				source,
			})?
			.to_offset(UtcOffset::UTC);
		let refresh_uri = Url::parse(&raw.refresh_uri).map_err(|source| {
			MalformedCredentialError::InvalidRefreshUri { value: raw.refresh_uri.clone(), source }
		})?;

		Ok(Self { audience: raw.audience, expires_on, refresh_uri })
	}

	/// Classification derived from [`IdentityClaims::audience`].
	pub fn kind(&self) -> IdentityKind {
		IdentityKind::from_audience(&self.audience)
	}
}

/// Lifecycle state of an identity credential, driven purely by the wall clock.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IdentityStatus {
	/// The credential is usable.
	Valid,
	/// The credential reached its expiry and must be refreshed.
	Expired,
}

/// Immutable state of a scoped identity credential.
///
/// A snapshot can only be produced by decoding a key, so its classification, expiry, and
/// refresh location always match the claims embedded in that key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdentitySnapshot {
	key: TokenSecret,
	key_type: IdentityKind,
	expires: OffsetDateTime,
	refresh_uri: Url,
}
impl IdentitySnapshot {
	/// Decodes `key` and derives every field from its claims.
	pub fn decode(key: impl Into<String>) -> Result<Self, MalformedCredentialError> {
		let key = key.into();
		let claims = IdentityClaims::decode(&key)?;

		Ok(Self {
			key: TokenSecret::new(key),
			key_type: claims.kind(),
			expires: claims.expires_on,
			refresh_uri: claims.refresh_uri,
		})
	}

	/// Raw signed credential; the authoritative source of every other field.
	pub fn key(&self) -> &TokenSecret {
		&self.key
	}

	/// Classification of the credential's audience.
	pub fn key_type(&self) -> IdentityKind {
		self.key_type
	}

	/// Expiry instant in UTC.
	pub fn expires(&self) -> OffsetDateTime {
		self.expires
	}

	/// Location to call for renewal.
	pub fn refresh_uri(&self) -> &Url {
		&self.refresh_uri
	}

	/// Computes the lifecycle status at a given instant.
	pub fn status_at(&self, instant: OffsetDateTime) -> IdentityStatus {
		if instant >= self.expires { IdentityStatus::Expired } else { IdentityStatus::Valid }
	}

	/// Returns `true` if the credential has expired at the provided instant.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		matches!(self.status_at(instant), IdentityStatus::Expired)
	}
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawClaims {
	#[serde(alias = "aud")]
	audience: String,
	expires_on: String,
	refresh_uri: String,
}

fn payload_segment(signed: &str) -> Result<&str, MalformedCredentialError> {
	let mut segments = signed.trim().split('.');

	match (segments.next(), segments.next(), segments.next(), segments.next()) {
		(Some(_header), Some(payload), Some(_signature), None) if !payload.is_empty() =>
			Ok(payload.trim_end_matches('=')),
		_ => Err(MalformedCredentialError::InvalidStructure),
	}
}
