//! Well-known store audiences and the identity classification derived from them.

// self
use crate::_prelude::*;

/// Audience of service-to-service credentials.
pub const SERVICE_AUDIENCE: &str = "https://onestore.microsoft.com";
/// Audience of service credentials used to mint collections identity keys, and of the
/// collections identity keys themselves.
pub const COLLECTIONS_AUDIENCE: &str = "https://collections.mp.microsoft.com/v6.0/keys";
/// Audience of service credentials used to mint purchase identity keys, and of the purchase
/// identity keys themselves.
pub const PURCHASE_AUDIENCE: &str = "https://purchase.mp.microsoft.com/v6.0/keys";

/// Classification of a scoped identity credential by the audience it was issued for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IdentityKind {
	/// Issued for the collections audience.
	CollectionsIdentity,
	/// Issued for the purchase audience.
	PurchaseIdentity,
	/// Issued for an audience outside the known set.
	Unknown,
}
impl IdentityKind {
	/// Maps an audience to its classification by exact match; anything else is
	/// [`IdentityKind::Unknown`].
	pub fn from_audience(audience: &str) -> Self {
		match audience {
			COLLECTIONS_AUDIENCE => Self::CollectionsIdentity,
			PURCHASE_AUDIENCE => Self::PurchaseIdentity,
			_ => Self::Unknown,
		}
	}

	/// Audience this classification corresponds to, if it is a known one.
	pub const fn audience(self) -> Option<&'static str> {
		match self {
			Self::CollectionsIdentity => Some(COLLECTIONS_AUDIENCE),
			Self::PurchaseIdentity => Some(PURCHASE_AUDIENCE),
			Self::Unknown => None,
		}
	}

	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::CollectionsIdentity => "collections",
			Self::PurchaseIdentity => "purchase",
			Self::Unknown => "unknown",
		}
	}
}
impl Display for IdentityKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
