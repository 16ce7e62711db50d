//! Validated identifiers used by the token exchange.

// std
use std::borrow::Borrow;
// self
use crate::{_prelude::*, error::ConfigError};

macro_rules! def_id {
	($name:ident, $doc:literal, $field:literal, $validate:ident) => {
		#[doc = $doc]
		#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
		pub struct $name(String);
		impl $name {
			/// Creates a new identifier, rejecting input that carries no value.
			pub fn new(value: impl AsRef<str>) -> Result<Self, ConfigError> {
				let view = value.as_ref();

				$validate($field, view)?;

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
			type Error = ConfigError;

			fn try_from(value: String) -> Result<Self, Self::Error> {
				$validate($field, &value)?;

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
				write!(f, concat!(stringify!($name), "({})"), self.0)
			}
		}
		impl Display for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				f.write_str(&self.0)
			}
		}
		impl FromStr for $name {
			type Err = ConfigError;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				Self::new(s)
			}
		}
	};
}

def_id! {
	TenantId,
	"Directory (tenant) identifier that selects the token endpoint.",
	"tenant_id",
	reject_blank
}
def_id! {
	ClientId,
	"Application identifier presented in the client-credentials grant.",
	"client_id",
	reject_blank
}
def_id! {
	Audience,
	"Intended recipient of a credential, sent verbatim as the grant's `resource`.",
	"audience",
	reject_empty
}

fn reject_blank(field: &'static str, view: &str) -> Result<(), ConfigError> {
	reject_empty(field, view.trim())
}

// Audiences are opaque to the issuer; only an absent value is refused.
fn reject_empty(field: &'static str, view: &str) -> Result<(), ConfigError> {
	if view.is_empty() {
		return Err(ConfigError::Missing { field });
	}

	Ok(())
}
