//! Crate-level error types shared by the issuer, identity credentials, and transports.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;
type JsonPathError = serde_path_to_error::Error<serde_json::Error>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Missing or invalid local input.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Signed credential cannot be decoded into claims.
	#[error(transparent)]
	MalformedCredential(#[from] MalformedCredentialError),
	/// Token or refresh endpoint answered with a failure.
	#[error(transparent)]
	Remote(#[from] RemoteExchangeError),
	/// Transport failure (DNS, TCP, TLS, timeout).
	#[error(transparent)]
	Transport(#[from] TransportError),
}
impl Error {
	/// Returns `true` when a caller-side retry with backoff is reasonable.
	///
	/// Transport failures, throttling (429), and 5xx responses qualify; configuration and decode
	/// failures never do.
	pub fn is_transient(&self) -> bool {
		match self {
			Self::Transport(_) => true,
			Self::Remote(e) => e.status().is_some_and(|status| status == 429 || status >= 500),
			Self::Config(_) | Self::MalformedCredential(_) => false,
		}
	}
}

/// Configuration and validation failures raised before any request leaves the process.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// A required value was absent, empty, or whitespace only.
	#[error("Required value `{field}` is missing or empty.")]
	Missing {
		/// Name of the offending value.
		field: &'static str,
	},
	/// Authority URL cannot carry the tenant path segments.
	#[error("Authority `{authority}` cannot be used as a token endpoint base.")]
	InvalidAuthority {
		/// Configured authority.
		authority: String,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// Request body could not be encoded.
	#[error("Request body could not be encoded as JSON.")]
	RequestBody(#[from] serde_json::Error),
}

/// A signed credential could not be split or its payload is not valid claims data.
#[derive(Debug, ThisError)]
pub enum MalformedCredentialError {
	/// The credential is not a `header.payload.signature` compact token.
	#[error("Signed credential is not a three-segment compact token.")]
	InvalidStructure,
	/// The payload segment is not valid base64.
	#[error("Signed credential payload is not valid base64.")]
	PayloadEncoding(#[from] base64::DecodeError),
	/// The payload is not a claims object.
	#[error("Signed credential payload is not a valid claims object.")]
	Claims(#[source] JsonPathError),
	/// The `expiresOn` claim is not an RFC 3339 timestamp.
	#[error("Claim `expiresOn` is not a valid timestamp: {value}.")]
	InvalidExpiry {
		/// Raw claim value.
		value: String,
		/// Underlying parsing failure.
		#[source]
		source: time::error::Parse,
	},
	/// The `refreshUri` claim is not a URL.
	#[error("Claim `refreshUri` is not a valid URL: {value}.")]
	InvalidRefreshUri {
		/// Raw claim value.
		value: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
}

/// A remote endpoint answered, but not with a usable credential.
#[derive(Debug, ThisError)]
pub enum RemoteExchangeError {
	/// Token endpoint returned a non-success status.
	#[error("Token endpoint rejected the request for audience `{audience}`: {status} {reason}.")]
	TokenEndpoint {
		/// Audience that was requested.
		audience: String,
		/// HTTP status code.
		status: u16,
		/// Standard reason phrase for the status, not the server's own text.
		reason: String,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Token endpoint returned a body that is not a token response.
	#[error("Token endpoint returned malformed JSON for audience `{audience}`.")]
	TokenResponseParse {
		/// Audience that was requested.
		audience: String,
		/// Structured parsing failure.
		#[source]
		source: JsonPathError,
	},
	/// Token endpoint response carried no usable expiry.
	#[error("Token endpoint response for audience `{audience}` has no valid expiry.")]
	InvalidExpiry {
		/// Audience that was requested.
		audience: String,
	},
	/// Refresh endpoint returned a non-success status.
	#[error("Refresh endpoint `{uri}` rejected the request: {status} {reason}.")]
	RefreshEndpoint {
		/// Refresh URI that was called.
		uri: Url,
		/// HTTP status code.
		status: u16,
		/// Standard reason phrase for the status, not the server's own text.
		reason: String,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Refresh endpoint returned a body that is not a refresh response.
	#[error("Refresh endpoint `{uri}` returned malformed JSON.")]
	RefreshResponseParse {
		/// Refresh URI that was called.
		uri: Url,
		/// Structured parsing failure.
		#[source]
		source: JsonPathError,
	},
}
impl RemoteExchangeError {
	/// HTTP status of a rejected request, when the endpoint returned one.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::TokenEndpoint { status, .. } | Self::RefreshEndpoint { status, .. } =>
				Some(*status),
			_ => None,
		}
	}

	/// Retry-After hint of a rejected request, when the endpoint supplied one.
	pub fn retry_after(&self) -> Option<Duration> {
		match self {
			Self::TokenEndpoint { retry_after, .. } | Self::RefreshEndpoint { retry_after, .. } =>
				*retry_after,
			_ => None,
		}
	}
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling a credential endpoint.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling a credential endpoint.")]
	Io(#[from] std::io::Error),
	/// HTTP client failed without a structured error.
	#[error("HTTP client error occurred while calling a credential endpoint: {message}.")]
	Other {
		/// Transport-supplied description.
		message: String,
	},
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
