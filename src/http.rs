//! Transport primitives for credential exchanges.
//!
//! [`TokenHttpClient`] is the crate's only dependency on an HTTP stack. The issuer and every
//! identity credential hold it behind an `Arc`, so one pooled client can serve the whole
//! process while tests substitute a fake. The default [`ReqwestHttpClient`] wraps a plain
//! [`ReqwestClient`]; hand it a tuned client through [`ReqwestHttpClient::with_client`].

// crates.io
use oauth2::{
	AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse,
	http::{
		HeaderMap, Method, Request,
		header::{ACCEPT, CONTENT_TYPE, RETRY_AFTER},
	},
};
use serde::de::DeserializeOwned;
use time::format_description::well_known::Rfc2822;
// self
use crate::{
	_prelude::*,
	error::{ConfigError, TransportError},
};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
const JSON_CONTENT_TYPE: &str = "application/json";

/// Abstraction over HTTP transports capable of executing credential exchanges.
///
/// Implementations must be `Send + Sync + 'static` so they can be shared across issuers and
/// credentials without additional wrappers, and the handles they return must own whatever
/// state is required so their request futures remain `Send` for the lifetime of the in-flight
/// operation.
pub trait TokenHttpClient
where
	Self: 'static + Send + Sync,
{
	/// Concrete error emitted by the underlying transport.
	type TransportError: 'static + Send + Sync + StdError;

	/// [`AsyncHttpClient`] handle used for a single request.
	type Handle: for<'c> AsyncHttpClient<
			'c,
			Error = HttpClientError<Self::TransportError>,
			Future: 'c + Send,
		>
		+ 'static
		+ Send
		+ Sync;

	/// Builds a handle for the next request.
	fn handle(&self) -> Self::Handle;
}

/// Status details of an HTTP response, captured for error reporting.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResponseMetadata {
	/// HTTP status code.
	pub status: u16,
	/// Standard reason phrase for `status`, not the phrase sent by the server.
	///
	/// Non-standard codes yield `Unknown Status`; `status` still carries the number.
	pub reason: String,
	/// Retry-After hint expressed as a relative duration.
	pub retry_after: Option<Duration>,
}
impl ResponseMetadata {
	/// Captures status, reason phrase, and retry hint from a response.
	pub fn from_response(response: &HttpResponse) -> Self {
		let status = response.status();

		Self {
			status: status.as_u16(),
			reason: status.canonical_reason().unwrap_or("Unknown Status").to_owned(),
			retry_after: parse_retry_after(response.headers()),
		}
	}
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestHttpClient(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestHttpClient {
	/// Wraps an existing reqwest [`ReqwestClient`], typically the process-wide pooled one.
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestHttpClient {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestHttpClient {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl TokenHttpClient for ReqwestHttpClient {
	type Handle = ReqwestHandle;
	type TransportError = ReqwestError;

	fn handle(&self) -> Self::Handle {
		ReqwestHandle(self.0.clone())
	}
}

/// Request handle returned by [`ReqwestHttpClient`].
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug)]
pub struct ReqwestHandle(ReqwestClient);
#[cfg(feature = "reqwest")]
impl<'c> AsyncHttpClient<'c> for ReqwestHandle {
	type Error = HttpClientError<ReqwestError>;
	type Future =
		Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send + Sync>>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		let client = self.0.clone();

		Box::pin(async move {
			let response =
				client.execute(request.try_into().map_err(Box::new)?).await.map_err(Box::new)?;
			let status = response.status();
			let headers = response.headers().to_owned();
			let mut response_new =
				HttpResponse::new(response.bytes().await.map_err(Box::new)?.to_vec());

			*response_new.status_mut() = status;
			*response_new.headers_mut() = headers;

			Ok(response_new)
		})
	}
}

/// Builds a form-encoded `POST` request.
pub(crate) fn form_request(endpoint: &Url, fields: &[(&str, &str)]) -> Result<HttpRequest> {
	let body = url::form_urlencoded::Serializer::new(String::new()).extend_pairs(fields).finish();

	post(endpoint, FORM_CONTENT_TYPE, body.into_bytes())
}

/// Builds a JSON `POST` request.
pub(crate) fn json_request<T>(endpoint: &Url, body: &T) -> Result<HttpRequest>
where
	T: ?Sized + Serialize,
{
	let body = serde_json::to_vec(body).map_err(ConfigError::from)?;

	post(endpoint, JSON_CONTENT_TYPE, body)
}

/// Dispatches a request through a fresh handle, mapping transport failures.
pub(crate) async fn send<C>(client: &C, request: HttpRequest) -> Result<HttpResponse>
where
	C: ?Sized + TokenHttpClient,
{
	let handle = client.handle();

	handle.call(request).await.map_err(map_client_error)
}

/// Parses a JSON response body while keeping the path of the failing field.
pub(crate) fn parse_json<T>(body: &[u8]) -> Result<T, serde_path_to_error::Error<serde_json::Error>>
where
	T: DeserializeOwned,
{
	let mut deserializer = serde_json::Deserializer::from_slice(body);

	serde_path_to_error::deserialize(&mut deserializer)
}

fn post(endpoint: &Url, content_type: &'static str, body: Vec<u8>) -> Result<HttpRequest> {
	Request::builder()
		.method(Method::POST)
		.uri(endpoint.as_str())
		.header(CONTENT_TYPE, content_type)
		.header(ACCEPT, JSON_CONTENT_TYPE)
		.body(body)
		.map_err(|e| ConfigError::from(e).into())
}

fn map_client_error<E>(err: HttpClientError<E>) -> Error
where
	E: 'static + Send + Sync + StdError,
{
	match err {
		HttpClientError::Reqwest(inner) => TransportError::network(*inner).into(),
		HttpClientError::Http(inner) => ConfigError::from(inner).into(),
		HttpClientError::Io(inner) => TransportError::Io(inner).into(),
		HttpClientError::Other(message) => TransportError::Other { message }.into(),
		other => TransportError::Other { message: format!("{other:?}") }.into(),
	}
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
	let value = headers.get(RETRY_AFTER)?;
	let raw = value.to_str().ok()?.trim();

	if let Ok(secs) = raw.parse::<u32>() {
		return Some(Duration::seconds(i64::from(secs)));
	}
	if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
		let delta = moment - OffsetDateTime::now_utc();

		if delta.is_positive() {
			return Some(delta);
		}
	}

	None
}

#[cfg(test)]
mod tests {
	// crates.io
	use oauth2::http::{HeaderValue, StatusCode};
	// self
	use super::*;

	fn endpoint() -> Url {
		Url::parse("https://login.example.com/tenant/oauth2/token")
			.expect("Failed to parse token endpoint URL.")
	}

	#[test]
	fn form_requests_encode_fields() {
		let request = form_request(
			&endpoint(),
			&[("grant_type", "client_credentials"), ("resource", "https://onestore.microsoft.com")],
		)
		.expect("Form request should build.");

		assert_eq!(request.method(), Method::POST);
		assert_eq!(request.uri(), "https://login.example.com/tenant/oauth2/token");
		assert_eq!(
			request.headers().get(CONTENT_TYPE).and_then(|v| v.to_str().ok()),
			Some(FORM_CONTENT_TYPE)
		);
		assert_eq!(
			String::from_utf8_lossy(request.body()),
			"grant_type=client_credentials&resource=https%3A%2F%2Fonestore.microsoft.com"
		);
	}

	#[test]
	fn json_requests_serialize_body() {
		let request = json_request(&endpoint(), &serde_json::json!({ "key": "value" }))
			.expect("JSON request should build.");

		assert_eq!(
			request.headers().get(CONTENT_TYPE).and_then(|v| v.to_str().ok()),
			Some(JSON_CONTENT_TYPE)
		);
		assert_eq!(request.body().as_slice(), br#"{"key":"value"}"#);
	}

	#[test]
	fn metadata_captures_reason_and_retry_hint() {
		let mut response = HttpResponse::new(Vec::new());

		*response.status_mut() = StatusCode::TOO_MANY_REQUESTS;
		response.headers_mut().insert(RETRY_AFTER, HeaderValue::from_static("12"));

		let meta = ResponseMetadata::from_response(&response);

		assert_eq!(meta.status, 429);
		assert_eq!(meta.reason, "Too Many Requests");
		assert_eq!(meta.retry_after, Some(Duration::seconds(12)));
	}

	#[test]
	fn metadata_keeps_non_standard_status_codes() {
		let mut response = HttpResponse::new(Vec::new());

		*response.status_mut() =
			StatusCode::from_u16(599).expect("599 should be a valid status code.");

		let meta = ResponseMetadata::from_response(&response);

		assert_eq!(meta.status, 599);
		assert_eq!(meta.reason, "Unknown Status");
		assert_eq!(meta.retry_after, None);
	}

	#[test]
	fn retry_after_ignores_garbage_and_past_dates() {
		let mut headers = HeaderMap::new();

		assert_eq!(parse_retry_after(&headers), None);

		headers.insert(RETRY_AFTER, HeaderValue::from_static("soon"));

		assert_eq!(parse_retry_after(&headers), None);

		headers.insert(RETRY_AFTER, HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 +0000"));

		assert_eq!(parse_retry_after(&headers), None);
	}

	#[test]
	fn io_failures_map_to_transport_errors() {
		let err = map_client_error::<std::io::Error>(HttpClientError::Io(std::io::Error::other(
			"connection reset",
		)));

		assert!(matches!(err, Error::Transport(TransportError::Io(_))));
	}
}
