//! Scoped identity credentials ("StoreIds") that decode their own claims and refresh in place.
//!
//! A [`ScopedIdentityCredential`] keeps its state as one immutable [`IdentitySnapshot`] behind a
//! lock. Readers always receive a whole snapshot, and a successful
//! [`refresh`](ScopedIdentityCredential::refresh) swaps the snapshot in a single step, so no
//! reader can observe the key of one credential alongside the expiry of another. A failed
//! refresh never touches the snapshot.
//!
//! Concurrent refreshes on the same credential each send their own request. The first response
//! to land replaces the snapshot it was built from; later responses built from that same
//! snapshot are discarded and reported as [`RefreshOutcome::Superseded`].

mod claims;
mod metrics;

pub use claims::*;
pub use metrics::RefreshMetrics;

// self
use crate::{
	_prelude::*,
	auth::{IdentityKind, TokenSecret},
	error::{ConfigError, RemoteExchangeError},
	http::{self, ResponseMetadata, TokenHttpClient},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestHttpClient;

#[cfg(feature = "reqwest")]
/// Identity credential specialized for the crate's default reqwest transport.
pub type ReqwestIdentityCredential = ScopedIdentityCredential<ReqwestHttpClient>;

/// Result of a successful [`ScopedIdentityCredential::refresh`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RefreshOutcome {
	/// The refreshed credential replaced the snapshot the request was built from.
	Updated,
	/// Another refresh replaced that snapshot first; this response was discarded and the
	/// credential already holds the other refresh's result.
	Superseded,
}

/// User-scoped identity credential whose metadata is derived from its own claims.
pub struct ScopedIdentityCredential<C>
where
	C: ?Sized + TokenHttpClient,
{
	/// HTTP client used for refresh requests.
	pub http_client: Arc<C>,
	/// Shared metrics recorder for refresh outcomes.
	pub refresh_metrics: Arc<RefreshMetrics>,
	current: RwLock<Arc<IdentitySnapshot>>,
}
impl<C> ScopedIdentityCredential<C>
where
	C: ?Sized + TokenHttpClient,
{
	/// Decodes `signed` and binds the credential to the caller-provided transport.
	pub fn with_http_client(
		signed: impl Into<String>,
		http_client: impl Into<Arc<C>>,
	) -> Result<Self> {
		let snapshot = IdentitySnapshot::decode(signed)?;

		Ok(Self {
			http_client: http_client.into(),
			refresh_metrics: Default::default(),
			current: RwLock::new(Arc::new(snapshot)),
		})
	}

	/// Replaces the metrics recorder, e.g. to aggregate several credentials.
	pub fn with_refresh_metrics(mut self, metrics: Arc<RefreshMetrics>) -> Self {
		self.refresh_metrics = metrics;

		self
	}

	/// Returns the current state as one consistent snapshot.
	pub fn snapshot(&self) -> Arc<IdentitySnapshot> {
		self.current.read().clone()
	}

	/// Raw signed credential.
	pub fn key(&self) -> TokenSecret {
		self.snapshot().key().clone()
	}

	/// Classification of the credential's audience.
	pub fn key_type(&self) -> IdentityKind {
		self.snapshot().key_type()
	}

	/// Expiry instant in UTC.
	pub fn expires(&self) -> OffsetDateTime {
		self.snapshot().expires()
	}

	/// Location called by [`ScopedIdentityCredential::refresh`].
	pub fn refresh_uri(&self) -> Url {
		self.snapshot().refresh_uri().clone()
	}

	/// Computes the lifecycle status at a given instant.
	pub fn status_at(&self, instant: OffsetDateTime) -> IdentityStatus {
		self.snapshot().status_at(instant)
	}

	/// Returns `true` if the credential has expired at the provided instant.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		self.snapshot().is_expired_at(instant)
	}

	/// Returns `true` if the credential is expired relative to the current clock.
	pub fn is_expired(&self) -> bool {
		self.is_expired_at(OffsetDateTime::now_utc())
	}

	/// Exchanges the current key for a new one, authorized by a service credential.
	///
	/// `service_token` must be a currently valid service bearer token; its freshness is not
	/// checked here. Exactly one request is sent to the credential's own refresh URI. On any
	/// failure the current snapshot is left untouched.
	pub async fn refresh(&self, service_token: &str) -> Result<RefreshOutcome> {
		const KIND: FlowKind = FlowKind::IdentityRefresh;

		let base = self.snapshot();
		let span = FlowSpan::new(KIND, "refresh", base.refresh_uri().as_str());

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);
		self.refresh_metrics.record_attempt();

		let result = span.instrument(self.exchange(base, service_token)).await;

		match &result {
			Ok(outcome) => {
				self.refresh_metrics.record_success();

				if matches!(outcome, RefreshOutcome::Superseded) {
					self.refresh_metrics.record_superseded();
				}
			},
			Err(_) => self.refresh_metrics.record_failure(),
		}

		obs::record_flow_outcome(KIND, FlowOutcome::of(&result));

		result
	}

	async fn exchange(
		&self,
		base: Arc<IdentitySnapshot>,
		service_token: &str,
	) -> Result<RefreshOutcome> {
		if service_token.trim().is_empty() {
			return Err(ConfigError::Missing { field: "service_token" }.into());
		}

		let uri = base.refresh_uri();
		let request = http::json_request(
			uri,
			&RefreshRequest { service_token, user_store_id: base.key().expose() },
		)?;
		let response = http::send(self.http_client.as_ref(), request).await?;

		if !response.status().is_success() {
			let meta = ResponseMetadata::from_response(&response);

			return Err(RemoteExchangeError::RefreshEndpoint {
				uri: uri.clone(),
				status: meta.status,
				reason: meta.reason,
				retry_after: meta.retry_after,
			}
			.into());
		}

		let payload: RefreshResponse = http::parse_json(response.body()).map_err(|source| {
			RemoteExchangeError::RefreshResponseParse { uri: uri.clone(), source }
		})?;
		let refreshed = Arc::new(IdentitySnapshot::decode(payload.key)?);
		let mut current = self.current.write();

		if !Arc::ptr_eq(&current, &base) {
			return Ok(RefreshOutcome::Superseded);
		}

		*current = refreshed;

		Ok(RefreshOutcome::Updated)
	}
}
#[cfg(feature = "reqwest")]
impl ScopedIdentityCredential<ReqwestHttpClient> {
	/// Decodes `signed` and refreshes through a plain, non-shared reqwest client.
	pub fn new(signed: impl Into<String>) -> Result<Self> {
		Self::with_http_client(signed, ReqwestHttpClient::default())
	}
}
impl<C> Debug for ScopedIdentityCredential<C>
where
	C: ?Sized + TokenHttpClient,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ScopedIdentityCredential")
			.field("current", &self.snapshot())
			.field("refresh_metrics", &self.refresh_metrics)
			.finish_non_exhaustive()
	}
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
	service_token: &'a str,
	user_store_id: &'a str,
}

#[derive(Deserialize)]
struct RefreshResponse {
	key: String,
}
