//! Client-credentials issuer for audience-scoped service credentials.
//!
//! [`ServiceCredentialIssuer::issue`] performs exactly one `grant_type=client_credentials`
//! exchange against the tenant's token endpoint per call. There is no caching and no retry;
//! callers that want either layer it on top and decide their own backoff from
//! [`Error::is_transient`].

mod credential;

pub use credential::ServiceCredential;

// self
use crate::{
	_prelude::*,
	auth::{
		Audience, COLLECTIONS_AUDIENCE, ClientId, PURCHASE_AUDIENCE, SERVICE_AUDIENCE, TenantId,
		TokenSecret,
	},
	error::{ConfigError, RemoteExchangeError},
	http::{self, ResponseMetadata, TokenHttpClient},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestHttpClient;

/// Authority used when [`IssuerConfig::authority`] is unset.
pub const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com/";

#[cfg(feature = "reqwest")]
/// Issuer specialized for the crate's default reqwest transport.
pub type ReqwestIssuer = ServiceCredentialIssuer<ReqwestHttpClient>;

/// Settings required to run the client-credentials exchange.
///
/// Missing string fields deserialize as empty so that
/// [`ServiceCredentialIssuer::with_http_client`] can report which one is absent.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct IssuerConfig {
	/// Directory (tenant) identifier.
	#[serde(default)]
	pub tenant_id: String,
	/// Application (client) identifier.
	#[serde(default)]
	pub client_id: String,
	/// Application secret.
	#[serde(default)]
	pub client_secret: TokenSecret,
	/// Token authority; defaults to [`DEFAULT_AUTHORITY`].
	#[serde(default)]
	pub authority: Option<Url>,
}
impl IssuerConfig {
	/// Creates a configuration for the public authority.
	pub fn new(
		tenant_id: impl Into<String>,
		client_id: impl Into<String>,
		client_secret: impl Into<TokenSecret>,
	) -> Self {
		Self {
			tenant_id: tenant_id.into(),
			client_id: client_id.into(),
			client_secret: client_secret.into(),
			authority: None,
		}
	}

	/// Overrides the token authority (sovereign clouds, local mocks).
	pub fn with_authority(mut self, authority: Url) -> Self {
		self.authority = Some(authority);

		self
	}
}

/// Issues service credentials through the client-credentials grant.
pub struct ServiceCredentialIssuer<C>
where
	C: ?Sized + TokenHttpClient,
{
	/// HTTP client used for every token request.
	pub http_client: Arc<C>,
	tenant_id: TenantId,
	client_id: ClientId,
	client_secret: TokenSecret,
	token_endpoint: Url,
}
impl<C> ServiceCredentialIssuer<C>
where
	C: ?Sized + TokenHttpClient,
{
	/// Validates `config` once and binds the issuer to the caller-provided transport.
	///
	/// Fails with [`ConfigError::Missing`] naming the first empty value among `tenant_id`,
	/// `client_id`, and `client_secret`.
	pub fn with_http_client(config: IssuerConfig, http_client: impl Into<Arc<C>>) -> Result<Self> {
		let tenant_id = TenantId::new(&config.tenant_id)?;
		let client_id = ClientId::new(&config.client_id)?;

		if config.client_secret.is_blank() {
			return Err(ConfigError::Missing { field: "client_secret" }.into());
		}

		let token_endpoint = token_endpoint(config.authority.as_ref(), &tenant_id)?;

		Ok(Self {
			http_client: http_client.into(),
			tenant_id,
			client_id,
			client_secret: config.client_secret,
			token_endpoint,
		})
	}

	/// Tenant the issuer authenticates against.
	pub fn tenant_id(&self) -> &TenantId {
		&self.tenant_id
	}

	/// Client identifier presented in every exchange.
	pub fn client_id(&self) -> &ClientId {
		&self.client_id
	}

	/// Token endpoint derived from the authority and tenant.
	pub fn token_endpoint(&self) -> &Url {
		&self.token_endpoint
	}

	/// Requests a credential for `audience`.
	///
	/// An empty audience fails with [`ConfigError::Missing`] before any request is sent. Any
	/// other value is passed through unchanged as the grant's `resource`.
	pub async fn issue(&self, audience: &str) -> Result<ServiceCredential> {
		const KIND: FlowKind = FlowKind::ServiceToken;

		let span = FlowSpan::new(KIND, "issue", audience);

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.exchange(audience)).await;

		obs::record_flow_outcome(KIND, FlowOutcome::of(&result));

		result
	}

	/// Requests a service-to-service credential.
	pub async fn issue_service(&self) -> Result<ServiceCredential> {
		self.issue(SERVICE_AUDIENCE).await
	}

	/// Requests a credential authorized to mint and refresh collections identity keys.
	pub async fn issue_collections(&self) -> Result<ServiceCredential> {
		self.issue(COLLECTIONS_AUDIENCE).await
	}

	/// Requests a credential authorized to mint and refresh purchase identity keys.
	pub async fn issue_purchase(&self) -> Result<ServiceCredential> {
		self.issue(PURCHASE_AUDIENCE).await
	}

	async fn exchange(&self, audience: &str) -> Result<ServiceCredential> {
		let audience = Audience::new(audience)?;
		let request = http::form_request(
			&self.token_endpoint,
			&[
				("grant_type", "client_credentials"),
				("client_id", self.client_id.as_ref()),
				("client_secret", self.client_secret.expose()),
				("resource", audience.as_ref()),
			],
		)?;
		let response = http::send(self.http_client.as_ref(), request).await?;

		if !response.status().is_success() {
			let meta = ResponseMetadata::from_response(&response);

			return Err(RemoteExchangeError::TokenEndpoint {
				audience: audience.into(),
				status: meta.status,
				reason: meta.reason,
				retry_after: meta.retry_after,
			}
			.into());
		}

		ServiceCredential::from_token_response(audience, response.body(), OffsetDateTime::now_utc())
	}
}
#[cfg(feature = "reqwest")]
impl ServiceCredentialIssuer<ReqwestHttpClient> {
	/// Creates an issuer backed by a plain, non-shared reqwest client.
	///
	/// Use [`ServiceCredentialIssuer::with_http_client`] to share a pooled client instead.
	pub fn new(config: IssuerConfig) -> Result<Self> {
		Self::with_http_client(config, ReqwestHttpClient::default())
	}
}
impl<C> Clone for ServiceCredentialIssuer<C>
where
	C: ?Sized + TokenHttpClient,
{
	fn clone(&self) -> Self {
		Self {
			http_client: self.http_client.clone(),
			tenant_id: self.tenant_id.clone(),
			client_id: self.client_id.clone(),
			client_secret: self.client_secret.clone(),
			token_endpoint: self.token_endpoint.clone(),
		}
	}
}
impl<C> Debug for ServiceCredentialIssuer<C>
where
	C: ?Sized + TokenHttpClient,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ServiceCredentialIssuer")
			.field("tenant_id", &self.tenant_id)
			.field("client_id", &self.client_id)
			.field("token_endpoint", &self.token_endpoint.as_str())
			.finish_non_exhaustive()
	}
}

fn token_endpoint(authority: Option<&Url>, tenant_id: &TenantId) -> Result<Url, ConfigError> {
	let mut endpoint = match authority {
		Some(authority) => authority.clone(),
		None => Url::parse(DEFAULT_AUTHORITY)
			.map_err(|_| ConfigError::InvalidAuthority { authority: DEFAULT_AUTHORITY.into() })?,
	};
	let authority = endpoint.to_string();

	endpoint
		.path_segments_mut()
		.map_err(|_| ConfigError::InvalidAuthority { authority })?
		.pop_if_empty()
		.extend([tenant_id.as_ref(), "oauth2", "token"]);

	Ok(endpoint)
}
