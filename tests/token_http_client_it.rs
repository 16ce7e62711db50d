// std
use std::{
	collections::VecDeque,
	error::Error as StdError,
	fmt::{Display, Formatter, Result as FmtResult},
	pin::Pin,
	sync::Arc,
};
// crates.io
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use parking_lot::Mutex;
use url::form_urlencoded;
// self
use store_credentials::{
	auth::{COLLECTIONS_AUDIENCE, IdentityKind, PURCHASE_AUDIENCE},
	error::{Error, TransportError},
	http::TokenHttpClient,
	identity::{RefreshOutcome, ScopedIdentityCredential},
	issuer::{IssuerConfig, ServiceCredentialIssuer},
	oauth2::{
		AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse,
		http::{StatusCode, header::CONTENT_TYPE},
	},
};

const REFRESH_URI: &str = "https://collections.mp.example/b2b/keys/renew";

#[derive(Debug)]
enum FakeTransportError {
	Offline,
}
impl Display for FakeTransportError {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Self::Offline => write!(f, "Transport offline."),
		}
	}
}
impl StdError for FakeTransportError {}

#[derive(Clone, Debug)]
struct RecordedRequest {
	uri: String,
	content_type: Option<String>,
	body: Vec<u8>,
}

type Scripted = Result<(u16, String), FakeTransportError>;

#[derive(Default)]
struct FakeState {
	requests: Mutex<Vec<RecordedRequest>>,
	responses: Mutex<VecDeque<Scripted>>,
}

#[derive(Clone, Default)]
struct FakeHttpClient(Arc<FakeState>);
impl FakeHttpClient {
	fn scripted(responses: impl IntoIterator<Item = Scripted>) -> Self {
		let client = Self::default();

		client.0.responses.lock().extend(responses);

		client
	}

	fn recorded(&self) -> Vec<RecordedRequest> {
		self.0.requests.lock().clone()
	}
}
impl TokenHttpClient for FakeHttpClient {
	type Handle = FakeHttpHandle;
	type TransportError = FakeTransportError;

	fn handle(&self) -> Self::Handle {
		FakeHttpHandle(self.0.clone())
	}
}

struct FakeHttpHandle(Arc<FakeState>);
impl<'a> AsyncHttpClient<'a> for FakeHttpHandle {
	type Error = HttpClientError<FakeTransportError>;
	type Future =
		Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'a + Send + Sync>>;

	fn call(&'a self, request: HttpRequest) -> Self::Future {
		let state = self.0.clone();

		Box::pin(async move {
			state.requests.lock().push(RecordedRequest {
				uri: request.uri().to_string(),
				content_type: request
					.headers()
					.get(CONTENT_TYPE)
					.and_then(|value| value.to_str().ok())
					.map(ToOwned::to_owned),
				body: request.body().clone(),
			});

			let next = state.responses.lock().pop_front();

			match next {
				Some(Ok((status, body))) => {
					let mut response = HttpResponse::new(body.into_bytes());

					*response.status_mut() =
						StatusCode::from_u16(status).expect("Scripted status should be valid.");

					Ok(response)
				},
				Some(Err(e)) => Err(HttpClientError::Reqwest(Box::new(e))),
				None => Err(HttpClientError::Other("No scripted response left.".into())),
			}
		})
	}
}

fn sign(audience: &str, expires_on: &str) -> String {
	let payload = URL_SAFE_NO_PAD.encode(
		serde_json::json!({
			"audience": audience,
			"expiresOn": expires_on,
			"refreshUri": REFRESH_URI,
		})
		.to_string(),
	);

	format!("eyJhbGciOiJSUzI1NiJ9.{payload}.c2ln")
}

fn build_issuer(http_client: FakeHttpClient) -> ServiceCredentialIssuer<FakeHttpClient> {
	ServiceCredentialIssuer::with_http_client(
		IssuerConfig::new("contoso", "fake-client", "fake-secret"),
		http_client,
	)
	.expect("Issuer should build from a complete configuration.")
}

#[tokio::test]
async fn issuer_posts_client_credentials_form() {
	let http_client = FakeHttpClient::scripted([Ok((
		200,
		r#"{"access_token":"minted","token_type":"Bearer","expires_in":"3600"}"#.into(),
	))]);
	let issuer = build_issuer(http_client.clone());
	let credential =
		issuer.issue(COLLECTIONS_AUDIENCE).await.expect("Scripted exchange should succeed.");

	assert_eq!(credential.access_token.expose(), "minted");
	assert_eq!(credential.authorization_header(), "Bearer minted");

	let recorded = http_client.recorded();

	assert_eq!(recorded.len(), 1, "Exactly one request must be sent.");
	assert_eq!(recorded[0].uri, "https://login.microsoftonline.com/contoso/oauth2/token");
	assert_eq!(recorded[0].content_type.as_deref(), Some("application/x-www-form-urlencoded"));

	let fields = form_urlencoded::parse(&recorded[0].body).into_owned().collect::<Vec<_>>();

	assert_eq!(
		fields,
		[
			("grant_type".to_owned(), "client_credentials".to_owned()),
			("client_id".to_owned(), "fake-client".to_owned()),
			("client_secret".to_owned(), "fake-secret".to_owned()),
			("resource".to_owned(), COLLECTIONS_AUDIENCE.to_owned()),
		]
	);
}

#[tokio::test]
async fn transport_failures_are_wrapped() {
	let http_client = FakeHttpClient::scripted([Err(FakeTransportError::Offline)]);
	let issuer = build_issuer(http_client.clone());
	let err = issuer.issue_service().await.expect_err("Offline transport must fail.");

	match &err {
		Error::Transport(TransportError::Network { source }) =>
			assert_eq!(source.to_string(), "Transport offline."),
		other => panic!("Unexpected error variant: {other:?}."),
	}

	assert!(err.is_transient());
	assert_eq!(http_client.recorded().len(), 1);
}

#[tokio::test]
async fn whitespace_audience_is_sent_verbatim() {
	let http_client = FakeHttpClient::scripted([Ok((
		200,
		r#"{"access_token":"minted","token_type":"Bearer","expires_in":60}"#.into(),
	))]);
	let issuer = build_issuer(http_client.clone());
	let credential = issuer.issue(" ").await.expect("Non-empty audiences are not validated.");

	assert_eq!(credential.audience.as_ref(), " ");

	let recorded = http_client.recorded();

	assert_eq!(recorded.len(), 1, "Exactly one request must be sent.");
	assert!(
		form_urlencoded::parse(&recorded[0].body)
			.any(|(key, value)| key == "resource" && value == " ")
	);
}

#[tokio::test]
async fn refresh_transport_failure_keeps_the_snapshot() {
	let http_client = FakeHttpClient::scripted([Err(FakeTransportError::Offline)]);
	let credential: ScopedIdentityCredential<FakeHttpClient> =
		ScopedIdentityCredential::with_http_client(
			sign(PURCHASE_AUDIENCE, "2024-01-01T00:00:00Z"),
			http_client.clone(),
		)
		.expect("Purchase key should decode.");
	let before = credential.snapshot();
	let err = credential.refresh("service-bearer").await.expect_err("Offline refresh must fail.");

	assert!(matches!(err, Error::Transport(TransportError::Network { .. })));
	assert_eq!(*credential.snapshot(), *before);
	assert_eq!(credential.key_type(), IdentityKind::PurchaseIdentity);
	assert_eq!(credential.refresh_metrics.failures(), 1);
	assert_eq!(http_client.recorded().len(), 1);
}

#[tokio::test]
async fn refresh_posts_json_to_the_claimed_uri() {
	let original = sign(PURCHASE_AUDIENCE, "2024-01-01T00:00:00Z");
	let renewed = sign(COLLECTIONS_AUDIENCE, "2025-06-01T00:00:00Z");
	let http_client = FakeHttpClient::scripted([Ok((
		200,
		serde_json::json!({ "key": renewed }).to_string(),
	))]);
	let credential: ScopedIdentityCredential<FakeHttpClient> =
		ScopedIdentityCredential::with_http_client(original.clone(), http_client.clone())
			.expect("Purchase key should decode.");
	let outcome = credential.refresh("service-bearer").await.expect("Refresh should succeed.");

	assert_eq!(outcome, RefreshOutcome::Updated);
	assert_eq!(credential.key_type(), IdentityKind::CollectionsIdentity);

	let recorded = http_client.recorded();

	assert_eq!(recorded.len(), 1, "Exactly one request must be sent.");
	assert_eq!(recorded[0].uri, REFRESH_URI);
	assert_eq!(recorded[0].content_type.as_deref(), Some("application/json"));

	let body: serde_json::Value =
		serde_json::from_slice(&recorded[0].body).expect("Refresh body should be JSON.");

	assert_eq!(
		body,
		serde_json::json!({ "serviceToken": "service-bearer", "userStoreId": original })
	);
}

#[tokio::test]
async fn one_transport_serves_issuer_and_credentials() {
	let renewed = sign(COLLECTIONS_AUDIENCE, "2025-06-01T00:00:00Z");
	let http_client = Arc::new(FakeHttpClient::scripted([
		Ok((200, r#"{"access_token":"svc","token_type":"Bearer","expires_in":60}"#.into())),
		Ok((200, serde_json::json!({ "key": renewed }).to_string())),
	]));
	let issuer: ServiceCredentialIssuer<FakeHttpClient> =
		ServiceCredentialIssuer::with_http_client(
			IssuerConfig::new("contoso", "fake-client", "fake-secret"),
			http_client.clone(),
		)
		.expect("Issuer should build from a complete configuration.");
	let credential: ScopedIdentityCredential<FakeHttpClient> =
		ScopedIdentityCredential::with_http_client(
			sign(PURCHASE_AUDIENCE, "2024-01-01T00:00:00Z"),
			http_client.clone(),
		)
		.expect("Purchase key should decode.");
	let service = issuer.issue_purchase().await.expect("Scripted exchange should succeed.");

	credential
		.refresh(service.access_token.expose())
		.await
		.expect("Refresh should succeed with the issued credential.");

	assert!(Arc::ptr_eq(&issuer.http_client, &credential.http_client));
	assert_eq!(http_client.recorded().len(), 2);
	assert_eq!(credential.key().expose(), renewed);
}
