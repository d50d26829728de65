//! Authenticated API client: request/response hooks around an [`HttpTransport`], a
//! single-flight token refresh, and session-expiry signalling.
//!
//! Every call goes through [`AuthClient::send`], which loops over three steps:
//! [`AuthClient::before_send`] attaches the bearer token (waiting out any in-flight refresh),
//! the transport executes the request, and non-success responses are handed to
//! [`AuthClient::on_error`]. A first `401` joins or starts the shared refresh and yields
//! [`RecoveryOutcome::Retry`]; everything else fails the call. The per-request
//! [`RequestContext`] guarantees at most one retry.

pub mod interceptor;
pub mod refresh;
pub mod session;

pub use interceptor::*;
pub use refresh::*;
pub use session::*;

// crates.io
use ::http::{
	HeaderMap, HeaderValue, Method, StatusCode,
	header::{ACCEPT, CONTENT_TYPE, HeaderName},
};
use serde::de::DeserializeOwned;
// self
#[cfg(feature = "reqwest")] use crate::http::ReqwestTransport;
use crate::{
	_prelude::*,
	auth::{TokenPair, TokenSecret},
	config::ClientConfig,
	error::{ConfigError, StatusError},
	http::{HttpRequest, HttpResponse, HttpTransport},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	store::TokenStore,
};

#[cfg(feature = "reqwest")]
/// Client specialized for the crate's default reqwest transport.
pub type ReqwestAuthClient = AuthClient<ReqwestTransport>;

const APPLICATION_JSON: &str = "application/json";

/// Authenticated client bound to one API base URL and one token store.
///
/// Clones are handles to the same client: they share the transport, the store, the
/// in-flight refresh slot, and the session listeners. Independently constructed clients
/// never share refresh state.
pub struct AuthClient<T>
where
	T: ?Sized + HttpTransport,
{
	/// Transport used for every outbound call, including the refresh exchange.
	pub transport: Arc<T>,
	/// Store holding the access token, refresh token, and session markers.
	pub store: Arc<dyn TokenStore>,
	/// Validated endpoints.
	pub config: Arc<ClientConfig>,
	/// Counters for refresh attempts, joins, successes, and failures.
	pub refresh_metrics: Arc<RefreshMetrics>,
	state: Arc<ClientState>,
	session: Arc<SessionGuard>,
}
impl<T> AuthClient<T>
where
	T: ?Sized + HttpTransport,
{
	/// Creates a client that reuses the caller-provided transport.
	pub fn with_transport(
		config: ClientConfig,
		store: Arc<dyn TokenStore>,
		transport: impl Into<Arc<T>>,
	) -> Self {
		Self {
			transport: transport.into(),
			store,
			config: Arc::new(config),
			refresh_metrics: Default::default(),
			state: Default::default(),
			session: Default::default(),
		}
	}

	/// Returns `true` while a refresh call is outstanding.
	pub fn is_refreshing(&self) -> bool {
		self.state.is_refreshing()
	}

	/// Current session epoch; bumped whenever the client saves a new token pair.
	pub fn session_epoch(&self) -> u64 {
		self.session.epoch()
	}

	/// Registers a listener for the session-expired signal.
	pub fn add_session_listener(&self, listener: Arc<dyn SessionListener>) {
		self.session.add_listener(listener);
	}

	/// Persists a pair obtained from login and starts a new session epoch.
	pub async fn establish_session(&self, pair: TokenPair) -> Result<()> {
		self.store.save_pair(&pair).await?;
		self.session.begin_epoch();

		Ok(())
	}

	/// Clears every piece of session state and notifies listeners once per epoch.
	///
	/// Returns whether listeners were notified by this call. Storage is cleared before the
	/// call returns, so callers may redirect to login right afterwards.
	pub async fn expire_session(&self, reason: SessionExpiredReason) -> Result<bool> {
		Ok(self.session.expire(self.store.as_ref(), reason).await?)
	}

	/// Forces a refresh, joining the in-flight one if there is any.
	pub async fn refresh_session(&self) -> Result<TokenPair> {
		Ok(self.refresh_shared().await?)
	}

	/// Builds a request for `path` relative to the configured base URL.
	pub fn request(&self, method: Method, path: &str) -> Result<ApiRequest> {
		let url = self.config.endpoint(path).map_err(ConfigError::from)?;

		Ok(ApiRequest::new(method, url))
	}

	/// Sends `request` through the interceptor loop.
	pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
		const KIND: FlowKind = FlowKind::Request;

		let span = FlowSpan::new(KIND, "send");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let mut request = request;

				loop {
					let error = match self.dispatch(&mut request).await {
						Ok(response) => return Ok(response),
						Err(e) => e,
					};

					match self.on_error(&mut request, error).await {
						RecoveryOutcome::Retry => continue,
						RecoveryOutcome::Fail(e) => return Err(e),
					}
				}
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	/// Sends `request` and decodes a JSON response body.
	pub async fn send_json<R>(&self, request: ApiRequest) -> Result<R>
	where
		R: DeserializeOwned,
	{
		self.send(request.with_header(ACCEPT, HeaderValue::from_static(APPLICATION_JSON)))
			.await?
			.json()
	}

	/// `GET path`.
	pub async fn get(&self, path: &str) -> Result<ApiResponse> {
		self.send(self.request(Method::GET, path)?).await
	}

	/// `DELETE path`.
	pub async fn delete(&self, path: &str) -> Result<ApiResponse> {
		self.send(self.request(Method::DELETE, path)?).await
	}

	/// `POST path` with a JSON body.
	pub async fn post_json<B>(&self, path: &str, body: &B) -> Result<ApiResponse>
	where
		B: ?Sized + Serialize,
	{
		self.send(self.request(Method::POST, path)?.with_json(body)?).await
	}

	/// `PUT path` with a JSON body.
	pub async fn put_json<B>(&self, path: &str, body: &B) -> Result<ApiResponse>
	where
		B: ?Sized + Serialize,
	{
		self.send(self.request(Method::PUT, path)?.with_json(body)?).await
	}

	/// `PATCH path` with a JSON body.
	pub async fn patch_json<B>(&self, path: &str, body: &B) -> Result<ApiResponse>
	where
		B: ?Sized + Serialize,
	{
		self.send(self.request(Method::PATCH, path)?.with_json(body)?).await
	}
}
#[cfg(feature = "reqwest")]
impl AuthClient<ReqwestTransport> {
	/// Creates a new client with its own reqwest-backed transport.
	pub fn new(config: ClientConfig, store: Arc<dyn TokenStore>) -> Self {
		Self::with_transport(config, store, ReqwestTransport::default())
	}
}
impl<T> Clone for AuthClient<T>
where
	T: ?Sized + HttpTransport,
{
	fn clone(&self) -> Self {
		Self {
			transport: Arc::clone(&self.transport),
			store: Arc::clone(&self.store),
			config: Arc::clone(&self.config),
			refresh_metrics: Arc::clone(&self.refresh_metrics),
			state: Arc::clone(&self.state),
			session: Arc::clone(&self.session),
		}
	}
}
impl<T> Debug for AuthClient<T>
where
	T: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthClient")
			.field("config", &self.config)
			.field("refreshing", &self.is_refreshing())
			.field("session_epoch", &self.session_epoch())
			.finish()
	}
}

/// Per-request marker carried through the interceptor loop.
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
	has_retried: bool,
	attached: Option<TokenSecret>,
	expirations_seen: u64,
}
impl RequestContext {
	/// Whether the request was already retried once after a `401`.
	pub fn has_retried(&self) -> bool {
		self.has_retried
	}

	/// Access token attached on the latest send, if any.
	pub fn attached_token(&self) -> Option<&TokenSecret> {
		self.attached.as_ref()
	}

	pub(crate) fn mark_retried(&mut self) {
		debug_assert!(!self.has_retried, "a request is retried at most once");

		self.has_retried = true;
	}

	/// Number of session expirations the client had seen when the token was attached.
	pub fn expirations_seen(&self) -> u64 {
		self.expirations_seen
	}

	pub(crate) fn record_attached(&mut self, token: TokenSecret, expirations: u64) {
		self.attached = Some(token);
		self.expirations_seen = expirations;
	}
}

/// Outgoing API request; cloneable so it can be resubmitted after a refresh.
#[derive(Clone, Debug)]
pub struct ApiRequest {
	/// HTTP method.
	pub method: Method,
	/// Absolute target URL.
	pub url: Url,
	/// Request headers; `Authorization` is managed by the client.
	pub headers: HeaderMap,
	/// Raw body bytes.
	pub body: Vec<u8>,
	/// Retry bookkeeping.
	pub context: RequestContext,
}
impl ApiRequest {
	/// Creates an empty-bodied request.
	pub fn new(method: Method, url: Url) -> Self {
		Self {
			method,
			url,
			headers: HeaderMap::new(),
			body: Vec::new(),
			context: RequestContext::default(),
		}
	}

	/// Sets a header, replacing existing values.
	pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
		self.headers.insert(name, value);

		self
	}

	/// Serializes `body` as JSON and sets `Content-Type`.
	pub fn with_json<B>(mut self, body: &B) -> Result<Self>
	where
		B: ?Sized + Serialize,
	{
		self.body = serde_json::to_vec(body).map_err(ConfigError::from)?;
		self.headers.insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));

		Ok(self)
	}

	pub(crate) fn to_http(&self) -> Result<HttpRequest> {
		let mut builder = ::http::Request::builder().method(self.method.clone()).uri(self.url.as_str());

		if let Some(headers) = builder.headers_mut() {
			headers.extend(self.headers.iter().map(|(k, v)| (k.clone(), v.clone())));
		}

		Ok(builder.body(self.body.clone()).map_err(ConfigError::from)?)
	}
}

/// Successful API response.
#[derive(Clone, Debug)]
pub struct ApiResponse {
	/// Response status (always 2xx or 3xx).
	pub status: StatusCode,
	/// URL of the request that produced this response.
	pub url: Url,
	/// Response headers.
	pub headers: HeaderMap,
	/// Raw body bytes.
	pub body: Vec<u8>,
}
impl ApiResponse {
	pub(crate) fn from_http(url: Url, response: HttpResponse) -> Result<Self> {
		let (parts, body) = response.into_parts();

		if parts.status.is_client_error() || parts.status.is_server_error() {
			return Err(StatusError::new(parts.status.as_u16(), &url, &body).into());
		}

		Ok(Self { status: parts.status, url, headers: parts.headers, body })
	}

	/// Decodes the body as JSON, reporting the failing path on error.
	pub fn json<R>(&self) -> Result<R>
	where
		R: DeserializeOwned,
	{
		let de = &mut serde_json::Deserializer::from_slice(&self.body);

		serde_path_to_error::deserialize(de)
			.map_err(|source| Error::Decode { url: self.url.to_string(), source })
	}

	/// Body as lossy UTF-8.
	pub fn text(&self) -> String {
		String::from_utf8_lossy(&self.body).into_owned()
	}
}
