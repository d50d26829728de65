//! Transport primitives for authenticated API calls.
//!
//! [`HttpTransport`] is the client's only dependency on an HTTP stack. It moves a fully built
//! [`HttpRequest`] over the wire and returns the raw [`HttpResponse`] regardless of status;
//! classifying statuses, attaching tokens, and retrying all happen in
//! [`AuthClient`](crate::client::AuthClient). Implementations must be `Send + Sync + 'static`
//! so one transport can back many client clones, and the futures they return must be `Send`
//! so the shared refresh computation can hop executors.

// std
#[cfg(feature = "reqwest")] use std::{ops::Deref, time::Duration};
// self
use crate::{_prelude::*, error::TransportError};

/// Request type handed to transports.
pub type HttpRequest = ::http::Request<Vec<u8>>;
/// Response type produced by transports.
pub type HttpResponse = ::http::Response<Vec<u8>>;

/// Boxed future returned by [`HttpTransport::execute`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<HttpResponse, TransportError>> + 'a + Send>>;

/// Abstraction over HTTP stacks capable of executing API calls.
pub trait HttpTransport
where
	Self: 'static + Send + Sync,
{
	/// Sends `request` and resolves with the response, whatever its status.
	///
	/// Only failures that prevent a response (DNS, TCP, TLS, timeouts) are errors.
	fn execute(&self, request: HttpRequest) -> TransportFuture<'_>;
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
///
/// Redirects are followed with reqwest's default policy. Any timeout configured on the
/// wrapped client bounds every call, including the refresh exchange.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransport(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}

	/// Builds a transport whose calls are bounded by `timeout`.
	pub fn with_timeout(timeout: Duration) -> Result<Self> {
		let client = ReqwestClient::builder()
			.timeout(timeout)
			.build()
			.map_err(crate::error::ConfigError::from)?;

		Ok(Self(client))
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestTransport {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestTransport {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl HttpTransport for ReqwestTransport {
	fn execute(&self, request: HttpRequest) -> TransportFuture<'_> {
		let client = self.0.clone();

		Box::pin(async move {
			let url = request.uri().to_string();
			let request = reqwest::Request::try_from(request)
				.map_err(|e| TransportError::network(&url, e))?;
			let response =
				client.execute(request).await.map_err(|e| TransportError::network(&url, e))?;
			let status = response.status();
			let headers = response.headers().to_owned();
			let body = response.bytes().await.map_err(|e| TransportError::network(&url, e))?;
			let mut response_new = HttpResponse::new(body.to_vec());

			*response_new.status_mut() = status;
			*response_new.headers_mut() = headers;

			Ok(response_new)
		})
	}
}
