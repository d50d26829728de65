//! Request and response hooks wrapped around every transport call.

// crates.io
use ::http::{HeaderValue, header::AUTHORIZATION};
// self
use crate::{
	_prelude::*,
	auth::TokenKind,
	client::{ApiRequest, ApiResponse, AuthClient, SessionExpiredReason},
	error::{ConfigError, RefreshError},
	http::HttpTransport,
	obs,
};

/// Decision returned by [`AuthClient::on_error`].
#[derive(Debug)]
pub enum RecoveryOutcome {
	/// Resubmit the request; [`AuthClient::before_send`] attaches the current token.
	Retry,
	/// Give up and hand this error to the caller.
	Fail(Error),
}

impl<T> AuthClient<T>
where
	T: ?Sized + HttpTransport,
{
	/// Attaches `Authorization: Bearer <access token>` to `request`.
	///
	/// Waits for an in-flight refresh first so no request leaves with a token that is about
	/// to be replaced. Fails with [`Error::MissingAccessToken`] (and no network call) when the
	/// store holds no access token.
	pub async fn before_send(&self, request: &mut ApiRequest) -> Result<()> {
		if let Some(pending) = self.state.pending() {
			let _ = pending.await;
		}

		let expirations = self.session.expirations();
		let token = self.store.fetch(TokenKind::Access).await?.ok_or(Error::MissingAccessToken)?;
		let mut value = HeaderValue::from_str(&token.bearer()).map_err(ConfigError::from)?;

		value.set_sensitive(true);
		request.headers.insert(AUTHORIZATION, value);
		request.context.record_attached(token, expirations);

		Ok(())
	}

	/// Classifies a failed call.
	///
	/// - Anything but `401` fails unchanged.
	/// - `401` from the refresh endpoint expires the session and fails.
	/// - `401` on a request that was already retried fails.
	/// - Otherwise the request is marked retried. If the session expired after the request
	///   attached its token, the original error is returned without another refresh. If the
	///   store already holds a newer access token than the one the request carried, the
	///   request is retried straight away. Otherwise it starts or joins the shared refresh
	///   and is retried once that succeeds. A failed refresh yields the original error,
	///   except for a missing refresh token which yields [`Error::MissingRefreshToken`].
	pub async fn on_error(&self, request: &mut ApiRequest, error: Error) -> RecoveryOutcome {
		if !error.is_unauthorized() {
			return RecoveryOutcome::Fail(error);
		}

		obs::unauthorized(&request.url, request.context.has_retried());

		if self.config.is_refresh_endpoint(&request.url) {
			let reason = SessionExpiredReason::RefreshCallUnauthorized;

			let _ = self.session.expire(self.store.as_ref(), reason).await;

			return RecoveryOutcome::Fail(error);
		}
		if request.context.has_retried() {
			return RecoveryOutcome::Fail(error);
		}

		request.context.mark_retried();

		// The session this request belonged to already ended; its chain is settled.
		if self.session.expirations() != request.context.expirations_seen() {
			return RecoveryOutcome::Fail(error);
		}
		if self.token_rotated_since(request).await {
			return RecoveryOutcome::Retry;
		}

		match self.refresh_shared().await {
			Ok(_) => RecoveryOutcome::Retry,
			Err(RefreshError::MissingRefreshToken) =>
				RecoveryOutcome::Fail(Error::MissingRefreshToken),
			Err(_) => RecoveryOutcome::Fail(error),
		}
	}

	/// One pass through the request hook and the transport.
	pub(crate) async fn dispatch(&self, request: &mut ApiRequest) -> Result<ApiResponse> {
		self.before_send(request).await?;

		let response = self.transport.execute(request.to_http()?).await?;

		ApiResponse::from_http(request.url.clone(), response)
	}

	// A 401 for a token that has since been replaced needs no refresh of its own.
	async fn token_rotated_since(&self, request: &ApiRequest) -> bool {
		let Some(sent) = request.context.attached_token() else {
			return false;
		};

		match self.store.fetch(TokenKind::Access).await {
			Ok(Some(current)) => &current != sent,
			_ => false,
		}
	}
}
