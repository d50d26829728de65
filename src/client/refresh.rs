//! Single-flight token refresh.
//!
//! [`ClientState`] holds at most one in-flight refresh as a [`Shared`] future. The first
//! caller that finds the slot empty builds the refresh computation and stores its handle
//! while still holding the slot's lock, so no second caller can slip in between the check
//! and the store. Everyone else clones the stored handle and awaits the same outcome.
//!
//! The computation clears the slot itself right before it yields its outcome. Waiters are
//! only woken after that, so a retry never observes a settled refresh in the slot.

mod metrics;

pub use metrics::{RefreshMetrics, RefreshMetricsSnapshot};

// crates.io
use ::http::{
	Method,
	header::{ACCEPT, CONTENT_TYPE},
};
use futures_util::future::{BoxFuture, FutureExt, Shared};
// self
use crate::{
	_prelude::*,
	auth::{RefreshRequestBody, TokenKind, TokenPair},
	client::{AuthClient, SessionExpiredReason, SessionGuard},
	error::{RefreshError, StatusError},
	http::{HttpRequest, HttpTransport},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	store::{StoreError, TokenStore},
};

/// Outcome delivered to every waiter of one refresh.
pub type RefreshOutcome = Result<TokenPair, RefreshError>;

type SharedRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;

/// Per-client slot for the in-flight refresh.
#[derive(Default)]
pub struct ClientState {
	pending: Mutex<Option<SharedRefresh>>,
}
impl ClientState {
	/// Returns `true` while a refresh is outstanding.
	pub fn is_refreshing(&self) -> bool {
		self.pending.lock().is_some()
	}

	pub(crate) fn pending(&self) -> Option<SharedRefresh> {
		self.pending.lock().clone()
	}

	/// Returns the in-flight refresh, creating it with `start` when there is none.
	///
	/// The boolean is `true` when this call created the refresh.
	pub(crate) fn start_or_join<F>(&self, start: F) -> (SharedRefresh, bool)
	where
		F: FnOnce() -> BoxFuture<'static, RefreshOutcome>,
	{
		let mut slot = self.pending.lock();

		if let Some(existing) = slot.as_ref() {
			return (existing.clone(), false);
		}

		let shared = start().shared();

		*slot = Some(shared.clone());

		(shared, true)
	}

	fn settle(&self) {
		self.pending.lock().take();
	}
}
impl Debug for ClientState {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ClientState").field("refreshing", &self.is_refreshing()).finish()
	}
}

impl<T> AuthClient<T>
where
	T: ?Sized + HttpTransport,
{
	/// Joins the in-flight refresh or starts one.
	pub(crate) async fn refresh_shared(&self) -> RefreshOutcome {
		let (shared, started) = self.state.start_or_join(|| self.refresh_task().run().boxed());

		if !started {
			self.refresh_metrics.record_join();
			obs::refresh_joined();
		}

		shared.await
	}

	fn refresh_task(&self) -> RefreshTask<T> {
		RefreshTask {
			transport: Arc::clone(&self.transport),
			store: Arc::clone(&self.store),
			endpoint: self.config.refresh_endpoint.clone(),
			metrics: Arc::clone(&self.refresh_metrics),
			session: Arc::clone(&self.session),
			state: Arc::downgrade(&self.state),
		}
	}
}

/// Everything one refresh computation needs, owned so the future is `'static`.
struct RefreshTask<T>
where
	T: ?Sized + HttpTransport,
{
	transport: Arc<T>,
	store: Arc<dyn TokenStore>,
	endpoint: Url,
	metrics: Arc<RefreshMetrics>,
	session: Arc<SessionGuard>,
	state: Weak<ClientState>,
}
impl<T> RefreshTask<T>
where
	T: ?Sized + HttpTransport,
{
	async fn run(self) -> RefreshOutcome {
		const KIND: FlowKind = FlowKind::Refresh;

		let span = FlowSpan::new(KIND, "refresh");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);
		self.metrics.record_attempt();

		let outcome = span.instrument(self.exchange()).await;

		match &outcome {
			Ok(_) => {
				self.metrics.record_success();
				obs::record_flow_outcome(KIND, FlowOutcome::Success);
				obs::refresh_settled(None);
			},
			Err(e) => {
				self.metrics.record_failure();
				obs::record_flow_outcome(KIND, FlowOutcome::Failure);
				obs::refresh_settled(Some(e as &dyn Display));

				let reason = match e {
					RefreshError::MissingRefreshToken => SessionExpiredReason::MissingRefreshToken,
					_ => SessionExpiredReason::RefreshRejected,
				};

				// Cleanup failures are already reported by the guard.
				let _ = self.session.expire(self.store.as_ref(), reason).await;
			},
		}

		if let Some(state) = self.state.upgrade() {
			state.settle();
		}

		outcome
	}

	async fn exchange(&self) -> RefreshOutcome {
		let refresh_token = self
			.store
			.fetch(TokenKind::Refresh)
			.await
			.map_err(storage_failure)?
			.ok_or(RefreshError::MissingRefreshToken)?;

		obs::refresh_started(&self.endpoint);

		let request = self.build_request(refresh_token.expose())?;
		let response = self
			.transport
			.execute(request)
			.await
			.map_err(|e| RefreshError::Transport { message: render_chain(&e) })?;

		if !response.status().is_success() {
			let status = response.status().as_u16();
			let excerpt = StatusError::new(status, &self.endpoint, response.body());

			return Err(RefreshError::Rejected { status, body: excerpt.body });
		}

		let de = &mut serde_json::Deserializer::from_slice(response.body());
		let pair: TokenPair = serde_path_to_error::deserialize(de)
			.map_err(|e| RefreshError::MalformedResponse { message: e.to_string() })?;

		self.store.save_pair(&pair).await.map_err(storage_failure)?;
		self.session.begin_epoch();

		Ok(pair)
	}

	fn build_request(&self, refresh_token: &str) -> Result<HttpRequest, RefreshError> {
		let body = serde_json::to_vec(&RefreshRequestBody { refresh_token_hash: refresh_token })
			.map_err(|e| RefreshError::Transport { message: e.to_string() })?;

		::http::Request::builder()
			.method(Method::POST)
			.uri(self.endpoint.as_str())
			.header(CONTENT_TYPE, "application/json")
			.header(ACCEPT, "application/json")
			.body(body)
			.map_err(|e| RefreshError::Transport { message: e.to_string() })
	}
}

fn storage_failure(e: StoreError) -> RefreshError {
	RefreshError::Storage { message: e.to_string() }
}

fn render_chain(error: &dyn StdError) -> String {
	let mut rendered = error.to_string();
	let mut source = error.source();

	while let Some(inner) = source {
		rendered.push_str(": ");
		rendered.push_str(&inner.to_string());

		source = inner.source();
	}

	rendered
}
