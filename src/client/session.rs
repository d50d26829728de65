//! Session-expired cleanup and listener fan-out.

// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::{
	_prelude::*,
	obs::{self, FlowKind, FlowOutcome},
	store::{StoreError, TokenStore},
};

/// Why a session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionExpiredReason {
	/// The refresh endpoint refused the refresh token or the exchange failed.
	RefreshRejected,
	/// A request addressed to the refresh endpoint itself came back `401`.
	RefreshCallUnauthorized,
	/// A refresh was needed but the store held no refresh token.
	MissingRefreshToken,
	/// The application ended the session, e.g. on logout.
	Manual,
}
impl SessionExpiredReason {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			SessionExpiredReason::RefreshRejected => "refresh_rejected",
			SessionExpiredReason::RefreshCallUnauthorized => "refresh_call_unauthorized",
			SessionExpiredReason::MissingRefreshToken => "missing_refresh_token",
			SessionExpiredReason::Manual => "manual",
		}
	}
}
impl Display for SessionExpiredReason {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Payload delivered to [`SessionListener`]s.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionExpired {
	/// What ended the session.
	pub reason: SessionExpiredReason,
	/// Epoch of the session that ended.
	pub epoch: u64,
	/// When the cleanup ran.
	pub at: OffsetDateTime,
}

/// Receives the session-expired signal, typically to route the user back to login.
///
/// Listeners run synchronously after storage has been cleared and must not block.
pub trait SessionListener
where
	Self: Send + Sync,
{
	/// Called at most once per session epoch.
	fn on_session_expired(&self, event: &SessionExpired);
}
impl<F> SessionListener for F
where
	F: Fn(&SessionExpired) + Send + Sync,
{
	fn on_session_expired(&self, event: &SessionExpired) {
		self(event)
	}
}

/// Serializes cleanups and tracks which epoch listeners were last told about.
#[derive(Default)]
pub(crate) struct SessionGuard {
	cleanup: AsyncMutex<Option<u64>>,
	epoch: AtomicU64,
	expirations: AtomicU64,
	listeners: RwLock<Vec<Arc<dyn SessionListener>>>,
}
impl SessionGuard {
	pub(crate) fn epoch(&self) -> u64 {
		self.epoch.load(Ordering::Acquire)
	}

	pub(crate) fn begin_epoch(&self) -> u64 {
		self.epoch.fetch_add(1, Ordering::AcqRel) + 1
	}

	/// Number of cleanups started so far, successful or not.
	pub(crate) fn expirations(&self) -> u64 {
		self.expirations.load(Ordering::Acquire)
	}

	pub(crate) fn add_listener(&self, listener: Arc<dyn SessionListener>) {
		self.listeners.write().push(listener);
	}

	/// Clears `store` and notifies listeners unless this epoch was already reported.
	///
	/// Storage is cleared on every call. Listeners only run once storage is empty; a failed
	/// clear returns the error and leaves the epoch unreported. The returned flag tells
	/// whether listeners ran.
	pub(crate) async fn expire(
		&self,
		store: &dyn TokenStore,
		reason: SessionExpiredReason,
	) -> Result<bool, StoreError> {
		const KIND: FlowKind = FlowKind::SessionCleanup;

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let mut notified = self.cleanup.lock().await;

		self.expirations.fetch_add(1, Ordering::AcqRel);

		if let Err(e) = store.clear_all().await {
			obs::cleanup_failed(&e);
			obs::record_flow_outcome(KIND, FlowOutcome::Failure);

			return Err(e);
		}

		let epoch = self.epoch();
		let first = *notified != Some(epoch);

		if first {
			*notified = Some(epoch);

			let event = SessionExpired { reason, epoch, at: OffsetDateTime::now_utc() };
			let listeners = self.listeners.read().clone();

			for listener in listeners {
				listener.on_session_expired(&event);
			}

			obs::record_session_expired(reason);
		}

		obs::session_expired(reason, first);
		obs::record_flow_outcome(KIND, FlowOutcome::Success);

		Ok(first)
	}
}
impl Debug for SessionGuard {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionGuard")
			.field("epoch", &self.epoch())
			.field("listeners", &self.listeners.read().len())
			.finish()
	}
}
