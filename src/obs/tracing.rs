// self
use crate::{_prelude::*, client::SessionExpiredReason, obs::FlowKind};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedFlow<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedFlow<F> = F;

/// A span builder used by client flows.
#[derive(Clone, Debug)]
pub struct FlowSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl FlowSpan {
	/// Creates a new span tagged with the provided flow kind + stage.
	pub fn new(kind: FlowKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span =
				tracing::info_span!("resume_auth_client.flow", flow = kind.as_str(), stage);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedFlow<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

pub(crate) fn refresh_started(endpoint: &Url) {
	#[cfg(feature = "tracing")]
	{
		tracing::debug!(%endpoint, "starting token refresh");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = endpoint;
	}
}

pub(crate) fn refresh_joined() {
	#[cfg(feature = "tracing")]
	{
		tracing::debug!("joining in-flight token refresh");
	}
}

pub(crate) fn refresh_settled(error: Option<&dyn Display>) {
	#[cfg(feature = "tracing")]
	{
		match error {
			Some(error) => tracing::warn!(%error, "token refresh failed"),
			None => tracing::debug!("token refresh succeeded"),
		}
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = error;
	}
}

pub(crate) fn unauthorized(url: &Url, has_retried: bool) {
	#[cfg(feature = "tracing")]
	{
		tracing::debug!(%url, has_retried, "request rejected with 401");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (url, has_retried);
	}
}

pub(crate) fn session_expired(reason: SessionExpiredReason, notified: bool) {
	#[cfg(feature = "tracing")]
	{
		tracing::warn!(reason = reason.as_str(), notified, "session expired; storage cleared");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (reason, notified);
	}
}

pub(crate) fn cleanup_failed(error: &dyn Display) {
	#[cfg(feature = "tracing")]
	{
		tracing::error!(%error, "session cleanup could not clear storage");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = error;
	}
}
