// std
use std::sync::atomic::{AtomicU64, Ordering::Relaxed};

/// Point-in-time copy of [`RefreshMetrics`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RefreshMetricsSnapshot {
	/// Refresh calls started.
	pub started: u64,
	/// Callers that awaited a refresh started by someone else.
	pub joined: u64,
	/// Refreshes that stored a new pair.
	pub succeeded: u64,
	/// Refreshes that ended in session cleanup.
	pub failed: u64,
}

/// Single-flight refresh counters, shared by every clone of a client.
#[derive(Debug, Default)]
pub struct RefreshMetrics {
	started: AtomicU64,
	joined: AtomicU64,
	succeeded: AtomicU64,
	failed: AtomicU64,
}
impl RefreshMetrics {
	/// Refresh calls started.
	pub fn attempts(&self) -> u64 {
		self.started.load(Relaxed)
	}

	/// Callers that joined an in-flight refresh instead of starting one.
	pub fn joins(&self) -> u64 {
		self.joined.load(Relaxed)
	}

	/// Refreshes that stored a new pair.
	pub fn successes(&self) -> u64 {
		self.succeeded.load(Relaxed)
	}

	/// Refreshes that ended in session cleanup.
	pub fn failures(&self) -> u64 {
		self.failed.load(Relaxed)
	}

	/// Reads all counters at once.
	pub fn snapshot(&self) -> RefreshMetricsSnapshot {
		RefreshMetricsSnapshot {
			started: self.attempts(),
			joined: self.joins(),
			succeeded: self.successes(),
			failed: self.failures(),
		}
	}

	pub(crate) fn record_attempt(&self) {
		self.started.fetch_add(1, Relaxed);
	}

	pub(crate) fn record_join(&self) {
		self.joined.fetch_add(1, Relaxed);
	}

	pub(crate) fn record_success(&self) {
		self.succeeded.fetch_add(1, Relaxed);
	}

	pub(crate) fn record_failure(&self) {
		self.failed.fetch_add(1, Relaxed);
	}
}
