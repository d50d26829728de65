//! Storage contracts and built-in store implementations for session tokens.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{
	_prelude::*,
	auth::{TokenKind, TokenPair, TokenSecret},
};

/// Boxed future returned by [`TokenStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Storage backend contract for the access token, the refresh token, and short-lived
/// session markers.
pub trait TokenStore
where
	Self: Send + Sync,
{
	/// Returns the stored token of `kind`, if present.
	fn fetch(&self, kind: TokenKind) -> StoreFuture<'_, Option<TokenSecret>>;

	/// Persists or replaces the token of `kind`.
	fn save(&self, kind: TokenKind, secret: TokenSecret) -> StoreFuture<'_, ()>;

	/// Removes the token of `kind`; removing an absent token succeeds.
	fn remove(&self, kind: TokenKind) -> StoreFuture<'_, ()>;

	/// Returns a short-lived session marker.
	fn session_marker<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>>;

	/// Sets a short-lived session marker.
	fn set_session_marker(&self, key: String, value: String) -> StoreFuture<'_, ()>;

	/// Drops every session marker.
	fn clear_session_markers(&self) -> StoreFuture<'_, ()>;
}
impl<'s> dyn TokenStore + 's {
	/// Saves both halves of `pair`.
	pub async fn save_pair(&self, pair: &TokenPair) -> Result<(), StoreError> {
		self.save(TokenKind::Access, pair.access_token.clone()).await?;
		self.save(TokenKind::Refresh, pair.refresh_token.clone()).await
	}

	/// Clears session markers plus both tokens.
	///
	/// Every step runs even if an earlier one fails; the first failure is returned.
	pub async fn clear_all(&self) -> Result<(), StoreError> {
		let markers = self.clear_session_markers().await;
		let access = self.remove(TokenKind::Access).await;
		let refresh = self.remove(TokenKind::Refresh).await;

		markers.and(access).and(refresh)
	}
}

/// Error type produced by [`TokenStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}
