//! Thread-safe in-memory [`TokenStore`] implementation for browser-less apps and tests.

// self
use crate::{
	_prelude::*,
	auth::{TokenKind, TokenSecret},
	store::{StoreError, StoreFuture, TokenStore},
};

#[derive(Debug, Default)]
struct MemoryState {
	access: Option<TokenSecret>,
	refresh: Option<TokenSecret>,
	markers: HashMap<String, String>,
}
impl MemoryState {
	fn get(&self, kind: TokenKind) -> Option<&TokenSecret> {
		match kind {
			TokenKind::Access => self.access.as_ref(),
			TokenKind::Refresh => self.refresh.as_ref(),
		}
	}

	fn slot(&mut self, kind: TokenKind) -> &mut Option<TokenSecret> {
		match kind {
			TokenKind::Access => &mut self.access,
			TokenKind::Refresh => &mut self.refresh,
		}
	}
}

type StateCell = Arc<RwLock<MemoryState>>;

/// Storage backend that keeps tokens and session markers in-process.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(StateCell);
impl MemoryStore {
	/// Number of session markers currently held.
	pub fn session_marker_count(&self) -> usize {
		self.0.read().markers.len()
	}

	fn update(cell: StateCell, f: impl FnOnce(&mut MemoryState)) -> Result<(), StoreError> {
		f(&mut cell.write());

		Ok(())
	}
}
impl TokenStore for MemoryStore {
	fn fetch(&self, kind: TokenKind) -> StoreFuture<'_, Option<TokenSecret>> {
		let cell = self.0.clone();

		Box::pin(async move { Ok(cell.read().get(kind).cloned()) })
	}

	fn save(&self, kind: TokenKind, secret: TokenSecret) -> StoreFuture<'_, ()> {
		let cell = self.0.clone();

		Box::pin(async move { Self::update(cell, |state| *state.slot(kind) = Some(secret)) })
	}

	fn remove(&self, kind: TokenKind) -> StoreFuture<'_, ()> {
		let cell = self.0.clone();

		Box::pin(async move { Self::update(cell, |state| *state.slot(kind) = None) })
	}

	fn session_marker<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
		let cell = self.0.clone();

		Box::pin(async move { Ok(cell.read().markers.get(key).cloned()) })
	}

	fn set_session_marker(&self, key: String, value: String) -> StoreFuture<'_, ()> {
		let cell = self.0.clone();

		Box::pin(async move {
			Self::update(cell, |state| {
				state.markers.insert(key, value);
			})
		})
	}

	fn clear_session_markers(&self) -> StoreFuture<'_, ()> {
		let cell = self.0.clone();

		Box::pin(async move { Self::update(cell, |state| state.markers.clear()) })
	}
}
