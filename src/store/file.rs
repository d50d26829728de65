//! File-backed [`TokenStore`] that keeps tokens across restarts of desktop or CLI shells.
//!
//! Only the two tokens are written to disk. Session markers are short-lived by definition
//! and stay in memory, so a restart always begins with an empty marker set.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	auth::{TokenKind, TokenSecret},
	store::{StoreError, StoreFuture, TokenStore},
};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
struct TokenSnapshot {
	access: Option<TokenSecret>,
	refresh: Option<TokenSecret>,
}
impl TokenSnapshot {
	fn slot(&mut self, kind: TokenKind) -> &mut Option<TokenSecret> {
		match kind {
			TokenKind::Access => &mut self.access,
			TokenKind::Refresh => &mut self.refresh,
		}
	}
}

/// Persists tokens to a JSON file after each mutation.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
	tokens: Arc<RwLock<TokenSnapshot>>,
	markers: Arc<RwLock<HashMap<String, String>>>,
}
impl FileStore {
	/// Opens (or creates) a store at the provided path, eagerly loading existing tokens.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;

		let snapshot = Self::load_snapshot(&path)?;

		Ok(Self {
			path,
			tokens: Arc::new(RwLock::new(snapshot)),
			markers: Default::default(),
		})
	}

	/// Location of the backing file.
	pub fn path(&self) -> &Path {
		&self.path
	}

	fn load_snapshot(path: &Path) -> Result<TokenSnapshot, StoreError> {
		if !path.exists() {
			return Ok(TokenSnapshot::default());
		}

		let bytes = fs::read(path).map_err(|e| StoreError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;

		if bytes.is_empty() {
			return Ok(TokenSnapshot::default());
		}

		serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
			message: format!("Failed to parse {}: {e}", path.display()),
		})
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create store directory {}: {e}", parent.display()),
			})?;
		}

		Ok(())
	}

	// Temp file + rename; readers never observe a partial snapshot.
	fn persist_locked(&self, snapshot: &TokenSnapshot) -> Result<(), StoreError> {
		Self::ensure_parent_exists(&self.path)?;

		let serialized =
			serde_json::to_vec_pretty(snapshot).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize token snapshot: {e}"),
			})?;
		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(&serialized).map_err(|e| StoreError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {e}", self.path.display()),
		})
	}

	fn mutate(&self, kind: TokenKind, value: Option<TokenSecret>) -> Result<(), StoreError> {
		let mut guard = self.tokens.write();

		if *guard.slot(kind) == value {
			return Ok(());
		}

		let mut next = guard.clone();

		*next.slot(kind) = value;

		self.persist_locked(&next)?;

		*guard = next;

		Ok(())
	}
}
impl TokenStore for FileStore {
	fn fetch(&self, kind: TokenKind) -> StoreFuture<'_, Option<TokenSecret>> {
		Box::pin(async move {
			let guard = self.tokens.read();
			let value = match kind {
				TokenKind::Access => guard.access.clone(),
				TokenKind::Refresh => guard.refresh.clone(),
			};

			Ok(value)
		})
	}

	fn save(&self, kind: TokenKind, secret: TokenSecret) -> StoreFuture<'_, ()> {
		Box::pin(async move { self.mutate(kind, Some(secret)) })
	}

	fn remove(&self, kind: TokenKind) -> StoreFuture<'_, ()> {
		Box::pin(async move { self.mutate(kind, None) })
	}

	fn session_marker<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
		Box::pin(async move { Ok(self.markers.read().get(key).cloned()) })
	}

	fn set_session_marker(&self, key: String, value: String) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			self.markers.write().insert(key, value);

			Ok(())
		})
	}

	fn clear_session_markers(&self) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			self.markers.write().clear();

			Ok(())
		})
	}
}
