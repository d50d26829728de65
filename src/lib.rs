//! Authenticated HTTP client for the resume builder API: bearer attachment, single-flight
//! token refresh with one transparent retry, and session-expiry signalling.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod obs;
pub mod store;
#[cfg(all(any(test, feature = "test"), feature = "reqwest"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		auth::TokenPair,
		client::AuthClient,
		config::ClientConfig,
		http::ReqwestTransport,
		store::{MemoryStore, TokenStore},
	};

	/// Client type alias used by reqwest-backed integration tests.
	pub type ReqwestTestClient = AuthClient<ReqwestTransport>;

	/// Builds a config pointing at a plain-HTTP mock server.
	pub fn test_config(base_url: &str) -> ClientConfig {
		let base = Url::parse(base_url).expect("Mock base URL should parse.");

		ClientConfig::builder(base)
			.allow_insecure_http(true)
			.build()
			.expect("Mock client config should build.")
	}

	/// Constructs an [`AuthClient`] backed by an in-memory store seeded with `tokens` and the
	/// reqwest transport used across integration tests.
	pub async fn build_reqwest_test_client(
		base_url: &str,
		tokens: Option<TokenPair>,
	) -> (ReqwestTestClient, Arc<MemoryStore>) {
		let store_backend = Arc::new(MemoryStore::default());
		let store: Arc<dyn TokenStore> = store_backend.clone();

		if let Some(pair) = tokens {
			store.save_pair(&pair).await.expect("Seeding the memory store should succeed.");
		}

		let client = AuthClient::with_transport(
			test_config(base_url),
			store,
			ReqwestTransport::default(),
		);

		(client, store_backend)
	}
}

mod _prelude {
	pub use std::{
		collections::HashMap,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::{Arc, Weak},
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::OffsetDateTime;
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _, tempfile as _};
