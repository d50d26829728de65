//! Walks through a full session against an in-process backend, no network required.
//!
//! 1. Persist the login pair in a [`FileStore`] with [`AuthClient::establish_session`].
//! 2. Issue a request whose access token the backend has already expired; the client refreshes
//!    once and retries transparently.
//! 3. Revoke the refresh token on the backend and watch the session-expired listener fire.
//! 4. Build the reqwest-backed client a real deployment would use over the same store.

// std
use std::sync::{
	Arc,
	atomic::{AtomicU32, Ordering},
};
// crates.io
use color_eyre::Result;
use parking_lot::Mutex;
// self
use resume_auth_client::{
	auth::TokenPair,
	client::{AuthClient, ReqwestAuthClient, SessionExpired},
	config::ClientConfig,
	http::{HttpRequest, HttpResponse, HttpTransport, TransportFuture},
	store::{FileStore, TokenStore},
	url::Url,
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let path = std::env::temp_dir().join("resume-auth-client-demo.json");
	let store: Arc<dyn TokenStore> = Arc::new(FileStore::open(&path)?);
	let config = ClientConfig::builder(Url::parse("https://resume.example.com/api/")?).build()?;
	let backend = Arc::new(DemoBackend::default());
	let client: AuthClient<DemoBackend> =
		AuthClient::with_transport(config.clone(), Arc::clone(&store), Arc::clone(&backend));

	client.add_session_listener(Arc::new(|event: &SessionExpired| {
		println!("Session {} expired ({}); redirecting to login.", event.epoch, event.reason);
	}));
	client.establish_session(TokenPair::new("access-1", "refresh-1")).await?;
	backend.expire_access_tokens();

	let cvs = client.get("cv").await?;

	println!("Fetched CVs after a transparent refresh: {}.", cvs.text());
	println!("Refresh calls so far: {}.", client.refresh_metrics.attempts());

	backend.revoke_refresh_tokens();
	backend.expire_access_tokens();

	match client.get("cv").await {
		Ok(_) => println!("Backend unexpectedly accepted a revoked session."),
		Err(e) => println!("Request failed after the session ended: {e}"),
	}

	let online = ReqwestAuthClient::new(config, store);

	println!("A networked client would start from: {online:?}.");

	Ok(())
}

/// Backend that accepts only the most recently issued access token.
#[derive(Default)]
struct DemoBackend {
	generation: AtomicU32,
	state: Mutex<BackendState>,
}
#[derive(Default)]
struct BackendState {
	valid_access: Option<String>,
	refresh_revoked: bool,
}
impl DemoBackend {
	fn expire_access_tokens(&self) {
		self.state.lock().valid_access = None;
	}

	fn revoke_refresh_tokens(&self) {
		self.state.lock().refresh_revoked = true;
	}

	fn respond(&self, request: &HttpRequest) -> HttpResponse {
		let mut state = self.state.lock();

		if request.uri().path().ends_with("/auth/refresh") {
			if state.refresh_revoked {
				return status(401, b"refresh token revoked");
			}

			let next = self.generation.fetch_add(1, Ordering::Relaxed) + 2;
			let access = format!("access-{next}");
			let body = format!(r#"{{"accessToken":"{access}","refreshToken":"refresh-{next}"}}"#);

			state.valid_access = Some(access);

			return status(200, body.as_bytes());
		}

		let bearer = request.headers().get("authorization").and_then(|v| v.to_str().ok());
		let expected = state.valid_access.as_ref().map(|token| format!("Bearer {token}"));

		if bearer.is_some() && bearer == expected.as_deref() {
			status(200, br#"[{"id":1,"title":"Backend engineer"}]"#)
		} else {
			status(401, b"access token expired")
		}
	}
}
impl HttpTransport for DemoBackend {
	fn execute(&self, request: HttpRequest) -> TransportFuture<'_> {
		let response = self.respond(&request);

		Box::pin(async move { Ok(response) })
	}
}

fn status(code: u16, body: &[u8]) -> HttpResponse {
	let mut response = HttpResponse::new(body.to_vec());

	*response.status_mut() =
		::http::StatusCode::from_u16(code).unwrap_or(::http::StatusCode::INTERNAL_SERVER_ERROR);

	response
}
