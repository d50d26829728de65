// std
use std::{
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};
// crates.io
use parking_lot::Mutex;
use tokio::sync::Notify;
// self
use resume_auth_client::{
	auth::{TokenKind, TokenPair},
	client::{AuthClient, SessionExpired},
	config::ClientConfig,
	error::Error,
	http::{HttpRequest, HttpResponse, HttpTransport, TransportFuture},
	store::{MemoryStore, TokenStore},
	url::Url,
};

const REFRESH_PATH: &str = "/v1/auth/refresh";

/// Transport that rejects every bearer except `access-new` and holds the refresh response
/// until the test releases it.
#[derive(Default)]
struct GatedTransport {
	refresh_started: Notify,
	release_refresh: Notify,
	calls: Mutex<Vec<(String, Option<String>)>>,
}
impl GatedTransport {
	fn calls_to(&self, path: &str) -> Vec<Option<String>> {
		self.calls
			.lock()
			.iter()
			.filter(|(p, _)| p == path)
			.map(|(_, auth)| auth.clone())
			.collect()
	}
}
impl HttpTransport for GatedTransport {
	fn execute(&self, request: HttpRequest) -> TransportFuture<'_> {
		Box::pin(async move {
			let path = request.uri().path().to_owned();
			let auth = request
				.headers()
				.get("authorization")
				.and_then(|value| value.to_str().ok())
				.map(ToOwned::to_owned);

			self.calls.lock().push((path.clone(), auth.clone()));

			if path == REFRESH_PATH {
				self.refresh_started.notify_one();
				self.release_refresh.notified().await;

				let body = br#"{"accessToken":"access-new","refreshToken":"refresh-new"}"#;

				return Ok(HttpResponse::new(body.to_vec()));
			}

			let mut response = HttpResponse::new(b"ok".to_vec());

			if auth.as_deref() != Some("Bearer access-new") {
				*response.status_mut() = ::http::StatusCode::UNAUTHORIZED;
			}

			Ok(response)
		})
	}
}

/// Transport for a backend whose session is gone: every call is rejected, and the reply to
/// `/v1/cv/late` is held until the test releases it.
#[derive(Default)]
struct RevokedTransport {
	late_sent: Notify,
	release_late: Notify,
	refresh_calls: AtomicUsize,
}
impl HttpTransport for RevokedTransport {
	fn execute(&self, request: HttpRequest) -> TransportFuture<'_> {
		Box::pin(async move {
			match request.uri().path() {
				REFRESH_PATH => {
					self.refresh_calls.fetch_add(1, Ordering::SeqCst);
				},
				"/v1/cv/late" => {
					self.late_sent.notify_one();
					self.release_late.notified().await;
				},
				_ => {},
			}

			let mut response = HttpResponse::new(b"session revoked".to_vec());

			*response.status_mut() = ::http::StatusCode::UNAUTHORIZED;

			Ok(response)
		})
	}
}

fn config() -> ClientConfig {
	let base = Url::parse("https://api.example.com/v1/").expect("Base URL should parse.");

	ClientConfig::builder(base).build().expect("Config should build.")
}

async fn client_with<T>(
	transport: Arc<T>,
	tokens: Option<TokenPair>,
) -> (AuthClient<T>, Arc<MemoryStore>)
where
	T: HttpTransport,
{
	let backend = Arc::new(MemoryStore::default());
	let store: Arc<dyn TokenStore> = backend.clone();

	if let Some(pair) = tokens {
		store.save_pair(&pair).await.expect("Seeding the memory store should succeed.");
	}

	(AuthClient::with_transport(config(), store, transport), backend)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn request_issued_during_refresh_waits_for_the_new_token() {
	let transport = Arc::new(GatedTransport::default());
	let (client, _store) =
		client_with(Arc::clone(&transport), Some(TokenPair::new("access-old", "refresh-old")))
			.await;
	let first = tokio::spawn({
		let client = client.clone();

		async move { client.get("cv").await }
	});

	transport.refresh_started.notified().await;

	assert!(client.is_refreshing());

	let second = tokio::spawn({
		let client = client.clone();

		async move { client.get("cv/drafts").await }
	});

	tokio::time::sleep(Duration::from_millis(50)).await;
	transport.release_refresh.notify_one();

	let first = first.await.expect("First task should not panic.");
	let second = second.await.expect("Second task should not panic.");

	assert_eq!(first.expect("First request should succeed after refresh.").text(), "ok");
	assert_eq!(second.expect("Second request should succeed.").text(), "ok");
	assert_eq!(transport.calls_to("/v1/cv/drafts"), vec![Some("Bearer access-new".to_owned())]);
	assert_eq!(
		transport.calls_to("/v1/cv"),
		vec![Some("Bearer access-old".to_owned()), Some("Bearer access-new".to_owned())]
	);
	assert_eq!(transport.calls_to(REFRESH_PATH).len(), 1);
	assert_eq!(client.refresh_metrics.attempts(), 1);
	assert!(!client.is_refreshing());
}

#[tokio::test]
async fn missing_access_token_fails_without_a_network_call() {
	let transport = Arc::new(GatedTransport::default());
	let (client, _store) = client_with(Arc::clone(&transport), None).await;
	let err = client.get("cv").await.expect_err("Request must fail without an access token.");

	assert!(matches!(err, Error::MissingAccessToken), "Unexpected error: {err:?}.");
	assert!(transport.calls.lock().is_empty());
}

#[tokio::test]
async fn explicit_refresh_rotates_tokens_and_bumps_the_epoch() {
	let transport = Arc::new(GatedTransport::default());
	let (client, store) =
		client_with(Arc::clone(&transport), Some(TokenPair::new("access-old", "refresh-old")))
			.await;
	let epoch = client.session_epoch();

	transport.release_refresh.notify_one();

	let pair = client.refresh_session().await.expect("Explicit refresh should succeed.");
	let store: &dyn TokenStore = &*store;

	assert_eq!(pair, TokenPair::new("access-new", "refresh-new"));
	assert_eq!(client.session_epoch(), epoch + 1);
	assert_eq!(
		store.fetch(TokenKind::Refresh).await.expect("Refresh lookup should succeed."),
		Some("refresh-new".into())
	);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unauthorized_reply_after_a_failed_refresh_keeps_its_original_error() {
	let transport = Arc::new(RevokedTransport::default());
	let (client, store) =
		client_with(Arc::clone(&transport), Some(TokenPair::new("access-old", "refresh-old")))
			.await;
	let notifications = Arc::new(AtomicUsize::new(0));

	client.add_session_listener(Arc::new({
		let notifications = Arc::clone(&notifications);

		move |_: &SessionExpired| {
			notifications.fetch_add(1, Ordering::SeqCst);
		}
	}));

	let late = tokio::spawn({
		let client = client.clone();

		async move { client.get("cv/late").await }
	});

	transport.late_sent.notified().await;

	let early = client.get("cv").await.expect_err("Request must fail once the refresh fails.");

	assert!(early.is_unauthorized(), "Unexpected error: {early:?}.");

	transport.release_late.notify_one();

	let late = late
		.await
		.expect("Late task should not panic.")
		.expect_err("Late request must fail after the session ended.");

	assert!(late.is_unauthorized(), "Unexpected error: {late:?}.");
	assert_eq!(transport.refresh_calls.load(Ordering::SeqCst), 1);
	assert_eq!(client.refresh_metrics.attempts(), 1);
	assert_eq!(notifications.load(Ordering::SeqCst), 1);

	let store: &dyn TokenStore = &*store;

	assert_eq!(store.fetch(TokenKind::Access).await.expect("Access lookup should succeed."), None);
}
