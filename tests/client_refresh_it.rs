#![cfg(all(feature = "reqwest", feature = "test"))]

// std
use std::{
	sync::atomic::{AtomicUsize, Ordering},
	time::Duration,
};
// crates.io
use httpmock::prelude::*;
use serde_json::json;
// self
use resume_auth_client::{
	_preludet::*,
	auth::{TokenKind, TokenPair},
	client::{SessionExpired, SessionExpiredReason, SessionListener},
	store::{MemoryStore, TokenStore},
};

const STALE_BEARER: &str = "Bearer access-old";
const FRESH_BEARER: &str = "Bearer access-new";

fn seeded_pair() -> TokenPair {
	TokenPair::new("access-old", "refresh-old")
}

fn rotated_body() -> serde_json::Value {
	json!({ "accessToken": "access-new", "refreshToken": "refresh-new" })
}

fn counting_listener(calls: &Arc<AtomicUsize>) -> Arc<dyn SessionListener> {
	let calls = Arc::clone(calls);

	Arc::new(move |_: &SessionExpired| {
		calls.fetch_add(1, Ordering::SeqCst);
	})
}

async fn assert_storage_cleared(store: &MemoryStore) {
	let store: &dyn TokenStore = store;

	assert_eq!(store.fetch(TokenKind::Access).await.expect("Access lookup should succeed."), None);
	assert_eq!(store.fetch(TokenKind::Refresh).await.expect("Refresh lookup should succeed."), None);
}

#[tokio::test]
async fn expired_token_is_refreshed_and_request_retried() {
	let server = MockServer::start_async().await;
	let stale = server
		.mock_async(|when, then| {
			when.method(GET).path("/cv").header("authorization", STALE_BEARER);
			then.status(401).body("token expired");
		})
		.await;
	let fresh = server
		.mock_async(|when, then| {
			when.method(GET).path("/cv").header("authorization", FRESH_BEARER);
			then.status(200).header("content-type", "application/json").body("[{\"id\":1}]");
		})
		.await;
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/auth/refresh")
				.header("content-type", "application/json")
				.json_body(json!({ "refreshTokenHash": "refresh-old" }));
			then.status(200).header("content-type", "application/json").json_body(rotated_body());
		})
		.await;
	let (client, store) = build_reqwest_test_client(&server.base_url(), Some(seeded_pair())).await;
	let response = client.get("cv").await.expect("Request should succeed after a refresh.");

	assert_eq!(response.status.as_u16(), 200);
	assert_eq!(response.text(), "[{\"id\":1}]");

	stale.assert_calls_async(1).await;
	fresh.assert_calls_async(1).await;
	refresh.assert_calls_async(1).await;

	let store: &dyn TokenStore = &*store;

	assert_eq!(
		store.fetch(TokenKind::Access).await.expect("Access lookup should succeed."),
		Some("access-new".into())
	);
	assert_eq!(
		store.fetch(TokenKind::Refresh).await.expect("Refresh lookup should succeed."),
		Some("refresh-new".into())
	);
	assert_eq!(client.refresh_metrics.attempts(), 1);
	assert_eq!(client.refresh_metrics.successes(), 1);
	assert!(!client.is_refreshing());
}

#[tokio::test]
async fn concurrent_unauthorized_requests_share_one_refresh() {
	let server = MockServer::start_async().await;
	let stale = server
		.mock_async(|when, then| {
			when.method(GET).path("/cv").header("authorization", STALE_BEARER);
			then.status(401);
		})
		.await;
	let fresh = server
		.mock_async(|when, then| {
			when.method(GET).path("/cv").header("authorization", FRESH_BEARER);
			then.status(200).body("ok");
		})
		.await;
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/refresh");
			then.status(200)
				.header("content-type", "application/json")
				.json_body(rotated_body())
				.delay(Duration::from_millis(200));
		})
		.await;
	let (client, _store) = build_reqwest_test_client(&server.base_url(), Some(seeded_pair())).await;
	let (a, b, c) = tokio::join!(client.get("cv"), client.get("cv"), client.get("cv"));

	for (name, result) in [("A", a), ("B", b), ("C", c)] {
		let response = result.unwrap_or_else(|e| panic!("Request {name} should succeed: {e}."));

		assert_eq!(response.text(), "ok");
	}

	refresh.assert_calls_async(1).await;
	stale.assert_calls_async(3).await;
	fresh.assert_calls_async(3).await;

	let metrics = client.refresh_metrics.snapshot();

	assert_eq!(metrics.started, 1);
	assert_eq!(metrics.joined, 2);
	assert_eq!(metrics.succeeded, 1);
	assert_eq!(metrics.failed, 0);
}

#[tokio::test]
async fn failed_refresh_returns_original_error_and_clears_storage() {
	let server = MockServer::start_async().await;
	let api = server
		.mock_async(|when, then| {
			when.method(GET).path("/cv");
			then.status(401).body("token expired");
		})
		.await;
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/refresh");
			then.status(401).body("refresh token revoked");
		})
		.await;
	let (client, store) = build_reqwest_test_client(&server.base_url(), Some(seeded_pair())).await;
	let calls = Arc::new(AtomicUsize::new(0));

	client.add_session_listener(counting_listener(&calls));

	let err = client.get("cv").await.expect_err("Request must fail when the refresh fails.");

	match &err {
		Error::Status(status) => {
			assert_eq!(status.status, 401);
			assert!(status.url.ends_with("/cv"), "Error must describe the original request.");
			assert_eq!(status.body, "token expired");
		},
		other => panic!("Unexpected error variant: {other:?}."),
	}

	api.assert_calls_async(1).await;
	refresh.assert_calls_async(1).await;
	assert_storage_cleared(&store).await;
	assert_eq!(calls.load(Ordering::SeqCst), 1);
	assert_eq!(client.refresh_metrics.failures(), 1);
}

#[tokio::test]
async fn concurrent_failures_notify_listeners_once() {
	let server = MockServer::start_async().await;
	let _api = server
		.mock_async(|when, then| {
			when.method(GET).path("/cv");
			then.status(401);
		})
		.await;
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/refresh");
			then.status(500).delay(Duration::from_millis(200));
		})
		.await;
	let (client, store) = build_reqwest_test_client(&server.base_url(), Some(seeded_pair())).await;
	let calls = Arc::new(AtomicUsize::new(0));

	client.add_session_listener(counting_listener(&calls));

	let (a, b, c) = tokio::join!(client.get("cv"), client.get("cv"), client.get("cv"));

	for result in [a, b, c] {
		let err = result.expect_err("Every caller must see a failure.");

		assert!(err.is_unauthorized(), "Callers must see their original 401: {err:?}.");
	}

	refresh.assert_calls_async(1).await;
	assert_storage_cleared(&store).await;
	assert_eq!(calls.load(Ordering::SeqCst), 1);
	assert_eq!(client.refresh_metrics.attempts(), 1);
	assert_eq!(client.refresh_metrics.joins(), 2);
}

#[tokio::test]
async fn missing_refresh_token_skips_the_network_and_expires_session() {
	let server = MockServer::start_async().await;
	let api = server
		.mock_async(|when, then| {
			when.method(GET).path("/cv");
			then.status(401);
		})
		.await;
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/refresh");
			then.status(200).json_body(rotated_body());
		})
		.await;
	let (client, store) = build_reqwest_test_client(&server.base_url(), None).await;
	let seeded: &dyn TokenStore = &*store;

	seeded.save(TokenKind::Access, "access-old".into()).await.expect("Seeding should succeed.");

	let calls = Arc::new(AtomicUsize::new(0));

	client.add_session_listener(counting_listener(&calls));

	let err = client.get("cv").await.expect_err("Request must fail without a refresh token.");

	assert!(matches!(err, Error::MissingRefreshToken), "Unexpected error: {err:?}.");

	api.assert_calls_async(1).await;
	refresh.assert_calls_async(0).await;
	assert_storage_cleared(&store).await;
	assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn second_unauthorized_after_retry_is_terminal() {
	let server = MockServer::start_async().await;
	let api = server
		.mock_async(|when, then| {
			when.method(GET).path("/cv");
			then.status(401).body("still expired");
		})
		.await;
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/refresh");
			then.status(200).header("content-type", "application/json").json_body(rotated_body());
		})
		.await;
	let (client, _store) = build_reqwest_test_client(&server.base_url(), Some(seeded_pair())).await;
	let err = client.get("cv").await.expect_err("Second 401 must propagate.");

	assert!(err.is_unauthorized());

	api.assert_calls_async(2).await;
	refresh.assert_calls_async(1).await;
}

#[tokio::test]
async fn unauthorized_refresh_endpoint_call_expires_session_without_refreshing() {
	let server = MockServer::start_async().await;
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/refresh");
			then.status(401);
		})
		.await;
	let (client, store) = build_reqwest_test_client(&server.base_url(), Some(seeded_pair())).await;
	let calls = Arc::new(AtomicUsize::new(0));

	client.add_session_listener(Arc::new({
		let calls = Arc::clone(&calls);

		move |event: &SessionExpired| {
			assert_eq!(event.reason, SessionExpiredReason::RefreshCallUnauthorized);

			calls.fetch_add(1, Ordering::SeqCst);
		}
	}));

	let err = client
		.post_json("/auth/refresh", &json!({ "refreshTokenHash": "refresh-old" }))
		.await
		.expect_err("401 from the refresh endpoint must fail.");

	assert!(err.is_unauthorized());

	refresh.assert_calls_async(1).await;
	assert_storage_cleared(&store).await;
	assert_eq!(calls.load(Ordering::SeqCst), 1);
	assert_eq!(client.refresh_metrics.attempts(), 0);
}

#[tokio::test]
async fn non_unauthorized_errors_pass_through() {
	let server = MockServer::start_async().await;
	let api = server
		.mock_async(|when, then| {
			when.method(DELETE).path("/cv/7");
			then.status(404).body("missing");
		})
		.await;
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/refresh");
			then.status(200).json_body(rotated_body());
		})
		.await;
	let (client, _store) = build_reqwest_test_client(&server.base_url(), Some(seeded_pair())).await;
	let err = client.delete("cv/7").await.expect_err("404 must propagate.");

	assert_eq!(err.status(), Some(404));

	api.assert_calls_async(1).await;
	refresh.assert_calls_async(0).await;
}

#[tokio::test]
async fn send_json_decodes_after_refresh() {
	#[derive(Debug, Deserialize, PartialEq)]
	struct Cv {
		id: u32,
		title: String,
	}

	let server = MockServer::start_async().await;
	let _stale = server
		.mock_async(|when, then| {
			when.method(PUT).path("/cv/1").header("authorization", STALE_BEARER);
			then.status(401);
		})
		.await;
	let fresh = server
		.mock_async(|when, then| {
			when.method(PUT)
				.path("/cv/1")
				.header("authorization", FRESH_BEARER)
				.json_body(json!({ "title": "Staff engineer" }));
			then.status(200)
				.header("content-type", "application/json")
				.json_body(json!({ "id": 1, "title": "Staff engineer" }));
		})
		.await;
	let _refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/refresh");
			then.status(200).header("content-type", "application/json").json_body(rotated_body());
		})
		.await;
	let (client, _store) = build_reqwest_test_client(&server.base_url(), Some(seeded_pair())).await;
	let request = client
		.request(::http::Method::PUT, "cv/1")
		.and_then(|r| r.with_json(&json!({ "title": "Staff engineer" })))
		.expect("Request should build.");
	let cv: Cv = client.send_json(request).await.expect("Decoding should succeed after a refresh.");

	assert_eq!(cv, Cv { id: 1, title: "Staff engineer".into() });

	fresh.assert_calls_async(1).await;
}
