#![cfg(feature = "reqwest")]

// std
use std::time::Duration as StdDuration;
// crates.io
use httpmock::prelude::*;
// self
use bearer_gate::{
	_preludet::*,
	client::{ApiClient, Endpoints},
	http::ReqwestHttpClient,
	refresh::HttpTokenRefresher,
	store::{MemoryStore, TokenStore},
};

#[tokio::test]
async fn expired_token_refreshes_before_the_request_is_sent() {
	let server = MockServer::start_async().await;
	let (client, store) = build_test_client(&server.base_url());
	let expired = forge_jwt(OffsetDateTime::now_utc() - Duration::seconds(10));

	seed_tokens(&store, &expired, "refresh-1").await;

	let refresh = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/auth/refresh")
				.json_body(serde_json::json!({"refresh_token": "refresh-1"}));
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"access_token\":\"A2\",\"refresh_token\":\"R2\"}");
		})
		.await;
	let api = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/x").header("authorization", "Bearer A2");
			then.status(200).header("content-type", "application/json").body("{\"ok\":true}");
		})
		.await;

	client.get("/api/x").await.expect("GET behind a proactive refresh should succeed.");

	refresh.assert_async().await;
	api.assert_async().await;

	let access = store.access().await.expect("Access read should succeed.").expect("Present");
	let rotated = store.refresh().await.expect("Refresh read should succeed.").expect("Present");

	assert_eq!(access.expose(), "A2");
	assert_eq!(rotated.expose(), "R2");
}

#[tokio::test]
async fn concurrent_expired_requests_share_one_refresh() {
	let server = MockServer::start_async().await;
	let (client, store) = build_test_client(&server.base_url());
	let expired = forge_jwt(OffsetDateTime::now_utc() - Duration::minutes(1));

	seed_tokens(&store, &expired, "refresh-1").await;

	let refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/refresh");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"access_token\":\"A2\",\"refresh_token\":\"R2\"}")
				.delay(StdDuration::from_millis(100));
		})
		.await;
	let api = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/parallel").header("authorization", "Bearer A2");
			then.status(200).header("content-type", "application/json").body("{\"ok\":true}");
		})
		.await;
	let (a, b, c, d) = tokio::join!(
		client.get("/api/parallel"),
		client.get("/api/parallel"),
		client.get("/api/parallel"),
		client.get("/api/parallel"),
	);

	for outcome in [a, b, c, d] {
		outcome.expect("Every concurrent request should complete with the refreshed token.");
	}

	refresh.assert_calls_async(1).await;
	api.assert_calls_async(4).await;
}

#[tokio::test]
async fn failed_refresh_rejects_every_caller_and_clears_the_store() {
	let server = MockServer::start_async().await;
	let (client, store) = build_test_client(&server.base_url());
	let expired = forge_jwt(OffsetDateTime::now_utc() - Duration::minutes(1));

	seed_tokens(&store, &expired, "refresh-1").await;

	let refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/refresh");
			then.status(401)
				.header("content-type", "application/json")
				.body("{\"detail\":\"refresh token revoked\"}")
				.delay(StdDuration::from_millis(100));
		})
		.await;
	let (a, b, c) = tokio::join!(
		client.get("/api/one"),
		client.get("/api/two"),
		client.get("/api/three"),
	);

	let messages = [a, b, c].map(|outcome| {
		let err = outcome.expect_err("Every caller parked behind the failed refresh must reject.");

		assert!(err.is_auth_expired(), "expected AuthExpired, got {err:?}");

		err.to_string()
	});

	// Every parked caller carries the episode's failure, not a generic empty-store message.
	assert!(messages[0].contains("refresh token revoked"), "unexpected: {}", messages[0]);
	assert!(messages.iter().all(|message| message == &messages[0]));

	refresh.assert_calls_async(1).await;

	assert!(store.access().await.expect("Access read should succeed.").is_none());
	assert!(store.refresh().await.expect("Refresh read should succeed.").is_none());
	assert!(store.session().await.expect("Session read should succeed.").is_none());
}

#[tokio::test]
async fn requests_after_a_settled_refresh_see_the_new_tokens() {
	let server = MockServer::start_async().await;
	let (client, store) = build_test_client(&server.base_url());
	let expired = forge_jwt(OffsetDateTime::now_utc() - Duration::seconds(30));
	let renewed = forge_jwt(OffsetDateTime::now_utc() + Duration::hours(1));

	seed_tokens(&store, &expired, "refresh-1").await;

	let refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/refresh");
			then.status(200).header("content-type", "application/json").body(format!(
				"{{\"access_token\":\"{renewed}\",\"refresh_token\":\"R2\"}}"
			));
		})
		.await;
	let api = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/later").header("authorization", format!("Bearer {renewed}"));
			then.status(200).header("content-type", "application/json").body("{\"ok\":true}");
		})
		.await;

	client.get("/api/later").await.expect("First request should refresh and succeed.");
	// The renewed token decodes as fresh, so the second request skips the refresh path.
	client.get("/api/later").await.expect("Second request should reuse the stored token.");

	refresh.assert_calls_async(1).await;
	api.assert_calls_async(2).await;
}

#[tokio::test]
async fn hung_refresh_times_out_and_ends_the_session() {
	let server = MockServer::start_async().await;
	let store_backend = Arc::new(MemoryStore::default());
	let endpoints =
		Endpoints::new(Url::parse(&server.base_url()).expect("Mock base URL should parse."));
	let refresh_url =
		endpoints.resolve(&endpoints.refresh).expect("Refresh endpoint should resolve.");
	let http_client = ReqwestHttpClient::default();
	let refresher = Arc::new(
		HttpTokenRefresher::new(http_client.clone(), refresh_url)
			.with_timeout(Some(StdDuration::from_millis(100))),
	);
	let client =
		ApiClient::with_refresher(endpoints, store_backend.clone(), http_client, refresher);
	let expired = forge_jwt(OffsetDateTime::now_utc() - Duration::seconds(10));

	seed_tokens(&store_backend, &expired, "refresh-1").await;

	// The backend answers, but only after the refresher's deadline has passed.
	server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/refresh");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"access_token\":\"A2\",\"refresh_token\":\"R2\"}")
				.delay(StdDuration::from_secs(2));
		})
		.await;

	let err = client.get("/api/slow").await.expect_err("A hung refresh must end the session.");

	assert!(err.is_auth_expired(), "expected AuthExpired, got {err:?}");
	assert!(store_backend.access().await.expect("Access read should succeed.").is_none());
	assert!(store_backend.refresh().await.expect("Refresh read should succeed.").is_none());
}
