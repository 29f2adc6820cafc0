mod support;

// std
use std::sync::Arc;
// crates.io
use adplatform_client::{
	CallOptions, Error,
	auth::Platform,
	error::AuthError,
	http::Reply,
	url::Url,
};
use time::Duration;
// self
use support::*;

fn redirect() -> Url {
	Url::parse("https://app.example.com/oauth/callback").expect("Redirect URL should parse.")
}

fn meta_accounts_page() -> Reply {
	Reply::json(
		200,
		serde_json::json!({
			"data": [{ "id": "act_42", "account_id": "42", "name": "Main", "currency": "EUR" }]
		}),
	)
}

#[tokio::test]
async fn connected_meta_org_calls_the_api_with_the_granted_token() {
	let harness = Harness::new(config());
	let session = harness
		.client
		.tokens()
		.start_authorization(org(), Platform::Meta, redirect(), None)
		.expect("Session should start.");
	let query = session.authorize_url.query().expect("Authorize URL carries a query.");

	assert_eq!(session.authorize_url.host_str(), Some("www.facebook.com"));
	assert!(query.contains(&format!("state={}", session.state)));
	assert!(query.contains("code_challenge_method=S256"));
	assert!(query.contains("scope=ads_read%2Cbusiness_management"));

	harness.transport.route(
		META_TOKEN,
		[Reply::json(
			200,
			serde_json::json!({
				"access_token": "granted",
				"token_type": "bearer",
				"expires_in": 5_184_000
			}),
		)],
	);
	harness.transport.route(META_ACCOUNTS, [meta_accounts_page()]);

	let credential = harness
		.client
		.tokens()
		.complete_authorization(&session.state, "auth-code")
		.await
		.expect("Code exchange should succeed.");

	assert_eq!(credential.access_token.expose(), "granted");
	assert!(credential.refresh_token.is_none(), "Meta issues no refresh token.");
	assert!(harness.store.snapshot(&org(), Platform::Meta).is_some());

	let exchange = harness.transport.requests()[0].body_text();

	assert!(exchange.contains("code=auth-code"));
	assert!(exchange.contains("code_verifier="));
	assert!(exchange.contains("client_secret=meta-secret"));

	let accounts = harness
		.client
		.list_accounts(&org(), Platform::Meta, CallOptions::interactive())
		.await
		.expect("Accounts should load with the granted token.");

	assert_eq!(accounts.len(), 1);
	assert_eq!(
		harness.transport.requests()[1].header("authorization"),
		Some("Bearer granted")
	);

	let replay = harness
		.client
		.tokens()
		.complete_authorization(&session.state, "auth-code")
		.await
		.expect_err("A state value is single-use.");

	assert!(matches!(replay, Error::Auth(AuthError::StateMismatch)));
	assert_eq!(harness.transport.calls(META_TOKEN), 1);
}

#[tokio::test]
async fn disconnected_orgs_need_a_new_authorization() {
	let harness = Harness::new(config());

	harness.connect(&org(), Platform::GoogleAds).await;

	assert!(
		harness
			.client
			.tokens()
			.disconnect(&org(), Platform::GoogleAds)
			.await
			.expect("Disconnect should succeed.")
	);

	let err = harness
		.client
		.list_accounts(&org(), Platform::GoogleAds, CallOptions::interactive())
		.await
		.expect_err("Disconnected orgs have no credential.");

	assert!(matches!(err, Error::Auth(AuthError::MissingCredential { .. })), "{err:?}");
	assert_eq!(harness.transport.total_calls(), 0);
}

#[tokio::test]
async fn expired_meta_tokens_without_refresh_require_reauthorization() {
	let harness = Harness::new(config());
	let session = harness
		.client
		.tokens()
		.start_authorization(org(), Platform::Meta, redirect(), None)
		.expect("Session should start.");

	harness.transport.route(
		META_TOKEN,
		[Reply::json(
			200,
			serde_json::json!({
				"access_token": "short",
				"token_type": "Bearer",
				"expires_in": 600
			}),
		)],
	);
	harness
		.client
		.tokens()
		.complete_authorization(&session.state, "auth-code")
		.await
		.expect("Code exchange should succeed.");
	harness.clock.advance(Duration::minutes(30));

	let err = harness
		.client
		.list_accounts(&org(), Platform::Meta, CallOptions::interactive())
		.await
		.expect_err("The token expired and cannot be refreshed.");

	assert!(matches!(err, Error::Auth(AuthError::ReauthRequired { .. })), "{err:?}");
	assert_eq!(harness.transport.calls(META_ACCOUNTS), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_calls_on_an_expired_credential_share_one_refresh() {
	let harness = Arc::new(Harness::new(config()));

	harness.seed(&org(), Platform::GoogleAds, Duration::seconds(-5)).await;
	harness.transport.route(
		GOOGLE_TOKEN,
		[token_reply("token-2").delayed(std::time::Duration::from_millis(50))],
	);
	harness.transport.route(
		GOOGLE_CUSTOMERS,
		[Reply::json(200, serde_json::json!({ "resourceNames": ["customers/1234567890"] }))],
	);

	let handles = (0..8)
		.map(|_| {
			let harness = harness.clone();

			tokio::spawn(async move {
				harness
					.client
					.list_accounts(&org(), Platform::GoogleAds, CallOptions::interactive())
					.await
			})
		})
		.collect::<Vec<_>>();

	for handle in handles {
		let accounts =
			handle.await.expect("Task should not panic.").expect("Accounts should load.");

		assert_eq!(accounts.len(), 1);
	}

	assert_eq!(harness.transport.calls(GOOGLE_TOKEN), 1);
	assert_eq!(harness.transport.calls(GOOGLE_CUSTOMERS), 8);
	assert!(
		harness
			.transport
			.requests()
			.iter()
			.filter(|request| request.uri.contains(GOOGLE_CUSTOMERS))
			.all(|request| request.header("authorization") == Some("Bearer token-2"))
	);
	assert_eq!(harness.client.tokens().refresh_metrics().attempts(), 1);
}
