mod support;

// crates.io
use adplatform_client::{
	CallOptions, Error, ErrorKind,
	auth::Platform,
	error::ValidationError,
	http::Reply,
	mapping::InsightRow,
	request::GaqlQuery,
};
use futures::TryStreamExt;
// self
use support::*;

#[tokio::test]
async fn meta_insights_yield_every_page_in_order_then_stop() {
	let harness = Harness::new(config());

	harness.connect(&org(), Platform::Meta).await;
	harness.transport.route(
		META_INSIGHTS,
		[
			meta_insights_page("1", Some("c1")),
			meta_insights_page("2", Some("c2")),
			meta_insights_page("3", None),
		],
	);

	let mut pages = harness
		.client
		.fetch_insights(
			&org(),
			Platform::Meta,
			insights_request(meta_account()),
			CallOptions::background(),
		)
		.await
		.expect("First page should load.");
	let mut campaigns = Vec::new();

	while let Some(page) = pages.next_page().await {
		let page = page.expect("Every page should load.");

		assert_eq!(page.index, campaigns.len());

		campaigns.extend(page.items.into_iter().filter_map(|row: InsightRow| row.entity_id));
	}

	assert_eq!(campaigns, ["1", "2", "3"]);
	assert!(pages.next_page().await.is_none(), "The sequence stays finished.");
	assert_eq!(harness.transport.calls(META_INSIGHTS), 3);

	let uris = harness.transport.requests().into_iter().map(|r| r.uri).collect::<Vec<_>>();

	assert!(!uris[0].contains("after="));
	assert!(uris[1].contains("after=c1"));
	assert!(uris[2].contains("after=c2"));
}

#[tokio::test]
async fn restart_reissues_the_first_request() {
	let harness = Harness::new(config());

	harness.connect(&org(), Platform::Meta).await;
	harness.transport.route(
		META_INSIGHTS,
		[meta_insights_page("1", Some("c1")), meta_insights_page("2", None)],
	);

	let mut pages = harness
		.client
		.fetch_insights(
			&org(),
			Platform::Meta,
			insights_request(meta_account()),
			CallOptions::interactive(),
		)
		.await
		.expect("First page should load.");

	while pages.next_page().await.is_some() {}

	pages.restart();

	let first = pages
		.next_page()
		.await
		.expect("Restart begins a new pass.")
		.expect("Page should load.");

	assert_eq!(first.index, 0);

	let last = harness.transport.requests().pop().expect("A request was recorded.");

	assert!(!last.uri.contains("after="), "The restarted pass starts without a cursor.");
	assert_eq!(harness.transport.calls(META_INSIGHTS), 3);
}

#[tokio::test]
async fn repeated_cursors_end_the_pass() {
	let harness = Harness::new(config());

	harness.connect(&org(), Platform::Meta).await;
	harness.transport.route(META_INSIGHTS, [meta_insights_page("1", Some("loop"))]);

	let pages = harness
		.client
		.fetch_insights(
			&org(),
			Platform::Meta,
			insights_request(meta_account()),
			CallOptions::interactive(),
		)
		.await
		.expect("First page should load.");
	let rows = pages.collect_items().await.expect("Pages should load.");

	assert_eq!(rows.len(), 2);
	assert_eq!(harness.transport.calls(META_INSIGHTS), 2);
}

#[tokio::test]
async fn an_error_ends_the_current_pass() {
	let harness = Harness::new(config());

	harness.connect(&org(), Platform::Meta).await;
	harness.transport.route(
		META_INSIGHTS,
		[
			meta_insights_page("1", Some("c1")),
			Reply::json(
				400,
				serde_json::json!({ "error": { "message": "Bad cursor", "code": 100 } }),
			),
		],
	);

	let mut pages = harness
		.client
		.fetch_insights(
			&org(),
			Platform::Meta,
			insights_request(meta_account()),
			CallOptions::interactive(),
		)
		.await
		.expect("First page should load.");

	pages.next_page().await.expect("First page is buffered.").expect("First page is ok.");

	let err = pages
		.next_page()
		.await
		.expect("Second pull reports the failure.")
		.expect_err("Second page fails.");

	assert!(matches!(err, Error::Validation(ValidationError::Rejected { status: 400, .. })));
	assert!(pages.next_page().await.is_none());
}

#[tokio::test]
async fn google_queries_follow_page_tokens_in_the_body() {
	let harness = Harness::new(config());

	harness.connect(&org(), Platform::GoogleAds).await;
	harness.transport.route(
		GOOGLE_SEARCH,
		[google_search_page(1, Some("t2")), google_search_page(2, Some("")), Reply::status(500)],
	);

	let query = GaqlQuery::builder("campaign")
		.select_all(["campaign.id", "campaign.name", "metrics.clicks"])
		.build()
		.expect("Query should build.");
	let pages = harness
		.client
		.run_query(&org(), &google_account(), &query, CallOptions::interactive())
		.await
		.expect("First page should load.")
		.into_stream()
		.try_collect::<Vec<_>>()
		.await
		.expect("Both pages should load.");

	assert_eq!(pages.len(), 2, "An empty nextPageToken ends the sequence.");
	assert_eq!(harness.transport.calls(GOOGLE_SEARCH), 2);
	assert_eq!(pages[0].items[0]["campaign"]["id"], "1");
	assert_eq!(pages[1].items[0]["campaign"]["id"], "2");

	let bodies =
		harness.transport.requests().into_iter().map(|r| r.body_text()).collect::<Vec<_>>();

	assert!(!bodies[0].contains("pageToken"));
	assert!(bodies[1].contains(r#""pageToken":"t2""#));
	assert!(bodies[1].contains(query.as_str()));
}

#[tokio::test]
async fn google_insights_map_cost_micros_to_spend() {
	let harness = Harness::new(config());

	harness.connect(&org(), Platform::GoogleAds).await;
	harness.transport.route(GOOGLE_SEARCH, [google_search_page(7, None)]);

	let rows = harness
		.client
		.fetch_insights(
			&org(),
			Platform::GoogleAds,
			insights_request(google_account()),
			CallOptions::interactive(),
		)
		.await
		.expect("Insights should load.")
		.collect_items()
		.await
		.expect("Rows should load.");

	assert_eq!(rows.len(), 1);
	assert_eq!(rows[0].platform, Some(Platform::GoogleAds));
	assert_eq!(rows[0].entity_id.as_deref(), Some("7"));
	assert_eq!(rows[0].impressions, Some(500));
	assert_eq!(rows[0].spend, Some(2.5));

	let search = &harness.transport.requests()[0];

	assert!(search.uri.ends_with("customers/1234567890/googleAds:search"));
	assert!(search.body_text().contains("FROM campaign"));
}

#[tokio::test]
async fn meta_accounts_are_collected_across_pages() {
	let harness = Harness::new(config());
	let page = |ids: &[&str], after: Option<&str>| {
		let mut body = serde_json::json!({
			"data": ids
				.iter()
				.map(|id| serde_json::json!({
					"id": format!("act_{id}"),
					"account_id": id,
					"name": format!("Account {id}"),
					"currency": "USD",
					"timezone_name": "America/New_York"
				}))
				.collect::<Vec<_>>()
		});

		if let Some(after) = after {
			body["paging"] = serde_json::json!({ "cursors": { "after": after }, "next": "more" });
		}

		Reply::json(200, body)
	};

	harness.connect(&org(), Platform::Meta).await;
	harness.transport.route(META_ACCOUNTS, [page(&["1", "2"], Some("c1")), page(&["3"], None)]);

	let accounts = harness
		.client
		.list_accounts(&org(), Platform::Meta, CallOptions::interactive())
		.await
		.expect("Accounts should load.");
	let ids = accounts.iter().map(|account| &*account.id).collect::<Vec<_>>();

	assert_eq!(ids, ["1", "2", "3"]);
	assert_eq!(accounts[0].currency.as_deref(), Some("USD"));
	assert_eq!(harness.transport.calls(META_ACCOUNTS), 2);
}

#[tokio::test]
async fn google_accounts_skip_malformed_resource_names() {
	let harness = Harness::new(config());

	harness.connect(&org(), Platform::GoogleAds).await;
	harness.transport.route(
		GOOGLE_CUSTOMERS,
		[Reply::json(
			200,
			serde_json::json!({
				"resourceNames": ["customers/1234567890", "customers/not-a-number", "oops"]
			}),
		)],
	);

	let accounts = harness
		.client
		.list_accounts(&org(), Platform::GoogleAds, CallOptions::interactive())
		.await
		.expect("Accounts should load.");

	assert_eq!(accounts.len(), 1);
	assert_eq!(&*accounts[0].id, "1234567890");
	assert_eq!(accounts[0].platform, Platform::GoogleAds);
}

#[tokio::test]
async fn malformed_bodies_surface_as_transient_parse_errors() {
	let harness = Harness::new(config());

	harness.connect(&org(), Platform::Meta).await;
	harness.transport.route(META_INSIGHTS, [Reply::json(200, serde_json::json!({ "data": 7 }))]);

	let err = harness
		.client
		.fetch_insights(
			&org(),
			Platform::Meta,
			insights_request(meta_account()),
			CallOptions::interactive(),
		)
		.await
		.expect_err("The body does not match the insights shape.");

	assert_eq!(err.kind(), ErrorKind::TransientPlatform);
}
