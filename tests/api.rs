//! Integration tests for the management API.
//!
//! Each test drives the router in-process (`tower::ServiceExt::oneshot`)
//! against an in-memory database, with a wiremock server standing in for
//! both the feed host and Discord.

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use secrecy::SecretString;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use feedcord::api::{router, AppState};
use feedcord::discord::{ChannelCache, DiscordClient, Gateway};
use feedcord::feed::FetchOptions;
use feedcord::relay::Relay;
use feedcord::storage::Database;

const CHANNEL_A: &str = "123456789012345678";
const CHANNEL_B: &str = "876543210987654321";
const FORUM: &str = "111111111111111111";
const VOICE: &str = "222222222222222222";
const KEY: &str = "letmein";

const FEED: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <title>Example News</title>
    <item>
        <title>Item a</title>
        <link>https://example.com/a</link>
        <pubDate>Mon, 21 Oct 2024 07:28:00 GMT</pubDate>
    </item>
    <item>
        <title>Item b</title>
        <link>https://example.com/b</link>
        <pubDate>Mon, 21 Oct 2024 08:00:00 GMT</pubDate>
    </item>
</channel></rss>"#;

struct TestApp {
    server: MockServer,
    app: Router,
    relay: Arc<Relay>,
}

impl TestApp {
    fn feed_url(&self) -> String {
        format!("{}/feed.xml", self.server.uri())
    }

    async fn call(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        self.call_with_key(method, uri, Some(KEY), body).await
    }

    async fn call_with_key(
        &self,
        method: Method,
        uri: &str,
        key: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(key) = key {
            builder = builder.header("x-api-key", key);
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn add(&self, channel: &str) -> Value {
        let (status, body) = self
            .call(
                Method::POST,
                "/api/feeds",
                Some(json!({ "url": self.feed_url(), "channelId": channel })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body
    }
}

async fn mount_channel(server: &MockServer, id: &str, code: u8) {
    Mock::given(method("GET"))
        .and(path(format!("/channels/{id}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": id, "type": code })))
        .mount(server)
        .await;
}

async fn test_app() -> TestApp {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(FEED))
        .mount(&server)
        .await;
    mount_channel(&server, CHANNEL_A, 0).await;
    mount_channel(&server, CHANNEL_B, 0).await;
    mount_channel(&server, FORUM, 15).await;
    mount_channel(&server, VOICE, 2).await;
    Mock::given(method("POST"))
        .and(path(format!("/channels/{CHANNEL_A}/messages")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "42" })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/channels/{FORUM}/threads")))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "43" })))
        .mount(&server)
        .await;

    let db = Database::open(":memory:").await.unwrap();
    let discord = DiscordClient::new(
        reqwest::Client::new(),
        server.uri(),
        SecretString::from("test-token".to_string()),
    );
    let gateway = Gateway::new(discord, Arc::new(ChannelCache::default()));
    let relay = Arc::new(Relay::new(
        db,
        reqwest::Client::new(),
        gateway,
        FetchOptions::default(),
    ));

    let app = router(AppState {
        relay: relay.clone(),
        api_key: Some(Arc::new(SecretString::from(KEY.to_string()))),
        default_interval_ms: 60_000,
    });

    TestApp { server, app, relay }
}

// ============================================================================
// Auth
// ============================================================================

#[tokio::test]
async fn test_health_is_not_gated() {
    let t = test_app().await;
    let (status, body) = t
        .call_with_key(Method::GET, "/api/health", None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_api_key_required() {
    let t = test_app().await;

    let (status, body) = t.call_with_key(Method::GET, "/api/feeds", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].as_str().unwrap().contains("API key"));

    let (status, _) = t
        .call_with_key(Method::GET, "/api/feeds", Some("wrong"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = t.call(Method::GET, "/api/feeds", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

// ============================================================================
// Add / List
// ============================================================================

#[tokio::test]
async fn test_add_feed_records_title_and_default_interval() {
    let t = test_app().await;
    let created = t.add(CHANNEL_A).await;

    assert_eq!(created["url"], t.feed_url());
    assert_eq!(created["channelId"], CHANNEL_A);
    assert_eq!(created["intervalMs"], 60_000);
    assert_eq!(created["title"], "Example News");
    assert_eq!(created["lastSeenLink"], "");
    assert_eq!(created["active"], true);
}

#[tokio::test]
async fn test_add_duplicate_is_conflict() {
    let t = test_app().await;
    t.add(CHANNEL_A).await;

    let (status, body) = t
        .call(
            Method::POST,
            "/api/feeds",
            Some(json!({ "url": t.feed_url(), "channelId": CHANNEL_A })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].is_string());

    // Same feed into another channel is fine
    t.add(CHANNEL_B).await;
}

#[tokio::test]
async fn test_add_validates_before_touching_store() {
    let t = test_app().await;

    let cases = [
        json!({ "url": "not a url", "channelId": CHANNEL_A }),
        json!({ "url": t.feed_url(), "channelId": "general" }),
        json!({ "url": t.feed_url(), "channelId": "12345" }),
        json!({ "url": t.feed_url(), "channelId": CHANNEL_A, "intervalMs": 59_999 }),
    ];
    for case in cases {
        let (status, body) = t.call(Method::POST, "/api/feeds", Some(case.clone())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{case}");
        assert!(body["error"].is_string());
    }

    assert!(t.relay.db().find_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_add_unreachable_feed_is_unprocessable() {
    let t = test_app().await;
    let (status, body) = t
        .call(
            Method::POST,
            "/api/feeds",
            Some(json!({ "url": format!("{}/gone.xml", t.server.uri()), "channelId": CHANNEL_A })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("404"));
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let t = test_app().await;
    let (status, body) = t
        .call(Method::POST, "/api/feeds", Some(json!({ "channelId": CHANNEL_A })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("Malformed"));
}

#[tokio::test]
async fn test_list_filters_by_channel() {
    let t = test_app().await;
    t.add(CHANNEL_A).await;
    t.add(CHANNEL_B).await;

    let (_, all) = t.call(Method::GET, "/api/feeds", None).await;
    assert_eq!(all.as_array().unwrap().len(), 2);

    let (status, only_b) = t
        .call(Method::GET, &format!("/api/feeds?channelId={CHANNEL_B}"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let only_b = only_b.as_array().unwrap();
    assert_eq!(only_b.len(), 1);
    assert_eq!(only_b[0]["channelId"], CHANNEL_B);

    let (status, _) = t
        .call(Method::GET, "/api/feeds?channelId=nope", None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ============================================================================
// Update / Toggle / Delete
// ============================================================================

#[tokio::test]
async fn test_update_interval_and_target() {
    let t = test_app().await;
    t.add(CHANNEL_A).await;

    let (status, updated) = t
        .call(
            Method::PATCH,
            "/api/feeds",
            Some(json!({
                "url": t.feed_url(),
                "intervalMs": 300_000,
                "newChannelId": CHANNEL_B
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{updated}");
    assert_eq!(updated["intervalMs"], 300_000);
    assert_eq!(updated["channelId"], CHANNEL_B);
}

#[tokio::test]
async fn test_interval_only_update_keeps_target() {
    let t = test_app().await;
    t.add(CHANNEL_A).await;
    t.relay.gateway().resolve_channel(CHANNEL_A).await.unwrap();

    let (status, updated) = t
        .call(
            Method::PATCH,
            "/api/feeds",
            Some(json!({ "url": t.feed_url(), "intervalMs": 120_000 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{updated}");
    assert_eq!(updated["intervalMs"], 120_000);
    assert_eq!(updated["channelId"], CHANNEL_A);
    assert!(t.relay.gateway().cache().get(CHANNEL_A).is_some());
}

#[tokio::test]
async fn test_retarget_invalidates_cached_channels() {
    let t = test_app().await;
    t.add(CHANNEL_A).await;

    let gateway = t.relay.gateway();
    gateway.resolve_channel(CHANNEL_A).await.unwrap();
    gateway.resolve_channel(CHANNEL_B).await.unwrap();
    gateway.resolve_channel(FORUM).await.unwrap();
    assert_eq!(gateway.cache().len(), 3);

    let (status, updated) = t
        .call(
            Method::PATCH,
            "/api/feeds",
            Some(json!({ "url": t.feed_url(), "newChannelId": CHANNEL_B })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{updated}");

    assert!(gateway.cache().get(CHANNEL_A).is_none());
    assert!(gateway.cache().get(CHANNEL_B).is_none());
    assert!(gateway.cache().get(FORUM).is_some());
}

#[tokio::test]
async fn test_update_rejections() {
    let t = test_app().await;
    t.add(CHANNEL_A).await;
    t.add(CHANNEL_B).await;

    // Interval below minimum
    let (status, _) = t
        .call(
            Method::PATCH,
            "/api/feeds",
            Some(json!({ "url": t.feed_url(), "channelId": CHANNEL_A, "intervalMs": 1000 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Nothing to change
    let (status, _) = t
        .call(
            Method::PATCH,
            "/api/feeds",
            Some(json!({ "url": t.feed_url(), "channelId": CHANNEL_A })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Feed lives in two channels: must be qualified
    let (status, body) = t
        .call(
            Method::PATCH,
            "/api/feeds",
            Some(json!({ "url": t.feed_url(), "intervalMs": 120_000 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("channel"));

    // Unknown feed
    let (status, _) = t
        .call(
            Method::PATCH,
            "/api/feeds",
            Some(json!({ "url": "https://unknown.example/rss", "intervalMs": 120_000 })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Retarget onto an existing (url, channel) pair
    let (status, _) = t
        .call(
            Method::PATCH,
            "/api/feeds",
            Some(json!({ "url": t.feed_url(), "channelId": CHANNEL_A, "newChannelId": CHANNEL_B })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_toggle_flips_active() {
    let t = test_app().await;
    t.add(CHANNEL_A).await;

    let selector = json!({ "url": t.feed_url() });
    let (status, paused) = t
        .call(Method::POST, "/api/feeds/toggle", Some(selector.clone()))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(paused["active"], false);
    assert!(t.relay.db().find_all_active().await.unwrap().is_empty());

    let (_, resumed) = t
        .call(Method::POST, "/api/feeds/toggle", Some(selector))
        .await;
    assert_eq!(resumed["active"], true);
}

#[tokio::test]
async fn test_delete_then_not_found() {
    let t = test_app().await;
    t.add(CHANNEL_A).await;

    let selector = json!({ "url": t.feed_url(), "channelId": CHANNEL_A });
    let (status, deleted) = t
        .call(Method::DELETE, "/api/feeds", Some(selector.clone()))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(deleted["channelId"], CHANNEL_A);

    let (status, _) = t.call(Method::DELETE, "/api/feeds", Some(selector)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ============================================================================
// Test-parse / Send-latest / Manual
// ============================================================================

#[tokio::test]
async fn test_parse_reports_latest_without_storing() {
    let t = test_app().await;
    let (status, report) = t
        .call(Method::POST, "/api/test-parse", Some(json!({ "url": t.feed_url() })))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["title"], "Example News");
    assert_eq!(report["itemCount"], 2);
    assert_eq!(report["latest"]["title"], "Item b");
    assert_eq!(report["latestLink"], "https://example.com/b");
    assert!(t.relay.db().find_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_send_latest_delivers_once() {
    let t = test_app().await;
    t.add(CHANNEL_A).await;

    let request = json!({ "url": t.feed_url(), "channelId": CHANNEL_A });
    let (status, outcome) = t
        .call(Method::POST, "/api/send-latest", Some(request.clone()))
        .await;
    assert_eq!(status, StatusCode::OK, "{outcome}");
    assert_eq!(outcome["outcome"], "delivered");
    assert_eq!(outcome["link"], "https://example.com/b");
    assert_eq!(outcome["delivery"], json!({ "kind": "message", "id": "42" }));

    let (_, again) = t
        .call(Method::POST, "/api/send-latest", Some(request))
        .await;
    assert_eq!(again["outcome"], "alreadySeen");

    // Forcing does not re-send a link that was already delivered
    let (_, forced) = t
        .call(
            Method::POST,
            "/api/send-latest",
            Some(json!({ "url": t.feed_url(), "force": true })),
        )
        .await;
    assert_eq!(forced["outcome"], "alreadySeen");
}

#[tokio::test]
async fn test_manual_post_to_text_and_forum() {
    let t = test_app().await;

    let (status, delivery) = t
        .call(
            Method::POST,
            "/api/manual",
            Some(json!({ "channelId": CHANNEL_A, "title": "Hello", "link": "https://example.com/x" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(delivery, json!({ "kind": "message", "id": "42" }));

    let (status, delivery) = t
        .call(
            Method::POST,
            "/api/manual",
            Some(json!({ "channelId": FORUM, "title": "Hello" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(delivery, json!({ "kind": "thread", "id": "43" }));
}

#[tokio::test]
async fn test_manual_post_errors() {
    let t = test_app().await;

    let (status, _) = t
        .call(
            Method::POST,
            "/api/manual",
            Some(json!({ "channelId": CHANNEL_A, "title": "   " })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = t
        .call(
            Method::POST,
            "/api/manual",
            Some(json!({ "channelId": CHANNEL_A, "title": "Hi", "link": "nope" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = t
        .call(
            Method::POST,
            "/api/manual",
            Some(json!({ "channelId": VOICE, "title": "Hi" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"].as_str().unwrap().contains("Unsupported channel type"));
}
