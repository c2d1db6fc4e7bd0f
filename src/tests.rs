//! Integration tests for the App Forge backend.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tempfile::TempDir;

use crate::config::Config;
use crate::db::{init_database, Repository};
use crate::platform::{ChatClient, ChatMessage, ChatReply, PlatformError, PlatformResult, Service};
use crate::search::{self, SearchIndex};
use crate::{create_router, AppState};

const COUNTER_HTML: &str = "<!DOCTYPE html>\n<html>\n<head><title>Counter</title></head>\n<body>\n<button>+</button>\n</body>\n</html>";

const TIMER_HTML: &str = "<!DOCTYPE html>\n<html>\n<head><title>Counter</title></head>\n<body>\n<button>start</button>\n<span>00:00</span>\n</body>\n</html>";

/// Chat endpoint that answers every request with the scripted reply.
struct ScriptedChat {
    reply: Mutex<String>,
    models: Option<Value>,
}

impl ScriptedChat {
    fn answer(&self, reply: &str) {
        *self.reply.lock().unwrap() = reply.to_string();
    }
}

#[async_trait]
impl ChatClient for ScriptedChat {
    async fn complete(&self, _messages: &[ChatMessage], _model: &str) -> PlatformResult<ChatReply> {
        let content = self.reply.lock().unwrap().clone();
        Ok(ChatReply::from_json(&json!({
            "choices": [{ "message": { "role": "assistant", "content": content } }]
        })))
    }

    async fn list_models(&self) -> PlatformResult<Value> {
        self.models
            .clone()
            .ok_or_else(|| PlatformError::unavailable(Service::Chat, "listing disabled"))
    }
}

/// Test fixture for integration tests.
struct TestFixture {
    client: Client,
    base_url: String,
    chat: Arc<ScriptedChat>,
    _temp_dir: TempDir,
}

struct FixtureOptions {
    psk: Option<String>,
    platform_user: Option<String>,
    models: Option<Value>,
}

impl Default for FixtureOptions {
    fn default() -> Self {
        Self {
            psk: Some("test-api-key".to_string()),
            platform_user: Some("tester".to_string()),
            models: None,
        }
    }
}

impl TestFixture {
    async fn new() -> Self {
        Self::with_options(FixtureOptions::default()).await
    }

    async fn with_options(options: FixtureOptions) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.sqlite");
        let index_path = temp_dir.path().join("index");
        let sites_path = temp_dir.path().join("sites");

        // Initialize database
        let pool = init_database(&db_path).await.expect("Failed to init DB");
        let repo = Arc::new(Repository::new(pool));

        // Initialize search index
        let search = Arc::new(SearchIndex::open(&index_path).expect("Failed to init search"));
        search::spawn_indexer(repo.clone(), search.clone());

        // Bind to random port first so hosted URLs point at this server
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get addr");
        let base_url = format!("http://{}", addr);

        let config = Config {
            api_psk: options.psk.clone(),
            db_path,
            index_path,
            sites_path,
            bind_addr: addr,
            public_url: base_url.clone(),
            log_level: "warn".to_string(),
            chat_api_url: "http://127.0.0.1:9".to_string(),
            chat_api_key: None,
            default_model: "gpt-4o-mini".to_string(),
            platform_user: options.platform_user,
            toast_ttl: Duration::from_secs(60),
        };

        let chat = Arc::new(ScriptedChat {
            reply: Mutex::new(COUNTER_HTML.to_string()),
            models: options.models,
        });

        let state = AppState::build(config, repo, search, chat.clone())
            .await
            .expect("Failed to build state");
        let app = create_router(state);

        // Spawn server
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Wait for server to start
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        let mut client_builder = Client::builder();
        if let Some(key) = options.psk {
            let mut headers = reqwest::header::HeaderMap::new();
            headers.insert("x-api-key", key.parse().unwrap());
            client_builder = client_builder.default_headers(headers);
        }

        TestFixture {
            client: client_builder.build().unwrap(),
            base_url,
            chat,
            _temp_dir: temp_dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get(&self, path: &str) -> (u16, Value) {
        let resp = self.client.get(self.url(path)).send().await.unwrap();
        (resp.status().as_u16(), resp.json().await.unwrap())
    }

    async fn post(&self, path: &str, body: Value) -> (u16, Value) {
        let resp = self
            .client
            .post(self.url(path))
            .json(&body)
            .send()
            .await
            .unwrap();
        (resp.status().as_u16(), resp.json().await.unwrap())
    }

    async fn put(&self, path: &str, body: Value) -> (u16, Value) {
        let resp = self
            .client
            .put(self.url(path))
            .json(&body)
            .send()
            .await
            .unwrap();
        (resp.status().as_u16(), resp.json().await.unwrap())
    }

    async fn delete(&self, path: &str) -> (u16, Value) {
        let resp = self.client.delete(self.url(path)).send().await.unwrap();
        (resp.status().as_u16(), resp.json().await.unwrap())
    }

    /// Create an app through the API and return its document.
    async fn create_app(&self, name: &str) -> Value {
        let (status, body) = self
            .post(
                "/api/apps",
                json!({ "prompt": format!("a {} app", name), "appName": name }),
            )
            .await;
        assert_eq!(status, 200, "create failed: {}", body);
        body["data"].clone()
    }

    async fn version_ids(&self, app_id: &str) -> Vec<(i64, String)> {
        let (_, body) = self
            .get(&format!("/api/apps/{}/versions?order=asc", app_id))
            .await;
        body["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| {
                (
                    v["version"].as_i64().unwrap(),
                    v["id"].as_str().unwrap().to_string(),
                )
            })
            .collect()
    }
}

#[tokio::test]
async fn test_health_check() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .get(fixture.url("/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn test_auth_missing_psk() {
    let fixture = TestFixture::new().await;

    // Request without API key
    let resp = Client::new()
        .get(fixture.url("/api/datastore"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_auth_invalid_psk() {
    let fixture = TestFixture::new().await;

    // Request with wrong API key
    let resp = Client::new()
        .get(fixture.url("/api/apps"))
        .header("x-api-key", "wrong-key")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    // Bearer token is accepted as well
    let resp = Client::new()
        .get(fixture.url("/api/apps"))
        .header("authorization", "Bearer test-api-key")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn test_datastore_get() {
    let fixture = TestFixture::new().await;

    let (status, body) = fixture.get("/api/datastore").await;

    assert_eq!(status, 200);
    assert_eq!(body["success"], true);
    assert!(body["data"]["schemaVersion"].is_number());
    assert!(body["data"]["revisionId"].is_number());
    assert!(body["data"]["apps"].as_array().unwrap().is_empty());
    assert!(body["revisionId"].is_number());
}

#[tokio::test]
async fn test_create_app_deploys_and_serves_site() {
    let fixture = TestFixture::new().await;
    fixture
        .chat
        .answer(&format!("Here you go:\n```html\n{}```", COUNTER_HTML));

    let app = fixture.create_app("Counter").await;
    assert_eq!(app["appName"], "Counter");
    assert_eq!(app["subdomain"], "counter");
    assert_eq!(app["appTitle"], "a Counter app");
    assert_eq!(app["version"], 1);
    assert_eq!(app["views"], 0);
    assert_eq!(app["favorite"], false);
    assert_eq!(app["code"], COUNTER_HTML.trim());

    let hosted_url = app["hostedUrl"].as_str().unwrap();
    assert_eq!(hosted_url, fixture.url("/sites/counter/"));

    // Hosted site is public
    let page = Client::new().get(hosted_url).send().await.unwrap();
    assert_eq!(page.status(), 200);
    assert!(page
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/html"));
    assert!(page.text().await.unwrap().starts_with("<!DOCTYPE html>"));

    let versions = fixture.version_ids(app["id"].as_str().unwrap()).await;
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0].0, 1);

    let (_, notifications) = fixture.get("/api/notifications").await;
    let toasts = notifications["data"]["toasts"].as_array().unwrap();
    assert_eq!(toasts[0]["message"], "App created and deployed successfully!");
    assert_eq!(toasts[0]["kind"], "success");
    assert_eq!(notifications["data"]["openUrls"][0], hosted_url);

    // Queued URLs are drained by the read
    let (_, again) = fixture.get("/api/notifications").await;
    assert!(again["data"]["openUrls"].as_array().unwrap().is_empty());

    let (_, generation) = fixture.get("/api/generation").await;
    assert_eq!(generation["data"]["generating"], false);
    assert_eq!(generation["data"]["stage"], "");
}

#[tokio::test]
async fn test_create_app_rejects_blank_prompt() {
    let fixture = TestFixture::new().await;

    let (status, body) = fixture.post("/api/apps", json!({ "prompt": "   " })).await;

    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_create_app_requires_session() {
    let fixture = TestFixture::with_options(FixtureOptions {
        platform_user: None,
        ..FixtureOptions::default()
    })
    .await;

    let (status, body) = fixture
        .post("/api/apps", json!({ "prompt": "a counter" }))
        .await;

    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
    let (_, apps) = fixture.get("/api/apps").await;
    assert!(apps["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_create_app_invalid_markup() {
    let fixture = TestFixture::new().await;
    fixture.chat.answer("<html><body>no doctype</body></html>");

    let (status, body) = fixture
        .post("/api/apps", json!({ "prompt": "a counter", "appName": "Counter" }))
        .await;

    assert_eq!(status, 422);
    assert_eq!(body["error"]["code"], "INVALID_MARKUP");
    assert!(!body["error"]["details"]["missing"]
        .as_array()
        .unwrap()
        .is_empty());

    let (_, apps) = fixture.get("/api/apps").await;
    assert!(apps["data"].as_array().unwrap().is_empty());

    // Nothing was hosted
    let page = Client::new()
        .get(fixture.url("/sites/counter/"))
        .send()
        .await
        .unwrap();
    assert_eq!(page.status(), 404);

    let (_, notifications) = fixture.get("/api/notifications").await;
    let message = notifications["data"]["toasts"][0]["message"]
        .as_str()
        .unwrap();
    assert!(message.starts_with("Error: "));
}

#[tokio::test]
async fn test_update_appends_version() {
    let fixture = TestFixture::new().await;
    let app = fixture.create_app("Counter").await;
    let id = app["id"].as_str().unwrap();

    let (status, body) = fixture
        .put(
            &format!("/api/apps/{}", id),
            json!({ "code": TIMER_HTML, "tags": ["timer"], "expectedRevision": app["revision"] }),
        )
        .await;

    assert_eq!(status, 200, "update failed: {}", body);
    assert_eq!(body["data"]["version"], 2);
    assert_eq!(body["data"]["code"], TIMER_HTML);
    assert_eq!(body["data"]["tags"], json!(["timer"]));
    assert_eq!(body["data"]["appName"], "Counter");
    assert!(body["data"]["updatedAt"].is_string());
    assert!(body["revisionId"].as_i64().unwrap() > 0);

    let page = Client::new()
        .get(fixture.url("/sites/counter/index.html"))
        .send()
        .await
        .unwrap();
    assert!(page.text().await.unwrap().contains("00:00"));

    let (_, versions) = fixture
        .get(&format!("/api/apps/{}/versions", id))
        .await;
    let versions = versions["data"].as_array().unwrap();
    assert_eq!(versions.len(), 2);
    assert_eq!(versions[0]["version"], 2);
    assert_eq!(versions[0]["note"], "Version 2");
    assert_eq!(versions[1]["note"], "Initial version");
}

#[tokio::test]
async fn test_update_stale_revision_conflicts() {
    let fixture = TestFixture::new().await;
    let app = fixture.create_app("Counter").await;
    let id = app["id"].as_str().unwrap();

    let (status, _) = fixture
        .post(&format!("/api/apps/{}/favorite", id), json!({}))
        .await;
    assert_eq!(status, 200);

    let (status, body) = fixture
        .put(
            &format!("/api/apps/{}", id),
            json!({ "code": TIMER_HTML, "expectedRevision": app["revision"] }),
        )
        .await;

    assert_eq!(status, 409);
    assert_eq!(body["error"]["code"], "VERSION_MISMATCH");
    assert_eq!(
        body["error"]["details"]["currentRevision"],
        app["revision"].as_i64().unwrap() + 1
    );
    assert_eq!(fixture.version_ids(id).await.len(), 1);
}

#[tokio::test]
async fn test_update_missing_app() {
    let fixture = TestFixture::new().await;

    let (status, body) = fixture
        .put("/api/apps/nope", json!({ "code": TIMER_HTML }))
        .await;

    assert_eq!(status, 404);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_diff_selection_and_restore() {
    let fixture = TestFixture::new().await;
    let app = fixture.create_app("Counter").await;
    let id = app["id"].as_str().unwrap();
    fixture
        .put(&format!("/api/apps/{}", id), json!({ "code": TIMER_HTML }))
        .await;

    let versions = fixture.version_ids(id).await;
    let (v1, v2) = (versions[0].1.clone(), versions[1].1.clone());
    let selection_url = format!("/api/apps/{}/diff-selection", id);

    // Diff needs two picks
    let (status, _) = fixture.get(&format!("/api/apps/{}/diff", id)).await;
    assert_eq!(status, 400);

    let (_, body) = fixture
        .post(&selection_url, json!({ "versionId": v2 }))
        .await;
    assert_eq!(body["data"]["state"], "one-selected");
    assert_eq!(body["data"]["outcome"], "filledOld");

    let (_, body) = fixture
        .post(&selection_url, json!({ "versionId": v1 }))
        .await;
    assert_eq!(body["data"]["state"], "two-selected");
    assert_eq!(body["data"]["inverted"], true);

    let (_, body) = fixture
        .post(&selection_url, json!({ "versionId": v1 }))
        .await;
    assert_eq!(body["data"]["outcome"], "rejected");

    let (status, diff) = fixture.get(&format!("/api/apps/{}/diff", id)).await;
    assert_eq!(status, 200);
    assert_eq!(diff["data"]["old"]["version"], 2);
    assert_eq!(diff["data"]["new"]["version"], 1);
    assert_eq!(diff["data"]["added"], 1);
    assert_eq!(diff["data"]["removed"], 2);
    assert!(diff["data"]["unified"]
        .as_str()
        .unwrap()
        .contains("+<button>+</button>\n"));

    let (_, body) = fixture.delete(&selection_url).await;
    assert_eq!(body["data"]["state"], "empty");

    // Restore appends a new version holding the old code
    let (status, restored) = fixture
        .post(
            &format!("/api/apps/{}/restore", id),
            json!({ "versionId": v1 }),
        )
        .await;
    assert_eq!(status, 200, "restore failed: {}", restored);
    assert_eq!(restored["data"]["version"], 3);
    assert_eq!(restored["data"]["code"], COUNTER_HTML.trim());

    let versions = fixture.version_ids(id).await;
    assert_eq!(versions.len(), 3);
    let (_, v3) = fixture
        .get(&format!("/api/versions/{}", versions[2].1))
        .await;
    assert_eq!(v3["data"]["note"], "Restored from version 1");

    let (status, diff) = fixture
        .get(&format!("/api/diff?old={}&new={}", v1, versions[2].1))
        .await;
    assert_eq!(status, 200);
    assert_eq!(diff["data"]["added"], 0);
    assert_eq!(diff["data"]["removed"], 0);
}

#[tokio::test]
async fn test_restore_rejects_foreign_version() {
    let fixture = TestFixture::new().await;
    let first = fixture.create_app("Counter").await;
    let second = fixture.create_app("Timer").await;
    let foreign = fixture.version_ids(first["id"].as_str().unwrap()).await;

    let (status, body) = fixture
        .post(
            &format!("/api/apps/{}/restore", second["id"].as_str().unwrap()),
            json!({ "versionId": foreign[0].1 }),
        )
        .await;

    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert_eq!(
        fixture
            .version_ids(second["id"].as_str().unwrap())
            .await
            .len(),
        1
    );
}

#[tokio::test]
async fn test_duplicate_app() {
    let fixture = TestFixture::new().await;
    let app = fixture.create_app("Counter").await;

    let (status, body) = fixture
        .post(
            &format!("/api/apps/{}/duplicate", app["id"].as_str().unwrap()),
            json!({}),
        )
        .await;

    assert_eq!(status, 200, "duplicate failed: {}", body);
    let copy = &body["data"];
    assert_ne!(copy["id"], app["id"]);
    assert_eq!(copy["appName"], "Counter-copy");
    assert_eq!(copy["subdomain"], "counter-copy");
    assert_eq!(copy["appTitle"], "a Counter app-copy");
    assert_eq!(copy["code"], app["code"]);
    assert_eq!(copy["version"], 1);

    let versions = fixture.version_ids(copy["id"].as_str().unwrap()).await;
    let (_, v1) = fixture
        .get(&format!("/api/versions/{}", versions[0].1))
        .await;
    assert_eq!(v1["data"]["note"], "Initial version (duplicate)");

    let page = Client::new()
        .get(fixture.url("/sites/counter-copy/"))
        .send()
        .await
        .unwrap();
    assert_eq!(page.status(), 200);
}

#[tokio::test]
async fn test_delete_app() {
    let fixture = TestFixture::new().await;
    let app = fixture.create_app("Counter").await;
    let id = app["id"].as_str().unwrap();

    let (status, body) = fixture.delete(&format!("/api/apps/{}", id)).await;
    assert_eq!(status, 200);
    assert_eq!(body["success"], true);

    let (status, _) = fixture.get(&format!("/api/apps/{}", id)).await;
    assert_eq!(status, 404);

    let (_, datastore) = fixture.get("/api/datastore").await;
    assert!(datastore["data"]["versions"].as_array().unwrap().is_empty());

    let page = Client::new()
        .get(fixture.url("/sites/counter/"))
        .send()
        .await
        .unwrap();
    assert_eq!(page.status(), 404);

    let (status, _) = fixture.delete(&format!("/api/apps/{}", id)).await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_delete_clears_diff_selection() {
    let fixture = TestFixture::new().await;
    let single = fixture.create_app("Counter").await;
    let bulk = fixture.create_app("Timer").await;

    for app in [&single, &bulk] {
        let id = app["id"].as_str().unwrap();
        let versions = fixture.version_ids(id).await;
        let (_, body) = fixture
            .post(
                &format!("/api/apps/{}/diff-selection", id),
                json!({ "versionId": versions[0].1 }),
            )
            .await;
        assert_eq!(body["data"]["state"], "one-selected");
    }

    let single_id = single["id"].as_str().unwrap();
    fixture.delete(&format!("/api/apps/{}", single_id)).await;
    fixture
        .post("/api/apps/bulk-delete", json!({ "ids": [bulk["id"]] }))
        .await;

    for id in [single_id, bulk["id"].as_str().unwrap()] {
        let (_, body) = fixture
            .get(&format!("/api/apps/{}/diff-selection", id))
            .await;
        assert_eq!(body["data"]["state"], "empty");
        assert!(body["data"]["old"].is_null());

        let (status, _) = fixture.get(&format!("/api/apps/{}/diff", id)).await;
        assert_eq!(status, 400);
    }
}

#[tokio::test]
async fn test_bulk_delete() {
    let fixture = TestFixture::new().await;
    let a = fixture.create_app("Alpha").await;
    let b = fixture.create_app("Beta").await;
    let c = fixture.create_app("Gamma").await;

    let (status, body) = fixture
        .post(
            "/api/apps/bulk-delete",
            json!({ "ids": [a["id"], b["id"], "unknown"] }),
        )
        .await;

    assert_eq!(status, 200);
    assert_eq!(body["data"]["requested"], 3);
    assert_eq!(body["data"]["deleted"], 2);

    let (_, apps) = fixture.get("/api/apps").await;
    let remaining = apps["data"].as_array().unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0]["id"], c["id"]);
}

#[tokio::test]
async fn test_list_apps_order() {
    let fixture = TestFixture::new().await;
    fixture.create_app("Alpha").await;
    fixture.create_app("Beta").await;

    let (_, newest_first) = fixture.get("/api/apps").await;
    assert_eq!(newest_first["data"][0]["appName"], "Beta");

    let (_, oldest_first) = fixture.get("/api/apps?order=asc").await;
    assert_eq!(oldest_first["data"][0]["appName"], "Alpha");

    let (status, _) = fixture.get("/api/apps?order=sideways").await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn test_favorite_views_and_launch() {
    let fixture = TestFixture::new().await;
    let app = fixture.create_app("Counter").await;
    let id = app["id"].as_str().unwrap();

    let (_, body) = fixture
        .post(&format!("/api/apps/{}/favorite", id), json!({}))
        .await;
    assert_eq!(body["data"]["favorite"], true);

    let (_, body) = fixture
        .post(&format!("/api/apps/{}/views", id), json!({}))
        .await;
    assert_eq!(body["data"]["views"], 1);

    let (status, body) = fixture
        .post(&format!("/api/apps/{}/launch", id), json!({}))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["method"], "registry");
    assert_eq!(body["data"]["app"]["views"], 2);
    assert_eq!(body["data"]["url"], app["hostedUrl"]);
}

#[tokio::test]
async fn test_search_apps() {
    let fixture = TestFixture::new().await;
    fixture.create_app("Pomodoro").await;
    fixture.create_app("Budget").await;

    let mut results = Vec::new();
    for _ in 0..50 {
        let (_, body) = fixture.get("/api/search?q=pomodoro").await;
        results = body["data"]["results"].as_array().unwrap().clone();
        if !results.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["app"]["appName"], "Pomodoro");
}

#[tokio::test]
async fn test_search_paging_and_tag_filter() {
    let fixture = TestFixture::new().await;
    for (name, tag) in [("Focus", "work"), ("Sprint", "work"), ("Kitchen", "home")] {
        let (status, _) = fixture
            .post(
                "/api/apps",
                json!({ "prompt": format!("a {} timer", name), "appName": name, "tags": [tag] }),
            )
            .await;
        assert_eq!(status, 200);
    }

    let mut total = 0;
    for _ in 0..50 {
        let (_, body) = fixture.get("/api/search?q=timer&limit=0").await;
        total = body["data"]["total"].as_u64().unwrap();
        if total == 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(total, 3);

    let (status, body) = fixture.get("/api/search?q=timer&limit=0").await;
    assert_eq!(status, 200);
    assert!(body["data"]["results"].as_array().unwrap().is_empty());

    let (status, body) = fixture
        .get(&format!("/api/search?q=timer&offset={}", usize::MAX))
        .await;
    assert_eq!(status, 200);
    assert!(body["data"]["results"].as_array().unwrap().is_empty());
    assert_eq!(body["data"]["offset"], 10_000);

    let (_, first) = fixture.get("/api/search?q=timer&tag=work&limit=1").await;
    let (_, second) = fixture
        .get("/api/search?q=timer&tag=work&limit=1&offset=1")
        .await;
    assert_eq!(first["data"]["total"], 2);
    assert_eq!(first["data"]["results"].as_array().unwrap().len(), 1);
    assert_eq!(second["data"]["results"].as_array().unwrap().len(), 1);
    assert_ne!(
        first["data"]["results"][0]["app"]["id"],
        second["data"]["results"][0]["app"]["id"]
    );
    assert_eq!(second["data"]["results"][0]["app"]["tags"], json!(["work"]));
}

#[tokio::test]
async fn test_models_fallback_and_filter() {
    let fixture = TestFixture::new().await;

    let (_, body) = fixture.get("/api/models").await;
    assert_eq!(body["data"]["fallback"], true);
    assert_eq!(body["data"]["defaultModel"], "gpt-4o-mini");
    assert_eq!(body["data"]["models"].as_array().unwrap().len(), 4);

    let listed = TestFixture::with_options(FixtureOptions {
        models: Some(json!({ "data": [{ "id": "gpt-4o" }, { "id": "claude-3-opus" }] })),
        ..FixtureOptions::default()
    })
    .await;
    let (_, body) = listed.get("/api/models?provider=Anthropic").await;
    assert_eq!(body["data"]["fallback"], false);
    assert_eq!(body["data"]["models"], json!([{ "id": "claude-3-opus", "provider": "Anthropic" }]));
    assert_eq!(
        body["data"]["providers"],
        json!(["All", "Anthropic", "OpenAI"])
    );
}

#[tokio::test]
async fn test_templates_and_create_from_template() {
    let fixture = TestFixture::new().await;

    let (_, body) = fixture.get("/api/templates?category=Games").await;
    let templates = body["data"]["templates"].as_array().unwrap();
    assert!(!templates.is_empty());
    assert!(templates.iter().all(|t| t["category"] == "Games"));
    assert_eq!(body["data"]["categories"][0], "All");

    let (status, body) = fixture
        .post("/api/apps", json!({ "prompt": "", "templateId": "snake", "appName": "Snake" }))
        .await;
    assert_eq!(status, 200, "create failed: {}", body);
    assert_eq!(body["data"]["appTitle"], "Snake");
    assert!(body["data"]["prompt"].as_str().unwrap().starts_with("A snake game"));

    let (status, body) = fixture
        .post("/api/apps", json!({ "prompt": "x", "templateId": "nope" }))
        .await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_iterate_app() {
    let fixture = TestFixture::new().await;
    let app = fixture.create_app("Counter").await;
    let id = app["id"].as_str().unwrap();
    fixture
        .chat
        .answer(&format!("Added a timer.\n```html\n{}\n```", TIMER_HTML));

    let (status, body) = fixture
        .post(
            &format!("/api/apps/{}/iterate", id),
            json!({
                "instruction": "add a timer",
                "history": [{ "role": "user", "content": "hi" }],
                "expectedRevision": app["revision"]
            }),
        )
        .await;

    assert_eq!(status, 200, "iterate failed: {}", body);
    assert_eq!(body["data"]["app"]["version"], 2);
    assert_eq!(body["data"]["app"]["code"], TIMER_HTML);
    assert_eq!(
        body["data"]["message"],
        json!({ "role": "assistant", "content": "Added a timer." })
    );
    let page = Client::new()
        .get(fixture.url("/sites/counter/index.html"))
        .send()
        .await
        .unwrap();
    assert!(page.text().await.unwrap().contains("00:00"));

    let (_, versions) = fixture.get(&format!("/api/apps/{}/versions", id)).await;
    assert_eq!(versions["data"][0]["note"], "AI: add a timer");

    // Stale revision and blank instruction are rejected
    let (status, _) = fixture
        .post(
            &format!("/api/apps/{}/iterate", id),
            json!({ "instruction": "again", "expectedRevision": app["revision"] }),
        )
        .await;
    assert_eq!(status, 409);
    let (status, body) = fixture
        .post(&format!("/api/apps/{}/iterate", id), json!({ "instruction": " " }))
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert_eq!(fixture.version_ids(id).await.len(), 2);
}

#[tokio::test]
async fn test_changes_long_poll() {
    let fixture = TestFixture::new().await;
    let (_, revision) = fixture.get("/api/datastore/revision").await;
    let since = revision["data"]["revisionId"].as_i64().unwrap();

    // Times out with the unchanged revision
    let (status, body) = fixture
        .get(&format!("/api/datastore/changes?since={}&timeout_ms=50", since))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["revisionId"], since);

    // Wakes up on a write
    let url = fixture.url(&format!(
        "/api/datastore/changes?since={}&timeout_ms=5000",
        since
    ));
    let client = fixture.client.clone();
    let waiter = tokio::spawn(async move { client.get(url).send().await.unwrap() });
    tokio::time::sleep(Duration::from_millis(50)).await;
    fixture.create_app("Counter").await;

    let body: Value = waiter.await.unwrap().json().await.unwrap();
    assert!(body["data"]["revisionId"].as_i64().unwrap() > since);
}

#[tokio::test]
async fn test_datastore_import() {
    let fixture = TestFixture::new().await;
    let export = json!({
        "schemaVersion": 1,
        "generatedAt": "2024-01-01T00:00:00.000Z",
        "revisionId": 9,
        "apps": [{
            "id": "old-id",
            "appName": "imported",
            "subdomain": "imported",
            "hostedUrl": "https://imported.example",
            "code": COUNTER_HTML,
            "prompt": "a counter",
            "model": "gpt-4o",
            "appTitle": "Imported",
            "version": 5,
            "dir": "app_1",
            "createdAt": "2024-01-01T00:00:00.000Z"
        }],
        "versions": [
            { "id": "x2", "appId": "old-id", "code": TIMER_HTML, "version": 5,
              "createdAt": "2024-01-02T00:00:00.000Z", "note": "Version 5" },
            { "id": "x1", "appId": "old-id", "code": COUNTER_HTML, "version": 2,
              "createdAt": "2024-01-01T00:00:00.000Z", "note": "Initial version" }
        ]
    });

    let (status, body) = fixture.post("/api/datastore/import", export).await;
    assert_eq!(status, 200, "import failed: {}", body);
    assert_eq!(body["data"]["apps"], 1);
    assert_eq!(body["data"]["versions"], 2);

    let (_, apps) = fixture.get("/api/apps").await;
    let app = &apps["data"][0];
    assert_ne!(app["id"], "old-id");
    assert_eq!(app["version"], 2);
    assert_eq!(app["subdomain"], "");
    assert_eq!(app["hostedUrl"], "");
    assert_eq!(app["dir"], "");

    let versions = fixture.version_ids(app["id"].as_str().unwrap()).await;
    let numbers: Vec<i64> = versions.iter().map(|(n, _)| *n).collect();
    assert_eq!(numbers, vec![1, 2]);

    // The first redeploy hosts it under its own subdomain
    let (status, body) = fixture
        .put(
            &format!("/api/apps/{}", app["id"].as_str().unwrap()),
            json!({ "code": COUNTER_HTML }),
        )
        .await;
    assert_eq!(status, 200, "redeploy failed: {}", body);
    assert_eq!(body["data"]["subdomain"], "imported");
    assert_eq!(body["data"]["version"], 3);
    let page = Client::new()
        .get(fixture.url("/sites/imported/"))
        .send()
        .await
        .unwrap();
    assert_eq!(page.status(), 200);

    let (status, body) = fixture
        .post(
            "/api/datastore/import",
            json!({ "schemaVersion": 99, "generatedAt": "", "revisionId": 0, "apps": [] }),
        )
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_dismiss_notification() {
    let fixture = TestFixture::new().await;
    fixture.create_app("Counter").await;

    let (_, body) = fixture.get("/api/notifications").await;
    let id = body["data"]["toasts"][0]["id"].as_str().unwrap().to_string();

    let (status, _) = fixture.delete(&format!("/api/notifications/{}", id)).await;
    assert_eq!(status, 200);
    let (status, _) = fixture.delete(&format!("/api/notifications/{}", id)).await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_watch_versions() {
    let fixture = TestFixture::new().await;
    let app = fixture.create_app("Counter").await;
    let id = app["id"].as_str().unwrap().to_string();

    let (_, body) = fixture
        .get(&format!("/api/apps/{}/versions/watch?since=0", id))
        .await;
    let since = body["data"]["revisionId"].as_i64().unwrap();
    assert_eq!(body["data"]["versions"].as_array().unwrap().len(), 1);

    let url = fixture.url(&format!(
        "/api/apps/{}/versions/watch?since={}&timeout_ms=5000",
        id, since
    ));
    let client = fixture.client.clone();
    let waiter = tokio::spawn(async move { client.get(url).send().await.unwrap() });
    tokio::time::sleep(Duration::from_millis(50)).await;
    fixture
        .put(&format!("/api/apps/{}", id), json!({ "code": TIMER_HTML }))
        .await;

    let body: Value = waiter.await.unwrap().json().await.unwrap();
    let versions = body["data"]["versions"].as_array().unwrap();
    assert_eq!(versions.len(), 2);
    assert_eq!(versions[0]["version"], 2);
}
