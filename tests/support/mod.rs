#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, Response, StatusCode},
};
use http_body_util::BodyExt;
use osgoode_events::config::{ServerConfig, StoreKind};
use osgoode_events::store::{ConnectionProvider, EventStore, MemoryEventStore, MongoEventStore};
use osgoode_events::{AppState, PassphraseTable, build_router};
use serde_json::{Value, json};
use std::time::Duration;
use tower::ServiceExt;

pub const ALICE_PHRASE: &str = "correct horse battery staple";
pub const BOB_PHRASE: &str = "swordfish";

/// Router over an in-memory store with two registered actors.
pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryEventStore>,
    pub state: Arc<AppState>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_passphrases(&[(ALICE_PHRASE, "alice"), (BOB_PHRASE, "bob")])
    }

    pub fn with_passphrases(entries: &[(&str, &str)]) -> Self {
        let config = ServerConfig {
            store: StoreKind::Memory,
            ..ServerConfig::default()
        };
        Self::with_config(config, entries)
    }

    pub fn with_config(config: ServerConfig, entries: &[(&str, &str)]) -> Self {
        let store = Arc::new(MemoryEventStore::new());
        let table = PassphraseTable::from_entries(entries.iter().copied()).expect("passphrases");
        let state = Arc::new(AppState::new(
            Arc::new(config),
            store.clone(),
            Arc::new(table),
        ));
        Self {
            router: build_router(state.clone()),
            store,
            state,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }

    /// POST a JSON body and decode the JSON answer.
    pub async fn post(&self, path: &str, body: Value) -> Value {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request");
        let response = self.send(request).await;
        assert_eq!(response.status(), StatusCode::OK, "event routes answer 200");
        body_json(response).await
    }

    pub async fn post_raw(&self, path: &str, raw: &'static str) -> Value {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(raw))
            .expect("request");
        body_json(self.send(request).await).await
    }

    pub async fn get(&self, path: &str) -> Response<Body> {
        let request = Request::builder()
            .uri(path)
            .body(Body::empty())
            .expect("request");
        self.send(request).await
    }

    /// Create an event as alice and return its identifier.
    pub async fn create_as_alice(&self, event: Value) -> String {
        let before = self.all_ids().await;
        let answer = self
            .post("/events/admin/create", json!({ "phrase": ALICE_PHRASE, "event": event }))
            .await;
        assert_eq!(answer, json!({ "status": 1, "data": true }));
        self.all_ids()
            .await
            .into_iter()
            .find(|id| !before.contains(id))
            .expect("new event id")
    }

    pub async fn all_ids(&self) -> Vec<String> {
        let answer = self.post("/events/admin/list", json!({})).await;
        answer["data"]
            .as_array()
            .expect("list data")
            .iter()
            .map(|event| event["_id"].as_str().expect("hex id").to_string())
            .collect()
    }

    pub async fn fetch(&self, id: &str) -> Value {
        self.post("/events/admin/fetch", json!({ "id": id })).await["data"].clone()
    }

    pub async fn stored_count(&self) -> usize {
        self.store
            .list(osgoode_events::store::EventFilter::All)
            .await
            .expect("memory list")
            .len()
    }
}

/// Router over a MongoDB store nobody listens on. Every connection attempt
/// fails within the short connect timeout.
pub fn unreachable_store_app() -> (Router, Arc<MongoEventStore>) {
    let config = ServerConfig {
        connect_timeout_ms: 100,
        ..ServerConfig::default()
    };
    let connections = ConnectionProvider::new(
        "mongodb://127.0.0.1:1/?directConnection=true",
        config.database.clone(),
        config.connect_timeout(),
    );
    let store = Arc::new(MongoEventStore::new(connections, config.collection.clone()));
    let table = PassphraseTable::from_entries([(ALICE_PHRASE, "alice")]).expect("passphrases");
    let state = Arc::new(AppState::new(Arc::new(config), store.clone(), Arc::new(table)));
    (build_router(state), store)
}

/// POST a body with an explicit content type; returns the HTTP status and
/// the decoded JSON answer.
pub async fn post_with_type(
    router: &Router,
    path: &str,
    content_type: &str,
    body: impl Into<Body>,
) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", content_type)
        .body(body.into())
        .expect("request");
    let response = tokio::time::timeout(Duration::from_secs(10), router.clone().oneshot(request))
        .await
        .expect("request finished")
        .expect("router is infallible");
    let status = response.status();
    (status, body_json(response).await)
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("collect body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("json body")
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("collect body")
        .to_bytes();
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}
