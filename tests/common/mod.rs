//! Purpose: In-process mock of the Qdrant REST endpoints qdtk uses.
//! Exports: `MockQdrant`, `MockQdrantBuilder`, `point`.
//! Role: Shared fixture for remote and CLI integration tests.
//! Invariants: Binds loopback only on an ephemeral port.
//! Invariants: Scroll cursors are point indexes; the client must echo them verbatim.
#![allow(dead_code)]

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use std::net::TcpListener;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub const SERVER_VERSION: &str = "1.9.2";

struct MockCollection {
    name: String,
    points: Vec<Value>,
    fail_scroll: bool,
}

struct MockState {
    collections: Vec<MockCollection>,
    api_key: Option<String>,
    scroll_delay: Option<Duration>,
    scroll_calls: AtomicUsize,
}

impl MockState {
    fn find(&self, name: &str) -> Option<&MockCollection> {
        self.collections.iter().find(|c| c.name == name)
    }

    fn authorize(&self, headers: &HeaderMap) -> Result<(), Response> {
        let Some(expected) = &self.api_key else {
            return Ok(());
        };
        let provided = headers.get("api-key").and_then(|v| v.to_str().ok());
        if provided == Some(expected.as_str()) {
            return Ok(());
        }
        Err(error_response(
            StatusCode::UNAUTHORIZED,
            "Must provide an API key or an Authorization bearer token",
        ))
    }
}

pub struct MockQdrantBuilder {
    collections: Vec<MockCollection>,
    api_key: Option<String>,
    scroll_delay: Option<Duration>,
}

impl MockQdrantBuilder {
    pub fn collection(mut self, name: &str, points: Vec<Value>) -> Self {
        self.collections.push(MockCollection {
            name: name.to_string(),
            points,
            fail_scroll: false,
        });
        self
    }

    /// Collection whose info succeeds but whose scroll always answers 500.
    pub fn broken_collection(mut self, name: &str, points: Vec<Value>) -> Self {
        self.collections.push(MockCollection {
            name: name.to_string(),
            points,
            fail_scroll: true,
        });
        self
    }

    pub fn api_key(mut self, key: &str) -> Self {
        self.api_key = Some(key.to_string());
        self
    }

    pub fn scroll_delay(mut self, delay: Duration) -> Self {
        self.scroll_delay = Some(delay);
        self
    }

    pub fn start(self) -> MockQdrant {
        let state = Arc::new(MockState {
            collections: self.collections,
            api_key: self.api_key,
            scroll_delay: self.scroll_delay,
            scroll_calls: AtomicUsize::new(0),
        });
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
        listener.set_nonblocking(true).expect("nonblocking");
        let addr = listener.local_addr().expect("local addr");

        let app = Router::new()
            .route("/collections", get(list_collections))
            .route("/collections/:name", get(collection_info))
            .route("/collections/:name/points/scroll", post(scroll))
            .route("/telemetry", get(telemetry))
            .with_state(Arc::clone(&state));

        std::thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_all()
                .build()
                .expect("runtime");
            runtime.block_on(async move {
                let listener =
                    tokio::net::TcpListener::from_std(listener).expect("tokio listener");
                axum::serve(listener, app).await.expect("serve");
            });
        });

        MockQdrant {
            base_url: format!("http://{addr}"),
            state,
        }
    }
}

pub struct MockQdrant {
    base_url: String,
    state: Arc<MockState>,
}

impl MockQdrant {
    pub fn builder() -> MockQdrantBuilder {
        MockQdrantBuilder {
            collections: Vec::new(),
            api_key: None,
            scroll_delay: None,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn scroll_calls(&self) -> usize {
        self.state.scroll_calls.load(Ordering::SeqCst)
    }
}

/// A point with integer id, a `name` payload, and a two-element vector.
pub fn point(id: u64, name: &str) -> Value {
    json!({
        "id": id,
        "payload": { "name": name, "meta": { "tags": [name, "sample"] } },
        "vector": [id as f64, 0.5],
    })
}

pub fn named_points(n: u64) -> Vec<Value> {
    (1..=n).map(|id| point(id, &format!("item-{id}"))).collect()
}

fn ok_response(result: Value) -> Response {
    Json(json!({ "result": result, "status": "ok", "time": 0.0001 })).into_response()
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(json!({ "status": { "error": message }, "time": 0.0 })),
    )
        .into_response()
}

fn not_found(name: &str) -> Response {
    error_response(
        StatusCode::NOT_FOUND,
        &format!("Not found: Collection `{name}` doesn't exist!"),
    )
}

async fn list_collections(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    if let Err(resp) = state.authorize(&headers) {
        return resp;
    }
    let names = state
        .collections
        .iter()
        .map(|c| json!({ "name": c.name }))
        .collect::<Vec<_>>();
    ok_response(json!({ "collections": names }))
}

async fn collection_info(
    State(state): State<Arc<MockState>>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Response {
    if let Err(resp) = state.authorize(&headers) {
        return resp;
    }
    let Some(collection) = state.find(&name) else {
        return not_found(&name);
    };
    let count = collection.points.len();
    ok_response(json!({
        "status": "green",
        "optimizer_status": "ok",
        "vectors_count": count,
        "indexed_vectors_count": 0,
        "points_count": count,
        "segments_count": 2,
        "config": {},
        "payload_schema": {},
    }))
}

async fn scroll(
    State(state): State<Arc<MockState>>,
    Path(name): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Err(resp) = state.authorize(&headers) {
        return resp;
    }
    state.scroll_calls.fetch_add(1, Ordering::SeqCst);
    if let Some(delay) = state.scroll_delay {
        tokio::time::sleep(delay).await;
    }
    let Some(collection) = state.find(&name) else {
        return not_found(&name);
    };
    if collection.fail_scroll {
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Service internal error: segment unavailable",
        );
    }

    let limit = body.get("limit").and_then(Value::as_u64).unwrap_or(10) as usize;
    let start = body.get("offset").and_then(Value::as_u64).unwrap_or(0) as usize;
    let with_payload = body
        .get("with_payload")
        .and_then(Value::as_bool)
        .unwrap_or(true);
    let with_vector = body
        .get("with_vector")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let end = (start + limit).min(collection.points.len());
    let points = collection.points[start.min(end)..end]
        .iter()
        .map(|point| {
            let mut point = point.clone();
            if let Value::Object(map) = &mut point {
                if !with_vector {
                    map.remove("vector");
                }
                if !with_payload {
                    map.insert("payload".to_string(), Value::Null);
                }
            }
            point
        })
        .collect::<Vec<_>>();
    let next = if end < collection.points.len() {
        json!(end)
    } else {
        Value::Null
    };
    ok_response(json!({ "points": points, "next_page_offset": next }))
}

async fn telemetry(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    if let Err(resp) = state.authorize(&headers) {
        return resp;
    }
    ok_response(json!({
        "id": "mock",
        "app": { "name": "qdrant", "version": SERVER_VERSION },
    }))
}
