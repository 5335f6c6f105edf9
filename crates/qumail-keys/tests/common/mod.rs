//! In-process servers speaking the key manager, KEM authority and directory
//! contracts.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use serde_json::{json, Value};

pub async fn spawn(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Keys issued but not yet retrieved
#[derive(Clone, Default)]
pub struct IssuedKeys {
    pub keys: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl IssuedKeys {
    pub fn outstanding(&self) -> usize {
        self.keys.lock().unwrap().len()
    }
}

#[derive(Deserialize)]
struct LengthQuery {
    length: usize,
}

async fn issue_key(
    State(issued): State<IssuedKeys>,
    Query(query): Query<LengthQuery>,
) -> Json<Value> {
    let key_id = uuid::Uuid::new_v4().to_string();
    let key: Vec<u8> = (0..query.length).map(|_| rand::random::<u8>()).collect();
    let body = json!({ "key_id": key_id, "key_hex": hex::encode(&key) });
    issued.keys.lock().unwrap().insert(key_id, key);
    Json(body)
}

async fn consume_key(
    State(issued): State<IssuedKeys>,
    Path(key_id): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    let key = issued
        .keys
        .lock()
        .unwrap()
        .remove(&key_id)
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(json!({ "key_hex": hex::encode(key) })))
}

async fn generate_keys(Json(body): Json<Value>) -> Result<Json<Value>, StatusCode> {
    if body.get("user_id").and_then(Value::as_str).is_none() {
        return Err(StatusCode::UNPROCESSABLE_ENTITY);
    }
    let pair = qumail_crypto::pq::keygen();
    Ok(Json(json!({
        "public_key_b64": STANDARD.encode(&pair.public_key),
        "private_key_b64": STANDARD.encode(pair.private_key()),
    })))
}

async fn generate_keys_camel(Json(_): Json<Value>) -> Json<Value> {
    let pair = qumail_crypto::pq::keygen();
    Json(json!({
        "publicKey_b64": STANDARD.encode(&pair.public_key),
        "privateKey_b64": STANDARD.encode(pair.private_key()),
    }))
}

/// Key manager plus KEM authority on one base URL
pub async fn spawn_key_manager() -> (String, IssuedKeys) {
    let issued = IssuedKeys::default();
    let router = Router::new()
        .route("/symmetric-key", get(issue_key))
        .route("/symmetric-key/:key_id", get(consume_key))
        .route("/generate-keys", post(generate_keys))
        .with_state(issued.clone());
    (spawn(router).await, issued)
}

pub async fn spawn_camel_case_authority() -> String {
    spawn(Router::new().route("/generate-keys", post(generate_keys_camel))).await
}

/// Every route answers with the given status
pub async fn spawn_failing(status: StatusCode) -> String {
    let router = Router::new().fallback(move || async move { (status, "backend unavailable") });
    spawn(router).await
}

/// Every route answers with the given status and body
pub async fn spawn_failing_with(status: StatusCode, body: String) -> String {
    let router = Router::new().fallback(move || async move { (status, body) });
    spawn(router).await
}

/// Every route answers only after `delay`
pub async fn spawn_slow(delay: std::time::Duration) -> String {
    let router = Router::new().fallback(move || async move {
        tokio::time::sleep(delay).await;
        "{}"
    });
    spawn(router).await
}

/// Responds with a body that is not the expected JSON
pub async fn spawn_garbage() -> String {
    let router = Router::new().fallback(|| async { "<html>not json</html>" });
    spawn(router).await
}

/// Firebase-style tree: `/{collection}/{id}.json`, `null` when absent
#[derive(Clone, Default)]
pub struct Tree {
    pub entries: Arc<Mutex<HashMap<(String, String), Value>>>,
}

impl Tree {
    pub fn get(&self, collection: &str, leaf: &str) -> Option<Value> {
        self.entries
            .lock()
            .unwrap()
            .get(&(collection.to_string(), leaf.to_string()))
            .cloned()
    }
}

async fn tree_get(
    State(tree): State<Tree>,
    Path((collection, leaf)): Path<(String, String)>,
) -> Json<Value> {
    Json(tree.get(&collection, &leaf).unwrap_or(Value::Null))
}

async fn tree_put(
    State(tree): State<Tree>,
    Path((collection, leaf)): Path<(String, String)>,
    Json(value): Json<Value>,
) -> Json<Value> {
    tree.entries
        .lock()
        .unwrap()
        .insert((collection, leaf), value.clone());
    Json(value)
}

pub async fn spawn_directory() -> (String, Tree) {
    let tree = Tree::default();
    let router = Router::new()
        .route("/:collection/:leaf", get(tree_get).put(tree_put))
        .with_state(tree.clone());
    (spawn(router).await, tree)
}

/// A base URL on which nothing is listening
pub fn unreachable_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}
