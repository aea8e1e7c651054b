//! Local HTTP server that the client's integration tests talk to.
//!
//! Every route returns a predictable response so tests can check one
//! client behavior at a time: JSON and text bodies, echoes of what the client
//! sent (headers, query, form, multipart), arbitrary statuses, broken JSON,
//! slow responses, and a hit counter for proving a request never arrived.

use std::{collections::HashMap, sync::Arc, time::Duration};

use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{any, get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};

/// Longest delay `/slow/{millis}` will honor.
pub const MAX_DELAY_MILLIS: u64 = 10_000;

/// One part of a multipart upload, as seen by the server.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct UploadedPart {
    pub name: String,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub len: usize,
    /// The part's bytes as UTF-8 text, for parts without a file name.
    pub text: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct UploadSummary {
    pub boundary: Option<String>,
    pub parts: Vec<UploadedPart>,
}

#[derive(Debug, Deserialize)]
pub struct ValidateForm {
    pub json: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct HitCount {
    pub key: String,
    pub hits: u64,
}

pub type Hits = Arc<RwLock<HashMap<String, u64>>>;

pub fn app() -> Router {
    let hits: Hits = Arc::new(RwLock::new(HashMap::new()));
    Router::new()
        .route("/json", get(json_body))
        .route("/json-charset", get(json_with_charset))
        .route("/text", get(text_body))
        .route("/headers", get(echo_headers))
        .route("/query", get(echo_query))
        .route("/form", post(echo_form))
        .route("/upload", post(upload))
        .route("/validate", post(validate))
        .route("/status/{code}", any(status))
        .route("/malformed-json", get(malformed_json))
        .route("/slow/{millis}", any(slow))
        .route("/hit/{key}", any(hit))
        .route("/hits/{key}", get(hit_count))
        .with_state(hits)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "mock server listening");
    }
    axum::serve(listener, app()).await
}

async fn json_body() -> Json<Value> {
    Json(json!({ "message": "hello", "items": [1, 2, 3] }))
}

async fn json_with_charset() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/json; charset=utf-8")],
        r#"{"charset":"utf-8"}"#,
    )
}

async fn text_body() -> &'static str {
    "plain text"
}

async fn echo_headers(headers: HeaderMap) -> Json<HashMap<String, String>> {
    let echoed = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect();
    Json(echoed)
}

async fn echo_query(Query(params): Query<HashMap<String, String>>) -> Json<HashMap<String, String>> {
    Json(params)
}

async fn echo_form(Form(fields): Form<HashMap<String, String>>) -> Json<HashMap<String, String>> {
    Json(fields)
}

async fn upload(
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<UploadSummary>, (StatusCode, String)> {
    let boundary = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split("boundary=").nth(1))
        .map(str::to_string);
    let mut parts = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| (StatusCode::BAD_REQUEST, err.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        let filename = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|err| (StatusCode::BAD_REQUEST, err.to_string()))?;
        let text = match filename {
            Some(_) => None,
            None => Some(String::from_utf8_lossy(&data).into_owned()),
        };
        parts.push(UploadedPart {
            name,
            filename,
            content_type,
            len: data.len(),
            text,
        });
    }
    tracing::debug!(parts = parts.len(), "received upload");
    Ok(Json(UploadSummary { boundary, parts }))
}

async fn validate(Form(form): Form<ValidateForm>) -> Json<Value> {
    let valid = serde_json::from_str::<Value>(&form.json).is_ok();
    Json(json!({ "validate": valid }))
}

async fn status(Path(code): Path<u16>) -> Result<(StatusCode, String), StatusCode> {
    let status = StatusCode::from_u16(code).map_err(|_| StatusCode::BAD_REQUEST)?;
    Ok((status, format!("status {code}")))
}

async fn malformed_json() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/json")], "{not json")
}

async fn slow(Path(millis): Path<u64>) -> String {
    let millis = millis.min(MAX_DELAY_MILLIS);
    tokio::time::sleep(Duration::from_millis(millis)).await;
    format!("slept {millis}ms")
}

async fn hit(State(hits): State<Hits>, Path(key): Path<String>) -> Json<HitCount> {
    let mut counts = hits.write().await;
    let count = counts.entry(key.clone()).or_insert(0);
    *count += 1;
    Json(HitCount { key, hits: *count })
}

async fn hit_count(State(hits): State<Hits>, Path(key): Path<String>) -> Json<HitCount> {
    let hits = hits.read().await.get(&key).copied().unwrap_or(0);
    Json(HitCount { key, hits })
}
