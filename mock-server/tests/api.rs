use std::collections::HashMap;

use axum::http::{self, Request, StatusCode};
use http_body_util::BodyExt;
use mock_server::{app, HitCount, UploadSummary};
use serde_json::Value;
use tower::ServiceExt;

async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

fn get(uri: &str) -> Request<String> {
    Request::builder().uri(uri).body(String::new()).unwrap()
}

fn form_request(uri: &str, body: &str) -> Request<String> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            http::header::CONTENT_TYPE,
            "application/x-www-form-urlencoded",
        )
        .body(body.to_string())
        .unwrap()
}

fn content_type(response: &axum::response::Response) -> String {
    response
        .headers()
        .get(http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

// --- bodies ---

#[tokio::test]
async fn json_route_returns_json() {
    let resp = app().oneshot(get("/json")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(content_type(&resp), "application/json");
    let body: Value = body_json(resp).await;
    assert_eq!(body["message"], "hello");
}

#[tokio::test]
async fn json_charset_route_has_parameter() {
    let resp = app().oneshot(get("/json-charset")).await.unwrap();
    assert_eq!(content_type(&resp), "application/json; charset=utf-8");
}

#[tokio::test]
async fn text_route_returns_plain_text() {
    let resp = app().oneshot(get("/text")).await.unwrap();
    assert!(content_type(&resp).starts_with("text/plain"));
    assert_eq!(&body_bytes(resp).await[..], b"plain text");
}

#[tokio::test]
async fn malformed_json_claims_json() {
    let resp = app().oneshot(get("/malformed-json")).await.unwrap();
    assert_eq!(content_type(&resp), "application/json");
    let bytes = body_bytes(resp).await;
    assert!(serde_json::from_slice::<Value>(&bytes).is_err());
}

// --- echoes ---

#[tokio::test]
async fn headers_are_echoed() {
    let req = Request::builder()
        .uri("/headers")
        .header("X-Custom", "value")
        .body(String::new())
        .unwrap();
    let resp = app().oneshot(req).await.unwrap();
    let headers: HashMap<String, String> = body_json(resp).await;
    assert_eq!(headers.get("x-custom").map(String::as_str), Some("value"));
}

#[tokio::test]
async fn query_is_decoded_and_echoed() {
    let resp = app().oneshot(get("/query?a=b&name=a%20b")).await.unwrap();
    let query: HashMap<String, String> = body_json(resp).await;
    assert_eq!(query["a"], "b");
    assert_eq!(query["name"], "a b");
}

#[tokio::test]
async fn form_is_decoded_and_echoed() {
    let resp = app()
        .oneshot(form_request("/form", "x=%26&y=1"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let form: HashMap<String, String> = body_json(resp).await;
    assert_eq!(form["x"], "&");
    assert_eq!(form["y"], "1");
}

#[tokio::test]
async fn upload_summarizes_parts() {
    let boundary = "----WebKitFormBoundarytest";
    let body = format!(
        "--{boundary}\r\n\
         Content-Disposition: form-data; name=\"title\"\r\n\r\n\
         t\r\n\
         --{boundary}\r\n\
         Content-Disposition: form-data; name=\"file\"; filename=\"1.jpg\"\r\n\
         Content-Type: image/jpeg\r\n\r\n\
         0123456789\r\n\
         --{boundary}--\r\n"
    );
    let req = Request::builder()
        .method("POST")
        .uri("/upload")
        .header(
            http::header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(body)
        .unwrap();
    let resp = app().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let summary: UploadSummary = body_json(resp).await;
    assert_eq!(summary.boundary.as_deref(), Some(boundary));
    assert_eq!(summary.parts.len(), 2);
    assert_eq!(summary.parts[0].name, "title");
    assert_eq!(summary.parts[0].text.as_deref(), Some("t"));
    assert_eq!(summary.parts[1].filename.as_deref(), Some("1.jpg"));
    assert_eq!(summary.parts[1].content_type.as_deref(), Some("image/jpeg"));
    assert_eq!(summary.parts[1].len, 10);
}

#[tokio::test]
async fn upload_without_multipart_is_rejected() {
    let resp = app().oneshot(form_request("/upload", "a=b")).await.unwrap();
    assert!(resp.status().is_client_error());
}

#[tokio::test]
async fn validate_reports_json_validity() {
    let resp = app()
        .oneshot(form_request("/validate", "json=%7B%22a%22%3A1%7D"))
        .await
        .unwrap();
    let body: Value = body_json(resp).await;
    assert_eq!(body["validate"], true);

    let resp = app()
        .oneshot(form_request("/validate", "json=nope"))
        .await
        .unwrap();
    let body: Value = body_json(resp).await;
    assert_eq!(body["validate"], false);
}

// --- statuses ---

#[tokio::test]
async fn status_route_returns_requested_code() {
    for code in [201u16, 300, 404, 500] {
        let resp = app()
            .oneshot(get(&format!("/status/{code}")))
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), code);
    }
}

#[tokio::test]
async fn status_route_rejects_non_numeric() {
    let resp = app().oneshot(get("/status/abc")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn slow_route_eventually_answers() {
    let resp = app().oneshot(get("/slow/10")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(&body_bytes(resp).await[..], b"slept 10ms");
}

// --- hit counter ---

#[tokio::test]
async fn hits_are_counted_per_key() {
    let app = app();

    let resp = app.clone().oneshot(get("/hits/a")).await.unwrap();
    let count: HitCount = body_json(resp).await;
    assert_eq!(count.hits, 0);

    for expected in 1..=2 {
        let resp = app.clone().oneshot(get("/hit/a")).await.unwrap();
        let count: HitCount = body_json(resp).await;
        assert_eq!(count.hits, expected);
    }
    let resp = app
        .clone()
        .oneshot(form_request("/hit/b", ""))
        .await
        .unwrap();
    let count: HitCount = body_json(resp).await;
    assert_eq!(count.hits, 1);

    let resp = app.oneshot(get("/hits/a")).await.unwrap();
    let count: HitCount = body_json(resp).await;
    assert_eq!(count, HitCount { key: "a".to_string(), hits: 2 });
}
