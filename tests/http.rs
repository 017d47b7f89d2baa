//! HTTP front-end tests. The router is driven in-process with
//! `tower::ServiceExt::oneshot`, so no socket is bound.

mod support;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use base64::Engine;
use review_harness::server::router;
use serde_json::{json, Value};
use support::Harness;
use tower::ServiceExt;

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
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

async fn start_session(app: &Router) -> String {
    let (status, body) = call(app, "POST", "/sessions", None).await;
    assert_eq!(status, StatusCode::CREATED);
    body["session_id"].as_str().unwrap().to_string()
}

fn encode(s: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(s)
}

#[tokio::test]
async fn health_reports_version() {
    let h = Harness::new();
    let app = router(h.app.clone());
    let (status, body) = call(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn pages_lists_tabs() {
    let h = Harness::new();
    let app = router(h.app.clone());
    let (status, body) = call(&app, "GET", "/pages", None).await;
    assert_eq!(status, StatusCode::OK);
    let pages = body["pages"].as_array().unwrap();
    assert_eq!(pages.len(), 2);
    let analysis = pages.iter().find(|p| p["id"] == "code-analysis").unwrap();
    assert_eq!(analysis["tabs"][0]["kind"], "Code Analysis");
    assert_eq!(analysis["tabs"][0]["agent"], "Code Analyzer");
    assert_eq!(analysis["categories"]["code"], json!(["*.c", "*.h"]));
}

#[tokio::test]
async fn upload_ask_and_history() {
    let h = Harness::new();
    let app = router(h.app.clone());
    let session = start_session(&app).await;

    let (status, body) = call(
        &app,
        "POST",
        "/pages/code-analysis/upload",
        Some(json!({
            "session_id": session,
            "category": "code",
            "files": [{ "filename": "driver.c", "content": encode("void f(char *p) { strcpy(p, \"x\"); }") }]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stored"][0]["written"], true);
    assert_eq!(body["ingestion"][0]["status"], "success");

    let (status, body) = call(
        &app,
        "POST",
        "/pages/code-analysis/ask",
        Some(json!({
            "session_id": session,
            "tab": "Code Analysis",
            "query": "check for buffer overflow"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["record"]["kind"], "Code Analysis");
    assert_eq!(body["recorded"], true);

    let (status, body) = call(
        &app,
        "GET",
        &format!("/sessions/{}/history?page=code-analysis", session),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let history = body["history"].as_array().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["query"], "check for buffer overflow");

    let (status, _) = call(&app, "DELETE", &format!("/sessions/{}", session), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, body) = call(
        &app,
        "GET",
        &format!("/sessions/{}/history", session),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn ask_without_artifacts_is_precondition() {
    let h = Harness::new();
    let app = router(h.app.clone());
    let session = start_session(&app).await;

    let (status, body) = call(
        &app,
        "POST",
        "/pages/code-analysis/ask",
        Some(json!({
            "session_id": session,
            "tab": "Code Analysis",
            "query": "check for buffer overflow"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "precondition");
    assert_eq!(h.model.calls(), 0);
}

#[tokio::test]
async fn bad_inputs_are_rejected() {
    let h = Harness::new();
    let app = router(h.app.clone());

    let (status, body) = call(
        &app,
        "POST",
        "/pages/code-analysis/clear",
        Some(json!({ "session_id": "not-a-uuid" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");

    let session = start_session(&app).await;
    let (status, _) = call(
        &app,
        "POST",
        "/pages/code-analysis/upload",
        Some(json!({
            "session_id": session,
            "category": "code",
            "files": [{ "filename": "driver.c", "content": "***" }]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = call(&app, "GET", "/pages/missing/status", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn clear_bumps_uploader_generation() {
    let h = Harness::new();
    let app = router(h.app.clone());
    let session = start_session(&app).await;

    call(
        &app,
        "POST",
        "/pages/code-analysis/upload",
        Some(json!({
            "session_id": session,
            "category": "code",
            "files": [{ "filename": "driver.c", "content": encode("int x;") }]
        })),
    )
    .await;

    let (status, body) = call(
        &app,
        "POST",
        "/pages/code-analysis/clear",
        Some(json!({ "session_id": session })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["complete"], true);
    assert_eq!(body["uploader_generation"], 1);

    let (_, status_body) = call(&app, "GET", "/pages/code-analysis/status", None).await;
    assert_eq!(status_body["artifacts"]["code"], 0);
    assert_eq!(status_body["indexed_chunks"], 0);
}

#[tokio::test]
async fn generated_files_can_be_listed_and_deleted() {
    let h = Harness::new();
    let app = router(h.app.clone());
    let dir = h.root().join("generated_tests/stress");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("test_trim_20240101_000000.py"), "def test_trim(): pass\n").unwrap();

    let (status, body) = call(&app, "GET", "/pages/pynvme/generated", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["files"]["stress"][0]["path"],
        "stress/test_trim_20240101_000000.py"
    );

    let (status, _) = call(
        &app,
        "DELETE",
        "/pages/pynvme/generated?path=../config.toml",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = call(
        &app,
        "DELETE",
        "/pages/pynvme/generated?path=stress/test_trim_20240101_000000.py",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(!dir.join("test_trim_20240101_000000.py").exists());
}
