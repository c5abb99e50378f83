use std::{path::PathBuf, sync::Arc};

use serde_json::{json, Value};
use tally_store::LogStore;
use tempfile::{tempdir, TempDir};
use tokio::net::TcpListener;

struct TestApp {
    base_url: String,
    data_dir: PathBuf,
    _dir: TempDir,
}

async fn spawn_app() -> TestApp {
    let dir = tempdir().expect("tempdir");
    let data_dir = dir.path().join("data");

    let store = Arc::new(LogStore::new(&data_dir));
    let router = tally_server::router(store, &[]);

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");

    tokio::spawn(async move {
        axum::serve(listener, router.into_make_service())
            .await
            .expect("serve");
    });

    TestApp {
        base_url: format!("http://{addr}"),
        data_dir,
        _dir: dir,
    }
}

async fn save(app: &TestApp, body: &str) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("{}/save", app.base_url))
        .body(body.to_string())
        .send()
        .await
        .expect("send save")
}

async fn fetch(app: &TestApp, path: &str) -> reqwest::Response {
    reqwest::get(format!("{}{path}", app.base_url))
        .await
        .expect("send get")
}

#[tokio::test]
async fn save_trial_then_read_results() {
    let app = spawn_app().await;

    let response = save(&app, r#"{"pid":"p1","trial":1,"rt":250}"#).await;
    assert_eq!(response.status(), 200);
    let ack: Value = response.json().await.expect("ack json");
    assert_eq!(ack, json!({ "ok": true }));

    let rows: Vec<Value> = fetch(&app, "/results").await.json().await.expect("rows");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["pid"], "p1");
    assert_eq!(rows[0]["trial"], 1);
    assert_eq!(rows[0]["rt"], 250);
    assert!(rows[0]["ts"].is_string());
}

#[tokio::test]
async fn save_feedback_normalizes_shape() {
    let app = spawn_app().await;

    let response = save(&app, r#"{"type":"feedback","pid":"p1","comment":"great"}"#).await;
    assert_eq!(response.status(), 200);

    let rows: Vec<Value> = fetch(&app, "/feedback").await.json().await.expect("rows");
    assert_eq!(rows.len(), 1);

    let body = rows[0].as_object().expect("object");
    assert_eq!(body.len(), 7);
    assert_eq!(body["type"], "feedback");
    assert_eq!(body["pid"], "p1");
    assert_eq!(body["nickname"], Value::Null);
    assert_eq!(body["conditions"], json!([]));
    assert_eq!(body["device_type"], Value::Null);
    assert_eq!(body["comment"], "great");
    assert!(body["ts"].is_string());

    // Feedback never lands in the results log.
    let results: Vec<Value> = fetch(&app, "/results").await.json().await.expect("rows");
    assert!(results.is_empty());
}

#[tokio::test]
async fn invalid_body_is_rejected_without_mutation() {
    let app = spawn_app().await;

    for body in ["not json", "\"a bare string\"", "[1,2,3]", ""] {
        let response = save(&app, body).await;
        assert_eq!(response.status(), 400, "body: {body:?}");
        let error: Value = response.json().await.expect("error json");
        assert_eq!(error, json!({ "ok": false, "error": "Invalid JSON" }));
    }

    // No write happened, so not even the data directory exists.
    assert!(!app.data_dir.exists());
}

#[tokio::test]
async fn fresh_logs_read_as_empty_arrays() {
    let app = spawn_app().await;

    let results: Vec<Value> = fetch(&app, "/results").await.json().await.expect("rows");
    assert!(results.is_empty());
    let feedback: Vec<Value> = fetch(&app, "/feedback").await.json().await.expect("rows");
    assert!(feedback.is_empty());
}

#[tokio::test]
async fn corrupted_line_is_silently_skipped() {
    let app = spawn_app().await;

    save(&app, r#"{"pid":"p1","trial":1}"#).await;
    save(&app, r#"{"pid":"p1","trial":2}"#).await;

    // Truncated line as a crashed writer would leave it.
    let log_path = app.data_dir.join("results.jsonl");
    let existing = std::fs::read_to_string(&log_path).expect("read log");
    std::fs::write(&log_path, format!("{existing}{{\"pid\":\"p1\",\"tri")).expect("write log");

    let rows: Vec<Value> = fetch(&app, "/results").await.json().await.expect("rows");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["trial"], 1);
    assert_eq!(rows[1]["trial"], 2);
}

#[tokio::test]
async fn writes_are_returned_in_arrival_order() {
    let app = spawn_app().await;

    for seq in 0..10 {
        let response = save(&app, &format!(r#"{{"pid":"p1","seq":{seq}}}"#)).await;
        assert_eq!(response.status(), 200);
    }

    let rows: Vec<Value> = fetch(&app, "/results").await.json().await.expect("rows");
    assert_eq!(rows.len(), 10);
    for (seq, row) in rows.iter().enumerate() {
        assert_eq!(row["seq"], seq);
    }
}

#[tokio::test]
async fn concurrent_saves_stay_line_atomic() {
    let app = spawn_app().await;
    let base_url = app.base_url.clone();

    let mut handles = Vec::new();
    for writer in 0..8 {
        let base_url = base_url.clone();
        handles.push(tokio::spawn(async move {
            let client = reqwest::Client::new();
            for seq in 0..10 {
                let body = json!({
                    "writer": writer,
                    "seq": seq,
                    "pad": "x".repeat(128),
                });
                let response = client
                    .post(format!("{base_url}/save"))
                    .body(body.to_string())
                    .send()
                    .await
                    .expect("send save");
                assert_eq!(response.status(), 200);
            }
        }));
    }
    for handle in handles {
        handle.await.expect("join");
    }

    // Every stored line must parse independently.
    let raw = std::fs::read_to_string(app.data_dir.join("results.jsonl")).expect("read log");
    let lines: Vec<Value> = raw
        .lines()
        .map(|line| serde_json::from_str(line).expect("line parses"))
        .collect();
    assert_eq!(lines.len(), 8 * 10);

    let rows: Vec<Value> = fetch(&app, "/results").await.json().await.expect("rows");
    assert_eq!(rows.len(), 8 * 10);
}

#[tokio::test]
async fn health_reports_ok() {
    let app = spawn_app().await;

    let response = fetch(&app, "/health").await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.expect("health json");
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
}
