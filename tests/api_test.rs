//! REST API integration tests.
//!
//! Runs the full router on a random port with the fake Pandoc from
//! [`common`].

mod common;

use base64::Engine;
use common::{bearer, test_config, TestHarness, FAKE_VERSION};
use serde_json::{json, Value};

async fn post_text(addr: std::net::SocketAddr, body: Value) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("http://{addr}/api/v1/convert/text"))
        .header("Authorization", bearer())
        .json(&body)
        .send()
        .await
        .expect("request failed")
}

// ---------------------------------------------------------------------------
// Info
// ---------------------------------------------------------------------------

#[tokio::test]
async fn service_info_lists_endpoints() {
    let (_harness, addr) = TestHarness::with_server().await;
    let resp = reqwest::get(format!("http://{addr}/")).await.unwrap();
    assert_eq!(resp.status(), 200);

    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["name"], "pandoc-bridge");
    assert_eq!(json["version"], "1.0.0");
    assert_eq!(json["endpoints"]["convert_stream"], "/api/v1/convert/stream");
}

#[tokio::test]
async fn health_reports_pandoc_version() {
    let (_harness, addr) = TestHarness::with_server().await;
    let resp = reqwest::get(format!("http://{addr}/health")).await.unwrap();
    assert_eq!(resp.status(), 200);

    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["pandoc_version"], FAKE_VERSION);
    assert_eq!(json["in_flight"], 0);
    assert_eq!(json["max_concurrent_processes"], 4);
    assert!(json["timestamp"].as_str().unwrap().contains('T'));
}

#[tokio::test]
async fn formats_are_public() {
    let (_harness, addr) = TestHarness::with_server().await;
    let resp = reqwest::get(format!("http://{addr}/api/v1/formats")).await.unwrap();
    assert_eq!(resp.status(), 200);

    let json: Value = resp.json().await.unwrap();
    let input = json["input"].as_array().unwrap();
    let output = json["output"].as_array().unwrap();
    assert!(input.iter().any(|f| f == "markdown"));
    assert!(output.iter().any(|f| f == "pdf"));
    assert!(!input.iter().any(|f| f == "pdf"));
}

#[tokio::test]
async fn trace_id_is_echoed() {
    let (_harness, addr) = TestHarness::with_server().await;
    let resp = reqwest::Client::new()
        .get(format!("http://{addr}/health"))
        .header("X-Trace-ID", "abcd1234")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.headers()["x-trace-id"], "abcd1234");
    assert!(resp.headers().contains_key("x-response-time"));
}

// ---------------------------------------------------------------------------
// Text conversion
// ---------------------------------------------------------------------------

#[tokio::test]
async fn convert_text_markdown_to_html() {
    let (_harness, addr) = TestHarness::with_server().await;
    let resp = post_text(
        addr,
        json!({"content": "# Hello", "from_format": "markdown", "to_format": "html"}),
    )
    .await;
    assert_eq!(resp.status(), 200);

    let json: Value = resp.json().await.unwrap();
    let content = json["content"].as_str().unwrap();
    assert!(content.starts_with("markdown->html"));
    assert!(content.contains("# Hello"));
    assert_eq!(json["content_type"], "text/html");
    assert_eq!(json["is_binary"], false);
}

#[tokio::test]
async fn convert_text_binary_output_is_base64() {
    let (_harness, addr) = TestHarness::with_server().await;
    let resp = post_text(
        addr,
        json!({"content": "# Doc", "from_format": "markdown", "to_format": "docx"}),
    )
    .await;
    assert_eq!(resp.status(), 200);

    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["is_binary"], true);
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(json["content"].as_str().unwrap())
        .unwrap();
    assert!(String::from_utf8_lossy(&decoded).starts_with("markdown->docx"));
}

#[tokio::test]
async fn convert_text_options_reach_pandoc() {
    let (_harness, addr) = TestHarness::with_server().await;
    let resp = post_text(
        addr,
        json!({
            "content": "ARGS",
            "from_format": "markdown",
            "to_format": "html",
            "options": {"table_of_contents": true, "wrap": "none", "columns": 72}
        }),
    )
    .await;
    assert_eq!(resp.status(), 200);

    let json: Value = resp.json().await.unwrap();
    let content = json["content"].as_str().unwrap();
    assert!(content.contains("--toc"));
    assert!(content.contains("--wrap none"));
    assert!(content.contains("--columns 72"));
    assert!(content.contains("--standalone"));
}

#[tokio::test]
async fn source_format_sniffed_when_omitted() {
    let (_harness, addr) = TestHarness::with_server().await;
    let resp = post_text(
        addr,
        json!({"content": "<!DOCTYPE html><html><body>x</body></html>", "to_format": "markdown"}),
    )
    .await;
    assert_eq!(resp.status(), 200);
    let json: Value = resp.json().await.unwrap();
    assert!(json["content"].as_str().unwrap().starts_with("html->markdown"));
}

#[tokio::test]
async fn undetectable_source_is_format_not_supported() {
    let (harness, addr) = TestHarness::with_server().await;
    let resp = post_text(addr, json!({"content": "plain words", "to_format": "html"})).await;
    assert_eq!(resp.status(), 400);

    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["error"]["code"], "FORMAT_NOT_SUPPORTED");
    assert_eq!(json["error"]["details"]["format"], "unknown");
    assert_eq!(harness.ctx.converter.admission().spawned_total(), 0);
}

#[tokio::test]
async fn unsupported_target_rejected_without_spawning() {
    let (harness, addr) = TestHarness::with_server().await;
    let resp = post_text(
        addr,
        json!({"content": "x", "from_format": "markdown", "to_format": "invalid_fmt"}),
    )
    .await;
    assert_eq!(resp.status(), 400);

    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["error"]["code"], "FORMAT_NOT_SUPPORTED");
    assert_eq!(
        json["error"]["message"],
        "Format 'invalid_fmt' is not supported as output"
    );
    assert!(json["error"]["request_id"].is_string());
    assert_eq!(harness.ctx.converter.admission().spawned_total(), 0);
}

#[tokio::test]
async fn pandoc_failure_is_422_with_stderr_excerpt() {
    let (_harness, addr) = TestHarness::with_server().await;
    let resp = post_text(
        addr,
        json!({"content": "FAIL", "from_format": "markdown", "to_format": "html"}),
    )
    .await;
    assert_eq!(resp.status(), 422);

    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["error"]["code"], "CONVERSION_FAILED");
    assert!(json["error"]["details"]["pandoc_error"]
        .as_str()
        .unwrap()
        .contains("simulated failure"));
}

#[tokio::test]
async fn slow_conversion_times_out_with_504() {
    let mut config = test_config();
    config.conversion.timeout_secs = 1;
    let (harness, addr) = TestHarness::with_server_config(config).await;

    let resp = post_text(
        addr,
        json!({"content": "SLEEP", "from_format": "markdown", "to_format": "html"}),
    )
    .await;
    assert_eq!(resp.status(), 504);

    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["error"]["code"], "TIMEOUT");
    assert_eq!(json["error"]["details"]["timeout_seconds"], 1);
    assert_eq!(harness.ctx.converter.admission().in_flight(), 0);
}

#[tokio::test]
async fn invalid_options_are_validation_errors() {
    let (_harness, addr) = TestHarness::with_server().await;
    let resp = post_text(
        addr,
        json!({
            "content": "# x",
            "from_format": "markdown",
            "to_format": "pdf",
            "options": {"pdf_engine": "rm -rf"}
        }),
    )
    .await;
    assert_eq!(resp.status(), 400);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn oversized_text_is_413() {
    let mut config = test_config();
    config.conversion.max_file_size_mb = 1;
    let (_harness, addr) = TestHarness::with_server_config(config).await;

    let content = "a".repeat(1024 * 1024 + 10);
    let resp = post_text(
        addr,
        json!({"content": content, "from_format": "markdown", "to_format": "html"}),
    )
    .await;
    assert_eq!(resp.status(), 413);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["error"]["code"], "FILE_TOO_LARGE");
    assert_eq!(json["error"]["details"]["max_size"], 1024 * 1024);
}

// ---------------------------------------------------------------------------
// File conversion
// ---------------------------------------------------------------------------

fn upload(filename: &str, bytes: Vec<u8>, to_format: &str) -> reqwest::multipart::Form {
    let part = reqwest::multipart::Part::bytes(bytes).file_name(filename.to_string());
    reqwest::multipart::Form::new()
        .part("file", part)
        .text("to_format", to_format.to_string())
}

async fn post_file(addr: std::net::SocketAddr, form: reqwest::multipart::Form) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("http://{addr}/api/v1/convert/file"))
        .header("Authorization", bearer())
        .multipart(form)
        .send()
        .await
        .expect("request failed")
}

#[tokio::test]
async fn convert_file_returns_download() {
    let (_harness, addr) = TestHarness::with_server().await;
    let resp = post_file(addr, upload("report.md", b"# Report".to_vec(), "html")).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers()["content-disposition"],
        "attachment; filename=\"report.html\""
    );
    assert_eq!(resp.headers()["content-type"], "text/html");

    let body = resp.text().await.unwrap();
    assert!(body.starts_with("markdown->html"));
    assert!(body.contains("# Report"));
}

#[tokio::test]
async fn convert_file_explicit_source_overrides_extension() {
    let (_harness, addr) = TestHarness::with_server().await;
    let form = upload("notes.txt", b"= Title".to_vec(), "html").text("from_format", "rst");
    let resp = post_file(addr, form).await;
    assert_eq!(resp.status(), 200);
    assert!(resp.text().await.unwrap().starts_with("rst->html"));
}

#[tokio::test]
async fn convert_file_unknown_extension() {
    let (_harness, addr) = TestHarness::with_server().await;
    let resp = post_file(addr, upload("data.xyz", b"stuff".to_vec(), "html")).await;
    assert_eq!(resp.status(), 400);

    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["error"]["code"], "FORMAT_NOT_SUPPORTED");
    assert_eq!(json["error"]["details"]["format"], ".xyz");
    assert_eq!(json["error"]["details"]["format_type"], "input (file extension)");
}

#[tokio::test]
async fn convert_file_missing_target() {
    let (_harness, addr) = TestHarness::with_server().await;
    let part = reqwest::multipart::Part::bytes(b"# x".to_vec()).file_name("a.md");
    let form = reqwest::multipart::Form::new().part("file", part);
    let resp = post_file(addr, form).await;
    assert_eq!(resp.status(), 400);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn convert_file_too_large() {
    let mut config = test_config();
    config.conversion.max_file_size_mb = 1;
    let (harness, addr) = TestHarness::with_server_config(config).await;

    let resp = post_file(addr, upload("big.md", vec![b'a'; 1536 * 1024], "html")).await;
    assert_eq!(resp.status(), 413);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["error"]["code"], "FILE_TOO_LARGE");
    assert_eq!(json["error"]["details"]["file_size"], 1536 * 1024);
    assert_eq!(harness.ctx.converter.admission().spawned_total(), 0);
}

// ---------------------------------------------------------------------------
// OpenAPI
// ---------------------------------------------------------------------------

#[tokio::test]
async fn openapi_document_is_public() {
    let (_harness, addr) = TestHarness::with_server().await;
    let resp = reqwest::get(format!("http://{addr}/openapi.json")).await.unwrap();
    assert_eq!(resp.status(), 200);

    let json: Value = resp.json().await.unwrap();
    assert!(json["openapi"].as_str().unwrap().starts_with("3."));
    assert!(json["paths"]["/api/v1/convert/batch"]["post"].is_object());
}
