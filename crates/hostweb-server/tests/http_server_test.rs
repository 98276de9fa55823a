//! HTTP Server Integration Tests
//!
//! Drives the axum router in-process with `tower::ServiceExt::oneshot`:
//! 1. Tree routes, root binding and directory indexes
//! 2. Assets (binary and text) with their content types
//! 3. The RPC transform on pages and script assets
//! 4. The dispatch endpoint backed by a real API module
//! 5. 404 handling and response headers
//! 6. A live listener on loopback

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use hostweb_common::{Container, FileRecord, FileTree, VERSION};
use hostweb_server::{bind, HttpServer, ScriptLoader, Site};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::io::Write;
use tower::ServiceExt;

const PNG: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

const API_MODULE: &str = r#"
var __hwapi = function () {
    return [
        { name: "add", handler: function (a, b) { return a + b; } },
        { name: "explode", handler: function () { throw new Error("kaboom"); } },
        { name: "cycle", handler: function () { var o = {}; o.self = o; return o; } }
    ];
};
"#;

fn site_tree() -> FileTree {
    let mut tree = FileTree::new();
    tree.insert(
        "index.html".into(),
        FileRecord::text("<h1>Home</h1><script>hwa.add(1, 2, function(r){ show(r); });</script>"),
    );
    tree.insert("blog/index.html".into(), FileRecord::text("<h1>Blog</h1>"));
    tree.insert("about.html".into(), FileRecord::text("<h1>About</h1>"));
    tree.insert("notes.md".into(), FileRecord::text("# Notes"));
    tree.insert("logo.png".into(), FileRecord::binary(&PNG));
    tree
}

fn assets() -> FileTree {
    let mut assets = FileTree::new();
    assets.insert("logo.png".into(), FileRecord::binary(&PNG));
    assets.insert("style.css".into(), FileRecord::text("body { color: red; }"));
    assets.insert("app.js".into(), FileRecord::text("hwa.add(4, 5);"));
    assets.insert("img/icon.svg".into(), FileRecord::text("<svg></svg>"));
    assets
}

fn static_app() -> Router {
    let pack = Container::new(site_tree()).with_assets(assets());
    HttpServer::new(Site::pack(pack), &ScriptLoader)
        .unwrap()
        .router()
}

fn api_app() -> Router {
    let pack = Container::new(site_tree())
        .with_assets(assets())
        .with_api_module(API_MODULE)
        .with_markdown(true);
    HttpServer::new(Site::pack(pack), &ScriptLoader)
        .unwrap()
        .router()
}

async fn get(app: &Router, uri: &str) -> (StatusCode, String, Vec<u8>) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .map(|v| v.to_str().unwrap().to_string())
        .unwrap_or_default();
    let body = response.into_body().collect().await.unwrap().to_bytes().to_vec();
    (status, content_type, body)
}

async fn post(app: &Router, uri: &str, body: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

// ============================================================================
// Test 1: Tree routes
// ============================================================================

#[tokio::test]
async fn test_tree_pages_are_served_verbatim() {
    let app = static_app();

    let (status, content_type, body) = get(&app, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert!(content_type.starts_with("text/html"));
    assert_eq!(body, site_tree()["index.html"].content.as_bytes());

    let (status, _, body) = get(&app, "/about.html").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"<h1>About</h1>");
}

#[tokio::test]
async fn test_directory_index_routes() {
    let app = static_app();

    let (status, _, body) = get(&app, "/blog").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"<h1>Blog</h1>");

    let (status, _, _) = get(&app, "/blog/").await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, _) = get(&app, "/blog/index.html").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_percent_encoded_paths() {
    let mut tree = FileTree::new();
    tree.insert("index.html".into(), FileRecord::text("home"));
    tree.insert("my page.html".into(), FileRecord::text("spaced"));
    tree.insert("über.html".into(), FileRecord::text("umlaut"));
    let app = HttpServer::new(Site::pack(Container::new(tree)), &ScriptLoader)
        .unwrap()
        .router();

    let (status, _, body) = get(&app, "/my%20page.html").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"spaced");

    let (status, _, body) = get(&app, "/%C3%BCber.html").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"umlaut");

    let (status, _, body) = get(&app, "/no%20such.html").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(String::from_utf8(body).unwrap().contains("/no such.html"));
}

#[tokio::test]
async fn test_binary_tree_entry_is_decoded() {
    let (status, content_type, body) = get(&static_app(), "/logo.png").await;
    assert_eq!(status, StatusCode::OK);
    assert!(content_type.starts_with("text/html"));
    assert_eq!(body, PNG);
}

#[tokio::test]
async fn test_missing_root_index() {
    let mut tree = FileTree::new();
    tree.insert("about.html".into(), FileRecord::text("about"));
    let app = HttpServer::new(Site::pack(Container::new(tree)), &ScriptLoader)
        .unwrap()
        .router();

    let (status, _, body) = get(&app, "/").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(String::from_utf8_lossy(&body).contains("index.html"));
}

// ============================================================================
// Test 2: Assets
// ============================================================================

#[tokio::test]
async fn test_binary_asset_bytes_and_mime() {
    let (status, content_type, body) = get(&static_app(), "/.assets/logo.png").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type, "image/png");
    assert_eq!(body, PNG);
}

#[tokio::test]
async fn test_text_and_nested_assets() {
    let app = static_app();

    let (status, content_type, body) = get(&app, "/.assets/style.css").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type, "text/css");
    assert_eq!(body, b"body { color: red; }");

    let (status, content_type, _) = get(&app, "/.assets/img/icon.svg").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type, "image/svg+xml");
}

#[tokio::test]
async fn test_missing_asset_names_the_file() {
    let (status, _, body) = get(&static_app(), "/.assets/nope.css").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(String::from_utf8_lossy(&body).contains("nope.css"));
}

// ============================================================================
// Test 3: RPC transform
// ============================================================================

#[tokio::test]
async fn test_transform_only_with_api() {
    let (_, _, plain) = get(&static_app(), "/").await;
    let plain = String::from_utf8(plain).unwrap();
    assert!(plain.contains("hwa.add(1, 2"));
    assert!(!plain.contains("/_hwapi/add"));

    let (_, _, rewritten) = get(&api_app(), "/").await;
    let rewritten = String::from_utf8(rewritten).unwrap();
    assert!(rewritten.starts_with("<h1>Home</h1><script>"));
    assert!(rewritten.contains("fetch(\"/_hwapi/add\""));
    assert!(rewritten.contains("JSON.stringify([1, 2])"));
    assert!(rewritten.contains("cb(d.result, null);"));
}

#[tokio::test]
async fn test_script_assets_are_transformed() {
    let (_, content_type, body) = get(&api_app(), "/.assets/app.js").await;
    assert_eq!(content_type, "application/javascript");
    let body = String::from_utf8(body).unwrap();
    assert!(body.contains("/_hwapi/add"));
    assert!(body.contains("JSON.stringify([4, 5])"));

    let (_, _, css) = get(&api_app(), "/.assets/style.css").await;
    assert_eq!(css, b"body { color: red; }");
}

#[tokio::test]
async fn test_markdown_entries_render_when_enabled() {
    let (_, _, raw) = get(&static_app(), "/notes.md").await;
    assert_eq!(raw, b"# Notes");

    let (status, content_type, page) = get(&api_app(), "/notes.md").await;
    assert_eq!(status, StatusCode::OK);
    assert!(content_type.starts_with("text/html"));
    assert!(String::from_utf8_lossy(&page).contains("<h1>Notes</h1>"));
}

// ============================================================================
// Test 4: Dispatch endpoint
// ============================================================================

#[tokio::test]
async fn test_dispatch_calls_module_function() {
    let (status, body) = post(&api_app(), "/_hwapi/add", "[1, 2]").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "error": null, "result": 3 }));
}

#[tokio::test]
async fn test_dispatch_unknown_function() {
    let app = api_app();
    let (status, body) = post(&app, "/_hwapi/doesNotExist", "[]").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({ "error": "Function not found", "result": "HWERR: Function not found" })
    );

    // The server keeps answering afterwards.
    let (status, _) = post(&app, "/_hwapi/add", "[2, 2]").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_dispatch_exception_and_bad_body() {
    let app = api_app();

    let (status, body) = post(&app, "/_hwapi/explode", "[]").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("kaboom"));

    let (status, body) = post(&app, "/_hwapi/cycle", "[]").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("cyclic"));

    let (status, body) = post(&app, "/_hwapi/add", "{\"a\": 1}").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "Invalid arguments", "result": null }));
}

#[tokio::test]
async fn test_dispatch_not_mounted_without_api() {
    let (status, body) = post(&static_app(), "/_hwapi/add", "[1, 2]").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, Value::Null);
}

// ============================================================================
// Test 5: 404 page and headers
// ============================================================================

#[tokio::test]
async fn test_not_found_page() {
    let (status, content_type, body) = get(&static_app(), "/missing/page").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(content_type.starts_with("text/html"));
    let body = String::from_utf8(body).unwrap();
    assert!(body.contains("/missing/page"));
    assert!(body.contains(VERSION));
}

#[tokio::test]
async fn test_powered_by_header_on_every_response() {
    let app = static_app();
    for uri in ["/", "/.assets/logo.png", "/missing", "/_hostweb/hostweb.css"] {
        let response = app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(
            response.headers().get("x-powered-by").unwrap(),
            "HostWeb",
            "missing header on {}",
            uri
        );
    }
}

#[tokio::test]
async fn test_document_site() {
    let app = HttpServer::new(Site::document("text/plain", b"just text".to_vec()), &ScriptLoader)
        .unwrap()
        .router();

    let (status, content_type, body) = get(&app, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type, "text/plain");
    assert_eq!(body, b"just text");

    let (status, _, _) = get(&app, "/.assets/logo.png").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_gzip_pack_from_disk() {
    use flate2::write::GzEncoder;
    use flate2::Compression;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("site.hw");
    let json = Container::new(site_tree()).to_json().unwrap();
    let mut encoder = GzEncoder::new(std::fs::File::create(&path).unwrap(), Compression::default());
    encoder.write_all(json.as_bytes()).unwrap();
    encoder.finish().unwrap();

    let app = HttpServer::new(Site::open(&path, false).unwrap(), &ScriptLoader)
        .unwrap()
        .router();
    let (status, _, body) = get(&app, "/blog").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"<h1>Blog</h1>");
}

// ============================================================================
// Test 6: Live listener
// ============================================================================

#[tokio::test]
async fn test_live_server_and_close() {
    let pack = Container::new(site_tree()).with_api_module(API_MODULE);
    let server = HttpServer::new(Site::pack(pack), &ScriptLoader).unwrap();
    let listener = bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
    let running = server.spawn(listener).unwrap();
    let base = format!("http://{}", running.local_addr());

    let client = reqwest::Client::new();
    let page = client.get(&base).send().await.unwrap();
    assert_eq!(page.status(), 200);
    assert_eq!(page.headers()["x-powered-by"], "HostWeb");

    let result: Value = client
        .post(format!("{}/_hwapi/add", base))
        .json(&json!([20, 22]))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(result["result"], json!(42));

    let addr = running.local_addr();
    running.close().await;
    // The port is free again right away.
    let rebound = bind(addr).await.unwrap();
    drop(rebound);
}
