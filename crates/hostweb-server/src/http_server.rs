//! HTTP Server for HostWeb
//!
//! Serves a [`Site`] with axum.
//!
//! # Routes
//!
//! - `GET /` and every path derived from the pack tree ([`RouteTable`])
//! - `GET /.assets/{*file}`: the pack's `assets` slot
//! - `POST /_hwapi/{func}`: API dispatch, mounted only when the pack has an
//!   API module
//! - `GET /_hostweb/{*path}`: stylesheet for generated pages
//! - anything else: a 404 page naming the requested address
//!
//! Every response carries `X-Powered-By: HostWeb`.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderName, HeaderValue, StatusCode, Uri},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use hostweb_common::mime::{content_type, extension, is_script};
use hostweb_common::{Container, HostwebError, Result, VERSION};
use percent_encoding::percent_decode_str;
use std::borrow::Cow;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::dispatch::{dispatch, ApiLoader, RpcRegistry};
use crate::markdown;
use crate::routes::RouteTable;
use crate::site::Site;
use crate::transform::{transform_html, transform_script};

const HTML: &str = "text/html; charset=utf-8";
const STYLESHEET: &str = include_str!("../assets/hostweb.css");
const NOT_FOUND_PAGE: &str = include_str!("../assets/not_found.html");

/// Immutable per-generation serving state.
struct AppState {
    site: Site,
    routes: RouteTable,
    registry: Option<RpcRegistry>,
}

impl AppState {
    fn pack(&self) -> Option<&Container> {
        self.site.container()
    }

    fn use_api(&self) -> bool {
        self.pack().is_some_and(|pack| pack.use_api)
    }
}

type SharedState = Arc<AppState>;

/// HTTP server for one loaded site.
pub struct HttpServer {
    state: SharedState,
}

impl HttpServer {
    /// Prepares `site` for serving. When the pack carries an API module it is
    /// loaded once, here, through `loader`.
    ///
    /// # Errors
    /// Whatever `loader` reports for the API module, typically
    /// `HostwebError::InvalidModule`.
    pub fn new(site: Site, loader: &dyn ApiLoader) -> Result<Self> {
        let (routes, registry) = match site.container() {
            Some(pack) => {
                let routes = RouteTable::materialize(&pack.tree);
                tracing::debug!("Materialized {} route(s)", routes.len());
                let registry = if pack.use_api {
                    Some(loader.load(&pack.api_module)?)
                } else {
                    None
                };
                (routes, registry)
            }
            None => (RouteTable::default(), None),
        };

        Ok(Self {
            state: Arc::new(AppState {
                site,
                routes,
                registry,
            }),
        })
    }

    /// Paths served from the pack tree.
    pub fn routes(&self) -> &RouteTable {
        &self.state.routes
    }

    pub fn router(&self) -> Router {
        let mut app = Router::new().route("/_hostweb/{*path}", get(serve_internal));

        match &self.state.site {
            Site::Pack(_) => {
                app = app.route("/.assets/{*file}", get(serve_asset));
                if self.state.use_api() {
                    app = app.route("/_hwapi/{func}", post(dispatch_call));
                }
                app = app.fallback(serve_page);
            }
            Site::Document { .. } => {
                app = app.route("/", get(serve_document)).fallback(not_found);
            }
        }

        app.layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("x-powered-by"),
            HeaderValue::from_static("HostWeb"),
        ))
        .with_state(self.state.clone())
    }

    /// Starts serving on an already bound listener.
    pub fn spawn(&self, listener: TcpListener) -> Result<RunningServer> {
        let addr = listener.local_addr()?;
        let app = self.router();
        let task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("Error serving connections: {}", e);
            }
        });
        tracing::info!("HostWeb listening on {}", addr);
        Ok(RunningServer { addr, task })
    }

    /// Binds `addr` and serves until the task is dropped.
    pub async fn run(&self, addr: SocketAddr) -> Result<()> {
        let listener = bind(addr).await?;
        tracing::info!("HostWeb listening on {}", addr);
        axum::serve(listener, self.router())
            .await
            .map_err(|e| HostwebError::Transport(format!("Server error: {}", e)))
    }
}

/// Binds a listener on `addr`.
///
/// # Errors
/// - `HostwebError::PortInUse` - Another process holds the address
/// - `HostwebError::Transport` - Any other bind failure
pub async fn bind(addr: SocketAddr) -> Result<TcpListener> {
    TcpListener::bind(addr).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::AddrInUse {
            HostwebError::PortInUse(addr)
        } else {
            HostwebError::Transport(format!("Failed to bind to {}: {}", addr, e))
        }
    })
}

/// Handle to a spawned server.
pub struct RunningServer {
    addr: SocketAddr,
    task: JoinHandle<()>,
}

impl RunningServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Closes the listener right away. In-flight requests are not drained.
    pub async fn close(self) {
        self.task.abort();
        let _ = self.task.await;
        tracing::info!("Closed listener on {}", self.addr);
    }
}

async fn serve_page(State(state): State<SharedState>, uri: Uri) -> Response {
    let path = decode_path(uri.path());
    let path = path.as_ref();
    let Some(pack) = state.pack() else {
        return not_found_page(path);
    };

    match state.routes.resolve(path) {
        Some(key) => serve_tree_entry(&state, pack, key),
        None if path == "/" => (
            StatusCode::NOT_FOUND,
            "index.html not found in .hw file".to_string(),
        )
            .into_response(),
        None => not_found_page(path),
    }
}

/// Percent-decodes a request path. Paths that do not decode to UTF-8 are
/// looked up as sent.
fn decode_path(raw: &str) -> Cow<'_, str> {
    percent_decode_str(raw)
        .decode_utf8()
        .unwrap_or(Cow::Borrowed(raw))
}

fn serve_tree_entry(state: &AppState, pack: &Container, key: &str) -> Response {
    let Some(record) = pack.tree.get(key) else {
        return (
            StatusCode::NOT_FOUND,
            format!("{} not found in .hw file", key),
        )
            .into_response();
    };

    if record.is_binary() {
        return match record.bytes() {
            Ok(bytes) => ([(header::CONTENT_TYPE, HTML)], bytes.into_owned()).into_response(),
            Err(e) => internal_error(key, e),
        };
    }

    let body = if pack.parse_markdown && extension(key).as_deref() == Some("md") {
        markdown::render_document(key, &record.content)
    } else if state.use_api() {
        transform_html(&record.content).unwrap_or_else(|e| {
            tracing::warn!("Serving {} without the RPC transform: {}", key, e);
            record.content.clone()
        })
    } else {
        record.content.clone()
    };

    ([(header::CONTENT_TYPE, HTML)], body).into_response()
}

async fn serve_asset(State(state): State<SharedState>, Path(file): Path<String>) -> Response {
    let Some(pack) = state.pack() else {
        return not_found_page(&format!("/.assets/{}", file));
    };
    let Some(record) = pack.asset(&file) else {
        return (
            StatusCode::NOT_FOUND,
            format!("Asset not found: {}", file),
        )
            .into_response();
    };

    let mime = content_type(&file);
    if record.is_binary() {
        return match record.bytes() {
            Ok(bytes) => ([(header::CONTENT_TYPE, mime)], bytes.into_owned()).into_response(),
            Err(e) => internal_error(&file, e),
        };
    }

    let body = if state.use_api() && is_script(&file) {
        transform_script(&record.content)
    } else {
        record.content.clone()
    };
    ([(header::CONTENT_TYPE, mime)], body).into_response()
}

async fn serve_document(State(state): State<SharedState>) -> Response {
    match &state.site {
        Site::Document { content_type, body } => {
            ([(header::CONTENT_TYPE, *content_type)], body.as_ref().clone()).into_response()
        }
        Site::Pack(_) => not_found_page("/"),
    }
}

async fn dispatch_call(
    State(state): State<SharedState>,
    Path(func): Path<String>,
    body: Bytes,
) -> impl IntoResponse {
    let empty = RpcRegistry::default();
    let registry = state.registry.as_ref().unwrap_or(&empty);
    let (status, response) = dispatch(registry, &func, &body).await;
    (status, Json(response))
}

async fn serve_internal(Path(path): Path<String>) -> Response {
    match path.as_str() {
        "hostweb.css" => ([(header::CONTENT_TYPE, "text/css")], STYLESHEET).into_response(),
        _ => not_found_page(&format!("/_hostweb/{}", path)),
    }
}

async fn not_found(uri: Uri) -> Response {
    not_found_page(uri.path())
}

fn not_found_page(address: &str) -> Response {
    let page = NOT_FOUND_PAGE
        .replace("{{address}}", &markdown::escape_html(address))
        .replace("{{version}}", VERSION);
    (StatusCode::NOT_FOUND, Html(page)).into_response()
}

fn internal_error(name: &str, e: HostwebError) -> Response {
    tracing::error!("Failed to decode {}: {}", name, e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("Failed to decode {}", name),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::ScriptLoader;
    use hostweb_common::{FileRecord, FileTree};

    #[test]
    fn test_routes_only_for_packs() {
        let mut tree = FileTree::new();
        tree.insert("index.html".into(), FileRecord::text("home"));
        tree.insert("blog/index.html".into(), FileRecord::text("blog"));
        let server = HttpServer::new(Site::pack(Container::new(tree)), &ScriptLoader).unwrap();
        assert_eq!(server.routes().paths().collect::<Vec<_>>(), vec!["/", "/blog"]);

        let doc = HttpServer::new(Site::document("text/plain", b"x".to_vec()), &ScriptLoader)
            .unwrap();
        assert!(doc.routes().is_empty());
    }

    #[test]
    fn test_broken_api_module_fails_startup() {
        let pack = Container::new(FileTree::new()).with_api_module("var nothing = 1;");
        assert!(matches!(
            HttpServer::new(Site::pack(pack), &ScriptLoader),
            Err(HostwebError::InvalidModule(_))
        ));
    }

    #[test]
    fn test_decode_path() {
        assert_eq!(decode_path("/my%20page.html"), "/my page.html");
        assert_eq!(decode_path("/%C3%BCber.html"), "/über.html");
        assert_eq!(decode_path("/plain/path"), "/plain/path");
        assert_eq!(decode_path("/bad%FF.html"), "/bad%FF.html");
    }

    #[tokio::test]
    async fn test_bind_reports_port_in_use() {
        let first = bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = first.local_addr().unwrap();
        assert!(matches!(bind(addr).await, Err(HostwebError::PortInUse(a)) if a == addr));
    }
}
