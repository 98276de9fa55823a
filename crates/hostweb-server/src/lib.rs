//! HostWeb Server
//!
//! Serves packs over HTTP:
//!
//! - [`routes`]: request paths derived from the pack tree
//! - [`transform`]: rewrites `hwa.<name>(...)` calls in served scripts into
//!   `fetch` calls to the dispatch endpoint
//! - [`dispatch`]: the `POST /_hwapi/{func}` endpoint and its handler registry
//! - [`runtime`]: loads compiled API modules into an embedded JavaScript engine
//! - [`http_server`]: the axum router tying it together

pub mod dispatch;
pub mod http_server;
pub mod markdown;
pub mod routes;
pub mod runtime;
pub mod site;
pub mod transform;

pub use dispatch::{ApiLoader, RpcEntry, RpcHandler, RpcRegistry};
pub use http_server::{bind, HttpServer, RunningServer};
pub use routes::RouteTable;
pub use runtime::ScriptLoader;
pub use site::Site;
pub use transform::{transform_html, transform_script};
