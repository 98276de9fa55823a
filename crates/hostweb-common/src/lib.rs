//! HostWeb Common Types
//!
//! This crate provides the pack (`.hw`) format and the small pieces of
//! infrastructure shared by the builder, the server and the CLI.
//!
//! # Overview
//!
//! A pack is a single JSON document holding every file of a site's `src/`
//! directory plus build metadata:
//!
//! - **Pack format**: [`Container`], [`FileTree`], [`FileRecord`]
//! - **Wire format**: canonical JSON, optionally gzip-wrapped. Gzip is detected
//!   by the magic bytes `0x1F 0x8B`, never by file extension.
//! - **Content types**: the static extension table used for serving and the
//!   file classification used for packing ([`mime`])
//! - **Process context**: listening address, temporary files and the shutdown
//!   hook ([`HostContext`])
//!
//! # Example
//!
//! ```
//! use hostweb_common::{Container, FileRecord, FileTree};
//!
//! let mut tree = FileTree::new();
//! tree.insert("index.html".into(), FileRecord::text("<h1>Hello</h1>"));
//!
//! let pack = Container::new(tree);
//! let json = pack.to_json().unwrap();
//! let loaded = Container::from_bytes(json.as_bytes()).unwrap();
//! assert_eq!(loaded, pack);
//! ```

pub mod context;
pub mod error;
pub mod mime;
pub mod pack;

pub use context::{HostContext, DEFAULT_PORT};
pub use error::{HostwebError, Result};
pub use pack::{Container, Encoding, FileRecord, FileTree, FORMAT_TAG};

/// Version string reported by generated pages and `--version`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
