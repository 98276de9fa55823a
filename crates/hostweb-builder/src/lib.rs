//! HostWeb Builder
//!
//! Turns a project directory into a pack:
//!
//! ```text
//! my-site/
//! ├── .hostwebrc          project config (TOML)
//! └── src/
//!     ├── index.html      → tree["index.html"]
//!     ├── blog/index.html → tree["blog/index.html"]
//!     ├── _hwapi.js       → linted, bundled into apiModule (when useapi)
//!     └── .assets/        → assets[...]
//! ```
//!
//! Minification, linting and bundling are external capabilities reached
//! through the [`Minifier`], [`Linter`] and [`Bundler`] traits; the
//! [`Toolchain`] picks implementations from the project's `[config.tools]`.

pub mod config;
pub mod error;
pub mod packager;
pub mod scaffold;
pub mod tools;
pub mod tree;

pub use config::{HostwebRc, CONFIG_FILE};
pub use error::BuildError;
pub use packager::{build_project, find_api_entry, BuildOptions, Packager};
pub use scaffold::create_project;
pub use tools::{Bundler, LintMessage, LintReport, Linter, Minifier, ToolError, Toolchain};
pub use tree::build_tree;
