//! # HostWeb CLI
//!
//! Command-line front end for HostWeb.
//!
//! - `hostweb serve [file]`: serve a pack, a markdown page or any single file.
//!   Without a file, the project in the current directory is built and its
//!   pack served.
//! - `hostweb build`: pack the current project into `dist/<name>.hw`
//! - `hostweb create <name>`: scaffold a new project
//!
//! The serving loop, including watch mode, lives in [`controller`]. The
//! file watcher and the loop's state machine live in [`watch`].

pub mod controller;
pub mod watch;

pub use controller::{LifecycleEvent, Target, WatchController, DEFAULT_OUTPUT, RESTART_DELAY};
pub use watch::{Armed, NotifyWatch, Phase, Watch, WatchSession};
