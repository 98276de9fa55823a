//! Embedded JavaScript runtime for API modules.

pub mod context;

mod conversions;

pub use context::{ScriptLoader, ACCESSOR_GLOBAL};
