//! Static extension tables.
//!
//! The same extension drives two decisions: the `Content-Type` a file is
//! served with, and how the packer stores it ([`FileKind`]).

use std::path::Path;

/// How the packer treats a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// Text that may be passed to the minifier.
    Minifiable,
    /// Raw bytes, stored base64-encoded.
    Binary,
    /// Text stored verbatim.
    Text,
}

const MINIFIABLE: &[&str] = &["html", "htm", "css", "js", "mjs", "json"];

const BINARY: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "webp", "ico", "bmp", "tif", "tiff", "avif", "woff", "woff2",
    "ttf", "otf", "eot", "mp3", "mp4", "webm", "ogg", "wav", "wasm", "pdf", "zip", "gz",
];

const SCRIPT: &[&str] = &["js", "mjs"];

/// Lowercased extension of `name`, without the dot.
pub fn extension(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
}

pub fn classify(name: &str) -> FileKind {
    match extension(name) {
        Some(ext) if MINIFIABLE.contains(&ext.as_str()) => FileKind::Minifiable,
        Some(ext) if BINARY.contains(&ext.as_str()) => FileKind::Binary,
        _ => FileKind::Text,
    }
}

/// Returns `true` for assets that receive the RPC transform.
pub fn is_script(name: &str) -> bool {
    extension(name).is_some_and(|ext| SCRIPT.contains(&ext.as_str()))
}

/// Content type for `name`, falling back to `text/plain`.
pub fn content_type(name: &str) -> &'static str {
    let Some(ext) = extension(name) else {
        return "text/plain";
    };
    match ext.as_str() {
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" | "mjs" => "application/javascript",
        "json" | "map" => "application/json",
        "md" => "text/markdown",
        "txt" => "text/plain",
        "xml" => "application/xml",
        "csv" => "text/csv",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "avif" => "image/avif",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "otf" => "font/otf",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "wasm" => "application/wasm",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        _ => "text/plain",
    }
}
