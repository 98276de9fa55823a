//! What `serve` puts behind the listener.

use hostweb_common::mime::{content_type, extension};
use hostweb_common::{Container, HostwebError, Result};
use std::path::Path;
use std::sync::Arc;

use crate::markdown;

/// A loaded serving target.
#[derive(Debug, Clone)]
pub enum Site {
    /// A `.hw` pack served as a routed site.
    Pack(Arc<Container>),
    /// A single document served at `/`.
    Document {
        content_type: &'static str,
        body: Arc<Vec<u8>>,
    },
}

impl Site {
    /// Loads `path` for serving.
    ///
    /// - raw: the file's bytes as `text/plain`, whatever the type
    /// - `.hw`: parsed as a pack (gzip detected by magic bytes)
    /// - `.md`: rendered into an HTML page
    /// - anything else: the bytes with the type from the extension table
    pub fn open(path: &Path, raw: bool) -> Result<Self> {
        if !path.is_file() {
            let shown = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
            return Err(HostwebError::NotFound(shown.display().to_string()));
        }
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if raw {
            tracing::info!("Using raw mode. Formatting disabled.");
            return Ok(Self::document("text/plain", bytes));
        }

        match extension(&name).as_deref() {
            Some("hw") => {
                let container = Container::from_bytes(&bytes)?;
                tracing::info!(
                    "Loaded pack with {} file(s){}",
                    container.tree.len(),
                    if container.use_api { ", API enabled" } else { "" }
                );
                Ok(Self::Pack(Arc::new(container)))
            }
            Some("md") => {
                tracing::info!("Converting markdown...");
                let text = String::from_utf8_lossy(&bytes);
                let page = markdown::render_document(&name, &text);
                Ok(Self::document("text/html; charset=utf-8", page.into_bytes()))
            }
            _ => Ok(Self::document(content_type(&name), bytes)),
        }
    }

    pub fn pack(container: Container) -> Self {
        Self::Pack(Arc::new(container))
    }

    pub fn document(content_type: &'static str, body: Vec<u8>) -> Self {
        Self::Document {
            content_type,
            body: Arc::new(body),
        }
    }

    pub fn container(&self) -> Option<&Container> {
        match self {
            Self::Pack(container) => Some(container),
            Self::Document { .. } => None,
        }
    }
}
