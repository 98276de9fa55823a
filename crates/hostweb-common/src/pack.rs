//! Pack (`.hw`) Format
//!
//! A pack is the serialized form of a site's source tree plus build metadata.
//! The same file is the build artifact and the live data source of the server.
//!
//! # Wire Format
//!
//! ```text
//! {
//!   "$filetype": "hostweb.pack",
//!   "useApi": false,
//!   "parseMarkdown": false,
//!   "apiModule": "",
//!   "#": { "index.html": { "content": "<h1>Hi</h1>" } },
//!   "assets": { "logo.png": { "content": "iVBORw0...", "encoding": "base64" } }
//! }
//! ```
//!
//! The document may be gzip-wrapped. [`Container::from_bytes`] looks at the
//! first two bytes: `0x1F 0x8B` means gzip, anything else is parsed as JSON
//! directly. Trees are ordered maps, so serialization is canonical.

use base64::{engine::general_purpose::STANDARD, Engine};
use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Component, Path};

use crate::error::{HostwebError, Result};

/// Literal format tag every pack carries under `$filetype`.
pub const FORMAT_TAG: &str = "hostweb.pack";

/// First two bytes of a gzip stream.
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Content encoding of a [`FileRecord`]. Absent means UTF-8 text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    Base64,
}

/// One entry of a [`FileTree`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<Encoding>,
}

impl FileRecord {
    /// Creates a plain UTF-8 text record.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            encoding: None,
        }
    }

    /// Creates a base64-encoded record from raw bytes.
    pub fn binary(bytes: &[u8]) -> Self {
        Self {
            content: STANDARD.encode(bytes),
            encoding: Some(Encoding::Base64),
        }
    }

    pub fn is_binary(&self) -> bool {
        self.encoding == Some(Encoding::Base64)
    }

    /// Returns the original bytes of the file, decoding base64 when needed.
    pub fn bytes(&self) -> Result<Cow<'_, [u8]>> {
        match self.encoding {
            Some(Encoding::Base64) => Ok(Cow::Owned(STANDARD.decode(&self.content)?)),
            None => Ok(Cow::Borrowed(self.content.as_bytes())),
        }
    }
}

/// Forward-slash-normalized relative path → file record.
pub type FileTree = BTreeMap<String, FileRecord>;

/// The pack document.
///
/// Invariants (checked by [`Container::validate`]):
/// - `format_tag` equals [`FORMAT_TAG`]
/// - `api_module` is non-empty if and only if `use_api` is set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    #[serde(rename = "$filetype")]
    pub format_tag: String,

    #[serde(rename = "useApi", default)]
    pub use_api: bool,

    #[serde(rename = "parseMarkdown", default)]
    pub parse_markdown: bool,

    #[serde(rename = "apiModule", default)]
    pub api_module: String,

    #[serde(rename = "#")]
    pub tree: FileTree,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assets: Option<FileTree>,
}

impl Container {
    /// Creates a pack around `tree` with no assets and no API module.
    pub fn new(tree: FileTree) -> Self {
        Self {
            format_tag: FORMAT_TAG.to_string(),
            use_api: false,
            parse_markdown: false,
            api_module: String::new(),
            tree,
            assets: None,
        }
    }

    pub fn with_assets(mut self, assets: FileTree) -> Self {
        self.assets = Some(assets);
        self
    }

    /// Attaches a compiled API module and turns RPC support on.
    pub fn with_api_module(mut self, module: impl Into<String>) -> Self {
        self.api_module = module.into();
        self.use_api = true;
        self
    }

    pub fn with_markdown(mut self, parse_markdown: bool) -> Self {
        self.parse_markdown = parse_markdown;
        self
    }

    /// Looks up a file in the `assets` slot.
    pub fn asset(&self, name: &str) -> Option<&FileRecord> {
        self.assets.as_ref().and_then(|assets| assets.get(name))
    }

    /// Checks the structural invariants of the pack.
    pub fn validate(&self) -> Result<()> {
        if self.format_tag != FORMAT_TAG {
            return Err(HostwebError::InvalidPack(format!(
                "unexpected format tag '{}', expected '{}'",
                self.format_tag, FORMAT_TAG
            )));
        }
        if self.use_api && self.api_module.is_empty() {
            return Err(HostwebError::InvalidPack(
                "useApi is set but apiModule is empty".into(),
            ));
        }
        if !self.use_api && !self.api_module.is_empty() {
            return Err(HostwebError::InvalidPack(
                "apiModule is present but useApi is not set".into(),
            ));
        }
        Ok(())
    }

    /// Parses a pack from raw file bytes, gunzipping first when the stream
    /// starts with the gzip magic bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if is_gzip(bytes) {
            tracing::debug!("Pack is gzip-wrapped, decompressing");
            let json = gunzip(bytes)?;
            Self::from_json(&json)
        } else {
            Self::from_json(bytes)
        }
    }

    /// Parses and validates an uncompressed pack document.
    pub fn from_json(json: &[u8]) -> Result<Self> {
        let container: Container = serde_json::from_slice(json)
            .map_err(|e| HostwebError::InvalidPack(format!("malformed pack JSON: {}", e)))?;
        container.validate()?;
        Ok(container)
    }

    /// Serializes the pack as canonical, 2-space indented JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Returns `true` if `bytes` starts with the gzip magic number.
pub fn is_gzip(bytes: &[u8]) -> bool {
    bytes.starts_with(&GZIP_MAGIC)
}

/// Decompresses a complete gzip stream held in memory.
pub fn gunzip(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(bytes);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| HostwebError::InvalidPack(format!("gzip decompression failed: {}", e)))?;
    Ok(out)
}

/// Normalizes a relative path into a tree key (`a/b/c.html`).
///
/// `.` components are dropped; separators are always forward slashes.
pub fn tree_key(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Normalizes a user-supplied exclude entry (`./a\\b/` → `a/b`).
pub fn normalize_key(raw: &str) -> String {
    raw.replace('\\', "/")
        .split('/')
        .filter(|part| !part.is_empty() && *part != ".")
        .collect::<Vec<_>>()
        .join("/")
}
