use hostweb_common::mime::{classify, FileKind};
use hostweb_common::pack::{normalize_key, tree_key};
use hostweb_common::{FileRecord, FileTree};
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

use crate::error::BuildError;
use crate::tools::Minifier;

/// Walks `root` and encodes every regular file into a [`FileTree`].
///
/// Keys are paths relative to `root` with forward slashes. An `exclude`
/// entry names a relative file or directory; excluding a directory skips
/// everything beneath it. Walk order is sorted, so the same directory
/// always produces the same tree.
///
/// Binary types are stored base64-encoded. Minifiable text goes through
/// `minifier` when `minify` is set; a file the minifier rejects is left out
/// of the tree and the build continues.
pub fn build_tree(
    root: &Path,
    exclude: &[String],
    minify: bool,
    minifier: &dyn Minifier,
) -> Result<FileTree, BuildError> {
    let exclude: Vec<String> = exclude
        .iter()
        .map(|entry| normalize_key(entry))
        .filter(|entry| !entry.is_empty())
        .collect();

    let mut tree = FileTree::new();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0 || !is_excluded(&relative_key(root, entry.path()), &exclude)
        });

    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let key = relative_key(root, entry.path());
        tracing::debug!("Packing {}", key);
        if let Some(record) = encode_file(entry.path(), &key, minify, minifier)? {
            tree.insert(key, record);
        }
    }

    Ok(tree)
}

fn relative_key(root: &Path, path: &Path) -> String {
    tree_key(path.strip_prefix(root).unwrap_or(path))
}

fn is_excluded(key: &str, exclude: &[String]) -> bool {
    exclude.iter().any(|entry| {
        key == entry
            || key
                .strip_prefix(entry.as_str())
                .is_some_and(|rest| rest.starts_with('/'))
    })
}

fn encode_file(
    path: &Path,
    key: &str,
    minify: bool,
    minifier: &dyn Minifier,
) -> Result<Option<FileRecord>, BuildError> {
    let bytes = fs::read(path)?;
    let kind = classify(key);
    if kind == FileKind::Binary {
        return Ok(Some(FileRecord::binary(&bytes)));
    }

    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            tracing::debug!("{} is not UTF-8, storing as base64", key);
            return Ok(Some(FileRecord::binary(e.as_bytes())));
        }
    };

    if kind == FileKind::Minifiable && minify {
        return match minifier.minify(key, &text) {
            Ok(minified) => Ok(Some(FileRecord::text(minified))),
            Err(e) => {
                tracing::error!("Failed to minify {}: {}. Skipping file.", key, e);
                Ok(None)
            }
        };
    }

    Ok(Some(FileRecord::text(text)))
}
