//! Route materialization.
//!
//! Maps request paths to keys of a pack's main tree:
//!
//! | tree key               | route          |
//! |------------------------|----------------|
//! | `index.html`           | `/`            |
//! | `blog/index.html`      | `/blog`        |
//! | `docs/intro.html`      | `/docs/intro.html` |

use hostweb_common::FileTree;
use std::collections::BTreeMap;

/// Request path → tree key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteTable {
    routes: BTreeMap<String, String>,
}

impl RouteTable {
    /// Builds the routes for `tree`.
    ///
    /// `/` is bound to the root index file when there is one. Every other key
    /// derives its path with [`route_for_key`]; when two keys derive the same
    /// path the first key in tree order keeps it.
    ///
    /// # Arguments
    /// * `tree` - The pack tree; keys are relative paths such as
    ///   `blog/index.html`
    ///
    /// # Returns
    /// A table mapping `/`, `/blog` and `/about.html` style paths to keys.
    /// Request paths are matched with [`RouteTable::resolve`].
    pub fn materialize(tree: &FileTree) -> Self {
        let mut routes = BTreeMap::new();

        if let Some(index) = tree.keys().find(|key| is_root_index(key)) {
            routes.insert("/".to_string(), index.clone());
        }

        for key in tree.keys() {
            let path = route_for_key(key);
            if path == "/" {
                continue;
            }
            if let Some(existing) = routes.get(&path) {
                tracing::warn!(
                    "Route {} is already served by {}, ignoring {}",
                    path,
                    existing,
                    key
                );
                continue;
            }
            routes.insert(path, key.clone());
        }

        Self { routes }
    }

    /// Looks up the tree key for a request path. A trailing slash on a
    /// non-root path is ignored.
    pub fn resolve(&self, path: &str) -> Option<&str> {
        let trimmed = path.trim_end_matches('/');
        let path = if trimmed.is_empty() { "/" } else { trimmed };
        self.routes.get(path).map(String::as_str)
    }

    pub fn has_root(&self) -> bool {
        self.routes.contains_key("/")
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

fn is_root_index(key: &str) -> bool {
    key.eq_ignore_ascii_case("index.html") || key.eq_ignore_ascii_case("index.htm")
}

/// Derives the request path for one tree key.
pub fn route_for_key(key: &str) -> String {
    if is_root_index(key) {
        return "/".to_string();
    }
    for suffix in ["/index.html", "/index.htm"] {
        if let Some(dir) = key.strip_suffix(suffix) {
            return format!("/{}", dir);
        }
    }
    format!("/{}", key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostweb_common::FileRecord;

    fn tree(keys: &[&str]) -> FileTree {
        keys.iter()
            .map(|key| (key.to_string(), FileRecord::text(format!("<p>{}</p>", key))))
            .collect()
    }

    #[test]
    fn test_route_for_key() {
        assert_eq!(route_for_key("index.html"), "/");
        assert_eq!(route_for_key("INDEX.HTM"), "/");
        assert_eq!(route_for_key("blog/index.html"), "/blog");
        assert_eq!(route_for_key("a/b/index.htm"), "/a/b");
        assert_eq!(route_for_key("about.html"), "/about.html");
        assert_eq!(route_for_key("docs/intro.md"), "/docs/intro.md");
    }

    #[test]
    fn test_root_index_has_single_root() {
        let table = RouteTable::materialize(&tree(&["index.html"]));
        assert_eq!(table.len(), 1);
        assert_eq!(table.resolve("/"), Some("index.html"));
    }

    #[test]
    fn test_directory_index_has_no_file_route() {
        let table = RouteTable::materialize(&tree(&["index.html", "blog/index.html"]));
        assert_eq!(table.resolve("/blog"), Some("blog/index.html"));
        assert_eq!(table.resolve("/blog/"), Some("blog/index.html"));
        assert_eq!(table.resolve("/blog/index.html"), None);
        assert_eq!(table.paths().collect::<Vec<_>>(), vec!["/", "/blog"]);
    }

    #[test]
    fn test_root_binding_is_case_insensitive() {
        let table = RouteTable::materialize(&tree(&["Index.HTML", "about.html"]));
        assert_eq!(table.resolve("/"), Some("Index.HTML"));
        assert_eq!(table.resolve("/about.html"), Some("about.html"));
    }

    #[test]
    fn test_missing_index_leaves_root_unbound() {
        let table = RouteTable::materialize(&tree(&["about.html"]));
        assert!(!table.has_root());
        assert_eq!(table.resolve("/"), None);
    }

    #[test]
    fn test_first_key_wins_on_collision() {
        let table = RouteTable::materialize(&tree(&["docs/index.htm", "docs/index.html"]));
        assert_eq!(table.resolve("/docs"), Some("docs/index.htm"));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_materialize_is_deterministic() {
        let keys = ["index.html", "b/index.html", "a.html", "c/d/index.htm", "z.css"];
        let first = RouteTable::materialize(&tree(&keys));
        for _ in 0..5 {
            assert_eq!(RouteTable::materialize(&tree(&keys)), first);
        }
    }
}
