//! Pack assembly and output.

use flate2::write::GzEncoder;
use flate2::Compression;
use hostweb_common::{Container, HostContext};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::config::HostwebRc;
use crate::error::BuildError;
use crate::tools::Toolchain;
use crate::tree::build_tree;

/// Stem of the server-side API entry file inside `src/`.
pub const API_ENTRY_STEM: &str = "_hwapi";

/// Extensions tried, in order, when looking for the API entry file.
pub const API_ENTRY_EXTENSIONS: &[&str] = &["js", "mjs", "cjs", "ts"];

/// Directory under `src/` packed into the `assets` slot.
pub const ASSETS_DIR: &str = ".assets";

/// Everything a single build needs to know.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub project_dir: PathBuf,
    pub exclude: Vec<String>,
    pub gzip: bool,
    pub minify: bool,
    pub use_api: bool,
    pub parse_markdown: bool,
}

impl BuildOptions {
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
            exclude: Vec::new(),
            gzip: false,
            minify: false,
            use_api: false,
            parse_markdown: false,
        }
    }

    pub fn from_config(project_dir: impl Into<PathBuf>, rc: &HostwebRc) -> Self {
        let build = &rc.config.build;
        Self {
            project_dir: project_dir.into(),
            exclude: rc.config.ignore.clone(),
            gzip: build.usegzip,
            minify: build.minify,
            use_api: build.useapi,
            parse_markdown: build.parsemarkdown,
        }
    }

    pub fn source_dir(&self) -> PathBuf {
        self.project_dir.join("src")
    }
}

/// Builds packs with a fixed [`Toolchain`].
pub struct Packager {
    toolchain: Toolchain,
}

impl Packager {
    pub fn new(toolchain: Toolchain) -> Self {
        Self { toolchain }
    }

    /// Assembles the pack for a project without writing anything.
    ///
    /// With the API enabled the entry file is linted and bundled first, so a
    /// lint failure aborts before the tree is even walked.
    pub fn assemble(&self, options: &BuildOptions) -> Result<Container, BuildError> {
        let src = options.source_dir();
        if !src.is_dir() {
            return Err(BuildError::MissingSource(src));
        }

        let mut exclude = options.exclude.clone();
        exclude.push(ASSETS_DIR.to_string());

        let api_module = if options.use_api {
            let entry =
                find_api_entry(&src).ok_or_else(|| BuildError::MissingApiEntry(src.clone()))?;
            let module = self.compile_api(&entry)?;
            if let Some(name) = entry.file_name() {
                exclude.push(name.to_string_lossy().into_owned());
            }
            Some(module)
        } else {
            None
        };

        let minifier = self.toolchain.minifier.as_ref();
        let tree = build_tree(&src, &exclude, options.minify, minifier)?;
        tracing::info!("Packed {} file(s) from {}", tree.len(), src.display());

        let mut container = Container::new(tree).with_markdown(options.parse_markdown);

        let assets_dir = src.join(ASSETS_DIR);
        if assets_dir.is_dir() {
            let assets = build_tree(&assets_dir, &options.exclude, options.minify, minifier)?;
            tracing::info!("Packed {} asset(s)", assets.len());
            container = container.with_assets(assets);
        }

        if let Some(module) = api_module {
            container = container.with_api_module(module);
        }

        container.validate()?;
        Ok(container)
    }

    /// Writes `container` to `output`, gzip-compressed when `gzip` is set.
    ///
    /// Compressed output is staged in a temporary file registered with
    /// `ctx`, then streamed through the encoder.
    ///
    /// # Arguments
    /// * `container` - The pack to serialize
    /// * `output` - Destination file; missing parent directories are created
    /// * `gzip` - Compress the JSON text
    /// * `ctx` - Registry for the staging file
    ///
    /// # Errors
    /// - `BuildError::Io` - The staging or output file could not be written
    /// - `BuildError::Pack` - The container failed to serialize
    pub fn write(
        &self,
        container: &Container,
        output: &Path,
        gzip: bool,
        ctx: &HostContext,
    ) -> Result<(), BuildError> {
        let json = container.to_json()?;
        if let Some(parent) = output.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        if gzip {
            let (mut staged, staged_path) = ctx.stage_temp_file(".hw.json")?;
            staged.write_all(json.as_bytes())?;
            staged.flush()?;
            drop(staged);

            let mut input = File::open(&staged_path)?;
            let mut encoder = GzEncoder::new(File::create(output)?, Compression::default());
            io::copy(&mut input, &mut encoder)?;
            encoder.finish()?;
        } else {
            fs::write(output, json)?;
        }

        tracing::info!("Wrote {}", output.display());
        Ok(())
    }

    /// Assembles and writes in one step.
    pub fn build(
        &self,
        options: &BuildOptions,
        output: &Path,
        ctx: &HostContext,
    ) -> Result<Container, BuildError> {
        let container = self.assemble(options)?;
        self.write(&container, output, options.gzip, ctx)?;
        Ok(container)
    }

    fn compile_api(&self, entry: &Path) -> Result<String, BuildError> {
        tracing::info!("Linting {}", entry.display());
        let report = self.toolchain.linter.lint_files(&[entry.to_path_buf()])?;
        if report.error_count > 0 {
            for message in &report.messages {
                tracing::error!(
                    "{}:{}:{} {}",
                    entry.display(),
                    message.line,
                    message.column,
                    message.message
                );
            }
            return Err(BuildError::Lint {
                entry: entry.to_path_buf(),
                error_count: report.error_count,
                messages: report.messages,
            });
        }

        tracing::info!("Bundling {}", entry.display());
        let module = self
            .toolchain
            .bundler
            .compile(entry)
            .map_err(|e| BuildError::Bundle(e.to_string()))?;
        if module.trim().is_empty() {
            return Err(BuildError::Bundle(format!(
                "{} produced an empty module",
                entry.display()
            )));
        }
        Ok(module)
    }
}

impl Default for Packager {
    fn default() -> Self {
        Self::new(Toolchain::builtin())
    }
}

/// Finds `src/_hwapi.<ext>`, trying [`API_ENTRY_EXTENSIONS`] in order.
pub fn find_api_entry(src: &Path) -> Option<PathBuf> {
    API_ENTRY_EXTENSIONS
        .iter()
        .map(|ext| src.join(format!("{}.{}", API_ENTRY_STEM, ext)))
        .find(|path| path.is_file())
}

/// Builds the project at `project_dir` into `<out_dir>/<name>.hw` using its
/// `.hostwebrc`.
///
/// # Returns
/// The path of the written pack.
///
/// # Errors
/// - `BuildError::MissingConfig` - No `.hostwebrc` in `project_dir`
/// - `BuildError::Config` - The config is neither valid TOML nor INI
/// - Any collection, tool or write failure of the build itself
pub fn build_project(
    project_dir: &Path,
    out_dir: &Path,
    ctx: &HostContext,
) -> Result<PathBuf, BuildError> {
    let rc = HostwebRc::load(project_dir)?;
    let options = BuildOptions::from_config(project_dir, &rc);
    let output = rc.output_path(out_dir);
    tracing::info!("Building {} into {}", rc.config.name, output.display());

    let packager = Packager::new(Toolchain::from_config(&rc.config.tools));
    packager.build(&options, &output, ctx)?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{LintMessage, LintReport, Linter, ToolError};
    use hostweb_common::FileRecord;

    struct RejectAll;

    impl Linter for RejectAll {
        fn lint_files(&self, files: &[PathBuf]) -> Result<LintReport, ToolError> {
            let mut report = LintReport::default();
            for _ in files {
                report.push_error(LintMessage {
                    message: "nope".into(),
                    line: 1,
                    column: 1,
                });
            }
            Ok(report)
        }
    }

    fn project() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(src.join(".assets")).unwrap();
        fs::create_dir_all(src.join("about")).unwrap();
        fs::write(src.join("index.html"), "<h1>home</h1>").unwrap();
        fs::write(src.join("about/index.html"), "<h1>about</h1>").unwrap();
        fs::write(src.join(".assets/style.css"), "body{}").unwrap();
        fs::write(
            src.join("_hwapi.js"),
            "var __hwapi = function () { return [{ name: 'add', handler: function (a, b) { return a + b; } }]; };",
        )
        .unwrap();
        dir
    }

    #[test]
    fn test_assemble_without_api() {
        let dir = project();
        let pack = Packager::default()
            .assemble(&BuildOptions::new(dir.path()))
            .unwrap();

        assert!(!pack.use_api);
        assert!(pack.api_module.is_empty());
        assert!(pack.tree.contains_key("index.html"));
        assert!(pack.tree.contains_key("about/index.html"));
        assert!(pack.tree.contains_key("_hwapi.js"));
        assert!(!pack.tree.keys().any(|key| key.starts_with(".assets")));
        assert_eq!(pack.asset("style.css"), Some(&FileRecord::text("body{}")));
    }

    #[test]
    fn test_assemble_with_api() {
        let dir = project();
        let mut options = BuildOptions::new(dir.path());
        options.use_api = true;
        options.parse_markdown = true;

        let pack = Packager::default().assemble(&options).unwrap();
        assert!(pack.use_api);
        assert!(pack.parse_markdown);
        assert!(pack.api_module.contains("__hwapi"));
        assert!(!pack.tree.contains_key("_hwapi.js"));
    }

    #[test]
    fn test_api_without_entry_fails() {
        let dir = project();
        fs::remove_file(dir.path().join("src/_hwapi.js")).unwrap();
        let mut options = BuildOptions::new(dir.path());
        options.use_api = true;

        assert!(matches!(
            Packager::default().assemble(&options),
            Err(BuildError::MissingApiEntry(_))
        ));
    }

    #[test]
    fn test_lint_errors_abort_before_output() {
        let dir = project();
        let mut toolchain = Toolchain::builtin();
        toolchain.linter = Box::new(RejectAll);
        let packager = Packager::new(toolchain);

        let mut options = BuildOptions::new(dir.path());
        options.use_api = true;
        let output = dir.path().join("dist/site.hw");
        let ctx = HostContext::new();

        let err = packager.build(&options, &output, &ctx).unwrap_err();
        assert!(matches!(err, BuildError::Lint { error_count: 1, .. }));
        assert!(!output.exists());
    }

    #[test]
    fn test_missing_source_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Packager::default().assemble(&BuildOptions::new(dir.path())),
            Err(BuildError::MissingSource(_))
        ));
    }

    #[test]
    fn test_write_plain_and_gzip() {
        let dir = project();
        let packager = Packager::default();
        let pack = packager.assemble(&BuildOptions::new(dir.path())).unwrap();
        let ctx = HostContext::new();

        let plain = dir.path().join("out/plain.hw");
        packager.write(&pack, &plain, false, &ctx).unwrap();
        let plain_bytes = fs::read(&plain).unwrap();
        assert_eq!(plain_bytes.first(), Some(&b'{'));

        let gz = dir.path().join("out/packed.hw");
        packager.write(&pack, &gz, true, &ctx).unwrap();
        let gz_bytes = fs::read(&gz).unwrap();
        assert!(hostweb_common::pack::is_gzip(&gz_bytes));
        assert_eq!(ctx.staged_file_count(), 1);

        assert_eq!(Container::from_bytes(&plain_bytes).unwrap(), pack);
        assert_eq!(Container::from_bytes(&gz_bytes).unwrap(), pack);

        ctx.shutdown();
        assert_eq!(ctx.staged_file_count(), 0);
    }

    #[test]
    fn test_find_api_entry_prefers_js() {
        let dir = tempfile::tempdir().unwrap();
        assert!(find_api_entry(dir.path()).is_none());
        fs::write(dir.path().join("_hwapi.ts"), "export default () => []").unwrap();
        fs::write(dir.path().join("_hwapi.js"), "var __hwapi = () => []").unwrap();
        assert_eq!(
            find_api_entry(dir.path()).unwrap(),
            dir.path().join("_hwapi.js")
        );
    }
}
