//! Build-time collaborators: minifier, linter and bundler.
//!
//! Each capability is a trait so the packager never depends on a concrete
//! tool. The built-in implementations need nothing outside this process;
//! the command implementations shell out to whatever the project names in
//! `[config.tools]`.

use boa_engine::{Context, Module, Script, Source};
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::sync::LazyLock;
use thiserror::Error;

use crate::config::{ToolsConfig, BUILTIN_TOOL};

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("failed to run `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{program}` exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("unexpected output from `{program}`: {reason}")]
    Output { program: String, reason: String },

    #[error("{0}")]
    Rejected(String),

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Produces a smaller equivalent of a text file. `name` is the tree key, so
/// implementations can pick a strategy from its extension.
pub trait Minifier: Send + Sync {
    fn minify(&self, name: &str, source: &str) -> Result<String, ToolError>;
}

/// Reports problems in a set of source files.
pub trait Linter: Send + Sync {
    fn lint_files(&self, files: &[PathBuf]) -> Result<LintReport, ToolError>;
}

/// Compiles an entry file into a single self-contained script.
pub trait Bundler: Send + Sync {
    fn compile(&self, entry: &Path) -> Result<String, ToolError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LintReport {
    pub error_count: usize,
    pub messages: Vec<LintMessage>,
}

impl LintReport {
    pub fn push_error(&mut self, message: LintMessage) {
        self.error_count += 1;
        self.messages.push(message);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LintMessage {
    pub message: String,
    pub line: u32,
    pub column: u32,
}

/// The three collaborators a build uses.
pub struct Toolchain {
    pub minifier: Box<dyn Minifier>,
    pub linter: Box<dyn Linter>,
    pub bundler: Box<dyn Bundler>,
}

impl Toolchain {
    pub fn builtin() -> Self {
        Self {
            minifier: Box::new(BuiltinMinifier),
            linter: Box::new(SyntaxLinter),
            bundler: Box::new(ScriptBundler),
        }
    }

    /// Resolves the tools named in `[config.tools]`.
    ///
    /// `"builtin"` selects the in-process implementation, `"eslint"` the
    /// stock eslint invocation, and anything else is run as a command line.
    pub fn from_config(tools: &ToolsConfig) -> Self {
        let minifier: Box<dyn Minifier> = match ExternalCommand::parse(&tools.minifier) {
            Some(command) if tools.minifier.trim() != BUILTIN_TOOL => {
                Box::new(CommandMinifier::new(command))
            }
            _ => Box::new(BuiltinMinifier),
        };

        let linter: Box<dyn Linter> = match tools.linter.trim() {
            "eslint" => Box::new(EslintLinter::default()),
            other => match ExternalCommand::parse(other) {
                Some(command) if other != BUILTIN_TOOL => Box::new(EslintLinter::new(command)),
                _ => Box::new(SyntaxLinter),
            },
        };

        let bundler: Box<dyn Bundler> = match ExternalCommand::parse(&tools.bundler) {
            Some(command) if tools.bundler.trim() != BUILTIN_TOOL => {
                Box::new(CommandBundler::new(command))
            }
            _ => Box::new(ScriptBundler),
        };

        Self {
            minifier,
            linter,
            bundler,
        }
    }
}

impl Default for Toolchain {
    fn default() -> Self {
        Self::builtin()
    }
}

/// A command line split on whitespace, with `{name}` placeholders filled in
/// at run time. There is no shell quoting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalCommand {
    program: String,
    args: Vec<String>,
}

impl ExternalCommand {
    pub fn parse(line: &str) -> Option<Self> {
        let mut words = line.split_whitespace().map(str::to_string);
        let program = words.next()?;
        Some(Self {
            program,
            args: words.collect(),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Runs the command. An argument that is exactly `{files}` expands into
    /// one argument per file; other placeholders are substituted in place.
    fn run(
        &self,
        vars: &[(&str, &str)],
        files: &[PathBuf],
        stdin: Option<&str>,
    ) -> Result<Output, ToolError> {
        let mut command = Command::new(&self.program);
        for arg in &self.args {
            if arg == "{files}" {
                command.args(files);
                continue;
            }
            let mut expanded = arg.clone();
            for (name, value) in vars {
                expanded = expanded.replace(&format!("{{{}}}", name), value);
            }
            command.arg(expanded);
        }
        command
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        tracing::debug!("Running {:?}", command);
        let mut child = command.spawn().map_err(|source| ToolError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        // Feed stdin from a separate thread so a large output cannot block
        // the write.
        let output = std::thread::scope(|scope| {
            if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
                scope.spawn(move || {
                    let _ = pipe.write_all(input.as_bytes());
                });
            }
            child.wait_with_output()
        });

        output.map_err(|source| ToolError::Spawn {
            program: self.program.clone(),
            source,
        })
    }

    fn failed(&self, output: &Output) -> ToolError {
        ToolError::Failed {
            program: self.program.clone(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
    }

    fn stdout_text(&self, output: Output) -> Result<String, ToolError> {
        String::from_utf8(output.stdout).map_err(|_| ToolError::Output {
            program: self.program.clone(),
            reason: "output is not valid UTF-8".into(),
        })
    }
}

/// Minifier used when the project names no command.
///
/// Stylesheets are minified and JSON is compacted. HTML and scripts pass
/// through unchanged: configure `tools.minifier` to shrink those.
pub struct BuiltinMinifier;

impl Minifier for BuiltinMinifier {
    fn minify(&self, name: &str, source: &str) -> Result<String, ToolError> {
        let rejected = |e: String| ToolError::Rejected(format!("{}: {}", name, e));
        match hostweb_common::mime::extension(name).as_deref() {
            Some("json") => {
                let value: serde_json::Value =
                    serde_json::from_str(source).map_err(|e| rejected(e.to_string()))?;
                serde_json::to_string(&value).map_err(|e| rejected(e.to_string()))
            }
            Some("css") => minify_css(source).map_err(rejected),
            _ => Ok(source.to_string()),
        }
    }
}

fn minify_css(source: &str) -> Result<String, String> {
    let mut sheet =
        StyleSheet::parse(source, ParserOptions::default()).map_err(|e| e.to_string())?;
    sheet
        .minify(MinifyOptions::default())
        .map_err(|e| e.to_string())?;
    let printed = sheet
        .to_css(PrinterOptions {
            minify: true,
            ..PrinterOptions::default()
        })
        .map_err(|e| e.to_string())?;
    Ok(printed.code)
}

/// Pipes the file through an external minifier: source on stdin, result on
/// stdout. `{ext}` expands to the file extension.
pub struct CommandMinifier {
    command: ExternalCommand,
}

impl CommandMinifier {
    pub fn new(command: ExternalCommand) -> Self {
        Self { command }
    }
}

impl Minifier for CommandMinifier {
    fn minify(&self, name: &str, source: &str) -> Result<String, ToolError> {
        let ext = hostweb_common::mime::extension(name).unwrap_or_default();
        let output = self.command.run(&[("ext", &ext)], &[], Some(source))?;
        if !output.status.success() {
            return Err(self.command.failed(&output));
        }
        self.command.stdout_text(output)
    }
}

/// Parses each JavaScript file with the embedded engine and reports the
/// first syntax error of each. Files are accepted as classic scripts or as
/// ES modules; other languages are skipped.
pub struct SyntaxLinter;

impl Linter for SyntaxLinter {
    fn lint_files(&self, files: &[PathBuf]) -> Result<LintReport, ToolError> {
        let mut report = LintReport::default();
        for file in files {
            let is_js = file
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| matches!(ext, "js" | "mjs" | "cjs"));
            if !is_js {
                tracing::debug!("Skipping syntax check for {}", file.display());
                continue;
            }
            let source = std::fs::read_to_string(file).map_err(|source| ToolError::Read {
                path: file.clone(),
                source,
            })?;
            if let Some(message) = check_syntax(&source) {
                report.push_error(message);
            }
        }
        Ok(report)
    }
}

fn check_syntax(source: &str) -> Option<LintMessage> {
    let mut context = Context::default();
    let script_error = match Script::parse(Source::from_bytes(source), None, &mut context) {
        Ok(_) => return None,
        Err(e) => e.to_string(),
    };
    if Module::parse(Source::from_bytes(source), None, &mut context).is_ok() {
        return None;
    }
    let (line, column) = error_position(&script_error);
    Some(LintMessage {
        message: script_error,
        line,
        column,
    })
}

static POSITION: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"line (\d+), col(?:umn)? (\d+)").ok());

/// Pulls `(line, column)` out of an engine error message, `(0, 0)` if absent.
fn error_position(message: &str) -> (u32, u32) {
    POSITION
        .as_ref()
        .and_then(|position| position.captures(message))
        .map(|caps| {
            let line = caps[1].parse().unwrap_or(0);
            let column = caps[2].parse().unwrap_or(0);
            (line, column)
        })
        .unwrap_or((0, 0))
}

/// Runs eslint (or a compatible tool) with `--format json` output. The
/// command takes either `{files}` or `{entry}`.
pub struct EslintLinter {
    command: ExternalCommand,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EslintFileResult {
    #[serde(default)]
    messages: Vec<EslintMessage>,
}

#[derive(Deserialize)]
struct EslintMessage {
    message: String,
    #[serde(default)]
    severity: u8,
    #[serde(default)]
    line: Option<u32>,
    #[serde(default)]
    column: Option<u32>,
}

impl EslintLinter {
    pub fn new(command: ExternalCommand) -> Self {
        Self { command }
    }

    fn parse_report(&self, stdout: &str) -> Result<LintReport, ToolError> {
        let results: Vec<EslintFileResult> =
            serde_json::from_str(stdout).map_err(|e| ToolError::Output {
                program: self.command.program.clone(),
                reason: e.to_string(),
            })?;
        let mut report = LintReport::default();
        for message in results.into_iter().flat_map(|file| file.messages) {
            // Severity 2 is an error, 1 a warning.
            if message.severity >= 2 {
                report.push_error(LintMessage {
                    message: message.message,
                    line: message.line.unwrap_or(0),
                    column: message.column.unwrap_or(0),
                });
            } else {
                tracing::warn!(
                    "{}:{} {}",
                    message.line.unwrap_or(0),
                    message.column.unwrap_or(0),
                    message.message
                );
            }
        }
        Ok(report)
    }
}

impl Default for EslintLinter {
    fn default() -> Self {
        Self {
            command: ExternalCommand {
                program: "eslint".into(),
                args: vec!["--format".into(), "json".into(), "{files}".into()],
            },
        }
    }
}

impl Linter for EslintLinter {
    fn lint_files(&self, files: &[PathBuf]) -> Result<LintReport, ToolError> {
        let entry = files
            .first()
            .map(|file| file.to_string_lossy().into_owned())
            .unwrap_or_default();
        let output = self.command.run(&[("entry", &entry)], files, None)?;
        // eslint exits non-zero when it finds errors; only an empty report
        // means the tool itself failed.
        if output.stdout.iter().all(u8::is_ascii_whitespace) {
            return Err(self.command.failed(&output));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        self.parse_report(&stdout)
    }
}

/// Uses the entry file as the module verbatim.
pub struct ScriptBundler;

impl Bundler for ScriptBundler {
    fn compile(&self, entry: &Path) -> Result<String, ToolError> {
        std::fs::read_to_string(entry).map_err(|source| ToolError::Read {
            path: entry.to_path_buf(),
            source,
        })
    }
}

/// Runs an external bundler and takes the module from its stdout.
/// `{entry}` expands to the entry file path.
pub struct CommandBundler {
    command: ExternalCommand,
}

impl CommandBundler {
    pub fn new(command: ExternalCommand) -> Self {
        Self { command }
    }
}

impl Bundler for CommandBundler {
    fn compile(&self, entry: &Path) -> Result<String, ToolError> {
        let entry = entry.to_string_lossy();
        let output = self.command.run(&[("entry", &entry)], &[], None)?;
        if !output.status.success() {
            return Err(self.command.failed(&output));
        }
        self.command.stdout_text(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_minifier_compacts_json() {
        let out = BuiltinMinifier
            .minify("data/config.json", "{\n  \"a\": 1,\n  \"b\": [1, 2]\n}")
            .unwrap();
        assert_eq!(out, r#"{"a":1,"b":[1,2]}"#);
    }

    #[test]
    fn test_builtin_minifier_rejects_bad_json() {
        assert!(BuiltinMinifier.minify("broken.json", "{ nope").is_err());
    }

    #[test]
    fn test_builtin_minifier_shrinks_css() {
        let css = "body {\n  color: red;\n}\n\n/* layout */\n.wrap {\n  margin: 0 auto;\n}\n";
        let out = BuiltinMinifier.minify("style.css", css).unwrap();
        assert!(out.len() < css.len());
        assert!(out.starts_with("body{color:red}"));
        assert!(!out.contains('\n'));
        assert!(!out.contains("layout"));
    }

    #[test]
    fn test_builtin_minifier_passes_other_types_through() {
        let html = "<p>\n  hello\n</p>";
        assert_eq!(BuiltinMinifier.minify("index.html", html).unwrap(), html);
    }

    #[test]
    fn test_command_parse() {
        let command = ExternalCommand::parse("  esbuild {entry} --bundle ").unwrap();
        assert_eq!(command.program(), "esbuild");
        assert_eq!(command.args, vec!["{entry}", "--bundle"]);
        assert!(ExternalCommand::parse("   ").is_none());
    }

    #[test]
    fn test_syntax_linter_accepts_scripts_and_modules() {
        assert!(check_syntax("function add(a, b) { return a + b; }").is_none());
        assert!(check_syntax("export default function () { return []; }").is_none());
    }

    #[test]
    fn test_syntax_linter_reports_errors() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.js");
        let bad = dir.path().join("bad.js");
        let typed = dir.path().join("typed.ts");
        std::fs::write(&good, "var x = 1;").unwrap();
        std::fs::write(&bad, "function (").unwrap();
        std::fs::write(&typed, "let x: number = 1;").unwrap();

        let report = SyntaxLinter.lint_files(&[good, bad, typed]).unwrap();
        assert_eq!(report.error_count, 1);
        assert_eq!(report.messages.len(), 1);
    }

    #[test]
    fn test_error_position() {
        assert_eq!(
            error_position("SyntaxError: unexpected token at line 3, col 14"),
            (3, 14)
        );
        assert_eq!(error_position("line 7, column 2"), (7, 2));
        assert_eq!(error_position("no position"), (0, 0));
    }

    #[test]
    fn test_eslint_report_counts_errors_only() {
        let linter = EslintLinter::default();
        let report = linter
            .parse_report(
                r#"[{"filePath":"/p/_hwapi.js","messages":[
                    {"message":"'x' is not defined.","severity":2,"line":4,"column":9},
                    {"message":"Unexpected console statement.","severity":1,"line":5,"column":1}
                ],"errorCount":1}]"#,
            )
            .unwrap();
        assert_eq!(report.error_count, 1);
        assert_eq!(
            report.messages[0],
            LintMessage {
                message: "'x' is not defined.".into(),
                line: 4,
                column: 9,
            }
        );
    }

    #[test]
    fn test_toolchain_from_config() {
        let tools = ToolsConfig {
            minifier: "builtin".into(),
            linter: "eslint".into(),
            bundler: "esbuild {entry} --bundle".into(),
        };
        let chain = Toolchain::from_config(&tools);
        assert_eq!(chain.minifier.minify("a.html", "<b> x </b>").unwrap(), "<b> x </b>");
    }

    #[test]
    fn test_script_bundler_reads_entry() {
        let dir = tempfile::tempdir().unwrap();
        let entry = dir.path().join("_hwapi.js");
        std::fs::write(&entry, "var __hwapi = function () { return []; };").unwrap();
        let module = ScriptBundler.compile(&entry).unwrap();
        assert!(module.contains("__hwapi"));
        assert!(ScriptBundler.compile(&dir.path().join("missing.js")).is_err());
    }
}
