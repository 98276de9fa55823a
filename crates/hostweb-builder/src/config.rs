//! `.hostwebrc` project configuration.
//!
//! ```toml
//! file = "hostwebrc"
//!
//! [config]
//! name = "my-site"
//! ignore = ["README.md"]
//!
//! [config.build]
//! type = "classic"
//! usegzip = true
//! minify = true
//! useapi = false
//! parsemarkdown = false
//!
//! [config.tools]
//! minifier = "builtin"
//! linter = "builtin"
//! bundler = "builtin"
//! ```
//!
//! Configs written as INI are read too:
//!
//! ```ini
//! file=hostwebrc
//! [config]
//! name=my-site
//! ignore[]=README.md
//! [config.build]
//! type=classic
//! usegzip=true
//! minify=true
//! ```
//!
//! New projects are always written as TOML.

use ini::{Ini, Properties};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::BuildError;

pub const CONFIG_FILE: &str = ".hostwebrc";

/// Name of the built-in implementation of a tool.
pub const BUILTIN_TOOL: &str = "builtin";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostwebRc {
    #[serde(default = "default_file_tag")]
    pub file: String,
    pub config: ProjectConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    #[serde(default)]
    pub ignore: Vec<String>,
    #[serde(default)]
    pub build: BuildConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildConfig {
    #[serde(rename = "type", default = "default_build_type")]
    pub kind: String,
    #[serde(default = "enabled")]
    pub usegzip: bool,
    #[serde(default = "enabled")]
    pub minify: bool,
    #[serde(default)]
    pub useapi: bool,
    #[serde(default)]
    pub parsemarkdown: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            kind: default_build_type(),
            usegzip: true,
            minify: true,
            useapi: false,
            parsemarkdown: false,
        }
    }
}

/// External tool selection. Each value is either `"builtin"` or a command
/// line with placeholders (`{ext}`, `{entry}`, `{files}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "builtin_tool")]
    pub minifier: String,
    #[serde(default = "builtin_tool")]
    pub linter: String,
    #[serde(default = "builtin_tool")]
    pub bundler: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            minifier: builtin_tool(),
            linter: builtin_tool(),
            bundler: builtin_tool(),
        }
    }
}

fn default_file_tag() -> String {
    "hostwebrc".into()
}

fn default_build_type() -> String {
    "classic".into()
}

fn builtin_tool() -> String {
    BUILTIN_TOOL.into()
}

fn enabled() -> bool {
    true
}

fn flag(section: &Properties, key: &str, default: bool) -> bool {
    match section.get(key).map(str::trim) {
        Some(value) => value.eq_ignore_ascii_case("true"),
        None => default,
    }
}

impl HostwebRc {
    /// Default configuration for a freshly created project.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            file: default_file_tag(),
            config: ProjectConfig {
                name: name.into(),
                ignore: vec!["README.md".into()],
                build: BuildConfig::default(),
                tools: ToolsConfig::default(),
            },
        }
    }

    /// Parses TOML, falling back to INI. A file that is neither reports the
    /// TOML error.
    pub fn parse(text: &str) -> Result<Self, BuildError> {
        match toml::from_str(text) {
            Ok(rc) => Ok(rc),
            Err(e) => match Self::parse_ini(text) {
                Some(rc) => {
                    tracing::debug!("Read .hostwebrc as INI");
                    Ok(rc)
                }
                None => Err(e.into()),
            },
        }
    }

    /// INI layout: `[config]` holds `name` and repeated `ignore[]` keys,
    /// `[config.build]` and `[config.tools]` hold their tables.
    fn parse_ini(text: &str) -> Option<Self> {
        let ini = Ini::load_from_str(text).ok()?;
        let config = ini.section(Some("config"))?;

        let mut rc = Self::new(config.get("name")?);
        rc.config.ignore = config.get_all("ignore[]").map(str::to_string).collect();
        if let Some(file) = ini.general_section().get("file") {
            rc.file = file.to_string();
        }

        if let Some(section) = ini.section(Some("config.build")) {
            let build = &mut rc.config.build;
            if let Some(kind) = section.get("type") {
                build.kind = kind.to_string();
            }
            build.usegzip = flag(section, "usegzip", build.usegzip);
            build.minify = flag(section, "minify", build.minify);
            build.useapi = flag(section, "useapi", build.useapi);
            build.parsemarkdown = flag(section, "parsemarkdown", build.parsemarkdown);
        }

        if let Some(section) = ini.section(Some("config.tools")) {
            let tools = &mut rc.config.tools;
            for (key, slot) in [
                ("minifier", &mut tools.minifier),
                ("linter", &mut tools.linter),
                ("bundler", &mut tools.bundler),
            ] {
                if let Some(value) = section.get(key) {
                    *slot = value.to_string();
                }
            }
        }
        Some(rc)
    }

    /// Reads `<project_dir>/.hostwebrc`.
    pub fn load(project_dir: &Path) -> Result<Self, BuildError> {
        let path = project_dir.join(CONFIG_FILE);
        if !path.is_file() {
            return Err(BuildError::MissingConfig(project_dir.to_path_buf()));
        }
        let text = std::fs::read_to_string(&path)?;
        Self::parse(&text)
    }

    pub fn to_toml(&self) -> Result<String, BuildError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Location of the built pack inside `out_dir`.
    pub fn output_path(&self, out_dir: &Path) -> PathBuf {
        out_dir.join(format!("{}.hw", self.config.name))
    }
}
