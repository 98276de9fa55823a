//! `hostweb create` project scaffolding.

use hostweb_common::VERSION;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::{HostwebRc, CONFIG_FILE};
use crate::error::BuildError;

/// Creates a starter project named `name` under `cwd`.
///
/// `"."` scaffolds into `cwd` itself, which must be empty; the project then
/// takes the directory's name. Any other name must not exist yet.
pub fn create_project(name: &str, cwd: &Path) -> Result<PathBuf, BuildError> {
    let (root, project_name) = if name == "." {
        if fs::read_dir(cwd)?.next().is_some() {
            return Err(BuildError::NotEmpty(cwd.to_path_buf()));
        }
        let dir_name = cwd
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "hostweb-project".to_string());
        (cwd.to_path_buf(), dir_name)
    } else {
        let root = cwd.join(name);
        if root.exists() {
            return Err(BuildError::AlreadyExists(root));
        }
        (root, name.to_string())
    };

    let src = root.join("src");
    fs::create_dir_all(src.join("example-route"))?;
    fs::create_dir_all(src.join(".assets"))?;

    fs::write(
        src.join("index.html"),
        "<h1>Hello World</h1>\n<p>This is homepage</p>\n",
    )?;
    fs::write(
        src.join("example-route").join("index.html"),
        "<h1>Hello World</h1>\n<p>This is example route</p>\n",
    )?;
    fs::write(
        src.join(".assets").join("style.css"),
        "/* This is an example stylesheet */\nbody { background-color: #f2f2f2; }",
    )?;
    fs::write(src.join("README.md"), readme(&project_name))?;

    let rc = HostwebRc::new(project_name);
    fs::write(root.join(CONFIG_FILE), rc.to_toml()?)?;

    tracing::info!("Created project {} in {}", rc.config.name, root.display());
    Ok(root)
}

fn readme(name: &str) -> String {
    format!(
        "# {name}\nWelcome in {name} project!\n\n## Useful commands\n\n### build\n\
         `hostweb build` - Build project\n\n<hr>\n<center>HostWeb v{VERSION}</center>\n"
    )
}
