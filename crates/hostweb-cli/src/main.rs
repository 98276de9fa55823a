//! # HostWeb CLI Entry Point
//!
//! ## Usage
//!
//! ```bash
//! # Scaffold a project and build it into dist/<name>.hw
//! hostweb create my-site
//! cd my-site && hostweb build
//!
//! # Serve the current project, rebuilding on every change
//! hostweb serve --watch
//!
//! # Serve a single pack, markdown page or file
//! hostweb serve dist/my-site.hw
//! hostweb serve notes.md --raw
//! ```
//!
//! Sites are always served on port 825. Set `RUST_LOG` to change the log
//! level.

use anyhow::Result;
use argh::FromArgs;
use hostweb_builder::{build_project, create_project, HostwebRc};
use hostweb_cli::{NotifyWatch, Target, WatchController, DEFAULT_OUTPUT};
use hostweb_common::{HostContext, VERSION};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(FromArgs)]
/// HostWeb - pack a website into a single file and serve it
struct Cli {
    /// print the version and exit
    #[argh(switch, short = 'v')]
    version: bool,

    #[argh(subcommand)]
    command: Option<Commands>,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Serve(ServeArgs),
    Build(BuildArgs),
    Create(CreateArgs),
}

/// Arguments for serving a site.
///
/// With a file, that file is served: `.hw` packs with their full route
/// table, markdown as a rendered page, anything else as-is at `/`. Without
/// a file, the project in the current directory is built first and its pack
/// is served.
#[derive(FromArgs)]
#[argh(subcommand, name = "serve")]
/// serve a .hw pack, a single file or the current project
struct ServeArgs {
    /// file to serve (defaults to the current project)
    #[argh(positional)]
    filename: Option<String>,

    /// serve the file as plain text without interpreting it
    #[argh(switch, short = 'r')]
    raw: bool,

    /// reload whenever the file or the project sources change
    #[argh(switch, short = 'w')]
    watch: bool,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "build")]
/// build the current project into a .hw pack
struct BuildArgs {
    /// output directory, relative to the project
    #[argh(option, short = 'o', default = "DEFAULT_OUTPUT.into()")]
    output: String,

    /// enable debug logging
    #[argh(switch, short = 'd')]
    debug: bool,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "create")]
/// create a new project
struct CreateArgs {
    /// project name, or "." to scaffold into the current directory
    #[argh(positional)]
    name: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    let debug = matches!(&cli.command, Some(Commands::Build(args)) if args.debug);
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(if debug { "debug" } else { "info" })
    });
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    if cli.version {
        println!("HostWeb v{}", VERSION);
        return Ok(());
    }

    let cwd = std::env::current_dir()?;
    match cli.command {
        Some(Commands::Serve(args)) => {
            let target = match args.filename {
                Some(file) => Target::File {
                    path: PathBuf::from(file),
                    raw: args.raw,
                },
                None => {
                    HostwebRc::load(&cwd)?;
                    Target::Project {
                        out_dir: cwd.join(DEFAULT_OUTPUT),
                        dir: cwd,
                    }
                }
            };
            serve(target, args.watch).await
        }
        Some(Commands::Build(args)) => {
            let ctx = HostContext::new();
            let result = build_project(&cwd, &cwd.join(&args.output), &ctx);
            ctx.release_temp_files();
            let output = result?;
            tracing::info!("Build finished: {}", output.display());
            Ok(())
        }
        Some(Commands::Create(args)) => {
            let root = create_project(&args.name, &cwd)?;
            tracing::info!("Created project in {}", root.display());
            Ok(())
        }
        None => Err(anyhow::anyhow!(
            "No command given. Run `hostweb --help` for usage."
        )),
    }
}

async fn serve(target: Target, watch: bool) -> Result<()> {
    let ctx = Arc::new(HostContext::new());

    tokio::spawn({
        let ctx = ctx.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                ctx.shutdown();
            }
        }
    });

    let mut controller = WatchController::new(target, ctx.clone());
    if watch {
        tracing::info!("Watching for changes");
        controller = controller.with_watch(NotifyWatch);
    }

    let result = controller.run().await;
    ctx.release_temp_files();
    result
}
