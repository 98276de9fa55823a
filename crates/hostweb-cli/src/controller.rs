//! The serve loop.
//!
//! A [`WatchController`] serves one generation at a time: load the site,
//! bind, spawn the server, then wait for a change or for shutdown. A change
//! closes the listener, drops the watcher, rebuilds (project mode), waits
//! [`RESTART_DELAY`] and starts the next generation on the same address.

use anyhow::{Context as _, Result};
use hostweb_builder::{build_project, CONFIG_FILE};
use hostweb_common::HostContext;
use hostweb_server::{bind, ApiLoader, HttpServer, ScriptLoader, Site};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::watch::{Armed, Phase, Watch, WatchSession};

/// Pause between closing a listener and binding the next one.
pub const RESTART_DELAY: Duration = Duration::from_millis(500);

/// Output directory of project builds, relative to the project.
pub const DEFAULT_OUTPUT: &str = "dist";

/// What the controller serves.
#[derive(Debug, Clone)]
pub enum Target {
    /// A single file: a pack, a markdown page or any other document.
    File { path: PathBuf, raw: bool },
    /// A project directory, built into `out_dir` before serving.
    Project { dir: PathBuf, out_dir: PathBuf },
}

impl Target {
    /// Paths whose changes trigger a reload.
    pub fn watch_paths(&self) -> Vec<PathBuf> {
        match self {
            Target::File { path, .. } => vec![path.clone()],
            Target::Project { dir, .. } => vec![dir.join(CONFIG_FILE), dir.join("src")],
        }
    }

    fn raw(&self) -> bool {
        matches!(self, Target::File { raw: true, .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Bound { generation: u64, addr: SocketAddr },
    Closed { generation: u64, addr: SocketAddr },
}

pub struct WatchController {
    target: Target,
    ctx: Arc<HostContext>,
    watch: Option<Box<dyn Watch>>,
    loader: Box<dyn ApiLoader>,
    restart_delay: Duration,
    observers: Vec<mpsc::UnboundedSender<LifecycleEvent>>,
}

impl WatchController {
    /// Serves `target` on the context's address until shutdown. Without a
    /// watcher nothing triggers a reload.
    pub fn new(target: Target, ctx: Arc<HostContext>) -> Self {
        Self {
            target,
            ctx,
            watch: None,
            loader: Box::new(ScriptLoader),
            restart_delay: RESTART_DELAY,
            observers: Vec::new(),
        }
    }

    pub fn with_watch(mut self, watch: impl Watch + 'static) -> Self {
        self.watch = Some(Box::new(watch));
        self
    }

    pub fn with_loader(mut self, loader: impl ApiLoader + 'static) -> Self {
        self.loader = Box::new(loader);
        self
    }

    pub fn with_restart_delay(mut self, delay: Duration) -> Self {
        self.restart_delay = delay;
        self
    }

    /// Receives a [`LifecycleEvent`] for every bind and close.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<LifecycleEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.observers.push(tx);
        rx
    }

    /// Runs the loop until the context requests shutdown.
    ///
    /// The initial build, the first load, binding the port and arming the
    /// watcher are fatal. A failed rebuild or reload keeps serving the
    /// previous generation's site.
    pub async fn run(mut self) -> Result<()> {
        let mut session = WatchSession::new();
        let mut current: Option<HttpServer> = None;
        let mut site_path = match &self.target {
            Target::File { path, .. } => path.clone(),
            Target::Project { .. } => self.build().await?,
        };

        loop {
            if self.ctx.is_shutting_down() {
                break;
            }

            let server = match (self.load(&site_path), current.take()) {
                (Ok(server), _) => server,
                (Err(e), Some(previous)) => {
                    tracing::error!("Reload failed, serving the previous version: {:#}", e);
                    previous
                }
                (Err(e), None) => return Err(e),
            };
            let listener = bind(self.ctx.addr()).await?;
            let running = server.spawn(listener)?;
            let addr = running.local_addr();
            current = Some(server);

            session.transition(Phase::Serving)?;
            let generation = session.generation();
            self.emit(LifecycleEvent::Bound { generation, addr });

            let mut armed = match &self.watch {
                Some(watch) => Some(watch.arm(&self.target.watch_paths())?),
                None => None,
            };

            let change = tokio::select! {
                change = next_change(armed.as_mut()) => change,
                _ = self.ctx.shutdown_requested() => None,
            };

            session.transition(Phase::Stopping)?;
            running.close().await;
            self.emit(LifecycleEvent::Closed { generation, addr });
            drop(armed);

            let Some(changed) = change else {
                break;
            };
            tracing::info!("{} changed, reloading", changed.display());

            session.transition(Phase::Rebuilding)?;
            if matches!(self.target, Target::Project { .. }) {
                match self.build().await {
                    Ok(path) => site_path = path,
                    Err(e) => {
                        tracing::error!("Rebuild failed, serving the previous build: {:#}", e)
                    }
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.restart_delay) => {}
                _ = self.ctx.shutdown_requested() => {}
            }
        }

        if session.phase() != Phase::Idle {
            session.transition(Phase::Idle)?;
        }
        tracing::info!("Stopped serving after {} generation(s)", session.generation());
        Ok(())
    }

    fn load(&self, site_path: &Path) -> Result<HttpServer> {
        let site = Site::open(site_path, self.target.raw())?;
        Ok(HttpServer::new(site, self.loader.as_ref())?)
    }

    async fn build(&self) -> Result<PathBuf> {
        let Target::Project { dir, out_dir } = &self.target else {
            anyhow::bail!("Only projects can be built");
        };
        let (dir, out_dir, ctx) = (dir.clone(), out_dir.clone(), self.ctx.clone());

        let output = tokio::task::spawn_blocking(move || build_project(&dir, &out_dir, &ctx))
            .await
            .context("Build task panicked")??;
        Ok(output)
    }

    fn emit(&mut self, event: LifecycleEvent) {
        self.observers.retain(|observer| observer.send(event).is_ok());
    }
}

async fn next_change(armed: Option<&mut Armed>) -> Option<PathBuf> {
    match armed {
        Some(armed) => {
            let change = armed.changes.recv().await;
            if change.is_none() {
                tracing::warn!("Watcher stopped");
            }
            change
        }
        None => std::future::pending().await,
    }
}
