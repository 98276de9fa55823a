//! File watching and the serve-loop state machine.
//!
//! ```text
//! Idle ──► Serving ──► Stopping ──► Rebuilding ──► Serving (next generation)
//!              │            │             │
//!              └────────────┴─────► Idle ◄┘   (shutdown)
//! ```

use hostweb_common::{HostwebError, Result};
use notify::{EventKind, RecursiveMode, Watcher};
use std::fmt;
use std::path::PathBuf;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Serving,
    Stopping,
    Rebuilding,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Serving => "serving",
            Phase::Stopping => "stopping",
            Phase::Rebuilding => "rebuilding",
        };
        f.write_str(name)
    }
}

/// Generation counter plus the current phase of the serve loop.
///
/// Every entry into [`Phase::Serving`] starts a new generation.
#[derive(Debug)]
pub struct WatchSession {
    generation: u64,
    phase: Phase,
}

impl WatchSession {
    pub fn new() -> Self {
        Self {
            generation: 0,
            phase: Phase::Idle,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn transition(&mut self, next: Phase) -> Result<()> {
        let allowed = matches!(
            (self.phase, next),
            (Phase::Idle, Phase::Serving)
                | (Phase::Serving, Phase::Stopping)
                | (Phase::Stopping, Phase::Rebuilding)
                | (Phase::Stopping, Phase::Idle)
                | (Phase::Rebuilding, Phase::Serving)
                | (Phase::Rebuilding, Phase::Idle)
        );
        if !allowed {
            return Err(HostwebError::InvalidTransition(format!(
                "{} -> {}",
                self.phase, next
            )));
        }

        if next == Phase::Serving {
            self.generation += 1;
        }
        tracing::debug!(
            "Generation {}: {} -> {}",
            self.generation,
            self.phase,
            next
        );
        self.phase = next;
        Ok(())
    }
}

impl Default for WatchSession {
    fn default() -> Self {
        Self::new()
    }
}

/// An armed watcher. Dropping it stops watching.
pub struct Armed {
    pub changes: mpsc::UnboundedReceiver<PathBuf>,
    _guard: Box<dyn Send>,
}

impl Armed {
    pub fn new(changes: mpsc::UnboundedReceiver<PathBuf>, guard: impl Send + 'static) -> Self {
        Self {
            changes,
            _guard: Box::new(guard),
        }
    }
}

/// Source of change notifications for the serve loop.
pub trait Watch: Send + Sync {
    /// Starts watching `paths`. Directories are watched recursively.
    fn arm(&self, paths: &[PathBuf]) -> Result<Armed>;
}

/// [`Watch`] backed by the platform's file notification API.
#[derive(Debug, Default, Clone, Copy)]
pub struct NotifyWatch;

impl Watch for NotifyWatch {
    fn arm(&self, paths: &[PathBuf]) -> Result<Armed> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut watcher = notify::recommended_watcher(
            move |res: std::result::Result<notify::Event, notify::Error>| match res {
                Ok(event) => {
                    if matches!(event.kind, EventKind::Access(_)) {
                        return;
                    }
                    if let Some(path) = event.paths.into_iter().next() {
                        let _ = tx.send(path);
                    }
                }
                Err(e) => tracing::warn!("Watch error: {}", e),
            },
        )
        .map_err(watch_error)?;

        for path in paths {
            if !path.exists() {
                tracing::debug!("Not watching missing path {}", path.display());
                continue;
            }
            let mode = if path.is_dir() {
                RecursiveMode::Recursive
            } else {
                RecursiveMode::NonRecursive
            };
            watcher.watch(path, mode).map_err(watch_error)?;
            tracing::debug!("Watching {}", path.display());
        }

        Ok(Armed::new(rx, watcher))
    }
}

fn watch_error(e: notify::Error) -> HostwebError {
    HostwebError::Watch(e.to_string())
}
