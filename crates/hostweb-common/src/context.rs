//! Process-wide context.
//!
//! One [`HostContext`] is created by the CLI and passed into every start and
//! stop operation. It owns what would otherwise be global state: the listening
//! address, the temporary files staged during builds, and the shutdown signal.
//!
//! Teardown order: [`HostContext::shutdown`] first raises the shutdown signal
//! (the serving loop closes its listener and watcher), then releases the
//! temporary files.

use std::fs::File;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Mutex;
use tempfile::TempPath;
use tokio::sync::watch;

use crate::error::Result;

/// Fixed HostWeb listening port.
pub const DEFAULT_PORT: u16 = 825;

pub struct HostContext {
    addr: SocketAddr,
    temp_files: Mutex<Vec<TempPath>>,
    shutdown: watch::Sender<bool>,
}

impl HostContext {
    /// Creates a context listening on `0.0.0.0:825`.
    pub fn new() -> Self {
        Self::with_addr(SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)))
    }

    pub fn with_addr(addr: SocketAddr) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            addr,
            temp_files: Mutex::new(Vec::new()),
            shutdown,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Creates a temporary file that lives until the context shuts down.
    pub fn stage_temp_file(&self, suffix: &str) -> Result<(File, PathBuf)> {
        let staged = tempfile::Builder::new()
            .prefix("hostweb-")
            .suffix(suffix)
            .tempfile()?;
        let (file, temp_path) = staged.into_parts();
        let path = temp_path.to_path_buf();
        self.temp_files
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(temp_path);
        tracing::debug!("Staged temporary file {}", path.display());
        Ok((file, path))
    }

    pub fn staged_file_count(&self) -> usize {
        self.temp_files
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Removes every staged temporary file.
    pub fn release_temp_files(&self) {
        let staged = std::mem::take(
            &mut *self
                .temp_files
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        );
        for temp_path in staged {
            let staged_path = temp_path.to_path_buf();
            if let Err(e) = temp_path.close() {
                tracing::warn!("Failed to remove temporary file {}: {}", staged_path.display(), e);
            }
        }
    }

    pub fn request_shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Resolves once [`HostContext::request_shutdown`] has been called.
    pub async fn shutdown_requested(&self) {
        let mut rx = self.shutdown.subscribe();
        let _ = rx.wait_for(|stop| *stop).await;
    }

    /// Shutdown hook: signals the serving loop and releases temporary files.
    pub fn shutdown(&self) {
        tracing::info!("Shutting down HostWeb...");
        self.request_shutdown();
        self.release_temp_files();
    }
}

impl Default for HostContext {
    fn default() -> Self {
        Self::new()
    }
}
