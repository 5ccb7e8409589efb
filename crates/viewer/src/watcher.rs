//! # Shader Hot-Reloading
//!
//! Watches the shader root with [`notify`] and forwards changed `.wgsl` paths
//! over a channel. The render loop drains the channel once per frame, so any
//! number of file events between two frames turns into a single reload.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher};
use tracing::{debug, error, info};

const SHADER_EXTENSION: &str = "wgsl";

/// Live watcher plus the receiving end of its change channel.
///
/// Watching stops when this is dropped.
pub struct ShaderWatcher {
    _watcher: RecommendedWatcher,
    changes: Receiver<PathBuf>,
}

impl ShaderWatcher {
    /// True if any shader changed since the last call.
    pub fn take_changes(&self) -> bool {
        let changed = drain_changes(&self.changes);
        for path in &changed {
            info!("Shader file modified: {}", path.display());
        }
        !changed.is_empty()
    }
}

/// Starts watching `root` recursively.
///
/// # Errors
///
/// Fails if the directory does not exist or the platform watcher cannot be
/// created.
pub fn start(root: &Path) -> Result<ShaderWatcher> {
    if !root.exists() {
        anyhow::bail!("shader directory '{}' not found", root.display());
    }
    let (tx, rx) = crossbeam_channel::unbounded();
    let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| handle_file_event(&tx, result))
        .context("failed to create file watcher")?;
    watcher
        .watch(root, RecursiveMode::Recursive)
        .with_context(|| format!("failed to watch '{}'", root.display()))?;
    info!("Shader watcher active - monitoring '{}'", root.display());
    Ok(ShaderWatcher {
        _watcher: watcher,
        changes: rx,
    })
}

fn is_shader_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == SHADER_EXTENSION)
}

fn handle_file_event(tx: &Sender<PathBuf>, result: notify::Result<Event>) {
    match result {
        Ok(event) => {
            if !event.kind.is_modify() && !event.kind.is_create() {
                return;
            }
            for path in event.paths.into_iter().filter(|p| is_shader_file(p)) {
                // The receiver only goes away during shutdown.
                let _ = tx.send(path);
            }
        }
        Err(e) => error!("File watcher error: {e:?}"),
    }
}

/// Everything queued so far, each path once, in first-seen order.
fn drain_changes(rx: &Receiver<PathBuf>) -> Vec<PathBuf> {
    let mut changed: Vec<PathBuf> = Vec::new();
    for path in rx.try_iter() {
        if changed.contains(&path) {
            continue;
        }
        debug!(path = %path.display(), "queued shader change");
        changed.push(path);
    }
    changed
}
