//! Script directory watcher
//!
//! Watches the four script buckets and rescans the affected slice of a
//! shared [`ScriptRegistry`] whenever a script file is added, changed or
//! removed. Scripts dropped into the directories by an external sync
//! process become runnable without a restart.
//!
//! Filesystem events are forwarded out of the notify callback over a
//! crossbeam channel and consumed on a dedicated thread, so registry
//! updates never run inside the watcher backend's own callback context.

use std::path::Path;
use std::sync::{Arc, RwLock};
use std::thread::JoinHandle;

use crossbeam_channel::{select, Receiver, Sender};
use notify::{Event as NotifyEvent, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, warn};

use crate::document::ScenarioType;
use crate::error::{Result, ScenarioError};
use crate::registry::ScriptRegistry;
use crate::workspace::WorkspaceLayout;

/// Keeps a shared registry synchronized with the script directories.
///
/// Dropping the handle stops the consumer thread and the underlying
/// filesystem watcher.
pub struct RegistryWatcher {
    registry: Arc<RwLock<ScriptRegistry>>,
    shutdown_tx: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl RegistryWatcher {
    /// Start watching the workspace's script buckets. The buckets must
    /// exist; call [`WorkspaceLayout::ensure`] first.
    pub fn spawn(layout: WorkspaceLayout) -> Result<Self> {
        let registry = Arc::new(RwLock::new(ScriptRegistry::discover(&layout)?));

        let (event_tx, event_rx) = crossbeam_channel::unbounded::<NotifyEvent>();
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);

        let mut watcher: RecommendedWatcher =
            notify::recommended_watcher(move |res: std::result::Result<NotifyEvent, notify::Error>| {
                match res {
                    Ok(event) => {
                        let _ = event_tx.send(event);
                    }
                    Err(e) => warn!(error = %e, "filesystem watch error"),
                }
            })
            .map_err(|e| ScenarioError::workspace(format!("cannot create watcher: {}", e)))?;

        for (_, _, dir) in layout.script_buckets() {
            watcher
                .watch(&dir, RecursiveMode::NonRecursive)
                .map_err(|e| {
                    ScenarioError::workspace(format!("cannot watch {}: {}", dir.display(), e))
                })?;
            debug!(dir = %dir.display(), "watching script bucket");
        }

        let registry_clone = Arc::clone(&registry);
        // The notify watcher moves into the thread so it lives until shutdown.
        let handle = std::thread::spawn(move || {
            consume_events(watcher, layout, registry_clone, event_rx, shutdown_rx);
        });

        Ok(Self {
            registry,
            shutdown_tx,
            handle: Some(handle),
        })
    }

    /// The shared registry. Lock it for reads; the watcher takes the write
    /// lock only briefly while swapping in a rescanned bucket.
    pub fn registry(&self) -> Arc<RwLock<ScriptRegistry>> {
        Arc::clone(&self.registry)
    }
}

impl Drop for RegistryWatcher {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn consume_events(
    _watcher: RecommendedWatcher,
    layout: WorkspaceLayout,
    registry: Arc<RwLock<ScriptRegistry>>,
    event_rx: Receiver<NotifyEvent>,
    shutdown_rx: Receiver<()>,
) {
    loop {
        select! {
            recv(event_rx) -> msg => {
                let Ok(event) = msg else { break };
                if !matches!(
                    event.kind,
                    EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                ) {
                    continue;
                }
                for scenario_type in affected_buckets(&layout, &event) {
                    let mut guard = match registry.write() {
                        Ok(guard) => guard,
                        Err(poisoned) => poisoned.into_inner(),
                    };
                    if let Err(e) = guard.rescan(&layout, scenario_type) {
                        warn!(scenario_type = %scenario_type, error = %e, "rescan failed");
                    }
                }
            }
            recv(shutdown_rx) -> _ => break,
        }
    }
}

/// The scenario types whose buckets contain any of the event's paths.
fn affected_buckets(layout: &WorkspaceLayout, event: &NotifyEvent) -> Vec<ScenarioType> {
    let mut affected = Vec::new();
    for (scenario_type, _, dir) in layout.script_buckets() {
        if event.paths.iter().any(|p| path_is_under(p, &dir))
            && !affected.contains(&scenario_type)
        {
            affected.push(scenario_type);
        }
    }
    affected
}

fn path_is_under(path: &Path, dir: &Path) -> bool {
    let cp = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let cd = std::fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf());
    cp.starts_with(&cd)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_affected_buckets_maps_paths() {
        let layout = WorkspaceLayout::new("/srv/tool");
        let event = NotifyEvent::new(EventKind::Create(notify::event::CreateKind::File))
            .add_path("/srv/tool/scripts/chart/user/new_script.sh".into());
        assert_eq!(affected_buckets(&layout, &event), vec![ScenarioType::Chart]);
    }

    #[test]
    fn test_unrelated_path_affects_nothing() {
        let layout = WorkspaceLayout::new("/srv/tool");
        let event = NotifyEvent::new(EventKind::Create(notify::event::CreateKind::File))
            .add_path("/srv/tool/output/readme.txt".into());
        assert!(affected_buckets(&layout, &event).is_empty());
    }
}
