//! Tests for the script directory watcher
//!
//! A script dropped into a watched bucket must show up in the shared
//! registry without a rescan being requested, and disappear again when the
//! file is deleted. Polling with a generous deadline keeps these stable on
//! slow filesystems.

use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use scenario_tool::{ContentSource, RegistryWatcher, ScenarioType, WorkspaceLayout};

fn touch(path: &Path) {
    fs::write(path, "#!/bin/sh\nexit 0\n").unwrap();
}

/// Poll until the predicate holds or the deadline passes.
fn wait_for(deadline: Duration, mut pred: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if pred() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    pred()
}

#[test]
fn test_watcher_tracks_script_lifecycle() {
    let tmp = TempDir::new().unwrap();
    let layout = WorkspaceLayout::new(tmp.path());
    layout.ensure().unwrap();

    let watcher = RegistryWatcher::spawn(layout.clone()).unwrap();
    let registry = watcher.registry();
    assert!(registry.read().unwrap().is_empty());

    let script = layout
        .scripts_dir(ScenarioType::Chart, ContentSource::User)
        .join("late_arrival.sh");
    touch(&script);

    assert!(
        wait_for(Duration::from_secs(10), || {
            registry
                .read()
                .unwrap()
                .get(ScenarioType::Chart, "late_arrival")
                .is_some()
        }),
        "added script never appeared in the registry"
    );

    fs::remove_file(&script).unwrap();
    assert!(
        wait_for(Duration::from_secs(10), || {
            registry
                .read()
                .unwrap()
                .get(ScenarioType::Chart, "late_arrival")
                .is_none()
        }),
        "removed script never left the registry"
    );
}

#[test]
fn test_watcher_spawn_seeds_registry_from_existing_scripts() {
    let tmp = TempDir::new().unwrap();
    let layout = WorkspaceLayout::new(tmp.path());
    layout.ensure().unwrap();
    touch(
        &layout
            .scripts_dir(ScenarioType::Generator, ContentSource::Community)
            .join("preexisting.sh"),
    );

    let watcher = RegistryWatcher::spawn(layout).unwrap();
    let registry = watcher.registry();
    assert!(registry
        .read()
        .unwrap()
        .get(ScenarioType::Generator, "preexisting")
        .is_some());
}
