//! Registry of available transform scripts
//!
//! Transform units live in the workspace's script directories, separated by
//! scenario type and by source (user vs community). The registry indexes
//! them by (type, name) where the name is the file stem; user scripts
//! shadow community scripts of the same name.
//!
//! The registry itself is plain data. It is kept current either by explicit
//! rescans or by the directory watcher (`crate::watcher`), which owns an
//! `Arc<RwLock<ScriptRegistry>>` shared with the host.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::document::ScenarioType;
use crate::error::Result;
use crate::workspace::{ContentSource, WorkspaceLayout};

/// One discovered transform unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformScript {
    /// Registry name: the script file's stem.
    pub name: String,
    pub path: PathBuf,
    pub scenario_type: ScenarioType,
    pub source: ContentSource,
}

/// Index of every known transform script, keyed by scenario type and name.
#[derive(Debug, Default, Clone)]
pub struct ScriptRegistry {
    entries: BTreeMap<(ScenarioType, String), TransformScript>,
}

impl ScriptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan every script bucket of a workspace.
    pub fn discover(layout: &WorkspaceLayout) -> Result<Self> {
        let mut registry = Self::new();
        for scenario_type in [ScenarioType::Chart, ScenarioType::Generator] {
            registry.rescan(layout, scenario_type)?;
        }
        Ok(registry)
    }

    /// Re-scan both sources for one scenario type, replacing that slice of
    /// the registry. Community is scanned first so user entries shadow it.
    pub fn rescan(&mut self, layout: &WorkspaceLayout, scenario_type: ScenarioType) -> Result<usize> {
        self.entries.retain(|(ty, _), _| *ty != scenario_type);
        let mut count = 0;
        for source in [ContentSource::Community, ContentSource::User] {
            let dir = layout.scripts_dir(scenario_type, source);
            count += self.scan_dir(&dir, scenario_type, source)?;
        }
        debug!(scenario_type = %scenario_type, scripts = count, "script bucket rescanned");
        Ok(count)
    }

    fn scan_dir(
        &mut self,
        dir: &Path,
        scenario_type: ScenarioType,
        source: ContentSource,
    ) -> Result<usize> {
        if !dir.is_dir() {
            return Ok(0);
        }
        let mut count = 0;
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            let script = TransformScript {
                name: name.to_string(),
                path: path.clone(),
                scenario_type,
                source,
            };
            // Later sources win: community is scanned before user.
            self.entries
                .insert((scenario_type, name.to_string()), script);
            count += 1;
        }
        Ok(count)
    }

    pub fn get(&self, scenario_type: ScenarioType, name: &str) -> Option<&TransformScript> {
        self.entries.get(&(scenario_type, name.to_string()))
    }

    /// Scripts applicable to one scenario type, in name order.
    pub fn scripts_for(
        &self,
        scenario_type: ScenarioType,
    ) -> impl Iterator<Item = &TransformScript> {
        self.entries
            .iter()
            .filter(move |((ty, _), _)| *ty == scenario_type)
            .map(|(_, script)| script)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
