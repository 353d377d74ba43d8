//! Workspace directory layout
//!
//! The tool operates out of a base directory holding script and template
//! collections plus the editable working directories:
//!
//! ```text
//! <base>/scripts/{chart,generator}/{user,community}
//! <base>/templates/{user,community}/{chart,generator}
//! <base>/working/{chart,generator}
//! <base>/output
//! ```
//!
//! User content and community content (refreshed by an external sync
//! collaborator) are kept apart; user entries shadow community entries of
//! the same name.

use std::fs;
use std::path::{Path, PathBuf};
use strum::{Display, EnumString};
use tracing::debug;

use crate::document::ScenarioType;
use crate::error::{Result, ScenarioError};

/// Where a script or template came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum ContentSource {
    User,
    Community,
}

/// Resolved paths for one workspace base directory.
#[derive(Debug, Clone)]
pub struct WorkspaceLayout {
    base: PathBuf,
}

impl WorkspaceLayout {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Where finished scenarios are written by default.
    pub fn output_dir(&self) -> PathBuf {
        self.base.join("output")
    }

    /// Editable working directory for a scenario type.
    pub fn working_dir(&self, scenario_type: ScenarioType) -> PathBuf {
        self.base.join("working").join(scenario_type.to_string())
    }

    /// Transform script directory for one (type, source) bucket.
    pub fn scripts_dir(&self, scenario_type: ScenarioType, source: ContentSource) -> PathBuf {
        self.base
            .join("scripts")
            .join(scenario_type.to_string())
            .join(source.to_string())
    }

    /// Template directory, mirrored by scenario type under each source.
    pub fn templates_dir(&self, source: ContentSource, scenario_type: ScenarioType) -> PathBuf {
        self.base
            .join("templates")
            .join(source.to_string())
            .join(scenario_type.to_string())
    }

    /// Every script bucket, in shadowing order: community first, user last,
    /// so later entries win when merged into a registry.
    pub fn script_buckets(&self) -> Vec<(ScenarioType, ContentSource, PathBuf)> {
        let mut buckets = Vec::new();
        for scenario_type in [ScenarioType::Chart, ScenarioType::Generator] {
            for source in [ContentSource::Community, ContentSource::User] {
                buckets.push((
                    scenario_type,
                    source,
                    self.scripts_dir(scenario_type, source),
                ));
            }
        }
        buckets
    }

    /// Create the full directory tree. Idempotent.
    pub fn ensure(&self) -> Result<()> {
        let mut dirs = vec![self.output_dir()];
        for scenario_type in [ScenarioType::Chart, ScenarioType::Generator] {
            dirs.push(self.working_dir(scenario_type));
            for source in [ContentSource::User, ContentSource::Community] {
                dirs.push(self.scripts_dir(scenario_type, source));
                dirs.push(self.templates_dir(source, scenario_type));
            }
        }
        for dir in dirs {
            fs::create_dir_all(&dir).map_err(|e| {
                ScenarioError::workspace(format!("cannot create {}: {}", dir.display(), e))
            })?;
        }
        debug!(base = %self.base.display(), "workspace layout ensured");
        Ok(())
    }
}
