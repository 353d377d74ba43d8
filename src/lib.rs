//! Scenario Tool Library
//!
//! Core functionality for editing galaxy scenario directories: an in-memory
//! document model, a pure filter engine, a batch mutation engine, transform
//! script execution with rollback, and staged atomic persistence.

pub mod batch;
pub mod cli;
pub mod document;
pub mod error;
pub mod filter;
pub mod persistence;
pub mod registry;
pub mod script_runner;
pub mod watcher;
pub mod workspace;

// Re-export main types for convenience
pub use batch::{
    apply_batch, ArithmeticOp, BatchMode, BatchOperation, BatchOutcome, BatchSkip, SkipReason,
};
pub use document::{Link, Node, NodeId, PropertyValue, ScenarioDocument, ScenarioType};
pub use error::{Result, ScenarioError};
pub use filter::{ComparisonOp, FilterCombine, FilterCondition, FilterSet};
pub use registry::{ScriptRegistry, TransformScript};
pub use script_runner::{run_transform, TransformOptions, TransformReport};
pub use watcher::RegistryWatcher;
pub use workspace::{ContentSource, WorkspaceLayout};
