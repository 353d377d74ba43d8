//! Command-line interface definitions
//!
//! Subcommands operate on a scenario directory (`--dir`, default current
//! directory) except the script commands, which operate on a workspace base
//! (`--base`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::document::PropertyValue;

/// Scenario Tool - edit and transform galaxy scenario directories
#[derive(Parser)]
#[command(name = "scenario-tool")]
#[command(about = "Filter, mutate and transform galaxy scenario directories")]
#[command(version)]
pub struct Cli {
    /// Scenario directory to operate on
    #[arg(long, global = true, default_value = ".")]
    pub dir: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show a summary of the scenario in the directory
    Info,
    /// Load the scenario and report validation problems
    Validate,
    /// List the node ids matching filter conditions
    Filter {
        /// Condition like 'size > 7' or 'name contains gas'; repeatable
        #[arg(long = "where", value_name = "CONDITION")]
        conditions: Vec<String>,
        /// How conditions combine: and, or, nand, xor
        #[arg(long, default_value = "and")]
        combine: String,
    },
    /// Apply a mutation to targeted nodes and save the result in place
    Apply {
        #[command(subcommand)]
        operation: ApplyCommands,
    },
    /// List the transform scripts available in a workspace
    Scripts {
        /// Workspace base directory
        #[arg(long, default_value = ".")]
        base: PathBuf,
    },
    /// Run a transform script against the scenario directory
    RunScript {
        /// Script name (file stem) as listed by `scripts`
        name: String,
        /// Workspace base directory holding the script collections
        #[arg(long, default_value = ".")]
        base: PathBuf,
        /// Kill the script and roll back after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
    /// Save the scenario to another directory
    Save {
        /// Destination directory, replaced atomically
        output: PathBuf,
    },
}

#[derive(Subcommand)]
pub enum ApplyCommands {
    /// Set a property on each target, creating it if absent
    SetProperty {
        #[arg(short, long)]
        key: String,
        /// Typed by inference: integer, float, boolean, then text
        #[arg(short, long)]
        value: String,
        #[command(flatten)]
        targets: TargetArgs,
    },
    /// Set a property on each target; targets missing the key are skipped,
    /// or rejected up front with --strict
    ChangeProperty {
        #[arg(short, long)]
        key: String,
        #[arg(short, long)]
        value: String,
        /// Reject the whole batch if any target lacks the key
        #[arg(long)]
        strict: bool,
        #[command(flatten)]
        targets: TargetArgs,
    },
    /// Numerically adjust a property on each target
    Adjust {
        /// Arithmetic verb: add, multiply, divide or scale
        op: String,
        #[arg(short, long)]
        key: String,
        /// Numeric operand
        #[arg(short, long)]
        value: String,
        #[command(flatten)]
        targets: TargetArgs,
    },
    /// Reparent each target under a new parent node
    Move {
        #[arg(long)]
        new_parent: u64,
        #[command(flatten)]
        targets: TargetArgs,
    },
    /// Remove each target and its subtree, plus any lanes touching them
    Remove {
        #[command(flatten)]
        targets: TargetArgs,
    },
}

/// Target selection shared by every apply subcommand. At least one of
/// `--where` or `--target` is required; the filtered set and the explicit
/// ids union together.
#[derive(Debug, clap::Args)]
pub struct TargetArgs {
    /// Filter condition selecting targets; repeatable
    #[arg(long = "where", value_name = "CONDITION")]
    pub conditions: Vec<String>,

    /// How the conditions combine: and, or, nand, xor
    #[arg(long, default_value = "and")]
    pub combine: String,

    /// Explicit target node id; repeatable
    #[arg(long = "target", value_name = "NODE_ID")]
    pub ids: Vec<u64>,
}

impl TargetArgs {
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty() && self.ids.is_empty()
    }
}

/// Parse a CLI value literal with the same inference the filter parser
/// uses: integer, float, boolean, then text.
pub fn parse_value(raw: &str) -> PropertyValue {
    if let Ok(n) = raw.parse::<i64>() {
        PropertyValue::int(n)
    } else if let Ok(n) = raw.parse::<f64>() {
        PropertyValue::float(n)
    } else if let Ok(b) = raw.parse::<bool>() {
        PropertyValue::Bool(b)
    } else {
        PropertyValue::Text(raw.to_string())
    }
}

impl Cli {
    pub fn parse_args() -> Self {
        <Self as clap::Parser>::parse()
    }
}
