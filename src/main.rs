//! Scenario Tool - Main entry point

use std::collections::BTreeSet;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use scenario_tool::cli::{parse_value, ApplyCommands, Cli, Commands, TargetArgs};
use scenario_tool::{
    apply_batch, persistence, run_transform, ArithmeticOp, BatchMode, BatchOperation,
    FilterCombine, FilterCondition, FilterSet, NodeId, ScenarioDocument, ScriptRegistry,
    TransformOptions, WorkspaceLayout,
};

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse_args();
    debug!(dir = %cli.dir.display(), "command line parsed");

    match cli.command {
        Commands::Info => {
            let doc = persistence::load(&cli.dir)?;
            print_info(&doc);
        }
        Commands::Validate => {
            // load() validates the document on the way in.
            let doc = persistence::load(&cli.dir)?;
            println!(
                "✓ Valid {} scenario ({} nodes)",
                doc.scenario_type(),
                doc.node_count()
            );
        }
        Commands::Filter {
            conditions,
            combine,
        } => {
            let doc = persistence::load(&cli.dir)?;
            let filter = build_filter(&conditions, &combine)?;
            for id in filter.matching(&doc) {
                println!("{}", id);
            }
        }
        Commands::Apply { operation } => {
            run_apply(&cli.dir, operation)?;
        }
        Commands::Scripts { base } => {
            let layout = WorkspaceLayout::new(base);
            let registry = ScriptRegistry::discover(&layout)?;
            if registry.is_empty() {
                println!("no transform scripts found");
            }
            for scenario_type in [
                scenario_tool::ScenarioType::Chart,
                scenario_tool::ScenarioType::Generator,
            ] {
                for script in registry.scripts_for(scenario_type) {
                    println!("{}/{} ({})", scenario_type, script.name, script.source);
                }
            }
        }
        Commands::RunScript {
            name,
            base,
            timeout_secs,
        } => {
            let scenario_type = persistence::detect_scenario_type(&cli.dir)?;
            let layout = WorkspaceLayout::new(base);
            let registry = ScriptRegistry::discover(&layout)?;
            let script = registry
                .get(scenario_type, &name)
                .with_context(|| format!("no {} script named '{}'", scenario_type, name))?;
            let options = TransformOptions {
                timeout: timeout_secs.map(Duration::from_secs),
            };
            let report = run_transform(script, &cli.dir, &options)?;
            info!(
                script = %report.script,
                elapsed_ms = report.duration.as_millis() as u64,
                "transform complete"
            );
            if !report.stdout.is_empty() {
                print!("{}", report.stdout);
            }
            println!(
                "✓ {} applied ({} nodes after transform)",
                report.script,
                report.document.node_count()
            );
        }
        Commands::Save { output } => {
            let doc = persistence::load(&cli.dir)?;
            persistence::save(&doc, &output)?;
            println!("✓ Saved to {}", output.display());
        }
    }

    Ok(())
}

fn print_info(doc: &ScenarioDocument) {
    println!("type:  {}", doc.scenario_type());
    println!("nodes: {}", doc.node_count());
    println!("lanes: {}", doc.links().len());
    println!("root:  {}", doc.root());
}

fn build_filter(conditions: &[String], combine: &str) -> Result<FilterSet> {
    let combine: FilterCombine = combine
        .parse()
        .map_err(|_| anyhow::anyhow!("unknown combine mode '{}' (and, or, nand, xor)", combine))?;
    let parsed: std::result::Result<Vec<FilterCondition>, _> =
        conditions.iter().map(|c| c.parse()).collect();
    Ok(FilterSet::new(parsed?).with_combine(combine))
}

/// Resolve target ids: nodes matching every `--where` condition, unioned
/// with every explicit `--target` id.
fn resolve_targets(doc: &ScenarioDocument, targets: &TargetArgs) -> Result<BTreeSet<NodeId>> {
    if targets.is_empty() {
        bail!("no targets: pass at least one --where condition or --target id");
    }
    let mut ids: BTreeSet<NodeId> = targets.ids.iter().copied().collect();
    if !targets.conditions.is_empty() {
        let filter = build_filter(&targets.conditions, &targets.combine)?;
        ids.extend(filter.matching(doc));
    }
    Ok(ids)
}

fn run_apply(dir: &std::path::Path, operation: ApplyCommands) -> Result<()> {
    let mut doc = persistence::load(dir)?;

    let (op, targets, mode) = match operation {
        ApplyCommands::SetProperty {
            key,
            value,
            targets,
        } => (
            BatchOperation::AddProperty {
                key,
                value: parse_value(&value),
            },
            targets,
            BatchMode::Lenient,
        ),
        ApplyCommands::ChangeProperty {
            key,
            value,
            strict,
            targets,
        } => (
            BatchOperation::ChangeProperty {
                key,
                value: parse_value(&value),
            },
            targets,
            if strict {
                BatchMode::Strict
            } else {
                BatchMode::Lenient
            },
        ),
        ApplyCommands::Adjust {
            op,
            key,
            value,
            targets,
        } => {
            let op: ArithmeticOp = op
                .parse()
                .map_err(|_| anyhow::anyhow!("unknown adjust verb '{}' (add, multiply, divide, scale)", op))?;
            (
                BatchOperation::Arithmetic {
                    key,
                    op,
                    operand: parse_value(&value),
                },
                targets,
                BatchMode::Lenient,
            )
        }
        ApplyCommands::Move {
            new_parent,
            targets,
        } => (
            BatchOperation::MoveNode { new_parent },
            targets,
            BatchMode::Lenient,
        ),
        ApplyCommands::Remove { targets } => {
            (BatchOperation::RemoveNode, targets, BatchMode::Lenient)
        }
    };

    let target_ids = resolve_targets(&doc, &targets)?;
    let outcome = apply_batch(&mut doc, &op, &target_ids, mode)?;
    persistence::save(&doc, dir)?;
    println!("{}", outcome.summary());
    Ok(())
}
