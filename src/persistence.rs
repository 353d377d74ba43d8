//! Persistence Layer
//!
//! Converts between the on-disk required file set and the in-memory
//! `ScenarioDocument`.
//!
//! A working directory holds `scenario_info.json` plus, depending on type,
//! `galaxy_chart.json` (chart) or `galaxy_chart_generator_params.json`
//! (generator), and `galaxy_chart_fillings.json` in both cases. The scenario
//! type is inferred from which layout file is present.
//!
//! Saves are all-or-nothing: the required file set is staged in a sibling
//! directory and the files are swapped into place one by one with the
//! previous versions held in a backup, so a failure at any step leaves the
//! target either fully in its pre-save state or fully in its post-save
//! state, never a mix. Files the tool does not own are left alone.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::document::{Link, Node, NodeId, PropertyValue, ScenarioDocument, ScenarioType};
use crate::error::{Result, ScenarioError};

/// Always present in a scenario working directory.
pub const SCENARIO_INFO_FILE: &str = "scenario_info.json";
/// Layout file defining a chart scenario.
pub const GALAXY_CHART_FILE: &str = "galaxy_chart.json";
/// Layout file defining a generator scenario.
pub const GENERATOR_PARAMS_FILE: &str = "galaxy_chart_generator_params.json";
/// Present in both scenario types.
pub const FILLINGS_FILE: &str = "galaxy_chart_fillings.json";

/// Required file names for a scenario type, bit-exact.
pub fn required_files(scenario_type: ScenarioType) -> [&'static str; 3] {
    [
        SCENARIO_INFO_FILE,
        layout_file(scenario_type),
        FILLINGS_FILE,
    ]
}

/// The type-defining layout file name.
pub fn layout_file(scenario_type: ScenarioType) -> &'static str {
    match scenario_type {
        ScenarioType::Chart => GALAXY_CHART_FILE,
        ScenarioType::Generator => GENERATOR_PARAMS_FILE,
    }
}

/// Infer the scenario type from which layout file exists in `dir`.
/// Both or neither present is a detection failure, not a guess.
pub fn detect_scenario_type(dir: &Path) -> Result<ScenarioType> {
    let chart = dir.join(GALAXY_CHART_FILE).is_file();
    let generator = dir.join(GENERATOR_PARAMS_FILE).is_file();
    match (chart, generator) {
        (true, false) => Ok(ScenarioType::Chart),
        (false, true) => Ok(ScenarioType::Generator),
        (true, true) => Err(ScenarioError::invalid_document(format!(
            "{} contains both {} and {}: scenario type is ambiguous",
            dir.display(),
            GALAXY_CHART_FILE,
            GENERATOR_PARAMS_FILE
        ))),
        (false, false) => Err(ScenarioError::invalid_document(format!(
            "{} contains neither {} nor {}",
            dir.display(),
            GALAXY_CHART_FILE,
            GENERATOR_PARAMS_FILE
        ))),
    }
}

// ============================================================================
// Wire format
// ============================================================================

/// On-disk shape of the layout file: `{ "root_nodes": [...], "phase_lanes":
/// [...], ...extra }`. Unmodelled top-level keys ride through `extra`.
#[derive(Debug, Serialize, Deserialize)]
struct LayoutWire {
    #[serde(default)]
    root_nodes: Vec<NodeWire>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    phase_lanes: Vec<LaneWire>,
    #[serde(flatten)]
    extra: serde_json::Map<String, Value>,
}

/// On-disk node: id, filling_name, optional position, nested children, and
/// an open property bag.
#[derive(Debug, Serialize, Deserialize)]
struct NodeWire {
    id: NodeId,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    filling_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    position: Option<[f64; 2]>,
    #[serde(flatten)]
    properties: serde_json::Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    child_nodes: Vec<NodeWire>,
}

#[derive(Debug, Serialize, Deserialize)]
struct LaneWire {
    id: u64,
    node_a: NodeId,
    node_b: NodeId,
}

// ============================================================================
// Load
// ============================================================================

/// Load and validate a working directory into a `ScenarioDocument`.
pub fn load(dir: &Path) -> Result<ScenarioDocument> {
    info!(dir = %dir.display(), "loading scenario working directory");
    let scenario_type = detect_scenario_type(dir)?;

    let info_value = read_json(&dir.join(SCENARIO_INFO_FILE))?;
    let Value::Object(info) = info_value else {
        return Err(ScenarioError::invalid_document(format!(
            "{} is not a JSON object",
            SCENARIO_INFO_FILE
        )));
    };
    let fillings = read_json(&dir.join(FILLINGS_FILE))?;

    let layout_path = dir.join(layout_file(scenario_type));
    let layout: LayoutWire = serde_json::from_value(read_json(&layout_path)?).map_err(|e| {
        ScenarioError::invalid_document(format!("{}: {}", layout_file(scenario_type), e))
    })?;

    let mut root_nodes = layout.root_nodes;
    if root_nodes.len() != 1 {
        return Err(ScenarioError::invalid_document(format!(
            "expected exactly one root node, found {}",
            root_nodes.len()
        )));
    }
    let root_wire = root_nodes.remove(0);

    let (root, root_children) = split_wire(root_wire);
    let mut doc = ScenarioDocument::new(scenario_type, root);
    doc.info = info;
    doc.fillings = fillings;
    doc.extra = layout.extra;
    let root_id = doc.root();
    attach_children(&mut doc, root_id, root_children)?;

    for lane in layout.phase_lanes {
        doc.insert_link_with_id(Link::new(lane.node_a, lane.node_b)?, lane.id)?;
    }

    doc.validate()?;
    debug!(
        nodes = doc.node_count(),
        links = doc.links().len(),
        scenario_type = %scenario_type,
        "scenario loaded"
    );
    Ok(doc)
}

/// Peel a wire node apart into a detached `Node` plus its child wires.
fn split_wire(wire: NodeWire) -> (Node, Vec<NodeWire>) {
    let NodeWire {
        id,
        filling_name,
        position,
        properties,
        child_nodes,
    } = wire;
    let mut node = Node::new(id, filling_name);
    if let Some([x, y]) = position {
        node = node.with_position(x, y);
    }
    for (key, value) in &properties {
        node = node.with_property(key.clone(), PropertyValue::from_json(value));
    }
    (node, child_nodes)
}

fn attach_children(
    doc: &mut ScenarioDocument,
    parent: NodeId,
    children: Vec<NodeWire>,
) -> Result<()> {
    for child_wire in children {
        let (node, grandchildren) = split_wire(child_wire);
        let id = doc.attach_child(parent, node)?;
        attach_children(doc, id, grandchildren)?;
    }
    Ok(())
}

fn read_json(path: &Path) -> Result<Value> {
    if !path.is_file() {
        return Err(ScenarioError::missing_file(path));
    }
    let content = fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|e| {
        ScenarioError::invalid_document(format!("{}: malformed JSON: {}", path.display(), e))
    })
}

// ============================================================================
// Save
// ============================================================================

/// Write the document's complete required file set to `target`.
///
/// The write is staged in a sibling directory, then each required file is
/// swapped in individually with its previous version moved to a backup. On
/// any failure the already-swapped files are rolled back. Files in the
/// target outside the required set are never touched.
pub fn save(doc: &ScenarioDocument, target: &Path) -> Result<()> {
    info!(target = %target.display(), "saving scenario");
    doc.validate()?;

    let files = render_files(doc)?;
    let staging = sibling_path(target, "staging");
    let backup = sibling_path(target, "backup");

    // Stale leftovers from an interrupted save are safe to discard.
    remove_if_present(&staging)
        .map_err(|e| ScenarioError::persistence(format!("clearing stale staging: {}", e)))?;
    remove_if_present(&backup)
        .map_err(|e| ScenarioError::persistence(format!("clearing stale backup: {}", e)))?;

    if let Err(e) = write_staging(&staging, &files) {
        let _ = fs::remove_dir_all(&staging);
        return Err(ScenarioError::persistence(format!(
            "staging write failed: {}",
            e
        )));
    }
    if let Err(e) = fs::create_dir_all(target).and_then(|_| fs::create_dir_all(&backup)) {
        let _ = fs::remove_dir_all(&staging);
        let _ = fs::remove_dir_all(&backup);
        return Err(ScenarioError::persistence(format!(
            "could not prepare target directory: {}",
            e
        )));
    }

    // Per-file swap, tracked so a mid-swap failure can be undone.
    let mut moved_aside: Vec<&'static str> = Vec::new();
    let mut installed: Vec<&'static str> = Vec::new();
    let mut failure: Option<std::io::Error> = None;
    for (name, _) in &files {
        let dest = target.join(name);
        if dest.exists() {
            if let Err(e) = fs::rename(&dest, backup.join(name)) {
                failure = Some(e);
                break;
            }
            moved_aside.push(name);
        }
        if let Err(e) = fs::rename(staging.join(name), &dest) {
            failure = Some(e);
            break;
        }
        installed.push(name);
    }

    if let Some(e) = failure {
        for name in installed {
            let _ = fs::remove_file(target.join(name));
        }
        for name in moved_aside {
            let _ = fs::rename(backup.join(name), target.join(name));
        }
        let _ = fs::remove_dir_all(&staging);
        let _ = fs::remove_dir_all(&backup);
        return Err(ScenarioError::persistence(format!(
            "could not move staged save into place: {}",
            e
        )));
    }
    let _ = fs::remove_dir_all(&staging);
    let _ = fs::remove_dir_all(&backup);

    debug!(files = files.len(), "scenario saved");
    Ok(())
}

fn write_staging(staging: &Path, files: &[(&'static str, String)]) -> std::io::Result<()> {
    fs::create_dir_all(staging)?;
    for (name, content) in files {
        fs::write(staging.join(name), content)?;
    }
    Ok(())
}

fn remove_if_present(path: &Path) -> std::io::Result<()> {
    if path.is_dir() {
        fs::remove_dir_all(path)
    } else if path.exists() {
        fs::remove_file(path)
    } else {
        Ok(())
    }
}

/// Sibling path used for staging/backup during a save, derived from the
/// target's own name so concurrent saves to different targets cannot collide.
fn sibling_path(target: &Path, role: &str) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "scenario".to_string());
    let sibling = format!(".{}.{}", name, role);
    match target.parent() {
        Some(parent) if parent.as_os_str().is_empty() => PathBuf::from(sibling),
        Some(parent) => parent.join(sibling),
        None => PathBuf::from(sibling),
    }
}

/// Serialize the full required file set. Pure; does not touch the disk.
fn render_files(doc: &ScenarioDocument) -> Result<Vec<(&'static str, String)>> {
    let layout = LayoutWire {
        root_nodes: vec![wire_from_node(doc, doc.root())],
        phase_lanes: doc
            .links()
            .iter()
            .map(|(link, &id)| {
                let (node_a, node_b) = link.endpoints();
                LaneWire { id, node_a, node_b }
            })
            .collect(),
        extra: doc.extra.clone(),
    };

    Ok(vec![
        (
            SCENARIO_INFO_FILE,
            pretty(&Value::Object(doc.info.clone()))?,
        ),
        (layout_file(doc.scenario_type()), pretty(&layout)?),
        (FILLINGS_FILE, pretty(&doc.fillings)?),
    ])
}

fn wire_from_node(doc: &ScenarioDocument, id: NodeId) -> NodeWire {
    // Caller guarantees `id` exists: the tree was validated before save.
    let node = doc.node(id).expect("validated tree contains every child id");
    NodeWire {
        id,
        filling_name: node.node_type.clone(),
        position: node.position(),
        properties: node
            .properties()
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect(),
        child_nodes: node
            .children()
            .iter()
            .map(|child| wire_from_node(doc, *child))
            .collect(),
    }
}

fn pretty<T: Serialize>(value: &T) -> Result<String> {
    let mut rendered = serde_json::to_string_pretty(value)?;
    rendered.push('\n');
    Ok(rendered)
}
