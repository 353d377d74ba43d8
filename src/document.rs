//! Scenario Document Model
//!
//! Typed in-memory representation of a chart or generator scenario: the node
//! tree, the wormhole/phase-lane link set, and the opaque metadata documents
//! that ride along unchanged (`scenario_info.json`, the fillings file).
//!
//! # Invariants
//!
//! - Node ids are unique across the whole document and never reused after a
//!   deletion within a session (`next_node_id` only moves forward).
//! - The parent/children relation forms a single tree rooted at exactly one
//!   node; no node is its own ancestor.
//! - Every link references two existing node ids; links are undirected and
//!   stored as normalized pairs, so each unordered pair appears at most once.
//! - Required per-type node fields are present (see `validate`).
//!
//! All mutation goes through the batch engine (`crate::batch`) or a full
//! reload through the persistence layer; the fields that would let callers
//! bypass those paths are crate-private.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use strum::{Display, EnumString};

use crate::error::{Result, ScenarioError};

/// Stable node identifier, unique within a document.
pub type NodeId = u64;

/// The two scenario authoring modes, distinguished by which layout file
/// defines the galaxy (explicit chart vs generated).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ScenarioType {
    Chart,
    Generator,
}

// ============================================================================
// Property Values
// ============================================================================

/// A node property value.
///
/// The property schema is data-driven, not fixed at compile time, so this is
/// a small closed variant type rather than an open dynamic one. `Null` and
/// `List` exist only so arbitrary scenario JSON survives a round trip.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Null,
    /// Wraps `serde_json::Number` so integers survive a round trip untouched.
    Number(serde_json::Number),
    Text(String),
    Bool(bool),
    List(Vec<PropertyValue>),
    Map(BTreeMap<String, PropertyValue>),
}

impl PropertyValue {
    /// Numeric value from an integer literal.
    pub fn int(n: i64) -> Self {
        Self::Number(serde_json::Number::from(n))
    }

    /// Numeric value from a float. Non-finite floats degrade to `Null`,
    /// matching what `serde_json` would emit for them.
    pub fn float(n: f64) -> Self {
        serde_json::Number::from_f64(n)
            .map(Self::Number)
            .unwrap_or(Self::Null)
    }

    /// Convert from raw JSON. Lossless for everything a scenario file can hold.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => Self::Number(n.clone()),
            Value::String(s) => Self::Text(s.clone()),
            Value::Array(items) => Self::List(items.iter().map(Self::from_json).collect()),
            Value::Object(map) => Self::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convert back to raw JSON for persistence.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Number(n) => Value::Number(n.clone()),
            Self::Text(s) => Value::String(s.clone()),
            Self::List(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Map(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    /// Numeric view: numbers directly, numeric strings parsed.
    ///
    /// Scenario files are hand-edited and community-authored, so "5" and 5
    /// must compare equal under the numeric operators.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => n.as_f64(),
            Self::Text(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Text(s) => write!(f, "{}", s),
            Self::Number(n) => write!(f, "{}", n),
            Self::List(_) | Self::Map(_) => write!(f, "{}", self.to_json()),
        }
    }
}

// ============================================================================
// Links
// ============================================================================

/// An undirected wormhole/phase-lane link between two nodes.
///
/// Stored normalized (`a < b`) so the unordered pair appears at most once in
/// the document's link set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Link {
    a: NodeId,
    b: NodeId,
}

impl Link {
    /// Build a normalized link. Self-links are structurally invalid.
    pub fn new(x: NodeId, y: NodeId) -> Result<Self> {
        if x == y {
            return Err(ScenarioError::invalid_document(format!(
                "link connects node {} to itself",
                x
            )));
        }
        Ok(Self {
            a: x.min(y),
            b: x.max(y),
        })
    }

    pub fn endpoints(&self) -> (NodeId, NodeId) {
        (self.a, self.b)
    }

    /// True if either endpoint is `id`.
    pub fn touches(&self, id: NodeId) -> bool {
        self.a == id || self.b == id
    }
}

// ============================================================================
// Nodes
// ============================================================================

/// An entity in the galaxy graph (star, planet, phase-lane junction, ...).
///
/// `children` is the authoritative ownership edge: a child's lifetime is
/// bound to its parent. `parent` is the back-reference, `None` only for the
/// single root node.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    /// Open per-scenario-type kind string (wire name `filling_name`).
    pub node_type: String,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    /// 2D layout coordinate. Generator scenarios may omit it.
    pub(crate) position: Option<[f64; 2]>,
    pub(crate) properties: BTreeMap<String, PropertyValue>,
}

impl Node {
    /// Create a detached node. It becomes part of a document through
    /// `ScenarioDocument::new` (as root) or `attach_child`.
    pub fn new(id: NodeId, node_type: impl Into<String>) -> Self {
        Self {
            id,
            node_type: node_type.into(),
            parent: None,
            children: Vec::new(),
            position: None,
            properties: BTreeMap::new(),
        }
    }

    pub fn with_position(mut self, x: f64, y: f64) -> Self {
        self.position = Some([x, y]);
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: PropertyValue) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Ordered child ids.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn position(&self) -> Option<[f64; 2]> {
        self.position
    }

    pub fn properties(&self) -> &BTreeMap<String, PropertyValue> {
        &self.properties
    }

    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }
}

// ============================================================================
// Document
// ============================================================================

/// Root aggregate: one loaded scenario.
///
/// Owns all nodes exclusively. Created by the persistence layer (loading a
/// working directory) or `ScenarioDocument::new` (fresh template); mutated in
/// place only by the batch engine; replaced wholesale after a script runs.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioDocument {
    scenario_type: ScenarioType,
    /// `scenario_info.json` contents, passed through unchanged.
    pub info: serde_json::Map<String, Value>,
    /// `galaxy_chart_fillings.json` contents, passed through unchanged.
    pub fillings: Value,
    /// Unmodelled top-level keys of the layout file, passed through unchanged.
    pub extra: serde_json::Map<String, Value>,
    pub(crate) root: NodeId,
    pub(crate) nodes: BTreeMap<NodeId, Node>,
    /// Normalized link pair to its wire lane id, kept stable across a
    /// load/save round trip.
    pub(crate) links: BTreeMap<Link, u64>,
    pub(crate) next_node_id: NodeId,
}

impl ScenarioDocument {
    /// Create a fresh single-node document (template instantiation path).
    pub fn new(scenario_type: ScenarioType, root: Node) -> Self {
        let root_id = root.id;
        let next_node_id = root_id + 1;
        let mut nodes = BTreeMap::new();
        nodes.insert(root_id, root);
        Self {
            scenario_type,
            info: serde_json::Map::new(),
            fillings: Value::Object(serde_json::Map::new()),
            extra: serde_json::Map::new(),
            root: root_id,
            nodes,
            links: BTreeMap::new(),
            next_node_id,
        }
    }

    pub fn scenario_type(&self) -> ScenarioType {
        self.scenario_type
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn links(&self) -> &BTreeMap<Link, u64> {
        &self.links
    }

    /// Attach a detached node under `parent`. The node keeps its id; ids
    /// must be unique within the document.
    pub fn attach_child(&mut self, parent: NodeId, node: Node) -> Result<NodeId> {
        if self.nodes.contains_key(&node.id) {
            return Err(ScenarioError::invalid_document(format!(
                "duplicate node id {}",
                node.id
            )));
        }
        if !self.nodes.contains_key(&parent) {
            return Err(ScenarioError::invalid_document(format!(
                "parent node {} does not exist",
                parent
            )));
        }
        let id = node.id;
        let mut node = node;
        node.parent = Some(parent);
        self.next_node_id = self.next_node_id.max(id + 1);
        self.nodes.insert(id, node);
        self.nodes
            .get_mut(&parent)
            .map(|p| p.children.push(id));
        Ok(id)
    }

    /// Register a phase lane between two existing nodes, assigning the next
    /// free lane id.
    pub fn insert_link(&mut self, link: Link) -> Result<()> {
        let next = self.links.values().max().map_or(0, |id| id + 1);
        self.insert_link_with_id(link, next)
    }

    /// Register a phase lane carrying an explicit lane id (the load path).
    /// An already-present pair keeps its original id.
    pub fn insert_link_with_id(&mut self, link: Link, id: u64) -> Result<()> {
        let (a, b) = link.endpoints();
        if !self.nodes.contains_key(&a) || !self.nodes.contains_key(&b) {
            return Err(ScenarioError::invalid_document(format!(
                "link {}-{} references a missing node",
                a, b
            )));
        }
        self.links.entry(link).or_insert(id);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Tree queries
    // ------------------------------------------------------------------

    /// Ancestor chain of `id`, nearest first, root last. Empty for the root
    /// or for an unknown id.
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cursor = self.nodes.get(&id).and_then(|n| n.parent);
        while let Some(parent) = cursor {
            // Walking more edges than nodes means corrupted parentage.
            if out.len() > self.nodes.len() {
                break;
            }
            out.push(parent);
            cursor = self.nodes.get(&parent).and_then(|n| n.parent);
        }
        out
    }

    /// Preorder ids of the subtree rooted at `id`, including `id` itself.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.get(&current) {
                out.push(current);
                for child in node.children.iter().rev() {
                    stack.push(*child);
                }
            }
        }
        out
    }

    /// True if `ancestor` appears on the parent chain of `id`.
    pub fn is_ancestor_of(&self, ancestor: NodeId, id: NodeId) -> bool {
        self.ancestors(id).contains(&ancestor)
    }

    // ------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------

    /// Check every structural invariant. Run after load and after a script
    /// rewrites the working directory; the batch engine keeps these true
    /// incrementally so it does not re-run this per mutation.
    pub fn validate(&self) -> Result<()> {
        let root = self
            .nodes
            .get(&self.root)
            .ok_or_else(|| ScenarioError::invalid_document("root node missing from node map"))?;
        if root.parent.is_some() {
            return Err(ScenarioError::invalid_document("root node has a parent"));
        }

        for node in self.nodes.values() {
            if node.id != self.root && node.parent.is_none() {
                return Err(ScenarioError::invalid_document(format!(
                    "node {} has no parent but is not the root",
                    node.id
                )));
            }
            if let Some(parent) = node.parent {
                let parent_node = self.nodes.get(&parent).ok_or_else(|| {
                    ScenarioError::invalid_document(format!(
                        "node {} references missing parent {}",
                        node.id, parent
                    ))
                })?;
                if !parent_node.children.contains(&node.id) {
                    return Err(ScenarioError::invalid_document(format!(
                        "node {} is not listed among the children of its parent {}",
                        node.id, parent
                    )));
                }
            }

            let mut seen = BTreeSet::new();
            for child in &node.children {
                if !seen.insert(*child) {
                    return Err(ScenarioError::invalid_document(format!(
                        "node {} lists child {} twice",
                        node.id, child
                    )));
                }
                let child_node = self.nodes.get(child).ok_or_else(|| {
                    ScenarioError::invalid_document(format!(
                        "node {} lists missing child {}",
                        node.id, child
                    ))
                })?;
                if child_node.parent != Some(node.id) {
                    return Err(ScenarioError::invalid_document(format!(
                        "child {} does not point back at parent {}",
                        child, node.id
                    )));
                }
            }

            // Acyclic parentage: the ancestor walk must terminate at the root.
            let ancestors = self.ancestors(node.id);
            if ancestors.contains(&node.id) {
                return Err(ScenarioError::invalid_document(format!(
                    "node {} is its own ancestor",
                    node.id
                )));
            }
            if node.id != self.root && ancestors.last() != Some(&self.root) {
                return Err(ScenarioError::invalid_document(format!(
                    "node {} is not reachable from the root",
                    node.id
                )));
            }

            self.check_required_fields(node)?;
        }

        for link in self.links.keys() {
            let (a, b) = link.endpoints();
            if !self.nodes.contains_key(&a) || !self.nodes.contains_key(&b) {
                return Err(ScenarioError::invalid_document(format!(
                    "link {}-{} references a missing node",
                    a, b
                )));
            }
        }

        Ok(())
    }

    /// Required-field lookup per scenario type. A table, not a hierarchy:
    /// chart nodes are placed explicitly so they need a position, generator
    /// nodes are laid out by the game and may omit it.
    fn check_required_fields(&self, node: &Node) -> Result<()> {
        if node.node_type.is_empty() {
            return Err(ScenarioError::invalid_document(format!(
                "node {} has no filling_name",
                node.id
            )));
        }
        match self.scenario_type {
            ScenarioType::Chart => {
                if node.position.is_none() {
                    return Err(ScenarioError::invalid_document(format!(
                        "chart node {} has no position",
                        node.id
                    )));
                }
            }
            ScenarioType::Generator => {}
        }
        Ok(())
    }
}
