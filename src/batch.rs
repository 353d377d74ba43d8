//! Batch Operation Engine
//!
//! Applies add/change/arithmetic/move/remove mutations to a target node set as one
//! logical edit. This is the sole mutation gateway for the in-memory model:
//! the document's structural fields are crate-private, so callers cannot
//! bypass it.
//!
//! Atomicity is per-operation targeting the announced node set: per-node
//! rejections (a missing property, a move that would create a cycle) are
//! collected in the result summary and do not roll back unrelated successful
//! sub-operations. The document is left reflecting exactly the successful
//! subset, and callers read the summary to learn what that subset was.

use std::collections::BTreeSet;
use std::fmt;
use strum::{Display, EnumString};

use crate::document::{NodeId, PropertyValue, ScenarioDocument};
use crate::error::{Result, ScenarioError};

/// Numeric update verb for `BatchOperation::Arithmetic`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum ArithmeticOp {
    /// `value + operand`.
    Add,
    /// `value * operand`.
    Multiply,
    /// `value / operand`. A zero operand skips every target.
    Divide,
    /// `value * operand` with the operand read as a bare scale factor.
    Scale,
}

/// The mutation to apply to every node in the target set.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOperation {
    /// Set `properties[key] = value`, creating the key if absent.
    AddProperty { key: String, value: PropertyValue },
    /// Set `properties[key] = value`; the key must already exist.
    ChangeProperty { key: String, value: PropertyValue },
    /// Numerically update `properties[key]`. The key must exist and hold a
    /// number (or numeric string); anything else is a per-node skip.
    Arithmetic {
        key: String,
        op: ArithmeticOp,
        operand: PropertyValue,
    },
    /// Reparent each target under `new_parent`.
    MoveNode { new_parent: NodeId },
    /// Delete each target and its whole subtree, plus any links touching it.
    RemoveNode,
}

impl fmt::Display for BatchOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AddProperty { key, value } => write!(f, "add_property {}={}", key, value),
            Self::ChangeProperty { key, value } => write!(f, "change_property {}={}", key, value),
            Self::Arithmetic { key, op, operand } => write!(f, "{} {} by {}", op, key, operand),
            Self::MoveNode { new_parent } => write!(f, "move_node -> {}", new_parent),
            Self::RemoveNode => write!(f, "remove_node"),
        }
    }
}

/// How `ChangeProperty` treats a target missing the key.
///
/// Lenient (the default) records a per-node skip; strict rejects the whole
/// batch up front, before mutating anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchMode {
    #[default]
    Lenient,
    Strict,
}

/// Why one target was skipped. Data, not an error: skips never abort the
/// batch in lenient mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NodeNotFound,
    PropertyMissing { key: String },
    ParentNotFound { parent: NodeId },
    CycleRejected { new_parent: NodeId },
    CannotRemoveRoot,
    /// The target was already deleted by an earlier target's subtree removal
    /// within the same batch.
    AlreadyRemoved,
    /// The property exists but holds a non-numeric value.
    NotNumeric { key: String },
    /// The divisor operand is zero.
    ZeroDivisor,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NodeNotFound => write!(f, "node does not exist"),
            Self::PropertyMissing { key } => write!(f, "property '{}' is absent", key),
            Self::ParentNotFound { parent } => {
                write!(f, "new parent {} does not exist", parent)
            }
            Self::CycleRejected { new_parent } => write!(
                f,
                "moving under {} would create an ancestry cycle",
                new_parent
            ),
            Self::CannotRemoveRoot => write!(f, "cannot remove root"),
            Self::AlreadyRemoved => write!(f, "already removed earlier in this batch"),
            Self::NotNumeric { key } => write!(f, "property '{}' is not numeric", key),
            Self::ZeroDivisor => write!(f, "cannot divide by zero"),
        }
    }
}

/// One skipped target with its reason.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchSkip {
    pub node: NodeId,
    pub reason: SkipReason,
}

/// Structured result of one batch: how many targets mutated, how many
/// skipped, and the per-node reasons.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchOutcome {
    pub applied: usize,
    pub skipped: usize,
    pub skips: Vec<BatchSkip>,
}

impl BatchOutcome {
    fn apply(&mut self) {
        self.applied += 1;
    }

    fn skip(&mut self, node: NodeId, reason: SkipReason) {
        self.skipped += 1;
        self.skips.push(BatchSkip { node, reason });
    }

    /// One-line summary for logging/display.
    pub fn summary(&self) -> String {
        if self.skips.is_empty() {
            format!("{} node(s) changed", self.applied)
        } else {
            let reasons: Vec<String> = self
                .skips
                .iter()
                .map(|s| format!("{}: {}", s.node, s.reason))
                .collect();
            format!(
                "{} node(s) changed, {} skipped ({})",
                self.applied,
                self.skipped,
                reasons.join("; ")
            )
        }
    }
}

/// Apply `op` to every node in `targets`.
///
/// Targets are visited in ascending id order, so re-evaluated checks (move
/// ancestry, removal cascades) are deterministic. Only a strict-mode
/// `ChangeProperty` violation returns `Err`; everything else is reported in
/// the outcome.
pub fn apply_batch(
    doc: &mut ScenarioDocument,
    op: &BatchOperation,
    targets: &BTreeSet<NodeId>,
    mode: BatchMode,
) -> Result<BatchOutcome> {
    tracing::info!(operation = %op, targets = targets.len(), "applying batch operation");

    let outcome = match op {
        BatchOperation::AddProperty { key, value } => add_property(doc, targets, key, value),
        BatchOperation::ChangeProperty { key, value } => {
            change_property(doc, targets, key, value, mode)?
        }
        BatchOperation::Arithmetic { key, op, operand } => {
            arithmetic(doc, targets, key, *op, operand)?
        }
        BatchOperation::MoveNode { new_parent } => move_nodes(doc, targets, *new_parent),
        BatchOperation::RemoveNode => remove_nodes(doc, targets),
    };

    tracing::info!(summary = %outcome.summary(), "batch operation finished");
    Ok(outcome)
}

fn add_property(
    doc: &mut ScenarioDocument,
    targets: &BTreeSet<NodeId>,
    key: &str,
    value: &PropertyValue,
) -> BatchOutcome {
    let mut outcome = BatchOutcome::default();
    for &id in targets {
        match doc.nodes.get_mut(&id) {
            Some(node) => {
                node.properties.insert(key.to_string(), value.clone());
                outcome.apply();
            }
            None => outcome.skip(id, SkipReason::NodeNotFound),
        }
    }
    outcome
}

fn change_property(
    doc: &mut ScenarioDocument,
    targets: &BTreeSet<NodeId>,
    key: &str,
    value: &PropertyValue,
    mode: BatchMode,
) -> Result<BatchOutcome> {
    if mode == BatchMode::Strict {
        // Pre-validate so a strict failure leaves the document untouched.
        for &id in targets {
            let node = doc.node(id).ok_or_else(|| {
                ScenarioError::batch(format!("strict change_property: node {} does not exist", id))
            })?;
            if node.property(key).is_none() {
                return Err(ScenarioError::batch(format!(
                    "strict change_property: node {} has no property '{}'",
                    id, key
                )));
            }
        }
    }

    let mut outcome = BatchOutcome::default();
    for &id in targets {
        match doc.nodes.get_mut(&id) {
            Some(node) => {
                if node.properties.contains_key(key) {
                    node.properties.insert(key.to_string(), value.clone());
                    outcome.apply();
                } else {
                    outcome.skip(
                        id,
                        SkipReason::PropertyMissing {
                            key: key.to_string(),
                        },
                    );
                }
            }
            None => outcome.skip(id, SkipReason::NodeNotFound),
        }
    }
    Ok(outcome)
}

fn arithmetic(
    doc: &mut ScenarioDocument,
    targets: &BTreeSet<NodeId>,
    key: &str,
    op: ArithmeticOp,
    operand: &PropertyValue,
) -> Result<BatchOutcome> {
    // A non-numeric operand is a caller mistake, not a per-node condition.
    let operand_f = operand.as_number().ok_or_else(|| {
        ScenarioError::batch(format!("{} needs a numeric operand, got '{}'", op, operand))
    })?;
    let operand_i = match operand {
        PropertyValue::Number(n) => n.as_i64(),
        _ => None,
    };

    let mut outcome = BatchOutcome::default();
    for &id in targets {
        let Some(node) = doc.nodes.get_mut(&id) else {
            outcome.skip(id, SkipReason::NodeNotFound);
            continue;
        };
        let Some(current) = node.properties.get(key) else {
            outcome.skip(
                id,
                SkipReason::PropertyMissing {
                    key: key.to_string(),
                },
            );
            continue;
        };
        let Some(current_f) = current.as_number() else {
            outcome.skip(
                id,
                SkipReason::NotNumeric {
                    key: key.to_string(),
                },
            );
            continue;
        };
        if op == ArithmeticOp::Divide && operand_f == 0.0 {
            tracing::warn!(node = id, key, "cannot divide by zero");
            outcome.skip(id, SkipReason::ZeroDivisor);
            continue;
        }

        // Integer targets with an integer operand stay integers; overflow
        // and everything else falls through to float math.
        let current_i = match current {
            PropertyValue::Number(n) => n.as_i64(),
            _ => None,
        };
        let updated = match (op, current_i, operand_i) {
            (ArithmeticOp::Add, Some(a), Some(b)) => a
                .checked_add(b)
                .map(PropertyValue::int)
                .unwrap_or_else(|| PropertyValue::float(current_f + operand_f)),
            (ArithmeticOp::Multiply | ArithmeticOp::Scale, Some(a), Some(b)) => a
                .checked_mul(b)
                .map(PropertyValue::int)
                .unwrap_or_else(|| PropertyValue::float(current_f * operand_f)),
            (ArithmeticOp::Add, ..) => PropertyValue::float(current_f + operand_f),
            (ArithmeticOp::Multiply | ArithmeticOp::Scale, ..) => {
                PropertyValue::float(current_f * operand_f)
            }
            (ArithmeticOp::Divide, ..) => PropertyValue::float(current_f / operand_f),
        };
        node.properties.insert(key.to_string(), updated);
        outcome.apply();
    }
    Ok(outcome)
}

fn move_nodes(
    doc: &mut ScenarioDocument,
    targets: &BTreeSet<NodeId>,
    new_parent: NodeId,
) -> BatchOutcome {
    let mut outcome = BatchOutcome::default();
    for &id in targets {
        if !doc.contains(id) {
            outcome.skip(id, SkipReason::NodeNotFound);
            continue;
        }
        if !doc.contains(new_parent) {
            outcome.skip(id, SkipReason::ParentNotFound { parent: new_parent });
            continue;
        }
        // Ancestry is re-checked against the current tree for every target:
        // earlier moves in the same batch can change it.
        if new_parent == id || doc.is_ancestor_of(id, new_parent) {
            outcome.skip(id, SkipReason::CycleRejected { new_parent });
            continue;
        }

        let old_parent = doc.nodes.get(&id).and_then(|n| n.parent);
        if let Some(old_parent) = old_parent {
            if let Some(parent_node) = doc.nodes.get_mut(&old_parent) {
                parent_node.children.retain(|c| *c != id);
            }
        }
        if let Some(node) = doc.nodes.get_mut(&id) {
            node.parent = Some(new_parent);
        }
        if let Some(parent_node) = doc.nodes.get_mut(&new_parent) {
            parent_node.children.push(id);
        }
        outcome.apply();
    }
    outcome
}

fn remove_nodes(doc: &mut ScenarioDocument, targets: &BTreeSet<NodeId>) -> BatchOutcome {
    let mut outcome = BatchOutcome::default();
    let mut removed: BTreeSet<NodeId> = BTreeSet::new();
    let initially_present: BTreeSet<NodeId> =
        targets.iter().copied().filter(|t| doc.contains(*t)).collect();

    for &id in targets {
        if id == doc.root {
            outcome.skip(id, SkipReason::CannotRemoveRoot);
            continue;
        }
        if !doc.contains(id) {
            if initially_present.contains(&id) || removed.contains(&id) {
                outcome.skip(id, SkipReason::AlreadyRemoved);
            } else {
                outcome.skip(id, SkipReason::NodeNotFound);
            }
            continue;
        }

        let subtree = doc.descendants(id);
        if let Some(parent) = doc.nodes.get(&id).and_then(|n| n.parent) {
            if let Some(parent_node) = doc.nodes.get_mut(&parent) {
                parent_node.children.retain(|c| *c != id);
            }
        }
        for victim in subtree {
            doc.nodes.remove(&victim);
            doc.links.retain(|link, _| !link.touches(victim));
            removed.insert(victim);
        }
        outcome.apply();
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Link, Node, ScenarioType};
    use crate::filter::{ComparisonOp, FilterCondition, FilterSet};

    fn targets(ids: &[NodeId]) -> BTreeSet<NodeId> {
        ids.iter().copied().collect()
    }

    /// Root R (0) with children A (1, size=5) and B (2, size=10); B has
    /// child C (3). Wormhole link between 1 and 3.
    fn sample_doc() -> ScenarioDocument {
        let root = Node::new(0, "random_fixture").with_position(0.0, 0.0);
        let mut doc = ScenarioDocument::new(ScenarioType::Chart, root);
        doc.attach_child(
            0,
            Node::new(1, "star")
                .with_position(100.0, 0.0)
                .with_property("size", PropertyValue::int(5)),
        )
        .unwrap();
        doc.attach_child(
            0,
            Node::new(2, "star")
                .with_position(-100.0, 0.0)
                .with_property("size", PropertyValue::int(10)),
        )
        .unwrap();
        doc.attach_child(2, Node::new(3, "wormhole_fixture").with_position(-120.0, 30.0))
            .unwrap();
        doc.insert_link(Link::new(1, 3).unwrap()).unwrap();
        doc
    }

    fn size_filter(threshold: i64) -> FilterSet {
        FilterSet::new(vec![FilterCondition::new(
            "size",
            ComparisonOp::GreaterThan,
            PropertyValue::int(threshold),
        )])
    }

    #[test]
    fn test_add_property_creates_and_overwrites() {
        let mut doc = sample_doc();
        let op = BatchOperation::AddProperty {
            key: "owner".into(),
            value: PropertyValue::Text("player_0".into()),
        };
        let outcome = apply_batch(&mut doc, &op, &targets(&[1, 2]), BatchMode::default()).unwrap();
        assert_eq!(outcome.applied, 2);
        assert_eq!(outcome.skipped, 0);
        assert_eq!(
            doc.node(1).unwrap().property("owner"),
            Some(&PropertyValue::Text("player_0".into()))
        );
    }

    #[test]
    fn test_change_property_lenient_skips_missing_key() {
        let mut doc = sample_doc();
        let op = BatchOperation::ChangeProperty {
            key: "size".into(),
            value: PropertyValue::int(20),
        };
        // Node 3 has no "size" property.
        let outcome = apply_batch(&mut doc, &op, &targets(&[2, 3]), BatchMode::Lenient).unwrap();
        assert_eq!(outcome.applied, 1);
        assert_eq!(outcome.skipped, 1);
        assert_eq!(
            outcome.skips[0],
            BatchSkip {
                node: 3,
                reason: SkipReason::PropertyMissing { key: "size".into() }
            }
        );
        assert_eq!(
            doc.node(2).unwrap().property("size"),
            Some(&PropertyValue::int(20))
        );
    }

    #[test]
    fn test_change_property_strict_aborts_without_mutating() {
        let mut doc = sample_doc();
        let before = doc.clone();
        let op = BatchOperation::ChangeProperty {
            key: "size".into(),
            value: PropertyValue::int(20),
        };
        let err = apply_batch(&mut doc, &op, &targets(&[2, 3]), BatchMode::Strict).unwrap_err();
        assert!(matches!(err, ScenarioError::Batch(_)));
        assert_eq!(doc, before);
    }

    #[test]
    fn test_move_node_reparents() {
        let mut doc = sample_doc();
        let op = BatchOperation::MoveNode { new_parent: 1 };
        let outcome = apply_batch(&mut doc, &op, &targets(&[3]), BatchMode::default()).unwrap();
        assert_eq!(outcome.applied, 1);
        assert_eq!(doc.node(3).unwrap().parent(), Some(1));
        assert_eq!(doc.node(1).unwrap().children(), &[3]);
        assert!(doc.node(2).unwrap().children().is_empty());
        doc.validate().unwrap();
    }

    #[test]
    fn test_move_onto_self_rejected() {
        let mut doc = sample_doc();
        let op = BatchOperation::MoveNode { new_parent: 2 };
        let outcome = apply_batch(&mut doc, &op, &targets(&[2]), BatchMode::default()).unwrap();
        assert_eq!(outcome.applied, 0);
        assert_eq!(
            outcome.skips[0].reason,
            SkipReason::CycleRejected { new_parent: 2 }
        );
    }

    #[test]
    fn test_move_under_descendant_rejected_tree_unchanged() {
        let mut doc = sample_doc();
        let before = doc.clone();
        // 3 descends from 2: moving 2 under 3 would create a cycle.
        let op = BatchOperation::MoveNode { new_parent: 3 };
        let outcome = apply_batch(&mut doc, &op, &targets(&[2]), BatchMode::default()).unwrap();
        assert_eq!(outcome.applied, 0);
        assert_eq!(
            outcome.skips[0].reason,
            SkipReason::CycleRejected { new_parent: 3 }
        );
        assert_eq!(doc, before);
    }

    #[test]
    fn test_move_root_always_rejected() {
        let mut doc = sample_doc();
        let op = BatchOperation::MoveNode { new_parent: 1 };
        let outcome = apply_batch(&mut doc, &op, &targets(&[0]), BatchMode::default()).unwrap();
        assert_eq!(outcome.applied, 0);
        assert!(matches!(
            outcome.skips[0].reason,
            SkipReason::CycleRejected { .. }
        ));
    }

    #[test]
    fn test_move_ancestry_recomputed_within_batch() {
        // Targets 1 and 2 both move under 3 (child of 2). Target 1 succeeds;
        // by the time 2 is considered, 3 is still its descendant, so it is
        // rejected against the current tree, not the pre-batch one.
        let mut doc = sample_doc();
        let op = BatchOperation::MoveNode { new_parent: 3 };
        let outcome = apply_batch(&mut doc, &op, &targets(&[1, 2]), BatchMode::default()).unwrap();
        assert_eq!(outcome.applied, 1);
        assert_eq!(outcome.skipped, 1);
        assert_eq!(doc.node(1).unwrap().parent(), Some(3));
        assert_eq!(
            outcome.skips[0],
            BatchSkip {
                node: 2,
                reason: SkipReason::CycleRejected { new_parent: 3 }
            }
        );
        doc.validate().unwrap();
    }

    #[test]
    fn test_remove_node_cascades_and_clears_links() {
        let mut doc = sample_doc();
        let outcome = apply_batch(
            &mut doc,
            &BatchOperation::RemoveNode,
            &targets(&[2]),
            BatchMode::default(),
        )
        .unwrap();
        assert_eq!(outcome.applied, 1);
        // 2 and its child 3 are gone, and so is the 1-3 link.
        assert!(!doc.contains(2));
        assert!(!doc.contains(3));
        assert!(doc.links().is_empty());
        doc.validate().unwrap();
    }

    #[test]
    fn test_remove_root_is_skip_with_reason() {
        let mut doc = sample_doc();
        let before = doc.clone();
        let outcome = apply_batch(
            &mut doc,
            &BatchOperation::RemoveNode,
            &targets(&[0]),
            BatchMode::default(),
        )
        .unwrap();
        assert_eq!(outcome.applied, 0);
        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.skips[0].reason, SkipReason::CannotRemoveRoot);
        assert_eq!(outcome.skips[0].reason.to_string(), "cannot remove root");
        assert_eq!(doc, before);
    }

    #[test]
    fn test_remove_target_swallowed_by_earlier_subtree() {
        let mut doc = sample_doc();
        let outcome = apply_batch(
            &mut doc,
            &BatchOperation::RemoveNode,
            &targets(&[2, 3]),
            BatchMode::default(),
        )
        .unwrap();
        assert_eq!(outcome.applied, 1);
        assert_eq!(
            outcome.skips[0],
            BatchSkip {
                node: 3,
                reason: SkipReason::AlreadyRemoved
            }
        );
    }

    #[test]
    fn test_unknown_target_reported_not_fatal() {
        let mut doc = sample_doc();
        let op = BatchOperation::AddProperty {
            key: "k".into(),
            value: PropertyValue::int(1),
        };
        let outcome = apply_batch(&mut doc, &op, &targets(&[1, 99]), BatchMode::default()).unwrap();
        assert_eq!(outcome.applied, 1);
        assert_eq!(outcome.skips[0].reason, SkipReason::NodeNotFound);
    }

    fn adjust(key: &str, op: ArithmeticOp, operand: PropertyValue) -> BatchOperation {
        BatchOperation::Arithmetic {
            key: key.into(),
            op,
            operand,
        }
    }

    #[test]
    fn test_add_keeps_integers_integral() {
        let mut doc = sample_doc();
        let op = adjust("size", ArithmeticOp::Add, PropertyValue::int(3));
        let outcome = apply_batch(&mut doc, &op, &targets(&[1, 2]), BatchMode::default()).unwrap();
        assert_eq!(outcome.applied, 2);
        assert_eq!(doc.node(1).unwrap().property("size"), Some(&PropertyValue::int(8)));
        assert_eq!(doc.node(2).unwrap().property("size"), Some(&PropertyValue::int(13)));
    }

    #[test]
    fn test_multiply_and_scale_agree() {
        let mut doc = sample_doc();
        let op = adjust("size", ArithmeticOp::Multiply, PropertyValue::int(2));
        apply_batch(&mut doc, &op, &targets(&[1]), BatchMode::default()).unwrap();
        let op = adjust("size", ArithmeticOp::Scale, PropertyValue::int(2));
        apply_batch(&mut doc, &op, &targets(&[2]), BatchMode::default()).unwrap();
        assert_eq!(doc.node(1).unwrap().property("size"), Some(&PropertyValue::int(10)));
        assert_eq!(doc.node(2).unwrap().property("size"), Some(&PropertyValue::int(20)));
    }

    #[test]
    fn test_divide_produces_floats() {
        let mut doc = sample_doc();
        let op = adjust("size", ArithmeticOp::Divide, PropertyValue::int(4));
        let outcome = apply_batch(&mut doc, &op, &targets(&[2]), BatchMode::default()).unwrap();
        assert_eq!(outcome.applied, 1);
        assert_eq!(
            doc.node(2).unwrap().property("size"),
            Some(&PropertyValue::float(2.5))
        );
    }

    #[test]
    fn test_divide_by_zero_skips_every_target() {
        let mut doc = sample_doc();
        let before = doc.clone();
        let op = adjust("size", ArithmeticOp::Divide, PropertyValue::int(0));
        let outcome = apply_batch(&mut doc, &op, &targets(&[1, 2]), BatchMode::default()).unwrap();
        assert_eq!(outcome.applied, 0);
        assert_eq!(outcome.skipped, 2);
        assert_eq!(outcome.skips[0].reason, SkipReason::ZeroDivisor);
        assert_eq!(outcome.skips[0].reason.to_string(), "cannot divide by zero");
        assert_eq!(doc, before);
    }

    #[test]
    fn test_arithmetic_skips_non_numeric_targets() {
        let mut doc = sample_doc();
        let label = BatchOperation::AddProperty {
            key: "size".into(),
            value: PropertyValue::Text("huge".into()),
        };
        apply_batch(&mut doc, &label, &targets(&[3]), BatchMode::default()).unwrap();

        let op = adjust("size", ArithmeticOp::Add, PropertyValue::int(1));
        let outcome = apply_batch(&mut doc, &op, &targets(&[2, 3]), BatchMode::default()).unwrap();
        assert_eq!(outcome.applied, 1);
        assert_eq!(
            outcome.skips[0],
            BatchSkip {
                node: 3,
                reason: SkipReason::NotNumeric { key: "size".into() }
            }
        );
        assert_eq!(doc.node(2).unwrap().property("size"), Some(&PropertyValue::int(11)));
        assert_eq!(
            doc.node(3).unwrap().property("size"),
            Some(&PropertyValue::Text("huge".into()))
        );
    }

    #[test]
    fn test_arithmetic_coerces_numeric_strings() {
        let mut doc = sample_doc();
        let seed = BatchOperation::AddProperty {
            key: "size".into(),
            value: PropertyValue::Text("5".into()),
        };
        apply_batch(&mut doc, &seed, &targets(&[3]), BatchMode::default()).unwrap();

        let op = adjust("size", ArithmeticOp::Add, PropertyValue::int(1));
        let outcome = apply_batch(&mut doc, &op, &targets(&[3]), BatchMode::default()).unwrap();
        assert_eq!(outcome.applied, 1);
        assert_eq!(
            doc.node(3).unwrap().property("size"),
            Some(&PropertyValue::float(6.0))
        );
    }

    #[test]
    fn test_non_numeric_operand_rejects_whole_batch() {
        let mut doc = sample_doc();
        let before = doc.clone();
        let op = adjust("size", ArithmeticOp::Multiply, PropertyValue::Text("big".into()));
        let err = apply_batch(&mut doc, &op, &targets(&[1, 2]), BatchMode::default()).unwrap_err();
        assert!(matches!(err, ScenarioError::Batch(_)));
        assert_eq!(doc, before);
    }

    /// The worked example: filter size > 7, change it, re-filter, then try
    /// to remove the root.
    #[test]
    fn test_filter_change_refilter_flow() {
        let mut doc = sample_doc();

        let matched = size_filter(7).matching(&doc);
        assert_eq!(matched, targets(&[2]));

        let op = BatchOperation::ChangeProperty {
            key: "size".into(),
            value: PropertyValue::int(20),
        };
        let outcome = apply_batch(&mut doc, &op, &matched, BatchMode::default()).unwrap();
        assert_eq!(outcome.applied, 1);

        let matched = size_filter(7).matching(&doc);
        assert_eq!(matched, targets(&[2]));
        assert_eq!(
            doc.node(2).unwrap().property("size"),
            Some(&PropertyValue::int(20))
        );

        let outcome = apply_batch(
            &mut doc,
            &BatchOperation::RemoveNode,
            &targets(&[0]),
            BatchMode::default(),
        )
        .unwrap();
        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.skips[0].reason.to_string(), "cannot remove root");
    }

    #[test]
    fn test_ids_not_reused_after_removal() {
        let mut doc = sample_doc();
        apply_batch(
            &mut doc,
            &BatchOperation::RemoveNode,
            &targets(&[3]),
            BatchMode::default(),
        )
        .unwrap();
        // The high-water mark is unaffected by deletion.
        assert_eq!(doc.next_node_id, 4);
    }
}
