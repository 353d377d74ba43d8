//! Filter Engine
//!
//! Evaluates multi-condition predicates over node properties, producing the
//! set of matching node ids. Pure: never mutates the document.
//!
//! A condition that cannot apply to a node (absent property, non-numeric
//! operand under a numeric operator) evaluates to false for that node. It is
//! a mismatch, not an error, and never aborts evaluation of other nodes.
//!
//! Conditions combine under a selectable mode (`FilterCombine`): all of
//! them, any of them, not-all, or exactly-one.

use std::collections::BTreeSet;
use std::str::FromStr;
use strum::{Display, EnumString};

use crate::document::{Node, NodeId, PropertyValue, ScenarioDocument};
use crate::error::ScenarioError;

/// Comparison operator for one filter condition.
///
/// The ordering operators are numeric-only. `Equals`/`NotEquals` compare
/// numerically when both sides parse as numbers and by exact case-sensitive
/// text otherwise. `Contains` is case-sensitive substring containment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum ComparisonOp {
    Equals,
    NotEquals,
    LessThan,
    LessOrEqual,
    GreaterThan,
    GreaterOrEqual,
    Contains,
}

impl ComparisonOp {
    /// Symbolic form accepted by the CLI (`=`, `!=`, `<`, `<=`, `>`, `>=`,
    /// `contains`).
    fn from_symbol(s: &str) -> Option<Self> {
        match s {
            "=" | "==" => Some(Self::Equals),
            "!=" => Some(Self::NotEquals),
            "<" => Some(Self::LessThan),
            "<=" => Some(Self::LessOrEqual),
            ">" => Some(Self::GreaterThan),
            ">=" => Some(Self::GreaterOrEqual),
            "contains" => Some(Self::Contains),
            _ => None,
        }
    }
}

/// One (property, operator, value) condition.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCondition {
    pub property: String,
    pub op: ComparisonOp,
    pub value: PropertyValue,
}

impl FilterCondition {
    pub fn new(property: impl Into<String>, op: ComparisonOp, value: PropertyValue) -> Self {
        Self {
            property: property.into(),
            op,
            value,
        }
    }

    /// Evaluate against a single node. Absent property means no match.
    pub fn matches(&self, node: &Node) -> bool {
        let Some(stored) = node.property(&self.property) else {
            return false;
        };
        match self.op {
            ComparisonOp::Equals => match numeric_pair(stored, &self.value) {
                Some((a, b)) => a == b,
                None => text_of(stored) == text_of(&self.value),
            },
            ComparisonOp::NotEquals => match numeric_pair(stored, &self.value) {
                Some((a, b)) => a != b,
                None => text_of(stored) != text_of(&self.value),
            },
            ComparisonOp::LessThan => numeric_pair(stored, &self.value)
                .map(|(a, b)| a < b)
                .unwrap_or(false),
            ComparisonOp::LessOrEqual => numeric_pair(stored, &self.value)
                .map(|(a, b)| a <= b)
                .unwrap_or(false),
            ComparisonOp::GreaterThan => numeric_pair(stored, &self.value)
                .map(|(a, b)| a > b)
                .unwrap_or(false),
            ComparisonOp::GreaterOrEqual => numeric_pair(stored, &self.value)
                .map(|(a, b)| a >= b)
                .unwrap_or(false),
            ComparisonOp::Contains => text_of(stored).contains(&text_of(&self.value)),
        }
    }
}

/// Both sides as numbers, or nothing. A numeric operator with a non-numeric
/// side is simply a non-match.
fn numeric_pair(stored: &PropertyValue, value: &PropertyValue) -> Option<(f64, f64)> {
    Some((stored.as_number()?, value.as_number()?))
}

fn text_of(value: &PropertyValue) -> String {
    value.to_string()
}

impl FromStr for FilterCondition {
    type Err = ScenarioError;

    /// Parse conditions like `size > 7`, `name contains gas`, `primary = true`.
    /// The comparison value is typed by inference: integer, float, boolean,
    /// then text, in that order.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split_whitespace();
        let (property, op, rest) = match (parts.next(), parts.next()) {
            (Some(p), Some(o)) => (p, o, parts.collect::<Vec<_>>().join(" ")),
            _ => {
                return Err(ScenarioError::invalid_document(format!(
                    "cannot parse filter condition '{}': expected 'property op value'",
                    s
                )))
            }
        };
        let op = ComparisonOp::from_symbol(op)
            .or_else(|| op.parse().ok())
            .ok_or_else(|| {
                ScenarioError::invalid_document(format!("unknown comparison operator '{}'", op))
            })?;
        if rest.is_empty() {
            return Err(ScenarioError::invalid_document(format!(
                "filter condition '{}' has no comparison value",
                s
            )));
        }
        let value = if let Ok(n) = rest.parse::<i64>() {
            PropertyValue::int(n)
        } else if let Ok(n) = rest.parse::<f64>() {
            PropertyValue::float(n)
        } else if let Ok(b) = rest.parse::<bool>() {
            PropertyValue::Bool(b)
        } else {
            PropertyValue::Text(rest)
        };
        Ok(Self::new(property, op, value))
    }
}

/// How a set's conditions combine into one per-node verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum FilterCombine {
    /// Every condition holds.
    #[default]
    And,
    /// At least one condition holds.
    Or,
    /// Not every condition holds.
    Nand,
    /// Exactly one condition holds.
    Xor,
}

/// A set of conditions plus the mode combining them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSet {
    conditions: Vec<FilterCondition>,
    combine: FilterCombine,
}

impl FilterSet {
    pub fn new(conditions: Vec<FilterCondition>) -> Self {
        Self {
            conditions,
            combine: FilterCombine::And,
        }
    }

    pub fn with_combine(mut self, combine: FilterCombine) -> Self {
        self.combine = combine;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn conditions(&self) -> &[FilterCondition] {
        &self.conditions
    }

    pub fn combine(&self) -> FilterCombine {
        self.combine
    }

    /// Combined verdict for one node. With no conditions, `And` matches
    /// everything and the other modes match nothing (vacuous truth only
    /// under conjunction).
    pub fn matches(&self, node: &Node) -> bool {
        let hits = self.conditions.iter().filter(|c| c.matches(node)).count();
        match self.combine {
            FilterCombine::And => hits == self.conditions.len(),
            FilterCombine::Or => hits > 0,
            FilterCombine::Nand => hits < self.conditions.len(),
            FilterCombine::Xor => hits == 1,
        }
    }

    /// Node ids in the document whose combined verdict is true. The result is
    /// a set, not a sequence; callers needing a stable order sort explicitly.
    pub fn matching(&self, doc: &ScenarioDocument) -> BTreeSet<NodeId> {
        doc.nodes()
            .filter(|node| self.matches(node))
            .map(|node| node.id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Node, ScenarioType};

    fn sized_doc() -> ScenarioDocument {
        let root = Node::new(0, "random_fixture").with_position(0.0, 0.0);
        let mut doc = ScenarioDocument::new(ScenarioType::Chart, root);
        doc.attach_child(
            0,
            Node::new(1, "star")
                .with_position(1.0, 0.0)
                .with_property("size", PropertyValue::int(5))
                .with_property("name", PropertyValue::Text("alpha".into())),
        )
        .unwrap();
        doc.attach_child(
            0,
            Node::new(2, "star")
                .with_position(2.0, 0.0)
                .with_property("size", PropertyValue::int(10))
                .with_property("name", PropertyValue::Text("gas_giant".into())),
        )
        .unwrap();
        doc.attach_child(
            0,
            Node::new(3, "planet")
                .with_position(3.0, 0.0)
                .with_property("size", PropertyValue::Text("huge".into())),
        )
        .unwrap();
        doc
    }

    fn ids(set: &BTreeSet<NodeId>) -> Vec<NodeId> {
        set.iter().copied().collect()
    }

    #[test]
    fn test_numeric_greater_than() {
        let doc = sized_doc();
        let filter = FilterSet::new(vec![FilterCondition::new(
            "size",
            ComparisonOp::GreaterThan,
            PropertyValue::int(7),
        )]);
        assert_eq!(ids(&filter.matching(&doc)), vec![2]);
    }

    #[test]
    fn test_unparseable_value_is_no_match_not_error() {
        // Node 3 has size "huge": the condition is false for it, the other
        // nodes still evaluate.
        let doc = sized_doc();
        let filter = FilterSet::new(vec![FilterCondition::new(
            "size",
            ComparisonOp::GreaterOrEqual,
            PropertyValue::int(5),
        )]);
        assert_eq!(ids(&filter.matching(&doc)), vec![1, 2]);
    }

    #[test]
    fn test_absent_property_never_matches() {
        let doc = sized_doc();
        let filter = FilterSet::new(vec![FilterCondition::new(
            "luminosity",
            ComparisonOp::Equals,
            PropertyValue::int(1),
        )]);
        assert!(filter.matching(&doc).is_empty());
    }

    #[test]
    fn test_numeric_string_compares_as_number() {
        let root = Node::new(0, "random_fixture")
            .with_position(0.0, 0.0)
            .with_property("size", PropertyValue::Text("12".into()));
        let doc = ScenarioDocument::new(ScenarioType::Chart, root);
        let filter = FilterSet::new(vec![FilterCondition::new(
            "size",
            ComparisonOp::GreaterThan,
            PropertyValue::int(7),
        )]);
        assert_eq!(ids(&filter.matching(&doc)), vec![0]);
    }

    #[test]
    fn test_string_equality_is_case_sensitive() {
        let doc = sized_doc();
        let exact = FilterSet::new(vec![FilterCondition::new(
            "name",
            ComparisonOp::Equals,
            PropertyValue::Text("alpha".into()),
        )]);
        assert_eq!(ids(&exact.matching(&doc)), vec![1]);

        let wrong_case = FilterSet::new(vec![FilterCondition::new(
            "name",
            ComparisonOp::Equals,
            PropertyValue::Text("Alpha".into()),
        )]);
        assert!(wrong_case.matching(&doc).is_empty());
    }

    #[test]
    fn test_contains() {
        let doc = sized_doc();
        let filter = FilterSet::new(vec![FilterCondition::new(
            "name",
            ComparisonOp::Contains,
            PropertyValue::Text("gas".into()),
        )]);
        assert_eq!(ids(&filter.matching(&doc)), vec![2]);
    }

    #[test]
    fn test_conditions_combine_with_and() {
        let doc = sized_doc();
        let filter = FilterSet::new(vec![
            FilterCondition::new("size", ComparisonOp::GreaterThan, PropertyValue::int(1)),
            FilterCondition::new(
                "name",
                ComparisonOp::Contains,
                PropertyValue::Text("a".into()),
            ),
        ]);
        assert_eq!(ids(&filter.matching(&doc)), vec![1, 2]);
    }

    #[test]
    fn test_empty_filter_matches_all() {
        let doc = sized_doc();
        assert_eq!(FilterSet::default().matching(&doc).len(), doc.node_count());
    }

    fn two_conditions() -> Vec<FilterCondition> {
        vec![
            FilterCondition::new("size", ComparisonOp::GreaterThan, PropertyValue::int(7)),
            FilterCondition::new(
                "name",
                ComparisonOp::Contains,
                PropertyValue::Text("alpha".into()),
            ),
        ]
    }

    #[test]
    fn test_or_combine_unions_conditions() {
        // size > 7 matches {2}, name contains alpha matches {1}.
        let doc = sized_doc();
        let filter = FilterSet::new(two_conditions()).with_combine(FilterCombine::Or);
        assert_eq!(ids(&filter.matching(&doc)), vec![1, 2]);
    }

    #[test]
    fn test_nand_combine_inverts_conjunction() {
        let doc = sized_doc();
        let and = FilterSet::new(two_conditions());
        let nand = FilterSet::new(two_conditions()).with_combine(FilterCombine::Nand);
        // Neither node satisfies both conditions, so nand matches every node.
        assert!(and.matching(&doc).is_empty());
        assert_eq!(nand.matching(&doc).len(), doc.node_count());
    }

    #[test]
    fn test_xor_combine_requires_exactly_one_hit() {
        let doc = sized_doc();
        let filter = FilterSet::new(vec![
            FilterCondition::new("size", ComparisonOp::GreaterThan, PropertyValue::int(1)),
            FilterCondition::new(
                "name",
                ComparisonOp::Contains,
                PropertyValue::Text("gas".into()),
            ),
        ])
        .with_combine(FilterCombine::Xor);
        // Node 1 hits only the size condition; node 2 hits both.
        assert_eq!(ids(&filter.matching(&doc)), vec![1]);
    }

    #[test]
    fn test_empty_set_matches_nothing_outside_and() {
        let doc = sized_doc();
        for combine in [FilterCombine::Or, FilterCombine::Nand, FilterCombine::Xor] {
            let filter = FilterSet::new(Vec::new()).with_combine(combine);
            assert!(filter.matching(&doc).is_empty(), "mode {}", combine);
        }
    }

    #[test]
    fn test_combine_mode_parses() {
        assert_eq!("or".parse::<FilterCombine>().unwrap(), FilterCombine::Or);
        assert_eq!("nand".parse::<FilterCombine>().unwrap(), FilterCombine::Nand);
        assert!("norx".parse::<FilterCombine>().is_err());
    }

    #[test]
    fn test_filter_idempotence() {
        let doc = sized_doc();
        let filter = FilterSet::new(vec![FilterCondition::new(
            "size",
            ComparisonOp::GreaterThan,
            PropertyValue::int(7),
        )]);
        assert_eq!(filter.matching(&doc), filter.matching(&doc));
    }

    #[test]
    fn test_condition_from_str() {
        let cond: FilterCondition = "size > 7".parse().unwrap();
        assert_eq!(cond.property, "size");
        assert_eq!(cond.op, ComparisonOp::GreaterThan);
        assert_eq!(cond.value, PropertyValue::int(7));

        let cond: FilterCondition = "name contains gas giant".parse().unwrap();
        assert_eq!(cond.op, ComparisonOp::Contains);
        assert_eq!(cond.value, PropertyValue::Text("gas giant".into()));

        let cond: FilterCondition = "primary = true".parse().unwrap();
        assert_eq!(cond.value, PropertyValue::Bool(true));

        assert!("size >".parse::<FilterCondition>().is_err());
        assert!("size ~ 7".parse::<FilterCondition>().is_err());
    }
}
