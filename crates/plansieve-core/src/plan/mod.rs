//! Filter plan expression tree.
//!
//! A plan is produced once per question by an external plan generator,
//! evaluated once, merged once, and then discarded. This layer carries no
//! resolver or registry semantics; interpretation happens in `evaluate`
//! and `merge`.

mod document;
mod fingerprint;
mod path;

#[cfg(test)]
mod tests;

pub use fingerprint::PlanFingerprint;
pub use path::{Path, Segment, SegmentKind, Side, sibling_segments};
pub(crate) use path::PathTrail;

use crate::error::{ErrorClass, ErrorOrigin, InternalError};
use std::{collections::BTreeSet, fmt, str::FromStr};
use thiserror::Error as ThisError;

///
/// PlanError
///

#[derive(Debug, ThisError)]
pub enum PlanError {
    #[error("plan document is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported plan shape at '{path}': logical operator '{tag}'")]
    UnsupportedOperator { path: String, tag: String },

    #[error("malformed plan node at '{path}': {reason}")]
    MalformedNode { path: String, reason: String },

    #[error("plan references unknown filter '{name}' at '{path}'")]
    UnknownFilter { name: String, path: String },
}

impl PlanError {
    pub(crate) const fn class(&self) -> ErrorClass {
        match self {
            Self::Json(_) | Self::UnsupportedOperator { .. } | Self::MalformedNode { .. } => {
                ErrorClass::UnsupportedPlanShape
            }
            Self::UnknownFilter { .. } => ErrorClass::Configuration,
        }
    }
}

impl From<PlanError> for InternalError {
    fn from(err: PlanError) -> Self {
        Self::new(err.class(), ErrorOrigin::Plan, err.to_string())
    }
}

///
/// Operator
///
/// Set-algebra combinator tag. `XOR` appears in the generated schema but
/// has no evaluation semantics, so it is rejected when parsing plans.
///

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Operator {
    And,
    Or,
    Not,
}

impl Operator {
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
            Self::Not => "NOT",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Operator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AND" => Ok(Self::And),
            "OR" => Ok(Self::Or),
            "NOT" => Ok(Self::Not),
            other => Err(other.to_string()),
        }
    }
}

///
/// Leaf
///
/// One named filter invocation. The instruction is free text whose
/// meaning belongs to the resolver registered under `filter_name`.
///

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Leaf {
    pub filter_name: String,
    pub instruction: String,
}

impl Leaf {
    #[must_use]
    pub fn new(filter_name: impl Into<String>, instruction: impl Into<String>) -> Self {
        Self {
            filter_name: filter_name.into(),
            instruction: instruction.into(),
        }
    }
}

///
/// Node
///
/// `Not` is a binary relative complement (`a - b`), not a unary complement
/// over the entity universe.
///

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Node {
    Leaf(Leaf),
    And(Vec<Self>),
    Or(Vec<Self>),
    Not { a: Box<Self>, b: Box<Self> },
}

impl Node {
    #[must_use]
    pub fn leaf(filter_name: impl Into<String>, instruction: impl Into<String>) -> Self {
        Self::Leaf(Leaf::new(filter_name, instruction))
    }

    #[must_use]
    pub const fn and(children: Vec<Self>) -> Self {
        Self::And(children)
    }

    #[must_use]
    pub const fn or(children: Vec<Self>) -> Self {
        Self::Or(children)
    }

    #[expect(clippy::should_implement_trait)]
    #[must_use]
    pub fn not(a: Self, b: Self) -> Self {
        Self::Not {
            a: Box::new(a),
            b: Box::new(b),
        }
    }

    /// Operator tag, or `None` for a leaf.
    #[must_use]
    pub const fn operator(&self) -> Option<Operator> {
        match self {
            Self::Leaf(_) => None,
            Self::And(_) => Some(Operator::And),
            Self::Or(_) => Some(Operator::Or),
            Self::Not { .. } => Some(Operator::Not),
        }
    }

    /// The path label this node contributes at its own position.
    #[must_use]
    pub fn own_kind(&self) -> SegmentKind {
        match self {
            Self::Leaf(leaf) => SegmentKind::Filter(leaf.filter_name.clone()),
            Self::And(_) => SegmentKind::Op(Operator::And),
            Self::Or(_) => SegmentKind::Op(Operator::Or),
            Self::Not { .. } => SegmentKind::Op(Operator::Not),
        }
    }

    /// Visit every leaf in document order without recursing natively.
    pub fn for_each_leaf<'a>(&'a self, mut f: impl FnMut(&'a Leaf)) {
        let mut stack = vec![self];

        while let Some(node) = stack.pop() {
            match node {
                Self::Leaf(leaf) => f(leaf),
                Self::And(children) | Self::Or(children) => stack.extend(children.iter().rev()),
                Self::Not { a, b } => {
                    stack.push(b);
                    stack.push(a);
                }
            }
        }
    }
}

///
/// Plan
///
/// `root: None` means "no filtering". Returning the full universe in that
/// case is the pipeline's responsibility, not the evaluator's.
///

#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct Plan {
    pub root: Option<Node>,
}

impl Plan {
    #[must_use]
    pub const fn new(root: Node) -> Self {
        Self { root: Some(root) }
    }

    /// A plan that applies no filtering.
    #[must_use]
    pub const fn unfiltered() -> Self {
        Self { root: None }
    }

    #[must_use]
    pub const fn root(&self) -> Option<&Node> {
        self.root.as_ref()
    }

    #[must_use]
    pub const fn is_unfiltered(&self) -> bool {
        self.root.is_none()
    }

    /// Parse a plan document (`{"filter": Node | null}`).
    pub fn from_json(json: &str) -> Result<Self, PlanError> {
        let value: serde_json::Value = serde_json::from_str(json)?;

        document::lower_document(&value)
    }

    /// Lower an already-decoded plan document.
    pub fn from_json_value(value: &serde_json::Value) -> Result<Self, PlanError> {
        document::lower_document(value)
    }

    pub fn to_json(&self) -> Result<String, PlanError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Distinct filter names referenced anywhere in the plan.
    #[must_use]
    pub fn filter_names(&self) -> BTreeSet<&str> {
        let mut names = BTreeSet::new();
        if let Some(root) = &self.root {
            root.for_each_leaf(|leaf| {
                names.insert(leaf.filter_name.as_str());
            });
        }

        names
    }

    /// Number of leaves in the plan.
    #[must_use]
    pub fn leaf_count(&self) -> usize {
        let mut count = 0;
        if let Some(root) = &self.root {
            root.for_each_leaf(|_| count += 1);
        }

        count
    }

    /// Check that every leaf names a filter accepted by `is_known`.
    /// Returns the first offending leaf in document order.
    pub fn check_filters(&self, is_known: impl Fn(&str) -> bool) -> Result<(), PlanError> {
        let Some(root) = &self.root else {
            return Ok(());
        };

        let mut trail = PathTrail::new();
        let mut stack = vec![(root, Segment::new(root.own_kind()), None)];
        while let Some((node, segment, parent)) = stack.pop() {
            let at = trail.push(parent, segment);
            match node {
                Node::Leaf(leaf) => {
                    if !is_known(&leaf.filter_name) {
                        return Err(PlanError::UnknownFilter {
                            name: leaf.filter_name.clone(),
                            path: trail.path(&Path::root(), at).to_string(),
                        });
                    }
                }
                Node::And(children) | Node::Or(children) => {
                    let segments = sibling_segments(children);
                    for (child, segment) in children.iter().zip(segments).rev() {
                        stack.push((child, segment, Some(at)));
                    }
                }
                Node::Not { a, b } => {
                    let side_b = trail.push(Some(at), Segment::operand(Side::B));
                    stack.push((b, Segment::new(b.own_kind()), Some(side_b)));
                    let side_a = trail.push(Some(at), Segment::operand(Side::A));
                    stack.push((a, Segment::new(a.own_kind()), Some(side_a)));
                }
            }
        }

        Ok(())
    }
}

// Dismantle the tree with an explicit stack so dropping a very deep plan
// does not recurse once per level.
impl Drop for Plan {
    fn drop(&mut self) {
        let mut stack: Vec<Node> = self.root.take().into_iter().collect();
        while let Some(node) = stack.pop() {
            match node {
                Node::Leaf(_) => {}
                Node::And(children) | Node::Or(children) => stack.extend(children),
                Node::Not { a, b } => {
                    stack.push(*a);
                    stack.push(*b);
                }
            }
        }
    }
}
