//! Merge engine.
//!
//! Folds a populated result store into one identity set. Dispatch is on
//! the typed segment kind of each store key: `AND` intersects, `OR`
//! unions, `NOT` subtracts operand `B` from operand `A`, and a filter key
//! yields its stored rows. Each operator child is merged with its own key,
//! so operators nested directly inside `AND`/`OR` keep their meaning. The
//! walk uses explicit stacks, so store depth is bounded by memory only.

#[cfg(test)]
mod tests;

use crate::{
    config::MissingOperandPolicy,
    error::{ErrorClass, ErrorOrigin, InternalError},
    evaluate::{ResultStore, StoreNode},
    identity::IdentitySet,
    plan::{Operator, Path, PathTrail, Segment, SegmentKind, Side},
};
use std::collections::BTreeMap;
use thiserror::Error as ThisError;

///
/// MergeError
///

#[derive(Debug, ThisError)]
pub enum MergeError {
    #[error("NOT at '{path}' has no result for operand {side}")]
    MissingOperand { path: String, side: Side },
}

impl MergeError {
    pub(crate) const fn class(&self) -> ErrorClass {
        match self {
            Self::MissingOperand { .. } => ErrorClass::UnsupportedPlanShape,
        }
    }
}

impl From<MergeError> for InternalError {
    fn from(err: MergeError) -> Self {
        Self::new(err.class(), ErrorOrigin::Merge, err.to_string())
    }
}

/// Merge with the default operand policy (absent `NOT` operand is empty).
pub fn merge(store: &ResultStore) -> Result<IdentitySet, MergeError> {
    merge_with(store, MissingOperandPolicy::default())
}

pub fn merge_with(
    store: &ResultStore,
    policy: MissingOperandPolicy,
) -> Result<IdentitySet, MergeError> {
    Merger::new(policy).run(store.root())
}

///
/// Task
///
/// One unit of the merge walk. Operator entries schedule a `Fold` below
/// their children, so every operand value is on the value stack by the
/// time its fold is popped.
///

enum Task<'s> {
    Node {
        node: &'s StoreNode,
        parent: Option<usize>,
    },
    Entry {
        segment: &'s Segment,
        value: &'s StoreNode,
        parent: Option<usize>,
    },
    Operand {
        map: &'s BTreeMap<Segment, StoreNode>,
        side: Side,
        at: usize,
    },
    Fold {
        op: Operator,
        arity: usize,
    },
}

///
/// Merger
///
/// Post-order fold over the store with explicit task and value stacks.
/// Segment links are kept in a trail so an error can name the `NOT` it
/// came from.
///

struct Merger<'s> {
    policy: MissingOperandPolicy,
    tasks: Vec<Task<'s>>,
    values: Vec<IdentitySet>,
    trail: PathTrail,
}

impl<'s> Merger<'s> {
    const fn new(policy: MissingOperandPolicy) -> Self {
        Self {
            policy,
            tasks: Vec::new(),
            values: Vec::new(),
            trail: PathTrail::new(),
        }
    }

    fn run(mut self, root: &'s StoreNode) -> Result<IdentitySet, MergeError> {
        self.tasks.push(Task::Node { node: root, parent: None });

        while let Some(task) = self.tasks.pop() {
            match task {
                Task::Node { node, parent } => self.node(node, parent),
                Task::Entry {
                    segment,
                    value,
                    parent,
                } => self.entry(segment, value, parent),
                Task::Operand { map, side, at } => self.operand(map, side, at)?,
                Task::Fold { op, arity } => self.fold(op, arity),
            }
        }

        Ok(self.values.pop().unwrap_or_default())
    }

    // A terminal is its rows; a mapping is merged through its first key.
    // The evaluator writes exactly one key at the root, so "first" is
    // only a choice for hand-built stores.
    fn node(&mut self, node: &'s StoreNode, parent: Option<usize>) {
        match node {
            StoreNode::Rows(rows) => self.values.push(rows.clone()),
            StoreNode::Branch(map) => match map.iter().next() {
                Some((segment, value)) => self.tasks.push(Task::Entry {
                    segment,
                    value,
                    parent,
                }),
                None => self.values.push(IdentitySet::new()),
            },
        }
    }

    fn entry(&mut self, segment: &'s Segment, value: &'s StoreNode, parent: Option<usize>) {
        let at = self.trail.push(parent, segment.clone());

        match (segment.kind(), value) {
            (_, StoreNode::Rows(rows)) => self.values.push(rows.clone()),
            (SegmentKind::Op(op @ (Operator::And | Operator::Or)), StoreNode::Branch(map)) => {
                self.tasks.push(Task::Fold {
                    op: *op,
                    arity: map.len(),
                });
                for (segment, value) in map.iter().rev() {
                    self.tasks.push(Task::Entry {
                        segment,
                        value,
                        parent: Some(at),
                    });
                }
            }
            (SegmentKind::Op(Operator::Not), StoreNode::Branch(map)) => {
                self.tasks.push(Task::Fold {
                    op: Operator::Not,
                    arity: 2,
                });
                self.tasks.push(Task::Operand {
                    map,
                    side: Side::B,
                    at,
                });
                self.tasks.push(Task::Operand {
                    map,
                    side: Side::A,
                    at,
                });
            }
            (SegmentKind::Operand(_), branch) => self.tasks.push(Task::Node {
                node: branch,
                parent: Some(at),
            }),
            (SegmentKind::Filter(_), StoreNode::Branch(_)) => self.values.push(IdentitySet::new()),
        }
    }

    fn operand(
        &mut self,
        map: &'s BTreeMap<Segment, StoreNode>,
        side: Side,
        at: usize,
    ) -> Result<(), MergeError> {
        match map.get_key_value(&Segment::operand(side)) {
            Some((segment, value)) => {
                let link = self.trail.push(Some(at), segment.clone());
                self.tasks.push(Task::Node {
                    node: value,
                    parent: Some(link),
                });
            }
            None => match self.policy {
                MissingOperandPolicy::Empty => self.values.push(IdentitySet::new()),
                MissingOperandPolicy::Reject => {
                    return Err(MergeError::MissingOperand {
                        path: self.trail.path(&Path::root(), at).to_string(),
                        side,
                    });
                }
            },
        }

        Ok(())
    }

    // AND over no children is empty, as is OR. NOT is A minus B.
    fn fold(&mut self, op: Operator, arity: usize) {
        let start = self.values.len().saturating_sub(arity);
        let operands = self.values.split_off(start);

        let rows = match op {
            Operator::And => operands
                .into_iter()
                .reduce(|mut acc, rows| {
                    acc.retain(|id| rows.contains(id));
                    acc
                })
                .unwrap_or_default(),
            Operator::Or => operands.into_iter().flatten().collect(),
            Operator::Not => {
                let mut operands = operands.into_iter();
                let mut a = operands.next().unwrap_or_default();
                let b = operands.next().unwrap_or_default();
                a.retain(|id| !b.contains(id));
                a
            }
        };

        self.values.push(rows);
    }
}
