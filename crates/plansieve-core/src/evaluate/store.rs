use crate::{
    evaluate::EvaluateError,
    identity::IdentitySet,
    plan::{Path, PathTrail, Segment},
};
use std::collections::BTreeMap;

///
/// StoreNode
///
/// One level of the result store: either a leaf's resolved rows or a
/// mapping keyed by the next path segment.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum StoreNode {
    Rows(IdentitySet),
    Branch(BTreeMap<Segment, Self>),
}

impl StoreNode {
    #[must_use]
    pub const fn as_rows(&self) -> Option<&IdentitySet> {
        match self {
            Self::Rows(rows) => Some(rows),
            Self::Branch(_) => None,
        }
    }

    #[must_use]
    pub const fn as_branch(&self) -> Option<&BTreeMap<Segment, Self>> {
        match self {
            Self::Rows(_) => None,
            Self::Branch(map) => Some(map),
        }
    }
}

impl Default for StoreNode {
    fn default() -> Self {
        Self::Branch(BTreeMap::new())
    }
}

///
/// ResultStore
///
/// Write-once nested mapping from plan position to resolved rows. Each
/// path is written at most once per evaluation; a second write is an
/// invariant violation, not an overwrite.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ResultStore {
    root: StoreNode,
    leaves: usize,
}

impl ResultStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn root(&self) -> &StoreNode {
        &self.root
    }

    /// Number of stored leaf results.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.leaves
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.leaves == 0
    }

    pub fn insert(&mut self, path: &Path, rows: IdentitySet) -> Result<(), EvaluateError> {
        let collision = || EvaluateError::PathCollision {
            path: path.to_string(),
        };
        let Some((last, parents)) = path.segments().split_last() else {
            return Err(collision());
        };

        let mut node = &mut self.root;
        for segment in parents {
            let StoreNode::Branch(map) = node else {
                return Err(collision());
            };
            node = map.entry(segment.clone()).or_default();
        }

        let StoreNode::Branch(map) = node else {
            return Err(collision());
        };
        if map.contains_key(last) {
            return Err(collision());
        }
        map.insert(last.clone(), StoreNode::Rows(rows));
        self.leaves += 1;

        Ok(())
    }

    #[must_use]
    pub fn get(&self, path: &Path) -> Option<&StoreNode> {
        let mut node = &self.root;
        for segment in path.segments() {
            node = node.as_branch()?.get(segment)?;
        }

        Some(node)
    }

    /// Rows stored for the leaf at `path`.
    #[must_use]
    pub fn rows_at(&self, path: &Path) -> Option<&IdentitySet> {
        self.get(path).and_then(StoreNode::as_rows)
    }

    /// Every stored leaf with its path, in key order.
    #[must_use]
    pub fn entries(&self) -> Vec<(Path, &IdentitySet)> {
        let mut out = Vec::with_capacity(self.leaves);
        let mut trail = PathTrail::new();
        let mut stack = vec![(None, &self.root)];

        while let Some((at, node)) = stack.pop() {
            match node {
                StoreNode::Rows(rows) => {
                    let path = at.map_or_else(Path::root, |at| trail.path(&Path::root(), at));
                    out.push((path, rows));
                }
                StoreNode::Branch(map) => {
                    for (segment, child) in map.iter().rev() {
                        stack.push((Some(trail.push(at, segment.clone())), child));
                    }
                }
            }
        }

        out
    }
}

impl Drop for ResultStore {
    fn drop(&mut self) {
        let mut stack = vec![std::mem::take(&mut self.root)];
        while let Some(node) = stack.pop() {
            if let StoreNode::Branch(map) = node {
                stack.extend(map.into_values());
            }
        }
    }
}
