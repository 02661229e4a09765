use crate::plan::{Node, Operator};
use std::{collections::HashMap, fmt};

///
/// Side
/// Operand slot of a `NOT` node: the result is `A - B`.
///

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Side {
    A,
    B,
}

impl Side {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

///
/// SegmentKind
///
/// What a path segment labels. The merge engine dispatches on this,
/// never on the rendered text, so a filter called `"AND"` cannot be
/// mistaken for an operator.
///

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum SegmentKind {
    Op(Operator),
    Operand(Side),
    Filter(String),
}

impl SegmentKind {
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::Op(op) => op.tag(),
            Self::Operand(side) => side.label(),
            Self::Filter(name) => name,
        }
    }
}

///
/// Segment
///
/// One step of a tree position. `ordinal` disambiguates siblings that
/// share a label (two `package` leaves under one `OR`, or two nested
/// `AND`s); the first occurrence keeps ordinal 0 and renders bare.
///

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Segment {
    kind: SegmentKind,
    ordinal: u32,
}

impl Segment {
    #[must_use]
    pub const fn new(kind: SegmentKind) -> Self {
        Self { kind, ordinal: 0 }
    }

    #[must_use]
    pub const fn with_ordinal(kind: SegmentKind, ordinal: u32) -> Self {
        Self { kind, ordinal }
    }

    #[must_use]
    pub const fn op(op: Operator) -> Self {
        Self::new(SegmentKind::Op(op))
    }

    #[must_use]
    pub const fn operand(side: Side) -> Self {
        Self::new(SegmentKind::Operand(side))
    }

    #[must_use]
    pub fn filter(name: impl Into<String>) -> Self {
        Self::new(SegmentKind::Filter(name.into()))
    }

    #[must_use]
    pub const fn kind(&self) -> &SegmentKind {
        &self.kind
    }

    #[must_use]
    pub const fn ordinal(&self) -> u32 {
        self.ordinal
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind.label())?;
        if self.ordinal > 0 {
            write!(f, "#{}", self.ordinal)?;
        }

        Ok(())
    }
}

/// Assign each child of an `AND`/`OR` its own segment, numbering repeated
/// labels in document order so no two siblings collide.
#[must_use]
pub fn sibling_segments(children: &[Node]) -> Vec<Segment> {
    let mut seen: HashMap<SegmentKind, u32> = HashMap::new();

    children
        .iter()
        .map(|child| {
            let kind = child.own_kind();
            let ordinal = seen.entry(kind.clone()).or_insert(0);
            let segment = Segment::with_ordinal(kind, *ordinal);
            *ordinal += 1;

            segment
        })
        .collect()
}

///
/// Path
///
/// Ordered segment list identifying a tree position; also the key chain
/// of the result store. Rendered as `OR/NOT/A/id`.
///

#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Path(Vec<Segment>);

impl Path {
    #[must_use]
    pub const fn root() -> Self {
        Self(Vec::new())
    }

    #[must_use]
    pub fn from_segments(segments: Vec<Segment>) -> Self {
        Self(segments)
    }

    /// Extend this path by one segment.
    #[must_use]
    pub fn child(&self, segment: Segment) -> Self {
        let mut segments = Vec::with_capacity(self.0.len() + 1);
        segments.extend_from_slice(&self.0);
        segments.push(segment);

        Self(segments)
    }

    /// Extend this path into one operand of a `NOT` holding `node`.
    #[must_use]
    pub fn operand(&self, side: Side, node: &Node) -> Self {
        self.child(Segment::operand(side))
            .child(Segment::new(node.own_kind()))
    }

    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    #[must_use]
    pub fn last(&self) -> Option<&Segment> {
        self.0.last()
    }

    #[must_use]
    pub const fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("/");
        }

        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            write!(f, "{segment}")?;
        }

        Ok(())
    }
}

///
/// PathTrail
///
/// Parent-linked segment arena for iterative tree walks. A walk records
/// one segment per visited node and builds a full `Path` only where one
/// is needed (a leaf, an error), so the walk itself stays linear.
///

#[derive(Debug, Default)]
pub(crate) struct PathTrail {
    links: Vec<(Option<usize>, Segment)>,
}

impl PathTrail {
    pub(crate) const fn new() -> Self {
        Self { links: Vec::new() }
    }

    /// Record `segment` below the entry `parent` (`None` for a top-level
    /// entry) and return the new entry's index.
    pub(crate) fn push(&mut self, parent: Option<usize>, segment: Segment) -> usize {
        self.links.push((parent, segment));
        self.links.len() - 1
    }

    /// `base` followed by every segment from the top-level entry down to `at`.
    pub(crate) fn path(&self, base: &Path, at: usize) -> Path {
        let mut chain = Vec::new();
        let mut next = Some(at);
        while let Some((parent, segment)) = next.and_then(|i| self.links.get(i)) {
            chain.push(segment.clone());
            next = *parent;
        }

        let mut segments = Vec::with_capacity(base.len() + chain.len());
        segments.extend_from_slice(base.segments());
        segments.extend(chain.into_iter().rev());

        Path(segments)
    }
}
