//! Deterministic plan fingerprinting.
//!
//! Used to correlate trace events of one evaluation, including nested
//! pipeline runs triggered from inside resolvers.

use crate::plan::{Node, Plan};
use sha2::{Digest, Sha256};
use std::fmt;

///
/// PlanFingerprint
///
/// Stable, deterministic fingerprint for filter plans.
///

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct PlanFingerprint([u8; 32]);

impl PlanFingerprint {
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    #[must_use]
    pub fn as_hex(&self) -> String {
        let mut out = String::with_capacity(64);
        for byte in self.0 {
            use std::fmt::Write as _;
            let _ = write!(out, "{byte:02x}");
        }
        out
    }

    /// First eight hex digits, enough to tell plans apart in traces.
    #[must_use]
    pub fn short(&self) -> String {
        let mut hex = self.as_hex();
        hex.truncate(8);
        hex
    }
}

impl fmt::Display for PlanFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_hex())
    }
}

impl Plan {
    /// Compute a stable fingerprint for this plan.
    #[must_use]
    pub fn fingerprint(&self) -> PlanFingerprint {
        let mut hasher = Sha256::new();
        hasher.update(b"planfp:v1");

        match &self.root {
            None => write_tag(&mut hasher, 0x00),
            Some(root) => hash_node(&mut hasher, root),
        }

        let digest = hasher.finalize();
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);

        PlanFingerprint(out)
    }
}

// Pre-order walk with an explicit stack; tags delimit structure.
fn hash_node(hasher: &mut Sha256, root: &Node) {
    let mut stack = vec![root];

    while let Some(node) = stack.pop() {
        match node {
            Node::Leaf(leaf) => {
                write_tag(hasher, 0x01);
                write_str(hasher, &leaf.filter_name);
                write_str(hasher, &leaf.instruction);
            }
            Node::And(children) => {
                write_tag(hasher, 0x02);
                write_len(hasher, children.len());
                stack.extend(children.iter().rev());
            }
            Node::Or(children) => {
                write_tag(hasher, 0x03);
                write_len(hasher, children.len());
                stack.extend(children.iter().rev());
            }
            Node::Not { a, b } => {
                write_tag(hasher, 0x04);
                stack.push(b);
                stack.push(a);
            }
        }
    }
}

fn write_tag(hasher: &mut Sha256, tag: u8) {
    hasher.update([tag]);
}

fn write_len(hasher: &mut Sha256, len: usize) {
    hasher.update((len as u64).to_be_bytes());
}

fn write_str(hasher: &mut Sha256, s: &str) {
    write_len(hasher, s.len());
    hasher.update(s.as_bytes());
}
