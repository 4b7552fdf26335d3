//! Actor addresses

use serde::{Deserialize, Serialize};
use std::fmt;

/// Node value used by every address in a single-node system
pub const LOCAL_NODE: u32 = 0;

/// Opaque, system-unique identifier of an actor or port.
///
/// Sequence numbers are issued monotonically by the registry that owns the
/// address and are never reused within one system instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address {
    node: u32,
    sequence: u64,
}

impl Address {
    pub(crate) fn new(node: u32, sequence: u64) -> Self {
        Self { node, sequence }
    }

    pub fn node(&self) -> u32 {
        self.node
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}.{}>", self.node, self.sequence)
    }
}
