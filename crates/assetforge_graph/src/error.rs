// SPDX-License-Identifier: MIT OR Apache-2.0
//! Error types for graph construction and mutation.

use crate::node::NodeId;
use crate::slot::SlotId;

/// Error when building or mutating the generator graph
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// Node not found
    #[error("node not found: {0:?}")]
    NodeNotFound(NodeId),

    /// Slot not found
    #[error("slot not found: {0:?}")]
    SlotNotFound(SlotId),

    /// A connection must run from an output slot to an input slot
    #[error("connection endpoints reversed or of the same direction")]
    DirectionMismatch,

    /// A node may not consume its own outputs
    #[error("node `{node}` cannot connect to its own output")]
    SelfConnection {
        /// Name of the offending node
        node: String,
    },

    /// Incompatible slot payload types
    #[error("cannot connect `{found}` output to `{expected}` input")]
    TypeMismatch {
        /// Type declared by the input slot
        expected: String,
        /// Type declared by the output slot
        found: String,
    },

    /// Node is already a member of the set
    #[error("node already present: {0:?}")]
    DuplicateNode(NodeId),

    /// Node names are persistence keys and must be unique within a set
    #[error("a node named `{0}` already exists")]
    DuplicateName(String),

    /// The dependency edges contain a cycle
    #[error("dependency cycle among nodes: {}", .remaining.join(", "))]
    Cycle {
        /// Names of the nodes left unordered by the resolver
        remaining: Vec<String>,
    },

    /// A node declared internal links that loop back on themselves
    #[error("node `{node}` declares cyclic internal links")]
    CyclicInternalLinks {
        /// Name of the offending node
        node: String,
    },

    /// Generator configuration could not be encoded or decoded
    #[error("generator config: {message}")]
    Config {
        /// Underlying encode/decode failure
        message: String,
    },
}
