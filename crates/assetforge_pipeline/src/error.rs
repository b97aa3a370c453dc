// SPDX-License-Identifier: MIT OR Apache-2.0
//! Error types for the pipeline executive.

use assetforge_graph::{GraphError, TaskError};
use assetforge_store::StoreError;

/// Error raised by the executive or a generation run
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A generation run is already active on this executive
    #[error("a generation run is already active")]
    AlreadyGenerating,

    /// No generation run is active
    #[error("no generation run is active")]
    NotGenerating,

    /// Node list and connection edits are refused mid-run
    #[error("cannot {operation} while a generation run is active")]
    MutationWhileGenerating {
        /// The refused operation
        operation: &'static str,
    },

    /// A node's generation preconditions do not hold
    #[error("node `{node}` is not ready to generate")]
    NodeNotReady {
        /// Name of the unready node
        node: String,
    },

    /// A persisted pipeline references an unregistered generator type
    #[error("unknown generator type `{type_name}`")]
    UnknownGenerator {
        /// The unresolved type name
        type_name: String,
    },

    /// A node's own computation failed, aborting the run
    #[error("node `{node}` failed: {source}")]
    Node {
        /// Name of the failing node
        node: String,
        /// The underlying task error
        source: TaskError,
    },

    /// A background-thread fault, re-raised on the driving thread
    #[error("background work failed: {0}")]
    Worker(TaskError),

    /// Graph-side failure (cycle, missing node, bad connection)
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Artifact-store failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Pipeline file could not be encoded/decoded
    #[error("pipeline file: {0}")]
    Format(String),

    /// The pipeline file was written by a newer version of this crate
    #[error("pipeline format version {found} is newer than supported version {supported}")]
    VersionNewer {
        /// Version found in the file
        found: u32,
        /// Highest version this build understands
        supported: u32,
    },

    /// Filesystem failure while reading or writing a pipeline file
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
