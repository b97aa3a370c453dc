// SPDX-License-Identifier: MIT OR Apache-2.0
//! The artifact-store contract.

use crate::descriptor::{OutputDescriptor, PersistedArtifact, RunLocation};
use assetforge_graph::{Artifact, Availability, SlotId};
use std::collections::BTreeSet;

/// Error raised by an artifact store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Filesystem failure
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Index or artifact file could not be encoded/decoded
    #[error("store format: {0}")]
    Format(String),

    /// The on-disk index was written by a newer version of this crate
    #[error("store format version {found} is newer than supported version {supported}")]
    VersionNewer {
        /// Version found in the index file
        found: u32,
        /// Highest version this build understands
        supported: u32,
    },

    /// A path collision could not be resolved by displacement
    #[error("path `{path}` is occupied by a file this store does not own")]
    AmbiguousOwnership {
        /// The contested path
        path: String,
    },

    /// The store has no established container location yet
    #[error("no container location has been established")]
    NoContainer,
}

/// Persistence backend for generated artifacts.
///
/// Implementations must preserve the identity of a previously persisted
/// artifact across regeneration when its type and grouping path are
/// unchanged, and relocate/rename on path or name changes. Failures leave
/// the store in whatever partially reconciled state it reached; no
/// rollback is attempted.
pub trait ArtifactStore {
    /// Refresh the store's view of its backing state (re-scan)
    fn sync(&mut self) -> Result<(), StoreError>;

    /// Ensure the container exists at the expected location, relocating a
    /// previously established container if the location changed
    fn ensure_container(&mut self, location: &RunLocation) -> Result<(), StoreError>;

    /// Whether an output's artifact must be persisted after the run.
    ///
    /// `forced` is the transitive closure of internal-link requirements
    /// computed by the executive.
    fn should_persist(&self, descriptor: &OutputDescriptor, forced: &BTreeSet<SlotId>) -> bool {
        descriptor.availability != Availability::DuringGeneration
            || descriptor.consumed_mutating
            || forced.contains(&descriptor.slot)
    }

    /// Persist an artifact, preserving a prior record's identity when the
    /// key and type still match
    fn persist(
        &mut self,
        descriptor: &OutputDescriptor,
        artifact: &Artifact,
    ) -> Result<PersistedArtifact, StoreError>;

    /// Drop any record held for a key
    fn clear(&mut self, key: &str) -> Result<(), StoreError>;

    /// Every path the store currently tracks
    fn known_paths(&self) -> BTreeSet<String>;

    /// Destroy every previously known record absent from the new sets.
    ///
    /// Embedded and discrete records are compared against their own new
    /// counterparts. Returns the number of destroyed records.
    fn reconcile(
        &mut self,
        new_embedded: &BTreeSet<String>,
        new_discrete: &BTreeSet<String>,
    ) -> Result<usize, StoreError>;

    /// Write out pending index state
    fn flush(&mut self) -> Result<(), StoreError>;

    /// Best-effort removal of now-empty directories left at an old location
    fn cleanup_locations(&mut self, old: &RunLocation) -> Result<(), StoreError>;
}

impl<S: ArtifactStore + ?Sized> ArtifactStore for Box<S> {
    fn sync(&mut self) -> Result<(), StoreError> {
        (**self).sync()
    }

    fn ensure_container(&mut self, location: &RunLocation) -> Result<(), StoreError> {
        (**self).ensure_container(location)
    }

    fn should_persist(&self, descriptor: &OutputDescriptor, forced: &BTreeSet<SlotId>) -> bool {
        (**self).should_persist(descriptor, forced)
    }

    fn persist(
        &mut self,
        descriptor: &OutputDescriptor,
        artifact: &Artifact,
    ) -> Result<PersistedArtifact, StoreError> {
        (**self).persist(descriptor, artifact)
    }

    fn clear(&mut self, key: &str) -> Result<(), StoreError> {
        (**self).clear(key)
    }

    fn known_paths(&self) -> BTreeSet<String> {
        (**self).known_paths()
    }

    fn reconcile(
        &mut self,
        new_embedded: &BTreeSet<String>,
        new_discrete: &BTreeSet<String>,
    ) -> Result<usize, StoreError> {
        (**self).reconcile(new_embedded, new_discrete)
    }

    fn flush(&mut self) -> Result<(), StoreError> {
        (**self).flush()
    }

    fn cleanup_locations(&mut self, old: &RunLocation) -> Result<(), StoreError> {
        (**self).cleanup_locations(old)
    }
}
