// SPDX-License-Identifier: MIT OR Apache-2.0
//! Opaque artifact handles produced and consumed through slots.

use serde::{Deserialize, Serialize};
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Unique identifier for an artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArtifactId(pub Uuid);

impl ArtifactId {
    /// Create a new random artifact ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ArtifactId {
    fn default() -> Self {
        Self::new()
    }
}

/// Declared payload type of a slot or artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArtifactType {
    id: TypeId,
    name: &'static str,
}

impl ArtifactType {
    /// The artifact type describing payloads of type `T`
    pub fn of<T: Any>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Human-readable type name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Check if a payload of this type can flow into a slot declaring `other`
    pub fn is_compatible_with(&self, other: &ArtifactType) -> bool {
        self.id == other.id
    }
}

impl fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// An opaque computed result held by an output slot.
///
/// An artifact is an identity, a declared type, and a shared payload. The
/// payload has no structure the pipeline cares about; generators downcast
/// it back to the concrete type they agreed on through their slot types.
#[derive(Clone)]
pub struct Artifact {
    id: ArtifactId,
    artifact_type: ArtifactType,
    payload: Arc<dyn Any + Send + Sync>,
}

impl Artifact {
    /// Wrap a payload in a fresh artifact handle
    pub fn new<T: Any + Send + Sync>(payload: T) -> Self {
        Self {
            id: ArtifactId::new(),
            artifact_type: ArtifactType::of::<T>(),
            payload: Arc::new(payload),
        }
    }

    /// Wrap a payload while keeping a previously assigned identity
    pub fn with_id<T: Any + Send + Sync>(id: ArtifactId, payload: T) -> Self {
        Self {
            id,
            artifact_type: ArtifactType::of::<T>(),
            payload: Arc::new(payload),
        }
    }

    /// The artifact's identity
    pub fn id(&self) -> ArtifactId {
        self.id
    }

    /// The artifact's declared type
    pub fn artifact_type(&self) -> ArtifactType {
        self.artifact_type
    }

    /// Borrow the payload as `T`, if that is its concrete type
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }

    /// Clone out a shared handle to the payload as `T`
    pub fn payload<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.payload).downcast::<T>().ok()
    }
}

impl fmt::Debug for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Artifact")
            .field("id", &self.id)
            .field("type", &self.artifact_type.name)
            .finish_non_exhaustive()
    }
}
