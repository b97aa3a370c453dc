// SPDX-License-Identifier: MIT OR Apache-2.0
//! Slot definitions for generator inputs/outputs.

use crate::artifact::{Artifact, ArtifactType};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotId(pub Uuid);

impl SlotId {
    /// Create a new random slot ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SlotId {
    fn default() -> Self {
        Self::new()
    }
}

/// Slot direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotDirection {
    /// Consumes an artifact
    Input,
    /// Produces an artifact
    Output,
}

/// Whether a produced artifact outlives the generation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Availability {
    /// Persisted and kept up to date throughout the run
    Always,
    /// Intermediate result, dropped when the run completes
    DuringGeneration,
    /// Persisted once the run completes
    #[default]
    AfterGeneration,
}

/// A consuming connection point on a generator node.
///
/// Connection state (`source`) is mutated only by the owning
/// [`NodeSet`](crate::node_set::NodeSet) so that it always stays mutually
/// consistent with the source output's consumer list.
#[derive(Debug)]
pub struct InputSlot {
    /// Unique slot ID
    pub id: SlotId,
    /// Slot name, unique within the owning node
    pub name: String,
    pub(crate) artifact_type: ArtifactType,
    /// Optional inputs never block generation when unconnected
    pub optional: bool,
    /// Whether the node mutates the consumed artifact in place
    pub mutating: bool,
    /// Inactive slots are force-disconnected at the end of every update cycle
    pub active: bool,
    pub(crate) source: Option<SlotId>,
}

impl InputSlot {
    /// Create an input slot declaring payload type `T`
    pub fn of<T: std::any::Any>(name: impl Into<String>) -> Self {
        Self::new(name, ArtifactType::of::<T>())
    }

    /// Create an input slot with an explicit declared type
    pub fn new(name: impl Into<String>, artifact_type: ArtifactType) -> Self {
        Self {
            id: SlotId::new(),
            name: name.into(),
            artifact_type,
            optional: false,
            mutating: false,
            active: true,
            source: None,
        }
    }

    /// Mark as optional
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Mark as mutating the consumed artifact
    pub fn mutating(mut self) -> Self {
        self.mutating = true;
        self
    }

    /// The slot's declared payload type
    pub fn artifact_type(&self) -> ArtifactType {
        self.artifact_type
    }

    /// The output slot currently feeding this input, if any
    pub fn source(&self) -> Option<SlotId> {
        self.source
    }

    /// Whether a source is connected
    pub fn is_connected(&self) -> bool {
        self.source.is_some()
    }
}

/// A producing connection point on a generator node.
#[derive(Debug)]
pub struct OutputSlot {
    /// Unique slot ID
    pub id: SlotId,
    /// Slot name, unique within the owning node
    pub name: String,
    pub(crate) artifact_type: ArtifactType,
    /// Inactive slots are force-disconnected at the end of every update cycle
    pub active: bool,
    /// Governs whether the produced artifact is retained after the run
    pub availability: Availability,
    /// Optional store grouping path; grouped artifacts persist as discrete files
    pub grouping_path: Option<String>,
    pub(crate) consumers: Vec<SlotId>,
    pub(crate) artifact: Option<Artifact>,
}

impl OutputSlot {
    /// Create an output slot declaring payload type `T`
    pub fn of<T: std::any::Any>(name: impl Into<String>) -> Self {
        Self::new(name, ArtifactType::of::<T>())
    }

    /// Create an output slot with an explicit declared type
    pub fn new(name: impl Into<String>, artifact_type: ArtifactType) -> Self {
        Self {
            id: SlotId::new(),
            name: name.into(),
            artifact_type,
            active: true,
            availability: Availability::default(),
            grouping_path: None,
            consumers: Vec::new(),
            artifact: None,
        }
    }

    /// Set the availability tri-state
    pub fn available(mut self, availability: Availability) -> Self {
        self.availability = availability;
        self
    }

    /// Set the store grouping path
    pub fn grouped(mut self, path: impl Into<String>) -> Self {
        self.grouping_path = Some(path.into());
        self
    }

    /// The slot's declared payload type
    pub fn artifact_type(&self) -> ArtifactType {
        self.artifact_type
    }

    /// Input slots currently fed by this output
    pub fn consumers(&self) -> &[SlotId] {
        &self.consumers
    }

    /// The artifact produced during the current or last run, if any
    pub fn artifact(&self) -> Option<&Artifact> {
        self.artifact.as_ref()
    }

    /// Store a produced artifact on this slot
    pub fn set_artifact(&mut self, artifact: Artifact) {
        self.artifact = Some(artifact);
    }

    /// Drop the produced artifact
    pub fn clear_artifact(&mut self) {
        self.artifact = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_builder_flags() {
        let slot = InputSlot::of::<String>("surface").optional().mutating();
        assert!(slot.optional);
        assert!(slot.mutating);
        assert!(slot.active);
        assert!(!slot.is_connected());
    }

    #[test]
    fn test_output_defaults() {
        let slot = OutputSlot::of::<String>("mesh");
        assert_eq!(slot.availability, Availability::AfterGeneration);
        assert!(slot.active);
        assert!(slot.consumers().is_empty());
        assert!(slot.artifact().is_none());
    }

    #[test]
    fn test_output_grouping() {
        let slot = OutputSlot::of::<String>("colors")
            .available(Availability::DuringGeneration)
            .grouped("attributes");
        assert_eq!(slot.availability, Availability::DuringGeneration);
        assert_eq!(slot.grouping_path.as_deref(), Some("attributes"));
    }
}
