// SPDX-License-Identifier: MIT OR Apache-2.0
//! Generator node definitions.
//!
//! A node splits into a data half ([`GeneratorNode`]: identity, name,
//! slots) and a behavior half (a boxed [`Generator`]). The behavior
//! creates the node's slots during initialization, recomputes slot
//! activation on update, and hands out a resumable [`GenerationTask`]
//! when the node is generated.

use crate::error::GraphError;
use crate::slot::{InputSlot, OutputSlot};
use crate::task::GenerationTask;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fallback duration hint for generators that do not set one
pub const DEFAULT_DURATION_HINT_SECS: f32 = 0.01;

/// Unique identifier for a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub Uuid);

impl NodeId {
    /// Create a new random node ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

/// Declaration that one of a node's outputs structurally references
/// another of its own slots.
///
/// The store uses these to decide transitive persistence: if the `output`
/// persists, whatever `uses` names (another output, or an input whose
/// source then stands in for it) must persist too. Link chains must be
/// acyclic; a cycle is a precondition violation reported as
/// [`GraphError::CyclicInternalLinks`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalLink {
    /// Name of the referencing output slot
    pub output: String,
    /// Name of the referenced slot on the same node (input or output)
    pub uses: String,
}

/// Behavior of a generator node
pub trait Generator: Send {
    /// Registry key for this generator type
    fn type_name(&self) -> &'static str;

    /// One-time slot and default-value construction.
    ///
    /// Called once at node creation and again on explicit reset; must be
    /// idempotent in the sense that repeated invocations produce an
    /// equivalent slot layout.
    fn initialize(&mut self, node: &mut NodeBuilder<'_>);

    /// Recompute slot activation from the generator's configuration.
    ///
    /// The owning set force-disconnects every slot left inactive once
    /// this hook returns.
    fn on_update(&mut self, _slots: &mut SlotToggles<'_>) {}

    /// Extra generation preconditions beyond connected required inputs
    fn can_generate_extra(&self, _node: &GeneratorNode) -> bool {
        true
    }

    /// Structural references between this node's own slots
    fn internal_links(&self) -> Vec<InternalLink> {
        Vec::new()
    }

    /// Begin the node's resumable generation procedure
    fn begin_generation(&mut self) -> Box<dyn GenerationTask>;

    /// Encode the generator's configuration for persistence
    fn config_ron(&self) -> Result<String, GraphError> {
        Ok(String::new())
    }

    /// Restore the generator's configuration from a persisted encoding
    fn restore_config(&mut self, _ron: &str) -> Result<(), GraphError> {
        Ok(())
    }
}

/// Slot construction surface handed to [`Generator::initialize`]
pub struct NodeBuilder<'a> {
    pub(crate) inputs: &'a mut Vec<InputSlot>,
    pub(crate) outputs: &'a mut Vec<OutputSlot>,
    pub(crate) duration_hint_secs: &'a mut f32,
}

impl NodeBuilder<'_> {
    /// Add an input slot, returning its ID
    pub fn input(&mut self, slot: InputSlot) -> crate::slot::SlotId {
        let id = slot.id;
        self.inputs.push(slot);
        id
    }

    /// Add an output slot, returning its ID
    pub fn output(&mut self, slot: OutputSlot) -> crate::slot::SlotId {
        let id = slot.id;
        self.outputs.push(slot);
        id
    }

    /// Set the estimated generation duration hint, in seconds.
    ///
    /// Used only for progress-bar weighting, never for scheduling.
    pub fn duration_hint(&mut self, secs: f32) {
        *self.duration_hint_secs = secs.max(f32::EPSILON);
    }
}

/// Activation toggles handed to [`Generator::on_update`]
pub struct SlotToggles<'a> {
    pub(crate) inputs: &'a mut Vec<InputSlot>,
    pub(crate) outputs: &'a mut Vec<OutputSlot>,
}

impl SlotToggles<'_> {
    /// Set an input slot's activation flag
    pub fn set_input_active(&mut self, name: &str, active: bool) {
        if let Some(slot) = self.inputs.iter_mut().find(|s| s.name == name) {
            slot.active = active;
        }
    }

    /// Set an output slot's activation flag
    pub fn set_output_active(&mut self, name: &str, active: bool) {
        if let Some(slot) = self.outputs.iter_mut().find(|s| s.name == name) {
            slot.active = active;
        }
    }
}

/// A generator node: identity, persistence name, slots, and behavior
pub struct GeneratorNode {
    /// Unique instance ID
    pub id: NodeId,
    /// Node name; the persistence key, unique within its set
    pub name: String,
    /// Estimated generation duration in seconds (progress weighting)
    pub duration_hint_secs: f32,
    pub(crate) inputs: Vec<InputSlot>,
    pub(crate) outputs: Vec<OutputSlot>,
    pub(crate) behavior: Box<dyn Generator>,
}

impl GeneratorNode {
    /// Create a node and run the behavior's one-time initialization
    pub fn new(name: impl Into<String>, mut behavior: Box<dyn Generator>) -> Self {
        let mut inputs = Vec::new();
        let mut outputs = Vec::new();
        let mut duration_hint_secs = DEFAULT_DURATION_HINT_SECS;
        {
            let mut builder = NodeBuilder {
                inputs: &mut inputs,
                outputs: &mut outputs,
                duration_hint_secs: &mut duration_hint_secs,
            };
            behavior.initialize(&mut builder);
        }
        Self {
            id: NodeId::new(),
            name: name.into(),
            duration_hint_secs,
            inputs,
            outputs,
            behavior,
        }
    }

    /// Registry key of the node's generator type
    pub fn type_name(&self) -> &'static str {
        self.behavior.type_name()
    }

    /// The node's input slots, in declaration order
    pub fn inputs(&self) -> &[InputSlot] {
        &self.inputs
    }

    /// The node's output slots, in declaration order
    pub fn outputs(&self) -> &[OutputSlot] {
        &self.outputs
    }

    /// Find an input slot by name
    pub fn input_named(&self, name: &str) -> Option<&InputSlot> {
        self.inputs.iter().find(|s| s.name == name)
    }

    /// Find an output slot by name
    pub fn output_named(&self, name: &str) -> Option<&OutputSlot> {
        self.outputs.iter().find(|s| s.name == name)
    }

    pub(crate) fn output_named_mut(&mut self, name: &str) -> Option<&mut OutputSlot> {
        self.outputs.iter_mut().find(|s| s.name == name)
    }

    /// Encode the generator's configuration for persistence
    pub fn config_ron(&self) -> Result<String, GraphError> {
        self.behavior.config_ron()
    }

    /// Structural references between this node's own slots
    pub fn internal_links(&self) -> Vec<InternalLink> {
        self.behavior.internal_links()
    }
}

impl std::fmt::Debug for GeneratorNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratorNode")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("type", &self.type_name())
            .field("inputs", &self.inputs.len())
            .field("outputs", &self.outputs.len())
            .finish()
    }
}
