// SPDX-License-Identifier: MIT OR Apache-2.0
//! The node set: ordered generator nodes plus the slot lookup table.
//!
//! All connection state lives here. Slots carry their own `source` /
//! `consumers` fields, but only the set mutates them, so the two sides of
//! every connection stay mutually consistent by construction: an input's
//! source is `O` if and only if `O`'s consumer list contains that input.

use crate::error::GraphError;
use crate::node::{GeneratorNode, NodeBuilder, NodeId, SlotToggles};
use crate::slot::{InputSlot, OutputSlot, SlotDirection, SlotId};
use crate::task::GenerationTask;
use indexmap::IndexMap;
use std::collections::HashMap;

/// Ordered collection of generator nodes with centralized connection state
#[derive(Default)]
pub struct NodeSet {
    nodes: IndexMap<NodeId, GeneratorNode>,
    slots: HashMap<SlotId, (NodeId, SlotDirection)>,
}

impl NodeSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes in the set
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the set holds no nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in list order
    pub fn nodes(&self) -> impl Iterator<Item = &GeneratorNode> {
        self.nodes.values()
    }

    /// Node IDs in list order
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    /// Get a node by ID
    pub fn node(&self, id: NodeId) -> Option<&GeneratorNode> {
        self.nodes.get(&id)
    }

    /// Get a mutable node by ID
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut GeneratorNode> {
        self.nodes.get_mut(&id)
    }

    /// Find a node by its (unique) name
    pub fn node_named(&self, name: &str) -> Option<&GeneratorNode> {
        self.nodes.values().find(|n| n.name == name)
    }

    /// The node owning a slot
    pub fn slot_owner(&self, slot: SlotId) -> Option<NodeId> {
        self.slots.get(&slot).map(|(node, _)| *node)
    }

    /// Look up an input slot anywhere in the set
    pub fn input_slot(&self, slot: SlotId) -> Option<&InputSlot> {
        let (node, direction) = self.slots.get(&slot)?;
        if *direction != SlotDirection::Input {
            return None;
        }
        self.nodes.get(node)?.inputs.iter().find(|s| s.id == slot)
    }

    /// Look up an output slot anywhere in the set
    pub fn output_slot(&self, slot: SlotId) -> Option<&OutputSlot> {
        let (node, direction) = self.slots.get(&slot)?;
        if *direction != SlotDirection::Output {
            return None;
        }
        self.nodes.get(node)?.outputs.iter().find(|s| s.id == slot)
    }

    fn input_slot_mut(&mut self, slot: SlotId) -> Option<&mut InputSlot> {
        let (node, direction) = *self.slots.get(&slot)?;
        if direction != SlotDirection::Input {
            return None;
        }
        self.nodes
            .get_mut(&node)?
            .inputs
            .iter_mut()
            .find(|s| s.id == slot)
    }

    fn output_slot_mut(&mut self, slot: SlotId) -> Option<&mut OutputSlot> {
        let (node, direction) = *self.slots.get(&slot)?;
        if direction != SlotDirection::Output {
            return None;
        }
        self.nodes
            .get_mut(&node)?
            .outputs
            .iter_mut()
            .find(|s| s.id == slot)
    }

    // ------------------------------------------------------------------
    // List mutation
    // ------------------------------------------------------------------

    /// Whether `add` would succeed
    pub fn can_add(&self, node: &GeneratorNode) -> bool {
        !self.nodes.contains_key(&node.id) && self.node_named(&node.name).is_none()
    }

    /// Append a node to the list
    pub fn add(&mut self, node: GeneratorNode) -> Result<NodeId, GraphError> {
        self.insert(self.nodes.len(), node)
    }

    /// Whether `insert` would succeed
    pub fn can_insert(&self, node: &GeneratorNode) -> bool {
        self.can_add(node)
    }

    /// Insert a node at a list position
    pub fn insert(&mut self, index: usize, node: GeneratorNode) -> Result<NodeId, GraphError> {
        if self.nodes.contains_key(&node.id) {
            return Err(GraphError::DuplicateNode(node.id));
        }
        if self.node_named(&node.name).is_some() {
            return Err(GraphError::DuplicateName(node.name));
        }
        let id = node.id;
        self.register_slots(&node);
        let index = index.min(self.nodes.len());
        self.nodes.shift_insert(index, id, node);
        Ok(id)
    }

    /// Whether `remove` would succeed
    pub fn can_remove(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Remove a node, disconnecting every reference to it.
    ///
    /// Inputs on surviving nodes that pointed at one of the removed
    /// node's outputs are disconnected.
    pub fn remove(&mut self, id: NodeId) -> Result<GeneratorNode, GraphError> {
        if !self.nodes.contains_key(&id) {
            return Err(GraphError::NodeNotFound(id));
        }
        let own_inputs: Vec<SlotId> = self.nodes[&id].inputs.iter().map(|s| s.id).collect();
        for input in own_inputs {
            self.set_source(input, None)?;
        }
        // Walk every remaining node and drop its references to the
        // removed node's outputs.
        let own_outputs: Vec<SlotId> = self.nodes[&id].outputs.iter().map(|s| s.id).collect();
        let others: Vec<NodeId> = self.node_ids().filter(|n| *n != id).collect();
        for output in &own_outputs {
            for other in &others {
                self.reset_dependency(*other, *output)?;
            }
        }
        let node = self
            .nodes
            .shift_remove(&id)
            .ok_or(GraphError::NodeNotFound(id))?;
        self.unregister_slots(&node);
        Ok(node)
    }

    /// Whether `move_up` would succeed
    pub fn can_move_up(&self, id: NodeId) -> bool {
        self.nodes.get_index_of(&id).is_some_and(|i| i > 0)
    }

    /// Move a node one position earlier in the list
    pub fn move_up(&mut self, id: NodeId) -> Result<(), GraphError> {
        let index = self
            .nodes
            .get_index_of(&id)
            .ok_or(GraphError::NodeNotFound(id))?;
        if index > 0 {
            self.nodes.swap_indices(index, index - 1);
        }
        Ok(())
    }

    /// Whether `move_down` would succeed
    pub fn can_move_down(&self, id: NodeId) -> bool {
        self.nodes
            .get_index_of(&id)
            .is_some_and(|i| i + 1 < self.nodes.len())
    }

    /// Move a node one position later in the list
    pub fn move_down(&mut self, id: NodeId) -> Result<(), GraphError> {
        let index = self
            .nodes
            .get_index_of(&id)
            .ok_or(GraphError::NodeNotFound(id))?;
        if index + 1 < self.nodes.len() {
            self.nodes.swap_indices(index, index + 1);
        }
        Ok(())
    }

    fn register_slots(&mut self, node: &GeneratorNode) {
        for slot in &node.inputs {
            self.slots.insert(slot.id, (node.id, SlotDirection::Input));
        }
        for slot in &node.outputs {
            self.slots.insert(slot.id, (node.id, SlotDirection::Output));
        }
    }

    fn unregister_slots(&mut self, node: &GeneratorNode) {
        for slot in &node.inputs {
            self.slots.remove(&slot.id);
        }
        for slot in &node.outputs {
            self.slots.remove(&slot.id);
        }
    }

    // ------------------------------------------------------------------
    // Connections
    // ------------------------------------------------------------------

    /// Connect an output slot to an input slot.
    ///
    /// Idempotent when the connection already exists. A prior source on
    /// the input is disconnected first. Validates direction, payload-type
    /// compatibility, and that the endpoints belong to different nodes.
    pub fn connect(&mut self, input: SlotId, output: SlotId) -> Result<(), GraphError> {
        let (in_node, in_dir) = *self
            .slots
            .get(&input)
            .ok_or(GraphError::SlotNotFound(input))?;
        let (out_node, out_dir) = *self
            .slots
            .get(&output)
            .ok_or(GraphError::SlotNotFound(output))?;
        if in_dir != SlotDirection::Input || out_dir != SlotDirection::Output {
            return Err(GraphError::DirectionMismatch);
        }
        if in_node == out_node {
            let node = self
                .node(in_node)
                .map(|n| n.name.clone())
                .unwrap_or_default();
            return Err(GraphError::SelfConnection { node });
        }
        let in_type = self
            .input_slot(input)
            .ok_or(GraphError::SlotNotFound(input))?
            .artifact_type();
        let out_type = self
            .output_slot(output)
            .ok_or(GraphError::SlotNotFound(output))?
            .artifact_type();
        if !out_type.is_compatible_with(&in_type) {
            return Err(GraphError::TypeMismatch {
                expected: in_type.name().to_string(),
                found: out_type.name().to_string(),
            });
        }

        let prior = self
            .input_slot(input)
            .ok_or(GraphError::SlotNotFound(input))?
            .source;
        if prior == Some(output) {
            return Ok(());
        }
        if let Some(prior) = prior {
            if let Some(slot) = self.output_slot_mut(prior) {
                slot.consumers.retain(|c| *c != input);
            }
        }
        if let Some(slot) = self.output_slot_mut(output) {
            if !slot.consumers.contains(&input) {
                slot.consumers.push(input);
            }
        }
        if let Some(slot) = self.input_slot_mut(input) {
            slot.source = Some(output);
        }
        Ok(())
    }

    /// Disconnect an input from an output; no-op if not connected
    pub fn disconnect(&mut self, input: SlotId, output: SlotId) -> Result<(), GraphError> {
        if !self.slots.contains_key(&input) {
            return Err(GraphError::SlotNotFound(input));
        }
        let connected = self
            .input_slot(input)
            .is_some_and(|s| s.source == Some(output));
        if !connected {
            return Ok(());
        }
        if let Some(slot) = self.input_slot_mut(input) {
            slot.source = None;
        }
        if let Some(slot) = self.output_slot_mut(output) {
            slot.consumers.retain(|c| *c != input);
        }
        Ok(())
    }

    /// Disconnect every consumer of an output
    pub fn disconnect_all(&mut self, output: SlotId) -> Result<(), GraphError> {
        let consumers = self
            .output_slot(output)
            .ok_or(GraphError::SlotNotFound(output))?
            .consumers
            .clone();
        for input in consumers {
            self.disconnect(input, output)?;
        }
        Ok(())
    }

    /// Set or clear an input's source.
    ///
    /// Setting the current source again is an observable no-op.
    pub fn set_source(&mut self, input: SlotId, source: Option<SlotId>) -> Result<(), GraphError> {
        match source {
            Some(output) => self.connect(input, output),
            None => {
                let prior = self
                    .input_slot(input)
                    .ok_or(GraphError::SlotNotFound(input))?
                    .source;
                match prior {
                    Some(output) => self.disconnect(input, output),
                    None => Ok(()),
                }
            }
        }
    }

    /// Disconnect every input of `node` whose source is `output`.
    ///
    /// Invoked for each remaining node when the output's owner is removed.
    pub fn reset_dependency(&mut self, node: NodeId, output: SlotId) -> Result<(), GraphError> {
        let inputs: Vec<SlotId> = self
            .nodes
            .get(&node)
            .ok_or(GraphError::NodeNotFound(node))?
            .inputs
            .iter()
            .filter(|s| s.source == Some(output))
            .map(|s| s.id)
            .collect();
        for input in inputs {
            self.set_source(input, None)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Update cycle / generation readiness
    // ------------------------------------------------------------------

    /// Run a node's activation hook, then force-disconnect every slot the
    /// hook left inactive.
    pub fn update(&mut self, id: NodeId) -> Result<(), GraphError> {
        {
            let node = self.nodes.get_mut(&id).ok_or(GraphError::NodeNotFound(id))?;
            let GeneratorNode {
                inputs,
                outputs,
                behavior,
                ..
            } = node;
            let mut toggles = SlotToggles { inputs, outputs };
            behavior.on_update(&mut toggles);
        }
        let node = self.nodes.get(&id).ok_or(GraphError::NodeNotFound(id))?;
        let inactive_inputs: Vec<SlotId> = node
            .inputs
            .iter()
            .filter(|s| !s.active && s.source.is_some())
            .map(|s| s.id)
            .collect();
        let inactive_outputs: Vec<SlotId> = node
            .outputs
            .iter()
            .filter(|s| !s.active && !s.consumers.is_empty())
            .map(|s| s.id)
            .collect();
        for input in inactive_inputs {
            self.set_source(input, None)?;
        }
        for output in inactive_outputs {
            self.disconnect_all(output)?;
        }
        Ok(())
    }

    /// Run the update cycle on every node, in list order
    pub fn update_all(&mut self) -> Result<(), GraphError> {
        let ids: Vec<NodeId> = self.node_ids().collect();
        for id in ids {
            self.update(id)?;
        }
        Ok(())
    }

    /// Re-run a node's one-time initialization.
    ///
    /// Existing connections and slots are discarded and the behavior
    /// rebuilds its slot layout from scratch.
    pub fn reset(&mut self, id: NodeId) -> Result<(), GraphError> {
        let own_inputs: Vec<SlotId> = self
            .nodes
            .get(&id)
            .ok_or(GraphError::NodeNotFound(id))?
            .inputs
            .iter()
            .map(|s| s.id)
            .collect();
        for input in own_inputs {
            self.set_source(input, None)?;
        }
        let own_outputs: Vec<SlotId> = self.nodes[&id].outputs.iter().map(|s| s.id).collect();
        for output in &own_outputs {
            self.disconnect_all(*output)?;
        }
        {
            let node = self.nodes.get_mut(&id).ok_or(GraphError::NodeNotFound(id))?;
            for slot in &node.inputs {
                self.slots.remove(&slot.id);
            }
            for slot in &node.outputs {
                self.slots.remove(&slot.id);
            }
        }
        let node = self.nodes.get_mut(&id).ok_or(GraphError::NodeNotFound(id))?;
        node.inputs.clear();
        node.outputs.clear();
        {
            let GeneratorNode {
                inputs,
                outputs,
                duration_hint_secs,
                behavior,
                ..
            } = node;
            let mut builder = NodeBuilder {
                inputs,
                outputs,
                duration_hint_secs,
            };
            behavior.initialize(&mut builder);
        }
        let node = self.nodes.get(&id).ok_or(GraphError::NodeNotFound(id))?;
        let inputs: Vec<SlotId> = node.inputs.iter().map(|s| s.id).collect();
        let outputs: Vec<SlotId> = node.outputs.iter().map(|s| s.id).collect();
        for slot in inputs {
            self.slots.insert(slot, (id, SlotDirection::Input));
        }
        for slot in outputs {
            self.slots.insert(slot, (id, SlotDirection::Output));
        }
        Ok(())
    }

    /// Whether a node is ready to generate: every active required input
    /// has a source, and the behavior's extra preconditions hold.
    pub fn can_generate(&self, id: NodeId) -> Result<bool, GraphError> {
        let node = self.nodes.get(&id).ok_or(GraphError::NodeNotFound(id))?;
        let inputs_ok = node
            .inputs
            .iter()
            .filter(|s| s.active && !s.optional)
            .all(|s| s.source.is_some());
        Ok(inputs_ok && node.behavior.can_generate_extra(node))
    }

    /// Begin a node's resumable generation procedure
    pub fn begin_generation(
        &mut self,
        id: NodeId,
    ) -> Result<Box<dyn GenerationTask>, GraphError> {
        let node = self.nodes.get_mut(&id).ok_or(GraphError::NodeNotFound(id))?;
        Ok(node.behavior.begin_generation())
    }

    // ------------------------------------------------------------------
    // Derived dependency structure
    // ------------------------------------------------------------------

    /// The active, connected output slots of other nodes that this node's
    /// active inputs reference.
    pub fn dependencies(&self, id: NodeId) -> Result<Vec<SlotId>, GraphError> {
        let node = self.nodes.get(&id).ok_or(GraphError::NodeNotFound(id))?;
        let mut deps = Vec::new();
        for input in &node.inputs {
            if !input.active {
                continue;
            }
            let Some(source) = input.source else {
                continue;
            };
            if self.slot_owner(source) == Some(id) {
                continue;
            }
            if self.output_slot(source).is_some_and(|s| s.active) {
                deps.push(source);
            }
        }
        Ok(deps)
    }

    /// The nodes this node depends on, deduplicated, in input order
    pub fn dependency_nodes(&self, id: NodeId) -> Result<Vec<NodeId>, GraphError> {
        let mut nodes = Vec::new();
        for slot in self.dependencies(id)? {
            if let Some(owner) = self.slot_owner(slot) {
                if !nodes.contains(&owner) {
                    nodes.push(owner);
                }
            }
        }
        Ok(nodes)
    }

    /// Resolve every node's internal-link declarations to a slot-level
    /// table: persisted output → outputs it transitively requires.
    ///
    /// Links through an input resolve to the input's connected source.
    /// Returns [`GraphError::CyclicInternalLinks`] when the resolved link
    /// graph loops.
    pub fn internal_link_table(&self) -> Result<HashMap<SlotId, Vec<SlotId>>, GraphError> {
        let mut table: HashMap<SlotId, Vec<SlotId>> = HashMap::new();
        for node in self.nodes.values() {
            for link in node.internal_links() {
                let Some(from) = node.output_named(&link.output) else {
                    continue;
                };
                let target = if let Some(output) = node.output_named(&link.uses) {
                    Some(output.id)
                } else {
                    node.input_named(&link.uses).and_then(InputSlot::source)
                };
                if let Some(target) = target {
                    table.entry(from.id).or_default().push(target);
                }
            }
        }

        fn visit(
            slot: SlotId,
            table: &HashMap<SlotId, Vec<SlotId>>,
            marks: &mut HashMap<SlotId, u8>,
        ) -> Result<(), SlotId> {
            match marks.get(&slot) {
                Some(1) => return Err(slot),
                Some(2) => return Ok(()),
                _ => {}
            }
            marks.insert(slot, 1);
            if let Some(next) = table.get(&slot) {
                for target in next {
                    visit(*target, table, marks)?;
                }
            }
            marks.insert(slot, 2);
            Ok(())
        }

        let mut marks = HashMap::new();
        for slot in table.keys() {
            if let Err(offender) = visit(*slot, &table, &mut marks) {
                let node = self
                    .slot_owner(offender)
                    .and_then(|id| self.node(id))
                    .map(|n| n.name.clone())
                    .unwrap_or_default();
                return Err(GraphError::CyclicInternalLinks { node });
            }
        }
        Ok(table)
    }

    /// Drop produced artifacts that do not outlive a run.
    ///
    /// Called by the executive at run completion: output slots whose
    /// availability is `DuringGeneration` have their artifacts cleared.
    pub fn clear_transient_artifacts(&mut self) {
        for node in self.nodes.values_mut() {
            for output in &mut node.outputs {
                if output.availability == crate::slot::Availability::DuringGeneration {
                    output.clear_artifact();
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Persistence support
    // ------------------------------------------------------------------

    /// Reassign a freshly initialized node's slot IDs from persisted
    /// records, keyed by slot name.
    ///
    /// Only valid on a node with no connections; used when loading a
    /// pipeline so that saved connection pairs resolve again.
    pub fn restore_slot_ids(
        &mut self,
        id: NodeId,
        inputs: &[(String, SlotId)],
        outputs: &[(String, SlotId)],
    ) -> Result<(), GraphError> {
        for (name, saved) in inputs {
            let node = self.nodes.get_mut(&id).ok_or(GraphError::NodeNotFound(id))?;
            let slot = node
                .inputs
                .iter_mut()
                .find(|s| s.name == *name)
                .ok_or_else(|| GraphError::Config {
                    message: format!("no input slot named `{name}` to restore"),
                })?;
            let old = slot.id;
            slot.id = *saved;
            self.slots.remove(&old);
            self.slots.insert(*saved, (id, SlotDirection::Input));
        }
        for (name, saved) in outputs {
            let node = self.nodes.get_mut(&id).ok_or(GraphError::NodeNotFound(id))?;
            let slot = node
                .outputs
                .iter_mut()
                .find(|s| s.name == *name)
                .ok_or_else(|| GraphError::Config {
                    message: format!("no output slot named `{name}` to restore"),
                })?;
            let old = slot.id;
            slot.id = *saved;
            self.slots.remove(&old);
            self.slots.insert(*saved, (id, SlotDirection::Output));
        }
        Ok(())
    }
}
