// SPDX-License-Identifier: MIT OR Apache-2.0
//! The pipeline executive: owns the node set, the artifact store, and at
//! most one generation run at a time.
//!
//! The host drives a run by calling [`Executive::step`] repeatedly (once
//! per idle tick) until it reports [`RunStatus::Finished`], displaying
//! [`Executive::generation_progress`] and
//! [`Executive::generation_message`] meanwhile. An error from `step`
//! aborts the run; the host must surface it and stop resuming.

use crate::error::PipelineError;
use crate::run::{advance, RunState, RunStatus};
use crate::worker::WorkerBridge;
use assetforge_graph::{GeneratorNode, NodeId, NodeSet, SlotId};
use assetforge_store::{ArtifactStore, RunLocation};
use std::path::PathBuf;

/// Owner and driver of a generator node set
pub struct Executive<S: ArtifactStore> {
    pub(crate) nodes: NodeSet,
    pub(crate) store: S,
    pub(crate) worker: WorkerBridge,
    pub(crate) location: Option<RunLocation>,
    pub(crate) run: Option<RunState>,
    pub(crate) progress: f32,
    pub(crate) message: String,
}

impl<S: ArtifactStore> Executive<S> {
    /// Create an executive over an artifact store
    pub fn new(store: S) -> Self {
        Self {
            nodes: NodeSet::new(),
            store,
            worker: WorkerBridge::new(),
            location: None,
            run: None,
            progress: 0.0,
            message: String::new(),
        }
    }

    /// The node set (read-only; mutate through the executive's guarded ops)
    pub fn nodes(&self) -> &NodeSet {
        &self.nodes
    }

    /// The artifact store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The artifact store, mutably; not to be touched mid-run
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// The `(name, destination)` of the last started run, if any
    pub fn location(&self) -> Option<&RunLocation> {
        self.location.as_ref()
    }

    /// Whether a generation run is active
    pub fn is_generating(&self) -> bool {
        self.run.is_some()
    }

    /// Progress of the current run in `[0, 1]`; 1.0 after a completed run
    pub fn generation_progress(&self) -> f32 {
        self.progress
    }

    /// Status message of the current run
    pub fn generation_message(&self) -> &str {
        &self.message
    }

    fn ensure_idle(&self, operation: &'static str) -> Result<(), PipelineError> {
        if self.is_generating() {
            return Err(PipelineError::MutationWhileGenerating { operation });
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Guarded node-list mutation
    // ------------------------------------------------------------------

    /// Whether `add_node` would succeed
    pub fn can_add_node(&self, node: &GeneratorNode) -> bool {
        !self.is_generating() && self.nodes.can_add(node)
    }

    /// Append a node to the list
    pub fn add_node(&mut self, node: GeneratorNode) -> Result<NodeId, PipelineError> {
        self.ensure_idle("add a node")?;
        Ok(self.nodes.add(node)?)
    }

    /// Whether `insert_node` would succeed
    pub fn can_insert_node(&self, node: &GeneratorNode) -> bool {
        !self.is_generating() && self.nodes.can_insert(node)
    }

    /// Insert a node at a list position
    pub fn insert_node(
        &mut self,
        index: usize,
        node: GeneratorNode,
    ) -> Result<NodeId, PipelineError> {
        self.ensure_idle("insert a node")?;
        Ok(self.nodes.insert(index, node)?)
    }

    /// Whether `remove_node` would succeed
    pub fn can_remove_node(&self, id: NodeId) -> bool {
        !self.is_generating() && self.nodes.can_remove(id)
    }

    /// Remove a node, disconnecting every other node's inputs that
    /// pointed at its outputs
    pub fn remove_node(&mut self, id: NodeId) -> Result<GeneratorNode, PipelineError> {
        self.ensure_idle("remove a node")?;
        Ok(self.nodes.remove(id)?)
    }

    /// Whether `move_node_up` would succeed
    pub fn can_move_node_up(&self, id: NodeId) -> bool {
        !self.is_generating() && self.nodes.can_move_up(id)
    }

    /// Move a node one position earlier in the list
    pub fn move_node_up(&mut self, id: NodeId) -> Result<(), PipelineError> {
        self.ensure_idle("reorder nodes")?;
        Ok(self.nodes.move_up(id)?)
    }

    /// Whether `move_node_down` would succeed
    pub fn can_move_node_down(&self, id: NodeId) -> bool {
        !self.is_generating() && self.nodes.can_move_down(id)
    }

    /// Move a node one position later in the list
    pub fn move_node_down(&mut self, id: NodeId) -> Result<(), PipelineError> {
        self.ensure_idle("reorder nodes")?;
        Ok(self.nodes.move_down(id)?)
    }

    // ------------------------------------------------------------------
    // Guarded slot/connection editing
    // ------------------------------------------------------------------

    /// Connect an output slot to an input slot
    pub fn connect(&mut self, input: SlotId, output: SlotId) -> Result<(), PipelineError> {
        self.ensure_idle("edit connections")?;
        Ok(self.nodes.connect(input, output)?)
    }

    /// Disconnect an input from an output
    pub fn disconnect(&mut self, input: SlotId, output: SlotId) -> Result<(), PipelineError> {
        self.ensure_idle("edit connections")?;
        Ok(self.nodes.disconnect(input, output)?)
    }

    /// Set or clear an input's source
    pub fn set_source(
        &mut self,
        input: SlotId,
        source: Option<SlotId>,
    ) -> Result<(), PipelineError> {
        self.ensure_idle("edit connections")?;
        Ok(self.nodes.set_source(input, source)?)
    }

    /// Run a node's update cycle after a configuration change
    pub fn update_node(&mut self, id: NodeId) -> Result<(), PipelineError> {
        self.ensure_idle("update a node")?;
        Ok(self.nodes.update(id)?)
    }

    /// Run every node's update cycle
    pub fn update_all(&mut self) -> Result<(), PipelineError> {
        self.ensure_idle("update nodes")?;
        Ok(self.nodes.update_all()?)
    }

    /// Re-run a node's one-time initialization, discarding its slots
    pub fn reset_node(&mut self, id: NodeId) -> Result<(), PipelineError> {
        self.ensure_idle("reset a node")?;
        Ok(self.nodes.reset(id)?)
    }

    // ------------------------------------------------------------------
    // Generation
    // ------------------------------------------------------------------

    /// Begin a generation run for `(name, destination)`.
    ///
    /// Fails if a run is already active or any node is not ready. The
    /// previous location is snapshotted so the run can clean up the old
    /// site if it moved.
    pub fn generate(
        &mut self,
        name: impl Into<String>,
        destination: impl Into<PathBuf>,
    ) -> Result<(), PipelineError> {
        if self.run.is_some() {
            return Err(PipelineError::AlreadyGenerating);
        }
        for node in self.nodes.nodes() {
            if !self.nodes.can_generate(node.id)? {
                return Err(PipelineError::NodeNotReady {
                    node: node.name.clone(),
                });
            }
        }
        let location = RunLocation::new(name, destination);
        let previous = self.location.replace(location.clone());
        self.run = Some(RunState::new(location, previous, &self.nodes));
        self.progress = 0.0;
        self.message = "Starting generation".into();
        Ok(())
    }

    /// Resume the active run by one unit of work.
    ///
    /// On error the run is discarded, transient state is cleared, and the
    /// error is surfaced; the host must not resume further.
    pub fn step(&mut self) -> Result<RunStatus, PipelineError> {
        let mut run = self.run.take().ok_or(PipelineError::NotGenerating)?;
        match advance(&mut run, &mut self.nodes, &mut self.store, &self.worker) {
            Ok(RunStatus::Running) => {
                self.progress = run.estimator.fraction();
                self.message.clone_from(&run.message);
                self.run = Some(run);
                Ok(RunStatus::Running)
            }
            Ok(RunStatus::Finished) => {
                self.progress = run.estimator.fraction();
                self.message.clone_from(&run.message);
                tracing::info!("generation run `{}` complete", run.location.name);
                Ok(RunStatus::Finished)
            }
            Err(error) => {
                self.progress = 0.0;
                self.message.clear();
                tracing::error!("generation run failed: {error}");
                Err(error)
            }
        }
    }
}

/// Resume an executive until its run completes; the canonical host loop
pub fn drive_to_completion<S: ArtifactStore>(
    executive: &mut Executive<S>,
) -> Result<(), PipelineError> {
    loop {
        if executive.step()? == RunStatus::Finished {
            return Ok(());
        }
    }
}
