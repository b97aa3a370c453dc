// SPDX-License-Identifier: MIT OR Apache-2.0
//! Cooperative generation tasks.
//!
//! A generator's work is modeled as an explicit step state machine rather
//! than a coroutine: the scheduler calls [`GenerationTask::step`] until it
//! reports [`StepOutcome::Finished`], and a step may instead hand back a
//! [`WaitHandle`] to be polled while background work completes.

use crate::artifact::{Artifact, ArtifactId};
use crate::node::NodeId;
use crate::node_set::NodeSet;
use parking_lot::{Condvar, Mutex};
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

/// Error raised by a generator's own computation
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// A required input has no connected artifact
    #[error("input slot `{slot}` has no artifact available")]
    MissingInput {
        /// Name of the input slot
        slot: String,
    },

    /// No slot with the requested name exists on the node
    #[error("no slot named `{slot}`")]
    UnknownSlot {
        /// The requested slot name
        slot: String,
    },

    /// A payload did not match the slot's declared type
    #[error("slot `{slot}` expects `{expected}`, got `{found}`")]
    PayloadType {
        /// Name of the slot
        slot: String,
        /// Type the slot declares
        expected: String,
        /// Type that was offered or found
        found: String,
    },

    /// The background worker already has an outstanding operation
    #[error("background worker is busy")]
    WorkerBusy,

    /// Computation failed with a plain message
    #[error("{0}")]
    Failed(String),

    /// Computation failed with an arbitrary error
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Result of a single generation step
#[derive(Debug)]
pub enum StepOutcome {
    /// One discrete unit of progress was made; more work remains
    Advanced,
    /// Waiting on background work; poll the handle until it signals
    Waiting(WaitHandle),
    /// The node's generation is complete
    Finished,
}

/// A resumable unit of generator work
pub trait GenerationTask: Send {
    /// Perform one unit of work
    fn step(&mut self, ctx: &mut GenerationContext<'_>) -> Result<StepOutcome, TaskError>;
}

/// Bridge for offloading a unit of work to a background thread.
///
/// The work body must confine itself to pure computation: nothing else
/// guards the node/slot graph, which stays owned by the driving thread.
pub trait BackgroundWorker {
    /// Submit work; the returned handle signals once the work has run.
    ///
    /// At most one operation may be outstanding at a time; a second
    /// dispatch before the first handle signals returns
    /// [`TaskError::WorkerBusy`].
    fn dispatch(
        &self,
        work: Box<dyn FnOnce() -> Result<(), TaskError> + Send + 'static>,
    ) -> Result<WaitHandle, TaskError>;
}

/// A pollable, manually reset completion signal.
#[derive(Clone)]
pub struct WaitHandle {
    inner: Arc<Signal>,
}

struct Signal {
    flag: Mutex<bool>,
    cond: Condvar,
}

impl WaitHandle {
    /// Create an unsignaled handle
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Signal {
                flag: Mutex::new(false),
                cond: Condvar::new(),
            }),
        }
    }

    /// Create a handle that is already signaled
    pub fn signaled() -> Self {
        let handle = Self::new();
        handle.signal();
        handle
    }

    /// Signal completion, waking all waiters
    pub fn signal(&self) {
        let mut flag = self.inner.flag.lock();
        *flag = true;
        self.inner.cond.notify_all();
    }

    /// Return the handle to the unsignaled state
    pub fn reset(&self) {
        *self.inner.flag.lock() = false;
    }

    /// Whether the handle has been signaled
    pub fn is_signaled(&self) -> bool {
        *self.inner.flag.lock()
    }

    /// Wait up to `timeout` for the signal; true if signaled
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut flag = self.inner.flag.lock();
        if *flag {
            return true;
        }
        self.inner.cond.wait_for(&mut flag, timeout);
        *flag
    }
}

impl Default for WaitHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for WaitHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaitHandle")
            .field("signaled", &self.is_signaled())
            .finish()
    }
}

/// Slot access handed to a task while it runs.
///
/// Inputs resolve through the node set to the artifact held by the
/// connected source output; outputs are written onto the task's own node.
pub struct GenerationContext<'a> {
    set: &'a mut NodeSet,
    node: NodeId,
    worker: &'a dyn BackgroundWorker,
}

impl<'a> GenerationContext<'a> {
    /// Build a context for one node's step
    pub fn new(set: &'a mut NodeSet, node: NodeId, worker: &'a dyn BackgroundWorker) -> Self {
        Self { set, node, worker }
    }

    /// The node being generated
    pub fn node_id(&self) -> NodeId {
        self.node
    }

    /// Name of the node being generated
    pub fn node_name(&self) -> &str {
        self.set
            .node(self.node)
            .map(|n| n.name.as_str())
            .unwrap_or_default()
    }

    /// The background worker bridge
    pub fn worker(&self) -> &dyn BackgroundWorker {
        self.worker
    }

    /// The artifact connected to the named input, if any.
    ///
    /// Returns `Ok(None)` when the slot is inactive or has no source, which
    /// is only legitimate for optional inputs.
    pub fn input_artifact(&self, slot: &str) -> Result<Option<Artifact>, TaskError> {
        let node = self.set.node(self.node).ok_or_else(|| TaskError::Failed(
            "generating node was removed mid-run".into(),
        ))?;
        let input = node
            .input_named(slot)
            .ok_or_else(|| TaskError::UnknownSlot { slot: slot.into() })?;
        if !input.active {
            return Ok(None);
        }
        let Some(source) = input.source() else {
            return Ok(None);
        };
        let output = self
            .set
            .output_slot(source)
            .ok_or_else(|| TaskError::MissingInput { slot: slot.into() })?;
        Ok(output.artifact().cloned())
    }

    /// The artifact connected to the named input; error if absent
    pub fn require_input(&self, slot: &str) -> Result<Artifact, TaskError> {
        self.input_artifact(slot)?
            .ok_or_else(|| TaskError::MissingInput { slot: slot.into() })
    }

    /// The connected input artifact's payload, downcast to `T`
    pub fn input_payload<T: Any + Send + Sync>(&self, slot: &str) -> Result<Arc<T>, TaskError> {
        let artifact = self.require_input(slot)?;
        let found = artifact.artifact_type();
        artifact.payload::<T>().ok_or_else(|| TaskError::PayloadType {
            slot: slot.into(),
            expected: std::any::type_name::<T>().into(),
            found: found.name().into(),
        })
    }

    /// Wrap a payload and store it on the named output slot
    pub fn set_output<T: Any + Send + Sync>(
        &mut self,
        slot: &str,
        payload: T,
    ) -> Result<ArtifactId, TaskError> {
        let artifact = Artifact::new(payload);
        let id = artifact.id();
        self.set_output_artifact(slot, artifact)?;
        Ok(id)
    }

    /// Store a produced artifact on the named output slot
    pub fn set_output_artifact(&mut self, slot: &str, artifact: Artifact) -> Result<(), TaskError> {
        let node = self
            .set
            .node_mut(self.node)
            .ok_or_else(|| TaskError::Failed("generating node was removed mid-run".into()))?;
        let output = node
            .output_named_mut(slot)
            .ok_or_else(|| TaskError::UnknownSlot { slot: slot.into() })?;
        if !artifact
            .artifact_type()
            .is_compatible_with(&output.artifact_type())
        {
            return Err(TaskError::PayloadType {
                slot: slot.into(),
                expected: output.artifact_type().name().into(),
                found: artifact.artifact_type().name().into(),
            });
        }
        output.set_artifact(artifact);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_wait_handle_signal() {
        let handle = WaitHandle::new();
        assert!(!handle.is_signaled());
        assert!(!handle.wait_timeout(Duration::from_millis(1)));

        handle.signal();
        assert!(handle.is_signaled());
        assert!(handle.wait_timeout(Duration::from_millis(1)));

        handle.reset();
        assert!(!handle.is_signaled());
    }

    #[test]
    fn test_wait_handle_cross_thread() {
        let handle = WaitHandle::new();
        let remote = handle.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(5));
            remote.signal();
        });
        assert!(handle.wait_timeout(Duration::from_secs(2)));
    }
}
