// SPDX-License-Identifier: MIT OR Apache-2.0
//! The generation run: an explicit, resumable phase state machine.
//!
//! One call to [`advance`] performs one unit of work — a phase
//! transition, a single node step, or one poll of an outstanding wait
//! handle — and returns control to the host. Any error aborts the run;
//! the executive clears the transient state and surfaces the error. The
//! store is left in whatever partially reconciled state it reached (no
//! rollback is attempted).

use crate::error::PipelineError;
use crate::progress::ProgressEstimator;
use crate::worker::WorkerBridge;
use assetforge_graph::{
    Artifact, GenerationContext, GenerationTask, GraphError, NodeId, NodeSet, SlotId, StepOutcome,
    WaitHandle,
};
use assetforge_store::{ArtifactStore, OutputDescriptor, RunLocation};
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

/// Poll timeout while waiting on background work
pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Whether the run wants further resumption
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// More work remains; resume again
    Running,
    /// The run completed; stop resuming
    Finished,
}

/// Ordered phases of a generation run
pub(crate) enum RunPhase {
    Record,
    SyncStore,
    EnsureContainer,
    ResolveOrder,
    Generate {
        order: Vec<NodeId>,
        index: usize,
        task: Option<Box<dyn GenerationTask>>,
        waiting: Option<WaitHandle>,
    },
    Persist,
    Reconcile,
    Flush,
    Cleanup,
    Finish,
}

/// Estimator indices for the fixed phases and the per-node hints
pub(crate) struct PhaseMarks {
    pub record: usize,
    pub sync: usize,
    pub container: usize,
    pub resolve: usize,
    pub nodes: HashMap<NodeId, usize>,
    pub persist: usize,
    pub reconcile: usize,
    pub flush: usize,
    pub cleanup: usize,
    pub finish: usize,
}

/// Transient state of one generation run
pub(crate) struct RunState {
    pub phase: RunPhase,
    pub location: RunLocation,
    pub previous_location: Option<RunLocation>,
    pub produced: Vec<(OutputDescriptor, Artifact)>,
    pub new_embedded: BTreeSet<String>,
    pub new_discrete: BTreeSet<String>,
    pub estimator: ProgressEstimator,
    pub marks: PhaseMarks,
    pub message: String,
}

impl RunState {
    /// Build the run state and its progress hints from the node list
    pub fn new(
        location: RunLocation,
        previous_location: Option<RunLocation>,
        nodes: &NodeSet,
    ) -> Self {
        let mut estimator = ProgressEstimator::new();
        let record = estimator.push_phase("record location", 0.01);
        let sync = estimator.push_phase("sync store", 0.2);
        let container = estimator.push_phase("ensure container", 0.1);
        let resolve = estimator.push_phase("resolve order", 0.05);
        let mut node_marks = HashMap::new();
        for node in nodes.nodes() {
            let index = estimator.push_phase(node.name.clone(), node.duration_hint_secs);
            node_marks.insert(node.id, index);
        }
        let persist = estimator.push_phase("persist artifacts", 0.5);
        let reconcile = estimator.push_phase("reconcile", 0.25);
        let flush = estimator.push_phase("flush", 0.1);
        let cleanup = estimator.push_phase("cleanup", 0.1);
        let finish = estimator.push_phase("finish", 0.01);

        Self {
            phase: RunPhase::Record,
            location,
            previous_location,
            produced: Vec::new(),
            new_embedded: BTreeSet::new(),
            new_discrete: BTreeSet::new(),
            estimator,
            marks: PhaseMarks {
                record,
                sync,
                container,
                resolve,
                nodes: node_marks,
                persist,
                reconcile,
                flush,
                cleanup,
                finish,
            },
            message: String::new(),
        }
    }
}

/// Resume the run by one unit of work
pub(crate) fn advance<S: ArtifactStore>(
    run: &mut RunState,
    nodes: &mut NodeSet,
    store: &mut S,
    worker: &WorkerBridge,
) -> Result<RunStatus, PipelineError> {
    // Take the phase so each arm can move its state forward; on error the
    // placeholder never matters because the executive discards the run.
    let phase = std::mem::replace(&mut run.phase, RunPhase::Finish);
    let (next, status) = match phase {
        RunPhase::Record => {
            tracing::info!(
                "generation run started: `{}` -> {:?}",
                run.location.name,
                run.location.destination
            );
            run.message = format!("Preparing `{}`", run.location.name);
            run.estimator.mark(run.marks.record);
            (RunPhase::SyncStore, RunStatus::Running)
        }
        RunPhase::SyncStore => {
            run.message = "Refreshing artifact store".into();
            store.sync()?;
            run.estimator.mark(run.marks.sync);
            (RunPhase::EnsureContainer, RunStatus::Running)
        }
        RunPhase::EnsureContainer => {
            run.message = "Locating container".into();
            store.ensure_container(&run.location)?;
            run.estimator.mark(run.marks.container);
            (RunPhase::ResolveOrder, RunStatus::Running)
        }
        RunPhase::ResolveOrder => {
            run.message = "Resolving dependency order".into();
            let order = assetforge_graph::dependency_ordered(nodes)?;
            run.estimator.mark(run.marks.resolve);
            (
                RunPhase::Generate {
                    order,
                    index: 0,
                    task: None,
                    waiting: None,
                },
                RunStatus::Running,
            )
        }
        RunPhase::Generate {
            order,
            index,
            task,
            waiting,
        } => step_generate(run, nodes, worker, order, index, task, waiting)?,
        RunPhase::Persist => {
            run.message = "Persisting artifacts".into();
            let links = nodes.internal_link_table()?;
            let forced = forced_persist_set(&run.produced, &links);
            for (descriptor, artifact) in &run.produced {
                if store.should_persist(descriptor, &forced) {
                    let persisted = store.persist(descriptor, artifact)?;
                    if persisted.embedded {
                        run.new_embedded.insert(persisted.key);
                    } else {
                        run.new_discrete.insert(persisted.key);
                    }
                } else {
                    store.clear(&descriptor.key())?;
                }
            }
            run.estimator.mark(run.marks.persist);
            (RunPhase::Reconcile, RunStatus::Running)
        }
        RunPhase::Reconcile => {
            run.message = "Reconciling prior artifacts".into();
            store.reconcile(&run.new_embedded, &run.new_discrete)?;
            run.estimator.mark(run.marks.reconcile);
            (RunPhase::Flush, RunStatus::Running)
        }
        RunPhase::Flush => {
            run.message = "Writing store state".into();
            store.flush()?;
            run.estimator.mark(run.marks.flush);
            (RunPhase::Cleanup, RunStatus::Running)
        }
        RunPhase::Cleanup => {
            if let Some(old) = &run.previous_location {
                if *old != run.location {
                    run.message = format!("Cleaning up `{}`", old.name);
                    store.cleanup_locations(old)?;
                }
            }
            store.flush()?;
            run.estimator.mark(run.marks.cleanup);
            (RunPhase::Finish, RunStatus::Running)
        }
        RunPhase::Finish => {
            nodes.clear_transient_artifacts();
            run.estimator.mark(run.marks.finish);
            run.message = "Generation complete".into();
            (RunPhase::Finish, RunStatus::Finished)
        }
    };
    run.phase = next;
    Ok(status)
}

fn step_generate(
    run: &mut RunState,
    nodes: &mut NodeSet,
    worker: &WorkerBridge,
    order: Vec<NodeId>,
    mut index: usize,
    mut task: Option<Box<dyn GenerationTask>>,
    mut waiting: Option<WaitHandle>,
) -> Result<(RunPhase, RunStatus), PipelineError> {
    if index >= order.len() {
        return Ok((RunPhase::Persist, RunStatus::Running));
    }
    let node_id = order[index];
    let node_name = nodes
        .node(node_id)
        .map(|n| n.name.clone())
        .unwrap_or_default();

    if let Some(handle) = waiting.take() {
        // Poll briefly rather than blocking the host; a fault recorded on
        // the worker thread is re-raised here regardless of the signal.
        let signaled = handle.wait_timeout(POLL_INTERVAL);
        if let Some(fault) = worker.take_fault() {
            return Err(PipelineError::Worker(fault));
        }
        if !signaled {
            waiting = Some(handle);
            run.message = format!("Waiting on background work for `{node_name}`");
        }
        return Ok((
            RunPhase::Generate {
                order,
                index,
                task,
                waiting,
            },
            RunStatus::Running,
        ));
    }

    let mut active = match task.take() {
        Some(task) => task,
        None => nodes.begin_generation(node_id)?,
    };
    run.message = format!("Generating `{node_name}`");

    let outcome = {
        let mut ctx = GenerationContext::new(nodes, node_id, worker);
        active.step(&mut ctx)
    };
    match outcome {
        Ok(StepOutcome::Advanced) => {
            task = Some(active);
        }
        Ok(StepOutcome::Waiting(handle)) => {
            task = Some(active);
            waiting = Some(handle);
        }
        Ok(StepOutcome::Finished) => {
            record_outputs(run, nodes, node_id)?;
            if let Some(mark) = run.marks.nodes.get(&node_id) {
                run.estimator.mark(*mark);
            }
            tracing::debug!("node `{node_name}` generated");
            index += 1;
            task = None;
        }
        Err(source) => {
            return Err(PipelineError::Node {
                node: node_name,
                source,
            });
        }
    }
    Ok((
        RunPhase::Generate {
            order,
            index,
            task,
            waiting,
        },
        RunStatus::Running,
    ))
}

/// Record a completed node's active produced outputs for reconciliation
fn record_outputs(
    run: &mut RunState,
    nodes: &NodeSet,
    node: NodeId,
) -> Result<(), PipelineError> {
    let n = nodes
        .node(node)
        .ok_or(PipelineError::Graph(GraphError::NodeNotFound(node)))?;
    for output in n.outputs() {
        if !output.active {
            continue;
        }
        let Some(artifact) = output.artifact() else {
            continue;
        };
        let consumed_mutating = output
            .consumers()
            .iter()
            .any(|c| nodes.input_slot(*c).is_some_and(|s| s.mutating));
        run.produced.push((
            OutputDescriptor {
                slot: output.id,
                node_name: n.name.clone(),
                slot_name: output.name.clone(),
                type_name: output.artifact_type().name().to_string(),
                availability: output.availability,
                grouping_path: output.grouping_path.clone(),
                consumed_mutating,
            },
            artifact.clone(),
        ));
    }
    Ok(())
}

/// Transitive closure of internal-link persistence requirements: every
/// slot reachable from an output that persists in its own right.
fn forced_persist_set(
    produced: &[(OutputDescriptor, Artifact)],
    links: &HashMap<SlotId, Vec<SlotId>>,
) -> BTreeSet<SlotId> {
    let mut forced = BTreeSet::new();
    let mut queue: Vec<SlotId> = produced
        .iter()
        .filter(|(d, _)| {
            d.availability != assetforge_graph::Availability::DuringGeneration || d.consumed_mutating
        })
        .map(|(d, _)| d.slot)
        .collect();
    let mut seen: BTreeSet<SlotId> = queue.iter().copied().collect();
    while let Some(slot) = queue.pop() {
        if let Some(required) = links.get(&slot) {
            for target in required {
                if seen.insert(*target) {
                    forced.insert(*target);
                    queue.push(*target);
                }
            }
        }
    }
    forced
}
