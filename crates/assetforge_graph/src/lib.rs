// SPDX-License-Identifier: MIT OR Apache-2.0
//! Generator graph framework for AssetForge.
//!
//! This crate provides the graph model that the pipeline executive
//! schedules:
//! - Typed input/output slots with mutually consistent connections
//! - Generator nodes with resumable, cooperatively stepped tasks
//! - Dependency resolution with cycle detection
//! - An explicit registry of constructible generator types
//!
//! ## Architecture
//!
//! Connection state is centralized in [`NodeSet`]: slots are plain data,
//! and every connect/disconnect goes through the set so the two ends can
//! never disagree. Generation work is an explicit step state machine
//! ([`task::GenerationTask`]) rather than a coroutine, with background
//! work surfaced as pollable [`task::WaitHandle`]s.

pub mod artifact;
pub mod error;
pub mod node;
pub mod node_set;
pub mod registry;
pub mod resolver;
pub mod slot;
pub mod task;

pub use artifact::{Artifact, ArtifactId, ArtifactType};
pub use error::GraphError;
pub use node::{Generator, GeneratorNode, InternalLink, NodeBuilder, NodeId, SlotToggles};
pub use node_set::NodeSet;
pub use registry::{GeneratorCategory, GeneratorInfo, GeneratorRegistry};
pub use resolver::dependency_ordered;
pub use slot::{Availability, InputSlot, OutputSlot, SlotDirection, SlotId};
pub use task::{
    BackgroundWorker, GenerationContext, GenerationTask, StepOutcome, TaskError, WaitHandle,
};
