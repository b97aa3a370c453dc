// SPDX-License-Identifier: MIT OR Apache-2.0
//! Pipeline executive for AssetForge.
//!
//! Drives a set of generator nodes through a full generation run:
//! - Dependency-ordered, cooperatively stepped node execution
//! - A background-worker bridge with single-flight fault capture
//! - Weighted, monotonic progress estimation
//! - Artifact persistence and orphan reconciliation through a store
//! - Pipeline save/load with a versioned ron format
//!
//! ## Architecture
//!
//! The host owns an [`Executive`] and resumes its run one step at a time
//! ([`Executive::step`]), so a UI loop stays responsive; nothing inside a
//! run blocks beyond a short wait-handle poll. Exactly one run may be
//! active per executive, and every failure is fatal to that run — the
//! caller fixes the cause and generates again from scratch.

pub mod error;
pub mod executive;
pub mod generators;
pub mod persistence;
pub mod progress;
pub mod run;
pub mod worker;

pub use error::PipelineError;
pub use executive::{drive_to_completion, Executive};
pub use generators::{default_registry, DigestAsset, TextAsset};
pub use persistence::PIPELINE_FORMAT_VERSION;
pub use progress::ProgressEstimator;
pub use run::RunStatus;
pub use worker::WorkerBridge;
