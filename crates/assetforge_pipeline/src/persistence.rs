// SPDX-License-Identifier: MIT OR Apache-2.0
//! Pipeline save/load.
//!
//! A pipeline file is a versioned ron document holding the run location,
//! every node (type name, node name, duration hint, generator config, and
//! slot IDs keyed by slot name), and the connection list as slot-ID
//! pairs. On load, nodes are reconstructed through the registry, their
//! saved slot IDs are restored by name, and the connection pairs then
//! resolve through the node set's lookup table.

use crate::error::PipelineError;
use crate::executive::Executive;
use assetforge_graph::{GeneratorNode, GeneratorRegistry, SlotId};
use assetforge_store::{ArtifactStore, RunLocation};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Current pipeline file format version
pub const PIPELINE_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct PipelineFile {
    version: u32,
    location: Option<RunLocation>,
    nodes: Vec<SavedNode>,
    connections: Vec<SavedConnection>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SavedNode {
    type_name: String,
    name: String,
    duration_hint_secs: f32,
    config: String,
    inputs: Vec<SavedSlot>,
    outputs: Vec<SavedSlot>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SavedSlot {
    name: String,
    id: SlotId,
}

#[derive(Debug, Serialize, Deserialize)]
struct SavedConnection {
    input: SlotId,
    output: SlotId,
}

impl<S: ArtifactStore> Executive<S> {
    /// Save the pipeline (location, nodes, configs, connections) to a file
    pub fn save(&self, path: &Path) -> Result<(), PipelineError> {
        let mut nodes = Vec::new();
        let mut connections = Vec::new();
        for node in self.nodes.nodes() {
            nodes.push(SavedNode {
                type_name: node.type_name().to_string(),
                name: node.name.clone(),
                duration_hint_secs: node.duration_hint_secs,
                config: node.config_ron()?,
                inputs: node
                    .inputs()
                    .iter()
                    .map(|s| SavedSlot {
                        name: s.name.clone(),
                        id: s.id,
                    })
                    .collect(),
                outputs: node
                    .outputs()
                    .iter()
                    .map(|s| SavedSlot {
                        name: s.name.clone(),
                        id: s.id,
                    })
                    .collect(),
            });
            for input in node.inputs() {
                if let Some(source) = input.source() {
                    connections.push(SavedConnection {
                        input: input.id,
                        output: source,
                    });
                }
            }
        }
        let file = PipelineFile {
            version: PIPELINE_FORMAT_VERSION,
            location: self.location.clone(),
            nodes,
            connections,
        };
        let config = ron::ser::PrettyConfig::default().struct_names(true);
        let content = ron::ser::to_string_pretty(&file, config)
            .map_err(|e| PipelineError::Format(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        tracing::info!("saved pipeline to {path:?}");
        Ok(())
    }

    /// Load a pipeline from a file, constructing generators through the
    /// registry and re-resolving saved connections.
    pub fn load(
        path: &Path,
        registry: &GeneratorRegistry,
        store: S,
    ) -> Result<Self, PipelineError> {
        let content = std::fs::read_to_string(path)?;
        let file: PipelineFile =
            ron::from_str(&content).map_err(|e| PipelineError::Format(e.to_string()))?;
        if file.version > PIPELINE_FORMAT_VERSION {
            return Err(PipelineError::VersionNewer {
                found: file.version,
                supported: PIPELINE_FORMAT_VERSION,
            });
        }

        let mut executive = Executive::new(store);
        executive.location = file.location;
        for saved in file.nodes {
            let mut behavior =
                registry
                    .construct(&saved.type_name)
                    .ok_or(PipelineError::UnknownGenerator {
                        type_name: saved.type_name.clone(),
                    })?;
            behavior.restore_config(&saved.config)?;
            let mut node = GeneratorNode::new(saved.name, behavior);
            node.duration_hint_secs = saved.duration_hint_secs;
            let id = executive.nodes.add(node)?;

            let inputs: Vec<(String, SlotId)> = saved
                .inputs
                .into_iter()
                .map(|s| (s.name, s.id))
                .collect();
            let outputs: Vec<(String, SlotId)> = saved
                .outputs
                .into_iter()
                .map(|s| (s.name, s.id))
                .collect();
            executive.nodes.restore_slot_ids(id, &inputs, &outputs)?;
        }
        for connection in file.connections {
            executive.nodes.connect(connection.input, connection.output)?;
        }
        // Re-run the update cycle so restored configs settle activation.
        executive.nodes.update_all()?;
        tracing::info!("loaded pipeline from {path:?}");
        Ok(executive)
    }
}
