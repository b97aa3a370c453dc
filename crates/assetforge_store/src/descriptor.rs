// SPDX-License-Identifier: MIT OR Apache-2.0
//! Descriptors exchanged between the executive and the artifact store.

use assetforge_graph::{ArtifactId, Availability, SlotId};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where a run's artifacts live: a container name and a destination
/// directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunLocation {
    /// Container name; the persistence key of the run
    pub name: String,
    /// Destination directory the container and its artifacts live under
    pub destination: PathBuf,
}

impl RunLocation {
    /// Create a run location
    pub fn new(name: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            destination: destination.into(),
        }
    }

    /// Path of the container index file
    pub fn container_file(&self) -> PathBuf {
        self.destination.join(format!("{}.forge", self.name))
    }

    /// Directory discrete artifacts are stored under
    pub fn artifact_dir(&self) -> PathBuf {
        self.destination.join(&self.name)
    }
}

/// Everything the store needs to know about one produced output
#[derive(Debug, Clone)]
pub struct OutputDescriptor {
    /// The producing output slot
    pub slot: SlotId,
    /// Name of the producing node (persistence key component)
    pub node_name: String,
    /// Name of the producing slot (persistence key component)
    pub slot_name: String,
    /// Declared artifact type name
    pub type_name: String,
    /// The slot's availability tri-state
    pub availability: Availability,
    /// Optional grouping path; grouped artifacts persist as discrete files
    pub grouping_path: Option<String>,
    /// Whether some consumer mutates the artifact in place
    pub consumed_mutating: bool,
}

impl OutputDescriptor {
    /// Stable persistence key: node name and slot name
    pub fn key(&self) -> String {
        format!("{}/{}", self.node_name, self.slot_name)
    }

    /// Whether this output embeds into the container index rather than
    /// persisting as a discrete file
    pub fn is_embedded(&self) -> bool {
        self.grouping_path.is_none()
    }

    /// Relative path of the discrete artifact file, if grouped
    pub fn relative_path(&self) -> Option<String> {
        self.grouping_path
            .as_ref()
            .map(|group| format!("{group}/{}.{}.ron", self.node_name, self.slot_name))
    }
}

/// The durable form of a persisted artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedArtifact {
    /// Durable identity, preserved across regeneration
    pub id: ArtifactId,
    /// Persistence key (`node/slot`)
    pub key: String,
    /// Declared artifact type name
    pub type_name: String,
    /// Relative path of the discrete file; `None` when embedded
    pub path: Option<String>,
    /// Whether the record lives inside the container index
    pub embedded: bool,
}

/// A record held in the store index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    /// Persistence key (`node/slot`)
    pub key: String,
    /// Durable artifact identity
    pub id: ArtifactId,
    /// Declared artifact type name
    pub type_name: String,
    /// Relative path of the discrete file; `None` when embedded
    pub path: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use assetforge_graph::SlotId;

    fn descriptor(grouping: Option<&str>) -> OutputDescriptor {
        OutputDescriptor {
            slot: SlotId::new(),
            node_name: "surface".into(),
            slot_name: "mesh".into(),
            type_name: "Mesh".into(),
            availability: Availability::AfterGeneration,
            grouping_path: grouping.map(Into::into),
            consumed_mutating: false,
        }
    }

    #[test]
    fn test_key_and_paths() {
        let embedded = descriptor(None);
        assert_eq!(embedded.key(), "surface/mesh");
        assert!(embedded.is_embedded());
        assert_eq!(embedded.relative_path(), None);

        let grouped = descriptor(Some("meshes"));
        assert!(!grouped.is_embedded());
        assert_eq!(
            grouped.relative_path().as_deref(),
            Some("meshes/surface.mesh.ron")
        );
    }

    #[test]
    fn test_location_paths() {
        let location = RunLocation::new("world", "/tmp/out");
        assert_eq!(
            location.container_file(),
            PathBuf::from("/tmp/out/world.forge")
        );
        assert_eq!(location.artifact_dir(), PathBuf::from("/tmp/out/world"));
    }
}
