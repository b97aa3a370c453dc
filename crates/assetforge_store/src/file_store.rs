// SPDX-License-Identifier: MIT OR Apache-2.0
//! File-backed artifact store.
//!
//! The container is a ron index file at `<destination>/<name>.forge`;
//! embedded artifacts live as records inside it, while grouped artifacts
//! persist as discrete ron descriptor files under
//! `<destination>/<name>/<grouping_path>/`.

use crate::descriptor::{OutputDescriptor, PersistedArtifact, RunLocation, StoredRecord};
use crate::store::{ArtifactStore, StoreError};
use assetforge_graph::{Artifact, ArtifactId};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

/// Current container index format version
pub const STORE_FORMAT_VERSION: u32 = 1;

/// Serialized container index
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ContainerIndex {
    version: u32,
    name: String,
    embedded: IndexMap<String, StoredRecord>,
    discrete: IndexMap<String, StoredRecord>,
}

impl ContainerIndex {
    fn empty(name: &str) -> Self {
        Self {
            version: STORE_FORMAT_VERSION,
            name: name.to_string(),
            embedded: IndexMap::new(),
            discrete: IndexMap::new(),
        }
    }
}

/// On-disk form of a discrete artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ArtifactFile {
    id: ArtifactId,
    key: String,
    type_name: String,
}

/// File-backed [`ArtifactStore`]
pub struct FileStore {
    location: Option<RunLocation>,
    index: ContainerIndex,
    dirty: bool,
}

impl FileStore {
    /// Create a store with no established container yet
    pub fn new() -> Self {
        Self {
            location: None,
            index: ContainerIndex::empty(""),
            dirty: false,
        }
    }

    /// Create a store and establish its container immediately
    pub fn open(location: RunLocation) -> Result<Self, StoreError> {
        let mut store = Self::new();
        store.ensure_container(&location)?;
        Ok(store)
    }

    /// The currently established location, if any
    pub fn location(&self) -> Option<&RunLocation> {
        self.location.as_ref()
    }

    fn location_or_err(&self) -> Result<&RunLocation, StoreError> {
        self.location.as_ref().ok_or(StoreError::NoContainer)
    }

    fn load_index(path: &Path) -> Result<ContainerIndex, StoreError> {
        let content = fs::read_to_string(path)?;
        let index: ContainerIndex =
            ron::from_str(&content).map_err(|e| StoreError::Format(e.to_string()))?;
        if index.version > STORE_FORMAT_VERSION {
            return Err(StoreError::VersionNewer {
                found: index.version,
                supported: STORE_FORMAT_VERSION,
            });
        }
        Ok(index)
    }

    fn write_index(&self) -> Result<(), StoreError> {
        let location = self.location_or_err()?;
        let config = ron::ser::PrettyConfig::default().struct_names(true);
        let content = ron::ser::to_string_pretty(&self.index, config)
            .map_err(|e| StoreError::Format(e.to_string()))?;
        fs::create_dir_all(&location.destination)?;
        fs::write(location.container_file(), content)?;
        Ok(())
    }

    fn remove_discrete_file(&self, record: &StoredRecord) {
        let Some(location) = &self.location else {
            return;
        };
        let Some(rel) = &record.path else {
            return;
        };
        let abs = location.artifact_dir().join(rel);
        if let Err(e) = fs::remove_file(&abs) {
            tracing::warn!("failed to remove artifact file {:?}: {}", abs, e);
        }
    }

    /// Make a target path writable: no-op when free or already ours,
    /// displace a parseable squatter, fail on a foreign file.
    fn claim_path(&self, rel: &str) -> Result<(), StoreError> {
        let location = self.location_or_err()?;
        let abs = location.artifact_dir().join(rel);
        if !abs.exists() {
            return Ok(());
        }
        if self
            .index
            .discrete
            .values()
            .any(|r| r.path.as_deref() == Some(rel))
        {
            return Ok(());
        }
        let content = fs::read_to_string(&abs)?;
        if ron::from_str::<ArtifactFile>(&content).is_err() {
            return Err(StoreError::AmbiguousOwnership { path: rel.into() });
        }
        // A stray artifact file from an earlier run; move it aside.
        let (stem, ext) = rel.rsplit_once('.').unwrap_or((rel, "ron"));
        for n in 1..100 {
            let alt = format!("{stem}-{n}.{ext}");
            let alt_abs = location.artifact_dir().join(&alt);
            if !alt_abs.exists() {
                fs::rename(&abs, &alt_abs)?;
                tracing::warn!("displaced stray artifact {:?} to {:?}", abs, alt_abs);
                return Ok(());
            }
        }
        Err(StoreError::AmbiguousOwnership { path: rel.into() })
    }
}

impl Default for FileStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ArtifactStore for FileStore {
    fn sync(&mut self) -> Result<(), StoreError> {
        let Some(location) = self.location.clone() else {
            return Ok(());
        };
        let container = location.container_file();
        if container.exists() {
            self.index = Self::load_index(&container)?;
            self.dirty = false;
        }
        // Drop discrete records whose backing file disappeared.
        let artifact_dir = location.artifact_dir();
        let missing: Vec<String> = self
            .index
            .discrete
            .iter()
            .filter(|(_, r)| {
                r.path
                    .as_ref()
                    .is_some_and(|rel| !artifact_dir.join(rel).exists())
            })
            .map(|(k, _)| k.clone())
            .collect();
        for key in missing {
            tracing::warn!("artifact `{key}` lost its backing file; dropping record");
            self.index.discrete.shift_remove(&key);
            self.dirty = true;
        }
        Ok(())
    }

    fn ensure_container(&mut self, location: &RunLocation) -> Result<(), StoreError> {
        match self.location.clone() {
            Some(old) if old == *location => {
                if !location.container_file().exists() {
                    self.write_index()?;
                }
            }
            Some(old) => {
                // The container moved; relocate its file and artifact dir.
                fs::create_dir_all(&location.destination)?;
                let old_file = old.container_file();
                if old_file.exists() {
                    fs::rename(old_file, location.container_file())?;
                }
                let old_dir = old.artifact_dir();
                if old_dir.exists() {
                    fs::rename(old_dir, location.artifact_dir())?;
                }
                self.index.name.clone_from(&location.name);
                self.location = Some(location.clone());
                self.dirty = true;
                self.write_index()?;
                tracing::info!(
                    "relocated container `{}` to {:?}",
                    location.name,
                    location.destination
                );
            }
            None => {
                fs::create_dir_all(&location.destination)?;
                let container = location.container_file();
                if container.exists() {
                    self.index = Self::load_index(&container)?;
                } else {
                    self.index = ContainerIndex::empty(&location.name);
                }
                self.location = Some(location.clone());
                self.write_index()?;
            }
        }
        Ok(())
    }

    fn persist(
        &mut self,
        descriptor: &OutputDescriptor,
        artifact: &Artifact,
    ) -> Result<PersistedArtifact, StoreError> {
        self.location_or_err()?;
        let key = descriptor.key();
        let prior = self
            .index
            .embedded
            .get(&key)
            .or_else(|| self.index.discrete.get(&key))
            .cloned();

        // Identity is preserved while the type stays put; a type change
        // replaces the artifact outright.
        let id = match &prior {
            Some(record) if record.type_name == descriptor.type_name => record.id,
            _ => artifact.id(),
        };
        if let Some(record) = &prior {
            let relocating = record.path != descriptor.relative_path();
            if record.type_name != descriptor.type_name || relocating {
                self.remove_discrete_file(record);
            }
        }
        self.index.embedded.shift_remove(&key);
        self.index.discrete.shift_remove(&key);

        let path = descriptor.relative_path();
        let record = StoredRecord {
            key: key.clone(),
            id,
            type_name: descriptor.type_name.clone(),
            path: path.clone(),
        };

        if descriptor.is_embedded() {
            self.index.embedded.insert(key.clone(), record);
        } else {
            let rel = path.clone().unwrap_or_default();
            self.claim_path(&rel)?;
            let location = self.location_or_err()?;
            let abs = location.artifact_dir().join(&rel);
            if let Some(parent) = abs.parent() {
                fs::create_dir_all(parent)?;
            }
            let file = ArtifactFile {
                id,
                key: key.clone(),
                type_name: descriptor.type_name.clone(),
            };
            let config = ron::ser::PrettyConfig::default().struct_names(true);
            let content = ron::ser::to_string_pretty(&file, config)
                .map_err(|e| StoreError::Format(e.to_string()))?;
            fs::write(&abs, content)?;
            self.index.discrete.insert(key.clone(), record);
        }
        self.dirty = true;

        tracing::debug!("persisted `{key}` ({})", descriptor.type_name);
        Ok(PersistedArtifact {
            id,
            key,
            type_name: descriptor.type_name.clone(),
            path,
            embedded: descriptor.is_embedded(),
        })
    }

    fn clear(&mut self, key: &str) -> Result<(), StoreError> {
        if let Some(record) = self.index.discrete.shift_remove(key) {
            self.remove_discrete_file(&record);
            self.dirty = true;
        }
        if self.index.embedded.shift_remove(key).is_some() {
            self.dirty = true;
        }
        Ok(())
    }

    fn known_paths(&self) -> BTreeSet<String> {
        let mut paths = BTreeSet::new();
        if let Some(location) = &self.location {
            paths.insert(location.container_file().to_string_lossy().into_owned());
        }
        for record in self.index.discrete.values() {
            if let Some(path) = &record.path {
                paths.insert(path.clone());
            }
        }
        paths
    }

    fn reconcile(
        &mut self,
        new_embedded: &BTreeSet<String>,
        new_discrete: &BTreeSet<String>,
    ) -> Result<usize, StoreError> {
        let orphan_embedded: Vec<String> = self
            .index
            .embedded
            .keys()
            .filter(|k| !new_embedded.contains(*k))
            .cloned()
            .collect();
        let orphan_discrete: Vec<String> = self
            .index
            .discrete
            .keys()
            .filter(|k| !new_discrete.contains(*k))
            .cloned()
            .collect();

        let destroyed = orphan_embedded.len() + orphan_discrete.len();
        for key in orphan_embedded {
            self.index.embedded.shift_remove(&key);
            self.dirty = true;
        }
        for key in orphan_discrete {
            if let Some(record) = self.index.discrete.shift_remove(&key) {
                self.remove_discrete_file(&record);
                self.dirty = true;
            }
        }
        if destroyed > 0 {
            tracing::info!("reconcile destroyed {destroyed} orphaned artifact(s)");
        }
        Ok(destroyed)
    }

    fn flush(&mut self) -> Result<(), StoreError> {
        if self.dirty {
            self.write_index()?;
            self.dirty = false;
        }
        Ok(())
    }

    fn cleanup_locations(&mut self, old: &RunLocation) -> Result<(), StoreError> {
        if self.location.as_ref() == Some(old) {
            return Ok(());
        }
        let old_dir = old.artifact_dir();
        if old_dir.exists() {
            let dirs: Vec<_> = walkdir::WalkDir::new(&old_dir)
                .contents_first(true)
                .into_iter()
                .filter_map(Result::ok)
                .filter(|e| e.file_type().is_dir())
                .collect();
            for entry in dirs {
                // Only empty directories go; stray files stay put.
                if let Err(e) = fs::remove_dir(entry.path()) {
                    tracing::debug!("left {:?} in place: {}", entry.path(), e);
                }
            }
        }
        if old.destination.exists() {
            let _ = fs::remove_dir(&old.destination);
        }
        Ok(())
    }
}
