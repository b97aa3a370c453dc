// SPDX-License-Identifier: MIT OR Apache-2.0
//! In-memory artifact store for tests and headless hosts.

use crate::descriptor::{OutputDescriptor, PersistedArtifact, RunLocation, StoredRecord};
use crate::store::{ArtifactStore, StoreError};
use assetforge_graph::Artifact;
use indexmap::IndexMap;
use std::collections::BTreeSet;

/// [`ArtifactStore`] that keeps every record in memory.
///
/// Mirrors the file store's identity and reconciliation semantics without
/// touching the filesystem, and records destroyed keys and cleaned
/// locations for inspection.
#[derive(Default)]
pub struct MemoryStore {
    location: Option<RunLocation>,
    embedded: IndexMap<String, StoredRecord>,
    discrete: IndexMap<String, StoredRecord>,
    destroyed: Vec<String>,
    cleaned: Vec<RunLocation>,
    flushes: usize,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// The currently established location, if any
    pub fn location(&self) -> Option<&RunLocation> {
        self.location.as_ref()
    }

    /// Keys of embedded records, in insertion order
    pub fn embedded_keys(&self) -> Vec<String> {
        self.embedded.keys().cloned().collect()
    }

    /// Keys of discrete records, in insertion order
    pub fn discrete_keys(&self) -> Vec<String> {
        self.discrete.keys().cloned().collect()
    }

    /// The record held for a key, embedded or discrete
    pub fn record(&self, key: &str) -> Option<&StoredRecord> {
        self.embedded.get(key).or_else(|| self.discrete.get(key))
    }

    /// Keys destroyed by reconciliation, in destruction order
    pub fn destroyed(&self) -> &[String] {
        &self.destroyed
    }

    /// Old locations handed to `cleanup_locations`
    pub fn cleaned(&self) -> &[RunLocation] {
        &self.cleaned
    }

    /// Number of flushes performed
    pub fn flushes(&self) -> usize {
        self.flushes
    }
}

impl ArtifactStore for MemoryStore {
    fn sync(&mut self) -> Result<(), StoreError> {
        Ok(())
    }

    fn ensure_container(&mut self, location: &RunLocation) -> Result<(), StoreError> {
        self.location = Some(location.clone());
        Ok(())
    }

    fn persist(
        &mut self,
        descriptor: &OutputDescriptor,
        artifact: &Artifact,
    ) -> Result<PersistedArtifact, StoreError> {
        if self.location.is_none() {
            return Err(StoreError::NoContainer);
        }
        let key = descriptor.key();
        let prior = self
            .embedded
            .get(&key)
            .or_else(|| self.discrete.get(&key))
            .cloned();
        let id = match &prior {
            Some(record) if record.type_name == descriptor.type_name => record.id,
            _ => artifact.id(),
        };
        self.embedded.shift_remove(&key);
        self.discrete.shift_remove(&key);

        let path = descriptor.relative_path();
        let record = StoredRecord {
            key: key.clone(),
            id,
            type_name: descriptor.type_name.clone(),
            path: path.clone(),
        };
        if descriptor.is_embedded() {
            self.embedded.insert(key.clone(), record);
        } else {
            self.discrete.insert(key.clone(), record);
        }
        Ok(PersistedArtifact {
            id,
            key,
            type_name: descriptor.type_name.clone(),
            path,
            embedded: descriptor.is_embedded(),
        })
    }

    fn clear(&mut self, key: &str) -> Result<(), StoreError> {
        self.embedded.shift_remove(key);
        self.discrete.shift_remove(key);
        Ok(())
    }

    fn known_paths(&self) -> BTreeSet<String> {
        self.discrete
            .values()
            .filter_map(|r| r.path.clone())
            .collect()
    }

    fn reconcile(
        &mut self,
        new_embedded: &BTreeSet<String>,
        new_discrete: &BTreeSet<String>,
    ) -> Result<usize, StoreError> {
        let orphan_embedded: Vec<String> = self
            .embedded
            .keys()
            .filter(|k| !new_embedded.contains(*k))
            .cloned()
            .collect();
        let orphan_discrete: Vec<String> = self
            .discrete
            .keys()
            .filter(|k| !new_discrete.contains(*k))
            .cloned()
            .collect();
        let destroyed = orphan_embedded.len() + orphan_discrete.len();
        for key in orphan_embedded {
            self.embedded.shift_remove(&key);
            self.destroyed.push(key);
        }
        for key in orphan_discrete {
            self.discrete.shift_remove(&key);
            self.destroyed.push(key);
        }
        Ok(destroyed)
    }

    fn flush(&mut self) -> Result<(), StoreError> {
        self.flushes += 1;
        Ok(())
    }

    fn cleanup_locations(&mut self, old: &RunLocation) -> Result<(), StoreError> {
        if self.location.as_ref() != Some(old) {
            self.cleaned.push(old.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assetforge_graph::{Availability, SlotId};

    fn descriptor(node: &str, grouping: Option<&str>) -> OutputDescriptor {
        OutputDescriptor {
            slot: SlotId::new(),
            node_name: node.into(),
            slot_name: "out".into(),
            type_name: "Text".into(),
            availability: Availability::AfterGeneration,
            grouping_path: grouping.map(Into::into),
            consumed_mutating: false,
        }
    }

    fn ready() -> MemoryStore {
        let mut store = MemoryStore::new();
        store
            .ensure_container(&RunLocation::new("world", "/tmp"))
            .unwrap();
        store
    }

    #[test]
    fn test_identity_preserved_across_persists() {
        let mut store = ready();
        let desc = descriptor("gen", None);
        let first = store.persist(&desc, &Artifact::new(String::new())).unwrap();
        let second = store.persist(&desc, &Artifact::new(String::new())).unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(store.embedded_keys(), vec!["gen/out".to_string()]);
    }

    #[test]
    fn test_persist_requires_container() {
        let mut store = MemoryStore::new();
        assert!(matches!(
            store.persist(&descriptor("gen", None), &Artifact::new(0_u32)),
            Err(StoreError::NoContainer)
        ));
    }

    #[test]
    fn test_reconcile_destroys_orphans() {
        let mut store = ready();
        store
            .persist(&descriptor("keep", None), &Artifact::new(String::new()))
            .unwrap();
        store
            .persist(&descriptor("drop", Some("g")), &Artifact::new(String::new()))
            .unwrap();

        let keep: BTreeSet<String> = ["keep/out".to_string()].into();
        let destroyed = store.reconcile(&keep, &BTreeSet::new()).unwrap();
        assert_eq!(destroyed, 1);
        assert_eq!(store.destroyed(), ["drop/out".to_string()]);
        assert!(store.discrete_keys().is_empty());
    }

    #[test]
    fn test_should_persist_rules() {
        let store = ready();
        let forced = BTreeSet::new();

        let mut desc = descriptor("gen", None);
        assert!(store.should_persist(&desc, &forced));

        desc.availability = Availability::DuringGeneration;
        assert!(!store.should_persist(&desc, &forced));

        desc.consumed_mutating = true;
        assert!(store.should_persist(&desc, &forced));

        desc.consumed_mutating = false;
        let forced: BTreeSet<SlotId> = [desc.slot].into();
        assert!(store.should_persist(&desc, &forced));
    }
}
