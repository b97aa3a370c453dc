// SPDX-License-Identifier: MIT OR Apache-2.0
//! Registry of constructible generator types.
//!
//! An explicit registry object built once at startup and passed by
//! reference to whatever needs to enumerate or construct generators;
//! there is no global registration.

use crate::node::{Generator, GeneratorNode};
use indexmap::IndexMap;

/// Generator type category, used to group entries in host UIs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorCategory {
    /// Produces artifacts from configuration alone
    Source,
    /// Derives artifacts from upstream artifacts
    Transform,
    /// Merges several upstream artifacts
    Combine,
    /// Utility/plumbing generators
    Utility,
    /// Host-defined generators
    Custom,
}

/// Descriptive metadata for a registered generator type
#[derive(Debug, Clone)]
pub struct GeneratorInfo {
    /// Registry key; matches [`Generator::type_name`]
    pub type_name: &'static str,
    /// Display name
    pub label: String,
    /// Category
    pub category: GeneratorCategory,
    /// Short description
    pub description: String,
}

struct Entry {
    info: GeneratorInfo,
    construct: Box<dyn Fn() -> Box<dyn Generator>>,
}

/// Registry of available generator types
#[derive(Default)]
pub struct GeneratorRegistry {
    entries: IndexMap<&'static str, Entry>,
}

impl GeneratorRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a generator type with its constructor
    pub fn register(
        &mut self,
        info: GeneratorInfo,
        construct: impl Fn() -> Box<dyn Generator> + 'static,
    ) {
        self.entries.insert(
            info.type_name,
            Entry {
                info,
                construct: Box::new(construct),
            },
        );
    }

    /// Metadata for a registered type
    pub fn info(&self, type_name: &str) -> Option<&GeneratorInfo> {
        self.entries.get(type_name).map(|e| &e.info)
    }

    /// Metadata for every registered type, in registration order
    pub fn infos(&self) -> impl Iterator<Item = &GeneratorInfo> {
        self.entries.values().map(|e| &e.info)
    }

    /// Registered types in a category
    pub fn in_category(
        &self,
        category: GeneratorCategory,
    ) -> impl Iterator<Item = &GeneratorInfo> {
        self.infos().filter(move |i| i.category == category)
    }

    /// Construct a bare generator of the given type
    pub fn construct(&self, type_name: &str) -> Option<Box<dyn Generator>> {
        self.entries.get(type_name).map(|e| (e.construct)())
    }

    /// Construct a named node of the given type
    pub fn create_node(&self, type_name: &str, node_name: &str) -> Option<GeneratorNode> {
        self.construct(type_name)
            .map(|behavior| GeneratorNode::new(node_name, behavior))
    }

    /// Number of registered types
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeBuilder;
    use crate::slot::OutputSlot;
    use crate::task::{GenerationContext, GenerationTask, StepOutcome, TaskError};

    struct NoopTask;
    impl GenerationTask for NoopTask {
        fn step(&mut self, _ctx: &mut GenerationContext<'_>) -> Result<StepOutcome, TaskError> {
            Ok(StepOutcome::Finished)
        }
    }

    #[derive(Default)]
    struct Blank;
    impl crate::node::Generator for Blank {
        fn type_name(&self) -> &'static str {
            "blank"
        }
        fn initialize(&mut self, node: &mut NodeBuilder<'_>) {
            node.output(OutputSlot::of::<String>("out"));
        }
        fn begin_generation(&mut self) -> Box<dyn GenerationTask> {
            Box::new(NoopTask)
        }
    }

    #[test]
    fn test_register_and_create() {
        let mut registry = GeneratorRegistry::new();
        registry.register(
            GeneratorInfo {
                type_name: "blank",
                label: "Blank".into(),
                category: GeneratorCategory::Source,
                description: "Does nothing".into(),
            },
            || Box::new(Blank),
        );

        assert_eq!(registry.len(), 1);
        assert!(registry.info("blank").is_some());
        assert!(registry.construct("missing").is_none());

        let node = registry.create_node("blank", "my blank").unwrap();
        assert_eq!(node.name, "my blank");
        assert_eq!(node.type_name(), "blank");
        assert_eq!(node.outputs().len(), 1);
    }

    #[test]
    fn test_category_filter() {
        let mut registry = GeneratorRegistry::new();
        registry.register(
            GeneratorInfo {
                type_name: "blank",
                label: "Blank".into(),
                category: GeneratorCategory::Source,
                description: String::new(),
            },
            || Box::new(Blank),
        );
        assert_eq!(registry.in_category(GeneratorCategory::Source).count(), 1);
        assert_eq!(registry.in_category(GeneratorCategory::Utility).count(), 0);
    }
}
