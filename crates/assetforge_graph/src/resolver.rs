// SPDX-License-Identifier: MIT OR Apache-2.0
//! Dependency ordering for generator nodes.

use crate::error::GraphError;
use crate::node::NodeId;
use crate::node_set::NodeSet;
use std::collections::HashSet;

/// Order nodes so that every dependency precedes its dependents.
///
/// Iterative peeling: repeatedly scan the remainder, moving every node
/// whose dependencies are already ordered. A scan that moves nothing
/// means the remainder participates in a cycle, which is fatal. The scan
/// is quadratic in the worst case; node counts are small (dozens) and the
/// simple form is easier to reason about than a DFS sort.
pub fn dependency_ordered(set: &NodeSet) -> Result<Vec<NodeId>, GraphError> {
    let mut remaining: Vec<NodeId> = set.node_ids().collect();
    let mut ordered = Vec::with_capacity(remaining.len());
    let mut placed: HashSet<NodeId> = HashSet::with_capacity(remaining.len());

    while !remaining.is_empty() {
        let mut moved = false;
        let mut index = 0;
        while index < remaining.len() {
            let id = remaining[index];
            let ready = set
                .dependency_nodes(id)?
                .iter()
                .all(|dep| placed.contains(dep));
            if ready {
                remaining.remove(index);
                ordered.push(id);
                placed.insert(id);
                moved = true;
            } else {
                index += 1;
            }
        }
        if !moved {
            let names = remaining
                .iter()
                .filter_map(|id| set.node(*id).map(|n| n.name.clone()))
                .collect();
            return Err(GraphError::Cycle { remaining: names });
        }
    }
    Ok(ordered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Generator, GeneratorNode, NodeBuilder};
    use crate::slot::{InputSlot, OutputSlot};
    use crate::task::{GenerationContext, GenerationTask, StepOutcome, TaskError};

    struct Doc;

    struct NoopTask;
    impl GenerationTask for NoopTask {
        fn step(&mut self, _ctx: &mut GenerationContext<'_>) -> Result<StepOutcome, TaskError> {
            Ok(StepOutcome::Finished)
        }
    }

    /// One optional input, one output; lets tests wire arbitrary shapes.
    struct Stage;
    impl Generator for Stage {
        fn type_name(&self) -> &'static str {
            "test-stage"
        }
        fn initialize(&mut self, node: &mut NodeBuilder<'_>) {
            node.input(InputSlot::of::<Doc>("in").optional());
            node.input(InputSlot::of::<Doc>("aux").optional());
            node.output(OutputSlot::of::<Doc>("out"));
        }
        fn begin_generation(&mut self) -> Box<dyn GenerationTask> {
            Box::new(NoopTask)
        }
    }

    fn stage(set: &mut NodeSet, name: &str) -> NodeId {
        set.add(GeneratorNode::new(name, Box::new(Stage))).unwrap()
    }

    fn wire(set: &mut NodeSet, upstream: NodeId, downstream: NodeId, slot: &str) {
        let out = set.node(upstream).unwrap().output_named("out").unwrap().id;
        let input = set.node(downstream).unwrap().input_named(slot).unwrap().id;
        set.connect(input, out).unwrap();
    }

    #[test]
    fn test_orders_linear_chain() {
        // Insert in reverse list order; resolution must still be a, b, c.
        let mut set = NodeSet::new();
        let c = stage(&mut set, "c");
        let b = stage(&mut set, "b");
        let a = stage(&mut set, "a");
        wire(&mut set, a, b, "in");
        wire(&mut set, b, c, "in");

        let order = dependency_ordered(&set).unwrap();
        assert_eq!(order, vec![a, b, c]);
    }

    #[test]
    fn test_orders_diamond() {
        let mut set = NodeSet::new();
        let top = stage(&mut set, "top");
        let left = stage(&mut set, "left");
        let right = stage(&mut set, "right");
        let bottom = stage(&mut set, "bottom");
        wire(&mut set, top, left, "in");
        wire(&mut set, top, right, "in");
        wire(&mut set, left, bottom, "in");
        wire(&mut set, right, bottom, "aux");

        let order = dependency_ordered(&set).unwrap();
        let position = |id: NodeId| order.iter().position(|n| *n == id).unwrap();
        assert!(position(top) < position(left));
        assert!(position(top) < position(right));
        assert!(position(left) < position(bottom));
        assert!(position(right) < position(bottom));
    }

    #[test]
    fn test_cycle_detected() {
        let mut set = NodeSet::new();
        let a = stage(&mut set, "a");
        let b = stage(&mut set, "b");
        wire(&mut set, a, b, "in");
        wire(&mut set, b, a, "in");

        match dependency_ordered(&set) {
            Err(GraphError::Cycle { remaining }) => {
                assert_eq!(remaining.len(), 2);
                assert!(remaining.contains(&"a".to_string()));
                assert!(remaining.contains(&"b".to_string()));
            }
            other => panic!("expected cycle error, got {other:?}"),
        }
    }

    #[test]
    fn test_independent_nodes_keep_list_order() {
        let mut set = NodeSet::new();
        let a = stage(&mut set, "a");
        let b = stage(&mut set, "b");
        let order = dependency_ordered(&set).unwrap();
        assert_eq!(order, vec![a, b]);
    }
}
