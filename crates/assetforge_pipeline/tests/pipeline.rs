// SPDX-License-Identifier: MIT OR Apache-2.0
//! End-to-end pipeline tests: full generation runs over a memory store,
//! fault propagation, reconciliation across runs, and save/load.

use assetforge_graph::{
    Generator, GenerationContext, GenerationTask, GeneratorNode, GraphError, NodeBuilder,
    OutputSlot, StepOutcome, TaskError,
};
use assetforge_pipeline::generators::{
    digest_hex, ConcatConfig, ConcatGenerator, ConcatMode, ConstantGenerator, DigestGenerator,
    RelayGenerator,
};
use assetforge_pipeline::{
    default_registry, drive_to_completion, DigestAsset, Executive, PipelineError, RunStatus,
    TextAsset,
};
use assetforge_store::MemoryStore;

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn executive() -> Executive<MemoryStore> {
    Executive::new(MemoryStore::new())
}

/// constant("hello") -> relay -> digest, fully connected
fn build_chain(exec: &mut Executive<MemoryStore>) {
    let greeting = exec
        .add_node(GeneratorNode::new(
            "greeting",
            Box::new(ConstantGenerator::with_text("hello")),
        ))
        .unwrap();
    let relay = exec
        .add_node(GeneratorNode::new(
            "relay",
            Box::new(RelayGenerator::default()),
        ))
        .unwrap();
    let hash = exec
        .add_node(GeneratorNode::new(
            "hash",
            Box::new(DigestGenerator::default()),
        ))
        .unwrap();

    let greeting_out = exec.nodes().node(greeting).unwrap().output_named("value").unwrap().id;
    let relay_in = exec.nodes().node(relay).unwrap().input_named("value").unwrap().id;
    let relay_out = exec.nodes().node(relay).unwrap().output_named("value").unwrap().id;
    let hash_in = exec.nodes().node(hash).unwrap().input_named("source").unwrap().id;

    exec.connect(relay_in, greeting_out).unwrap();
    exec.connect(hash_in, relay_out).unwrap();
}

#[test]
fn test_end_to_end_generation() {
    init_logging();
    let mut exec = executive();
    build_chain(&mut exec);

    exec.generate("world", "/tmp/forge").unwrap();
    assert!(exec.is_generating());
    drive_to_completion(&mut exec).unwrap();
    assert!(!exec.is_generating());

    // The constant's output embeds in the container; the digest persists
    // as a discrete grouped artifact; the relay's intermediate does not
    // outlive the run.
    let store = exec.store();
    assert_eq!(store.embedded_keys(), vec!["greeting/value".to_string()]);
    assert_eq!(store.discrete_keys(), vec!["hash/digest".to_string()]);

    let digest = exec
        .nodes()
        .node_named("hash")
        .unwrap()
        .output_named("digest")
        .unwrap()
        .artifact()
        .expect("digest artifact is retained after the run")
        .downcast_ref::<DigestAsset>()
        .unwrap()
        .clone();
    assert_eq!(digest.hex, digest_hex(b"hello"));

    // The relay's transient artifact was dropped at completion.
    assert!(exec
        .nodes()
        .node_named("relay")
        .unwrap()
        .output_named("value")
        .unwrap()
        .artifact()
        .is_none());
}

#[test]
fn test_progress_is_monotonic_and_completes() {
    let mut exec = executive();
    build_chain(&mut exec);
    exec.generate("world", "/tmp/forge").unwrap();

    let mut previous = exec.generation_progress();
    assert_eq!(previous, 0.0);
    loop {
        let status = exec.step().unwrap();
        let progress = exec.generation_progress();
        assert!(progress >= previous, "progress regressed: {previous} -> {progress}");
        assert!(progress <= 1.0);
        if status == RunStatus::Finished {
            break;
        }
        assert!(progress < 1.0, "progress hit 1.0 before completion");
        previous = progress;
    }
    assert_eq!(exec.generation_progress(), 1.0);
}

#[test]
fn test_cycle_aborts_run() {
    let mut exec = executive();
    let single = ConcatConfig {
        mode: ConcatMode::Single,
        separator: String::new(),
    };
    let a = exec
        .add_node(GeneratorNode::new(
            "a",
            Box::new(ConcatGenerator { config: single.clone() }),
        ))
        .unwrap();
    let b = exec
        .add_node(GeneratorNode::new(
            "b",
            Box::new(ConcatGenerator { config: single }),
        ))
        .unwrap();
    exec.update_all().unwrap();

    let a_in = exec.nodes().node(a).unwrap().input_named("single").unwrap().id;
    let a_out = exec.nodes().node(a).unwrap().output_named("joined").unwrap().id;
    let b_in = exec.nodes().node(b).unwrap().input_named("single").unwrap().id;
    let b_out = exec.nodes().node(b).unwrap().output_named("joined").unwrap().id;
    exec.connect(a_in, b_out).unwrap();
    exec.connect(b_in, a_out).unwrap();

    exec.generate("world", "/tmp/forge").unwrap();
    let error = drive_to_completion(&mut exec).unwrap_err();
    match error {
        PipelineError::Graph(GraphError::Cycle { remaining }) => {
            assert!(remaining.contains(&"a".to_string()));
            assert!(remaining.contains(&"b".to_string()));
        }
        other => panic!("expected cycle error, got {other}"),
    }
    assert!(!exec.is_generating());
    assert_eq!(exec.generation_progress(), 0.0);
}

/// Emits nothing; its background work fails.
struct FaultySource;
impl Generator for FaultySource {
    fn type_name(&self) -> &'static str {
        "faulty"
    }
    fn initialize(&mut self, node: &mut NodeBuilder<'_>) {
        node.output(OutputSlot::of::<TextAsset>("value"));
    }
    fn begin_generation(&mut self) -> Box<dyn GenerationTask> {
        Box::new(FaultyTask { dispatched: false })
    }
}

struct FaultyTask {
    dispatched: bool,
}
impl GenerationTask for FaultyTask {
    fn step(&mut self, ctx: &mut GenerationContext<'_>) -> Result<StepOutcome, TaskError> {
        if self.dispatched {
            return Err(TaskError::Failed(
                "stepped past a fault that should have aborted the run".into(),
            ));
        }
        self.dispatched = true;
        let handle = ctx
            .worker()
            .dispatch(Box::new(|| Err(TaskError::Failed("boom".into()))))?;
        Ok(StepOutcome::Waiting(handle))
    }
}

#[test]
fn test_background_fault_propagates() {
    init_logging();
    let mut exec = executive();
    exec.add_node(GeneratorNode::new("bad", Box::new(FaultySource)))
        .unwrap();

    exec.generate("world", "/tmp/forge").unwrap();
    let error = drive_to_completion(&mut exec).unwrap_err();
    match error {
        PipelineError::Worker(TaskError::Failed(message)) => assert_eq!(message, "boom"),
        other => panic!("expected worker fault, got {other}"),
    }
    assert!(!exec.is_generating());
    assert_eq!(exec.generation_progress(), 0.0);
    assert_eq!(exec.generation_message(), "");
}

/// Fails directly on the driving thread.
struct DirectFail;
impl Generator for DirectFail {
    fn type_name(&self) -> &'static str {
        "direct-fail"
    }
    fn initialize(&mut self, node: &mut NodeBuilder<'_>) {
        node.output(OutputSlot::of::<TextAsset>("value"));
    }
    fn begin_generation(&mut self) -> Box<dyn GenerationTask> {
        Box::new(DirectFailTask)
    }
}

struct DirectFailTask;
impl GenerationTask for DirectFailTask {
    fn step(&mut self, _ctx: &mut GenerationContext<'_>) -> Result<StepOutcome, TaskError> {
        Err(TaskError::Failed("node exploded".into()))
    }
}

#[test]
fn test_node_error_aborts_run() {
    let mut exec = executive();
    exec.add_node(GeneratorNode::new("bad", Box::new(DirectFail)))
        .unwrap();

    exec.generate("world", "/tmp/forge").unwrap();
    let error = drive_to_completion(&mut exec).unwrap_err();
    match error {
        PipelineError::Node { node, source } => {
            assert_eq!(node, "bad");
            assert!(matches!(source, TaskError::Failed(m) if m == "node exploded"));
        }
        other => panic!("expected node error, got {other}"),
    }
    assert!(!exec.is_generating());
}

#[test]
fn test_orphan_reconciliation_across_runs() {
    let mut exec = executive();
    exec.add_node(GeneratorNode::new(
        "a",
        Box::new(ConstantGenerator::with_text("one")),
    ))
    .unwrap();
    let b = exec
        .add_node(GeneratorNode::new(
            "b",
            Box::new(ConstantGenerator::with_text("two")),
        ))
        .unwrap();

    exec.generate("world", "/tmp/forge").unwrap();
    drive_to_completion(&mut exec).unwrap();
    assert_eq!(
        exec.store().embedded_keys(),
        vec!["a/value".to_string(), "b/value".to_string()]
    );
    let a_identity = exec.store().record("a/value").unwrap().id;

    // Drop `b` and regenerate: its artifact is destroyed as an orphan
    // while `a` keeps its identity.
    exec.remove_node(b).unwrap();
    exec.generate("world", "/tmp/forge").unwrap();
    drive_to_completion(&mut exec).unwrap();

    assert_eq!(exec.store().embedded_keys(), vec!["a/value".to_string()]);
    assert_eq!(exec.store().destroyed(), ["b/value".to_string()]);
    assert_eq!(exec.store().record("a/value").unwrap().id, a_identity);
}

#[test]
fn test_rename_triggers_old_location_cleanup() {
    let mut exec = executive();
    exec.add_node(GeneratorNode::new(
        "a",
        Box::new(ConstantGenerator::with_text("one")),
    ))
    .unwrap();

    exec.generate("old", "/tmp/forge").unwrap();
    drive_to_completion(&mut exec).unwrap();
    assert!(exec.store().cleaned().is_empty());

    exec.generate("new", "/tmp/forge").unwrap();
    drive_to_completion(&mut exec).unwrap();
    let cleaned = exec.store().cleaned();
    assert_eq!(cleaned.len(), 1);
    assert_eq!(cleaned[0].name, "old");
}

#[test]
fn test_save_load_roundtrip() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("pipeline.ron");

    let mut exec = executive();
    build_chain(&mut exec);
    exec.save(&path).unwrap();

    let registry = default_registry();
    let mut loaded = Executive::load(&path, &registry, MemoryStore::new()).unwrap();

    assert_eq!(loaded.nodes().len(), 3);
    let relay_in = loaded
        .nodes()
        .node_named("relay")
        .unwrap()
        .input_named("value")
        .unwrap();
    let greeting_out = loaded
        .nodes()
        .node_named("greeting")
        .unwrap()
        .output_named("value")
        .unwrap();
    assert_eq!(relay_in.source(), Some(greeting_out.id));

    // The restored pipeline generates the same digest as the original.
    loaded.generate("world", "/tmp/forge").unwrap();
    drive_to_completion(&mut loaded).unwrap();
    let digest = loaded
        .nodes()
        .node_named("hash")
        .unwrap()
        .output_named("digest")
        .unwrap()
        .artifact()
        .unwrap()
        .downcast_ref::<DigestAsset>()
        .unwrap()
        .clone();
    assert_eq!(digest.hex, digest_hex(b"hello"));
}

#[test]
fn test_unknown_generator_on_load() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("pipeline.ron");

    let mut exec = executive();
    exec.add_node(GeneratorNode::new("bad", Box::new(DirectFail)))
        .unwrap();
    exec.save(&path).unwrap();

    // `direct-fail` is not in the default registry.
    let registry = default_registry();
    assert!(matches!(
        Executive::<MemoryStore>::load(&path, &registry, MemoryStore::new()),
        Err(PipelineError::UnknownGenerator { type_name }) if type_name == "direct-fail"
    ));
}

#[test]
fn test_concat_modes_end_to_end() {
    let mut exec = executive();
    let left = exec
        .add_node(GeneratorNode::new(
            "left",
            Box::new(ConstantGenerator::with_text("half")),
        ))
        .unwrap();
    let right = exec
        .add_node(GeneratorNode::new(
            "right",
            Box::new(ConstantGenerator::with_text("edge")),
        ))
        .unwrap();
    let join = exec
        .add_node(GeneratorNode::new(
            "join",
            Box::new(ConcatGenerator {
                config: ConcatConfig {
                    mode: ConcatMode::Pair,
                    separator: "-".into(),
                },
            }),
        ))
        .unwrap();
    exec.update_all().unwrap();

    let left_out = exec.nodes().node(left).unwrap().output_named("value").unwrap().id;
    let right_out = exec.nodes().node(right).unwrap().output_named("value").unwrap().id;
    let join_left = exec.nodes().node(join).unwrap().input_named("left").unwrap().id;
    let join_right = exec.nodes().node(join).unwrap().input_named("right").unwrap().id;
    exec.connect(join_left, left_out).unwrap();
    exec.connect(join_right, right_out).unwrap();

    exec.generate("world", "/tmp/forge").unwrap();
    drive_to_completion(&mut exec).unwrap();

    let joined = exec
        .nodes()
        .node(join)
        .unwrap()
        .output_named("joined")
        .unwrap()
        .artifact()
        .unwrap()
        .downcast_ref::<TextAsset>()
        .unwrap()
        .clone();
    assert_eq!(joined.content, "half-edge");
}
