// SPDX-License-Identifier: MIT OR Apache-2.0
//! Built-in generators and the default registry.
//!
//! A small roster of text-artifact generators that a pipeline host can
//! use directly or as templates for its own: constant sources, relays,
//! mode-switched concatenation, and a digest generator that offloads its
//! hashing to the background worker.

use assetforge_graph::{
    Availability, Generator, GenerationContext, GenerationTask, GeneratorCategory, GeneratorInfo,
    GeneratorRegistry, GraphError, InputSlot, NodeBuilder, OutputSlot, SlotToggles, StepOutcome,
    TaskError,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Plain text content flowing between the built-in generators
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextAsset {
    /// The text content
    pub content: String,
}

/// Hex digest of an upstream asset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestAsset {
    /// Lowercase hex digest
    pub hex: String,
}

/// 64-bit FNV-1a digest, rendered as lowercase hex
pub fn digest_hex(data: &[u8]) -> String {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in data {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    format!("{hash:016x}")
}

fn encode_config<T: Serialize>(config: &T) -> Result<String, GraphError> {
    ron::to_string(config).map_err(|e| GraphError::Config {
        message: e.to_string(),
    })
}

fn decode_config<T: for<'de> Deserialize<'de>>(ron: &str) -> Result<T, GraphError> {
    ron::from_str(ron).map_err(|e| GraphError::Config {
        message: e.to_string(),
    })
}

// ----------------------------------------------------------------------
// Constant
// ----------------------------------------------------------------------

/// Configuration for [`ConstantGenerator`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstantConfig {
    /// The text to emit
    pub text: String,
}

/// Emits a constant text artifact from configuration
#[derive(Debug, Default)]
pub struct ConstantGenerator {
    /// Generator configuration
    pub config: ConstantConfig,
}

impl ConstantGenerator {
    /// Create a constant generator emitting `text`
    pub fn with_text(text: impl Into<String>) -> Self {
        Self {
            config: ConstantConfig { text: text.into() },
        }
    }
}

impl Generator for ConstantGenerator {
    fn type_name(&self) -> &'static str {
        "constant"
    }

    fn initialize(&mut self, node: &mut NodeBuilder<'_>) {
        node.output(OutputSlot::of::<TextAsset>("value"));
        node.duration_hint(0.05);
    }

    fn begin_generation(&mut self) -> Box<dyn GenerationTask> {
        Box::new(ConstantTask {
            text: self.config.text.clone(),
        })
    }

    fn config_ron(&self) -> Result<String, GraphError> {
        encode_config(&self.config)
    }

    fn restore_config(&mut self, ron: &str) -> Result<(), GraphError> {
        self.config = decode_config(ron)?;
        Ok(())
    }
}

struct ConstantTask {
    text: String,
}

impl GenerationTask for ConstantTask {
    fn step(&mut self, ctx: &mut GenerationContext<'_>) -> Result<StepOutcome, TaskError> {
        ctx.set_output(
            "value",
            TextAsset {
                content: self.text.clone(),
            },
        )?;
        Ok(StepOutcome::Finished)
    }
}

// ----------------------------------------------------------------------
// Relay
// ----------------------------------------------------------------------

/// Configuration for [`RelayGenerator`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Emitted when the input is unconnected
    pub fallback: String,
}

/// Passes its optional input through, or emits a configured fallback.
///
/// The relay's output is an intermediate: it is not retained once the
/// run completes.
#[derive(Debug, Default)]
pub struct RelayGenerator {
    /// Generator configuration
    pub config: RelayConfig,
}

impl Generator for RelayGenerator {
    fn type_name(&self) -> &'static str {
        "relay"
    }

    fn initialize(&mut self, node: &mut NodeBuilder<'_>) {
        node.input(InputSlot::of::<TextAsset>("value").optional());
        node.output(OutputSlot::of::<TextAsset>("value").available(Availability::DuringGeneration));
        node.duration_hint(0.02);
    }

    fn begin_generation(&mut self) -> Box<dyn GenerationTask> {
        Box::new(RelayTask {
            fallback: self.config.fallback.clone(),
        })
    }

    fn config_ron(&self) -> Result<String, GraphError> {
        encode_config(&self.config)
    }

    fn restore_config(&mut self, ron: &str) -> Result<(), GraphError> {
        self.config = decode_config(ron)?;
        Ok(())
    }
}

struct RelayTask {
    fallback: String,
}

impl GenerationTask for RelayTask {
    fn step(&mut self, ctx: &mut GenerationContext<'_>) -> Result<StepOutcome, TaskError> {
        match ctx.input_artifact("value")? {
            Some(artifact) => ctx.set_output_artifact("value", artifact)?,
            None => {
                ctx.set_output(
                    "value",
                    TextAsset {
                        content: self.fallback.clone(),
                    },
                )?;
            }
        }
        Ok(StepOutcome::Finished)
    }
}

// ----------------------------------------------------------------------
// Concat
// ----------------------------------------------------------------------

/// Which inputs [`ConcatGenerator`] consumes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConcatMode {
    /// Join the `left` and `right` inputs
    #[default]
    Pair,
    /// Pass the `single` input through
    Single,
}

/// Configuration for [`ConcatGenerator`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcatConfig {
    /// Input mode; the unused inputs are deactivated on update
    pub mode: ConcatMode,
    /// Separator placed between joined inputs
    pub separator: String,
}

impl Default for ConcatConfig {
    fn default() -> Self {
        Self {
            mode: ConcatMode::default(),
            separator: " ".into(),
        }
    }
}

/// Joins upstream text artifacts; its two modes are mutually exclusive,
/// so the update cycle deactivates (and thereby disconnects) whichever
/// inputs the current mode does not use.
#[derive(Debug, Default)]
pub struct ConcatGenerator {
    /// Generator configuration
    pub config: ConcatConfig,
}

impl Generator for ConcatGenerator {
    fn type_name(&self) -> &'static str {
        "concat"
    }

    fn initialize(&mut self, node: &mut NodeBuilder<'_>) {
        node.input(InputSlot::of::<TextAsset>("left"));
        node.input(InputSlot::of::<TextAsset>("right"));
        node.input(InputSlot::of::<TextAsset>("single"));
        node.output(OutputSlot::of::<TextAsset>("joined"));
        node.duration_hint(0.05);
    }

    fn on_update(&mut self, slots: &mut SlotToggles<'_>) {
        let pair = self.config.mode == ConcatMode::Pair;
        slots.set_input_active("left", pair);
        slots.set_input_active("right", pair);
        slots.set_input_active("single", !pair);
    }

    fn begin_generation(&mut self) -> Box<dyn GenerationTask> {
        Box::new(ConcatTask {
            mode: self.config.mode,
            separator: self.config.separator.clone(),
            buffer: None,
        })
    }

    fn config_ron(&self) -> Result<String, GraphError> {
        encode_config(&self.config)
    }

    fn restore_config(&mut self, ron: &str) -> Result<(), GraphError> {
        self.config = decode_config(ron)?;
        Ok(())
    }
}

struct ConcatTask {
    mode: ConcatMode,
    separator: String,
    buffer: Option<String>,
}

impl GenerationTask for ConcatTask {
    fn step(&mut self, ctx: &mut GenerationContext<'_>) -> Result<StepOutcome, TaskError> {
        match self.buffer.take() {
            None => {
                let joined = match self.mode {
                    ConcatMode::Pair => {
                        let left = ctx.input_payload::<TextAsset>("left")?;
                        let right = ctx.input_payload::<TextAsset>("right")?;
                        format!("{}{}{}", left.content, self.separator, right.content)
                    }
                    ConcatMode::Single => {
                        ctx.input_payload::<TextAsset>("single")?.content.clone()
                    }
                };
                self.buffer = Some(joined);
                Ok(StepOutcome::Advanced)
            }
            Some(joined) => {
                ctx.set_output("joined", TextAsset { content: joined })?;
                Ok(StepOutcome::Finished)
            }
        }
    }
}

// ----------------------------------------------------------------------
// Digest
// ----------------------------------------------------------------------

/// Configuration for [`DigestGenerator`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestConfig {
    /// Prepended to the input before hashing
    pub salt: String,
}

/// Hashes its input on the background worker and emits the digest
#[derive(Debug, Default)]
pub struct DigestGenerator {
    /// Generator configuration
    pub config: DigestConfig,
}

impl Generator for DigestGenerator {
    fn type_name(&self) -> &'static str {
        "digest"
    }

    fn initialize(&mut self, node: &mut NodeBuilder<'_>) {
        node.input(InputSlot::of::<TextAsset>("source"));
        node.output(OutputSlot::of::<DigestAsset>("digest").grouped("digests"));
        node.duration_hint(0.2);
    }

    fn begin_generation(&mut self) -> Box<dyn GenerationTask> {
        Box::new(DigestTask {
            salt: self.config.salt.clone(),
            pending: None,
        })
    }

    fn config_ron(&self) -> Result<String, GraphError> {
        encode_config(&self.config)
    }

    fn restore_config(&mut self, ron: &str) -> Result<(), GraphError> {
        self.config = decode_config(ron)?;
        Ok(())
    }
}

struct DigestTask {
    salt: String,
    pending: Option<Arc<Mutex<Option<String>>>>,
}

impl GenerationTask for DigestTask {
    fn step(&mut self, ctx: &mut GenerationContext<'_>) -> Result<StepOutcome, TaskError> {
        match self.pending.take() {
            None => {
                let text = ctx.input_payload::<TextAsset>("source")?;
                let result = Arc::new(Mutex::new(None));
                let captured = Arc::clone(&result);
                let salt = self.salt.clone();
                let handle = ctx.worker().dispatch(Box::new(move || {
                    let mut data = salt.into_bytes();
                    data.extend_from_slice(text.content.as_bytes());
                    *captured.lock() = Some(digest_hex(&data));
                    Ok(())
                }))?;
                self.pending = Some(result);
                Ok(StepOutcome::Waiting(handle))
            }
            Some(result) => {
                let hex = result
                    .lock()
                    .take()
                    .ok_or_else(|| TaskError::Failed("digest worker produced no result".into()))?;
                ctx.set_output("digest", DigestAsset { hex })?;
                Ok(StepOutcome::Finished)
            }
        }
    }
}

// ----------------------------------------------------------------------
// Registry
// ----------------------------------------------------------------------

/// Registry holding every built-in generator type
pub fn default_registry() -> GeneratorRegistry {
    let mut registry = GeneratorRegistry::new();
    registry.register(
        GeneratorInfo {
            type_name: "constant",
            label: "Constant Text".into(),
            category: GeneratorCategory::Source,
            description: "Emits a constant text artifact".into(),
        },
        || Box::new(ConstantGenerator::default()),
    );
    registry.register(
        GeneratorInfo {
            type_name: "relay",
            label: "Relay".into(),
            category: GeneratorCategory::Utility,
            description: "Passes its input through, or a fallback".into(),
        },
        || Box::new(RelayGenerator::default()),
    );
    registry.register(
        GeneratorInfo {
            type_name: "concat",
            label: "Concatenate".into(),
            category: GeneratorCategory::Combine,
            description: "Joins upstream text artifacts".into(),
        },
        || Box::new(ConcatGenerator::default()),
    );
    registry.register(
        GeneratorInfo {
            type_name: "digest",
            label: "Digest".into(),
            category: GeneratorCategory::Transform,
            description: "Hashes its input on the background worker".into(),
        },
        || Box::new(DigestGenerator::default()),
    );
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_is_deterministic() {
        assert_eq!(digest_hex(b"abc"), digest_hex(b"abc"));
        assert_ne!(digest_hex(b"abc"), digest_hex(b"abd"));
        assert_eq!(digest_hex(b"abc").len(), 16);
    }

    #[test]
    fn test_config_roundtrip() {
        let mut generator = ConcatGenerator {
            config: ConcatConfig {
                mode: ConcatMode::Single,
                separator: "-".into(),
            },
        };
        let encoded = generator.config_ron().unwrap();

        let mut restored = ConcatGenerator::default();
        restored.restore_config(&encoded).unwrap();
        assert_eq!(restored.config, generator.config);

        // Restoring garbage is a config error.
        assert!(matches!(
            generator.restore_config("not ron"),
            Err(GraphError::Config { .. })
        ));
    }

    #[test]
    fn test_default_registry_is_complete() {
        let registry = default_registry();
        for type_name in ["constant", "relay", "concat", "digest"] {
            assert!(registry.info(type_name).is_some(), "missing {type_name}");
            assert!(registry.construct(type_name).is_some());
        }
    }
}
