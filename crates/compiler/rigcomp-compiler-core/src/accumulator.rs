//! The Direct Accumulator: one shared Direct blend tree that every optimized
//! layer contributes to.
//!
//! The tree lives in a dedicated layer at the top of the stack, found by name
//! so that a second pass reuses it. Children are only ever appended; contents
//! sum and are never normalised, so children cannot influence each other.

use log::debug;
use rigcomp_controller_core::{
    BlendChild, BlendKind, BlendTree, Controller, LayerId, Motion, MotionId, Origin, Provenance,
};

use crate::config::CompilerConfig;
use crate::error::{CompileError, CompileResult};

/// Where the shared tree lives once it exists.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SinkLocation {
    pub layer: LayerId,
    pub tree: MotionId,
}

/// Children staged for the shared tree.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DirectAccumulator {
    children: Vec<BlendChild>,
}

impl DirectAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage `motion`, weighted verbatim by the current value of `weight`.
    pub fn add(&mut self, weight: &str, motion: MotionId) {
        self.children.push(BlendChild::direct(Some(motion), weight));
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn children(&self) -> &[BlendChild] {
        &self.children
    }

    /// Find an existing sink layer. A layer carrying the sink name that is not
    /// shaped like one is treated as corruption.
    pub fn locate(
        controller: &Controller,
        config: &CompilerConfig,
    ) -> CompileResult<Option<SinkLocation>> {
        let Some(layer) = controller.layer_by_name(&config.accumulator_layer_name) else {
            return Ok(None);
        };
        let malformed = || {
            CompileError::invariant(format!(
                "Layer '{}' is not a direct accumulator",
                layer.name
            ))
        };
        let [state] = layer.states.as_slice() else {
            return Err(malformed());
        };
        let tree = state.motion.ok_or_else(malformed)?;
        match controller.motion(tree) {
            Some(Motion::BlendTree(BlendTree {
                kind: BlendKind::Direct,
                ..
            })) => Ok(Some(SinkLocation {
                layer: layer.id,
                tree,
            })),
            _ => Err(malformed()),
        }
    }

    /// Locate the sink, creating it at the top of the layer stack if missing.
    pub fn ensure(
        controller: &mut Controller,
        config: &CompilerConfig,
        provenance: &mut Provenance,
    ) -> CompileResult<SinkLocation> {
        if let Some(found) = Self::locate(controller, config)? {
            return Ok(found);
        }
        let tree = controller.add_motion(Motion::BlendTree(BlendTree::new(
            config.accumulator_layer_name.clone(),
            BlendKind::Direct,
        )));
        let layer = controller.add_layer(config.accumulator_layer_name.clone());
        controller.add_state(layer, "Direct", Some(tree))?;
        provenance.mark_motion(tree, Origin::GeneratedThisPass);
        provenance.mark_layer(layer, Origin::GeneratedThisPass);
        debug!(
            "created direct accumulator layer '{}'",
            config.accumulator_layer_name
        );
        Ok(SinkLocation { layer, tree })
    }

    /// Append the staged children to the shared tree.
    pub fn commit(
        self,
        controller: &mut Controller,
        config: &CompilerConfig,
        provenance: &mut Provenance,
    ) -> CompileResult<()> {
        if self.children.is_empty() {
            return Ok(());
        }
        let sink = Self::ensure(controller, config, provenance)?;
        match controller.motions.get_mut(sink.tree) {
            Some(Motion::BlendTree(tree)) => {
                tree.children.extend(self.children);
                Ok(())
            }
            _ => Err(CompileError::invariant("direct accumulator tree vanished")),
        }
    }
}
