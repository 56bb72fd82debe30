//! Staged output for one layer.
//!
//! Everything a layer's rewrite creates (parameters, motions, accumulator
//! children, memoised reductions) is collected in a [`Draft`] that only reads
//! the controller. Finishing a draft yields a [`Patch`]; applying the patch is
//! the commit point. A rejected layer simply drops its draft, so a rejection
//! never leaves partial output behind.

use hashbrown::HashMap;
use log::trace;
use rigcomp_controller_core::{
    Controller, LayerId, Motion, MotionId, Origin, ParamKind, Parameter, Provenance,
};

use crate::accumulator::DirectAccumulator;
use crate::algebra::BlendAlgebra;
use crate::config::CompilerConfig;
use crate::error::{CompileError, CompileResult};
use crate::reducer::ReduceKey;

pub struct Draft<'c> {
    base: &'c Controller,
    config: &'c CompilerConfig,
    params: Vec<Parameter>,
    motions: Vec<Motion>,
    first_motion: MotionId,
    sink: DirectAccumulator,
    reduced: HashMap<ReduceKey, Option<MotionId>>,
}

impl<'c> Draft<'c> {
    pub fn new(base: &'c Controller, config: &'c CompilerConfig) -> Self {
        Self {
            base,
            config,
            params: Vec::new(),
            motions: Vec::new(),
            first_motion: base.motions.next_id(),
            sink: DirectAccumulator::new(),
            reduced: HashMap::new(),
        }
    }

    pub fn base(&self) -> &'c Controller {
        self.base
    }

    pub fn config(&self) -> &'c CompilerConfig {
        self.config
    }

    /// Start building blend-algebra expressions into this draft.
    pub fn algebra(&mut self) -> BlendAlgebra<'_, 'c> {
        BlendAlgebra::new(self)
    }

    // --- Parameters ------------------------------------------------------

    /// Look up a parameter, staged ones first.
    pub fn param(&self, name: &str) -> Option<&Parameter> {
        self.params
            .iter()
            .find(|p| p.name == name)
            .or_else(|| self.base.parameter(name))
    }

    pub fn default_of(&self, name: &str) -> CompileResult<f32> {
        self.param(name)
            .map(|p| p.default)
            .ok_or_else(|| CompileError::invariant(format!("Unknown parameter '{name}'")))
    }

    /// Register a fresh float parameter named after `stem`. The returned name
    /// is prefixed and unique across the controller and this draft.
    pub fn register_param(&mut self, stem: &str, default: f32) -> String {
        let prefix = &self.config.param_prefix;
        let mut name = format!("{prefix}{stem}");
        let mut n = 1;
        while self.param(&name).is_some() {
            name = format!("{prefix}{stem}_{n}");
            n += 1;
        }
        trace!("staging parameter '{name}' = {default}");
        self.params.push(Parameter::float(name.clone(), default));
        name
    }

    /// The shared always-one weight parameter, staged on first use.
    pub fn one(&mut self) -> CompileResult<String> {
        let name = self.config.one_parameter();
        match self.param(&name) {
            Some(p) if p.kind == ParamKind::Float && p.default == 1.0 => Ok(name),
            Some(_) => Err(CompileError::invariant(format!(
                "Parameter '{name}' exists but is not a constant one"
            ))),
            None => {
                self.params.push(Parameter::float(name.clone(), 1.0));
                Ok(name)
            }
        }
    }

    // --- Motions ---------------------------------------------------------

    /// Stage a motion. Its id is final: patches commit motions in order.
    pub fn add_motion(&mut self, motion: Motion) -> MotionId {
        let id = MotionId(self.first_motion.0 + self.motions.len() as u32);
        self.motions.push(motion);
        id
    }

    /// Look up a motion, committed or staged.
    pub fn motion(&self, id: MotionId) -> Option<&Motion> {
        if id.0 < self.first_motion.0 {
            self.base.motion(id)
        } else {
            self.motions.get((id.0 - self.first_motion.0) as usize)
        }
    }

    pub fn staged_motion_count(&self) -> usize {
        self.motions.len()
    }

    // --- Accumulator -----------------------------------------------------

    /// Add `motion` to the shared Direct tree, weighted by `weight`.
    pub fn accumulate(&mut self, weight: &str, motion: MotionId) {
        self.sink.add(weight, motion);
    }

    pub fn accumulated(&self) -> &DirectAccumulator {
        &self.sink
    }

    // --- Reduction memo --------------------------------------------------

    pub(crate) fn recall(&self, key: &ReduceKey) -> Option<Option<MotionId>> {
        self.reduced.get(key).copied()
    }

    pub(crate) fn remember(&mut self, key: ReduceKey, result: Option<MotionId>) {
        self.reduced.insert(key, result);
    }

    /// Freeze the draft. `remove` names the layer the patch replaces.
    pub fn finish(self, remove: Option<LayerId>) -> Patch {
        Patch {
            params: self.params,
            motions: self.motions,
            first_motion: self.first_motion,
            sink: self.sink,
            remove,
            reduced: self.reduced,
        }
    }
}

/// A layer's staged rewrite, ready to commit.
#[derive(Debug)]
pub struct Patch {
    params: Vec<Parameter>,
    motions: Vec<Motion>,
    first_motion: MotionId,
    sink: DirectAccumulator,
    remove: Option<LayerId>,
    reduced: HashMap<ReduceKey, Option<MotionId>>,
}

impl Patch {
    pub fn removes(&self) -> Option<LayerId> {
        self.remove
    }

    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    /// Commit onto `controller`.
    pub fn commit(
        self,
        controller: &mut Controller,
        config: &CompilerConfig,
        provenance: &mut Provenance,
    ) -> CompileResult<()> {
        self.apply(controller, config, provenance).map(|_| ())
    }

    /// Commit onto `controller`. Returns the reductions memoised while the
    /// draft was built, now valid against the committed arena.
    pub(crate) fn apply(
        self,
        controller: &mut Controller,
        config: &CompilerConfig,
        provenance: &mut Provenance,
    ) -> CompileResult<HashMap<ReduceKey, Option<MotionId>>> {
        if controller.motions.next_id() != self.first_motion {
            return Err(CompileError::invariant(
                "controller motions changed while a layer was being compiled",
            ));
        }
        for param in self.params {
            controller.add_parameter(param)?;
        }
        for motion in self.motions {
            let id = controller.add_motion(motion);
            provenance.mark_motion(id, Origin::GeneratedThisPass);
        }
        if let Some(layer) = self.remove {
            controller.remove_layer(layer)?;
        }
        self.sink.commit(controller, config, provenance)?;
        Ok(self.reduced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rigcomp_controller_core::Clip;

    #[test]
    fn staged_ids_follow_the_arena() {
        let config = CompilerConfig::default();
        let mut controller = Controller::new("rig");
        controller.add_motion(Motion::Clip(Clip::new("existing")));
        let mut draft = Draft::new(&controller, &config);
        let a = draft.add_motion(Motion::Clip(Clip::new("a")));
        assert_eq!(a, MotionId(1));
        assert_eq!(draft.motion(a).map(|m| m.name()), Some("a"));
        assert_eq!(draft.motion(MotionId(0)).map(|m| m.name()), Some("existing"));

        let patch = draft.finish(None);
        let mut prov = Provenance::new();
        patch.apply(&mut controller, &config, &mut prov).unwrap();
        assert_eq!(controller.motion(a).map(|m| m.name()), Some("a"));
        assert!(prov.is_generated_motion(a));
        assert!(!prov.is_generated_motion(MotionId(0)));
    }

    #[test]
    fn registered_names_are_unique() {
        let config = CompilerConfig::default();
        let mut controller = Controller::new("rig");
        controller
            .add_parameter(Parameter::float("RC/Foo", 0.0))
            .unwrap();
        let mut draft = Draft::new(&controller, &config);
        assert_eq!(draft.register_param("Foo", 1.0), "RC/Foo_1");
        assert_eq!(draft.register_param("Foo", 2.0), "RC/Foo_2");
        assert_eq!(draft.default_of("RC/Foo_2").unwrap(), 2.0);
    }

    #[test]
    fn one_is_staged_once_and_checked() {
        let config = CompilerConfig::default();
        let controller = Controller::new("rig");
        let mut draft = Draft::new(&controller, &config);
        assert_eq!(draft.one().unwrap(), "RC/One");
        draft.one().unwrap();
        assert_eq!(draft.finish(None).param_count(), 1);

        let mut controller = Controller::new("rig");
        controller
            .add_parameter(Parameter::float("RC/One", 0.0))
            .unwrap();
        let mut draft = Draft::new(&controller, &config);
        assert!(!draft.one().unwrap_err().is_recoverable());
    }

    #[test]
    fn dropped_draft_leaves_controller_alone() {
        let config = CompilerConfig::default();
        let controller = Controller::new("rig");
        {
            let mut draft = Draft::new(&controller, &config);
            draft.register_param("Foo", 1.0);
            draft.add_motion(Motion::Clip(Clip::new("a")));
        }
        assert!(controller.parameters.is_empty());
        assert!(controller.motions.is_empty());
    }
}
