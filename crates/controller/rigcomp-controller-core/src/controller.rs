//! The controller: parameters, layers and the motions they reference.

use serde::{Deserialize, Serialize};

use crate::error::ControllerError;
use crate::ids::{IdAllocator, LayerId, MotionId, StateId};
use crate::layer::{BlendMode, Layer, State, Transition};
use crate::motion::{BlendKind, Motion, MotionArena};
use crate::params::{ParamTable, Parameter};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Controller {
    pub name: String,
    #[serde(default)]
    pub parameters: ParamTable,
    /// Layers in priority order: later layers override earlier ones.
    #[serde(default)]
    pub layers: Vec<Layer>,
    #[serde(default)]
    pub motions: MotionArena,
    #[serde(skip)]
    ids: IdAllocator,
}

impl Controller {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Parse a controller from JSON, re-seed the id allocator and validate references.
    pub fn from_json(json: &str) -> Result<Self, ControllerError> {
        let mut controller: Controller = serde_json::from_str(json)?;
        controller.parameters.normalize_keys()?;
        let max_layer = controller.layers.iter().map(|l| l.id).max();
        let max_state = controller
            .layers
            .iter()
            .flat_map(|l| l.states.iter().map(|s| s.id))
            .max();
        controller.ids.reserve_past(max_layer, max_state);
        controller.validate()?;
        Ok(controller)
    }

    pub fn to_json(&self) -> Result<String, ControllerError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    // --- Parameters ------------------------------------------------------

    pub fn add_parameter(&mut self, param: Parameter) -> Result<(), ControllerError> {
        self.parameters.insert(param)
    }

    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.get(name)
    }

    // --- Motions ---------------------------------------------------------

    pub fn add_motion(&mut self, motion: Motion) -> MotionId {
        self.motions.add(motion)
    }

    pub fn motion(&self, id: MotionId) -> Option<&Motion> {
        self.motions.get(id)
    }

    // --- Layers ----------------------------------------------------------

    /// Append an empty override layer at the top of the stack.
    pub fn add_layer(&mut self, name: impl Into<String>) -> LayerId {
        let id = self.ids.alloc_layer();
        self.layers.push(Layer::new(id, name));
        id
    }

    pub fn layer(&self, id: LayerId) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id == id)
    }

    pub fn layer_mut(&mut self, id: LayerId) -> Option<&mut Layer> {
        self.layers.iter_mut().find(|l| l.id == id)
    }

    pub fn layer_index(&self, id: LayerId) -> Option<usize> {
        self.layers.iter().position(|l| l.id == id)
    }

    pub fn layer_by_name(&self, name: &str) -> Option<&Layer> {
        self.layers.iter().find(|l| l.name == name)
    }

    pub fn remove_layer(&mut self, id: LayerId) -> Result<Layer, ControllerError> {
        let idx = self
            .layer_index(id)
            .ok_or(ControllerError::UnknownLayer(id))?;
        Ok(self.layers.remove(idx))
    }

    /// Add a state to a layer. The first state added becomes the default.
    pub fn add_state(
        &mut self,
        layer: LayerId,
        name: impl Into<String>,
        motion: Option<MotionId>,
    ) -> Result<StateId, ControllerError> {
        let id = self.ids.alloc_state();
        let layer = self
            .layer_mut(layer)
            .ok_or(ControllerError::UnknownLayer(layer))?;
        layer.states.push(State::new(id, name, motion));
        if layer.default_state.is_none() {
            layer.default_state = Some(id);
        }
        Ok(id)
    }

    pub fn add_transition(
        &mut self,
        layer: LayerId,
        transition: Transition,
    ) -> Result<(), ControllerError> {
        self.layer_mut(layer)
            .ok_or(ControllerError::UnknownLayer(layer))?
            .transitions
            .push(transition);
        Ok(())
    }

    // --- Validation ------------------------------------------------------

    /// Check that every motion, state and parameter reference resolves and that
    /// no blend tree reaches itself.
    pub fn validate(&self) -> Result<(), ControllerError> {
        for (id, motion) in self.motions.iter() {
            if let Motion::BlendTree(tree) = motion {
                match &tree.kind {
                    BlendKind::Simple1D { parameter } => self.require_parameter(parameter)?,
                    BlendKind::FreeformCartesian2D { x, y } => {
                        self.require_parameter(x)?;
                        self.require_parameter(y)?;
                    }
                    BlendKind::Direct => {}
                }
                for child in &tree.children {
                    if let Some(m) = child.motion {
                        if self.motions.get(m).is_none() {
                            return Err(ControllerError::DanglingMotion(m));
                        }
                    }
                    if let Some(p) = &child.direct_parameter {
                        self.require_parameter(p)?;
                    }
                }
                self.motions.walk(id, &mut |_, _| {})?;
            }
        }

        for layer in &self.layers {
            let dangling = |state: StateId| ControllerError::DanglingState {
                layer: layer.name.clone(),
                state,
            };
            if let Some(default) = layer.default_state {
                layer.state(default).ok_or_else(|| dangling(default))?;
            }
            for state in &layer.states {
                if let Some(m) = state.motion {
                    if self.motions.get(m).is_none() {
                        return Err(ControllerError::DanglingMotion(m));
                    }
                }
                if let Some(p) = &state.time_parameter {
                    self.require_parameter(p)?;
                }
            }
            for t in &layer.transitions {
                for id in t.source_state().into_iter().chain(t.target_state()) {
                    layer.state(id).ok_or_else(|| dangling(id))?;
                }
                for c in &t.conditions {
                    self.require_parameter(&c.parameter)?;
                }
            }
        }
        Ok(())
    }

    fn require_parameter(&self, name: &str) -> Result<(), ControllerError> {
        if self.parameters.contains(name) {
            Ok(())
        } else {
            Err(ControllerError::UnknownParameter(name.to_string()))
        }
    }

    /// Convenience for hosts that need to know whether a layer blends additively.
    pub fn is_additive(&self, id: LayerId) -> bool {
        self.layer(id)
            .map(|l| l.blend_mode == BlendMode::Additive)
            .unwrap_or(false)
    }
}
