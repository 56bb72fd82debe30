//! Layers: discrete state machines of motions connected by conditional transitions.

use serde::{Deserialize, Serialize};

use crate::ids::{LayerId, MotionId, StateId};

fn default_one() -> f32 {
    1.0
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionMode {
    If,
    IfNot,
    Greater,
    Less,
    Equals,
    NotEqual,
}

/// A single comparison gating a transition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub parameter: String,
    pub mode: ConditionMode,
    #[serde(default)]
    pub threshold: f32,
}

impl Condition {
    pub fn new(parameter: impl Into<String>, mode: ConditionMode, threshold: f32) -> Self {
        Self {
            parameter: parameter.into(),
            mode,
            threshold,
        }
    }

    pub fn is_true(parameter: impl Into<String>) -> Self {
        Self::new(parameter, ConditionMode::If, 0.0)
    }

    pub fn is_false(parameter: impl Into<String>) -> Self {
        Self::new(parameter, ConditionMode::IfNot, 0.0)
    }

    pub fn greater(parameter: impl Into<String>, threshold: f32) -> Self {
        Self::new(parameter, ConditionMode::Greater, threshold)
    }

    pub fn less(parameter: impl Into<String>, threshold: f32) -> Self {
        Self::new(parameter, ConditionMode::Less, threshold)
    }

    pub fn equals(parameter: impl Into<String>, threshold: f32) -> Self {
        Self::new(parameter, ConditionMode::Equals, threshold)
    }

    pub fn not_equal(parameter: impl Into<String>, threshold: f32) -> Self {
        Self::new(parameter, ConditionMode::NotEqual, threshold)
    }

    /// Evaluate against the parameter's current value.
    pub fn holds(&self, value: f32) -> bool {
        match self.mode {
            ConditionMode::If => value != 0.0,
            ConditionMode::IfNot => value == 0.0,
            ConditionMode::Greater => value > self.threshold,
            ConditionMode::Less => value < self.threshold,
            ConditionMode::Equals => value == self.threshold,
            ConditionMode::NotEqual => value != self.threshold,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "state", rename_all = "snake_case")]
pub enum TransitionSource {
    Entry,
    Any,
    State(StateId),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "state", rename_all = "snake_case")]
pub enum TransitionTarget {
    State(StateId),
    Exit,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub from: TransitionSource,
    pub to: TransitionTarget,
    /// Conjunction: every condition must hold.
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub has_exit_time: bool,
    #[serde(default)]
    pub exit_time: f32,
    /// Crossfade duration in seconds.
    #[serde(default)]
    pub duration: f32,
}

impl Transition {
    /// An instant transition without exit time.
    pub fn instant(from: TransitionSource, to: TransitionTarget, conditions: Vec<Condition>) -> Self {
        Self {
            from,
            to,
            conditions,
            has_exit_time: false,
            exit_time: 0.0,
            duration: 0.0,
        }
    }

    pub fn between(from: StateId, to: StateId, conditions: Vec<Condition>) -> Self {
        Self::instant(
            TransitionSource::State(from),
            TransitionTarget::State(to),
            conditions,
        )
    }

    pub fn target_state(&self) -> Option<StateId> {
        match self.to {
            TransitionTarget::State(id) => Some(id),
            TransitionTarget::Exit => None,
        }
    }

    pub fn source_state(&self) -> Option<StateId> {
        match self.from {
            TransitionSource::State(id) => Some(id),
            _ => None,
        }
    }
}

/// Side-effect directives attached to layers or states.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Behaviour {
    /// Fades another layer's weight at runtime.
    LayerControl { target: LayerId, goal_weight: f32 },
    /// Writes a parameter when the state is entered.
    ParameterDriver { parameter: String, value: f32 },
    /// Anything the compiler does not model.
    Other { kind: String },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub id: StateId,
    pub name: String,
    #[serde(default)]
    pub motion: Option<MotionId>,
    #[serde(default = "default_one")]
    pub speed: f32,
    /// Parameter scrubbing the motion's normalized time.
    #[serde(default)]
    pub time_parameter: Option<String>,
    #[serde(default)]
    pub mirror_parameter: Option<String>,
    #[serde(default)]
    pub behaviours: Vec<Behaviour>,
}

impl State {
    pub fn new(id: StateId, name: impl Into<String>, motion: Option<MotionId>) -> Self {
        Self {
            id,
            name: name.into(),
            motion,
            speed: 1.0,
            time_parameter: None,
            mirror_parameter: None,
            behaviours: Vec::new(),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendMode {
    Override,
    Additive,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub id: LayerId,
    pub name: String,
    #[serde(default = "default_one")]
    pub weight: f32,
    #[serde(default = "default_blend_mode")]
    pub blend_mode: BlendMode,
    /// Body-part mask asset name.
    #[serde(default)]
    pub mask: Option<String>,
    #[serde(default)]
    pub default_state: Option<StateId>,
    #[serde(default)]
    pub states: Vec<State>,
    #[serde(default)]
    pub transitions: Vec<Transition>,
    /// Names of nested state machines. Their contents are not modelled.
    #[serde(default)]
    pub sub_machines: Vec<String>,
    #[serde(default)]
    pub behaviours: Vec<Behaviour>,
    /// Set by the host when something outside the controller drives this layer's weight.
    #[serde(default)]
    pub externally_controlled: bool,
}

fn default_blend_mode() -> BlendMode {
    BlendMode::Override
}

impl Layer {
    pub fn new(id: LayerId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            weight: 1.0,
            blend_mode: BlendMode::Override,
            mask: None,
            default_state: None,
            states: Vec::new(),
            transitions: Vec::new(),
            sub_machines: Vec::new(),
            behaviours: Vec::new(),
            externally_controlled: false,
        }
    }

    pub fn state(&self, id: StateId) -> Option<&State> {
        self.states.iter().find(|s| s.id == id)
    }

    pub fn state_mut(&mut self, id: StateId) -> Option<&mut State> {
        self.states.iter_mut().find(|s| s.id == id)
    }

    /// Transitions that can land in `id` from somewhere other than `id` itself.
    pub fn transitions_into(&self, id: StateId) -> impl Iterator<Item = &Transition> {
        self.transitions
            .iter()
            .filter(move |t| t.target_state() == Some(id) && t.source_state() != Some(id))
    }

    pub fn transitions_from(&self, id: StateId) -> impl Iterator<Item = &Transition> {
        self.transitions
            .iter()
            .filter(move |t| t.source_state() == Some(id))
    }

    pub fn has_inbound(&self, id: StateId) -> bool {
        self.transitions_into(id).next().is_some()
    }

    /// Every behaviour on the layer or any of its states.
    pub fn all_behaviours(&self) -> impl Iterator<Item = &Behaviour> {
        self.behaviours
            .iter()
            .chain(self.states.iter().flat_map(|s| s.behaviours.iter()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn condition_modes() {
        assert!(Condition::is_true("b").holds(1.0));
        assert!(!Condition::is_true("b").holds(0.0));
        assert!(Condition::is_false("b").holds(0.0));
        assert!(Condition::greater("f", 5.0).holds(5.5));
        assert!(!Condition::greater("f", 5.0).holds(5.0));
        assert!(Condition::less("f", 5.0).holds(4.0));
        assert!(!Condition::less("f", 5.0).holds(5.0));
        assert!(Condition::equals("i", 3.0).holds(3.0));
        assert!(Condition::not_equal("i", 3.0).holds(2.0));
    }

    #[test]
    fn transitions_into_skip_self_loops() {
        let mut layer = Layer::new(LayerId(0), "L");
        let (a, b) = (StateId(0), StateId(1));
        layer.transitions.push(Transition::between(a, a, vec![]));
        layer.transitions.push(Transition::between(b, a, vec![]));
        layer.transitions.push(Transition::instant(
            TransitionSource::Any,
            TransitionTarget::State(a),
            vec![],
        ));
        assert_eq!(layer.transitions_into(a).count(), 2);
        assert!(!layer.has_inbound(b));
    }
}
