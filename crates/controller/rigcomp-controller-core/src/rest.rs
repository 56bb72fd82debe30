//! Rest-pose evaluation of a controller.
//!
//! A step reads one parameter snapshot, resolves each layer's resting state,
//! samples its motion at rest and composes layers in priority order. Curves
//! that drive animator parameters feed the next snapshot, so anything derived
//! from a driven parameter lags by one step per hop. Inputs are pinned: curves
//! never overwrite them.
//!
//! Resting playback:
//! - clips sample at their end for positive speed, their start otherwise, or at
//!   `time_parameter * length` when scrubbed (measured from the end when the
//!   speed is negative);
//! - 1-D trees interpolate between the two neighbouring thresholds, clamped;
//! - Direct trees weight each child verbatim by its parameter;
//! - 2-D trees pick the nearest child.

use hashbrown::HashMap;

use crate::accumulate::Accumulator;
use crate::binding::Binding;
use crate::controller::Controller;
use crate::error::ControllerError;
use crate::ids::{MotionId, StateId};
use crate::layer::{BlendMode, Layer, TransitionSource, TransitionTarget};
use crate::motion::{BlendKind, BlendTree, Motion};

/// Deepest blend-tree nesting followed before giving up.
const MAX_TREE_DEPTH: usize = 64;

pub type ParamValues = HashMap<String, f32>;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RestPose {
    pub properties: HashMap<Binding, f32>,
    pub parameters: ParamValues,
}

impl RestPose {
    pub fn property(&self, path: &str, property: &str) -> Option<f32> {
        self.properties
            .get(&Binding::property(path, property))
            .copied()
    }

    pub fn parameter(&self, name: &str) -> Option<f32> {
        self.parameters.get(name).copied()
    }
}

#[derive(Clone, Copy, Debug)]
struct Playback {
    speed: f32,
    normalized: Option<f32>,
}

pub struct RestEvaluator<'a> {
    controller: &'a Controller,
    inputs: ParamValues,
    property_defaults: HashMap<Binding, f32>,
}

impl<'a> RestEvaluator<'a> {
    pub fn new(controller: &'a Controller) -> Self {
        Self {
            controller,
            inputs: HashMap::new(),
            property_defaults: HashMap::new(),
        }
    }

    /// Pin a parameter to `value` for every step.
    pub fn with_input(mut self, name: impl Into<String>, value: f32) -> Self {
        self.inputs.insert(name.into(), value);
        self
    }

    /// Value a property shows when no layer writes it.
    pub fn with_property_default(mut self, binding: Binding, value: f32) -> Self {
        self.property_defaults.insert(binding, value);
        self
    }

    /// Parameter defaults with pinned inputs applied.
    pub fn initial_parameters(&self) -> ParamValues {
        let mut params: ParamValues = self
            .controller
            .parameters
            .iter()
            .map(|p| (p.name.clone(), p.default))
            .collect();
        params.extend(self.inputs.iter().map(|(k, v)| (k.clone(), *v)));
        params
    }

    /// Run `steps` steps from the initial snapshot, then report the pose the
    /// next step shows. `evaluate(0)` is the very first frame.
    pub fn evaluate(&self, steps: usize) -> Result<RestPose, ControllerError> {
        let mut params = self.initial_parameters();
        for _ in 0..steps {
            params = self.step(&params)?.1;
        }
        let (properties, _) = self.step(&params)?;
        Ok(RestPose {
            properties,
            parameters: params,
        })
    }

    /// Step until the parameter snapshot stops changing (or `max_steps`).
    pub fn settle(&self, max_steps: usize) -> Result<RestPose, ControllerError> {
        let mut params = self.initial_parameters();
        for _ in 0..max_steps {
            let next = self.step(&params)?.1;
            if next == params {
                break;
            }
            params = next;
        }
        let (properties, _) = self.step(&params)?;
        Ok(RestPose {
            properties,
            parameters: params,
        })
    }

    /// One evaluation step: property outputs for `params` and the next snapshot.
    pub fn step(
        &self,
        params: &ParamValues,
    ) -> Result<(HashMap<Binding, f32>, ParamValues), ControllerError> {
        let mut pose: HashMap<Binding, f32> = self.property_defaults.clone();

        for layer in &self.controller.layers {
            let Some(state) = self
                .rest_state(layer, params)
                .and_then(|id| layer.state(id))
            else {
                continue;
            };
            let Some(motion) = state.motion else {
                continue;
            };
            let playback = Playback {
                speed: state.speed,
                normalized: state
                    .time_parameter
                    .as_ref()
                    .map(|p| value_of(params, p)),
            };
            let mut acc = Accumulator::new();
            self.sample_motion(motion, playback, 1.0, params, &mut acc, 0)?;

            for (binding, value) in acc.finalize() {
                let prev = match pose.get(&binding) {
                    Some(v) => *v,
                    None => binding
                        .parameter_name()
                        .map(|name| value_of(params, name))
                        .unwrap_or(0.0),
                };
                let out = match layer.blend_mode {
                    BlendMode::Override => prev + (value - prev) * layer.weight,
                    BlendMode::Additive => prev + value * layer.weight,
                };
                pose.insert(binding, out);
            }
        }

        let mut next = params.clone();
        let mut properties = HashMap::new();
        for (binding, value) in pose {
            match binding {
                Binding::Parameter { name } => {
                    if !self.inputs.contains_key(&name) {
                        next.insert(name, value);
                    }
                }
                property => {
                    properties.insert(property, value);
                }
            }
        }
        Ok((properties, next))
    }

    /// Resolve the state a layer settles in for the given parameters: enter
    /// through Entry (or the default state), then follow instant transitions
    /// while their conditions hold. Bounded by the state count.
    pub fn rest_state(&self, layer: &Layer, params: &ParamValues) -> Option<StateId> {
        let mut current = enter(layer, params)?;
        for _ in 0..=layer.states.len() {
            let next = layer.transitions.iter().find(|t| {
                let from_here = match t.from {
                    TransitionSource::State(s) => s == current,
                    TransitionSource::Any => true,
                    TransitionSource::Entry => false,
                };
                from_here
                    && t.target_state() != Some(current)
                    && t
                        .conditions
                        .iter()
                        .all(|c| c.holds(value_of(params, &c.parameter)))
            });
            match next.map(|t| t.to) {
                None => break,
                Some(TransitionTarget::State(s)) => current = s,
                Some(TransitionTarget::Exit) => current = enter(layer, params)?,
            }
        }
        Some(current)
    }

    fn sample_motion(
        &self,
        id: MotionId,
        playback: Playback,
        weight: f32,
        params: &ParamValues,
        acc: &mut Accumulator,
        depth: usize,
    ) -> Result<(), ControllerError> {
        if depth > MAX_TREE_DEPTH {
            return Err(ControllerError::MotionCycle(id));
        }
        let motion = self
            .controller
            .motion(id)
            .ok_or(ControllerError::DanglingMotion(id))?;
        match motion {
            Motion::Clip(clip) => {
                let length = clip.length();
                let t = match playback.normalized {
                    Some(n) if playback.speed < 0.0 => (1.0 - n.clamp(0.0, 1.0)) * length,
                    Some(n) => n.clamp(0.0, 1.0) * length,
                    None if playback.speed > 0.0 => length,
                    None => 0.0,
                };
                for curve in &clip.curves {
                    acc.add(&curve.binding, curve.sample(t), weight);
                }
            }
            Motion::BlendTree(tree) => {
                let weights = child_weights(tree, params);
                for (child, w) in tree.children.iter().zip(weights) {
                    if w == 0.0 {
                        continue;
                    }
                    if let Some(m) = child.motion {
                        let scaled = Playback {
                            speed: playback.speed * child.time_scale,
                            normalized: playback.normalized,
                        };
                        self.sample_motion(m, scaled, weight * w, params, acc, depth + 1)?;
                    }
                }
            }
        }
        Ok(())
    }
}

fn value_of(params: &ParamValues, name: &str) -> f32 {
    params.get(name).copied().unwrap_or(0.0)
}

fn enter(layer: &Layer, params: &ParamValues) -> Option<StateId> {
    layer
        .transitions
        .iter()
        .filter(|t| t.from == TransitionSource::Entry)
        .find(|t| {
            t.conditions
                .iter()
                .all(|c| c.holds(value_of(params, &c.parameter)))
        })
        .and_then(|t| t.target_state())
        .or(layer.default_state)
}

/// Per-child weights, aligned with `tree.children`.
fn child_weights(tree: &BlendTree, params: &ParamValues) -> Vec<f32> {
    let n = tree.children.len();
    let mut weights = vec![0.0; n];
    if n == 0 {
        return weights;
    }
    match &tree.kind {
        BlendKind::Direct => {
            for (w, child) in weights.iter_mut().zip(&tree.children) {
                *w = child
                    .direct_parameter
                    .as_ref()
                    .map(|p| value_of(params, p))
                    .unwrap_or(0.0);
            }
        }
        BlendKind::Simple1D { parameter } => {
            let x = value_of(params, parameter);
            let mut order: Vec<usize> = (0..n).collect();
            order.sort_by(|a, b| {
                tree.children[*a]
                    .threshold
                    .total_cmp(&tree.children[*b].threshold)
            });
            let first = order[0];
            let last = order[n - 1];
            if x <= tree.children[first].threshold {
                weights[first] = 1.0;
            } else if x >= tree.children[last].threshold {
                weights[last] = 1.0;
            } else {
                for pair in order.windows(2) {
                    let (a, b) = (pair[0], pair[1]);
                    let lo = tree.children[a].threshold;
                    let hi = tree.children[b].threshold;
                    if lo < hi && x >= lo && x <= hi {
                        let t = (x - lo) / (hi - lo);
                        weights[a] = 1.0 - t;
                        weights[b] = t;
                        break;
                    }
                }
            }
        }
        BlendKind::FreeformCartesian2D { x, y } => {
            let p = [value_of(params, x), value_of(params, y)];
            let nearest = tree
                .children
                .iter()
                .enumerate()
                .map(|(i, c)| {
                    let dx = c.position[0] - p[0];
                    let dy = c.position[1] - p[1];
                    (i, dx * dx + dy * dy)
                })
                .min_by(|a, b| a.1.total_cmp(&b.1))
                .map(|(i, _)| i);
            if let Some(i) = nearest {
                weights[i] = 1.0;
            }
        }
    }
    weights
}
