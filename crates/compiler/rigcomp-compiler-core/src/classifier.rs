//! Layer classification: decide whether a layer is a constant or a clean
//! two-state toggle, and reject everything else with a reason.
//!
//! Rejection rules run in a fixed order and the first match wins:
//! 1. partial weight or additive blending (and body-part masks)
//! 2. weight driven at runtime
//! 3. sub-machines or state behaviours
//! 4. exit time or crossfades on any transition
//! 5. euler rotation curves on a user-authored layer
//! 6. a valid binding shared with a higher layer or the accumulator

use hashbrown::HashSet;
use log::trace;
use rigcomp_controller_core::{
    Binding, BindingOracle, Condition, ConditionMode, Layer, LayerId, LayerView, ParamKind,
    Provenance, StateId, TransitionSource, TransitionTarget,
};

use crate::algebra::next_up;
use crate::error::{CompileError, CompileResult};

/// What an accepted layer turned out to be.
#[derive(Clone, Debug, PartialEq)]
pub enum LayerShape {
    /// One reachable state, always playing.
    Constant { state: StateId },
    /// Two states; `on` plays exactly while `condition` holds.
    Toggle {
        condition: Condition,
        on: StateId,
        off: StateId,
    },
}

/// An edge between reachable states. `from: None` is an any-state transition.
struct Edge<'l> {
    from: Option<StateId>,
    to: StateId,
    conditions: &'l [Condition],
}

pub struct LayerClassifier<'a> {
    view: LayerView<'a>,
    oracle: &'a dyn BindingOracle,
    provenance: &'a Provenance,
    sink: Option<LayerId>,
}

impl<'a> LayerClassifier<'a> {
    pub fn new(
        view: LayerView<'a>,
        oracle: &'a dyn BindingOracle,
        provenance: &'a Provenance,
        sink: Option<LayerId>,
    ) -> Self {
        Self {
            view,
            oracle,
            provenance,
            sink,
        }
    }

    pub fn classify(&self, layer: &Layer) -> CompileResult<LayerShape> {
        self.check_rules(layer)?;

        let mut states = reachable_states(layer);
        let dummy = find_dummy(layer, &states);
        if let Some(dummy) = dummy {
            states.retain(|s| *s != dummy);
        }
        trace!(
            "layer '{}': {} reachable states, dummy entry {:?}",
            layer.name,
            states.len(),
            dummy
        );
        match states.as_slice() {
            [] => Err(CompileError::reject("Contains no states")),
            [state] => Ok(LayerShape::Constant { state: *state }),
            [x, y] => {
                if let Some(dummy) = dummy {
                    self.check_dummy_leaves(layer, dummy)?;
                }
                self.toggle(layer, *x, *y, dummy)
            }
            many => Err(CompileError::reject(format!(
                "Contains {} states",
                many.len()
            ))),
        }
    }

    fn check_rules(&self, layer: &Layer) -> CompileResult<()> {
        let controller = self.view.controller();

        if layer.weight != 1.0 {
            return Err(CompileError::reject(format!(
                "Layer weight is {}",
                layer.weight
            )));
        }
        if controller.is_additive(layer.id) {
            return Err(CompileError::reject("Layer is additive"));
        }
        if let Some(mask) = &layer.mask {
            return Err(CompileError::reject(format!("Layer has mask '{mask}'")));
        }

        if self.view.is_weight_controlled(layer.id) {
            return Err(CompileError::reject("Layer weight is controlled at runtime"));
        }

        if !layer.sub_machines.is_empty() {
            return Err(CompileError::reject("Contains sub-state machines"));
        }
        if layer.all_behaviours().next().is_some() {
            return Err(CompileError::reject("Contains state behaviours"));
        }

        for t in &layer.transitions {
            if t.has_exit_time {
                return Err(CompileError::reject("Transition has exit time"));
            }
            if t.duration != 0.0 {
                return Err(CompileError::reject("Transition has a non-zero duration"));
            }
        }

        if !self.provenance.is_generated_layer(layer.id) {
            for state in &layer.states {
                if let Some(motion) = state.motion {
                    if controller.motions.has_euler_rotation(motion)? {
                        return Err(CompileError::reject(format!(
                            "State '{}' animates euler rotations",
                            state.name
                        )));
                    }
                }
            }
        }

        let ours = self.view.animated_bindings(layer, self.oracle)?;
        if ours.is_empty() {
            return Ok(());
        }
        let mut higher: Vec<&Layer> = self.view.above(layer.id).collect();
        if let Some(sink) = self.sink.filter(|s| *s != layer.id) {
            if !higher.iter().any(|l| l.id == sink) {
                higher.extend(self.view.layer(sink));
            }
        }
        for other in higher {
            let theirs = self.view.animated_bindings(other, self.oracle)?;
            if let Some(shared) = first_shared(&ours, &theirs) {
                return Err(CompileError::reject(format!(
                    "Shares {} with higher layer '{}'",
                    describe(shared),
                    other.name
                )));
            }
        }
        Ok(())
    }

    /// The dummy entry state must always hand over to one of the toggle states.
    fn check_dummy_leaves(&self, layer: &Layer, dummy: StateId) -> CompileResult<()> {
        let outgoing: Vec<&[Condition]> = layer
            .transitions
            .iter()
            .filter(|t| {
                matches!(t.from, TransitionSource::Any)
                    || t.source_state() == Some(dummy)
            })
            .filter(|t| t.target_state().is_some_and(|s| s != dummy))
            .map(|t| t.conditions.as_slice())
            .collect();
        if outgoing.iter().any(|c| c.is_empty()) {
            return Ok(());
        }
        let singles: Vec<&Condition> = outgoing
            .iter()
            .filter_map(|c| match c {
                [only] => Some(only),
                _ => None,
            })
            .collect();
        for (i, a) in singles.iter().enumerate() {
            for b in &singles[i + 1..] {
                if a.parameter == b.parameter
                    && is_complement(a, b, self.kind_of(&a.parameter)?)
                {
                    return Ok(());
                }
            }
        }
        let name = layer.state(dummy).map(|s| s.name.as_str()).unwrap_or("?");
        Err(CompileError::reject(format!(
            "Entry state '{name}' can rest without a motion"
        )))
    }

    fn toggle(
        &self,
        layer: &Layer,
        x: StateId,
        y: StateId,
        dummy: Option<StateId>,
    ) -> CompileResult<LayerShape> {
        let edges = edges(layer, dummy)?;
        let into_x = single_condition_into(layer, &edges, x, y)?;
        let into_y = single_condition_into(layer, &edges, y, x)?;

        if into_x.parameter != into_y.parameter {
            return Err(CompileError::reject(format!(
                "Transitions use different parameters ('{}' and '{}')",
                into_y.parameter, into_x.parameter
            )));
        }
        let kind = self.kind_of(&into_y.parameter)?;
        if !is_complement(into_x, into_y, kind) {
            return Err(CompileError::reject(format!(
                "Conditions on '{}' are not exact opposites",
                into_y.parameter
            )));
        }

        let (condition, on, off) = if into_y.mode == ConditionMode::NotEqual {
            (into_x.clone(), x, y)
        } else {
            (into_y.clone(), y, x)
        };
        Ok(LayerShape::Toggle { condition, on, off })
    }

    fn kind_of(&self, parameter: &str) -> CompileResult<ParamKind> {
        self.view
            .parameter_kind(parameter)
            .ok_or_else(|| CompileError::invariant(format!("Unknown parameter '{parameter}'")))
    }
}

/// States reachable from the entry: the default, entry targets, any-state
/// targets and everything those lead to.
fn reachable_states(layer: &Layer) -> Vec<StateId> {
    let mut seen: HashSet<StateId> = HashSet::new();
    let mut queue: Vec<StateId> = layer.default_state.into_iter().collect();
    queue.extend(
        layer
            .transitions
            .iter()
            .filter(|t| matches!(t.from, TransitionSource::Entry | TransitionSource::Any))
            .filter_map(|t| t.target_state()),
    );
    while let Some(s) = queue.pop() {
        if !seen.insert(s) {
            continue;
        }
        queue.extend(layer.transitions_from(s).filter_map(|t| t.target_state()));
    }
    layer
        .states
        .iter()
        .map(|s| s.id)
        .filter(|id| seen.contains(id))
        .collect()
}

/// A motionless default state nothing transitions back into, in a layer of
/// exactly three reachable states.
fn find_dummy(layer: &Layer, states: &[StateId]) -> Option<StateId> {
    if states.len() != 3 {
        return None;
    }
    let candidate = layer.default_state?;
    let state = layer.state(candidate)?;
    let re_entered = layer.transitions.iter().any(|t| {
        t.from != TransitionSource::Entry
            && (t.target_state() == Some(candidate) || t.to == TransitionTarget::Exit)
    });
    (state.motion.is_none() && !re_entered).then_some(candidate)
}

/// Transitions between reachable states, with exits resolved to the state the
/// layer re-enters.
fn edges(layer: &Layer, dummy: Option<StateId>) -> CompileResult<Vec<Edge<'_>>> {
    let mut out = Vec::new();
    for t in &layer.transitions {
        let from = match t.from {
            TransitionSource::Entry => continue,
            TransitionSource::Any => None,
            TransitionSource::State(s) => Some(s),
        };
        if from.is_some() && from == dummy {
            continue;
        }
        let to = match t.to {
            TransitionTarget::State(s) => s,
            TransitionTarget::Exit => reentry(layer)?,
        };
        if from == Some(to) {
            continue;
        }
        out.push(Edge {
            from,
            to,
            conditions: &t.conditions,
        });
    }
    Ok(out)
}

fn reentry(layer: &Layer) -> CompileResult<StateId> {
    let entries: Vec<_> = layer
        .transitions
        .iter()
        .filter(|t| t.from == TransitionSource::Entry)
        .collect();
    if entries.iter().any(|t| !t.conditions.is_empty()) {
        return Err(CompileError::reject(
            "Exit transition re-enters through conditional entry",
        ));
    }
    entries
        .iter()
        .find_map(|t| t.target_state())
        .or(layer.default_state)
        .ok_or_else(|| CompileError::reject("Exit transition has nowhere to go"))
}

/// The one condition on the one transition leading from `other` (or any
/// state) into `target`.
fn single_condition_into<'l>(
    layer: &Layer,
    edges: &[Edge<'l>],
    target: StateId,
    other: StateId,
) -> CompileResult<&'l Condition> {
    let name = |id: StateId| layer.state(id).map(|s| s.name.clone()).unwrap_or_default();
    let inbound: Vec<&Edge<'l>> = edges
        .iter()
        .filter(|e| e.to == target && (e.from.is_none() || e.from == Some(other)))
        .collect();
    let edge = match inbound.as_slice() {
        [edge] => edge,
        [] => {
            return Err(CompileError::reject(format!(
                "No transition into '{}'",
                name(target)
            )))
        }
        many => {
            return Err(CompileError::reject(format!(
                "{} transitions into '{}'",
                many.len(),
                name(target)
            )))
        }
    };
    let mut unique: Vec<&'l Condition> = Vec::new();
    for c in edge.conditions {
        if !unique.contains(&c) {
            unique.push(c);
        }
    }
    match unique.as_slice() {
        [only] => Ok(*only),
        [] => Err(CompileError::reject(format!(
            "Transition into '{}' has no conditions",
            name(target)
        ))),
        many => Err(CompileError::reject(format!(
            "Transition into '{}' has {} conditions",
            name(target),
            many.len()
        ))),
    }
}

/// True when exactly one of `a` and `b` holds for every value `kind` allows.
pub fn is_complement(a: &Condition, b: &Condition, kind: ParamKind) -> bool {
    use ConditionMode::*;
    if a.parameter != b.parameter {
        return false;
    }
    match (a.mode, b.mode) {
        (If, IfNot) | (IfNot, If) => true,
        (Equals, NotEqual) | (NotEqual, Equals) => a.threshold == b.threshold,
        (Greater, Less) => split_complement(a.threshold, b.threshold, kind),
        (Less, Greater) => split_complement(b.threshold, a.threshold, kind),
        _ => false,
    }
}

/// `x > above` and `x < below` partition the values of `kind`.
fn split_complement(above: f32, below: f32, kind: ParamKind) -> bool {
    match kind {
        ParamKind::Bool => [0.0_f32, 1.0].iter().all(|v| (*v > above) != (*v < below)),
        ParamKind::Int => {
            let floor = above.floor();
            floor < below && below <= floor + 1.0
        }
        ParamKind::Float => below == next_up(above),
    }
}

fn first_shared<'b>(ours: &'b HashSet<Binding>, theirs: &HashSet<Binding>) -> Option<&'b Binding> {
    ours.iter().find(|b| theirs.contains(*b))
}

fn describe(binding: &Binding) -> String {
    match binding {
        Binding::Property { path, property } => format!("'{path}.{property}'"),
        Binding::Parameter { name } => format!("parameter '{name}'"),
    }
}
