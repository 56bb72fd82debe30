//! The compile pass: classify each layer, reduce its motions and rewrite it as
//! gated children of the Direct Accumulator.

use log::{debug, info};
use rigcomp_controller_core::{
    BindingOracle, Condition, ConditionMode, Controller, LayerId, LayerView, MotionId, ParamKind,
    Provenance,
};

use crate::accumulator::DirectAccumulator;
use crate::algebra::next_down;
use crate::classifier::{LayerClassifier, LayerShape};
use crate::config::CompilerConfig;
use crate::draft::{Draft, Patch};
use crate::error::{CompileError, CompileResult};
use crate::reducer::MotionReducer;
use crate::report::CompileReport;

pub struct TreeSynthesizer<'a> {
    oracle: &'a dyn BindingOracle,
    config: CompilerConfig,
}

impl<'a> TreeSynthesizer<'a> {
    pub fn new(oracle: &'a dyn BindingOracle, config: CompilerConfig) -> Self {
        Self { oracle, config }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Visit every layer bottom-up and rewrite the ones that qualify.
    ///
    /// Rejections are recorded in the report; an invariant violation aborts
    /// the pass, leaving layers committed so far in place.
    pub fn run(
        &self,
        controller: &mut Controller,
        provenance: &mut Provenance,
    ) -> CompileResult<CompileReport> {
        let sink = DirectAccumulator::locate(controller, &self.config)?.map(|s| s.layer);
        let order: Vec<(LayerId, String)> = controller
            .layers
            .iter()
            .filter(|l| Some(l.id) != sink)
            .map(|l| (l.id, l.name.clone()))
            .collect();

        let mut reducer = MotionReducer::new(self.oracle, &self.config);
        let mut report = CompileReport::default();
        for (id, name) in order {
            match self.compile_layer(controller, id, &mut reducer, provenance) {
                Ok(patch) => {
                    let reduced = patch.apply(controller, &self.config, provenance)?;
                    reducer.absorb(reduced);
                    debug!("layer '{name}' optimized");
                    report.optimized(name);
                }
                Err(CompileError::NotOptimizable(reason)) => {
                    debug!("layer '{name}' not optimized: {reason}");
                    report.rejected(name, reason);
                }
                Err(err) => return Err(err),
            }
        }
        if !report.entries.is_empty() {
            info!("{report}");
        }
        Ok(report)
    }

    /// Stage the rewrite of one layer without touching the controller.
    pub fn compile_layer(
        &self,
        controller: &Controller,
        id: LayerId,
        reducer: &mut MotionReducer<'_>,
        provenance: &Provenance,
    ) -> CompileResult<Patch> {
        let view = LayerView::new(controller);
        let layer = view
            .layer(id)
            .ok_or_else(|| CompileError::invariant(format!("Layer {id:?} vanished")))?;
        let sink = DirectAccumulator::locate(controller, &self.config)?.map(|s| s.layer);
        let shape = LayerClassifier::new(view, self.oracle, provenance, sink).classify(layer)?;

        let state = |sid| {
            layer.state(sid).ok_or_else(|| {
                CompileError::invariant(format!("Layer '{}' lost state {sid:?}", layer.name))
            })
        };
        let mut draft = Draft::new(controller, &self.config);
        match shape {
            LayerShape::Constant { state: sid } => {
                if let Some(motion) = reducer.reduce_state(&mut draft, state(sid)?)? {
                    let one = draft.one()?;
                    draft.accumulate(&one, motion);
                }
            }
            LayerShape::Toggle { condition, on, off } => {
                let on = reducer.reduce_state(&mut draft, state(on)?)?;
                let off = reducer.reduce_state(&mut draft, state(off)?)?;
                if on.is_none() && off.is_none() {
                    return Err(CompileError::reject(
                        "Neither state animates a valid property",
                    ));
                }
                dispatch(&mut draft, &condition, on, off)?;
            }
        }
        Ok(draft.finish(Some(id)))
    }
}

/// Emit the gated pair for a toggle: `on` while `condition` holds, `off`
/// otherwise.
fn dispatch(
    draft: &mut Draft<'_>,
    condition: &Condition,
    on: Option<MotionId>,
    off: Option<MotionId>,
) -> CompileResult<()> {
    let param = condition.parameter.as_str();
    let kind = draft
        .param(param)
        .map(|p| p.kind)
        .ok_or_else(|| CompileError::invariant(format!("Unknown parameter '{param}'")))?;
    let t = condition.threshold;
    if !t.is_finite() {
        return Err(CompileError::reject(format!(
            "Condition on '{param}' has threshold {t}"
        )));
    }

    // A bool gating only one side can weight that side directly.
    if kind == ParamKind::Bool {
        let direct = match condition.mode {
            ConditionMode::If => (on, off),
            ConditionMode::IfNot => (off, on),
            _ => (None, None),
        };
        if let (Some(m), None) = direct {
            draft.accumulate(param, m);
            return Ok(());
        }
    }

    let mut alg = draft.algebra();
    let (signal, when_true, when_false) = match condition.mode {
        ConditionMode::If | ConditionMode::IfNot => {
            let truthy = if kind == ParamKind::Bool {
                alg.greater_than(param, 0.0, false)?
            } else {
                alg.not_equal(param, 0.0)?
            };
            if condition.mode == ConditionMode::If {
                (truthy, on, off)
            } else {
                (truthy, off, on)
            }
        }
        ConditionMode::Equals => (alg.equals(param, t)?, on, off),
        ConditionMode::Greater => (alg.greater_than(param, t, false)?, on, off),
        ConditionMode::Less => (alg.greater_than(param, next_down(t), false)?, off, on),
        ConditionMode::NotEqual => {
            return Err(CompileError::invariant(format!(
                "NotEqual condition on '{param}' reached dispatch"
            )))
        }
    };
    if let Some(tree) = alg.select(&signal, when_true, when_false)? {
        let one = draft.one()?;
        draft.accumulate(&one, tree);
    }
    Ok(())
}

/// Run the pass with a fresh synthesizer.
pub fn optimize_controller(
    controller: &mut Controller,
    oracle: &dyn BindingOracle,
    provenance: &mut Provenance,
    config: &CompilerConfig,
) -> CompileResult<CompileReport> {
    TreeSynthesizer::new(oracle, config.clone()).run(controller, provenance)
}
