//! Motion reduction: replace a state's motion with a non-time-evolving
//! equivalent that produces the same resting output.

use hashbrown::HashMap;
use log::trace;
use rigcomp_controller_core::{
    BindingOracle, BlendChild, BlendKind, BlendTree, Clip, Curve, Motion, MotionId, State,
};

use crate::config::CompilerConfig;
use crate::draft::Draft;
use crate::error::{CompileError, CompileResult};

/// Memo key: a reduction depends on the motion, how it is played and whether
/// its time is driven by a parameter.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct ReduceKey {
    motion: MotionId,
    speed_bits: u32,
    time_parameter: Option<String>,
}

/// Which end of a clip to freeze.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum End {
    Start,
    Finish,
}

pub struct MotionReducer<'o> {
    oracle: &'o dyn BindingOracle,
    config: CompilerConfig,
    committed: HashMap<ReduceKey, Option<MotionId>>,
}

impl<'o> MotionReducer<'o> {
    pub fn new(oracle: &'o dyn BindingOracle, config: &CompilerConfig) -> Self {
        Self {
            oracle,
            config: config.clone(),
            committed: HashMap::new(),
        }
    }

    /// Take over reductions from a committed patch.
    pub(crate) fn absorb(&mut self, reduced: HashMap<ReduceKey, Option<MotionId>>) {
        self.committed.extend(reduced);
    }

    pub fn cached(&self) -> usize {
        self.committed.len()
    }

    /// Reduce the motion a state plays, honouring its speed and time parameter.
    pub fn reduce_state(&mut self, draft: &mut Draft<'_>, state: &State) -> CompileResult<Option<MotionId>> {
        if state.mirror_parameter.is_some() {
            return Err(CompileError::reject(format!(
                "State '{}' is mirrored by a parameter",
                state.name
            )));
        }
        self.reduce(draft, state.motion, state.speed, state.time_parameter.as_deref())
    }

    /// `None` means the motion contributes no valid animated property.
    pub fn reduce(
        &mut self,
        draft: &mut Draft<'_>,
        motion: Option<MotionId>,
        speed: f32,
        time_parameter: Option<&str>,
    ) -> CompileResult<Option<MotionId>> {
        let mut stack = Vec::new();
        self.reduce_inner(draft, motion, speed, time_parameter, &mut stack)
    }

    fn reduce_inner(
        &mut self,
        draft: &mut Draft<'_>,
        motion: Option<MotionId>,
        speed: f32,
        time_parameter: Option<&str>,
        stack: &mut Vec<MotionId>,
    ) -> CompileResult<Option<MotionId>> {
        let Some(id) = motion else {
            return Ok(None);
        };
        let key = ReduceKey {
            motion: id,
            speed_bits: speed.to_bits(),
            time_parameter: time_parameter.map(str::to_string),
        };
        if let Some(hit) = self.committed.get(&key).copied().or_else(|| draft.recall(&key)) {
            return Ok(hit);
        }
        if stack.contains(&id) {
            return Err(CompileError::invariant(format!("Motion {id:?} contains itself")));
        }
        if stack.len() >= self.config.max_tree_depth {
            return Err(CompileError::invariant(format!(
                "Blend trees nest deeper than {}",
                self.config.max_tree_depth
            )));
        }
        let source = draft
            .motion(id)
            .cloned()
            .ok_or_else(|| CompileError::invariant(format!("Motion {id:?} does not exist")))?;

        let out = match source {
            Motion::Clip(clip) => self.reduce_clip(draft, id, &clip, speed, time_parameter)?,
            Motion::BlendTree(tree) => {
                stack.push(id);
                let out = self.reduce_tree(draft, id, &tree, speed, time_parameter, stack);
                stack.pop();
                out?
            }
        };
        trace!("reduced {id:?} at speed {speed} to {out:?}");
        draft.remember(key, out);
        Ok(out)
    }

    fn reduce_clip(
        &self,
        draft: &mut Draft<'_>,
        id: MotionId,
        clip: &Clip,
        speed: f32,
        time_parameter: Option<&str>,
    ) -> CompileResult<Option<MotionId>> {
        let valid: Vec<&Curve> = clip
            .curves
            .iter()
            .filter(|c| self.oracle.is_valid(&c.binding))
            .collect();
        if valid.is_empty() {
            return Ok(None);
        }
        let all_valid = valid.len() == clip.curves.len();

        if clip.is_static() {
            if all_valid && clip.is_zero_length() {
                return Ok(Some(id));
            }
            return Ok(Some(snapshot(draft, clip, &valid, End::Finish)));
        }

        if let Some(param) = time_parameter {
            // Two breakpoints only reproduce a curve that is linear over the
            // whole normalized range.
            let length = clip.length();
            for curve in valid.iter().filter(|c| !c.is_constant()) {
                match curve.keys.as_slice() {
                    [a, b] if a.time == 0.0 && b.time == length => {}
                    [a, b] => {
                        return Err(CompileError::reject(format!(
                            "Clip '{}' is scrubbed by '{param}' with keys from {} to {} of {length}",
                            clip.name, a.time, b.time
                        )));
                    }
                    _ => {
                        return Err(CompileError::reject(format!(
                            "Clip '{}' is scrubbed by '{param}' through intermediate keys",
                            clip.name
                        )));
                    }
                }
            }
            let start = snapshot(draft, clip, &valid, End::Start);
            let finish = snapshot(draft, clip, &valid, End::Finish);
            let (at_zero, at_one) = if speed < 0.0 {
                (finish, start)
            } else {
                (start, finish)
            };
            let tree = BlendTree::new(
                format!("{} (scrubbed)", clip.name),
                BlendKind::Simple1D {
                    parameter: param.to_string(),
                },
            )
            .with_child(BlendChild::at_threshold(Some(at_zero), 0.0))
            .with_child(BlendChild::at_threshold(Some(at_one), 1.0));
            return Ok(Some(draft.add_motion(Motion::BlendTree(tree))));
        }

        let frames = clip.frame_count();
        if frames > self.config.max_approx_frames {
            return Err(CompileError::reject(format!(
                "Clip '{}' is animated over {frames} frames",
                clip.name
            )));
        }
        if clip.looping {
            return Err(CompileError::reject(format!("Clip '{}' loops", clip.name)));
        }
        let tol = self.config.speed_tolerance;
        let end = if (speed - 1.0).abs() <= tol {
            End::Finish
        } else if speed.abs() <= tol || (speed + 1.0).abs() <= tol {
            End::Start
        } else {
            return Err(CompileError::reject(format!(
                "Clip '{}' plays at speed {speed}",
                clip.name
            )));
        };
        Ok(Some(snapshot(draft, clip, &valid, end)))
    }

    fn reduce_tree(
        &mut self,
        draft: &mut Draft<'_>,
        id: MotionId,
        tree: &BlendTree,
        speed: f32,
        time_parameter: Option<&str>,
        stack: &mut Vec<MotionId>,
    ) -> CompileResult<Option<MotionId>> {
        let mut children = Vec::with_capacity(tree.children.len());
        for child in &tree.children {
            if child.time_scale <= 0.0 {
                return Err(CompileError::reject(format!(
                    "Blend tree '{}' has a child with time scale {}",
                    tree.name, child.time_scale
                )));
            }
            let motion = self.reduce_inner(
                draft,
                child.motion,
                speed * child.time_scale,
                time_parameter,
                stack,
            )?;
            children.push(BlendChild {
                motion,
                time_scale: 1.0,
                ..child.clone()
            });
        }
        if children.iter().all(|c| c.motion.is_none()) {
            return Ok(None);
        }
        if children.iter().zip(&tree.children).all(|(new, old)| new == old) {
            return Ok(Some(id));
        }
        Ok(Some(draft.add_motion(Motion::BlendTree(BlendTree {
            name: format!("{} (rest)", tree.name),
            kind: tree.kind.clone(),
            children,
        }))))
    }
}

/// A zero-length clip holding each valid curve at one end.
fn snapshot(draft: &mut Draft<'_>, clip: &Clip, curves: &[&Curve], end: End) -> MotionId {
    let mut out = Clip::new(format!("{} (rest)", clip.name));
    out.frame_rate = clip.frame_rate;
    for curve in curves {
        let value = match end {
            End::Start => curve.first_value(),
            End::Finish => curve.last_value(),
        };
        out.curves.push(Curve::constant(curve.binding.clone(), value));
    }
    draft.add_motion(Motion::Clip(out))
}
