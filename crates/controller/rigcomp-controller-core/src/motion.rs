//! Motions: keyframed clips and blend trees, stored in an arena.
//!
//! Motions are addressed by [`MotionId`]. Several states (or several blend-tree
//! children) may point at the same motion, so identity is the handle, never the
//! value.

use hashbrown::HashSet;
use serde::{Deserialize, Serialize};

use crate::binding::Binding;
use crate::error::ControllerError;
use crate::ids::MotionId;
use crate::sampling::sample_curve;

fn default_frame_rate() -> f32 {
    60.0
}

fn default_time_scale() -> f32 {
    1.0
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Key {
    /// Seconds from the start of the clip.
    pub time: f32,
    pub value: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Curve {
    pub binding: Binding,
    pub keys: Vec<Key>,
}

impl Curve {
    /// A single-key curve holding `value`.
    pub fn constant(binding: Binding, value: f32) -> Self {
        Self {
            binding,
            keys: vec![Key { time: 0.0, value }],
        }
    }

    pub fn first_value(&self) -> f32 {
        self.keys.first().map(|k| k.value).unwrap_or(0.0)
    }

    pub fn last_value(&self) -> f32 {
        self.keys.last().map(|k| k.value).unwrap_or(0.0)
    }

    /// True when every key holds the same value.
    pub fn is_constant(&self) -> bool {
        let first = self.first_value();
        self.keys.iter().all(|k| k.value == first)
    }

    pub fn end_time(&self) -> f32 {
        self.keys.last().map(|k| k.time).unwrap_or(0.0)
    }

    pub fn sample(&self, t: f32) -> f32 {
        sample_curve(self, t)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Clip {
    pub name: String,
    #[serde(default = "default_frame_rate")]
    pub frame_rate: f32,
    #[serde(default)]
    pub looping: bool,
    #[serde(default)]
    pub curves: Vec<Curve>,
}

impl Clip {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            frame_rate: default_frame_rate(),
            looping: false,
            curves: Vec::new(),
        }
    }

    pub fn with_curve(mut self, curve: Curve) -> Self {
        self.curves.push(curve);
        self
    }

    /// Clip length in seconds (time of the latest key across all curves).
    pub fn length(&self) -> f32 {
        self.curves
            .iter()
            .map(Curve::end_time)
            .fold(0.0_f32, f32::max)
    }

    /// Clip length in frames at the clip's frame rate.
    pub fn frame_count(&self) -> f32 {
        self.length() * self.frame_rate
    }

    /// Every curve holds a single value for the whole clip.
    pub fn is_static(&self) -> bool {
        self.curves.iter().all(Curve::is_constant)
    }

    /// Every curve already has exactly one key.
    pub fn is_zero_length(&self) -> bool {
        self.curves.iter().all(|c| c.keys.len() == 1)
    }

    pub fn has_euler_rotation(&self) -> bool {
        self.curves.iter().any(|c| c.binding.is_euler_rotation())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlendKind {
    /// Children placed on a line by `threshold`, weighted by one parameter.
    Simple1D { parameter: String },
    /// Children placed on a plane by `position`, weighted by two parameters.
    FreeformCartesian2D { x: String, y: String },
    /// Each child is weighted verbatim by its own `direct_parameter`.
    Direct,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlendChild {
    pub motion: Option<MotionId>,
    #[serde(default)]
    pub threshold: f32,
    #[serde(default)]
    pub position: [f32; 2],
    #[serde(default)]
    pub direct_parameter: Option<String>,
    #[serde(default = "default_time_scale")]
    pub time_scale: f32,
}

impl BlendChild {
    pub fn at_threshold(motion: Option<MotionId>, threshold: f32) -> Self {
        Self {
            motion,
            threshold,
            position: [0.0, 0.0],
            direct_parameter: None,
            time_scale: 1.0,
        }
    }

    pub fn direct(motion: Option<MotionId>, parameter: impl Into<String>) -> Self {
        Self {
            motion,
            threshold: 0.0,
            position: [0.0, 0.0],
            direct_parameter: Some(parameter.into()),
            time_scale: 1.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlendTree {
    pub name: String,
    pub kind: BlendKind,
    #[serde(default)]
    pub children: Vec<BlendChild>,
}

impl BlendTree {
    pub fn new(name: impl Into<String>, kind: BlendKind) -> Self {
        Self {
            name: name.into(),
            kind,
            children: Vec::new(),
        }
    }

    pub fn with_child(mut self, child: BlendChild) -> Self {
        self.children.push(child);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Motion {
    Clip(Clip),
    BlendTree(BlendTree),
}

impl Motion {
    pub fn name(&self) -> &str {
        match self {
            Motion::Clip(c) => &c.name,
            Motion::BlendTree(t) => &t.name,
        }
    }
}

/// Owner of every motion in a controller.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MotionArena {
    motions: Vec<Motion>,
}

impl MotionArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, motion: Motion) -> MotionId {
        let id = self.next_id();
        self.motions.push(motion);
        id
    }

    pub fn get(&self, id: MotionId) -> Option<&Motion> {
        self.motions.get(id.0 as usize)
    }

    pub fn get_mut(&mut self, id: MotionId) -> Option<&mut Motion> {
        self.motions.get_mut(id.0 as usize)
    }

    /// Id the next call to [`MotionArena::add`] will return.
    pub fn next_id(&self) -> MotionId {
        MotionId(self.motions.len() as u32)
    }

    pub fn len(&self) -> usize {
        self.motions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.motions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (MotionId, &Motion)> {
        self.motions
            .iter()
            .enumerate()
            .map(|(i, m)| (MotionId(i as u32), m))
    }

    /// Depth-first walk over `root` and every motion reachable through blend
    /// trees. Each motion is visited once, however many trees share it. A
    /// motion that reaches itself is reported as [`ControllerError::MotionCycle`].
    pub fn walk<F>(&self, root: MotionId, visit: &mut F) -> Result<(), ControllerError>
    where
        F: FnMut(MotionId, &Motion),
    {
        let mut stack = Vec::new();
        let mut seen = HashSet::new();
        self.walk_inner(root, visit, &mut stack, &mut seen)
    }

    fn walk_inner<F>(
        &self,
        id: MotionId,
        visit: &mut F,
        stack: &mut Vec<MotionId>,
        seen: &mut HashSet<MotionId>,
    ) -> Result<(), ControllerError>
    where
        F: FnMut(MotionId, &Motion),
    {
        if stack.contains(&id) {
            return Err(ControllerError::MotionCycle(id));
        }
        // finished subtrees hold no cycle through the current path
        if !seen.insert(id) {
            return Ok(());
        }
        let motion = self.get(id).ok_or(ControllerError::DanglingMotion(id))?;
        visit(id, motion);
        if let Motion::BlendTree(tree) = motion {
            stack.push(id);
            for child in &tree.children {
                if let Some(child_id) = child.motion {
                    self.walk_inner(child_id, visit, stack, seen)?;
                }
            }
            stack.pop();
        }
        Ok(())
    }

    /// Every binding written by clips reachable from `root`.
    pub fn bindings(&self, root: MotionId) -> Result<HashSet<Binding>, ControllerError> {
        let mut out = HashSet::new();
        self.walk(root, &mut |_, motion| {
            if let Motion::Clip(clip) = motion {
                out.extend(clip.curves.iter().map(|c| c.binding.clone()));
            }
        })?;
        Ok(out)
    }

    pub fn has_euler_rotation(&self, root: MotionId) -> Result<bool, ControllerError> {
        let mut found = false;
        self.walk(root, &mut |_, motion| {
            if let Motion::Clip(clip) = motion {
                found |= clip.has_euler_rotation();
            }
        })?;
        Ok(found)
    }
}
