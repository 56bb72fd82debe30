//! Blend algebra: boolean and arithmetic operations on animator parameters,
//! realised as blend trees feeding the Direct Accumulator.
//!
//! A [`BoolSignal`] is usually kept as a step function over one raw parameter
//! and turned into a zero-lag 1-D tree when gated. It is only materialised into
//! a driven 0/1 parameter when it must combine with a signal over a different
//! input. Every derived parameter is written on every evaluation and its
//! default equals the expression evaluated at the input defaults.

use rigcomp_controller_core::{
    BlendChild, BlendKind, BlendTree, Binding, Clip, Curve, Motion, MotionId,
};

use crate::draft::Draft;
use crate::error::{CompileError, CompileResult};

/// Smallest float strictly greater than `x`.
pub fn next_up(x: f32) -> f32 {
    if x.is_nan() || x == f32::INFINITY {
        return x;
    }
    if x == 0.0 {
        return f32::from_bits(1);
    }
    let bits = x.to_bits();
    if x > 0.0 {
        f32::from_bits(bits + 1)
    } else {
        f32::from_bits(bits - 1)
    }
}

/// Largest float strictly less than `x`.
pub fn next_down(x: f32) -> f32 {
    -next_up(-x)
}

#[derive(Clone, Debug, PartialEq)]
enum Source {
    Constant(bool),
    /// Step function over `input`: sorted breakpoints, clamped at both ends.
    /// Neighbouring breakpoints with different values are adjacent floats.
    Steps {
        input: String,
        points: Vec<(f32, bool)>,
    },
    /// A parameter that always holds exactly 0 or 1.
    Param(String),
}

/// A boolean value derived from animator parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct BoolSignal {
    label: String,
    default: bool,
    source: Source,
}

impl BoolSignal {
    pub fn always(value: bool) -> Self {
        Self {
            label: value.to_string(),
            default: value,
            source: Source::Constant(value),
        }
    }

    /// Wrap a parameter already known to hold 0 or 1.
    pub fn from_param(name: impl Into<String>, default: bool) -> Self {
        let name = name.into();
        Self {
            label: name.clone(),
            default,
            source: Source::Param(name),
        }
    }

    fn steps(label: String, input: &str, points: Vec<(f32, bool)>) -> Self {
        let points = compress(points);
        if let [(_, value)] = points.as_slice() {
            return Self {
                label,
                default: *value,
                source: Source::Constant(*value),
            };
        }
        Self {
            label,
            default: false,
            source: Source::Steps {
                input: input.to_string(),
                points,
            },
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Value at the defaults of every parameter involved.
    pub fn default_value(&self) -> bool {
        self.default
    }

    pub fn is_always_true(&self) -> bool {
        self.source == Source::Constant(true)
    }

    pub fn is_always_false(&self) -> bool {
        self.source == Source::Constant(false)
    }

    /// The raw parameter this signal reads directly, if any.
    pub fn input(&self) -> Option<&str> {
        match &self.source {
            Source::Steps { input, .. } | Source::Param(input) => Some(input),
            Source::Constant(_) => None,
        }
    }

    /// Breakpoints when the signal is a step function.
    pub fn breakpoints(&self) -> Option<&[(f32, bool)]> {
        match &self.source {
            Source::Steps { points, .. } => Some(points),
            _ => None,
        }
    }

    fn with_default(mut self, default: bool) -> Self {
        if !matches!(self.source, Source::Constant(_)) {
            self.default = default;
        }
        self
    }
}

fn step_value(points: &[(f32, bool)], x: f32) -> bool {
    points
        .iter()
        .rev()
        .find(|(p, _)| *p <= x)
        .or(points.first())
        .map(|(_, v)| *v)
        .unwrap_or(false)
}

/// Drop breakpoints that sit inside a run of equal values.
fn compress(points: Vec<(f32, bool)>) -> Vec<(f32, bool)> {
    let n = points.len();
    let kept: Vec<(f32, bool)> = (0..n)
        .filter(|&i| {
            let v = points[i].1;
            (i > 0 && points[i - 1].1 != v) || (i + 1 < n && points[i + 1].1 != v)
        })
        .map(|i| points[i])
        .collect();
    if kept.is_empty() {
        points.into_iter().take(1).collect()
    } else {
        kept
    }
}

/// Pointwise combination of two step functions over the same input.
fn merge(a: &[(f32, bool)], b: &[(f32, bool)], op: fn(bool, bool) -> bool) -> Vec<(f32, bool)> {
    let mut xs: Vec<f32> = a.iter().chain(b).map(|(p, _)| *p).collect();
    xs.sort_by(f32::total_cmp);
    xs.dedup();
    xs.into_iter()
        .map(|x| (x, op(step_value(a, x), step_value(b, x))))
        .collect()
}

fn fmt_threshold(t: f32) -> String {
    format!("{t}")
}

/// Builder for blend-algebra expressions over one draft.
pub struct BlendAlgebra<'d, 'c> {
    draft: &'d mut Draft<'c>,
}

impl<'d, 'c> BlendAlgebra<'d, 'c> {
    pub fn new(draft: &'d mut Draft<'c>) -> Self {
        Self { draft }
    }

    // --- Comparisons -----------------------------------------------------

    pub fn greater_than(&mut self, a: &str, threshold: f32, or_equal: bool) -> CompileResult<BoolSignal> {
        let d = self.draft.default_of(a)?;
        let t = threshold;
        let (label, points, default) = if or_equal {
            (
                format!("{a}>={}", fmt_threshold(t)),
                vec![(next_down(t), false), (t, true)],
                d >= t,
            )
        } else {
            (
                format!("{a}>{}", fmt_threshold(t)),
                vec![(t, false), (next_up(t), true)],
                d > t,
            )
        };
        Ok(BoolSignal::steps(label, a, points).with_default(default))
    }

    pub fn less_than(&mut self, a: &str, threshold: f32, or_equal: bool) -> CompileResult<BoolSignal> {
        let d = self.draft.default_of(a)?;
        let t = threshold;
        let (label, points, default) = if or_equal {
            (
                format!("{a}<={}", fmt_threshold(t)),
                vec![(t, true), (next_up(t), false)],
                d <= t,
            )
        } else {
            (
                format!("{a}<{}", fmt_threshold(t)),
                vec![(next_down(t), true), (t, false)],
                d < t,
            )
        };
        Ok(BoolSignal::steps(label, a, points).with_default(default))
    }

    /// `a == value`, as the conjunction of `a >= value` and `a <= value`.
    pub fn equals(&mut self, a: &str, value: f32) -> CompileResult<BoolSignal> {
        let ge = self.greater_than(a, value, true)?;
        let le = self.less_than(a, value, true)?;
        let mut out = self.and(&ge, &le)?;
        out.label = format!("{a}=={}", fmt_threshold(value));
        Ok(out)
    }

    /// `a != value`, as the disjunction of `a < value` and `a > value`.
    pub fn not_equal(&mut self, a: &str, value: f32) -> CompileResult<BoolSignal> {
        let lt = self.less_than(a, value, false)?;
        let gt = self.greater_than(a, value, false)?;
        let mut out = self.or(&lt, &gt)?;
        out.label = format!("{a}!={}", fmt_threshold(value));
        Ok(out)
    }

    // --- Boolean connectives ---------------------------------------------

    pub fn and(&mut self, a: &BoolSignal, b: &BoolSignal) -> CompileResult<BoolSignal> {
        if a.is_always_false() || b.is_always_false() {
            return Ok(BoolSignal::always(false));
        }
        if a.is_always_true() {
            return Ok(b.clone());
        }
        if b.is_always_true() {
            return Ok(a.clone());
        }
        let label = format!("({}&&{})", a.label, b.label);
        if let Some(merged) = Self::merge_same_input(&label, a, b, |x, y| x && y) {
            return Ok(merged.with_default(a.default && b.default));
        }
        let sum = self.add_signals(a, b)?;
        let mut out = self.greater_than(&sum, 1.5, false)?;
        out.label = label;
        Ok(out)
    }

    pub fn or(&mut self, a: &BoolSignal, b: &BoolSignal) -> CompileResult<BoolSignal> {
        if a.is_always_true() || b.is_always_true() {
            return Ok(BoolSignal::always(true));
        }
        if a.is_always_false() {
            return Ok(b.clone());
        }
        if b.is_always_false() {
            return Ok(a.clone());
        }
        let label = format!("({}||{})", a.label, b.label);
        if let Some(merged) = Self::merge_same_input(&label, a, b, |x, y| x || y) {
            return Ok(merged.with_default(a.default || b.default));
        }
        let sum = self.add_signals(a, b)?;
        let mut out = self.greater_than(&sum, 0.5, false)?;
        out.label = label;
        Ok(out)
    }

    pub fn not(&mut self, a: &BoolSignal) -> CompileResult<BoolSignal> {
        let label = format!("!{}", a.label);
        match &a.source {
            Source::Constant(v) => Ok(BoolSignal::always(!v)),
            Source::Steps { input, points } => {
                let flipped = points.iter().map(|(p, v)| (*p, !v)).collect();
                Ok(BoolSignal::steps(label, input, flipped).with_default(!a.default))
            }
            Source::Param(p) => {
                let mut out = self.less_than(p, 0.0, true)?;
                out.label = label;
                Ok(out)
            }
        }
    }

    fn merge_same_input(
        label: &str,
        a: &BoolSignal,
        b: &BoolSignal,
        op: fn(bool, bool) -> bool,
    ) -> Option<BoolSignal> {
        match (&a.source, &b.source) {
            (
                Source::Steps { input: ia, points: pa },
                Source::Steps { input: ib, points: pb },
            ) if ia == ib => Some(BoolSignal::steps(label.to_string(), ia, merge(pa, pb, op))),
            _ => None,
        }
    }

    fn add_signals(&mut self, a: &BoolSignal, b: &BoolSignal) -> CompileResult<String> {
        let pa = self.materialize(a)?;
        let pb = self.materialize(b)?;
        self.add(&pa, &pb)
    }

    /// A parameter holding the signal as 0 or 1, creating one if needed.
    pub fn materialize(&mut self, signal: &BoolSignal) -> CompileResult<String> {
        match &signal.source {
            Source::Param(name) => Ok(name.clone()),
            Source::Constant(v) => {
                let value = if *v { 1.0 } else { 0.0 };
                let out = self.draft.register_param(&signal.label, value);
                let one = self.draft.one()?;
                let setter = self.setter(&out, value);
                self.draft.accumulate(&one, setter);
                Ok(out)
            }
            Source::Steps { input, points } => {
                let out = self
                    .draft
                    .register_param(&signal.label, if signal.default { 1.0 } else { 0.0 });
                let off = self.setter(&out, 0.0);
                let on = self.setter(&out, 1.0);
                let mut tree = BlendTree::new(
                    signal.label.clone(),
                    BlendKind::Simple1D {
                        parameter: input.clone(),
                    },
                );
                for (p, v) in points {
                    tree = tree.with_child(BlendChild::at_threshold(Some(if *v { on } else { off }), *p));
                }
                let tree = self.draft.add_motion(Motion::BlendTree(tree));
                let one = self.draft.one()?;
                self.draft.accumulate(&one, tree);
                Ok(out)
            }
        }
    }

    // --- Arithmetic ------------------------------------------------------

    pub fn add(&mut self, a: &str, b: &str) -> CompileResult<String> {
        let default = self.draft.default_of(a)? + self.draft.default_of(b)?;
        let out = self.draft.register_param(&format!("{a}+{b}"), default);
        let unit = self.setter(&out, 1.0);
        self.drive(&out, &[(a, unit), (b, unit)])?;
        Ok(out)
    }

    pub fn subtract(&mut self, a: &str, b: &str) -> CompileResult<String> {
        let default = self.draft.default_of(a)? - self.draft.default_of(b)?;
        let out = self.draft.register_param(&format!("{a}-{b}"), default);
        let plus = self.setter(&out, 1.0);
        let minus = self.setter(&out, -1.0);
        self.drive(&out, &[(a, plus), (b, minus)])?;
        Ok(out)
    }

    pub fn multiply(&mut self, a: &str, b: &str) -> CompileResult<String> {
        let default = self.draft.default_of(a)? * self.draft.default_of(b)?;
        let out = self.draft.register_param(&format!("{a}*{b}"), default);
        let unit = self.setter(&out, 1.0);
        let inner = self.draft.add_motion(Motion::BlendTree(
            BlendTree::new(format!("{out} (by {b})"), BlendKind::Direct)
                .with_child(BlendChild::direct(Some(unit), b)),
        ));
        self.drive(&out, &[(a, inner)])?;
        Ok(out)
    }

    /// Linear remap of `input` from `[in_min, in_max]` onto
    /// `[out_min, out_max]`, clamped at both ends.
    pub fn map(
        &mut self,
        name: &str,
        input: &str,
        in_min: f32,
        in_max: f32,
        out_min: f32,
        out_max: f32,
    ) -> CompileResult<String> {
        if in_min == in_max || !(in_min.is_finite() && in_max.is_finite()) {
            return Err(CompileError::invariant(format!(
                "Map '{name}' has an empty input range"
            )));
        }
        let d = self.draft.default_of(input)?;
        let t = ((d - in_min) / (in_max - in_min)).clamp(0.0, 1.0);
        let default = out_min + (out_max - out_min) * t;
        let out = self.draft.register_param(name, default);
        let lo = self.setter(&out, out_min);
        let hi = self.setter(&out, out_max);
        let tree = self.draft.add_motion(Motion::BlendTree(
            BlendTree::new(
                out.clone(),
                BlendKind::Simple1D {
                    parameter: input.to_string(),
                },
            )
            .with_child(BlendChild::at_threshold(Some(lo), in_min))
            .with_child(BlendChild::at_threshold(Some(hi), in_max)),
        ));
        let one = self.draft.one()?;
        self.draft.accumulate(&one, tree);
        Ok(out)
    }

    /// Copy of `x`, one evaluation step behind it.
    pub fn buffer(&mut self, x: &str) -> CompileResult<String> {
        let default = self.draft.default_of(x)?;
        let out = self.draft.register_param(&format!("{x}_b"), default);
        let unit = self.setter(&out, 1.0);
        self.drive(&out, &[(x, unit)])?;
        Ok(out)
    }

    // --- Gating ----------------------------------------------------------

    /// A motion equal to `when_true` where the signal holds and `when_false`
    /// elsewhere. `None` when both sides are empty.
    pub fn select(
        &mut self,
        signal: &BoolSignal,
        when_true: Option<MotionId>,
        when_false: Option<MotionId>,
    ) -> CompileResult<Option<MotionId>> {
        if when_true.is_none() && when_false.is_none() {
            return Ok(None);
        }
        let pick = |v: bool| if v { when_true } else { when_false };
        let (input, children) = match &signal.source {
            Source::Constant(v) => return Ok(pick(*v)),
            Source::Steps { input, points } => (
                input.clone(),
                points
                    .iter()
                    .map(|(p, v)| BlendChild::at_threshold(pick(*v), *p))
                    .collect(),
            ),
            Source::Param(p) => (
                p.clone(),
                vec![
                    BlendChild::at_threshold(when_false, 0.0),
                    BlendChild::at_threshold(when_true, 1.0),
                ],
            ),
        };
        let mut tree = BlendTree::new(format!("{} ?", signal.label), BlendKind::Simple1D { parameter: input });
        tree.children = children;
        Ok(Some(self.draft.add_motion(Motion::BlendTree(tree))))
    }

    // --- Helpers ---------------------------------------------------------

    /// A zero-length clip writing `value` into parameter `out`.
    fn setter(&mut self, out: &str, value: f32) -> MotionId {
        self.draft.add_motion(Motion::Clip(
            Clip::new(format!("{out} = {value}"))
                .with_curve(Curve::constant(Binding::parameter(out), value)),
        ))
    }

    /// Drive `out` as the weighted sum of `terms`, plus a zero baseline so the
    /// parameter is written even when every term weighs zero.
    fn drive(&mut self, out: &str, terms: &[(&str, MotionId)]) -> CompileResult<()> {
        let one = self.draft.one()?;
        let zero = self.setter(out, 0.0);
        self.draft.accumulate(&one, zero);
        for (weight, motion) in terms {
            self.draft.accumulate(weight, *motion);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompilerConfig;
    use rigcomp_controller_core::{Controller, Parameter};

    fn rig() -> Controller {
        let mut c = Controller::new("rig");
        c.add_parameter(Parameter::float("a", 5.0)).unwrap();
        c.add_parameter(Parameter::float("b", 2.0)).unwrap();
        c.add_parameter(Parameter::bool("flag", true)).unwrap();
        c
    }

    #[test]
    fn float_neighbours() {
        assert!(next_up(5.0) > 5.0);
        assert!(next_down(5.0) < 5.0);
        assert_eq!(next_down(next_up(5.0)), 5.0);
        assert!(next_up(0.0) > 0.0);
        assert!(next_down(0.0) < 0.0);
        assert_eq!(next_up(-1.0), -next_down(1.0));
    }

    #[test]
    fn greater_than_breakpoints_and_default() {
        let config = CompilerConfig::default();
        let controller = rig();
        let mut draft = Draft::new(&controller, &config);
        let mut alg = draft.algebra();
        let strict = alg.greater_than("a", 5.0, false).unwrap();
        assert!(!strict.default_value());
        assert_eq!(strict.breakpoints().unwrap(), &[(5.0, false), (next_up(5.0), true)]);
        let inclusive = alg.greater_than("a", 5.0, true).unwrap();
        assert!(inclusive.default_value());
        assert_eq!(inclusive.breakpoints().unwrap(), &[(next_down(5.0), false), (5.0, true)]);
    }

    #[test]
    fn same_input_connectives_stay_steps() {
        let config = CompilerConfig::default();
        let controller = rig();
        let mut draft = Draft::new(&controller, &config);
        let mut alg = draft.algebra();
        let eq = alg.equals("a", 5.0).unwrap();
        assert!(eq.default_value());
        assert_eq!(
            eq.breakpoints().unwrap(),
            &[(next_down(5.0), false), (5.0, true), (next_up(5.0), false)]
        );
        let ne = alg.not_equal("a", 5.0).unwrap();
        assert!(!ne.default_value());
        assert_eq!(alg.not(&ne).unwrap().breakpoints(), eq.breakpoints());

        let empty = {
            let hi = alg.greater_than("a", 7.0, false).unwrap();
            let lo = alg.less_than("a", 3.0, false).unwrap();
            alg.and(&hi, &lo).unwrap()
        };
        assert!(empty.is_always_false());
        assert_eq!(draft.staged_motion_count(), 0);
    }

    #[test]
    fn constants_short_circuit() {
        let config = CompilerConfig::default();
        let controller = rig();
        let mut draft = Draft::new(&controller, &config);
        let mut alg = draft.algebra();
        let x = alg.greater_than("a", 1.0, false).unwrap();
        let t = BoolSignal::always(true);
        let f = BoolSignal::always(false);
        assert_eq!(alg.and(&x, &t).unwrap(), x);
        assert!(alg.and(&x, &f).unwrap().is_always_false());
        assert!(alg.or(&x, &t).unwrap().is_always_true());
        assert_eq!(alg.or(&f, &x).unwrap(), x);
        assert!(alg.not(&f).unwrap().is_always_true());
        assert_eq!(draft.staged_motion_count(), 0);
    }

    #[test]
    fn cross_input_connectives_materialize() {
        let config = CompilerConfig::default();
        let controller = rig();
        let mut draft = Draft::new(&controller, &config);
        let mut alg = draft.algebra();
        let x = alg.greater_than("a", 1.0, false).unwrap();
        let y = alg.less_than("b", 1.0, false).unwrap();
        let both = alg.and(&x, &y).unwrap();
        let either = alg.or(&x, &y).unwrap();
        assert!(!both.default_value());
        assert!(either.default_value());
        assert!(both.input().unwrap().starts_with("RC/"));
        assert!(draft.staged_motion_count() > 0);
    }

    #[test]
    fn arithmetic_defaults() {
        let config = CompilerConfig::default();
        let controller = rig();
        let mut draft = Draft::new(&controller, &config);
        let mut alg = draft.algebra();
        let sum = alg.add("a", "b").unwrap();
        let diff = alg.subtract("a", "b").unwrap();
        let prod = alg.multiply("a", "b").unwrap();
        let buf = alg.buffer("a").unwrap();
        let mapped = alg.map("Foo", "b", 0.0, 4.0, 10.0, 20.0).unwrap();
        let clamped = alg.map("Bar", "a", 0.0, 1.0, 10.0, 20.0).unwrap();
        let reversed = alg.map("Baz", "b", 4.0, 0.0, 0.0, 1.0).unwrap();
        assert_eq!(draft.default_of(&sum).unwrap(), 7.0);
        assert_eq!(draft.default_of(&diff).unwrap(), 3.0);
        assert_eq!(draft.default_of(&prod).unwrap(), 10.0);
        assert_eq!(draft.default_of(&buf).unwrap(), 5.0);
        assert_eq!(draft.default_of(&mapped).unwrap(), 15.0);
        assert_eq!(draft.default_of(&clamped).unwrap(), 20.0);
        assert_eq!(draft.default_of(&reversed).unwrap(), 0.5);
    }

    #[test]
    fn empty_map_range_is_rejected() {
        let config = CompilerConfig::default();
        let controller = rig();
        let mut draft = Draft::new(&controller, &config);
        let err = draft.algebra().map("Foo", "a", 1.0, 1.0, 0.0, 1.0).unwrap_err();
        assert!(!err.is_recoverable());
    }

    #[test]
    fn select_with_nothing_on_either_side() {
        let config = CompilerConfig::default();
        let controller = rig();
        let mut draft = Draft::new(&controller, &config);
        let mut alg = draft.algebra();
        let x = alg.greater_than("a", 1.0, false).unwrap();
        assert_eq!(alg.select(&x, None, None).unwrap(), None);
        let param = BoolSignal::from_param("flag", true);
        let m = alg.select(&param, None, Some(MotionId(0))).unwrap().unwrap();
        match draft.motion(m) {
            Some(Motion::BlendTree(tree)) => {
                assert_eq!(tree.children[0].motion, Some(MotionId(0)));
                assert_eq!(tree.children[1].motion, None);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
