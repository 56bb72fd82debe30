//! Curve sampling.
//!
//! Keys are ordered by time and interpolated linearly. Times before the first
//! key hold the first value, times after the last key hold the last value.

use crate::motion::{Curve, Key};

/// Sample a curve at time `t` (seconds). Empty curves sample as 0.0.
pub fn sample_curve(curve: &Curve, t: f32) -> f32 {
    let keys: &[Key] = &curve.keys;
    let (Some(first), Some(last)) = (keys.first(), keys.last()) else {
        return 0.0;
    };
    if t <= first.time {
        return first.value;
    }
    if t >= last.time {
        return last.value;
    }
    // first key strictly after `t`; 1..len because of the range checks above
    let hi = keys.partition_point(|k| k.time <= t);
    let (a, b) = (keys[hi - 1], keys[hi]);
    let span = (b.time - a.time).max(f32::EPSILON);
    a.value + (b.value - a.value) * ((t - a.time) / span)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::Binding;

    fn curve(keys: &[(f32, f32)]) -> Curve {
        Curve {
            binding: Binding::property("Body", "blendShape.Smile"),
            keys: keys
                .iter()
                .map(|(time, value)| Key {
                    time: *time,
                    value: *value,
                })
                .collect(),
        }
    }

    #[test]
    fn holds_ends_and_interpolates_inside() {
        let c = curve(&[(0.0, 0.0), (1.0, 10.0), (2.0, 30.0)]);
        assert_eq!(sample_curve(&c, -1.0), 0.0);
        assert_eq!(sample_curve(&c, 0.5), 5.0);
        assert_eq!(sample_curve(&c, 1.0), 10.0);
        assert_eq!(sample_curve(&c, 1.5), 20.0);
        assert_eq!(sample_curve(&c, 5.0), 30.0);
    }

    #[test]
    fn empty_and_single_key_curves() {
        assert_eq!(sample_curve(&curve(&[]), 0.3), 0.0);
        assert_eq!(sample_curve(&curve(&[(0.0, 7.0)]), 3.0), 7.0);
    }
}
