//! Accumulation of weighted per-binding contributions within one layer.

use hashbrown::HashMap;

use crate::binding::Binding;

/// Sums `value * weight` per binding. Zero-weight contributions are dropped, so
/// a binding only appears once a non-zero weight has written it.
#[derive(Default, Debug)]
pub struct Accumulator {
    sums: HashMap<Binding, f32>,
}

impl Accumulator {
    pub fn new() -> Self {
        Self {
            sums: HashMap::new(),
        }
    }

    pub fn add(&mut self, binding: &Binding, value: f32, weight: f32) {
        if weight == 0.0 {
            return;
        }
        *self.sums.entry(binding.clone()).or_insert(0.0) += value * weight;
    }

    pub fn is_empty(&self) -> bool {
        self.sums.is_empty()
    }

    pub fn finalize(self) -> HashMap<Binding, f32> {
        self.sums
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_weights_do_not_write() {
        let b = Binding::property("Body", "blendShape.Smile");
        let mut acc = Accumulator::new();
        acc.add(&b, 100.0, 0.0);
        assert!(acc.is_empty());
        assert!(acc.finalize().is_empty());
    }

    #[test]
    fn contributions_sum_without_normalizing() {
        let b = Binding::parameter("out");
        let mut acc = Accumulator::new();
        acc.add(&b, 0.0, 1.0);
        acc.add(&b, 1.0, 0.25);
        acc.add(&b, 1.0, 0.5);
        acc.add(&b, -1.0, 2.0);
        let out = acc.finalize();
        assert_eq!(out.get(&b).copied(), Some(-1.25));
    }
}
