//! Identifiers and the allocator that hands them out.

use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct MotionId(pub u32);

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct LayerId(pub u32);

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct StateId(pub u32);

/// Monotonic allocator for LayerId and StateId.
///
/// MotionId is not allocated here: motions are addressed by their slot in the
/// [`MotionArena`](crate::motion::MotionArena).
#[derive(Clone, Default, Debug, Serialize, Deserialize)]
pub struct IdAllocator {
    next_layer: u32,
    next_state: u32,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn alloc_layer(&mut self) -> LayerId {
        let id = LayerId(self.next_layer);
        self.next_layer = self.next_layer.wrapping_add(1);
        id
    }

    #[inline]
    pub fn alloc_state(&mut self) -> StateId {
        let id = StateId(self.next_state);
        self.next_state = self.next_state.wrapping_add(1);
        id
    }

    /// Make sure future allocations never collide with ids that were loaded
    /// from serialized data.
    pub fn reserve_past(&mut self, layer: Option<LayerId>, state: Option<StateId>) {
        if let Some(LayerId(l)) = layer {
            self.next_layer = self.next_layer.max(l.wrapping_add(1));
        }
        if let Some(StateId(s)) = state {
            self.next_state = self.next_state.max(s.wrapping_add(1));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_monotonic() {
        let mut alloc = IdAllocator::new();
        assert_eq!(alloc.alloc_layer(), LayerId(0));
        assert_eq!(alloc.alloc_layer(), LayerId(1));
        assert_eq!(alloc.alloc_state(), StateId(0));
        assert_eq!(alloc.alloc_state(), StateId(1));
    }

    #[test]
    fn reserve_past_skips_loaded_ids() {
        let mut alloc = IdAllocator::new();
        alloc.reserve_past(Some(LayerId(7)), Some(StateId(2)));
        assert_eq!(alloc.alloc_layer(), LayerId(8));
        assert_eq!(alloc.alloc_state(), StateId(3));
        // Never moves backwards.
        alloc.reserve_past(Some(LayerId(1)), None);
        assert_eq!(alloc.alloc_layer(), LayerId(9));
    }
}
