//! Provenance side-table: which layers and motions were generated during the
//! current build rather than authored by the user.
//!
//! Nothing here is stored on the controller itself. Build passes that create
//! content mark it; later passes consult the table.

use hashbrown::HashMap;

use crate::ids::{LayerId, MotionId};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Default)]
pub enum Origin {
    #[default]
    UserAuthored,
    GeneratedThisPass,
}

#[derive(Clone, Debug, Default)]
pub struct Provenance {
    layers: HashMap<LayerId, Origin>,
    motions: HashMap<MotionId, Origin>,
}

impl Provenance {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_layer(&mut self, id: LayerId, origin: Origin) {
        self.layers.insert(id, origin);
    }

    pub fn mark_motion(&mut self, id: MotionId, origin: Origin) {
        self.motions.insert(id, origin);
    }

    /// Unknown handles are user-authored.
    pub fn layer_origin(&self, id: LayerId) -> Origin {
        self.layers.get(&id).copied().unwrap_or_default()
    }

    pub fn motion_origin(&self, id: MotionId) -> Origin {
        self.motions.get(&id).copied().unwrap_or_default()
    }

    pub fn is_generated_layer(&self, id: LayerId) -> bool {
        self.layer_origin(id) == Origin::GeneratedThisPass
    }

    pub fn is_generated_motion(&self, id: MotionId) -> bool {
        self.motion_origin(id) == Origin::GeneratedThisPass
    }

    pub fn generated_motion_count(&self) -> usize {
        self.motions
            .values()
            .filter(|o| **o == Origin::GeneratedThisPass)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_handles_default_to_user_authored() {
        let mut p = Provenance::new();
        assert_eq!(p.layer_origin(LayerId(1)), Origin::UserAuthored);
        p.mark_layer(LayerId(1), Origin::GeneratedThisPass);
        p.mark_motion(MotionId(4), Origin::GeneratedThisPass);
        assert!(p.is_generated_layer(LayerId(1)));
        assert!(p.is_generated_motion(MotionId(4)));
        assert!(!p.is_generated_motion(MotionId(5)));
        assert_eq!(p.generated_motion_count(), 1);
    }
}
