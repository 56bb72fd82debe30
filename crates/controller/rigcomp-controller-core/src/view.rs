//! Read-only enumeration of a controller's layers in priority order.

use hashbrown::HashSet;

use crate::binding::{Binding, BindingOracle};
use crate::controller::Controller;
use crate::error::ControllerError;
use crate::ids::LayerId;
use crate::layer::{Behaviour, Layer};
use crate::params::ParamKind;

#[derive(Clone, Copy)]
pub struct LayerView<'a> {
    controller: &'a Controller,
}

impl<'a> LayerView<'a> {
    pub fn new(controller: &'a Controller) -> Self {
        Self { controller }
    }

    pub fn controller(&self) -> &'a Controller {
        self.controller
    }

    /// Layers from lowest to highest priority.
    pub fn layers(&self) -> impl Iterator<Item = &'a Layer> {
        self.controller.layers.iter()
    }

    pub fn layer(&self, id: LayerId) -> Option<&'a Layer> {
        self.controller.layer(id)
    }

    /// Layers that sit above `id` in the stack.
    pub fn above(&self, id: LayerId) -> impl Iterator<Item = &'a Layer> {
        let start = self
            .controller
            .layer_index(id)
            .map(|i| i + 1)
            .unwrap_or(self.controller.layers.len());
        self.controller.layers[start..].iter()
    }

    /// True when the host flagged the layer, or any behaviour anywhere in the
    /// controller fades its weight at runtime.
    pub fn is_weight_controlled(&self, id: LayerId) -> bool {
        let flagged = self
            .layer(id)
            .map(|l| l.externally_controlled)
            .unwrap_or(false);
        flagged
            || self.layers().flat_map(|l| l.all_behaviours()).any(|b| {
                matches!(b, Behaviour::LayerControl { target, .. } if *target == id)
            })
    }

    pub fn parameter_kind(&self, name: &str) -> Option<ParamKind> {
        self.controller.parameters.kind_of(name)
    }

    /// Valid bindings animated by any state of the layer.
    pub fn animated_bindings(
        &self,
        layer: &Layer,
        oracle: &dyn BindingOracle,
    ) -> Result<HashSet<Binding>, ControllerError> {
        let mut out = HashSet::new();
        for state in &layer.states {
            if let Some(motion) = state.motion {
                out.extend(
                    self.controller
                        .motions
                        .bindings(motion)?
                        .into_iter()
                        .filter(|b| oracle.is_valid(b)),
                );
            }
        }
        Ok(out)
    }
}
