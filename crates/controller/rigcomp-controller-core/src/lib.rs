//! rigcomp controller core (engine-agnostic)
//!
//! Data model for an assembled animation controller: parameters, layered
//! state machines, clips and blend trees held in an arena, plus the seams the
//! layer compiler consumes (binding-validity oracle, provenance side-table,
//! read-only layer view) and a rest-pose evaluator for checking rewrites.

pub mod accumulate;
pub mod binding;
pub mod controller;
pub mod error;
pub mod ids;
pub mod layer;
pub mod motion;
pub mod params;
pub mod provenance;
pub mod rest;
pub mod sampling;
pub mod view;

// Re-exports for consumers (compiler, hosts)
pub use binding::{AcceptAll, Binding, BindingOracle, KnownBindings};
pub use controller::Controller;
pub use error::ControllerError;
pub use ids::{LayerId, MotionId, StateId};
pub use layer::{
    Behaviour, BlendMode, Condition, ConditionMode, Layer, State, Transition, TransitionSource,
    TransitionTarget,
};
pub use motion::{BlendChild, BlendKind, BlendTree, Clip, Curve, Key, Motion, MotionArena};
pub use params::{ParamKind, ParamTable, Parameter};
pub use provenance::{Origin, Provenance};
pub use rest::{RestEvaluator, RestPose};
pub use view::LayerView;
