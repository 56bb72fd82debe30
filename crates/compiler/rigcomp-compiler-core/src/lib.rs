//! rigcomp compiler core
//!
//! Rewrites discrete animator layers (constants and two-state toggles) into
//! gated children of one shared Direct blend tree, preserving the resting
//! output of the controller. Layers that cannot be rewritten safely are left
//! untouched and reported with a reason.
//!
//! Entry point: [`optimize_controller`], or [`TreeSynthesizer`] for a reusable
//! pass.

pub mod accumulator;
pub mod algebra;
pub mod classifier;
pub mod config;
pub mod draft;
pub mod error;
pub mod reducer;
pub mod report;
pub mod synthesizer;

pub use accumulator::{DirectAccumulator, SinkLocation};
pub use algebra::{next_down, next_up, BlendAlgebra, BoolSignal};
pub use classifier::{LayerClassifier, LayerShape};
pub use config::CompilerConfig;
pub use draft::{Draft, Patch};
pub use error::{CompileError, CompileResult};
pub use reducer::MotionReducer;
pub use report::{CompileReport, LayerOutcome, ReportEntry};
pub use synthesizer::{optimize_controller, TreeSynthesizer};

