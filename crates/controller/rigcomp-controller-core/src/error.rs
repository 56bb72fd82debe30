//! Errors raised while building, loading or evaluating a controller.

use thiserror::Error;

use crate::ids::{LayerId, MotionId, StateId};

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("duplicate parameter '{0}'")]
    DuplicateParameter(String),
    #[error("unknown parameter '{0}'")]
    UnknownParameter(String),
    #[error("motion {0:?} does not exist")]
    DanglingMotion(MotionId),
    #[error("state {state:?} referenced in layer '{layer}' does not exist")]
    DanglingState { layer: String, state: StateId },
    #[error("unknown layer {0:?}")]
    UnknownLayer(LayerId),
    #[error("motion {0:?} reaches itself through nested blend trees")]
    MotionCycle(MotionId),
    #[error("controller json: {0}")]
    Json(#[from] serde_json::Error),
}
