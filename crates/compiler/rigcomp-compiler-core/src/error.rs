//! Compiler error classes.
//!
//! `NotOptimizable` is the expected outcome for much of real input and is
//! caught at the per-layer boundary. `Invariant` means an earlier stage handed
//! over something malformed; it aborts the whole pass.

use rigcomp_controller_core::ControllerError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error("not optimizable: {0}")]
    NotOptimizable(String),
    #[error("invariant violated: {0}")]
    Invariant(String),
}

impl CompileError {
    pub fn reject(reason: impl Into<String>) -> Self {
        CompileError::NotOptimizable(reason.into())
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        CompileError::Invariant(message.into())
    }

    /// Whether the pass may continue with the next layer.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, CompileError::NotOptimizable(_))
    }

    /// Human-readable reason for a rejection.
    pub fn reason(&self) -> &str {
        match self {
            CompileError::NotOptimizable(r) | CompileError::Invariant(r) => r,
        }
    }
}

impl From<ControllerError> for CompileError {
    fn from(err: ControllerError) -> Self {
        CompileError::Invariant(err.to_string())
    }
}

pub type CompileResult<T> = Result<T, CompileError>;
