//! Compiler configuration.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Prefix for every parameter the compiler creates.
    pub param_prefix: String,
    /// Name of the layer holding the shared Direct tree.
    pub accumulator_layer_name: String,
    /// Longest animated clip (in frames) that may be approximated by one end.
    pub max_approx_frames: f32,
    /// How close a playback speed must be to 0, +1 or -1 to count as that speed.
    pub speed_tolerance: f32,
    /// Deepest blend-tree nesting accepted before the input is declared malformed.
    pub max_tree_depth: usize,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            param_prefix: "RC/".to_string(),
            accumulator_layer_name: "[rigcomp] Direct".to_string(),
            max_approx_frames: 5.0,
            speed_tolerance: 0.01,
            max_tree_depth: 64,
        }
    }
}

impl CompilerConfig {
    pub fn one_parameter(&self) -> String {
        format!("{}One", self.param_prefix)
    }
}
