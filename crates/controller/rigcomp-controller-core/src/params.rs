//! Controller parameters and the ordered parameter table.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::ControllerError;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    Bool,
    Int,
    Float,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub kind: ParamKind,
    /// Resting value. Bools store 0.0 / 1.0.
    #[serde(default)]
    pub default: f32,
    /// Whether the parameter is replicated over the network by the host.
    #[serde(default)]
    pub synced: bool,
}

impl Parameter {
    pub fn new(name: impl Into<String>, kind: ParamKind, default: f32) -> Self {
        Self {
            name: name.into(),
            kind,
            default,
            synced: false,
        }
    }

    pub fn float(name: impl Into<String>, default: f32) -> Self {
        Self::new(name, ParamKind::Float, default)
    }

    pub fn int(name: impl Into<String>, default: i32) -> Self {
        Self::new(name, ParamKind::Int, default as f32)
    }

    pub fn bool(name: impl Into<String>, default: bool) -> Self {
        Self::new(name, ParamKind::Bool, if default { 1.0 } else { 0.0 })
    }
}

/// Parameters keyed by name, kept in insertion order so serialized output is stable.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamTable {
    entries: IndexMap<String, Parameter>,
}

impl ParamTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, param: Parameter) -> Result<(), ControllerError> {
        if self.entries.contains_key(&param.name) {
            return Err(ControllerError::DuplicateParameter(param.name));
        }
        self.entries.insert(param.name.clone(), param);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn kind_of(&self, name: &str) -> Option<ParamKind> {
        self.entries.get(name).map(|p| p.kind)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.entries.values()
    }

    /// Re-key after deserialization so that map keys always match `Parameter::name`.
    pub(crate) fn normalize_keys(&mut self) -> Result<(), ControllerError> {
        let mut rebuilt = IndexMap::with_capacity(self.entries.len());
        for (_, param) in self.entries.drain(..) {
            if rebuilt.contains_key(&param.name) {
                return Err(ControllerError::DuplicateParameter(param.name));
            }
            rebuilt.insert(param.name.clone(), param);
        }
        self.entries = rebuilt;
        Ok(())
    }
}
