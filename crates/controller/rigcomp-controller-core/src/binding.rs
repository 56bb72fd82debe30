//! Animated-property bindings and the validity oracle.
//!
//! A [`Binding`] names what a curve writes: either a property on an object in
//! the rig (`path` + `property`) or an animator parameter. Whether a property
//! binding still points at something that exists is decided by the host
//! through [`BindingOracle`]; the compiler never inspects the scene itself.

use hashbrown::HashSet;
use serde::{Deserialize, Serialize};

/// What a curve animates.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Binding {
    /// A property on an object, addressed by its path relative to the rig root.
    Property { path: String, property: String },
    /// An animator parameter driven by a curve.
    Parameter { name: String },
}

impl Binding {
    pub fn property(path: impl Into<String>, property: impl Into<String>) -> Self {
        Binding::Property {
            path: path.into(),
            property: property.into(),
        }
    }

    pub fn parameter(name: impl Into<String>) -> Self {
        Binding::Parameter { name: name.into() }
    }

    /// Parameter name when this binding drives an animator parameter.
    pub fn parameter_name(&self) -> Option<&str> {
        match self {
            Binding::Parameter { name } => Some(name),
            Binding::Property { .. } => None,
        }
    }

    /// Separate-axis rotation curves (`localEulerAngles.x` and friends).
    pub fn is_euler_rotation(&self) -> bool {
        match self {
            Binding::Property { property, .. } => property.starts_with("localEulerAngles"),
            Binding::Parameter { .. } => false,
        }
    }
}

/// Decides whether an animated binding still targets something that exists.
/// Hosts implement this and pass it into the compiler.
pub trait BindingOracle {
    fn is_valid(&self, binding: &Binding) -> bool;
}

impl<F> BindingOracle for F
where
    F: Fn(&Binding) -> bool,
{
    fn is_valid(&self, binding: &Binding) -> bool {
        self(binding)
    }
}

/// Treats every binding as valid.
#[derive(Clone, Copy, Debug, Default)]
pub struct AcceptAll;

impl BindingOracle for AcceptAll {
    fn is_valid(&self, _binding: &Binding) -> bool {
        true
    }
}

/// Oracle backed by an explicit set of known property bindings.
/// Parameter bindings are always considered valid.
#[derive(Clone, Debug, Default)]
pub struct KnownBindings {
    known: HashSet<Binding>,
}

impl KnownBindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, binding: Binding) {
        self.known.insert(binding);
    }

    pub fn with(mut self, binding: Binding) -> Self {
        self.insert(binding);
        self
    }
}

impl BindingOracle for KnownBindings {
    fn is_valid(&self, binding: &Binding) -> bool {
        match binding {
            Binding::Parameter { .. } => true,
            Binding::Property { .. } => self.known.contains(binding),
        }
    }
}
