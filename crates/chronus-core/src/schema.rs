//! Module parameter schemas.
//!
//! Every module type publishes a static [`ModuleSchema`]: its registry type
//! name, how many incoming connections it accepts, and a [`ParamSpec`] table
//! describing each parameter (range, default, unit, smoothing). The registry
//! validates schemas before accepting a factory, so a schema in the running
//! system is known-consistent.

use core::fmt;

use crate::ident::is_valid_ident;
use crate::param::SmoothingMode;

/// Display unit for a parameter value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamUnit {
    /// Frequency in Hertz.
    Hertz,
    /// Time in milliseconds.
    Milliseconds,
    /// Linear amplitude (1.0 = unity).
    Amplitude,
    /// Filter resonance (dimensionless Q).
    Q,
    /// Dimensionless.
    None,
}

impl ParamUnit {
    /// Unit suffix for display.
    pub const fn suffix(&self) -> &'static str {
        match self {
            ParamUnit::Hertz => " Hz",
            ParamUnit::Milliseconds => " ms",
            ParamUnit::Amplitude => "",
            ParamUnit::Q => "",
            ParamUnit::None => "",
        }
    }

    /// Machine-readable unit name for schema snapshots.
    pub const fn name(&self) -> &'static str {
        match self {
            ParamUnit::Hertz => "hz",
            ParamUnit::Milliseconds => "ms",
            ParamUnit::Amplitude => "amplitude",
            ParamUnit::Q => "q",
            ParamUnit::None => "none",
        }
    }
}

/// Static description of one module parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSpec {
    /// Parameter name, `[a-z0-9_]{1,16}`.
    pub name: &'static str,
    /// Minimum accepted value.
    pub min: f32,
    /// Maximum accepted value.
    pub max: f32,
    /// Value the parameter holds after `prepare`.
    pub default: f32,
    /// Display unit.
    pub unit: ParamUnit,
    /// Smoothing applied to non-immediate writes.
    pub smoothing: SmoothingMode,
}

impl ParamSpec {
    /// Frequency parameter with a 15 ms one-pole window.
    pub const fn frequency(name: &'static str, min: f32, max: f32, default: f32) -> Self {
        Self {
            name,
            min,
            max,
            default,
            unit: ParamUnit::Hertz,
            smoothing: SmoothingMode::OnePole { window_ms: 15.0 },
        }
    }

    /// Linear amplitude parameter (0..=1 style) with an 8 ms one-pole window.
    pub const fn amplitude(name: &'static str, max: f32, default: f32) -> Self {
        Self {
            name,
            min: 0.0,
            max,
            default,
            unit: ParamUnit::Amplitude,
            smoothing: SmoothingMode::OnePole { window_ms: 8.0 },
        }
    }

    /// Filter cutoff parameter with the slower 22 ms window.
    pub const fn cutoff(name: &'static str, min: f32, max: f32, default: f32) -> Self {
        Self {
            name,
            min,
            max,
            default,
            unit: ParamUnit::Hertz,
            smoothing: SmoothingMode::OnePole { window_ms: 22.0 },
        }
    }

    /// Resonance parameter with the filter smoothing window.
    pub const fn q(name: &'static str, min: f32, max: f32, default: f32) -> Self {
        Self {
            name,
            min,
            max,
            default,
            unit: ParamUnit::Q,
            smoothing: SmoothingMode::OnePole { window_ms: 22.0 },
        }
    }

    /// Time parameter in milliseconds, unsmoothed (consumed at segment start).
    pub const fn time_ms(name: &'static str, min: f32, max: f32, default: f32) -> Self {
        Self {
            name,
            min,
            max,
            default,
            unit: ParamUnit::Milliseconds,
            smoothing: SmoothingMode::None,
        }
    }

    /// Dimensionless parameter without smoothing.
    pub const fn raw(name: &'static str, min: f32, max: f32, default: f32) -> Self {
        Self {
            name,
            min,
            max,
            default,
            unit: ParamUnit::None,
            smoothing: SmoothingMode::None,
        }
    }

    /// Clamps a value into this parameter's range.
    #[inline]
    pub fn clamp(&self, value: f32) -> f32 {
        value.clamp(self.min, self.max)
    }
}

/// Static description of a module type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModuleSchema {
    /// Registry type name, `[a-z0-9_]{1,16}`.
    pub type_name: &'static str,
    /// Incoming edges the router may attach. 1 for ordinary modules;
    /// greater only for combiners (the host sums their inputs).
    pub max_inputs: u8,
    /// Parameter table.
    pub params: &'static [ParamSpec],
}

impl ModuleSchema {
    /// Looks up a parameter spec by name.
    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Validates internal consistency.
    ///
    /// Checked at registry registration: identifier charset for the type
    /// name and every parameter name, non-empty ranges containing their
    /// defaults, no duplicate parameter names, and a sane input count.
    pub fn validate(&self) -> Result<(), SchemaError> {
        if !is_valid_ident(self.type_name) {
            return Err(SchemaError::BadTypeName(self.type_name));
        }
        if self.max_inputs == 0 {
            return Err(SchemaError::ZeroInputs(self.type_name));
        }
        for (i, p) in self.params.iter().enumerate() {
            if !is_valid_ident(p.name) {
                return Err(SchemaError::BadParamName(p.name));
            }
            if !(p.min <= p.max) {
                return Err(SchemaError::EmptyRange(p.name));
            }
            if p.default < p.min || p.default > p.max {
                return Err(SchemaError::DefaultOutOfRange(p.name));
            }
            if self.params[..i].iter().any(|q| q.name == p.name) {
                return Err(SchemaError::DuplicateParam(p.name));
            }
        }
        Ok(())
    }
}

/// A schema failed registry validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaError {
    /// Type name violates the identifier charset.
    BadTypeName(&'static str),
    /// A module that accepts no inputs at all cannot be routed.
    ZeroInputs(&'static str),
    /// Parameter name violates the identifier charset.
    BadParamName(&'static str),
    /// min > max, or a NaN bound.
    EmptyRange(&'static str),
    /// Default value outside [min, max].
    DefaultOutOfRange(&'static str),
    /// Two parameters share a name.
    DuplicateParam(&'static str),
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadTypeName(n) => write!(f, "invalid module type name {n:?}"),
            Self::ZeroInputs(n) => write!(f, "module type {n:?} declares zero inputs"),
            Self::BadParamName(n) => write!(f, "invalid parameter name {n:?}"),
            Self::EmptyRange(n) => write!(f, "parameter {n:?} has an empty range"),
            Self::DefaultOutOfRange(n) => write!(f, "parameter {n:?} default outside range"),
            Self::DuplicateParam(n) => write!(f, "duplicate parameter name {n:?}"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for SchemaError {}
