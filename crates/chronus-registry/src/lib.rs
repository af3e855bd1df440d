//! Module registry and factory for chronus DSP modules.
//!
//! The registry is the single place module types are discovered and
//! instantiated. Patch edits name modules by type string (`"sine"`,
//! `"adsr"`, ...); the worker resolves them here. There are no process-wide
//! globals: a registry is built at startup and handed to the supervisor,
//! which passes it to each worker.
//!
//! Registration validates the module's schema (identifier charset, ranges
//! containing defaults, no duplicate parameters) before accepting the
//! factory, so a type that made it into the registry can be trusted by the
//! patch plane.
//!
//! # Example
//!
//! ```rust
//! use chronus_registry::ModuleRegistry;
//!
//! let registry = ModuleRegistry::with_builtins();
//! let mut osc = registry.create("sine").expect("sine is built in");
//! osc.prepare(48000.0, 512);
//! ```

use chronus_core::{Module, ModuleSchema, SchemaError};
use chronus_modules::{Adsr, BiquadLowpass, Gain, Limiter, Mixer, Noise, Passthrough, SineOsc};
use std::fmt;

/// Factory function producing a fresh, unprepared module instance.
pub type ModuleFactory = fn() -> Box<dyn Module + Send>;

/// Why a registry operation failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// No factory registered under this type name.
    UnknownType(String),
    /// A factory is already registered under this type name.
    DuplicateType(&'static str),
    /// The factory's schema failed validation.
    InvalidSchema(SchemaError),
    /// The factory's schema type name does not match the registered name.
    NameMismatch {
        /// Name the factory was registered under.
        registered: &'static str,
        /// Name the produced module's schema reports.
        schema: &'static str,
    },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownType(name) => write!(f, "unknown module type {name:?}"),
            Self::DuplicateType(name) => write!(f, "module type {name:?} already registered"),
            Self::InvalidSchema(e) => write!(f, "schema rejected: {e}"),
            Self::NameMismatch { registered, schema } => {
                write!(f, "factory registered as {registered:?} reports schema {schema:?}")
            }
        }
    }
}

impl std::error::Error for RegistryError {}

struct RegistryEntry {
    type_name: &'static str,
    schema: &'static ModuleSchema,
    factory: ModuleFactory,
}

/// Registry of instantiable module types.
pub struct ModuleRegistry {
    entries: Vec<RegistryEntry>,
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl ModuleRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            entries: Vec::with_capacity(8),
        }
    }

    /// Creates a registry with every built-in module type registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        // Built-in schemas are validated in tests; registration cannot fail.
        registry.register("sine", || Box::new(SineOsc::new())).unwrap();
        registry.register("noise", || Box::new(Noise::new())).unwrap();
        registry.register("adsr", || Box::new(Adsr::new())).unwrap();
        registry
            .register("biquad_lowpass", || Box::new(BiquadLowpass::new()))
            .unwrap();
        registry.register("gain", || Box::new(Gain::new())).unwrap();
        registry.register("passthrough", || Box::new(Passthrough)).unwrap();
        registry.register("mixer", || Box::new(Mixer::new())).unwrap();
        registry.register("limiter", || Box::new(Limiter::new())).unwrap();
        registry
    }

    /// Registers a factory under `type_name`.
    ///
    /// Instantiates one module to read and validate its schema; the
    /// schema's own `type_name` must match the registration name.
    pub fn register(
        &mut self,
        type_name: &'static str,
        factory: ModuleFactory,
    ) -> Result<(), RegistryError> {
        if self.entries.iter().any(|e| e.type_name == type_name) {
            return Err(RegistryError::DuplicateType(type_name));
        }
        let probe = factory();
        let schema = probe.schema();
        schema.validate().map_err(RegistryError::InvalidSchema)?;
        if schema.type_name != type_name {
            return Err(RegistryError::NameMismatch {
                registered: type_name,
                schema: schema.type_name,
            });
        }
        self.entries.push(RegistryEntry {
            type_name,
            schema,
            factory,
        });
        Ok(())
    }

    /// Instantiates a fresh module of the named type.
    ///
    /// The module is unprepared; the host calls `prepare` when it is added
    /// to a patch.
    pub fn create(&self, type_name: &str) -> Result<Box<dyn Module + Send>, RegistryError> {
        self.entries
            .iter()
            .find(|e| e.type_name == type_name)
            .map(|e| (e.factory)())
            .ok_or_else(|| RegistryError::UnknownType(type_name.to_string()))
    }

    /// Whether a type is registered.
    pub fn contains(&self, type_name: &str) -> bool {
        self.entries.iter().any(|e| e.type_name == type_name)
    }

    /// Registered type names, in registration order.
    pub fn type_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|e| e.type_name)
    }

    /// Schemas of every registered type, in registration order.
    pub fn schemas(&self) -> impl Iterator<Item = &'static ModuleSchema> + '_ {
        self.entries.iter().map(|e| e.schema)
    }

    /// Schema of one registered type.
    pub fn schema(&self, type_name: &str) -> Option<&'static ModuleSchema> {
        self.entries
            .iter()
            .find(|e| e.type_name == type_name)
            .map(|e| e.schema)
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
