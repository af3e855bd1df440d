//! Chronus Core - runtime primitives for the modular synthesizer.
//!
//! This crate holds everything the real-time path is built from, with zero
//! allocation once a patch is prepared:
//!
//! # Core Abstractions
//!
//! ## Control plane
//!
//! - [`CommandRecord`] - validated 64-byte control message (the command
//!   ring's element type)
//! - [`Ident`] - inline `[a-z0-9_]{1,16}` identifier for modules and
//!   parameters
//!
//! ## Module system
//!
//! - [`Module`] - object-safe DSP node contract
//! - [`ModuleSchema`] / [`ParamSpec`] - static parameter metadata with
//!   registration-time validation
//! - [`Smoother`] - per-parameter linear / one-pole ramping, targets applied
//!   at block boundaries only
//!
//! ## Patch plane
//!
//! - [`PatchRouter`] - DAG of modules with connect-time cycle rejection and
//!   a cached, insertion-stable topological order
//! - [`ModuleHost`] - owns a router plus all per-block scratch; applies the
//!   command FIFO and renders the chain with no allocation
//!
//! # Design Principles
//!
//! - **Real-time safe**: no allocation, locking, or logging on the render
//!   path; edits allocate, blocks never do
//! - **Validated at ingress**: identifiers, record layouts, and schemas are
//!   checked where they enter; the hot path trusts its inputs
//! - **no_std compatible**: `libm` for math, `alloc` for the edit plane
//!
//! # Example
//!
//! ```rust,ignore
//! use chronus_core::{Ident, ModuleHost};
//!
//! let mut host = ModuleHost::new(48000.0, 512);
//! host.add_module(Ident::new("osc1")?, registry.create("sine")?)?;
//! let block = host.process_chain();
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

pub mod block;
pub mod command;
pub mod host;
pub mod ident;
pub mod module;
pub mod param;
pub mod router;
pub mod schema;

// Re-export main types at crate root
pub use block::{DEFAULT_BLOCK_SIZE, DEFAULT_SAMPLE_RATE, MAX_BLOCK_SIZE, peak, rms};
pub use command::{COMMAND_RECORD_LEN, CommandRecord, CommandValue, Opcode, RecordError};
pub use host::{HostStats, ModuleHost};
pub use ident::{Ident, IdentError, MAX_IDENT_LEN, is_valid_ident};
pub use module::Module;
pub use param::{Smoother, SmoothingMode};
pub use router::{MAX_EDGES, MAX_MODULES, PatchRouter, RouterError};
pub use schema::{ModuleSchema, ParamSpec, ParamUnit, SchemaError};
