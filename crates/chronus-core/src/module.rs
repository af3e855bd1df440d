//! The DSP module contract.
//!
//! Every node in a patch implements [`Module`]. The contract is shaped for
//! the real-time path:
//!
//! - `prepare` is the **only** place a module may allocate. `process` runs
//!   on the worker's steady-state loop with no allocation, no blocking I/O,
//!   and no logging.
//! - Parameter writes either land immediately (`immediate = true`, used by
//!   patch priming) or stage a smoothing target (`immediate = false`, the
//!   live-control path). Targets take effect from the next `process` call —
//!   never mid-block.
//! - `process` writes exactly one block: `output.len()` samples.
//!
//! The trait is object-safe; hosts own modules as `Box<dyn Module + Send>`
//! created through the registry.

use crate::schema::ModuleSchema;

/// A DSP node in the patch graph.
pub trait Module: Send {
    /// The module type's static schema.
    fn schema(&self) -> &'static ModuleSchema;

    /// One-shot initialization: capture the sample rate and block size,
    /// allocate any scratch state, and load parameter defaults.
    fn prepare(&mut self, sample_rate: f32, block_size: usize);

    /// Writes a parameter.
    ///
    /// With `immediate` the value lands on the audible path at once;
    /// otherwise it becomes the smoothing target. Values are clamped to the
    /// schema range. Returns `false` for unknown parameter names so callers
    /// can count the drop.
    fn set_param(&mut self, name: &str, value: f32, immediate: bool) -> bool;

    /// Sets the boolean gate. No-op for modules without gate semantics.
    fn set_gate(&mut self, _on: bool) {}

    /// Renders one block: reads `input`, writes all of `output`.
    ///
    /// Must not allocate, block, or log. Modules that detect an invalid
    /// internal state clamp and continue; `process` never fails.
    fn process(&mut self, input: &[f32], output: &mut [f32]);

    /// Clears internal state (phase, envelopes, filter history) without
    /// touching parameters.
    fn reset(&mut self);
}
