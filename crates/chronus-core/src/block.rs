//! Audio block constants and measurement helpers.
//!
//! A block is one unit of processing: `B` mono `f32` samples, nominally in
//! [-1, 1]. `B` is fixed at engine start (`BUFFER_SIZE`) and bounded by
//! [`MAX_BLOCK_SIZE`] so transport slots can carry blocks inline without a
//! heap pointer.

use libm::sqrtf;

/// Upper bound on the runtime block size.
pub const MAX_BLOCK_SIZE: usize = 2048;

/// Default block size in samples.
pub const DEFAULT_BLOCK_SIZE: usize = 512;

/// Default sample rate in Hz.
pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

/// Root-mean-square level of a block. Returns 0 for an empty slice.
pub fn rms(block: &[f32]) -> f32 {
    if block.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = block.iter().map(|s| s * s).sum();
    sqrtf(sum_sq / block.len() as f32)
}

/// Peak absolute level of a block.
pub fn peak(block: &[f32]) -> f32 {
    block.iter().fold(0.0f32, |acc, s| acc.max(s.abs()))
}
