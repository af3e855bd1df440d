//! Lock-free transport between chronus workers and the audio callback.
//!
//! Everything a slot shares across threads lives here, and all of it is
//! either an SPSC ring, a bounded channel on the patch plane, or a single
//! atomic counter:
//!
//! - [`audio_ring`] - pre-allocated block ring, worker → device callback,
//!   with latest-wins-plus-cushion consumption
//! - [`command_ring`] - 64-byte command records, dispatcher → worker, with
//!   producer-side coalescing under backpressure
//! - [`patch_queue`] - structured graph edits, supervisor → standby worker
//!
//! Counter structs ([`AudioRingCounters`], [`CommandRingCounters`]) are
//! created by the slot and injected into the rings, so accounting survives
//! worker respawns even though rings are rebuilt.

pub mod audio_ring;
pub mod command_ring;
pub mod patch;

pub use audio_ring::{AudioBlock, AudioRingConsumer, AudioRingCounters, AudioRingProducer, audio_ring};
pub use command_ring::{
    CommandReceiver, CommandRingCounters, CommandSender, DEFAULT_COMMAND_CAPACITY, command_ring,
};
pub use patch::{
    DEFAULT_PATCH_CAPACITY, PatchOp, PatchReceiver, PatchSender, PrimeOp, patch_queue,
};

/// Transport construction and runtime failures.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TransportError {
    /// Producer write against a full ring.
    #[error("ring full")]
    RingFull,
    /// Block size of zero or beyond the inline payload bound.
    #[error("invalid block size {0}")]
    BadBlockSize(usize),
    /// Ring capacity too small to be useful.
    #[error("invalid ring capacity {0}")]
    BadRingCapacity(usize),
}
