//! Engine status counters and the observable snapshot.
//!
//! Counters live in shared atomics the whole runtime increments lock-free;
//! [`StatusHandle`] is the cheap-to-clone read side handed to the control
//! transport so `/engine/status` never touches the supervisor or the audio
//! path.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use chronus_transport::{AudioRingCounters, CommandRingCounters};
use serde::Serialize;

use crate::slot::SlotShared;

/// Supervisor-level event counters.
#[derive(Debug, Default)]
pub struct StatusCounters {
    /// Successful commits (prime-ready observed).
    pub commits: AtomicU64,
    /// Aborts requested by the controller.
    pub aborts: AtomicU64,
    /// Prime waits that timed out.
    pub prime_timeouts: AtomicU64,
    /// Active-slot failures that triggered a switch or in-place respawn.
    pub failovers: AtomicU64,
    /// Workers spawned after the initial pair.
    pub respawns: AtomicU64,
    /// Active-index flips performed by the audio callback.
    pub switches: AtomicU64,
    /// Malformed control messages dropped at ingress.
    pub malformed_messages: AtomicU64,
}

/// Read-only view over every observable counter in the engine.
#[derive(Clone)]
pub struct StatusHandle {
    /// Supervisor event counters.
    pub engine: Arc<StatusCounters>,
    /// Per-slot shared flags and heartbeats.
    pub slots: [Arc<SlotShared>; 2],
    /// Per-slot audio ring accounting.
    pub audio: [Arc<AudioRingCounters>; 2],
    /// Per-slot command ring accounting.
    pub commands: [Arc<CommandRingCounters>; 2],
    /// Which slot currently feeds the device.
    pub active_index: Arc<AtomicUsize>,
    /// Whether a switch is staged.
    pub pending_switch: Arc<AtomicBool>,
}

impl StatusHandle {
    /// Gathers a coherent-enough snapshot of all counters.
    pub fn snapshot(&self) -> StatusSnapshot {
        let slot = |i: usize| SlotSnapshot {
            heartbeat: self.slots[i].heartbeat.load(Ordering::Relaxed),
            prime_ready: self.slots[i].prime_ready.load(Ordering::Relaxed),
            ring_occupancy: self.slots[i].ring_occupancy.load(Ordering::Relaxed),
            patch_errors: self.slots[i].patch_errors.load(Ordering::Relaxed),
            last_sequence: self.audio[i].last_sequence.load(Ordering::Relaxed),
            writes_dropped: self.audio[i].writes_dropped.load(Ordering::Relaxed),
            none_reads: self.audio[i].none_reads.load(Ordering::Relaxed),
            blocks_skipped: self.audio[i].blocks_skipped.load(Ordering::Relaxed),
            commands_sent: self.commands[i].sent.load(Ordering::Relaxed),
            commands_dropped: self.commands[i].dropped.load(Ordering::Relaxed),
            gate_drops: self.commands[i].gate_drops.load(Ordering::Relaxed),
        };
        StatusSnapshot {
            active_slot: self.active_index.load(Ordering::Acquire),
            pending_switch: self.pending_switch.load(Ordering::Relaxed),
            commits: self.engine.commits.load(Ordering::Relaxed),
            aborts: self.engine.aborts.load(Ordering::Relaxed),
            prime_timeouts: self.engine.prime_timeouts.load(Ordering::Relaxed),
            failovers: self.engine.failovers.load(Ordering::Relaxed),
            respawns: self.engine.respawns.load(Ordering::Relaxed),
            switches: self.engine.switches.load(Ordering::Relaxed),
            malformed_messages: self.engine.malformed_messages.load(Ordering::Relaxed),
            slots: [slot(0), slot(1)],
        }
    }
}

/// Point-in-time view of one slot.
#[derive(Debug, Clone, Serialize)]
pub struct SlotSnapshot {
    /// Blocks produced by the slot's workers.
    pub heartbeat: u64,
    /// Whether the slot is primed and switch-eligible.
    pub prime_ready: bool,
    /// Ring occupancy as last published by the worker.
    pub ring_occupancy: u64,
    /// Patch edits the worker rejected.
    pub patch_errors: u64,
    /// Last sequence number the consumer returned.
    pub last_sequence: u64,
    /// Producer writes refused by a full ring.
    pub writes_dropped: u64,
    /// Callback reads that fell back to last-good.
    pub none_reads: u64,
    /// Blocks discarded by latest-wins.
    pub blocks_skipped: u64,
    /// Commands delivered into the ring.
    pub commands_sent: u64,
    /// Commands dropped by backpressure.
    pub commands_dropped: u64,
    /// Gates that could not be queued (should stay 0).
    pub gate_drops: u64,
}

/// Point-in-time view of the whole engine, serialized for
/// `/engine/status`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    /// Slot currently feeding the device.
    pub active_slot: usize,
    /// Whether a switch is staged.
    pub pending_switch: bool,
    /// Successful commits.
    pub commits: u64,
    /// Controller-requested aborts.
    pub aborts: u64,
    /// Prime waits that timed out.
    pub prime_timeouts: u64,
    /// Active-slot failures handled.
    pub failovers: u64,
    /// Replacement workers spawned.
    pub respawns: u64,
    /// Active-index flips.
    pub switches: u64,
    /// Malformed control messages dropped.
    pub malformed_messages: u64,
    /// Per-slot detail.
    pub slots: [SlotSnapshot; 2],
}
