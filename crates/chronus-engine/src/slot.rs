//! Slot state: the unit of failover.
//!
//! A slot is the pair of rings plus whichever worker currently owns them.
//! Two kinds of shared state with different lifetimes:
//!
//! - [`SlotShared`] — the slot's observable state (heartbeat, prime-ready,
//!   gauges). Stable `Arc`s held by the feed and the status handle; they
//!   survive every respawn.
//! - [`WorkerFlags`] — one worker's lifecycle (stop, kill, crashed). Fresh
//!   per spawn, so a retiring worker draining toward its stop flag can
//!   never race the replacement worker on the same bits.
//!
//! Rings are rebuilt on every respawn: stale audio from a dead worker must
//! never replay, and the dead thread owns its ring halves anyway.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Instant;

use chronus_registry::ModuleRegistry;
use chronus_transport::{
    AudioRingConsumer, AudioRingCounters, CommandRingCounters, CommandSender, PatchOp,
    PatchSender, audio_ring, command_ring, patch_queue,
};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::worker::{self, WorkerContext};

/// Observable slot state shared with the feed, the monitor, and status.
/// Single-writer per field; all plain atomics.
#[derive(Debug, Default)]
pub struct SlotShared {
    /// Blocks produced (monotonic across respawns).
    pub heartbeat: AtomicU64,
    /// Loop iterations (monotonic); the monitor's liveness signal, which
    /// keeps advancing even while production is backpressured.
    pub liveness: AtomicU64,
    /// The slot's patch is primed and the ring pre-filled.
    pub prime_ready: AtomicBool,
    /// The last verified prime was withheld because its warmup was silent.
    pub prime_silent: AtomicBool,
    /// Ring occupancy as last published by the worker.
    pub ring_occupancy: AtomicU64,
    /// Patch edits the worker rejected (graph invalid, unknown type).
    pub patch_errors: AtomicU64,
}

/// One worker's lifecycle flags; a fresh set is allocated per spawn.
#[derive(Debug, Default)]
pub struct WorkerFlags {
    /// Cooperative shutdown request for this worker only.
    pub stop: AtomicBool,
    /// Crash injection for failover drills: the worker dies on sight.
    pub kill: AtomicBool,
    /// Set by the worker wrapper when it exits abnormally.
    pub crashed: AtomicBool,
}

/// Supervisor-side slot record.
pub struct Slot {
    /// Slot index (0 or 1).
    pub index: usize,
    /// Observable state, stable across respawns.
    pub shared: Arc<SlotShared>,
    /// Audio ring accounting, stable across respawns.
    pub audio_counters: Arc<AudioRingCounters>,
    /// Command ring accounting, stable across respawns.
    pub command_counters: Arc<CommandRingCounters>,
    /// Lifecycle flags of the current worker.
    pub worker_flags: Arc<WorkerFlags>,
    /// Producer half of the current command ring.
    pub commands: CommandSender,
    /// Sender half of the current patch queue.
    pub patches: PatchSender,
    /// Current worker thread.
    pub join: Option<JoinHandle<()>>,
    /// When the current worker was spawned (stall-detection grace).
    pub spawned_at: Instant,
    /// Liveness value last seen by the monitor.
    pub last_liveness: u64,
    /// When the liveness value last changed.
    pub last_liveness_change: Instant,
}

impl Slot {
    /// Creates the slot and spawns its first worker.
    ///
    /// Returns the slot and the consumer half of its audio ring for the
    /// output feed.
    pub fn spawn(
        index: usize,
        config: &EngineConfig,
        registry: Arc<ModuleRegistry>,
        replay: Vec<PatchOp>,
    ) -> Result<(Self, AudioRingConsumer), EngineError> {
        let shared = Arc::new(SlotShared::default());
        let audio_counters = Arc::new(AudioRingCounters::default());
        let command_counters = Arc::new(CommandRingCounters::default());

        let parts = build_worker(
            index,
            config,
            &shared,
            &audio_counters,
            &command_counters,
            registry,
            replay,
        )?;

        let slot = Self {
            index,
            shared,
            audio_counters,
            command_counters,
            worker_flags: parts.flags,
            commands: parts.commands,
            patches: parts.patches,
            join: Some(parts.join),
            spawned_at: Instant::now(),
            last_liveness: 0,
            last_liveness_change: Instant::now(),
        };
        tracing::info!(slot = index, "worker spawned");
        Ok((slot, parts.consumer))
    }

    /// Builds fresh rings, fresh lifecycle flags, and a replacement worker.
    ///
    /// The previous worker (if any) is expected to be dead or draining
    /// toward its own stop flag; its ring halves die with it. Returns the
    /// new consumer half for the feed to swap in.
    pub fn respawn(
        &mut self,
        config: &EngineConfig,
        registry: Arc<ModuleRegistry>,
        replay: Vec<PatchOp>,
    ) -> Result<AudioRingConsumer, EngineError> {
        // New workers start unprimed; heartbeat stays monotonic.
        self.shared.prime_ready.store(false, Ordering::Release);
        self.shared.prime_silent.store(false, Ordering::Release);

        let parts = build_worker(
            self.index,
            config,
            &self.shared,
            &self.audio_counters,
            &self.command_counters,
            registry,
            replay,
        )?;

        self.worker_flags = parts.flags;
        self.commands = parts.commands;
        self.patches = parts.patches;
        self.join = Some(parts.join);
        self.spawned_at = Instant::now();
        self.last_liveness = self.shared.liveness.load(Ordering::Acquire);
        self.last_liveness_change = Instant::now();
        tracing::info!(slot = self.index, "worker respawned");
        Ok(parts.consumer)
    }

    /// Requests cooperative shutdown of the current worker.
    pub fn begin_shutdown(&self) {
        self.worker_flags.stop.store(true, Ordering::Release);
    }

    /// Injects a crash into the current worker (failover drills).
    pub fn kill(&self) {
        self.worker_flags.kill.store(true, Ordering::Release);
    }

    /// Whether the current worker thread has exited.
    pub fn worker_finished(&self) -> bool {
        self.join.as_ref().is_none_or(|j| j.is_finished())
    }
}

struct WorkerParts {
    flags: Arc<WorkerFlags>,
    commands: CommandSender,
    patches: PatchSender,
    join: JoinHandle<()>,
    consumer: AudioRingConsumer,
}

/// Creates rings, flags, and a worker thread wired to the slot state.
fn build_worker(
    index: usize,
    config: &EngineConfig,
    shared: &Arc<SlotShared>,
    audio_counters: &Arc<AudioRingCounters>,
    command_counters: &Arc<CommandRingCounters>,
    registry: Arc<ModuleRegistry>,
    replay: Vec<PatchOp>,
) -> Result<WorkerParts, EngineError> {
    let (audio_tx, audio_rx) = audio_ring(
        config.num_buffers,
        config.block_size,
        Arc::clone(audio_counters),
    )?;
    let (cmd_tx, cmd_rx) = command_ring(
        chronus_transport::DEFAULT_COMMAND_CAPACITY,
        Arc::clone(command_counters),
    )?;
    let (patch_tx, patch_rx) = patch_queue(chronus_transport::DEFAULT_PATCH_CAPACITY);
    let flags = Arc::new(WorkerFlags::default());

    let context = WorkerContext {
        slot_index: index,
        block_size: config.block_size,
        sample_rate: config.sample_rate,
        // The consumer never drains below its cushion, so the production
        // lead is measured on top of it; at exactly keep_after_read the
        // ring would deadlock with the reader.
        lead_target: config.keep_after_read + config.lead_target,
        max_catchup: config.max_catchup,
        early_margin: config.early_margin,
        shared: Arc::clone(shared),
        flags: Arc::clone(&flags),
        audio: audio_tx,
        commands: cmd_rx,
        patches: patch_rx,
        registry,
        replay,
    };

    let join = std::thread::Builder::new()
        .name(format!("chronus-worker-{index}"))
        .spawn(move || worker::run(context))
        .map_err(|e| EngineError::Unrecoverable(format!("worker spawn failed: {e}")))?;

    Ok(WorkerParts {
        flags,
        commands: cmd_tx,
        patches: patch_tx,
        join,
        consumer: audio_rx,
    })
}
