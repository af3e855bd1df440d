//! Dual-slot supervisor: command broadcast, patch dispatch, commit
//! orchestration, and failover.
//!
//! The supervisor owns both slots and everything the control plane is
//! allowed to touch. It never renders audio and never runs on the audio
//! thread; the only thing it shares with the device callback is the pair
//! of atomics (`active_index`, `pending_switch`), the slot state, and the
//! consumer-swap channel.
//!
//! Role rules:
//!
//! - Parameter and gate commands broadcast to **both** command rings so the
//!   standby stays in lockstep.
//! - Patch edits go only to the **standby** slot's queue; commit primes the
//!   standby, then stages the switch for the callback to perform at a block
//!   boundary.
//! - The monitor watches liveness (thread exit, crash flag, stalled loop)
//!   and answers with a switch or a respawn. Respawned workers replay the
//!   committed patch plus the latest broadcast state, so a fresh standby
//!   converges back to lockstep.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use chronus_core::{CommandRecord, CommandValue, Ident, Opcode};
use chronus_registry::ModuleRegistry;
use chronus_transport::{PatchOp, PrimeOp};
use crossbeam_channel::Sender;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::feed::{ConsumerSwap, OutputFeed};
use crate::slot::Slot;
use crate::status::{StatusCounters, StatusHandle};

/// Monitor cadence.
pub const MONITOR_PERIOD: Duration = Duration::from_millis(2);

/// Floor for the stall timeout; large blocks stretch it (the worker's
/// loop legitimately sleeps most of a block period).
const STALL_TIMEOUT_FLOOR: Duration = Duration::from_millis(15);

/// Stall detection is suppressed this long after a spawn, while the OS
/// schedules the new thread and the replay renders.
const SPAWN_GRACE: Duration = Duration::from_millis(100);

/// How long a retiring worker gets to drain before its handle is dropped.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Explicit result of a commit attempt; the control plane matches on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The standby primed; the switch is staged for the callback.
    Ready,
    /// The standby rejected edits during the commit window.
    Invalid(String),
    /// A verified prime rendered silence; the patch is left for inspection.
    Silent,
    /// The standby never published prime-ready; the old active stays.
    Timeout,
}

/// Owns both slots and the control plane.
pub struct Supervisor {
    config: EngineConfig,
    registry: Arc<ModuleRegistry>,
    slots: [Slot; 2],
    active_index: Arc<AtomicUsize>,
    pending_switch: Arc<AtomicBool>,
    status: Arc<StatusCounters>,
    swaps: Sender<ConsumerSwap>,
    /// Structural edits of the committed patch, in order.
    committed_edits: Vec<PatchOp>,
    /// Structural edits sent to the standby since the last commit.
    staged_edits: Vec<PatchOp>,
    /// Latest broadcast value per `(module, param)`.
    param_state: Vec<(Ident, Ident, f64)>,
    /// Latest broadcast gate per module.
    gate_state: Vec<(Ident, bool)>,
    /// Active index the monitor last acted on.
    last_active: usize,
    /// Liveness stall budget: `max(15 ms, 3 × block period)`.
    stall_timeout: Duration,
}

impl Supervisor {
    /// Spawns both workers and builds the output feed.
    pub fn new(
        config: EngineConfig,
        registry: ModuleRegistry,
    ) -> Result<(Self, OutputFeed), EngineError> {
        config.validate()?;
        let registry = Arc::new(registry);
        let active_index = Arc::new(AtomicUsize::new(0));
        let pending_switch = Arc::new(AtomicBool::new(false));
        let status = Arc::new(StatusCounters::default());
        let (swap_tx, swap_rx) = crossbeam_channel::bounded(8);

        let (slot0, consumer0) = Slot::spawn(0, &config, Arc::clone(&registry), Vec::new())?;
        let (slot1, consumer1) = Slot::spawn(1, &config, Arc::clone(&registry), Vec::new())?;

        let feed = OutputFeed::new(
            [consumer0, consumer1],
            [Arc::clone(&slot0.shared), Arc::clone(&slot1.shared)],
            Arc::clone(&active_index),
            Arc::clone(&pending_switch),
            Arc::clone(&status),
            swap_rx,
            config.block_size,
            config.keep_after_read,
        );

        let stall_timeout = STALL_TIMEOUT_FLOOR.max(config.block_period() * 3);
        Ok((
            Self {
                config,
                registry,
                slots: [slot0, slot1],
                active_index,
                pending_switch,
                status,
                swaps: swap_tx,
                committed_edits: Vec::new(),
                staged_edits: Vec::new(),
                param_state: Vec::new(),
                gate_state: Vec::new(),
                last_active: 0,
                stall_timeout,
            },
            feed,
        ))
    }

    /// The slot currently feeding the device.
    pub fn active_index(&self) -> usize {
        self.active_index.load(Ordering::Acquire)
    }

    /// The slot accepting patch edits.
    pub fn standby_index(&self) -> usize {
        1 - self.active_index()
    }

    /// Read-only counters for the control transport.
    pub fn status_handle(&self) -> StatusHandle {
        StatusHandle {
            engine: Arc::clone(&self.status),
            slots: [
                Arc::clone(&self.slots[0].shared),
                Arc::clone(&self.slots[1].shared),
            ],
            audio: [
                Arc::clone(&self.slots[0].audio_counters),
                Arc::clone(&self.slots[1].audio_counters),
            ],
            commands: [
                Arc::clone(&self.slots[0].command_counters),
                Arc::clone(&self.slots[1].command_counters),
            ],
            active_index: Arc::clone(&self.active_index),
            pending_switch: Arc::clone(&self.pending_switch),
        }
    }

    /// The engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The module registry.
    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    // --- Command plane ---

    /// Broadcasts a parameter/gate command to both slots and records it for
    /// respawn replay.
    pub fn broadcast(&mut self, record: CommandRecord) {
        self.record_state(&record);
        for slot in &mut self.slots {
            slot.commands.send(record);
        }
    }

    fn record_state(&mut self, record: &CommandRecord) {
        match record.op {
            Opcode::Set => {
                let value = match record.value {
                    CommandValue::Float(v) => v,
                    CommandValue::Int(v) => v as f64,
                    CommandValue::Bool(v) => f64::from(u8::from(v)),
                };
                if let Some(entry) = self
                    .param_state
                    .iter_mut()
                    .find(|(m, p, _)| *m == record.module && *p == record.param)
                {
                    entry.2 = value;
                } else {
                    self.param_state.push((record.module, record.param, value));
                }
            }
            Opcode::Gate => {
                let on = record.value.as_gate();
                if let Some(entry) = self
                    .gate_state
                    .iter_mut()
                    .find(|(m, _)| *m == record.module)
                {
                    entry.1 = on;
                } else {
                    self.gate_state.push((record.module, on));
                }
            }
            Opcode::PatchSignal => {}
        }
    }

    // --- Patch plane ---

    /// Queues a structural edit on the standby slot.
    pub fn queue_patch(&mut self, op: PatchOp) -> bool {
        // Fold in a just-completed switch first, so the edit lands on the
        // real standby and not on a worker about to be retired.
        let _ = self.monitor();
        let standby = self.standby_index();
        let record = matches!(
            op,
            PatchOp::Create { .. }
                | PatchOp::Connect { .. }
                | PatchOp::Disconnect { .. }
                | PatchOp::Delete { .. }
        );
        if record {
            self.staged_edits.push(op.clone());
        }
        self.slots[standby].patches.send(op)
    }

    /// Primes the standby and stages the switch.
    ///
    /// Blocks the control plane (never the audio path) for at most the
    /// prime timeout, running the monitor at its normal cadence while
    /// waiting.
    pub fn commit(&mut self) -> CommitOutcome {
        let _ = self.monitor();
        let standby = self.standby_index();
        let shared = Arc::clone(&self.slots[standby].shared);
        shared.prime_ready.store(false, Ordering::Release);
        let errors_before = shared.patch_errors.load(Ordering::Relaxed);

        self.slots[standby].patches.send(PatchOp::Prime {
            ops: Vec::new(),
            warmup_blocks: self.config.prefill_buffers,
            verify_audible: false,
        });
        self.slots[standby].patches.send(PatchOp::Commit);

        let deadline = Instant::now() + self.config.prime_timeout;
        while Instant::now() < deadline {
            if shared.prime_ready.load(Ordering::Acquire) {
                self.committed_edits.append(&mut self.staged_edits);
                self.status.commits.fetch_add(1, Ordering::Relaxed);
                self.pending_switch.store(true, Ordering::Release);
                tracing::info!(standby, "commit primed, switch staged");
                return CommitOutcome::Ready;
            }
            let _ = self.monitor();
            std::thread::sleep(MONITOR_PERIOD);
        }

        self.pending_switch.store(false, Ordering::Release);
        self.status.prime_timeouts.fetch_add(1, Ordering::Relaxed);
        if shared.prime_silent.load(Ordering::Acquire) {
            tracing::warn!(standby, "commit failed: warmup silent");
            return CommitOutcome::Silent;
        }
        if shared.patch_errors.load(Ordering::Relaxed) > errors_before {
            tracing::warn!(standby, "commit failed: edits rejected");
            return CommitOutcome::Invalid("patch edits rejected by standby".into());
        }
        // Old active stays; the standby's pending patch is abandoned.
        tracing::warn!(standby, "commit failed: prime timeout");
        self.slots[standby].patches.send(PatchOp::Abort);
        self.staged_edits.clear();
        CommitOutcome::Timeout
    }

    /// Discards the standby's patch under construction.
    pub fn abort(&mut self) {
        let standby = self.standby_index();
        self.slots[standby].patches.send(PatchOp::Abort);
        self.staged_edits.clear();
        self.status.aborts.fetch_add(1, Ordering::Relaxed);
    }

    // --- Failure plane ---

    /// Injects a crash into a worker (failover drills and tests).
    pub fn kill_worker(&self, slot: usize) {
        if slot < 2 {
            self.slots[slot].kill();
        }
    }

    /// One monitor tick: retire switched-away slots, detect dead or hung
    /// workers, respawn replacements.
    pub fn monitor(&mut self) -> Result<(), EngineError> {
        for slot in &mut self.slots {
            slot.commands.flush_stage();
        }

        // A completed switch retires the old active slot.
        let active = self.active_index();
        if active != self.last_active {
            let old = self.last_active;
            self.last_active = active;
            tracing::info!(from = old, to = active, "active slot switched");
            self.slots[old].begin_shutdown();
            self.respawn_slot(old)?;
        }

        let now = Instant::now();
        for index in 0..2 {
            let slot = &mut self.slots[index];
            let liveness = slot.shared.liveness.load(Ordering::Acquire);
            if liveness != slot.last_liveness {
                slot.last_liveness = liveness;
                slot.last_liveness_change = now;
            }
            let in_grace = slot.spawned_at.elapsed() < SPAWN_GRACE;
            let stalled = !in_grace
                && now.duration_since(slot.last_liveness_change) > self.stall_timeout;
            let dead = slot.worker_flags.crashed.load(Ordering::Acquire)
                || (slot.worker_finished() && !in_grace);
            if !(dead || stalled) {
                continue;
            }

            tracing::error!(slot = index, dead, stalled, "worker failure detected");
            if index == active {
                self.status.failovers.fetch_add(1, Ordering::Relaxed);
                let standby = 1 - index;
                let standby_ready = self.slots[standby].shared.prime_ready.load(Ordering::Acquire)
                    && !self.slots[standby]
                        .worker_flags
                        .crashed
                        .load(Ordering::Acquire)
                    && !self.slots[standby].worker_finished();
                if standby_ready {
                    // The callback flips at the next block boundary; the
                    // dead slot is retired on a later tick.
                    self.pending_switch.store(true, Ordering::Release);
                } else {
                    // No standby to switch to: rebuild the active in place
                    // and keep the device on last-good until warmup lands.
                    self.pending_switch.store(false, Ordering::Release);
                    self.respawn_slot(index)?;
                }
            } else {
                self.respawn_slot(index)?;
            }
        }
        Ok(())
    }

    /// Spawns a replacement worker into `index` with the committed patch
    /// and the latest broadcast state, and hands the feed its new ring.
    fn respawn_slot(&mut self, index: usize) -> Result<(), EngineError> {
        let replay = self.replay_ops();
        let consumer =
            self.slots[index].respawn(&self.config, Arc::clone(&self.registry), replay)?;
        if self
            .swaps
            .try_send(ConsumerSwap {
                slot: index,
                consumer,
            })
            .is_err()
        {
            // The feed is not draining (device gone); the slot will be
            // rebuilt again when the callback returns.
            tracing::error!(slot = index, "consumer swap channel full");
        }
        self.status.respawns.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// The committed patch plus latest broadcast state, as replay ops.
    fn replay_ops(&self) -> Vec<PatchOp> {
        if self.committed_edits.is_empty() {
            return Vec::new();
        }
        let mut ops = self.committed_edits.clone();
        let mut prime_ops: Vec<PrimeOp> = Vec::with_capacity(
            self.param_state.len() + self.gate_state.len(),
        );
        for (module, param, value) in &self.param_state {
            prime_ops.push(PrimeOp::Set {
                module: *module,
                param: *param,
                value: *value,
            });
        }
        for (module, on) in &self.gate_state {
            prime_ops.push(PrimeOp::Gate {
                module: *module,
                on: *on,
            });
        }
        ops.push(PatchOp::Prime {
            ops: prime_ops,
            warmup_blocks: self.config.prefill_buffers,
            verify_audible: false,
        });
        ops
    }

    /// Cooperative shutdown of both workers with a grace window.
    pub fn shutdown(mut self) {
        for slot in &self.slots {
            slot.begin_shutdown();
        }
        for slot in &mut self.slots {
            let Some(handle) = slot.join.take() else {
                continue;
            };
            let deadline = Instant::now() + SHUTDOWN_GRACE;
            while !handle.is_finished() && Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(5));
            }
            if handle.is_finished() {
                let _ = handle.join();
                tracing::info!(slot = slot.index, "worker joined");
            } else {
                // Threads cannot be force-killed; abandon the handle. The
                // worker owns nothing the process still needs.
                tracing::warn!(slot = slot.index, "worker did not exit in grace window");
            }
        }
    }
}
