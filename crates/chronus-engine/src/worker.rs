//! Slot worker: renders the patch against a deadline anchor.
//!
//! One worker thread per slot. The loop carries the runtime's whole timing
//! behavior:
//!
//! 1. drain the command ring into the host FIFO,
//! 2. process at most one patch transaction,
//! 3. produce blocks while behind the frame-index deadline, bounded by the
//!    catch-up budget and ring-occupancy backpressure,
//! 4. coarse-sleep to the next deadline, spinning the last stretch.
//!
//! Deadlines are computed from a fixed anchor time and a block index —
//! never by accumulating deltas — so timing error does not drift. After a
//! severe stall the anchor is reset instead of letting catch-up spiral.
//!
//! The loop body runs under `catch_unwind`: a panicking module tears down
//! this worker only, the supervisor sees the crash flag and fails over.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use chronus_core::{ModuleHost, rms};
use chronus_registry::ModuleRegistry;
use chronus_transport::{
    AudioRingProducer, CommandReceiver, PatchOp, PatchReceiver, PrimeOp,
};

use crate::slot::{SlotShared, WorkerFlags};

/// Busy-wait window before a deadline; everything earlier is slept.
const SPIN_WINDOW: Duration = Duration::from_millis(1);

/// Pause when the loop has nothing to wait for (backpressured or mid
/// catch-up) so it never degenerates into a pure spin.
const BACKOFF: Duration = Duration::from_micros(200);

/// Extra lag tolerated beyond the catch-up budget before re-anchoring.
const ANCHOR_GRACE: Duration = Duration::from_millis(5);

/// A warmup quieter than this RMS is considered silent.
const WARMUP_RMS_THRESHOLD: f32 = 1e-4;

/// Everything a worker owns, handed over at spawn.
pub struct WorkerContext {
    /// Slot this worker renders for.
    pub slot_index: usize,
    /// Block size B in samples.
    pub block_size: usize,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Stop producing at this ring occupancy.
    pub lead_target: usize,
    /// Max blocks produced per loop iteration.
    pub max_catchup: u32,
    /// Produce this early relative to the deadline.
    pub early_margin: Duration,
    /// Slot state shared with supervisor and callback.
    pub shared: Arc<SlotShared>,
    /// This worker's lifecycle flags (fresh per spawn).
    pub flags: Arc<WorkerFlags>,
    /// Producer half of the slot's audio ring.
    pub audio: AudioRingProducer,
    /// Consumer half of the slot's command ring.
    pub commands: CommandReceiver,
    /// Receiver half of the slot's patch queue.
    pub patches: PatchReceiver,
    /// Module factories.
    pub registry: Arc<ModuleRegistry>,
    /// Committed patch replayed before the loop starts, so a fresh worker
    /// converges to lockstep with the rest of the engine.
    pub replay: Vec<PatchOp>,
}

enum Exit {
    Shutdown,
    Killed,
}

/// Thread entry point. Catches panics and publishes the crash flag.
pub fn run(ctx: WorkerContext) {
    let slot = ctx.slot_index;
    let flags = Arc::clone(&ctx.flags);
    match catch_unwind(AssertUnwindSafe(|| run_loop(ctx))) {
        Ok(Exit::Shutdown) => tracing::info!(slot, "worker exited cleanly"),
        Ok(Exit::Killed) => {
            flags.crashed.store(true, Ordering::Release);
            tracing::warn!(slot, "worker killed");
        }
        Err(_) => {
            flags.crashed.store(true, Ordering::Release);
            tracing::error!(slot, "worker panicked");
        }
    }
}

fn run_loop(mut ctx: WorkerContext) -> Exit {
    let mut state = WorkerState {
        host: ModuleHost::new(ctx.sample_rate as f32, ctx.block_size),
        committed: Vec::new(),
        staged: Vec::new(),
        last_prime: None,
    };

    for op in std::mem::take(&mut ctx.replay) {
        state.apply(&mut ctx, op);
    }

    let period = Duration::from_secs_f64(ctx.block_size as f64 / f64::from(ctx.sample_rate));
    let mut anchor = Instant::now();
    let mut produced: u64 = 0;

    loop {
        ctx.shared.liveness.fetch_add(1, Ordering::Release);
        if ctx.flags.stop.load(Ordering::Acquire) {
            return Exit::Shutdown;
        }
        if ctx.flags.kill.load(Ordering::Acquire) {
            return Exit::Killed;
        }

        // 1. Commands land in the FIFO; they apply at the next block.
        while let Some(record) = ctx.commands.read() {
            state.host.enqueue(record);
        }

        // 2. At most one patch transaction per iteration.
        if let Some(op) = ctx.patches.read() {
            let reanchor = matches!(op, PatchOp::Prime { .. } | PatchOp::Abort);
            state.apply(&mut ctx, op);
            if reanchor {
                // Priming rendered outside the pacing contract.
                anchor = Instant::now();
                produced = 0;
            }
        }

        // 3. Produce while behind the anchored deadline.
        let mut catchup = 0u32;
        while catchup < ctx.max_catchup {
            let now = Instant::now();
            let next = deadline(anchor, period, produced + 1);
            if next
                .checked_duration_since(now)
                .is_some_and(|early| early > ctx.early_margin)
            {
                break;
            }
            if ctx.audio.occupancy() >= ctx.lead_target {
                // Wanted to produce, could not: one dropped write from the
                // scheduler's point of view. Skip this deadline entirely so
                // the drop is counted once per block period, not per wake.
                ctx.audio
                    .counters()
                    .writes_dropped
                    .fetch_add(1, Ordering::Relaxed);
                produced += 1;
                break;
            }
            let block = state.host.process_chain();
            if ctx.audio.write(block).is_err() {
                produced += 1;
                break;
            }
            produced += 1;
            catchup += 1;
            ctx.shared.heartbeat.fetch_add(1, Ordering::Release);
        }
        // A backpressured standby still tracks the control plane: its FIFO
        // must land on the modules so a failover wakes up with current
        // parameters, not minutes-old ones.
        if catchup == 0 {
            state.host.apply_pending();
        }
        ctx.shared
            .ring_occupancy
            .store(ctx.audio.occupancy() as u64, Ordering::Relaxed);

        // 4. Re-anchor after a stall the catch-up budget cannot absorb.
        let now = Instant::now();
        let next = deadline(anchor, period, produced + 1);
        if now
            .checked_duration_since(next)
            .is_some_and(|lag| lag > period * ctx.max_catchup + ANCHOR_GRACE)
        {
            anchor = now;
            produced = 0;
        }

        // 5. Sleep coarse, spin the last stretch.
        let target = deadline(anchor, period, produced + 1) - ctx.early_margin;
        let now = Instant::now();
        match target.checked_duration_since(now) {
            Some(wait) if wait > SPIN_WINDOW => {
                std::thread::sleep(wait - SPIN_WINDOW);
                while Instant::now() < target {
                    std::hint::spin_loop();
                }
            }
            Some(_) => {
                while Instant::now() < target {
                    std::hint::spin_loop();
                }
            }
            // Already past the target (backpressured or catching up):
            // yield briefly rather than spinning the core.
            None => std::thread::sleep(BACKOFF),
        }
    }
}

#[inline]
fn deadline(anchor: Instant, period: Duration, n: u64) -> Instant {
    anchor + Duration::from_secs_f64(period.as_secs_f64() * n as f64)
}

/// Patch-plane state: the live host plus the logs needed to rebuild the
/// committed patch on abort.
struct WorkerState {
    host: ModuleHost,
    /// Structural edits of the committed patch, in order.
    committed: Vec<PatchOp>,
    /// Structural edits applied since the last successful prime.
    staged: Vec<PatchOp>,
    /// Prime transaction of the committed patch.
    last_prime: Option<(Vec<PrimeOp>, u32)>,
}

impl WorkerState {
    fn apply(&mut self, ctx: &mut WorkerContext, op: PatchOp) {
        match op {
            PatchOp::Create { id, type_name } => match ctx.registry.create(&type_name) {
                Ok(module) => match self.host.add_module(id, module) {
                    Ok(()) => self.staged.push(PatchOp::Create { id, type_name }),
                    Err(e) => reject(ctx, "create", &e.to_string()),
                },
                Err(e) => reject(ctx, "create", &e.to_string()),
            },
            PatchOp::Connect { src, dst } => match self.host.connect(src, dst) {
                Ok(()) => self.staged.push(PatchOp::Connect { src, dst }),
                Err(e) => reject(ctx, "connect", &e.to_string()),
            },
            PatchOp::Disconnect { src, dst } => match self.host.disconnect(src, dst) {
                Ok(()) => self.staged.push(PatchOp::Disconnect { src, dst }),
                Err(e) => reject(ctx, "disconnect", &e.to_string()),
            },
            PatchOp::Delete { id } => match self.host.remove_module(id) {
                Ok(()) => self.staged.push(PatchOp::Delete { id }),
                Err(e) => reject(ctx, "delete", &e.to_string()),
            },
            PatchOp::Prime {
                ops,
                warmup_blocks,
                verify_audible,
            } => self.prime(ctx, ops, warmup_blocks, verify_audible),
            PatchOp::Commit => {
                // Priming already did the work; the marker is kept so the
                // flow reads the same with or without decoupled priming.
            }
            PatchOp::Abort => self.abort(ctx),
        }
    }

    /// Applies initial params/gates, renders warmup into the ring and the
    /// last-good buffer, verifies audibility if asked, and publishes
    /// prime-ready.
    fn prime(
        &mut self,
        ctx: &mut WorkerContext,
        ops: Vec<PrimeOp>,
        warmup_blocks: u32,
        verify_audible: bool,
    ) {
        ctx.shared.prime_silent.store(false, Ordering::Release);
        for op in &ops {
            self.apply_prime_op(ctx, op);
        }

        let mut max_rms = 0.0f32;
        for _ in 0..warmup_blocks {
            let block = self.host.process_chain();
            max_rms = max_rms.max(rms(block));
            let _ = ctx.audio.write(block);
            ctx.shared.heartbeat.fetch_add(1, Ordering::Release);
        }

        // Only a prime that promised audible state is held to it; a bare
        // commit's warmup may be legitimately silent (gated patches).
        if verify_audible && warmup_blocks > 0 && max_rms < WARMUP_RMS_THRESHOLD {
            ctx.shared.prime_silent.store(true, Ordering::Release);
            tracing::warn!(
                slot = ctx.slot_index,
                rms = max_rms,
                "prime warmup silent, prime-ready withheld"
            );
            return;
        }

        self.committed.append(&mut self.staged);
        self.last_prime = Some((ops, warmup_blocks));
        ctx.shared.prime_ready.store(true, Ordering::Release);
        tracing::debug!(slot = ctx.slot_index, warmup_blocks, "slot primed");
    }

    fn apply_prime_op(&mut self, ctx: &WorkerContext, op: &PrimeOp) {
        let applied = match op {
            PrimeOp::Set {
                module,
                param,
                value,
            } => self
                .host
                .set_param_immediate(*module, param.as_str(), *value as f32),
            PrimeOp::Gate { module, on } => self.host.set_gate(*module, *on),
        };
        if !applied {
            ctx.shared.patch_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Drops the patch under construction and rebuilds the committed one.
    fn abort(&mut self, ctx: &mut WorkerContext) {
        ctx.shared.prime_ready.store(false, Ordering::Release);
        self.staged.clear();
        self.host.clear();

        let committed = std::mem::take(&mut self.committed);
        for op in &committed {
            self.apply_structural(ctx, op);
        }
        self.committed = committed;

        if let Some((ops, warmup_blocks)) = self.last_prime.clone() {
            for op in &ops {
                self.apply_prime_op(ctx, op);
            }
            for _ in 0..warmup_blocks {
                let block = self.host.process_chain();
                let _ = ctx.audio.write(block);
                ctx.shared.heartbeat.fetch_add(1, Ordering::Release);
            }
            ctx.shared.prime_ready.store(true, Ordering::Release);
        }
        tracing::info!(slot = ctx.slot_index, "patch aborted, committed state rebuilt");
    }

    /// Replays one structural edit without touching the staged log.
    fn apply_structural(&mut self, ctx: &WorkerContext, op: &PatchOp) {
        let outcome = match op {
            PatchOp::Create { id, type_name } => ctx
                .registry
                .create(type_name)
                .map_err(|e| e.to_string())
                .and_then(|m| self.host.add_module(*id, m).map_err(|e| e.to_string())),
            PatchOp::Connect { src, dst } => {
                self.host.connect(*src, *dst).map_err(|e| e.to_string())
            }
            PatchOp::Disconnect { src, dst } => {
                self.host.disconnect(*src, *dst).map_err(|e| e.to_string())
            }
            PatchOp::Delete { id } => self.host.remove_module(*id).map_err(|e| e.to_string()),
            _ => Ok(()),
        };
        if let Err(e) = outcome {
            // Rebuild failures mean the committed log itself is damaged;
            // count loudly, keep going with what applies.
            ctx.shared.patch_errors.fetch_add(1, Ordering::Relaxed);
            tracing::error!(slot = ctx.slot_index, error = %e, "committed replay failed");
        }
    }
}

fn reject(ctx: &WorkerContext, kind: &str, error: &str) {
    ctx.shared.patch_errors.fetch_add(1, Ordering::Relaxed);
    tracing::warn!(slot = ctx.slot_index, kind, error, "patch edit rejected");
}
