//! Lock-free SPSC command ring with producer-side coalescing.
//!
//! One ring per slot carries [`CommandRecord`]s from the control dispatcher
//! to the worker. The worker drains it fully at every block boundary, so in
//! steady state the ring never fills. Under a control burst the producer
//! applies the backpressure policy *before* dropping anything:
//!
//! - `Set` records coalesce latest-wins per `(module, param)` key in a
//!   small overflow stage.
//! - `Gate` records are never coalesced; if the stage is also full, a gate
//!   displaces the oldest staged non-gate record. A gate that still cannot
//!   be queued increments `gate_drops` (zero in a healthy system).
//!
//! The stage drains ahead of every subsequent write, so per-producer FIFO
//! order is preserved for everything that was not coalesced away.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chronus_core::{CommandRecord, Opcode};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use crate::TransportError;

/// Default command ring capacity in records.
pub const DEFAULT_COMMAND_CAPACITY: usize = 64;

/// Overflow stage size; sized so a full ring plus a worst-case burst of
/// distinct keys still coalesces rather than drops.
const STAGE_CAPACITY: usize = 32;

/// Shared accounting for one command ring; owned by the slot so it
/// survives worker respawns.
#[derive(Debug, Default)]
pub struct CommandRingCounters {
    /// Records accepted into the ring.
    pub sent: AtomicU64,
    /// `Set` records merged away by latest-wins coalescing.
    pub coalesced: AtomicU64,
    /// Non-gate records displaced from the stage by a gate.
    pub displaced: AtomicU64,
    /// Records dropped outright (stage exhausted).
    pub dropped: AtomicU64,
    /// Gate records that could not be queued at all.
    pub gate_drops: AtomicU64,
}

/// Control-plane half: writes commands with the coalescing policy.
pub struct CommandSender {
    prod: HeapProd<CommandRecord>,
    stage: VecDeque<CommandRecord>,
    counters: Arc<CommandRingCounters>,
}

impl CommandSender {
    /// Queues a command, applying the overflow policy when the ring is
    /// observed full. Never blocks.
    pub fn send(&mut self, record: CommandRecord) {
        self.flush_stage();
        if self.stage.is_empty() && self.prod.try_push(record).is_ok() {
            self.counters.sent.fetch_add(1, Ordering::Relaxed);
            return;
        }

        match record.op {
            Opcode::Set => {
                if let Some(staged) = self
                    .stage
                    .iter_mut()
                    .find(|r| r.op == Opcode::Set && r.key() == record.key())
                {
                    *staged = record;
                    self.counters.coalesced.fetch_add(1, Ordering::Relaxed);
                } else if self.stage.len() < STAGE_CAPACITY {
                    self.stage.push_back(record);
                } else {
                    self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(
                        module = %record.module,
                        param = %record.param,
                        "set command dropped, stage exhausted"
                    );
                }
            }
            Opcode::Gate => {
                if self.stage.len() < STAGE_CAPACITY {
                    self.stage.push_back(record);
                } else if let Some(pos) = self.stage.iter().position(|r| r.op != Opcode::Gate) {
                    let _ = self.stage.remove(pos);
                    self.stage.push_back(record);
                    self.counters.displaced.fetch_add(1, Ordering::Relaxed);
                } else {
                    // Gates must not vanish silently; this is zero in any
                    // healthy system.
                    self.counters.gate_drops.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(module = %record.module, "gate command dropped, ring and stage full");
                }
            }
            Opcode::PatchSignal => {
                if self.stage.len() < STAGE_CAPACITY {
                    self.stage.push_back(record);
                } else {
                    self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(module = %record.module, "command dropped, stage exhausted");
                }
            }
        }
    }

    /// Moves staged records into the ring while there is room.
    pub fn flush_stage(&mut self) {
        while let Some(&front) = self.stage.front() {
            if self.prod.try_push(front).is_err() {
                return;
            }
            self.stage.pop_front();
            self.counters.sent.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Records currently pending in the ring (not counting the stage).
    pub fn occupancy(&self) -> usize {
        self.prod.occupied_len()
    }

    /// Records held in the overflow stage.
    pub fn staged(&self) -> usize {
        self.stage.len()
    }

    /// The shared counters for this ring.
    pub fn counters(&self) -> &Arc<CommandRingCounters> {
        &self.counters
    }
}

/// Worker-side half: drains commands at block boundaries.
pub struct CommandReceiver {
    cons: HeapCons<CommandRecord>,
}

impl CommandReceiver {
    /// Pops the next pending command.
    #[inline]
    pub fn read(&mut self) -> Option<CommandRecord> {
        self.cons.try_pop()
    }

    /// Whether any command is pending.
    #[inline]
    pub fn has_data(&self) -> bool {
        !self.cons.is_empty()
    }

    /// Discards everything pending.
    pub fn reset(&mut self) {
        while self.cons.try_pop().is_some() {}
    }
}

/// Builds a command ring of `capacity` records with the slot's stable
/// `counters`.
pub fn command_ring(
    capacity: usize,
    counters: Arc<CommandRingCounters>,
) -> Result<(CommandSender, CommandReceiver), TransportError> {
    if capacity < 2 {
        return Err(TransportError::BadRingCapacity(capacity));
    }
    let rb = HeapRb::<CommandRecord>::new(capacity);
    let (prod, cons) = rb.split();
    Ok((
        CommandSender {
            prod,
            stage: VecDeque::with_capacity(STAGE_CAPACITY),
            counters,
        },
        CommandReceiver { cons },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronus_core::{CommandValue, Ident};

    fn id(s: &str) -> Ident {
        Ident::new(s).unwrap()
    }

    fn set(module: &str, param: &str, v: f64) -> CommandRecord {
        CommandRecord::set(id(module), id(param), CommandValue::Float(v))
    }

    fn pair(capacity: usize) -> (CommandSender, CommandReceiver) {
        command_ring(capacity, Arc::default()).unwrap()
    }

    #[test]
    fn fifo_order_preserved() {
        let (mut tx, mut rx) = pair(8);
        tx.send(set("osc1", "freq", 440.0));
        tx.send(CommandRecord::gate(id("env1"), true));
        tx.send(set("osc1", "gain", 0.5));

        assert_eq!(rx.read().unwrap().param, "freq");
        assert_eq!(rx.read().unwrap().op, Opcode::Gate);
        assert_eq!(rx.read().unwrap().param, "gain");
        assert!(rx.read().is_none());
        assert!(!rx.has_data());
    }

    #[test]
    fn full_ring_coalesces_sets_by_key() {
        let (mut tx, mut rx) = pair(2);
        tx.send(set("a", "x", 1.0));
        tx.send(set("a", "x", 2.0)); // ring full from here
        tx.send(set("a", "x", 3.0)); // staged
        tx.send(set("a", "x", 4.0)); // coalesces onto the staged record

        assert_eq!(tx.counters().coalesced.load(Ordering::Relaxed), 1);

        // Drain: the two ring records, then the coalesced survivor.
        let mut seen = Vec::new();
        loop {
            tx.flush_stage();
            match rx.read() {
                Some(r) => seen.push(r.value),
                None if tx.staged() == 0 => break,
                None => {}
            }
        }
        assert_eq!(
            seen,
            vec![
                CommandValue::Float(1.0),
                CommandValue::Float(2.0),
                CommandValue::Float(4.0)
            ]
        );
    }

    #[test]
    fn distinct_keys_not_coalesced() {
        let (mut tx, _rx) = pair(2);
        tx.send(set("a", "x", 1.0));
        tx.send(set("a", "y", 2.0));
        tx.send(set("a", "x", 3.0)); // staged, key (a, x)
        tx.send(set("a", "y", 4.0)); // staged, key (a, y) — distinct
        assert_eq!(tx.staged(), 2);
        assert_eq!(tx.counters().coalesced.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn gate_displaces_oldest_staged_set() {
        let (mut tx, _rx) = pair(2);
        // Fill the ring.
        tx.send(set("a", "p0", 0.0));
        tx.send(set("a", "p1", 1.0));
        // Fill the stage with distinct keys.
        for i in 0..STAGE_CAPACITY {
            tx.send(set("a", &format!("q{i}"), i as f64));
        }
        assert_eq!(tx.staged(), STAGE_CAPACITY);

        tx.send(CommandRecord::gate(id("env1"), true));
        assert_eq!(tx.staged(), STAGE_CAPACITY);
        assert_eq!(tx.counters().displaced.load(Ordering::Relaxed), 1);
        assert_eq!(tx.counters().gate_drops.load(Ordering::Relaxed), 0);
        // The gate is the newest staged record.
        assert_eq!(tx.stage.back().unwrap().op, Opcode::Gate);
        // The displaced record was the oldest staged set ("q0").
        assert!(!tx.stage.iter().any(|r| r.param == "q0"));
    }

    #[test]
    fn gate_drop_counted_when_nothing_displaceable() {
        let (mut tx, _rx) = pair(2);
        tx.send(CommandRecord::gate(id("g0"), true));
        tx.send(CommandRecord::gate(id("g1"), true));
        // Stage entirely gates.
        for i in 0..STAGE_CAPACITY {
            tx.send(CommandRecord::gate(id(&format!("g{}", i + 2)), true));
        }
        tx.send(CommandRecord::gate(id("last"), true));
        assert_eq!(tx.counters().gate_drops.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn stage_drains_before_new_writes() {
        let (mut tx, mut rx) = pair(2);
        tx.send(set("a", "x", 1.0));
        tx.send(set("a", "y", 2.0));
        tx.send(set("a", "z", 3.0)); // staged

        // Consumer frees space; the staged record must come out before a
        // newly sent one.
        assert_eq!(rx.read().unwrap().param, "x");
        assert_eq!(rx.read().unwrap().param, "y");
        tx.send(set("a", "w", 4.0));
        assert_eq!(rx.read().unwrap().param, "z");
        assert_eq!(rx.read().unwrap().param, "w");
    }

    #[test]
    fn reset_discards_pending() {
        let (mut tx, mut rx) = pair(8);
        tx.send(set("a", "x", 1.0));
        tx.send(set("a", "y", 2.0));
        rx.reset();
        assert!(!rx.has_data());
    }

    #[test]
    fn rejects_degenerate_capacity() {
        assert!(matches!(
            command_ring(1, Arc::default()),
            Err(TransportError::BadRingCapacity(1))
        ));
    }
}
