//! Patch-plane queue: graph edits from the supervisor to the standby worker.
//!
//! Edits are structured messages, not command records — they carry owned
//! strings (module type names) and variable-length prime transactions, and
//! they never touch the audio path. The queue is a bounded channel; sends
//! are non-blocking with a drop counter, though a full patch queue means
//! the standby worker has been wedged for a long time already.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chronus_core::Ident;
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

/// Default patch queue capacity.
pub const DEFAULT_PATCH_CAPACITY: usize = 128;

/// One immediate parameter/gate application inside a prime transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum PrimeOp {
    /// Apply a parameter value with `immediate = true`.
    Set {
        /// Target module.
        module: Ident,
        /// Target parameter.
        param: Ident,
        /// Value to apply.
        value: f64,
    },
    /// Set a gate.
    Gate {
        /// Target module.
        module: Ident,
        /// Gate state.
        on: bool,
    },
}

/// A graph edit processed by the standby worker at a block boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum PatchOp {
    /// Instantiate a module from the registry.
    Create {
        /// Id the module will be known by.
        id: Ident,
        /// Registry type name.
        type_name: String,
    },
    /// Add the edge `src → dst`.
    Connect {
        /// Source module.
        src: Ident,
        /// Destination module.
        dst: Ident,
    },
    /// Remove the edge `src → dst`.
    Disconnect {
        /// Source module.
        src: Ident,
        /// Destination module.
        dst: Ident,
    },
    /// Remove a disconnected module.
    Delete {
        /// Module to remove.
        id: Ident,
    },
    /// Apply initial params/gates and render warmup blocks, then publish
    /// prime-ready.
    Prime {
        /// Immediate applications, in order.
        ops: Vec<PrimeOp>,
        /// Warmup blocks to render into the ring and last-good buffer.
        warmup_blocks: u32,
        /// Withhold prime-ready if the warmup is silent. The default commit
        /// flow leaves this off — a gated patch is legitimately silent
        /// until its gate opens.
        verify_audible: bool,
    },
    /// Commit marker; priming already did the work.
    Commit,
    /// Discard the patch under construction and rebuild the committed one.
    Abort,
}

/// Supervisor-side half of a slot's patch queue.
#[derive(Clone)]
pub struct PatchSender {
    tx: Sender<PatchOp>,
    dropped: Arc<AtomicU64>,
}

impl PatchSender {
    /// Queues an edit without blocking. Full-queue drops are counted.
    pub fn send(&self, op: PatchOp) -> bool {
        match self.tx.try_send(op) {
            Ok(()) => true,
            Err(TrySendError::Full(op)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(?op, "patch edit dropped, queue full");
                false
            }
            Err(TrySendError::Disconnected(op)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(?op, "patch edit dropped, worker gone");
                false
            }
        }
    }

    /// Edits dropped because the queue was full or the worker was gone.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Worker-side half of a slot's patch queue.
pub struct PatchReceiver {
    rx: Receiver<PatchOp>,
}

impl PatchReceiver {
    /// Pops the next pending edit.
    pub fn read(&self) -> Option<PatchOp> {
        self.rx.try_recv().ok()
    }

    /// Whether any edit is pending.
    pub fn has_data(&self) -> bool {
        !self.rx.is_empty()
    }
}

/// Builds a patch queue of the given capacity.
pub fn patch_queue(capacity: usize) -> (PatchSender, PatchReceiver) {
    let (tx, rx) = bounded(capacity);
    (
        PatchSender {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        },
        PatchReceiver { rx },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> Ident {
        Ident::new(s).unwrap()
    }

    #[test]
    fn edits_arrive_in_order() {
        let (tx, rx) = patch_queue(8);
        assert!(tx.send(PatchOp::Create {
            id: id("osc1"),
            type_name: "sine".into(),
        }));
        assert!(tx.send(PatchOp::Connect {
            src: id("osc1"),
            dst: id("env1"),
        }));
        assert!(tx.send(PatchOp::Commit));

        assert!(matches!(rx.read(), Some(PatchOp::Create { .. })));
        assert!(matches!(rx.read(), Some(PatchOp::Connect { .. })));
        assert_eq!(rx.read(), Some(PatchOp::Commit));
        assert!(rx.read().is_none());
    }

    #[test]
    fn full_queue_counts_drops() {
        let (tx, _rx) = patch_queue(2);
        assert!(tx.send(PatchOp::Commit));
        assert!(tx.send(PatchOp::Commit));
        assert!(!tx.send(PatchOp::Commit));
        assert_eq!(tx.dropped(), 1);
    }

    #[test]
    fn dead_receiver_counts_drops() {
        let (tx, rx) = patch_queue(2);
        drop(rx);
        assert!(!tx.send(PatchOp::Abort));
        assert_eq!(tx.dropped(), 1);
    }
}
