//! Output feed: the body of the device callback.
//!
//! [`OutputFeed::fill`] is what the audio backend invokes once per device
//! block. It is the only consumer of the audio rings and the only writer of
//! `active_index`. Everything it does is bounded: lock-free reads of
//! atomics, SPSC pops, and memcpy of pre-allocated blocks. It never
//! allocates, locks, or logs.
//!
//! Per callback:
//!
//! 1. swap in any replacement ring consumers (respawns rebuild rings),
//! 2. latest-wins read from the active slot's ring, cushion intact,
//! 3. on underrun, replay the slot's last good block,
//! 4. duplicate the mono block to every device channel,
//! 5. if a switch is staged and the standby is primed with audio ready,
//!    flip `active_index` — the only place it is ever written.
//!
//! `fill` is an ordinary method, so integration tests drive it directly
//! in place of a device.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use chronus_transport::AudioRingConsumer;
use crossbeam_channel::Receiver;

use crate::slot::SlotShared;
use crate::status::StatusCounters;

/// A replacement ring consumer for a respawned slot.
pub struct ConsumerSwap {
    /// Which slot the consumer belongs to.
    pub slot: usize,
    /// The fresh consumer half.
    pub consumer: AudioRingConsumer,
}

/// Callback-side state for both slots.
pub struct OutputFeed {
    consumers: [AudioRingConsumer; 2],
    shared: [Arc<SlotShared>; 2],
    active_index: Arc<AtomicUsize>,
    pending_switch: Arc<AtomicBool>,
    status: Arc<StatusCounters>,
    swaps: Receiver<ConsumerSwap>,
    last_good: [Box<[f32]>; 2],
    scratch: Box<[f32]>,
    block_size: usize,
    keep_after_read: usize,
}

impl OutputFeed {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        consumers: [AudioRingConsumer; 2],
        shared: [Arc<SlotShared>; 2],
        active_index: Arc<AtomicUsize>,
        pending_switch: Arc<AtomicBool>,
        status: Arc<StatusCounters>,
        swaps: Receiver<ConsumerSwap>,
        block_size: usize,
        keep_after_read: usize,
    ) -> Self {
        Self {
            consumers,
            shared,
            active_index,
            pending_switch,
            status,
            swaps,
            last_good: [
                vec![0.0; block_size].into_boxed_slice(),
                vec![0.0; block_size].into_boxed_slice(),
            ],
            scratch: vec![0.0; block_size].into_boxed_slice(),
            block_size,
            keep_after_read,
        }
    }

    /// Fills one device buffer of interleaved samples.
    ///
    /// `out.len()` must be `frames × channels`; frames beyond the engine
    /// block size are zero-filled (never happens with a fixed-size stream).
    pub fn fill(&mut self, out: &mut [f32], channels: usize) {
        // Respawns hand over fresh ring halves through a lock-free channel.
        while let Ok(swap) = self.swaps.try_recv() {
            if swap.slot < 2 {
                self.consumers[swap.slot] = swap.consumer;
            }
        }

        let idx = self.active_index.load(Ordering::Acquire);

        match self.consumers[idx].read_latest_keep(self.keep_after_read, &mut self.scratch) {
            Some(_) => {
                self.last_good[idx].copy_from_slice(&self.scratch);
            }
            None => {
                // Underrun: hold the line with the last good block. The
                // none-read was counted inside the ring.
                self.scratch.copy_from_slice(&self.last_good[idx]);
            }
        }

        let channels = channels.max(1);
        for (frame, sample) in out.chunks_mut(channels).zip(self.scratch.iter()) {
            frame.fill(*sample);
        }
        let written = (out.len() / channels).min(self.block_size);
        for frame in out.chunks_mut(channels).skip(written) {
            frame.fill(0.0);
        }

        // Switch at the block boundary, gated on standby readiness.
        if self.pending_switch.load(Ordering::Acquire) {
            let standby = 1 - idx;
            if self.shared[standby].prime_ready.load(Ordering::Acquire)
                && self.consumers[standby].occupancy() > 0
            {
                self.active_index.store(standby, Ordering::Release);
                self.pending_switch.store(false, Ordering::Release);
                self.status.switches.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Block size this feed was built for.
    pub fn block_size(&self) -> usize {
        self.block_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronus_transport::audio_ring;
    use crossbeam_channel::bounded;

    fn feed_fixture() -> (
        OutputFeed,
        chronus_transport::AudioRingProducer,
        chronus_transport::AudioRingProducer,
        Arc<AtomicUsize>,
        Arc<AtomicBool>,
        [Arc<SlotShared>; 2],
        crossbeam_channel::Sender<ConsumerSwap>,
    ) {
        let (p0, c0) = audio_ring(8, 4, Arc::default()).unwrap();
        let (p1, c1) = audio_ring(8, 4, Arc::default()).unwrap();
        let shared: [Arc<SlotShared>; 2] = [Arc::default(), Arc::default()];
        let active = Arc::new(AtomicUsize::new(0));
        let pending = Arc::new(AtomicBool::new(false));
        let (swap_tx, swap_rx) = bounded(4);
        let feed = OutputFeed::new(
            [c0, c1],
            [Arc::clone(&shared[0]), Arc::clone(&shared[1])],
            Arc::clone(&active),
            Arc::clone(&pending),
            Arc::default(),
            swap_rx,
            4,
            0,
        );
        (feed, p0, p1, active, pending, shared, swap_tx)
    }

    #[test]
    fn emits_active_slot_audio_duplicated_to_channels() {
        let (mut feed, mut p0, _p1, _active, _pending, _shared, _swap) = feed_fixture();
        p0.write(&[0.5; 4]).unwrap();

        let mut out = [0.0f32; 8]; // 4 frames, stereo
        feed.fill(&mut out, 2);
        assert_eq!(out, [0.5; 8]);
    }

    #[test]
    fn underrun_replays_last_good() {
        let (mut feed, mut p0, _p1, _active, _pending, _shared, _swap) = feed_fixture();
        p0.write(&[0.25; 4]).unwrap();

        let mut out = [0.0f32; 4];
        feed.fill(&mut out, 1);
        assert_eq!(out, [0.25; 4]);

        // Nothing new: last good block again, none-read counted.
        feed.fill(&mut out, 1);
        assert_eq!(out, [0.25; 4]);
    }

    #[test]
    fn switch_gated_on_prime_ready_and_occupancy() {
        let (mut feed, mut p0, mut p1, active, pending, shared, _swap) = feed_fixture();
        p0.write(&[0.1; 4]).unwrap();
        pending.store(true, Ordering::Release);

        let mut out = [0.0f32; 4];
        // Standby not primed: stay on slot 0.
        feed.fill(&mut out, 1);
        assert_eq!(active.load(Ordering::Acquire), 0);
        assert!(pending.load(Ordering::Acquire));

        // Primed but no audio yet: still no switch.
        shared[1].prime_ready.store(true, Ordering::Release);
        feed.fill(&mut out, 1);
        assert_eq!(active.load(Ordering::Acquire), 0);

        // Audio ready: flip.
        p1.write(&[0.9; 4]).unwrap();
        feed.fill(&mut out, 1);
        assert_eq!(active.load(Ordering::Acquire), 1);
        assert!(!pending.load(Ordering::Acquire));

        // Next fill reads from slot 1.
        feed.fill(&mut out, 1);
        assert_eq!(out, [0.9; 4]);
    }

    #[test]
    fn output_never_mixes_slots() {
        let (mut feed, mut p0, mut p1, _active, _pending, _shared, _swap) = feed_fixture();
        p0.write(&[0.1; 4]).unwrap();
        p1.write(&[0.9; 4]).unwrap();

        let mut out = [0.0f32; 4];
        feed.fill(&mut out, 1);
        // Active is slot 0; slot 1's audio must not appear.
        assert_eq!(out, [0.1; 4]);
    }

    #[test]
    fn consumer_swap_replaces_ring() {
        let (mut feed, mut p0, _p1, _active, _pending, _shared, swap_tx) = feed_fixture();
        p0.write(&[0.3; 4]).unwrap();
        let mut out = [0.0f32; 4];
        feed.fill(&mut out, 1);
        assert_eq!(out, [0.3; 4]);

        // Replace slot 0's ring wholesale (a respawn).
        let (mut new_p0, new_c0) = audio_ring(8, 4, Arc::default()).unwrap();
        swap_tx
            .send(ConsumerSwap {
                slot: 0,
                consumer: new_c0,
            })
            .unwrap();
        new_p0.write(&[0.7; 4]).unwrap();

        feed.fill(&mut out, 1);
        assert_eq!(out, [0.7; 4]);
    }

    #[test]
    fn oversized_device_buffer_zero_fills_tail() {
        let (mut feed, mut p0, _p1, _active, _pending, _shared, _swap) = feed_fixture();
        p0.write(&[0.5; 4]).unwrap();

        let mut out = [1.0f32; 12]; // 6 frames stereo, engine block is 4
        feed.fill(&mut out, 2);
        assert_eq!(&out[..8], &[0.5; 8]);
        assert_eq!(&out[8..], &[0.0; 4]);
    }
}
