//! Lock-free SPSC audio block ring.
//!
//! One ring per slot carries rendered blocks from the worker thread to the
//! device callback. The element is a self-contained [`AudioBlock`] — inline
//! payload, no heap pointer — so a push or pop is a bounded memcpy and the
//! steady state never allocates.
//!
//! The consumer policy is **latest-wins with a cushion**: on read, older
//! pending blocks are dropped so that at most `keep + 1` remain, then the
//! oldest of those is consumed. The cushion absorbs short producer stalls;
//! the dropping bounds latency growth when the producer bursts ahead. When
//! occupancy is at or below the cushion the read returns `None` and the
//! caller falls back to its last good block.
//!
//! Capacity is `num_buffers − 1` usable blocks (one slot of the configured
//! budget stays reserved), so occupancy is always in `[0, num_buffers − 1]`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chronus_core::MAX_BLOCK_SIZE;
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use crate::TransportError;

/// One rendered block in transit: sequence number, length, inline samples.
#[derive(Clone, Copy)]
pub struct AudioBlock {
    /// Monotonic per-ring sequence number, stamped by the producer.
    pub seq: u64,
    len: u32,
    samples: [f32; MAX_BLOCK_SIZE],
}

impl AudioBlock {
    /// The valid samples of this block.
    #[inline]
    pub fn samples(&self) -> &[f32] {
        &self.samples[..self.len as usize]
    }
}

/// Shared occupancy-independent accounting for one audio ring.
///
/// Owned by the slot, not the ring, so counters survive worker respawns.
#[derive(Debug, Default)]
pub struct AudioRingCounters {
    /// Producer writes rejected because the ring was full.
    pub writes_dropped: AtomicU64,
    /// Consumer reads that found nothing beyond the cushion.
    pub none_reads: AtomicU64,
    /// Blocks discarded by the latest-wins policy.
    pub blocks_skipped: AtomicU64,
    /// Sequence number of the last block the consumer returned.
    pub last_sequence: AtomicU64,
}

/// Worker-side half: writes rendered blocks.
pub struct AudioRingProducer {
    prod: HeapProd<AudioBlock>,
    block_size: usize,
    next_seq: u64,
    counters: Arc<AudioRingCounters>,
}

impl AudioRingProducer {
    /// Copies `block` into the ring and publishes it under a fresh
    /// sequence number. Never blocks.
    ///
    /// Returns the sequence number, or [`TransportError::RingFull`] when
    /// all usable slots are pending — the caller counts the drop and backs
    /// off.
    pub fn write(&mut self, block: &[f32]) -> Result<u64, TransportError> {
        debug_assert_eq!(block.len(), self.block_size);
        if self.prod.is_full() {
            self.counters.writes_dropped.fetch_add(1, Ordering::Relaxed);
            return Err(TransportError::RingFull);
        }
        let mut item = AudioBlock {
            seq: self.next_seq,
            len: block.len().min(MAX_BLOCK_SIZE) as u32,
            samples: [0.0; MAX_BLOCK_SIZE],
        };
        item.samples[..block.len().min(MAX_BLOCK_SIZE)]
            .copy_from_slice(&block[..block.len().min(MAX_BLOCK_SIZE)]);
        match self.prod.try_push(item) {
            Ok(()) => {
                let seq = self.next_seq;
                self.next_seq += 1;
                Ok(seq)
            }
            Err(_) => {
                // Raced with nothing (single producer); full after all.
                self.counters.writes_dropped.fetch_add(1, Ordering::Relaxed);
                Err(TransportError::RingFull)
            }
        }
    }

    /// Blocks currently pending in the ring.
    #[inline]
    pub fn occupancy(&self) -> usize {
        self.prod.occupied_len()
    }

    /// Usable capacity in blocks.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.prod.capacity().get()
    }

    /// The shared counters for this ring.
    pub fn counters(&self) -> &Arc<AudioRingCounters> {
        &self.counters
    }
}

/// Callback-side half: latest-wins reads.
pub struct AudioRingConsumer {
    cons: HeapCons<AudioBlock>,
    counters: Arc<AudioRingCounters>,
}

impl AudioRingConsumer {
    /// Latest-wins read with a cushion of `keep` blocks.
    ///
    /// If occupancy ≤ `keep`, returns `None` (the caller emits its last
    /// good block). Otherwise drops older blocks until `keep + 1` remain,
    /// pops the oldest of those into `out`, and returns its sequence
    /// number. Never blocks, never allocates.
    pub fn read_latest_keep(&mut self, keep: usize, out: &mut [f32]) -> Option<u64> {
        if self.cons.occupied_len() <= keep {
            self.counters.none_reads.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        while self.cons.occupied_len() > keep + 1 {
            if self.cons.try_pop().is_some() {
                self.counters.blocks_skipped.fetch_add(1, Ordering::Relaxed);
            }
        }
        let block = self.cons.try_pop()?;
        let n = block.samples().len().min(out.len());
        out[..n].copy_from_slice(&block.samples()[..n]);
        self.counters
            .last_sequence
            .store(block.seq, Ordering::Relaxed);
        Some(block.seq)
    }

    /// Blocks currently pending in the ring.
    #[inline]
    pub fn occupancy(&self) -> usize {
        self.cons.occupied_len()
    }

    /// The shared counters for this ring.
    pub fn counters(&self) -> &Arc<AudioRingCounters> {
        &self.counters
    }
}

/// Builds an audio ring for `num_buffers` configured blocks of `block_size`
/// samples, wiring both halves to the slot's stable `counters`.
pub fn audio_ring(
    num_buffers: usize,
    block_size: usize,
    counters: Arc<AudioRingCounters>,
) -> Result<(AudioRingProducer, AudioRingConsumer), TransportError> {
    if block_size == 0 || block_size > MAX_BLOCK_SIZE {
        return Err(TransportError::BadBlockSize(block_size));
    }
    if num_buffers < 2 {
        return Err(TransportError::BadRingCapacity(num_buffers));
    }
    // One of the configured buffers stays reserved.
    let rb = HeapRb::<AudioBlock>::new(num_buffers - 1);
    let (prod, cons) = rb.split();
    Ok((
        AudioRingProducer {
            prod,
            block_size,
            next_seq: 1,
            counters: Arc::clone(&counters),
        },
        AudioRingConsumer { cons, counters },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring(num_buffers: usize, block_size: usize) -> (AudioRingProducer, AudioRingConsumer) {
        audio_ring(num_buffers, block_size, Arc::default()).unwrap()
    }

    fn block(value: f32, len: usize) -> Vec<f32> {
        vec![value; len]
    }

    #[test]
    fn write_then_read_round_trips() {
        let (mut prod, mut cons) = ring(8, 16);
        for i in 0..3 {
            prod.write(&block(i as f32, 16)).unwrap();
        }
        let mut out = [0.0f32; 16];
        // keep = 2: exactly one readable beyond the cushion.
        let seq = cons.read_latest_keep(2, &mut out).unwrap();
        assert_eq!(seq, 1);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn occupancy_bounded_by_capacity() {
        let (mut prod, cons) = ring(8, 4);
        // 8 configured buffers -> 7 usable.
        for i in 0..7 {
            prod.write(&block(i as f32, 4)).unwrap();
        }
        assert_eq!(prod.occupancy(), 7);
        assert_eq!(cons.occupancy(), 7);
        assert!(matches!(
            prod.write(&block(9.0, 4)),
            Err(TransportError::RingFull)
        ));
        assert_eq!(prod.counters().writes_dropped.load(Ordering::Relaxed), 1);
        // The newest slot was not corrupted: occupancy unchanged.
        assert_eq!(prod.occupancy(), 7);
    }

    #[test]
    fn empty_ring_returns_none_and_counts() {
        let (_prod, mut cons) = ring(8, 4);
        let mut out = [0.0f32; 4];
        assert!(cons.read_latest_keep(2, &mut out).is_none());
        assert_eq!(cons.counters().none_reads.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn cushion_is_preserved() {
        let (mut prod, mut cons) = ring(8, 4);
        prod.write(&block(1.0, 4)).unwrap();
        prod.write(&block(2.0, 4)).unwrap();
        let mut out = [0.0f32; 4];
        // occupancy == keep: nothing readable yet.
        assert!(cons.read_latest_keep(2, &mut out).is_none());
        prod.write(&block(3.0, 4)).unwrap();
        // occupancy == keep + 1: the oldest is consumed, cushion stays.
        let seq = cons.read_latest_keep(2, &mut out).unwrap();
        assert_eq!(seq, 1);
        assert_eq!(out, [1.0; 4]);
        assert_eq!(cons.occupancy(), 2);
    }

    #[test]
    fn burst_drops_to_cushion_latest_wins() {
        let (mut prod, mut cons) = ring(16, 4);
        for i in 1..=10 {
            prod.write(&block(i as f32, 4)).unwrap();
        }
        let mut out = [0.0f32; 4];
        let seq = cons.read_latest_keep(2, &mut out).unwrap();
        // 10 pending, keep 2: blocks 1..=7 dropped, block 8 returned.
        assert_eq!(seq, 8);
        assert_eq!(out, [8.0; 4]);
        assert_eq!(cons.occupancy(), 2);
        assert_eq!(cons.counters().blocks_skipped.load(Ordering::Relaxed), 7);
    }

    #[test]
    fn sequence_numbers_strictly_increase_across_reads() {
        let (mut prod, mut cons) = ring(8, 4);
        let mut out = [0.0f32; 4];
        let mut last = 0u64;
        for round in 0..20 {
            for i in 0..3 {
                let _ = prod.write(&block((round * 3 + i) as f32, 4));
            }
            while let Some(seq) = cons.read_latest_keep(0, &mut out) {
                assert!(seq > last, "seq {seq} after {last}");
                last = seq;
            }
        }
        assert_eq!(cons.counters().last_sequence.load(Ordering::Relaxed), last);
    }

    #[test]
    fn keep_zero_reads_everything() {
        let (mut prod, mut cons) = ring(8, 4);
        prod.write(&block(1.0, 4)).unwrap();
        let mut out = [0.0f32; 4];
        assert_eq!(cons.read_latest_keep(0, &mut out), Some(1));
        assert!(cons.read_latest_keep(0, &mut out).is_none());
    }

    #[test]
    fn rejects_bad_geometry() {
        assert!(matches!(
            audio_ring(1, 64, Arc::default()),
            Err(TransportError::BadRingCapacity(1))
        ));
        assert!(matches!(
            audio_ring(8, 0, Arc::default()),
            Err(TransportError::BadBlockSize(0))
        ));
        assert!(matches!(
            audio_ring(8, MAX_BLOCK_SIZE + 1, Arc::default()),
            Err(TransportError::BadBlockSize(_))
        ));
    }

    #[test]
    fn halves_are_send() {
        fn assert_send<T: Send>(_: &T) {}
        let (prod, cons) = ring(8, 4);
        assert_send(&prod);
        assert_send(&cons);
    }

    #[test]
    fn cross_thread_stream_stays_monotonic() {
        let (mut prod, mut cons) = ring(16, 8);
        let writer = std::thread::spawn(move || {
            for i in 0..500u32 {
                loop {
                    if prod.write(&[i as f32; 8]).is_ok() {
                        break;
                    }
                    std::thread::yield_now();
                }
            }
            prod
        });

        let mut out = [0.0f32; 8];
        let mut last = 0u64;
        let mut seen = 0u32;
        while seen < 400 {
            if let Some(seq) = cons.read_latest_keep(2, &mut out) {
                assert!(seq > last);
                last = seq;
                seen += 1;
            } else {
                std::thread::yield_now();
            }
        }
        let _ = writer.join().unwrap();
    }
}
