// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Flux generation engine.
//!
//! The host supplies durations; the engine writes them into the ring as timer periods ahead of
//! the DMA. A slot the producer never filled is [`HOLD`], so a starved DMA parks the write line in
//! its last state instead of replaying stale periods. Gating (write protect, motor) is the drive
//! controller's job; this engine only knows about slots.

use crate::config::FluxConfig;
use crate::error::TimingFault;
use crate::flux::buffer::{FluxSample, Ring, HOLD};
use crate::flux::timer::DmaEvent;

pub struct GenerationEngine {
    min_cell: u32,

    /// DMA total at the last serviced boundary.
    boundary: u64,
    /// Real periods written into the ring.
    produced: u64,
    /// Ring index of the next slot to fill.
    cursor: usize,
    /// Sub-minimum ticks waiting to be merged into the next period.
    carry: u32,
    /// Period count when the host ended the stream.
    finished: Option<u64>,
    fault: Option<TimingFault>,
}

impl GenerationEngine {
    pub fn new(cfg: &FluxConfig) -> Self {
        Self {
            min_cell: cfg.min_cell_ticks.max(1),
            boundary: 0,
            produced: 0,
            cursor: 0,
            carry: 0,
            finished: None,
            fault: None,
        }
    }

    /// Reset cursors for a new write. The ring itself is primed with [`feed`](Self::feed).
    pub fn begin(&mut self) {
        self.boundary = 0;
        self.produced = 0;
        self.cursor = 0;
        self.carry = 0;
        self.finished = None;
        self.fault = None;
    }

    /// Periods the DMA has fetched. Before arming `dma_index` is 0 and so is this.
    fn consumed(&self, capacity: usize, dma_index: usize) -> u64 {
        let base = (self.boundary % capacity as u64) as usize;
        self.boundary + ((dma_index + capacity - base) % capacity) as u64
    }

    /// Copy host samples into free slots, returning how many samples were taken.
    ///
    /// Index markers carry no duration and are skipped. Intervals below the minimum cell are
    /// merged into the following one so the ring never holds a period the timer cannot emit.
    pub fn feed<R: Ring>(
        &mut self,
        ring: &mut R,
        dma_index: usize,
        samples: &[FluxSample],
    ) -> Result<usize, TimingFault> {
        if let Some(f) = self.fault {
            return Err(f);
        }
        if self.finished.is_some() {
            return Ok(0);
        }
        let capacity = ring.capacity();
        let consumed = self.consumed(capacity, dma_index);
        if consumed > self.produced {
            // The DMA has already fetched slots the producer never filled.
            self.hold_from(ring, consumed + capacity as u64);
            self.fault = Some(TimingFault::Underrun);
            return Err(TimingFault::Underrun);
        }

        let mut taken = 0;
        for s in samples {
            if self.produced - consumed >= capacity as u64 {
                break;
            }
            taken += 1;
            if s.is_index() {
                continue;
            }
            let ticks = s.ticks().saturating_add(self.carry);
            if ticks < self.min_cell {
                self.carry = ticks;
                continue;
            }
            self.carry = 0;
            ring.store(self.cursor, ticks.min(HOLD - 1));
            self.cursor = (self.cursor + 1) % capacity;
            self.produced += 1;
        }
        Ok(taken)
    }

    /// Enough is queued to start the DMA without immediately starving it.
    pub fn is_primed(&self, capacity: usize) -> bool {
        self.finished.is_some() || self.produced >= (capacity / 2) as u64
    }

    /// Account for a DMA boundary and check that the half now being read was filled.
    ///
    /// On underrun every unfilled slot becomes [`HOLD`] before the fault is returned, so the
    /// line stays put until the controller disarms it.
    pub fn on_dma_event<R: Ring>(
        &mut self,
        ring: &mut R,
        event: DmaEvent,
    ) -> Result<(), TimingFault> {
        if let Some(f) = self.fault {
            return Err(f);
        }
        let capacity = ring.capacity();
        let half = (capacity / 2) as u64;
        self.boundary += half;
        debug_assert_eq!(
            event == DmaEvent::TransferComplete,
            self.boundary % capacity as u64 == 0
        );
        if self.finished.is_some() {
            // Tail is already padded with HOLD.
            return Ok(());
        }
        if self.produced < self.boundary + half {
            self.hold_from(ring, self.boundary + capacity as u64);
            self.fault = Some(TimingFault::Underrun);
            return Err(TimingFault::Underrun);
        }
        Ok(())
    }

    /// End of host stream. Pads the ring with [`HOLD`] behind the last period.
    pub fn finish<R: Ring>(&mut self, ring: &mut R, dma_index: usize) {
        if self.finished.is_some() {
            return;
        }
        // A trailing sub-minimum interval cannot be emitted.
        self.carry = 0;
        self.finished = Some(self.produced);
        let consumed = self.consumed(ring.capacity(), dma_index);
        self.hold_from(ring, consumed + ring.capacity() as u64);
    }

    fn hold_from<R: Ring>(&mut self, ring: &mut R, until: u64) {
        let capacity = ring.capacity();
        let mut slot = self.cursor;
        for _ in self.produced..until {
            ring.store(slot, HOLD);
            slot = (slot + 1) % capacity;
        }
    }

    /// The DMA has fetched the first [`HOLD`] after the last period, so every transition has
    /// been emitted.
    pub fn is_drained(&self, capacity: usize, dma_index: usize) -> bool {
        match self.finished {
            None => false,
            Some(0) => true,
            Some(total) => self.consumed(capacity, dma_index) > total,
        }
    }

    #[inline]
    pub fn is_finished(&self) -> bool {
        self.finished.is_some()
    }

    /// Transitions scheduled into the ring so far.
    #[inline]
    pub fn scheduled(&self) -> u64 {
        self.produced
    }

    #[inline]
    pub fn fault(&self) -> Option<TimingFault> {
        self.fault
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Slots(Vec<u32>);

    impl Ring for Slots {
        fn capacity(&self) -> usize {
            self.0.len()
        }
        fn load(&self, index: usize) -> u32 {
            self.0[index]
        }
        fn store(&mut self, index: usize, value: u32) {
            self.0[index] = value;
        }
    }

    fn engine() -> GenerationEngine {
        let mut e = GenerationEngine::new(&FluxConfig {
            min_cell_ticks: 10,
            ..FluxConfig::default()
        });
        e.begin();
        e
    }

    fn ticks(v: &[u32]) -> Vec<FluxSample> {
        v.iter().copied().map(FluxSample::from_ticks).collect()
    }

    #[test]
    fn priming_stops_when_ring_is_full() {
        let mut e = engine();
        let mut ring = Slots(vec![0; 4]);
        let taken = e.feed(&mut ring, 0, &ticks(&[100, 200, 300, 400, 500])).unwrap();
        assert_eq!(taken, 4);
        assert_eq!(ring.0, vec![100, 200, 300, 400]);
        assert!(e.is_primed(4));
    }

    #[test]
    fn short_intervals_merge_and_index_is_skipped() {
        let mut e = engine();
        let mut ring = Slots(vec![0; 4]);
        let samples = [
            FluxSample::from_ticks(4),
            FluxSample::INDEX,
            FluxSample::from_ticks(100),
        ];
        assert_eq!(e.feed(&mut ring, 0, &samples).unwrap(), 3);
        assert_eq!(ring.0[0], 104);
        assert_eq!(e.scheduled(), 1);
    }

    #[test]
    fn starved_half_is_held_and_faulted() {
        let mut e = engine();
        let mut ring = Slots(vec![0; 4]);
        e.feed(&mut ring, 0, &ticks(&[100, 200])).unwrap();

        // DMA enters the second half, which the producer never filled.
        assert_eq!(
            e.on_dma_event(&mut ring, DmaEvent::HalfTransfer),
            Err(TimingFault::Underrun)
        );
        assert_eq!(ring.0, vec![HOLD, HOLD, HOLD, HOLD]);
        assert_eq!(
            e.feed(&mut ring, 2, &ticks(&[1])),
            Err(TimingFault::Underrun)
        );
    }

    #[test]
    fn dma_past_the_producer_is_underrun() {
        let mut e = engine();
        let mut ring = Slots(vec![0; 8]);
        assert_eq!(e.feed(&mut ring, 0, &ticks(&[100, 200, 300, 400])).unwrap(), 4);

        // Six slots fetched before the half boundary is serviced.
        assert_eq!(
            e.feed(&mut ring, 6, &ticks(&[500])),
            Err(TimingFault::Underrun)
        );
        assert_eq!(&ring.0[4..], &[HOLD; 4]);
        assert_eq!(e.scheduled(), 4);
        assert_eq!(
            e.on_dma_event(&mut ring, DmaEvent::HalfTransfer),
            Err(TimingFault::Underrun)
        );
    }

    #[test]
    fn finish_pads_tail_and_drains_after_last_period() {
        let mut e = engine();
        let mut ring = Slots(vec![0; 4]);
        e.feed(&mut ring, 0, &ticks(&[100, 200, 300])).unwrap();
        e.finish(&mut ring, 0);
        assert_eq!(ring.0, vec![100, 200, 300, HOLD]);

        assert!(!e.is_drained(4, 3));
        e.on_dma_event(&mut ring, DmaEvent::HalfTransfer).unwrap();
        assert!(!e.is_drained(4, 3));
        e.on_dma_event(&mut ring, DmaEvent::TransferComplete).unwrap();
        assert!(e.is_drained(4, 0));
    }

    #[test]
    fn empty_write_is_drained_immediately() {
        let mut e = engine();
        let mut ring = Slots(vec![0; 4]);
        e.finish(&mut ring, 0);
        assert!(e.is_primed(4));
        assert!(e.is_drained(4, 0));
    }
}
