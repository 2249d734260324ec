// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Flux capture engine.
//!
//! The DMA latches the free-running counter into the ring on every read-data edge. Software only
//! runs at half/full boundaries and when the transport drains: it turns consecutive timestamps
//! into [`FluxSample`] durations, splices index markers in at the right place, and tracks how far
//! the DMA is ahead so that an about-to-be-overwritten half is reported rather than lost.

use crate::config::FluxConfig;
use crate::error::TimingFault;
use crate::flux::buffer::{FluxSample, Ring};
use crate::flux::timer::DmaEvent;

/// Index times kept per capture.
pub const MAX_INDEX_TIMES: usize = 32;

/// Index pulses latched but not yet placed in the stream.
const PENDING_INDEX: usize = 4;

/// True if `a` happened no later than `b` on the wrapping counter.
#[inline]
fn not_after(a: u32, b: u32) -> bool {
    (b.wrapping_sub(a) as i32) >= 0
}

pub struct CaptureEngine {
    min_cell: u32,
    max_index: usize,

    /// Ring total at the last serviced boundary.
    boundary: u64,
    /// Slots handed to the consumer so far.
    consumed: u64,
    /// Ring index of the next slot to convert.
    cursor: usize,
    /// Timestamp of the last accepted edge.
    prev: u32,
    /// Counter value when the capture was armed.
    start: u32,

    pending: [u32; PENDING_INDEX],
    pending_len: usize,
    last_index: Option<u32>,
    index_times: [u32; MAX_INDEX_TIMES],
    index_len: usize,
    index_seen: u32,
    index_target: Option<u32>,

    noise: u32,
    fault: Option<TimingFault>,
    complete: bool,
}

impl CaptureEngine {
    pub fn new(cfg: &FluxConfig) -> Self {
        Self {
            min_cell: cfg.min_cell_ticks.max(1),
            max_index: (cfg.max_index as usize).min(MAX_INDEX_TIMES),
            boundary: 0,
            consumed: 0,
            cursor: 0,
            prev: 0,
            start: 0,
            pending: [0; PENDING_INDEX],
            pending_len: 0,
            last_index: None,
            index_times: [0; MAX_INDEX_TIMES],
            index_len: 0,
            index_seen: 0,
            index_target: None,
            noise: 0,
            fault: None,
            complete: false,
        }
    }

    /// Reset all cursors for a fresh capture armed at counter value `start`.
    ///
    /// With `index_target` set, the capture completes after that many index pulses.
    pub fn begin(&mut self, start: u32, index_target: Option<u32>) {
        self.reset();
        self.start = start;
        self.prev = start;
        self.index_target = index_target.filter(|&n| n > 0);
    }

    /// Return to the idle state. Index times of the last capture are kept for the host.
    pub fn reset(&mut self) {
        self.boundary = 0;
        self.consumed = 0;
        self.cursor = 0;
        self.prev = 0;
        self.start = 0;
        self.pending_len = 0;
        self.last_index = None;
        self.index_len = 0;
        self.index_seen = 0;
        self.index_target = None;
        self.noise = 0;
        self.fault = None;
        self.complete = false;
    }

    /// Record an index pulse latched at counter value `timestamp`.
    pub fn on_index(&mut self, timestamp: u32) {
        if self.complete || self.pending_len == PENDING_INDEX {
            return;
        }
        self.pending[self.pending_len] = timestamp;
        self.pending_len += 1;
    }

    /// Account for a DMA boundary and check the half now being written.
    pub fn on_dma_event(&mut self, capacity: usize, event: DmaEvent) -> Result<(), TimingFault> {
        if let Some(f) = self.fault {
            return Err(f);
        }
        let half = (capacity / 2) as u64;
        self.boundary += half;
        debug_assert_eq!(
            event == DmaEvent::TransferComplete,
            self.boundary % capacity as u64 == 0
        );
        // The half the DMA just entered still holds the previous lap. Anything in it that the
        // consumer has not taken is about to be overwritten. A consumer that already read past
        // this boundary has nothing at risk.
        if self.boundary.saturating_sub(self.consumed) > half && !self.complete {
            self.fault = Some(TimingFault::Overrun);
            return Err(TimingFault::Overrun);
        }
        Ok(())
    }

    fn produced(&self, capacity: usize, dma_index: usize) -> u64 {
        let base = (self.boundary % capacity as u64) as usize;
        self.boundary + ((dma_index + capacity - base) % capacity) as u64
    }

    /// Convert captured edges into `out`, returning how many samples were written.
    pub fn drain<R: Ring>(
        &mut self,
        ring: &R,
        dma_index: usize,
        out: &mut [FluxSample],
    ) -> Result<usize, TimingFault> {
        if let Some(f) = self.fault {
            return Err(f);
        }
        let capacity = ring.capacity();
        let produced = self.produced(capacity, dma_index);
        // Until the lagging boundary event is serviced `produced` may trail `consumed`; there
        // is simply nothing new yet.
        if produced.saturating_sub(self.consumed) > capacity as u64 {
            self.fault = Some(TimingFault::Overrun);
            return Err(TimingFault::Overrun);
        }

        let mut n = 0;
        while n < out.len() && !self.complete && self.consumed < produced {
            let ts = ring.load(self.cursor);

            if self.pending_len > 0 && not_after(self.pending[0], ts) {
                out[n] = FluxSample::INDEX;
                n += 1;
                self.take_index();
                continue;
            }

            let ticks = ts.wrapping_sub(self.prev);
            if ticks < self.min_cell {
                // Glitch: drop the edge and let the next interval absorb it.
                self.noise += 1;
            } else {
                out[n] = FluxSample::from_ticks(ticks);
                n += 1;
                self.prev = ts;
            }
            self.cursor = (self.cursor + 1) % capacity;
            self.consumed += 1;
        }

        // Every edge latched so far is out, so pulses still pending came after all of them.
        // Place them now rather than wait for an edge that an unformatted track never sends.
        while n < out.len()
            && !self.complete
            && self.consumed == produced
            && self.pending_len > 0
        {
            out[n] = FluxSample::INDEX;
            n += 1;
            self.take_index();
        }
        Ok(n)
    }

    fn take_index(&mut self) {
        let ts = self.pending[0];
        self.pending.copy_within(1..self.pending_len, 0);
        self.pending_len -= 1;

        if self.index_len < self.max_index {
            let since = ts.wrapping_sub(self.last_index.unwrap_or(self.start));
            self.index_times[self.index_len] = since;
            self.index_len += 1;
        }
        self.last_index = Some(ts);
        self.index_seen += 1;
        if self.index_target == Some(self.index_seen) {
            self.complete = true;
        }
    }

    /// Requested number of index pulses has been delivered.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Index pulses placed in the stream so far.
    #[inline]
    pub fn index_count(&self) -> u32 {
        self.index_seen
    }

    /// Latched index pulses, placed in the stream or still pending.
    #[inline]
    pub fn index_pulses(&self) -> u32 {
        self.index_seen + self.pending_len as u32
    }

    /// Tick distances between index pulses; the first is measured from the arming point.
    #[inline]
    pub fn index_times(&self) -> &[u32] {
        &self.index_times[..self.index_len]
    }

    /// Edges dropped for being shorter than a cell.
    #[inline]
    pub fn noise(&self) -> u32 {
        self.noise
    }

    #[inline]
    pub fn fault(&self) -> Option<TimingFault> {
        self.fault
    }
}
