// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Flux samples and the DMA ring they travel through.

use core::fmt;

/// Time between two flux transitions, in timer ticks.
///
/// A zero-length sample is the index marker: it carries no duration and only tells the consumer
/// where the start-of-track reference fell in the stream.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(transparent)]
pub struct FluxSample(u32);

impl FluxSample {
    /// Start-of-track marker.
    pub const INDEX: FluxSample = FluxSample(0);

    #[inline]
    pub const fn from_ticks(ticks: u32) -> Self {
        Self(ticks)
    }

    #[inline]
    pub const fn ticks(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn is_index(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for FluxSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_index() {
            f.write_str("Index")
        } else {
            write!(f, "{}t", self.0)
        }
    }
}

/// Generation slot value that produces no edge: the timer period is long enough that the
/// line is disarmed before it elapses.
pub const HOLD: u32 = u32::MAX;

/// Slot access shared by a parked [`FluxBuffer`] and a ring currently owned by the DMA.
pub trait Ring {
    fn capacity(&self) -> usize;
    fn load(&self, index: usize) -> u32;
    fn store(&mut self, index: usize, value: u32);

    #[inline]
    fn half(&self) -> usize {
        self.capacity() / 2
    }
}

/// Fixed-capacity ring of raw slots shared with a DMA channel.
///
/// In capture mode slots hold latched counter values; in generation mode they hold timer
/// periods. Allocated once at start-up and moved between the engines, so only one of them can
/// hold it at a time.
pub struct FluxBuffer {
    slots: &'static mut [u32],
}

impl FluxBuffer {
    /// Wrap a static slot array. The length must be even (half/full interrupts) and non-zero.
    pub fn new(slots: &'static mut [u32]) -> Option<Self> {
        if slots.len() < 2 || slots.len() % 2 != 0 {
            return None;
        }
        Some(Self { slots })
    }

    /// Zero every slot. Called whenever the ring changes hands.
    pub fn clear(&mut self) {
        self.slots.fill(0);
    }

    #[inline]
    pub fn as_slice(&self) -> &[u32] {
        self.slots
    }

    /// Raw pointer handed to the DMA controller.
    #[inline]
    pub fn as_mut_ptr(&mut self) -> *mut u32 {
        self.slots.as_mut_ptr()
    }
}

impl Ring for FluxBuffer {
    #[inline]
    fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    fn load(&self, index: usize) -> u32 {
        self.slots[index]
    }

    #[inline]
    fn store(&mut self, index: usize, value: u32) {
        self.slots[index] = value;
    }
}

impl fmt::Debug for FluxBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FluxBuffer")
            .field("capacity", &self.slots.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slots(n: usize) -> &'static mut [u32] {
        Box::leak(vec![7u32; n].into_boxed_slice())
    }

    #[test]
    fn rejects_odd_or_tiny_rings() {
        assert!(FluxBuffer::new(slots(0)).is_none());
        assert!(FluxBuffer::new(slots(1)).is_none());
        assert!(FluxBuffer::new(slots(7)).is_none());
        assert!(FluxBuffer::new(slots(8)).is_some());
    }

    #[test]
    fn clear_zeroes_slots() {
        let mut buf = FluxBuffer::new(slots(4)).unwrap();
        buf.clear();
        assert_eq!(buf.as_slice(), &[0, 0, 0, 0]);
        assert_eq!(buf.half(), 2);
    }

    #[test]
    fn index_marker_is_zero_length() {
        assert!(FluxSample::INDEX.is_index());
        assert!(!FluxSample::from_ticks(1).is_index());
    }
}
