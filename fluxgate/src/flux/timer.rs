// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Hardware timing abstraction.
//!
//! [`TimerBank`] is the register-level capability: one timer channel plus one DMA stream per
//! drive-facing flux line. [`FluxTimer`] owns the bank and enforces the arming contract:
//!
//! - a line is either idle, capturing, or generating, never two at once;
//! - arming an armed line is refused and the offered ring is handed back;
//! - disarming always returns the ring cleared, so the next arming starts from zero.

use thiserror::Error;

use crate::flux::buffer::{FluxBuffer, Ring};

/// Drive-facing flux lines.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Line {
    /// RDATA from the read head.
    ReadData,
    /// WDATA to the write head.
    WriteData,
}

impl Line {
    pub const ALL: [Line; 2] = [Line::ReadData, Line::WriteData];

    #[inline]
    const fn index(self) -> usize {
        match self {
            Line::ReadData => 0,
            Line::WriteData => 1,
        }
    }
}

/// What the DMA does with the ring.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mode {
    /// Latch the free-running counter into the ring on every active edge.
    Capture,
    /// Reload the timer period from the ring on every update event, one edge per period.
    Generate,
}

/// Circular DMA boundary notifications.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DmaEvent {
    /// DMA moved from the first half of the ring into the second.
    HalfTransfer,
    /// DMA wrapped from the end of the ring back to slot 0.
    TransferComplete,
}

/// Timer/DMA register programming for the flux lines.
///
/// Implementations must not touch the ring from software except through [`load`] and
/// [`store`], which perform the volatile accesses the DMA requires.
///
/// [`load`]: TimerBank::load
/// [`store`]: TimerBank::store
pub trait TimerBank {
    /// Program the channel and DMA stream for `line` in `mode` and start them.
    fn start(&mut self, line: Line, mode: Mode, ring: FluxBuffer);

    /// Stop the channel and DMA stream, returning the ring.
    fn stop(&mut self, line: Line) -> Option<FluxBuffer>;

    /// Ring index the DMA will access next.
    fn dma_index(&self, line: Line) -> usize;

    fn load(&self, line: Line, index: usize) -> u32;

    fn store(&mut self, line: Line, index: usize, value: u32);

    /// Oldest pending boundary event for `line`.
    fn take_event(&mut self, line: Line) -> Option<DmaEvent>;

    /// Counter value latched by the oldest pending index pulse.
    fn take_index(&mut self) -> Option<u32>;

    /// Free-running capture counter.
    fn counter(&self) -> u32;
}

/// Arming contract violation. The refused ring is returned, never dropped.
#[derive(Debug, Error)]
pub enum ArmError {
    #[error("{line:?} is already armed for {mode:?}")]
    AlreadyArmed {
        line: Line,
        mode: Mode,
        buffer: FluxBuffer,
    },
}

impl ArmError {
    pub fn into_buffer(self) -> FluxBuffer {
        match self {
            ArmError::AlreadyArmed { buffer, .. } => buffer,
        }
    }
}

/// Owner of the timer bank and of every arming decision on it.
pub struct FluxTimer<B> {
    bank: B,
    modes: [Option<Mode>; 2],
    capacity: [usize; 2],
}

impl<B: TimerBank> FluxTimer<B> {
    pub fn new(bank: B) -> Self {
        Self {
            bank,
            modes: [None; 2],
            capacity: [0; 2],
        }
    }

    /// Start latching edge timestamps on `line` into `buffer`.
    ///
    /// The ring is cleared first so that nothing from an earlier arming can be read back.
    pub fn arm_capture(&mut self, line: Line, mut buffer: FluxBuffer) -> Result<(), ArmError> {
        buffer.clear();
        self.arm(line, Mode::Capture, buffer)
    }

    /// Start emitting one edge per period stored in `buffer`.
    ///
    /// The caller primes the ring before arming; the DMA begins fetching immediately.
    pub fn arm_generate(&mut self, line: Line, buffer: FluxBuffer) -> Result<(), ArmError> {
        self.arm(line, Mode::Generate, buffer)
    }

    fn arm(&mut self, line: Line, mode: Mode, buffer: FluxBuffer) -> Result<(), ArmError> {
        let i = line.index();
        if let Some(current) = self.modes[i] {
            return Err(ArmError::AlreadyArmed {
                line,
                mode: current,
                buffer,
            });
        }
        self.capacity[i] = buffer.capacity();
        self.modes[i] = Some(mode);
        self.bank.start(line, mode, buffer);
        Ok(())
    }

    /// Stop `line` and take its ring back, cleared. Stale boundary events are discarded.
    pub fn disarm(&mut self, line: Line) -> Option<FluxBuffer> {
        let i = line.index();
        self.modes[i]?;
        self.modes[i] = None;
        self.capacity[i] = 0;
        let mut buffer = self.bank.stop(line);
        while self.bank.take_event(line).is_some() {}
        if let Some(b) = buffer.as_mut() {
            b.clear();
        }
        buffer
    }

    #[inline]
    pub fn mode(&self, line: Line) -> Option<Mode> {
        self.modes[line.index()]
    }

    /// Software view of an armed ring.
    pub fn ring(&mut self, line: Line) -> Option<ArmedRing<'_, B>> {
        self.mode(line)?;
        let capacity = self.capacity[line.index()];
        Some(ArmedRing {
            bank: &mut self.bank,
            line,
            capacity,
        })
    }

    #[inline]
    pub fn dma_index(&self, line: Line) -> usize {
        self.bank.dma_index(line)
    }

    /// Next boundary event for an armed line. Idle lines never report events.
    pub fn take_event(&mut self, line: Line) -> Option<DmaEvent> {
        self.mode(line)?;
        self.bank.take_event(line)
    }

    #[inline]
    pub fn take_index(&mut self) -> Option<u32> {
        self.bank.take_index()
    }

    #[inline]
    pub fn counter(&self) -> u32 {
        self.bank.counter()
    }

    pub fn free(self) -> B {
        self.bank
    }
}

/// A ring currently owned by the DMA, accessed through the bank.
pub struct ArmedRing<'a, B> {
    bank: &'a mut B,
    line: Line,
    capacity: usize,
}

impl<B: TimerBank> Ring for ArmedRing<'_, B> {
    #[inline]
    fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    fn load(&self, index: usize) -> u32 {
        self.bank.load(self.line, index)
    }

    #[inline]
    fn store(&mut self, index: usize, value: u32) {
        self.bank.store(self.line, index, value)
    }
}
