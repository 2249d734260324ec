// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Flux timer bank for the STM32F767.
//!
//! | Line | Timer | Pin | DMA |
//! | ---- | ----- | --- | --- |
//! | RDATA capture | TIM2_CH1 | PA15 (AF1) | DMA1 stream 5, channel 3 |
//! | INDEX capture | TIM2_CH2 | PB3 (AF1) | none, CC2IF polled |
//! | WDATA generation | TIM5_CH1 | PA0 (AF2) | DMA1 stream 6, channel 6 (TIM5_UP) |
//!
//! Both timers are 32-bit and clocked at 108 MHz without prescaler. TIM2 free-runs from
//! construction so index pulses and the capture counter are always valid.
//!
//! In generation mode the DMA writes ring slots straight into TIM5_ARR, so the ring holds
//! `period - 1`. [`load`](TimerBank::load) and [`store`](TimerBank::store) hide that offset.

use core::ptr;

use stm32f7xx_hal::pac;

use crate::flux::{DmaEvent, FluxBuffer, Line, Mode, Ring, TimerBank, HOLD};

// TIMx_CR1
const CEN: u32 = 1 << 0;
// TIMx_DIER
const UDE: u32 = 1 << 8;
const CC1DE: u32 = 1 << 9;
// TIMx_SR
const CC2IF: u32 = 1 << 2;
const CC2OF: u32 = 1 << 10;
// TIMx_EGR
const UG: u32 = 1 << 0;
// TIMx_CCMR1: CC1S = CC2S = 01 (input on own TI)
const CCMR1_IC1_IC2: u32 = (0b01 << 0) | (0b01 << 8);
// TIMx_CCMR1: OC1M = PWM mode 1
const CCMR1_OC1_PWM1: u32 = 0b110 << 4;
// TIMx_CCER
const CC1E: u32 = 1 << 0;
const CC1P: u32 = 1 << 1;
const CC2E: u32 = 1 << 4;
const CC2P: u32 = 1 << 5;

// DMA_SxCR
const EN: u32 = 1 << 0;
const DIR_M2P: u32 = 0b01 << 6;
const CIRC: u32 = 1 << 8;
const MINC: u32 = 1 << 10;
const PSIZE_32: u32 = 0b10 << 11;
const MSIZE_32: u32 = 0b10 << 13;
const PL_HIGH: u32 = 0b10 << 16;
const fn chsel(ch: u32) -> u32 {
    ch << 25
}

/// WDATA low pulse width (~370 ns).
const WRITE_PULSE_TICKS: u32 = 40;
/// Period before the first ring slot takes effect.
const LEAD_IN_TICKS: u32 = 1_000;

/// DMA1 HISR/HIFCR bit offsets of streams 5 and 6.
const fn flag_shift(line: Line) -> u32 {
    match line {
        Line::ReadData => 6,
        Line::WriteData => 16,
    }
}
const HTIF: u32 = 1 << 4;
const TCIF: u32 = 1 << 5;
const ALL_FLAGS: u32 = 0b11_1101;

const fn stream(line: Line) -> usize {
    match line {
        Line::ReadData => 5,
        Line::WriteData => 6,
    }
}

const fn slot(line: Line) -> usize {
    match line {
        Line::ReadData => 0,
        Line::WriteData => 1,
    }
}

pub struct Stm32TimerBank {
    tim2: pac::TIM2,
    tim5: pac::TIM5,
    dma1: pac::DMA1,
    rings: [Option<FluxBuffer>; 2],
    base: [*mut u32; 2],
    len: [usize; 2],
    /// Second of two boundary flags found set in one read.
    queued: [Option<DmaEvent>; 2],
}

impl Stm32TimerBank {
    /// Take the timers and DMA controller. Their bus clocks must already be enabled.
    pub fn new(tim2: pac::TIM2, tim5: pac::TIM5, dma1: pac::DMA1) -> Self {
        unsafe {
            tim2.cr1.write(|w| w.bits(0));
            tim2.psc.write(|w| w.bits(0));
            tim2.arr.write(|w| w.bits(u32::MAX));
            tim2.ccmr1_input().write(|w| w.bits(CCMR1_IC1_IC2));
            // Both RDATA and INDEX are active-low: latch on the falling edge.
            tim2.ccer.write(|w| w.bits(CC2E | CC2P | CC1P));
            tim2.egr.write(|w| w.bits(UG));
            tim2.sr.write(|w| w.bits(0));
            tim2.cr1.write(|w| w.bits(CEN));

            tim5.cr1.write(|w| w.bits(0));
            tim5.psc.write(|w| w.bits(0));
            tim5.ccmr1_output().write(|w| w.bits(CCMR1_OC1_PWM1));
            tim5.ccr1.write(|w| w.bits(WRITE_PULSE_TICKS));
        }
        Self {
            tim2,
            tim5,
            dma1,
            rings: [None, None],
            base: [ptr::null_mut(); 2],
            len: [0; 2],
            queued: [None; 2],
        }
    }

    fn stream_regs(&self, line: Line) -> &pac::dma1::ST {
        &self.dma1.st[stream(line)]
    }

    fn start_dma(&self, line: Line, periph: u32, mem: *mut u32, len: usize, cr: u32) {
        let st = self.stream_regs(line);
        unsafe {
            st.cr.write(|w| w.bits(0));
            while st.cr.read().bits() & EN != 0 {}
            self.dma1
                .hifcr
                .write(|w| w.bits(ALL_FLAGS << flag_shift(line)));
            st.par.write(|w| w.bits(periph));
            st.m0ar.write(|w| w.bits(mem as u32));
            st.ndtr.write(|w| w.bits(len as u32));
            st.fcr.write(|w| w.bits(0));
            st.cr
                .write(|w| w.bits(cr | CIRC | MINC | PSIZE_32 | MSIZE_32 | PL_HIGH));
            st.cr.modify(|r, w| w.bits(r.bits() | EN));
        }
    }

    fn stop_dma(&self, line: Line) {
        let st = self.stream_regs(line);
        unsafe {
            st.cr.modify(|r, w| w.bits(r.bits() & !EN));
        }
        while st.cr.read().bits() & EN != 0 {}
    }

    fn start_capture(&mut self, base: *mut u32, len: usize) {
        let ccr1 = &self.tim2.ccr1 as *const _ as u32;
        self.start_dma(Line::ReadData, ccr1, base, len, chsel(3));
        unsafe {
            self.tim2.ccer.modify(|r, w| w.bits(r.bits() | CC1E));
            self.tim2.dier.modify(|r, w| w.bits(r.bits() | CC1DE));
        }
    }

    fn start_generate(&mut self, base: *mut u32, len: usize) {
        // Slots were primed as periods; the DMA wants reload values.
        for i in 0..len {
            unsafe {
                let v = ptr::read_volatile(base.add(i));
                ptr::write_volatile(base.add(i), to_reload(v));
            }
        }
        let arr = &self.tim5.arr as *const _ as u32;
        unsafe {
            // ARR is not preloaded: each DMA write shapes the period that just began.
            self.tim5.arr.write(|w| w.bits(LEAD_IN_TICKS - 1));
            self.tim5.egr.write(|w| w.bits(UG));
            self.tim5.sr.write(|w| w.bits(0));
        }
        self.start_dma(Line::WriteData, arr, base, len, chsel(6) | DIR_M2P);
        unsafe {
            self.tim5.ccer.write(|w| w.bits(CC1E | CC1P));
            self.tim5.dier.write(|w| w.bits(UDE));
            self.tim5.cr1.write(|w| w.bits(CEN));
        }
    }

    fn pending_flags(&self, line: Line) -> u32 {
        (self.dma1.hisr.read().bits() >> flag_shift(line)) & (HTIF | TCIF)
    }
}

#[inline]
fn to_reload(period: u32) -> u32 {
    if period == HOLD {
        HOLD
    } else {
        period.saturating_sub(1)
    }
}

#[inline]
fn from_reload(reload: u32) -> u32 {
    if reload == HOLD {
        HOLD
    } else {
        reload + 1
    }
}

impl TimerBank for Stm32TimerBank {
    fn start(&mut self, line: Line, mode: Mode, mut ring: FluxBuffer) {
        let i = slot(line);
        let base = ring.as_mut_ptr();
        let len = ring.capacity();
        self.base[i] = base;
        self.len[i] = len;
        self.queued[i] = None;
        self.rings[i] = Some(ring);
        match (line, mode) {
            (Line::ReadData, Mode::Capture) => self.start_capture(base, len),
            (Line::WriteData, Mode::Generate) => self.start_generate(base, len),
            // RDATA has no output stage and WDATA no input stage on this board.
            _ => {}
        }
    }

    fn stop(&mut self, line: Line) -> Option<FluxBuffer> {
        match line {
            Line::ReadData => unsafe {
                self.tim2.dier.modify(|r, w| w.bits(r.bits() & !CC1DE));
                self.tim2.ccer.modify(|r, w| w.bits(r.bits() & !CC1E));
            },
            Line::WriteData => unsafe {
                // Stop mid-period with the output released.
                self.tim5.cr1.write(|w| w.bits(0));
                self.tim5.dier.write(|w| w.bits(0));
                self.tim5.ccer.write(|w| w.bits(0));
            },
        }
        self.stop_dma(line);
        let i = slot(line);
        self.base[i] = ptr::null_mut();
        self.len[i] = 0;
        self.rings[i].take()
    }

    fn dma_index(&self, line: Line) -> usize {
        let len = self.len[slot(line)];
        if len == 0 {
            return 0;
        }
        let remaining = self.stream_regs(line).ndtr.read().bits() as usize;
        (len - remaining) % len
    }

    fn load(&self, line: Line, index: usize) -> u32 {
        let i = slot(line);
        debug_assert!(index < self.len[i]);
        let raw = unsafe { ptr::read_volatile(self.base[i].add(index)) };
        match line {
            Line::ReadData => raw,
            Line::WriteData => from_reload(raw),
        }
    }

    fn store(&mut self, line: Line, index: usize, value: u32) {
        let i = slot(line);
        debug_assert!(index < self.len[i]);
        let raw = match line {
            Line::ReadData => value,
            Line::WriteData => to_reload(value),
        };
        unsafe { ptr::write_volatile(self.base[i].add(index), raw) }
    }

    fn take_event(&mut self, line: Line) -> Option<DmaEvent> {
        let i = slot(line);
        if let Some(ev) = self.queued[i].take() {
            return Some(ev);
        }
        let flags = self.pending_flags(line);
        if flags == 0 {
            return None;
        }
        unsafe {
            self.dma1
                .hifcr
                .write(|w| w.bits(flags << flag_shift(line)));
        }
        match (flags & HTIF != 0, flags & TCIF != 0) {
            (true, false) => Some(DmaEvent::HalfTransfer),
            (false, true) => Some(DmaEvent::TransferComplete),
            _ => {
                // Both boundaries passed since the last look: the DMA position orders them.
                if self.dma_index(line) < self.len[i] / 2 {
                    self.queued[i] = Some(DmaEvent::TransferComplete);
                    Some(DmaEvent::HalfTransfer)
                } else {
                    self.queued[i] = Some(DmaEvent::HalfTransfer);
                    Some(DmaEvent::TransferComplete)
                }
            }
        }
    }

    fn take_index(&mut self) -> Option<u32> {
        let sr = self.tim2.sr.read().bits();
        if sr & CC2IF == 0 {
            return None;
        }
        // Reading CCR2 clears CC2IF.
        let ts = self.tim2.ccr2.read().bits();
        if sr & CC2OF != 0 {
            unsafe { self.tim2.sr.write(|w| w.bits(!CC2OF)) };
        }
        Some(ts)
    }

    #[inline]
    fn counter(&self) -> u32 {
        self.tim2.cnt.read().bits()
    }
}
