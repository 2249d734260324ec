// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Microsecond clock from the DWT cycle counter.
//!
//! CYCCNT wraps every ~19.9 s at 216 MHz; [`CycleClock::now`] must be called more often than that,
//! which the main loop does.

use cortex_m::peripheral::{DCB, DWT};

use crate::config::Instant;
use crate::protocol::Clock;

pub struct CycleClock {
    dwt: DWT,
    cycles_per_us: u32,
    last: u32,
    total: u64,
}

impl CycleClock {
    pub fn new(mut dwt: DWT, dcb: &mut DCB, sysclk_hz: u32) -> Self {
        dcb.enable_trace();
        dwt.enable_cycle_counter();
        let last = DWT::cycle_count();
        Self {
            dwt,
            cycles_per_us: sysclk_hz / 1_000_000,
            last,
            total: 0,
        }
    }

    pub fn free(self) -> DWT {
        self.dwt
    }
}

impl Clock for CycleClock {
    fn now(&mut self) -> Instant {
        let now = DWT::cycle_count();
        self.total += now.wrapping_sub(self.last) as u64;
        self.last = now;
        Instant::from_ticks(self.total / self.cycles_per_us as u64)
    }
}
