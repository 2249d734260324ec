// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Cortex-M7 core control for the boot hand-over.

use cortex_m::peripheral::{NVIC, SCB};

use crate::boot::VectorControl;

/// NVIC enable/pending register banks implemented on the STM32F767 (98 lines).
const NVIC_BANKS: usize = 4;

pub struct CortexM {
    nvic: NVIC,
    scb: SCB,
}

impl CortexM {
    pub fn new(nvic: NVIC, scb: SCB) -> Self {
        Self { nvic, scb }
    }

    /// Load SP and PC from the vector table at `base` and branch. Never returns.
    ///
    /// # Safety
    ///
    /// `base` must hold a runnable vector table and VTOR must already point at it.
    pub unsafe fn jump(&mut self, base: u32) -> ! {
        cortex_m::asm::bootload(base as *const u32)
    }
}

impl VectorControl for CortexM {
    fn disable_interrupts(&mut self) {
        cortex_m::interrupt::disable();
    }

    fn clear_nvic(&mut self) {
        for i in 0..NVIC_BANKS {
            unsafe {
                self.nvic.icer[i].write(u32::MAX);
                self.nvic.icpr[i].write(u32::MAX);
            }
        }
        cortex_m::asm::dsb();
        cortex_m::asm::isb();
    }

    fn set_vector_table(&mut self, base: u32) {
        unsafe { self.scb.vtor.write(base) };
        cortex_m::asm::dsb();
        cortex_m::asm::isb();
    }
}
