// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Boot vector manager.
//!
//! Runs first thing after reset, before any peripheral interrupt is enabled. Deciding is pure
//! (selector, jumper, image sanity); acting goes through [`VectorControl`] so the order of
//! "mask, clear, relocate" can be checked off-target.

use core::ops::Range;

use crate::config::FlashLayout;
use crate::update::flash::Flash;
use crate::update::selector::{BootSelector, BootTarget};

/// Core registers touched while handing over the vector table.
pub trait VectorControl {
    /// Mask all configurable interrupts.
    fn disable_interrupts(&mut self);
    /// Disable every NVIC line and clear anything pending.
    fn clear_nvic(&mut self);
    /// Point VTOR at `base`.
    fn set_vector_table(&mut self, base: u32);
}

/// Reset-time inputs that are not in flash.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BootInputs {
    /// Update jumper fitted: stay in the updater whatever the selector says.
    pub update_jumper: bool,
}

/// Why a target was chosen.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BootReason {
    /// Selector names the application and its vector table is sane.
    Selected,
    /// Selector names the updater (first boot, or an update in progress).
    UpdatePending,
    /// No intact selector record.
    NoSelector,
    Jumper,
    /// Selector names the application but its vector table is not runnable.
    BadImage,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BootPlan {
    pub target: BootTarget,
    pub reason: BootReason,
    /// Vector table base for `target`.
    pub vector_table: u32,
}

pub struct BootManager {
    layout: FlashLayout,
    ram: Range<u32>,
}

impl BootManager {
    /// `ram` bounds the initial stack pointer of a runnable image (end inclusive of the top
    /// address, since the stack starts one past the last word).
    pub fn new(layout: FlashLayout, ram: Range<u32>) -> Self {
        Self { layout, ram }
    }

    pub fn plan<F: Flash + ?Sized>(&self, flash: &mut F, inputs: BootInputs) -> BootPlan {
        let sectors = flash.sectors();
        let updater = self.layout.updater.base(sectors);
        let app = self.layout.application.base(sectors);
        let app_end = app + self.layout.application.len_bytes(sectors);

        let stay = |reason| BootPlan {
            target: BootTarget::Updater,
            reason,
            vector_table: updater,
        };

        if inputs.update_jumper {
            return stay(BootReason::Jumper);
        }
        let selector = BootSelector::new(self.layout.selector);
        match selector.read(flash) {
            Ok(Some(r)) if r.target == BootTarget::Application => {}
            Ok(Some(_)) => return stay(BootReason::UpdatePending),
            Ok(None) | Err(_) => return stay(BootReason::NoSelector),
        }
        if !self.image_runnable(flash, app, app_end) {
            return stay(BootReason::BadImage);
        }
        BootPlan {
            target: BootTarget::Application,
            reason: BootReason::Selected,
            vector_table: app,
        }
    }

    /// Initial SP inside RAM and a Thumb reset vector inside the image.
    fn image_runnable<F: Flash + ?Sized>(&self, flash: &mut F, base: u32, end: u32) -> bool {
        let mut head = [0u8; 8];
        if flash.read(base, &mut head).is_err() {
            return false;
        }
        let sp = u32::from_le_bytes([head[0], head[1], head[2], head[3]]);
        let reset = u32::from_le_bytes([head[4], head[5], head[6], head[7]]);
        self.ram.contains(&sp) && reset & 1 == 1 && (base..end).contains(&(reset & !1))
    }

    /// Mask, clear, then relocate. Must run before any interrupt is enabled.
    pub fn relocate<V: VectorControl + ?Sized>(&self, plan: &BootPlan, cpu: &mut V) {
        cpu.disable_interrupts();
        cpu.clear_nvic();
        cpu.set_vector_table(plan.vector_table);
    }
}
