// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Board configuration: drive delays, flux timing, drive geometry and flash layout.
//!
//! Mechanical timings are physical properties of the attached drive, so every value here is a
//! default that a board (or the host, via `SetParams`) can override. Nothing in the state
//! machines hardcodes them.

use crate::update::flash::{Sector, SectorRange};

/// Microsecond timestamp used for every scheduled delay.
pub type Instant = fugit::TimerInstantU64<1_000_000>;

/// Microsecond duration matching [`Instant`].
pub type Duration = fugit::MicrosDurationU64;

/// Drive timing parameters.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Delays {
    /// Delay after asserting drive select (µs).
    pub select_us: u16,
    /// Spacing between step pulses (µs).
    pub step_us: u16,
    /// Width of a single step pulse (µs).
    pub step_pulse_us: u16,
    /// Head settle time after the last step of a seek (ms).
    pub seek_settle_ms: u16,
    /// Spindle spin-up time after motor on (ms).
    pub motor_ms: u16,
    /// Command inactivity after which the drive is deselected (ms).
    pub auto_off_ms: u16,
}

impl Default for Delays {
    fn default() -> Self {
        Self {
            select_us: 10,
            step_us: 3_000,
            step_pulse_us: 2,
            seek_settle_ms: 15,
            motor_ms: 750,
            auto_off_ms: 10_000,
        }
    }
}

impl Delays {
    /// Size of the `SetParams`/`GetParams` payload.
    pub const WIRE_LEN: usize = 10;

    #[inline]
    pub fn select(&self) -> Duration {
        Duration::micros(self.select_us as u64)
    }

    #[inline]
    pub fn step(&self) -> Duration {
        Duration::micros(self.step_us as u64)
    }

    #[inline]
    pub fn step_pulse(&self) -> Duration {
        Duration::micros(self.step_pulse_us as u64)
    }

    #[inline]
    pub fn seek_settle(&self) -> Duration {
        Duration::millis(self.seek_settle_ms as u64)
    }

    #[inline]
    pub fn motor(&self) -> Duration {
        Duration::millis(self.motor_ms as u64)
    }

    #[inline]
    pub fn auto_off(&self) -> Duration {
        Duration::millis(self.auto_off_ms as u64)
    }

    /// Encode as five little-endian u16 values: select, step, settle, motor, auto-off.
    ///
    /// The step pulse width is a board constant and is not exchanged with the host.
    pub fn to_wire(&self) -> [u8; Self::WIRE_LEN] {
        let mut out = [0u8; Self::WIRE_LEN];
        let fields = [
            self.select_us,
            self.step_us,
            self.seek_settle_ms,
            self.motor_ms,
            self.auto_off_ms,
        ];
        for (chunk, v) in out.chunks_exact_mut(2).zip(fields) {
            chunk.copy_from_slice(&v.to_le_bytes());
        }
        out
    }

    /// Apply a host-supplied parameter block.
    ///
    /// Short blocks update only the leading fields, matching hosts that send a prefix.
    pub fn apply_wire(&mut self, bytes: &[u8]) {
        let mut fields = bytes
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]));
        let slots = [
            &mut self.select_us,
            &mut self.step_us,
            &mut self.seek_settle_ms,
            &mut self.motor_ms,
            &mut self.auto_off_ms,
        ];
        for slot in slots {
            match fields.next() {
                Some(v) => *slot = v,
                None => break,
            }
        }
    }
}

/// Flux sampling parameters.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FluxConfig {
    /// Timer tick rate, reported to the host as the sample frequency.
    pub sample_freq_hz: u32,
    /// Shortest accepted flux interval in ticks. Shorter intervals are noise.
    pub min_cell_ticks: u32,
    /// Index times recorded per capture.
    pub max_index: u8,
    /// Time to wait for an index pulse before giving up (ms).
    pub index_timeout_ms: u16,
}

impl FluxConfig {
    /// TIM2/TIM5 clocked from APB1 x2 at 108 MHz, no prescaler.
    pub const STM32F767: Self = Self {
        sample_freq_hz: 108_000_000,
        // 500 ns: a quarter of the shortest legal MFM interval at high density.
        min_cell_ticks: 54,
        max_index: 15,
        index_timeout_ms: 2_000,
    };

    #[inline]
    pub fn index_timeout(&self) -> Duration {
        Duration::millis(self.index_timeout_ms as u64)
    }
}

impl Default for FluxConfig {
    fn default() -> Self {
        Self::STM32F767
    }
}

/// Head travel limits.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DriveGeometry {
    /// Innermost cylinder the head may be stepped to.
    pub max_cylinder: u8,
    /// Outward steps attempted while looking for track 0.
    pub max_recal_steps: u16,
}

impl Default for DriveGeometry {
    fn default() -> Self {
        Self {
            max_cylinder: 83,
            max_recal_steps: 256,
        }
    }
}

/// Placement of the two images and the boot selector in flash.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FlashLayout {
    /// Bootloader and update pipeline image.
    pub updater: SectorRange,
    /// Sector holding the boot selector records.
    pub selector: usize,
    /// Application image written by the update pipeline.
    pub application: SectorRange,
}

impl FlashLayout {
    /// Sectors 0-1 updater, 2 selector, 3 spare, 4-11 application.
    pub const STM32F767: Self = Self {
        updater: SectorRange { first: 0, count: 2 },
        selector: 2,
        application: SectorRange { first: 4, count: 8 },
    };

    /// Check that all regions exist on `sectors` and that none overlap.
    pub fn is_valid(&self, sectors: &[Sector]) -> bool {
        let n = sectors.len();
        if self.updater.is_empty() || self.application.is_empty() {
            return false;
        }
        if self.updater.end() > n || self.application.end() > n || self.selector >= n {
            return false;
        }
        !self.updater.overlaps(&self.application)
            && !self.updater.contains(self.selector)
            && !self.application.contains(self.selector)
    }
}

impl Default for FlashLayout {
    fn default() -> Self {
        Self::STM32F767
    }
}

/// STM32F767 single-bank flash: 4 x 32K, 1 x 128K, 7 x 256K.
pub const STM32F767_SECTORS: [Sector; 12] = [
    Sector::new(0x0800_0000, 0x8000),
    Sector::new(0x0800_8000, 0x8000),
    Sector::new(0x0801_0000, 0x8000),
    Sector::new(0x0801_8000, 0x8000),
    Sector::new(0x0802_0000, 0x2_0000),
    Sector::new(0x0804_0000, 0x4_0000),
    Sector::new(0x0808_0000, 0x4_0000),
    Sector::new(0x080C_0000, 0x4_0000),
    Sector::new(0x0810_0000, 0x4_0000),
    Sector::new(0x0814_0000, 0x4_0000),
    Sector::new(0x0818_0000, 0x4_0000),
    Sector::new(0x081C_0000, 0x4_0000),
];

/// On-chip SRAM window used to sanity check an image's initial stack pointer.
pub const STM32F767_RAM: core::ops::Range<u32> = 0x2000_0000..0x2008_0001;
