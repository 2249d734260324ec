// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Drive state as last commanded and sensed.

/// Controller phase.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Phase {
    /// Deselected, motor off, nothing armed.
    Idle,
    /// Selected, waiting out the spin-up delay.
    MotorSpinup,
    /// Spinning and positioned, ready for the next request.
    Ready,
    /// Step pulses or head settle in progress.
    Seeking,
    /// Read-data line captured into the flux ring.
    ReadArmed,
    /// Write-data line driven from the flux ring, write gate asserted once primed.
    WriteArmed,
}

/// Head step direction.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    /// Towards track 0.
    Outward,
    /// Towards the spindle.
    Inward,
}

/// Everything the controller knows about the attached drive.
///
/// Only the drive controller mutates this; everyone else gets a shared reference.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DriveState {
    pub phase: Phase,
    pub selected: bool,
    pub motor_on: bool,
    pub side: u8,
    pub high_density: bool,
    pub direction: Direction,
    /// Head position; unknown until track 0 has been seen.
    pub cylinder: Option<u8>,
    /// Last TRK0 reading.
    pub track0: bool,
    /// Last WRPROT reading.
    pub write_protect: bool,
}

impl DriveState {
    pub const fn new() -> Self {
        Self {
            phase: Phase::Idle,
            selected: false,
            motor_on: false,
            side: 0,
            high_density: false,
            direction: Direction::Outward,
            cylinder: None,
            track0: false,
            write_protect: false,
        }
    }

    /// Flux may be written: spinning and not protected.
    #[inline]
    pub fn write_allowed(&self) -> bool {
        self.motor_on && !self.write_protect
    }
}

impl Default for DriveState {
    fn default() -> Self {
        Self::new()
    }
}
