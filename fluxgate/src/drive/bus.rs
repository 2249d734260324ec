// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Drive-facing bus capability.
//!
//! Methods take logical levels: `true` means asserted, whatever the wire polarity. The 34-pin
//! bus is active-low throughout, which [`crate::hw::bus::PinBus`] takes care of.

use crate::drive::state::Direction;

pub trait DriveBus {
    fn set_select(&mut self, asserted: bool);
    fn set_motor(&mut self, asserted: bool);
    /// Head select: 0 is the bottom side.
    fn set_side(&mut self, side: u8);
    fn set_direction(&mut self, direction: Direction);
    fn set_step(&mut self, asserted: bool);
    fn set_write_gate(&mut self, asserted: bool);
    fn set_density(&mut self, high: bool);

    fn track0(&mut self) -> bool;
    fn write_protect(&mut self) -> bool;
}
