// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! 34-pin drive bus over GPIO.
//!
//! Every control and status line on the bus is active-low. Outputs are open-drain on the board;
//! inputs have pull-ups, so an absent drive reads as "not asserted".

use embedded_hal::digital::v2::{InputPin, OutputPin};

use crate::drive::{Direction, DriveBus};
use crate::hw::led::{drive, ActiveLevel};

/// Host-driven lines.
pub struct BusOutputs<O> {
    pub select: O,
    pub motor: O,
    pub direction: O,
    pub step: O,
    pub write_gate: O,
    pub side: O,
    pub density: O,
}

/// Drive-driven status lines. Index is captured by the flux timer, not polled here.
pub struct BusInputs<I> {
    pub track0: I,
    pub write_protect: I,
}

pub struct PinBus<O, I> {
    out: BusOutputs<O>,
    inp: BusInputs<I>,
}

impl<O: OutputPin, I: InputPin> PinBus<O, I> {
    /// Take the pins and release every output.
    pub fn new(mut out: BusOutputs<O>, inp: BusInputs<I>) -> Self {
        for pin in [
            &mut out.select,
            &mut out.motor,
            &mut out.direction,
            &mut out.step,
            &mut out.write_gate,
            &mut out.side,
            &mut out.density,
        ] {
            drive(pin, ActiveLevel::Low, false);
        }
        Self { out, inp }
    }

    fn asserted(pin: &I) -> bool {
        pin.is_low().unwrap_or(false)
    }

    pub fn free(self) -> (BusOutputs<O>, BusInputs<I>) {
        (self.out, self.inp)
    }
}

impl<O: OutputPin, I: InputPin> DriveBus for PinBus<O, I> {
    fn set_select(&mut self, asserted: bool) {
        drive(&mut self.out.select, ActiveLevel::Low, asserted);
    }

    fn set_motor(&mut self, asserted: bool) {
        drive(&mut self.out.motor, ActiveLevel::Low, asserted);
    }

    fn set_side(&mut self, side: u8) {
        drive(&mut self.out.side, ActiveLevel::Low, side != 0);
    }

    fn set_direction(&mut self, direction: Direction) {
        // DIR asserted steps towards the spindle.
        drive(
            &mut self.out.direction,
            ActiveLevel::Low,
            direction == Direction::Inward,
        );
    }

    fn set_step(&mut self, asserted: bool) {
        drive(&mut self.out.step, ActiveLevel::Low, asserted);
    }

    fn set_write_gate(&mut self, asserted: bool) {
        drive(&mut self.out.write_gate, ActiveLevel::Low, asserted);
    }

    fn set_density(&mut self, high: bool) {
        drive(&mut self.out.density, ActiveLevel::Low, high);
    }

    fn track0(&mut self) -> bool {
        Self::asserted(&self.inp.track0)
    }

    fn write_protect(&mut self) -> bool {
        Self::asserted(&self.inp.write_protect)
    }
}
