// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Polarity-aware digital outputs: status LEDs, and the level helper the drive bus shares.

use embedded_hal::digital::v2::OutputPin;

/// Whether the line is driven active-high or active-low on the board wiring.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ActiveLevel {
    High,
    Low,
}

/// Drive `pin` logically on or off. Pin errors are infallible on this MCU and ignored.
pub fn drive<PIN: OutputPin>(pin: &mut PIN, active: ActiveLevel, on: bool) {
    match (active, on) {
        (ActiveLevel::High, true) | (ActiveLevel::Low, false) => pin.set_high().ok(),
        (ActiveLevel::High, false) | (ActiveLevel::Low, true) => pin.set_low().ok(),
    };
}

/// LED abstraction that remembers its active level and last known state.
pub struct Led<PIN: OutputPin> {
    pin: PIN,
    active: ActiveLevel,
    is_on: bool,
}

impl<PIN: OutputPin> Led<PIN> {
    /// Create an LED wrapper, initializing it to OFF.
    pub fn new(mut pin: PIN, active: ActiveLevel) -> Self {
        drive(&mut pin, active, false);
        Self {
            pin,
            active,
            is_on: false,
        }
    }

    /// Drive the LED logically ON (true) or OFF (false).
    pub fn set(&mut self, on: bool) {
        drive(&mut self.pin, self.active, on);
        self.is_on = on;
    }

    #[inline]
    pub fn on(&mut self) {
        self.set(true);
    }

    #[inline]
    pub fn off(&mut self) {
        self.set(false);
    }

    pub fn toggle(&mut self) {
        self.set(!self.is_on);
    }

    #[inline]
    pub fn is_on(&self) -> bool {
        self.is_on
    }

    pub fn free(self) -> PIN {
        self.pin
    }
}

impl<PIN: OutputPin> Led<PIN> {
    pub fn active_high(pin: PIN) -> Self {
        Self::new(pin, ActiveLevel::High)
    }
    pub fn active_low(pin: PIN) -> Self {
        Self::new(pin, ActiveLevel::Low)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::convert::Infallible;

    #[derive(Default)]
    struct Pin {
        high: bool,
    }

    impl OutputPin for Pin {
        type Error = Infallible;
        fn set_low(&mut self) -> Result<(), Infallible> {
            self.high = false;
            Ok(())
        }
        fn set_high(&mut self) -> Result<(), Infallible> {
            self.high = true;
            Ok(())
        }
    }

    #[test]
    fn active_low_led_starts_off_and_toggles() {
        let mut led = Led::active_low(Pin::default());
        assert!(!led.is_on());
        led.toggle();
        assert!(led.is_on());
        assert!(!led.free().high);
    }
}
