// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! USART wrappers: the debug console sink and the host command link.
//!
//! The console (USART1) is write-only and is normally wrapped in a
//! [`Console`](crate::console::Console) so `writeln!` produces CRLF line endings.
//!
//! To access the terminal on the host machine, connect to the debug USB port and use
//! ```text
//! $ screen /dev/tty.usbmodem* <baud_rate>
//! ```
//!
//! To close the debug terminal, press `Ctrl+A` then `Ctrl+\` then `y`.

use core::fmt;
use nb::block;

use stm32f7xx_hal::{
    prelude::*,
    serial::{Instance, Pins, Rx, Serial, Tx},
};

use crate::protocol::HostLink;

/// Blocking transmit-only USART.
pub struct Usart<U: Instance> {
    tx: Tx<U>,
}

impl<U: Instance> Usart<U> {
    pub fn new<PINS: Pins<U>>(serial: Serial<U, PINS>) -> Self {
        let (tx, _rx) = serial.split();
        Self { tx }
    }

    #[inline]
    pub fn write_byte(&mut self, b: u8) {
        let _ = block!(self.tx.write(b));
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.write_byte(b);
        }
    }

    /// Block until the hardware TX FIFO/drain is flushed.
    #[inline]
    pub fn flush(&mut self) {
        let _ = block!(self.tx.flush());
    }
}

impl<U: Instance> fmt::Write for Usart<U> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.write_bytes(s.as_bytes());
        Ok(())
    }
}

/// Full-duplex USART carrying host commands and flux streams.
pub struct SerialLink<U: Instance> {
    tx: Usart<U>,
    rx: Rx<U>,
    /// Receive errors (overrun, framing, noise) seen and dropped.
    errors: u32,
}

impl<U: Instance> SerialLink<U> {
    pub fn new<PINS: Pins<U>>(serial: Serial<U, PINS>) -> Self {
        let (tx, rx) = serial.split();
        Self {
            tx: Usart { tx },
            rx,
            errors: 0,
        }
    }

    #[inline]
    pub fn errors(&self) -> u32 {
        self.errors
    }
}

impl<U: Instance> HostLink for SerialLink<U> {
    fn read(&mut self, buf: &mut [u8]) -> usize {
        let mut n = 0;
        while n < buf.len() {
            match self.rx.read() {
                Ok(b) => {
                    buf[n] = b;
                    n += 1;
                }
                Err(nb::Error::WouldBlock) => break,
                Err(nb::Error::Other(_)) => self.errors = self.errors.wrapping_add(1),
            }
        }
        n
    }

    fn write(&mut self, bytes: &[u8]) {
        self.tx.write_bytes(bytes);
    }
}
