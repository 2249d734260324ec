// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! MCU-level wrappers. `bus` and `led` are generic over embedded-hal pins and build anywhere; the
//! rest program STM32F767 registers and need the `hardware` feature.

pub mod bus;
pub mod led;

#[cfg(feature = "hardware")]
pub mod board;
#[cfg(feature = "hardware")]
pub mod clock;
#[cfg(feature = "hardware")]
pub mod cpu;
#[cfg(feature = "hardware")]
pub mod flash;
#[cfg(feature = "hardware")]
pub mod timer;
#[cfg(feature = "hardware")]
pub mod usart;

pub use bus::PinBus;
pub use led::Led;

#[cfg(feature = "hardware")]
pub use usart::{SerialLink, Usart};
