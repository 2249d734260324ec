// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! # Fluxgate Firmware
//!
//! Firmware for an STM32F767 floppy flux transceiver: it samples the raw magnetic flux
//! transitions from a floppy drive's read head, regenerates them onto the write head, and drives
//! the 34-pin bus (select, motor, step, side) under host command. A resident bootloader can
//! replace the application image over the same host link.
//!
//! ## Crate Structure
//!
//! | Module | Purpose |
//! | ------ | -------- |
//! | [`flux`] | Timer/DMA arming, flux capture and generation engines |
//! | [`drive`] | Drive bus capability and the drive control state machine |
//! | [`protocol`] | Host command frames, flux stream codec, command dispatch |
//! | [`update`] | Flash capability, staging, boot selector, firmware update pipeline |
//! | [`boot`] | Reset-time choice between updater and application |
//! | [`config`] | Timing parameters, flux settings, flash layout |
//! | [`error`] | Fault taxonomy and host acknowledgement codes |
//! | [`console`] | CRLF debug console over any `fmt::Write` |
//! | [`hw`] | MCU-level wrappers: GPIO bus, timers, DMA, flash, USART |
//!
//! Everything except the register-level half of [`hw`] builds on the host, so the state machines
//! are tested with `cargo test`.
//!
//! ## Getting Started
//!
//! Build docs:
//!
//! ```bash
//! cargo doc --no-deps --open
//! ```
//!
//! Build both images (see `.cargo/config.toml`):
//!
//! ```bash
//! cargo bootloader
//! cargo firmware
//! ```
//!
//! ## License
//!
//! Licensed under the **MIT License**.
//! See the `LICENSE` file in the repository root for full terms.
//!
//! © 2025–2026 Christopher Liu

#![cfg_attr(not(test), no_std)]

pub mod boot;
pub mod config;
pub mod console;
pub mod drive;
pub mod error;
pub mod flux;
pub mod hw;
pub mod protocol;
pub mod update;
