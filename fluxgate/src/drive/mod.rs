// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Drive control: bus capability, drive state, and the state machine that owns both.

pub mod bus;
pub mod controller;
pub mod state;

pub use bus::DriveBus;
pub use controller::{DriveController, Event, Request};
pub use state::{Direction, DriveState, Phase};
