// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Flux timing: the timer/DMA capability and the capture and generation engines built on it.

pub mod buffer;
pub mod capture;
pub mod generate;
pub mod timer;

pub use buffer::{FluxBuffer, FluxSample, Ring, HOLD};
pub use capture::CaptureEngine;
pub use generate::GenerationEngine;
pub use timer::{ArmError, DmaEvent, FluxTimer, Line, Mode, TimerBank};
