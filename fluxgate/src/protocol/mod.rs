// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

pub mod dispatch;
pub mod messages;
pub mod parser;
pub mod stream;

pub use dispatch::{Clock, FluxHost, HostLink, UpdateHost};
pub use messages::{Ack, Command, FirmwareMode, Info};
pub use parser::Parser;
