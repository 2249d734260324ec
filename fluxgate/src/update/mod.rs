// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Firmware self-update: flash capability, staging, boot selector and the commit pipeline.

use crc::{Crc, CRC_32_ISO_HDLC};

pub mod flash;
pub mod pipeline;
pub mod selector;
pub mod session;
pub mod staging;

pub use flash::{Flash, Sector, SectorRange};
pub use pipeline::{UpdatePipeline, UpdateState};
pub use selector::{BootRecord, BootSelector, BootTarget};
pub use session::UpdateSession;
pub use staging::{RamStaging, Staging};

/// Image and selector record checksum.
pub const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);
