// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Update file reception.
//!
//! After `Update(len)` the host streams `len` bytes: the image followed by its CRC-32 as a
//! little-endian u32. The session peels the trailer off and drives the pipeline's
//! begin/write/finalize as bytes arrive.

use crate::error::{Fault, ProtocolFault};
use crate::update::flash::Flash;
use crate::update::pipeline::UpdatePipeline;
use crate::update::staging::Staging;

/// Length of the CRC trailer.
pub const TRAILER_LEN: u32 = 4;

pub struct UpdateSession {
    image_len: u32,
    /// Bytes of the file consumed so far.
    received: u32,
    trailer: [u8; TRAILER_LEN as usize],
}

impl UpdateSession {
    /// Open a session for a file of `file_len` bytes.
    pub fn start<F: Flash, S: Staging>(
        pipeline: &mut UpdatePipeline<F, S>,
        file_len: u32,
    ) -> Result<Self, Fault> {
        if file_len <= TRAILER_LEN {
            return Err(ProtocolFault::SizeExceeded {
                declared: file_len.saturating_sub(TRAILER_LEN),
                capacity: pipeline.capacity(),
            }
            .into());
        }
        let image_len = file_len - TRAILER_LEN;
        pipeline.begin(image_len)?;
        Ok(Self {
            image_len,
            received: 0,
            trailer: [0; TRAILER_LEN as usize],
        })
    }

    /// Bytes still expected from the host.
    #[inline]
    pub fn remaining(&self) -> u32 {
        self.image_len + TRAILER_LEN - self.received
    }

    /// Consume a piece of the file. Once the last byte has arrived the image is finalized and
    /// `Ok(true)` returned.
    pub fn feed<F: Flash, S: Staging>(
        &mut self,
        pipeline: &mut UpdatePipeline<F, S>,
        mut bytes: &[u8],
    ) -> Result<bool, Fault> {
        if bytes.len() as u64 > self.remaining() as u64 {
            return Err(ProtocolFault::Overflow {
                declared: self.image_len + TRAILER_LEN,
                end: self.received.saturating_add(bytes.len() as u32),
            }
            .into());
        }
        if self.received < self.image_len {
            let n = ((self.image_len - self.received) as usize).min(bytes.len());
            pipeline.write(self.received, &bytes[..n])?;
            self.received += n as u32;
            bytes = &bytes[n..];
        }
        for &b in bytes {
            self.trailer[(self.received - self.image_len) as usize] = b;
            self.received += 1;
        }
        if self.remaining() > 0 {
            return Ok(false);
        }
        pipeline.finalize(u32::from_le_bytes(self.trailer))?;
        Ok(true)
    }
}
