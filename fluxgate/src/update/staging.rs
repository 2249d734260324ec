// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Staging area for an incoming image.
//!
//! Nothing is erased until the whole image sits here with a matching checksum.

use crate::error::StorageFault;

pub trait Staging {
    /// Largest image that fits.
    fn capacity(&self) -> u32;

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), StorageFault>;

    fn read(&self, offset: u32, buf: &mut [u8]) -> Result<(), StorageFault>;
}

/// Staging in a RAM region borrowed for the duration of the update.
pub struct RamStaging<'a> {
    buf: &'a mut [u8],
}

impl<'a> RamStaging<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf }
    }

    fn range(&self, offset: u32, len: usize) -> Result<core::ops::Range<usize>, StorageFault> {
        let start = offset as usize;
        let end = start
            .checked_add(len)
            .filter(|&end| end <= self.buf.len())
            .ok_or(StorageFault::OutOfRange(offset))?;
        Ok(start..end)
    }
}

impl Staging for RamStaging<'_> {
    fn capacity(&self) -> u32 {
        self.buf.len() as u32
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), StorageFault> {
        let range = self.range(offset, bytes.len())?;
        self.buf[range].copy_from_slice(bytes);
        Ok(())
    }

    fn read(&self, offset: u32, buf: &mut [u8]) -> Result<(), StorageFault> {
        let range = self.range(offset, buf.len())?;
        buf.copy_from_slice(&self.buf[range]);
        Ok(())
    }
}
