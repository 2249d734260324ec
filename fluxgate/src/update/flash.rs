// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Sector-addressed non-volatile storage capability.
//!
//! The flash controller is a single owned handle. Sectors are the erase unit and may differ in
//! size (STM32F7 mixes 32K, 128K and 256K sectors). A byte may only be programmed while erased;
//! callers erase first, implementations report a [`StorageFault`] if that is violated.

use crate::error::StorageFault;

/// Value of an erased flash byte.
pub const ERASED: u8 = 0xFF;

/// One erasable sector.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Sector {
    pub base: u32,
    pub size: u32,
}

impl Sector {
    pub const fn new(base: u32, size: u32) -> Self {
        Self { base, size }
    }

    #[inline]
    pub fn end(&self) -> u32 {
        self.base + self.size
    }

    #[inline]
    pub fn contains(&self, addr: u32) -> bool {
        addr >= self.base && addr < self.end()
    }
}

/// A contiguous run of sectors, by index.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SectorRange {
    pub first: usize,
    pub count: usize,
}

impl SectorRange {
    #[inline]
    pub fn end(&self) -> usize {
        self.first + self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[inline]
    pub fn contains(&self, sector: usize) -> bool {
        sector >= self.first && sector < self.end()
    }

    pub fn overlaps(&self, other: &SectorRange) -> bool {
        self.first < other.end() && other.first < self.end()
    }

    /// First byte address of the range.
    pub fn base(&self, sectors: &[Sector]) -> u32 {
        sectors[self.first].base
    }

    /// Total size of the range in bytes.
    pub fn len_bytes(&self, sectors: &[Sector]) -> u32 {
        sectors[self.first..self.end()].iter().map(|s| s.size).sum()
    }

    /// The sectors of this range that an image of `len` bytes at the range base touches.
    pub fn spanned_by(&self, sectors: &[Sector], len: u32) -> SectorRange {
        let mut covered = 0u32;
        let mut count = 0;
        for s in &sectors[self.first..self.end()] {
            if covered >= len {
                break;
            }
            covered += s.size;
            count += 1;
        }
        SectorRange {
            first: self.first,
            count,
        }
    }
}

/// Flash controller operations needed by the update pipeline and boot selector.
pub trait Flash {
    /// Sector geometry, in address order.
    fn sectors(&self) -> &[Sector];

    /// Erase one sector to [`ERASED`].
    fn erase(&mut self, sector: usize) -> Result<(), StorageFault>;

    /// Program `data` at `addr`. Every target byte must currently be erased.
    fn program(&mut self, addr: u32, data: &[u8]) -> Result<(), StorageFault>;

    /// Read `buf.len()` bytes starting at `addr`.
    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), StorageFault>;
}

/// Index of the sector containing `addr`.
pub fn sector_of(sectors: &[Sector], addr: u32) -> Option<usize> {
    sectors.iter().position(|s| s.contains(addr))
}

/// Compare flash contents at `addr` against `expected`, returning the first mismatching address.
pub fn verify<F: Flash + ?Sized>(
    flash: &mut F,
    addr: u32,
    expected: &[u8],
) -> Result<(), StorageFault> {
    let mut scratch = [0u8; 64];
    let mut offset = 0usize;
    while offset < expected.len() {
        let n = (expected.len() - offset).min(scratch.len());
        let at = addr + offset as u32;
        flash.read(at, &mut scratch[..n])?;
        if let Some(i) = scratch[..n]
            .iter()
            .zip(&expected[offset..offset + n])
            .position(|(a, b)| a != b)
        {
            return Err(StorageFault::Verify(at + i as u32));
        }
        offset += n;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::STM32F767_SECTORS;

    #[test]
    fn sector_lookup() {
        assert_eq!(sector_of(&STM32F767_SECTORS, 0x0800_0000), Some(0));
        assert_eq!(sector_of(&STM32F767_SECTORS, 0x0801_7FFF), Some(2));
        assert_eq!(sector_of(&STM32F767_SECTORS, 0x0802_0000), Some(4));
        assert_eq!(sector_of(&STM32F767_SECTORS, 0x0820_0000), None);
    }

    #[test]
    fn spanned_sectors_cover_image_only() {
        let app = SectorRange { first: 4, count: 8 };
        // 128K sector 4 exactly.
        assert_eq!(
            app.spanned_by(&STM32F767_SECTORS, 0x2_0000),
            SectorRange { first: 4, count: 1 }
        );
        // One byte more spills into sector 5.
        assert_eq!(
            app.spanned_by(&STM32F767_SECTORS, 0x2_0001),
            SectorRange { first: 4, count: 2 }
        );
        assert_eq!(app.len_bytes(&STM32F767_SECTORS), 0x2_0000 + 7 * 0x4_0000);
    }
}
