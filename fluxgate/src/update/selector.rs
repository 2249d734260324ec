// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Persistent boot selector.
//!
//! A dedicated flash sector holds 16-byte records appended one after another:
//!
//! | Offset | Field |
//! | ------ | ----- |
//! | 0 | magic `0x4C46_4247` |
//! | 4 | target |
//! | 8 | image length |
//! | 12 | CRC-32 of bytes 0..12 |
//!
//! The last programmed record is authoritative. A sector with no records, or whose last record
//! is torn, selects the updater. Appending never rewrites a programmed byte, so a power loss
//! mid-record leaves a torn record (updater) rather than a stale application pointer. When the
//! sector is full it is erased and the new record written at the start; losing power between
//! the two also leaves the updater selected.

use crate::error::StorageFault;
use crate::update::flash::{Flash, ERASED};
use crate::update::CRC32;

const MAGIC: u32 = 0x4C46_4247;
pub const RECORD_LEN: usize = 16;

/// Image that runs after the next reset.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BootTarget {
    Updater,
    Application,
}

impl BootTarget {
    fn code(self) -> u32 {
        match self {
            BootTarget::Updater => 0x5550_4454,
            BootTarget::Application => 0x4150_504C,
        }
    }

    fn from_code(code: u32) -> Option<Self> {
        match code {
            0x5550_4454 => Some(BootTarget::Updater),
            0x4150_504C => Some(BootTarget::Application),
            _ => None,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BootRecord {
    pub target: BootTarget,
    /// Length of the committed application image, 0 for the updater.
    pub image_len: u32,
}

impl BootRecord {
    pub fn encode(&self) -> [u8; RECORD_LEN] {
        let mut out = [0u8; RECORD_LEN];
        out[0..4].copy_from_slice(&MAGIC.to_le_bytes());
        out[4..8].copy_from_slice(&self.target.code().to_le_bytes());
        out[8..12].copy_from_slice(&self.image_len.to_le_bytes());
        let crc = CRC32.checksum(&out[..12]);
        out[12..16].copy_from_slice(&crc.to_le_bytes());
        out
    }

    pub fn decode(raw: &[u8; RECORD_LEN]) -> Option<Self> {
        let word = |i: usize| u32::from_le_bytes([raw[i], raw[i + 1], raw[i + 2], raw[i + 3]]);
        if word(0) != MAGIC || word(12) != CRC32.checksum(&raw[..12]) {
            return None;
        }
        Some(Self {
            target: BootTarget::from_code(word(4))?,
            image_len: word(8),
        })
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum Slot {
    Blank,
    Record(BootRecord),
    Torn,
}

pub struct BootSelector {
    sector: usize,
}

impl BootSelector {
    pub const fn new(sector: usize) -> Self {
        Self { sector }
    }

    fn slots<F: Flash + ?Sized>(&self, flash: &F) -> Result<(u32, usize), StorageFault> {
        let s = flash
            .sectors()
            .get(self.sector)
            .ok_or(StorageFault::OutOfRange(self.sector as u32))?;
        Ok((s.base, s.size as usize / RECORD_LEN))
    }

    fn slot<F: Flash + ?Sized>(flash: &mut F, addr: u32) -> Result<Slot, StorageFault> {
        let mut raw = [0u8; RECORD_LEN];
        flash.read(addr, &mut raw)?;
        if raw.iter().all(|&b| b == ERASED) {
            return Ok(Slot::Blank);
        }
        Ok(BootRecord::decode(&raw).map_or(Slot::Torn, Slot::Record))
    }

    /// Index of the first blank slot and the content of the slot before it.
    fn scan<F: Flash + ?Sized>(&self, flash: &mut F) -> Result<(usize, Slot), StorageFault> {
        let (base, count) = self.slots(flash)?;
        let mut last = Slot::Blank;
        for i in 0..count {
            match Self::slot(flash, base + (i * RECORD_LEN) as u32)? {
                Slot::Blank => return Ok((i, last)),
                s => last = s,
            }
        }
        Ok((count, last))
    }

    /// The authoritative record, if the sector holds an intact one.
    pub fn read<F: Flash + ?Sized>(&self, flash: &mut F) -> Result<Option<BootRecord>, StorageFault> {
        match self.scan(flash)?.1 {
            Slot::Record(r) => Ok(Some(r)),
            Slot::Blank | Slot::Torn => Ok(None),
        }
    }

    /// Target selected for the next reset. Unreadable state selects the updater.
    pub fn target<F: Flash + ?Sized>(&self, flash: &mut F) -> BootTarget {
        match self.read(flash) {
            Ok(Some(r)) => r.target,
            _ => BootTarget::Updater,
        }
    }

    /// Append `record`, compacting the sector if it is full, then read it back.
    pub fn write<F: Flash + ?Sized>(
        &self,
        flash: &mut F,
        record: BootRecord,
    ) -> Result<(), StorageFault> {
        let (base, count) = self.slots(flash)?;
        let (mut next, _) = self.scan(flash)?;
        if next == count {
            flash.erase(self.sector)?;
            next = 0;
        }
        let addr = base + (next * RECORD_LEN) as u32;
        let raw = record.encode();
        flash.program(addr, &raw)?;
        crate::update::flash::verify(flash, addr, &raw)
    }
}
