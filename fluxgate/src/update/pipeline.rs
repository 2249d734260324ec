// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Firmware update pipeline.
//!
//! ```text
//! AwaitingImage ─begin─▶ Receiving ─seal─▶ Verifying ─▶ Erasing ─▶ Programming ─▶ Committed
//!                            │                 │           │            │
//!                            └─────────────────┴───────────┴────────────┴──▶ Failed
//! ```
//!
//! Ordering is the whole point:
//!
//! 1. the image is staged completely and its checksum checked before flash is touched;
//! 2. the selector is pointed at the updater before the first erase;
//! 3. only the sectors the image spans are erased;
//! 4. each sector is read back against the staging area once programmed;
//! 5. the CRC of the whole image is recomputed from flash;
//! 6. the selector is pointed at the application. This is the commit point.
//!
//! A reset anywhere before step 6 boots the updater; a reset after it boots the new image.
//! Failures before step 2 leave the selector exactly as it was.

use crate::config::FlashLayout;
use crate::error::{Fault, IntegrityFault, ProtocolFault, StorageFault};
use crate::update::flash::{verify, Flash, SectorRange};
use crate::update::selector::{BootRecord, BootSelector, BootTarget};
use crate::update::staging::Staging;
use crate::update::CRC32;

/// Bytes moved from staging to flash per program call.
const CHUNK: usize = 256;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UpdateState {
    AwaitingImage,
    Receiving,
    Verifying,
    Erasing,
    Programming,
    Committed,
    Failed(Fault),
}

impl UpdateState {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, UpdateState::Committed | UpdateState::Failed(_))
    }
}

pub struct UpdatePipeline<F, S> {
    flash: F,
    staging: S,
    layout: FlashLayout,
    selector: BootSelector,
    state: UpdateState,

    declared: u32,
    received: u32,
    checksum: u32,
    /// Sectors the image will occupy.
    target: SectorRange,
    /// Next sector to erase.
    erase_next: usize,
    /// Bytes programmed and read back.
    programmed: u32,
}

impl<F: Flash, S: Staging> UpdatePipeline<F, S> {
    pub fn new(flash: F, staging: S, layout: FlashLayout) -> Self {
        Self {
            flash,
            staging,
            selector: BootSelector::new(layout.selector),
            layout,
            state: UpdateState::AwaitingImage,
            declared: 0,
            received: 0,
            checksum: 0,
            target: SectorRange {
                first: layout.application.first,
                count: 0,
            },
            erase_next: 0,
            programmed: 0,
        }
    }

    #[inline]
    pub fn state(&self) -> UpdateState {
        self.state
    }

    /// Largest image accepted: the smaller of the staging area and the application region.
    pub fn capacity(&self) -> u32 {
        self.layout
            .application
            .len_bytes(self.flash.sectors())
            .min(self.staging.capacity())
    }

    #[inline]
    pub fn received(&self) -> u32 {
        self.received
    }

    #[inline]
    pub fn programmed(&self) -> u32 {
        self.programmed
    }

    #[inline]
    pub fn selector(&self) -> &BootSelector {
        &self.selector
    }

    /// Start a new image of `declared` bytes.
    ///
    /// An unacceptable length is refused without leaving `AwaitingImage`; nothing has been
    /// received yet, so there is no attempt to fail.
    pub fn begin(&mut self, declared: u32) -> Result<(), Fault> {
        match self.state {
            UpdateState::AwaitingImage | UpdateState::Committed | UpdateState::Failed(_) => {}
            _ => return Err(ProtocolFault::InvalidState.into()),
        }
        self.reset();
        let capacity = self.capacity();
        if declared == 0 || declared > capacity {
            return Err(ProtocolFault::SizeExceeded { declared, capacity }.into());
        }
        self.declared = declared;
        self.state = UpdateState::Receiving;
        Ok(())
    }

    /// Append a chunk. Chunks must arrive in order and stay within the declared length.
    pub fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Fault> {
        if self.state != UpdateState::Receiving {
            return Err(ProtocolFault::InvalidState.into());
        }
        if offset != self.received {
            return Err(self.fail(
                ProtocolFault::OutOfOrder {
                    expected: self.received,
                    got: offset,
                }
                .into(),
            ));
        }
        let end = offset as u64 + bytes.len() as u64;
        if end > self.declared as u64 {
            return Err(self.fail(
                ProtocolFault::Overflow {
                    declared: self.declared,
                    end: end.min(u32::MAX as u64) as u32,
                }
                .into(),
            ));
        }
        if let Err(f) = self.staging.write(offset, bytes) {
            return Err(self.fail(f.into()));
        }
        self.received = end as u32;
        Ok(())
    }

    /// Close reception and record the expected CRC-32. Flash is not touched yet.
    pub fn seal(&mut self, checksum: u32) -> Result<(), Fault> {
        if self.state != UpdateState::Receiving {
            return Err(ProtocolFault::InvalidState.into());
        }
        if self.received != self.declared {
            return Err(self.fail(
                ProtocolFault::Incomplete {
                    received: self.received,
                    declared: self.declared,
                }
                .into(),
            ));
        }
        self.checksum = checksum;
        self.state = UpdateState::Verifying;
        Ok(())
    }

    /// Seal and run every remaining step.
    pub fn finalize(&mut self, checksum: u32) -> Result<(), Fault> {
        self.seal(checksum)?;
        while !self.state.is_terminal() {
            self.step()?;
        }
        Ok(())
    }

    /// Perform one unit of work: the staged CRC, one sector erase, one sector program and
    /// readback, or the final check and commit.
    pub fn step(&mut self) -> Result<UpdateState, Fault> {
        let res = match self.state {
            UpdateState::Verifying => self.verify_staged(),
            UpdateState::Erasing => self.erase_one(),
            UpdateState::Programming => self.program_one(),
            UpdateState::Failed(f) => return Err(f),
            UpdateState::Committed => return Ok(self.state),
            UpdateState::AwaitingImage | UpdateState::Receiving => {
                return Err(ProtocolFault::InvalidState.into())
            }
        };
        match res {
            Ok(()) => Ok(self.state),
            Err(f) => Err(self.fail(f)),
        }
    }

    fn verify_staged(&mut self) -> Result<(), Fault> {
        let mut digest = CRC32.digest();
        let mut buf = [0u8; CHUNK];
        let mut offset = 0;
        while offset < self.declared {
            let n = ((self.declared - offset) as usize).min(CHUNK);
            self.staging.read(offset, &mut buf[..n])?;
            digest.update(&buf[..n]);
            offset += n as u32;
        }
        let actual = digest.finalize();
        if actual != self.checksum {
            return Err(IntegrityFault::Received {
                expected: self.checksum,
                actual,
            }
            .into());
        }

        // From here on the application region is no longer trustworthy.
        self.selector.write(
            &mut self.flash,
            BootRecord {
                target: BootTarget::Updater,
                image_len: 0,
            },
        )?;
        self.target = self
            .layout
            .application
            .spanned_by(self.flash.sectors(), self.declared);
        self.erase_next = self.target.first;
        self.state = UpdateState::Erasing;
        Ok(())
    }

    fn erase_one(&mut self) -> Result<(), Fault> {
        self.flash.erase(self.erase_next)?;
        self.erase_next += 1;
        if self.erase_next == self.target.end() {
            self.state = UpdateState::Programming;
        }
        Ok(())
    }

    fn program_one(&mut self) -> Result<(), Fault> {
        if self.programmed == self.declared {
            return self.commit();
        }
        let base = self.target.base(self.flash.sectors());
        let index = crate::update::flash::sector_of(self.flash.sectors(), base + self.programmed)
            .ok_or(StorageFault::OutOfRange(base + self.programmed))?;
        let sector = self.flash.sectors()[index];
        let end = (sector.end() - base).min(self.declared);

        let mut buf = [0u8; CHUNK];
        let mut offset = self.programmed;
        while offset < end {
            let n = ((end - offset) as usize).min(CHUNK);
            self.staging.read(offset, &mut buf[..n])?;
            self.flash.program(base + offset, &buf[..n])?;
            offset += n as u32;
        }

        // Read the sector back against staging before moving on.
        let mut offset = self.programmed;
        while offset < end {
            let n = ((end - offset) as usize).min(CHUNK);
            self.staging.read(offset, &mut buf[..n])?;
            verify(&mut self.flash, base + offset, &buf[..n])?;
            offset += n as u32;
        }
        self.programmed = end;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), Fault> {
        let base = self.target.base(self.flash.sectors());
        let mut digest = CRC32.digest();
        let mut buf = [0u8; CHUNK];
        let mut offset = 0;
        while offset < self.declared {
            let n = ((self.declared - offset) as usize).min(CHUNK);
            self.flash.read(base + offset, &mut buf[..n])?;
            digest.update(&buf[..n]);
            offset += n as u32;
        }
        let actual = digest.finalize();
        if actual != self.checksum {
            return Err(IntegrityFault::Programmed {
                expected: self.checksum,
                actual,
            }
            .into());
        }
        self.selector.write(
            &mut self.flash,
            BootRecord {
                target: BootTarget::Application,
                image_len: self.declared,
            },
        )?;
        self.state = UpdateState::Committed;
        Ok(())
    }

    fn fail(&mut self, fault: Fault) -> Fault {
        self.state = UpdateState::Failed(fault);
        fault
    }

    fn reset(&mut self) {
        self.state = UpdateState::AwaitingImage;
        self.declared = 0;
        self.received = 0;
        self.checksum = 0;
        self.target.count = 0;
        self.erase_next = 0;
        self.programmed = 0;
    }

    pub fn free(self) -> (F, S) {
        (self.flash, self.staging)
    }
}
