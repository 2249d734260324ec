// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Fault taxonomy.
//!
//! Flux faults are absorbed by the drive controller and reported as a status. Update faults abort
//! the current attempt only; none of them reset the device.

use thiserror::Error;

use crate::protocol::Ack;

/// DMA boundary faults. Recoverable by disarm and rearm.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimingFault {
    /// Capture DMA was about to overwrite undrained samples.
    #[error("flux capture overrun")]
    Overrun,
    /// Generation DMA reached a half with no samples in it.
    #[error("flux generation underrun")]
    Underrun,
}

/// Drive mechanics refused an operation.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MechanicalFault {
    #[error("track 0 not found after {steps} steps")]
    NoTrack0 { steps: u16 },
    #[error("disk is write protected")]
    WriteProtected,
    #[error("no index pulse")]
    NoIndex,
    #[error("drive not selected or motor not running")]
    NotReady,
    #[error("cylinder {0} is beyond the inner limit")]
    InnerLimit(u8),
    #[error("head position unknown")]
    Uncalibrated,
}

/// Checksum mismatch on an image.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IntegrityFault {
    #[error("received image crc {actual:#010x}, expected {expected:#010x}")]
    Received { expected: u32, actual: u32 },
    #[error("programmed image crc {actual:#010x}, expected {expected:#010x}")]
    Programmed { expected: u32, actual: u32 },
}

/// Non-volatile storage failure.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StorageFault {
    #[error("erase of sector {0} failed")]
    Erase(usize),
    #[error("program at {0:#010x} failed")]
    Program(u32),
    #[error("readback mismatch at {0:#010x}")]
    Verify(u32),
    #[error("address {0:#010x} outside flash")]
    OutOfRange(u32),
}

/// Host sent something the current state cannot accept.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtocolFault {
    #[error("declared length {declared} exceeds capacity {capacity}")]
    SizeExceeded { declared: u32, capacity: u32 },
    #[error("chunk at offset {got}, expected {expected}")]
    OutOfOrder { expected: u32, got: u32 },
    #[error("chunk ending at {end} overflows declared length {declared}")]
    Overflow { declared: u32, end: u32 },
    #[error("image incomplete: {received} of {declared} bytes")]
    Incomplete { received: u32, declared: u32 },
    #[error("command not valid in this state")]
    InvalidState,
    #[error("malformed command")]
    BadCommand,
}

/// Any fault the core can report.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Fault {
    #[error(transparent)]
    Timing(#[from] TimingFault),
    #[error(transparent)]
    Mechanical(#[from] MechanicalFault),
    #[error(transparent)]
    Integrity(#[from] IntegrityFault),
    #[error(transparent)]
    Storage(#[from] StorageFault),
    #[error(transparent)]
    Protocol(#[from] ProtocolFault),
}

impl Fault {
    /// Acknowledgement code sent to the host for this fault.
    pub fn ack(&self) -> Ack {
        match self {
            Fault::Timing(TimingFault::Overrun) => Ack::FluxOverflow,
            Fault::Timing(TimingFault::Underrun) => Ack::FluxUnderflow,
            Fault::Mechanical(MechanicalFault::NoTrack0 { .. })
            | Fault::Mechanical(MechanicalFault::Uncalibrated) => Ack::NoTrk0,
            Fault::Mechanical(MechanicalFault::WriteProtected) => Ack::Wrprot,
            Fault::Mechanical(MechanicalFault::NoIndex) => Ack::NoIndex,
            _ => Ack::BadCommand,
        }
    }

    /// True for faults that end a firmware update attempt.
    pub fn aborts_update(&self) -> bool {
        matches!(
            self,
            Fault::Integrity(_) | Fault::Storage(_) | Fault::Protocol(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flux_faults_map_to_wire_acks() {
        assert_eq!(Fault::from(TimingFault::Overrun).ack(), Ack::FluxOverflow);
        assert_eq!(Fault::from(TimingFault::Underrun).ack(), Ack::FluxUnderflow);
        assert_eq!(
            Fault::from(MechanicalFault::NoTrack0 { steps: 256 }).ack(),
            Ack::NoTrk0
        );
        assert_eq!(Fault::from(MechanicalFault::WriteProtected).ack(), Ack::Wrprot);
        assert_eq!(Fault::from(MechanicalFault::NoIndex).ack(), Ack::NoIndex);
    }

    #[test]
    fn only_update_faults_abort_updates() {
        assert!(Fault::from(StorageFault::Verify(0x0802_0000)).aborts_update());
        assert!(!Fault::from(TimingFault::Overrun).aborts_update());
    }
}
