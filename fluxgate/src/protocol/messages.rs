// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Host command set.
//!
//! Every command is a frame `[cmd, len, params...]` where `len` counts the whole frame, and is
//! answered with `[cmd, ack]` before any payload.

// Command IDs, main firmware
pub const CMD_GET_INFO: u8 = 0;
pub const CMD_SEEK: u8 = 1;
pub const CMD_SIDE: u8 = 2;
pub const CMD_SET_PARAMS: u8 = 3;
pub const CMD_GET_PARAMS: u8 = 4;
pub const CMD_MOTOR: u8 = 5;
pub const CMD_READ_FLUX: u8 = 6;
pub const CMD_WRITE_FLUX: u8 = 7;
pub const CMD_GET_FLUX_STATUS: u8 = 8;
pub const CMD_GET_INDEX_TIMES: u8 = 9;
pub const CMD_SELECT: u8 = 10;

// Command IDs, update mode
pub const CMD_UPDATE: u8 = 1;

/// `SetParams`/`GetParams` index for the drive delays block.
pub const PARAMS_DELAYS: u8 = 0;

/// Firmware version reported by `GetInfo`.
pub const VERSION_MAJOR: u8 = 0;
pub const VERSION_MINOR: u8 = 3;

/// Longest frame the parser accepts.
pub const MAX_FRAME: usize = 2 + 2 + 10;

/// Acknowledgement codes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Ack {
    Okay = 0,
    BadCommand = 1,
    NoIndex = 2,
    NoTrk0 = 3,
    FluxOverflow = 4,
    FluxUnderflow = 5,
    Wrprot = 6,
}

/// Which command set is live.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FirmwareMode {
    /// Flux I/O firmware.
    Main,
    /// Update pipeline, entered from the bootloader.
    Update,
}

/// Decoded host commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    GetInfo { index: u8 },
    Seek { cylinder: u8 },
    Side { side: u8 },
    SetParams { index: u8, len: u8, data: [u8; 10] },
    GetParams { index: u8, count: u8 },
    Motor { on: bool },
    ReadFlux { index_pulses: u8 },
    WriteFlux,
    GetFluxStatus,
    GetIndexTimes { first: u8, count: u8 },
    Select { on: bool },
    Update { length: u32 },
}

impl Command {
    /// Wire ID, for the acknowledgement.
    pub fn id(&self) -> u8 {
        match self {
            Command::GetInfo { .. } => CMD_GET_INFO,
            Command::Seek { .. } => CMD_SEEK,
            Command::Side { .. } => CMD_SIDE,
            Command::SetParams { .. } => CMD_SET_PARAMS,
            Command::GetParams { .. } => CMD_GET_PARAMS,
            Command::Motor { .. } => CMD_MOTOR,
            Command::ReadFlux { .. } => CMD_READ_FLUX,
            Command::WriteFlux => CMD_WRITE_FLUX,
            Command::GetFluxStatus => CMD_GET_FLUX_STATUS,
            Command::GetIndexTimes { .. } => CMD_GET_INDEX_TIMES,
            Command::Select { .. } => CMD_SELECT,
            Command::Update { .. } => CMD_UPDATE,
        }
    }

    /// Decode a complete frame's parameters. `None` if the frame is not a valid command.
    pub fn decode(mode: FirmwareMode, cmd: u8, params: &[u8]) -> Option<Self> {
        let byte = |i: usize| params.get(i).copied();
        let only = |n: usize| (params.len() == n).then_some(());

        if mode == FirmwareMode::Update {
            return match cmd {
                CMD_GET_INFO => {
                    only(1)?;
                    Some(Command::GetInfo { index: byte(0)? })
                }
                CMD_UPDATE => {
                    only(4)?;
                    Some(Command::Update {
                        length: u32::from_le_bytes([params[0], params[1], params[2], params[3]]),
                    })
                }
                _ => None,
            };
        }

        match cmd {
            CMD_GET_INFO => {
                only(1)?;
                Some(Command::GetInfo { index: byte(0)? })
            }
            CMD_SEEK => {
                only(1)?;
                Some(Command::Seek { cylinder: byte(0)? })
            }
            CMD_SIDE => {
                only(1)?;
                Some(Command::Side { side: byte(0)? })
            }
            CMD_SET_PARAMS => {
                let index = byte(0)?;
                let rest = &params[1..];
                if rest.len() > 10 {
                    return None;
                }
                let mut data = [0u8; 10];
                data[..rest.len()].copy_from_slice(rest);
                Some(Command::SetParams {
                    index,
                    len: rest.len() as u8,
                    data,
                })
            }
            CMD_GET_PARAMS => {
                only(2)?;
                Some(Command::GetParams {
                    index: byte(0)?,
                    count: byte(1)?,
                })
            }
            CMD_MOTOR => {
                only(1)?;
                Some(Command::Motor { on: byte(0)? != 0 })
            }
            CMD_READ_FLUX => {
                only(1)?;
                Some(Command::ReadFlux {
                    index_pulses: byte(0)?,
                })
            }
            // Optional index-to-index and terminate-at-index fields are accepted and ignored:
            // writes always start immediately and run to the end of the stream.
            CMD_WRITE_FLUX if params.is_empty() || params.len() == 5 => Some(Command::WriteFlux),
            CMD_GET_FLUX_STATUS => {
                only(0)?;
                Some(Command::GetFluxStatus)
            }
            CMD_GET_INDEX_TIMES => {
                only(2)?;
                Some(Command::GetIndexTimes {
                    first: byte(0)?,
                    count: byte(1)?,
                })
            }
            CMD_SELECT => {
                only(1)?;
                Some(Command::Select { on: byte(0)? != 0 })
            }
            _ => None,
        }
    }
}

/// `GetInfo` reply payload.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Info {
    pub major: u8,
    pub minor: u8,
    /// Index times kept per read. Zero in update mode.
    pub max_index: u8,
    pub max_cmd: u8,
    /// Tick rate of flux samples. In update mode bit 0 reports the update jumper instead.
    pub sample_freq: u32,
}

impl Info {
    pub const LEN: usize = 32;

    pub fn main(max_index: u8, sample_freq: u32) -> Self {
        Self {
            major: VERSION_MAJOR,
            minor: VERSION_MINOR,
            max_index,
            max_cmd: CMD_SELECT,
            sample_freq,
        }
    }

    pub fn update(jumpered: bool) -> Self {
        Self {
            major: VERSION_MAJOR,
            minor: VERSION_MINOR,
            max_index: 0,
            max_cmd: CMD_UPDATE,
            sample_freq: jumpered as u32,
        }
    }

    pub fn encode(&self) -> [u8; Self::LEN] {
        let mut out = [0u8; Self::LEN];
        out[0] = self.major;
        out[1] = self.minor;
        out[2] = self.max_index;
        out[3] = self.max_cmd;
        out[4..8].copy_from_slice(&self.sample_freq.to_le_bytes());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_mode_has_its_own_command_set() {
        assert_eq!(
            Command::decode(FirmwareMode::Update, CMD_UPDATE, &[0x10, 0x27, 0, 0]),
            Some(Command::Update { length: 10_000 })
        );
        assert_eq!(Command::decode(FirmwareMode::Update, CMD_READ_FLUX, &[2]), None);
        assert_eq!(
            Command::decode(FirmwareMode::Main, CMD_SEEK, &[40]),
            Some(Command::Seek { cylinder: 40 })
        );
    }

    #[test]
    fn write_flux_accepts_both_frame_forms() {
        assert_eq!(
            Command::decode(FirmwareMode::Main, CMD_WRITE_FLUX, &[]),
            Some(Command::WriteFlux)
        );
        assert_eq!(
            Command::decode(FirmwareMode::Main, CMD_WRITE_FLUX, &[0, 0, 0, 0, 1]),
            Some(Command::WriteFlux)
        );
        assert_eq!(Command::decode(FirmwareMode::Main, CMD_WRITE_FLUX, &[0]), None);
    }

    #[test]
    fn info_layout() {
        let raw = Info::update(true).encode();
        assert_eq!(raw[2], 0);
        assert_eq!(raw[3], CMD_UPDATE);
        assert_eq!(&raw[4..8], &[1, 0, 0, 0]);
        assert!(raw[8..].iter().all(|&b| b == 0));

        let raw = Info::main(15, 108_000_000).encode();
        assert_eq!(u32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]), 108_000_000);
    }
}
