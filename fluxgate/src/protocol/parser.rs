// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Frame parser for the host command protocol.
//!
//! Bytes are pushed one at a time as they arrive from the transport; a complete frame is
//! decoded against the live command set.

use crate::protocol::messages::*;

/// A complete frame that did not decode. The host still gets `[cmd, BadCommand]`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BadFrame {
    pub cmd: u8,
}

enum State {
    WaitCmd,
    WaitLen { cmd: u8 },
    Params { cmd: u8, len: usize },
}

pub struct Parser {
    mode: FirmwareMode,
    state: State,
    buf: [u8; MAX_FRAME],
    got: usize,
}

impl Parser {
    pub fn new(mode: FirmwareMode) -> Self {
        Self {
            mode,
            state: State::WaitCmd,
            buf: [0; MAX_FRAME],
            got: 0,
        }
    }

    #[inline]
    pub fn mode(&self) -> FirmwareMode {
        self.mode
    }

    /// Process a single incoming byte. Returns the decoded frame once its last byte arrives.
    pub fn push(&mut self, byte: u8) -> Option<Result<Command, BadFrame>> {
        match self.state {
            State::WaitCmd => {
                self.state = State::WaitLen { cmd: byte };
                None
            }
            State::WaitLen { cmd } => {
                let len = byte as usize;
                if !(2..=MAX_FRAME).contains(&len) {
                    // Length is nonsense; nothing more of this frame can be trusted.
                    self.state = State::WaitCmd;
                    return Some(Err(BadFrame { cmd }));
                }
                if len == 2 {
                    self.state = State::WaitCmd;
                    return Some(self.decode(cmd, 0));
                }
                self.got = 0;
                self.state = State::Params { cmd, len: len - 2 };
                None
            }
            State::Params { cmd, len } => {
                self.buf[self.got] = byte;
                self.got += 1;
                if self.got < len {
                    return None;
                }
                self.state = State::WaitCmd;
                Some(self.decode(cmd, len))
            }
        }
    }

    fn decode(&self, cmd: u8, len: usize) -> Result<Command, BadFrame> {
        Command::decode(self.mode, cmd, &self.buf[..len]).ok_or(BadFrame { cmd })
    }
}
