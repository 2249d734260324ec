// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Flux stream byte encoding.
//!
//! | Value | Bytes |
//! | ----- | ----- |
//! | 1..=249 | `v` |
//! | 250..=1499 | `249 + v / 250`, `1 + v % 250` |
//! | 1500.. | `255`, then four bytes of 7 bits each, low bit set |
//! | end of stream | `0` |
//!
//! Index markers are not part of the stream; index times travel separately.

use crate::flux::FluxSample;

/// Largest duration the long form can carry.
pub const MAX_TICKS: u32 = (1 << 28) - 1;

/// Longest encoding of one sample.
pub const MAX_ENCODED: usize = 5;

pub const END: u8 = 0;

/// Encode one sample into `out`, returning the number of bytes used. Index markers produce no
/// bytes; durations beyond [`MAX_TICKS`] saturate.
pub fn encode(sample: FluxSample, out: &mut [u8; MAX_ENCODED]) -> usize {
    let v = sample.ticks().min(MAX_TICKS);
    if v == 0 {
        0
    } else if v < 250 {
        out[0] = v as u8;
        1
    } else if v / 250 <= 5 {
        out[0] = 249 + (v / 250) as u8;
        out[1] = 1 + (v % 250) as u8;
        2
    } else {
        out[0] = 255;
        out[1] = 1 | ((v << 1) & 255) as u8;
        out[2] = 1 | ((v >> 6) & 255) as u8;
        out[3] = 1 | ((v >> 13) & 255) as u8;
        out[4] = 1 | ((v >> 20) & 255) as u8;
        5
    }
}

/// Output of [`Decoder::push`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Decoded {
    Sample(FluxSample),
    End,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum State {
    Start,
    Short { high: u32 },
    Long { got: u8, acc: u32 },
}

/// Incremental stream decoder; bytes may arrive in any split.
pub struct Decoder {
    state: State,
}

impl Decoder {
    pub const fn new() -> Self {
        Self {
            state: State::Start,
        }
    }

    pub fn push(&mut self, byte: u8) -> Option<Decoded> {
        match self.state {
            State::Start => match byte {
                END => Some(Decoded::End),
                1..=249 => Some(Decoded::Sample(FluxSample::from_ticks(byte as u32))),
                255 => {
                    self.state = State::Long { got: 0, acc: 0 };
                    None
                }
                _ => {
                    self.state = State::Short {
                        high: (byte - 249) as u32,
                    };
                    None
                }
            },
            State::Short { high } => {
                self.state = State::Start;
                let v = high * 250 + (byte as u32).saturating_sub(1);
                Some(Decoded::Sample(FluxSample::from_ticks(v)))
            }
            State::Long { got, acc } => {
                let acc = acc | (((byte & 254) as u32) >> 1) << (7 * got as u32);
                if got < 3 {
                    self.state = State::Long { got: got + 1, acc };
                    return None;
                }
                self.state = State::Start;
                Some(Decoded::Sample(FluxSample::from_ticks(acc)))
            }
        }
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_all(ticks: &[u32]) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = [0u8; MAX_ENCODED];
        for &t in ticks {
            let n = encode(FluxSample::from_ticks(t), &mut buf);
            out.extend_from_slice(&buf[..n]);
        }
        out.push(END);
        out
    }

    fn decode_all(bytes: &[u8]) -> Vec<u32> {
        let mut d = Decoder::new();
        let mut out = Vec::new();
        for &b in bytes {
            match d.push(b) {
                Some(Decoded::Sample(s)) => out.push(s.ticks()),
                Some(Decoded::End) => break,
                None => {}
            }
        }
        out
    }

    #[test]
    fn encoding_boundaries() {
        assert_eq!(encode_all(&[249]), vec![249, 0]);
        assert_eq!(encode_all(&[250]), vec![250, 1, 0]);
        assert_eq!(encode_all(&[1499]), vec![254, 250, 0]);
        assert_eq!(encode_all(&[1500])[0], 255);
        assert_eq!(encode_all(&[1500]).len(), 6);
    }

    #[test]
    fn index_markers_are_not_encoded() {
        assert_eq!(encode_all(&[0, 100, 0]), vec![100, 0]);
    }

    #[test]
    fn decoder_inverts_encoder_across_forms() {
        let ticks = [1, 249, 250, 777, 1499, 1500, 0x12_3456, MAX_TICKS];
        assert_eq!(decode_all(&encode_all(&ticks)), ticks);
    }

    #[test]
    fn oversized_durations_saturate() {
        assert_eq!(decode_all(&encode_all(&[u32::MAX])), vec![MAX_TICKS]);
    }
}
