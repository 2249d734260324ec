// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Debug console.
//!
//! Wraps any [`fmt::Write`] sink (the debug USART on hardware) so callers can `writeln!` with
//! plain `\n`. Carriage returns in the input are dropped; every line feed goes out as CR/LF.

use core::fmt;

pub struct Console<W: fmt::Write> {
    out: W,
}

impl<W: fmt::Write> Console<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn free(self) -> W {
        self.out
    }
}

impl<W: fmt::Write> fmt::Write for Console<W> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for piece in s.split_inclusive('\n') {
            let (line, lf) = match piece.strip_suffix('\n') {
                Some(line) => (line, true),
                None => (piece, false),
            };
            for run in line.split('\r') {
                self.out.write_str(run)?;
            }
            if lf {
                self.out.write_str("\r\n")?;
            }
        }
        Ok(())
    }
}
