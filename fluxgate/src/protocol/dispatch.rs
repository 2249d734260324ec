// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Command dispatch for both firmware modes.
//!
//! The transport itself (USB endpoints, or a UART standing in for them) is a [`HostLink`].
//! Dispatch reads one byte at a time until a frame completes, acknowledges it, and runs any
//! data phase (flux stream, index times, update file) before looking at the next frame.

use crate::config::{Delays, Instant};
use crate::drive::{DriveBus, DriveController, Event, Phase, Request};
use crate::error::Fault;
use crate::flux::{FluxSample, TimerBank};
use crate::protocol::messages::*;
use crate::protocol::parser::Parser;
use crate::protocol::stream::{self, Decoded, Decoder, MAX_ENCODED};
use crate::update::flash::Flash;
use crate::update::pipeline::UpdatePipeline;
use crate::update::session::UpdateSession;
use crate::update::staging::Staging;

/// Byte pipe to the host.
pub trait HostLink {
    /// Copy whatever has arrived into `buf` without blocking. Returns the byte count.
    fn read(&mut self, buf: &mut [u8]) -> usize;
    /// Send `bytes`, blocking until all are accepted.
    fn write(&mut self, bytes: &[u8]);
}

/// Monotonic time source for scheduling drive deadlines.
pub trait Clock {
    fn now(&mut self) -> Instant;
}

fn ack_of(status: Result<(), Fault>) -> Ack {
    match status {
        Ok(()) => Ack::Okay,
        Err(f) => f.ack(),
    }
}

/// Samples drained from the capture engine per transport write.
const READ_BATCH: usize = 64;

/// Main-firmware dispatcher: drive commands and flux streaming.
pub struct FluxHost<L> {
    link: L,
    parser: Parser,
}

impl<L: HostLink> FluxHost<L> {
    pub fn new(link: L) -> Self {
        Self {
            link,
            parser: Parser::new(FirmwareMode::Main),
        }
    }

    /// One main-loop pass: service the drive, then every complete command waiting on the link.
    pub fn poll<D: DriveBus, B: TimerBank, C: Clock>(
        &mut self,
        drive: &mut DriveController<D, B>,
        clock: &mut C,
    ) -> Option<Event> {
        let event = drive.poll(clock.now());
        let mut byte = [0u8; 1];
        while self.link.read(&mut byte) == 1 {
            match self.parser.push(byte[0]) {
                Some(Ok(cmd)) => self.handle(cmd, drive, clock),
                Some(Err(bad)) => self.reply(bad.cmd, Ack::BadCommand),
                None => {}
            }
        }
        event
    }

    fn reply(&mut self, cmd: u8, ack: Ack) {
        self.link.write(&[cmd, ack as u8]);
    }

    fn handle<D: DriveBus, B: TimerBank, C: Clock>(
        &mut self,
        cmd: Command,
        drive: &mut DriveController<D, B>,
        clock: &mut C,
    ) {
        let id = cmd.id();
        let now = clock.now();
        drive.touch(now);
        match cmd {
            Command::GetInfo { index: 0 } => {
                let cfg = drive.flux_config();
                let info = Info::main(cfg.max_index, cfg.sample_freq_hz);
                self.reply(id, Ack::Okay);
                self.link.write(&info.encode());
            }
            Command::Seek { cylinder } => {
                let res = drive
                    .request(Request::Seek(cylinder), now)
                    .and_then(|()| settle(drive, clock));
                self.reply(id, ack_of(res));
            }
            Command::Side { side } => {
                let res = drive.set_side(side);
                self.reply(id, ack_of(res));
            }
            Command::SetParams {
                index: PARAMS_DELAYS,
                len,
                data,
            } => {
                let mut delays = *drive.delays();
                delays.apply_wire(&data[..len as usize]);
                drive.set_delays(delays);
                self.reply(id, Ack::Okay);
            }
            Command::GetParams {
                index: PARAMS_DELAYS,
                count,
            } if count as usize <= Delays::WIRE_LEN => {
                self.reply(id, Ack::Okay);
                self.link.write(&drive.delays().to_wire()[..count as usize]);
            }
            Command::Motor { on } | Command::Select { on } => {
                let res = if on {
                    drive.select(now);
                    settle(drive, clock)
                } else {
                    drive.deselect();
                    Ok(())
                };
                self.reply(id, ack_of(res));
            }
            Command::ReadFlux { index_pulses } => self.read_flux(index_pulses, drive, clock),
            Command::WriteFlux => self.write_flux(drive, clock),
            Command::GetFluxStatus => self.reply(id, ack_of(drive.flux_status())),
            Command::GetIndexTimes { first, count }
                if first as usize + count as usize <= drive.flux_config().max_index as usize =>
            {
                self.reply(id, Ack::Okay);
                for i in first as usize..first as usize + count as usize {
                    let t = drive.index_times().get(i).copied().unwrap_or(0);
                    self.link.write(&t.to_le_bytes());
                }
            }
            _ => self.reply(id, Ack::BadCommand),
        }
    }

    fn read_flux<D: DriveBus, B: TimerBank, C: Clock>(
        &mut self,
        index_pulses: u8,
        drive: &mut DriveController<D, B>,
        clock: &mut C,
    ) {
        let now = clock.now();
        if let Err(f) = drive.request(Request::Read { index_pulses }, now) {
            self.reply(CMD_READ_FLUX, f.ack());
            return;
        }
        self.reply(CMD_READ_FLUX, Ack::Okay);

        let mut samples = [FluxSample::default(); READ_BATCH];
        let mut out = [0u8; READ_BATCH * MAX_ENCODED];
        loop {
            drive.poll(clock.now());
            let n = drive.read_samples(&mut samples).unwrap_or(0);
            let mut len = 0;
            for &s in &samples[..n] {
                let mut enc = [0u8; MAX_ENCODED];
                let k = stream::encode(s, &mut enc);
                out[len..len + k].copy_from_slice(&enc[..k]);
                len += k;
            }
            if len > 0 {
                self.link.write(&out[..len]);
            }
            if n == 0 && !matches!(drive.phase(), Phase::MotorSpinup | Phase::ReadArmed) {
                break;
            }
        }
        // Outcome is left for GetFluxStatus.
        self.link.write(&[stream::END]);
    }

    fn write_flux<D: DriveBus, B: TimerBank, C: Clock>(
        &mut self,
        drive: &mut DriveController<D, B>,
        clock: &mut C,
    ) {
        let now = clock.now();
        if let Err(f) = drive.request(Request::Write, now) {
            self.reply(CMD_WRITE_FLUX, f.ack());
            return;
        }
        self.reply(CMD_WRITE_FLUX, Ack::Okay);

        let mut decoder = Decoder::new();
        let mut aborted = false;
        let mut byte = [0u8; 1];
        loop {
            drive.poll(clock.now());
            match drive.phase() {
                Phase::MotorSpinup => continue,
                Phase::WriteArmed => {}
                // A fault ended the write; swallow the rest of the stream.
                _ => aborted = true,
            }
            if self.link.read(&mut byte) == 0 {
                continue;
            }
            match decoder.push(byte[0]) {
                Some(Decoded::End) => break,
                Some(Decoded::Sample(s)) if !aborted => {
                    aborted = !queue_sample(s, drive, clock);
                }
                _ => {}
            }
        }

        if drive.phase() == Phase::WriteArmed && drive.finish_write().is_ok() {
            while drive.phase() == Phase::WriteArmed {
                drive.poll(clock.now());
            }
        }
        // Sync byte: the host reads it before asking for the flux status.
        let status = ack_of(drive.flux_status());
        self.link.write(&[status as u8]);
    }

    pub fn free(self) -> L {
        self.link
    }
}

/// Queue one sample, polling the drive while the ring is full. False if the write ended.
fn queue_sample<D: DriveBus, B: TimerBank, C: Clock>(
    s: FluxSample,
    drive: &mut DriveController<D, B>,
    clock: &mut C,
) -> bool {
    loop {
        match drive.write_samples(&[s]) {
            Ok(0) => {
                drive.poll(clock.now());
                if drive.phase() != Phase::WriteArmed {
                    return false;
                }
            }
            Ok(_) => return true,
            Err(_) => return false,
        }
    }
}

/// Poll until spin-up and any seek have finished.
fn settle<D: DriveBus, B: TimerBank, C: Clock>(
    drive: &mut DriveController<D, B>,
    clock: &mut C,
) -> Result<(), Fault> {
    loop {
        if let Some(Event::Failed(f)) = drive.poll(clock.now()) {
            return Err(f);
        }
        if !matches!(drive.phase(), Phase::MotorSpinup | Phase::Seeking) {
            return Ok(());
        }
    }
}

/// Update-mode dispatcher: `GetInfo` and `Update` only.
pub struct UpdateHost<L> {
    link: L,
    parser: Parser,
    jumpered: bool,
}

impl<L: HostLink> UpdateHost<L> {
    /// `jumpered` is reported to the host in `GetInfo`.
    pub fn new(link: L, jumpered: bool) -> Self {
        Self {
            link,
            parser: Parser::new(FirmwareMode::Update),
            jumpered,
        }
    }

    /// Service waiting commands. Returns the outcome of an update attempt if one ran.
    pub fn poll<F: Flash, S: Staging>(
        &mut self,
        pipeline: &mut UpdatePipeline<F, S>,
    ) -> Option<Result<(), Fault>> {
        let mut byte = [0u8; 1];
        let mut outcome = None;
        while self.link.read(&mut byte) == 1 {
            match self.parser.push(byte[0]) {
                Some(Ok(Command::GetInfo { index: 0 })) => {
                    self.link.write(&[CMD_GET_INFO, Ack::Okay as u8]);
                    self.link.write(&Info::update(self.jumpered).encode());
                }
                Some(Ok(Command::Update { length })) => {
                    outcome = Some(self.update(length, pipeline));
                }
                Some(Ok(cmd)) => self.link.write(&[cmd.id(), Ack::BadCommand as u8]),
                Some(Err(bad)) => self.link.write(&[bad.cmd, Ack::BadCommand as u8]),
                None => {}
            }
        }
        outcome
    }

    fn update<F: Flash, S: Staging>(
        &mut self,
        length: u32,
        pipeline: &mut UpdatePipeline<F, S>,
    ) -> Result<(), Fault> {
        let mut session = match UpdateSession::start(pipeline, length) {
            Ok(s) => s,
            Err(f) => {
                self.link.write(&[CMD_UPDATE, f.ack() as u8]);
                return Err(f);
            }
        };
        self.link.write(&[CMD_UPDATE, Ack::Okay as u8]);

        let mut result = Ok(());
        let mut left = length as usize;
        let mut chunk = [0u8; 64];
        while left > 0 {
            let want = left.min(chunk.len());
            let n = self.link.read(&mut chunk[..want]);
            left -= n;
            if n > 0 && result.is_ok() {
                // After a failure the rest of the file is read and dropped.
                result = session.feed(pipeline, &chunk[..n]).map(|_| ());
            }
        }
        let code = match result {
            Ok(()) => 0,
            Err(f) => f.ack() as u8,
        };
        self.link.write(&[code]);
        result
    }

    pub fn free(self) -> L {
        self.link
    }
}
