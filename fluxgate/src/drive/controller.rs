// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Drive control state machine.
//!
//! The controller is the only code that drives the bus outputs, the only writer of
//! [`DriveState`], and the only caller of arm/disarm on the flux lines. It never blocks:
//! every mechanical delay is a deadline checked by [`DriveController::poll`].
//!
//! ```text
//!   Idle ──select──▶ MotorSpinup ──motor delay──▶ Ready ◀──┐
//!                                                 │  │  │    │ settle / done / timing fault
//!                                     seek/step ◀─┘  │  └─▶ ReadArmed, WriteArmed
//!                                      Seeking ──────┘
//!   any ──deselect, mechanical fault, auto-off──▶ Idle
//! ```

use crate::config::{Delays, DriveGeometry, FluxConfig, Instant};
use crate::drive::bus::DriveBus;
use crate::drive::state::{Direction, DriveState, Phase};
use crate::error::{Fault, MechanicalFault, ProtocolFault, TimingFault};
use crate::flux::{
    CaptureEngine, FluxBuffer, FluxSample, FluxTimer, GenerationEngine, Line, Ring, TimerBank,
};

/// Operation requested by the host.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Request {
    /// Position the head on an absolute cylinder. Cylinder 0 always recalibrates.
    Seek(u8),
    /// Relative move. Inward moves need a known position and stop at the inner limit.
    Step { direction: Direction, count: u8 },
    /// Capture flux until `index_pulses` index pulses have been seen.
    Read { index_pulses: u8 },
    /// Generate flux from samples supplied through [`DriveController::write_samples`].
    Write,
}

/// Something the caller should know about, returned from [`DriveController::poll`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    SpunUp,
    Seeked { cylinder: Option<u8> },
    ReadComplete,
    WriteComplete,
    /// Deselected after a period without commands.
    AutoOff,
    Failed(Fault),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Stage {
    /// Stepping outward looking for TRK0, then inward to `then`.
    Recal { tried: u16, then: u8 },
    Stepping { direction: Direction, left: u8 },
    Settling,
}

#[derive(Copy, Clone, Debug)]
struct Seek {
    stage: Stage,
    /// Step line is asserted and the pulse must be ended on the next deadline.
    pulse: bool,
}

pub struct DriveController<D, B> {
    bus: D,
    timer: FluxTimer<B>,
    /// The flux ring while no line is armed.
    parked: Option<FluxBuffer>,
    ring_capacity: usize,
    capture: CaptureEngine,
    generate: GenerationEngine,

    state: DriveState,
    delays: Delays,
    geometry: DriveGeometry,
    flux: FluxConfig,

    pending: Option<Request>,
    seek: Option<Seek>,
    deadline: Option<Instant>,
    last_command: Instant,
    flux_status: Result<(), Fault>,
}

impl<D: DriveBus, B: TimerBank> DriveController<D, B> {
    pub fn new(
        mut bus: D,
        timer: FluxTimer<B>,
        buffer: FluxBuffer,
        delays: Delays,
        geometry: DriveGeometry,
        flux: FluxConfig,
    ) -> Self {
        bus.set_write_gate(false);
        bus.set_step(false);
        bus.set_motor(false);
        bus.set_select(false);
        Self {
            bus,
            timer,
            ring_capacity: buffer.capacity(),
            parked: Some(buffer),
            capture: CaptureEngine::new(&flux),
            generate: GenerationEngine::new(&flux),
            state: DriveState::new(),
            delays,
            geometry,
            flux,
            pending: None,
            seek: None,
            deadline: None,
            last_command: Instant::from_ticks(0),
            flux_status: Ok(()),
        }
    }

    #[inline]
    pub fn state(&self) -> &DriveState {
        &self.state
    }

    #[inline]
    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    #[inline]
    pub fn delays(&self) -> &Delays {
        &self.delays
    }

    pub fn set_delays(&mut self, delays: Delays) {
        self.delays = delays;
    }

    #[inline]
    pub fn flux_config(&self) -> &FluxConfig {
        &self.flux
    }

    /// Outcome of the last read or write.
    #[inline]
    pub fn flux_status(&self) -> Result<(), Fault> {
        self.flux_status
    }

    /// Index-to-index tick counts from the last read.
    #[inline]
    pub fn index_times(&self) -> &[u32] {
        self.capture.index_times()
    }

    /// Transitions queued for the write head by the current or last write.
    #[inline]
    pub fn scheduled_transitions(&self) -> u64 {
        self.generate.scheduled()
    }

    /// Restart the inactivity timer. Every host command counts.
    #[inline]
    pub fn touch(&mut self, now: Instant) {
        self.last_command = now;
    }

    /// Assert select and motor and start the spin-up delay.
    pub fn select(&mut self, now: Instant) {
        self.touch(now);
        if self.state.selected {
            return;
        }
        self.bus.set_select(true);
        self.bus.set_motor(true);
        self.state.selected = true;
        self.state.motor_on = true;
        self.state.phase = Phase::MotorSpinup;
        self.deadline = Some(now + self.delays.select() + self.delays.motor());
    }

    /// Drop everything and return to idle. Armed lines are torn down first.
    pub fn deselect(&mut self) {
        self.park(Line::ReadData);
        self.park(Line::WriteData);
        self.bus.set_write_gate(false);
        self.bus.set_step(false);
        self.bus.set_motor(false);
        self.bus.set_select(false);
        self.state.selected = false;
        self.state.motor_on = false;
        self.state.phase = Phase::Idle;
        self.pending = None;
        self.seek = None;
        self.deadline = None;
    }

    pub fn set_side(&mut self, side: u8) -> Result<(), Fault> {
        if side > 1 {
            return Err(ProtocolFault::BadCommand.into());
        }
        if matches!(self.state.phase, Phase::ReadArmed | Phase::WriteArmed) {
            return Err(ProtocolFault::InvalidState.into());
        }
        self.bus.set_side(side);
        self.state.side = side;
        Ok(())
    }

    pub fn set_density(&mut self, high: bool) {
        self.bus.set_density(high);
        self.state.high_density = high;
    }

    /// Start `req`, or queue it behind the spin-up delay.
    pub fn request(&mut self, req: Request, now: Instant) -> Result<(), Fault> {
        self.touch(now);
        self.sample_sensors();
        match self.state.phase {
            Phase::Idle => Err(MechanicalFault::NotReady.into()),
            Phase::MotorSpinup => {
                if self.pending.is_some() {
                    return Err(ProtocolFault::InvalidState.into());
                }
                self.check(req).map_err(|f| self.fail(f))?;
                self.pending = Some(req);
                Ok(())
            }
            Phase::Ready => {
                self.check(req).map_err(|f| self.fail(f))?;
                self.start(req, now).map_err(|f| self.fail(f))
            }
            _ => Err(ProtocolFault::InvalidState.into()),
        }
    }

    /// Refusals that must happen before any line moves.
    fn check(&self, req: Request) -> Result<(), Fault> {
        match req {
            Request::Seek(cyl) if cyl > self.geometry.max_cylinder => {
                Err(MechanicalFault::InnerLimit(cyl).into())
            }
            Request::Step {
                direction: Direction::Inward,
                count,
            } => {
                let cur = self.state.cylinder.ok_or(MechanicalFault::Uncalibrated)?;
                let target = cur as u16 + count as u16;
                if target > self.geometry.max_cylinder as u16 {
                    return Err(MechanicalFault::InnerLimit(target.min(u8::MAX as u16) as u8).into());
                }
                Ok(())
            }
            Request::Read { index_pulses: 0 } => Err(ProtocolFault::BadCommand.into()),
            Request::Write if !self.state.write_allowed() => {
                Err(MechanicalFault::WriteProtected.into())
            }
            _ => Ok(()),
        }
    }

    fn start(&mut self, req: Request, now: Instant) -> Result<(), Fault> {
        match req {
            Request::Seek(cyl) => {
                let stage = match self.state.cylinder {
                    Some(cur) if cyl != 0 => self.steps_to(cur, cyl),
                    _ => {
                        self.set_direction(Direction::Outward);
                        Stage::Recal { tried: 0, then: cyl }
                    }
                };
                self.begin_seek(stage, now);
            }
            Request::Step { direction, count } => {
                self.set_direction(direction);
                self.begin_seek(
                    Stage::Stepping {
                        direction,
                        left: count,
                    },
                    now,
                );
            }
            Request::Read { index_pulses } => {
                let buffer = self.parked.take().ok_or(ProtocolFault::InvalidState)?;
                // Pulses latched before arming belong to no capture.
                while self.timer.take_index().is_some() {}
                if let Err(e) = self.timer.arm_capture(Line::ReadData, buffer) {
                    self.parked = Some(e.into_buffer());
                    return Err(ProtocolFault::InvalidState.into());
                }
                self.capture
                    .begin(self.timer.counter(), Some(index_pulses as u32));
                self.flux_status = Ok(());
                self.state.phase = Phase::ReadArmed;
                self.deadline = Some(now + self.flux.index_timeout());
            }
            Request::Write => {
                if self.parked.is_none() {
                    return Err(ProtocolFault::InvalidState.into());
                }
                self.generate.begin();
                self.flux_status = Ok(());
                self.state.phase = Phase::WriteArmed;
            }
        }
        Ok(())
    }

    fn steps_to(&mut self, cur: u8, cyl: u8) -> Stage {
        let direction = if cyl >= cur {
            Direction::Inward
        } else {
            Direction::Outward
        };
        self.set_direction(direction);
        Stage::Stepping {
            direction,
            left: cur.abs_diff(cyl),
        }
    }

    fn set_direction(&mut self, direction: Direction) {
        self.bus.set_direction(direction);
        self.state.direction = direction;
    }

    fn begin_seek(&mut self, stage: Stage, now: Instant) {
        self.seek = Some(Seek {
            stage,
            pulse: false,
        });
        self.state.phase = Phase::Seeking;
        self.deadline = Some(now);
    }

    /// Advance the seek by one timed action.
    fn seek_tick(&mut self, now: Instant) -> Option<Event> {
        let mut seek = self.seek?;

        if seek.pulse {
            self.bus.set_step(false);
            seek.pulse = false;
            self.seek = Some(seek);
            self.deadline = Some(now + self.delays.step());
            return None;
        }

        match seek.stage {
            Stage::Recal { tried, then } => {
                if self.bus.track0() {
                    self.state.cylinder = Some(0);
                    seek.stage = if then == 0 {
                        Stage::Settling
                    } else {
                        self.set_direction(Direction::Inward);
                        Stage::Stepping {
                            direction: Direction::Inward,
                            left: then,
                        }
                    };
                    self.seek = Some(seek);
                    self.deadline = Some(now);
                    return None;
                }
                if tried >= self.geometry.max_recal_steps {
                    return Some(Event::Failed(
                        self.fail(MechanicalFault::NoTrack0 { steps: tried }.into()),
                    ));
                }
                seek.stage = Stage::Recal {
                    tried: tried + 1,
                    then,
                };
                self.state.cylinder = None;
                self.pulse(seek, now);
            }
            Stage::Stepping { direction, left } => {
                let at_limit = match direction {
                    Direction::Outward => self.bus.track0(),
                    Direction::Inward => self
                        .state
                        .cylinder
                        .map_or(true, |c| c >= self.geometry.max_cylinder),
                };
                if left == 0 || at_limit {
                    if direction == Direction::Outward && at_limit {
                        self.state.cylinder = Some(0);
                    }
                    seek.stage = Stage::Settling;
                    self.seek = Some(seek);
                    self.deadline = Some(now + self.delays.seek_settle());
                    return None;
                }
                seek.stage = Stage::Stepping {
                    direction,
                    left: left - 1,
                };
                self.state.cylinder = self.state.cylinder.map(|c| match direction {
                    Direction::Inward => c + 1,
                    Direction::Outward => c.saturating_sub(1),
                });
                self.pulse(seek, now);
            }
            Stage::Settling => {
                self.seek = None;
                self.state.phase = Phase::Ready;
                return Some(Event::Seeked {
                    cylinder: self.state.cylinder,
                });
            }
        }
        None
    }

    fn pulse(&mut self, mut seek: Seek, now: Instant) {
        self.bus.set_step(true);
        seek.pulse = true;
        self.seek = Some(seek);
        self.deadline = Some(now + self.delays.step_pulse());
    }

    /// Hand out captured samples, index markers included.
    pub fn read_samples(&mut self, out: &mut [FluxSample]) -> Result<usize, Fault> {
        if self.state.phase != Phase::ReadArmed {
            return Ok(0);
        }
        let dma_index = self.timer.dma_index(Line::ReadData);
        let Some(ring) = self.timer.ring(Line::ReadData) else {
            return Ok(0);
        };
        Ok(self.capture.drain(&ring, dma_index, out)?)
    }

    /// Queue host samples for the write head, returning how many were taken.
    ///
    /// The DMA is started, and the write gate asserted, once the first half of the ring is
    /// primed.
    pub fn write_samples(&mut self, samples: &[FluxSample]) -> Result<usize, Fault> {
        if self.state.phase != Phase::WriteArmed {
            return Err(ProtocolFault::InvalidState.into());
        }
        if self.timer.mode(Line::WriteData).is_some() {
            let dma_index = self.timer.dma_index(Line::WriteData);
            return match self.timer.ring(Line::WriteData) {
                Some(mut ring) => Ok(self.generate.feed(&mut ring, dma_index, samples)?),
                None => Ok(0),
            };
        }
        let buffer = self.parked.as_mut().ok_or(ProtocolFault::InvalidState)?;
        let taken = self.generate.feed(buffer, 0, samples)?;
        if self.generate.is_primed(self.ring_capacity) {
            self.start_generation()?;
        }
        Ok(taken)
    }

    /// No more samples for this write. Completion is reported by [`poll`](Self::poll).
    pub fn finish_write(&mut self) -> Result<(), Fault> {
        if self.state.phase != Phase::WriteArmed {
            return Err(ProtocolFault::InvalidState.into());
        }
        if self.timer.mode(Line::WriteData).is_some() {
            let dma_index = self.timer.dma_index(Line::WriteData);
            if let Some(mut ring) = self.timer.ring(Line::WriteData) {
                self.generate.finish(&mut ring, dma_index);
            }
            return Ok(());
        }
        let buffer = self.parked.as_mut().ok_or(ProtocolFault::InvalidState)?;
        self.generate.finish(buffer, 0);
        if self.generate.scheduled() > 0 {
            self.start_generation()?;
        }
        Ok(())
    }

    fn start_generation(&mut self) -> Result<(), Fault> {
        self.sample_sensors();
        if !self.state.write_allowed() {
            return Err(self.fail(MechanicalFault::WriteProtected.into()));
        }
        let buffer = self.parked.take().ok_or(ProtocolFault::InvalidState)?;
        self.bus.set_write_gate(true);
        if let Err(e) = self.timer.arm_generate(Line::WriteData, buffer) {
            self.bus.set_write_gate(false);
            self.parked = Some(e.into_buffer());
            return Err(ProtocolFault::InvalidState.into());
        }
        Ok(())
    }

    /// Service DMA boundaries, index pulses and deadlines, in that order.
    pub fn poll(&mut self, now: Instant) -> Option<Event> {
        self.sample_sensors();

        if let Some(ev) = self.service_dma() {
            return Some(ev);
        }
        while let Some(ts) = self.timer.take_index() {
            if self.state.phase == Phase::ReadArmed && !self.capture.is_complete() {
                self.capture.on_index(ts);
                self.deadline = Some(now + self.flux.index_timeout());
            }
        }

        match self.state.phase {
            Phase::ReadArmed => {
                if let Some(f) = self.capture.fault() {
                    return Some(self.timing_fault(Line::ReadData, f));
                }
                if self.capture.is_complete() {
                    self.park(Line::ReadData);
                    self.finish_flux(Ok(()));
                    return Some(Event::ReadComplete);
                }
            }
            Phase::WriteArmed => {
                if let Some(f) = self.generate.fault() {
                    return Some(self.timing_fault(Line::WriteData, f));
                }
                let drained = self.generate.is_finished()
                    && (self.timer.mode(Line::WriteData).is_none()
                        || self
                            .generate
                            .is_drained(self.ring_capacity, self.timer.dma_index(Line::WriteData)));
                if drained {
                    self.park(Line::WriteData);
                    self.bus.set_write_gate(false);
                    self.finish_flux(Ok(()));
                    return Some(Event::WriteComplete);
                }
            }
            _ => {}
        }

        if let Some(deadline) = self.deadline {
            if now >= deadline {
                self.deadline = None;
                return self.on_deadline(now);
            }
        }

        if self.state.phase == Phase::Ready && now >= self.last_command + self.delays.auto_off() {
            self.deselect();
            return Some(Event::AutoOff);
        }
        None
    }

    fn service_dma(&mut self) -> Option<Event> {
        while let Some(ev) = self.timer.take_event(Line::ReadData) {
            if let Err(f) = self.capture.on_dma_event(self.ring_capacity, ev) {
                return Some(self.timing_fault(Line::ReadData, f));
            }
        }
        while let Some(ev) = self.timer.take_event(Line::WriteData) {
            let res = match self.timer.ring(Line::WriteData) {
                Some(mut ring) => self.generate.on_dma_event(&mut ring, ev),
                None => Ok(()),
            };
            if let Err(f) = res {
                return Some(self.timing_fault(Line::WriteData, f));
            }
        }
        None
    }

    fn on_deadline(&mut self, now: Instant) -> Option<Event> {
        match self.state.phase {
            Phase::MotorSpinup => {
                self.state.phase = Phase::Ready;
                match self.pending.take() {
                    Some(req) => match self.start(req, now) {
                        Ok(()) => Some(Event::SpunUp),
                        Err(f) => Some(Event::Failed(self.fail(f))),
                    },
                    None => Some(Event::SpunUp),
                }
            }
            Phase::Seeking => self.seek_tick(now),
            Phase::ReadArmed => Some(Event::Failed(self.fail(MechanicalFault::NoIndex.into()))),
            _ => None,
        }
    }

    fn sample_sensors(&mut self) {
        self.state.track0 = self.bus.track0();
        self.state.write_protect = self.bus.write_protect();
    }

    /// Disarm `line` and take its ring back.
    fn park(&mut self, line: Line) {
        if let Some(buffer) = self.timer.disarm(line) {
            self.parked = Some(buffer);
        }
    }

    fn finish_flux(&mut self, status: Result<(), Fault>) {
        self.flux_status = status;
        self.state.phase = Phase::Ready;
        self.deadline = None;
    }

    /// Timing faults end the operation only; the drive stays spinning.
    fn timing_fault(&mut self, line: Line, fault: TimingFault) -> Event {
        self.park(line);
        if line == Line::WriteData {
            self.bus.set_write_gate(false);
        }
        self.finish_flux(Err(fault.into()));
        Event::Failed(fault.into())
    }

    /// Mechanical faults stop the drive. Other refusals leave the state alone.
    fn fail(&mut self, fault: Fault) -> Fault {
        if let Fault::Mechanical(m) = fault {
            if matches!(m, MechanicalFault::NoTrack0 { .. }) {
                self.state.cylinder = None;
            }
            if matches!(
                m,
                MechanicalFault::NoIndex | MechanicalFault::WriteProtected
            ) {
                self.flux_status = Err(fault);
            }
            self.deselect();
        }
        fault
    }

    pub fn free(self) -> (D, FluxTimer<B>) {
        (self.bus, self.timer)
    }
}
