// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Off-target stand-ins for the drive, the timer/DMA bank, flash, the CPU and the host link.
//!
//! One timer tick is one microsecond. The drive, the medium and the timer bank share a single
//! [`World`] that moves forward only when the [`SimClock`] is read, so every poll of the
//! controller sees the hardware exactly one tick further on.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use fluxgate::boot::VectorControl;
use fluxgate::config::{Delays, DriveGeometry, FluxConfig, Instant};
use fluxgate::drive::{Direction, DriveBus, DriveController};
use fluxgate::error::StorageFault;
use fluxgate::flux::{DmaEvent, FluxBuffer, FluxTimer, Line, Mode, Ring, TimerBank, HOLD};
use fluxgate::protocol::{Clock, HostLink};
use fluxgate::update::flash::{Flash, Sector, ERASED};

pub fn ring(slots: usize) -> FluxBuffer {
    FluxBuffer::new(Box::leak(vec![0u32; slots].into_boxed_slice())).unwrap()
}

struct Armed {
    ring: FluxBuffer,
    mode: Mode,
    pos: usize,
    /// Generation: tick at which the current period ends.
    period_end: u64,
    /// Generation: length of the period being emitted, if any.
    current: Option<u32>,
    /// Generation: fetched a HOLD slot; the timer never reloads again.
    stalled: bool,
}

pub struct World {
    pub now: u64,

    // Bus lines, logical levels.
    pub selected: bool,
    pub motor: bool,
    pub side: u8,
    pub inward: bool,
    pub step: bool,
    pub write_gate: bool,
    pub high_density: bool,

    // Mechanics.
    pub head: u8,
    pub max_head: u8,
    pub track0_broken: bool,
    pub write_protect: bool,
    pub step_pulses: u32,
    pub gate_asserts: u32,

    // Medium: repeating flux intervals and the index period.
    pub track: Vec<u32>,
    track_pos: usize,
    next_edge: Option<u64>,
    pub index_period: Option<u64>,

    // Timer bank.
    lines: [Option<Armed>; 2],
    events: [VecDeque<DmaEvent>; 2],
    index: VecDeque<u32>,
    /// Periods emitted while the write gate was asserted, since the last gate release.
    pub written: Vec<u32>,
    /// Every period emitted on WDATA, gated or not.
    pub emitted: u32,
}

fn slot(line: Line) -> usize {
    match line {
        Line::ReadData => 0,
        Line::WriteData => 1,
    }
}

impl World {
    pub fn new() -> Self {
        Self {
            now: 0,
            selected: false,
            motor: false,
            side: 0,
            inward: false,
            step: false,
            write_gate: false,
            high_density: false,
            head: 17,
            max_head: 90,
            track0_broken: false,
            write_protect: false,
            step_pulses: 0,
            gate_asserts: 0,
            track: (10..50).collect(),
            track_pos: 0,
            next_edge: None,
            index_period: Some(1_000),
            lines: [None, None],
            events: [VecDeque::new(), VecDeque::new()],
            index: VecDeque::new(),
            written: Vec::new(),
            emitted: 0,
        }
    }

    fn spinning(&self) -> bool {
        self.selected && self.motor
    }

    pub fn advance(&mut self, ticks: u64) {
        for _ in 0..ticks {
            self.now += 1;
            self.tick();
        }
    }

    fn tick(&mut self) {
        let t = self.now;
        if self.spinning() {
            if let Some(period) = self.index_period {
                if t % period == 0 {
                    self.index.push_back(t as u32);
                }
            }
            if !self.track.is_empty() {
                let next = *self
                    .next_edge
                    .get_or_insert(t + self.track[self.track_pos] as u64);
                if t == next {
                    self.capture_edge(t as u32);
                    self.track_pos = (self.track_pos + 1) % self.track.len();
                    self.next_edge = Some(t + self.track[self.track_pos] as u64);
                }
            }
        } else {
            self.next_edge = None;
        }
        self.generate_tick(t);
    }

    fn advance_dma(&mut self, i: usize) {
        let Some(armed) = self.lines[i].as_mut() else {
            return;
        };
        let cap = armed.ring.capacity();
        armed.pos += 1;
        if armed.pos == cap / 2 {
            self.events[i].push_back(DmaEvent::HalfTransfer);
        }
        if armed.pos == cap {
            armed.pos = 0;
            self.events[i].push_back(DmaEvent::TransferComplete);
        }
    }

    fn capture_edge(&mut self, ts: u32) {
        let i = slot(Line::ReadData);
        match self.lines[i].as_mut() {
            Some(armed) if armed.mode == Mode::Capture => {
                let pos = armed.pos;
                armed.ring.store(pos, ts);
            }
            _ => return,
        }
        self.advance_dma(i);
    }

    fn generate_tick(&mut self, t: u64) {
        let i = slot(Line::WriteData);
        let (fetch, ended) = match self.lines[i].as_ref() {
            Some(a) if a.mode == Mode::Generate && !a.stalled && t >= a.period_end => {
                (a.ring.load(a.pos), a.current)
            }
            _ => return,
        };
        if let Some(period) = ended {
            self.emitted += 1;
            if self.write_gate {
                self.written.push(period);
            }
        }
        self.advance_dma(i);
        if let Some(a) = self.lines[i].as_mut() {
            if fetch == HOLD {
                a.stalled = true;
                a.current = None;
            } else {
                a.current = Some(fetch);
                a.period_end = t + fetch as u64;
            }
        }
    }
}

pub type Shared = Rc<RefCell<World>>;

pub fn world() -> Shared {
    Rc::new(RefCell::new(World::new()))
}

/// Drive bus wired to the simulated drive.
pub struct SimDrive(pub Shared);

impl DriveBus for SimDrive {
    fn set_select(&mut self, asserted: bool) {
        self.0.borrow_mut().selected = asserted;
    }

    fn set_motor(&mut self, asserted: bool) {
        self.0.borrow_mut().motor = asserted;
    }

    fn set_side(&mut self, side: u8) {
        self.0.borrow_mut().side = side;
    }

    fn set_direction(&mut self, direction: Direction) {
        self.0.borrow_mut().inward = direction == Direction::Inward;
    }

    fn set_step(&mut self, asserted: bool) {
        let mut w = self.0.borrow_mut();
        if asserted && !w.step {
            w.step_pulses += 1;
            if w.inward {
                w.head = (w.head + 1).min(w.max_head);
            } else {
                w.head = w.head.saturating_sub(1);
            }
        }
        w.step = asserted;
    }

    fn set_write_gate(&mut self, asserted: bool) {
        let mut w = self.0.borrow_mut();
        if asserted && !w.write_gate {
            w.gate_asserts += 1;
        }
        if !asserted && w.write_gate && !w.written.is_empty() {
            // What went through the head is now the track.
            w.track = std::mem::take(&mut w.written);
            w.track_pos = 0;
            w.next_edge = None;
        }
        w.write_gate = asserted;
    }

    fn set_density(&mut self, high: bool) {
        self.0.borrow_mut().high_density = high;
    }

    fn track0(&mut self) -> bool {
        let w = self.0.borrow();
        w.head == 0 && !w.track0_broken
    }

    fn write_protect(&mut self) -> bool {
        self.0.borrow().write_protect
    }
}

/// Timer/DMA bank fed by the simulated medium.
pub struct SimTimerBank(pub Shared);

impl TimerBank for SimTimerBank {
    fn start(&mut self, line: Line, mode: Mode, ring: FluxBuffer) {
        let mut w = self.0.borrow_mut();
        let now = w.now;
        w.events[slot(line)].clear();
        w.lines[slot(line)] = Some(Armed {
            ring,
            mode,
            pos: 0,
            period_end: now + 1,
            current: None,
            stalled: false,
        });
    }

    fn stop(&mut self, line: Line) -> Option<FluxBuffer> {
        self.0.borrow_mut().lines[slot(line)].take().map(|a| a.ring)
    }

    fn dma_index(&self, line: Line) -> usize {
        self.0.borrow().lines[slot(line)]
            .as_ref()
            .map_or(0, |a| a.pos)
    }

    fn load(&self, line: Line, index: usize) -> u32 {
        self.0.borrow().lines[slot(line)]
            .as_ref()
            .map_or(0, |a| a.ring.load(index))
    }

    fn store(&mut self, line: Line, index: usize, value: u32) {
        if let Some(a) = self.0.borrow_mut().lines[slot(line)].as_mut() {
            a.ring.store(index, value);
        }
    }

    fn take_event(&mut self, line: Line) -> Option<DmaEvent> {
        self.0.borrow_mut().events[slot(line)].pop_front()
    }

    fn take_index(&mut self) -> Option<u32> {
        self.0.borrow_mut().index.pop_front()
    }

    fn counter(&self) -> u32 {
        self.0.borrow().now as u32
    }
}

/// Reading the clock advances the world by `step` ticks.
pub struct SimClock {
    pub world: Shared,
    pub step: u64,
}

impl Clock for SimClock {
    fn now(&mut self) -> Instant {
        let mut w = self.world.borrow_mut();
        w.advance(self.step);
        Instant::from_ticks(w.now)
    }
}

pub fn test_delays() -> Delays {
    Delays {
        select_us: 10,
        step_us: 100,
        step_pulse_us: 2,
        seek_settle_ms: 1,
        motor_ms: 2,
        auto_off_ms: 50,
    }
}

pub fn test_flux() -> FluxConfig {
    FluxConfig {
        sample_freq_hz: 1_000_000,
        min_cell_ticks: 3,
        max_index: 15,
        index_timeout_ms: 3,
    }
}

pub type SimController = DriveController<SimDrive, SimTimerBank>;

pub struct Rig {
    pub world: Shared,
    pub clock: SimClock,
    pub drive: SimController,
}

pub fn rig_with(ring_slots: usize, geometry: DriveGeometry) -> Rig {
    let world = world();
    let drive = DriveController::new(
        SimDrive(world.clone()),
        FluxTimer::new(SimTimerBank(world.clone())),
        ring(ring_slots),
        test_delays(),
        geometry,
        test_flux(),
    );
    Rig {
        clock: SimClock {
            world: world.clone(),
            step: 1,
        },
        world,
        drive,
    }
}

pub fn rig() -> Rig {
    rig_with(64, DriveGeometry::default())
}

/// Byte pipe with everything the host will send queued up front.
#[derive(Default)]
pub struct SimLink {
    pub rx: VecDeque<u8>,
    pub tx: Vec<u8>,
}

impl SimLink {
    pub fn with_input(bytes: &[u8]) -> Self {
        Self {
            rx: bytes.iter().copied().collect(),
            tx: Vec::new(),
        }
    }
}

impl HostLink for SimLink {
    fn read(&mut self, buf: &mut [u8]) -> usize {
        let mut n = 0;
        while n < buf.len() {
            match self.rx.pop_front() {
                Some(b) => {
                    buf[n] = b;
                    n += 1;
                }
                None => break,
            }
        }
        n
    }

    fn write(&mut self, bytes: &[u8]) {
        self.tx.extend_from_slice(bytes);
    }
}

/// Small mixed-size flash: four 1K sectors then four 4K sectors.
pub const SIM_SECTORS: [Sector; 8] = [
    Sector::new(0x0800_0000, 0x400),
    Sector::new(0x0800_0400, 0x400),
    Sector::new(0x0800_0800, 0x400),
    Sector::new(0x0800_0C00, 0x400),
    Sector::new(0x0800_1000, 0x1000),
    Sector::new(0x0800_2000, 0x1000),
    Sector::new(0x0800_3000, 0x1000),
    Sector::new(0x0800_4000, 0x1000),
];

pub const SIM_APP_BASE: u32 = 0x0800_1000;

pub fn sim_layout() -> fluxgate::config::FlashLayout {
    use fluxgate::update::SectorRange;
    fluxgate::config::FlashLayout {
        updater: SectorRange { first: 0, count: 2 },
        selector: 2,
        application: SectorRange { first: 4, count: 4 },
    }
}

pub const SIM_RAM: std::ops::Range<u32> = 0x2000_0000..0x2002_0001;

pub struct SimFlash {
    pub mem: Vec<u8>,
    pub erases: Vec<usize>,
    pub programs: usize,
    /// Erase of this sector reports failure.
    pub fail_erase: Option<usize>,
    /// A cell that stores its low bit inverted when programmed.
    pub weak_cell: Option<u32>,
    /// Programming across `.0` flips the low bit of the already written byte at `.1`.
    pub disturb: Option<(u32, u32)>,
}

impl SimFlash {
    pub fn new() -> Self {
        let size = SIM_SECTORS.iter().map(|s| s.size as usize).sum();
        Self {
            mem: vec![ERASED; size],
            erases: Vec::new(),
            programs: 0,
            fail_erase: None,
            weak_cell: None,
            disturb: None,
        }
    }

    fn offset(&self, addr: u32, len: usize) -> Result<usize, StorageFault> {
        let base = SIM_SECTORS[0].base;
        if addr < base || (addr - base) as usize + len > self.mem.len() {
            return Err(StorageFault::OutOfRange(addr));
        }
        Ok((addr - base) as usize)
    }

    pub fn bytes(&self, addr: u32, len: usize) -> &[u8] {
        let at = (addr - SIM_SECTORS[0].base) as usize;
        &self.mem[at..at + len]
    }
}

impl Flash for SimFlash {
    fn sectors(&self) -> &[Sector] {
        &SIM_SECTORS
    }

    fn erase(&mut self, sector: usize) -> Result<(), StorageFault> {
        if self.fail_erase == Some(sector) || sector >= SIM_SECTORS.len() {
            return Err(StorageFault::Erase(sector));
        }
        let s = SIM_SECTORS[sector];
        let at = self.offset(s.base, s.size as usize)?;
        self.mem[at..at + s.size as usize].fill(ERASED);
        self.erases.push(sector);
        Ok(())
    }

    fn program(&mut self, addr: u32, data: &[u8]) -> Result<(), StorageFault> {
        let at = self.offset(addr, data.len())?;
        for (i, &b) in data.iter().enumerate() {
            if self.mem[at + i] != ERASED {
                return Err(StorageFault::Program(addr + i as u32));
            }
            let weak = self.weak_cell == Some(addr + i as u32);
            self.mem[at + i] = if weak { b ^ 1 } else { b };
        }
        if let Some((trigger, victim)) = self.disturb {
            if (addr..addr + data.len() as u32).contains(&trigger) {
                let v = self.offset(victim, 1)?;
                self.mem[v] ^= 1;
            }
        }
        self.programs += 1;
        Ok(())
    }

    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), StorageFault> {
        let at = self.offset(addr, buf.len())?;
        buf.copy_from_slice(&self.mem[at..at + buf.len()]);
        Ok(())
    }
}

/// A runnable image for the simulated application region: SP in RAM, Thumb reset vector
/// inside the image, then a recognisable fill.
pub fn app_image(len: usize, seed: u8) -> Vec<u8> {
    let mut img: Vec<u8> = (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect();
    img[0..4].copy_from_slice(&0x2001_0000u32.to_le_bytes());
    img[4..8].copy_from_slice(&(SIM_APP_BASE + 0x101).to_le_bytes());
    img
}

#[derive(Default)]
pub struct SimCpu {
    pub calls: Vec<&'static str>,
    pub vtor: Option<u32>,
}

impl VectorControl for SimCpu {
    fn disable_interrupts(&mut self) {
        self.calls.push("disable_interrupts");
    }

    fn clear_nvic(&mut self) {
        self.calls.push("clear_nvic");
    }

    fn set_vector_table(&mut self, base: u32) {
        self.calls.push("set_vector_table");
        self.vtor = Some(base);
    }
}
