// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Main firmware: host link in, flux out. Entered from the bootloader once it has verified
//! the image and relocated the vector table.

#![no_main]
#![no_std]

use core::fmt::Write;

use cortex_m_rt::entry;
use panic_halt as _;

use hal::{
    pac,
    prelude::*,
    serial::{Config, Serial},
};
use stm32f7xx_hal as hal;

use fluxgate::config::{Delays, DriveGeometry, FluxConfig};
use fluxgate::console::Console;
use fluxgate::drive::{DriveController, Event};
use fluxgate::flux::{FluxBuffer, FluxTimer};
use fluxgate::hw::board::{BoardPins, FluxResources};
use fluxgate::hw::clock::CycleClock;
use fluxgate::hw::{Led, SerialLink, Usart};
use fluxgate::protocol::messages::{VERSION_MAJOR, VERSION_MINOR};
use fluxgate::protocol::FluxHost;

/// Flux ring slots: 8 ms of 2 us cells per half.
const RING_SLOTS: usize = 8192;

#[entry]
fn main() -> ! {
    // Peripherals
    let dp = pac::Peripherals::take().unwrap();
    let mut cp = cortex_m::Peripherals::take().unwrap();

    // GPIO
    let pins = BoardPins::new(dp.GPIOA, dp.GPIOB, dp.GPIOD, dp.GPIOE, dp.GPIOG);

    // Flux timers and drive bus; their clocks go on before RCC is constrained.
    let flux = FluxResources::new(
        &dp.RCC,
        dp.TIM2,
        dp.TIM5,
        dp.DMA1,
        pins.flux,
        pins.bus_out,
        pins.bus_in,
    );

    // Clocks: 216 MHz core, timers at 108 MHz
    let rcc = dp.RCC.constrain();
    let clocks = rcc.cfgr.sysclk(216.MHz()).freeze();

    // LEDs
    let mut activity = Led::active_high(pins.leds.green);
    let mut fault_led = Led::active_high(pins.leds.red);

    // USART2 (DBG)
    let console_cfg = Config {
        baud_rate: 115_200.bps(),
        ..Default::default()
    };
    let serial = Serial::new(
        dp.USART2,
        (pins.console.tx, pins.console.rx),
        &clocks,
        console_cfg,
    );
    let mut console = Console::new(Usart::new(serial));

    // USART3 (host)
    let host_cfg = Config {
        baud_rate: 2_000_000.bps(),
        ..Default::default()
    };
    let serial = Serial::new(dp.USART3, (pins.host.tx, pins.host.rx), &clocks, host_cfg);
    let mut host = FluxHost::new(SerialLink::new(serial));

    let mut clock = CycleClock::new(cp.DWT, &mut cp.DCB, clocks.sysclk().raw());

    let slots = cortex_m::singleton!(: [u32; RING_SLOTS] = [0; RING_SLOTS]).unwrap();
    let ring = FluxBuffer::new(slots).unwrap();
    let flux_cfg = FluxConfig::STM32F767;
    let mut drive = DriveController::new(
        flux.bus,
        FluxTimer::new(flux.bank),
        ring,
        Delays::default(),
        DriveGeometry::default(),
        flux_cfg,
    );

    let _ = writeln!(
        console,
        "fluxgate {}.{}: {} Hz sample clock, {} slot ring",
        VERSION_MAJOR, VERSION_MINOR, flux_cfg.sample_freq_hz, RING_SLOTS
    );

    loop {
        match host.poll(&mut drive, &mut clock) {
            Some(Event::Failed(f)) => {
                fault_led.on();
                let _ = writeln!(console, "fault: {} ({:?})", f, drive.phase());
            }
            Some(ev) => {
                fault_led.off();
                let _ = writeln!(console, "{:?}", ev);
            }
            None => {}
        }
        activity.set(drive.state().motor_on);
    }
}
