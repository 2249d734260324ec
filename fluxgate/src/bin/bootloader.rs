// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Resident bootloader and updater.
//!
//! Decides at reset whether to run the application. If not (jumper fitted, update pending, or no
//! runnable image) it stays here and serves the update command set over the host link.

#![no_main]
#![no_std]

use core::fmt::Write;
use core::ptr::addr_of_mut;

use cortex_m::peripheral::SCB;
use cortex_m_rt::entry;
use panic_halt as _;

use hal::{
    pac,
    prelude::*,
    serial::{Config, Serial},
};
use stm32f7xx_hal as hal;

use fluxgate::boot::{BootInputs, BootManager};
use fluxgate::config::{FlashLayout, STM32F767_RAM};
use fluxgate::console::Console;
use fluxgate::hw::board::{BoardPins, UpdateResources};
use fluxgate::hw::cpu::CortexM;
use fluxgate::hw::{Led, SerialLink, Usart};
use fluxgate::protocol::UpdateHost;
use fluxgate::update::{BootTarget, RamStaging, UpdatePipeline};

/// Upper bound on an image accepted over the link.
const STAGING_LEN: usize = 256 * 1024;

static mut STAGING: [u8; STAGING_LEN] = [0; STAGING_LEN];

#[entry]
fn main() -> ! {
    let dp = pac::Peripherals::take().unwrap();
    let cp = cortex_m::Peripherals::take().unwrap();

    let pins = BoardPins::new(dp.GPIOA, dp.GPIOB, dp.GPIOD, dp.GPIOE, dp.GPIOG);
    let mut update = UpdateResources::new(dp.FLASH, pins.update_jumper);
    // Let the jumper pull-up settle before sampling it.
    cortex_m::asm::delay(1_000);
    let jumpered = update.jumper_fitted();

    let layout = FlashLayout::STM32F767;
    let manager = BootManager::new(layout, STM32F767_RAM);
    let plan = manager.plan(
        &mut update.flash,
        BootInputs {
            update_jumper: jumpered,
        },
    );

    let mut cpu = CortexM::new(cp.NVIC, cp.SCB);
    manager.relocate(&plan, &mut cpu);
    if plan.target == BootTarget::Application {
        unsafe { cpu.jump(plan.vector_table) }
    }

    // Updater from here on.
    let rcc = dp.RCC.constrain();
    let clocks = rcc.cfgr.sysclk(216.MHz()).freeze();

    let mut led = Led::active_high(pins.leds.blue);
    led.on();

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
    let _ = writeln!(console, "updater: {:?}", plan.reason);

    let host_cfg = Config {
        baud_rate: 2_000_000.bps(),
        ..Default::default()
    };
    let serial = Serial::new(dp.USART3, (pins.host.tx, pins.host.rx), &clocks, host_cfg);
    let mut host = UpdateHost::new(SerialLink::new(serial), jumpered);

    // Only reference to the staging area; the bootloader runs this block once.
    let staging = RamStaging::new(unsafe { &mut *addr_of_mut!(STAGING) });
    let mut pipeline = UpdatePipeline::new(update.flash, staging, layout);

    loop {
        match host.poll(&mut pipeline) {
            Some(Ok(())) => {
                let _ = writeln!(console, "committed {} bytes", pipeline.programmed());
                if !jumpered {
                    // Give the result byte time to leave the UART.
                    cortex_m::asm::delay(clocks.sysclk().raw() / 100);
                    SCB::sys_reset();
                }
            }
            Some(Err(f)) => {
                let _ = writeln!(console, "update failed: {} ({:?})", f, pipeline.state());
            }
            None => {}
        }
    }
}
