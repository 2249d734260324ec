// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Pin map and peripheral ownership for the NUCLEO-F767ZI flux board.
//!
//! Peripherals are split into two disjoint resource sets. The application takes
//! [`FluxResources`] (timers, DMA, drive bus); the bootloader takes [`UpdateResources`] (flash
//! controller, update jumper). Neither type can be built from the other, so update mode can never
//! arm flux I/O and the flux engines can never reach the flash controller.

use stm32f7xx_hal::{
    gpio::{
        gpioa, gpiob, gpiod, gpiog, Alternate, ErasedPin, Input, OpenDrain, Output, PullUp,
        PushPull,
    },
    pac,
    prelude::*,
};

use crate::hw::bus::{BusInputs, BusOutputs, PinBus};
use crate::hw::flash::Stm32Flash;
use crate::hw::timer::Stm32TimerBank;

pub type BusOut = ErasedPin<Output<OpenDrain>>;
pub type BusIn = ErasedPin<Input<PullUp>>;
pub type Bus = PinBus<BusOut, BusIn>;

pub struct Leds {
    pub green: gpiob::PB0<Output<PushPull>>, // LD1, activity
    pub blue: gpiob::PB7<Output<PushPull>>,  // LD2, update mode
    pub red: gpiob::PB14<Output<PushPull>>,  // LD3, fault
}

/// USART3 on the ST-LINK virtual COM port: the host link.
pub struct HostPins {
    pub tx: gpiod::PD8<Alternate<7>>,
    pub rx: gpiod::PD9<Alternate<7>>,
}

/// USART2: debug console.
pub struct ConsolePins {
    pub tx: gpiod::PD5<Alternate<7>>,
    pub rx: gpiod::PD6<Alternate<7>>,
}

/// Timer channels wired to the drive's flux and index lines.
pub struct FluxPins {
    pub rdata: gpioa::PA15<Alternate<1>>, // TIM2_CH1
    pub index: gpiob::PB3<Alternate<1>>,  // TIM2_CH2
    pub wdata: gpioa::PA0<Alternate<2>>,  // TIM5_CH1
}

/// All board pins. Construct this once at startup.
pub struct BoardPins {
    pub leds: Leds,
    pub host: HostPins,
    pub console: ConsolePins,
    pub flux: FluxPins,
    pub bus_out: BusOutputs<BusOut>,
    pub bus_in: BusInputs<BusIn>,
    /// Fitted jumper pulls the line low.
    pub update_jumper: gpiog::PG0<Input<PullUp>>,
}

impl BoardPins {
    /// Create all named pins from raw GPIO peripherals.
    pub fn new(
        gpioa: pac::GPIOA,
        gpiob: pac::GPIOB,
        gpiod: pac::GPIOD,
        gpioe: pac::GPIOE,
        gpiog: pac::GPIOG,
    ) -> Self {
        let gpioa = gpioa.split();
        let gpiob = gpiob.split();
        let gpiod = gpiod.split();
        let gpioe = gpioe.split();
        let gpiog = gpiog.split();

        Self {
            leds: Leds {
                green: gpiob.pb0.into_push_pull_output(),
                blue: gpiob.pb7.into_push_pull_output(),
                red: gpiob.pb14.into_push_pull_output(),
            },

            host: HostPins {
                tx: gpiod.pd8.into_alternate::<7>(),
                rx: gpiod.pd9.into_alternate::<7>(),
            },

            console: ConsolePins {
                tx: gpiod.pd5.into_alternate::<7>(),
                rx: gpiod.pd6.into_alternate::<7>(),
            },

            flux: FluxPins {
                rdata: gpioa.pa15.into_alternate::<1>().internal_pull_up(true),
                index: gpiob.pb3.into_alternate::<1>().internal_pull_up(true),
                wdata: gpioa.pa0.into_alternate::<2>(),
            },

            bus_out: BusOutputs {
                select: gpioe.pe2.into_open_drain_output().erase(),
                motor: gpioe.pe3.into_open_drain_output().erase(),
                direction: gpioe.pe4.into_open_drain_output().erase(),
                step: gpioe.pe5.into_open_drain_output().erase(),
                write_gate: gpioe.pe6.into_open_drain_output().erase(),
                side: gpioe.pe7.into_open_drain_output().erase(),
                density: gpioe.pe8.into_open_drain_output().erase(),
            },

            bus_in: BusInputs {
                track0: gpioe.pe9.into_pull_up_input().erase(),
                write_protect: gpioe.pe10.into_pull_up_input().erase(),
            },

            update_jumper: gpiog.pg0.into_pull_up_input(),
        }
    }
}

/// Everything the main firmware needs to move flux.
pub struct FluxResources {
    pub bank: Stm32TimerBank,
    pub bus: Bus,
    pub pins: FluxPins,
}

impl FluxResources {
    /// Enables the TIM2/TIM5/DMA1 bus clocks. Call before `RCC` is constrained.
    pub fn new(
        rcc: &pac::RCC,
        tim2: pac::TIM2,
        tim5: pac::TIM5,
        dma1: pac::DMA1,
        pins: FluxPins,
        bus_out: BusOutputs<BusOut>,
        bus_in: BusInputs<BusIn>,
    ) -> Self {
        rcc.apb1enr
            .modify(|_, w| w.tim2en().set_bit().tim5en().set_bit());
        rcc.ahb1enr.modify(|_, w| w.dma1en().set_bit());
        Self {
            bank: Stm32TimerBank::new(tim2, tim5, dma1),
            bus: PinBus::new(bus_out, bus_in),
            pins,
        }
    }
}

/// Everything the updater needs to rewrite the application.
pub struct UpdateResources {
    pub flash: Stm32Flash,
    pub update_jumper: gpiog::PG0<Input<PullUp>>,
}

impl UpdateResources {
    pub fn new(flash: pac::FLASH, update_jumper: gpiog::PG0<Input<PullUp>>) -> Self {
        Self {
            flash: Stm32Flash::new(flash),
            update_jumper,
        }
    }

    pub fn jumper_fitted(&self) -> bool {
        self.update_jumper.is_low()
    }
}
