// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! STM32F7 embedded flash controller, single-bank mode (12 sectors).
//!
//! Programming is done a byte at a time (PSIZE = x8), which works at any supply voltage and any
//! alignment. Erase uses x32 parallelism. The controller is unlocked for the duration of each
//! operation and locked again afterwards.

use core::ptr;

use stm32f7xx_hal::pac;

use crate::config::STM32F767_SECTORS;
use crate::error::StorageFault;
use crate::update::flash::{Flash, Sector};

const KEY1: u32 = 0x4567_0123;
const KEY2: u32 = 0xCDEF_89AB;

// FLASH_CR
const PG: u32 = 1 << 0;
const SER: u32 = 1 << 1;
const SNB_SHIFT: u32 = 3;
const PSIZE_X8: u32 = 0b00 << 8;
const PSIZE_X32: u32 = 0b10 << 8;
const STRT: u32 = 1 << 16;
const LOCK: u32 = 1 << 31;

// FLASH_SR
const EOP: u32 = 1 << 0;
const OPERR: u32 = 1 << 1;
const WRPERR: u32 = 1 << 4;
const PGAERR: u32 = 1 << 5;
const PGPERR: u32 = 1 << 6;
const ERSERR: u32 = 1 << 7;
const BSY: u32 = 1 << 16;
const ERRORS: u32 = OPERR | WRPERR | PGAERR | PGPERR | ERSERR;

pub struct Stm32Flash {
    regs: pac::FLASH,
}

impl Stm32Flash {
    pub fn new(regs: pac::FLASH) -> Self {
        Self { regs }
    }

    fn wait(&self) -> u32 {
        while self.regs.sr.read().bits() & BSY != 0 {}
        self.regs.sr.read().bits()
    }

    fn unlock(&mut self) {
        if self.regs.cr.read().bits() & LOCK != 0 {
            unsafe {
                self.regs.keyr.write(|w| w.bits(KEY1));
                self.regs.keyr.write(|w| w.bits(KEY2));
            }
        }
    }

    fn lock(&mut self) {
        unsafe {
            self.regs.cr.write(|w| w.bits(LOCK));
        }
    }

    fn clear_status(&mut self) {
        unsafe { self.regs.sr.write(|w| w.bits(EOP | ERRORS)) }
    }

    fn check_range(&self, addr: u32, len: usize) -> Result<(), StorageFault> {
        let sectors = self.sectors();
        let end = addr
            .checked_add(len as u32)
            .ok_or(StorageFault::OutOfRange(addr))?;
        let first = sectors.first().map_or(0, |s| s.base);
        let last = sectors.last().map_or(0, Sector::end);
        if addr < first || end > last {
            return Err(StorageFault::OutOfRange(addr));
        }
        Ok(())
    }
}

impl Flash for Stm32Flash {
    fn sectors(&self) -> &[Sector] {
        &STM32F767_SECTORS
    }

    fn erase(&mut self, sector: usize) -> Result<(), StorageFault> {
        if sector >= self.sectors().len() {
            return Err(StorageFault::Erase(sector));
        }
        self.wait();
        self.unlock();
        self.clear_status();
        unsafe {
            self.regs
                .cr
                .write(|w| w.bits(SER | PSIZE_X32 | ((sector as u32) << SNB_SHIFT)));
            self.regs.cr.modify(|r, w| w.bits(r.bits() | STRT));
        }
        let sr = self.wait();
        self.lock();
        if sr & ERRORS != 0 {
            return Err(StorageFault::Erase(sector));
        }
        Ok(())
    }

    fn program(&mut self, addr: u32, data: &[u8]) -> Result<(), StorageFault> {
        self.check_range(addr, data.len())?;
        self.wait();
        self.unlock();
        self.clear_status();
        unsafe { self.regs.cr.write(|w| w.bits(PG | PSIZE_X8)) };

        let mut result = Ok(());
        for (i, &b) in data.iter().enumerate() {
            let at = addr + i as u32;
            unsafe { ptr::write_volatile(at as *mut u8, b) };
            cortex_m::asm::dsb();
            if self.wait() & ERRORS != 0 {
                result = Err(StorageFault::Program(at));
                break;
            }
        }
        self.lock();
        result
    }

    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), StorageFault> {
        self.check_range(addr, buf.len())?;
        for (i, b) in buf.iter_mut().enumerate() {
            *b = unsafe { ptr::read_volatile((addr + i as u32) as *const u8) };
        }
        Ok(())
    }
}

