// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

mod common;

use common::*;
use fluxgate::boot::{BootInputs, BootManager, BootReason};
use fluxgate::error::{Fault, IntegrityFault, ProtocolFault, StorageFault};
use fluxgate::update::flash::Flash;
use fluxgate::update::{
    BootRecord, BootSelector, BootTarget, RamStaging, UpdatePipeline, UpdateSession, UpdateState,
    CRC32,
};

/// Whole simulated application region.
const APP_LEN: usize = 4 * 0x1000;

type Pipeline<'a> = UpdatePipeline<SimFlash, RamStaging<'a>>;

fn boot(flash: &mut SimFlash) -> (BootTarget, BootReason) {
    let plan = BootManager::new(sim_layout(), SIM_RAM).plan(flash, BootInputs::default());
    (plan.target, plan.reason)
}

fn install(p: &mut Pipeline, img: &[u8]) -> Result<(), Fault> {
    p.begin(img.len() as u32)?;
    for (i, chunk) in img.chunks(500).enumerate() {
        p.write((i * 500) as u32, chunk)?;
    }
    p.finalize(CRC32.checksum(img))
}

#[test]
fn image_is_committed_into_spanned_sectors_only() {
    let mut staging = vec![0u8; APP_LEN];
    let mut p = UpdatePipeline::new(SimFlash::new(), RamStaging::new(&mut staging), sim_layout());
    assert_eq!(p.capacity(), APP_LEN as u32);

    let img = app_image(6_000, 1);
    install(&mut p, &img).unwrap();
    assert_eq!(p.state(), UpdateState::Committed);
    assert_eq!(p.programmed(), 6_000);

    let (mut flash, _) = p.free();
    assert_eq!(flash.erases, vec![4, 5]);
    assert_eq!(flash.bytes(SIM_APP_BASE, img.len()), &img[..]);
    // Sector 7 was never part of the image.
    assert!(flash.bytes(0x0800_4000, 0x1000).iter().all(|&b| b == 0xFF));
    assert_eq!(
        BootSelector::new(2).read(&mut flash),
        Ok(Some(BootRecord {
            target: BootTarget::Application,
            image_len: 6_000
        }))
    );
    assert_eq!(boot(&mut flash), (BootTarget::Application, BootReason::Selected));
}

#[test]
fn bad_checksum_leaves_flash_untouched() {
    let mut staging = vec![0u8; APP_LEN];
    let mut p = UpdatePipeline::new(SimFlash::new(), RamStaging::new(&mut staging), sim_layout());
    let old = app_image(3_000, 7);
    install(&mut p, &old).unwrap();

    let new = app_image(5_000, 9);
    p.begin(new.len() as u32).unwrap();
    p.write(0, &new).unwrap();
    let wrong = CRC32.checksum(&new) ^ 1;
    assert_eq!(
        p.finalize(wrong),
        Err(Fault::Integrity(IntegrityFault::Received {
            expected: wrong,
            actual: CRC32.checksum(&new),
        }))
    );
    assert!(matches!(p.state(), UpdateState::Failed(Fault::Integrity(_))));

    let (mut flash, _) = p.free();
    assert_eq!(flash.erases, vec![4]);
    assert_eq!(flash.bytes(SIM_APP_BASE, old.len()), &old[..]);
    assert_eq!(
        BootSelector::new(2).read(&mut flash).unwrap().map(|r| r.image_len),
        Some(3_000)
    );
    assert_eq!(boot(&mut flash), (BootTarget::Application, BootReason::Selected));
}

#[test]
fn reception_errors_fail_the_attempt() {
    let mut staging = vec![0u8; APP_LEN];
    let mut p = UpdatePipeline::new(SimFlash::new(), RamStaging::new(&mut staging), sim_layout());

    p.begin(100).unwrap();
    p.write(0, &[0; 10]).unwrap();
    assert_eq!(
        p.write(20, &[0; 10]),
        Err(Fault::Protocol(ProtocolFault::OutOfOrder {
            expected: 10,
            got: 20
        }))
    );
    assert!(matches!(p.state(), UpdateState::Failed(_)));
    // Nothing more is accepted until a new begin.
    assert_eq!(
        p.write(10, &[0; 10]),
        Err(Fault::Protocol(ProtocolFault::InvalidState))
    );

    p.begin(10).unwrap();
    assert_eq!(
        p.write(0, &[0; 11]),
        Err(Fault::Protocol(ProtocolFault::Overflow {
            declared: 10,
            end: 11
        }))
    );

    p.begin(10).unwrap();
    p.write(0, &[0; 5]).unwrap();
    assert_eq!(
        p.finalize(0),
        Err(Fault::Protocol(ProtocolFault::Incomplete {
            received: 5,
            declared: 10
        }))
    );

    let (flash, _) = p.free();
    assert!(flash.erases.is_empty());
    assert_eq!(flash.programs, 0);
}

#[test]
fn unacceptable_length_is_refused_up_front() {
    let mut staging = vec![0u8; 2_000];
    let mut p = UpdatePipeline::new(SimFlash::new(), RamStaging::new(&mut staging), sim_layout());
    // Staging is the smaller bound here.
    assert_eq!(p.capacity(), 2_000);

    for declared in [0, 2_001] {
        assert_eq!(
            p.begin(declared),
            Err(Fault::Protocol(ProtocolFault::SizeExceeded {
                declared,
                capacity: 2_000
            }))
        );
        assert_eq!(p.state(), UpdateState::AwaitingImage);
    }
    p.begin(2_000).unwrap();
    assert_eq!(p.state(), UpdateState::Receiving);
}

#[test]
fn power_loss_before_the_flip_boots_the_updater() {
    let mut staging = vec![0u8; APP_LEN];
    let mut p = UpdatePipeline::new(SimFlash::new(), RamStaging::new(&mut staging), sim_layout());
    install(&mut p, &app_image(2_000, 3)).unwrap();

    let img = app_image(9_000, 4);
    p.begin(img.len() as u32).unwrap();
    p.write(0, &img).unwrap();
    p.seal(CRC32.checksum(&img)).unwrap();
    while !(p.state() == UpdateState::Programming && p.programmed() == 9_000) {
        p.step().unwrap();
    }

    // Every byte is in flash and verified; only the commit is missing.
    let (mut flash, _) = p.free();
    assert_eq!(flash.bytes(SIM_APP_BASE, img.len()), &img[..]);
    assert_eq!(boot(&mut flash), (BootTarget::Updater, BootReason::UpdatePending));
}

#[test]
fn power_loss_mid_erase_boots_the_updater() {
    let mut staging = vec![0u8; APP_LEN];
    let mut p = UpdatePipeline::new(SimFlash::new(), RamStaging::new(&mut staging), sim_layout());
    install(&mut p, &app_image(2_000, 3)).unwrap();

    let img = app_image(9_000, 4);
    p.begin(img.len() as u32).unwrap();
    p.write(0, &img).unwrap();
    p.seal(CRC32.checksum(&img)).unwrap();
    assert_eq!(p.step(), Ok(UpdateState::Erasing));
    assert_eq!(p.step(), Ok(UpdateState::Erasing));

    let (mut flash, _) = p.free();
    assert_eq!(boot(&mut flash), (BootTarget::Updater, BootReason::UpdatePending));
}

#[test]
fn erase_failure_aborts_and_keeps_the_updater() {
    let mut flash = SimFlash::new();
    flash.fail_erase = Some(5);
    let mut staging = vec![0u8; APP_LEN];
    let mut p = UpdatePipeline::new(flash, RamStaging::new(&mut staging), sim_layout());

    assert_eq!(
        install(&mut p, &app_image(6_000, 2)),
        Err(Fault::Storage(StorageFault::Erase(5)))
    );
    assert_eq!(
        p.state(),
        UpdateState::Failed(Fault::Storage(StorageFault::Erase(5)))
    );
    assert_eq!(p.step(), Err(Fault::Storage(StorageFault::Erase(5))));

    let (mut flash, _) = p.free();
    assert_eq!(boot(&mut flash), (BootTarget::Updater, BootReason::UpdatePending));
}

#[test]
fn readback_mismatch_fails_before_commit() {
    let mut flash = SimFlash::new();
    flash.weak_cell = Some(0x0800_2010);
    let mut staging = vec![0u8; APP_LEN];
    let mut p = UpdatePipeline::new(flash, RamStaging::new(&mut staging), sim_layout());

    let fault = Fault::Storage(StorageFault::Verify(0x0800_2010));
    assert_eq!(install(&mut p, &app_image(6_000, 6)), Err(fault));
    assert_eq!(p.state(), UpdateState::Failed(fault));
    // The first sector was programmed and verified before the bad one.
    assert_eq!(p.programmed(), 0x1000);

    let (mut flash, _) = p.free();
    assert_eq!(
        BootSelector::new(2).read(&mut flash),
        Ok(Some(BootRecord {
            target: BootTarget::Updater,
            image_len: 0
        }))
    );
    assert_eq!(boot(&mut flash), (BootTarget::Updater, BootReason::UpdatePending));
}

#[test]
fn disturbed_sector_fails_the_final_checksum() {
    let mut flash = SimFlash::new();
    // Writing the second sector upsets a byte of the first, after it was read back.
    flash.disturb = Some((0x0800_2000, SIM_APP_BASE + 100));
    let mut staging = vec![0u8; APP_LEN];
    let mut p = UpdatePipeline::new(flash, RamStaging::new(&mut staging), sim_layout());

    let img = app_image(6_000, 6);
    let crc = CRC32.checksum(&img);
    let res = install(&mut p, &img);
    assert!(matches!(
        res,
        Err(Fault::Integrity(IntegrityFault::Programmed { expected, actual }))
            if expected == crc && actual != crc
    ));
    assert_eq!(p.programmed(), 6_000);
    assert!(matches!(p.state(), UpdateState::Failed(Fault::Integrity(_))));

    let (mut flash, _) = p.free();
    assert_eq!(
        BootSelector::new(2).target(&mut flash),
        BootTarget::Updater
    );
    assert_eq!(boot(&mut flash), (BootTarget::Updater, BootReason::UpdatePending));
}

#[test]
fn full_selector_sector_is_compacted() {
    let mut flash = SimFlash::new();
    let selector = BootSelector::new(2);
    // 0x400 bytes of 16-byte records.
    for i in 0..64 {
        let record = BootRecord {
            target: BootTarget::Updater,
            image_len: i,
        };
        selector.write(&mut flash, record).unwrap();
    }
    assert!(flash.erases.is_empty());
    assert_eq!(selector.read(&mut flash).unwrap().map(|r| r.image_len), Some(63));

    let last = BootRecord {
        target: BootTarget::Application,
        image_len: 1_234,
    };
    selector.write(&mut flash, last).unwrap();
    assert_eq!(flash.erases, vec![2]);
    assert_eq!(selector.read(&mut flash), Ok(Some(last)));
    assert_eq!(flash.bytes(0x0800_0800, 16), &last.encode()[..]);
}

#[test]
fn torn_selector_record_selects_the_updater() {
    let mut flash = SimFlash::new();
    let selector = BootSelector::new(2);
    selector
        .write(
            &mut flash,
            BootRecord {
                target: BootTarget::Application,
                image_len: 100,
            },
        )
        .unwrap();
    // Power lost four bytes into the next record.
    let next = BootRecord {
        target: BootTarget::Updater,
        image_len: 0,
    }
    .encode();
    flash.program(0x0800_0810, &next[..4]).unwrap();

    assert_eq!(selector.read(&mut flash), Ok(None));
    assert_eq!(selector.target(&mut flash), BootTarget::Updater);
    assert_eq!(boot(&mut flash), (BootTarget::Updater, BootReason::NoSelector));
}

#[test]
fn session_splits_image_from_trailer_across_chunks() {
    let mut staging = vec![0u8; APP_LEN];
    let mut p = UpdatePipeline::new(SimFlash::new(), RamStaging::new(&mut staging), sim_layout());

    let img = app_image(1_001, 5);
    let mut file = img.clone();
    file.extend_from_slice(&CRC32.checksum(&img).to_le_bytes());

    let mut session = UpdateSession::start(&mut p, file.len() as u32).unwrap();
    assert_eq!(p.state(), UpdateState::Receiving);
    let mut chunks = file.chunks(37).peekable();
    while let Some(chunk) = chunks.next() {
        let done = session.feed(&mut p, chunk).unwrap();
        assert_eq!(done, chunks.peek().is_none());
    }
    assert_eq!(session.remaining(), 0);
    assert_eq!(p.state(), UpdateState::Committed);
    assert_eq!(p.received(), 1_001);
}

#[test]
fn session_refuses_files_without_room_for_an_image() {
    let mut staging = vec![0u8; APP_LEN];
    let mut p = UpdatePipeline::new(SimFlash::new(), RamStaging::new(&mut staging), sim_layout());
    assert!(matches!(
        UpdateSession::start(&mut p, 4),
        Err(Fault::Protocol(ProtocolFault::SizeExceeded { .. }))
    ));

    let mut session = UpdateSession::start(&mut p, 10).unwrap();
    assert_eq!(
        session.feed(&mut p, &[0; 11]),
        Err(Fault::Protocol(ProtocolFault::Overflow {
            declared: 10,
            end: 11
        }))
    );
}
