// Copyright (C) 2025 Intel Corporation
// SPDX-License-Identifier: MIT

use super::*;
use crate::section::repair_types;
use crate::testing::repair_section;
use std::cell::RefCell;
use std::collections::HashMap;
use std::io;

/// Tracks the immutable attribute in memory. Existing files start immutable, like efivarfs.
#[derive(Default)]
struct FakeFlags {
    immutable: RefCell<HashMap<PathBuf, bool>>,
    /// Replaces the variable with a directory once it becomes writable, so that the write fails.
    sabotage: bool,
}

impl ImmutableFlag for FakeFlags {
    fn is_immutable(&self, path: &Path) -> io::Result<bool> {
        Ok(*self
            .immutable
            .borrow_mut()
            .entry(path.to_path_buf())
            .or_insert(true))
    }

    fn set_immutable(&self, path: &Path, immutable: bool) -> io::Result<()> {
        self.immutable
            .borrow_mut()
            .insert(path.to_path_buf(), immutable);
        if self.sabotage && !immutable {
            std::fs::remove_file(path)?;
            std::fs::create_dir(path)?;
        }
        Ok(())
    }
}

fn section(fault: FaultAddress) -> ErrorSection {
    repair_section(repair_types::CE_ACLS, 1, fault)
}

fn fault(processor: u32, error_type: u32) -> FaultAddress {
    FaultAddress {
        processor,
        error_type,
        row: 0x42,
        ..FaultAddress::default()
    }
}

#[test]
fn slot_index() {
    for processor in 0..4 {
        for error_type in 0..2 {
            assert_eq!(
                FlashSlot::index(processor, error_type).unwrap(),
                (2 * processor + error_type) as usize
            );
        }
    }
    assert!(FlashSlot::index(4, 0).is_err());
    assert!(FlashSlot::index(3, 2).is_err());
    assert!(FlashSlot::index(u32::MAX, 1).is_err());
}

#[test]
fn first_record_creates_slot() {
    let dir = tempfile::tempdir().unwrap();
    let mut ledger = FlashLedger::with_flags(dir.path(), 1024, FakeFlags::default());

    let slot = ledger.record(&section(fault(1, 0))).unwrap();
    assert_eq!(slot.name, "repair0100");
    assert_eq!(ledger.total_size(), 8);

    let data = std::fs::read(dir.path().join(slot.file_name())).unwrap();
    assert_eq!(data.len(), 12);
    assert_eq!(u32::from_ne_bytes(data[0..4].try_into().unwrap()), 0x7);
    assert_eq!(
        u64::from_ne_bytes(data[4..12].try_into().unwrap()),
        fault(1, 0).encode()
    );
    // A new variable is created without touching the immutable attribute.
    assert!(ledger.flags.immutable.borrow().is_empty());
}

#[test]
fn append_to_existing_slot() {
    let dir = tempfile::tempdir().unwrap();
    let mut ledger = FlashLedger::with_flags(dir.path(), 1024, FakeFlags::default());

    ledger.record(&section(fault(2, 1))).unwrap();
    let slot = ledger.record(&section(fault(2, 1))).unwrap();
    assert_eq!(slot.name, "repair0201");
    assert_eq!(ledger.total_size(), 16);

    let path = dir.path().join(slot.file_name());
    let data = std::fs::read(&path).unwrap();
    assert_eq!(data.len(), 24);
    assert_eq!(
        u32::from_ne_bytes(data[12..16].try_into().unwrap()),
        0x7 | EFI_VARIABLE_APPEND_WRITE
    );
    assert_eq!(ledger.flags.immutable.borrow().get(&path), Some(&true));

    let content = ledger.read_slot(slot).unwrap().unwrap();
    assert_eq!(content.attributes, 0x7);
    assert_eq!(content.records.len(), 2);
}

#[test]
fn immutable_restored_after_failed_write() {
    let dir = tempfile::tempdir().unwrap();
    let slot = &FLASH_SLOTS[0];
    let path = dir.path().join(slot.file_name());
    std::fs::write(&path, 0x7u32.to_ne_bytes()).unwrap();

    let flags = FakeFlags {
        sabotage: true,
        ..FakeFlags::default()
    };
    let mut ledger = FlashLedger::with_flags(dir.path(), 1024, flags);
    let initial_size = ledger.total_size();

    assert!(ledger.record(&section(fault(0, 0))).is_err());
    assert_eq!(ledger.total_size(), initial_size);
    assert_eq!(ledger.flags.immutable.borrow().get(&path), Some(&true));
}

#[test]
fn rejects_invalid_slot() {
    let dir = tempfile::tempdir().unwrap();
    let mut ledger = FlashLedger::with_flags(dir.path(), 1024, FakeFlags::default());

    let err = ledger.record(&section(fault(3, 2))).unwrap_err();
    assert!(matches!(err, Error::InvalidSlot { .. }));
    assert_eq!(ledger.total_size(), 0);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn capacity_bound() {
    let dir = tempfile::tempdir().unwrap();
    let mut ledger = FlashLedger::with_flags(dir.path(), 24, FakeFlags::default());

    for _ in 0..3 {
        ledger.record(&section(fault(0, 1))).unwrap();
    }
    assert_eq!(ledger.total_size(), 24);

    let err = ledger.record(&section(fault(0, 1))).unwrap_err();
    assert!(matches!(err, Error::LedgerFull { .. }));
    assert_eq!(ledger.total_size(), 24);
}

#[test]
fn total_size_from_existing_slots() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(FLASH_SLOTS[3].file_name()), [0u8; 20]).unwrap();
    std::fs::write(dir.path().join(FLASH_SLOTS[6].file_name()), [0u8; 12]).unwrap();
    std::fs::write(dir.path().join("unrelated-variable"), [0u8; 100]).unwrap();

    let ledger = FlashLedger::with_flags(dir.path(), 1024, FakeFlags::default());
    assert_eq!(ledger.total_size(), 32);
    assert_eq!(ledger.read_all().unwrap().len(), 2);
}

#[test]
fn over_capacity_at_startup() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(FLASH_SLOTS[0].file_name()), [0u8; 64]).unwrap();

    let mut ledger = FlashLedger::with_flags(dir.path(), 32, FakeFlags::default());
    assert!(ledger.record(&section(fault(1, 1))).is_err());
    assert!(!dir.path().join(FLASH_SLOTS[3].file_name()).exists());
}
