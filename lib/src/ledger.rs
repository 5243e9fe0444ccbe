// Copyright (C) 2025 Intel Corporation
// SPDX-License-Identifier: MIT

//! Persistent record of the HBM faults, stored in UEFI variables through efivarfs.
//!
//! Each fault address is appended to one of 8 variables, selected from the processor and the
//! error type of the fault. The total size of the variables is bounded by a fixed capacity.

pub mod flags;
#[cfg(test)]
mod tests;

use crate::Error;
use crate::fault_addr::FaultAddress;
use crate::section::ErrorSection;
pub use flags::{Chattr, ImmutableFlag, WritableGuard};
#[cfg(feature = "serialize")]
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

pub const EFI_VARIABLE_NON_VOLATILE: u32 = 0x1;
pub const EFI_VARIABLE_BOOTSERVICE_ACCESS: u32 = 0x2;
pub const EFI_VARIABLE_RUNTIME_ACCESS: u32 = 0x4;
pub const EFI_VARIABLE_APPEND_WRITE: u32 = 0x40;

const BASE_ATTRIBUTES: u32 =
    EFI_VARIABLE_NON_VOLATILE | EFI_VARIABLE_BOOTSERVICE_ACCESS | EFI_VARIABLE_RUNTIME_ACCESS;

const ATTRIBUTE_SIZE: usize = 4;
/// Size of a fault record.
pub const RECORD_SIZE: u64 = 8;

/// Identity of a UEFI variable used to store fault records.
#[derive(Debug, PartialEq, Eq)]
pub struct FlashSlot {
    pub name: &'static str,
    pub guid: &'static str,
}

/// Variables indexed by `2 * processor + error_type`.
pub const FLASH_SLOTS: [FlashSlot; 8] = [
    FlashSlot {
        name: "repair0000",
        guid: "CD2FF4D9-D937-4e1d-B810-A1A568C37C01",
    },
    FlashSlot {
        name: "repair0001",
        guid: "DD92CC91-43E6-4c69-A42A-B08F72FCB157",
    },
    FlashSlot {
        name: "repair0100",
        guid: "4A8E0D1E-4CFA-47b2-9359-DA3A0006878B",
    },
    FlashSlot {
        name: "repair0101",
        guid: "733F9979-4ED4-478d-BD6A-E4D0F0390FDB",
    },
    FlashSlot {
        name: "repair0200",
        guid: "9BFBBA1F-5A93-4d36-AD47-D3C2D714D914",
    },
    FlashSlot {
        name: "repair0201",
        guid: "A0920D6F-78B8-4c09-9F61-7CEC845F116C",
    },
    FlashSlot {
        name: "repair0300",
        guid: "0049CE5E-8C18-414c-BDC1-A87E60CEEFD7",
    },
    FlashSlot {
        name: "repair0301",
        guid: "6AED17B4-50C7-4a40-A5A7-48AF55DD8EAC",
    },
];

impl FlashSlot {
    /// Returns the index of the slot storing the faults of `processor` with `error_type`.
    pub fn index(processor: u32, error_type: u32) -> Result<usize, Error> {
        processor
            .checked_mul(2)
            .and_then(|slot| slot.checked_add(error_type))
            .map(|slot| slot as usize)
            .filter(|slot| *slot < FLASH_SLOTS.len())
            .ok_or(Error::InvalidSlot {
                processor,
                error_type,
            })
    }

    pub fn for_fault(addr: &FaultAddress) -> Result<&'static FlashSlot, Error> {
        Self::index(addr.processor, addr.error_type).map(|index| &FLASH_SLOTS[index])
    }

    /// Name of the efivarfs file backing the slot.
    pub fn file_name(&self) -> String {
        format!("{}-{}", self.name, self.guid)
    }
}

impl std::fmt::Display for FlashSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}-{}", self.name, self.guid)
    }
}

/// Content of a slot read back from the flash.
#[derive(Debug)]
#[cfg_attr(feature = "serialize", derive(Serialize))]
pub struct SlotContent {
    pub name: &'static str,
    pub guid: &'static str,
    pub attributes: u32,
    pub records: Vec<u64>,
}

impl SlotContent {
    fn from_slice(slot: &'static FlashSlot, s: &[u8]) -> Option<Self> {
        let attributes = u32::from_ne_bytes(s.get(0..ATTRIBUTE_SIZE)?.try_into().ok()?);
        let records = s
            .get(ATTRIBUTE_SIZE..)?
            .chunks_exact(RECORD_SIZE as usize)
            .filter_map(|record| Some(u64::from_ne_bytes(record.try_into().ok()?)))
            .collect();
        Some(Self {
            name: slot.name,
            guid: slot.guid,
            attributes,
            records,
        })
    }

    pub fn faults(&self) -> impl Iterator<Item = FaultAddress> + '_ {
        self.records.iter().copied().map(FaultAddress::decode)
    }
}

/// Capacity-bounded store of fault addresses.
pub struct FlashLedger<F: ImmutableFlag = Chattr> {
    dir: PathBuf,
    capacity: u64,
    total_size: u64,
    flags: F,
}

impl FlashLedger<Chattr> {
    /// Opens the ledger stored in the efivarfs mounted at `dir`.
    pub fn open(dir: &Path, capacity: u64) -> Self {
        Self::with_flags(dir, capacity, Chattr)
    }
}

impl<F: ImmutableFlag> FlashLedger<F> {
    /// Opens the ledger using `flags` to control the immutable attribute of the variables.
    pub fn with_flags(dir: &Path, capacity: u64, flags: F) -> Self {
        let mut ledger = Self {
            dir: dir.to_path_buf(),
            capacity,
            total_size: 0,
            flags,
        };

        ledger.total_size = FLASH_SLOTS
            .iter()
            .map(|slot| ledger.slot_path(slot))
            .filter(|path| path.exists())
            .filter_map(|path| {
                std::fs::metadata(&path)
                    .inspect_err(|err| log::warn!("Cannot stat {}: {err}", path.display()))
                    .ok()
            })
            .map(|metadata| metadata.len())
            .sum();

        log::debug!(
            "Current fault info total size: {}KB, flash max threshold: {}KB",
            ledger.total_size / 1024,
            ledger.capacity / 1024
        );
        if ledger.total_size > ledger.capacity {
            log::warn!(
                "Fault info storage {} reached threshold, cannot save new record",
                ledger.total_size
            );
        }

        ledger
    }

    fn slot_path(&self, slot: &FlashSlot) -> PathBuf {
        self.dir.join(slot.file_name())
    }

    /// Total size in bytes of the variables used by the ledger.
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Appends the fault address reported in `section` to its slot.
    pub fn record(&mut self, section: &ErrorSection) -> Result<&'static FlashSlot, Error> {
        let raw = section.raw_fault_address().ok_or(Error::InternalError)?;
        let slot = FlashSlot::for_fault(&FaultAddress::decode(raw))?;

        if self.total_size + RECORD_SIZE > self.capacity {
            return Err(Error::LedgerFull {
                total: self.total_size,
                capacity: self.capacity,
            });
        }

        let path = self.slot_path(slot);
        let existing = path.exists();
        let attributes = if existing {
            self.read_attributes(&path)? | EFI_VARIABLE_APPEND_WRITE
        } else {
            BASE_ATTRIBUTES
        };

        self.write_variable(&path, attributes, raw, existing)?;
        self.total_size += RECORD_SIZE;
        log::info!("Wrote HBM fault info to flash {slot}");
        Ok(slot)
    }

    fn read_attributes(&self, path: &Path) -> Result<u32, Error> {
        let data = std::fs::read(path)?;
        data.get(0..ATTRIBUTE_SIZE)
            .and_then(|attr| attr.try_into().ok())
            .map(u32::from_ne_bytes)
            .ok_or_else(|| Error::InvalidVariable(path.to_path_buf()))
    }

    fn write_variable(
        &self,
        path: &Path,
        attributes: u32,
        value: u64,
        existing: bool,
    ) -> Result<(), Error> {
        let mut buffer = Vec::with_capacity(ATTRIBUTE_SIZE + RECORD_SIZE as usize);
        buffer.extend_from_slice(&attributes.to_ne_bytes());
        buffer.extend_from_slice(&value.to_ne_bytes());

        let _guard = if existing {
            Some(WritableGuard::acquire(&self.flags, path)?)
        } else {
            None
        };

        let mut file = OpenOptions::new()
            .write(true)
            .append(existing)
            .create(!existing)
            .mode(0o644)
            .open(path)?;

        // efivarfs expects the attributes and the data in a single write.
        let written = file.write(&buffer)?;
        if written != buffer.len() {
            return Err(Error::IOError(std::io::ErrorKind::WriteZero.into()));
        }
        Ok(())
    }

    /// Reads back the records stored in a slot, if the slot exists.
    pub fn read_slot(&self, slot: &'static FlashSlot) -> Result<Option<SlotContent>, Error> {
        let path = self.slot_path(slot);
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read(&path)?;
        SlotContent::from_slice(slot, &data)
            .map(Some)
            .ok_or(Error::InvalidVariable(path))
    }

    /// Reads back the records of every existing slot.
    pub fn read_all(&self) -> Result<Vec<SlotContent>, Error> {
        FLASH_SLOTS
            .iter()
            .filter_map(|slot| self.read_slot(slot).transpose())
            .collect()
    }
}
