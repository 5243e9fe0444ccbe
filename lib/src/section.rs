// Copyright (C) 2025 Intel Corporation
// SPDX-License-Identifier: MIT

//! HiSilicon common error section carrying the HBM repair requests.


use crate::fault_addr::FaultAddress;
use uguid::Guid;

pub const HISI_COMMON_SECTION_TYPE: Guid = uguid::guid!("c8b328a8-9917-4af6-9a13-2e08ab2e7586");

const SECTION_HEADER_SIZE: usize = 32;

/// Bits of the validation mask that must be set for a repair request.
pub mod valid_bits {
    pub const MODULE_ID: u32 = 1 << 5;
    pub const SUBMODULE_ID: u32 = 1 << 6;
    pub const REG_ARRAY_SIZE: u32 = 1 << 12;
    pub const REQUIRED: u32 = MODULE_ID | SUBMODULE_ID | REG_ARRAY_SIZE;
}

pub const HBMC_MODULE_ID: u8 = 0x28;
pub const HBMC_SUBMOD_HBM_REPAIR: u8 = 6;

/// Repair request bits found in the first entry of the register array.
pub mod repair_types {
    pub const CE_ACLS: u32 = 1 << 0;
    pub const PSUE_ACLS: u32 = 1 << 1;
    pub const CE_SPPR: u32 = 1 << 2;
    pub const PSUE_SPPR: u32 = 1 << 3;
    pub const CACHE_MODE: u32 = 0xf0;
    pub const MASK: u32 = 0xff;

    pub const ACLS: u32 = CE_ACLS | PSUE_ACLS;
    pub const SPPR: u32 = CE_SPPR | PSUE_SPPR;
}

pub const ACLS_ADDR_NUM: usize = 1;
pub const SPPR_ADDR_NUM: usize = 16;

const REPAIR_TYPE_INDEX: usize = 0;

// Register array layout, in 32-bit words: repair type, physical addresses, fault address.
const ACLS_ARRAY_LEN: usize = 1 + 2 * ACLS_ADDR_NUM + 2;
const SPPR_ARRAY_LEN: usize = 1 + 2 * SPPR_ADDR_NUM + 2;
const CACHE_ARRAY_LEN: usize = 1 + 2;

/// Repair method requested by the firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairMode {
    /// Cache line sparing of a single address.
    Acls,
    /// Soft post-package repair of a row, described by 16 addresses.
    Sppr,
    /// The HBM is used as a cache. The fault is recorded but cannot be repaired online.
    CacheMode,
}

impl RepairMode {
    /// Number of physical addresses targeted by a flat mode repair.
    pub fn address_count(&self) -> usize {
        match self {
            RepairMode::Acls => ACLS_ADDR_NUM,
            RepairMode::Sppr => SPPR_ADDR_NUM,
            RepairMode::CacheMode => 0,
        }
    }

    fn array_len(&self) -> usize {
        match self {
            RepairMode::Acls => ACLS_ARRAY_LEN,
            RepairMode::Sppr => SPPR_ARRAY_LEN,
            RepairMode::CacheMode => CACHE_ARRAY_LEN,
        }
    }
}

impl std::fmt::Display for RepairMode {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let name = match self {
            RepairMode::Acls => "ACLS",
            RepairMode::Sppr => "SPPR",
            RepairMode::CacheMode => "cache mode",
        };
        write!(f, "{name}")
    }
}

/// Parsed view of a HiSilicon common error section.
#[derive(Debug, Clone, Default)]
pub struct ErrorSection {
    pub valid_bits: u32,
    pub version: u8,
    pub soc_id: u8,
    pub socket_id: u8,
    pub totem_id: u8,
    pub nimbus_id: u8,
    pub subsystem_id: u8,
    pub module_id: u8,
    pub submodule_id: u8,
    pub core_id: u8,
    pub port_id: u8,
    pub err_type: u16,
    pub severity: u8,
    pub reg_array: Vec<u32>,
}

impl ErrorSection {
    /// Decodes the section stored in a byte slice.
    ///
    /// Returns `None` when the slice is too short to hold the register array it declares, or
    /// when the declared size is not a whole number of registers.
    pub fn from_slice(s: &[u8]) -> Option<Self> {
        let reg_array_size = u32::from_le_bytes(s.get(28..32)?.try_into().ok()?) as usize;
        if reg_array_size % 4 != 0 {
            log::warn!("Register array size ({reg_array_size}) is not a multiple of 4");
            return None;
        }
        let reg_array = s
            .get(SECTION_HEADER_SIZE..SECTION_HEADER_SIZE.checked_add(reg_array_size)?)?
            .chunks_exact(4)
            .map(|word| u32::from_le_bytes([word[0], word[1], word[2], word[3]]))
            .collect();

        Some(ErrorSection {
            valid_bits: u32::from_le_bytes(s.get(0..4)?.try_into().ok()?),
            version: *s.get(4)?,
            soc_id: *s.get(5)?,
            socket_id: *s.get(6)?,
            totem_id: *s.get(7)?,
            nimbus_id: *s.get(8)?,
            subsystem_id: *s.get(9)?,
            module_id: *s.get(10)?,
            submodule_id: *s.get(11)?,
            core_id: *s.get(12)?,
            port_id: *s.get(13)?,
            err_type: u16::from_le_bytes(s.get(14..16)?.try_into().ok()?),
            severity: *s.get(24)?,
            reg_array,
        })
    }

    /// Encodes the section in the layout reported by the firmware.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&self.valid_bits.to_le_bytes());
        bytes.extend_from_slice(&[
            self.version,
            self.soc_id,
            self.socket_id,
            self.totem_id,
            self.nimbus_id,
            self.subsystem_id,
            self.module_id,
            self.submodule_id,
            self.core_id,
            self.port_id,
        ]);
        bytes.extend_from_slice(&self.err_type.to_le_bytes());
        // PCIe information is not used by the HBM repair requests.
        bytes.extend_from_slice(&[0; 8]);
        bytes.push(self.severity);
        bytes.extend_from_slice(&[0; 3]);
        bytes.extend_from_slice(&((self.reg_array.len() * 4) as u32).to_le_bytes());
        for reg in self.reg_array.iter() {
            bytes.extend_from_slice(&reg.to_le_bytes());
        }
        bytes
    }

    /// Returns the repair request bits.
    pub fn repair_type(&self) -> u32 {
        self.reg_array
            .get(REPAIR_TYPE_INDEX)
            .map_or(0, |reg| reg & repair_types::MASK)
    }

    /// Checks that the section is an HBM repair request with a consistent register array and
    /// returns the requested repair mode.
    pub fn validate(&self) -> Option<RepairMode> {
        if self.valid_bits & valid_bits::REQUIRED != valid_bits::REQUIRED {
            log::debug!("Err val_bits validate failed, val_bits is {:#x}", self.valid_bits);
            return None;
        }

        log::debug!(
            "module_id: {:#x}, submodule_id: {}, reg_array_size: {}",
            self.module_id,
            self.submodule_id,
            self.reg_array.len() * 4
        );

        if self.module_id != HBMC_MODULE_ID || self.submodule_id != HBMC_SUBMOD_HBM_REPAIR {
            log::debug!("Err module_id or submodule_id does not match");
            return None;
        }

        let repair_type = self.repair_type();
        let mode = [
            (repair_types::ACLS, RepairMode::Acls),
            (repair_types::SPPR, RepairMode::Sppr),
            (repair_types::CACHE_MODE, RepairMode::CacheMode),
        ]
        .into_iter()
        .find(|(bits, mode)| repair_type & bits != 0 && self.reg_array.len() == mode.array_len())
        .map(|(_, mode)| mode);

        if mode.is_none() {
            log::warn!(
                "Err type ({repair_type:#x}) is unknown or register array length ({}) is invalid",
                self.reg_array.len() * 4
            );
        }
        mode
    }

    /// Returns true if the section requests a repair of HBM used as flat memory.
    pub fn is_flat_mode(&self) -> bool {
        self.repair_type() & repair_types::CACHE_MODE == 0
    }

    /// Returns the raw fault address stored in the last two registers.
    pub fn raw_fault_address(&self) -> Option<u64> {
        let len = self.reg_array.len();
        let low = *self.reg_array.get(len.checked_sub(2)?)?;
        let high = *self.reg_array.get(len - 1)?;
        Some(((high as u64) << 32) | low as u64)
    }

    pub fn fault_address(&self) -> Option<FaultAddress> {
        self.raw_fault_address().map(FaultAddress::decode)
    }

    /// Returns the `i`-th physical address targeted by the repair request.
    pub fn physical_address(&self, i: usize) -> Option<u64> {
        let low = *self.reg_array.get(REPAIR_TYPE_INDEX + 1 + 2 * i)?;
        let high = *self.reg_array.get(REPAIR_TYPE_INDEX + 2 + 2 * i)?;
        Some(((high as u64) << 32) | low as u64)
    }

    /// Returns the physical addresses targeted by a flat mode repair.
    pub fn physical_addresses(&self, mode: RepairMode) -> Vec<u64> {
        (0..mode.address_count())
            .filter_map(|i| self.physical_address(i))
            .collect()
    }
}
