// Copyright (C) 2025 Intel Corporation
// SPDX-License-Identifier: MIT

//! Kernel interfaces used to isolate, repair and re-admit the faulty pages.

pub mod sysfs;

use crate::Error;
use std::io;

pub use sysfs::{SysfsPlatform, SysfsRepairDevice};

/// Size of a memory page in KiB.
pub const PAGE_SIZE_KB: u64 = 4;

/// Page lifecycle operations of the page eject driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageAction {
    Offline,
    Remove,
    Online,
}

impl PageAction {
    pub fn attribute(&self) -> &'static str {
        match self {
            PageAction::Offline => "offline_page",
            PageAction::Remove => "remove_page",
            PageAction::Online => "online_page",
        }
    }
}

/// Commands of the HBM repair driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairCommand {
    AclsQuery,
    AclsRepair,
    SpprQuery,
    SpprRepair,
}

impl RepairCommand {
    pub fn attribute(&self) -> &'static str {
        match self {
            RepairCommand::AclsQuery => "acls_query",
            RepairCommand::AclsRepair => "acls_repair",
            RepairCommand::SpprQuery => "sppr_query",
            RepairCommand::SpprRepair => "sppr_repair",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryType {
    Hbm,
    Ddr,
    Unknown,
}

impl From<&str> for MemoryType {
    fn from(s: &str) -> Self {
        match s {
            "HBM" => MemoryType::Hbm,
            "DDR" => MemoryType::Ddr,
            _ => MemoryType::Unknown,
        }
    }
}

/// A memory RAS device able to repair HBM faults.
pub trait RepairDevice {
    fn name(&self) -> String;
    fn memory_type(&self) -> Result<MemoryType, Error>;
    /// Issues a command at the physical address `paddr`.
    ///
    /// A positive count means the command succeeded. Errors carry the errno reported by the
    /// driver.
    fn command(&self, command: RepairCommand, paddr: u64) -> io::Result<usize>;
}

/// Access to the kernel surfaces involved in a repair.
pub trait Platform {
    type Device: RepairDevice;

    /// Returns the amount of memory, in KiB, already isolated because of hardware errors.
    fn hardware_corrupted_kb(&self) -> Result<u64, Error>;
    fn page_action(&self, action: PageAction, paddr: u64) -> io::Result<()>;
    /// Returns the memory RAS devices registered on the platform.
    fn repair_devices(&self) -> Result<Vec<Self::Device>, Error>;
}

/// Extracts the `HardwareCorrupted` entry, in KiB, from the content of `/proc/meminfo`.
pub fn parse_hardware_corrupted(meminfo: &str) -> Option<u64> {
    meminfo
        .lines()
        .find_map(|line| line.strip_prefix("HardwareCorrupted:"))
        .and_then(|value| value.split_whitespace().next())
        .and_then(|value| value.parse().ok())
}
