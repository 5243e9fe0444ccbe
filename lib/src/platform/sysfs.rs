// Copyright (C) 2025 Intel Corporation
// SPDX-License-Identifier: MIT

use super::{MemoryType, PageAction, Platform, RepairCommand, RepairDevice};
use crate::Error;
use crate::config::Config;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Name of the ACPI devices exposing the HBM repair interface.
pub const HBM_MEM_RAS_NAME: &str = "HISI0521";

/// Writes a physical address to a sysfs attribute and returns the count reported by the driver.
fn write_address(path: &Path, paddr: u64) -> io::Result<usize> {
    let mut file = OpenOptions::new().write(true).open(path).inspect_err(|err| {
        log::warn!("HBM: Cannot open '{}': {err}", path.display());
    })?;

    file.write(format!("{paddr:#x}\n").as_bytes())
        .inspect_err(|err| {
            log::warn!("HBM: Failed to set {} ({paddr:#x}): {err}", path.display());
        })
}

/// Memory RAS device registered under the platform bus in sysfs.
#[derive(Debug, Clone)]
pub struct SysfsRepairDevice {
    path: PathBuf,
}

impl SysfsRepairDevice {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }
}

impl RepairDevice for SysfsRepairDevice {
    fn name(&self) -> String {
        self.path.display().to_string()
    }

    fn memory_type(&self) -> Result<MemoryType, Error> {
        let path = self.path.join("memory_type");
        let memory_type = std::fs::read_to_string(&path)
            .inspect_err(|err| log::warn!("HBM: Cannot read '{}': {err}", path.display()))?;
        Ok(MemoryType::from(memory_type.trim_end_matches('\n')))
    }

    fn command(&self, command: RepairCommand, paddr: u64) -> io::Result<usize> {
        write_address(&self.path.join(command.attribute()), paddr)
    }
}

/// Kernel interfaces exposed through procfs and sysfs.
pub struct SysfsPlatform {
    meminfo: PathBuf,
    page_eject: PathBuf,
    platform_devices: PathBuf,
}

impl SysfsPlatform {
    pub fn new(config: &Config) -> Self {
        Self {
            meminfo: config.meminfo_path.clone(),
            page_eject: config.page_eject_dir.clone(),
            platform_devices: config.platform_devices_dir.clone(),
        }
    }
}

impl Platform for SysfsPlatform {
    type Device = SysfsRepairDevice;

    fn hardware_corrupted_kb(&self) -> Result<u64, Error> {
        let meminfo = std::fs::read_to_string(&self.meminfo)
            .inspect_err(|err| log::error!("Failed to open {}: {err}", self.meminfo.display()))?;
        super::parse_hardware_corrupted(&meminfo).ok_or(Error::MissingMeminfoEntry)
    }

    fn page_action(&self, action: PageAction, paddr: u64) -> io::Result<()> {
        write_address(&self.page_eject.join(action.attribute()), paddr).map(|_| ())
    }

    fn repair_devices(&self) -> Result<Vec<SysfsRepairDevice>, Error> {
        let mut devices: Vec<SysfsRepairDevice> = std::fs::read_dir(&self.platform_devices)
            .inspect_err(|err| {
                log::warn!("Can't read '{}': {err}", self.platform_devices.display())
            })?
            .filter_map(|entry| {
                entry
                    .inspect_err(|err| log::error!("Cannot access directory entry: {err}"))
                    .ok()
            })
            .filter(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .map(|name| name.contains(HBM_MEM_RAS_NAME))
                    .unwrap_or(false)
            })
            .map(|entry| SysfsRepairDevice::new(&entry.path()))
            .collect();

        devices.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(devices)
    }
}
