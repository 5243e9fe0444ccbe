// Copyright (C) 2025 Intel Corporation
// SPDX-License-Identifier: MIT

//! Online repair of the HBM faults.
//!
//! A flat mode repair request goes through the following steps:
//! 1. The faulty pages are isolated from the system.
//! 2. The HBM repair devices are queried to find the one able to repair the address.
//! 3. The repair is executed.
//! 4. The pages are brought back online, or kept offline if the repair failed.
//!
//! Every repair attempt ends with a single notification of its outcome.


use crate::bmc::{Notify, RepairReport};
use crate::platform::{
    MemoryType, PAGE_SIZE_KB, PageAction, Platform, RepairCommand, RepairDevice,
};
use crate::section::{ErrorSection, RepairMode, repair_types};
use std::io;

/// Result of a repair attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairOutcome {
    IsolateFailedOverThreshold,
    IsolateFailedOther,
    RepairFailedNoResource,
    RepairFailedInvalidParam,
    RepairFailedOther,
    OnlineFailed,
    Success,
}

/// Maps the errno returned by the repair driver to a repair outcome.
const ERRNO_OUTCOMES: [(i32, RepairOutcome); 4] = [
    (libc::ENOSPC, RepairOutcome::RepairFailedNoResource),
    (libc::EIO, RepairOutcome::RepairFailedOther),
    (libc::ENXIO, RepairOutcome::RepairFailedInvalidParam),
    (libc::EINVAL, RepairOutcome::RepairFailedInvalidParam),
];

impl RepairOutcome {
    /// Result code reported to the BMC.
    pub fn code(&self) -> u8 {
        match self {
            RepairOutcome::IsolateFailedOverThreshold => 0b1000_0001,
            RepairOutcome::IsolateFailedOther => 0b1000_0010,
            RepairOutcome::RepairFailedNoResource => 0b1001_0100,
            RepairOutcome::RepairFailedInvalidParam => 0b1001_1000,
            RepairOutcome::RepairFailedOther => 0b1001_1100,
            RepairOutcome::OnlineFailed => 0b1010_0000,
            RepairOutcome::Success => 0,
        }
    }

    /// Returns the outcome of a failed query or repair command.
    pub fn from_failed_command(result: &io::Result<usize>) -> Self {
        result
            .as_ref()
            .err()
            .and_then(|err| err.raw_os_error())
            .and_then(|errno| {
                ERRNO_OUTCOMES
                    .iter()
                    .find(|(code, _)| *code == errno)
                    .map(|(_, outcome)| *outcome)
            })
            .unwrap_or(RepairOutcome::RepairFailedOther)
    }
}

fn succeeded(result: &io::Result<usize>) -> bool {
    matches!(result, Ok(count) if *count > 0)
}

fn commands(mode: RepairMode) -> Option<(RepairCommand, RepairCommand)> {
    match mode {
        RepairMode::Acls => Some((RepairCommand::AclsQuery, RepairCommand::AclsRepair)),
        RepairMode::Sppr => Some((RepairCommand::SpprQuery, RepairCommand::SpprRepair)),
        RepairMode::CacheMode => None,
    }
}

/// Drives the repair of the flat mode HBM faults.
pub struct RepairOrchestrator<'a, P: Platform, N: Notify> {
    platform: &'a P,
    notifier: &'a N,
    /// Page isolation threshold in KiB.
    isolation_threshold: u64,
}

impl<'a, P: Platform, N: Notify> RepairOrchestrator<'a, P, N> {
    pub fn new(platform: &'a P, notifier: &'a N, isolation_threshold: u64) -> Self {
        Self {
            platform,
            notifier,
            isolation_threshold,
        }
    }

    /// Repairs the fault reported in `section` and notifies the outcome.
    ///
    /// Returns `None` without any side effect if `mode` cannot be repaired online.
    pub fn run(&self, section: &ErrorSection, mode: RepairMode) -> Option<RepairOutcome> {
        let (query, repair) = commands(mode)?;
        log::debug!("Received {mode} flat mode repair request, try to repair");

        let addresses = section.physical_addresses(mode);
        let outcome = match self.isolate(mode, &addresses) {
            Ok(()) => self.repair(section, mode, query, repair, &addresses),
            Err(outcome) => outcome,
        };

        self.notifier.notify(&RepairReport {
            repair_type: section.repair_type(),
            outcome,
            fault: section.fault_address().unwrap_or_default(),
        });
        Some(outcome)
    }

    fn isolate(&self, mode: RepairMode, addresses: &[u64]) -> Result<(), RepairOutcome> {
        let required = mode.address_count() as u64 * PAGE_SIZE_KB;
        let corrupted = self.platform.hardware_corrupted_kb().map_err(|err| {
            log::error!("Page isolate failed: cannot get HardwareCorrupted size: {err}");
            RepairOutcome::IsolateFailedOther
        })?;

        if required + corrupted > self.isolation_threshold {
            log::info!(
                "Page isolate failed: the isolation resource is not enough \
                 ({corrupted}KB isolated, {required}KB required, threshold {}KB)",
                self.isolation_threshold
            );
            return Err(RepairOutcome::IsolateFailedOverThreshold);
        }

        // Every page is attempted even if one of them cannot be isolated.
        let failures = addresses
            .iter()
            .filter(|paddr| {
                self.platform
                    .page_action(PageAction::Offline, **paddr)
                    .inspect_err(|err| {
                        log::warn!("HBM: {mode} offline failed, address is {paddr:#x}: {err}")
                    })
                    .is_err()
            })
            .count();

        if failures > 0 || addresses.is_empty() {
            return Err(RepairOutcome::IsolateFailedOther);
        }
        Ok(())
    }

    fn repair(
        &self,
        section: &ErrorSection,
        mode: RepairMode,
        query: RepairCommand,
        repair: RepairCommand,
        addresses: &[u64],
    ) -> RepairOutcome {
        let error_type = section.repair_type() & repair_types::MASK;
        let devices = match self.platform.repair_devices() {
            Ok(devices) => devices,
            Err(err) => {
                log::warn!("Cannot list the HBM repair devices: {err}");
                return RepairOutcome::RepairFailedOther;
            }
        };

        if devices.is_empty() {
            log::error!("Repair driver is not loaded, skip error, error_type is {error_type}");
            return RepairOutcome::RepairFailedOther;
        }

        // Both ACLS and SPPR are requested at the first address.
        let paddr = addresses[0];
        let mut found_hbm = false;

        for device in devices.iter() {
            match device.memory_type() {
                Ok(MemoryType::Hbm) => found_hbm = true,
                Ok(_) => continue,
                Err(err) => {
                    log::warn!("HBM: Unknown memory type for {}: {err}", device.name());
                    continue;
                }
            }

            let result = device.command(query, paddr);
            if succeeded(&result) {
                return self.repair_on_device(device, mode, repair, addresses);
            }

            match result {
                Err(err) if err.raw_os_error() == Some(libc::ENXIO) => {
                    log::debug!("HBM: Address {paddr:#x} is not in {}", device.name());
                }
                result => {
                    log::warn!("HBM: Address {paddr:#x} is not supported to {mode} repair");
                    return RepairOutcome::from_failed_command(&result);
                }
            }
        }

        if found_hbm {
            log::error!("Err addr is not in device, skip error, error_type is {error_type}");
            RepairOutcome::RepairFailedInvalidParam
        } else {
            log::error!("No HBM device memory type found, skip error, error_type is {error_type}");
            RepairOutcome::RepairFailedOther
        }
    }

    fn repair_on_device(
        &self,
        device: &P::Device,
        mode: RepairMode,
        repair: RepairCommand,
        addresses: &[u64],
    ) -> RepairOutcome {
        let result = device.command(repair, addresses[0]);

        let outcomes: Vec<RepairOutcome> = addresses
            .iter()
            .map(|paddr| self.after_repair(mode, &result, *paddr))
            .collect();

        if !succeeded(&result) {
            RepairOutcome::from_failed_command(&result)
        } else if outcomes.iter().all(|outcome| *outcome == RepairOutcome::Success) {
            RepairOutcome::Success
        } else {
            RepairOutcome::OnlineFailed
        }
    }

    /// Brings a page back online after a successful repair, or keeps it offline otherwise.
    fn after_repair(
        &self,
        mode: RepairMode,
        result: &io::Result<usize>,
        paddr: u64,
    ) -> RepairOutcome {
        if !succeeded(result) {
            log::warn!("HBM {mode}: Keep page ({paddr:#x}) offline");
            if let Err(err) = self.platform.page_action(PageAction::Remove, paddr) {
                log::warn!("HBM {mode}: Cannot remove page ({paddr:#x}): {err}");
            }
            return RepairOutcome::from_failed_command(result);
        }

        match self.platform.page_action(PageAction::Online, paddr) {
            Ok(()) => {
                log::info!("HBM {mode}: Page ({paddr:#x}) repair and online success");
                RepairOutcome::Success
            }
            Err(err) => {
                log::warn!("HBM {mode}: Page ({paddr:#x}) online failed: {err}");
                RepairOutcome::OnlineFailed
            }
        }
    }
}
