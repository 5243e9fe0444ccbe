// Copyright (C) 2025 Intel Corporation
// SPDX-License-Identifier: MIT

//! Routing of the HBM error sections to the flash ledger and the repair orchestrator.

use crate::bmc::Notify;
use crate::ledger::{FlashLedger, ImmutableFlag};
use crate::platform::Platform;
use crate::repair::{RepairOrchestrator, RepairOutcome};
use crate::section::{ErrorSection, HISI_COMMON_SECTION_TYPE, RepairMode};
use crate::trace::{RasEvent, RasEventHandler};

/// Result of the processing of an HBM error section.
#[derive(Debug, PartialEq, Eq)]
pub struct Disposition {
    pub mode: RepairMode,
    /// The fault address was stored in the flash ledger.
    pub recorded: bool,
    /// Outcome of the online repair, if one was attempted.
    pub outcome: Option<RepairOutcome>,
}

pub struct HbmRasHandler<P: Platform, N: Notify, F: ImmutableFlag> {
    ledger: FlashLedger<F>,
    platform: P,
    notifier: N,
    isolation_threshold: u64,
}

impl<P: Platform, N: Notify, F: ImmutableFlag> HbmRasHandler<P, N, F> {
    pub fn new(ledger: FlashLedger<F>, platform: P, notifier: N, isolation_threshold: u64) -> Self {
        Self {
            ledger,
            platform,
            notifier,
            isolation_threshold,
        }
    }

    pub fn ledger(&self) -> &FlashLedger<F> {
        &self.ledger
    }

    /// Decodes and processes the payload of a HiSilicon common error section.
    pub fn handle_payload(&mut self, payload: &[u8]) -> Option<Disposition> {
        let Some(section) = ErrorSection::from_slice(payload) else {
            log::warn!("HiSilicon common section is truncated ({} bytes)", payload.len());
            return None;
        };
        self.handle_section(&section)
    }

    /// Records the fault of a valid HBM repair request and repairs it when used as flat memory.
    pub fn handle_section(&mut self, section: &ErrorSection) -> Option<Disposition> {
        let mode = section.validate()?;

        let recorded = self
            .ledger
            .record(section)
            .inspect_err(|err| log::warn!("Write HBM fault info to flash failed: {err}"))
            .is_ok();

        let outcome = if section.is_flat_mode() {
            RepairOrchestrator::new(&self.platform, &self.notifier, self.isolation_threshold)
                .run(section, mode)
        } else {
            log::info!("HBM is used as cache, the fault is recorded only");
            None
        };

        Some(Disposition {
            mode,
            recorded,
            outcome,
        })
    }
}

impl<P: Platform, N: Notify, F: ImmutableFlag> RasEventHandler for HbmRasHandler<P, N, F> {
    fn handle(&mut self, event: &RasEvent) {
        if event.section_type != HISI_COMMON_SECTION_TYPE {
            log::debug!("Ignoring section {}", event.section_type);
            return;
        }
        self.handle_payload(&event.payload);
    }
}
