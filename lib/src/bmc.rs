// Copyright (C) 2025 Intel Corporation
// SPDX-License-Identifier: MIT

//! Repair result notifications sent to the baseboard management controller.

use crate::fault_addr::FaultAddress;
use crate::repair::RepairOutcome;
use crate::section::repair_types;
use std::fmt;
use std::io::Write;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};

pub const ROW_FAULT: u8 = 1;
pub const SINGLE_ADDR_FAULT: u8 = 6;

/// Result of a repair attempt, as reported to the BMC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairReport {
    /// Repair request bits of the error section.
    pub repair_type: u32,
    pub outcome: RepairOutcome,
    pub fault: FaultAddress,
}

impl RepairReport {
    /// Returns the repair type code and the isolation type code of the report.
    pub fn codes(&self) -> (u8, u8) {
        [
            (repair_types::CE_ACLS, 0, SINGLE_ADDR_FAULT),
            (repair_types::PSUE_ACLS, 1, SINGLE_ADDR_FAULT),
            (repair_types::CE_SPPR, 2, ROW_FAULT),
            (repair_types::PSUE_SPPR, 3, ROW_FAULT),
        ]
        .into_iter()
        .find(|(bit, _, _)| self.repair_type & bit != 0)
        .map_or((0, 0), |(_, repair, isolation)| (repair, isolation))
    }
}

impl fmt::Display for RepairReport {
    /// Formats the fixed-width message expected by the BMC service.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let (repair_code, isolation_code) = self.codes();
        let fault = &self.fault;
        write!(
            f,
            "REP00{repair_code:02x}{:02x}{isolation_code:02x}0000000000000000\
             {:02x}{:02x}{:02x}00{:02x}00{:02x}{:02x}{:02x}{:08x}{:08x}0000000000",
            self.outcome.code(),
            fault.processor,
            fault.die,
            fault.stack,
            fault.sid,
            fault.channel,
            fault.bank_group,
            fault.bank,
            fault.row,
            fault.column,
        )
    }
}

/// Receives the outcome of every repair attempt.
pub trait Notify {
    fn notify(&self, report: &RepairReport);
}

/// Sends the repair reports to the local BMC service over a Unix socket.
pub struct BmcNotifier {
    socket: PathBuf,
}

impl BmcNotifier {
    pub fn new(socket: &Path) -> Self {
        Self {
            socket: socket.to_path_buf(),
        }
    }

    /// Sends a single message. No retry is attempted on failure.
    pub fn send(&self, message: &str) -> std::io::Result<()> {
        let mut stream = UnixStream::connect(&self.socket)?;
        stream.write_all(message.as_bytes())
    }
}

impl Notify for BmcNotifier {
    fn notify(&self, report: &RepairReport) {
        log::debug!("Fault address: {}", report.fault);
        let message = report.to_string();
        log::debug!("Send msg to sysSentry, bmc msg is {message}");

        if let Err(err) = self.send(&message) {
            log::error!(
                "Failed to send data to BMC notice socket {}: {err}",
                self.socket.display()
            );
        }
    }
}
