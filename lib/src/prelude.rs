// Copyright (C) 2025 Intel Corporation
// SPDX-License-Identifier: MIT

//! Convenience re-export of common structs

pub use crate::bmc::{BmcNotifier, Notify, RepairReport};
pub use crate::config::{Config, LogLevel};
pub use crate::error::Error;
pub use crate::fault_addr::FaultAddress;
pub use crate::handler::{Disposition, HbmRasHandler};
pub use crate::ledger::{FLASH_SLOTS, FlashLedger, FlashSlot, ImmutableFlag, SlotContent};
pub use crate::platform::{
    MemoryType, PageAction, Platform, RepairCommand, RepairDevice, SysfsPlatform,
};
pub use crate::repair::{RepairOrchestrator, RepairOutcome};
pub use crate::section::{ErrorSection, RepairMode};
pub use crate::trace::{RasEvent, RasEventHandler, StopReason, TraceEventSource, TraceInstance};
