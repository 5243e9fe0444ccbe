// Copyright (C) 2025 Intel Corporation
// SPDX-License-Identifier: MIT

//! Online repair of the HBM faults reported by the HiSilicon RAS firmware.
//!
//! The faults are received as vendor error sections through the `ras:non_standard_event`
//! tracepoint. Each fault address is stored in the flash, then repaired online when the HBM is
//! used as flat memory:
//!
//! ```no_run
//! use hbm_online_repair::prelude::*;
//!
//! let (config, _) = Config::from_env();
//! let ledger = FlashLedger::open(&config.efivars_dir, config.flash_capacity);
//! let mut handler = HbmRasHandler::new(
//!     ledger,
//!     SysfsPlatform::new(&config),
//!     BmcNotifier::new(&config.bmc_socket),
//!     config.page_isolation_threshold,
//! );
//!
//! let source = TraceEventSource::new(TraceInstance::create(&config.mounts_path)?)?;
//! source.run(&mut handler)?;
//! # Ok::<(), Error>(())
//! ```

pub mod bmc;
pub mod config;
mod error;
pub mod fault_addr;
pub mod handler;
pub mod ledger;
pub mod platform;
pub mod prelude;
pub mod repair;
pub mod section;
#[cfg(test)]
mod testing;
pub mod trace;

pub use error::Error;
