// Copyright (C) 2025 Intel Corporation
// SPDX-License-Identifier: MIT

use crate::drivers;
use hbm_online_repair::prelude::*;
use hbm_online_repair::trace::{NON_STANDARD_EVENT, RAS_GROUP};

/// Runs the repair daemon until a termination signal is received.
pub fn monitor(config: &Config, skip_drivers: bool) -> Result<(), Error> {
    if !skip_drivers {
        drivers::handle_all(true)?;
    }

    let result = trace(config);

    if !skip_drivers {
        if let Err(err) = drivers::handle_all(false) {
            log::warn!("Unable to unload the drivers: {err}");
        }
    }
    result
}

fn trace(config: &Config) -> Result<(), Error> {
    let instance = TraceInstance::create(&config.mounts_path)?;
    instance
        .toggle_event(RAS_GROUP, NON_STANDARD_EVENT, true)
        .inspect_err(|_| log::warn!("Unable to enable {RAS_GROUP}:{NON_STANDARD_EVENT}"))?;

    let result = listen(config, instance.clone());

    if instance
        .toggle_event(RAS_GROUP, NON_STANDARD_EVENT, false)
        .is_err()
    {
        log::warn!("Unable to disable {RAS_GROUP}:{NON_STANDARD_EVENT}");
    }
    result
}

fn listen(config: &Config, instance: TraceInstance) -> Result<(), Error> {
    let ledger = FlashLedger::open(&config.efivars_dir, config.flash_capacity);
    let mut handler = HbmRasHandler::new(
        ledger,
        SysfsPlatform::new(config),
        BmcNotifier::new(&config.bmc_socket),
        config.page_isolation_threshold,
    );

    let source = TraceEventSource::new(instance)?;
    match source.run(&mut handler)? {
        StopReason::Signal(signal) => log::info!("Stopped by signal {signal}"),
        StopReason::NoCpuReady => log::warn!("Stopped: no trace stream is readable"),
    }
    Ok(())
}
