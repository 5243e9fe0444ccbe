// Copyright (C) 2025 Intel Corporation
// SPDX-License-Identifier: MIT

use hbm_online_repair::prelude::*;
use std::io;
use std::process::Command;

/// Kernel drivers required by the repair, in loading order.
const DRIVERS: [&str; 2] = ["hisi_mem_ras", "page_eject"];

fn handle_driver(name: &str, load: bool) -> Result<(), Error> {
    let (program, action) = if load {
        ("modprobe", "load")
    } else {
        ("rmmod", "unload")
    };

    let output = Command::new(program)
        .arg(name)
        .output()
        .inspect_err(|err| log::error!("Cannot run {program}: {err}"))?;

    if !output.status.success() {
        log::error!(
            "{action} {name} failed ({}): {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim_end()
        );
        return Err(io::Error::other(format!("{program} {name} failed")).into());
    }

    log::debug!("{action} {name} success");
    Ok(())
}

/// Loads or unloads every driver, stopping at the first failure.
pub fn handle_all(load: bool) -> Result<(), Error> {
    DRIVERS.iter().try_for_each(|name| handle_driver(name, load))
}
