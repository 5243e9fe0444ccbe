// Copyright (C) 2025 Intel Corporation
// SPDX-License-Identifier: MIT

use hbm_online_repair::prelude::*;
use serde_json::json;

/// Writes the content of every flash slot in use.
pub fn dump<O: std::io::Write>(config: &Config, output: O) -> Result<(), Error> {
    let ledger = FlashLedger::open(&config.efivars_dir, config.flash_capacity);
    let slots: Vec<_> = ledger
        .read_all()?
        .iter()
        .map(|slot| {
            let records: Vec<_> = slot
                .records
                .iter()
                .map(|raw| {
                    json!({
                        "raw": format!("{raw:#018x}"),
                        "fault": FaultAddress::decode(*raw),
                    })
                })
                .collect();
            json!({
                "name": slot.name,
                "guid": slot.guid,
                "attributes": slot.attributes,
                "records": records,
            })
        })
        .collect();

    Ok(serde_json::to_writer_pretty(
        output,
        &json!({
            "total_size": ledger.total_size(),
            "capacity": ledger.capacity(),
            "slots": slots,
        }),
    )?)
}
