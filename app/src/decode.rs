// Copyright (C) 2025 Intel Corporation
// SPDX-License-Identifier: MIT

use hbm_online_repair::prelude::*;

pub fn decode<O: std::io::Write>(address: &str, output: O) -> Result<(), Error> {
    let fault: FaultAddress = address.parse()?;
    Ok(serde_json::to_writer_pretty(output, &fault)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_json() {
        let mut output = Vec::new();
        decode("0x1", &mut output).unwrap();

        let value: serde_json::Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(value["processor"], 1);
        assert_eq!(value["row"], 0);
    }

    #[test]
    fn invalid_address() {
        assert!(decode("0xzz", Vec::new()).is_err());
    }
}
