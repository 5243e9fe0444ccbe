// Copyright (C) 2025 Intel Corporation
// SPDX-License-Identifier: MIT

//! Packed HBM fault address.
//!
//! The firmware reports the location of an HBM fault as a 64-bit value made of 13 fields
//! stored contiguously, least-significant field first.

use crate::Error;
#[cfg(feature = "serialize")]
use serde::Serialize;
use std::fmt;

/// Named coordinates of a fault address, in packing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Processor,
    Die,
    Stack,
    Sid,
    Channel,
    BankGroup,
    Bank,
    Row,
    Column,
    ErrorType,
    RepairType,
    Reserved,
    Crc8,
}

/// Bit layout of a fault address, least-significant field first.
pub const LAYOUT: [(Field, u32); 13] = [
    (Field::Processor, 2),
    (Field::Die, 1),
    (Field::Stack, 3),
    (Field::Sid, 3),
    (Field::Channel, 8),
    (Field::BankGroup, 3),
    (Field::Bank, 3),
    (Field::Row, 17),
    (Field::Column, 10),
    (Field::ErrorType, 2),
    (Field::RepairType, 2),
    (Field::Reserved, 2),
    (Field::Crc8, 8),
];

const _: () = {
    let mut total = 0;
    let mut i = 0;
    while i < LAYOUT.len() {
        total += LAYOUT[i].1;
        i += 1;
    }
    assert!(total <= u64::BITS);
};

fn mask(width: u32) -> u64 {
    if width >= u64::BITS {
        u64::MAX
    } else {
        (1 << width) - 1
    }
}

/// Coordinates of an HBM fault.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(Serialize))]
pub struct FaultAddress {
    pub processor: u32,
    pub die: u32,
    pub stack: u32,
    pub sid: u32,
    pub channel: u32,
    pub bank_group: u32,
    pub bank: u32,
    pub row: u32,
    pub column: u32,
    pub error_type: u32,
    pub repair_type: u32,
    pub reserved: u32,
    pub crc8: u32,
}

impl FaultAddress {
    /// Returns the value of a single coordinate.
    pub fn get(&self, field: Field) -> u32 {
        match field {
            Field::Processor => self.processor,
            Field::Die => self.die,
            Field::Stack => self.stack,
            Field::Sid => self.sid,
            Field::Channel => self.channel,
            Field::BankGroup => self.bank_group,
            Field::Bank => self.bank,
            Field::Row => self.row,
            Field::Column => self.column,
            Field::ErrorType => self.error_type,
            Field::RepairType => self.repair_type,
            Field::Reserved => self.reserved,
            Field::Crc8 => self.crc8,
        }
    }

    fn field_mut(&mut self, field: Field) -> &mut u32 {
        match field {
            Field::Processor => &mut self.processor,
            Field::Die => &mut self.die,
            Field::Stack => &mut self.stack,
            Field::Sid => &mut self.sid,
            Field::Channel => &mut self.channel,
            Field::BankGroup => &mut self.bank_group,
            Field::Bank => &mut self.bank,
            Field::Row => &mut self.row,
            Field::Column => &mut self.column,
            Field::ErrorType => &mut self.error_type,
            Field::RepairType => &mut self.repair_type,
            Field::Reserved => &mut self.reserved,
            Field::Crc8 => &mut self.crc8,
        }
    }

    /// Splits a packed fault address into its coordinates.
    pub fn decode(mut raw: u64) -> Self {
        let mut addr = FaultAddress::default();
        for (field, width) in LAYOUT {
            *addr.field_mut(field) = (raw & mask(width)) as u32;
            raw = raw.checked_shr(width).unwrap_or(0);
        }
        addr
    }

    /// Packs the coordinates back into a fault address.
    ///
    /// Bits of a coordinate that do not fit in its field width are discarded.
    pub fn encode(&self) -> u64 {
        let mut raw = 0;
        let mut shift = 0;
        for (field, width) in LAYOUT {
            raw |= (self.get(field) as u64 & mask(width)) << shift;
            shift += width;
        }
        raw
    }

    /// Builds the packed address from the low and high 32-bit words reported by the firmware.
    pub fn from_words(low: u32, high: u32) -> Self {
        Self::decode(((high as u64) << 32) | low as u64)
    }
}

impl std::str::FromStr for FaultAddress {
    type Err = Error;

    /// Parses a packed fault address written in hexadecimal (`0x` prefix) or decimal.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let raw = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            u64::from_str_radix(hex, 16)
        } else {
            s.parse()
        }
        .map_err(|_| Error::InvalidFaultAddress(s.to_string()))?;
        Ok(Self::decode(raw))
    }
}

impl fmt::Display for FaultAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "processor={} die={} stack={} sid={} channel={} bank_group={} bank={} row={} column={} \
             error_type={} repair_type={}",
            self.processor,
            self.die,
            self.stack,
            self.sid,
            self.channel,
            self.bank_group,
            self.bank,
            self.row,
            self.column,
            self.error_type,
            self.repair_type
        )
    }
}
