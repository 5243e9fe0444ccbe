// Copyright (C) 2025 Intel Corporation
// SPDX-License-Identifier: MIT

use super::format::{EventFormat, FieldFormat};
use crate::Error;
use uguid::Guid;

pub const RAS_GROUP: &str = "ras";
pub const NON_STANDARD_EVENT: &str = "non_standard_event";

/// Vendor error section reported by the `ras:non_standard_event` tracepoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasEvent {
    pub timestamp: u64,
    pub section_type: Guid,
    pub length: u32,
    pub payload: Vec<u8>,
}

/// Extracts [`RasEvent`]s from the raw `ras:non_standard_event` records.
#[derive(Debug, Clone)]
pub struct NonStandardEventDecoder {
    id: u16,
    sec_type: FieldFormat,
    len: FieldFormat,
    buf: FieldFormat,
}

impl NonStandardEventDecoder {
    pub fn new(format: &EventFormat) -> Result<Self, Error> {
        let field = |name: &str| {
            format.field(name).cloned().ok_or_else(|| {
                Error::InvalidEventFormat(format!("{}: missing field {name}", format.name))
            })
        };

        Ok(Self {
            id: format.id,
            sec_type: field("sec_type")?,
            len: field("len")?,
            buf: field("buf")?,
        })
    }

    /// Id identifying the records of the event.
    pub fn id(&self) -> u16 {
        self.id
    }

    /// Decodes a record of the event.
    ///
    /// Returns `None` if a field cannot be read or if the declared length does not match the
    /// size of the payload.
    pub fn decode(&self, timestamp: u64, record: &[u8]) -> Option<RasEvent> {
        let section_type = self
            .sec_type
            .slice(record)
            .and_then(|raw| raw.try_into().ok())
            .map(Guid::from_bytes)
            .or_else(|| {
                log::warn!("Cannot get the event section type");
                None
            })?;

        let length = self.len.read_u64(record).or_else(|| {
            log::warn!("Cannot get the event length");
            None
        })? as u32;

        let payload = self.buf.slice(record)?;
        if payload.len() != length as usize {
            log::warn!(
                "Event length ({length}) does not match the payload size ({})",
                payload.len()
            );
            return None;
        }

        log::debug!("sec_type: {section_type}, length: {length}");
        Some(RasEvent {
            timestamp,
            section_type,
            length,
            payload: payload.to_vec(),
        })
    }
}

/// Returns the id of the event stored in a trace record.
pub fn record_id(record: &[u8]) -> Option<u16> {
    Some(u16::from_ne_bytes(record.get(0..2)?.try_into().ok()?))
}
