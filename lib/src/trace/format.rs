// Copyright (C) 2025 Intel Corporation
// SPDX-License-Identifier: MIT

//! Layout descriptions exported by the tracing subsystem.

/// Location of a field in a trace record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldFormat {
    pub name: String,
    pub offset: usize,
    pub size: usize,
    /// The field is a `__data_loc` descriptor pointing to a variable-length array.
    pub dynamic: bool,
}

impl FieldFormat {
    /// Parses a line such as `field:char sec_type[16];\toffset:8;\tsize:16;\tsigned:0;`.
    fn parse(line: &str) -> Option<Self> {
        let mut parts = line.trim().strip_prefix("field:")?.split(';');
        let declaration = parts.next()?.trim();

        let mut offset = None;
        let mut size = None;
        for part in parts {
            match part.trim().split_once(':') {
                Some(("offset", value)) => offset = value.parse().ok(),
                Some(("size", value)) => size = value.parse().ok(),
                _ => {}
            }
        }

        let name = declaration.split_whitespace().last()?;
        let name = name.split_once('[').map_or(name, |(name, _)| name);

        Some(Self {
            name: name.to_string(),
            offset: offset?,
            size: size?,
            dynamic: declaration.starts_with("__data_loc"),
        })
    }

    /// Returns the bytes of the field in `record`.
    ///
    /// For a dynamic field, the 32-bit descriptor holds the offset of the array in the low 16
    /// bits and its length in the high 16 bits.
    pub fn slice<'a>(&self, record: &'a [u8]) -> Option<&'a [u8]> {
        let raw = record.get(self.offset..self.offset.checked_add(self.size)?)?;
        if !self.dynamic {
            return Some(raw);
        }

        let descriptor = u32::from_ne_bytes(raw.get(0..4)?.try_into().ok()?);
        let offset = (descriptor & 0xffff) as usize;
        let len = (descriptor >> 16) as usize;
        record.get(offset..offset + len)
    }

    /// Reads the field as an unsigned integer of its declared size.
    pub fn read_u64(&self, record: &[u8]) -> Option<u64> {
        let raw = self.slice(record)?;
        Some(match raw.len() {
            1 => raw[0] as u64,
            2 => u16::from_ne_bytes(raw.try_into().ok()?) as u64,
            4 => u32::from_ne_bytes(raw.try_into().ok()?) as u64,
            8 => u64::from_ne_bytes(raw.try_into().ok()?),
            _ => return None,
        })
    }
}

fn parse_fields(text: &str) -> Vec<FieldFormat> {
    text.lines()
        .filter(|line| line.trim_start().starts_with("field:"))
        .filter_map(FieldFormat::parse)
        .collect()
}

/// Layout of the ring buffer pages, read from `events/header_page`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderPage {
    pub timestamp_offset: usize,
    pub commit_offset: usize,
    pub commit_size: usize,
    pub data_offset: usize,
}

impl HeaderPage {
    pub fn parse(text: &str) -> Option<Self> {
        let fields = parse_fields(text);
        let field = |name: &str| fields.iter().find(|field| field.name == name);

        let timestamp = field("timestamp")?;
        let commit = field("commit")?;
        Some(Self {
            timestamp_offset: timestamp.offset,
            commit_offset: commit.offset,
            commit_size: commit.size,
            data_offset: field("data")?.offset,
        })
    }
}

/// Description of a trace event, read from `events/<group>/<event>/format`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFormat {
    pub name: String,
    pub id: u16,
    pub fields: Vec<FieldFormat>,
}

impl EventFormat {
    pub fn parse(text: &str) -> Option<Self> {
        let value = |key: &str| {
            text.lines()
                .find_map(|line| line.trim().strip_prefix(key))
                .map(str::trim)
        };

        Some(Self {
            name: value("name:")?.to_string(),
            id: value("ID:")?.parse().ok()?,
            fields: parse_fields(text),
        })
    }

    pub fn field(&self, name: &str) -> Option<&FieldFormat> {
        self.fields.iter().find(|field| field.name == name)
    }
}
