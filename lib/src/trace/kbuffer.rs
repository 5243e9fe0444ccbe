// Copyright (C) 2025 Intel Corporation
// SPDX-License-Identifier: MIT

//! Reader of the ring buffer pages returned by `trace_pipe_raw`.

use super::format::HeaderPage;

const COMMIT_MASK: u64 = (1 << 27) - 1;
const TS_SHIFT: u32 = 27;
const EVENT_HEADER_SIZE: usize = 4;

const TYPE_LEN_MASK: u32 = 0x1f;
const TYPE_PADDING: u32 = 29;
const TYPE_TIME_EXTEND: u32 = 30;
const TYPE_TIME_STAMP: u32 = 31;
const TYPE_DATA_MAX: u32 = 28;

/// Trace record stored in a ring buffer page.
#[derive(Debug, PartialEq, Eq)]
pub struct Record<'a> {
    pub timestamp: u64,
    pub data: &'a [u8],
}

/// Iterator over the records of a single ring buffer page.
pub struct SubBuffer<'a> {
    data: &'a [u8],
    timestamp: u64,
    pos: usize,
}

fn read_u32(s: &[u8], offset: usize) -> Option<u32> {
    Some(u32::from_ne_bytes(s.get(offset..offset + 4)?.try_into().ok()?))
}

impl<'a> SubBuffer<'a> {
    /// Loads a page using the layout described by `header`.
    pub fn new(page: &'a [u8], header: &HeaderPage) -> Option<Self> {
        let ts = header.timestamp_offset;
        let timestamp = u64::from_ne_bytes(page.get(ts..ts + 8)?.try_into().ok()?);

        let commit = page.get(header.commit_offset..header.commit_offset + header.commit_size)?;
        let commit = match commit.len() {
            4 => u32::from_ne_bytes(commit.try_into().ok()?) as u64,
            8 => u64::from_ne_bytes(commit.try_into().ok()?),
            _ => return None,
        };

        let size = (commit & COMMIT_MASK) as usize;
        let data = page.get(header.data_offset..)?;
        Some(Self {
            data: data.get(..size).unwrap_or(data),
            timestamp,
            pos: 0,
        })
    }

    /// Timestamp of the last record read.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }
}

impl<'a> Iterator for SubBuffer<'a> {
    type Item = Record<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let header = read_u32(self.data, self.pos)?;
            let type_len = header & TYPE_LEN_MASK;
            let delta = (header >> 5) as u64;
            let body = self.pos + EVENT_HEADER_SIZE;

            match type_len {
                TYPE_PADDING => {
                    // Null padding: nothing else is stored in the page.
                    if delta == 0 {
                        self.pos = self.data.len();
                        return None;
                    }
                    self.pos = body + read_u32(self.data, body)? as usize;
                }
                TYPE_TIME_EXTEND => {
                    let extend = (read_u32(self.data, body)? as u64) << TS_SHIFT;
                    self.timestamp += extend + delta;
                    self.pos = body + 4;
                }
                TYPE_TIME_STAMP => {
                    let extend = (read_u32(self.data, body)? as u64) << TS_SHIFT;
                    self.timestamp = extend + delta;
                    self.pos = body + 4;
                }
                0 => {
                    let len = (read_u32(self.data, body)? as usize).checked_sub(4)?;
                    let len = (len + 3) & !3;
                    let start = body + 4;
                    let data = self.data.get(start..start + len)?;
                    self.timestamp += delta;
                    self.pos = start + len;
                    return Some(Record {
                        timestamp: self.timestamp,
                        data,
                    });
                }
                1..=TYPE_DATA_MAX => {
                    let len = type_len as usize * 4;
                    let data = self.data.get(body..body + len)?;
                    self.timestamp += delta;
                    self.pos = body + len;
                    return Some(Record {
                        timestamp: self.timestamp,
                        data,
                    });
                }
                _ => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{PageBuilder, header_page};

    #[test]
    fn empty_page() {
        let page = PageBuilder::new(1000).build();
        let mut records = SubBuffer::new(&page, &header_page()).unwrap();
        assert_eq!(records.next(), None);
    }

    #[test]
    fn short_and_long_records() {
        let long = vec![0x5a; 200];
        let page = PageBuilder::new(1000)
            .record(10, &[1, 2, 3, 4])
            .record(5, &long)
            .build();

        let records: Vec<_> = SubBuffer::new(&page, &header_page()).unwrap().collect();
        assert_eq!(
            records,
            vec![
                Record {
                    timestamp: 1010,
                    data: &[1, 2, 3, 4]
                },
                Record {
                    timestamp: 1015,
                    data: &long
                },
            ]
        );
    }

    #[test]
    fn time_extend() {
        let page = PageBuilder::new(0)
            .time_extend(3, 1)
            .record(2, &[0; 8])
            .build();

        let record = SubBuffer::new(&page, &header_page()).unwrap().next().unwrap();
        assert_eq!(record.timestamp, (1 << 27) + 3 + 2);
    }

    #[test]
    fn absolute_time_stamp() {
        let page = PageBuilder::new(5000)
            .time_stamp(7, 2)
            .record(1, &[0; 4])
            .build();

        let record = SubBuffer::new(&page, &header_page()).unwrap().next().unwrap();
        assert_eq!(record.timestamp, (2 << 27) + 7 + 1);
    }

    #[test]
    fn padding() {
        let page = PageBuilder::new(0)
            .padding(12)
            .record(1, &[9; 4])
            .null_padding()
            .record(1, &[8; 4])
            .build();

        let records: Vec<_> = SubBuffer::new(&page, &header_page()).unwrap().collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].data, &[9; 4]);
    }

    #[test]
    fn commit_bounds_the_records() {
        let mut page = PageBuilder::new(0)
            .record(1, &[1; 4])
            .record(1, &[2; 4])
            .build();
        // Only the first record is committed.
        page[8..16].copy_from_slice(&8u64.to_ne_bytes());

        let records: Vec<_> = SubBuffer::new(&page, &header_page()).unwrap().collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].data, &[1; 4]);
    }

    #[test]
    fn truncated_page() {
        assert!(SubBuffer::new(&[0; 12], &header_page()).is_none());
    }
}
