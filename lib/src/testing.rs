// Copyright (C) 2025 Intel Corporation
// SPDX-License-Identifier: MIT

//! Fakes of the kernel surfaces shared by the unit tests.

use crate::Error;
use crate::bmc::{Notify, RepairReport};
use crate::fault_addr::FaultAddress;
use crate::ledger::ImmutableFlag;
use crate::platform::{MemoryType, PageAction, Platform, RepairCommand, RepairDevice};
use crate::section::{ErrorSection, HBMC_MODULE_ID, HBMC_SUBMOD_HBM_REPAIR, valid_bits};
use std::cell::RefCell;
use std::collections::HashSet;
use std::io;
use std::path::Path;
use std::rc::Rc;

pub fn errno(code: i32) -> io::Result<usize> {
    Err(io::Error::from_raw_os_error(code))
}

#[derive(Clone)]
pub struct FakeDevice {
    pub memory_type: MemoryType,
    pub query: Rc<dyn Fn() -> io::Result<usize>>,
    pub repair: Rc<dyn Fn() -> io::Result<usize>>,
    pub commands: Rc<RefCell<Vec<(RepairCommand, u64)>>>,
}

impl FakeDevice {
    pub fn new(memory_type: MemoryType) -> Self {
        Self {
            memory_type,
            query: Rc::new(|| Ok(1)),
            repair: Rc::new(|| Ok(1)),
            commands: Rc::default(),
        }
    }

    pub fn with_query(mut self, query: impl Fn() -> io::Result<usize> + 'static) -> Self {
        self.query = Rc::new(query);
        self
    }

    pub fn with_repair(mut self, repair: impl Fn() -> io::Result<usize> + 'static) -> Self {
        self.repair = Rc::new(repair);
        self
    }
}

impl RepairDevice for FakeDevice {
    fn name(&self) -> String {
        "fake".to_string()
    }

    fn memory_type(&self) -> Result<MemoryType, Error> {
        Ok(self.memory_type)
    }

    fn command(&self, command: RepairCommand, paddr: u64) -> io::Result<usize> {
        self.commands.borrow_mut().push((command, paddr));
        match command {
            RepairCommand::AclsQuery | RepairCommand::SpprQuery => (self.query)(),
            RepairCommand::AclsRepair | RepairCommand::SpprRepair => (self.repair)(),
        }
    }
}

#[derive(Default)]
pub struct FakePlatform {
    /// `None` makes the meminfo entry unreadable.
    pub hardware_corrupted: Option<u64>,
    pub offline_failures: HashSet<u64>,
    pub online_failures: HashSet<u64>,
    pub devices: Vec<FakeDevice>,
    pub page_actions: RefCell<Vec<(PageAction, u64)>>,
}

impl FakePlatform {
    pub fn new(devices: Vec<FakeDevice>) -> Self {
        Self {
            hardware_corrupted: Some(0),
            devices,
            ..Self::default()
        }
    }

    pub fn actions(&self, action: PageAction) -> Vec<u64> {
        self.page_actions
            .borrow()
            .iter()
            .filter(|(a, _)| *a == action)
            .map(|(_, paddr)| *paddr)
            .collect()
    }
}

impl Platform for FakePlatform {
    type Device = FakeDevice;

    fn hardware_corrupted_kb(&self) -> Result<u64, Error> {
        self.hardware_corrupted.ok_or(Error::MissingMeminfoEntry)
    }

    fn page_action(&self, action: PageAction, paddr: u64) -> io::Result<()> {
        self.page_actions.borrow_mut().push((action, paddr));
        let failures = match action {
            PageAction::Offline => &self.offline_failures,
            PageAction::Online => &self.online_failures,
            PageAction::Remove => return Ok(()),
        };
        if failures.contains(&paddr) {
            return Err(io::Error::from_raw_os_error(libc::EBUSY));
        }
        Ok(())
    }

    fn repair_devices(&self) -> Result<Vec<FakeDevice>, Error> {
        Ok(self.devices.clone())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub reports: RefCell<Vec<RepairReport>>,
}

impl Notify for RecordingNotifier {
    fn notify(&self, report: &RepairReport) {
        self.reports.borrow_mut().push(report.clone());
    }
}

/// Immutable attribute kept in memory.
#[derive(Default)]
pub struct MemoryFlags {
    pub immutable: RefCell<HashSet<std::path::PathBuf>>,
}

impl ImmutableFlag for MemoryFlags {
    fn is_immutable(&self, path: &Path) -> io::Result<bool> {
        Ok(self.immutable.borrow().contains(path))
    }

    fn set_immutable(&self, path: &Path, immutable: bool) -> io::Result<()> {
        if immutable {
            self.immutable.borrow_mut().insert(path.to_path_buf());
        } else {
            self.immutable.borrow_mut().remove(path);
        }
        Ok(())
    }
}

/// Builds a valid HBM repair section.
///
/// The physical addresses are `0x1000 * (i + 1)` and the fault address is `fault`.
pub fn repair_section(repair_type: u32, address_count: usize, fault: FaultAddress) -> ErrorSection {
    let mut reg_array = vec![repair_type];
    for i in 0..address_count {
        let paddr = 0x1000 * (i as u64 + 1);
        reg_array.push(paddr as u32);
        reg_array.push((paddr >> 32) as u32);
    }
    let raw = fault.encode();
    reg_array.push(raw as u32);
    reg_array.push((raw >> 32) as u32);

    ErrorSection {
        valid_bits: valid_bits::REQUIRED,
        module_id: HBMC_MODULE_ID,
        submodule_id: HBMC_SUBMOD_HBM_REPAIR,
        reg_array,
        ..ErrorSection::default()
    }
}

/// Format of `ras:non_standard_event` as exported by the kernel.
pub const NON_STANDARD_EVENT_FORMAT: &str = "name: non_standard_event
ID: 1487
format:
\tfield:unsigned short common_type;\toffset:0;\tsize:2;\tsigned:0;
\tfield:unsigned char common_flags;\toffset:2;\tsize:1;\tsigned:0;
\tfield:unsigned char common_preempt_count;\toffset:3;\tsize:1;\tsigned:0;
\tfield:int common_pid;\toffset:4;\tsize:4;\tsigned:1;

\tfield:char sec_type[16];\toffset:8;\tsize:16;\tsigned:0;
\tfield:char fru_id[16];\toffset:24;\tsize:16;\tsigned:0;
\tfield:__data_loc char[] fru_text;\toffset:40;\tsize:4;\tsigned:0;
\tfield:u8 sev;\toffset:44;\tsize:1;\tsigned:0;
\tfield:u32 len;\toffset:48;\tsize:4;\tsigned:0;
\tfield:__data_loc u8[] buf;\toffset:52;\tsize:4;\tsigned:0;

print fmt: \"severity: %d; sec type:%pU; FRU: %pU %s; data len:%d; raw data:%s\"
";

/// Id of `ras:non_standard_event` in [`NON_STANDARD_EVENT_FORMAT`].
pub const NON_STANDARD_EVENT_ID: u16 = 1487;

pub const HEADER_PAGE: &str = "\tfield: u64 timestamp;\toffset:0;\tsize:8;\tsigned:0;
\tfield: local_t commit;\toffset:8;\tsize:8;\tsigned:1;
\tfield: int overwrite;\toffset:8;\tsize:1;\tsigned:1;
\tfield: char data;\toffset:16;\tsize:4080;\tsigned:1;
";

pub fn header_page() -> crate::trace::HeaderPage {
    crate::trace::HeaderPage::parse(HEADER_PAGE).unwrap()
}

/// Builds a `ras:non_standard_event` record whose `len` field is `declared_len`.
pub fn non_standard_record(section_type: uguid::Guid, payload: &[u8], declared_len: u32) -> Vec<u8> {
    let mut record = vec![0u8; 56];
    record[0..2].copy_from_slice(&NON_STANDARD_EVENT_ID.to_ne_bytes());
    record[8..24].copy_from_slice(&section_type.to_bytes());
    record[48..52].copy_from_slice(&declared_len.to_ne_bytes());
    let descriptor = ((payload.len() as u32) << 16) | 56;
    record[52..56].copy_from_slice(&descriptor.to_ne_bytes());
    record.extend_from_slice(payload);
    record.resize(record.len().next_multiple_of(4), 0);
    record
}

/// Builds a ring buffer page as returned by `trace_pipe_raw`.
pub struct PageBuilder {
    timestamp: u64,
    data: Vec<u8>,
}

impl PageBuilder {
    pub fn new(timestamp: u64) -> Self {
        Self {
            timestamp,
            data: Vec::new(),
        }
    }

    fn word(mut self, value: u32) -> Self {
        self.data.extend_from_slice(&value.to_ne_bytes());
        self
    }

    pub fn record(self, delta: u32, data: &[u8]) -> Self {
        let len = data.len().next_multiple_of(4);
        let mut builder = if len <= 28 * 4 {
            self.word((len as u32 / 4) | (delta << 5))
        } else {
            self.word(delta << 5).word(len as u32 + 4)
        };
        builder.data.extend_from_slice(data);
        builder.data.resize(builder.data.len() + len - data.len(), 0);
        builder
    }

    pub fn time_extend(self, delta: u32, extend: u32) -> Self {
        self.word(30 | (delta << 5)).word(extend)
    }

    pub fn time_stamp(self, delta: u32, extend: u32) -> Self {
        self.word(31 | (delta << 5)).word(extend)
    }

    /// Padding of `len` bytes following the event header.
    pub fn padding(mut self, len: u32) -> Self {
        self = self.word(29 | (1 << 5)).word(len);
        self.data.resize(self.data.len() + len as usize - 4, 0);
        self
    }

    pub fn null_padding(self) -> Self {
        self.word(29)
    }

    pub fn build(self) -> Vec<u8> {
        let mut page = Vec::with_capacity(4096);
        page.extend_from_slice(&self.timestamp.to_ne_bytes());
        page.extend_from_slice(&(self.data.len() as u64).to_ne_bytes());
        page.extend_from_slice(&self.data);
        page.resize(4096, 0);
        page
    }
}
