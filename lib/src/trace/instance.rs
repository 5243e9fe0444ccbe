// Copyright (C) 2025 Intel Corporation
// SPDX-License-Identifier: MIT

use super::format::{EventFormat, HeaderPage};
use crate::Error;
use std::fs::{DirBuilder, File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};

pub const TOOL_NAME: &str = "hbm_online_repair";

/// Finds the mount point of debugfs in the content of `/proc/mounts`.
pub fn debugfs_dir(mounts: &str) -> Option<PathBuf> {
    mounts.lines().find_map(|line| {
        let mut fields = line.split_whitespace();
        let _source = fields.next()?;
        let dir = fields.next()?;
        (fields.next()? == "debugfs").then(|| PathBuf::from(dir))
    })
}

/// Trace instance dedicated to the daemon.
#[derive(Debug, Clone)]
pub struct TraceInstance {
    dir: PathBuf,
}

impl TraceInstance {
    /// Creates the trace instance under the debugfs found in `mounts`, or reuses it.
    pub fn create(mounts: &Path) -> Result<Self, Error> {
        let mounts = std::fs::read_to_string(mounts)
            .inspect_err(|err| log::info!("Cannot open {}: {err}", mounts.display()))?;
        let debugfs = debugfs_dir(&mounts).ok_or(Error::NoDebugFsFound)?;
        let dir = debugfs.join("tracing/instances").join(TOOL_NAME);

        match DirBuilder::new().mode(0o700).create(&dir) {
            Ok(()) => log::debug!("Created trace instance {}", dir.display()),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {}
            Err(err) => {
                log::info!("Unable to create {TOOL_NAME} instance at {}: {err}", dir.display());
                return Err(Error::TraceInstance(dir));
            }
        }
        Ok(Self { dir })
    }

    /// Uses an existing trace instance directory.
    pub fn at(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn write(&self, name: &str, value: &str) -> io::Result<()> {
        let path = self.dir.join(name);
        let mut file = OpenOptions::new()
            .write(true)
            .append(true)
            .open(&path)
            .inspect_err(|err| log::warn!("Cannot open {}: {err}", path.display()))?;
        match file.write(value.as_bytes())? {
            0 => Err(io::ErrorKind::WriteZero.into()),
            _ => Ok(()),
        }
    }

    /// Enables or disables the tracepoint `group:event` in the instance.
    pub fn toggle_event(&self, group: &str, event: &str, enable: bool) -> Result<(), Error> {
        let request = format!("{}{group}:{event}\n", if enable { "" } else { "!" });
        let action = if enable { "enable" } else { "disable" };

        self.write("set_event", &request)
            .inspect_err(|err| log::error!("Can't {action} {group}:{event} tracing: {err}"))
            .map_err(|_| Error::ToggleEvent(format!("{group}:{event}")))?;

        log::info!("{group}:{event} event {action}d");
        Ok(())
    }

    /// Sets how full the ring buffer must be before waking up the readers.
    pub fn set_buffer_percent(&self, percent: u32) -> Result<(), Error> {
        Ok(self.write("buffer_percent", &percent.to_string())?)
    }

    pub fn header_page(&self) -> Result<HeaderPage, Error> {
        let path = self.dir.join("events/header_page");
        let text = std::fs::read_to_string(&path)
            .inspect_err(|err| log::warn!("Read event header page failed: {err}"))?;
        HeaderPage::parse(&text).ok_or(Error::InvalidHeaderPage)
    }

    pub fn event_format(&self, group: &str, event: &str) -> Result<EventFormat, Error> {
        let path = self.dir.join("events").join(group).join(event).join("format");
        let text = std::fs::read_to_string(&path).inspect_err(|err| {
            log::error!(
                "Can't get {group}:{event} traces. \
                 Perhaps this feature is not supported on your system: {err}"
            )
        })?;
        EventFormat::parse(&text).ok_or_else(|| Error::InvalidEventFormat(format!("{group}:{event}")))
    }

    /// Opens the raw ring buffer stream of a CPU.
    pub fn open_cpu(&self, cpu: usize) -> io::Result<File> {
        let path = self.dir.join(format!("per_cpu/cpu{cpu}/trace_pipe_raw"));
        File::open(&path).inspect_err(|err| log::warn!("Cannot open {}: {err}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_debugfs() {
        let mounts = "sysfs /sys sysfs rw,nosuid,nodev,noexec,relatime 0 0\n\
                      proc /proc proc rw,nosuid,nodev,noexec,relatime 0 0\n\
                      debugfs /sys/kernel/debug debugfs rw,nosuid,nodev,noexec,relatime 0 0\n";
        assert_eq!(debugfs_dir(mounts), Some(PathBuf::from("/sys/kernel/debug")));
        assert_eq!(debugfs_dir("proc /proc proc rw 0 0\n"), None);
    }

    #[test]
    fn create_instance() {
        let dir = tempfile::tempdir().unwrap();
        let debugfs = dir.path().join("debug");
        std::fs::create_dir_all(debugfs.join("tracing/instances")).unwrap();
        let mounts = dir.path().join("mounts");
        std::fs::write(&mounts, format!("debugfs {} debugfs rw 0 0\n", debugfs.display())).unwrap();

        let instance = TraceInstance::create(&mounts).unwrap();
        assert_eq!(instance.dir(), debugfs.join("tracing/instances").join(TOOL_NAME));
        assert!(instance.dir().is_dir());

        // The instance is reused.
        assert!(TraceInstance::create(&mounts).is_ok());
    }

    #[test]
    fn create_without_debugfs() {
        let dir = tempfile::tempdir().unwrap();
        let mounts = dir.path().join("mounts");
        std::fs::write(&mounts, "proc /proc proc rw 0 0\n").unwrap();
        assert!(matches!(TraceInstance::create(&mounts), Err(Error::NoDebugFsFound)));

        std::fs::write(&mounts, "debugfs /nonexistent/debug debugfs rw 0 0\n").unwrap();
        assert!(matches!(TraceInstance::create(&mounts), Err(Error::TraceInstance(_))));
    }

    #[test]
    fn toggle_event() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("set_event"), "").unwrap();
        let instance = TraceInstance::at(dir.path());

        instance.toggle_event("ras", "non_standard_event", true).unwrap();
        instance.toggle_event("ras", "non_standard_event", false).unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("set_event")).unwrap(),
            "ras:non_standard_event\n!ras:non_standard_event\n"
        );
    }

    #[test]
    fn toggle_event_failure() {
        let dir = tempfile::tempdir().unwrap();
        let instance = TraceInstance::at(dir.path());
        assert!(matches!(
            instance.toggle_event("ras", "non_standard_event", true),
            Err(Error::ToggleEvent(_))
        ));
    }

    #[test]
    fn buffer_percent() {
        let dir = tempfile::tempdir().unwrap();
        let instance = TraceInstance::at(dir.path());
        assert!(instance.set_buffer_percent(0).is_err());

        std::fs::write(dir.path().join("buffer_percent"), "").unwrap();
        instance.set_buffer_percent(0).unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("buffer_percent")).unwrap(),
            "0"
        );
    }

    #[test]
    fn metadata() {
        let dir = tempfile::tempdir().unwrap();
        let instance = TraceInstance::at(dir.path());
        assert!(instance.header_page().is_err());

        let events = dir.path().join("events");
        std::fs::create_dir_all(events.join("ras/non_standard_event")).unwrap();
        std::fs::write(events.join("header_page"), crate::testing::HEADER_PAGE).unwrap();
        std::fs::write(
            events.join("ras/non_standard_event/format"),
            crate::testing::NON_STANDARD_EVENT_FORMAT,
        )
        .unwrap();

        assert_eq!(instance.header_page().unwrap().data_offset, 16);
        assert_eq!(instance.event_format("ras", "non_standard_event").unwrap().id, 1487);
    }
}
