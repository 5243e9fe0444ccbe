// Copyright (C) 2025 Intel Corporation
// SPDX-License-Identifier: MIT

//! Run-time settings of the repair daemon.

use crate::Error;
use log::LevelFilter;
use std::fmt;
use std::path::PathBuf;

pub const LOG_LEVEL_ENV: &str = "HBM_ONLINE_REPAIR_LOG_LEVEL";
pub const PAGE_ISOLATION_THRESHOLD_ENV: &str = "PAGE_ISOLATION_THRESHOLD";

/// Default page isolation threshold in KiB.
pub const DEFAULT_PAGE_ISOLATION_THRESHOLD: u64 = 3355443;
/// Default capacity of the flash ledger in bytes.
pub const DEFAULT_FLASH_CAPACITY: u64 = 128 * 1024;

/// Verbosity levels accepted through [`LOG_LEVEL_ENV`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
}

impl LogLevel {
    fn from_setting(value: i32) -> Option<Self> {
        Some(match value {
            0 => LogLevel::Debug,
            1 => LogLevel::Info,
            2 => LogLevel::Warning,
            3 => LogLevel::Error,
            _ => return None,
        })
    }
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Warning => LevelFilter::Warn,
            LogLevel::Error => LevelFilter::Error,
        }
    }
}

/// Configuration shared by every component of the daemon.
#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: LogLevel,
    /// Maximum amount of hardware-corrupted memory, in KiB, before page isolation is refused.
    pub page_isolation_threshold: u64,
    /// Maximum total size, in bytes, of the fault records stored in the flash.
    pub flash_capacity: u64,
    pub efivars_dir: PathBuf,
    pub page_eject_dir: PathBuf,
    pub platform_devices_dir: PathBuf,
    pub meminfo_path: PathBuf,
    pub mounts_path: PathBuf,
    pub bmc_socket: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            page_isolation_threshold: DEFAULT_PAGE_ISOLATION_THRESHOLD,
            flash_capacity: DEFAULT_FLASH_CAPACITY,
            efivars_dir: PathBuf::from("/sys/firmware/efi/efivars"),
            page_eject_dir: PathBuf::from("/sys/kernel/page_eject"),
            platform_devices_dir: PathBuf::from("/sys/devices/platform"),
            meminfo_path: PathBuf::from("/proc/meminfo"),
            mounts_path: PathBuf::from("/proc/mounts"),
            bmc_socket: PathBuf::from("/var/run/sysSentry/bmc.sock"),
        }
    }
}

fn parse_setting(name: &'static str, value: Option<String>) -> Result<i32, Error> {
    let value = value.unwrap_or_default();
    value
        .parse::<i32>()
        .map_err(|_| Error::InvalidSetting { name, value })
}

impl Config {
    /// Reads the settings from the process environment.
    ///
    /// Settings that are missing or invalid fall back to their default value. The returned
    /// errors describe the settings that were ignored.
    pub fn from_env() -> (Self, Vec<Error>) {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the settings using `lookup` to fetch the value of each variable.
    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> (Self, Vec<Error>) {
        let mut config = Config::default();
        let mut errors = Vec::new();

        match parse_setting(LOG_LEVEL_ENV, lookup(LOG_LEVEL_ENV)).and_then(|level| {
            LogLevel::from_setting(level).ok_or(Error::InvalidSetting {
                name: LOG_LEVEL_ENV,
                value: level.to_string(),
            })
        }) {
            Ok(level) => config.log_level = level,
            Err(err) => errors.push(err),
        }

        match parse_setting(
            PAGE_ISOLATION_THRESHOLD_ENV,
            lookup(PAGE_ISOLATION_THRESHOLD_ENV),
        )
        .and_then(|threshold| {
            u64::try_from(threshold).map_err(|_| Error::InvalidSetting {
                name: PAGE_ISOLATION_THRESHOLD_ENV,
                value: threshold.to_string(),
            })
        }) {
            Ok(threshold) => config.page_isolation_threshold = threshold,
            Err(err) => errors.push(err),
        }

        (config, errors)
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "log level: {:?}, page isolation threshold: {}KB, flash capacity: {}KB",
            self.log_level,
            self.page_isolation_threshold,
            self.flash_capacity / 1024
        )
    }
}
