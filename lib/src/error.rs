// Copyright (C) 2025 Intel Corporation
// SPDX-License-Identifier: MIT

use std::path::PathBuf;
use std::{fmt, io, num, str};

/// Errors reported by the HBM online repair functions.
#[derive(Debug)]
pub enum Error {
    InternalError,
    NoDebugFsFound,
    TraceInstance(PathBuf),
    InvalidHeaderPage,
    InvalidEventFormat(String),
    ToggleEvent(String),
    InvalidSetting { name: &'static str, value: String },
    InvalidSlot { processor: u32, error_type: u32 },
    LedgerFull { total: u64, capacity: u64 },
    InvalidVariable(PathBuf),
    MissingMeminfoEntry,
    InvalidFaultAddress(String),
    #[cfg(feature = "serialize")]
    JsonError(serde_json::Error),
    Utf8Error(str::Utf8Error),
    ParseIntError(num::ParseIntError),
    IOError(io::Error),
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::InternalError => write!(f, "Internal error in the HBM repair library"),
            Error::NoDebugFsFound => write!(f, "No debugfs mount point could be found"),
            Error::TraceInstance(path) => {
                write!(f, "Unable to create trace instance at {}", path.display())
            }
            Error::InvalidHeaderPage => write!(f, "Invalid trace header page"),
            Error::InvalidEventFormat(event) => write!(f, "Cannot parse event format of {event}"),
            Error::ToggleEvent(event) => write!(f, "Cannot toggle {event} tracing"),
            Error::InvalidSetting { name, value } => {
                write!(f, "Invalid value for {name}: {value:?}")
            }
            Error::InvalidSlot {
                processor,
                error_type,
            } => write!(
                f,
                "No flash slot for processor {processor} and error type {error_type}"
            ),
            Error::LedgerFull { total, capacity } => write!(
                f,
                "Fault info storage is full ({total} bytes used, {capacity} bytes available)"
            ),
            Error::InvalidVariable(path) => {
                write!(f, "Invalid firmware variable: {}", path.display())
            }
            Error::MissingMeminfoEntry => write!(f, "HardwareCorrupted entry not found in meminfo"),
            Error::InvalidFaultAddress(s) => write!(f, "Invalid fault address: {s:?}"),
            #[cfg(feature = "serialize")]
            Error::JsonError(err) => write!(f, "JSON error: {err}"),
            Error::Utf8Error(err) => write!(f, "UTF8 Error: {err}"),
            Error::ParseIntError(err) => write!(f, "Error while parsing integer: {err}"),
            Error::IOError(err) => write!(f, "Encountered IO error: {err}"),
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::IOError(err)
    }
}

#[cfg(feature = "serialize")]
impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::JsonError(err)
    }
}

impl From<str::Utf8Error> for Error {
    fn from(err: str::Utf8Error) -> Self {
        Error::Utf8Error(err)
    }
}

impl From<num::ParseIntError> for Error {
    fn from(err: num::ParseIntError) -> Self {
        Error::ParseIntError(err)
    }
}
