// Copyright (C) 2025 Intel Corporation
// SPDX-License-Identifier: MIT

//! Immutable attribute of the efivarfs files.

use std::fs::File;
use std::io;
use std::os::fd::AsRawFd;
use std::path::Path;

const FS_IMMUTABLE_FL: libc::c_int = 0x10;

/// Access to the immutable attribute of a file.
pub trait ImmutableFlag {
    fn is_immutable(&self, path: &Path) -> io::Result<bool>;
    fn set_immutable(&self, path: &Path, immutable: bool) -> io::Result<()>;
}

/// Toggles the immutable attribute with the `FS_IOC_*FLAGS` ioctls, like `chattr`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Chattr;

impl Chattr {
    fn get_flags(file: &File) -> io::Result<libc::c_int> {
        let mut flags: libc::c_int = 0;
        let ptr = &mut flags as *mut libc::c_int;
        let ret = unsafe { libc::ioctl(file.as_raw_fd(), libc::FS_IOC_GETFLAGS, ptr) };
        if ret == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(flags)
    }
}

impl ImmutableFlag for Chattr {
    fn is_immutable(&self, path: &Path) -> io::Result<bool> {
        let file = File::open(path)?;
        Ok(Self::get_flags(&file)? & FS_IMMUTABLE_FL != 0)
    }

    fn set_immutable(&self, path: &Path, immutable: bool) -> io::Result<()> {
        let file = File::open(path)?;
        let flags = Self::get_flags(&file)?;
        let new_flags = if immutable {
            flags | FS_IMMUTABLE_FL
        } else {
            flags & !FS_IMMUTABLE_FL
        };

        if new_flags == flags {
            return Ok(());
        }

        let ptr = &new_flags as *const libc::c_int;
        let ret = unsafe { libc::ioctl(file.as_raw_fd(), libc::FS_IOC_SETFLAGS, ptr) };
        if ret == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

/// Keeps a file writable for the lifetime of the guard.
///
/// The previous state of the immutable attribute is restored when the guard is dropped.
pub struct WritableGuard<'a, F: ImmutableFlag> {
    flags: &'a F,
    path: &'a Path,
    was_immutable: bool,
}

impl<'a, F: ImmutableFlag> WritableGuard<'a, F> {
    pub fn acquire(flags: &'a F, path: &'a Path) -> io::Result<Self> {
        let was_immutable = flags.is_immutable(path)?;
        // Restore the attribute even if clearing it failed half-way.
        let guard = Self {
            flags,
            path,
            was_immutable,
        };
        if was_immutable {
            flags.set_immutable(path, false)?;
        }
        Ok(guard)
    }
}

impl<F: ImmutableFlag> Drop for WritableGuard<'_, F> {
    fn drop(&mut self) {
        if !self.was_immutable {
            return;
        }
        if let Err(err) = self.flags.set_immutable(self.path, true) {
            log::error!("Cannot set immutable for {}: {err}", self.path.display());
        }
    }
}
