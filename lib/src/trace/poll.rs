// Copyright (C) 2025 Intel Corporation
// SPDX-License-Identifier: MIT

//! Readiness multiplexing of the trace streams and the termination signals.

use std::io;
use std::mem::{MaybeUninit, size_of};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

/// Signals handled through a file descriptor instead of their default action.
pub struct SignalFd {
    fd: OwnedFd,
    mask: libc::sigset_t,
}

impl SignalFd {
    /// Blocks `signals` and opens a descriptor reporting their delivery.
    pub fn new(signals: &[i32]) -> io::Result<Self> {
        let mut mask = MaybeUninit::<libc::sigset_t>::uninit();
        // SAFETY: sigemptyset initializes the set.
        let mut mask = unsafe {
            libc::sigemptyset(mask.as_mut_ptr());
            mask.assume_init()
        };
        for signal in signals {
            // SAFETY: mask is initialized.
            unsafe { libc::sigaddset(&mut mask, *signal) };
        }

        // SAFETY: mask is initialized and the previous mask is not requested.
        if unsafe { libc::sigprocmask(libc::SIG_BLOCK, &mask, std::ptr::null_mut()) } == -1 {
            log::warn!("Cannot block signals: {}", io::Error::last_os_error());
        }

        // SAFETY: mask is initialized.
        let fd = unsafe { libc::signalfd(-1, &mask, 0) };
        if fd < 0 {
            let err = io::Error::last_os_error();
            unblock(&mask);
            return Err(err);
        }

        Ok(Self {
            // SAFETY: fd is a new descriptor owned by nothing else.
            fd: unsafe { OwnedFd::from_raw_fd(fd) },
            mask,
        })
    }

    /// Reads the number of the signal delivered.
    pub fn read(&self) -> io::Result<u32> {
        let mut info = MaybeUninit::<libc::signalfd_siginfo>::zeroed();
        let size = size_of::<libc::signalfd_siginfo>();
        // SAFETY: info is a writable buffer of `size` bytes.
        let read = unsafe { libc::read(self.fd.as_raw_fd(), info.as_mut_ptr().cast(), size) };
        if read < 0 {
            return Err(io::Error::last_os_error());
        }
        if read as usize != size {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        // SAFETY: the kernel filled the whole structure.
        Ok(unsafe { info.assume_init() }.ssi_signo)
    }
}

fn unblock(mask: &libc::sigset_t) {
    // SAFETY: mask is initialized.
    unsafe { libc::sigprocmask(libc::SIG_UNBLOCK, mask, std::ptr::null_mut()) };
}

impl AsRawFd for SignalFd {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl Drop for SignalFd {
    fn drop(&mut self) {
        unblock(&self.mask);
    }
}

/// Set of descriptors waited on for input.
pub struct PollSet {
    fds: Vec<libc::pollfd>,
}

impl PollSet {
    pub fn new(fds: impl IntoIterator<Item = RawFd>) -> Self {
        Self {
            fds: fds
                .into_iter()
                .map(|fd| libc::pollfd {
                    fd,
                    events: libc::POLLIN,
                    revents: 0,
                })
                .collect(),
        }
    }

    /// Blocks until at least one descriptor is ready.
    pub fn wait(&mut self) -> io::Result<usize> {
        for fd in self.fds.iter_mut() {
            fd.revents = 0;
        }
        // SAFETY: fds points to `len` initialized pollfd structures.
        let ready = unsafe { libc::poll(self.fds.as_mut_ptr(), self.fds.len() as libc::nfds_t, -1) };
        if ready < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(ready as usize)
    }

    pub fn readable(&self, index: usize) -> bool {
        self.fds
            .get(index)
            .is_some_and(|fd| fd.revents & libc::POLLIN != 0)
    }

    pub fn failed(&self, index: usize) -> bool {
        self.fds
            .get(index)
            .is_some_and(|fd| fd.revents & libc::POLLERR != 0)
    }
}

/// Returns the number of online CPUs.
pub fn online_cpus() -> io::Result<usize> {
    // SAFETY: sysconf has no memory safety requirement.
    let cpus = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) };
    if cpus < 1 {
        return Err(io::Error::last_os_error());
    }
    Ok(cpus as usize)
}
