// Copyright (C) 2025 Intel Corporation
// SPDX-License-Identifier: MIT

//! Consumption of the RAS events reported through the kernel tracing subsystem.
//!
//! A dedicated trace instance is created with the `ras:non_standard_event` tracepoint enabled.
//! The raw ring buffer of every online CPU is then read until a termination signal is received.

pub mod event;
pub mod format;
pub mod instance;
pub mod kbuffer;
pub mod poll;

pub use event::{NON_STANDARD_EVENT, NonStandardEventDecoder, RAS_GROUP, RasEvent};
pub use format::{EventFormat, FieldFormat, HeaderPage};
pub use instance::{TOOL_NAME, TraceInstance};
pub use kbuffer::{Record, SubBuffer};

use crate::Error;
use poll::{PollSet, SignalFd};
use std::fs::File;
use std::io::Read;
use std::os::fd::AsRawFd;

/// Size of the pages read from `trace_pipe_raw`.
pub const PAGE_SIZE: usize = 4096;

/// Signals terminating the event loop.
pub const WATCHED_SIGNALS: [i32; 4] = [libc::SIGINT, libc::SIGTERM, libc::SIGHUP, libc::SIGQUIT];

/// Receives the RAS events read from the trace buffers.
pub trait RasEventHandler {
    fn handle(&mut self, event: &RasEvent);
}

/// Reason the event loop stopped without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Signal(u32),
    /// None of the CPU streams had data when the loop woke up.
    NoCpuReady,
}

/// Reader of the `ras:non_standard_event` records of a trace instance.
pub struct TraceEventSource {
    instance: TraceInstance,
    header: HeaderPage,
    decoder: NonStandardEventDecoder,
}

impl TraceEventSource {
    /// Loads the ring buffer layout and the format of the event from `instance`.
    pub fn new(instance: TraceInstance) -> Result<Self, Error> {
        let header = instance
            .header_page()
            .inspect_err(|err| log::error!("Cannot read trace header_page: {err}"))?;
        let format = instance.event_format(RAS_GROUP, NON_STANDARD_EVENT)?;
        let decoder = NonStandardEventDecoder::new(&format)?;
        log::info!("Registered handler for {RAS_GROUP}:{NON_STANDARD_EVENT}");

        Ok(Self {
            instance,
            header,
            decoder,
        })
    }

    pub fn instance(&self) -> &TraceInstance {
        &self.instance
    }

    /// Decodes every event stored in a ring buffer page and hands it to `handler`.
    ///
    /// Returns the number of events handled.
    pub fn process_page<H: RasEventHandler>(&self, page: &[u8], handler: &mut H) -> usize {
        let Some(records) = SubBuffer::new(page, &self.header) else {
            log::error!("Invalid ring buffer page, discard");
            return 0;
        };

        let mut count = 0;
        for record in records {
            match event::record_id(record.data) {
                Some(id) if id == self.decoder.id() => {
                    if let Some(event) = self.decoder.decode(record.timestamp, record.data) {
                        handler.handle(&event);
                        count += 1;
                    }
                }
                id => log::debug!("Skipping record of event {id:?}"),
            }
        }
        count
    }

    /// Runs the event loop over every online CPU.
    pub fn run<H: RasEventHandler>(&self, handler: &mut H) -> Result<StopReason, Error> {
        self.run_on(poll::online_cpus()?, handler)
    }

    /// Runs the event loop over the CPUs `0..cpus`.
    ///
    /// The loop stops when a watched signal is received or when no CPU has data after a wake
    /// up. A read error on any CPU aborts the loop.
    pub fn run_on<H: RasEventHandler>(
        &self,
        cpus: usize,
        handler: &mut H,
    ) -> Result<StopReason, Error> {
        if let Err(err) = self.instance.set_buffer_percent(0) {
            log::warn!("Set buffer_percent failed: {err}");
        }

        let mut streams = (0..cpus)
            .map(|cpu| {
                self.instance
                    .open_cpu(cpu)
                    .inspect_err(|_| log::error!("Can't open trace_pipe_raw of cpu {cpu}"))
            })
            .collect::<Result<Vec<File>, _>>()?;

        let signals = SignalFd::new(&WATCHED_SIGNALS)
            .inspect_err(|err| log::warn!("Cannot create signalfd: {err}"))?;

        let mut set = PollSet::new(
            streams
                .iter()
                .map(|stream| stream.as_raw_fd())
                .chain([signals.as_raw_fd()]),
        );
        let mut page = vec![0u8; PAGE_SIZE];
        let mut warned = vec![false; cpus];

        log::info!("Listening to events for cpus 0 to {}", cpus.saturating_sub(1));

        loop {
            if let Err(err) = set.wait() {
                log::warn!("poll: {err}");
            }

            if set.readable(cpus) {
                match signals.read() {
                    Ok(signal) if WATCHED_SIGNALS.contains(&(signal as i32)) => {
                        log::info!("Received signal={signal}");
                        return Ok(StopReason::Signal(signal));
                    }
                    Ok(signal) => log::info!("Received unexpected signal={signal}"),
                    Err(err) => log::warn!("signalfd read: {err}"),
                }
                continue;
            }

            let mut not_ready = 0;
            for (cpu, stream) in streams.iter_mut().enumerate() {
                if set.failed(cpu) && !warned[cpu] {
                    log::info!("Error on CPU {cpu}");
                    warned[cpu] = true;
                }
                if !set.readable(cpu) {
                    not_ready += 1;
                    continue;
                }

                let size = stream
                    .read(&mut page)
                    .inspect_err(|err| log::warn!("Read page failed on cpu {cpu}: {err}"))?;
                if size == 0 {
                    not_ready += 1;
                    continue;
                }

                log::debug!("cpu {cpu} received {size} bytes of data");
                page[size..].fill(0);
                self.process_page(&page, handler);
            }

            if not_ready == cpus {
                log::error!("No cpu fd in POLLIN state, stop running");
                return Ok(StopReason::NoCpuReady);
            }
        }
    }
}
