// Copyright (C) 2025 Intel Corporation
// SPDX-License-Identifier: MIT

mod decode;
mod drivers;
mod ledger;
mod monitor;

use clap::{Parser, Subcommand};
use env_logger::Env;
use hbm_online_repair::prelude::*;
use log::LevelFilter;
use std::path::PathBuf;

#[derive(Parser)]
#[command(version, about = "Online repair of the HBM faults reported by the RAS firmware.")]
struct Cli {
    /// Sets the verbosity of the logging messages, overriding HBM_ONLINE_REPAIR_LOG_LEVEL
    /// -v: Warning, -vv: Info, -vvv: Debug, -vvvv: Trace
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbosity: u8,

    /// Maximum size in bytes of the fault records stored in the flash
    #[arg(long, value_name = "bytes")]
    flash_capacity: Option<u64>,

    /// Directory where efivarfs is mounted
    #[arg(long, value_name = "dir")]
    efivars_dir: Option<PathBuf>,

    /// Directory of the page eject driver attributes
    #[arg(long, value_name = "dir")]
    page_eject_dir: Option<PathBuf>,

    /// Directory listing the platform devices
    #[arg(long, value_name = "dir")]
    platform_devices_dir: Option<PathBuf>,

    /// Path of the kernel memory information file
    #[arg(long, value_name = "path")]
    meminfo: Option<PathBuf>,

    /// Path of the mount table used to find debugfs
    #[arg(long, value_name = "path")]
    mounts: Option<PathBuf>,

    /// Socket of the BMC notification service
    #[arg(long, value_name = "path")]
    bmc_socket: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Listen to the HBM faults and repair them (default)
    Monitor {
        /// Do not load and unload the kernel drivers
        #[arg(long)]
        skip_drivers: bool,
    },
    /// Decode a packed fault address into JSON
    Decode { address: String },
    /// Dump the fault records stored in the flash as JSON
    Ledger,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(capacity) = self.flash_capacity {
            config.flash_capacity = capacity;
        }
        for (option, path) in [
            (&self.efivars_dir, &mut config.efivars_dir),
            (&self.page_eject_dir, &mut config.page_eject_dir),
            (&self.platform_devices_dir, &mut config.platform_devices_dir),
            (&self.meminfo, &mut config.meminfo_path),
            (&self.mounts, &mut config.mounts_path),
            (&self.bmc_socket, &mut config.bmc_socket),
        ] {
            if let Some(option) = option {
                *path = option.clone();
            }
        }
    }

    fn log_level(&self, config: &Config) -> LevelFilter {
        match self.verbosity {
            0 => config.log_level.into(),
            1 => LevelFilter::Warn,
            2 => LevelFilter::Info,
            3 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}

fn run(cli: Cli, config: &Config) -> Result<(), Error> {
    match cli.command.unwrap_or(Command::Monitor {
        skip_drivers: false,
    }) {
        Command::Monitor { skip_drivers } => monitor::monitor(config, skip_drivers),
        Command::Decode { address } => decode::decode(&address, std::io::stdout().lock()),
        Command::Ledger => ledger::dump(config, std::io::stdout().lock()),
    }
}

fn main() {
    let cli = Cli::parse();

    let (mut config, errors) = Config::from_env();
    cli.apply(&mut config);

    let log_level = cli.log_level(&config);
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level.to_string())).init();

    for err in errors {
        log::warn!("{err}, using the default value");
    }
    log::info!("{config}");

    if let Err(err) = run(cli, &config) {
        log::error!("Fatal Error: {err}");
        std::process::exit(1);
    }
}
