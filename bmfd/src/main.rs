// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::log::dlog;
use anyhow::{Context, Result};
use bmf::relay::Relay;
use bmf::upstream::UpstreamTcp;
use bmf::DEFAULT_RESOLUTION;
use clap::{Parser, Subcommand};
use slog::Logger;

mod config;
mod log;
mod signal;

pub const COMPONENT_BMFD: &str = "bmfd";
const UNIT_DAEMON: &str = "daemon";

#[derive(Parser, Debug)]
#[command(version, about = "BGP monitor filter relay", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the filter relay daemon.
    Run(RunArgs),
}

#[derive(Parser, Debug)]
pub(crate) struct RunArgs {
    /// Path to the configuration file.
    #[arg(long, default_value = config::DEFAULT_CONFIG_FILE)]
    pub config_file: String,

    /// Upstream BGP monitor host.
    #[arg(long)]
    pub server: Option<String>,

    /// Upstream BGP monitor port.
    #[arg(long)]
    pub port: Option<u16>,

    /// Local port subscribers connect to.
    #[arg(long)]
    pub listening_port: Option<u16>,

    /// Path to the prefix/AS rule file.
    #[arg(long)]
    pub prefix_file: Option<String>,

    /// Append matching messages to this file; empty disables.
    #[arg(long)]
    pub output_file: Option<String>,

    /// Log sink path; stdout when unset.
    #[arg(long)]
    pub log_file: Option<String>,

    /// Log verbosity, syslog style (0-7).
    #[arg(long)]
    pub log_level: Option<u8>,

    /// Log at maximum verbosity regardless of log_level.
    #[arg(long)]
    pub debug: bool,

    /// Detach from the terminal. Accepted for configuration
    /// compatibility; the daemon stays in the foreground and expects a
    /// service manager.
    #[arg(long)]
    pub daemonize: bool,

    /// Echo matching messages to stdout.
    #[arg(long)]
    pub stdout: bool,

    /// Per-subscriber queue bound in messages.
    #[arg(long)]
    pub queue_length: Option<usize>,
}

fn main() {
    let args = Cli::parse();
    match args.command {
        Commands::Run(run_args) => {
            if let Err(e) = run(run_args) {
                eprintln!("bmfd: {e:#}");
                std::process::exit(1);
            }
        }
    }
}

fn init_logger(config: &config::DaemonConfig) -> Result<Logger> {
    let level = if config.debug {
        slog::Level::Trace
    } else {
        bmf_common::log::level_from_syslog(config.log_level)
    };
    match &config.log_file {
        Some(path) => bmf_common::log::init_file_logger(path, level)
            .with_context(|| format!("open log file {path}")),
        None => Ok(bmf_common::log::init_logger(level)),
    }
}

fn run(args: RunArgs) -> Result<()> {
    let config = config::load(&args)?;
    let log = init_logger(&config)?;

    signal::register();

    if config.daemonize {
        dlog!(
            log,
            warn,
            "daemonize requested; staying in the foreground, run under a \
             service manager instead"
        );
    }

    let relay = Relay::start::<UpstreamTcp>(config.relay_config(), log.clone())
        .context("relay startup")?;
    dlog!(
        log,
        info,
        "relay running: upstream {}:{}, subscribers on port {}",
        config.server,
        config.port,
        config.listening_port
    );

    while !signal::triggered() && !relay.is_shutdown() {
        std::thread::sleep(DEFAULT_RESOLUTION);
    }
    if signal::triggered() {
        dlog!(log, info, "caught shutdown signal");
    }

    relay.shutdown();
    relay.join();
    dlog!(log, info, "shutdown complete");
    Ok(())
}
