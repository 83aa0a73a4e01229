// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Daemon configuration: compiled-in defaults, overlaid by the
//! `key = value` configuration file, overlaid by CLI flags.

use crate::RunArgs;
use anyhow::{bail, Context, Result};
use bmf::relay::RelayConfig;
use bmf::DEFAULT_RESOLUTION;
use std::fs;
use std::path::Path;

pub const DEFAULT_CONFIG_FILE: &str = "/usr/local/etc/bgpmon-filter.conf";

const DEFAULT_SERVER: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 50001;
const DEFAULT_LISTENING_PORT: u16 = 60000;
const DEFAULT_PREFIX_FILE: &str =
    "/usr/local/etc/bgpmon-filter-prefixes.conf";
const DEFAULT_QUEUE_LENGTH: usize = 1024;
const DEFAULT_LOG_LEVEL: u8 = 7;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
    pub server: String,
    pub port: u16,
    pub listening_port: u16,
    pub prefix_file: String,
    pub output_file: Option<String>,
    pub log_file: Option<String>,
    pub log_level: u8,
    pub debug: bool,
    pub daemonize: bool,
    pub stdout: bool,
    pub queue_length: usize,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            server: DEFAULT_SERVER.into(),
            port: DEFAULT_PORT,
            listening_port: DEFAULT_LISTENING_PORT,
            prefix_file: DEFAULT_PREFIX_FILE.into(),
            output_file: None,
            log_file: None,
            log_level: DEFAULT_LOG_LEVEL,
            debug: false,
            daemonize: false,
            stdout: false,
            queue_length: DEFAULT_QUEUE_LENGTH,
        }
    }
}

impl DaemonConfig {
    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            upstream_host: self.server.clone(),
            upstream_port: self.port,
            listen: format!("0.0.0.0:{}", self.listening_port),
            prefix_file: self.prefix_file.clone(),
            output_file: self.output_file.clone(),
            echo_stdout: self.stdout,
            queue_length: self.queue_length,
            resolution: DEFAULT_RESOLUTION,
        }
    }

    /// Overlay `key = value` lines onto this configuration. Unknown keys
    /// and unparsable values are fatal, named by line.
    fn apply_text(&mut self, text: &str) -> Result<()> {
        for (i, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            self.apply_line(line, i + 1)?;
        }
        Ok(())
    }

    fn apply_line(&mut self, line: &str, lineno: usize) -> Result<()> {
        let Some((key, value)) = line.split_once('=') else {
            bail!("line {lineno}: expected 'key = value'");
        };
        let key = key.trim().to_ascii_lowercase();
        let value = value.trim();
        match key.as_str() {
            // the file naming its own path has nothing left to configure
            "config_file" => {}
            "server" => self.server = value.to_string(),
            "port" => {
                self.port = value.parse().with_context(|| {
                    format!("line {lineno}: invalid port {value:?}")
                })?;
            }
            "listening_port" => {
                self.listening_port = value.parse().with_context(|| {
                    format!("line {lineno}: invalid listening_port {value:?}")
                })?;
            }
            "prefix_file" => self.prefix_file = value.to_string(),
            "output_file" => {
                // empty disables the file sink
                self.output_file = if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                };
            }
            "log_file" => {
                self.log_file = if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                };
            }
            "log_level" => {
                let level: u8 = value.parse().with_context(|| {
                    format!("line {lineno}: invalid log_level {value:?}")
                })?;
                if level > 7 {
                    bail!("line {lineno}: log_level must be 0-7");
                }
                self.log_level = level;
            }
            "debug" => self.debug = parse_bool(value, lineno)?,
            "daemonize" => self.daemonize = parse_bool(value, lineno)?,
            "stdout" => self.stdout = parse_bool(value, lineno)?,
            "queue_length" => {
                let length: usize = value.parse().with_context(|| {
                    format!("line {lineno}: invalid queue_length {value:?}")
                })?;
                if length == 0 {
                    bail!("line {lineno}: queue_length must be nonzero");
                }
                self.queue_length = length;
            }
            _ => bail!("line {lineno}: unknown key {key:?}"),
        }
        Ok(())
    }
}

fn parse_bool(value: &str, lineno: usize) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => bail!("line {lineno}: expected a boolean, got {value:?}"),
    }
}

/// Resolve the effective configuration for this invocation. A config
/// file named on the command line must exist; the compiled-in default
/// path may be absent, in which case the daemon runs from defaults and
/// flags alone.
pub fn load(args: &RunArgs) -> Result<DaemonConfig> {
    let mut config = DaemonConfig::default();

    let path = Path::new(&args.config_file);
    if path.exists() {
        let text = fs::read_to_string(path).with_context(|| {
            format!("read config file {}", args.config_file)
        })?;
        config.apply_text(&text).with_context(|| {
            format!("config file {}", args.config_file)
        })?;
    } else if args.config_file != DEFAULT_CONFIG_FILE {
        bail!("config file {} does not exist", args.config_file);
    }

    if let Some(v) = &args.server {
        config.server = v.clone();
    }
    if let Some(v) = args.port {
        config.port = v;
    }
    if let Some(v) = args.listening_port {
        config.listening_port = v;
    }
    if let Some(v) = &args.prefix_file {
        config.prefix_file = v.clone();
    }
    if let Some(v) = &args.output_file {
        config.output_file = if v.is_empty() { None } else { Some(v.clone()) };
    }
    if let Some(v) = &args.log_file {
        config.log_file = Some(v.clone());
    }
    if let Some(v) = args.log_level {
        if v > 7 {
            bail!("--log-level must be 0-7");
        }
        config.log_level = v;
    }
    if let Some(v) = args.queue_length {
        if v == 0 {
            bail!("--queue-length must be nonzero");
        }
        config.queue_length = v;
    }
    if args.debug {
        config.debug = true;
    }
    if args.daemonize {
        config.daemonize = true;
    }
    if args.stdout {
        config.stdout = true;
    }

    Ok(config)
}
