// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use slog::{Drain, Level, Logger};
use std::io::Write;

pub fn init_logger(level: Level) -> Logger {
    build_logger(std::io::stdout(), level)
}

pub fn init_file_logger(
    filename: &str,
    level: Level,
) -> Result<Logger, std::io::Error> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(filename)?;
    Ok(build_logger(file, level))
}

pub fn build_logger<W: Write + Send + 'static>(w: W, level: Level) -> Logger {
    let drain = slog_bunyan::new(w).build().filter_level(level).ignore_res();
    let drain = slog_async::Async::new(drain)
        .chan_size(0x8000)
        .build()
        .fuse();
    slog::Logger::root(drain, slog::o!())
}

/// Map a syslog-style numeric level (0-7) onto a slog level. Values above
/// the syslog range clamp to debug.
pub fn level_from_syslog(level: u8) -> Level {
    match level {
        0..=2 => Level::Critical,
        3 => Level::Error,
        4 => Level::Warning,
        5 | 6 => Level::Info,
        _ => Level::Debug,
    }
}
