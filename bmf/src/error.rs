// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("io {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid address {0}")]
    InvalidAddress(String),

    #[error("invalid prefix {0}")]
    InvalidPrefix(String),

    #[error("rule file line {line}: {reason}")]
    Rule { line: usize, reason: String },

    #[error("disconnected")]
    Disconnected,

    #[error("not connected")]
    NotConnected,
}
