// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::sync::Arc;
use std::time::Duration;

pub mod dispatcher;
pub mod error;
pub mod extract;
pub mod fanout;
pub mod relay;
pub mod rules;
pub mod session;
pub mod store;
pub mod trie;
pub mod types;
pub mod upstream;
pub mod worker;

#[cfg(test)]
#[macro_use]
extern crate lazy_static;


#[cfg(test)]
pub mod upstream_channel;

/// Framing prolog written to every subscriber on connect. What follows is
/// the concatenation of matching messages with no separator, so the peer
/// sees one large document opened by this tag and terminated by socket
/// close.
pub const SUBSCRIBER_PROLOG: &[u8] = b"<xml>";

/// How long workers sleep when a queue or socket has nothing for them.
/// Also bounds how stale a shutdown observation can be.
pub const DEFAULT_RESOLUTION: Duration = Duration::from_millis(100);

/// One raw XML message moving through the pipeline. The sequence number is
/// assigned by the upstream reader and strictly increases for the life of
/// the process.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub seq: u64,
    pub xml: Arc<str>,
}
