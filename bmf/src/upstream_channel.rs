// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Channel-backed upstream for tests: a registry of named endpoints
//! stands in for the network, so a test can play monitor by pushing
//! messages into a sender and hanging up by dropping it.

use crate::error::Error;
use crate::upstream::UpstreamSource;
use slog::Logger;
use std::collections::HashMap;
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::Mutex;
use std::time::Duration;

lazy_static! {
    static ref NET: Mutex<HashMap<String, Receiver<String>>> =
        Mutex::new(HashMap::new());
}

/// Register a monitor endpoint that `UpstreamSource::connect` can reach
/// at `host:port`. Returns the sender the test feeds messages through;
/// dropping it reads as an upstream disconnect.
pub fn register(host: &str, port: u16) -> Sender<String> {
    let (tx, rx) = channel();
    NET.lock()
        .expect("lock test network")
        .insert(format!("{host}:{port}"), rx);
    tx
}

pub struct UpstreamChannel {
    rx: Receiver<String>,
    connected: bool,
    resolution: Duration,
}

impl UpstreamSource for UpstreamChannel {
    fn connect(
        host: &str,
        port: u16,
        resolution: Duration,
        _log: Logger,
    ) -> Result<Self, Error> {
        let rx = NET
            .lock()
            .expect("lock test network")
            .remove(&format!("{host}:{port}"))
            .ok_or(Error::NotConnected)?;
        Ok(Self {
            rx,
            connected: true,
            resolution,
        })
    }

    fn read_message(&mut self) -> Result<Option<String>, Error> {
        match self.rx.recv_timeout(self.resolution) {
            Ok(msg) => Ok(Some(msg)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                self.connected = false;
                Err(Error::Disconnected)
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn close(&mut self) {
        self.connected = false;
    }
}
