// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::fanout::Fanout;
use crate::{Envelope, SUBSCRIBER_PROLOG};
use bmf_common::lock;
use slog::{debug, info, Logger};
use std::io::Write;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One connected subscriber. The handler owns the receive half of the
/// subscriber's queue and drains it onto the socket; it never reads from
/// the peer. A write failure is local to this subscriber: the handler
/// deregisters and exits without disturbing the worker or anyone else.
pub struct SubscriberSession {
    id: u64,
    peer: SocketAddr,
    conn: TcpStream,
    rx: Receiver<Envelope>,
    registry: Arc<Mutex<Fanout>>,
    shutdown: Arc<AtomicBool>,
    resolution: Duration,
    log: Logger,
}

impl SubscriberSession {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: u64,
        peer: SocketAddr,
        conn: TcpStream,
        rx: Receiver<Envelope>,
        registry: Arc<Mutex<Fanout>>,
        shutdown: Arc<AtomicBool>,
        resolution: Duration,
        log: Logger,
    ) -> Self {
        Self {
            id,
            peer,
            conn,
            rx,
            registry,
            shutdown,
            resolution,
            log,
        }
    }

    pub fn run(mut self) {
        // Open the stream as one large document; the concatenated
        // messages that follow are its body and socket close is its end.
        if let Err(e) = self.conn.write_all(SUBSCRIBER_PROLOG) {
            info!(
                self.log,
                "subscriber {} ({}): prolog write failed: {e}",
                self.id,
                self.peer
            );
            self.teardown();
            return;
        }

        loop {
            if self.shutdown.load(Ordering::Acquire) {
                break;
            }
            match self.rx.recv_timeout(self.resolution) {
                Ok(envelope) => {
                    if let Err(e) =
                        self.conn.write_all(envelope.xml.as_bytes())
                    {
                        info!(
                            self.log,
                            "subscriber {} ({}): write failed: {e}, \
                             dropping subscriber",
                            self.id,
                            self.peer
                        );
                        self.teardown();
                        return;
                    }
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        self.teardown();
        debug!(
            self.log,
            "subscriber {} ({}) session closed", self.id, self.peer
        );
    }

    fn teardown(&self) {
        let _ = self.conn.shutdown(Shutdown::Both);
        lock!(self.registry).remove_egress(self.id);
    }
}
