// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::error::Error;
use crate::fanout::{Egress, Fanout};
use crate::session::SubscriberSession;
use bmf_common::lock;
use slog::{debug, error, info, Logger};
use std::io;
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::sync_channel;
use std::sync::{Arc, Mutex};
use std::thread::Builder;
use std::time::Duration;

/// Accepts subscriber connections. Each accepted peer gets a bounded
/// queue, an egress registration, and its own handler thread.
pub struct Dispatcher {
    listener: TcpListener,
    local: SocketAddr,
    registry: Arc<Mutex<Fanout>>,
    shutdown: Arc<AtomicBool>,
    queue_length: usize,
    resolution: Duration,
    next_id: AtomicU64,
    log: Logger,
}

impl Dispatcher {
    pub fn bind<A: ToSocketAddrs>(
        addr: A,
        registry: Arc<Mutex<Fanout>>,
        shutdown: Arc<AtomicBool>,
        queue_length: usize,
        resolution: Duration,
        log: Logger,
    ) -> Result<Self, Error> {
        let listener = TcpListener::bind(addr)?;
        // Nonblocking accept lets the loop observe shutdown between
        // connections.
        listener.set_nonblocking(true)?;
        let local = listener.local_addr()?;
        Ok(Self {
            listener,
            local,
            registry,
            shutdown,
            queue_length,
            resolution,
            next_id: AtomicU64::new(0),
            log,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }

    pub fn run(&self) {
        info!(self.log, "listening for subscribers on {}", self.local);
        loop {
            if self.shutdown.load(Ordering::Acquire) {
                break;
            }
            let (conn, peer) = match self.listener.accept() {
                Ok(c) => c,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    std::thread::sleep(self.resolution);
                    continue;
                }
                Err(e) => {
                    error!(self.log, "subscriber accept failed: {e}");
                    continue;
                }
            };

            // The handler wants plain blocking writes regardless of what
            // the accepted socket inherited from the listener.
            if let Err(e) = conn.set_nonblocking(false) {
                error!(self.log, "subscriber socket setup failed: {e}");
                continue;
            }

            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            info!(self.log, "subscriber {id} connected from {peer}");

            let (tx, rx) = sync_channel(self.queue_length);
            lock!(self.registry).add_egress(
                id,
                Egress {
                    peer,
                    tx,
                    dropped: 0,
                },
            );

            let session = SubscriberSession::new(
                id,
                peer,
                conn,
                rx,
                self.registry.clone(),
                self.shutdown.clone(),
                self.resolution,
                self.log.clone(),
            );
            if let Err(e) = Builder::new()
                .name(format!("subscriber-{id}"))
                .spawn(move || session.run())
            {
                error!(
                    self.log,
                    "failed to spawn handler for subscriber {id}: {e}"
                );
                lock!(self.registry).remove_egress(id);
            }
        }
        debug!(self.log, "subscriber acceptor exited");
    }
}
