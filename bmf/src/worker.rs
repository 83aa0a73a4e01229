// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::extract;
use crate::fanout::Fanout;
use crate::store::Filter;
use crate::Envelope;
use bmf_common::lock;
use slog::{debug, error, Logger};
use std::fs::File;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Filter/dispatch worker: drains the upstream queue and, for each
/// matching message, multiplexes it to stdout, the output file and every
/// subscriber queue in the same iteration. Single-threaded with respect
/// to its own loop; the stdout lock, the exclusively owned output file
/// and the per-subscriber queues are the serialization points.
pub struct FilterWorker {
    rx: Receiver<Envelope>,
    filter: Arc<Filter>,
    registry: Arc<Mutex<Fanout>>,
    shutdown: Arc<AtomicBool>,
    echo_stdout: bool,
    output: Option<File>,
    resolution: Duration,
    matched: u64,
    log: Logger,
}

impl FilterWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        rx: Receiver<Envelope>,
        filter: Arc<Filter>,
        registry: Arc<Mutex<Fanout>>,
        shutdown: Arc<AtomicBool>,
        echo_stdout: bool,
        output: Option<File>,
        resolution: Duration,
        log: Logger,
    ) -> Self {
        Self {
            rx,
            filter,
            registry,
            shutdown,
            echo_stdout,
            output,
            resolution,
            matched: 0,
            log,
        }
    }

    pub fn run(mut self) {
        loop {
            if self.shutdown.load(Ordering::Acquire) {
                break;
            }
            let envelope = match self.rx.recv_timeout(self.resolution) {
                Ok(e) => e,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            };

            let record = extract::extract(&envelope.xml);
            if !self.filter.matches(&record) {
                continue;
            }
            self.matched += 1;
            debug!(
                self.log,
                "message {} matched ({} total)", envelope.seq, self.matched
            );

            if self.echo_stdout {
                let mut out = std::io::stdout().lock();
                let _ = out.write_all(envelope.xml.as_bytes());
                let _ = out.write_all(b"\n");
            }

            if let Some(f) = self.output.as_mut() {
                if let Err(e) = f
                    .write_all(envelope.xml.as_bytes())
                    .and_then(|()| f.flush())
                {
                    error!(self.log, "output file write failed: {e}");
                }
            }

            lock!(self.registry).send_all(&envelope, &self.log);
        }
        debug!(self.log, "filter worker exited");
    }
}
