// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Wiring and lifecycle for the whole pipeline: upstream reader, filter
//! worker and subscriber acceptor, joined by one shutdown flag.

use crate::dispatcher::Dispatcher;
use crate::error::Error;
use crate::fanout::Fanout;
use crate::store::Filter;
use crate::upstream::{self, UpstreamSource};
use crate::worker::FilterWorker;
use crate::DEFAULT_RESOLUTION;
use bmf_common::lock;
use slog::{info, Logger};
use std::fs::OpenOptions;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::sync_channel;
use std::sync::{Arc, Mutex};
use std::thread::{Builder, JoinHandle};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Upstream monitor host.
    pub upstream_host: String,
    /// Upstream monitor port.
    pub upstream_port: u16,
    /// `addr:port` the subscriber listener binds to.
    pub listen: String,
    /// Rule file path.
    pub prefix_file: String,
    /// Append matching messages here; `None` disables the file sink.
    pub output_file: Option<String>,
    /// Echo matching messages to stdout.
    pub echo_stdout: bool,
    /// Bound on each subscriber queue and on the upstream queue.
    pub queue_length: usize,
    /// Worker wakeup interval.
    pub resolution: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            upstream_host: "127.0.0.1".into(),
            upstream_port: 50001,
            listen: "0.0.0.0:60000".into(),
            prefix_file: String::new(),
            output_file: None,
            echo_stdout: false,
            queue_length: 1024,
            resolution: DEFAULT_RESOLUTION,
        }
    }
}

/// A running relay. Dropping this does not stop the pipeline; call
/// `shutdown` and then `join`.
pub struct Relay {
    shutdown: Arc<AtomicBool>,
    registry: Arc<Mutex<Fanout>>,
    local: SocketAddr,
    resolution: Duration,
    threads: Vec<JoinHandle<()>>,
    log: Logger,
}

impl Relay {
    /// Run the fallible startup sequence (load rules, open the output
    /// file, bind the subscriber listener, connect upstream) and spawn
    /// the pipeline. Any failure here is fatal and nothing is left
    /// running.
    pub fn start<U: UpstreamSource + 'static>(
        config: RelayConfig,
        log: Logger,
    ) -> Result<Self, Error> {
        let filter = Arc::new(Filter::load(&config.prefix_file)?);
        info!(log, "loaded rules from {}", config.prefix_file;
            "v4" => filter.v4_count(),
            "v6" => filter.v6_count(),
            "as" => filter.as_count(),
            "host" => filter.host_count(),
        );

        let output = match &config.output_file {
            Some(path) => Some(
                OpenOptions::new().create(true).append(true).open(path)?,
            ),
            None => None,
        };

        let shutdown = Arc::new(AtomicBool::new(false));
        let registry = Arc::new(Mutex::new(Fanout::default()));

        let dispatcher = Dispatcher::bind(
            config.listen.as_str(),
            registry.clone(),
            shutdown.clone(),
            config.queue_length,
            config.resolution,
            log.clone(),
        )?;
        let local = dispatcher.local_addr();

        let upstream = U::connect(
            &config.upstream_host,
            config.upstream_port,
            config.resolution,
            log.clone(),
        )?;

        let (tx, rx) = sync_channel(config.queue_length);
        let mut threads = Vec::new();

        {
            let shutdown = shutdown.clone();
            let log = log.clone();
            let resolution = config.resolution;
            threads.push(
                Builder::new().name("upstream-reader".into()).spawn(
                    move || {
                        upstream::run(upstream, tx, shutdown, resolution, log)
                    },
                )?,
            );
        }

        let worker = FilterWorker::new(
            rx,
            filter,
            registry.clone(),
            shutdown.clone(),
            config.echo_stdout,
            output,
            config.resolution,
            log.clone(),
        );
        threads.push(
            Builder::new()
                .name("filter-worker".into())
                .spawn(move || worker.run())?,
        );

        threads.push(
            Builder::new()
                .name("subscriber-acceptor".into())
                .spawn(move || dispatcher.run())?,
        );

        Ok(Self {
            shutdown,
            registry,
            local,
            resolution: config.resolution,
            threads,
            log,
        })
    }

    /// Address the subscriber listener actually bound, for configs that
    /// requested an ephemeral port.
    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }

    pub fn subscribers(&self) -> usize {
        lock!(self.registry).len()
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Block until the pipeline threads have exited and every subscriber
    /// handler has observed the shutdown and deregistered.
    pub fn join(self) {
        for t in self.threads {
            let _ = t.join();
        }
        while !lock!(self.registry).is_empty() {
            std::thread::sleep(self.resolution);
        }
        info!(self.log, "relay stopped");
    }
}
