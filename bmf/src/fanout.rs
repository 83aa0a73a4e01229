// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::Envelope;
use slog::{info, Logger};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::mpsc::{SyncSender, TrySendError};

/// Registry of live subscribers. Registration happens on accept,
/// deregistration when a handler tears down; membership is the liveness
/// flag. The filter worker holds the registry lock for the duration of
/// one fanout pass.
#[derive(Default)]
pub struct Fanout {
    egress: BTreeMap<u64, Egress>,
}

pub struct Egress {
    pub peer: SocketAddr,
    pub tx: SyncSender<Envelope>,
    /// Envelopes dropped because this subscriber's queue was full.
    pub dropped: u64,
}

impl Fanout {
    /// Enqueue the envelope for every subscriber. A full queue drops the
    /// envelope for that subscriber only; the worker never blocks on a
    /// slow consumer.
    pub fn send_all(&mut self, envelope: &Envelope, log: &Logger) {
        for (id, e) in self.egress.iter_mut() {
            match e.tx.try_send(envelope.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    e.dropped += 1;
                    info!(
                        log,
                        "subscriber {id} ({}) queue full, dropped message \
                         {} ({} dropped so far)",
                        e.peer,
                        envelope.seq,
                        e.dropped
                    );
                }
                Err(TrySendError::Disconnected(_)) => {
                    // Handler is tearing down and will deregister itself.
                }
            }
        }
    }

    pub fn add_egress(&mut self, id: u64, egress: Egress) {
        self.egress.insert(id, egress);
    }

    pub fn remove_egress(&mut self, id: u64) {
        self.egress.remove(&id);
    }

    pub fn dropped(&self, id: u64) -> Option<u64> {
        self.egress.get(&id).map(|e| e.dropped)
    }

    pub fn len(&self) -> usize {
        self.egress.len()
    }

    pub fn is_empty(&self) -> bool {
        self.egress.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::mpsc::sync_channel;
    use std::sync::Arc;

    fn envelope(seq: u64) -> Envelope {
        Envelope {
            seq,
            xml: Arc::from(format!("<BGP_MESSAGE>{seq}</BGP_MESSAGE>")),
        }
    }

    #[test]
    fn slow_consumer_drops_are_counted() {
        let log = bmf_common::log::init_logger(slog::Level::Critical);
        let mut fanout = Fanout::default();

        let (fast_tx, fast_rx) = sync_channel(16);
        let (slow_tx, slow_rx) = sync_channel(4);
        fanout.add_egress(
            1,
            Egress {
                peer: "127.0.0.1:1001".parse().unwrap(),
                tx: fast_tx,
                dropped: 0,
            },
        );
        fanout.add_egress(
            2,
            Egress {
                peer: "127.0.0.1:1002".parse().unwrap(),
                tx: slow_tx,
                dropped: 0,
            },
        );

        // neither consumer drains while 10 envelopes arrive
        for seq in 0..10 {
            fanout.send_all(&envelope(seq), &log);
        }

        assert_eq!(fanout.dropped(1), Some(0));
        assert_eq!(fanout.dropped(2), Some(10 - 4));

        // the fast subscriber sees everything in order, the slow one a
        // prefix of the stream
        let fast: Vec<u64> = fast_rx.try_iter().map(|e| e.seq).collect();
        let slow: Vec<u64> = slow_rx.try_iter().map(|e| e.seq).collect();
        assert_eq!(fast, (0..10).collect::<Vec<_>>());
        assert_eq!(slow, (0..4).collect::<Vec<_>>());
    }

    #[test]
    fn deregistered_subscribers_are_skipped() {
        let log = bmf_common::log::init_logger(slog::Level::Critical);
        let mut fanout = Fanout::default();

        let (tx, rx) = sync_channel(16);
        fanout.add_egress(
            7,
            Egress {
                peer: "127.0.0.1:1007".parse().unwrap(),
                tx,
                dropped: 0,
            },
        );
        assert_eq!(fanout.len(), 1);

        fanout.remove_egress(7);
        assert!(fanout.is_empty());
        fanout.send_all(&envelope(0), &log);
        assert!(rx.try_iter().next().is_none());
    }
}
