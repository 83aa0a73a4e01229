// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The upstream monitor connection and the reader that drains it.

use crate::error::Error;
use crate::Envelope;
use slog::{debug, info, warn, Logger};
use std::io::Read;
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{SyncSender, TrySendError};
use std::sync::Arc;
use std::time::Duration;

/// A source of framed XML messages from the monitor. Implementations
/// must return `Ok(None)` from `read_message` within roughly one
/// resolution interval when no complete message has arrived, so the
/// reader loop can observe shutdown.
pub trait UpstreamSource: Send {
    fn connect(
        host: &str,
        port: u16,
        resolution: Duration,
        log: Logger,
    ) -> Result<Self, Error>
    where
        Self: Sized;

    /// Read one framed XML document.
    fn read_message(&mut self) -> Result<Option<String>, Error>;

    fn is_connected(&self) -> bool;

    fn close(&mut self);
}

const MESSAGE_START: &[u8] = b"<BGP_MESSAGE";
const MESSAGE_END: &[u8] = b"</BGP_MESSAGE>";

/// TCP transport to the monitor. The stream is a concatenation of
/// `<BGP_MESSAGE>…</BGP_MESSAGE>` documents (with an `<xml>` stream
/// prolog ahead of the first); messages are recovered by scanning for
/// the closing tag.
pub struct UpstreamTcp {
    conn: TcpStream,
    buf: Vec<u8>,
    connected: bool,
    log: Logger,
}

impl UpstreamSource for UpstreamTcp {
    fn connect(
        host: &str,
        port: u16,
        resolution: Duration,
        log: Logger,
    ) -> Result<Self, Error> {
        let addr = (host, port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| Error::InvalidAddress(format!("{host}:{port}")))?;
        let conn = TcpStream::connect(addr)?;
        conn.set_read_timeout(Some(resolution))?;
        info!(log, "connected to upstream monitor at {addr}");
        Ok(Self {
            conn,
            buf: Vec::new(),
            connected: true,
            log,
        })
    }

    fn read_message(&mut self) -> Result<Option<String>, Error> {
        if let Some(msg) = self.take_message() {
            return Ok(Some(msg));
        }
        let mut chunk = [0u8; 4096];
        match self.conn.read(&mut chunk) {
            Ok(0) => {
                self.connected = false;
                Err(Error::Disconnected)
            }
            Ok(n) => {
                self.buf.extend_from_slice(&chunk[..n]);
                Ok(self.take_message())
            }
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::WouldBlock
                        | std::io::ErrorKind::TimedOut
                ) =>
            {
                Ok(None)
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn close(&mut self) {
        let _ = self.conn.shutdown(Shutdown::Both);
        self.connected = false;
    }
}

impl UpstreamTcp {
    /// Cut the first complete message out of the receive buffer, if any.
    /// Bytes ahead of the message start tag (the stream prolog, or debris
    /// from a malformed message) are discarded.
    fn take_message(&mut self) -> Option<String> {
        let end = find(&self.buf, MESSAGE_END)?;
        let head: Vec<u8> =
            self.buf.drain(..end + MESSAGE_END.len()).collect();
        match find(&head, MESSAGE_START) {
            Some(start) => {
                Some(String::from_utf8_lossy(&head[start..]).into_owned())
            }
            None => {
                debug!(
                    self.log,
                    "discarding {} bytes of unframed upstream data",
                    head.len()
                );
                None
            }
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Upstream reader loop: pull framed messages and feed the bounded queue.
/// Transient read errors are logged and skipped; loss of the upstream
/// connection promotes to a relay-wide shutdown. A full queue is handled
/// by yielding and retrying, never by dropping upstream messages.
pub fn run<U: UpstreamSource>(
    mut upstream: U,
    tx: SyncSender<Envelope>,
    shutdown: Arc<AtomicBool>,
    resolution: Duration,
    log: Logger,
) {
    let mut seq = 0u64;
    'outer: loop {
        if shutdown.load(Ordering::Acquire) {
            break;
        }
        if !upstream.is_connected() {
            warn!(log, "upstream connection lost, shutting down");
            shutdown.store(true, Ordering::Release);
            break;
        }
        let xml = match upstream.read_message() {
            Ok(Some(xml)) => xml,
            Ok(None) => continue,
            Err(Error::Disconnected) => {
                warn!(log, "upstream disconnected, shutting down");
                shutdown.store(true, Ordering::Release);
                break;
            }
            Err(e) => {
                warn!(log, "upstream read error: {e}");
                continue;
            }
        };

        let mut envelope = Envelope {
            seq,
            xml: Arc::from(xml),
        };
        seq += 1;

        loop {
            match tx.try_send(envelope) {
                Ok(()) => break,
                Err(TrySendError::Full(e)) => {
                    if shutdown.load(Ordering::Acquire) {
                        break 'outer;
                    }
                    envelope = e;
                    std::thread::sleep(resolution);
                }
                Err(TrySendError::Disconnected(_)) => {
                    warn!(log, "filter worker gone, shutting down");
                    shutdown.store(true, Ordering::Release);
                    break 'outer;
                }
            }
        }
    }
    upstream.close();
    debug!(log, "upstream reader exited");
}
