//! Persistent single-peer TCP listener for worker metadata.
//!
//! The inference worker connects here and writes one JSON document per send.
//! The listener accepts exactly one peer at a time, reads fixed-size chunks,
//! and hands each non-empty chunk to the decoder. A peer close or socket
//! error tears the socket down and starts a brand-new bind/listen/accept
//! cycle, retried for the process lifetime.
//!
//! Fault classes are separated: a peer disconnect restarts the cycle
//! immediately, while a failed bind (likely permanent, e.g. permission
//! denied) backs off before retrying.

use anyhow::{Context, Result};
use std::io::Read;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::decoder::{decode_payload, MetadataEvent};

pub const DEFAULT_METADATA_ADDR: &str = "0.0.0.0:57344";

/// One complete JSON document must fit in a single chunk; producers that
/// split documents across sends will see decode errors, by contract.
const CHUNK_BYTES: usize = 1024;

const ACCEPT_POLL: Duration = Duration::from_millis(50);
const READ_POLL: Duration = Duration::from_millis(500);
const BIND_BACKOFF_INITIAL: Duration = Duration::from_millis(250);
const BIND_BACKOFF_MAX: Duration = Duration::from_secs(5);

#[derive(Clone, Debug)]
pub struct ListenerConfig {
    pub addr: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_METADATA_ADDR.to_string(),
        }
    }
}

/// Handle to the running listener thread.
#[derive(Debug)]
pub struct ListenerHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ListenerHandle {
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow::anyhow!("metadata listener thread panicked"))?;
        }
        Ok(())
    }
}

pub struct ConnectionListener;

impl ConnectionListener {
    /// Bind the configured address and spawn the accept/receive loop.
    ///
    /// The initial bind happens on the caller's thread so that startup
    /// failures (bad address syntax, port already held by another process)
    /// surface synchronously. Restart cycles rebind to the concrete address
    /// learned here, so an ephemeral `:0` port stays stable across peers.
    ///
    /// The channel's event type only needs to be buildable from a
    /// [`MetadataEvent`], so the listener can publish straight into a
    /// consumer's wider event stream.
    pub fn spawn<E>(config: ListenerConfig, events: Sender<E>) -> Result<ListenerHandle>
    where
        E: From<MetadataEvent> + Send + 'static,
    {
        let configured: SocketAddr = config
            .addr
            .parse()
            .with_context(|| format!("invalid metadata listener address '{}'", config.addr))?;
        let listener = TcpListener::bind(configured)
            .with_context(|| format!("bind metadata listener on {configured}"))?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let join = std::thread::Builder::new()
            .name("metadata-listener".to_string())
            .spawn(move || run(Some(listener), addr, events, shutdown_thread))?;

        Ok(ListenerHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

fn run<E: From<MetadataEvent>>(
    mut initial: Option<TcpListener>,
    addr: SocketAddr,
    events: Sender<E>,
    shutdown: Arc<AtomicBool>,
) {
    let mut backoff = BIND_BACKOFF_INITIAL;

    while !shutdown.load(Ordering::SeqCst) {
        let listener = match initial.take() {
            Some(listener) => listener,
            None => match rebind(addr) {
                Ok(listener) => listener,
                Err(err) => {
                    log::warn!(
                        "metadata listener bind on {} failed: {:#}; retrying in {:?}",
                        addr,
                        err,
                        backoff
                    );
                    sleep_interruptible(backoff, &shutdown);
                    backoff = (backoff * 2).min(BIND_BACKOFF_MAX);
                    continue;
                }
            },
        };
        backoff = BIND_BACKOFF_INITIAL;

        let Some(stream) = accept_one(&listener, &shutdown) else {
            continue;
        };
        // The listener socket is dropped here: one peer at a time, and the
        // next cycle is a fresh bind/listen/accept per the retry contract.
        drop(listener);

        match serve_peer(stream, &events, &shutdown) {
            Ok(()) => log::info!("metadata peer disconnected; waiting for a new connection"),
            Err(PeerFault::Socket(err)) => {
                log::warn!("metadata socket error: {err}; restarting listener")
            }
            Err(PeerFault::ConsumerGone) => return,
        }
    }
}

fn rebind(addr: SocketAddr) -> Result<TcpListener> {
    let listener = TcpListener::bind(addr)?;
    listener.set_nonblocking(true)?;
    Ok(listener)
}

/// Accept a single peer, polling the shutdown flag between attempts.
fn accept_one(listener: &TcpListener, shutdown: &Arc<AtomicBool>) -> Option<TcpStream> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            return None;
        }
        match listener.accept() {
            Ok((stream, peer)) => {
                log::info!("metadata peer connected from {peer}");
                return Some(stream);
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(ACCEPT_POLL);
            }
            Err(err) => {
                log::warn!("metadata accept failed: {err}; restarting listener");
                return None;
            }
        }
    }
}

enum PeerFault {
    /// Receive failed; the listener restarts.
    Socket(std::io::Error),
    /// The event channel receiver is gone; the thread exits.
    ConsumerGone,
}

/// Receive loop for one connected peer. Returns `Ok(())` on orderly close.
fn serve_peer<E: From<MetadataEvent>>(
    stream: TcpStream,
    events: &Sender<E>,
    shutdown: &Arc<AtomicBool>,
) -> std::result::Result<(), PeerFault> {
    let mut stream = stream;
    // Accepted sockets inherit non-blocking from the listener on some
    // platforms; force blocking reads with a poll timeout instead.
    stream.set_nonblocking(false).map_err(PeerFault::Socket)?;
    stream
        .set_read_timeout(Some(READ_POLL))
        .map_err(PeerFault::Socket)?;

    let mut chunk = [0u8; CHUNK_BYTES];
    loop {
        if shutdown.load(Ordering::SeqCst) {
            return Ok(());
        }
        match stream.read(&mut chunk) {
            Ok(0) => return Ok(()),
            Ok(n) => {
                // Each chunk is decoded independently; a parse failure is an
                // event for the operator, never a reason to drop the peer.
                let event = decode_payload(&chunk[..n]);
                if let MetadataEvent::DecodeError(reason) = &event {
                    log::debug!("metadata decode error: {reason}");
                }
                if events.send(event.into()).is_err() {
                    return Err(PeerFault::ConsumerGone);
                }
            }
            Err(err)
                if err.kind() == std::io::ErrorKind::WouldBlock
                    || err.kind() == std::io::ErrorKind::TimedOut =>
            {
                continue;
            }
            Err(err) => return Err(PeerFault::Socket(err)),
        }
    }
}

fn sleep_interruptible(total: Duration, shutdown: &Arc<AtomicBool>) {
    let deadline = Instant::now() + total;
    loop {
        if shutdown.load(Ordering::SeqCst) {
            return;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return;
        }
        std::thread::sleep(ACCEPT_POLL.min(remaining));
    }
}
