//! Inbound call dispatch
//!
//! # Scalability
//!
//! - Each accepted connection runs in its own Tokio task
//! - Calls on one connection are served strictly in order
//! - A semaphore limits maximum concurrent connections
//! - The export table lock is released before a handler runs

use crate::error::{ApplicationError, Result};
use crate::exporter::ExportTable;
use crate::protocol::{CallFrame, Fault, Message, ReturnFrame, Selector};
use crate::transport::{FrameTransport, DEFAULT_MAX_FRAME_SIZE};
use futures::FutureExt;
use std::any::Any;
use std::io;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, trace, warn};

/// Server statistics
#[derive(Debug, Default)]
pub struct ServerStats {
    pub connections_accepted: AtomicU64,
    pub connections_active: AtomicU64,
    pub connections_rejected: AtomicU64,
    pub calls_received: AtomicU64,
    pub calls_completed: AtomicU64,
    pub calls_failed: AtomicU64,
    pub pings: AtomicU64,
}

impl ServerStats {
    pub fn snapshot(&self) -> ServerStatsSnapshot {
        ServerStatsSnapshot {
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            connections_active: self.connections_active.load(Ordering::Relaxed),
            connections_rejected: self.connections_rejected.load(Ordering::Relaxed),
            calls_received: self.calls_received.load(Ordering::Relaxed),
            calls_completed: self.calls_completed.load(Ordering::Relaxed),
            calls_failed: self.calls_failed.load(Ordering::Relaxed),
            pings: self.pings.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of server statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerStatsSnapshot {
    pub connections_accepted: u64,
    pub connections_active: u64,
    pub connections_rejected: u64,
    pub calls_received: u64,
    pub calls_completed: u64,
    pub calls_failed: u64,
    pub pings: u64,
}

/// Routes inbound calls to exported objects
pub struct Dispatcher {
    table: Arc<ExportTable>,
    stats: Arc<ServerStats>,
    max_frame_size: usize,
}

impl Dispatcher {
    pub fn new(table: Arc<ExportTable>) -> Self {
        Self {
            table,
            stats: Arc::new(ServerStats::default()),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    pub fn table(&self) -> &Arc<ExportTable> {
        &self.table
    }

    pub fn stats(&self) -> &Arc<ServerStats> {
        &self.stats
    }

    /// Dispatch one call and produce exactly one return.
    ///
    /// Decode, invocation and encode failures become faults; nothing raised
    /// by an implementation escapes this function.
    pub async fn process_call(&self, call: CallFrame) -> ReturnFrame {
        self.stats.calls_received.fetch_add(1, Ordering::Relaxed);
        let result = self.dispatch(call).await;
        match &result {
            ReturnFrame::Normal(_) => self.stats.calls_completed.fetch_add(1, Ordering::Relaxed),
            ReturnFrame::Exceptional(_) => self.stats.calls_failed.fetch_add(1, Ordering::Relaxed),
        };
        result
    }

    async fn dispatch(&self, call: CallFrame) -> ReturnFrame {
        let Some(guard) = self.table.begin_call(&call.identity) else {
            debug!("Call for unknown object {}", call.identity);
            return ReturnFrame::Exceptional(Fault::no_such_object(&call.identity));
        };
        let entry = guard.entry();

        let hash = match call.selector {
            Selector::Hash(hash) => hash,
            Selector::Index(index) => {
                match entry.skeleton.as_ref().and_then(|s| s.resolve(index)) {
                    Some(hash) => hash,
                    None => {
                        return ReturnFrame::Exceptional(Fault::unknown_method(format!(
                            "operation {} not defined for {}",
                            index, call.identity
                        )))
                    }
                }
            }
        };

        let Some(method) = entry.methods.get(hash) else {
            return ReturnFrame::Exceptional(Fault::unknown_method(format!(
                "method hash {} not defined for {}",
                hash, call.identity
            )));
        };

        trace!("Dispatch {} on {}", method.def, call.identity);
        let invocation = method.call(call.arguments);
        match AssertUnwindSafe(invocation).catch_unwind().await {
            Ok(Ok(value)) => ReturnFrame::Normal(value),
            Ok(Err(fault)) => {
                debug!("{} raised {}: {}", method.def, fault.type_name, fault.message);
                ReturnFrame::Exceptional(fault)
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                warn!("{} panicked: {}", method.def, message);
                ReturnFrame::Exceptional(Fault::application(ApplicationError::undeclared(
                    ApplicationError::DISPATCH_PANIC,
                    message,
                )))
            }
        }
    }

    /// Serve calls on one connection until the peer closes it.
    ///
    /// Returns an error only when a response could not be written, since the
    /// connection state can no longer be trusted.
    pub async fn serve_connection<S>(&self, stream: S, peer: &str) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let mut transport = FrameTransport::new(stream).with_max_frame_size(self.max_frame_size);

        loop {
            let frame = match transport.read_frame().await {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    debug!("Connection closed from {}", peer);
                    return Ok(());
                }
                Err(e) => {
                    warn!("Read error from {}: {}", peer, e);
                    return Ok(());
                }
            };

            let reply = match Message::decode(frame) {
                Ok(Message::Call(call)) => Message::Return(self.process_call(call).await),
                Ok(Message::Ping) => {
                    self.stats.pings.fetch_add(1, Ordering::Relaxed);
                    Message::PingAck
                }
                Ok(other) => {
                    warn!(
                        "Unexpected {:?} from {}, closing",
                        other.message_type(),
                        peer
                    );
                    return Ok(());
                }
                Err(e) => {
                    warn!("Malformed frame from {}: {}", peer, e);
                    return Ok(());
                }
            };

            if let Err(e) = transport.write_message(&reply).await {
                error!("Failed to write response to {}: {}", peer, e);
                return Err(e);
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "implementation panicked".to_string()
    }
}

/// Accept loop for one bound port
pub struct Listener {
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
}

impl Listener {
    /// Start accepting on an already bound listener
    pub fn spawn(
        listener: TcpListener,
        dispatcher: Arc<Dispatcher>,
        max_connections: usize,
    ) -> io::Result<Self> {
        let local_addr = listener.local_addr()?;
        let (shutdown, shutdown_rx) = watch::channel(false);
        info!(
            "Listening on {} (max_connections: {})",
            local_addr, max_connections
        );
        tokio::spawn(accept_loop(listener, dispatcher, max_connections, shutdown_rx));
        Ok(Self {
            local_addr,
            shutdown,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Stop accepting and close every connection this listener accepted.
    ///
    /// A call still being dispatched is abandoned and its caller sees the
    /// connection drop.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn accept_loop(
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    max_connections: usize,
    mut shutdown: watch::Receiver<bool>,
) {
    let semaphore = Arc::new(Semaphore::new(max_connections));
    let stats = Arc::clone(dispatcher.stats());

    loop {
        tokio::select! {
            biased;

            _ = shutdown.changed() => {
                info!("Listener on {:?} shutting down", listener.local_addr().ok());
                return;
            }

            result = listener.accept() => {
                let (stream, peer_addr) = match result {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!("Accept failed: {}", e);
                        continue;
                    }
                };

                let permit = match Arc::clone(&semaphore).try_acquire_owned() {
                    Ok(permit) => permit,
                    Err(_) => {
                        stats.connections_rejected.fetch_add(1, Ordering::Relaxed);
                        warn!(
                            "Connection limit reached, rejecting connection from {}",
                            peer_addr
                        );
                        drop(stream);
                        continue;
                    }
                };

                stats.connections_accepted.fetch_add(1, Ordering::Relaxed);
                stats.connections_active.fetch_add(1, Ordering::Relaxed);
                debug!("Accepted connection from {}", peer_addr);
                let _ = stream.set_nodelay(true);

                let dispatcher = Arc::clone(&dispatcher);
                let mut closed = shutdown.clone();
                tokio::spawn(async move {
                    // Permit is held until this task completes
                    let _permit = permit;
                    let peer = peer_addr.to_string();
                    tokio::select! {
                        _ = dispatcher.serve_connection(stream, &peer) => {}
                        _ = closed.changed() => {
                            debug!("Closing connection from {} on shutdown", peer);
                        }
                    }
                    dispatcher.stats().connections_active.fetch_sub(1, Ordering::Relaxed);
                });
            }
        }
    }
}
