//! Client channels and pooling
//!
//! A [`Channel`] is one framed connection to an endpoint. Callers get
//! channels from a [`ChannelFactory`] and hand them back when the call is
//! over, saying whether the connection is still in a known state. Only a
//! channel that completed a full request/response exchange is reusable.

use crate::protocol::{FrameHeader, Message, MessageType};
use crate::transport::{FrameTransport, DEFAULT_MAX_FRAME_SIZE};
use crate::types::Endpoint;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, trace};

/// Byte stream a channel can run over
pub trait ChannelStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin + 'static> ChannelStream for T {}

pub type BoxedStream = Box<dyn ChannelStream>;

/// One framed connection to an endpoint
pub struct Channel {
    endpoint: Endpoint,
    transport: FrameTransport<BoxedStream>,
    last_used: Instant,
}

impl Channel {
    pub fn new(endpoint: Endpoint, stream: impl ChannelStream, max_frame_size: usize) -> Self {
        let stream: BoxedStream = Box::new(stream);
        Self {
            endpoint,
            transport: FrameTransport::new(stream).with_max_frame_size(max_frame_size),
            last_used: Instant::now(),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Time since the last send or receive
    pub fn idle_for(&self) -> Duration {
        self.last_used.elapsed()
    }

    /// Write one encoded frame
    pub async fn send(&mut self, frame: &[u8]) -> io::Result<()> {
        trace!("send {} bytes to {}", frame.len(), self.endpoint);
        self.transport.write_frame(frame).await?;
        self.last_used = Instant::now();
        Ok(())
    }

    /// Read one frame; a closed connection is `UnexpectedEof`
    pub async fn receive(&mut self) -> io::Result<Bytes> {
        let frame = self.transport.read_frame().await?.ok_or_else(|| {
            io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed by peer")
        })?;
        trace!("received {} bytes from {}", frame.len(), self.endpoint);
        self.last_used = Instant::now();
        Ok(frame)
    }

    /// Whether an idle channel can still carry a call.
    ///
    /// Catches a peer that hung up while the channel sat in a pool, so the
    /// next call is never written into a dead connection.
    pub fn check_idle(&mut self) -> io::Result<()> {
        self.transport.check_idle()
    }

    /// Check that the peer is still answering
    pub async fn ping(&mut self) -> io::Result<()> {
        let mut frame = BytesMut::with_capacity(FrameHeader::SIZE);
        FrameHeader::new(MessageType::Ping).encode(&mut frame);
        self.send(&frame).await?;
        let reply = self.receive().await?;
        match Message::decode(reply) {
            Ok(Message::PingAck) => Ok(()),
            Ok(other) => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("expected ping ack, got {:?}", other.message_type()),
            )),
            Err(e) => Err(io::Error::new(io::ErrorKind::InvalidData, e.to_string())),
        }
    }
}

/// Source of channels for outbound calls
#[async_trait]
pub trait ChannelFactory: Send + Sync + 'static {
    /// Get a channel connected to `endpoint`
    async fn acquire(&self, endpoint: &Endpoint) -> io::Result<Channel>;

    /// Return a channel. A channel that is not `reusable` must be closed.
    fn release(&self, channel: Channel, reusable: bool);
}

/// Guard that returns a channel to its factory when dropped.
///
/// The channel is closed unless [`ChannelLease::done`] was called, so a
/// cancelled or failed call never leaves a half-read connection in a pool.
pub struct ChannelLease<'a> {
    channel: Option<Channel>,
    factory: &'a dyn ChannelFactory,
    reusable: bool,
}

impl<'a> ChannelLease<'a> {
    pub async fn acquire(
        factory: &'a dyn ChannelFactory,
        endpoint: &Endpoint,
    ) -> io::Result<Self> {
        let channel = factory.acquire(endpoint).await?;
        Ok(Self {
            channel: Some(channel),
            factory,
            reusable: false,
        })
    }

    /// Mark the exchange complete so the channel goes back for reuse
    pub fn done(&mut self) {
        self.reusable = true;
    }

    pub fn channel(&mut self) -> io::Result<&mut Channel> {
        self.channel
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "channel released"))
    }
}

impl Drop for ChannelLease<'_> {
    fn drop(&mut self) {
        if let Some(channel) = self.channel.take() {
            self.factory.release(channel, self.reusable);
        }
    }
}

/// Channel pool configuration
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Idle channels kept per endpoint
    pub max_idle_per_endpoint: usize,
    /// Idle time after which a pooled channel is pinged before reuse
    pub idle_check_after: Duration,
    /// Deadline for opening a new connection
    pub connect_timeout: Duration,
    pub max_frame_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            max_idle_per_endpoint: 8,
            idle_check_after: Duration::from_secs(15),
            connect_timeout: Duration::from_secs(10),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

/// TCP channel factory with a per-endpoint idle pool
pub struct PooledChannelFactory {
    config: ChannelConfig,
    idle: Mutex<HashMap<Endpoint, Vec<Channel>>>,
}

impl PooledChannelFactory {
    pub fn new(config: ChannelConfig) -> Self {
        Self {
            config,
            idle: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Number of idle channels pooled for `endpoint`
    pub fn idle_count(&self, endpoint: &Endpoint) -> usize {
        self.idle.lock().get(endpoint).map_or(0, Vec::len)
    }

    /// Drop every pooled channel
    pub fn clear(&self) {
        self.idle.lock().clear();
    }

    fn take_idle(&self, endpoint: &Endpoint) -> Option<Channel> {
        self.idle.lock().get_mut(endpoint).and_then(Vec::pop)
    }

    async fn connect(&self, endpoint: &Endpoint) -> io::Result<Channel> {
        let stream = tokio::time::timeout(self.config.connect_timeout, endpoint.connect())
            .await
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connect to {} timed out", endpoint),
                )
            })??;
        debug!("Opened channel to {}", endpoint);
        Ok(Channel::new(
            endpoint.clone(),
            stream,
            self.config.max_frame_size,
        ))
    }
}

impl Default for PooledChannelFactory {
    fn default() -> Self {
        Self::new(ChannelConfig::default())
    }
}

#[async_trait]
impl ChannelFactory for PooledChannelFactory {
    async fn acquire(&self, endpoint: &Endpoint) -> io::Result<Channel> {
        while let Some(mut channel) = self.take_idle(endpoint) {
            if let Err(e) = channel.check_idle() {
                debug!("Discarding closed channel to {}: {}", endpoint, e);
                continue;
            }
            if channel.idle_for() < self.config.idle_check_after {
                return Ok(channel);
            }
            match channel.ping().await {
                Ok(()) => return Ok(channel),
                Err(e) => debug!("Discarding stale channel to {}: {}", endpoint, e),
            }
        }
        self.connect(endpoint).await
    }

    fn release(&self, channel: Channel, reusable: bool) {
        if !reusable {
            trace!("Closing channel to {}", channel.endpoint());
            return;
        }
        let mut idle = self.idle.lock();
        let pooled = idle.entry(channel.endpoint().clone()).or_default();
        if pooled.len() < self.config.max_idle_per_endpoint {
            pooled.push(channel);
        }
    }
}
