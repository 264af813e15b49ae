//! Framed transport
//!
//! Frames are self-delimiting via the length field in the header, so the
//! transport only needs the first 8 bytes to know how much to read.

use crate::error::{RemoteError, Result};
use crate::protocol::{FrameHeader, Message};
use bytes::{Bytes, BytesMut};
use futures::FutureExt;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Default upper bound on a single frame (16 MiB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Reads and writes whole frames over a byte stream
pub struct FrameTransport<T> {
    inner: T,
    max_frame_size: usize,
    read_buf: BytesMut,
}

impl<T> FrameTransport<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            read_buf: BytesMut::with_capacity(8192),
        }
    }

    pub fn with_max_frame_size(mut self, max_size: usize) -> Self {
        self.max_frame_size = max_size;
        self
    }

}

impl<T: AsyncRead + Unpin> FrameTransport<T> {
    /// Read one complete frame.
    ///
    /// Returns `Ok(None)` when the peer closed the stream on a frame
    /// boundary. A stream closed mid-frame is `UnexpectedEof`.
    pub async fn read_frame(&mut self) -> io::Result<Option<Bytes>> {
        while self.read_buf.len() < FrameHeader::SIZE {
            if self.fill_buf().await? == 0 {
                if self.read_buf.is_empty() {
                    return Ok(None);
                }
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "incomplete frame header",
                ));
            }
        }

        let frame_length = u32::from_be_bytes([
            self.read_buf[4],
            self.read_buf[5],
            self.read_buf[6],
            self.read_buf[7],
        ]) as usize;

        if frame_length < FrameHeader::SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid frame length: {} < header size", frame_length),
            ));
        }
        if frame_length > self.max_frame_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "frame of {} bytes exceeds limit of {}",
                    frame_length, self.max_frame_size
                ),
            ));
        }

        while self.read_buf.len() < frame_length {
            if self.fill_buf().await? == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!(
                        "incomplete frame: expected {} bytes, got {}",
                        frame_length,
                        self.read_buf.len()
                    ),
                ));
            }
        }

        Ok(Some(self.read_buf.split_to(frame_length).freeze()))
    }

    /// Read and decode one message; a clean close is `UnexpectedEof`
    pub async fn read_message(&mut self) -> Result<Message> {
        match self.read_frame().await? {
            Some(frame) => Message::decode(frame),
            None => Err(RemoteError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed",
            ))),
        }
    }

    /// Check a connection that should have nothing to read, without waiting.
    ///
    /// A closed peer, a read error or unsolicited bytes all mean the
    /// connection can no longer carry a call.
    pub fn check_idle(&mut self) -> io::Result<()> {
        if !self.read_buf.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "unread bytes on idle connection",
            ));
        }
        match self.fill_buf().now_or_never() {
            None => Ok(()),
            Some(Ok(0)) => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed by peer",
            )),
            Some(Ok(n)) => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{} unsolicited bytes on idle connection", n),
            )),
            Some(Err(e)) => Err(e),
        }
    }

    async fn fill_buf(&mut self) -> io::Result<usize> {
        if self.read_buf.capacity() - self.read_buf.len() < 4096 {
            self.read_buf.reserve(8192);
        }
        self.inner.read_buf(&mut self.read_buf).await
    }
}

impl<T: AsyncWrite + Unpin> FrameTransport<T> {
    /// Write an already encoded frame and flush
    pub async fn write_frame(&mut self, data: &[u8]) -> io::Result<()> {
        self.inner.write_all(data).await?;
        self.inner.flush().await
    }

    /// Encode and write a message
    pub async fn write_message(&mut self, message: &Message) -> Result<()> {
        let data = message.encode()?;
        self.write_frame(&data).await?;
        Ok(())
    }
}
