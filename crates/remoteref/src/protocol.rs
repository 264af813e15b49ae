//! Wire protocol
//!
//! Every message is a self-delimiting frame:
//!
//! ```text
//! +---------+--------------+-------+----------+-------------------+
//! | version | message type | flags | reserved | frame length: u32 |
//! +---------+--------------+-------+----------+-------------------+
//! | body (frame length - 8 bytes)                                 |
//! +---------------------------------------------------------------+
//! ```
//!
//! Call body: `identity | operation: i32 | [hash: i64 if operation == -1] | arguments`
//!
//! Return body: `status: u8 | value` (normal) or `status: u8 | Fault` (exceptional)
//!
//! All integers are big-endian. The frame length covers the header.

use crate::error::{ApplicationError, RemoteError, Result};
use crate::types::{MethodHash, ObjectIdentity};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use remote_marshal::{Marshal, Unmarshal};
use std::fmt;

/// Protocol version carried in every frame header
pub const PROTOCOL_VERSION: u8 = 1;

/// Operation number selecting the hash-based protocol
pub const HASH_OPERATION: i32 = -1;

/// Message types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Call = 0x50,
    Return = 0x51,
    Ping = 0x52,
    PingAck = 0x53,
}

impl MessageType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x50 => Some(Self::Call),
            0x51 => Some(Self::Return),
            0x52 => Some(Self::Ping),
            0x53 => Some(Self::PingAck),
            _ => None,
        }
    }
}

/// Frame header (8 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: u8,
    pub message_type: MessageType,
    pub flags: u8,
    /// Total frame length including this header
    pub frame_length: u32,
}

impl FrameHeader {
    /// Header size in bytes
    pub const SIZE: usize = 8;

    pub fn new(message_type: MessageType) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            message_type,
            flags: 0,
            frame_length: Self::SIZE as u32,
        }
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.version);
        buf.put_u8(self.message_type as u8);
        buf.put_u8(self.flags);
        buf.put_u8(0);
        buf.put_u32(self.frame_length);
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(RemoteError::Protocol(format!(
                "frame header too short: {} bytes",
                data.len()
            )));
        }

        let version = data[0];
        if version != PROTOCOL_VERSION {
            return Err(RemoteError::Protocol(format!(
                "unsupported protocol version {}",
                version
            )));
        }

        let message_type = MessageType::from_u8(data[1]).ok_or_else(|| {
            RemoteError::Protocol(format!("unknown message type 0x{:02x}", data[1]))
        })?;
        let frame_length = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        if (frame_length as usize) < Self::SIZE {
            return Err(RemoteError::Protocol(format!(
                "invalid frame length: {} < header size",
                frame_length
            )));
        }

        Ok(Self {
            version,
            message_type,
            flags: data[2],
            frame_length,
        })
    }
}

/// How a call names its target method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Selector {
    /// Hash-based protocol
    Hash(MethodHash),
    /// Legacy fixed operation index
    Index(u32),
}

impl Selector {
    /// Operation number as written on the wire
    pub fn operation(&self) -> i32 {
        match self {
            Self::Hash(_) => HASH_OPERATION,
            Self::Index(index) => *index as i32,
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hash(hash) => write!(f, "hash {}", hash),
            Self::Index(index) => write!(f, "operation {}", index),
        }
    }
}

/// An inbound or outbound invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallFrame {
    pub identity: ObjectIdentity,
    pub selector: Selector,
    /// Arguments, already marshaled in declared parameter order
    pub arguments: Bytes,
}

/// Fault categories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FaultKind {
    Application = 1,
    UnknownMethod = 2,
    NoSuchObject = 3,
}

impl FaultKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Application),
            2 => Some(Self::UnknownMethod),
            3 => Some(Self::NoSuchObject),
            _ => None,
        }
    }
}

/// Body of an exceptional return
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub kind: FaultKind,
    pub type_name: String,
    pub message: String,
    pub payload: Option<Bytes>,
}

impl Fault {
    pub fn application(err: ApplicationError) -> Self {
        Self {
            kind: FaultKind::Application,
            type_name: err.type_name,
            message: err.message,
            payload: err.payload,
        }
    }

    pub fn unknown_method(message: impl Into<String>) -> Self {
        Self {
            kind: FaultKind::UnknownMethod,
            type_name: String::new(),
            message: message.into(),
            payload: None,
        }
    }

    /// The missing identity travels in the payload
    pub fn no_such_object(identity: &ObjectIdentity) -> Self {
        Self {
            kind: FaultKind::NoSuchObject,
            type_name: String::new(),
            message: identity.to_string(),
            payload: remote_marshal::to_bytes(identity).ok(),
        }
    }

    /// Reconstruct the error the callee raised
    pub fn into_error(self) -> RemoteError {
        match self.kind {
            FaultKind::Application => RemoteError::Application(ApplicationError {
                type_name: self.type_name,
                message: self.message,
                payload: self.payload,
            }),
            FaultKind::UnknownMethod => RemoteError::UnknownMethod(self.message),
            FaultKind::NoSuchObject => match self
                .payload
                .map(remote_marshal::from_bytes::<ObjectIdentity>)
            {
                Some(Ok(identity)) => RemoteError::NoSuchObject(identity),
                _ => RemoteError::Protocol(format!(
                    "no-such-object fault without identity: {}",
                    self.message
                )),
            },
        }
    }
}

impl Marshal for Fault {
    fn marshal<B: BufMut>(&self, buf: &mut B) -> remote_marshal::Result<()> {
        buf.put_u8(self.kind as u8);
        self.type_name.marshal(buf)?;
        self.message.marshal(buf)?;
        self.payload.marshal(buf)
    }
}

impl Unmarshal for Fault {
    fn unmarshal<B: Buf>(buf: &mut B) -> remote_marshal::Result<Self> {
        let tag = u8::unmarshal(buf)?;
        let kind = FaultKind::from_u8(tag).ok_or(remote_marshal::MarshalError::InvalidTag {
            type_name: "FaultKind",
            tag,
        })?;
        Ok(Self {
            kind,
            type_name: String::unmarshal(buf)?,
            message: String::unmarshal(buf)?,
            payload: Option::<Bytes>::unmarshal(buf)?,
        })
    }
}

/// Return status byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReturnStatus {
    Normal = 0x01,
    Exceptional = 0x02,
}

/// Outcome of a dispatched call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReturnFrame {
    /// Marshaled return value; empty for void methods
    Normal(Bytes),
    Exceptional(Fault),
}

impl ReturnFrame {
    pub fn status(&self) -> ReturnStatus {
        match self {
            Self::Normal(_) => ReturnStatus::Normal,
            Self::Exceptional(_) => ReturnStatus::Exceptional,
        }
    }

    /// The value, or the callee's error
    pub fn into_result(self) -> Result<Bytes> {
        match self {
            Self::Normal(value) => Ok(value),
            Self::Exceptional(fault) => Err(fault.into_error()),
        }
    }
}

/// Any frame on a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Call(CallFrame),
    Return(ReturnFrame),
    Ping,
    PingAck,
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Call(_) => MessageType::Call,
            Self::Return(_) => MessageType::Return,
            Self::Ping => MessageType::Ping,
            Self::PingAck => MessageType::PingAck,
        }
    }

    /// Encode into a complete frame
    pub fn encode(&self) -> Result<Bytes> {
        let mut body = BytesMut::new();
        match self {
            Self::Call(call) => {
                call.identity.marshal(&mut body)?;
                body.put_i32(call.selector.operation());
                if let Selector::Hash(hash) = call.selector {
                    hash.marshal(&mut body)?;
                }
                body.put_slice(&call.arguments);
            }
            Self::Return(ret) => {
                body.put_u8(ret.status() as u8);
                match ret {
                    ReturnFrame::Normal(value) => body.put_slice(value),
                    ReturnFrame::Exceptional(fault) => fault.marshal(&mut body)?,
                }
            }
            Self::Ping | Self::PingAck => {}
        }

        let frame_length = u32::try_from(FrameHeader::SIZE + body.len())
            .map_err(|_| RemoteError::Protocol(format!("frame body too large: {}", body.len())))?;
        let mut header = FrameHeader::new(self.message_type());
        header.frame_length = frame_length;

        let mut buf = BytesMut::with_capacity(frame_length as usize);
        header.encode(&mut buf);
        buf.put_slice(&body);
        Ok(buf.freeze())
    }

    /// Decode a complete frame
    pub fn decode(data: Bytes) -> Result<Self> {
        let header = FrameHeader::decode(&data)?;
        if header.frame_length as usize != data.len() {
            return Err(RemoteError::Protocol(format!(
                "frame length {} does not match {} bytes received",
                header.frame_length,
                data.len()
            )));
        }
        let mut body = data.slice(FrameHeader::SIZE..);

        match header.message_type {
            MessageType::Call => {
                let identity = ObjectIdentity::unmarshal(&mut body)?;
                let operation = i32::unmarshal(&mut body)?;
                let selector = match operation {
                    HASH_OPERATION => Selector::Hash(MethodHash::unmarshal(&mut body)?),
                    op if op >= 0 => Selector::Index(op as u32),
                    op => {
                        return Err(RemoteError::Protocol(format!(
                            "invalid operation number {}",
                            op
                        )))
                    }
                };
                Ok(Self::Call(CallFrame {
                    identity,
                    selector,
                    arguments: body,
                }))
            }
            MessageType::Return => {
                let status = u8::unmarshal(&mut body)?;
                match status {
                    s if s == ReturnStatus::Normal as u8 => {
                        Ok(Self::Return(ReturnFrame::Normal(body)))
                    }
                    s if s == ReturnStatus::Exceptional as u8 => {
                        let fault = remote_marshal::from_bytes::<Fault>(body)?;
                        Ok(Self::Return(ReturnFrame::Exceptional(fault)))
                    }
                    other => Err(RemoteError::Protocol(format!(
                        "invalid return status 0x{:02x}",
                        other
                    ))),
                }
            }
            MessageType::Ping => Ok(Self::Ping),
            MessageType::PingAck => Ok(Self::PingAck),
        }
    }
}
