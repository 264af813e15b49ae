//! Error types for remote invocation

use std::fmt;
use std::io;

use bytes::Bytes;
use remote_marshal::{Marshal, MarshalError, Unmarshal};
use thiserror::Error;

use crate::types::{Endpoint, ObjectIdentity};

/// Remote invocation errors
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The call never fully left this process; retrying is safe
    #[error("call to {endpoint} not delivered: {source}")]
    DeliveryFailure {
        endpoint: Endpoint,
        #[source]
        source: io::Error,
    },

    /// The call was sent but no response was confirmed; retrying is not safe
    #[error("outcome of call to {endpoint} unknown: {source}")]
    OutcomeUnknown {
        endpoint: Endpoint,
        #[source]
        source: io::Error,
    },

    /// Local encode/decode fault
    #[error("marshal error: {0}")]
    Marshal(#[from] MarshalError),

    /// Error raised by the remote implementation, or a dispatch-local failure
    #[error("remote application error: {0}")]
    Application(ApplicationError),

    /// Operation selector or method hash not resolvable
    #[error("unknown method: {0}")]
    UnknownMethod(String),

    /// No object exported under the identity
    #[error("no such object: {0}")]
    NoSuchObject(ObjectIdentity),

    /// No usable stub for an exported implementation
    #[error("stub resolution failed: {0}")]
    StubResolution(String),

    /// The port is owned by a listener this runtime does not control
    #[error("port {port} already in use: {source}")]
    BindConflict {
        port: u16,
        #[source]
        source: io::Error,
    },

    /// The activator could not produce a live reference
    #[error("activation failed: {0}")]
    Activation(String),

    /// Export rejected before registration
    #[error("export failed: {0}")]
    Export(String),

    /// Malformed frame
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Local I/O error outside a call
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for remote invocation
pub type Result<T> = std::result::Result<T, RemoteError>;

impl RemoteError {
    /// Whether the call is known not to have reached the server
    pub fn is_retry_safe(&self) -> bool {
        matches!(self, Self::DeliveryFailure { .. })
    }

    /// Whether the failure suggests the hosting process is gone or recycled.
    ///
    /// This is the bounded set an activatable reference re-activates on:
    /// refused or dropped connections before the call left, and calls to an
    /// identity the server no longer exports. An unconfirmed outcome is never
    /// part of the set.
    pub fn is_stale_reference(&self) -> bool {
        match self {
            Self::DeliveryFailure { source, .. } => matches!(
                source.kind(),
                io::ErrorKind::ConnectionRefused
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::NotConnected
                    | io::ErrorKind::UnexpectedEof
            ),
            Self::NoSuchObject(_) => true,
            _ => false,
        }
    }

    /// The application error, if the callee raised one
    pub fn as_application(&self) -> Option<&ApplicationError> {
        match self {
            Self::Application(err) => Some(err),
            _ => None,
        }
    }
}

/// Error type a remote method declares it may raise.
///
/// The value is marshaled into the response so the caller can get the same
/// error back with [`ApplicationError::downcast`].
pub trait DeclaredError: Marshal + Unmarshal + fmt::Display + Send + 'static {
    /// Stable name identifying the error type on the wire
    const TYPE_NAME: &'static str;
}

impl DeclaredError for std::convert::Infallible {
    const TYPE_NAME: &'static str = "!";
}

/// Error raised on the far side of a call
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApplicationError {
    /// Declared error type name, or a reserved `remoteref.*` name
    pub type_name: String,
    /// Display form of the original error
    pub message: String,
    /// Marshaled declared error; absent for dispatch-local failures
    pub payload: Option<Bytes>,
}

impl ApplicationError {
    /// Reserved type name: arguments could not be decoded
    pub const ARGUMENT_DECODE: &'static str = "remoteref.ArgumentDecode";
    /// Reserved type name: the result could not be encoded
    pub const RESULT_ENCODE: &'static str = "remoteref.ResultEncode";
    /// Reserved type name: the implementation panicked
    pub const DISPATCH_PANIC: &'static str = "remoteref.DispatchPanic";

    /// Capture a declared error raised by an implementation
    pub fn declared<E: DeclaredError>(err: &E) -> std::result::Result<Self, MarshalError> {
        Ok(Self {
            type_name: E::TYPE_NAME.to_string(),
            message: err.to_string(),
            payload: Some(remote_marshal::to_bytes(err)?),
        })
    }

    /// Describe a failure inside dispatch that no method declared
    pub fn undeclared(type_name: &str, message: impl Into<String>) -> Self {
        Self {
            type_name: type_name.to_string(),
            message: message.into(),
            payload: None,
        }
    }

    /// Whether the callee declared this error
    pub fn is_declared(&self) -> bool {
        self.payload.is_some()
    }

    /// Recover the declared error, if it is an `E`
    pub fn downcast<E: DeclaredError>(&self) -> Option<E> {
        if self.type_name != E::TYPE_NAME {
            return None;
        }
        let payload = self.payload.clone()?;
        remote_marshal::from_bytes(payload).ok()
    }
}

impl fmt::Display for ApplicationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.type_name, self.message)
    }
}
