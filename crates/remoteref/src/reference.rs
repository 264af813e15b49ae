//! Client-side remote references
//!
//! A [`RemoteReference`] names one exported object: where it lives
//! (endpoint) and which object it is (identity). Invoking through it is a
//! strict request/response exchange on a channel leased for the call.

use crate::channel::{ChannelFactory, ChannelLease};
use crate::error::{RemoteError, Result};
use crate::protocol::{CallFrame, Message, Selector};
use crate::types::{Endpoint, ObjectIdentity};
use bytes::{Buf, BufMut, Bytes};
use remote_marshal::{Marshal, Unmarshal};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::io;
use tracing::debug;

/// Handle to an object exported by some runtime
#[derive(Clone)]
pub struct RemoteReference {
    endpoint: Endpoint,
    identity: ObjectIdentity,
    is_local: bool,
}

impl RemoteReference {
    pub fn new(endpoint: Endpoint, identity: ObjectIdentity) -> Self {
        Self {
            endpoint,
            identity,
            is_local: false,
        }
    }

    /// Reference handed out by the exporting runtime itself
    pub(crate) fn local(endpoint: Endpoint, identity: ObjectIdentity) -> Self {
        Self {
            endpoint,
            identity,
            is_local: true,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn identity(&self) -> ObjectIdentity {
        self.identity
    }

    /// Whether this reference was created by the exporting runtime
    pub fn is_local(&self) -> bool {
        self.is_local
    }

    /// Send pre-marshaled arguments and return the marshaled result.
    ///
    /// Arguments are encoded once by the caller, so a retry can resend the
    /// same bytes.
    pub async fn invoke_raw(
        &self,
        channels: &dyn ChannelFactory,
        selector: Selector,
        arguments: Bytes,
    ) -> Result<Bytes> {
        let frame = Message::Call(CallFrame {
            identity: self.identity,
            selector,
            arguments,
        })
        .encode()?;

        let mut lease = ChannelLease::acquire(channels, &self.endpoint)
            .await
            .map_err(|e| self.delivery_failure(e))?;
        let channel = lease.channel().map_err(|e| self.delivery_failure(e))?;

        debug!("Call {} {} at {}", self.identity, selector, self.endpoint);
        channel
            .send(&frame)
            .await
            .map_err(|e| self.delivery_failure(e))?;

        let reply = channel
            .receive()
            .await
            .map_err(|e| self.outcome_unknown(e))?;
        let result = match Message::decode(reply) {
            Ok(Message::Return(ret)) => ret,
            Ok(other) => {
                return Err(self.outcome_unknown(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("expected return, got {:?}", other.message_type()),
                )))
            }
            Err(e) => {
                return Err(self.outcome_unknown(io::Error::new(
                    io::ErrorKind::InvalidData,
                    e.to_string(),
                )))
            }
        };
        lease.done();

        debug!("Return {:?} from {}", result.status(), self.identity);
        result.into_result()
    }

    /// Typed invocation: `A` is the argument tuple, `R` the declared return type
    pub async fn invoke<A, R>(
        &self,
        channels: &dyn ChannelFactory,
        selector: Selector,
        arguments: &A,
    ) -> Result<R>
    where
        A: Marshal + ?Sized,
        R: Unmarshal,
    {
        let arguments = remote_marshal::to_bytes(arguments)?;
        let value = self.invoke_raw(channels, selector, arguments).await?;
        Ok(remote_marshal::from_bytes(value)?)
    }

    fn delivery_failure(&self, source: io::Error) -> RemoteError {
        RemoteError::DeliveryFailure {
            endpoint: self.endpoint.clone(),
            source,
        }
    }

    fn outcome_unknown(&self, source: io::Error) -> RemoteError {
        RemoteError::OutcomeUnknown {
            endpoint: self.endpoint.clone(),
            source,
        }
    }
}

impl PartialEq for RemoteReference {
    fn eq(&self, other: &Self) -> bool {
        self.endpoint == other.endpoint && self.identity == other.identity
    }
}

impl Eq for RemoteReference {}

impl Hash for RemoteReference {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.endpoint.hash(state);
        self.identity.hash(state);
    }
}

impl fmt::Debug for RemoteReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteReference")
            .field("endpoint", &self.endpoint)
            .field("identity", &self.identity)
            .field("is_local", &self.is_local)
            .finish()
    }
}

impl fmt::Display for RemoteReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.endpoint, self.identity)
    }
}

impl Marshal for RemoteReference {
    fn marshal<B: BufMut>(&self, buf: &mut B) -> remote_marshal::Result<()> {
        self.endpoint.marshal(buf)?;
        self.identity.marshal(buf)
    }
}

impl Unmarshal for RemoteReference {
    fn unmarshal<B: Buf>(buf: &mut B) -> remote_marshal::Result<Self> {
        let endpoint = Endpoint::unmarshal(buf)?;
        let identity = ObjectIdentity::unmarshal(buf)?;
        Ok(Self::new(endpoint, identity))
    }
}
