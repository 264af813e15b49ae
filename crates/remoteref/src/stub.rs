//! Stub resolution and caller-facing proxies
//!
//! When an object is exported the runtime decides what callers will hold:
//!
//! - a **static** stub, when a pre-generated template is registered under
//!   the expected stub name for the implementation type, or
//! - a **forwarding** proxy, a generic handler over the implementation's
//!   interface set, when no template exists and dynamic proxies are allowed.
//!
//! The chosen shape is recorded in the export entry and in the
//! [`StubDescriptor`] handed to callers, so both ends agree on how calls
//! are selected (operation index vs. method hash).

use crate::channel::ChannelFactory;
use crate::error::{RemoteError, Result};
use crate::protocol::Selector;
use crate::reference::RemoteReference;
use crate::types::{MethodDef, MethodHash};
use async_trait::async_trait;
use bytes::{Buf, BufMut, Bytes};
use parking_lot::RwLock;
use remote_marshal::{Marshal, MarshalError, Unmarshal};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// How a static stub selects methods on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CallProtocol {
    /// Legacy fixed operation numbers
    Indexed = 1,
    /// Method hashes
    Hashed = 2,
}

/// A pre-generated stub shape
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StubTemplate {
    pub name: String,
    pub protocol: CallProtocol,
    /// Operations in index order
    pub operations: Vec<MethodDef>,
}

impl StubTemplate {
    pub fn new(
        name: impl Into<String>,
        protocol: CallProtocol,
        operations: Vec<MethodDef>,
    ) -> Self {
        Self {
            name: name.into(),
            protocol,
            operations,
        }
    }
}

/// Registry of loadable stub templates, keyed by stub name
#[derive(Default)]
pub struct StubRegistry {
    templates: RwLock<HashMap<String, StubTemplate>>,
}

impl StubRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, template: StubTemplate) {
        debug!("Registering stub template {}", template.name);
        self.templates
            .write()
            .insert(template.name.clone(), template);
    }

    pub fn load(&self, name: &str) -> Option<StubTemplate> {
        self.templates.read().get(name).cloned()
    }
}

/// Which stub shapes an export accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StubPolicy {
    /// Static if a template exists, otherwise forwarding if allowed
    #[default]
    PreferStatic,
    /// Static only
    RequireStatic,
    /// Forwarding only
    ForwardingOnly,
}

/// The resolved stub shape
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StubKind {
    Static {
        name: String,
        protocol: CallProtocol,
        /// Operation hashes in index order
        operations: Vec<MethodHash>,
    },
    Forwarding,
}

impl StubKind {
    pub fn is_static(&self) -> bool {
        matches!(self, Self::Static { .. })
    }
}

impl Marshal for StubKind {
    fn marshal<B: BufMut>(&self, buf: &mut B) -> remote_marshal::Result<()> {
        match self {
            Self::Static {
                name,
                protocol,
                operations,
            } => {
                buf.put_u8(1);
                name.marshal(buf)?;
                buf.put_u8(*protocol as u8);
                operations.marshal(buf)
            }
            Self::Forwarding => {
                buf.put_u8(2);
                Ok(())
            }
        }
    }
}

impl Unmarshal for StubKind {
    fn unmarshal<B: Buf>(buf: &mut B) -> remote_marshal::Result<Self> {
        match u8::unmarshal(buf)? {
            1 => {
                let name = String::unmarshal(buf)?;
                let protocol = match u8::unmarshal(buf)? {
                    1 => CallProtocol::Indexed,
                    2 => CallProtocol::Hashed,
                    tag => {
                        return Err(MarshalError::InvalidTag {
                            type_name: "CallProtocol",
                            tag,
                        })
                    }
                };
                let operations = Vec::<MethodHash>::unmarshal(buf)?;
                Ok(Self::Static {
                    name,
                    protocol,
                    operations,
                })
            }
            2 => Ok(Self::Forwarding),
            tag => Err(MarshalError::InvalidTag {
                type_name: "StubKind",
                tag,
            }),
        }
    }
}

/// Chooses the stub shape for an implementation type
pub struct StubResolver {
    registry: Arc<StubRegistry>,
    allow_dynamic_proxies: bool,
}

impl StubResolver {
    pub fn new(registry: Arc<StubRegistry>, allow_dynamic_proxies: bool) -> Self {
        Self {
            registry,
            allow_dynamic_proxies,
        }
    }

    /// Stub name expected for an implementation type
    pub fn expected_name(type_name: &str) -> String {
        format!("{}_Stub", type_name)
    }

    pub fn registry(&self) -> &Arc<StubRegistry> {
        &self.registry
    }

    pub fn resolve(&self, type_name: &str, policy: StubPolicy) -> Result<StubKind> {
        let name = Self::expected_name(type_name);
        let template = match policy {
            StubPolicy::ForwardingOnly => None,
            StubPolicy::PreferStatic | StubPolicy::RequireStatic => self.registry.load(&name),
        };

        match (template, policy) {
            (Some(template), _) => {
                debug!("Resolved static stub {} for {}", template.name, type_name);
                Ok(StubKind::Static {
                    name: template.name,
                    protocol: template.protocol,
                    operations: template.operations.iter().map(MethodDef::hash).collect(),
                })
            }
            (None, StubPolicy::RequireStatic) => Err(RemoteError::StubResolution(format!(
                "static stub {} required but not registered",
                name
            ))),
            (None, _) if self.allow_dynamic_proxies => {
                debug!("Using forwarding proxy for {}", type_name);
                Ok(StubKind::Forwarding)
            }
            (None, _) => Err(RemoteError::StubResolution(format!(
                "no stub {} and dynamic proxies are disabled",
                name
            ))),
        }
    }
}

/// Everything a caller needs to build a proxy: transmitted to callers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StubDescriptor {
    pub reference: RemoteReference,
    pub kind: StubKind,
    /// Interface names the proxy answers for
    pub interfaces: Vec<String>,
}

impl Marshal for StubDescriptor {
    fn marshal<B: BufMut>(&self, buf: &mut B) -> remote_marshal::Result<()> {
        self.reference.marshal(buf)?;
        self.kind.marshal(buf)?;
        self.interfaces.marshal(buf)
    }
}

impl Unmarshal for StubDescriptor {
    fn unmarshal<B: Buf>(buf: &mut B) -> remote_marshal::Result<Self> {
        Ok(Self {
            reference: RemoteReference::unmarshal(buf)?,
            kind: StubKind::unmarshal(buf)?,
            interfaces: Vec::<String>::unmarshal(buf)?,
        })
    }
}

/// Common dispatch entry point shared by every proxy shape
#[async_trait]
pub trait InvocationHandler: Send + Sync {
    /// Invoke `method` with marshaled arguments, returning the marshaled result
    async fn invoke(&self, method: &MethodDef, arguments: Bytes) -> Result<Bytes>;
}

/// Typed call through any invocation handler
pub async fn call<A, R>(
    handler: &dyn InvocationHandler,
    method: &MethodDef,
    arguments: &A,
) -> Result<R>
where
    A: Marshal + ?Sized,
    R: Unmarshal,
{
    let arguments = remote_marshal::to_bytes(arguments)?;
    let value = handler.invoke(method, arguments).await?;
    Ok(remote_marshal::from_bytes(value)?)
}

/// Handler for a static stub
pub struct StaticHandler {
    reference: RemoteReference,
    protocol: CallProtocol,
    operations: Vec<MethodHash>,
    channels: Arc<dyn ChannelFactory>,
}

impl StaticHandler {
    fn selector(&self, method: &MethodDef) -> Result<Selector> {
        let hash = method.hash();
        let index = self
            .operations
            .iter()
            .position(|op| *op == hash)
            .ok_or_else(|| {
                RemoteError::UnknownMethod(format!("{} is not an operation of this stub", method))
            })?;
        Ok(match self.protocol {
            CallProtocol::Indexed => Selector::Index(index as u32),
            CallProtocol::Hashed => Selector::Hash(hash),
        })
    }
}

#[async_trait]
impl InvocationHandler for StaticHandler {
    async fn invoke(&self, method: &MethodDef, arguments: Bytes) -> Result<Bytes> {
        let selector = self.selector(method)?;
        self.reference
            .invoke_raw(self.channels.as_ref(), selector, arguments)
            .await
    }
}

/// Generic proxy over an interface set
pub struct ForwardingHandler {
    reference: RemoteReference,
    interfaces: Vec<String>,
    channels: Arc<dyn ChannelFactory>,
}

#[async_trait]
impl InvocationHandler for ForwardingHandler {
    async fn invoke(&self, method: &MethodDef, arguments: Bytes) -> Result<Bytes> {
        if !self.interfaces.iter().any(|name| name == method.interface) {
            return Err(RemoteError::UnknownMethod(format!(
                "{} is outside the proxied interfaces",
                method
            )));
        }
        self.reference
            .invoke_raw(self.channels.as_ref(), Selector::Hash(method.hash()), arguments)
            .await
    }
}

/// Caller-facing proxy for an exported object
#[derive(Clone)]
pub struct Stub {
    descriptor: StubDescriptor,
    handler: Arc<dyn InvocationHandler>,
}

impl Stub {
    /// Bind a descriptor to a channel factory
    pub fn new(descriptor: StubDescriptor, channels: Arc<dyn ChannelFactory>) -> Self {
        let reference = descriptor.reference.clone();
        let handler: Arc<dyn InvocationHandler> = match &descriptor.kind {
            StubKind::Static {
                protocol,
                operations,
                ..
            } => Arc::new(StaticHandler {
                reference,
                protocol: *protocol,
                operations: operations.clone(),
                channels,
            }),
            StubKind::Forwarding => Arc::new(ForwardingHandler {
                reference,
                interfaces: descriptor.interfaces.clone(),
                channels,
            }),
        };
        Self {
            descriptor,
            handler,
        }
    }

    pub fn reference(&self) -> &RemoteReference {
        &self.descriptor.reference
    }

    pub fn kind(&self) -> &StubKind {
        &self.descriptor.kind
    }

    pub fn descriptor(&self) -> &StubDescriptor {
        &self.descriptor
    }

    pub fn handler(&self) -> &Arc<dyn InvocationHandler> {
        &self.handler
    }

    /// Typed invocation
    pub async fn invoke<A, R>(&self, method: &MethodDef, arguments: &A) -> Result<R>
    where
        A: Marshal + ?Sized,
        R: Unmarshal,
    {
        call(self.handler.as_ref(), method, arguments).await
    }
}

impl fmt::Debug for Stub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stub")
            .field("descriptor", &self.descriptor)
            .finish()
    }
}

impl PartialEq for Stub {
    fn eq(&self, other: &Self) -> bool {
        self.descriptor.reference == other.descriptor.reference
    }
}

impl Eq for Stub {}
