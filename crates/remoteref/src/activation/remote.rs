//! Activation across processes
//!
//! An activation host exports its [`Activator`] as an [`ActivatorObject`]
//! under the well-known [`ACTIVATOR_NUMBER`] identity. Clients reach it
//! through a [`RemoteActivator`], which is itself an `Activator`.

use super::reference::{ActivationId, Activator};
use crate::channel::ChannelFactory;
use crate::error::{DeclaredError, RemoteError, Result};
use crate::exporter::{MethodTableBuilder, RemoteObject};
use crate::protocol::Selector;
use crate::reference::RemoteReference;
use crate::types::{Endpoint, InterfaceDef, MethodDef, ObjectIdentity, ACTIVATOR_NUMBER};
use async_trait::async_trait;
use bytes::{Buf, BufMut};
use remote_marshal::{Marshal, Unmarshal};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

pub const ACTIVATE: MethodDef = MethodDef::new(
    "remoteref.Activator",
    "activate(ActivationId,boolean)",
    "RemoteReference",
);

pub const ACTIVATOR: InterfaceDef = InterfaceDef::new("remoteref.Activator", &[ACTIVATE]);

/// Activation failure reported by a remote activator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationFailure {
    pub message: String,
}

impl fmt::Display for ActivationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl Marshal for ActivationFailure {
    fn marshal<B: BufMut>(&self, buf: &mut B) -> remote_marshal::Result<()> {
        self.message.marshal(buf)
    }
}

impl Unmarshal for ActivationFailure {
    fn unmarshal<B: Buf>(buf: &mut B) -> remote_marshal::Result<Self> {
        Ok(Self {
            message: String::unmarshal(buf)?,
        })
    }
}

impl DeclaredError for ActivationFailure {
    const TYPE_NAME: &'static str = "remoteref.ActivationFailure";
}

/// Exports a local activator
pub struct ActivatorObject {
    activator: Arc<dyn Activator>,
}

impl ActivatorObject {
    pub fn new(activator: Arc<dyn Activator>) -> Self {
        Self { activator }
    }
}

impl RemoteObject for ActivatorObject {
    fn interfaces(&self) -> &'static [&'static InterfaceDef] {
        &[&ACTIVATOR]
    }

    fn bind_methods(self: Arc<Self>, methods: MethodTableBuilder) -> MethodTableBuilder {
        methods.method(ACTIVATE, move |(uid, force): ([u8; 16], bool)| {
            let activator = Arc::clone(&self.activator);
            async move {
                let id = ActivationId::new(Uuid::from_bytes(uid), Arc::clone(&activator));
                activator
                    .activate(&id, force)
                    .await
                    .map_err(|e| ActivationFailure {
                        message: e.to_string(),
                    })
            }
        })
    }
}

/// Client for an activator exported by another runtime
pub struct RemoteActivator {
    reference: RemoteReference,
    channels: Arc<dyn ChannelFactory>,
}

impl RemoteActivator {
    /// Activator object at the well-known identity on `endpoint`
    pub fn new(endpoint: Endpoint, channels: Arc<dyn ChannelFactory>) -> Self {
        Self {
            reference: RemoteReference::new(
                endpoint,
                ObjectIdentity::well_known(ACTIVATOR_NUMBER),
            ),
            channels,
        }
    }

    pub fn reference(&self) -> &RemoteReference {
        &self.reference
    }
}

#[async_trait]
impl Activator for RemoteActivator {
    async fn activate(&self, id: &ActivationId, force: bool) -> Result<RemoteReference> {
        let arguments = (*id.uid().as_bytes(), force);
        self.reference
            .invoke::<_, RemoteReference>(
                self.channels.as_ref(),
                Selector::Hash(ACTIVATE.hash()),
                &arguments,
            )
            .await
            .map_err(|e| {
                let failure = e
                    .as_application()
                    .and_then(|a| a.downcast::<ActivationFailure>());
                match failure {
                    Some(failure) => RemoteError::Activation(failure.message),
                    None => e,
                }
            })
    }
}
