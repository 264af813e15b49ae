//! Activatable references
//!
//! An [`ActivatableRef`] stands for an object whose hosting process may
//! come and go. It holds no live reference until the first call, asks the
//! activator for one, and re-activates once with `force` set when a call
//! fails in a way that means the host is gone.

use crate::channel::ChannelFactory;
use crate::error::{RemoteError, Result};
use crate::protocol::Selector;
use crate::reference::RemoteReference;
use crate::stub::{call, InvocationHandler};
use crate::types::MethodDef;
use async_trait::async_trait;
use bytes::Bytes;
use remote_marshal::{Marshal, Unmarshal};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

/// Service that locates or starts the host for an activatable object
#[async_trait]
pub trait Activator: Send + Sync + 'static {
    /// Produce a live reference. With `force`, any cached reference held by
    /// the activator must be discarded and the object re-established.
    async fn activate(&self, id: &ActivationId, force: bool) -> Result<RemoteReference>;
}

/// Identity of an activatable object, plus the activator responsible for it
#[derive(Clone)]
pub struct ActivationId {
    uid: Uuid,
    activator: Arc<dyn Activator>,
}

impl ActivationId {
    pub fn new(uid: Uuid, activator: Arc<dyn Activator>) -> Self {
        Self { uid, activator }
    }

    /// Fresh id served by `activator`
    pub fn generate(activator: Arc<dyn Activator>) -> Self {
        Self::new(Uuid::new_v4(), activator)
    }

    pub fn uid(&self) -> Uuid {
        self.uid
    }

    pub fn activator(&self) -> &Arc<dyn Activator> {
        &self.activator
    }

    /// Ask the activator for a reference, reporting any failure as an activation error
    pub async fn activate(&self, force: bool) -> Result<RemoteReference> {
        self.activator
            .activate(self, force)
            .await
            .map_err(|e| match e {
                RemoteError::Activation(_) => e,
                other => RemoteError::Activation(format!("{}: {}", self.uid, other)),
            })
    }
}

impl PartialEq for ActivationId {
    fn eq(&self, other: &Self) -> bool {
        self.uid == other.uid
    }
}

impl Eq for ActivationId {}

impl Hash for ActivationId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.uid.hash(state);
    }
}

impl fmt::Debug for ActivationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActivationId({})", self.uid)
    }
}

impl fmt::Display for ActivationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.uid)
    }
}

/// Lazily resolved, self-healing reference
pub struct ActivatableRef {
    id: ActivationId,
    channels: Arc<dyn ChannelFactory>,
    /// Either empty or a complete reference; swapped only under the lock
    inner: Mutex<Option<RemoteReference>>,
}

impl ActivatableRef {
    pub fn new(id: ActivationId, channels: Arc<dyn ChannelFactory>) -> Self {
        Self {
            id,
            channels,
            inner: Mutex::new(None),
        }
    }

    /// Start from a reference obtained elsewhere
    pub fn with_reference(
        id: ActivationId,
        channels: Arc<dyn ChannelFactory>,
        reference: RemoteReference,
    ) -> Self {
        Self {
            id,
            channels,
            inner: Mutex::new(Some(reference)),
        }
    }

    pub fn id(&self) -> &ActivationId {
        &self.id
    }

    /// The reference currently held, if resolved
    pub async fn current(&self) -> Option<RemoteReference> {
        self.inner.lock().await.clone()
    }

    /// Return the held reference, activating if there is none or `force` is set
    async fn resolve(&self, force: bool) -> Result<RemoteReference> {
        let mut inner = self.inner.lock().await;
        if !force {
            if let Some(reference) = inner.as_ref() {
                return Ok(reference.clone());
            }
        }

        debug!("Activating {} (force: {})", self.id, force);
        let reference = self.id.activate(force).await?;
        *inner = Some(reference.clone());
        Ok(reference)
    }

    /// Invoke with the hash protocol, retrying once after a forced
    /// re-activation if the held reference has gone stale
    pub async fn invoke_raw(&self, method: &MethodDef, arguments: Bytes) -> Result<Bytes> {
        let selector = Selector::Hash(method.hash());
        let reference = self.resolve(false).await?;

        match reference
            .invoke_raw(self.channels.as_ref(), selector, arguments.clone())
            .await
        {
            Err(e) if e.is_stale_reference() => {
                warn!(
                    "Stale reference {} for activation {}: {}; re-activating",
                    reference, self.id, e
                );
                let fresh = self.resolve(true).await?;
                fresh
                    .invoke_raw(self.channels.as_ref(), selector, arguments)
                    .await
            }
            result => result,
        }
    }

    /// Typed invocation
    pub async fn invoke<A, R>(&self, method: &MethodDef, arguments: &A) -> Result<R>
    where
        A: Marshal + ?Sized,
        R: Unmarshal,
    {
        call(self, method, arguments).await
    }
}

#[async_trait]
impl InvocationHandler for ActivatableRef {
    async fn invoke(&self, method: &MethodDef, arguments: Bytes) -> Result<Bytes> {
        self.invoke_raw(method, arguments).await
    }
}

impl PartialEq for ActivatableRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ActivatableRef {}

impl Hash for ActivatableRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for ActivatableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivatableRef").field("id", &self.id).finish()
    }
}
