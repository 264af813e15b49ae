//! High-level runtime API
//!
//! A [`RemoteRuntime`] owns everything one process instance needs to export
//! objects and call remote ones: the export table, listeners, stub
//! resolution, and the channel factory used for outbound calls.

use crate::activation::{
    ActivatableRef, ActivationId, Activator, ActivatorObject, RemoteActivator,
};
use crate::channel::{ChannelConfig, ChannelFactory, PooledChannelFactory};
use crate::error::{RemoteError, Result};
use crate::exporter::{ExportEntry, ExportTable, MethodTableBuilder, RemoteObject, Skeleton};
use crate::reference::RemoteReference;
use crate::server::{Dispatcher, Listener, ServerStatsSnapshot};
use crate::stub::{
    CallProtocol, Stub, StubDescriptor, StubKind, StubPolicy, StubRegistry, StubResolver,
};
use crate::transport::DEFAULT_MAX_FRAME_SIZE;
use crate::types::{Endpoint, ObjectIdentity, ServerSocketFactory, SpaceId, ACTIVATOR_NUMBER};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

/// Runtime configuration
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    /// Host written into references handed to callers
    pub host: String,
    /// Address listeners bind to
    pub listen_host: String,
    /// Whether exports may fall back to forwarding proxies
    pub allow_dynamic_proxies: bool,
    /// Concurrent connections per listener
    pub max_connections: usize,
    pub max_frame_size: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            listen_host: "127.0.0.1".to_string(),
            allow_dynamic_proxies: true,
            max_connections: 10000,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

/// Per-export options
#[derive(Clone, Default)]
pub struct ExportOptions {
    /// 0 shares the runtime's default listener
    pub port: u16,
    /// Export without accepting inbound connections
    pub detached: bool,
    pub stub_policy: StubPolicy,
    /// Well-known identity to export under instead of a fresh one
    pub identity: Option<ObjectIdentity>,
    pub server_factory: Option<Arc<dyn ServerSocketFactory>>,
    /// Runtime-internal object, kept across `clear`
    pub system: bool,
}

impl ExportOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn detached(mut self) -> Self {
        self.detached = true;
        self
    }

    pub fn stub_policy(mut self, policy: StubPolicy) -> Self {
        self.stub_policy = policy;
        self
    }

    pub fn identity(mut self, identity: ObjectIdentity) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn server_factory(mut self, factory: Arc<dyn ServerSocketFactory>) -> Self {
        self.server_factory = Some(factory);
        self
    }

    pub fn system(mut self, system: bool) -> Self {
        self.system = system;
        self
    }
}

/// Builder for [`RemoteRuntime`]
#[derive(Default)]
pub struct RemoteRuntimeBuilder {
    config: RuntimeConfig,
    channels: Option<Arc<dyn ChannelFactory>>,
    stubs: Option<Arc<StubRegistry>>,
}

impl RemoteRuntimeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn listen_host(mut self, host: impl Into<String>) -> Self {
        self.config.listen_host = host.into();
        self
    }

    pub fn allow_dynamic_proxies(mut self, allow: bool) -> Self {
        self.config.allow_dynamic_proxies = allow;
        self
    }

    pub fn max_connections(mut self, max: usize) -> Self {
        self.config.max_connections = max;
        self
    }

    pub fn max_frame_size(mut self, max: usize) -> Self {
        self.config.max_frame_size = max;
        self
    }

    /// Channel factory for outbound calls
    pub fn channels(mut self, channels: Arc<dyn ChannelFactory>) -> Self {
        self.channels = Some(channels);
        self
    }

    pub fn stub_registry(mut self, stubs: Arc<StubRegistry>) -> Self {
        self.stubs = Some(stubs);
        self
    }

    pub fn build(self) -> RemoteRuntime {
        let max_frame_size = self.config.max_frame_size;
        let channels = self.channels.unwrap_or_else(|| {
            Arc::new(PooledChannelFactory::new(ChannelConfig {
                max_frame_size,
                ..Default::default()
            }))
        });
        let stubs = self.stubs.unwrap_or_default();
        let table = Arc::new(ExportTable::new());
        let dispatcher = Arc::new(
            Dispatcher::new(Arc::clone(&table)).with_max_frame_size(max_frame_size),
        );

        RemoteRuntime {
            resolver: StubResolver::new(stubs, self.config.allow_dynamic_proxies),
            config: self.config,
            space: SpaceId::generate(),
            table,
            dispatcher,
            channels,
            listeners: RwLock::new(HashMap::new()),
            default_port: Mutex::new(None),
            bind_lock: tokio::sync::Mutex::new(()),
            next_object: AtomicU64::new(1),
        }
    }
}

/// Export table, listeners, and outbound channels for one process instance
pub struct RemoteRuntime {
    config: RuntimeConfig,
    space: SpaceId,
    table: Arc<ExportTable>,
    dispatcher: Arc<Dispatcher>,
    resolver: StubResolver,
    channels: Arc<dyn ChannelFactory>,
    listeners: RwLock<HashMap<u16, Listener>>,
    default_port: Mutex<Option<u16>>,
    /// Serializes listener creation so one port is bound once
    bind_lock: tokio::sync::Mutex<()>,
    next_object: AtomicU64,
}

impl RemoteRuntime {
    pub fn new(config: RuntimeConfig) -> Self {
        RemoteRuntimeBuilder::new().config(config).build()
    }

    pub fn builder() -> RemoteRuntimeBuilder {
        RemoteRuntimeBuilder::new()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Address space of identities issued by this runtime
    pub fn space(&self) -> SpaceId {
        self.space
    }

    pub fn table(&self) -> &Arc<ExportTable> {
        &self.table
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn channels(&self) -> &Arc<dyn ChannelFactory> {
        &self.channels
    }

    pub fn stub_registry(&self) -> &Arc<StubRegistry> {
        self.resolver.registry()
    }

    pub fn stats(&self) -> ServerStatsSnapshot {
        self.dispatcher.stats().snapshot()
    }

    /// Ports this runtime is listening on
    pub fn listening_ports(&self) -> Vec<u16> {
        let mut ports: Vec<_> = self.listeners.read().keys().copied().collect();
        ports.sort_unstable();
        ports
    }

    /// Export an implementation and return its caller-facing stub.
    ///
    /// The method table and stub shape are fixed here. The listener is bound
    /// before the entry is registered, so a failed bind leaves the table
    /// unchanged.
    pub async fn export<T: RemoteObject>(
        &self,
        implementation: Arc<T>,
        options: ExportOptions,
    ) -> Result<Stub> {
        let object: Arc<dyn RemoteObject> = implementation;
        if let Some(existing) = self.table.identity_of(&object) {
            return Err(RemoteError::Export(format!(
                "{} already exported as {}",
                object.type_name(),
                existing
            )));
        }

        let type_name = object.type_name();
        let interfaces = object.interfaces();
        if interfaces.is_empty() {
            return Err(RemoteError::Export(format!(
                "{} declares no remote interfaces",
                type_name
            )));
        }

        let methods = Arc::clone(&object)
            .bind_methods(MethodTableBuilder::new(interfaces))
            .finish()?;
        let kind = self.resolver.resolve(type_name, options.stub_policy)?;
        let skeleton = match &kind {
            StubKind::Static {
                protocol: CallProtocol::Indexed,
                operations,
                ..
            } => Some(Skeleton::build(operations, &methods)?),
            _ => None,
        };

        let endpoint = if options.detached {
            Endpoint::new(self.config.host.clone(), options.port)
        } else {
            self.ensure_listener(&options).await?
        };

        let identity = options.identity.unwrap_or_else(|| self.next_identity());
        let entry = ExportEntry::new(
            identity,
            object,
            methods,
            skeleton,
            kind.clone(),
            options.system,
        );
        self.table.register(entry)?;
        info!(
            "Exported {} as {} at {} ({} stub)",
            type_name,
            identity,
            endpoint,
            if kind.is_static() { "static" } else { "forwarding" }
        );

        let descriptor = StubDescriptor {
            reference: RemoteReference::local(endpoint, identity),
            kind,
            interfaces: interfaces.iter().map(|i| i.name.to_string()).collect(),
        };
        Ok(Stub::new(descriptor, Arc::clone(&self.channels)))
    }

    /// Remove an export.
    ///
    /// Without `force`, an object with calls in flight stays exported and
    /// `Ok(false)` is returned.
    pub fn unexport(&self, identity: &ObjectIdentity, force: bool) -> Result<bool> {
        let removed = self.table.remove(identity, force)?;
        if removed {
            info!("Unexported {} (force: {})", identity, force);
        } else {
            info!("Unexport of {} deferred: calls in flight", identity);
        }
        Ok(removed)
    }

    /// Bind a received stub descriptor to this runtime's channels
    pub fn attach(&self, descriptor: StubDescriptor) -> Stub {
        Stub::new(descriptor, Arc::clone(&self.channels))
    }

    /// Reference to an activatable object, resolved on first use
    pub fn activatable(&self, id: ActivationId) -> ActivatableRef {
        ActivatableRef::new(id, Arc::clone(&self.channels))
    }

    /// Export `activator` under the well-known activator identity
    pub async fn export_activator(
        &self,
        activator: Arc<dyn Activator>,
        options: ExportOptions,
    ) -> Result<Stub> {
        let options = options
            .identity(ObjectIdentity::well_known(ACTIVATOR_NUMBER))
            .system(true);
        self.export(Arc::new(ActivatorObject::new(activator)), options)
            .await
    }

    /// Client for the activator exported at `endpoint`
    pub fn remote_activator(&self, endpoint: Endpoint) -> RemoteActivator {
        RemoteActivator::new(endpoint, Arc::clone(&self.channels))
    }

    /// Stop all listeners, close their connections and drop every
    /// non-system export
    pub fn shutdown(&self) {
        let listeners: Vec<_> = self.listeners.write().drain().collect();
        for (_, listener) in &listeners {
            listener.shutdown();
        }
        *self.default_port.lock() = None;
        let removed = self.table.clear_user_objects();
        info!(
            "Runtime {} shut down: {} listeners closed, {} objects unexported",
            self.space,
            listeners.len(),
            removed
        );
    }

    fn next_identity(&self) -> ObjectIdentity {
        ObjectIdentity::new(self.next_object.fetch_add(1, Ordering::Relaxed), self.space)
    }

    /// Endpoint as callers see it. The server factory only shapes the
    /// bind, so it stays off the reference.
    fn public_endpoint(&self, port: u16) -> Endpoint {
        Endpoint::new(self.config.host.clone(), port)
    }

    /// Reuse a listener this runtime owns, or bind a new one
    async fn ensure_listener(&self, options: &ExportOptions) -> Result<Endpoint> {
        let _bind = self.bind_lock.lock().await;

        let requested = options.port;
        let existing = if requested == 0 {
            *self.default_port.lock()
        } else {
            self.listeners
                .read()
                .contains_key(&requested)
                .then_some(requested)
        };
        if let Some(port) = existing {
            return Ok(self.public_endpoint(port));
        }

        let mut bind_endpoint = Endpoint::new(self.config.listen_host.clone(), requested);
        if let Some(factory) = &options.server_factory {
            bind_endpoint = bind_endpoint.with_server_factory(Arc::clone(factory));
        }
        let tcp = bind_endpoint.bind().await.map_err(|e| match e.kind() {
            io::ErrorKind::AddrInUse => RemoteError::BindConflict {
                port: requested,
                source: e,
            },
            _ => RemoteError::Io(e),
        })?;

        let listener = Listener::spawn(
            tcp,
            Arc::clone(&self.dispatcher),
            self.config.max_connections,
        )?;
        let port = listener.port();
        if requested == 0 {
            *self.default_port.lock() = Some(port);
        }
        self.listeners.write().insert(port, listener);
        Ok(self.public_endpoint(port))
    }
}

impl Default for RemoteRuntime {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}
