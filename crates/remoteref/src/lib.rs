//! Remote object references
//!
//! This crate lets a process export objects for invocation by other
//! processes, call objects exported elsewhere, and hold references to
//! objects whose hosting process may be recycled.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  RemoteRuntime (runtime)                    │
//! ├──────────────────────┬──────────────────┬───────────────────┤
//! │  Client side         │  Server side     │  Activation       │
//! │  - RemoteReference   │  - ExportTable   │  - ActivatableRef │
//! │  - Stub / handlers   │  - Dispatcher    │  - Activator      │
//! │  - ChannelFactory    │  - Listener      │  - ActivatorObject│
//! ├──────────────────────┴──────────────────┴───────────────────┤
//! │  protocol (Call / Return / Ping frames) + FrameTransport    │
//! ├─────────────────────────────────────────────────────────────┤
//! │             remote-marshal (argument codec)                 │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use remoteref::{
//!     ExportOptions, InterfaceDef, MethodDef, MethodTableBuilder, RemoteObject, RemoteRuntime,
//! };
//!
//! const ADD: MethodDef = MethodDef::new("demo.Adder", "add(int,int)", "int");
//! const ADDER: InterfaceDef = InterfaceDef::new("demo.Adder", &[ADD]);
//!
//! struct Adder;
//!
//! impl RemoteObject for Adder {
//!     fn interfaces(&self) -> &'static [&'static InterfaceDef] {
//!         &[&ADDER]
//!     }
//!
//!     fn bind_methods(self: Arc<Self>, methods: MethodTableBuilder) -> MethodTableBuilder {
//!         methods.infallible(ADD, |(a, b): (i32, i32)| async move { a + b })
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> remoteref::Result<()> {
//!     let runtime = RemoteRuntime::default();
//!     let stub = runtime.export(Arc::new(Adder), ExportOptions::new()).await?;
//!
//!     let sum: i32 = stub.invoke(&ADD, &(2i32, 3i32)).await?;
//!     assert_eq!(sum, 5);
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! - [`types`]: identities, endpoints, interface metadata
//! - [`protocol`]: wire frames
//! - [`channel`]: outbound connections and pooling
//! - [`exporter`]: export table and method tables
//! - [`server`]: inbound dispatch and listeners
//! - [`stub`]: stub resolution and proxies
//! - [`activation`]: activatable references

pub mod activation;
pub mod channel;
pub mod exporter;
pub mod protocol;
pub mod server;
pub mod stub;
pub mod transport;
pub mod types;

mod error;
mod reference;
mod runtime;

pub use activation::{
    ActivatableRef, ActivationFailure, ActivationId, Activator, ActivatorObject, RemoteActivator,
};
pub use channel::{Channel, ChannelConfig, ChannelFactory, PooledChannelFactory};
pub use error::{ApplicationError, DeclaredError, RemoteError, Result};
pub use exporter::{ExportTable, MethodTableBuilder, RemoteObject};
pub use protocol::Selector;
pub use reference::RemoteReference;
pub use runtime::{ExportOptions, RemoteRuntime, RemoteRuntimeBuilder, RuntimeConfig};
pub use server::{Dispatcher, ServerStatsSnapshot};
pub use stub::{
    call, CallProtocol, InvocationHandler, Stub, StubDescriptor, StubKind, StubPolicy,
    StubRegistry, StubResolver, StubTemplate,
};
pub use types::{Endpoint, InterfaceDef, MethodDef, MethodHash, ObjectIdentity, SpaceId};

/// Re-export the codec traits implementations need
pub use remote_marshal::{Marshal, MarshalError, Unmarshal};

/// Protocol version carried in every frame
pub const PROTOCOL_VERSION: u8 = protocol::PROTOCOL_VERSION;
