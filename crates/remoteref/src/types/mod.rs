//! Core value types
//!
//! - Identities: `ObjectIdentity`, `SpaceId`
//! - Routing: `Endpoint` and the socket factory seams
//! - Interface metadata: `InterfaceDef`, `MethodDef`, `MethodHash`

mod endpoint;
mod identity;
mod method;

pub use endpoint::{
    ClientSocketFactory, DefaultClientSocketFactory, DefaultServerSocketFactory, Endpoint,
    ServerSocketFactory,
};
pub use identity::{ObjectIdentity, SpaceId, ACTIVATOR_NUMBER};
pub use method::{InterfaceDef, MethodDef, MethodHash, VOID};
