//! Activation indirection
//!
//! - `reference`: `ActivatableRef`, the lazily resolved reference with a
//!   single forced retry, and the `Activator` seam
//! - `remote`: exporting an activator and calling one in another runtime

mod reference;
mod remote;

pub use reference::{ActivatableRef, ActivationId, Activator};
pub use remote::{ActivationFailure, ActivatorObject, RemoteActivator, ACTIVATE, ACTIVATOR};
