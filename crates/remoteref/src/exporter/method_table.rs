//! Method tables
//!
//! A method table maps each method hash to a type-erased handler. Handlers
//! take marshaled arguments and produce a marshaled result or a fault, so
//! dispatch never needs to know the concrete argument types.

use crate::error::{ApplicationError, DeclaredError, RemoteError, Result};
use crate::protocol::Fault;
use crate::types::{InterfaceDef, MethodDef, MethodHash};
use bytes::Bytes;
use remote_marshal::{Marshal, Unmarshal};
use std::collections::HashMap;
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Future returned by a method handler
pub type HandlerFuture = Pin<Box<dyn Future<Output = std::result::Result<Bytes, Fault>> + Send>>;

/// Type-erased method implementation
pub type MethodHandler = Arc<dyn Fn(Bytes) -> HandlerFuture + Send + Sync>;

/// One bound method
#[derive(Clone)]
pub struct MethodEntry {
    pub def: MethodDef,
    handler: MethodHandler,
}

impl MethodEntry {
    /// Run the handler on marshaled arguments
    pub fn call(&self, arguments: Bytes) -> HandlerFuture {
        (self.handler)(arguments)
    }
}

/// Immutable hash -> handler map built once per export
#[derive(Clone, Default)]
pub struct MethodTable {
    methods: HashMap<MethodHash, MethodEntry>,
}

impl MethodTable {
    pub fn get(&self, hash: MethodHash) -> Option<&MethodEntry> {
        self.methods.get(&hash)
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

/// Collects typed handlers for an implementation's declared methods
pub struct MethodTableBuilder {
    interfaces: &'static [&'static InterfaceDef],
    handlers: Vec<MethodEntry>,
}

impl MethodTableBuilder {
    pub fn new(interfaces: &'static [&'static InterfaceDef]) -> Self {
        Self {
            interfaces,
            handlers: Vec::new(),
        }
    }

    /// Bind a method that may raise the declared error `E`
    pub fn method<A, R, E, F, Fut>(mut self, def: MethodDef, f: F) -> Self
    where
        A: Unmarshal + Send + 'static,
        R: Marshal + Send + 'static,
        E: DeclaredError,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<R, E>> + Send + 'static,
    {
        let f = Arc::new(f);
        let handler: MethodHandler = Arc::new(move |arguments: Bytes| -> HandlerFuture {
            let f = Arc::clone(&f);
            Box::pin(async move {
                let arguments = remote_marshal::from_bytes::<A>(arguments).map_err(|e| {
                    Fault::application(ApplicationError::undeclared(
                        ApplicationError::ARGUMENT_DECODE,
                        e.to_string(),
                    ))
                })?;
                match (*f)(arguments).await {
                    Ok(value) => remote_marshal::to_bytes(&value).map_err(|e| {
                        Fault::application(ApplicationError::undeclared(
                            ApplicationError::RESULT_ENCODE,
                            e.to_string(),
                        ))
                    }),
                    Err(err) => Err(Fault::application(
                        ApplicationError::declared(&err).unwrap_or_else(|e| {
                            ApplicationError::undeclared(
                                ApplicationError::RESULT_ENCODE,
                                format!("{} (while encoding {}: {})", err, E::TYPE_NAME, e),
                            )
                        }),
                    )),
                }
            })
        });
        self.handlers.push(MethodEntry { def, handler });
        self
    }

    /// Bind a method that never raises
    pub fn infallible<A, R, F, Fut>(self, def: MethodDef, f: F) -> Self
    where
        A: Unmarshal + Send + 'static,
        R: Marshal + Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
    {
        self.method(def, move |arguments: A| {
            let fut = f(arguments);
            async move { Ok::<R, Infallible>(fut.await) }
        })
    }

    /// Validate against the declared interfaces and build the table.
    ///
    /// Fails if a declared method is unbound, a bound method is undeclared or
    /// bound twice, or two distinct methods share a hash.
    pub fn finish(self) -> Result<MethodTable> {
        let mut declared: HashMap<MethodHash, &MethodDef> = HashMap::new();
        for interface in self.interfaces {
            for def in interface.methods {
                if let Some(existing) = declared.insert(def.hash(), def) {
                    if !same_method(existing, def) {
                        return Err(RemoteError::Export(format!(
                            "method hash collision between {} and {}",
                            existing, def
                        )));
                    }
                }
            }
        }

        let mut methods = HashMap::with_capacity(self.handlers.len());
        for entry in self.handlers {
            let hash = entry.def.hash();
            match declared.get(&hash) {
                Some(def) if same_method(def, &entry.def) => {}
                Some(def) => {
                    return Err(RemoteError::Export(format!(
                        "method hash collision between {} and {}",
                        def, entry.def
                    )))
                }
                None => {
                    return Err(RemoteError::Export(format!(
                        "{} is not declared by any exported interface",
                        entry.def
                    )))
                }
            }
            let def = entry.def;
            if methods.insert(hash, entry).is_some() {
                return Err(RemoteError::Export(format!("{} bound twice", def)));
            }
        }

        if let Some(missing) = declared.values().find(|def| !methods.contains_key(&def.hash())) {
            return Err(RemoteError::Export(format!("no handler for {}", missing)));
        }

        Ok(MethodTable { methods })
    }
}

/// Methods with the same signature and return type are one method, whichever
/// interface declares them
fn same_method(a: &MethodDef, b: &MethodDef) -> bool {
    a.signature == b.signature && a.returns == b.returns
}

/// Operation index -> method hash map for the legacy indexed protocol
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skeleton {
    operations: Vec<MethodHash>,
}

impl Skeleton {
    /// Build from an ordered operation list; every operation must be bound
    pub fn build(operations: &[MethodHash], table: &MethodTable) -> Result<Self> {
        if let Some(missing) = operations.iter().find(|hash| table.get(**hash).is_none()) {
            return Err(RemoteError::StubResolution(format!(
                "stub operation {} has no implementation",
                missing
            )));
        }
        Ok(Self {
            operations: operations.to_vec(),
        })
    }

    pub fn resolve(&self, index: u32) -> Option<MethodHash> {
        self.operations.get(index as usize).copied()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}
