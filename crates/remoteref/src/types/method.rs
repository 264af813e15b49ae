//! Interface and method metadata
//!
//! Remote-capable interfaces are declared statically:
//!
//! ```
//! use remoteref::{InterfaceDef, MethodDef};
//!
//! const ADD: MethodDef = MethodDef::new("demo.Adder", "add(int,int)", "int");
//! const ADDER: InterfaceDef = InterfaceDef::new("demo.Adder", &[ADD]);
//!
//! assert_eq!(ADDER.method("add(int,int)"), Some(&ADD));
//! ```
//!
//! A method's wire key is a 64-bit hash of its signature and return type,
//! so the key survives reordering methods within an interface.

use bytes::{Buf, BufMut};
use remote_marshal::{Marshal, Unmarshal};
use sha2::{Digest, Sha256};
use std::fmt;

/// Return type name of methods with no result
pub const VOID: &str = "void";

/// Stable 64-bit method key
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodHash(pub i64);

impl MethodHash {
    /// First 8 bytes, big-endian, of SHA-256 over signature then return type
    pub fn compute(signature: &str, returns: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(signature.as_bytes());
        hasher.update(returns.as_bytes());
        let digest = hasher.finalize();
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        Self(i64::from_be_bytes(head))
    }
}

impl fmt::Debug for MethodHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MethodHash({:016x})", self.0)
    }
}

impl fmt::Display for MethodHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl Marshal for MethodHash {
    fn marshal<B: BufMut>(&self, buf: &mut B) -> remote_marshal::Result<()> {
        self.0.marshal(buf)
    }
}

impl Unmarshal for MethodHash {
    fn unmarshal<B: Buf>(buf: &mut B) -> remote_marshal::Result<Self> {
        i64::unmarshal(buf).map(Self)
    }
}

/// One remote-capable method
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MethodDef {
    /// Declaring interface
    pub interface: &'static str,
    /// Name plus parameter types, e.g. `add(int,int)`
    pub signature: &'static str,
    /// Declared return type, or `void`
    pub returns: &'static str,
}

impl MethodDef {
    pub const fn new(
        interface: &'static str,
        signature: &'static str,
        returns: &'static str,
    ) -> Self {
        Self {
            interface,
            signature,
            returns,
        }
    }

    /// Method name without the parameter list
    pub fn name(&self) -> &'static str {
        match self.signature.find('(') {
            Some(idx) => &self.signature[..idx],
            None => self.signature,
        }
    }

    pub fn hash(&self) -> MethodHash {
        MethodHash::compute(self.signature, self.returns)
    }

    pub fn is_void(&self) -> bool {
        self.returns == VOID
    }
}

impl fmt::Display for MethodDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{} -> {}", self.interface, self.signature, self.returns)
    }
}

/// A remote-capable interface
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InterfaceDef {
    pub name: &'static str,
    pub methods: &'static [MethodDef],
}

impl InterfaceDef {
    pub const fn new(name: &'static str, methods: &'static [MethodDef]) -> Self {
        Self { name, methods }
    }

    /// Look up a method by signature
    pub fn method(&self, signature: &str) -> Option<&'static MethodDef> {
        self.methods.iter().find(|m| m.signature == signature)
    }

    pub fn declares(&self, method: &MethodDef) -> bool {
        self.methods.iter().any(|m| m == method)
    }
}
