//! Object identities
//!
//! An identity is an object number scoped to an address space. Each runtime
//! draws a random space id when it starts, so numbers handed out by a
//! recycled process never alias numbers from its predecessor.

use bytes::{Buf, BufMut};
use remote_marshal::{Marshal, Result, Unmarshal};
use std::fmt;
use uuid::Uuid;

/// Object number of the activator object exported by an activation host
pub const ACTIVATOR_NUMBER: u64 = 1;

/// Address-space identifier (16 bytes)
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct SpaceId(pub Uuid);

impl SpaceId {
    /// Size of a space id in bytes
    pub const SIZE: usize = 16;

    /// The nil space shared by all well-known identities
    pub const WELL_KNOWN: SpaceId = SpaceId(Uuid::nil());

    /// Generate a random space id
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn is_well_known(&self) -> bool {
        self.0.is_nil()
    }
}

impl fmt::Debug for SpaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SpaceId({})", self.0)
    }
}

impl fmt::Display for SpaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Marshal for SpaceId {
    fn marshal<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        buf.put_slice(self.0.as_bytes());
        Ok(())
    }
}

impl Unmarshal for SpaceId {
    fn unmarshal<B: Buf>(buf: &mut B) -> Result<Self> {
        let bytes = <[u8; Self::SIZE]>::unmarshal(buf)?;
        Ok(Self(Uuid::from_bytes(bytes)))
    }
}

/// Identity of one exported object
///
/// Compared by value. Never reused within the lifetime of the runtime that
/// issued it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectIdentity {
    /// Object number within the space
    pub number: u64,
    /// Address space that issued the number
    pub space: SpaceId,
}

impl ObjectIdentity {
    /// Encoded size in bytes
    pub const SIZE: usize = 8 + SpaceId::SIZE;

    pub fn new(number: u64, space: SpaceId) -> Self {
        Self { number, space }
    }

    /// Identity in the nil space, agreed on out of band
    pub const fn well_known(number: u64) -> Self {
        Self {
            number,
            space: SpaceId::WELL_KNOWN,
        }
    }

    pub fn is_well_known(&self) -> bool {
        self.space.is_well_known()
    }
}

impl fmt::Debug for ObjectIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectIdentity({:016x}@{})", self.number, self.space)
    }
}

impl fmt::Display for ObjectIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_well_known() {
            write!(f, "well-known:{}", self.number)
        } else {
            write!(f, "{:016x}@{}", self.number, self.space)
        }
    }
}

impl Marshal for ObjectIdentity {
    fn marshal<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        buf.put_u64(self.number);
        self.space.marshal(buf)
    }
}

impl Unmarshal for ObjectIdentity {
    fn unmarshal<B: Buf>(buf: &mut B) -> Result<Self> {
        let number = u64::unmarshal(buf)?;
        let space = SpaceId::unmarshal(buf)?;
        Ok(Self { number, space })
    }
}
