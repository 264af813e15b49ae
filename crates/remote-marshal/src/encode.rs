//! Marshaling trait

use crate::Result;
use bytes::BufMut;

/// Trait for types that can be written as call arguments or results
pub trait Marshal {
    /// Write this value to the buffer.
    fn marshal<B: BufMut>(&self, buf: &mut B) -> Result<()>;
}

impl<T: Marshal + ?Sized> Marshal for &T {
    fn marshal<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        (**self).marshal(buf)
    }
}
