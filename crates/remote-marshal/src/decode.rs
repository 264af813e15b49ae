//! Unmarshaling trait

use crate::Result;
use bytes::Buf;

/// Trait for types that can be read back as call arguments or results
pub trait Unmarshal: Sized {
    /// Read a value from the buffer, advancing past it.
    fn unmarshal<B: Buf>(buf: &mut B) -> Result<Self>;
}
