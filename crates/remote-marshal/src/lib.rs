//! Typed marshaling runtime for remote invocation
//!
//! This crate provides the codec used by `remoteref` to write call arguments
//! and read results. Values are written in their declared type order, so the
//! static type parameter at the call site plays the role of the declared type.
//!
//! # Wire Format
//!
//! - Integers and floats are big-endian at their natural width
//! - `bool` is one byte (0x00 = false, 0x01 = true)
//! - Strings and byte blobs carry a `u32` length prefix
//! - Sequences carry a `u32` element count followed by the elements
//! - `Option<T>` carries a one-byte presence tag
//! - Tuples are their members in order, with no framing
//!
//! ```
//! use remote_marshal::{from_bytes, to_bytes};
//!
//! let encoded = to_bytes(&(2i32, 3i32)).unwrap();
//! let (a, b): (i32, i32) = from_bytes(encoded).unwrap();
//! assert_eq!(a + b, 5);
//! ```

mod arrays;
mod decode;
mod encode;
mod error;
mod optional;
mod primitives;
mod strings;
mod tuples;

pub use decode::Unmarshal;
pub use encode::Marshal;
pub use error::{MarshalError, Result, MAX_SEQUENCE_ELEMENTS};

/// Re-export bytes for convenience
pub use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Marshal a value into a fresh buffer
pub fn to_bytes<T: Marshal + ?Sized>(value: &T) -> Result<Bytes> {
    let mut buf = BytesMut::new();
    value.marshal(&mut buf)?;
    Ok(buf.freeze())
}

/// Unmarshal a value, requiring that the buffer is consumed exactly
pub fn from_bytes<T: Unmarshal>(mut data: Bytes) -> Result<T> {
    let value = T::unmarshal(&mut data)?;
    if data.has_remaining() {
        return Err(MarshalError::TrailingBytes(data.remaining()));
    }
    Ok(value)
}

/// Ensure at least `needed` bytes remain in `buf`
#[inline]
pub(crate) fn require<B: Buf>(buf: &B, needed: usize) -> Result<()> {
    if buf.remaining() < needed {
        return Err(MarshalError::BufferUnderflow {
            needed,
            have: buf.remaining(),
        });
    }
    Ok(())
}
