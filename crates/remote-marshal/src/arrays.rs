//! Sequence types
//!
//! - `Vec<T>` / `[T]`: runtime-sized, transmitted with a `u32` count prefix
//! - `[T; N]`: fixed-size, just the elements (no count prefix)

use crate::strings::{get_len, put_len};
use crate::{Marshal, MarshalError, Result, Unmarshal};
use bytes::{Buf, BufMut};

impl<T: Marshal> Marshal for [T] {
    fn marshal<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        put_len(buf, self.len())?;
        for elem in self {
            elem.marshal(buf)?;
        }
        Ok(())
    }
}

impl<T: Marshal> Marshal for Vec<T> {
    fn marshal<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        self.as_slice().marshal(buf)
    }
}

impl<T: Unmarshal> Unmarshal for Vec<T> {
    fn unmarshal<B: Buf>(buf: &mut B) -> Result<Self> {
        let count = get_len(buf)?;
        // Bound the up-front allocation by what is actually buffered.
        let mut elements = Vec::with_capacity(count.min(buf.remaining()));
        for _ in 0..count {
            elements.push(T::unmarshal(buf)?);
        }
        Ok(elements)
    }
}

impl<T: Marshal, const N: usize> Marshal for [T; N] {
    fn marshal<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        for elem in self {
            elem.marshal(buf)?;
        }
        Ok(())
    }
}

impl<T: Unmarshal, const N: usize> Unmarshal for [T; N] {
    fn unmarshal<B: Buf>(buf: &mut B) -> Result<Self> {
        let mut elements = Vec::with_capacity(N);
        for _ in 0..N {
            elements.push(T::unmarshal(buf)?);
        }
        elements.try_into().map_err(|rest: Vec<T>| MarshalError::ArraySizeMismatch {
            expected: N,
            got: rest.len(),
        })
    }
}
