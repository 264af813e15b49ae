//! Nullable and boxed values
//!
//! `Option<T>` is the unique-pointer case: a presence tag (0x00 = null,
//! 0x01 = present) followed by the referent when present. `Box<T>` is the
//! reference-pointer case and is transmitted inline with no tag.

use crate::{require, Marshal, MarshalError, Result, Unmarshal};
use bytes::{Buf, BufMut};

impl<T: Marshal> Marshal for Option<T> {
    fn marshal<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        match self {
            Some(value) => {
                buf.put_u8(1);
                value.marshal(buf)
            }
            None => {
                buf.put_u8(0);
                Ok(())
            }
        }
    }
}

impl<T: Unmarshal> Unmarshal for Option<T> {
    fn unmarshal<B: Buf>(buf: &mut B) -> Result<Self> {
        require(buf, 1)?;
        match buf.get_u8() {
            0 => Ok(None),
            1 => Ok(Some(T::unmarshal(buf)?)),
            tag => Err(MarshalError::InvalidTag { type_name: "Option", tag }),
        }
    }
}

impl<T: Marshal + ?Sized> Marshal for Box<T> {
    fn marshal<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        (**self).marshal(buf)
    }
}

impl<T: Unmarshal> Unmarshal for Box<T> {
    fn unmarshal<B: Buf>(buf: &mut B) -> Result<Self> {
        T::unmarshal(buf).map(Box::new)
    }
}
