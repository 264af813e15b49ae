//! Primitive type implementations
//!
//! | Declared type | Rust Type | Size |
//! |---------------|-----------|------|
//! | boolean       | bool      | 1    |
//! | byte          | i8 / u8   | 1    |
//! | short         | i16 / u16 | 2    |
//! | int           | i32 / u32 | 4    |
//! | long          | i64 / u64 | 8    |
//! | float         | f32       | 4    |
//! | double        | f64       | 8    |
//! | void          | ()        | 0    |

use crate::{require, Marshal, MarshalError, Result, Unmarshal};
use bytes::{Buf, BufMut};
use std::convert::Infallible;

macro_rules! impl_marshal_primitive {
    ($ty:ty, $size:expr, $put:ident, $get:ident) => {
        impl Marshal for $ty {
            fn marshal<B: BufMut>(&self, buf: &mut B) -> Result<()> {
                buf.$put(*self);
                Ok(())
            }
        }

        impl Unmarshal for $ty {
            fn unmarshal<B: Buf>(buf: &mut B) -> Result<Self> {
                require(buf, $size)?;
                Ok(buf.$get())
            }
        }
    };
}

impl_marshal_primitive!(u8, 1, put_u8, get_u8);
impl_marshal_primitive!(i8, 1, put_i8, get_i8);
impl_marshal_primitive!(u16, 2, put_u16, get_u16);
impl_marshal_primitive!(i16, 2, put_i16, get_i16);
impl_marshal_primitive!(u32, 4, put_u32, get_u32);
impl_marshal_primitive!(i32, 4, put_i32, get_i32);
impl_marshal_primitive!(u64, 8, put_u64, get_u64);
impl_marshal_primitive!(i64, 8, put_i64, get_i64);
impl_marshal_primitive!(f32, 4, put_f32, get_f32);
impl_marshal_primitive!(f64, 8, put_f64, get_f64);

impl Marshal for bool {
    fn marshal<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        buf.put_u8(u8::from(*self));
        Ok(())
    }
}

impl Unmarshal for bool {
    fn unmarshal<B: Buf>(buf: &mut B) -> Result<Self> {
        require(buf, 1)?;
        match buf.get_u8() {
            0 => Ok(false),
            1 => Ok(true),
            tag => Err(MarshalError::InvalidTag { type_name: "bool", tag }),
        }
    }
}

/// `void` results write nothing
impl Marshal for () {
    fn marshal<B: BufMut>(&self, _buf: &mut B) -> Result<()> {
        Ok(())
    }
}

impl Unmarshal for () {
    fn unmarshal<B: Buf>(_buf: &mut B) -> Result<Self> {
        Ok(())
    }
}

/// Methods that declare no error use `Infallible`; it never appears on the wire.
impl Marshal for Infallible {
    fn marshal<B: BufMut>(&self, _buf: &mut B) -> Result<()> {
        match *self {}
    }
}

impl Unmarshal for Infallible {
    fn unmarshal<B: Buf>(_buf: &mut B) -> Result<Self> {
        Err(MarshalError::custom("no value of an uninhabited type can be decoded"))
    }
}
