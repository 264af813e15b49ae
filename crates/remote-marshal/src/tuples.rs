//! Tuples carry argument lists: each member is written in declared order.

use crate::{Marshal, Result, Unmarshal};
use bytes::{Buf, BufMut};

macro_rules! impl_marshal_tuple {
    ($($name:ident),+) => {
        impl<$($name: Marshal),+> Marshal for ($($name,)+) {
            #[allow(non_snake_case)]
            fn marshal<BM: BufMut>(&self, buf: &mut BM) -> Result<()> {
                let ($($name,)+) = self;
                $($name.marshal(buf)?;)+
                Ok(())
            }
        }

        impl<$($name: Unmarshal),+> Unmarshal for ($($name,)+) {
            fn unmarshal<BU: Buf>(buf: &mut BU) -> Result<Self> {
                Ok(($($name::unmarshal(buf)?,)+))
            }
        }
    };
}

impl_marshal_tuple!(A);
impl_marshal_tuple!(A, B);
impl_marshal_tuple!(A, B, C);
impl_marshal_tuple!(A, B, C, D);
impl_marshal_tuple!(A, B, C, D, E);
impl_marshal_tuple!(A, B, C, D, E, F);
impl_marshal_tuple!(A, B, C, D, E, F, G);
impl_marshal_tuple!(A, B, C, D, E, F, G, H);
