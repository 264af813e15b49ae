//! String and byte blob types
//!
//! Wire format:
//! ```text
//! length: u32      # Byte length of the payload
//! bytes[length]    # UTF-8 text or raw bytes
//! ```

use crate::{require, Marshal, MarshalError, Result, Unmarshal, MAX_SEQUENCE_ELEMENTS};
use bytes::{Buf, BufMut, Bytes};

/// Write a length prefix, rejecting lengths the reader would refuse
pub(crate) fn put_len<B: BufMut>(buf: &mut B, len: usize) -> Result<()> {
    let requested = u32::try_from(len).unwrap_or(u32::MAX);
    if requested > MAX_SEQUENCE_ELEMENTS {
        return Err(MarshalError::LengthLimitExceeded {
            requested,
            limit: MAX_SEQUENCE_ELEMENTS,
        });
    }
    buf.put_u32(requested);
    Ok(())
}

/// Read a length prefix and make sure that many bytes follow
pub(crate) fn get_len<B: Buf>(buf: &mut B) -> Result<usize> {
    require(buf, 4)?;
    let len = buf.get_u32();
    if len > MAX_SEQUENCE_ELEMENTS {
        return Err(MarshalError::LengthLimitExceeded {
            requested: len,
            limit: MAX_SEQUENCE_ELEMENTS,
        });
    }
    Ok(len as usize)
}

impl Marshal for str {
    fn marshal<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        put_len(buf, self.len())?;
        buf.put_slice(self.as_bytes());
        Ok(())
    }
}

impl Marshal for String {
    fn marshal<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        self.as_str().marshal(buf)
    }
}

impl Unmarshal for String {
    fn unmarshal<B: Buf>(buf: &mut B) -> Result<Self> {
        let len = get_len(buf)?;
        require(buf, len)?;
        let mut data = vec![0u8; len];
        buf.copy_to_slice(&mut data);
        Ok(String::from_utf8(data)?)
    }
}

/// Opaque byte blob, copied without per-element framing
impl Marshal for Bytes {
    fn marshal<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        put_len(buf, self.len())?;
        buf.put_slice(self);
        Ok(())
    }
}

impl Unmarshal for Bytes {
    fn unmarshal<B: Buf>(buf: &mut B) -> Result<Self> {
        let len = get_len(buf)?;
        require(buf, len)?;
        Ok(buf.copy_to_bytes(len))
    }
}
