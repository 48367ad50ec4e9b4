//! Scalar/Primitive Marshaller.

use super::{checked_len, MarshalToHost};
use crate::error::Result;
use crate::handle::{kind, Handle};
use crate::native::HandleKind;

impl MarshalToHost for Handle<'_, kind::IntVector> {
    type Host = Vec<i32>;

    fn to_host(&self) -> Result<Vec<i32>> {
        let api = self.api();
        let raw = self.as_raw();
        // SAFETY: `self` is a live IntVector handle on `api`; indices stay
        // below the reported length.
        unsafe {
            let len = checked_len(HandleKind::IntVector, "length", api.int_vector_len(raw)?)?;
            (0..len).map(|i| api.int_vector_at(raw, i)).collect()
        }
    }
}

impl MarshalToHost for Handle<'_, kind::Flag> {
    type Host = bool;

    /// Any non-zero byte reads as `true`.
    fn to_host(&self) -> Result<bool> {
        // SAFETY: `self` is a live Flag handle.
        let byte = unsafe { self.api().flag_byte(self.as_raw())? };
        Ok(byte != 0)
    }
}
