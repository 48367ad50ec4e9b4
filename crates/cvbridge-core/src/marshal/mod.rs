//! Copy native handle contents into host values.
//!
//! Every read loop is driven by the lengths the native side reports; nothing
//! assumes fixed shapes. Marshalling always copies, so the source handle may
//! be released as soon as `to_host` returns.

pub mod matrix;
pub mod points;
pub mod scalar;

use crate::error::{BridgeError, Result};
use crate::native::HandleKind;

/// Conversion of a native handle into an owned host value.
pub trait MarshalToHost {
    type Host;

    fn to_host(&self) -> Result<Self::Host>;
}

/// Largest element count a native container can hold (its sizes are `int`).
pub const MAX_NATIVE_LEN: i64 = i32::MAX as i64;

/// Validate a native-reported length: negative or above [`MAX_NATIVE_LEN`]
/// is a [`BridgeError::ShapeMismatch`].
pub(crate) fn checked_len(kind: HandleKind, what: &'static str, value: i64) -> Result<usize> {
    if !(0..=MAX_NATIVE_LEN).contains(&value) {
        return Err(BridgeError::ShapeMismatch { kind, what, value });
    }
    usize::try_from(value).map_err(|_| BridgeError::ShapeMismatch { kind, what, value })
}
