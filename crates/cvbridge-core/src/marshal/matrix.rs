//! Matrix Marshaller.

use super::{checked_len, MarshalToHost};
use crate::error::{BridgeError, Result};
use crate::handle::{kind, Handle, HandlePool};
use crate::native::HandleKind;
use crate::types::MatrixValue;

impl MarshalToHost for Handle<'_, kind::Matrix> {
    type Host = MatrixValue;

    fn to_host(&self) -> Result<MatrixValue> {
        let api = self.api();
        // SAFETY: `self` is a live Matrix handle on `api`.
        let (raw_rows, raw_cols) = unsafe { api.matrix_shape(self.as_raw())? };
        let rows = checked_len(HandleKind::Matrix, "row count", raw_rows)?;
        let cols = checked_len(HandleKind::Matrix, "column count", raw_cols)?;
        let total = raw_rows.saturating_mul(raw_cols);
        checked_len(HandleKind::Matrix, "element count", total)?;

        let mut data = Vec::new();
        for r in 0..rows {
            for c in 0..cols {
                // SAFETY: (r, c) lies inside the shape the handle just reported.
                data.push(unsafe { api.matrix_at(self.as_raw(), r, c)? });
            }
        }
        MatrixValue::from_row_major(rows, cols, data).ok_or(BridgeError::ShapeMismatch {
            kind: HandleKind::Matrix,
            what: "element count",
            value: total,
        })
    }
}

/// Push a host matrix into a freshly allocated native matrix handle.
pub fn to_native<'n>(
    pool: &HandlePool<'n>,
    value: &MatrixValue,
) -> Result<Handle<'n, kind::Matrix>> {
    let handle = pool.create_matrix()?;
    // SAFETY: `handle` is a live Matrix handle on the pool's backend.
    unsafe {
        pool.api()
            .matrix_write(handle.as_raw(), value.rows(), value.cols(), value.as_slice())?;
    }
    Ok(handle)
}
