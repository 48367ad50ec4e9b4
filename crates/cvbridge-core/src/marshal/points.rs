//! Point-Sequence Marshaller.
//!
//! Inner lengths are read per outer index; marker corner lists are usually
//! four points long but nothing here relies on it.

use super::{checked_len, MarshalToHost};
use crate::error::Result;
use crate::handle::{kind, Handle};
use crate::native::HandleKind;
use crate::types::{NestedPointSequence, Point3f, PointSequence};

impl MarshalToHost for Handle<'_, kind::Points> {
    type Host = PointSequence;

    fn to_host(&self) -> Result<PointSequence> {
        let api = self.api();
        let raw = self.as_raw();
        // SAFETY: `self` is a live PointSequence handle on `api`; indices stay
        // below the length it reports.
        unsafe {
            let len = checked_len(HandleKind::PointSequence, "length", api.points_len(raw)?)?;
            (0..len).map(|i| api.point_at(raw, i)).collect()
        }
    }
}

impl MarshalToHost for Handle<'_, kind::NestedPoints> {
    type Host = NestedPointSequence;

    fn to_host(&self) -> Result<NestedPointSequence> {
        let api = self.api();
        let raw = self.as_raw();
        let k = HandleKind::NestedPointSequence;
        // SAFETY: `self` is a live NestedPointSequence handle on `api`; every
        // index is bounded by a length the handle reported.
        unsafe {
            let outer = checked_len(k, "outer length", api.nested_len(raw)?)?;
            let mut out = Vec::new();
            for o in 0..outer {
                let inner = checked_len(k, "inner length", api.nested_inner_len(raw, o)?)?;
                let mut seq = Vec::new();
                for i in 0..inner {
                    seq.push(api.nested_point_at(raw, o, i)?);
                }
                out.push(seq);
            }
            Ok(out)
        }
    }
}

impl MarshalToHost for Handle<'_, kind::NestedPoints3> {
    type Host = Vec<Vec<Point3f>>;

    fn to_host(&self) -> Result<Vec<Vec<Point3f>>> {
        let api = self.api();
        let raw = self.as_raw();
        let k = HandleKind::NestedPoint3Sequence;
        // SAFETY: as for the 2D variant.
        unsafe {
            let outer = checked_len(k, "outer length", api.nested3_len(raw)?)?;
            (0..outer)
                .map(|o| {
                    let inner = checked_len(k, "inner length", api.nested3_inner_len(raw, o)?)?;
                    (0..inner).map(|i| api.nested3_point_at(raw, o, i)).collect()
                })
                .collect()
        }
    }
}
