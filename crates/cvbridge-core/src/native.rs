//! The call contract every native computer-vision backend implements.
//!
//! The host pre-allocates every output handle and passes it in; the native
//! side only ever populates handles it was given. Backends never hand back a
//! host-visible allocation of their own.
//!
//! # Safety contract
//!
//! Every `unsafe` method below takes one or more [`RawHandle`]s. Callers must
//! guarantee that each one was returned by [`NativeApi::create`] on the *same*
//! backend with the kind the method expects, and has not been passed to
//! [`NativeApi::destroy`] yet. No method may be called concurrently on the
//! same handle. The safe [`crate::Handle`] wrapper upholds all of this.

use std::ffi::c_void;
use std::ptr::NonNull;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::image::ImageView;
use crate::types::{BoardSpec, Point2f, Point3f};

/// Opaque reference to backend-owned heap memory.
pub type RawHandle = NonNull<c_void>;

/// What a native handle points at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HandleKind {
    /// 2D `f64` matrix.
    Matrix,
    /// Flat sequence of `i32`.
    IntVector,
    /// Flat sequence of 2D points.
    PointSequence,
    /// Sequence of sequences of 2D points.
    NestedPointSequence,
    /// Sequence of sequences of 3D points.
    NestedPoint3Sequence,
    /// Single byte; non-zero means true.
    Flag,
}

/// Abstract native computer-vision library.
///
/// Lengths are reported as `i64` so that a misbehaving backend can be
/// detected instead of silently wrapping.
pub trait NativeApi {
    /// Short backend name for logs and reports.
    fn name(&self) -> &'static str;

    /// Allocate an empty native object of `kind`. `None` means allocation failed.
    fn create(&self, kind: HandleKind) -> Option<RawHandle>;

    /// Release a handle.
    ///
    /// # Safety
    /// `raw` must be live and of `kind` (see the module docs). It is invalid afterwards.
    unsafe fn destroy(&self, kind: HandleKind, raw: RawHandle);

    /// `(rows, cols)` of a matrix handle.
    ///
    /// # Safety
    /// `mat` must be a live `Matrix` handle.
    unsafe fn matrix_shape(&self, mat: RawHandle) -> Result<(i64, i64)>;

    /// # Safety
    /// `mat` must be a live `Matrix` handle and `(row, col)` inside its shape.
    unsafe fn matrix_at(&self, mat: RawHandle, row: usize, col: usize) -> Result<f64>;

    /// Replace the contents of a matrix handle with `rows x cols` row-major data.
    ///
    /// # Safety
    /// `mat` must be a live `Matrix` handle.
    unsafe fn matrix_write(&self, mat: RawHandle, rows: usize, cols: usize, data: &[f64])
        -> Result<()>;

    /// # Safety
    /// `vec` must be a live `IntVector` handle.
    unsafe fn int_vector_len(&self, vec: RawHandle) -> Result<i64>;

    /// # Safety
    /// `vec` must be a live `IntVector` handle and `index` in bounds.
    unsafe fn int_vector_at(&self, vec: RawHandle, index: usize) -> Result<i32>;

    /// # Safety
    /// `seq` must be a live `PointSequence` handle.
    unsafe fn points_len(&self, seq: RawHandle) -> Result<i64>;

    /// # Safety
    /// `seq` must be a live `PointSequence` handle and `index` in bounds.
    unsafe fn point_at(&self, seq: RawHandle, index: usize) -> Result<Point2f>;

    /// # Safety
    /// `seq` must be a live `NestedPointSequence` handle.
    unsafe fn nested_len(&self, seq: RawHandle) -> Result<i64>;

    /// # Safety
    /// `seq` must be a live `NestedPointSequence` handle and `outer` in bounds.
    unsafe fn nested_inner_len(&self, seq: RawHandle, outer: usize) -> Result<i64>;

    /// # Safety
    /// `seq` must be a live `NestedPointSequence` handle and both indices in bounds.
    unsafe fn nested_point_at(&self, seq: RawHandle, outer: usize, inner: usize)
        -> Result<Point2f>;

    /// # Safety
    /// `seq` must be a live `NestedPoint3Sequence` handle.
    unsafe fn nested3_len(&self, seq: RawHandle) -> Result<i64>;

    /// # Safety
    /// `seq` must be a live `NestedPoint3Sequence` handle and `outer` in bounds.
    unsafe fn nested3_inner_len(&self, seq: RawHandle, outer: usize) -> Result<i64>;

    /// # Safety
    /// `seq` must be a live `NestedPoint3Sequence` handle and both indices in bounds.
    unsafe fn nested3_point_at(&self, seq: RawHandle, outer: usize, inner: usize)
        -> Result<Point3f>;

    /// # Safety
    /// `flag` must be a live `Flag` handle.
    unsafe fn flag_byte(&self, flag: RawHandle) -> Result<u8>;

    /// Look for the chessboard in `image`.
    ///
    /// Writes the found byte into `found`. When found, appends one view of
    /// image corners to `image_points` and the matching board corners to
    /// `object_points`.
    ///
    /// # Safety
    /// `found` must be a live `Flag`, `image_points` a live `NestedPointSequence`
    /// and `object_points` a live `NestedPoint3Sequence`.
    unsafe fn find_chessboard_corners(
        &self,
        image: ImageView<'_>,
        board: &BoardSpec,
        found: RawHandle,
        image_points: RawHandle,
        object_points: RawHandle,
    ) -> Result<()>;

    /// Calibrate from accumulated views, filling `camera_matrix` and `dist_coeffs`.
    ///
    /// # Safety
    /// Point handles as in [`NativeApi::find_chessboard_corners`]; both outputs
    /// must be live `Matrix` handles.
    unsafe fn calibrate_camera(
        &self,
        image: ImageView<'_>,
        image_points: RawHandle,
        object_points: RawHandle,
        camera_matrix: RawHandle,
        dist_coeffs: RawHandle,
    ) -> Result<()>;

    /// Fill both matrices with calibration state the backend already holds.
    ///
    /// # Safety
    /// Both must be live `Matrix` handles.
    unsafe fn static_calibration(&self, camera_matrix: RawHandle, dist_coeffs: RawHandle)
        -> Result<()>;

    /// Convert one rotation vector (3 elements) into Euler angles.
    ///
    /// # Safety
    /// Both must be live `Matrix` handles.
    unsafe fn rotation_vector_to_euler_angles(&self, rvec: RawHandle, euler: RawHandle)
        -> Result<()>;

    /// Convert an `N x 3` batch of rotation vectors into an `N x 3` batch of Euler angles.
    ///
    /// # Safety
    /// Both must be live `Matrix` handles.
    unsafe fn rotation_vectors_to_euler_angles(&self, rvecs: RawHandle, euler: RawHandle)
        -> Result<()>;

    /// Detect fiducial markers.
    ///
    /// # Safety
    /// `ids` must be a live `IntVector`; `corners` and `rejected` live
    /// `NestedPointSequence` handles.
    unsafe fn detect_markers(
        &self,
        image: ImageView<'_>,
        ids: RawHandle,
        corners: RawHandle,
        rejected: RawHandle,
    ) -> Result<()>;
}
