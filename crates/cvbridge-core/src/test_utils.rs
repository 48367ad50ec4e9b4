//! In-memory [`NativeApi`] for tests.
//!
//! `RecordingBackend` keeps every native object in a `Box` on the Rust heap,
//! counts each create/destroy, and panics on a double or foreign destroy so
//! lifecycle bugs fail loudly. Native operations return scripted outputs.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::ffi::c_void;
use std::ptr::NonNull;

use crate::error::{BridgeError, Result};
use crate::geometry::rotation_vector_to_euler_degrees;
use crate::handle::{kind, Handle};
use crate::image::ImageView;
use crate::native::{HandleKind, NativeApi, RawHandle};
use crate::types::{BoardSpec, MatrixValue, NestedPointSequence, Point2f, Point3f};

enum Object {
    Matrix(MatrixValue),
    Ints(Vec<i32>),
    Points(Vec<Point2f>),
    Nested(Vec<Vec<Point2f>>),
    Nested3(Vec<Vec<Point3f>>),
    Flag(u8),
}

impl Object {
    fn empty(kind: HandleKind) -> Self {
        match kind {
            HandleKind::Matrix => Self::Matrix(MatrixValue::default()),
            HandleKind::IntVector => Self::Ints(Vec::new()),
            HandleKind::PointSequence => Self::Points(Vec::new()),
            HandleKind::NestedPointSequence => Self::Nested(Vec::new()),
            HandleKind::NestedPoint3Sequence => Self::Nested3(Vec::new()),
            HandleKind::Flag => Self::Flag(0),
        }
    }
}

#[derive(Clone, Debug, Default)]
struct Script {
    chessboard_byte: u8,
    chessboard_corners: Option<Vec<Point2f>>,
    marker_ids: Vec<i32>,
    marker_corners: NestedPointSequence,
    rejected: NestedPointSequence,
    camera_matrix: Option<MatrixValue>,
    dist_coeffs: Option<MatrixValue>,
    failing_op: Option<&'static str>,
}

/// Recording, scriptable native backend.
#[derive(Default)]
pub struct RecordingBackend {
    live: RefCell<HashMap<usize, HandleKind>>,
    created: Cell<usize>,
    destroyed: Cell<usize>,
    created_by_kind: RefCell<HashMap<HandleKind, usize>>,
    fail_allocation: Cell<Option<HandleKind>>,
    length_override: Cell<Option<i64>>,
    script: RefCell<Script>,
    last_calibration: RefCell<Option<(MatrixValue, MatrixValue)>>,
    calls: RefCell<Vec<&'static str>>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handles created and not yet destroyed.
    pub fn live_count(&self) -> usize {
        self.live.borrow().len()
    }

    pub fn live_of(&self, kind: HandleKind) -> usize {
        self.live.borrow().values().filter(|k| **k == kind).count()
    }

    pub fn created(&self) -> usize {
        self.created.get()
    }

    pub fn created_of(&self, kind: HandleKind) -> usize {
        self.created_by_kind.borrow().get(&kind).copied().unwrap_or(0)
    }

    pub fn destroyed(&self) -> usize {
        self.destroyed.get()
    }

    /// Native operations invoked so far, in order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.borrow().clone()
    }

    /// Make the next `create` of `kind` return null.
    pub fn fail_allocation_of(&self, kind: HandleKind) {
        self.fail_allocation.set(Some(kind));
    }

    /// Make every length reader report `-1`.
    pub fn corrupt_lengths(&self, on: bool) {
        self.length_override.set(on.then_some(-1));
    }

    /// Make every length reader report `len`, whatever the handle holds.
    pub fn report_lengths(&self, len: i64) {
        self.length_override.set(Some(len));
    }

    /// Make the named native operation fail.
    pub fn fail_operation(&self, op: &'static str) {
        self.script.borrow_mut().failing_op = Some(op);
    }

    /// Byte written to the found flag, and optionally the image corners of
    /// each found view (defaults to the board grid scaled to pixels).
    pub fn script_chessboard(&self, found_byte: u8, corners: Option<Vec<Point2f>>) {
        let mut script = self.script.borrow_mut();
        script.chessboard_byte = found_byte;
        script.chessboard_corners = corners;
    }

    pub fn script_detection(
        &self,
        ids: Vec<i32>,
        corners: NestedPointSequence,
        rejected: NestedPointSequence,
    ) {
        let mut script = self.script.borrow_mut();
        script.marker_ids = ids;
        script.marker_corners = corners;
        script.rejected = rejected;
    }

    pub fn script_calibration(&self, camera_matrix: MatrixValue, dist_coeffs: MatrixValue) {
        let mut script = self.script.borrow_mut();
        script.camera_matrix = Some(camera_matrix);
        script.dist_coeffs = Some(dist_coeffs);
    }

    pub fn fill_points(&self, handle: &Handle<'_, kind::Points>, points: Vec<Point2f>) {
        // SAFETY: live handle of the matching kind.
        *unsafe { self.points_mut(handle.as_raw()) } = points;
    }

    pub fn fill_nested(&self, handle: &Handle<'_, kind::NestedPoints>, seqs: NestedPointSequence) {
        // SAFETY: live handle of the matching kind.
        *unsafe { self.nested_mut(handle.as_raw()) } = seqs;
    }

    pub fn fill_nested3(
        &self,
        handle: &Handle<'_, kind::NestedPoints3>,
        seqs: Vec<Vec<Point3f>>,
    ) {
        // SAFETY: live handle of the matching kind.
        *unsafe { self.nested3_mut(handle.as_raw()) } = seqs;
    }

    pub fn fill_ints(&self, handle: &Handle<'_, kind::IntVector>, ints: Vec<i32>) {
        // SAFETY: live handle of the matching kind.
        *unsafe { self.ints_mut(handle.as_raw()) } = ints;
    }

    pub fn set_flag(&self, handle: &Handle<'_, kind::Flag>, byte: u8) {
        // SAFETY: live handle of the matching kind.
        *unsafe { self.flag_mut(handle.as_raw()) } = byte;
    }

    pub fn fill_matrix(&self, handle: &Handle<'_, kind::Matrix>, value: MatrixValue) {
        // SAFETY: live handle of the matching kind.
        *unsafe { self.matrix_mut(handle.as_raw()) } = value;
    }

    fn record(&self, op: &'static str) -> Result<()> {
        self.calls.borrow_mut().push(op);
        if self.script.borrow().failing_op == Some(op) {
            return Err(BridgeError::native(op, "scripted failure"));
        }
        Ok(())
    }

    fn report_len(&self, len: usize) -> i64 {
        self.length_override.get().unwrap_or(len as i64)
    }

    unsafe fn object<'a>(&self, raw: RawHandle) -> &'a mut Object {
        let key = raw.as_ptr() as usize;
        assert!(
            self.live.borrow().contains_key(&key),
            "use of dead or foreign handle {raw:p}"
        );
        &mut *raw.cast::<Object>().as_ptr()
    }

    unsafe fn matrix_mut<'a>(&self, raw: RawHandle) -> &'a mut MatrixValue {
        match self.object(raw) {
            Object::Matrix(m) => m,
            _ => panic!("{raw:p} is not a Matrix handle"),
        }
    }

    unsafe fn ints_mut<'a>(&self, raw: RawHandle) -> &'a mut Vec<i32> {
        match self.object(raw) {
            Object::Ints(v) => v,
            _ => panic!("{raw:p} is not an IntVector handle"),
        }
    }

    unsafe fn points_mut<'a>(&self, raw: RawHandle) -> &'a mut Vec<Point2f> {
        match self.object(raw) {
            Object::Points(v) => v,
            _ => panic!("{raw:p} is not a PointSequence handle"),
        }
    }

    unsafe fn nested_mut<'a>(&self, raw: RawHandle) -> &'a mut Vec<Vec<Point2f>> {
        match self.object(raw) {
            Object::Nested(v) => v,
            _ => panic!("{raw:p} is not a NestedPointSequence handle"),
        }
    }

    unsafe fn nested3_mut<'a>(&self, raw: RawHandle) -> &'a mut Vec<Vec<Point3f>> {
        match self.object(raw) {
            Object::Nested3(v) => v,
            _ => panic!("{raw:p} is not a NestedPoint3Sequence handle"),
        }
    }

    unsafe fn flag_mut<'a>(&self, raw: RawHandle) -> &'a mut u8 {
        match self.object(raw) {
            Object::Flag(b) => b,
            _ => panic!("{raw:p} is not a Flag handle"),
        }
    }

    unsafe fn euler_rows(&self, src: RawHandle, dst: RawHandle, op: &'static str) -> Result<()> {
        let rvecs = self.matrix_mut(src).clone();
        if rvecs.cols() != 3 && rvecs.len() != 3 {
            return Err(BridgeError::native(op, "rotation vectors must have 3 components"));
        }
        let rows = if rvecs.cols() == 3 { rvecs.rows() } else { 1 };
        let mut data = Vec::with_capacity(rows * 3);
        for r in 0..rows {
            let v = if rvecs.cols() == 3 {
                rvecs.row(r).unwrap_or(&[0.0; 3]).to_vec()
            } else {
                rvecs.as_slice().to_vec()
            };
            data.extend(rotation_vector_to_euler_degrees([v[0], v[1], v[2]]));
        }
        *self.matrix_mut(dst) = MatrixValue::from_row_major(rows, 3, data)
            .ok_or_else(|| BridgeError::native(op, "euler buffer size"))?;
        Ok(())
    }
}

impl NativeApi for RecordingBackend {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn create(&self, kind: HandleKind) -> Option<RawHandle> {
        if self.fail_allocation.get() == Some(kind) {
            self.fail_allocation.set(None);
            return None;
        }
        let raw = Box::into_raw(Box::new(Object::empty(kind)));
        let raw = NonNull::new(raw.cast::<c_void>())?;
        self.live.borrow_mut().insert(raw.as_ptr() as usize, kind);
        self.created.set(self.created.get() + 1);
        *self.created_by_kind.borrow_mut().entry(kind).or_default() += 1;
        Some(raw)
    }

    unsafe fn destroy(&self, kind: HandleKind, raw: RawHandle) {
        let recorded = self.live.borrow_mut().remove(&(raw.as_ptr() as usize));
        match recorded {
            Some(k) if k == kind => {}
            Some(k) => panic!("destroying {k:?} handle {raw:p} as {kind:?}"),
            None => panic!("double destroy or foreign handle {raw:p}"),
        }
        self.destroyed.set(self.destroyed.get() + 1);
        drop(Box::from_raw(raw.cast::<Object>().as_ptr()));
    }

    unsafe fn matrix_shape(&self, mat: RawHandle) -> Result<(i64, i64)> {
        let m = self.matrix_mut(mat);
        Ok((self.report_len(m.rows()), self.report_len(m.cols())))
    }

    unsafe fn matrix_at(&self, mat: RawHandle, row: usize, col: usize) -> Result<f64> {
        self.matrix_mut(mat)
            .get(row, col)
            .ok_or_else(|| BridgeError::native("matrix_at", "index out of bounds"))
    }

    unsafe fn matrix_write(
        &self,
        mat: RawHandle,
        rows: usize,
        cols: usize,
        data: &[f64],
    ) -> Result<()> {
        *self.matrix_mut(mat) = MatrixValue::from_row_major(rows, cols, data.to_vec())
            .ok_or_else(|| BridgeError::native("matrix_write", "data does not match shape"))?;
        Ok(())
    }

    unsafe fn int_vector_len(&self, vec: RawHandle) -> Result<i64> {
        Ok(self.report_len(self.ints_mut(vec).len()))
    }

    unsafe fn int_vector_at(&self, vec: RawHandle, index: usize) -> Result<i32> {
        Ok(self.ints_mut(vec)[index])
    }

    unsafe fn points_len(&self, seq: RawHandle) -> Result<i64> {
        Ok(self.report_len(self.points_mut(seq).len()))
    }

    unsafe fn point_at(&self, seq: RawHandle, index: usize) -> Result<Point2f> {
        Ok(self.points_mut(seq)[index])
    }

    unsafe fn nested_len(&self, seq: RawHandle) -> Result<i64> {
        Ok(self.report_len(self.nested_mut(seq).len()))
    }

    unsafe fn nested_inner_len(&self, seq: RawHandle, outer: usize) -> Result<i64> {
        Ok(self.report_len(self.nested_mut(seq)[outer].len()))
    }

    unsafe fn nested_point_at(
        &self,
        seq: RawHandle,
        outer: usize,
        inner: usize,
    ) -> Result<Point2f> {
        Ok(self.nested_mut(seq)[outer][inner])
    }

    unsafe fn nested3_len(&self, seq: RawHandle) -> Result<i64> {
        Ok(self.report_len(self.nested3_mut(seq).len()))
    }

    unsafe fn nested3_inner_len(&self, seq: RawHandle, outer: usize) -> Result<i64> {
        Ok(self.report_len(self.nested3_mut(seq)[outer].len()))
    }

    unsafe fn nested3_point_at(
        &self,
        seq: RawHandle,
        outer: usize,
        inner: usize,
    ) -> Result<Point3f> {
        Ok(self.nested3_mut(seq)[outer][inner])
    }

    unsafe fn flag_byte(&self, flag: RawHandle) -> Result<u8> {
        Ok(*self.flag_mut(flag))
    }

    unsafe fn find_chessboard_corners(
        &self,
        _image: ImageView<'_>,
        board: &BoardSpec,
        found: RawHandle,
        image_points: RawHandle,
        object_points: RawHandle,
    ) -> Result<()> {
        self.record("find_chessboard_corners")?;
        let script = self.script.borrow().clone();
        *self.flag_mut(found) = script.chessboard_byte;
        if script.chessboard_byte != 0 {
            let corners = script.chessboard_corners.unwrap_or_else(|| {
                board
                    .object_points()
                    .iter()
                    .map(|p| Point2f::new(100.0 + p.x * 1000.0, 80.0 + p.y * 1000.0))
                    .collect()
            });
            self.nested_mut(image_points).push(corners);
            self.nested3_mut(object_points).push(board.object_points());
        }
        Ok(())
    }

    unsafe fn calibrate_camera(
        &self,
        image: ImageView<'_>,
        image_points: RawHandle,
        object_points: RawHandle,
        camera_matrix: RawHandle,
        dist_coeffs: RawHandle,
    ) -> Result<()> {
        self.record("calibrate_camera")?;
        let views = self.nested_mut(image_points).len();
        if views == 0 || views != self.nested3_mut(object_points).len() {
            return Err(BridgeError::native(
                "calibrate_camera",
                format!("need matching non-empty views, got {views}"),
            ));
        }
        let script = self.script.borrow().clone();
        let fx = f64::from(image.width());
        let camera = script.camera_matrix.unwrap_or_else(|| {
            MatrixValue::from_rows(&[
                [fx, 0.0, f64::from(image.width()) / 2.0],
                [0.0, fx, f64::from(image.height()) / 2.0],
                [0.0, 0.0, 1.0],
            ])
            .unwrap_or_default()
        });
        let dist = script
            .dist_coeffs
            .unwrap_or_else(|| MatrixValue::zeros(1, 5).unwrap_or_default());
        *self.matrix_mut(camera_matrix) = camera.clone();
        *self.matrix_mut(dist_coeffs) = dist.clone();
        *self.last_calibration.borrow_mut() = Some((camera, dist));
        Ok(())
    }

    unsafe fn static_calibration(
        &self,
        camera_matrix: RawHandle,
        dist_coeffs: RawHandle,
    ) -> Result<()> {
        self.record("static_calibration")?;
        let (camera, dist) = self.last_calibration.borrow().clone().unwrap_or_default();
        *self.matrix_mut(camera_matrix) = camera;
        *self.matrix_mut(dist_coeffs) = dist;
        Ok(())
    }

    unsafe fn rotation_vector_to_euler_angles(
        &self,
        rvec: RawHandle,
        euler: RawHandle,
    ) -> Result<()> {
        let op = "rotation_vector_to_euler_angles";
        self.record(op)?;
        if self.matrix_mut(rvec).len() != 3 {
            return Err(BridgeError::native(op, "expected exactly one rotation vector"));
        }
        self.euler_rows(rvec, euler, op)
    }

    unsafe fn rotation_vectors_to_euler_angles(
        &self,
        rvecs: RawHandle,
        euler: RawHandle,
    ) -> Result<()> {
        let op = "rotation_vectors_to_euler_angles";
        self.record(op)?;
        self.euler_rows(rvecs, euler, op)
    }

    unsafe fn detect_markers(
        &self,
        _image: ImageView<'_>,
        ids: RawHandle,
        corners: RawHandle,
        rejected: RawHandle,
    ) -> Result<()> {
        self.record("detect_markers")?;
        let script = self.script.borrow().clone();
        *self.ints_mut(ids) = script.marker_ids;
        *self.nested_mut(corners) = script.marker_corners;
        *self.nested_mut(rejected) = script.rejected;
        Ok(())
    }
}

impl Drop for RecordingBackend {
    fn drop(&mut self) {
        // Leaked handles are reported by the tests through `live_count`; free
        // their memory here so the test process stays clean.
        for (addr, _) in self.live.get_mut().drain() {
            // SAFETY: every key is a live `Box<Object>` created by `create`.
            unsafe { drop(Box::from_raw(addr as *mut Object)) };
        }
    }
}
