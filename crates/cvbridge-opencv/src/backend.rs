use std::cell::RefCell;
use std::ffi::c_void;
use std::ptr::NonNull;
use std::time::Instant;

use cvbridge_core::geometry::rotation_vector_to_euler_degrees;
use cvbridge_core::{
    BoardSpec, BridgeError, HandleKind, ImageView, NativeApi, Point2f, Point3f, RawHandle, Result,
};
use opencv::core::{self as cv, Mat, Scalar, Size, TermCriteria, Vector, CV_64F};
use opencv::objdetect::{self, ArucoDetector, DetectorParameters, RefineParameters};
use opencv::prelude::*;
use opencv::{calib3d, imgproc};

use crate::config::OpenCvConfig;

/// Native storage behind one handle.
enum NativeObject {
    Matrix(Mat),
    Ints(Vector<i32>),
    Points(Vector<cv::Point2f>),
    Nested(Vector<Vector<cv::Point2f>>),
    Nested3(Vector<Vector<cv::Point3f>>),
    Flag(u8),
}

impl NativeObject {
    fn empty(kind: HandleKind) -> Self {
        match kind {
            HandleKind::Matrix => Self::Matrix(Mat::default()),
            HandleKind::IntVector => Self::Ints(Vector::new()),
            HandleKind::PointSequence => Self::Points(Vector::new()),
            HandleKind::NestedPointSequence => Self::Nested(Vector::new()),
            HandleKind::NestedPoint3Sequence => Self::Nested3(Vector::new()),
            HandleKind::Flag => Self::Flag(0),
        }
    }

    fn kind(&self) -> HandleKind {
        match self {
            Self::Matrix(_) => HandleKind::Matrix,
            Self::Ints(_) => HandleKind::IntVector,
            Self::Points(_) => HandleKind::PointSequence,
            Self::Nested(_) => HandleKind::NestedPointSequence,
            Self::Nested3(_) => HandleKind::NestedPoint3Sequence,
            Self::Flag(_) => HandleKind::Flag,
        }
    }
}

/// # Safety
/// `raw` must come from [`OpenCvBackend`]'s `create` and still be live.
unsafe fn object_at<'a>(raw: RawHandle) -> &'a mut NativeObject {
    &mut *raw.cast::<NativeObject>().as_ptr()
}

fn wrong_kind(expected: HandleKind, got: &NativeObject) -> BridgeError {
    BridgeError::native("handle", format!("expected {expected:?}, got {:?}", got.kind()))
}

/// Narrow a host size or index to the `int` OpenCV takes.
fn cv_int<T>(value: T, what: &str, op: &'static str) -> Result<i32>
where
    T: TryInto<i32> + Copy + std::fmt::Display,
{
    value.try_into().map_err(|_| {
        BridgeError::native(op, format!("{what} {value} exceeds the OpenCV int range"))
    })
}

trait CvResultExt<T> {
    fn during(self, op: &'static str) -> Result<T>;
}

impl<T> CvResultExt<T> for opencv::Result<T> {
    fn during(self, op: &'static str) -> Result<T> {
        self.map_err(|e| BridgeError::native(op, e.to_string()))
    }
}

/// [`NativeApi`] backed by the system OpenCV.
///
/// Handles point at boxed OpenCV containers on the Rust heap. The backend
/// keeps the last successful calibration so it can be served back by
/// `static_calibration`.
pub struct OpenCvBackend {
    config: OpenCvConfig,
    detector: ArucoDetector,
    last_calibration: RefCell<Option<(Mat, Mat)>>,
}

impl OpenCvBackend {
    pub fn new(config: OpenCvConfig) -> Result<Self> {
        let op = "create_backend";
        let dictionary =
            objdetect::get_predefined_dictionary(config.dictionary.predefined()).during(op)?;
        let params = DetectorParameters::default().during(op)?;
        let refine = RefineParameters::new_def().during(op)?;
        let detector = ArucoDetector::new(&dictionary, &params, refine).during(op)?;
        log::debug!("OpenCV backend ready (dictionary {})", config.dictionary);
        Ok(Self {
            config,
            detector,
            last_calibration: RefCell::new(None),
        })
    }

    pub fn config(&self) -> &OpenCvConfig {
        &self.config
    }

    unsafe fn mat<'a>(&self, raw: RawHandle) -> Result<&'a mut Mat> {
        match object_at(raw) {
            NativeObject::Matrix(m) => Ok(m),
            other => Err(wrong_kind(HandleKind::Matrix, other)),
        }
    }

    unsafe fn ints<'a>(&self, raw: RawHandle) -> Result<&'a mut Vector<i32>> {
        match object_at(raw) {
            NativeObject::Ints(v) => Ok(v),
            other => Err(wrong_kind(HandleKind::IntVector, other)),
        }
    }

    unsafe fn points<'a>(&self, raw: RawHandle) -> Result<&'a mut Vector<cv::Point2f>> {
        match object_at(raw) {
            NativeObject::Points(v) => Ok(v),
            other => Err(wrong_kind(HandleKind::PointSequence, other)),
        }
    }

    unsafe fn nested<'a>(&self, raw: RawHandle) -> Result<&'a mut Vector<Vector<cv::Point2f>>> {
        match object_at(raw) {
            NativeObject::Nested(v) => Ok(v),
            other => Err(wrong_kind(HandleKind::NestedPointSequence, other)),
        }
    }

    unsafe fn nested3<'a>(&self, raw: RawHandle) -> Result<&'a mut Vector<Vector<cv::Point3f>>> {
        match object_at(raw) {
            NativeObject::Nested3(v) => Ok(v),
            other => Err(wrong_kind(HandleKind::NestedPoint3Sequence, other)),
        }
    }

    unsafe fn flag<'a>(&self, raw: RawHandle) -> Result<&'a mut u8> {
        match object_at(raw) {
            NativeObject::Flag(b) => Ok(b),
            other => Err(wrong_kind(HandleKind::Flag, other)),
        }
    }

    /// RGBA pixels to an owned single-channel 8-bit image.
    fn gray(image: ImageView<'_>, op: &'static str) -> Result<Mat> {
        let rows = cv_int(image.height(), "image height", op)?;
        let cols = cv_int(image.width(), "image width", op)?;
        let row_bytes = cols
            .checked_mul(4)
            .ok_or_else(|| BridgeError::native(op, format!("image width {cols} is too wide")))?;
        let rgba = Mat::new_rows_cols_with_data(rows, row_bytes, image.as_bytes()).during(op)?;
        let rgba = rgba.reshape(4, rows).during(op)?;
        let mut gray = Mat::default();
        imgproc::cvt_color_def(&rgba, &mut gray, imgproc::COLOR_RGBA2GRAY).during(op)?;
        Ok(gray)
    }

    fn image_size(image: ImageView<'_>, op: &'static str) -> Result<Size> {
        Ok(Size::new(
            cv_int(image.width(), "image width", op)?,
            cv_int(image.height(), "image height", op)?,
        ))
    }

    /// Rows of a rotation-vector matrix as `[f64; 3]`.
    ///
    /// Accepts `N x 3`, `3 x 1`, `1 x 3` and 3-channel `N x 1` layouts.
    fn rotation_rows(src: &Mat, op: &'static str) -> Result<Vec<[f64; 3]>> {
        let flat = src.reshape(1, 0).during(op)?;
        let mut values = Mat::default();
        flat.convert_to_def(&mut values, CV_64F).during(op)?;

        let total = values.total();
        let rows = if values.cols() == 3 {
            usize::try_from(values.rows()).unwrap_or_default()
        } else if total == 3 {
            1
        } else {
            return Err(BridgeError::native(
                op,
                format!(
                    "rotation vectors must have 3 components, got {}x{}",
                    values.rows(),
                    values.cols()
                ),
            ));
        };
        let data = if values.is_continuous() {
            values.data_typed::<f64>().during(op)?.to_vec()
        } else {
            let mut packed = Mat::default();
            values.copy_to(&mut packed).during(op)?;
            packed.data_typed::<f64>().during(op)?.to_vec()
        };
        Ok(data
            .chunks_exact(3)
            .take(rows)
            .map(|c| [c[0], c[1], c[2]])
            .collect())
    }

    fn write_mat(
        dst: &mut Mat,
        rows: usize,
        cols: usize,
        data: &[f64],
        op: &'static str,
    ) -> Result<()> {
        if rows.checked_mul(cols) != Some(data.len()) {
            return Err(BridgeError::native(
                op,
                format!("{} values do not fill {rows}x{cols}", data.len()),
            ));
        }
        let mut out = Mat::new_rows_cols_with_default(
            cv_int(rows, "row count", op)?,
            cv_int(cols, "column count", op)?,
            CV_64F,
            Scalar::all(0.0),
        )
        .during(op)?;
        for (r, row) in data.chunks_exact(cols.max(1)).enumerate().take(rows) {
            for (c, value) in row.iter().enumerate() {
                *out.at_2d_mut::<f64>(cv_int(r, "row", op)?, cv_int(c, "column", op)?)
                    .during(op)? = *value;
            }
        }
        *dst = out;
        Ok(())
    }

    unsafe fn euler_into(
        &self,
        src: RawHandle,
        dst: RawHandle,
        single: bool,
        op: &'static str,
    ) -> Result<()> {
        let rows = Self::rotation_rows(self.mat(src)?, op)?;
        if single && rows.len() != 1 {
            return Err(BridgeError::native(
                op,
                format!("expected one rotation vector, got {}", rows.len()),
            ));
        }
        let angles: Vec<f64> = rows
            .into_iter()
            .flat_map(rotation_vector_to_euler_degrees)
            .collect();
        Self::write_mat(self.mat(dst)?, angles.len() / 3, 3, &angles, op)
    }
}

impl NativeApi for OpenCvBackend {
    fn name(&self) -> &'static str {
        "opencv"
    }

    fn create(&self, kind: HandleKind) -> Option<RawHandle> {
        let raw = Box::into_raw(Box::new(NativeObject::empty(kind)));
        NonNull::new(raw.cast::<c_void>())
    }

    unsafe fn destroy(&self, kind: HandleKind, raw: RawHandle) {
        let object = Box::from_raw(raw.cast::<NativeObject>().as_ptr());
        if object.kind() != kind {
            log::warn!("destroying {:?} handle {raw:p} as {kind:?}", object.kind());
        }
        drop(object);
    }

    unsafe fn matrix_shape(&self, mat: RawHandle) -> Result<(i64, i64)> {
        let m = self.mat(mat)?;
        if m.channels() != 1 {
            return Err(BridgeError::native(
                "matrix_shape",
                format!("{}-channel matrix", m.channels()),
            ));
        }
        Ok((i64::from(m.rows()), i64::from(m.cols())))
    }

    unsafe fn matrix_at(&self, mat: RawHandle, row: usize, col: usize) -> Result<f64> {
        let op = "matrix_at";
        let m = self.mat(mat)?;
        let (row, col) = (cv_int(row, "row", op)?, cv_int(col, "column", op)?);
        if m.typ() == CV_64F {
            return Ok(*m.at_2d::<f64>(row, col).during(op)?);
        }
        let mut converted = Mat::default();
        m.convert_to_def(&mut converted, CV_64F).during(op)?;
        Ok(*converted.at_2d::<f64>(row, col).during(op)?)
    }

    unsafe fn matrix_write(
        &self,
        mat: RawHandle,
        rows: usize,
        cols: usize,
        data: &[f64],
    ) -> Result<()> {
        Self::write_mat(self.mat(mat)?, rows, cols, data, "matrix_write")
    }

    unsafe fn int_vector_len(&self, vec: RawHandle) -> Result<i64> {
        Ok(self.ints(vec)?.len() as i64)
    }

    unsafe fn int_vector_at(&self, vec: RawHandle, index: usize) -> Result<i32> {
        self.ints(vec)?.get(index).during("int_vector_at")
    }

    unsafe fn points_len(&self, seq: RawHandle) -> Result<i64> {
        Ok(self.points(seq)?.len() as i64)
    }

    unsafe fn point_at(&self, seq: RawHandle, index: usize) -> Result<Point2f> {
        let p = self.points(seq)?.get(index).during("point_at")?;
        Ok(Point2f::new(p.x, p.y))
    }

    unsafe fn nested_len(&self, seq: RawHandle) -> Result<i64> {
        Ok(self.nested(seq)?.len() as i64)
    }

    unsafe fn nested_inner_len(&self, seq: RawHandle, outer: usize) -> Result<i64> {
        let inner = self.nested(seq)?.get(outer).during("nested_inner_len")?;
        Ok(inner.len() as i64)
    }

    unsafe fn nested_point_at(
        &self,
        seq: RawHandle,
        outer: usize,
        inner: usize,
    ) -> Result<Point2f> {
        let op = "nested_point_at";
        let p = self.nested(seq)?.get(outer).during(op)?.get(inner).during(op)?;
        Ok(Point2f::new(p.x, p.y))
    }

    unsafe fn nested3_len(&self, seq: RawHandle) -> Result<i64> {
        Ok(self.nested3(seq)?.len() as i64)
    }

    unsafe fn nested3_inner_len(&self, seq: RawHandle, outer: usize) -> Result<i64> {
        let inner = self.nested3(seq)?.get(outer).during("nested3_inner_len")?;
        Ok(inner.len() as i64)
    }

    unsafe fn nested3_point_at(
        &self,
        seq: RawHandle,
        outer: usize,
        inner: usize,
    ) -> Result<Point3f> {
        let op = "nested3_point_at";
        let p = self.nested3(seq)?.get(outer).during(op)?.get(inner).during(op)?;
        Ok(Point3f::new(p.x, p.y, p.z))
    }

    unsafe fn flag_byte(&self, flag: RawHandle) -> Result<u8> {
        Ok(*self.flag(flag)?)
    }

    unsafe fn find_chessboard_corners(
        &self,
        image: ImageView<'_>,
        board: &BoardSpec,
        found: RawHandle,
        image_points: RawHandle,
        object_points: RawHandle,
    ) -> Result<()> {
        let op = "find_chessboard_corners";
        let started = Instant::now();
        let gray = Self::gray(image, op)?;
        let pattern = Size::new(
            cv_int(board.corner_count_wide, "corner_count_wide", op)?,
            cv_int(board.corner_count_high, "corner_count_high", op)?,
        );

        let mut flags = 0;
        if self.config.adaptive_threshold {
            flags |= calib3d::CALIB_CB_ADAPTIVE_THRESH | calib3d::CALIB_CB_NORMALIZE_IMAGE;
        }
        if self.config.fast_check {
            flags |= calib3d::CALIB_CB_FAST_CHECK;
        }

        let mut corners = Vector::<cv::Point2f>::new();
        let hit =
            calib3d::find_chessboard_corners(&gray, pattern, &mut corners, flags).during(op)?;
        *self.flag(found)? = u8::from(hit);
        if !hit {
            log::trace!("{op}: no board ({:?})", started.elapsed());
            return Ok(());
        }

        if self.config.subpix_window > 0 {
            let win = cv_int(self.config.subpix_window, "subpix_window", op)?;
            let criteria =
                TermCriteria::new(cv::TermCriteria_COUNT + cv::TermCriteria_EPS, 30, 1e-3)
                    .during(op)?;
            imgproc::corner_sub_pix(
                &gray,
                &mut corners,
                Size::new(win, win),
                Size::new(-1, -1),
                criteria,
            )
            .during(op)?;
        }

        let board_points: Vector<cv::Point3f> = board
            .object_points()
            .into_iter()
            .map(|p| cv::Point3f::new(p.x, p.y, p.z))
            .collect();
        self.nested(image_points)?.push(corners);
        self.nested3(object_points)?.push(board_points);
        log::trace!("{op}: board found ({:?})", started.elapsed());
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
        let op = "calibrate_camera";
        let image_points = self.nested(image_points)?;
        let object_points = self.nested3(object_points)?;
        if image_points.is_empty() || image_points.len() != object_points.len() {
            return Err(BridgeError::native(
                op,
                format!(
                    "need matching non-empty views, got {} image and {} object",
                    image_points.len(),
                    object_points.len()
                ),
            ));
        }

        let mut camera = Mat::default();
        let mut dist = Mat::default();
        let mut rvecs = Vector::<Mat>::new();
        let mut tvecs = Vector::<Mat>::new();
        let rms = calib3d::calibrate_camera_def(
            &*object_points,
            &*image_points,
            Self::image_size(image, op)?,
            &mut camera,
            &mut dist,
            &mut rvecs,
            &mut tvecs,
        )
        .during(op)?;
        log::debug!("{op}: {} views, reprojection rms {rms:.4}", image_points.len());

        *self.mat(camera_matrix)? = camera.try_clone().during(op)?;
        *self.mat(dist_coeffs)? = dist.try_clone().during(op)?;
        *self.last_calibration.borrow_mut() = Some((camera, dist));
        Ok(())
    }

    unsafe fn static_calibration(
        &self,
        camera_matrix: RawHandle,
        dist_coeffs: RawHandle,
    ) -> Result<()> {
        let op = "static_calibration";
        let (camera, dist) = match &*self.last_calibration.borrow() {
            Some((camera, dist)) => (
                camera.try_clone().during(op)?,
                dist.try_clone().during(op)?,
            ),
            None => (Mat::default(), Mat::default()),
        };
        *self.mat(camera_matrix)? = camera;
        *self.mat(dist_coeffs)? = dist;
        Ok(())
    }

    unsafe fn rotation_vector_to_euler_angles(
        &self,
        rvec: RawHandle,
        euler: RawHandle,
    ) -> Result<()> {
        self.euler_into(rvec, euler, true, "rotation_vector_to_euler_angles")
    }

    unsafe fn rotation_vectors_to_euler_angles(
        &self,
        rvecs: RawHandle,
        euler: RawHandle,
    ) -> Result<()> {
        self.euler_into(rvecs, euler, false, "rotation_vectors_to_euler_angles")
    }

    unsafe fn detect_markers(
        &self,
        image: ImageView<'_>,
        ids: RawHandle,
        corners: RawHandle,
        rejected: RawHandle,
    ) -> Result<()> {
        let op = "detect_markers";
        let gray = Self::gray(image, op)?;
        let (corners, ids, rejected) =
            (self.nested(corners)?, self.ints(ids)?, self.nested(rejected)?);
        self.detector
            .detect_markers(&gray, corners, ids, rejected)
            .during(op)
    }
}
