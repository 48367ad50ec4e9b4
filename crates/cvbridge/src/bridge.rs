//! Calibration/Detection Orchestrator.
//!
//! Each operation allocates its output handles, runs exactly one native call,
//! marshals the outputs and releases every handle that is not part of the
//! returned value. Early returns release through `Drop`, so a failing native
//! call or marshaller never leaks.

use std::time::Instant;

use cvbridge_core::{
    kind, marshal, BoardSpec, BridgeError, Handle, HandlePool, ImageView, MarshalToHost,
    MatrixValue, NativeApi, Result,
};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::result::{CalibrationResult, CornerAccumulator, DetectionResult};

/// Runs calibration and detection on one native backend.
///
/// Single-threaded: handles are not reentrant, so one `CvBridge` (and its
/// handles) must not be shared across threads.
#[derive(Debug, Clone, Copy)]
pub struct CvBridge<'n> {
    pool: HandlePool<'n>,
}

impl<'n> CvBridge<'n> {
    pub fn new(api: &'n dyn NativeApi) -> Self {
        Self {
            pool: HandlePool::new(api),
        }
    }

    #[inline]
    pub fn pool(&self) -> HandlePool<'n> {
        self.pool
    }

    #[inline]
    pub fn backend_name(&self) -> &'static str {
        self.api().name()
    }

    #[inline]
    fn api(&self) -> &'n dyn NativeApi {
        self.pool.api()
    }

    /// Allocate an empty image-point/object-point pair owned by the caller.
    pub fn corner_accumulator(&self) -> Result<CornerAccumulator<'n>> {
        Ok(CornerAccumulator {
            image_points: self.pool.create_nested_point_sequence()?,
            object_points: self.pool.create_nested_point3_sequence()?,
        })
    }

    /// Search `image` for the chessboard and append the view to `points` when found.
    ///
    /// Returns the native found flag. "Not found" is `Ok(false)`.
    #[cfg_attr(
        feature = "tracing",
        instrument(
            level = "info",
            skip(self, image, board, points),
            fields(width = image.width(), height = image.height())
        )
    )]
    pub fn find_chessboard_corners(
        &self,
        image: ImageView<'_>,
        board: &BoardSpec,
        points: &mut CornerAccumulator<'n>,
    ) -> Result<bool> {
        points.ensure_owned_by(self.api())?;
        let started = Instant::now();

        let found_flag = self.pool.create_flag()?;
        // SAFETY: all three handles are live, of the expected kinds, and were
        // created on this backend.
        unsafe {
            self.api().find_chessboard_corners(
                image,
                board,
                found_flag.as_raw(),
                points.image_points.as_raw(),
                points.object_points.as_raw(),
            )?;
        }
        let found = found_flag.to_host()?;
        found_flag.destroy();

        log::debug!(
            "find_chessboard_corners took {:.1} ms (found: {found})",
            started.elapsed().as_secs_f64() * 1e3
        );
        Ok(found)
    }

    /// Single-image form: allocates the point stores and hands them back.
    pub fn find_chessboard_corners_owned(
        &self,
        image: ImageView<'_>,
        board: &BoardSpec,
    ) -> Result<(bool, CornerAccumulator<'n>)> {
        let mut points = self.corner_accumulator()?;
        let found = self.find_chessboard_corners(image, board, &mut points)?;
        Ok((found, points))
    }

    /// Calibrate from the accumulated views.
    ///
    /// `points` is consumed: its handles are released right after the native
    /// call. The two output matrix handles are transferred to the caller inside
    /// the result.
    #[cfg_attr(
        feature = "tracing",
        instrument(
            level = "info",
            skip(self, image, points),
            fields(width = image.width(), height = image.height())
        )
    )]
    pub fn calibrate_camera(
        &self,
        image: ImageView<'_>,
        points: CornerAccumulator<'n>,
    ) -> Result<CalibrationResult<'n>> {
        points.ensure_owned_by(self.api())?;
        let started = Instant::now();

        let dist_coeffs = self.pool.create_matrix()?;
        let camera_matrix = self.pool.create_matrix()?;
        // SAFETY: live handles of the expected kinds on this backend.
        unsafe {
            self.api().calibrate_camera(
                image,
                points.image_points.as_raw(),
                points.object_points.as_raw(),
                camera_matrix.as_raw(),
                dist_coeffs.as_raw(),
            )?;
        }
        drop(points);

        let result = CalibrationResult::assemble(camera_matrix, dist_coeffs)?;
        log::debug!(
            "calibrate_camera took {:.1} ms (camera {:?}, distortion {:?})",
            started.elapsed().as_secs_f64() * 1e3,
            result.camera_matrix.shape(),
            result.distortion_coefficients.shape()
        );
        Ok(result)
    }

    /// Accumulate every view in which the board is found and calibrate.
    ///
    /// Returns `Ok(None)` when the board was found in none of them. The last
    /// view in which the board was found is passed to the calibration call.
    pub fn calibrate_from_views<'i>(
        &self,
        views: impl IntoIterator<Item = ImageView<'i>>,
        board: &BoardSpec,
    ) -> Result<Option<CalibrationResult<'n>>> {
        let mut points = self.corner_accumulator()?;
        let mut last_found = None;
        let mut total = 0usize;
        for view in views {
            total += 1;
            if self.find_chessboard_corners(view, board, &mut points)? {
                last_found = Some(view);
            }
        }
        let Some(view) = last_found else {
            log::info!("chessboard not found in any of {total} views");
            return Ok(None);
        };
        log::info!(
            "calibrating from {} of {total} views",
            points.view_count()?
        );
        self.calibrate_camera(view, points).map(Some)
    }

    /// Calibration state the backend already holds, e.g. from an earlier run.
    pub fn static_calibration_data(&self) -> Result<CalibrationResult<'n>> {
        let dist_coeffs = self.pool.create_matrix()?;
        let camera_matrix = self.pool.create_matrix()?;
        // SAFETY: live Matrix handles on this backend.
        unsafe {
            self.api()
                .static_calibration(camera_matrix.as_raw(), dist_coeffs.as_raw())?;
        }
        CalibrationResult::assemble(camera_matrix, dist_coeffs)
    }

    /// Euler angles (degrees) of one rotation vector held natively.
    pub fn rotation_vector_to_euler_angles(
        &self,
        rvec: &Handle<'_, kind::Matrix>,
    ) -> Result<MatrixValue> {
        rvec.ensure_owned_by(self.api())?;
        let euler = self.pool.create_matrix()?;
        // SAFETY: both are live Matrix handles on this backend.
        unsafe {
            self.api()
                .rotation_vector_to_euler_angles(rvec.as_raw(), euler.as_raw())?;
        }
        let angles = euler.to_host()?;
        euler.destroy();
        Ok(angles)
    }

    /// Euler angles (degrees) of an `N x 3` batch of rotation vectors held natively.
    pub fn rotation_vectors_to_euler_angles(
        &self,
        rvecs: &Handle<'_, kind::Matrix>,
    ) -> Result<MatrixValue> {
        rvecs.ensure_owned_by(self.api())?;
        let euler = self.pool.create_matrix()?;
        // SAFETY: both are live Matrix handles on this backend.
        unsafe {
            self.api()
                .rotation_vectors_to_euler_angles(rvecs.as_raw(), euler.as_raw())?;
        }
        let angles = euler.to_host()?;
        euler.destroy();
        Ok(angles)
    }

    /// Push host rotation vectors (`N x 3`) across and convert them.
    pub fn euler_angles_of(&self, rvecs: &MatrixValue) -> Result<MatrixValue> {
        let rvecs = marshal::matrix::to_native(&self.pool, rvecs)?;
        self.rotation_vectors_to_euler_angles(&rvecs)
    }

    /// Detect fiducial markers in `image`.
    ///
    /// Self-contained: all three output handles are released before return.
    #[cfg_attr(
        feature = "tracing",
        instrument(
            level = "info",
            skip(self, image),
            fields(width = image.width(), height = image.height())
        )
    )]
    pub fn detect_markers(&self, image: ImageView<'_>) -> Result<DetectionResult> {
        let started = Instant::now();

        let ids = self.pool.create_int_vector()?;
        let corners = self.pool.create_nested_point_sequence()?;
        let rejected = self.pool.create_nested_point_sequence()?;
        // SAFETY: live handles of the expected kinds on this backend.
        unsafe {
            self.api()
                .detect_markers(image, ids.as_raw(), corners.as_raw(), rejected.as_raw())?;
        }

        let result = DetectionResult {
            marker_ids: ids.to_host()?,
            markers: corners.to_host()?,
            rejected_candidates: rejected.to_host()?,
        };
        ids.destroy();
        corners.destroy();
        rejected.destroy();

        if result.marker_ids.len() != result.markers.len() {
            return Err(BridgeError::CountMismatch {
                what: "marker ids and marker corners",
                left: result.marker_ids.len(),
                right: result.markers.len(),
            });
        }

        log::debug!(
            "detect_markers took {:.1} ms ({} markers, {} rejected)",
            started.elapsed().as_secs_f64() * 1e3,
            result.marker_ids.len(),
            result.rejected_candidates.len()
        );
        Ok(result)
    }
}
