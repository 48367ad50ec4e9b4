use cvbridge_core::{
    kind, Handle, MarshalToHost, MatrixValue, NativeApi, NestedPointSequence, Point3f, Result,
};
use serde::{Deserialize, Serialize};

/// Output of one marker detection run.
///
/// Fully host-owned: every native handle used to build it has already been
/// released.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    /// One id per detected marker, aligned with `markers`.
    pub marker_ids: Vec<i32>,
    /// Corner points per detected marker.
    pub markers: NestedPointSequence,
    /// Corner points per rejected candidate.
    pub rejected_candidates: NestedPointSequence,
}

impl DetectionResult {
    pub fn is_empty(&self) -> bool {
        self.marker_ids.is_empty()
    }

    /// `(id, corners)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (i32, &[cvbridge_core::Point2f])> + '_ {
        self.marker_ids
            .iter()
            .copied()
            .zip(self.markers.iter().map(Vec::as_slice))
    }
}

/// Host-only part of a calibration, suitable for persisting.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationData {
    pub camera_matrix: MatrixValue,
    pub distortion_coefficients: MatrixValue,
}

/// Output of a calibration.
///
/// The host values are copies. The two handles are *transferred* to the
/// caller so they can feed later native calls; they are released when this
/// value (or the handle moved out of it) is dropped.
#[derive(Debug)]
pub struct CalibrationResult<'n> {
    /// Copied out of `distortion_coefficients_handle`; `1 x K` or `K x 1`.
    pub distortion_coefficients: MatrixValue,
    /// Copied out of `camera_matrix_handle`; `3 x 3` for a real calibration.
    pub camera_matrix: MatrixValue,
    /// Owned by the caller.
    pub distortion_coefficients_handle: Handle<'n, kind::Matrix>,
    /// Owned by the caller.
    pub camera_matrix_handle: Handle<'n, kind::Matrix>,
}

impl<'n> CalibrationResult<'n> {
    /// Marshal both matrices and keep their handles.
    pub(crate) fn assemble(
        camera_matrix_handle: Handle<'n, kind::Matrix>,
        distortion_coefficients_handle: Handle<'n, kind::Matrix>,
    ) -> Result<Self> {
        Ok(Self {
            distortion_coefficients: distortion_coefficients_handle.to_host()?,
            camera_matrix: camera_matrix_handle.to_host()?,
            distortion_coefficients_handle,
            camera_matrix_handle,
        })
    }

    pub fn data(&self) -> CalibrationData {
        CalibrationData {
            camera_matrix: self.camera_matrix.clone(),
            distortion_coefficients: self.distortion_coefficients.clone(),
        }
    }

    /// Drop the handles and keep only the host values.
    pub fn into_data(self) -> CalibrationData {
        CalibrationData {
            camera_matrix: self.camera_matrix,
            distortion_coefficients: self.distortion_coefficients,
        }
    }

    /// `(camera_matrix_handle, distortion_coefficients_handle)`.
    pub fn into_handles(self) -> (Handle<'n, kind::Matrix>, Handle<'n, kind::Matrix>) {
        (self.camera_matrix_handle, self.distortion_coefficients_handle)
    }
}

/// Image-space and board-space point stores shared between successive
/// chessboard searches and consumed by one calibration.
#[derive(Debug)]
pub struct CornerAccumulator<'n> {
    pub(crate) image_points: Handle<'n, kind::NestedPoints>,
    pub(crate) object_points: Handle<'n, kind::NestedPoints3>,
}

impl<'n> CornerAccumulator<'n> {
    /// Adopt an existing pair of point handles.
    pub fn from_handles(
        image_points: Handle<'n, kind::NestedPoints>,
        object_points: Handle<'n, kind::NestedPoints3>,
    ) -> Self {
        Self {
            image_points,
            object_points,
        }
    }

    /// Number of accumulated views.
    pub fn view_count(&self) -> Result<usize> {
        Ok(self.image_points.to_host()?.len())
    }

    /// Copy of the image-space corners, one sequence per view.
    pub fn image_points(&self) -> Result<NestedPointSequence> {
        self.image_points.to_host()
    }

    /// Copy of the board-space corners, one sequence per view.
    pub fn object_points(&self) -> Result<Vec<Vec<Point3f>>> {
        self.object_points.to_host()
    }

    pub fn into_handles(self) -> (Handle<'n, kind::NestedPoints>, Handle<'n, kind::NestedPoints3>) {
        (self.image_points, self.object_points)
    }

    pub(crate) fn ensure_owned_by(&self, api: &dyn NativeApi) -> Result<()> {
        self.image_points.ensure_owned_by(api)?;
        self.object_points.ensure_owned_by(api)
    }
}
