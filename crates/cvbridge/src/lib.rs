//! Camera calibration and fiducial marker detection through a native
//! computer-vision library.
//!
//! This crate provides:
//! - [`CvBridge`], which sequences native calls, owns intermediate handles and
//!   assembles [`DetectionResult`] / [`CalibrationResult`] values,
//! - JSON config and report types in [`io`],
//! - (feature `opencv`) [`default_backend`], the OpenCV implementation of
//!   [`NativeApi`](cvbridge_core::NativeApi) selected at build time.
//!
//! ## Quickstart
//!
//! ```no_run
//! # #[cfg(feature = "opencv")]
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use cvbridge::{CvBridge, ImageView, Rgba8};
//!
//! let backend = cvbridge::default_backend()?;
//! let bridge = CvBridge::new(&backend);
//!
//! let pixels = vec![Rgba8::gray(255); 640 * 480];
//! let image = ImageView::new(640, 480, &pixels)?;
//! let markers = bridge.detect_markers(image)?;
//! println!("found {} markers", markers.marker_ids.len());
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "opencv"))]
//! # fn main() {}
//! ```
//!
//! ## Handle ownership
//!
//! Detection results are plain host values. Calibration results additionally
//! carry the two native matrix handles; dropping the result releases them.
//! A [`CornerAccumulator`] is consumed by [`CvBridge::calibrate_camera`].

mod bridge;
pub mod io;
mod result;

pub use bridge::CvBridge;
pub use result::{CalibrationData, CalibrationResult, CornerAccumulator, DetectionResult};

pub use cvbridge_core as core;
pub use cvbridge_core::{
    BoardSpec, BridgeError, Handle, HandleKind, ImageView, MatrixValue, NativeApi, Point2f,
    Point3f, Rgba8,
};

#[cfg(feature = "opencv")]
pub use cvbridge_opencv as opencv;

/// Native backend selected for this build.
#[cfg(feature = "opencv")]
pub type DefaultBackend = cvbridge_opencv::OpenCvBackend;

/// Construct the build's native backend with default settings.
#[cfg(feature = "opencv")]
pub fn default_backend() -> Result<DefaultBackend, BridgeError> {
    cvbridge_opencv::OpenCvBackend::new(cvbridge_opencv::OpenCvConfig::default())
}
