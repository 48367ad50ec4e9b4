//! OpenCV implementation of [`cvbridge_core::NativeApi`].
//!
//! Links the system OpenCV through the `opencv` crate. Chessboard search runs
//! on `calib3d::find_chessboard_corners` with optional sub-pixel refinement,
//! calibration on `calib3d::calibrate_camera`, and marker detection on the
//! `objdetect` ArUco detector configured by [`OpenCvConfig`].
//!
//! ```no_run
//! use cvbridge_opencv::{ArucoDictionary, OpenCvBackend, OpenCvConfig};
//!
//! let _backend = OpenCvBackend::new(OpenCvConfig {
//!     dictionary: ArucoDictionary::Dict4x4_50,
//!     ..OpenCvConfig::default()
//! })?;
//! # Ok::<(), cvbridge_core::BridgeError>(())
//! ```

mod backend;
mod config;

pub use backend::OpenCvBackend;
pub use config::{ArucoDictionary, OpenCvConfig, UnknownDictionary};
