//! Core of the cvbridge interop layer.
//!
//! This crate owns the boundary between host Rust values and a native
//! computer-vision library:
//! - [`NativeApi`]: the call contract a native backend implements,
//! - [`HandlePool`] / [`Handle`]: typed native handles released exactly once,
//! - [`marshal`]: copying matrices, point sequences and scalars out of handles,
//! - plain data types ([`MatrixValue`], [`Point2f`], [`BoardSpec`], [`ImageView`]).
//!
//! It does not link any native library itself. Backends live in their own
//! crates (for example `cvbridge-opencv`).

mod error;
pub mod geometry;
mod handle;
mod image;
mod logger;
pub mod marshal;
mod native;
mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use error::{BridgeError, Result};
pub use handle::{kind, Handle, HandlePool, Kind};
pub use image::{ImageView, Rgba8};
pub use marshal::MarshalToHost;
pub use native::{HandleKind, NativeApi, RawHandle};
pub use types::{BoardSpec, MatrixValue, NestedPointSequence, Point2f, Point3f, PointSequence};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::{init_from_env, init_with_level, LOG_ENV};
