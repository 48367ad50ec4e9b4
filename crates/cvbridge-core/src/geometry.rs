//! Small rotation helpers shared by native backends.

use nalgebra::{Rotation3, Vector3};

/// Convert a Rodrigues rotation vector into `[x, y, z]` Euler angles in degrees.
///
/// The rotation is decomposed as `R = Rz(z) * Ry(y) * Rx(x)`.
pub fn rotation_vector_to_euler_degrees(rvec: [f64; 3]) -> [f64; 3] {
    let rot = Rotation3::from_scaled_axis(Vector3::new(rvec[0], rvec[1], rvec[2]));
    let (x, y, z) = rot.euler_angles();
    [x.to_degrees(), y.to_degrees(), z.to_degrees()]
}
