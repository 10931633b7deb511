//! SO(3) rotation utilities.
//!
//! Skew-symmetric products for rigid-body kinematics and frame assembly
//! with SVD orthonormalization for the calibration code.

use nalgebra::{Rotation3, SVD};

use crate::error::{KinematicsError, Result};
use crate::{Mat3, Quat, Vec3};

/// Skew-symmetric matrix from vector (hat operator).
///
/// For v = [x, y, z]^T:
/// ```text
/// [v]× = [ 0  -z   y]
///        [ z   0  -x]
///        [-y   x   0]
/// ```
pub fn skew(v: &Vec3) -> Mat3 {
    Mat3::new(
        0.0, -v.z, v.y,
        v.z, 0.0, -v.x,
        -v.y, v.x, 0.0,
    )
}

/// Rigid-body point acceleration term ω×(ω×r) + ω̇×r.
///
/// The acceleration of a point at offset `r` from a fixed rotation center,
/// expressed in the rotating frame.
pub fn rigid_acceleration(omega: &Vec3, omega_dot: &Vec3, r: &Vec3) -> Vec3 {
    omega.cross(&omega.cross(r)) + omega_dot.cross(r)
}

/// Build a rotation matrix whose columns are the given axes.
pub fn frame_from_axes(x: &Vec3, y: &Vec3, z: &Vec3) -> Mat3 {
    Mat3::from_columns(&[*x, *y, *z])
}

/// Flip an axis so its largest-magnitude component is positive.
///
/// Estimated rotation axes are sign-ambiguous; this picks one
/// representative deterministically.
pub fn fix_axis_sign(axis: Vec3) -> Vec3 {
    let mut dominant = 0;
    for i in 1..3 {
        if axis[i].abs() > axis[dominant].abs() {
            dominant = i;
        }
    }
    if axis[dominant] < 0.0 {
        -axis
    } else {
        axis
    }
}

/// Project a near-rotation matrix onto SO(3).
///
/// SVD projection with the reflection case corrected so the result is
/// orthonormal with determinant +1.
pub fn nearest_rotation(m: &Mat3) -> Result<Quat> {
    let svd = SVD::new(*m, true, true);
    let (u, v_t) = match (svd.u, svd.v_t) {
        (Some(u), Some(v_t)) => (u, v_t),
        _ => {
            return Err(KinematicsError::DegenerateGeometry {
                estimator: "frame orthonormalization",
                reason: "SVD of frame matrix failed".to_string(),
            })
        }
    };

    let mut u = u;
    if (u * v_t).determinant() < 0.0 {
        for i in 0..3 {
            u[(i, 2)] *= -1.0;
        }
    }
    let r = u * v_t;

    Ok(Quat::from_rotation_matrix(&Rotation3::from_matrix_unchecked(r)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_skew_symmetric() {
        let v = Vec3::new(1.0, 2.0, 3.0);
        let s = skew(&v);

        assert_relative_eq!(s, -s.transpose(), epsilon = 1e-12);
        // [v]× w = v × w
        let w = Vec3::new(-0.5, 4.0, 2.5);
        assert_relative_eq!(s * w, v.cross(&w), epsilon = 1e-12);
    }

    #[test]
    fn test_rigid_acceleration_pure_spin() {
        // Constant spin about z, point on the x axis: centripetal only
        let omega = Vec3::new(0.0, 0.0, 2.0);
        let r = Vec3::new(0.5, 0.0, 0.0);
        let a = rigid_acceleration(&omega, &Vec3::zeros(), &r);

        // ω×(ω×r) = -|ω|² r for r ⊥ ω
        assert_relative_eq!(a, Vec3::new(-2.0, 0.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_rigid_acceleration_tangential() {
        let omega_dot = Vec3::new(0.0, 0.0, 3.0);
        let r = Vec3::new(0.5, 0.0, 0.0);
        let a = rigid_acceleration(&Vec3::zeros(), &omega_dot, &r);

        assert_relative_eq!(a, Vec3::new(0.0, 1.5, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_nearest_rotation_of_rotation_is_identity_map() {
        let q = Quat::from_scaled_axis(Vec3::new(0.3, -0.8, 0.5));
        let m = *q.to_rotation_matrix().matrix();

        let recovered = nearest_rotation(&m).unwrap();
        assert_relative_eq!(q.angle_to(&recovered), 0.0, epsilon = 1e-10);
    }

    #[test]
    fn test_nearest_rotation_orthonormalizes_noisy_frame() {
        let q = Quat::from_scaled_axis(Vec3::new(0.1, 0.2, 0.3));
        let mut m = *q.to_rotation_matrix().matrix();
        // Perturb off SO(3)
        m[(0, 0)] += 0.05;
        m[(2, 1)] -= 0.03;

        let r = nearest_rotation(&m).unwrap();
        let rm = *r.to_rotation_matrix().matrix();
        assert_relative_eq!(rm * rm.transpose(), Mat3::identity(), epsilon = 1e-10);
        assert_relative_eq!(rm.determinant(), 1.0, epsilon = 1e-10);
        // Still close to the unperturbed rotation
        assert!(q.angle_to(&r) < 0.1);
    }

    #[test]
    fn test_nearest_rotation_fixes_reflection() {
        // A reflection (det = -1) must come back as a proper rotation
        let m = Mat3::new(
            1.0, 0.0, 0.0,
            0.0, 1.0, 0.0,
            0.0, 0.0, -1.0,
        );
        let r = nearest_rotation(&m).unwrap();
        assert_relative_eq!(
            r.to_rotation_matrix().matrix().determinant(),
            1.0,
            epsilon = 1e-10
        );
    }
}
