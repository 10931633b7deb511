//! Quaternion operations for orientation representation.
//!
//! Orientations are unit quaternions mapping the sensor-local frame to the
//! global frame. Propagation uses the exact exponential map of the body
//! angular velocity, so unit norm is preserved by construction.

use nalgebra::{Matrix4, Quaternion, Vector3, Vector4};

use crate::{Quat, Vec3};

/// Quaternion derivative for body-frame angular velocity.
///
/// q̇ = 1/2 Λ(q)[0; ω], where Λ(q) is the quaternion multiplication matrix.
pub fn quaternion_derivative(q: &Quat, omega: &Vec3) -> Vector4<f64> {
    let w = q.w;
    let x = q.i;
    let y = q.j;
    let z = q.k;

    let omega_quat = Vector4::new(0.0, omega.x, omega.y, omega.z);

    let lambda = Matrix4::new(
        w, -x, -y, -z,
        x, w, -z, y,
        y, z, w, -x,
        z, -y, x, w,
    );

    0.5 * lambda * omega_quat
}

/// First-order quaternion integration: q_new = normalize(q + q̇·dt).
pub fn integrate_quaternion(q: &Quat, q_dot: &Vector4<f64>, dt: f64) -> Quat {
    let q_vec = Vector4::new(q.w, q.i, q.j, q.k) + q_dot * dt;
    Quat::from_quaternion(Quaternion::new(q_vec[0], q_vec[1], q_vec[2], q_vec[3]))
}

/// Exact exponential-map integration of a constant body rate over `dt`.
///
/// Preferred over [`integrate_quaternion`] at MIMU sample rates; never
/// leaves the unit sphere.
pub fn integrate_angular_velocity(q: &Quat, omega: &Vec3, dt: f64) -> Quat {
    q * Quat::from_scaled_axis(omega * dt)
}

/// Body-frame angular velocity that rotates `q1` into `q2` over `dt`.
pub fn angular_velocity_between(q1: &Quat, q2: &Quat, dt: f64) -> Vec3 {
    (q1.inverse() * q2).scaled_axis() / dt
}

/// Pick the sign of `q` that is continuous with `prev`.
///
/// q and -q encode the same rotation; orientation series must not flip
/// between the two representations from one sample to the next.
pub fn align_sign(prev: &Quat, q: &Quat) -> Quat {
    if prev.coords.dot(&q.coords) < 0.0 {
        Quat::new_unchecked(-q.into_inner())
    } else {
        *q
    }
}

/// Signed twist angle of `q` about the unit axis `axis` [rad].
///
/// Swing-twist decomposition: the returned angle is the component of the
/// rotation about `axis`, used for heading alignment about the vertical.
pub fn twist_about(q: &Quat, axis: &Vec3) -> f64 {
    let v = Vector3::new(q.i, q.j, q.k);
    let proj = v.dot(axis);
    let twist = Quaternion::new(q.w, axis.x * proj, axis.y * proj, axis.z * proj);
    if twist.norm() < 1e-12 {
        return 0.0;
    }
    let twist = twist.normalize();
    2.0 * twist.imag().dot(axis).atan2(twist.w)
}
