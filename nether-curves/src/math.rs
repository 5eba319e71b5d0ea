//! Numeric primitives: quaternion log/exp, small linear solves, transforms.

use glam::{DMat3, DMat4, DQuat, DVec3, DVec4};

/// Vectors shorter than this are treated as zero rotations.
const ROTATION_EPSILON: f64 = 1e-9;

/// Determinants below this are treated as singular.
pub const DET_EPSILON: f64 = 1e-40;

/// World transforms with a smaller determinant cannot be inverted reliably.
pub const TRANSFORM_DET_EPSILON: f64 = 1e-12;

// ============================================================================
// Quaternions
// ============================================================================

/// Logarithm of a unit quaternion as a 3-vector (`w` is the scalar part).
///
/// The result points along the rotation axis with length equal to half the
/// rotation angle.
pub fn quat_log(q: DQuat) -> DVec3 {
    let v = DVec3::new(q.x, q.y, q.z);
    let len = v.length();
    if len < ROTATION_EPSILON {
        return DVec3::ZERO;
    }
    let angle = len.atan2(q.w);
    v * (angle / len)
}

/// Inverse of [`quat_log`].
pub fn quat_exp(v: DVec3) -> DQuat {
    let angle = v.length();
    if angle < ROTATION_EPSILON {
        return DQuat::IDENTITY;
    }
    let axis = v / angle;
    let (sin, cos) = angle.sin_cos();
    DQuat::from_xyzw(axis.x * sin, axis.y * sin, axis.z * sin, cos)
}

/// Flip `q` into the hemisphere of `reference`.
pub fn align_hemisphere(q: DQuat, reference: DQuat) -> DQuat {
    if q.dot(reference) < 0.0 { -q } else { q }
}

/// Squared distance between two rotations, ignoring the `q`/`-q` ambiguity.
pub fn quat_distance_squared(a: DQuat, b: DQuat) -> f64 {
    let a = DVec4::from(a);
    let b = DVec4::from(b);
    (a - b).length_squared().min((a + b).length_squared())
}

/// Read `[x, y, z, w]` as a unit quaternion. Degenerate input yields identity.
pub fn quat_from_slice(values: &[f32]) -> DQuat {
    let q = DQuat::from_xyzw(
        values[0] as f64,
        values[1] as f64,
        values[2] as f64,
        values[3] as f64,
    );
    let len_sq = q.length_squared();
    if len_sq < ROTATION_EPSILON || !len_sq.is_finite() {
        DQuat::IDENTITY
    } else {
        q / len_sq.sqrt()
    }
}

// ============================================================================
// Solvers
// ============================================================================

/// Solve `m * x = rhs` through the closed-form inverse.
///
/// Returns `None` when `|det(m)| < epsilon`.
pub fn solve4(m: DMat4, rhs: DVec4, epsilon: f64) -> Option<DVec4> {
    let det = m.determinant();
    if det.abs() < epsilon || !det.is_finite() {
        return None;
    }
    Some(m.inverse() * rhs)
}

/// 3x3 counterpart of [`solve4`].
pub fn solve3(m: DMat3, rhs: DVec3, epsilon: f64) -> Option<DVec3> {
    let det = m.determinant();
    if det.abs() < epsilon || !det.is_finite() {
        return None;
    }
    Some(m.inverse() * rhs)
}

// ============================================================================
// Transforms
// ============================================================================

/// Local transform in double precision: `T * R * S`.
pub fn compose(translation: DVec3, rotation: DQuat, scale: DVec3) -> DMat4 {
    DMat4::from_scale_rotation_translation(scale, rotation, translation)
}

/// Invert a world transform, rejecting near-singular matrices.
pub fn try_inverse(m: &DMat4) -> Option<DMat4> {
    let det = m.determinant();
    if det.abs() < TRANSFORM_DET_EPSILON || !det.is_finite() {
        return None;
    }
    Some(m.inverse())
}

/// Split an affine matrix into `(translation, rotation, scale)`.
pub fn decompose(m: &DMat4) -> (DVec3, DQuat, DVec3) {
    let (scale, rotation, translation) = m.to_scale_rotation_translation();
    (translation, rotation, scale)
}

pub fn vec3_from_slice(values: &[f32]) -> DVec3 {
    DVec3::new(values[0] as f64, values[1] as f64, values[2] as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quat_log_exp_roundtrip() {
        let q = DQuat::from_axis_angle(DVec3::new(1.0, 2.0, -0.5).normalize(), 1.3);
        let back = quat_exp(quat_log(q));
        assert!((q.dot(back) - 1.0).abs() < 1e-12, "got {back:?}");
    }

    #[test]
    fn test_quat_log_identity_is_zero() {
        assert_eq!(quat_log(DQuat::IDENTITY), DVec3::ZERO);
        assert_eq!(quat_exp(DVec3::ZERO), DQuat::IDENTITY);
    }

    #[test]
    fn test_quat_log_length_is_half_angle() {
        let q = DQuat::from_rotation_z(1.0);
        let log = quat_log(q);
        assert!((log.length() - 0.5).abs() < 1e-12);
        assert!((log.z - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_quat_distance_ignores_sign() {
        let q = DQuat::from_rotation_y(0.4);
        assert!(quat_distance_squared(q, -q) < 1e-24);
        assert!(quat_distance_squared(q, DQuat::IDENTITY) > 1e-3);
    }

    #[test]
    fn test_quat_from_slice_normalizes() {
        let q = quat_from_slice(&[0.0, 0.0, 0.0, 2.0]);
        assert_eq!(q, DQuat::IDENTITY);
        let degenerate = quat_from_slice(&[0.0, 0.0, 0.0, 0.0]);
        assert_eq!(degenerate, DQuat::IDENTITY);
    }

    #[test]
    fn test_solve4_singular() {
        assert!(solve4(DMat4::ZERO, DVec4::ONE, DET_EPSILON).is_none());
        let x = solve4(DMat4::from_diagonal(DVec4::splat(2.0)), DVec4::ONE, DET_EPSILON)
            .unwrap();
        assert_eq!(x, DVec4::splat(0.5));
    }

    #[test]
    fn test_compose_decompose() {
        let t = DVec3::new(1.0, -2.0, 3.0);
        let r = DQuat::from_rotation_x(0.7);
        let s = DVec3::new(2.0, 2.0, 2.0);
        let (t2, r2, s2) = decompose(&compose(t, r, s));
        assert!((t - t2).length() < 1e-12);
        assert!(quat_distance_squared(r, r2) < 1e-20);
        assert!((s - s2).length() < 1e-12);
    }

    #[test]
    fn test_try_inverse_rejects_zero_scale() {
        let m = compose(DVec3::ZERO, DQuat::IDENTITY, DVec3::new(1.0, 0.0, 1.0));
        assert!(try_inverse(&m).is_none());
        assert!(try_inverse(&DMat4::IDENTITY).is_some());
    }
}
