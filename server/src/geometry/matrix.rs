//! Row-major 3x3 / 4x4 matrix primitives for overlay placement
//!
//! Only the operations the overlay engine needs: affine constructors,
//! right-handed rotations, left-to-right composition and the decomposition
//! used by wire encoders that ship transforms as vector fields.

/// 3-component vector (f32, matching the wire encoding precision)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn length(&self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

/// Unit quaternion, (x, y, z, w) component order as encoded on the wire
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Quat {
    pub const IDENTITY: Quat = Quat {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    };
}

/// Row-major 3x3 matrix
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mat3(pub [[f32; 3]; 3]);

/// Row-major 4x4 matrix; affine transforms keep translation in column 3
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mat4(pub [[f32; 4]; 4]);

impl Mat3 {
    pub const IDENTITY: Mat3 = Mat3([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]);

    pub fn mul(&self, rhs: &Mat3) -> Mat3 {
        let mut out = [[0.0f32; 3]; 3];
        for (r, row) in out.iter_mut().enumerate() {
            for (c, cell) in row.iter_mut().enumerate() {
                *cell = (0..3).map(|k| self.0[r][k] * rhs.0[k][c]).sum();
            }
        }
        Mat3(out)
    }
}

impl Mat4 {
    pub const IDENTITY: Mat4 = Mat4([
        [1.0, 0.0, 0.0, 0.0],
        [0.0, 1.0, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ]);

    pub fn mul(&self, rhs: &Mat4) -> Mat4 {
        let mut out = [[0.0f32; 4]; 4];
        for (r, row) in out.iter_mut().enumerate() {
            for (c, cell) in row.iter_mut().enumerate() {
                *cell = (0..4).map(|k| self.0[r][k] * rhs.0[k][c]).sum();
            }
        }
        Mat4(out)
    }
}

/// Axis-aligned translation matrix
pub fn translation(tx: f32, ty: f32, tz: f32) -> Mat4 {
    Mat4([
        [1.0, 0.0, 0.0, tx],
        [0.0, 1.0, 0.0, ty],
        [0.0, 0.0, 1.0, tz],
        [0.0, 0.0, 0.0, 1.0],
    ])
}

/// Axis-aligned scale matrix
pub fn scale(sx: f32, sy: f32, sz: f32) -> Mat4 {
    Mat4([
        [sx, 0.0, 0.0, 0.0],
        [0.0, sy, 0.0, 0.0],
        [0.0, 0.0, sz, 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ])
}

/// Right-handed rotation about the X axis, angle in radians
pub fn rotation_x(t: f32) -> Mat3 {
    let (s, c) = t.sin_cos();
    Mat3([[1.0, 0.0, 0.0], [0.0, c, -s], [0.0, s, c]])
}

/// Right-handed rotation about the Y axis, angle in radians
pub fn rotation_y(t: f32) -> Mat3 {
    let (s, c) = t.sin_cos();
    Mat3([[c, 0.0, s], [0.0, 1.0, 0.0], [-s, 0.0, c]])
}

/// Right-handed rotation about the Z axis, angle in radians
pub fn rotation_z(t: f32) -> Mat3 {
    let (s, c) = t.sin_cos();
    Mat3([[c, -s, 0.0], [s, c, 0.0], [0.0, 0.0, 1.0]])
}

/// Left-to-right product of the given matrices, identity seeded.
///
/// The empty product is undefined for placement purposes and yields `None`.
pub fn compose(matrices: &[Mat4]) -> Option<Mat4> {
    if matrices.is_empty() {
        return None;
    }
    Some(
        matrices
            .iter()
            .fold(Mat4::IDENTITY, |acc, m| acc.mul(m)),
    )
}

/// Composes 3x3 rotations left-to-right and embeds the result into the
/// rotation block of a 4x4 identity.
pub fn compose_and_lift(matrices: &[Mat3]) -> Option<Mat4> {
    if matrices.is_empty() {
        return None;
    }
    let r = matrices
        .iter()
        .fold(Mat3::IDENTITY, |acc, m| acc.mul(m));

    let mut out = Mat4::IDENTITY;
    for (row, src) in out.0.iter_mut().zip(r.0.iter()) {
        row[..3].copy_from_slice(src);
    }
    Some(out)
}

/// Translation, rotation and scale extracted from an affine transform.
///
/// Wire formats ship transforms as these vector fields rather than as a
/// matrix; the right-rotation slot is always identity for our transforms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformParts {
    pub translation: Vec3,
    pub rotation_left: Quat,
    pub scale: Vec3,
    pub rotation_right: Quat,
}

/// Decompose an affine matrix into translation / rotation / scale.
///
/// Assumes the rotation block is rotation x positive scale (which holds for
/// every transform the geometry module produces).
pub fn decompose(m: &Mat4) -> TransformParts {
    let t = Vec3::new(m.0[0][3], m.0[1][3], m.0[2][3]);

    let col = |c: usize| Vec3::new(m.0[0][c], m.0[1][c], m.0[2][c]);
    let (bx, by, bz) = (col(0), col(1), col(2));
    let s = Vec3::new(bx.length(), by.length(), bz.length());

    // Normalized basis = pure rotation matrix (row-major)
    let n = |v: Vec3, len: f32| {
        if len > f32::EPSILON {
            Vec3::new(v.x / len, v.y / len, v.z / len)
        } else {
            v
        }
    };
    let (rx, ry, rz) = (n(bx, s.x), n(by, s.y), n(bz, s.z));
    let r = [
        [rx.x, ry.x, rz.x],
        [rx.y, ry.y, rz.y],
        [rx.z, ry.z, rz.z],
    ];

    TransformParts {
        translation: t,
        rotation_left: quat_from_rotation(&r),
        scale: s,
        rotation_right: Quat::IDENTITY,
    }
}

/// Standard rotation-matrix to quaternion conversion (largest-pivot branch)
fn quat_from_rotation(r: &[[f32; 3]; 3]) -> Quat {
    let trace = r[0][0] + r[1][1] + r[2][2];
    if trace > 0.0 {
        let s = (trace + 1.0).sqrt() * 2.0;
        Quat {
            x: (r[2][1] - r[1][2]) / s,
            y: (r[0][2] - r[2][0]) / s,
            z: (r[1][0] - r[0][1]) / s,
            w: 0.25 * s,
        }
    } else if r[0][0] > r[1][1] && r[0][0] > r[2][2] {
        let s = (1.0 + r[0][0] - r[1][1] - r[2][2]).sqrt() * 2.0;
        Quat {
            x: 0.25 * s,
            y: (r[0][1] + r[1][0]) / s,
            z: (r[0][2] + r[2][0]) / s,
            w: (r[2][1] - r[1][2]) / s,
        }
    } else if r[1][1] > r[2][2] {
        let s = (1.0 + r[1][1] - r[0][0] - r[2][2]).sqrt() * 2.0;
        Quat {
            x: (r[0][1] + r[1][0]) / s,
            y: 0.25 * s,
            z: (r[1][2] + r[2][1]) / s,
            w: (r[0][2] - r[2][0]) / s,
        }
    } else {
        let s = (1.0 + r[2][2] - r[0][0] - r[1][1]).sqrt() * 2.0;
        Quat {
            x: (r[0][2] + r[2][0]) / s,
            y: (r[1][2] + r[2][1]) / s,
            z: 0.25 * s,
            w: (r[1][0] - r[0][1]) / s,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-5;

    fn approx(a: &Mat4, b: &Mat4) -> bool {
        a.0.iter()
            .flatten()
            .zip(b.0.iter().flatten())
            .all(|(x, y)| (x - y).abs() < EPS)
    }

    #[test]
    fn test_compose_empty_is_none() {
        assert!(compose(&[]).is_none());
        assert!(compose_and_lift(&[]).is_none());
    }

    #[test]
    fn test_compose_single_is_identity_product() {
        let t = translation(1.0, 2.0, 3.0);
        let c = compose(&[t]).unwrap();
        assert!(approx(&c, &t));
    }

    #[test]
    fn test_compose_is_associative() {
        let a = translation(1.0, 0.0, -2.0);
        let b = compose_and_lift(&[rotation_x(0.7), rotation_z(1.3)]).unwrap();
        let c = scale(0.18, 0.18, 0.0001);

        let all = compose(&[a, b, c]).unwrap();
        let ab_then_c = compose(&[compose(&[a, b]).unwrap(), c]).unwrap();
        assert!(approx(&all, &ab_then_c));
    }

    #[test]
    fn test_translation_then_scale_order() {
        // compose([T, S]) scales in the local frame: translation survives
        let m = compose(&[translation(2.0, 0.0, 0.0), scale(0.5, 0.5, 0.5)]).unwrap();
        assert!((m.0[0][3] - 2.0).abs() < EPS);
        assert!((m.0[0][0] - 0.5).abs() < EPS);
    }

    #[test]
    fn test_lift_embeds_rotation_block() {
        let m = compose_and_lift(&[rotation_z(std::f32::consts::FRAC_PI_2)]).unwrap();
        // z-rotation by 90 degrees maps +x to +y
        assert!(m.0[0][0].abs() < EPS);
        assert!((m.0[1][0] - 1.0).abs() < EPS);
        assert!((m.0[3][3] - 1.0).abs() < EPS);
        assert!((m.0[2][2] - 1.0).abs() < EPS);
    }

    #[test]
    fn test_decompose_recovers_parts() {
        let m = compose(&[
            translation(1.5, 0.005, -0.75),
            compose_and_lift(&[rotation_x(std::f32::consts::FRAC_PI_2)]).unwrap(),
            scale(0.18, 0.18, 0.0001),
        ])
        .unwrap();

        let parts = decompose(&m);
        assert!((parts.translation.x - 1.5).abs() < EPS);
        assert!((parts.translation.y - 0.005).abs() < EPS);
        assert!((parts.translation.z + 0.75).abs() < EPS);
        assert!((parts.scale.x - 0.18).abs() < 1e-4);
        assert!((parts.scale.z - 0.0001).abs() < 1e-4);
        assert_eq!(parts.rotation_right, Quat::IDENTITY);

        // 90 degrees about X: quaternion (sin 45, 0, 0, cos 45)
        let half = std::f32::consts::FRAC_PI_4;
        assert!((parts.rotation_left.x - half.sin()).abs() < 1e-3);
        assert!((parts.rotation_left.w - half.cos()).abs() < 1e-3);
    }

    #[test]
    fn test_identity_decomposes_to_identity() {
        let parts = decompose(&Mat4::IDENTITY);
        assert_eq!(parts.translation, Vec3::ZERO);
        assert_eq!(parts.rotation_left, Quat::IDENTITY);
        assert!((parts.scale.x - 1.0).abs() < EPS);
    }
}
