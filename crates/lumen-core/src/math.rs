use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Div, Index, Mul, Neg, Sub};

pub const EPS: f32 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f32; 2]", into = "[f32; 2]")]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

impl From<[f32; 2]> for Vec2 {
    fn from(v: [f32; 2]) -> Self {
        Self::new(v[0], v[1])
    }
}

impl From<Vec2> for [f32; 2] {
    fn from(v: Vec2) -> Self {
        [v.x, v.y]
    }
}

impl Add for Vec2 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Mul<f32> for Vec2 {
    type Output = Self;

    fn mul(self, rhs: f32) -> Self::Output {
        Self::new(self.x * rhs, self.y * rhs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f32; 3]", into = "[f32; 3]")]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub const fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    pub const fn splat(v: f32) -> Self {
        Self::new(v, v, v)
    }

    pub fn length(self) -> f32 {
        self.dot(self).sqrt()
    }

    pub fn dot(self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(self, other: Self) -> Self {
        Self::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    pub fn normalized(self) -> Self {
        let len = self.length();
        if len == 0.0 {
            self
        } else {
            self / len
        }
    }

    pub fn min(self, other: Self) -> Self {
        Self::new(self.x.min(other.x), self.y.min(other.y), self.z.min(other.z))
    }

    pub fn max(self, other: Self) -> Self {
        Self::new(self.x.max(other.x), self.y.max(other.y), self.z.max(other.z))
    }

    pub fn abs(self) -> Self {
        Self::new(self.x.abs(), self.y.abs(), self.z.abs())
    }
}

impl From<[f32; 3]> for Vec3 {
    fn from(v: [f32; 3]) -> Self {
        Self::new(v[0], v[1], v[2])
    }
}

impl From<Vec3> for [f32; 3] {
    fn from(v: Vec3) -> Self {
        [v.x, v.y, v.z]
    }
}

impl Index<usize> for Vec3 {
    type Output = f32;

    fn index(&self, axis: usize) -> &f32 {
        match axis {
            0 => &self.x,
            1 => &self.y,
            _ => &self.z,
        }
    }
}

impl Add for Vec3 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl AddAssign for Vec3 {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for Vec3 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Neg for Vec3 {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self::new(-self.x, -self.y, -self.z)
    }
}

impl Mul<f32> for Vec3 {
    type Output = Self;

    fn mul(self, rhs: f32) -> Self::Output {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Div<f32> for Vec3 {
    type Output = Self;

    fn div(self, rhs: f32) -> Self::Output {
        Self::new(self.x / rhs, self.y / rhs, self.z / rhs)
    }
}

impl Mul<Vec3> for f32 {
    type Output = Vec3;

    fn mul(self, rhs: Vec3) -> Self::Output {
        rhs * self
    }
}

/// Column-major 4x4 matrix. `cols[c][r]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mat4 {
    pub cols: [[f32; 4]; 4],
}

impl Default for Mat4 {
    fn default() -> Self {
        Self::identity()
    }
}

impl Mat4 {
    pub const fn identity() -> Self {
        Self {
            cols: [
                [1.0, 0.0, 0.0, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }

    pub fn from_cols_array(m: [f32; 16]) -> Self {
        let mut cols = [[0.0; 4]; 4];
        for (c, col) in cols.iter_mut().enumerate() {
            col.copy_from_slice(&m[c * 4..c * 4 + 4]);
        }
        Self { cols }
    }

    pub fn to_cols_array(&self) -> [f32; 16] {
        let mut m = [0.0; 16];
        for (c, col) in self.cols.iter().enumerate() {
            m[c * 4..c * 4 + 4].copy_from_slice(col);
        }
        m
    }

    pub fn translate(t: Vec3) -> Self {
        let mut m = Self::identity();
        m.cols[3] = [t.x, t.y, t.z, 1.0];
        m
    }

    pub fn scale(s: Vec3) -> Self {
        let mut m = Self::identity();
        m.cols[0][0] = s.x;
        m.cols[1][1] = s.y;
        m.cols[2][2] = s.z;
        m
    }

    /// Rotation of `angle_deg` degrees around `axis` (right-handed).
    pub fn rotate(angle_deg: f32, axis: Vec3) -> Self {
        let a = axis.normalized();
        let (s, c) = angle_deg.to_radians().sin_cos();
        let t = 1.0 - c;
        Self {
            cols: [
                [t * a.x * a.x + c, t * a.x * a.y + s * a.z, t * a.x * a.z - s * a.y, 0.0],
                [t * a.x * a.y - s * a.z, t * a.y * a.y + c, t * a.y * a.z + s * a.x, 0.0],
                [t * a.x * a.z + s * a.y, t * a.y * a.z - s * a.x, t * a.z * a.z + c, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }

    pub fn transform_point(&self, p: Vec3) -> Vec3 {
        let c = &self.cols;
        let x = c[0][0] * p.x + c[1][0] * p.y + c[2][0] * p.z + c[3][0];
        let y = c[0][1] * p.x + c[1][1] * p.y + c[2][1] * p.z + c[3][1];
        let z = c[0][2] * p.x + c[1][2] * p.y + c[2][2] * p.z + c[3][2];
        let w = c[0][3] * p.x + c[1][3] * p.y + c[2][3] * p.z + c[3][3];
        if w == 1.0 || w == 0.0 {
            Vec3::new(x, y, z)
        } else {
            Vec3::new(x / w, y / w, z / w)
        }
    }

    pub fn transform_vector(&self, v: Vec3) -> Vec3 {
        let c = &self.cols;
        Vec3::new(
            c[0][0] * v.x + c[1][0] * v.y + c[2][0] * v.z,
            c[0][1] * v.x + c[1][1] * v.y + c[2][1] * v.z,
            c[0][2] * v.x + c[1][2] * v.y + c[2][2] * v.z,
        )
    }

    /// Inverse transpose of the upper 3x3 block, for transforming normals.
    /// Falls back to the identity for singular matrices.
    pub fn normal_matrix(&self) -> Mat3 {
        let c = &self.cols;
        let (a, b, cc) = (c[0][0], c[1][0], c[2][0]);
        let (d, e, f) = (c[0][1], c[1][1], c[2][1]);
        let (g, h, i) = (c[0][2], c[1][2], c[2][2]);

        // Cofactor matrix of the row-major block [[a b c][d e f][g h i]]
        let co = [
            [e * i - f * h, -(d * i - f * g), d * h - e * g],
            [-(b * i - cc * h), a * i - cc * g, -(a * h - b * g)],
            [b * f - cc * e, -(a * f - cc * d), a * e - b * d],
        ];
        let det = a * co[0][0] + b * co[0][1] + cc * co[0][2];
        if det.abs() < f32::EPSILON {
            return Mat3::identity();
        }

        // inverse transpose = cofactor / det
        let mut rows = [[0.0; 3]; 3];
        for r in 0..3 {
            for k in 0..3 {
                rows[r][k] = co[r][k] / det;
            }
        }
        Mat3 { rows }
    }
}

impl Mul for Mat4 {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self::Output {
        let mut out = [[0.0; 4]; 4];
        for (c, col) in out.iter_mut().enumerate() {
            for (r, value) in col.iter_mut().enumerate() {
                *value = (0..4).map(|k| self.cols[k][r] * rhs.cols[c][k]).sum();
            }
        }
        Self { cols: out }
    }
}

/// Row-major 3x3 matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mat3 {
    pub rows: [[f32; 3]; 3],
}

impl Mat3 {
    pub const fn identity() -> Self {
        Self {
            rows: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
        }
    }

    pub fn apply(&self, v: Vec3) -> Vec3 {
        let r = &self.rows;
        Vec3::new(
            r[0][0] * v.x + r[0][1] * v.y + r[0][2] * v.z,
            r[1][0] * v.x + r[1][1] * v.y + r[1][2] * v.z,
            r[2][0] * v.x + r[2][1] * v.y + r[2][2] * v.z,
        )
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

pub fn mix_barycentric<T>(a: T, b: T, c: T, uv: Vec2) -> T
where
    T: Mul<f32, Output = T> + Add<Output = T>,
{
    a * (1.0 - uv.x - uv.y) + b * uv.x + c * uv.y
}

pub fn geometry_normal(p1: Vec3, p2: Vec3, p3: Vec3) -> Vec3 {
    (p2 - p1).cross(p3 - p1).normalized()
}

/// Tangent vectors orthogonal to a unit normal (Duff et al. 2017).
pub fn orthonormal_basis(n: Vec3) -> (Vec3, Vec3) {
    let s = if n.z >= 0.0 { 1.0 } else { -1.0 };
    let a = -1.0 / (s + n.z);
    let b = n.x * n.y * a;
    let u = Vec3::new(1.0 + s * n.x * n.x * a, s * b, -s * n.x);
    let v = Vec3::new(b, s + n.y * n.y * a, -n.y);
    (u, v)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 1e-5
    }

    #[test]
    fn translate_moves_points_but_not_vectors() {
        let m = Mat4::translate(Vec3::new(1.0, 2.0, 3.0));
        assert!(close(m.transform_point(Vec3::zero()), Vec3::new(1.0, 2.0, 3.0)));
        assert!(close(m.transform_vector(Vec3::new(0.0, 1.0, 0.0)), Vec3::new(0.0, 1.0, 0.0)));
    }

    #[test]
    fn rotate_quarter_turn_about_y() {
        let m = Mat4::rotate(90.0, Vec3::new(0.0, 1.0, 0.0));
        assert!(close(m.transform_vector(Vec3::new(1.0, 0.0, 0.0)), Vec3::new(0.0, 0.0, -1.0)));
    }

    #[test]
    fn multiply_applies_right_operand_first() {
        let m = Mat4::translate(Vec3::new(1.0, 0.0, 0.0)) * Mat4::scale(Vec3::splat(2.0));
        assert!(close(m.transform_point(Vec3::new(1.0, 1.0, 1.0)), Vec3::new(3.0, 2.0, 2.0)));
    }

    #[test]
    fn normal_matrix_keeps_normals_perpendicular_under_nonuniform_scale() {
        let m = Mat4::scale(Vec3::new(4.0, 1.0, 1.0));
        let tangent = m.transform_vector(Vec3::new(1.0, -1.0, 0.0));
        let normal = m.normal_matrix().apply(Vec3::new(1.0, 1.0, 0.0));
        assert!(tangent.dot(normal).abs() < 1e-5);
    }

    #[test]
    fn cols_array_round_trips() {
        let m = Mat4::rotate(30.0, Vec3::new(1.0, 1.0, 0.0)) * Mat4::translate(Vec3::splat(2.0));
        assert_eq!(Mat4::from_cols_array(m.to_cols_array()), m);
    }

    #[test]
    fn orthonormal_basis_is_orthogonal() {
        let n = Vec3::new(0.3, -0.5, 0.8).normalized();
        let (u, v) = orthonormal_basis(n);
        assert!(u.dot(n).abs() < 1e-5);
        assert!(v.dot(n).abs() < 1e-5);
        assert!(u.dot(v).abs() < 1e-5);
    }
}
