//! 3x4 affine placement matrices and their `AXIS2_PLACEMENT_3D` encoding.

use nalgebra::{Matrix3, Matrix4, Vector3};
use serde::{Deserialize, Serialize};
use std::ops::Mul;

/// A 3x4 affine transform stored row-major as
/// `[x1, x2, x3, x4, y1, y2, y3, y4, z1, z2, z3, z4]`.
///
/// Columns 1..3 of each row form the rotation/scale block, column 4 the
/// translation. The implicit fourth row is `[0, 0, 0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Matrix([f64; 12]);

impl Default for Matrix {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Matrix {
    /// The identity transform.
    pub const IDENTITY: Matrix = Matrix([
        1.0, 0.0, 0.0, 0.0, //
        0.0, 1.0, 0.0, 0.0, //
        0.0, 0.0, 1.0, 0.0,
    ]);

    /// Wrap 12 row-major values.
    pub fn new(values: [f64; 12]) -> Self {
        Self(values)
    }

    /// Build from a slice; `None` unless it holds exactly 12 values.
    pub fn from_slice(values: &[f64]) -> Option<Self> {
        <[f64; 12]>::try_from(values).ok().map(Self)
    }

    /// Pure translation by `(x, y, z)`.
    pub fn translation(x: f64, y: f64, z: f64) -> Self {
        let mut m = Self::IDENTITY;
        m.0[3] = x;
        m.0[7] = y;
        m.0[11] = z;
        m
    }

    /// The 12 values, row-major.
    pub fn to_array(&self) -> [f64; 12] {
        self.0
    }

    /// Value at `row` (0..3), `col` (0..4).
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.0[row * 4 + col]
    }

    /// Translation column.
    pub fn translation_part(&self) -> Vector3<f64> {
        Vector3::new(self.0[3], self.0[7], self.0[11])
    }

    /// Rotation/scale block.
    pub fn linear_part(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.0[0], self.0[1], self.0[2], //
            self.0[4], self.0[5], self.0[6], //
            self.0[8], self.0[9], self.0[10],
        )
    }

    /// Homogeneous 4x4 form.
    pub fn to_homogeneous(&self) -> Matrix4<f64> {
        let m = &self.0;
        Matrix4::new(
            m[0], m[1], m[2], m[3], //
            m[4], m[5], m[6], m[7], //
            m[8], m[9], m[10], m[11], //
            0.0, 0.0, 0.0, 1.0,
        )
    }

    /// Drop the last row of a homogeneous matrix.
    pub fn from_homogeneous(h: &Matrix4<f64>) -> Self {
        let mut values = [0.0; 12];
        for row in 0..3 {
            for col in 0..4 {
                values[row * 4 + col] = h[(row, col)];
            }
        }
        Self(values)
    }

    /// Inverse transform, if the linear block is invertible.
    pub fn inverse(&self) -> Option<Matrix> {
        self.to_homogeneous()
            .try_inverse()
            .map(|h| Self::from_homogeneous(&h))
    }

    /// Whether the linear block is a proper rotation (orthonormal,
    /// determinant +1) within `tolerance`.
    pub fn is_rigid(&self, tolerance: f64) -> bool {
        let r = self.linear_part();
        let gram = r.transpose() * r;
        (gram - Matrix3::identity()).abs().max() <= tolerance
            && (r.determinant() - 1.0).abs() <= tolerance
    }

    /// Element-wise comparison within `epsilon`.
    pub fn approx_eq(&self, other: &Matrix, epsilon: f64) -> bool {
        self.0
            .iter()
            .zip(other.0.iter())
            .all(|(a, b)| (a - b).abs() <= epsilon)
    }

    /// Frame for an `AXIS2_PLACEMENT_3D`: the translation becomes the
    /// location, the third column the axis and the first column the
    /// reference direction. Scale and shear are not representable and are
    /// normalized away.
    pub fn to_placement(&self) -> Placement {
        let r = self.linear_part();
        Placement {
            location: self.translation_part(),
            axis: r.column(2).into_owned(),
            ref_direction: r.column(0).into_owned(),
        }
    }

    /// Rigid transform of an `AXIS2_PLACEMENT_3D` frame.
    pub fn from_placement(placement: &Placement) -> Self {
        let (x, y, z) = placement.frame();
        let t = placement.location;
        Self([
            x.x, y.x, z.x, t.x, //
            x.y, y.y, z.y, t.y, //
            x.z, y.z, z.z, t.z,
        ])
    }
}

impl Mul for Matrix {
    type Output = Matrix;

    /// `self * rhs`: apply `rhs` first, then `self`.
    fn mul(self, rhs: Matrix) -> Matrix {
        Matrix::from_homogeneous(&(self.to_homogeneous() * rhs.to_homogeneous()))
    }
}

/// Location plus axis and reference direction, as carried by
/// `AXIS2_PLACEMENT_3D`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    /// Origin of the frame.
    pub location: Vector3<f64>,
    /// Local Z direction.
    pub axis: Vector3<f64>,
    /// Approximate local X direction.
    pub ref_direction: Vector3<f64>,
}

impl Default for Placement {
    fn default() -> Self {
        Self {
            location: Vector3::zeros(),
            axis: Vector3::z(),
            ref_direction: Vector3::x(),
        }
    }
}

impl Placement {
    /// Orthonormal `(x, y, z)` axes. The reference direction is projected
    /// onto the plane normal to the axis; degenerate inputs fall back to
    /// the global axes.
    pub fn frame(&self) -> (Vector3<f64>, Vector3<f64>, Vector3<f64>) {
        let z = self
            .axis
            .try_normalize(f64::EPSILON)
            .unwrap_or_else(Vector3::z);
        let projected = self.ref_direction - z * self.ref_direction.dot(&z);
        let x = projected
            .try_normalize(1e-12)
            .unwrap_or_else(|| any_perpendicular(&z));
        let y = z.cross(&x);
        (x, y, z)
    }
}

fn any_perpendicular(z: &Vector3<f64>) -> Vector3<f64> {
    let helper = if z.x.abs() < 0.9 {
        Vector3::x()
    } else {
        Vector3::y()
    };
    (helper - z * helper.dot(z)).normalize()
}
