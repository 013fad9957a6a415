//! Linear transfer matrices of the element families
//!
//! Matrices act on the homogeneous state (x, Tx, y, Ty, xi, 1). The last
//! column holds constant terms such as kicks or the dispersion of
//! off-momentum particles.

use crate::state_vector::{K, TX, TY, X, Y};
use nalgebra::Matrix6;
use std::fmt;
use std::ops::Mul;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferMatrix(Matrix6<f64>);

impl TransferMatrix {
    pub fn identity() -> Self {
        Self(Matrix6::identity())
    }

    pub fn as_matrix(&self) -> &Matrix6<f64> {
        &self.0
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.0[(row, col)]
    }

    /// Largest absolute difference between two matrices
    pub fn max_abs_diff(&self, other: &TransferMatrix) -> f64 {
        (self.0 - other.0).amax()
    }

    /// Field-free straight section
    pub fn drift(length: f64) -> Self {
        let mut m = Matrix6::identity();
        m[(X, TX)] = length;
        m[(Y, TY)] = length;
        Self(m)
    }

    /// Thick quadrupole of effective strength `k` (m^-2).
    ///
    /// `k > 0` focuses in the horizontal plane and defocuses in the vertical
    /// one; `k < 0` does the opposite.
    pub fn quadrupole(length: f64, k: f64) -> Self {
        if k == 0.0 {
            return Self::drift(length);
        }
        let omega = k.abs().sqrt();
        let focusing = focusing_block(length, omega);
        let defocusing = defocusing_block(length, omega);
        let (horizontal, vertical) = if k > 0.0 {
            (focusing, defocusing)
        } else {
            (defocusing, focusing)
        };
        let mut m = Matrix6::identity();
        set_block(&mut m, X, horizontal);
        set_block(&mut m, Y, vertical);
        Self(m)
    }

    /// Horizontal sector bend of reference curvature `h` (m^-1) seen by a
    /// particle whose rigidity differs from the nominal one by `delta`.
    pub fn sector_dipole(length: f64, h: f64, delta: f64) -> Self {
        if h == 0.0 {
            return Self::drift(length);
        }
        let theta = h * length;
        let (sin, cos) = theta.sin_cos();
        let mut m = Matrix6::identity();
        set_block(&mut m, X, [[cos, sin / h], [-h * sin, cos]]);
        m[(Y, TY)] = length;
        m[(X, K)] = delta * (1.0 - cos) / h;
        m[(TX, K)] = delta * sin;
        Self(m)
    }

    /// Thin edge focusing of a dipole face inclined by `edge_angle` with
    /// respect to the reference trajectory.
    pub fn dipole_edge(h: f64, edge_angle: f64) -> Self {
        let strength = h * edge_angle.tan();
        let mut m = Matrix6::identity();
        m[(TX, X)] = strength;
        m[(TY, Y)] = -strength;
        Self(m)
    }

    /// Horizontal kick of `angle` spread over `length`
    pub fn horizontal_kicker(length: f64, angle: f64) -> Self {
        let mut m = Self::drift(length).0;
        m[(X, K)] = length * angle.tan() / 2.0;
        m[(TX, K)] = angle;
        Self(m)
    }

    /// Vertical kick of `angle` spread over `length`
    pub fn vertical_kicker(length: f64, angle: f64) -> Self {
        let mut m = Self::drift(length).0;
        m[(Y, K)] = length * angle.tan() / 2.0;
        m[(TY, K)] = angle;
        Self(m)
    }
}

fn focusing_block(length: f64, omega: f64) -> [[f64; 2]; 2] {
    let (sin, cos) = (omega * length).sin_cos();
    [[cos, sin / omega], [-omega * sin, cos]]
}

fn defocusing_block(length: f64, omega: f64) -> [[f64; 2]; 2] {
    let phase = omega * length;
    let (sinh, cosh) = (phase.sinh(), phase.cosh());
    [[cosh, sinh / omega], [omega * sinh, cosh]]
}

fn set_block(m: &mut Matrix6<f64>, first: usize, block: [[f64; 2]; 2]) {
    for (i, row) in block.iter().enumerate() {
        for (j, value) in row.iter().enumerate() {
            m[(first + i, first + j)] = *value;
        }
    }
}

impl Default for TransferMatrix {
    fn default() -> Self {
        Self::identity()
    }
}

impl Mul for TransferMatrix {
    type Output = TransferMatrix;

    fn mul(self, rhs: TransferMatrix) -> TransferMatrix {
        TransferMatrix(self.0 * rhs.0)
    }
}

impl fmt::Display for TransferMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in self.0.row_iter() {
            let cells: Vec<String> = row.iter().map(|v| format!("{:>12.5e}", v)).collect();
            writeln!(f, "{}", cells.join(" "))?;
        }
        Ok(())
    }
}
