//! Phase-space state of a particle at a given `s`
//!
//! The five physical coordinates (x, Tx, y, Ty, xi) are stored together with
//! a constant sixth component equal to 1. The extra component lets transfer
//! matrices carry constant terms (kicks, dispersion offsets).

use crate::optics::TransferMatrix;
use crate::parameters::Parameters;
use glam::DVec2;
use nalgebra::Vector6;
use std::fmt;
use std::ops::{Add, Mul, Sub};

pub(crate) const X: usize = 0;
pub(crate) const TX: usize = 1;
pub(crate) const Y: usize = 2;
pub(crate) const TY: usize = 3;
pub(crate) const XI: usize = 4;
pub(crate) const K: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateVector {
    vector: Vector6<f64>,
}

impl StateVector {
    pub fn new(x: f64, tx: f64, y: f64, ty: f64, xi: f64) -> Self {
        Self {
            vector: Vector6::new(x, tx, y, ty, xi, 1.0),
        }
    }

    pub fn from_position_angles(position: DVec2, angles: DVec2, xi: f64) -> Self {
        Self::new(position.x, angles.x, position.y, angles.y, xi)
    }

    pub fn x(&self) -> f64 {
        self.vector[X]
    }

    pub fn tx(&self) -> f64 {
        self.vector[TX]
    }

    pub fn y(&self) -> f64 {
        self.vector[Y]
    }

    pub fn ty(&self) -> f64 {
        self.vector[TY]
    }

    pub fn xi(&self) -> f64 {
        self.vector[XI]
    }

    /// Transverse position (m)
    pub fn position(&self) -> DVec2 {
        DVec2::new(self.x(), self.y())
    }

    /// Transverse angles (rad)
    pub fn angles(&self) -> DVec2 {
        DVec2::new(self.tx(), self.ty())
    }

    pub fn with_position(mut self, position: DVec2) -> Self {
        self.vector[X] = position.x;
        self.vector[Y] = position.y;
        self
    }

    pub fn with_angles(mut self, angles: DVec2) -> Self {
        self.vector[TX] = angles.x;
        self.vector[TY] = angles.y;
        self
    }

    pub fn with_xi(mut self, xi: f64) -> Self {
        self.vector[XI] = xi;
        self
    }

    /// Particle energy (GeV) for the beam described by `params`
    pub fn energy(&self, params: &Parameters) -> f64 {
        params.xi_to_e(self.xi())
    }

    pub(crate) fn as_vector(&self) -> &Vector6<f64> {
        &self.vector
    }

    pub(crate) fn from_vector(vector: Vector6<f64>) -> Self {
        let mut vector = vector;
        vector[K] = 1.0;
        Self { vector }
    }
}

impl Default for StateVector {
    fn default() -> Self {
        Self::new(0.0, 0.0, 0.0, 0.0, 0.0)
    }
}

impl Add for StateVector {
    type Output = StateVector;

    fn add(self, rhs: StateVector) -> StateVector {
        StateVector::from_vector(self.vector + rhs.vector)
    }
}

impl Sub for StateVector {
    type Output = StateVector;

    fn sub(self, rhs: StateVector) -> StateVector {
        StateVector::from_vector(self.vector - rhs.vector)
    }
}

impl Mul<StateVector> for TransferMatrix {
    type Output = StateVector;

    fn mul(self, rhs: StateVector) -> StateVector {
        StateVector::from_vector(self.as_matrix() * rhs.vector)
    }
}

impl fmt::Display for StateVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "x = {:.3e} m, Tx = {:.3e} rad, y = {:.3e} m, Ty = {:.3e} rad, xi = {:.4}",
            self.x(),
            self.tx(),
            self.y(),
            self.ty(),
            self.xi()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors() {
        let sv = StateVector::new(1e-3, 2e-4, -1e-3, -2e-4, 0.05);
        assert_eq!(sv.x(), 1e-3);
        assert_eq!(sv.tx(), 2e-4);
        assert_eq!(sv.y(), -1e-3);
        assert_eq!(sv.ty(), -2e-4);
        assert_eq!(sv.xi(), 0.05);
        assert_eq!(sv.position(), DVec2::new(1e-3, -1e-3));
        assert_eq!(sv.angles(), DVec2::new(2e-4, -2e-4));
    }

    #[test]
    fn test_arithmetic_keeps_homogeneous_component() {
        let a = StateVector::new(1.0, 2.0, 3.0, 4.0, 0.1);
        let b = StateVector::new(0.5, 0.5, 0.5, 0.5, 0.0);
        let sum = a + b;
        assert_eq!(sum.x(), 1.5);
        assert_eq!(sum.as_vector()[K], 1.0);
        let diff = a - b;
        assert_eq!(diff.ty(), 3.5);
        assert_eq!(diff.as_vector()[K], 1.0);
    }

    #[test]
    fn test_identity_transport() {
        let sv = StateVector::new(1.0, 2.0, 3.0, 4.0, 0.1);
        assert_eq!(TransferMatrix::identity() * sv, sv);
    }

    #[test]
    fn test_energy() {
        let params = Parameters::default();
        let sv = StateVector::default().with_xi(0.1);
        assert!((sv.energy(&params) - 5850.0).abs() < 1e-9);
    }
}
