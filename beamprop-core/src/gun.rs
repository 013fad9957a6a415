//! Particle generators for Monte Carlo ensembles and parameter scans

use crate::parameters::Parameters;
use crate::particle::Particle;
use crate::state_vector::StateVector;
use rand::Rng;
use rand_distr::{Distribution as _, Normal};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GunError {
    #[error("invalid {parameter} distribution: {reason}")]
    InvalidDistribution {
        parameter: GunParameter,
        reason: String,
    },
}

/// Coordinates a particle gun can sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GunParameter {
    X,
    Y,
    Tx,
    Ty,
    Energy,
}

impl fmt::Display for GunParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GunParameter::X => "x",
            GunParameter::Y => "y",
            GunParameter::Tx => "Tx",
            GunParameter::Ty => "Ty",
            GunParameter::Energy => "energy",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Distribution {
    Fixed(f64),
    Gaussian { mean: f64, sigma: f64 },
    /// Uniform in `[min, max)`
    Flat { min: f64, max: f64 },
}

impl Distribution {
    pub fn mean(&self) -> f64 {
        match *self {
            Distribution::Fixed(value) => value,
            Distribution::Gaussian { mean, .. } => mean,
            Distribution::Flat { min, max } => 0.5 * (min + max),
        }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match *self {
            Distribution::Fixed(value) => value,
            Distribution::Gaussian { mean, sigma } if sigma > 0.0 => match Normal::new(mean, sigma) {
                Ok(normal) => normal.sample(rng),
                Err(_) => mean,
            },
            Distribution::Gaussian { mean, .. } => mean,
            Distribution::Flat { min, max } if max > min => rng.gen_range(min..max),
            Distribution::Flat { min, .. } => min,
        }
    }

    fn validate(&self) -> Result<(), String> {
        match *self {
            Distribution::Fixed(value) if !value.is_finite() => {
                Err(format!("value {} is not finite", value))
            }
            Distribution::Gaussian { mean, sigma } if !mean.is_finite() || !sigma.is_finite() => {
                Err(format!("mean {} or width {} is not finite", mean, sigma))
            }
            Distribution::Gaussian { sigma, .. } if sigma < 0.0 => {
                Err(format!("negative width {}", sigma))
            }
            Distribution::Flat { min, max } if !min.is_finite() || !max.is_finite() => {
                Err(format!("limits [{}, {}] are not finite", min, max))
            }
            Distribution::Flat { min, max } if max < min => {
                Err(format!("lower limit {} exceeds upper limit {}", min, max))
            }
            _ => Ok(()),
        }
    }
}

/// Random generator of beam particles at `s = 0`.
///
/// Every coordinate defaults to a fixed value: zero for positions and
/// angles, the nominal beam energy for the energy.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticleGun {
    beam_energy: f64,
    charge: i32,
    mass: f64,
    x: Distribution,
    y: Distribution,
    tx: Distribution,
    ty: Distribution,
    energy: Distribution,
}

impl ParticleGun {
    pub fn new(params: &Parameters) -> Self {
        Self {
            beam_energy: params.beam_energy,
            charge: params.beam_particles_charge,
            mass: params.beam_particles_mass,
            x: Distribution::Fixed(0.0),
            y: Distribution::Fixed(0.0),
            tx: Distribution::Fixed(0.0),
            ty: Distribution::Fixed(0.0),
            energy: Distribution::Fixed(params.beam_energy),
        }
    }

    pub fn with_charge(mut self, charge: i32) -> Self {
        self.charge = charge;
        self
    }

    pub fn with_mass(mut self, mass: f64) -> Self {
        self.mass = mass;
        self
    }

    pub fn distribution(&self, parameter: GunParameter) -> Distribution {
        match parameter {
            GunParameter::X => self.x,
            GunParameter::Y => self.y,
            GunParameter::Tx => self.tx,
            GunParameter::Ty => self.ty,
            GunParameter::Energy => self.energy,
        }
    }

    pub fn set(
        &mut self,
        parameter: GunParameter,
        distribution: Distribution,
    ) -> Result<(), GunError> {
        distribution
            .validate()
            .map_err(|reason| GunError::InvalidDistribution { parameter, reason })?;
        let slot = match parameter {
            GunParameter::X => &mut self.x,
            GunParameter::Y => &mut self.y,
            GunParameter::Tx => &mut self.tx,
            GunParameter::Ty => &mut self.ty,
            GunParameter::Energy => &mut self.energy,
        };
        *slot = distribution;
        Ok(())
    }

    /// Gaussian smearing around `mean`
    pub fn smear(&mut self, parameter: GunParameter, mean: f64, sigma: f64) -> Result<(), GunError> {
        self.set(parameter, Distribution::Gaussian { mean, sigma })
    }

    /// Flat distribution between `min` and `max`
    pub fn set_limits(
        &mut self,
        parameter: GunParameter,
        min: f64,
        max: f64,
    ) -> Result<(), GunError> {
        self.set(parameter, Distribution::Flat { min, max })
    }

    /// Gaussian smearing of the momentum loss, expressed on the energy
    pub fn smear_xi(&mut self, mean: f64, sigma: f64) -> Result<(), GunError> {
        self.smear(
            GunParameter::Energy,
            self.beam_energy * (1.0 - mean),
            self.beam_energy * sigma,
        )
    }

    pub fn shoot<R: Rng + ?Sized>(&self, rng: &mut R) -> Particle {
        let energy = self.energy.sample(rng);
        let state = StateVector::new(
            self.x.sample(rng),
            self.tx.sample(rng),
            self.y.sample(rng),
            self.ty.sample(rng),
            1.0 - energy / self.beam_energy,
        );
        Particle::new(0.0, state, self.charge, self.mass)
    }
}

/// Coordinate varied by a [`LinearScanner`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanVariable {
    X,
    Y,
    Tx,
    Ty,
    Xi,
}

/// Deterministic generator of `count` particles evenly spaced in one
/// coordinate between `min` and `max` (both included).
#[derive(Debug, Clone)]
pub struct LinearScanner {
    variable: ScanVariable,
    min: f64,
    max: f64,
    count: usize,
    next: usize,
    base: StateVector,
    charge: i32,
    mass: f64,
}

impl LinearScanner {
    pub fn new(variable: ScanVariable, count: usize, min: f64, max: f64, params: &Parameters) -> Self {
        Self {
            variable,
            min,
            max,
            count,
            next: 0,
            base: StateVector::default(),
            charge: params.beam_particles_charge,
            mass: params.beam_particles_mass,
        }
    }

    /// State used for the coordinates that are not scanned
    pub fn with_base(mut self, base: StateVector) -> Self {
        self.base = base;
        self
    }

    fn value(&self, index: usize) -> f64 {
        if self.count < 2 {
            return self.min;
        }
        self.min + (self.max - self.min) * index as f64 / (self.count - 1) as f64
    }
}

impl Iterator for LinearScanner {
    type Item = Particle;

    fn next(&mut self) -> Option<Particle> {
        if self.next >= self.count {
            return None;
        }
        let value = self.value(self.next);
        self.next += 1;
        let b = self.base;
        let state = match self.variable {
            ScanVariable::X => StateVector::new(value, b.tx(), b.y(), b.ty(), b.xi()),
            ScanVariable::Tx => StateVector::new(b.x(), value, b.y(), b.ty(), b.xi()),
            ScanVariable::Y => StateVector::new(b.x(), b.tx(), value, b.ty(), b.xi()),
            ScanVariable::Ty => StateVector::new(b.x(), b.tx(), b.y(), value, b.xi()),
            ScanVariable::Xi => b.with_xi(value),
        };
        Some(Particle::new(0.0, state, self.charge, self.mass))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.count - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for LinearScanner {}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_default_gun_shoots_nominal_particle() {
        let params = Parameters::default();
        let gun = ParticleGun::new(&params);
        let mut rng = StdRng::seed_from_u64(1);
        let particle = gun.shoot(&mut rng);
        let state = particle.first_position().state;
        assert_eq!(state, StateVector::default());
        assert_eq!(particle.xi(), 0.0);
        assert_eq!(particle.first_s(), 0.0);
        assert_eq!(particle.charge(), 1);
    }

    #[test]
    fn test_seeded_guns_are_reproducible() {
        let params = Parameters::default();
        let mut gun = ParticleGun::new(&params);
        gun.smear(GunParameter::X, 0.0, 1e-5).unwrap();
        gun.smear(GunParameter::Ty, 1e-4, 2e-5).unwrap();
        gun.smear_xi(0.05, 0.01).unwrap();

        let mut a = StdRng::seed_from_u64(42);
        let mut b = StdRng::seed_from_u64(42);
        for _ in 0..10 {
            assert_eq!(gun.shoot(&mut a), gun.shoot(&mut b));
        }
    }

    #[test]
    fn test_gaussian_smearing_statistics() {
        let params = Parameters::default();
        let mut gun = ParticleGun::new(&params);
        gun.smear(GunParameter::Tx, 1e-4, 1e-5).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let n = 5000;
        let mean = (0..n)
            .map(|_| gun.shoot(&mut rng).first_position().state.tx())
            .sum::<f64>()
            / n as f64;
        assert!((mean - 1e-4).abs() < 1e-6);
    }

    #[test]
    fn test_flat_limits() {
        let params = Parameters::default();
        let mut gun = ParticleGun::new(&params);
        gun.set_limits(GunParameter::Y, -1e-3, 1e-3).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..100 {
            let y = gun.shoot(&mut rng).first_position().state.y();
            assert!((-1e-3..1e-3).contains(&y));
        }
    }

    #[test]
    fn test_invalid_width_rejected() {
        let params = Parameters::default();
        let mut gun = ParticleGun::new(&params);
        let err = gun.smear(GunParameter::X, 0.0, -1.0).unwrap_err();
        assert!(matches!(
            err,
            GunError::InvalidDistribution { parameter: GunParameter::X, .. }
        ));
        assert!(gun.set_limits(GunParameter::Energy, 10.0, 1.0).is_err());
        assert_eq!(gun.distribution(GunParameter::X), Distribution::Fixed(0.0));
    }

    #[test]
    fn test_energy_sets_xi() {
        let params = Parameters::default();
        let mut gun = ParticleGun::new(&params);
        gun.set(GunParameter::Energy, Distribution::Fixed(5850.0)).unwrap();
        let particle = gun.shoot(&mut StdRng::seed_from_u64(0));
        assert!((particle.xi() - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_linear_scanner() {
        let params = Parameters::default();
        let scanner = LinearScanner::new(ScanVariable::Xi, 5, 0.0, 0.2, &params);
        assert_eq!(scanner.len(), 5);
        let xis: Vec<f64> = scanner.map(|p| p.xi()).collect();
        assert_eq!(xis.len(), 5);
        assert_eq!(xis[0], 0.0);
        assert!((xis[2] - 0.1).abs() < 1e-12);
        assert!((xis[4] - 0.2).abs() < 1e-12);

        let base = StateVector::new(0.0, 0.0, 0.0, 0.0, 0.05);
        let first = LinearScanner::new(ScanVariable::Tx, 3, -1e-4, 1e-4, &params)
            .with_base(base)
            .next()
            .unwrap();
        assert_eq!(first.first_position().state.tx(), -1e-4);
        assert_eq!(first.xi(), 0.05);
    }
}
