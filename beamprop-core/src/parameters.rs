//! Run configuration and beam kinematics
//!
//! `Parameters` is passed explicitly to parsers, propagators and particle
//! guns. Energies and masses are in GeV, charges in units of e.

use thiserror::Error;

/// Proton mass in GeV
pub const PROTON_MASS: f64 = 0.938_272_046;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum KinematicsError {
    #[error("unphysical momentum: energy {energy} GeV is below the particle mass {mass} GeV (xi = {xi})")]
    UnphysicalMomentum { xi: f64, energy: f64, mass: f64 },
    #[error("beam energy {energy} GeV does not exceed the beam particle mass {mass} GeV")]
    InvalidBeam { energy: f64, mass: f64 },
    #[error("beam particles must be charged")]
    NeutralBeam,
}

/// Kinematic properties of the particle being transported
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Kinematics {
    pub xi: f64,
    pub mass: f64,
    pub charge: i32,
}

impl Kinematics {
    pub fn new(xi: f64, mass: f64, charge: i32) -> Self {
        Self { xi, mass, charge }
    }

    /// A nominal beam particle
    pub fn nominal(params: &Parameters) -> Self {
        Self::new(0.0, params.beam_particles_mass, params.beam_particles_charge)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameters {
    /// Nominal beam energy (GeV)
    pub beam_energy: f64,
    /// Mass of the beam particles (GeV)
    pub beam_particles_mass: f64,
    /// Charge of the beam particles (e)
    pub beam_particles_charge: i32,
    /// Split elements whose extents overlap when building a beamline
    pub correct_beamline_overlaps: bool,
    /// Check element apertures while propagating
    pub compute_aperture_acceptance: bool,
    pub enable_kickers: bool,
    pub enable_dipoles: bool,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            beam_energy: 6500.0,
            beam_particles_mass: PROTON_MASS,
            beam_particles_charge: 1,
            correct_beamline_overlaps: true,
            compute_aperture_acceptance: true,
            enable_kickers: false,
            enable_dipoles: true,
        }
    }
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_beam_energy(mut self, energy: f64) -> Self {
        self.beam_energy = energy;
        self
    }

    pub fn with_beam_particles_mass(mut self, mass: f64) -> Self {
        self.beam_particles_mass = mass;
        self
    }

    pub fn with_beam_particles_charge(mut self, charge: i32) -> Self {
        self.beam_particles_charge = charge;
        self
    }

    pub fn with_overlaps_correction(mut self, enabled: bool) -> Self {
        self.correct_beamline_overlaps = enabled;
        self
    }

    pub fn with_aperture_acceptance(mut self, enabled: bool) -> Self {
        self.compute_aperture_acceptance = enabled;
        self
    }

    pub fn with_kickers(mut self, enabled: bool) -> Self {
        self.enable_kickers = enabled;
        self
    }

    pub fn with_dipoles(mut self, enabled: bool) -> Self {
        self.enable_dipoles = enabled;
        self
    }

    /// Fractional momentum loss of a particle with energy `energy`
    pub fn e_to_xi(&self, energy: f64) -> f64 {
        1.0 - energy / self.beam_energy
    }

    /// Energy of a particle with fractional momentum loss `xi`
    pub fn xi_to_e(&self, xi: f64) -> f64 {
        self.beam_energy * (1.0 - xi)
    }

    /// Momentum of the nominal beam particle (GeV)
    pub fn beam_momentum(&self) -> Result<f64, KinematicsError> {
        momentum(self.beam_energy, self.beam_particles_mass).ok_or(KinematicsError::InvalidBeam {
            energy: self.beam_energy,
            mass: self.beam_particles_mass,
        })
    }

    /// Ratio of the nominal magnetic rigidity to the particle's, (p0/p)·(q/q0).
    ///
    /// Magnet strengths are quoted for the nominal beam particle and are
    /// multiplied by this ratio for any other particle. Zero for neutral
    /// particles.
    pub fn rigidity_ratio(&self, kin: &Kinematics) -> Result<f64, KinematicsError> {
        if self.beam_particles_charge == 0 {
            return Err(KinematicsError::NeutralBeam);
        }
        let p0 = self.beam_momentum()?;
        let energy = self.xi_to_e(kin.xi);
        let p = momentum(energy, kin.mass).ok_or(KinematicsError::UnphysicalMomentum {
            xi: kin.xi,
            energy,
            mass: kin.mass,
        })?;
        Ok(p0 / p * f64::from(kin.charge) / f64::from(self.beam_particles_charge))
    }
}

/// Momentum of a particle from its energy and mass, if physical
fn momentum(energy: f64, mass: f64) -> Option<f64> {
    let p2 = energy * energy - mass * mass;
    (p2 > 0.0 && p2.is_finite()).then(|| p2.sqrt())
}
