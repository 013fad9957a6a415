//! Particles and their trajectory history

use crate::parameters::{Kinematics, Parameters};
use crate::state_vector::StateVector;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParticleError {
    #[error("s = {s} m is outside the tracked range [{min}, {max}] m")]
    OutOfRange { s: f64, min: f64, max: f64 },
    #[error("position at s = {s} m does not follow the last recorded s = {last} m")]
    NonIncreasingPosition { s: f64, last: f64 },
}

/// State of a particle at a longitudinal position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub s: f64,
    pub state: StateVector,
}

/// A particle with its recorded `(s, state)` history.
///
/// The history is never empty: its first entry is the initial state, and
/// positions are strictly increasing in `s`.
#[derive(Debug, Clone, PartialEq)]
pub struct Particle {
    charge: i32,
    mass: f64,
    positions: Vec<Position>,
    stopped: bool,
}

impl Particle {
    pub fn new(s: f64, initial: StateVector, charge: i32, mass: f64) -> Self {
        Self {
            charge,
            mass,
            positions: vec![Position { s, state: initial }],
            stopped: false,
        }
    }

    /// A beam particle at `s = 0`
    pub fn from_state(initial: StateVector, params: &Parameters) -> Self {
        Self::new(
            0.0,
            initial,
            params.beam_particles_charge,
            params.beam_particles_mass,
        )
    }

    pub fn charge(&self) -> i32 {
        self.charge
    }

    pub fn mass(&self) -> f64 {
        self.mass
    }

    pub fn xi(&self) -> f64 {
        self.first_position().state.xi()
    }

    pub fn kinematics(&self) -> Kinematics {
        Kinematics::new(self.xi(), self.mass, self.charge)
    }

    /// Change the momentum loss. The history is reset to the initial state,
    /// since previously propagated samples no longer apply.
    pub fn set_xi(&mut self, xi: f64) {
        self.reset();
        self.positions[0].state = self.positions[0].state.with_xi(xi);
    }

    /// Change the charge, resetting the history like [`Particle::set_xi`]
    pub fn set_charge(&mut self, charge: i32) {
        self.reset();
        self.charge = charge;
    }

    /// Change the mass, resetting the history like [`Particle::set_xi`]
    pub fn set_mass(&mut self, mass: f64) {
        self.reset();
        self.mass = mass;
    }

    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    pub fn first_position(&self) -> &Position {
        &self.positions[0]
    }

    pub fn last_position(&self) -> &Position {
        &self.positions[self.positions.len() - 1]
    }

    pub fn first_s(&self) -> f64 {
        self.first_position().s
    }

    pub fn last_s(&self) -> f64 {
        self.last_position().s
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Append a new sample beyond the last recorded one
    pub fn add_position(&mut self, s: f64, state: StateVector) -> Result<(), ParticleError> {
        let last = self.last_s();
        if s <= last {
            return Err(ParticleError::NonIncreasingPosition { s, last });
        }
        self.positions.push(Position { s, state });
        Ok(())
    }

    /// Drop everything but the initial state
    pub fn reset(&mut self) {
        self.positions.truncate(1);
        self.stopped = false;
    }

    /// Record a sample during propagation. A sample at the last recorded `s`
    /// (zero-length element) replaces it.
    pub(crate) fn record(&mut self, s: f64, state: StateVector) {
        let last = self.positions.len() - 1;
        if s <= self.positions[last].s {
            if last > 0 {
                self.positions[last].state = state;
            }
            return;
        }
        self.positions.push(Position { s, state });
    }

    pub(crate) fn set_stopped(&mut self, stopped: bool) {
        self.stopped = stopped;
    }

    /// State at `s`, interpolated linearly in position between the
    /// surrounding samples. Angles are those of the preceding sample.
    pub fn state_vector_at(&self, s: f64) -> Result<StateVector, ParticleError> {
        let (min, max) = (self.first_s(), self.last_s());
        if !(min..=max).contains(&s) {
            return Err(ParticleError::OutOfRange { s, min, max });
        }
        let upper = self.positions.partition_point(|p| p.s <= s);
        let lower = &self.positions[upper - 1];
        if lower.s == s || upper == self.positions.len() {
            return Ok(lower.state);
        }
        let next = &self.positions[upper];
        let t = (s - lower.s) / (next.s - lower.s);
        let position = lower.state.position().lerp(next.state.position(), t);
        Ok(lower.state.with_position(position))
    }

    /// Last sample at or before `s`
    pub(crate) fn sample_before(&self, s: f64) -> Option<&Position> {
        let upper = self.positions.partition_point(|p| p.s <= s);
        upper.checked_sub(1).map(|i| &self.positions[i])
    }
}

impl fmt::Display for Particle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Particle: charge = {}, mass = {} GeV, xi = {}{}",
            self.charge,
            self.mass,
            self.xi(),
            if self.stopped { " (stopped)" } else { "" }
        )?;
        for position in &self.positions {
            writeln!(f, "  s = {:>10.4} m: {}", position.s, position.state)?;
        }
        Ok(())
    }
}
