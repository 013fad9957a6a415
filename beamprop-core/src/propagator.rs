//! Transport of particles along a beamline
//!
//! The propagator walks the beamline elements in increasing `s`, applies
//! their transfer matrices and records the particle state at every element
//! boundary. Space between elements, and beyond the last one, is a free
//! drift. When aperture acceptance is enabled, each element's aperture is
//! checked at its entrance and at the end of the traversed segment; a
//! particle outside the clear aperture is stopped there.

use crate::beamline::Beamline;
use crate::element::Element;
use crate::optics::TransferMatrix;
use crate::parameters::{Kinematics, KinematicsError, Parameters};
use crate::particle::{Particle, ParticleError, Position};
use crate::state_vector::StateVector;
use glam::DVec2;
use log::debug;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PropagationError {
    #[error(transparent)]
    Kinematics(#[from] KinematicsError),
    #[error(transparent)]
    Particle(#[from] ParticleError),
    #[error("particle was stopped at s = {0} m and cannot be resumed")]
    AlreadyStopped(f64),
}

/// Where and by what a particle was intercepted
#[derive(Debug, Clone, PartialEq, Error)]
#[error(
    "particle stopped by {} \"{}\" at s = {:.4} m",
    .element.element_type(),
    .element.name,
    .s_at_stop
)]
pub struct ParticleStopped {
    pub element: Element,
    /// Position of the interception, within the element extent
    pub s_at_stop: f64,
    /// Transverse position at the interception
    pub position: DVec2,
    /// Samples recorded before the interception
    pub history: Vec<Position>,
}

/// Outcome of a propagation request
#[derive(Debug, Clone, PartialEq)]
pub enum Propagation {
    Reached { s: f64 },
    Stopped(ParticleStopped),
}

impl Propagation {
    pub fn is_stopped(&self) -> bool {
        matches!(self, Propagation::Stopped(_))
    }

    pub fn stop(&self) -> Option<&ParticleStopped> {
        match self {
            Propagation::Stopped(stop) => Some(stop),
            Propagation::Reached { .. } => None,
        }
    }

    /// The reached position, or the stop condition as an error
    pub fn into_result(self) -> Result<f64, ParticleStopped> {
        match self {
            Propagation::Reached { s } => Ok(s),
            Propagation::Stopped(stop) => Err(stop),
        }
    }
}

enum Walk {
    Reached(StateVector),
    Stopped {
        index: usize,
        s: f64,
        state: StateVector,
    },
}

/// Read-only view of a beamline able to transport particles through it
#[derive(Debug, Clone, Copy)]
pub struct Propagator<'a> {
    beamline: &'a Beamline,
    params: &'a Parameters,
}

impl<'a> Propagator<'a> {
    pub fn new(beamline: &'a Beamline, params: &'a Parameters) -> Self {
        Self { beamline, params }
    }

    pub fn beamline(&self) -> &'a Beamline {
        self.beamline
    }

    pub fn parameters(&self) -> &'a Parameters {
        self.params
    }

    /// Propagate from the initial state up to `s_target`.
    ///
    /// Any previously recorded history is discarded first.
    pub fn propagate(
        &self,
        particle: &mut Particle,
        s_target: f64,
    ) -> Result<Propagation, PropagationError> {
        particle.reset();
        self.advance(particle, s_target, true)
    }

    /// Continue from the last recorded sample up to `s_target`. A particle
    /// never propagated so far starts as with [`Propagator::propagate`].
    pub fn resume(
        &self,
        particle: &mut Particle,
        s_target: f64,
    ) -> Result<Propagation, PropagationError> {
        if particle.is_stopped() {
            return Err(PropagationError::AlreadyStopped(particle.last_s()));
        }
        let from_initial = particle.positions().len() == 1;
        self.advance(particle, s_target, from_initial)
    }

    /// State at `s` computed from the closest preceding sample through the
    /// element matrices.
    pub fn state_vector_at(
        &self,
        particle: &Particle,
        s: f64,
    ) -> Result<StateVector, PropagationError> {
        let (min, max) = (particle.first_s(), particle.last_s());
        let sample = particle
            .sample_before(s)
            .filter(|_| s <= max)
            .ok_or(ParticleError::OutOfRange { s, min, max })?;
        if sample.s == s {
            return Ok(sample.state);
        }
        // the initial sample precedes any thin element sitting at its position
        let from_initial = sample.s == min;
        let kin = particle.kinematics();
        match self.walk(sample.s, sample.state, s, &kin, from_initial, false, None)? {
            Walk::Reached(state) | Walk::Stopped { state, .. } => Ok(state),
        }
    }

    /// First element up to `s_max` whose aperture intercepts the recorded
    /// trajectory, checked at element boundaries.
    pub fn first_interception(
        &self,
        particle: &Particle,
        s_max: f64,
    ) -> Result<Option<&'a Element>, PropagationError> {
        let (min, max) = (particle.first_s(), particle.last_s().min(s_max));
        for element in self.beamline.iter() {
            if element.s > max {
                break;
            }
            if element.aperture.is_none() || element.end() < min {
                continue;
            }
            for s in [element.s.max(min), element.end().min(max)] {
                let state = self.state_vector_at(particle, s)?;
                if element.intercepts(state.position()) {
                    return Ok(Some(element));
                }
            }
        }
        Ok(None)
    }

    fn advance(
        &self,
        particle: &mut Particle,
        s_target: f64,
        include_start: bool,
    ) -> Result<Propagation, PropagationError> {
        let kin = particle.kinematics();
        self.params.rigidity_ratio(&kin)?;
        let start = *particle.last_position();
        if s_target <= start.s {
            return Ok(Propagation::Reached { s: start.s });
        }

        let check = self.params.compute_aperture_acceptance;
        match self.walk(
            start.s,
            start.state,
            s_target,
            &kin,
            include_start,
            check,
            Some(&mut *particle),
        )? {
            Walk::Reached(_) => Ok(Propagation::Reached { s: s_target }),
            Walk::Stopped { index, s, state } => {
                let element = self.beamline.elements()[index].clone();
                debug!(
                    "particle stopped in {} ({}) at s = {:.4} m",
                    element.name,
                    element.element_type(),
                    s
                );
                particle.set_stopped(true);
                Ok(Propagation::Stopped(ParticleStopped {
                    element,
                    s_at_stop: s,
                    position: state.position(),
                    history: particle.positions().to_vec(),
                }))
            }
        }
    }

    /// Transport `state` from `start_s` to `s_target`. Zero-length elements
    /// sitting at `start_s` are only applied when `include_start` is set.
    #[allow(clippy::too_many_arguments)]
    fn walk(
        &self,
        start_s: f64,
        state: StateVector,
        s_target: f64,
        kin: &Kinematics,
        include_start: bool,
        check_apertures: bool,
        mut history: Option<&mut Particle>,
    ) -> Result<Walk, KinematicsError> {
        let mut s = start_s;
        let mut state = state;
        let mut record = |s: f64, state: StateVector| {
            if let Some(particle) = history.as_deref_mut() {
                particle.record(s, state);
            }
        };

        for (index, element) in self.beamline.iter().enumerate() {
            if element.s > s_target {
                break;
            }
            if element.end() < s {
                continue;
            }
            if element.end() == s {
                let thin_here = element.length == 0.0 && (include_start || s > start_s);
                if !thin_here {
                    continue;
                }
            }

            let gap = element.s > s;
            if gap {
                state = TransferMatrix::drift(element.s - s) * state;
                s = element.s;
            }

            let from = s - element.s;
            if check_apertures && from == 0.0 && element.intercepts(state.position()) {
                return Ok(Walk::Stopped { index, s, state });
            }
            if gap {
                record(s, state);
            }

            let end = element.end().min(s_target);
            state = element.transport(state, from, end - element.s, kin, self.params)?;
            s = end;
            if check_apertures && element.intercepts(state.position()) {
                return Ok(Walk::Stopped { index, s, state });
            }
            record(s, state);
        }

        if s < s_target {
            state = TransferMatrix::drift(s_target - s) * state;
            record(s_target, state);
        }
        Ok(Walk::Reached(state))
    }
}
