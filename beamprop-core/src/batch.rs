//! Ensemble propagation
//!
//! Particles are independent, so an ensemble is either propagated one after
//! the other or, with the `parallel` feature, spread over the rayon thread
//! pool. An [`Interrupt`] is checked before each particle; a particle that
//! already started is always propagated to completion.

use crate::element::ElementType;
use crate::particle::Particle;
use crate::propagator::{Propagation, PropagationError, Propagator};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared flag requesting an ensemble run to stop early
#[derive(Debug, Clone, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

/// Number of particles stopped by one element
#[derive(Debug, Clone, PartialEq)]
pub struct StopCount {
    pub name: String,
    pub element_type: ElementType,
    pub count: usize,
}

/// Where the particles of an ensemble ended up
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StopTally {
    stopped: BTreeMap<String, (ElementType, usize)>,
    transmitted: usize,
}

impl StopTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, outcome: &Propagation) {
        match outcome {
            Propagation::Reached { .. } => self.transmitted += 1,
            Propagation::Stopped(stop) => {
                let entry = self
                    .stopped
                    .entry(stop.element.name.clone())
                    .or_insert((stop.element.element_type(), 0));
                entry.1 += 1;
            }
        }
    }

    pub fn merge(&mut self, other: &StopTally) {
        self.transmitted += other.transmitted;
        for (name, (element_type, count)) in &other.stopped {
            self.stopped
                .entry(name.clone())
                .or_insert((*element_type, 0))
                .1 += count;
        }
    }

    pub fn transmitted(&self) -> usize {
        self.transmitted
    }

    pub fn stopped(&self) -> usize {
        self.stopped.values().map(|(_, count)| count).sum()
    }

    pub fn total(&self) -> usize {
        self.transmitted + self.stopped()
    }

    /// Particles stopped by the element called `name`
    pub fn count(&self, name: &str) -> usize {
        self.stopped.get(name).map_or(0, |(_, count)| *count)
    }

    /// Stopping elements, most frequent first
    pub fn counts(&self) -> Vec<StopCount> {
        let mut counts: Vec<StopCount> = self
            .stopped
            .iter()
            .map(|(name, (element_type, count))| StopCount {
                name: name.clone(),
                element_type: *element_type,
                count: *count,
            })
            .collect();
        counts.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
        counts
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome {
    pub tally: StopTally,
    /// Number of particles propagated before completion or interruption
    pub processed: usize,
    pub interrupted: bool,
}

/// Propagate every particle up to `s_target`, one after the other
pub fn run_batch(
    propagator: &Propagator<'_>,
    particles: &mut [Particle],
    s_target: f64,
    interrupt: Option<&Interrupt>,
) -> Result<BatchOutcome, PropagationError> {
    let mut tally = StopTally::new();
    let mut processed = 0;
    for particle in particles.iter_mut() {
        if interrupt.map_or(false, Interrupt::is_triggered) {
            log::info!("ensemble interrupted after {} particles", processed);
            return Ok(BatchOutcome {
                tally,
                processed,
                interrupted: true,
            });
        }
        let outcome = propagator.propagate(particle, s_target)?;
        tally.record(&outcome);
        processed += 1;
    }
    Ok(BatchOutcome {
        tally,
        processed,
        interrupted: false,
    })
}

/// Parallel counterpart of [`run_batch`]. Particles not yet started when the
/// interrupt is triggered are left untouched.
#[cfg(feature = "parallel")]
pub fn run_parallel(
    propagator: &Propagator<'_>,
    particles: &mut [Particle],
    s_target: f64,
    interrupt: Option<&Interrupt>,
) -> Result<BatchOutcome, PropagationError> {
    use rayon::prelude::*;

    let outcomes = particles
        .par_iter_mut()
        .map(|particle| {
            if interrupt.map_or(false, Interrupt::is_triggered) {
                return Ok(None);
            }
            propagator.propagate(particle, s_target).map(Some)
        })
        .collect::<Result<Vec<_>, PropagationError>>()?;

    let mut tally = StopTally::new();
    let mut processed = 0;
    for outcome in outcomes.iter().flatten() {
        tally.record(outcome);
        processed += 1;
    }
    let interrupted = processed < particles.len();
    if interrupted {
        log::info!("ensemble interrupted after {} particles", processed);
    }
    Ok(BatchOutcome {
        tally,
        processed,
        interrupted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aperture::Aperture;
    use crate::beamline::Beamline;
    use crate::element::Element;
    use crate::parameters::Parameters;
    use crate::state_vector::StateVector;

    fn beamline() -> Beamline {
        Beamline::from_elements(vec![
            Element::drift("D", 0.0, 5.0),
            Element::collimator("TCL", 5.0, 1.0, Aperture::rectangular(5e-4, 5e-4)),
        ])
    }

    fn particles(params: &Parameters) -> Vec<Particle> {
        [0.0, 5e-5, 2e-4, -3e-4]
            .iter()
            .map(|&tx| Particle::from_state(StateVector::new(0.0, tx, 0.0, 0.0, 0.0), params))
            .collect()
    }

    #[test]
    fn test_run_batch_tallies_stops() {
        let params = Parameters::default();
        let beamline = beamline();
        let propagator = Propagator::new(&beamline, &params);
        let mut particles = particles(&params);
        let outcome = run_batch(&propagator, &mut particles, 10.0, None).unwrap();
        assert!(!outcome.interrupted);
        assert_eq!(outcome.processed, 4);
        assert_eq!(outcome.tally.transmitted(), 2);
        assert_eq!(outcome.tally.count("TCL"), 2);
        assert_eq!(outcome.tally.total(), 4);
        let counts = outcome.tally.counts();
        assert_eq!(counts[0].element_type, ElementType::RectangularCollimator);
    }

    #[test]
    fn test_triggered_interrupt_stops_before_first_particle() {
        let params = Parameters::default();
        let beamline = beamline();
        let propagator = Propagator::new(&beamline, &params);
        let mut particles = particles(&params);
        let interrupt = Interrupt::new();
        interrupt.trigger();
        let outcome = run_batch(&propagator, &mut particles, 10.0, Some(&interrupt)).unwrap();
        assert!(outcome.interrupted);
        assert_eq!(outcome.processed, 0);
        assert!(particles.iter().all(|p| p.positions().len() == 1));
    }

    #[test]
    fn test_merge_tallies() {
        let params = Parameters::default();
        let beamline = beamline();
        let propagator = Propagator::new(&beamline, &params);
        let mut particles = particles(&params);
        let first = run_batch(&propagator, &mut particles, 10.0, None).unwrap();
        let mut merged = first.tally.clone();
        merged.merge(&first.tally);
        assert_eq!(merged.total(), 8);
        assert_eq!(merged.count("TCL"), 4);
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_parallel_matches_sequential() {
        let params = Parameters::default();
        let beamline = beamline();
        let propagator = Propagator::new(&beamline, &params);
        let mut sequential = particles(&params);
        let mut parallel = particles(&params);
        let a = run_batch(&propagator, &mut sequential, 10.0, None).unwrap();
        let b = run_parallel(&propagator, &mut parallel, 10.0, None).unwrap();
        assert_eq!(a, b);
        assert_eq!(sequential, parallel);
    }
}
