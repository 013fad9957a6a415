use crate::batch::{self, Interrupt, StopTally};
use crate::diagnostics::Diagnostics;
use crate::gun::{Distribution, GunParameter, ParticleGun};
use crate::io::{self, Format, Header, ParserOptions};
use crate::parameters::Parameters;
use crate::particle::Particle;
use crate::propagator::Propagator;
use glam::DVec2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;

/// Settings of a Monte Carlo run over one optics file
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub optics: PathBuf,
    pub format: Format,
    pub parser: ParserOptions,
    pub parameters: Parameters,
    /// Position up to which particles are propagated (m)
    pub s_max: f64,
    pub particles: usize,
    pub seed: u64,
    /// Distributions overriding the particle gun defaults
    pub gun: Vec<(GunParameter, Distribution)>,
    /// Regular expression selecting the elements where hits are recorded
    pub detectors: Option<String>,
    pub parallel: bool,
}

impl SimulationConfig {
    pub fn new(optics: impl Into<PathBuf>, parser: ParserOptions) -> Self {
        Self {
            optics: optics.into(),
            format: Format::default(),
            parser,
            parameters: Parameters::default(),
            s_max: 250.0,
            particles: 1000,
            seed: 0,
            gun: Vec::new(),
            detectors: None,
            parallel: false,
        }
    }
}

/// Particles reaching a detector element
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorResult {
    pub name: String,
    pub s: f64,
    pub hits: usize,
    /// Mean transverse position of the hits
    pub mean_position: DVec2,
}

/// Final result of a simulation run
#[derive(Debug)]
pub struct SimulationResult {
    pub header: Header,
    pub parameters: Parameters,
    pub tally: StopTally,
    pub detectors: Vec<DetectorResult>,
    pub diagnostics: Diagnostics,
    pub interrupted: bool,
}

/// Main entry point: read the optics, shoot and propagate the particles
pub fn run_simulation(
    config: &SimulationConfig,
    interrupt: Option<&Interrupt>,
) -> Result<SimulationResult, Box<dyn std::error::Error>> {
    let optics = io::parse_optics(
        &config.optics,
        config.format,
        config.parser.clone(),
        &config.parameters,
    )?;

    let mut gun = ParticleGun::new(&optics.parameters);
    for (parameter, distribution) in &config.gun {
        gun.set(*parameter, *distribution)?;
    }
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut particles: Vec<Particle> = (0..config.particles)
        .map(|_| gun.shoot(&mut rng))
        .collect();

    let propagator = Propagator::new(&optics.beamline, &optics.parameters);
    let outcome = run_ensemble(&propagator, &mut particles, config, interrupt)?;

    let detectors = match &config.detectors {
        Some(pattern) => {
            let elements = optics.beamline.find(pattern)?;
            elements
                .into_iter()
                .map(|element| evaluate_detector(&element.name, element.s, &particles))
                .collect()
        }
        None => Vec::new(),
    };

    Ok(SimulationResult {
        header: optics.header,
        parameters: optics.parameters.clone(),
        tally: outcome.tally,
        detectors,
        diagnostics: optics.diagnostics,
        interrupted: outcome.interrupted,
    })
}

#[cfg(feature = "parallel")]
fn run_ensemble(
    propagator: &Propagator<'_>,
    particles: &mut [Particle],
    config: &SimulationConfig,
    interrupt: Option<&Interrupt>,
) -> Result<batch::BatchOutcome, crate::propagator::PropagationError> {
    if config.parallel {
        batch::run_parallel(propagator, particles, config.s_max, interrupt)
    } else {
        batch::run_batch(propagator, particles, config.s_max, interrupt)
    }
}

#[cfg(not(feature = "parallel"))]
fn run_ensemble(
    propagator: &Propagator<'_>,
    particles: &mut [Particle],
    config: &SimulationConfig,
    interrupt: Option<&Interrupt>,
) -> Result<batch::BatchOutcome, crate::propagator::PropagationError> {
    batch::run_batch(propagator, particles, config.s_max, interrupt)
}

/// Collect the positions at `s` of every particle tracked that far
pub fn evaluate_detector(name: &str, s: f64, particles: &[Particle]) -> DetectorResult {
    let positions: Vec<DVec2> = particles
        .iter()
        .filter_map(|p| p.state_vector_at(s).ok())
        .map(|state| state.position())
        .collect();
    let hits = positions.len();
    let mean_position = if hits > 0 {
        positions.iter().fold(DVec2::ZERO, |acc, p| acc + *p) / hits as f64
    } else {
        DVec2::ZERO
    };
    DetectorResult {
        name: name.to_string(),
        s,
        hits,
        mean_position,
    }
}
