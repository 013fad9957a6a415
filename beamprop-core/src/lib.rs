pub mod aperture;
pub mod batch;
pub mod beamline;
pub mod diagnostics;
pub mod element;
pub mod gun;
pub mod io;
pub mod optics;
pub mod parameters;
pub mod particle;
pub mod propagator;
pub mod runtime;
pub mod state_vector;

pub use aperture::{Aperture, ApertureShape};
pub use batch::{run_batch, BatchOutcome, Interrupt, StopCount, StopTally};
#[cfg(feature = "parallel")]
pub use batch::run_parallel;
pub use beamline::{Beamline, BeamlineError};
pub use diagnostics::{Diagnostic, DiagnosticSeverity, Diagnostics};
pub use element::{CollimatorShape, Element, ElementKind, ElementType};
pub use gun::{Distribution, GunError, GunParameter, LinearScanner, ParticleGun, ScanVariable};
pub use io::{
    parse_optics, read_header, Direction, Format, Header, MadxParser, OpticsParser, ParseError,
    ParsedOptics, ParserOptions, TwissParser,
};
pub use optics::TransferMatrix;
pub use parameters::{Kinematics, KinematicsError, Parameters};
pub use particle::{Particle, ParticleError, Position};
pub use propagator::{Propagation, PropagationError, ParticleStopped, Propagator};
pub use runtime::{run_simulation, DetectorResult, SimulationConfig, SimulationResult};
pub use state_vector::StateVector;
