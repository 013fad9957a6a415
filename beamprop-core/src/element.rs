//! Beamline elements and their optical behaviour

use crate::aperture::{Aperture, ApertureShape};
use crate::optics::TransferMatrix;
use crate::parameters::{Kinematics, KinematicsError, Parameters};
use crate::state_vector::StateVector;
use glam::DVec2;
use log::debug;
use std::fmt;

/// Element family, without its optical parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ElementType {
    Marker,
    Drift,
    Monitor,
    Instrument,
    Placeholder,
    SectorDipole,
    RectangularDipole,
    HorizontalQuadrupole,
    VerticalQuadrupole,
    HorizontalKicker,
    VerticalKicker,
    Collimator,
    RectangularCollimator,
    EllipticalCollimator,
    CircularCollimator,
    Sextupole,
    Multipole,
    Solenoid,
}

impl ElementType {
    pub fn name(&self) -> &'static str {
        match self {
            ElementType::Marker => "marker",
            ElementType::Drift => "drift",
            ElementType::Monitor => "monitor",
            ElementType::Instrument => "instrument",
            ElementType::Placeholder => "placeholder",
            ElementType::SectorDipole => "sector dipole",
            ElementType::RectangularDipole => "rectangular dipole",
            ElementType::HorizontalQuadrupole => "horizontal quadrupole",
            ElementType::VerticalQuadrupole => "vertical quadrupole",
            ElementType::HorizontalKicker => "horizontal kicker",
            ElementType::VerticalKicker => "vertical kicker",
            ElementType::Collimator => "collimator",
            ElementType::RectangularCollimator => "rectangular collimator",
            ElementType::EllipticalCollimator => "elliptical collimator",
            ElementType::CircularCollimator => "circular collimator",
            ElementType::Sextupole => "sextupole",
            ElementType::Multipole => "multipole",
            ElementType::Solenoid => "solenoid",
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollimatorShape {
    Generic,
    Rectangular,
    Elliptical,
    Circular,
}

/// Element family together with the parameters its optics depend on
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ElementKind {
    Marker,
    Drift,
    Monitor,
    Instrument,
    Placeholder,
    Collimator(CollimatorShape),
    /// Bend with reference curvature `h` (m^-1)
    SectorDipole { h: f64 },
    /// Bend with parallel faces, same curvature convention as sector bends
    RectangularDipole { h: f64 },
    /// Normalised gradient `k1` (m^-2), positive when focusing horizontally
    Quadrupole { k1: f64 },
    /// Total deflection `kick` (rad) for the nominal particle
    HorizontalKicker { kick: f64 },
    VerticalKicker { kick: f64 },
    // non-linear, transported as drifts
    Sextupole,
    Multipole,
    Solenoid,
}

impl ElementKind {
    pub fn element_type(&self) -> ElementType {
        match self {
            ElementKind::Marker => ElementType::Marker,
            ElementKind::Drift => ElementType::Drift,
            ElementKind::Monitor => ElementType::Monitor,
            ElementKind::Instrument => ElementType::Instrument,
            ElementKind::Placeholder => ElementType::Placeholder,
            ElementKind::Collimator(shape) => match shape {
                CollimatorShape::Generic => ElementType::Collimator,
                CollimatorShape::Rectangular => ElementType::RectangularCollimator,
                CollimatorShape::Elliptical => ElementType::EllipticalCollimator,
                CollimatorShape::Circular => ElementType::CircularCollimator,
            },
            ElementKind::SectorDipole { .. } => ElementType::SectorDipole,
            ElementKind::RectangularDipole { .. } => ElementType::RectangularDipole,
            ElementKind::Quadrupole { k1 } if *k1 >= 0.0 => ElementType::HorizontalQuadrupole,
            ElementKind::Quadrupole { .. } => ElementType::VerticalQuadrupole,
            ElementKind::HorizontalKicker { .. } => ElementType::HorizontalKicker,
            ElementKind::VerticalKicker { .. } => ElementType::VerticalKicker,
            ElementKind::Sextupole => ElementType::Sextupole,
            ElementKind::Multipole => ElementType::Multipole,
            ElementKind::Solenoid => ElementType::Solenoid,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub name: String,
    pub kind: ElementKind,
    /// Longitudinal position of the entrance (m)
    pub s: f64,
    pub length: f64,
    pub aperture: Option<Aperture>,
    /// Transverse misalignment of the element axis
    pub position: DVec2,
    /// Angular misalignment of the element axis
    pub angles: DVec2,
    pub beta: DVec2,
    pub dispersion: DVec2,
    /// Closed orbit position quoted by the optics file
    pub relative_position: DVec2,
}

impl Element {
    pub fn new(name: impl Into<String>, kind: ElementKind, s: f64, length: f64) -> Self {
        Self {
            name: name.into(),
            kind,
            s,
            length,
            aperture: None,
            position: DVec2::ZERO,
            angles: DVec2::ZERO,
            beta: DVec2::ZERO,
            dispersion: DVec2::ZERO,
            relative_position: DVec2::ZERO,
        }
    }

    pub fn drift(name: impl Into<String>, s: f64, length: f64) -> Self {
        Self::new(name, ElementKind::Drift, s, length)
    }

    pub fn marker(name: impl Into<String>, s: f64) -> Self {
        Self::new(name, ElementKind::Marker, s, 0.0)
    }

    pub fn quadrupole(name: impl Into<String>, s: f64, length: f64, k1: f64) -> Self {
        Self::new(name, ElementKind::Quadrupole { k1 }, s, length)
    }

    pub fn sector_dipole(name: impl Into<String>, s: f64, length: f64, h: f64) -> Self {
        Self::new(name, ElementKind::SectorDipole { h }, s, length)
    }

    pub fn rectangular_dipole(name: impl Into<String>, s: f64, length: f64, h: f64) -> Self {
        Self::new(name, ElementKind::RectangularDipole { h }, s, length)
    }

    pub fn collimator(name: impl Into<String>, s: f64, length: f64, aperture: Aperture) -> Self {
        let shape = match aperture.shape {
            ApertureShape::Rectangular { .. } => CollimatorShape::Rectangular,
            ApertureShape::Elliptic { .. } => CollimatorShape::Elliptical,
            ApertureShape::Circular { .. } => CollimatorShape::Circular,
            ApertureShape::RectElliptic { .. } => CollimatorShape::Generic,
        };
        Self::new(name, ElementKind::Collimator(shape), s, length).with_aperture(aperture)
    }

    pub fn with_aperture(mut self, aperture: Aperture) -> Self {
        self.aperture = Some(aperture);
        self
    }

    pub fn with_position(mut self, position: DVec2) -> Self {
        self.position = position;
        self
    }

    pub fn with_beta(mut self, beta: DVec2) -> Self {
        self.beta = beta;
        self
    }

    pub fn with_dispersion(mut self, dispersion: DVec2) -> Self {
        self.dispersion = dispersion;
        self
    }

    pub fn with_relative_position(mut self, relative_position: DVec2) -> Self {
        self.relative_position = relative_position;
        self
    }

    pub fn element_type(&self) -> ElementType {
        self.kind.element_type()
    }

    /// Longitudinal position of the exit (m)
    pub fn end(&self) -> f64 {
        self.s + self.length
    }

    /// True if `s` lies within the element's extent
    pub fn covers(&self, s: f64) -> bool {
        s >= self.s && s <= self.end()
    }

    /// True if a particle at transverse position `point` is intercepted by
    /// the element's aperture. Elements without aperture intercept nothing.
    pub fn intercepts(&self, point: DVec2) -> bool {
        self.aperture
            .as_ref()
            .map_or(false, |aperture| !aperture.contains(point))
    }

    /// Shift the element and its aperture in the transverse plane
    pub fn offset(&mut self, offset: DVec2) {
        self.position += offset;
        if let Some(aperture) = self.aperture.as_mut() {
            aperture.offset(offset);
        }
    }

    pub fn tilt(&mut self, tilt: DVec2) {
        self.angles += tilt;
    }

    /// Transfer matrix from the entrance up to `length` into the element
    pub fn transfer_matrix(
        &self,
        length: f64,
        kin: &Kinematics,
        params: &Parameters,
    ) -> Result<TransferMatrix, KinematicsError> {
        self.segment_matrix(0.0, length, kin, params)
    }

    /// Transfer matrix of the sub-segment `[from, to]`, both measured from
    /// the entrance and clamped to the element extent.
    pub fn segment_matrix(
        &self,
        from: f64,
        to: f64,
        kin: &Kinematics,
        params: &Parameters,
    ) -> Result<TransferMatrix, KinematicsError> {
        let (from, to) = self.segment_bounds(from, to);
        let extent = self.extent();
        let length = to - from;
        let matrix = match self.kind {
            ElementKind::Quadrupole { k1 } => {
                TransferMatrix::quadrupole(length, k1 * params.rigidity_ratio(kin)?)
            }
            ElementKind::SectorDipole { h } if params.enable_dipoles => {
                match dipole_delta(params.rigidity_ratio(kin)?) {
                    Some(delta) => TransferMatrix::sector_dipole(length, h, delta),
                    None => TransferMatrix::drift(length),
                }
            }
            ElementKind::RectangularDipole { h } if params.enable_dipoles => {
                match dipole_delta(params.rigidity_ratio(kin)?) {
                    Some(delta) => {
                        let edge = TransferMatrix::dipole_edge(h, h * extent / 2.0);
                        let mut m = TransferMatrix::sector_dipole(length, h, delta);
                        if from == 0.0 {
                            m = m * edge;
                        }
                        if to == extent {
                            m = edge * m;
                        }
                        m
                    }
                    None => TransferMatrix::drift(length),
                }
            }
            ElementKind::HorizontalKicker { kick } if params.enable_kickers => {
                let angle = kick * params.rigidity_ratio(kin)? * self.fraction(length);
                TransferMatrix::horizontal_kicker(length, angle)
            }
            ElementKind::VerticalKicker { kick } if params.enable_kickers => {
                let angle = kick * params.rigidity_ratio(kin)? * self.fraction(length);
                TransferMatrix::vertical_kicker(length, angle)
            }
            _ => TransferMatrix::drift(length),
        };
        Ok(matrix)
    }

    /// Transport `state` through the sub-segment `[from, to]`, taking the
    /// element misalignment into account.
    pub fn transport(
        &self,
        state: StateVector,
        from: f64,
        to: f64,
        kin: &Kinematics,
        params: &Parameters,
    ) -> Result<StateVector, KinematicsError> {
        let matrix = self.segment_matrix(from, to, kin, params)?;
        if self.position == DVec2::ZERO && self.angles == DVec2::ZERO {
            return Ok(matrix * state);
        }
        let (from, to) = self.segment_bounds(from, to);
        let entry = self.axis_at(from);
        let exit = self.axis_at(to);
        Ok(matrix * (state - entry) + exit)
    }

    /// Misaligned element axis at `l` metres from the entrance
    fn axis_at(&self, l: f64) -> StateVector {
        StateVector::from_position_angles(self.position + self.angles * l, self.angles, 0.0)
    }

    /// Usable length; a negative or non-finite length counts as zero
    fn extent(&self) -> f64 {
        if self.length.is_finite() && self.length > 0.0 {
            self.length
        } else {
            0.0
        }
    }

    /// `[from, to]` clamped to the element extent
    fn segment_bounds(&self, from: f64, to: f64) -> (f64, f64) {
        let extent = self.extent();
        let from = from.max(0.0).min(extent);
        let to = to.max(from).min(extent);
        (from, to)
    }

    fn fraction(&self, length: f64) -> f64 {
        let extent = self.extent();
        if extent > 0.0 {
            length / extent
        } else {
            1.0
        }
    }
}

/// Relative rigidity offset seen by a dipole, `None` for neutral particles
fn dipole_delta(ratio: f64) -> Option<f64> {
    if ratio == 0.0 {
        debug!("neutral particle: dipole treated as a drift");
        return None;
    }
    Some(1.0 / ratio - 1.0)
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<20} {:<24} s = {:>10.4} m  length = {:>8.4} m",
            self.name,
            self.element_type().name(),
            self.s,
            self.length
        )?;
        match self.kind {
            ElementKind::Quadrupole { k1 } => write!(f, "  k1 = {:.5e}", k1)?,
            ElementKind::SectorDipole { h } | ElementKind::RectangularDipole { h } => {
                write!(f, "  h = {:.5e}", h)?
            }
            ElementKind::HorizontalKicker { kick } | ElementKind::VerticalKicker { kick } => {
                write!(f, "  kick = {:.5e}", kick)?
            }
            _ => {}
        }
        if let Some(aperture) = &self.aperture {
            write!(f, "  aperture: {}", aperture)?;
        }
        Ok(())
    }
}
