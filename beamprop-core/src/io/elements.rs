//! Conversion of table rows into beamline elements

use super::table::RowRef;
use super::ParseError;
use crate::aperture::Aperture;
use crate::diagnostics::Diagnostics;
use crate::element::{CollimatorShape, Element, ElementKind};
use glam::DVec2;
use log::debug;
use regex::Regex;
use std::sync::OnceLock;

/// Element family as named in the optics file, before strengths are read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    Marker,
    Drift,
    Monitor,
    Instrument,
    Placeholder,
    Quadrupole,
    SectorBend,
    RectangularBend,
    HorizontalKicker,
    VerticalKicker,
    Collimator(CollimatorShape),
    Sextupole,
    Multipole,
    Solenoid,
}

impl Family {
    /// Family of a MAD-X `KEYWORD` value
    pub fn from_keyword(keyword: &str) -> Option<Family> {
        let family = match keyword.to_lowercase().as_str() {
            "marker" => Family::Marker,
            "drift" => Family::Drift,
            "monitor" => Family::Monitor,
            "instrument" => Family::Instrument,
            "placeholder" => Family::Placeholder,
            "quadrupole" => Family::Quadrupole,
            "sbend" => Family::SectorBend,
            "rbend" => Family::RectangularBend,
            "hkicker" => Family::HorizontalKicker,
            "vkicker" => Family::VerticalKicker,
            "collimator" => Family::Collimator(CollimatorShape::Generic),
            "rcollimator" => Family::Collimator(CollimatorShape::Rectangular),
            "ecollimator" => Family::Collimator(CollimatorShape::Elliptical),
            "ccollimator" => Family::Collimator(CollimatorShape::Circular),
            "sextupole" => Family::Sextupole,
            "multipole" => Family::Multipole,
            "solenoid" => Family::Solenoid,
            _ => return None,
        };
        Some(family)
    }

    /// Family guessed from LHC naming conventions
    pub fn from_name(name: &str) -> Option<Family> {
        static PATTERNS: OnceLock<Vec<(Regex, Family)>> = OnceLock::new();
        let patterns = PATTERNS.get_or_init(|| {
            [
                (r"^DRIFT_[0-9]+$", Family::Drift),
                (r"^IP[0-9]$", Family::Marker),
                (r"^MB\.[A-Z][0-9]{1,2}[LR][0-9]\.B[12]$", Family::SectorBend),
                (r"^MB[A-Z0-9]{2,3}\.*[BR][0-9]$", Family::RectangularBend),
                (r"^M[BQ]\w+\d?\.\w?\d[LR]\d(\.B[12])?$", Family::Quadrupole),
                (r"^BPM.+$", Family::Monitor),
                (
                    r"^T[CA].*\.\d[LR]\d\.?(B[1-9])?$",
                    Family::Collimator(CollimatorShape::Rectangular),
                ),
            ]
            .into_iter()
            .filter_map(|(pattern, family)| Regex::new(pattern).ok().map(|re| (re, family)))
            .collect()
        });
        patterns
            .iter()
            .find(|(regex, _)| regex.is_match(name))
            .map(|(_, family)| *family)
    }
}

/// How rows are turned into elements
#[derive(Debug, Clone, Copy)]
pub struct RowConversion {
    /// `S` of the interaction point, subtracted from every position
    pub origin: f64,
    /// Sign applied to dipole bending strengths
    pub direction: f64,
    pub keep_zero_kickers: bool,
    /// Centre apertures on the closed orbit (`X`, `Y` columns)
    pub orbit_apertures: bool,
}

/// Build the element described by `row`. Returns `None` for rows that do
/// not give rise to an element (zero-strength kickers when not kept).
pub fn element_from_row(
    row: &RowRef<'_>,
    family: Family,
    conversion: &RowConversion,
    diagnostics: &mut Diagnostics,
) -> Result<Option<Element>, ParseError> {
    let name = row
        .str("name")
        .ok_or_else(|| ParseError::malformed(row.line(), "missing column NAME"))?;
    let length = row.require_float("l")?;
    if length < 0.0 {
        return Err(ParseError::malformed(
            row.line(),
            format!("element {} has negative length {}", name, length),
        ));
    }
    let s = row.require_float("s")? - length - conversion.origin;

    let kind = match family {
        Family::Marker => ElementKind::Marker,
        Family::Drift => ElementKind::Drift,
        Family::Monitor => ElementKind::Monitor,
        Family::Instrument => ElementKind::Instrument,
        Family::Placeholder => ElementKind::Placeholder,
        Family::Sextupole => ElementKind::Sextupole,
        Family::Multipole => ElementKind::Multipole,
        Family::Solenoid => ElementKind::Solenoid,
        Family::Collimator(shape) => ElementKind::Collimator(shape),
        Family::Quadrupole => {
            let k1l = row.float_or("k1l", 0.0)?;
            if length <= 0.0 {
                return Err(ParseError::malformed(
                    row.line(),
                    format!("quadrupole {} has zero length", name),
                ));
            }
            if k1l == 0.0 {
                debug!("quadrupole {} without gradient", name);
            }
            ElementKind::Quadrupole { k1: k1l / length }
        }
        Family::SectorBend | Family::RectangularBend => {
            let k0l = row.float_or("k0l", 0.0)? * conversion.direction;
            if length <= 0.0 {
                return Err(ParseError::malformed(
                    row.line(),
                    format!("dipole {} has zero length", name),
                ));
            }
            if k0l == 0.0 {
                debug!("dipole {} without bending angle", name);
            }
            let h = k0l / length;
            if family == Family::SectorBend {
                ElementKind::SectorDipole { h }
            } else {
                ElementKind::RectangularDipole { h }
            }
        }
        Family::HorizontalKicker | Family::VerticalKicker => {
            let column = if family == Family::HorizontalKicker {
                "hkick"
            } else {
                "vkick"
            };
            let kick = row.float_or(column, 0.0)?;
            if kick == 0.0 && !conversion.keep_zero_kickers {
                debug!("skipping kicker {} without kick", name);
                return Ok(None);
            }
            if family == Family::HorizontalKicker {
                ElementKind::HorizontalKicker { kick }
            } else {
                ElementKind::VerticalKicker { kick }
            }
        }
    };

    let orbit = DVec2::new(row.float_or("x", 0.0)?, row.float_or("y", 0.0)?);
    let mut element = Element::new(name, kind, s, length)
        .with_beta(DVec2::new(
            row.float_or("betx", 0.0)?,
            row.float_or("bety", 0.0)?,
        ))
        .with_dispersion(DVec2::new(
            row.float_or("dx", 0.0)?,
            row.float_or("dy", 0.0)?,
        ))
        .with_relative_position(orbit);

    if let Some(aperture) = aperture_from_row(row, diagnostics)? {
        let centre = if conversion.orbit_apertures {
            orbit
        } else {
            DVec2::ZERO
        };
        element = element.with_aperture(aperture.centered_at(centre));
    }
    Ok(Some(element))
}

/// Aperture from the `APERTYPE` and `APER_1..4` columns
pub fn aperture_from_row(
    row: &RowRef<'_>,
    diagnostics: &mut Diagnostics,
) -> Result<Option<Aperture>, ParseError> {
    let apertype = match row.str("apertype") {
        Some(apertype) => apertype.to_uppercase(),
        None => return Ok(None),
    };
    let p = [
        row.float_or("aper_1", 0.0)?,
        row.float_or("aper_2", 0.0)?,
        row.float_or("aper_3", 0.0)?,
        row.float_or("aper_4", 0.0)?,
    ];
    if apertype.is_empty() || apertype == "NONE" || p.iter().all(|&v| v == 0.0) {
        return Ok(None);
    }
    let aperture = match apertype.as_str() {
        "CIRCLE" => Aperture::circular(p[0]),
        "RECTANGLE" => Aperture::rectangular(p[0], p[1]),
        "ELLIPSE" => Aperture::elliptic(p[0], p[1]),
        "RECTELLIPSE" => Aperture::rect_elliptic(p[0], p[1], p[2], p[3]),
        "RECTCIRCLE" => Aperture::rect_elliptic(p[0], p[1], p[2], p[2]),
        other => {
            diagnostics.warn(
                Some(row.line()),
                format!(
                    "unsupported aperture {} for {}, element kept without aperture",
                    other,
                    row.str("name").unwrap_or("?")
                ),
            );
            return Ok(None);
        }
    };
    Ok(Some(aperture))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::ElementType;
    use crate::io::table::Table;

    const SOURCE: &str = r#"* NAME KEYWORD S L K0L K1L HKICK VKICK X Y APERTYPE APER_1 APER_2 APER_3 APER_4
$ %s %s %le %le %le %le %le %le %le %le %s %le %le %le %le
"IP5" "MARKER" 100 0 0 0 0 0 0 0 "NONE" 0 0 0 0
"MQXA.1R5" "QUADRUPOLE" 128.37 6.37 -0.055419 0 0 0 0 0 "CIRCLE" 0.03 0 0 0
"MB.A8R5.B1" "SBEND" 200 14.3 0.0079 0 0 0 0 0 "RECTELLIPSE" 0.022 0.0175 0.022 0.022
"MCBXH.1R5" "HKICKER" 129.5 0.48 0 0 0 0 0 0 "NONE" 0 0 0 0
"TCL.4R5.B1" "RCOLLIMATOR" 241 1 0 0 0 0 0.001 -0.0005 "RECTANGLE" 0.012 0.012 0 0
"XRPH.A7R5.B1" "INSTRUMENT" 310 0 0 0 0 0 0 0 "OCTAGON" 0.05 0.05 0.1 0.1
"#;

    fn rows() -> Table {
        Table::parse(SOURCE, false, &mut Diagnostics::new()).unwrap()
    }

    fn conversion() -> RowConversion {
        RowConversion {
            origin: 100.0,
            direction: 1.0,
            keep_zero_kickers: false,
            orbit_apertures: true,
        }
    }

    fn convert(index: usize) -> (Option<Element>, Diagnostics) {
        let table = rows();
        let row = table.rows().nth(index).unwrap();
        let family = Family::from_keyword(row.str("keyword").unwrap()).unwrap();
        let mut diagnostics = Diagnostics::new();
        let element = element_from_row(&row, family, &conversion(), &mut diagnostics).unwrap();
        (element, diagnostics)
    }

    #[test]
    fn test_keywords() {
        assert_eq!(Family::from_keyword("QUADRUPOLE"), Some(Family::Quadrupole));
        assert_eq!(
            Family::from_keyword("ecollimator"),
            Some(Family::Collimator(CollimatorShape::Elliptical))
        );
        assert_eq!(Family::from_keyword("RFCAVITY"), None);
    }

    #[test]
    fn test_names() {
        assert_eq!(Family::from_name("DRIFT_12"), Some(Family::Drift));
        assert_eq!(Family::from_name("IP5"), Some(Family::Marker));
        assert_eq!(Family::from_name("MQXA.1R5"), Some(Family::Quadrupole));
        assert_eq!(Family::from_name("MQY.4R5.B1"), Some(Family::Quadrupole));
        assert_eq!(Family::from_name("MB.A8R5.B1"), Some(Family::SectorBend));
        assert_eq!(Family::from_name("BPMR.5R5.B1"), Some(Family::Monitor));
        assert_eq!(
            Family::from_name("TCL.4R5.B1"),
            Some(Family::Collimator(CollimatorShape::Rectangular))
        );
        assert_eq!(Family::from_name("XRPH.A7R5.B1"), None);
    }

    #[test]
    fn test_quadrupole_row() {
        let (quad, _) = convert(1);
        let quad = quad.unwrap();
        assert!((quad.s - 22.0).abs() < 1e-9);
        assert_eq!(quad.length, 6.37);
        assert_eq!(quad.element_type(), ElementType::VerticalQuadrupole);
        match quad.kind {
            ElementKind::Quadrupole { k1 } => assert!((k1 + 0.0087).abs() < 1e-9),
            other => panic!("unexpected kind {:?}", other),
        }
        assert!(quad.aperture.is_some());
    }

    #[test]
    fn test_dipole_row() {
        let (dipole, _) = convert(2);
        match dipole.unwrap().kind {
            ElementKind::SectorDipole { h } => assert!((h - 0.0079 / 14.3).abs() < 1e-12),
            other => panic!("unexpected kind {:?}", other),
        }
    }

    #[test]
    fn test_zero_kicker_skipped() {
        let (kicker, _) = convert(3);
        assert!(kicker.is_none());
    }

    #[test]
    fn test_aperture_centred_on_orbit() {
        let (collimator, _) = convert(4);
        let collimator = collimator.unwrap();
        let aperture = collimator.aperture.unwrap();
        assert_eq!(aperture.position, DVec2::new(0.001, -0.0005));
        assert_eq!(collimator.relative_position, DVec2::new(0.001, -0.0005));
        assert_eq!(collimator.element_type(), ElementType::RectangularCollimator);
    }

    #[test]
    fn test_unsupported_aperture_warns() {
        let (instrument, diagnostics) = convert(5);
        assert!(instrument.unwrap().aperture.is_none());
        assert_eq!(diagnostics.warnings().count(), 1);
    }
}
