//! Ordered collection of beamline elements

use crate::element::{Element, ElementKind};
use crate::optics::TransferMatrix;
use crate::parameters::{Kinematics, KinematicsError, Parameters};
use glam::DVec2;
use log::debug;
use regex::Regex;
use std::fmt;
use thiserror::Error;

/// Gaps and overlaps shorter than this are ignored (m)
const TOLERANCE: f64 = 1e-9;

#[derive(Debug, Error)]
pub enum BeamlineError {
    #[error("element \"{0}\" not found in beamline")]
    ElementNotFound(String),
    #[error("invalid element name pattern \"{pattern}\": {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("element \"{added}\" overlaps with \"{existing}\"")]
    Overlap { existing: String, added: String },
}

/// Elements sorted by entrance position, then by exit position
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Beamline {
    elements: Vec<Element>,
    interaction_point: Option<String>,
}

impl Beamline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a beamline from elements in any order, without overlap checks
    pub fn from_elements(elements: Vec<Element>) -> Self {
        let mut beamline = Self {
            elements,
            interaction_point: None,
        };
        beamline.sort();
        beamline
    }

    pub fn with_interaction_point(mut self, name: impl Into<String>) -> Self {
        self.interaction_point = Some(name.into());
        self
    }

    /// Insert an element, keeping the beamline ordered.
    ///
    /// Elements overlapping the newcomer are split around it into `name/1`
    /// and `name/2` when overlap correction is enabled.
    pub fn add(&mut self, element: Element, params: &Parameters) -> Result<(), BeamlineError> {
        let overlapping: Vec<usize> = self
            .elements
            .iter()
            .enumerate()
            .filter(|(_, existing)| overlaps(existing, &element))
            .map(|(i, _)| i)
            .collect();

        if !overlapping.is_empty() {
            if !params.correct_beamline_overlaps {
                return Err(BeamlineError::Overlap {
                    existing: self.elements[overlapping[0]].name.clone(),
                    added: element.name.clone(),
                });
            }
            for index in overlapping.into_iter().rev() {
                let existing = self.elements.remove(index);
                debug!(
                    "splitting {} around overlapping element {}",
                    existing.name, element.name
                );
                self.elements.extend(split_around(&existing, &element));
            }
        }

        let in_order = self
            .elements
            .last()
            .map_or(true, |last| (last.s, last.end()) <= (element.s, element.end()));
        self.elements.push(element);
        if !in_order {
            self.sort();
        }
        Ok(())
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Element> {
        self.elements.iter()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Position of the furthest element exit (m)
    pub fn length(&self) -> f64 {
        self.elements.iter().map(Element::end).fold(0.0, f64::max)
    }

    pub fn interaction_point(&self) -> Option<&Element> {
        let name = self.interaction_point.as_deref()?;
        self.elements.iter().find(|e| e.name == name)
    }

    /// All elements whose name matches the regular expression `pattern`
    pub fn find(&self, pattern: &str) -> Result<Vec<&Element>, BeamlineError> {
        let regex = Regex::new(pattern).map_err(|source| BeamlineError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(self
            .elements
            .iter()
            .filter(|e| regex.is_match(&e.name))
            .collect())
    }

    /// First element carrying exactly this name
    pub fn get_element(&self, name: &str) -> Result<&Element, BeamlineError> {
        self.elements
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| BeamlineError::ElementNotFound(name.to_string()))
    }

    /// Element covering the longitudinal position `s`
    pub fn element_at(&self, s: f64) -> Option<&Element> {
        self.elements
            .iter()
            .find(|e| e.s <= s && s < e.end())
            .or_else(|| self.elements.iter().find(|e| e.covers(s)))
    }

    /// Displace every element located strictly after `s` (and its aperture)
    pub fn offset_elements_after(&mut self, s: f64, offset: DVec2) {
        for element in self.elements.iter_mut().filter(|e| e.s > s) {
            element.offset(offset);
        }
    }

    /// Tilt every element located strictly after `s`
    pub fn tilt_elements_after(&mut self, s: f64, tilt: DVec2) {
        for element in self.elements.iter_mut().filter(|e| e.s > s) {
            element.tilt(tilt);
        }
    }

    /// Copy of the beamline with gaps filled by drifts.
    ///
    /// Markers other than the interaction point are dropped. With
    /// `max_length`, a last drift extends the beamline up to that position.
    pub fn sequenced(&self, max_length: Option<f64>) -> Beamline {
        let mut elements = Vec::with_capacity(self.elements.len() * 2);
        let mut cursor = self.elements.first().map_or(0.0, |e| e.s);

        for element in &self.elements {
            let is_ip = self.interaction_point.as_deref() == Some(element.name.as_str());
            if element.kind == ElementKind::Marker && !is_ip {
                continue;
            }
            if element.s - cursor > TOLERANCE {
                elements.push(gap_drift(cursor, element.s));
            }
            elements.push(element.clone());
            cursor = cursor.max(element.end());
        }
        if let Some(max_length) = max_length {
            if max_length - cursor > TOLERANCE {
                elements.push(gap_drift(cursor, max_length));
            }
        }

        Beamline {
            elements,
            interaction_point: self.interaction_point.clone(),
        }
    }

    /// Product of all element matrices from the first entrance to the last
    /// exit, gaps being treated as drifts.
    pub fn matrix(
        &self,
        kin: &Kinematics,
        params: &Parameters,
    ) -> Result<TransferMatrix, KinematicsError> {
        let mut total = TransferMatrix::identity();
        let mut cursor = self.elements.first().map_or(0.0, |e| e.s);
        for element in &self.elements {
            if element.s > cursor {
                total = TransferMatrix::drift(element.s - cursor) * total;
                cursor = element.s;
            }
            let from = cursor - element.s;
            if from >= element.length && element.length > 0.0 {
                continue;
            }
            total = element.segment_matrix(from, element.length, kin, params)? * total;
            cursor = cursor.max(element.end());
        }
        Ok(total)
    }

    /// Human-readable listing of the elements
    pub fn dump(&self, show_drifts: bool) -> String {
        let mut out = format!(
            "Beamline: {} elements, length {:.3} m\n",
            self.elements.len(),
            self.length()
        );
        if let Some(ip) = &self.interaction_point {
            out.push_str(&format!("Interaction point: {}\n", ip));
        }
        for element in &self.elements {
            if !show_drifts && element.kind == ElementKind::Drift {
                continue;
            }
            out.push_str(&format!("  {}\n", element));
        }
        out
    }

    fn sort(&mut self) {
        self.elements
            .sort_by(|a, b| a.s.total_cmp(&b.s).then(a.end().total_cmp(&b.end())));
    }
}

impl<'a> IntoIterator for &'a Beamline {
    type Item = &'a Element;
    type IntoIter = std::slice::Iter<'a, Element>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.iter()
    }
}

impl fmt::Display for Beamline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dump(true))
    }
}

fn overlaps(existing: &Element, added: &Element) -> bool {
    existing.length > 0.0
        && added.length > 0.0
        && existing.s < added.end() - TOLERANCE
        && added.s < existing.end() - TOLERANCE
}

/// Pieces of `existing` lying outside the extent of `added`
fn split_around(existing: &Element, added: &Element) -> Vec<Element> {
    let mut pieces = Vec::with_capacity(2);
    if added.s > existing.s {
        let mut first = existing.clone();
        first.name = format!("{}/1", existing.name);
        first.length = added.s - existing.s;
        pieces.push(first);
    }
    if existing.end() > added.end() {
        let mut second = existing.clone();
        second.name = format!("{}/2", existing.name);
        second.s = added.end();
        second.length = existing.end() - added.end();
        pieces.push(second);
    }
    pieces
}

fn gap_drift(from: f64, to: f64) -> Element {
    Element::drift(format!("drift:{:.4E}", from), from, to - from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aperture::Aperture;

    fn sample_beamline() -> Beamline {
        Beamline::from_elements(vec![
            Element::quadrupole("MQ.2", 20.0, 5.0, 0.01),
            Element::marker("IP5", 0.0),
            Element::collimator("TCL.4", 40.0, 1.0, Aperture::rectangular(1e-3, 1e-3)),
            Element::quadrupole("MQ.1", 10.0, 5.0, -0.01),
        ])
        .with_interaction_point("IP5")
    }

    #[test]
    fn test_elements_are_sorted() {
        let beamline = sample_beamline();
        let s: Vec<f64> = beamline.iter().map(|e| e.s).collect();
        assert_eq!(s, vec![0.0, 10.0, 20.0, 40.0]);
        assert_eq!(beamline.length(), 41.0);
        assert_eq!(beamline.interaction_point().map(|e| e.s), Some(0.0));
    }

    #[test]
    fn test_find_with_regex() {
        let beamline = sample_beamline();
        let quads = beamline.find(r"^MQ\.").unwrap();
        assert_eq!(quads.len(), 2);
        assert_eq!(quads[0].name, "MQ.1");
        assert!(beamline.find("XRPH").unwrap().is_empty());
    }

    #[test]
    fn test_find_invalid_pattern() {
        let err = sample_beamline().find("MQ(").unwrap_err();
        assert!(matches!(err, BeamlineError::InvalidPattern { .. }));
    }

    #[test]
    fn test_get_element() {
        let beamline = sample_beamline();
        assert_eq!(beamline.get_element("TCL.4").unwrap().s, 40.0);
        assert!(matches!(
            beamline.get_element("TCL"),
            Err(BeamlineError::ElementNotFound(name)) if name == "TCL"
        ));
    }

    #[test]
    fn test_element_at() {
        let beamline = sample_beamline();
        assert_eq!(beamline.element_at(12.0).map(|e| e.name.as_str()), Some("MQ.1"));
        assert_eq!(beamline.element_at(15.0).map(|e| e.name.as_str()), Some("MQ.1"));
        assert!(beamline.element_at(17.0).is_none());
    }

    #[test]
    fn test_offset_elements_after() {
        let mut beamline = sample_beamline();
        beamline.offset_elements_after(20.0, DVec2::new(1e-3, 0.0));
        assert_eq!(beamline.get_element("MQ.2").unwrap().position, DVec2::ZERO);
        let tcl = beamline.get_element("TCL.4").unwrap();
        assert_eq!(tcl.position, DVec2::new(1e-3, 0.0));
        assert!(!tcl.intercepts(DVec2::new(1.5e-3, 0.0)));
        let s: Vec<f64> = beamline.iter().map(|e| e.s).collect();
        assert_eq!(s, vec![0.0, 10.0, 20.0, 40.0]);
    }

    #[test]
    fn test_overlap_is_split() {
        let params = Parameters::default();
        let mut beamline = Beamline::from_elements(vec![Element::drift("D", 0.0, 10.0)]);
        beamline
            .add(Element::quadrupole("Q", 4.0, 2.0, 0.01), &params)
            .unwrap();
        let names: Vec<&str> = beamline.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["D/1", "Q", "D/2"]);
        assert_eq!(beamline.get_element("D/1").unwrap().length, 4.0);
        assert_eq!(beamline.get_element("D/2").unwrap().s, 6.0);
        assert_eq!(beamline.get_element("D/2").unwrap().length, 4.0);
    }

    #[test]
    fn test_overlap_rejected_without_correction() {
        let params = Parameters::default().with_overlaps_correction(false);
        let mut beamline = Beamline::from_elements(vec![Element::drift("D", 0.0, 10.0)]);
        let err = beamline
            .add(Element::quadrupole("Q", 4.0, 2.0, 0.01), &params)
            .unwrap_err();
        assert!(matches!(err, BeamlineError::Overlap { .. }));
    }

    #[test]
    fn test_sequenced_fills_gaps() {
        let beamline = sample_beamline().sequenced(Some(50.0));
        let names: Vec<&str> = beamline.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "IP5",
                "drift:0.0000E0",
                "MQ.1",
                "drift:1.5000E1",
                "MQ.2",
                "drift:2.5000E1",
                "TCL.4",
                "drift:4.1000E1"
            ]
        );
        assert_eq!(beamline.length(), 50.0);
    }

    #[test]
    fn test_total_matrix_of_drifts() {
        let params = Parameters::default();
        let beamline = Beamline::from_elements(vec![
            Element::drift("D1", 0.0, 3.0),
            Element::drift("D2", 5.0, 4.0),
        ]);
        let m = beamline
            .matrix(&Kinematics::nominal(&params), &params)
            .unwrap();
        assert!(m.max_abs_diff(&TransferMatrix::drift(9.0)) < 1e-12);
    }
}
