//! Optics dialect: a Twiss table whose drifts are regenerated from the
//! element positions.

use super::elements::{element_from_row, Family, RowConversion};
use super::table::Table;
use super::{find_interaction_point, OpticsParser, ParseError, ParserOptions};
use crate::beamline::Beamline;
use crate::diagnostics::Diagnostics;
use crate::parameters::Parameters;
use log::debug;

/// Parser for MAD-X Twiss tables.
///
/// The element family comes from the `KEYWORD` column when present, and is
/// otherwise guessed from LHC naming conventions. Drifts are dropped and the
/// beamline re-sequenced; apertures are centred on the closed orbit. Beam
/// energy, mass and charge quoted in the header take precedence over the
/// given parameters.
#[derive(Debug, Clone)]
pub struct TwissParser {
    options: ParserOptions,
}

impl TwissParser {
    pub fn new(options: ParserOptions) -> Self {
        Self { options }
    }

    fn beam_parameters(
        &self,
        table: &Table,
        params: &Parameters,
        diagnostics: &mut Diagnostics,
    ) -> Parameters {
        let mut updated = params.clone();
        if let Some(energy) = table.header.energy() {
            if energy != params.beam_energy {
                diagnostics.warn(
                    None,
                    format!("beam energy set to {} GeV from the optics header", energy),
                );
                updated.beam_energy = energy;
            }
        }
        if let Some(mass) = table.header.mass() {
            if mass != params.beam_particles_mass {
                diagnostics.warn(
                    None,
                    format!("beam particles mass set to {} GeV from the optics header", mass),
                );
                updated.beam_particles_mass = mass;
            }
        }
        if let Some(charge) = table.header.charge() {
            let charge = charge.round() as i32;
            if charge != params.beam_particles_charge {
                diagnostics.warn(
                    None,
                    format!("beam particles charge set to {} from the optics header", charge),
                );
                updated.beam_particles_charge = charge;
            }
        }
        updated
    }
}

impl OpticsParser for TwissParser {
    fn options(&self) -> &ParserOptions {
        &self.options
    }

    fn build(
        &self,
        table: &Table,
        params: &Parameters,
        diagnostics: &mut Diagnostics,
    ) -> Result<(Beamline, Parameters), ParseError> {
        table.require_columns(&["name", "s", "l"])?;
        let params = self.beam_parameters(table, params, diagnostics);
        let (_, ip_s) = find_interaction_point(table, &self.options.interaction_point)?;
        let conversion = RowConversion {
            origin: ip_s,
            direction: self.options.direction.sign(),
            keep_zero_kickers: false,
            orbit_apertures: true,
        };

        let mut beamline =
            Beamline::new().with_interaction_point(self.options.interaction_point.clone());
        for row in table.rows() {
            let name = row.str("name").unwrap_or_default();
            let family = match row.str("keyword").filter(|k| !k.is_empty()) {
                Some(keyword) => Family::from_keyword(keyword),
                None => Family::from_name(name),
            };
            let family = match family {
                Some(Family::Drift) => continue,
                Some(family) => family,
                None => {
                    debug!("line {}: skipping element {} of unknown type", row.line(), name);
                    continue;
                }
            };

            let element = match element_from_row(&row, family, &conversion, diagnostics) {
                Ok(Some(element)) => element,
                Ok(None) => continue,
                Err(error) => {
                    diagnostics.recover(error, self.options.lenient)?;
                    continue;
                }
            };
            if element.s < self.options.min_s {
                continue;
            }
            if self.options.max_s.map_or(false, |max_s| element.s > max_s) {
                break;
            }
            let line = row.line();
            beamline
                .add(element, &params)
                .map_err(|e| ParseError::malformed(line, e.to_string()))?;
        }

        Ok((beamline.sequenced(self.options.max_s), params))
    }
}
