//! Sequence dialect: a MAD-X table listing every element, drifts included,
//! from the interaction point onwards.

use super::elements::{element_from_row, Family, RowConversion};
use super::table::Table;
use super::{find_interaction_point, OpticsParser, ParseError, ParserOptions};
use crate::beamline::Beamline;
use crate::diagnostics::Diagnostics;
use crate::parameters::Parameters;
use log::debug;

/// Parser for MAD-X sequence tables.
///
/// Requires the `KEYWORD` column. Rows before the interaction point are
/// ignored, explicit drifts are kept, apertures are centred on the nominal
/// axis, and reading stops at the first element entering beyond `max_s`.
#[derive(Debug, Clone)]
pub struct MadxParser {
    options: ParserOptions,
}

impl MadxParser {
    pub fn new(options: ParserOptions) -> Self {
        Self { options }
    }
}

impl OpticsParser for MadxParser {
    fn options(&self) -> &ParserOptions {
        &self.options
    }

    fn build(
        &self,
        table: &Table,
        params: &Parameters,
        diagnostics: &mut Diagnostics,
    ) -> Result<(Beamline, Parameters), ParseError> {
        table.require_columns(&["name", "keyword", "s", "l"])?;
        let (ip_index, ip_s) = find_interaction_point(table, &self.options.interaction_point)?;
        let conversion = RowConversion {
            origin: ip_s,
            direction: self.options.direction.sign(),
            keep_zero_kickers: true,
            orbit_apertures: false,
        };

        let mut beamline =
            Beamline::new().with_interaction_point(self.options.interaction_point.clone());
        for row in table.rows().skip(ip_index) {
            let keyword = row.str("keyword").unwrap_or_default();
            let Some(family) = Family::from_keyword(keyword) else {
                debug!(
                    "line {}: skipping element of unsupported type {}",
                    row.line(),
                    keyword
                );
                continue;
            };

            let element = match element_from_row(&row, family, &conversion, diagnostics) {
                Ok(Some(element)) => element,
                Ok(None) => continue,
                Err(error) => {
                    diagnostics.recover(error, self.options.lenient)?;
                    continue;
                }
            };
            if self.options.max_s.map_or(false, |max_s| element.s > max_s) {
                break;
            }
            if element.s < self.options.min_s {
                continue;
            }
            let line = row.line();
            beamline
                .add(element, params)
                .map_err(|e| ParseError::malformed(line, e.to_string()))?;
        }

        Ok((beamline, params.clone()))
    }
}
