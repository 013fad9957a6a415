//! Optics file parsers
//!
//! Both dialects read the same TFS table layout and differ in how they turn
//! rows into a beamline. See [`MadxParser`] and [`TwissParser`].

pub mod elements;
pub mod header;
pub mod madx;
pub mod table;
pub mod twiss;

pub use header::{Header, ProductionDate};
pub use madx::MadxParser;
pub use table::{RowRef, Table};
pub use twiss::TwissParser;

use crate::beamline::Beamline;
use crate::diagnostics::Diagnostics;
use crate::parameters::Parameters;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("cannot read optics file {}: {source}", .path.display())]
    FileNotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("line {line}: {message}")]
    MalformedRow { line: usize, message: String },
    #[error("interaction point \"{name}\" not found")]
    InteractionPointNotFound { name: String },
}

impl ParseError {
    pub fn malformed(line: usize, message: impl Into<String>) -> Self {
        ParseError::MalformedRow {
            line,
            message: message.into(),
        }
    }

    /// Line of the optics file the error refers to
    pub fn line(&self) -> Option<usize> {
        match self {
            ParseError::MalformedRow { line, .. } => Some(*line),
            _ => None,
        }
    }
}

/// Orientation of the beamline with respect to the optics file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Forward,
    Backward,
}

impl Direction {
    /// Sign applied to bending strengths
    pub fn sign(&self) -> f64 {
        match self {
            Direction::Forward => 1.0,
            Direction::Backward => -1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParserOptions {
    /// Name of the element used as `s = 0`
    pub interaction_point: String,
    pub direction: Direction,
    /// Last entrance position kept, relative to the interaction point
    pub max_s: Option<f64>,
    /// First entrance position kept, relative to the interaction point
    pub min_s: f64,
    /// Skip malformed rows with a warning instead of failing
    pub lenient: bool,
}

impl ParserOptions {
    pub fn new(interaction_point: impl Into<String>) -> Self {
        Self {
            interaction_point: interaction_point.into(),
            direction: Direction::Forward,
            max_s: None,
            min_s: 0.0,
            lenient: false,
        }
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_max_s(mut self, max_s: f64) -> Self {
        self.max_s = Some(max_s);
        self
    }

    pub fn with_min_s(mut self, min_s: f64) -> Self {
        self.min_s = min_s;
        self
    }

    pub fn lenient(mut self, lenient: bool) -> Self {
        self.lenient = lenient;
        self
    }
}

/// Everything read from an optics file
#[derive(Debug, Clone)]
pub struct ParsedOptics {
    pub header: Header,
    pub beamline: Beamline,
    /// Beam parameters, possibly updated from the file header
    pub parameters: Parameters,
    pub diagnostics: Diagnostics,
}

/// A dialect turning TFS tables into beamlines
pub trait OpticsParser {
    fn options(&self) -> &ParserOptions;

    /// Build the beamline from an already read table
    fn build(
        &self,
        table: &Table,
        params: &Parameters,
        diagnostics: &mut Diagnostics,
    ) -> Result<(Beamline, Parameters), ParseError>;

    fn parse_str(&self, source: &str, params: &Parameters) -> Result<ParsedOptics, ParseError> {
        let mut diagnostics = Diagnostics::new();
        let table = Table::parse(source, self.options().lenient, &mut diagnostics)?;
        let (beamline, parameters) = self.build(&table, params, &mut diagnostics)?;
        log::info!(
            "beamline with {} elements over {:.2} m",
            beamline.len(),
            beamline.length()
        );
        Ok(ParsedOptics {
            header: table.header,
            beamline,
            parameters,
            diagnostics,
        })
    }

    fn parse_file(&self, path: &Path, params: &Parameters) -> Result<ParsedOptics, ParseError> {
        let source = read_source(path)?;
        log::info!("reading optics from {}", path.display());
        self.parse_str(&source, params)
    }
}

/// Available optics dialects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    #[default]
    Twiss,
    Madx,
}

impl Format {
    pub fn parser(self, options: ParserOptions) -> Box<dyn OpticsParser> {
        match self {
            Format::Twiss => Box::new(TwissParser::new(options)),
            Format::Madx => Box::new(MadxParser::new(options)),
        }
    }
}

/// Read an optics file with the given dialect
pub fn parse_optics(
    path: &Path,
    format: Format,
    options: ParserOptions,
    params: &Parameters,
) -> Result<ParsedOptics, ParseError> {
    format.parser(options).parse_file(path, params)
}

/// Read only the `@` header block of an optics file
pub fn read_header(path: &Path) -> Result<Header, ParseError> {
    let source = read_source(path)?;
    let mut header = Header::new();
    for (i, line) in source.lines().enumerate() {
        let line = line.trim();
        if line.starts_with('*') {
            break;
        }
        if line.starts_with('@') {
            header.parse_line(line, i + 1)?;
        }
    }
    Ok(header)
}

fn read_source(path: &Path) -> Result<String, ParseError> {
    fs::read_to_string(path).map_err(|source| ParseError::FileNotFound {
        path: path.to_path_buf(),
        source,
    })
}

/// Position of the interaction point row and its `S` value
pub(crate) fn find_interaction_point(
    table: &Table,
    name: &str,
) -> Result<(usize, f64), ParseError> {
    let (index, row) = table
        .rows()
        .enumerate()
        .find(|(_, row)| row.str("name") == Some(name))
        .ok_or_else(|| ParseError::InteractionPointNotFound {
            name: name.to_string(),
        })?;
    Ok((index, row.require_float("s")?))
}
