//! Diagnostics and error reporting for optics files
//!
//! Parsers collect non-fatal problems (skipped rows, unsupported apertures,
//! overridden beam parameters) here, so callers can report them after a
//! successful parse.

use crate::io::ParseError;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticSeverity {
    Warning,
    Info,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub severity: DiagnosticSeverity,
    /// 1-based line of the optics file, if the problem is tied to one
    pub line: Option<usize>,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.severity {
            DiagnosticSeverity::Warning => "warning",
            DiagnosticSeverity::Info => "info",
        };
        match self.line {
            Some(line) => write!(f, "{} (line {}): {}", severity, line, self.message),
            None => write!(f, "{}: {}", severity, self.message),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(&mut self, line: Option<usize>, message: impl Into<String>) {
        let message = message.into();
        match line {
            Some(line) => log::warn!("line {}: {}", line, message),
            None => log::warn!("{}", message),
        }
        self.items.push(Diagnostic {
            severity: DiagnosticSeverity::Warning,
            line,
            message,
        });
    }

    pub fn info(&mut self, line: Option<usize>, message: impl Into<String>) {
        let message = message.into();
        log::info!("{}", message);
        self.items.push(Diagnostic {
            severity: DiagnosticSeverity::Info,
            line,
            message,
        });
    }

    /// Turn a malformed row into a warning when parsing leniently; any other
    /// error is passed through.
    pub fn recover(&mut self, error: ParseError, lenient: bool) -> Result<(), ParseError> {
        match error {
            ParseError::MalformedRow { line, message } if lenient => {
                self.warn(Some(line), format!("skipped row: {}", message));
                Ok(())
            }
            other => Err(other),
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.items.iter()
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items
            .iter()
            .filter(|d| d.severity == DiagnosticSeverity::Warning)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Format a parse error with the offending line of the source
pub fn format_parse_error(error: &ParseError, source: &str) -> String {
    let mut msg = format!("Parse error: {}", error);

    if let Some(line) = error.line() {
        if let Some(text) = source.lines().nth(line.saturating_sub(1)) {
            msg.push_str(&format!("\n  at line {}: {}", line, text.trim()));
        }
    }

    msg
}
