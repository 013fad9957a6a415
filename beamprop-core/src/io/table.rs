//! Reader for TFS tables: `@` header lines, a `*` line of column names, a
//! `$` line of column formats, then one whitespace-separated row per
//! element.

use super::header::Header;
use super::ParseError;
use crate::diagnostics::Diagnostics;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
struct Row {
    line: usize,
    fields: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub header: Header,
    columns: Vec<String>,
    formats: Vec<String>,
    index: HashMap<String, usize>,
    /// Line of the `*` column names
    columns_line: usize,
    rows: Vec<Row>,
}

impl Table {
    /// Parse a whole table. Rows with a wrong number of fields are fatal
    /// unless `lenient` is set, in which case they are skipped and reported.
    pub fn parse(
        source: &str,
        lenient: bool,
        diagnostics: &mut Diagnostics,
    ) -> Result<Table, ParseError> {
        let mut table = Table::default();

        for (i, raw) in source.lines().enumerate() {
            let line_num = i + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if line.starts_with('@') {
                table.header.parse_line(line, line_num)?;
            } else if let Some(names) = line.strip_prefix('*') {
                table.columns = names.split_whitespace().map(str::to_lowercase).collect();
                table.index = table
                    .columns
                    .iter()
                    .enumerate()
                    .map(|(i, name)| (name.clone(), i))
                    .collect();
                table.columns_line = line_num;
            } else if let Some(formats) = line.strip_prefix('$') {
                table.formats = formats.split_whitespace().map(str::to_string).collect();
                if table.formats.len() != table.columns.len() {
                    return Err(ParseError::malformed(
                        line_num,
                        format!(
                            "{} column formats for {} columns",
                            table.formats.len(),
                            table.columns.len()
                        ),
                    ));
                }
            } else {
                if table.columns.is_empty() {
                    return Err(ParseError::malformed(line_num, "data row before column names"));
                }
                let fields = tokenize(line);
                if fields.len() != table.columns.len() {
                    let error = ParseError::malformed(
                        line_num,
                        format!(
                            "expected {} fields, found {}",
                            table.columns.len(),
                            fields.len()
                        ),
                    );
                    diagnostics.recover(error, lenient)?;
                    continue;
                }
                table.rows.push(Row {
                    line: line_num,
                    fields,
                });
            }
        }

        Ok(table)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Format (`%s`, `%le`, ...) declared for a column
    pub fn column_format(&self, name: &str) -> Option<&str> {
        self.index
            .get(name)
            .and_then(|&i| self.formats.get(i))
            .map(String::as_str)
    }

    pub fn columns_line(&self) -> usize {
        self.columns_line
    }

    /// Fail unless every named column is present
    pub fn require_columns(&self, names: &[&str]) -> Result<(), ParseError> {
        match names.iter().find(|name| !self.has_column(name)) {
            Some(missing) => Err(ParseError::malformed(
                self.columns_line,
                format!("missing required column {}", missing.to_uppercase()),
            )),
            None => Ok(()),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> impl Iterator<Item = RowRef<'_>> {
        self.rows.iter().map(move |row| RowRef { table: self, row })
    }
}

/// A table row with column lookup by name
#[derive(Debug, Clone, Copy)]
pub struct RowRef<'a> {
    table: &'a Table,
    row: &'a Row,
}

impl<'a> RowRef<'a> {
    pub fn line(&self) -> usize {
        self.row.line
    }

    /// Text of a column, `None` if the table has no such column
    pub fn str(&self, column: &str) -> Option<&'a str> {
        let index = *self.table.index.get(column)?;
        self.row.fields.get(index).map(String::as_str)
    }

    /// Numeric value of a column, `None` if the table has no such column.
    /// Non-finite values (`nan`, `inf`) are rejected.
    pub fn float(&self, column: &str) -> Result<Option<f64>, ParseError> {
        let Some(text) = self.str(column) else {
            return Ok(None);
        };
        match text.parse::<f64>() {
            Ok(value) if value.is_finite() => Ok(Some(value)),
            _ => Err(ParseError::malformed(
                self.row.line,
                format!("invalid number \"{}\" in column {}", text, column.to_uppercase()),
            )),
        }
    }

    /// Numeric value of a column, `default` if the table has no such column
    pub fn float_or(&self, column: &str, default: f64) -> Result<f64, ParseError> {
        Ok(self.float(column)?.unwrap_or(default))
    }

    pub fn require_float(&self, column: &str) -> Result<f64, ParseError> {
        self.float(column)?.ok_or_else(|| {
            ParseError::malformed(
                self.row.line,
                format!("missing column {}", column.to_uppercase()),
            )
        })
    }
}

/// Split a row on whitespace, keeping double-quoted fields together
fn tokenize(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut in_field = false;

    for c in line.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                in_field = true;
            }
            c if c.is_whitespace() && !quoted => {
                if in_field {
                    fields.push(std::mem::take(&mut current));
                    in_field = false;
                }
            }
            c => {
                current.push(c);
                in_field = true;
            }
        }
    }
    if in_field {
        fields.push(current);
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = r#"@ NAME %05s "TWISS"
* NAME KEYWORD S L K1L
$ %s %s %le %le %le
 "IP5" "MARKER" 0 0 0
 "MQXA.1R5" "QUADRUPOLE" 28.37 6.37 -0.0554
"#;

    #[test]
    fn test_parse_table() {
        let mut diagnostics = Diagnostics::new();
        let table = Table::parse(SOURCE, false, &mut diagnostics).unwrap();
        assert_eq!(table.columns(), &["name", "keyword", "s", "l", "k1l"]);
        assert_eq!(table.column_format("s"), Some("%le"));
        assert_eq!(table.len(), 2);
        assert_eq!(table.header.get_str("name"), Some("TWISS"));

        let quad = table.rows().nth(1).unwrap();
        assert_eq!(quad.line(), 5);
        assert_eq!(quad.str("name"), Some("MQXA.1R5"));
        assert_eq!(quad.float("k1l").unwrap(), Some(-0.0554));
        assert_eq!(quad.float("x").unwrap(), None);
        assert_eq!(quad.float_or("x", 0.0).unwrap(), 0.0);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_wrong_field_count() {
        let source = format!("{} \"BROKEN\" \"DRIFT\" 1.0\n", SOURCE);
        let mut diagnostics = Diagnostics::new();
        let err = Table::parse(&source, false, &mut diagnostics).unwrap_err();
        assert!(matches!(err, ParseError::MalformedRow { line: 6, .. }));

        let table = Table::parse(&source, true, &mut diagnostics).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn test_invalid_number() {
        let source = SOURCE.replace("28.37", "28.3.7");
        let mut diagnostics = Diagnostics::new();
        let table = Table::parse(&source, false, &mut diagnostics).unwrap();
        let quad = table.rows().nth(1).unwrap();
        assert!(quad.float("s").is_err());
    }

    #[test]
    fn test_non_finite_numbers_rejected() {
        for text in ["nan", "inf", "-inf", "NaN"] {
            let source = SOURCE.replace("6.37", text);
            let mut diagnostics = Diagnostics::new();
            let table = Table::parse(&source, false, &mut diagnostics).unwrap();
            let quad = table.rows().nth(1).unwrap();
            let err = quad.float("l").unwrap_err();
            assert!(matches!(err, ParseError::MalformedRow { line: 5, .. }), "{}", text);
        }
    }

    #[test]
    fn test_tokenize_quoted_fields() {
        assert_eq!(
            tokenize(r#""A B" "C"  1.5e-3 "" "#),
            vec!["A B", "C", "1.5e-3", ""]
        );
    }

    #[test]
    fn test_missing_required_column() {
        let mut diagnostics = Diagnostics::new();
        let table = Table::parse(SOURCE, false, &mut diagnostics).unwrap();
        let err = table.require_columns(&["name", "betx"]).unwrap_err();
        assert!(matches!(err, ParseError::MalformedRow { line: 2, .. }));
    }
}
