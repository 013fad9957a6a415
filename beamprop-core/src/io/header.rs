//! `@` header block of TFS optics tables

use super::ParseError;
use std::collections::BTreeMap;
use std::fmt;

/// Key/value metadata from the `@` lines, keys lower-cased
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Header {
    strings: BTreeMap<String, String>,
    floats: BTreeMap<String, f64>,
}

impl Header {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse one `@ KEY %fmt value` line into the header
    pub(crate) fn parse_line(&mut self, line: &str, line_num: usize) -> Result<(), ParseError> {
        let body = line.trim_start_matches('@').trim_start();
        let (key, rest) = split_token(body)
            .ok_or_else(|| ParseError::malformed(line_num, "header line without key"))?;
        let (format, value) = split_token(rest).ok_or_else(|| {
            ParseError::malformed(line_num, format!("header entry {} without format", key))
        })?;
        let key = key.to_lowercase();
        let value = value.trim().trim_matches('"').to_string();

        if format.ends_with('s') {
            self.strings.insert(key, value);
        } else if format == "%le" || format.ends_with('d') {
            let number = value.parse::<f64>().map_err(|_| {
                ParseError::malformed(
                    line_num,
                    format!("header entry {}: invalid number \"{}\"", key, value),
                )
            })?;
            self.floats.insert(key, number);
        } else {
            return Err(ParseError::malformed(
                line_num,
                format!("header entry {}: unknown format {}", key, format),
            ));
        }
        Ok(())
    }

    pub fn insert_str(&mut self, key: &str, value: impl Into<String>) {
        self.strings.insert(key.to_lowercase(), value.into());
    }

    pub fn insert_float(&mut self, key: &str, value: f64) {
        self.floats.insert(key.to_lowercase(), value);
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.strings.get(&key.to_lowercase()).map(String::as_str)
    }

    pub fn get_float(&self, key: &str) -> Option<f64> {
        self.floats.get(&key.to_lowercase()).copied()
    }

    /// Any entry rendered as text. `production_date` is derived from the
    /// `date` and `time` entries.
    pub fn get(&self, key: &str) -> Option<String> {
        if key.eq_ignore_ascii_case("production_date") {
            return self.production_date().map(|date| date.to_string());
        }
        self.get_str(key)
            .map(str::to_string)
            .or_else(|| self.get_float(key).map(|value| value.to_string()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.strings
            .keys()
            .chain(self.floats.keys())
            .map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty() && self.floats.is_empty()
    }

    /// Table production time, from `date` (dd/mm/yy) and `time` (HH.MM.SS)
    pub fn production_date(&self) -> Option<ProductionDate> {
        let date: Vec<u32> = parse_fields(self.get_str("date")?, '/')?;
        let time: Vec<u32> = parse_fields(self.get_str("time")?, '.')?;
        if date.len() != 3 || time.len() != 3 {
            return None;
        }
        let year = if date[2] < 100 { 2000 + date[2] } else { date[2] };
        let result = ProductionDate {
            year,
            month: date[1],
            day: date[0],
            hour: time[0],
            minute: time[1],
            second: time[2],
        };
        result.is_valid().then_some(result)
    }

    pub fn energy(&self) -> Option<f64> {
        self.get_float("energy")
    }

    pub fn mass(&self) -> Option<f64> {
        self.get_float("mass")
    }

    pub fn charge(&self) -> Option<f64> {
        self.get_float("charge")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ProductionDate {
    pub year: u32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
}

impl ProductionDate {
    fn is_valid(&self) -> bool {
        (1..=12).contains(&self.month)
            && (1..=31).contains(&self.day)
            && self.hour < 24
            && self.minute < 60
            && self.second < 61
    }
}

impl fmt::Display for ProductionDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

fn split_token(text: &str) -> Option<(&str, &str)> {
    let text = text.trim_start();
    if text.is_empty() {
        return None;
    }
    match text.find(char::is_whitespace) {
        Some(end) => Some((&text[..end], &text[end..])),
        None => Some((text, "")),
    }
}

fn parse_fields(text: &str, separator: char) -> Option<Vec<u32>> {
    text.trim()
        .split(separator)
        .map(|field| field.trim().parse().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(lines: &[&str]) -> Header {
        let mut header = Header::new();
        for (i, line) in lines.iter().enumerate() {
            header.parse_line(line, i + 1).unwrap();
        }
        header
    }

    #[test]
    fn test_string_and_float_entries() {
        let header = header(&[
            r#"@ NAME             %05s "TWISS""#,
            r#"@ SEQUENCE         %04s "LHCB1""#,
            "@ ENERGY           %le              6500",
            "@ CHARGE           %le                 1",
        ]);
        assert_eq!(header.get_str("name"), Some("TWISS"));
        assert_eq!(header.get_str("SEQUENCE"), Some("LHCB1"));
        assert_eq!(header.energy(), Some(6500.0));
        assert_eq!(header.charge(), Some(1.0));
        assert_eq!(header.get("energy").as_deref(), Some("6500"));
    }

    #[test]
    fn test_production_date() {
        let header = header(&[
            r#"@ DATE             %08s "12/05/16""#,
            r#"@ TIME             %08s "15.47.19""#,
        ]);
        let date = header.production_date().unwrap();
        assert_eq!(date.year, 2016);
        assert_eq!(date.month, 5);
        assert_eq!(date.day, 12);
        assert_eq!(
            header.get("production_date").as_deref(),
            Some("2016-05-12 15:47:19")
        );
    }

    #[test]
    fn test_invalid_number_is_malformed() {
        let mut header = Header::new();
        let err = header
            .parse_line("@ ENERGY %le six_thousand", 4)
            .unwrap_err();
        assert!(matches!(err, ParseError::MalformedRow { line: 4, .. }));
    }

    #[test]
    fn test_missing_date_gives_no_production_date() {
        let header = header(&[r#"@ TIME %08s "15.47.19""#]);
        assert!(header.production_date().is_none());
        assert!(header.get("production_date").is_none());
    }
}
