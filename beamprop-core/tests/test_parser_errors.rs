//! Integration tests for optics reading failures

use beamprop_core::diagnostics::format_parse_error;
use beamprop_core::io::{parse_optics, read_header, Format, ParseError, ParserOptions};
use beamprop_core::parameters::Parameters;
use beamprop_core::tests::test_helpers::fixture_path;
use std::fs;

#[test]
fn test_missing_file() {
    let path = fixture_path("does_not_exist.tfs");
    let err = parse_optics(
        &path,
        Format::Twiss,
        ParserOptions::new("IP5"),
        &Parameters::default(),
    )
    .unwrap_err();
    match err {
        ParseError::FileNotFound { path: reported, .. } => assert_eq!(reported, path),
        other => panic!("unexpected error {:?}", other),
    }
    assert!(matches!(
        read_header(&path),
        Err(ParseError::FileNotFound { .. })
    ));
}

#[test]
fn test_malformed_row_is_fatal() {
    let err = parse_optics(
        &fixture_path("malformed_ir5b1.tfs"),
        Format::Twiss,
        ParserOptions::new("IP5"),
        &Parameters::default(),
    )
    .unwrap_err();
    assert_eq!(err.line(), Some(17));
    assert!(matches!(err, ParseError::MalformedRow { .. }));
}

#[test]
fn test_malformed_row_report_quotes_line() {
    let path = fixture_path("malformed_ir5b1.tfs");
    let source = fs::read_to_string(&path).unwrap();
    let err = parse_optics(
        &path,
        Format::Twiss,
        ParserOptions::new("IP5"),
        &Parameters::default(),
    )
    .unwrap_err();
    let report = format_parse_error(&err, &source);
    assert!(report.contains("line 17"));
    assert!(report.contains("MQXB.A2R5"));
}

#[test]
fn test_lenient_mode_skips_malformed_row() {
    let optics = parse_optics(
        &fixture_path("malformed_ir5b1.tfs"),
        Format::Twiss,
        ParserOptions::new("IP5").lenient(true),
        &Parameters::default(),
    )
    .unwrap();
    let warnings: Vec<_> = optics.diagnostics.warnings().collect();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].line, Some(17));
    assert!(optics.beamline.get_element("MQXB.A2R5").is_err());
    assert!(optics.beamline.get_element("MQXB.B2R5").is_ok());
}

#[test]
fn test_unknown_interaction_point() {
    let err = parse_optics(
        &fixture_path("twiss_ir5b1.tfs"),
        Format::Twiss,
        ParserOptions::new("IP1"),
        &Parameters::default(),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        ParseError::InteractionPointNotFound { ref name } if name == "IP1"
    ));
}
