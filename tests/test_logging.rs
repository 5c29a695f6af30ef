//! Tests for logging configuration and format parsing
//!
//! Covers the pure functions that turn `LOG_FORMAT` / `LOG_LEVEL` values
//! into subscriber settings.

use semker::observability::logging::{init_logging, parse_level, LogFormat};
use tracing::Level;

#[test]
fn test_log_format_parse_is_case_insensitive() {
    for value in ["json", "JSON", "Json"] {
        assert_eq!(LogFormat::parse(value), LogFormat::Json);
    }
    for value in ["pretty", "PRETTY", "Pretty"] {
        assert_eq!(LogFormat::parse(value), LogFormat::Pretty);
    }
    for value in ["compact", "COMPACT", "Compact"] {
        assert_eq!(LogFormat::parse(value), LogFormat::Compact);
    }
}

#[test]
fn test_log_format_parse_invalid_defaults_to_json() {
    for value in ["invalid", "", "xml", "yaml", "123"] {
        assert_eq!(LogFormat::parse(value), LogFormat::Json, "value: {value:?}");
    }
}

#[test]
fn test_log_format_parse_ignores_surrounding_whitespace() {
    assert_eq!(LogFormat::parse("  pretty  "), LogFormat::Pretty);
    assert_eq!(LogFormat::parse("compact\n"), LogFormat::Compact);
    assert_eq!(LogFormat::parse("\tjson"), LogFormat::Json);
}

#[test]
fn test_parse_level() {
    assert_eq!(parse_level("error"), Level::ERROR);
    assert_eq!(parse_level("WARN"), Level::WARN);
    assert_eq!(parse_level("Debug"), Level::DEBUG);
    assert_eq!(parse_level(" trace "), Level::TRACE);
    assert_eq!(parse_level("info"), Level::INFO);
    assert_eq!(parse_level("verbose"), Level::INFO);
    assert_eq!(parse_level(""), Level::INFO);
}

#[test]
fn test_init_logging_twice_does_not_panic() {
    init_logging(Level::INFO, LogFormat::Compact, false);
    init_logging(Level::DEBUG, LogFormat::Json, true);
}
