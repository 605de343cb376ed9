// tests/unit_interval_test.rs

use conductor::core::errors::ConductorError;
use conductor::core::interval::to_micros;

#[test]
fn test_seconds_with_fraction() {
    assert_eq!(to_micros("1.5s").unwrap(), 1_500_000);
}

#[test]
fn test_milliseconds() {
    assert_eq!(to_micros("250ms").unwrap(), 250_000);
}

#[test]
fn test_minutes() {
    assert_eq!(to_micros("2m").unwrap(), 120_000_000);
}

#[test]
fn test_bare_number_is_seconds() {
    assert_eq!(to_micros("2").unwrap(), 2_000_000);
}

#[test]
fn test_microseconds() {
    assert_eq!(to_micros("10us").unwrap(), 10);
}

#[test]
fn test_longest_suffix_wins() {
    // "ms" must not be read as a bare "s" suffix.
    assert_eq!(to_micros("1.5ms").unwrap(), 1_500);
    // A minutes value ending in the same letter as "ms" stays minutes.
    assert_eq!(to_micros("1m").unwrap(), 60_000_000);
}

#[test]
fn test_case_insensitive_units() {
    assert_eq!(to_micros("250MS").unwrap(), 250_000);
    assert_eq!(to_micros("1.5S").unwrap(), 1_500_000);
}

#[test]
fn test_surrounding_whitespace() {
    assert_eq!(to_micros(" 20s ").unwrap(), 20_000_000);
}

#[test]
fn test_garbage_rejected() {
    assert!(matches!(
        to_micros("bad"),
        Err(ConductorError::InvalidInterval(_))
    ));
}

#[test]
fn test_unknown_unit_rejected() {
    assert!(matches!(
        to_micros("5h"),
        Err(ConductorError::InvalidInterval(_))
    ));
}

#[test]
fn test_negative_rejected() {
    assert!(matches!(
        to_micros("-3s"),
        Err(ConductorError::InvalidInterval(_))
    ));
}

#[test]
fn test_empty_rejected() {
    assert!(matches!(
        to_micros(""),
        Err(ConductorError::InvalidInterval(_))
    ));
}
