//! Tests for command parsing
//!
//! These tests verify:
//! - Every command form parses
//! - Case-insensitive command names and quoting rules
//! - Malformed lines are rejected

use bytecask::protocol::Command;

// =============================================================================
// Well-formed Commands
// =============================================================================

#[test]
fn test_parse_get() {
    assert_eq!(Command::parse("GET user:1"), Some(Command::Get { key: "user:1".into() }));
}

#[test]
fn test_parse_set_bare_value() {
    assert_eq!(
        Command::parse("SET user:1 alice"),
        Some(Command::Set { key: "user:1".into(), value: b"alice".to_vec() })
    );
}

#[test]
fn test_parse_set_quoted_value_with_spaces() {
    assert_eq!(
        Command::parse("SET greeting \"hello there world\""),
        Some(Command::Set { key: "greeting".into(), value: b"hello there world".to_vec() })
    );
    assert_eq!(
        Command::parse("SET greeting 'it is \"quoted\"'"),
        Some(Command::Set { key: "greeting".into(), value: b"it is \"quoted\"".to_vec() })
    );
}

#[test]
fn test_parse_del() {
    assert_eq!(Command::parse("DEL user:1"), Some(Command::Delete { key: "user:1".into() }));
}

#[test]
fn test_parse_ping_forms() {
    assert_eq!(Command::parse("PING"), Some(Command::Ping { message: None }));
    assert_eq!(
        Command::parse("PING hello"),
        Some(Command::Ping { message: Some("hello".into()) })
    );
}

#[test]
fn test_command_names_case_insensitive() {
    assert_eq!(Command::parse("get k"), Some(Command::Get { key: "k".into() }));
    assert_eq!(Command::parse("pInG"), Some(Command::Ping { message: None }));
    assert_eq!(
        Command::parse("sEt k v"),
        Some(Command::Set { key: "k".into(), value: b"v".to_vec() })
    );
}

#[test]
fn test_surrounding_whitespace_ignored() {
    assert_eq!(Command::parse("   GET    k   \r\n"), Some(Command::Get { key: "k".into() }));
    assert_eq!(
        Command::parse("SET k    v  "),
        Some(Command::Set { key: "k".into(), value: b"v".to_vec() })
    );
}

#[test]
fn test_quoted_command_name() {
    assert_eq!(Command::parse("\"GET\" k"), Some(Command::Get { key: "k".into() }));
}

// =============================================================================
// Malformed Commands
// =============================================================================

#[test]
fn test_missing_arguments() {
    assert_eq!(Command::parse("GET"), None);
    assert_eq!(Command::parse("DEL"), None);
    assert_eq!(Command::parse("SET"), None);
    assert_eq!(Command::parse("SET k"), None);
}

#[test]
fn test_extra_arguments() {
    assert_eq!(Command::parse("GET a b"), None);
    assert_eq!(Command::parse("DEL a b"), None);
    assert_eq!(Command::parse("SET k two words"), None);
}

#[test]
fn test_bad_quoting() {
    assert_eq!(Command::parse("GET \"open"), None);
    assert_eq!(Command::parse("SET k \"open"), None);
    assert_eq!(Command::parse("SET k \"a\"b\""), None);
}

#[test]
fn test_empty_key_or_value() {
    assert_eq!(Command::parse("GET \"\""), None);
    assert_eq!(Command::parse("SET k \"\""), None);
}

#[test]
fn test_unknown_command() {
    assert_eq!(Command::parse("KEYS *"), None);
    assert_eq!(Command::parse(""), None);
    assert_eq!(Command::parse("   "), None);
}
