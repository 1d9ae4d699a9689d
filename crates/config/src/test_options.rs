//! Tests for option lookup, fallbacks, and typed access.

use toml::Value;

use crate::{Error, MANAGER_SECTION, Options, load_from_str};

#[test]
fn defaults_are_seeded() {
    let opts = Options::new();
    assert!(opts.get_bool(MANAGER_SECTION, "recurse").unwrap());
    assert_eq!(opts.get_int(MANAGER_SECTION, "max-depth").unwrap(), 10);
    assert_eq!(opts.get_str(MANAGER_SECTION, "outdir").unwrap(), "./results");
    assert!(opts.get_int(MANAGER_SECTION, "threads").unwrap() >= 1);
    assert!((opts.get_float(MANAGER_SECTION, "timeout").unwrap() - 0.1).abs() < f64::EPSILON);
    assert!(opts.get_list(MANAGER_SECTION, "exclude").unwrap().is_empty());
}

#[test]
fn flag_format_has_no_default() {
    let opts = Options::new();
    assert!(!opts.contains(MANAGER_SECTION, "flag-format"));
    assert!(matches!(
        opts.get_str(MANAGER_SECTION, "flag-format"),
        Err(Error::Validation { .. })
    ));
}

#[test]
fn section_overrides_default() {
    let opts = load_from_str(
        r#"
            [DEFAULT]
            threads = 2

            [manager]
            threads = 7
            flag-format = "FLAG{[^}]+}"
        "#,
        None,
    )
    .unwrap();
    assert_eq!(opts.get_int(MANAGER_SECTION, "threads").unwrap(), 7);
    assert_eq!(opts.get_int("units", "threads").unwrap(), 2);
    assert_eq!(
        opts.get_str(MANAGER_SECTION, "flag-format").unwrap(),
        "FLAG{[^}]+}"
    );
}

#[test]
fn bare_keys_fall_into_default() {
    let opts = load_from_str("recurse = false\n", None).unwrap();
    assert!(!opts.get_bool(MANAGER_SECTION, "recurse").unwrap());
}

#[test]
fn string_coercions() {
    let opts = load_from_str(
        r#"
            [manager]
            threads = "4"
            recurse = "no"
            timeout = "1.5"
            unit = "raw, railfence"
        "#,
        None,
    )
    .unwrap();
    assert_eq!(opts.get_int(MANAGER_SECTION, "threads").unwrap(), 4);
    assert!(!opts.get_bool(MANAGER_SECTION, "recurse").unwrap());
    assert!((opts.get_float(MANAGER_SECTION, "timeout").unwrap() - 1.5).abs() < f64::EPSILON);
    assert_eq!(
        opts.get_list(MANAGER_SECTION, "unit").unwrap(),
        vec!["raw".to_string(), "railfence".to_string()]
    );
}

#[test]
fn type_mismatch_is_reported() {
    let opts = load_from_str("[manager]\nthreads = \"many\"\n", None).unwrap();
    let err = opts.get_int(MANAGER_SECTION, "threads").unwrap_err();
    assert!(matches!(err, Error::Validation { .. }));
    assert!(err.pretty().contains("manager.threads"));
}

#[test]
fn parse_error_carries_location() {
    let err = load_from_str("[manager\nthreads = 1\n", None).unwrap_err();
    match err {
        Error::Parse { line, .. } => assert_eq!(line, 1),
        other => panic!("expected parse error, got {:?}", other),
    }
}

#[test]
fn set_overrides_file_values() {
    let mut opts = load_from_str("[manager]\nthreads = 2\n", None).unwrap();
    opts.set(MANAGER_SECTION, "threads", Value::Integer(9));
    assert_eq!(opts.get_int(MANAGER_SECTION, "threads").unwrap(), 9);
}
