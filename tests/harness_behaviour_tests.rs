//! Behaviour of the harness itself: isolation between calls, failure channels,
//! configuration and concurrent use.

mod common;

use std::path::PathBuf;
use std::sync::Arc;

use rayon::prelude::*;
use settings_schema::{
    HELPER_SCHEMA, HarnessConfig, HarnessError, SchemaDocument, Severity, ValidationHarness,
    ValidationSettings,
};

use common::{MockEnvProvider, harness, harness_config, init_tracing, schema_path};

#[test]
fn test_repeated_calls_return_identical_events() {
    let inputs = [
        (r#"<Setting Value="ABC" />"#, true),
        ("<Settings xmlns='foo' />", false),
        ("<random />", false),
        ("<Settings />", false),
    ];

    for (input, include_helper_schema) in inputs {
        let first = harness()
            .run_validation(input, include_helper_schema)
            .unwrap();
        let second = harness()
            .run_validation(input, include_helper_schema)
            .unwrap();
        assert_eq!(first, second, "results differ for {input}");
    }
}

#[test]
fn test_events_do_not_leak_between_calls() {
    let rejected = harness().run_validation("<random />", false).unwrap();
    assert_eq!(rejected.len(), 1);

    let accepted = harness().run_validation("<Settings />", false).unwrap();
    assert!(accepted.is_empty());
}

#[test]
fn test_helper_schema_does_not_persist_between_calls() {
    let with_helper = harness()
        .run_validation(r#"<Setting Name="a" Value="b" />"#, true)
        .unwrap();
    assert!(with_helper.is_empty());

    let without_helper = harness()
        .run_validation(r#"<Setting Name="a" Value="b" />"#, false)
        .unwrap();
    assert_eq!(without_helper.len(), 1);
    assert_eq!(
        without_helper[0].message,
        "The 'Setting' element is not declared."
    );
}

#[test]
fn test_events_carry_input_line() {
    let events = harness()
        .run_validation("<Settings>\n  <Plugin />\n</Settings>", false)
        .unwrap();

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].line, 2);
}

#[test]
fn test_malformed_xml_is_a_harness_failure() {
    for input in ["<Settings>", "<Settings></Setting>", "", "not xml at all"] {
        let result = harness().run_validation(input, false);
        assert!(
            matches!(result, Err(HarnessError::MalformedXml { .. })),
            "expected MalformedXml for {input:?}, got {result:?}"
        );
    }
}

#[test]
fn test_missing_schema_file_fails_at_startup() {
    init_tracing();
    let config = HarnessConfig {
        schema_path: PathBuf::from("/nonexistent/Settings.xsd"),
        ..HarnessConfig::default()
    };

    let result = ValidationHarness::from_config(&config);
    assert!(matches!(result, Err(HarnessError::Io { .. })));
}

#[test]
fn test_warnings_suppressed_without_reporting() {
    init_tracing();
    let config = HarnessConfig {
        report_warnings: false,
        ..harness_config()
    };
    let quiet = ValidationHarness::from_config(&config).unwrap();
    assert!(!quiet.settings().report_warnings);

    let events = quiet.run_validation("<Settings xmlns='foo' />", false).unwrap();
    assert!(events.is_empty());

    let errors = quiet.run_validation("<random />", false).unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].severity, Severity::Error);
}

#[test]
fn test_environment_configures_harness() {
    init_tracing();
    let schema = schema_path();
    let mut env = MockEnvProvider::new();
    env.set("SETTINGS_SCHEMA_PATH", &schema.to_string_lossy())
        .set("SETTINGS_SCHEMA_REPORT_WARNINGS", "false");

    let quiet = ValidationHarness::from_environment_with(&env, None).unwrap();
    assert!(!quiet.settings().report_warnings);
    assert!(
        quiet
            .run_validation("<Settings xmlns='foo' />", false)
            .unwrap()
            .is_empty()
    );

    env.set("SETTINGS_SCHEMA_REPORT_WARNINGS", "true");
    let loud = ValidationHarness::from_environment_with(&env, None).unwrap();
    let events = loud.run_validation("<Settings xmlns='foo' />", false).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].severity, Severity::Warning);
}

#[test]
fn test_environment_schema_path_is_used() {
    init_tracing();
    let mut env = MockEnvProvider::new();
    env.set("SETTINGS_SCHEMA_PATH", "/nonexistent/Settings.xsd");

    let result = ValidationHarness::from_environment_with(&env, None);
    assert!(matches!(result, Err(HarnessError::Io { .. })));
}

#[test]
fn test_invalid_environment_is_a_config_failure() {
    init_tracing();
    let mut env = MockEnvProvider::new();
    env.set("SETTINGS_SCHEMA_PATH", &schema_path().to_string_lossy())
        .set("SETTINGS_SCHEMA_REPORT_WARNINGS", "sometimes");

    let result = ValidationHarness::from_environment_with(&env, None);
    assert!(matches!(result, Err(HarnessError::Config(_))));
}

#[test]
fn test_incompatible_helper_schema_is_a_composition_failure() {
    init_tracing();
    let namespaced_helper = SchemaDocument::from_source(
        "namespaced helper",
        r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" targetNamespace="urn:helper" />"#,
    )
    .unwrap();
    let harness = ValidationHarness::new(
        Arc::new(SchemaDocument::from_file(schema_path()).unwrap()),
        Arc::new(namespaced_helper),
        ValidationSettings::default(),
    );

    assert!(harness.run_validation("<Settings />", false).unwrap().is_empty());
    assert!(matches!(
        harness.run_validation("<Settings />", true),
        Err(HarnessError::SchemaComposition { .. })
    ));
}

#[test]
fn test_helper_schema_alone_does_not_compile() {
    init_tracing();
    let helper = Arc::new(SchemaDocument::from_source("helper", HELPER_SCHEMA).unwrap());
    let harness = ValidationHarness::new(
        Arc::clone(&helper),
        helper,
        ValidationSettings::default(),
    );

    assert!(matches!(
        harness.run_validation("<Setting Name='a' Value='b' />", true),
        Err(HarnessError::SchemaParsing { .. })
    ));
}

#[test]
fn test_concurrent_validations_share_one_harness() {
    let cases: Vec<(&str, bool, usize)> = vec![
        (r#"<Setting Name="a" Value="b" />"#, true, 0),
        (r#"<Setting Value="b" />"#, true, 1),
        ("<Settings />", false, 0),
        ("<Factory />", false, 1),
        ("<Settings xmlns='foo' />", false, 1),
    ];

    let results: Vec<bool> = (0..40)
        .into_par_iter()
        .map(|i| {
            let (input, include_helper_schema, expected) = cases[i % cases.len()];
            let events = harness()
                .run_validation(input, include_helper_schema)
                .unwrap();
            events.len() == expected
        })
        .collect();

    assert!(results.into_iter().all(|ok| ok));
}
