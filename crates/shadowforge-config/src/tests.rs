//! Tests for engine configuration.

use super::*;

#[test]
fn test_toml_parsing() {
    let toml = r#"
        environment_mode = "fast_assert"

        [propagation]
        queue_capacity = 512
        trace_commits = true
    "#;

    let config = EngineConfig::from_toml_str(toml).unwrap();
    assert_eq!(config.environment_mode, EnvironmentMode::FastAssert);
    assert_eq!(config.propagation.queue_capacity, 512);
    assert!(config.propagation.trace_commits);
    assert!(config.session.report_decision_changes);
}

#[test]
fn test_yaml_parsing() {
    let yaml = r#"
        environment_mode: full_assert
        session:
          report_decision_changes: false
    "#;

    let config = EngineConfig::from_yaml_str(yaml).unwrap();
    assert_eq!(config.environment_mode, EnvironmentMode::FullAssert);
    assert!(!config.session.report_decision_changes);
    assert_eq!(
        config.propagation.queue_capacity,
        PropagationConfig::DEFAULT_QUEUE_CAPACITY
    );
}

#[test]
fn test_defaults() {
    let config = EngineConfig::from_toml_str("").unwrap();
    assert_eq!(config, EngineConfig::default());
    assert_eq!(config.environment_mode, EnvironmentMode::NoAssert);
    assert!(!config.checks_mirrors());
    assert!(!config.checks_derivations());
}

#[test]
fn test_builder() {
    let config = EngineConfig::new()
        .with_environment_mode(EnvironmentMode::FastAssert)
        .with_queue_capacity(8)
        .with_trace_commits(true)
        .with_decision_changes(false);

    assert!(config.checks_mirrors());
    assert!(!config.checks_derivations());
    assert_eq!(config.propagation.queue_capacity, 8);
    assert!(config.propagation.trace_commits);
    assert!(!config.session.report_decision_changes);
}

#[test]
fn test_invalid_values() {
    let err = EngineConfig::from_toml_str("environment_mode = \"loud\"").unwrap_err();
    assert!(matches!(err, ConfigError::Toml(_)));

    let err = EngineConfig::from_toml_str("[propagation]\nqueue_capacity = 100000000").unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
}

#[test]
fn test_missing_file() {
    let err = EngineConfig::load("does/not/exist.toml").unwrap_err();
    assert!(matches!(err, ConfigError::Io(_)));
}
