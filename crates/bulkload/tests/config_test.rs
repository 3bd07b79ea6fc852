//! Unit tests for bulkload configuration

use bulkload::config::{ConnectionConfig, LoadOptions, DEFAULT_BATCH_SIZE};
use bulkload::error::ErrorCategory;

#[test]
fn test_connection_config_builders() {
    let config = ConnectionConfig::new("coop", "loader")
        .with_host("db.example", 6432)
        .with_password("pw")
        .with_app_schema("reports")
        .with_application_name("nightly")
        .with_connect_timeout(2_500);

    assert_eq!(config.host, "db.example");
    assert_eq!(config.port, 6432);
    assert_eq!(config.password(), Some("pw"));
    assert_eq!(config.application_name.as_deref(), Some("nightly"));
    assert_eq!(config.connect_timeout_ms, 2_500);
    assert_eq!(config.search_path(), vec!["reports", "public"]);
    assert!(config.check().is_ok());
}

#[test]
fn test_connection_config_requires_database_and_user() {
    let err = ConnectionConfig::new("", "loader").check().unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Configuration);

    assert!(ConnectionConfig::new("coop", "").check().is_err());
}

#[test]
fn test_connection_config_rejects_bad_schema() {
    let config = ConnectionConfig::new("coop", "loader").with_app_schema("x".repeat(64));
    assert!(config.check().is_err());
}

#[test]
fn test_load_options_deserialize_defaults() {
    let options: LoadOptions = serde_json::from_str("{}").unwrap();
    assert_eq!(options.batch_size, DEFAULT_BATCH_SIZE);

    let options: LoadOptions = serde_json::from_str(r#"{"batch_size": 500}"#).unwrap();
    assert_eq!(options, LoadOptions::default().with_batch_size(500));
}

#[test]
fn test_load_options_zero_rejected() {
    let err = LoadOptions::default().with_batch_size(0).check().unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Configuration);
}
