//! Integration tests for configuration loading and validation

#![allow(clippy::expect_used, clippy::unwrap_used)]

use newcamd_relay::config::{AccountConfig, CamdConfig, LoggingConfig, ServerConfig};
use std::time::Duration;
use tracing::Level;

#[test]
fn test_default_config_validates() {
    let config = CamdConfig::default();
    let errors = config.validate();
    assert!(
        errors.is_empty(),
        "Default config should be valid, but got errors: {:?}",
        errors
    );
}

#[test]
fn test_invalid_server_address() {
    let mut config = CamdConfig::default();
    config.server.address = "invalid_address".to_string();

    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("Invalid server address")));
}

#[test]
fn test_empty_server_address() {
    let mut config = CamdConfig::default();
    config.server.address = String::new();

    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("cannot be empty")));
}

#[test]
fn test_zero_max_connections() {
    let mut config = CamdConfig::default();
    config.server.max_connections = 0;

    let errors = config.validate();
    assert!(errors
        .iter()
        .any(|e| e.contains("Max connections must be greater than 0")));
}

#[test]
fn test_high_max_connections_warning() {
    let mut config = CamdConfig::default();
    config.server.max_connections = 200_000;

    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("Max connections very high")));
}

#[test]
fn test_long_shutdown_timeout() {
    let mut config = CamdConfig::default();
    config.server.shutdown_timeout = Duration::from_secs(120);

    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("Shutdown timeout too long")));
}

#[test]
fn test_bad_des_keys() {
    for key in ["", "0102", "01020304050607080910111213141516", "not hex at all!"] {
        let mut config = CamdConfig::default();
        config.account.des_key = key.to_string();
        assert_eq!(config.validate().len(), 1, "key {key:?} accepted");
    }
}

#[test]
fn test_empty_username() {
    let mut config = CamdConfig::default();
    config.account.username = String::new();

    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("Username cannot be empty")));
}

#[test]
fn test_validate_strict_with_invalid_config() {
    let mut config = CamdConfig::default();
    config.server.address = String::new();

    let err = config.validate_strict().unwrap_err();
    assert!(err.to_string().contains("Configuration validation failed"));
}

#[test]
fn test_multiple_validation_errors() {
    let mut config = CamdConfig::default();
    config.server.address = String::new();
    config.server.max_connections = 0;
    config.account.username = String::new();
    config.account.des_key = "zz".into();

    let errors = config.validate();
    assert_eq!(errors.len(), 4, "{errors:?}");
}

#[test]
fn test_partial_toml_uses_defaults() {
    let config = CamdConfig::from_toml(
        r#"
        [account]
        username = "alice"
        password = "secret"
        des_key = "0f0e0d0c0b0a09080706050403020100"
        "#,
    );
    // 16 bytes of key: parses, but does not validate.
    let config = config.expect("TOML should parse");
    assert_eq!(config.account.username, "alice");
    assert_eq!(config.server.address, "0.0.0.0:15050");
    assert_eq!(config.logging.log_level, Level::INFO);
    assert!(config.validate_strict().is_err());
}

#[test]
fn test_bad_log_level_rejected() {
    let result = CamdConfig::from_toml(
        r#"
        [logging]
        log_level = "loud"
        json_format = false
        "#,
    );
    assert!(result.is_err());
}

#[test]
fn test_example_config_round_trips_through_file() {
    let path = std::env::temp_dir().join(format!("newcamd-relay-{}.toml", std::process::id()));

    let config = CamdConfig {
        server: ServerConfig {
            address: "127.0.0.1:16000".to_string(),
            max_connections: 50,
            shutdown_timeout: Duration::from_millis(2500),
        },
        account: AccountConfig {
            username: "box".to_string(),
            password: "hunter2".to_string(),
            des_key: "a1a2a3a4a5a6a7a8a9aaabacadae".to_string(),
        },
        logging: LoggingConfig {
            log_level: Level::DEBUG,
            json_format: true,
        },
    };
    config.save_to_file(&path).unwrap();
    let loaded = CamdConfig::from_file(&path).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(loaded.server.address, "127.0.0.1:16000");
    assert_eq!(loaded.server.shutdown_timeout, Duration::from_millis(2500));
    assert_eq!(loaded.account.username, "box");
    assert_eq!(loaded.logging.log_level, Level::DEBUG);
    assert!(loaded.logging.json_format);
    assert!(loaded.validate().is_empty());

    assert!(CamdConfig::example_config().contains("[account]"));
}

#[test]
fn test_missing_file() {
    assert!(CamdConfig::from_file("/nonexistent/newcamd.toml").is_err());
}

#[test]
fn test_env_overrides() {
    std::env::set_var("NEWCAMD_ADDRESS", "127.0.0.1:17000");
    std::env::set_var("NEWCAMD_USERNAME", "envuser");
    std::env::set_var("NEWCAMD_MAX_CONNECTIONS", "12");
    let config = CamdConfig::from_env().unwrap();
    assert_eq!(config.server.address, "127.0.0.1:17000");
    assert_eq!(config.account.username, "envuser");
    assert_eq!(config.server.max_connections, 12);

    std::env::set_var("NEWCAMD_MAX_CONNECTIONS", "many");
    assert!(CamdConfig::from_env().is_err());

    for var in ["NEWCAMD_ADDRESS", "NEWCAMD_USERNAME", "NEWCAMD_MAX_CONNECTIONS"] {
        std::env::remove_var(var);
    }
}
