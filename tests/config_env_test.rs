//! Loading configuration from the process environment.
//!
//! These tests mutate process-wide environment variables, so they run
//! serially.

use std::path::PathBuf;
use std::time::Duration;

use nutrilink::config::{ConfigError, ResilienceConfig};
use serial_test::serial;

const VARS: [&str; 6] = [
    "NUTRILINK_CHANNEL_URL",
    "NUTRILINK_API_URL",
    "NUTRILINK_STORAGE_DIR",
    "NUTRILINK_NAMESPACE",
    "NUTRILINK_RECONNECT_INTERVAL_MS",
    "NUTRILINK_MAX_RETRIES",
];

fn clear_env() {
    for var in VARS {
        std::env::remove_var(var);
    }
}

#[test]
#[serial]
fn test_from_env_defaults() {
    clear_env();
    let config = ResilienceConfig::from_env().unwrap();
    assert_eq!(config, ResilienceConfig::default());
    assert!(config.validate().is_ok());
}

#[test]
#[serial]
fn test_from_env_overrides() {
    clear_env();
    std::env::set_var("NUTRILINK_CHANNEL_URL", "wss://rt.nutrilink.test/ws");
    std::env::set_var("NUTRILINK_API_URL", "https://api.nutrilink.test/v1/");
    std::env::set_var("NUTRILINK_STORAGE_DIR", "/var/lib/nutrilink");
    std::env::set_var("NUTRILINK_NAMESPACE", "tenant42");
    std::env::set_var("NUTRILINK_RECONNECT_INTERVAL_MS", "2500");
    std::env::set_var("NUTRILINK_MAX_RETRIES", "5");

    let config = ResilienceConfig::from_env().unwrap();
    clear_env();

    assert_eq!(config.connection.url, "wss://rt.nutrilink.test/ws");
    assert_eq!(config.api_base_url, "https://api.nutrilink.test/v1");
    assert_eq!(
        config.resolved_storage_dir().unwrap(),
        PathBuf::from("/var/lib/nutrilink")
    );
    assert_eq!(config.queue.pending_key(), "tenant42.pending");
    assert_eq!(
        config.connection.reconnect_interval,
        Duration::from_millis(2500)
    );
    assert_eq!(config.recovery.max_retries, 5);
}

#[test]
#[serial]
fn test_from_env_rejects_garbage_numbers() {
    clear_env();
    std::env::set_var("NUTRILINK_MAX_RETRIES", "lots");

    let result = ResilienceConfig::from_env();
    clear_env();

    assert!(matches!(
        result,
        Err(ConfigError::InvalidValue { var: "NUTRILINK_MAX_RETRIES", .. })
    ));
}

#[test]
#[serial]
fn test_zero_interval_fails_validation() {
    clear_env();
    std::env::set_var("NUTRILINK_RECONNECT_INTERVAL_MS", "0");

    let config = ResilienceConfig::from_env().unwrap();
    clear_env();

    assert_eq!(
        config.validate(),
        Err(ConfigError::Zero("reconnect interval"))
    );
}
