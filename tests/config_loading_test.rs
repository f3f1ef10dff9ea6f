//! Config file loading through the public API

use std::io::Write;
use std::time::Duration;

use priority_transfer::config::Config;
use priority_transfer::fee_estimator::PriorityLevel;
use priority_transfer::{ConfirmationLevel, ConfirmationMode};

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_full_config_file() {
    let file = write_config(
        r#"
        [rpc]
        url = "https://rpc.example.com"
        ws_url = "wss://rpc.example.com"
        timeout_secs = 15

        [fee]
        url = "https://fees.example.com"
        priority_level = "Medium"
        timeout_secs = 3

        [wallet]
        keypair_path = "/keys/source.json"

        [submission]
        skip_preflight = false
        max_retries = 5
        commitment = "processed"
        timeout_secs = 30
        confirmation = "polling"
        poll_interval_ms = 250
        rebroadcast_interval_ms = 1500
        "#,
    );

    let config = Config::from_file(file.path().to_str().unwrap()).unwrap();
    config.validate().unwrap();

    assert_eq!(config.fee_url(), "https://fees.example.com");
    assert_eq!(config.fee.priority_level, Some(PriorityLevel::Medium));
    assert_eq!(config.rpc_timeout(), Duration::from_secs(15));
    assert_eq!(config.fee_timeout(), Duration::from_secs(3));
    assert_eq!(
        config.wallet.keypair_path.as_deref(),
        Some("/keys/source.json")
    );

    let policy = config.to_submit_policy();
    assert_eq!(policy.max_retries, 5);
    assert_eq!(policy.commitment, ConfirmationLevel::Processed);
    assert_eq!(policy.timeout, Duration::from_secs(30));
    assert_eq!(policy.rebroadcast_interval, Duration::from_millis(1500));
    assert_eq!(
        policy.confirmation,
        ConfirmationMode::Polling {
            interval: Duration::from_millis(250)
        }
    );
}

#[test]
fn test_missing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");
    assert!(Config::from_file(path.to_str().unwrap()).is_err());
}

#[test]
fn test_unknown_commitment_is_rejected() {
    let file = write_config(
        r#"
        [rpc]
        url = "https://rpc.example.com"

        [submission]
        commitment = "recent"
        "#,
    );
    assert!(Config::from_file(file.path().to_str().unwrap()).is_err());
}

#[test]
fn test_subscription_without_ws_url_fails_validation() {
    let file = write_config(
        r#"
        [rpc]
        url = "https://rpc.example.com"

        [submission]
        confirmation = "subscription"
        "#,
    );
    let config = Config::from_file(file.path().to_str().unwrap()).unwrap();
    assert!(config.validate().is_err());
}
