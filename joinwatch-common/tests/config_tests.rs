//! Tests for configuration loading and graceful degradation
//!
//! - Missing TOML files fall back to compiled defaults
//! - Root folder priority: CLI, environment, TOML, default
//! - Partial TOML files keep defaults for absent keys
//!
//! Tests that touch JOINWATCH_ROOT_FOLDER are marked #[serial] so they do not
//! race on the process environment.

use joinwatch_common::config::{
    load_or_default, load_toml_config, write_toml_config, CompiledDefaults,
    IdentityNormalization, RootFolderInitializer, RootFolderResolver, TomlConfig,
    ROOT_FOLDER_ENV,
};
use joinwatch_common::logging::bootstrap_subscriber;
use serial_test::serial;
use std::env;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

#[test]
fn test_missing_config_file_uses_defaults() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("nope.toml");

    let config = load_or_default(Some(missing.as_path())).unwrap();

    assert_eq!(config, TomlConfig::default());
    assert_eq!(config.monitor.poll_interval_seconds, 30);
    assert_eq!(config.monitor.messages_per_channel_scan, 5);
    assert!(config.monitor.member_scan_enabled);
    assert!(!config.monitor.send_message_to_users);
    assert_eq!(config.monitor.rate_limit_delay_seconds, 2);
    assert_eq!(config.monitor.max_operations_per_hour, 50);
}

#[test]
fn test_partial_toml_keeps_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[monitor]
channel_urls = ["https://discord.com/channels/1/2"]
identity_normalization = "casefold"

[notify]
channel_id = 42
"#,
    )
    .unwrap();

    let config = load_toml_config(&path).unwrap();

    assert_eq!(config.monitor.channel_urls.len(), 1);
    assert_eq!(config.monitor.identity_normalization, IdentityNormalization::CaseFold);
    assert_eq!(config.monitor.poll_interval_seconds, 30);
    assert_eq!(config.notify.channel_id, Some(42));
    assert_eq!(config.notify.api_base, "https://discord.com/api/v10");
    assert_eq!(config.driver.webdriver_url, "http://localhost:9515");
    assert_eq!(config.logging.level, "info");
}

#[test]
fn test_malformed_toml_is_config_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[monitor\npoll_interval_seconds = ").unwrap();

    let err = load_toml_config(&path).unwrap_err();
    assert!(err.to_string().contains("Configuration error"));
}

#[test]
fn test_write_then_load_config() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");

    let mut config = TomlConfig::default();
    config.monitor.channel_urls = vec!["https://discord.com/channels/9/9".to_string()];
    config.notify.bot_token = Some("token".to_string());

    write_toml_config(&config, &path).unwrap();
    let loaded = load_toml_config(&path).unwrap();

    assert_eq!(loaded, config);
}

#[cfg(unix)]
#[test]
fn test_written_config_is_owner_only() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");

    write_toml_config(&TomlConfig::default(), &path).unwrap();

    assert!(!joinwatch_common::fs::permissions_loose(&path).unwrap());
}

#[test]
#[serial]
fn test_resolver_with_no_overrides_uses_default() {
    env::remove_var(ROOT_FOLDER_ENV);

    let root = RootFolderResolver::new().resolve();

    assert_eq!(root, CompiledDefaults::for_current_platform().root_folder);
}

#[test]
#[serial]
fn test_resolver_env_beats_toml() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/joinwatch-env-root");

    let root = RootFolderResolver::new()
        .with_toml_value(Some(PathBuf::from("/tmp/joinwatch-toml-root")))
        .resolve();

    assert_eq!(root, PathBuf::from("/tmp/joinwatch-env-root"));
    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_resolver_cli_beats_env() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/joinwatch-env-root");

    let root = RootFolderResolver::new()
        .with_cli_arg(Some(PathBuf::from("/tmp/joinwatch-cli-root")))
        .resolve();

    assert_eq!(root, PathBuf::from("/tmp/joinwatch-cli-root"));
    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_resolver_toml_used_without_env() {
    env::remove_var(ROOT_FOLDER_ENV);

    let root = RootFolderResolver::new()
        .with_toml_value(Some(PathBuf::from("/tmp/joinwatch-toml-root")))
        .resolve();

    assert_eq!(root, PathBuf::from("/tmp/joinwatch-toml-root"));
}

#[test]
fn test_initializer_creates_directory() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("a").join("b");
    let initializer = RootFolderInitializer::new(root.clone());

    initializer.ensure_directory_exists().unwrap();

    assert!(root.is_dir());
}

/// Log sink shared between the subscriber and the test
#[derive(Clone, Default)]
struct CapturedLog(Arc<Mutex<Vec<u8>>>);

impl Write for CapturedLog {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl CapturedLog {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

#[test]
fn test_override_warnings_reach_bootstrap_subscriber() {
    let log = CapturedLog::default();
    let sink = log.clone();
    let subscriber = bootstrap_subscriber(EnvFilter::new("warn"), move || sink.clone());

    let config = tracing::subscriber::with_default(subscriber, || {
        let mut config = TomlConfig::default();
        config.apply_overrides(|key| match key {
            "JOINWATCH_POLL_INTERVAL_SECONDS" => Some("soon".to_string()),
            _ => None,
        });
        config
    });

    assert_eq!(config.monitor.poll_interval_seconds, 30);
    assert!(log
        .text()
        .contains("Ignoring invalid value for JOINWATCH_POLL_INTERVAL_SECONDS"));
}

#[test]
fn test_missing_config_warning_reaches_bootstrap_subscriber() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("absent.toml");
    let log = CapturedLog::default();
    let sink = log.clone();
    let subscriber = bootstrap_subscriber(EnvFilter::new("info"), move || sink.clone());

    tracing::subscriber::with_default(subscriber, || load_or_default(Some(missing.as_path()))).unwrap();

    assert!(log.text().contains("not found, using defaults"));
}
