//! Configuration loading and root folder resolution
//!
//! Every setting is resolved in this priority order:
//! 1. Command-line argument (highest priority, applied by the binary)
//! 2. Environment variable (`JOINWATCH_*`)
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! A missing config file is not an error: a warning is logged and the
//! compiled defaults are used.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Default state file name inside the root folder
pub const DEFAULT_STATE_FILE: &str = "joinwatch-state.json";

/// Environment variable naming the root folder
pub const ROOT_FOLDER_ENV: &str = "JOINWATCH_ROOT_FOLDER";

/// Environment variable naming the TOML config file
pub const CONFIG_FILE_ENV: &str = "JOINWATCH_CONFIG";

/// Bootstrap configuration loaded from TOML
///
/// Read once at startup; the process must restart to pick up changes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// Folder holding the state file (optional)
    pub root_folder: Option<PathBuf>,

    /// State file path, absolute or relative to the root folder (optional)
    pub state_file: Option<PathBuf>,

    pub logging: LoggingConfig,
    pub monitor: MonitorConfig,
    pub notify: NotifyConfig,
    pub driver: DriverConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

/// How raw identities are folded before ledger and event-key lookups
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityNormalization {
    /// Plain string equality
    #[default]
    Verbatim,
    /// Trim, drop a leading `@`, lowercase
    CaseFold,
}

/// Polling and detection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Pause between full passes over all channels
    pub poll_interval_seconds: u64,
    /// Most-recent message blocks inspected per channel
    pub messages_per_channel_scan: usize,
    /// Toggles roster extraction
    pub member_scan_enabled: bool,
    /// Toggles the direct-message path (not implemented, logged only)
    pub send_message_to_users: bool,
    /// Channels visited in this order every cycle
    pub channel_urls: Vec<String>,
    /// Pause after each channel visit
    pub rate_limit_delay_seconds: u64,
    /// Budget of channel visits per hour
    pub max_operations_per_hour: u32,
    pub navigation_timeout_seconds: u64,
    /// Wait after navigation before reading the page
    pub settle_seconds: u64,
    /// Wait after the reload that follows a failed navigation
    pub navigation_retry_seconds: u64,
    /// Wait after a cycle-level failure
    pub cycle_backoff_seconds: u64,
    /// Roster entries probed for canonical handles
    pub handle_probe_limit: usize,
    pub identity_normalization: IdentityNormalization,
    /// Replaces the built-in join pattern table when set
    pub join_patterns: Option<Vec<String>>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: 30,
            messages_per_channel_scan: 5,
            member_scan_enabled: true,
            send_message_to_users: false,
            channel_urls: Vec::new(),
            rate_limit_delay_seconds: 2,
            max_operations_per_hour: 50,
            navigation_timeout_seconds: 60,
            settle_seconds: 5,
            navigation_retry_seconds: 5,
            cycle_backoff_seconds: 10,
            handle_probe_limit: 20,
            identity_normalization: IdentityNormalization::Verbatim,
            join_patterns: None,
        }
    }
}

/// Operator notification channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Bot token; without one notifications are only logged
    pub bot_token: Option<String>,
    /// Well-known channel receiving all operator notifications
    pub channel_id: Option<u64>,
    pub api_base: String,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            channel_id: None,
            api_base: "https://discord.com/api/v10".to_string(),
        }
    }
}

/// Browser automation endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// W3C WebDriver server (chromedriver, geckodriver, ...)
    pub webdriver_url: String,
    pub browser: String,
    pub headless: bool,
    /// Browser profile holding an already logged-in session
    pub user_data_dir: Option<PathBuf>,
    pub user_agent: Option<String>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:9515".to_string(),
            browser: "chrome".to_string(),
            headless: false,
            user_data_dir: None,
            user_agent: None,
        }
    }
}

/// Interpret a flag value: `1`, `true`, `yes` (any case) are true
pub fn parse_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes"
    )
}

/// Split a comma-separated URL list, keeping only `http*` entries
pub fn parse_channel_urls(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty() && part.starts_with("http"))
        .map(str::to_string)
        .collect()
}

fn parse_or_warn<T: std::str::FromStr>(key: &str, value: &str, current: T) -> T {
    match value.trim().parse::<T>() {
        Ok(parsed) => parsed,
        Err(_) => {
            warn!("Ignoring invalid value for {}: '{}'", key, value);
            current
        }
    }
}

impl TomlConfig {
    /// Apply `JOINWATCH_*` overrides from the process environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup
    ///
    /// Invalid numbers are ignored with a warning; an override channel list
    /// with no usable URLs leaves the TOML list in place.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("JOINWATCH_CHANNEL_URLS") {
            let urls = parse_channel_urls(&raw);
            if !urls.is_empty() {
                self.monitor.channel_urls = urls;
            }
        }
        if let Some(v) = lookup("JOINWATCH_POLL_INTERVAL_SECONDS") {
            self.monitor.poll_interval_seconds =
                parse_or_warn("JOINWATCH_POLL_INTERVAL_SECONDS", &v, self.monitor.poll_interval_seconds);
        }
        if let Some(v) = lookup("JOINWATCH_MESSAGES_PER_CHANNEL_SCAN") {
            self.monitor.messages_per_channel_scan = parse_or_warn(
                "JOINWATCH_MESSAGES_PER_CHANNEL_SCAN",
                &v,
                self.monitor.messages_per_channel_scan,
            );
        }
        if let Some(v) = lookup("JOINWATCH_MEMBER_SCAN_ENABLED") {
            self.monitor.member_scan_enabled = parse_truthy(&v);
        }
        if let Some(v) = lookup("JOINWATCH_SEND_MESSAGE_TO_USERS") {
            self.monitor.send_message_to_users = parse_truthy(&v);
        }
        if let Some(v) = lookup("JOINWATCH_BOT_TOKEN") {
            if !v.trim().is_empty() {
                self.notify.bot_token = Some(v.trim().to_string());
            }
        }
        if let Some(v) = lookup("JOINWATCH_NOTIFY_CHANNEL_ID") {
            match v.trim().parse::<u64>() {
                Ok(id) => self.notify.channel_id = Some(id),
                Err(_) => warn!("Ignoring invalid value for JOINWATCH_NOTIFY_CHANNEL_ID: '{}'", v),
            }
        }
        if let Some(v) = lookup("JOINWATCH_WEBDRIVER_URL") {
            if !v.trim().is_empty() {
                self.driver.webdriver_url = v.trim().to_string();
            }
        }
    }

    /// Validate values that would make the monitor misbehave
    pub fn validate(&self) -> Result<()> {
        if self.monitor.max_operations_per_hour == 0 {
            return Err(Error::Config(
                "monitor.max_operations_per_hour must be at least 1".to_string(),
            ));
        }
        if let Some(patterns) = &self.monitor.join_patterns {
            if patterns.is_empty() {
                return Err(Error::Config(
                    "monitor.join_patterns must not be empty when set".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Load a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Load the config file if one was found, otherwise compiled defaults
///
/// A path that was given but does not exist is treated like no path.
pub fn load_or_default(path: Option<&Path>) -> Result<TomlConfig> {
    match path {
        Some(p) if p.exists() => {
            let config = load_toml_config(p)?;
            info!("Loaded configuration from {}", p.display());
            Ok(config)
        }
        Some(p) => {
            warn!("Config file {} not found, using defaults", p.display());
            Ok(TomlConfig::default())
        }
        None => {
            warn!("No config file found, using defaults");
            Ok(TomlConfig::default())
        }
    }
}

/// Locate the TOML config file
///
/// Priority: explicit path, `JOINWATCH_CONFIG`, user config dir
/// (`~/.config/joinwatch/config.toml`), then `/etc/joinwatch/config.toml`
/// on Linux.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    let user_config = dirs::config_dir().map(|d| d.join("joinwatch").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/joinwatch/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Write a config file atomically with owner-only permissions
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;
    crate::fs::write_atomic(path, content.as_bytes())?;
    crate::fs::set_owner_only(path)?;
    Ok(())
}

/// Compiled defaults for the current platform
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
    pub log_level: String,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        let root_folder = dirs::data_local_dir()
            .map(|d| d.join("joinwatch"))
            .unwrap_or_else(|| {
                if cfg!(target_os = "windows") {
                    PathBuf::from("C:\\ProgramData\\joinwatch")
                } else {
                    PathBuf::from("./joinwatch_data")
                }
            });

        Self {
            root_folder,
            log_level: "info".to_string(),
        }
    }
}

/// Root folder resolution: CLI, `JOINWATCH_ROOT_FOLDER`, TOML, compiled default
#[derive(Debug, Clone, Default)]
pub struct RootFolderResolver {
    cli_arg: Option<PathBuf>,
    toml_value: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cli_arg(mut self, path: Option<PathBuf>) -> Self {
        self.cli_arg = path;
        self
    }

    pub fn with_toml_value(mut self, path: Option<PathBuf>) -> Self {
        self.toml_value = path;
        self
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            return path.clone();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
        }

        if let Some(path) = &self.toml_value {
            return path.clone();
        }

        CompiledDefaults::for_current_platform().root_folder
    }
}

/// Prepares the root folder and derives paths inside it
#[derive(Debug, Clone)]
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    pub fn root_folder(&self) -> &Path {
        &self.root_folder
    }

    /// Create the root folder if missing
    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root_folder.exists() {
            std::fs::create_dir_all(&self.root_folder)?;
            info!("Created root folder: {}", self.root_folder.display());
        }
        Ok(())
    }

    /// State file path; relative overrides resolve against the root folder
    pub fn state_path(&self, override_path: Option<&Path>) -> PathBuf {
        match override_path {
            Some(p) if p.is_absolute() => p.to_path_buf(),
            Some(p) => self.root_folder.join(p),
            None => self.root_folder.join(DEFAULT_STATE_FILE),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_parse_truthy_accepts_common_spellings() {
        for v in ["1", "true", "TRUE", "yes", "YES", " Yes "] {
            assert!(parse_truthy(v), "{} should be truthy", v);
        }
        for v in ["0", "false", "no", "", "on"] {
            assert!(!parse_truthy(v), "{} should be falsy", v);
        }
    }

    #[test]
    fn test_parse_channel_urls_filters_non_http() {
        let urls = parse_channel_urls(
            " https://discord.com/channels/1/2 , ,notaurl, http://localhost/x ",
        );
        assert_eq!(
            urls,
            vec![
                "https://discord.com/channels/1/2".to_string(),
                "http://localhost/x".to_string()
            ]
        );
    }

    #[test]
    fn test_env_overrides_replace_toml_values() {
        let mut config = TomlConfig::default();
        config.monitor.channel_urls = vec!["https://from.toml/1".to_string()];

        config.apply_overrides(lookup_from(&[
            ("JOINWATCH_CHANNEL_URLS", "https://env/1,https://env/2"),
            ("JOINWATCH_POLL_INTERVAL_SECONDS", "45"),
            ("JOINWATCH_MEMBER_SCAN_ENABLED", "0"),
            ("JOINWATCH_SEND_MESSAGE_TO_USERS", "yes"),
            ("JOINWATCH_NOTIFY_CHANNEL_ID", "1255771048889286703"),
        ]));

        assert_eq!(config.monitor.channel_urls.len(), 2);
        assert_eq!(config.monitor.poll_interval_seconds, 45);
        assert!(!config.monitor.member_scan_enabled);
        assert!(config.monitor.send_message_to_users);
        assert_eq!(config.notify.channel_id, Some(1255771048889286703));
    }

    #[test]
    fn test_env_overrides_keep_toml_urls_when_env_has_none_usable() {
        let mut config = TomlConfig::default();
        config.monitor.channel_urls = vec!["https://from.toml/1".to_string()];

        config.apply_overrides(lookup_from(&[("JOINWATCH_CHANNEL_URLS", "garbage, ,")]));

        assert_eq!(config.monitor.channel_urls, vec!["https://from.toml/1".to_string()]);
    }

    #[test]
    fn test_invalid_number_override_is_ignored() {
        let mut config = TomlConfig::default();
        config.apply_overrides(lookup_from(&[("JOINWATCH_MESSAGES_PER_CHANNEL_SCAN", "many")]));
        assert_eq!(config.monitor.messages_per_channel_scan, 5);
    }

    #[test]
    fn test_validate_rejects_zero_hourly_budget() {
        let mut config = TomlConfig::default();
        config.monitor.max_operations_per_hour = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_state_path_resolution() {
        let init = RootFolderInitializer::new(PathBuf::from("/srv/jw"));
        assert_eq!(init.state_path(None), PathBuf::from("/srv/jw").join(DEFAULT_STATE_FILE));
        assert_eq!(
            init.state_path(Some(Path::new("custom.json"))),
            PathBuf::from("/srv/jw/custom.json")
        );
        assert_eq!(
            init.state_path(Some(Path::new("/tmp/abs.json"))),
            PathBuf::from("/tmp/abs.json")
        );
    }
}
