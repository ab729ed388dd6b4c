//! Configuration -- ozone-harness.toml parsing and runtime settings
//!
//! [`HarnessConfig`] holds every tunable of the harness. Each section has
//! defaults matching the stock Ozone distribution layout, so an empty file is
//! a valid configuration.
//!
//! # Load precedence
//! 1. CLI flags (highest)
//! 2. Environment variables (`OZONE_HARNESS_SCRIPTS_STARTUP_TIMEOUT_SECS=600`)
//! 3. Config file (`ozone-harness.toml`)
//! 4. Defaults (`Default` impls)
//!
//! # Example
//! ```no_run
//! # async fn example() -> Result<(), ozone_harness_core::error::HarnessError> {
//! use ozone_harness_core::config::HarnessConfig;
//!
//! let config = HarnessConfig::load("ozone-harness.toml").await?;
//! let config = HarnessConfig::parse("[readiness]\ntimeout_secs = 600")?;
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::app::AppId;
use crate::error::{ConfigError, HarnessError};

/// Top-level harness configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarnessConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub scripts: ScriptsConfig,
    #[serde(default)]
    pub readiness: ReadinessConfig,
    /// Per-app endpoint overrides, keyed by app id.
    #[serde(default)]
    pub apps: BTreeMap<String, AppOverride>,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl HarnessConfig {
    /// Loads the file, applies environment overrides and validates.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, HarnessError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Loads the file if it exists, otherwise starts from defaults.
    ///
    /// Environment overrides are applied and the result validated either way.
    pub async fn load_or_default(path: impl AsRef<Path>) -> Result<Self, HarnessError> {
        let config = Self::load_layers(path).await?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults, then the file if it exists, then environment overrides.
    ///
    /// Nothing is validated, so a caller with a further layer (command-line
    /// flags) can apply it before the single [`validate`](Self::validate).
    pub async fn load_layers(path: impl AsRef<Path>) -> Result<Self, HarnessError> {
        let path = path.as_ref();
        let mut config = match Self::read_file(path).await {
            Ok(config) => config,
            Err(HarnessError::Config(ConfigError::FileNotFound { .. })) => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                Self::default()
            }
            Err(e) => return Err(e),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Loads the file without environment overrides.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, HarnessError> {
        let config = Self::read_file(path.as_ref()).await?;
        config.validate()?;
        Ok(config)
    }

    async fn read_file(path: &Path) -> Result<Self, HarnessError> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                HarnessError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                HarnessError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// Parses a TOML string.
    pub fn parse(toml_str: &str) -> Result<Self, HarnessError> {
        toml::from_str(toml_str).map_err(|e| {
            HarnessError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// Applies `OZONE_HARNESS_{SECTION}_{FIELD}` environment overrides.
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "OZONE_HARNESS_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "OZONE_HARNESS_GENERAL_LOG_FORMAT");

        // Workspace
        override_string(
            &mut self.workspace.manifest_marker,
            "OZONE_HARNESS_WORKSPACE_MANIFEST_MARKER",
        );
        override_string(
            &mut self.workspace.template_dir,
            "OZONE_HARNESS_WORKSPACE_TEMPLATE_DIR",
        );
        override_string(
            &mut self.workspace.workspace_dir,
            "OZONE_HARNESS_WORKSPACE_WORKSPACE_DIR",
        );
        override_string(
            &mut self.workspace.stack_dir_name,
            "OZONE_HARNESS_WORKSPACE_STACK_DIR_NAME",
        );
        override_string(
            &mut self.workspace.scripts_dir,
            "OZONE_HARNESS_WORKSPACE_SCRIPTS_DIR",
        );
        override_string(&mut self.workspace.env_file, "OZONE_HARNESS_WORKSPACE_ENV_FILE");
        override_string(
            &mut self.workspace.control_file,
            "OZONE_HARNESS_WORKSPACE_CONTROL_FILE",
        );
        override_string(
            &mut self.workspace.script_extension,
            "OZONE_HARNESS_WORKSPACE_SCRIPT_EXTENSION",
        );

        // Scripts
        override_u64(
            &mut self.scripts.startup_timeout_secs,
            "OZONE_HARNESS_SCRIPTS_STARTUP_TIMEOUT_SECS",
        );
        override_u64(
            &mut self.scripts.teardown_timeout_secs,
            "OZONE_HARNESS_SCRIPTS_TEARDOWN_TIMEOUT_SECS",
        );

        // Readiness
        override_u64(
            &mut self.readiness.timeout_secs,
            "OZONE_HARNESS_READINESS_TIMEOUT_SECS",
        );
        override_u64(
            &mut self.readiness.poll_interval_secs,
            "OZONE_HARNESS_READINESS_POLL_INTERVAL_SECS",
        );
        override_u64(
            &mut self.readiness.request_timeout_secs,
            "OZONE_HARNESS_READINESS_REQUEST_TIMEOUT_SECS",
        );
        override_u64(
            &mut self.readiness.connect_timeout_secs,
            "OZONE_HARNESS_READINESS_CONNECT_TIMEOUT_SECS",
        );

        // Metrics
        override_bool(&mut self.metrics.enabled, "OZONE_HARNESS_METRICS_ENABLED");
        override_string(
            &mut self.metrics.listen_addr,
            "OZONE_HARNESS_METRICS_LISTEN_ADDR",
        );
        override_u16(&mut self.metrics.port, "OZONE_HARNESS_METRICS_PORT");
        override_string(&mut self.metrics.endpoint, "OZONE_HARNESS_METRICS_ENDPOINT");
    }

    /// Validates value ranges.
    pub fn validate(&self) -> Result<(), HarnessError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        let non_empty = [
            ("workspace.manifest_marker", &self.workspace.manifest_marker),
            ("workspace.template_dir", &self.workspace.template_dir),
            ("workspace.workspace_dir", &self.workspace.workspace_dir),
            ("workspace.stack_dir_name", &self.workspace.stack_dir_name),
            ("workspace.control_file", &self.workspace.control_file),
            ("workspace.script_extension", &self.workspace.script_extension),
        ];
        for (field, value) in non_empty {
            if value.trim().is_empty() {
                return Err(invalid(field, "must not be empty".to_owned()));
            }
        }

        let positive = [
            ("scripts.startup_timeout_secs", self.scripts.startup_timeout_secs),
            ("scripts.teardown_timeout_secs", self.scripts.teardown_timeout_secs),
            ("readiness.poll_interval_secs", self.readiness.poll_interval_secs),
            ("readiness.request_timeout_secs", self.readiness.request_timeout_secs),
            ("readiness.connect_timeout_secs", self.readiness.connect_timeout_secs),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(invalid(field, "must be greater than 0".to_owned()));
            }
        }

        for key in self.apps.keys() {
            key.parse::<AppId>()?;
        }

        if self.metrics.enabled && self.metrics.endpoint != "/metrics" {
            return Err(invalid(
                "metrics.endpoint",
                "only '/metrics' is supported".to_owned(),
            ));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: String) -> HarnessError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason,
    }
    .into()
}

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log format (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "pretty".to_owned(),
        }
    }
}

/// Workspace layout. Relative paths resolve against the project root
/// (`template_dir`, `workspace_dir`) or the stack tree (`scripts_dir`,
/// `env_file`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// File that marks a project directory
    pub manifest_marker: String,
    /// Stack template tree, copied fresh on every start
    pub template_dir: String,
    /// Disposable workspace root
    pub workspace_dir: String,
    /// Name of the stack tree inside the workspace
    pub stack_dir_name: String,
    /// Lifecycle scripts directory inside the stack tree
    pub scripts_dir: String,
    /// Environment override file inside the stack tree
    pub env_file: String,
    /// Stack file list consumed by the start script (in `scripts_dir`)
    pub control_file: String,
    /// Files with this extension are made executable after copying
    pub script_extension: String,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            manifest_marker: "Cargo.toml".to_owned(),
            template_dir: "target/ozone".to_owned(),
            workspace_dir: "target/ozone-test-workspace".to_owned(),
            stack_dir_name: "ozone".to_owned(),
            scripts_dir: "run/docker/scripts".to_owned(),
            env_file: "run/docker/.env".to_owned(),
            control_file: "docker-compose-files.txt".to_owned(),
            script_extension: "sh".to_owned(),
        }
    }
}

/// Lifecycle script settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptsConfig {
    /// Default timeout for start scripts (seconds)
    pub startup_timeout_secs: u64,
    /// Timeout for stop/destroy scripts (seconds)
    pub teardown_timeout_secs: u64,
    /// Extra environment passed to every script
    pub env: BTreeMap<String, String>,
}

impl ScriptsConfig {
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    pub fn teardown_timeout(&self) -> Duration {
        Duration::from_secs(self.teardown_timeout_secs)
    }
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        Self {
            startup_timeout_secs: 5 * 60,
            teardown_timeout_secs: 2 * 60,
            env: BTreeMap::from([("TERM".to_owned(), "xterm-256color".to_owned())]),
        }
    }
}

/// Readiness polling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    /// Default total wait (seconds)
    pub timeout_secs: u64,
    /// Fixed delay between polling passes (seconds)
    pub poll_interval_secs: u64,
    /// Per-request timeout (seconds)
    pub request_timeout_secs: u64,
    /// Per-request connect timeout (seconds)
    pub connect_timeout_secs: u64,
}

impl ReadinessConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 360,
            poll_interval_secs: 1,
            request_timeout_secs: 10,
            connect_timeout_secs: 5,
        }
    }
}

/// Endpoint override for one app.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppOverride {
    pub base_url: Option<String>,
    pub health_path: Option<String>,
}

/// Prometheus exporter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub listen_addr: String,
    pub port: u16,
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9108,
            endpoint: "/metrics".to_owned(),
        }
    }
}

// --- environment override helpers ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_u16(target: &mut u16, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u16>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u16 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_stock_layout() {
        let config = HarnessConfig::default();
        assert_eq!(config.workspace.template_dir, "target/ozone");
        assert_eq!(config.workspace.workspace_dir, "target/ozone-test-workspace");
        assert_eq!(config.workspace.scripts_dir, "run/docker/scripts");
        assert_eq!(config.scripts.startup_timeout(), Duration::from_secs(300));
        assert_eq!(config.scripts.teardown_timeout(), Duration::from_secs(120));
        assert_eq!(config.scripts.env.get("TERM").map(String::as_str), Some("xterm-256color"));
        assert_eq!(config.readiness.poll_interval(), Duration::from_secs(1));
        assert!(!config.metrics.enabled);
    }

    #[test]
    fn default_config_passes_validation() {
        HarnessConfig::default().validate().unwrap();
    }

    #[test]
    fn empty_toml_uses_defaults() {
        let config = HarnessConfig::parse("").unwrap();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.readiness.timeout_secs, 360);
    }

    #[test]
    fn partial_toml_merges_with_defaults() {
        let toml = r#"
[scripts]
startup_timeout_secs = 900

[apps.openmrs]
base_url = "http://127.0.0.1:8080/openmrs"
"#;
        let config = HarnessConfig::parse(toml).unwrap();
        assert_eq!(config.scripts.startup_timeout_secs, 900);
        // teardown keeps its default
        assert_eq!(config.scripts.teardown_timeout_secs, 120);
        // env keeps its default when the key is absent
        assert!(config.scripts.env.contains_key("TERM"));
        let openmrs = &config.apps["openmrs"];
        assert_eq!(openmrs.base_url.as_deref(), Some("http://127.0.0.1:8080/openmrs"));
        assert!(openmrs.health_path.is_none());
    }

    #[test]
    fn invalid_toml_returns_parse_error() {
        let err = HarnessConfig::parse("scripts = [[[").unwrap_err();
        assert!(matches!(
            err,
            HarnessError::Config(ConfigError::ParseFailed { .. })
        ));
    }

    #[test]
    fn validate_rejects_invalid_log_format() {
        let mut config = HarnessConfig::default();
        config.general.log_format = "xml".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log_format"));
    }

    #[test]
    fn validate_rejects_zero_startup_timeout() {
        let mut config = HarnessConfig::default();
        config.scripts.startup_timeout_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("startup_timeout_secs"));
    }

    #[test]
    fn validate_rejects_empty_marker() {
        let mut config = HarnessConfig::default();
        config.workspace.manifest_marker = " ".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("manifest_marker"));
    }

    #[test]
    fn validate_rejects_unknown_app_override() {
        let mut config = HarnessConfig::default();
        config.apps.insert("mysql".to_owned(), AppOverride::default());
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            HarnessError::Config(ConfigError::UnknownApp(_))
        ));
    }

    #[test]
    fn validate_allows_zero_readiness_timeout() {
        let mut config = HarnessConfig::default();
        config.readiness.timeout_secs = 0;
        config.validate().unwrap();
    }

    #[test]
    fn env_override_u64_invalid_keeps_original() {
        let mut val = 42;
        // SAFETY: the variable name is unique to this test.
        unsafe { std::env::set_var("TEST_OZONE_HARNESS_U64_BAD", "forty") };
        override_u64(&mut val, "TEST_OZONE_HARNESS_U64_BAD");
        assert_eq!(val, 42);
        unsafe { std::env::remove_var("TEST_OZONE_HARNESS_U64_BAD") };
    }

    #[test]
    fn env_override_missing_var_keeps_original() {
        let mut val = "original".to_owned();
        override_string(&mut val, "TEST_OZONE_HARNESS_NONEXISTENT_12345");
        assert_eq!(val, "original");
    }

    #[test]
    fn config_serialize_roundtrip() {
        let config = HarnessConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed = HarnessConfig::parse(&toml_str).unwrap();
        assert_eq!(config.workspace.control_file, parsed.workspace.control_file);
        assert_eq!(config.scripts.env, parsed.scripts.env);
    }

    #[tokio::test]
    async fn from_file_not_found() {
        let err = HarnessConfig::from_file("/nonexistent/ozone-harness.toml")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            HarnessError::Config(ConfigError::FileNotFound { .. })
        ));
    }
}
