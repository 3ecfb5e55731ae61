use crate::domain::ports::ConfigProvider;
use crate::utils::error::{BridgeError, Result};
use crate::utils::validation::{
    validate_no_placeholder, validate_non_empty_string, validate_path, validate_positive_number,
    validate_url, Validate,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

pub const DEFAULT_KERNEL_URL: &str = "http://127.0.0.1:55200";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub source: SourceConfig,
    #[serde(default)]
    pub kernel: KernelConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub endpoint: String,
    pub access_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KernelConfig {
    #[serde(default = "default_kernel_url")]
    pub base_url: String,
    pub access_key: Option<String>,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            base_url: default_kernel_url(),
            access_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub interval_seconds: u64,
    pub tick_timeout_seconds: u64,
    pub request_timeout_seconds: u64,
    pub order_horizon_minutes: u64,
    pub retention_hours: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 10,
            tick_timeout_seconds: 8,
            request_timeout_seconds: 5,
            order_horizon_minutes: 120,
            retention_hours: 24,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_state_dir")]
    pub state_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub system_stats: bool,
    pub log_format: LogFormat,
}

fn default_kernel_url() -> String {
    DEFAULT_KERNEL_URL.to_string()
}

fn default_state_dir() -> String {
    "./state".to_string()
}

fn env_var_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("static pattern is valid"))
}

impl BridgeConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(|e| BridgeError::ConfigError {
            message: format!("cannot read {}: {}", path.as_ref().display(), e),
        })?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content);

        toml::from_str(&processed_content).map_err(|e| BridgeError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${OPENTCS_ACCESS_KEY})；未設定的保留原樣，交由驗證報錯
    fn substitute_env_vars(content: &str) -> String {
        env_var_pattern()
            .replace_all(content, |caps: &regex::Captures| {
                let var_name = &caps[1];
                std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
            })
            .into_owned()
    }

    /// 命令列參數覆寫檔案設定
    pub fn with_interval_override(mut self, interval_seconds: Option<u64>) -> Self {
        if let Some(seconds) = interval_seconds {
            self.dispatch.interval_seconds = seconds;
        }
        self
    }

    pub fn validate_config(&self) -> Result<()> {
        validate_url("source.endpoint", &self.source.endpoint)?;
        validate_url("kernel.base_url", &self.kernel.base_url)?;
        for (field, key) in [
            ("source.access_key", &self.source.access_key),
            ("kernel.access_key", &self.kernel.access_key),
        ] {
            if let Some(key) = key {
                validate_non_empty_string(field, key)?;
                validate_no_placeholder(field, key)?;
            }
        }

        validate_path("storage.state_dir", &self.storage.state_dir)?;

        let dispatch = &self.dispatch;
        validate_positive_number("dispatch.interval_seconds", dispatch.interval_seconds, 1)?;
        validate_positive_number("dispatch.tick_timeout_seconds", dispatch.tick_timeout_seconds, 1)?;
        validate_positive_number(
            "dispatch.request_timeout_seconds",
            dispatch.request_timeout_seconds,
            1,
        )?;
        validate_positive_number("dispatch.order_horizon_minutes", dispatch.order_horizon_minutes, 1)?;
        validate_positive_number("dispatch.retention_hours", dispatch.retention_hours, 1)?;

        if dispatch.tick_timeout_seconds > dispatch.interval_seconds {
            return Err(BridgeError::ConfigValidationError {
                field: "dispatch.tick_timeout_seconds".to_string(),
                message: format!(
                    "tick timeout ({}s) must not exceed the interval ({}s)",
                    dispatch.tick_timeout_seconds, dispatch.interval_seconds
                ),
            });
        }

        Ok(())
    }

    pub fn source_access_key(&self) -> Option<&str> {
        self.source.access_key.as_deref()
    }

    pub fn system_stats_enabled(&self) -> bool {
        self.monitoring.system_stats
    }

    pub fn log_format(&self) -> LogFormat {
        self.monitoring.log_format
    }
}

impl ConfigProvider for BridgeConfig {
    fn source_endpoint(&self) -> &str {
        &self.source.endpoint
    }

    fn kernel_url(&self) -> &str {
        &self.kernel.base_url
    }

    fn access_key(&self) -> Option<&str> {
        self.kernel.access_key.as_deref()
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch.request_timeout_seconds)
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.dispatch.interval_seconds)
    }

    fn order_horizon(&self) -> Duration {
        Duration::from_secs(self.dispatch.order_horizon_minutes * 60)
    }

    fn retention(&self) -> Duration {
        Duration::from_secs(self.dispatch.retention_hours * 60 * 60)
    }

    fn tick_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch.tick_timeout_seconds)
    }

    fn state_dir(&self) -> &str {
        &self.storage.state_dir
    }
}

impl Validate for BridgeConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let toml_content = r#"
[source]
endpoint = "http://erp.local/api/orders"
"#;

        let config = BridgeConfig::from_toml_str(toml_content).unwrap();

        assert!(config.validate().is_ok());
        assert_eq!(config.kernel_url(), DEFAULT_KERNEL_URL);
        assert_eq!(config.poll_interval(), Duration::from_secs(10));
        assert_eq!(config.order_horizon(), Duration::from_secs(120 * 60));
        assert_eq!(config.retention(), Duration::from_secs(24 * 3600));
        assert_eq!(config.tick_timeout(), Duration::from_secs(8));
        assert_eq!(config.state_dir(), "./state");
        assert_eq!(config.access_key(), None);
        assert_eq!(config.log_format(), LogFormat::Compact);
    }

    #[test]
    fn test_full_config() {
        let toml_content = r#"
[source]
endpoint = "https://erp.example.com/orders"

[kernel]
base_url = "http://opentcs:55200"
access_key = "s3cret"

[dispatch]
interval_seconds = 30
tick_timeout_seconds = 20
order_horizon_minutes = 60

[storage]
state_dir = "/var/lib/order-bridge"

[monitoring]
system_stats = true
log_format = "json"
"#;

        let config = BridgeConfig::from_toml_str(toml_content).unwrap();

        assert!(config.validate().is_ok());
        assert_eq!(config.access_key(), Some("s3cret"));
        assert_eq!(config.poll_interval(), Duration::from_secs(30));
        assert_eq!(config.order_horizon(), Duration::from_secs(3600));
        assert_eq!(config.dispatch.retention_hours, 24);
        assert!(config.system_stats_enabled());
        assert_eq!(config.log_format(), LogFormat::Json);
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("ORDER_BRIDGE_TEST_KEY", "from-env");

        let toml_content = r#"
[source]
endpoint = "http://erp.local/orders"

[kernel]
access_key = "${ORDER_BRIDGE_TEST_KEY}"
"#;

        let config = BridgeConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.access_key(), Some("from-env"));

        std::env::remove_var("ORDER_BRIDGE_TEST_KEY");
    }

    #[test]
    fn test_unresolved_env_var_fails_validation() {
        let toml_content = r#"
[source]
endpoint = "http://erp.local/orders"

[kernel]
access_key = "${ORDER_BRIDGE_SURELY_UNSET_VAR}"
"#;

        let config = BridgeConfig::from_toml_str(toml_content).unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, BridgeError::ConfigValidationError { .. }));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let bad_url = BridgeConfig::from_toml_str(
            r#"
[source]
endpoint = "invalid-url"
"#,
        )
        .unwrap();
        assert!(bad_url.validate().is_err());

        let slow_tick = BridgeConfig::from_toml_str(
            r#"
[source]
endpoint = "http://erp.local/orders"

[dispatch]
interval_seconds = 5
tick_timeout_seconds = 8
"#,
        )
        .unwrap();
        assert!(slow_tick.validate().is_err());

        let zero_interval = BridgeConfig::from_toml_str(
            r#"
[source]
endpoint = "http://erp.local/orders"

[dispatch]
interval_seconds = 0
"#,
        )
        .unwrap();
        assert!(zero_interval.validate().is_err());
    }

    #[test]
    fn test_missing_source_is_parse_error() {
        assert!(BridgeConfig::from_toml_str("[kernel]\n").is_err());
    }

    #[test]
    fn test_interval_override() {
        let config = BridgeConfig::from_toml_str(
            r#"
[source]
endpoint = "http://erp.local/orders"
"#,
        )
        .unwrap()
        .with_interval_override(Some(60));

        assert_eq!(config.poll_interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"[source]\nendpoint = \"http://erp.local/orders\"\n")
            .unwrap();

        let config = BridgeConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.source_endpoint(), "http://erp.local/orders");

        let missing = BridgeConfig::from_file("/nonexistent/order-bridge.toml").unwrap_err();
        assert!(matches!(missing, BridgeError::ConfigError { .. }));
    }
}
