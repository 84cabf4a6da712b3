//! 配置管理模块
//!
//! 支持多层配置文件加载与环境变量覆盖，以及类型安全的配置访问。

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// 结构版本，随元数据一同写出；引擎与解析器的默认期望版本都取自这里
pub const SCHEMA_VERSION: &str = env!("CARGO_PKG_VERSION");

/// 引擎与解析器配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// 新建组件写入元数据的结构版本
    pub schema_version: String,
    /// 严格版本模式：元数据版本与 `schema_version` 不一致时拒绝解析和求值
    pub strict_version: bool,
    /// 是否记录评估追踪
    pub trace: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            strict_version: false,
            trace: false,
        }
    }
}

/// 存储配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// 规则文件所在目录
    pub directory: String,
    /// 存储格式：json / yaml / snapshot
    pub format: String,
    pub pretty_json: bool,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            directory: "rules".to_string(),
            format: "json".to_string(),
            pretty_json: true,
        }
    }
}

/// 可观测性配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    /// 日志输出格式：json（结构化）或 pretty（人类可读）
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

impl ObservabilityConfig {
    pub fn json_logs(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }
}

/// 应用配置
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub environment: String,
    pub engine: EngineSettings,
    pub storage: StorageSettings,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 加载顺序（后加载的会覆盖先加载的同名配置项）：
    /// 1. config/default.toml（默认配置）
    /// 2. config/{environment}.toml（环境特定配置）
    /// 3. 环境变量（RULES_ 前缀，层级以双下划线分隔，如 RULES_ENGINE__STRICT_VERSION -> engine.strict_version）
    ///
    /// 环境由 RULES_ENV 指定，配置目录由 CONFIG_DIR 指定。
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("RULES_ENV").unwrap_or_else(|_| "development".to_string());
        let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".to_string());

        Self::load_from(Path::new(&config_dir), &env)
    }

    /// 从指定目录加载指定环境的配置
    pub fn load_from(config_dir: &Path, env: &str) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .set_default("environment", env)?
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(File::from(config_dir.join(format!("{}.toml", env))).required(false))
            .add_source(
                Environment::with_prefix("RULES")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.storage.format, "json");
        assert!(!config.engine.strict_version);
        assert_eq!(config.engine.schema_version, SCHEMA_VERSION);
        assert!(!config.observability.json_logs());
    }

    #[test]
    fn test_layered_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("default.toml"),
            r#"
            [engine]
            trace = true

            [storage]
            directory = "/var/lib/rules"
            format = "yaml"
            "#,
        )
        .unwrap();
        fs::write(
            dir.path().join("staging.toml"),
            r#"
            [engine]
            strict_version = true

            [observability]
            log_format = "json"
            "#,
        )
        .unwrap();

        let config = AppConfig::load_from(dir.path(), "staging").unwrap();
        assert_eq!(config.environment, "staging");
        assert!(config.engine.trace);
        assert!(config.engine.strict_version);
        assert_eq!(config.storage.directory, "/var/lib/rules");
        assert_eq!(config.storage.format, "yaml");
        // 未配置的字段保留默认值
        assert!(config.storage.pretty_json);
        assert!(config.observability.json_logs());
        assert!(!config.is_production());
    }

    #[test]
    fn test_missing_files_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_from(dir.path(), "production").unwrap();
        assert!(config.is_production());
        assert_eq!(config.observability.log_level, "info");
    }
}
