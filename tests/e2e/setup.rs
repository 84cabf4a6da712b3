//! 测试环境管理
//!
//! 在临时目录中写入配置文件并加载，每个测试拥有独立的规则目录。

use anyhow::Result;
use rule_engine::{EngineConfig, ParserConfig, RuleEngine};
use rule_storage::RuleStorage;
use rules_shared::AppConfig;
use std::fs;
use tempfile::TempDir;

pub struct TestEnvironment {
    pub config: AppConfig,
    dir: TempDir,
}

impl TestEnvironment {
    /// 以给定的存储格式初始化环境
    pub fn new(format: &str) -> Result<Self> {
        let dir = TempDir::new()?;
        let config_dir = dir.path().join("config");
        fs::create_dir_all(&config_dir)?;

        fs::write(
            config_dir.join("default.toml"),
            format!(
                r#"
[engine]
strict_version = false
trace = true

[storage]
directory = "{}"
format = "{}"
pretty_json = true

[observability]
log_level = "debug"
"#,
                dir.path().join("rules").display(),
                format
            ),
        )?;
        fs::write(config_dir.join("test.toml"), "[engine]\nstrict_version = true\n")?;

        let config = AppConfig::load_from(&config_dir, "test")?;
        Ok(Self { config, dir })
    }

    pub fn engine(&self) -> RuleEngine {
        RuleEngine::with_config(EngineConfig::from(&self.config.engine))
    }

    pub fn storage(&self, name: &str) -> Result<Box<dyn RuleStorage>> {
        let parser = ParserConfig::from(&self.config.engine);
        Ok(rule_storage::open(&self.config.storage, name, parser)?)
    }

    pub fn rules_dir(&self) -> std::path::PathBuf {
        self.dir.path().join("rules")
    }
}
