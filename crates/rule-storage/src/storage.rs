//! 存储接口与按配置构建适配器

use crate::error::{Result, StorageError};
use crate::json::JsonRuleStorage;
use crate::snapshot::SnapshotRuleStorage;
use crate::yaml::YamlRuleStorage;
use rule_engine::{ParserConfig, Rule, RuleParser};
use rules_shared::config::StorageSettings;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// 单条规则的存储
pub trait RuleStorage: Send + Sync {
    fn store(&self, rule: &Rule) -> Result<()>;

    fn load(&self) -> Result<Rule>;

    fn path(&self) -> &Path;
}

/// 多条规则的存储
pub trait MultiRuleStorage: Send + Sync {
    fn store_all(&self, rules: &[Rule]) -> Result<()>;

    fn load_all(&self) -> Result<Vec<Rule>>;
}

/// 单条规则的存储格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageFormat {
    Json,
    Yaml,
    Snapshot,
}

impl StorageFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Yaml => "yaml",
            Self::Snapshot => "pb",
        }
    }
}

impl fmt::Display for StorageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Json => "json",
            Self::Yaml => "yaml",
            Self::Snapshot => "snapshot",
        };
        f.write_str(name)
    }
}

impl FromStr for StorageFormat {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "yaml" | "yml" => Ok(Self::Yaml),
            "snapshot" | "binary" | "pb" => Ok(Self::Snapshot),
            other => Err(StorageError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// 按存储配置打开名为 `name` 的规则文件
pub fn open(
    settings: &StorageSettings,
    name: &str,
    parser: ParserConfig,
) -> Result<Box<dyn RuleStorage>> {
    let format: StorageFormat = settings.format.parse()?;
    let path = Path::new(&settings.directory).join(format!("{}.{}", name, format.extension()));
    let parser = RuleParser::new(parser);

    let storage: Box<dyn RuleStorage> = match format {
        StorageFormat::Json => Box::new(
            JsonRuleStorage::new(path)?
                .with_parser(parser)
                .pretty(settings.pretty_json),
        ),
        StorageFormat::Yaml => Box::new(YamlRuleStorage::new(path).with_parser(parser)),
        StorageFormat::Snapshot => Box::new(SnapshotRuleStorage::new(path).with_parser(parser)),
    };
    Ok(storage)
}

/// 写入文件前确保父目录存在
pub(crate) fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, bytes)?;
    Ok(())
}
