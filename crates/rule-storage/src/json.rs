//! JSON 文件存储

use crate::error::{Result, StorageError};
use crate::storage::{MultiRuleStorage, RuleStorage, write_file};
use rule_engine::{Rule, RuleParser, serialize};
use rules_shared::observability::metrics::record_storage_operation;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const FORMAT: &str = "json";

fn require_json_path(path: PathBuf) -> Result<PathBuf> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => Ok(path),
        _ => Err(StorageError::InvalidPath(format!(
            "'{}' 不是 .json 文件",
            path.display()
        ))),
    }
}

fn to_text(value: &Value, pretty: bool) -> Result<String> {
    let text = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    Ok(text)
}

/// 以 JSON 文件保存单条规则
pub struct JsonRuleStorage {
    path: PathBuf,
    parser: RuleParser,
    pretty: bool,
}

impl JsonRuleStorage {
    /// 路径必须以 `.json` 结尾
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            path: require_json_path(path.into())?,
            parser: RuleParser::default(),
            pretty: true,
        })
    }

    pub fn with_parser(mut self, parser: RuleParser) -> Self {
        self.parser = parser;
        self
    }

    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    fn write(&self, rule: &Rule) -> Result<()> {
        let text = to_text(&serialize(rule)?, self.pretty)?;
        write_file(&self.path, text.as_bytes())
    }

    fn read(&self) -> Result<Rule> {
        let text = fs::read_to_string(&self.path)?;
        let structure: Value = serde_json::from_str(&text)?;
        Ok(self.parser.parse(&structure)?)
    }
}

impl RuleStorage for JsonRuleStorage {
    fn store(&self, rule: &Rule) -> Result<()> {
        let result = self.write(rule);
        record_storage_operation(FORMAT, "store", status(&result));
        result?;

        info!(path = %self.path.display(), rule_id = %rule.id(), "规则已写入");
        Ok(())
    }

    fn load(&self) -> Result<Rule> {
        let result = self.read();
        record_storage_operation(FORMAT, "load", status(&result));
        let rule = result?;

        info!(path = %self.path.display(), rule_id = %rule.id(), "规则已加载");
        Ok(rule)
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

/// 以 JSON 数组保存多条规则
pub struct JsonMultiRuleStorage {
    path: PathBuf,
    parser: RuleParser,
    pretty: bool,
}

impl JsonMultiRuleStorage {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            path: require_json_path(path.into())?,
            parser: RuleParser::default(),
            pretty: true,
        })
    }

    pub fn with_parser(mut self, parser: RuleParser) -> Self {
        self.parser = parser;
        self
    }

    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, rules: &[Rule]) -> Result<()> {
        let structures = rules.iter().map(serialize).collect::<rule_engine::Result<Vec<_>>>()?;
        let text = to_text(&Value::Array(structures), self.pretty)?;
        write_file(&self.path, text.as_bytes())
    }

    fn read(&self) -> Result<Vec<Rule>> {
        let text = fs::read_to_string(&self.path)?;
        let Value::Array(items) = serde_json::from_str::<Value>(&text)? else {
            return Err(StorageError::InvalidData(format!(
                "'{}' 的顶层必须是规则数组",
                self.path.display()
            )));
        };

        items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                debug!(index = i, "解析规则");
                self.parser.parse(item).map_err(StorageError::from)
            })
            .collect()
    }
}

impl MultiRuleStorage for JsonMultiRuleStorage {
    fn store_all(&self, rules: &[Rule]) -> Result<()> {
        let result = self.write(rules);
        record_storage_operation(FORMAT, "store_all", status(&result));
        result?;

        info!(path = %self.path.display(), count = rules.len(), "规则集已写入");
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<Rule>> {
        let result = self.read();
        record_storage_operation(FORMAT, "load_all", status(&result));
        let rules = result?;

        info!(path = %self.path.display(), count = rules.len(), "规则集已加载");
        Ok(rules)
    }
}

pub(crate) fn status<T>(result: &Result<T>) -> &'static str {
    if result.is_ok() { "ok" } else { "error" }
}
