//! YAML 文件存储

use crate::error::Result;
use crate::json::status;
use crate::storage::{RuleStorage, write_file};
use rule_engine::{Rule, RuleParser, serialize};
use rules_shared::observability::metrics::record_storage_operation;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

const FORMAT: &str = "yaml";

/// 以 YAML 文件保存单条规则，结构与 JSON 形式一致
pub struct YamlRuleStorage {
    path: PathBuf,
    parser: RuleParser,
}

impl YamlRuleStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            parser: RuleParser::default(),
        }
    }

    pub fn with_parser(mut self, parser: RuleParser) -> Self {
        self.parser = parser;
        self
    }

    fn write(&self, rule: &Rule) -> Result<()> {
        let text = serde_yaml::to_string(&serialize(rule)?)?;
        write_file(&self.path, text.as_bytes())
    }

    fn read(&self) -> Result<Rule> {
        let text = fs::read_to_string(&self.path)?;
        let structure: Value = serde_yaml::from_str(&text)?;
        Ok(self.parser.parse(&structure)?)
    }
}

impl RuleStorage for YamlRuleStorage {
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

#[cfg(test)]
mod tests {
    use super::*;
    use rule_engine::{Condition, EvaluationContext, Operator, RuleEngine, RuleResult};
    use tempfile::TempDir;

    #[test]
    fn test_yaml_round_trip() {
        let dir = TempDir::new().unwrap();
        let storage = YamlRuleStorage::new(dir.path().join("rule.yaml"));
        let rule = Rule::new("yaml")
            .if_condition(
                Condition::new("tier", Operator::In, vec!["gold", "silver"])
                    | Condition::new("spend", Operator::Gte, 1000.5),
            )
            .then_action(RuleResult::new().value("bonus", 10).variable("who", "tier"))
            .build();

        storage.store(&rule).unwrap();
        let text = fs::read_to_string(storage.path()).unwrap();
        assert!(text.contains("operator: in"));

        let loaded = storage.load().unwrap();
        assert!(loaded.content_eq(&rule).unwrap());

        let ctx = EvaluationContext::new().with("tier", "gold").with("spend", 0.0);
        let outcome = RuleEngine::new().evaluate(&loaded, &ctx).unwrap();
        assert_eq!(outcome.to_json(), serde_json::json!({"bonus": 10, "who": "gold"}));
    }

    #[test]
    fn test_invalid_yaml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.yaml");
        fs::write(&path, "if: [unclosed").unwrap();

        let err = YamlRuleStorage::new(path).load().unwrap_err();
        assert_eq!(err.code(), "YAML_ERROR");
    }
}
