//! 二进制快照存储
//!
//! 规则结构先转换为 `google.protobuf.Value`，再以 protobuf 编码写入文件。
//! protobuf 的数值只有双精度一种，整数载荷读回后为浮点数，解析时按值类型还原。

use crate::error::Result;
use crate::json::status;
use crate::storage::{RuleStorage, write_file};
use prost::Message;
use prost_types::value::Kind;
use rule_engine::{Rule, RuleParser, serialize};
use rules_shared::observability::metrics::record_storage_operation;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

const FORMAT: &str = "snapshot";

/// JSON 值转换为 protobuf Value
pub fn to_prost_value(json: &Value) -> prost_types::Value {
    let kind = match json {
        Value::Null => Kind::NullValue(0),
        Value::Bool(b) => Kind::BoolValue(*b),
        Value::Number(n) => Kind::NumberValue(n.as_f64().unwrap_or(0.0)),
        Value::String(s) => Kind::StringValue(s.clone()),
        Value::Array(arr) => Kind::ListValue(prost_types::ListValue {
            values: arr.iter().map(to_prost_value).collect(),
        }),
        Value::Object(map) => {
            let fields = map
                .iter()
                .map(|(k, v)| (k.clone(), to_prost_value(v)))
                .collect::<BTreeMap<String, prost_types::Value>>();
            Kind::StructValue(prost_types::Struct { fields })
        }
    };

    prost_types::Value { kind: Some(kind) }
}

/// protobuf Value 转换为 JSON 值
pub fn from_prost_value(proto: &prost_types::Value) -> Value {
    match &proto.kind {
        Some(Kind::NullValue(_)) | None => Value::Null,
        Some(Kind::NumberValue(n)) => serde_json::json!(*n),
        Some(Kind::StringValue(s)) => Value::String(s.clone()),
        Some(Kind::BoolValue(b)) => Value::Bool(*b),
        Some(Kind::ListValue(list)) => Value::Array(list.values.iter().map(from_prost_value).collect()),
        Some(Kind::StructValue(s)) => Value::Object(
            s.fields
                .iter()
                .map(|(k, v)| (k.clone(), from_prost_value(v)))
                .collect(),
        ),
    }
}

/// 以 protobuf 二进制快照保存单条规则
pub struct SnapshotRuleStorage {
    path: PathBuf,
    parser: RuleParser,
}

impl SnapshotRuleStorage {
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
        let bytes = to_prost_value(&serialize(rule)?).encode_to_vec();
        write_file(&self.path, &bytes)
    }

    fn read(&self) -> Result<Rule> {
        let bytes = fs::read(&self.path)?;
        let proto = prost_types::Value::decode(bytes.as_slice())?;
        Ok(self.parser.parse(&from_prost_value(&proto))?)
    }
}

impl RuleStorage for SnapshotRuleStorage {
    fn store(&self, rule: &Rule) -> Result<()> {
        let result = self.write(rule);
        record_storage_operation(FORMAT, "store", status(&result));
        result?;

        info!(path = %self.path.display(), rule_id = %rule.id(), "规则快照已写入");
        Ok(())
    }

    fn load(&self) -> Result<Rule> {
        let result = self.read();
        record_storage_operation(FORMAT, "load", status(&result));
        let rule = result?;

        info!(path = %self.path.display(), rule_id = %rule.id(), "规则快照已加载");
        Ok(rule)
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rule_engine::{Condition, EvaluationContext, Operator, RuleEngine, RuleResult, ValueType};
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_prost_conversion() {
        let value = json!({
            "name": "r",
            "flag": true,
            "tags": ["a", "b"],
            "missing": null,
            "amount": 10.5
        });

        let proto = to_prost_value(&value);
        let Some(Kind::StructValue(s)) = &proto.kind else {
            panic!("expected struct");
        };
        assert_eq!(s.fields.len(), 5);
        assert_eq!(from_prost_value(&proto), value);
    }

    #[test]
    fn test_snapshot_round_trip() {
        let dir = TempDir::new().unwrap();
        let storage = SnapshotRuleStorage::new(dir.path().join("rule.pb"));
        let rule = Rule::new("snapshot")
            .if_condition(Condition::new("age", Operator::Between, vec![18, 65]))
            .then_action(RuleResult::new().add("eligible", ValueType::Boolean, true))
            .build();

        storage.store(&rule).unwrap();
        let loaded = storage.load().unwrap();
        assert!(loaded.content_eq(&rule).unwrap());

        let ctx = EvaluationContext::new().with("age", 30);
        let outcome = RuleEngine::new().evaluate(&loaded, &ctx).unwrap();
        assert_eq!(outcome.to_json(), json!({"eligible": true}));
    }

    #[test]
    fn test_corrupt_snapshot() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rule.pb");
        fs::write(&path, [0xff, 0xff, 0xff]).unwrap();

        let err = SnapshotRuleStorage::new(path).load().unwrap_err();
        assert_eq!(err.code(), "SNAPSHOT_DECODE_ERROR");
    }
}
